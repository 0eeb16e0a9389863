use std::sync::Arc;

use salon_onboarding::api::{HttpOnboardingApi, NullApi, OnboardingApi};
use salon_onboarding::config::OnboardingConfig;
use salon_onboarding::error::EffectError;
use salon_onboarding::events::{EventBus, GuideEvent};
use salon_onboarding::flags::{FlagScope, FlagStore, LibSqlScope, MemoryScope};
use salon_onboarding::guide::{HeadlessPresenter, Page, StepRegistry, TourRunner, TourRunnerDeps};
use salon_onboarding::orchestrator::{
    Orchestrator, PhaseEffects, StartOptions, effect,
};

/// Demo shell: wires the engine headlessly and runs the full onboarding
/// sequence once, logging every event it produces.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let durable: Arc<dyn FlagScope> = match std::env::var("SALON_DB_PATH") {
        Ok(path) => Arc::new(LibSqlScope::new_local(std::path::Path::new(&path)).await?),
        Err(_) => Arc::new(MemoryScope::new()),
    };
    // With no backend configured, server mirroring and completion calls
    // are no-ops.
    let api: Arc<dyn OnboardingApi> = match (
        std::env::var("SALON_API_URL"),
        std::env::var("SALON_API_TOKEN"),
    ) {
        (Ok(url), Ok(token)) => Arc::new(HttpOnboardingApi::new(
            url,
            secrecy::SecretString::from(token),
        )),
        _ => Arc::new(NullApi),
    };
    let flags = Arc::new(
        FlagStore::new(durable, Arc::new(MemoryScope::new())).with_api(api.clone()),
    );
    let bus = EventBus::new();

    // Log everything crossing the bus, the way page modules would observe it.
    let _log_sub = bus.subscribe(|event| {
        tracing::info!(?event, "bus");
    });

    let presenter = Arc::new(HeadlessPresenter::new());
    let registry = Arc::new(StepRegistry::builtin());
    tracing::info!(
        pages = ?registry.pages().collect::<Vec<_>>(),
        "Tour content loaded"
    );
    let runner = TourRunner::new(TourRunnerDeps {
        registry,
        presenter,
        flags: flags.clone(),
        bus: bus.clone(),
        api,
        // Headless demo: every page is "mounted" immediately.
        page_ready_probe: Arc::new(|_| true),
        config: OnboardingConfig {
            resume_tours: true,
            ..Default::default()
        },
    });

    let effects = build_effects(flags.clone(), bus.clone(), runner);
    let orchestrator = Orchestrator::new(flags, bus, effects);

    let force = std::env::var("SALON_ONBOARDING_FORCE").is_ok();
    orchestrator.start(StartOptions { force }).await?;

    let state = orchestrator.state();
    tracing::info!(phase = %state.phase, "Onboarding finished");
    Ok(())
}

/// Walk a page's tour to completion by repeatedly advancing.
async fn drive_tour(runner: &TourRunner, page: Page) -> Result<(), EffectError> {
    runner
        .start(page)
        .await
        .map_err(|e| EffectError::new(format!("tour failed to start: {e}")))?;
    while runner.is_running().await {
        let before = runner.position().await;
        runner.next().await;
        if runner.position().await == before {
            // Advance blocked (validation); nothing in the demo can unblock it.
            runner.destroy().await;
            break;
        }
    }
    Ok(())
}

fn build_effects(
    flags: Arc<FlagStore>,
    bus: Arc<EventBus>,
    runner: Arc<TourRunner>,
) -> PhaseEffects {
    let mut effects = PhaseEffects::noop();

    let welcome_flags = flags.clone();
    effects.welcome = effect(move |cx| {
        let flags = welcome_flags.clone();
        async move {
            if !cx.forced && flags.welcome_seen().await {
                return Ok(());
            }
            tracing::info!("Welcome to your new studio console");
            flags.set_welcome_seen().await;
            Ok(())
        }
    });

    let tour_flags = flags.clone();
    let tour_runner = runner.clone();
    effects.tour = effect(move |cx| {
        let flags = tour_flags.clone();
        let runner = tour_runner.clone();
        async move {
            if !cx.forced && flags.guide_done().await {
                return Ok(());
            }
            drive_tour(&runner, Page::Dashboard).await
        }
    });

    let billing_flags = flags.clone();
    let billing_bus = bus.clone();
    effects.billing = effect(move |_| {
        let flags = billing_flags.clone();
        let bus = billing_bus.clone();
        async move {
            if flags.billing_dismissed().await {
                return Ok(());
            }
            bus.emit(GuideEvent::BillingPromptRequested);
            Ok(())
        }
    });

    let dash_runner = runner.clone();
    effects.dashboard = effect(move |_| {
        let runner = dash_runner.clone();
        async move { drive_tour(&runner, Page::Clients).await }
    });

    let quick_flags = flags.clone();
    let quick_runner = runner;
    effects.quickstart = effect(move |cx| {
        let flags = quick_flags.clone();
        let runner = quick_runner.clone();
        async move {
            if !cx.forced && flags.quickstart_completed().await {
                return Ok(());
            }
            drive_tour(&runner, Page::Assistant).await
        }
    });

    let complete_flags = flags;
    effects.complete = effect(move |_| {
        let flags = complete_flags.clone();
        async move {
            flags.set_onboarding_done(true).await;
            Ok(())
        }
    });

    effects
}
