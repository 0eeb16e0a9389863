//! Integration tests for the onboarding engine.
//!
//! Each test wires the real orchestrator, tour runner, gate, and flag
//! store together (headless presenter, in-memory or on-disk flags) and
//! exercises full sequences rather than individual modules.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::timeout;

use salon_onboarding::api::NullApi;
use salon_onboarding::config::OnboardingConfig;
use salon_onboarding::error::EffectError;
use salon_onboarding::events::{EventBus, GuideEvent};
use salon_onboarding::flags::{FlagScope, FlagStore, LibSqlScope, MemoryScope};
use salon_onboarding::guide::{
    HeadlessPresenter, Page, Presenter, StepRegistry, TourRunner, TourRunnerDeps,
};
use salon_onboarding::orchestrator::{
    Orchestrator, Phase, PhaseEffects, StartOptions, effect,
};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    flags: Arc<FlagStore>,
    bus: Arc<EventBus>,
    presenter: Arc<HeadlessPresenter>,
    runner: Arc<TourRunner>,
}

fn harness_with_scope(durable: Arc<dyn FlagScope>) -> Harness {
    let flags = Arc::new(FlagStore::new(durable, Arc::new(MemoryScope::new())));
    let bus = EventBus::new();
    let presenter = Arc::new(HeadlessPresenter::new());
    let runner = TourRunner::new(TourRunnerDeps {
        registry: Arc::new(StepRegistry::builtin()),
        presenter: presenter.clone(),
        flags: flags.clone(),
        bus: bus.clone(),
        api: Arc::new(NullApi),
        page_ready_probe: Arc::new(|_| true),
        config: OnboardingConfig::default(),
    });
    Harness {
        flags,
        bus,
        presenter,
        runner,
    }
}

fn harness() -> Harness {
    harness_with_scope(Arc::new(MemoryScope::new()))
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
        assert_ne!(
            runner.position().await,
            before,
            "tour advance stalled at {before:?}"
        );
    }
    Ok(())
}

/// Shell-style effects that drive real tours for the tour and quickstart
/// phases and set completion flags.
fn shell_effects(harness: &Harness) -> PhaseEffects {
    let mut effects = PhaseEffects::noop();

    let flags = harness.flags.clone();
    effects.welcome = effect(move |_| {
        let flags = flags.clone();
        async move {
            flags.set_welcome_seen().await;
            Ok(())
        }
    });

    let runner = harness.runner.clone();
    effects.tour = effect(move |_| {
        let runner = runner.clone();
        async move { drive_tour(&runner, Page::Dashboard).await }
    });

    let runner = harness.runner.clone();
    effects.quickstart = effect(move |_| {
        let runner = runner.clone();
        async move { drive_tour(&runner, Page::Assistant).await }
    });

    let flags = harness.flags.clone();
    effects.complete = effect(move |_| {
        let flags = flags.clone();
        async move {
            flags.set_onboarding_done(true).await;
            Ok(())
        }
    });

    effects
}

#[tokio::test]
async fn full_sequence_completes_and_persists_flags() {
    let harness = harness();
    let mut rx = harness.bus.watch();
    let orch = Orchestrator::new(
        harness.flags.clone(),
        harness.bus.clone(),
        shell_effects(&harness),
    );

    timeout(TEST_TIMEOUT, orch.start(StartOptions::default()))
        .await
        .expect("run hung")
        .expect("run failed");

    let state = orch.state();
    assert_eq!(state.phase, Phase::Complete);
    assert!(!state.running);
    assert!(state.error.is_none());

    // Every completion flag the tours own, plus the shell's.
    assert!(harness.flags.welcome_seen().await);
    assert!(harness.flags.guide_done().await);
    assert!(harness.flags.quickstart_completed().await);
    assert!(harness.flags.onboarding_done().await);

    // No overlay left behind.
    assert_eq!(harness.presenter.overlay_count().await, 0);

    // The bus saw the phases in order and both page completions.
    let mut phases = Vec::new();
    let mut pages_done = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            GuideEvent::PhaseChanged { phase } => phases.push(phase),
            GuideEvent::PageDone { page } => pages_done.push(page),
            _ => {}
        }
    }
    assert_eq!(phases, Phase::SEQUENCE.to_vec());
    assert_eq!(pages_done, vec![Page::Dashboard, Page::Assistant]);
}

#[tokio::test]
async fn interrupted_tour_resumes_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flags.db");

    // First session: walk to step 3 of the dashboard tour, then the user
    // closes the tour (or the tab).
    {
        let scope = Arc::new(LibSqlScope::new_local(&path).await.unwrap());
        let harness = harness_with_scope(scope);
        harness.runner.start(Page::Dashboard).await.unwrap();
        for _ in 0..3 {
            harness.runner.next().await;
        }
        assert_eq!(harness.runner.position().await, Some((Page::Dashboard, 3)));
        harness.runner.destroy().await;
    }

    // Second session: everything is rebuilt from scratch; only the flag
    // database survives.
    let scope = Arc::new(LibSqlScope::new_local(&path).await.unwrap());
    let harness = harness_with_scope(scope);
    assert_eq!(harness.flags.tour_step_index().await, 3);

    let resumed = timeout(TEST_TIMEOUT, harness.runner.resume())
        .await
        .expect("resume hung")
        .unwrap();
    assert!(resumed);
    assert_eq!(harness.runner.position().await, Some((Page::Dashboard, 3)));
    // The resumed tour highlighted the persisted step first, not step 0.
    assert_eq!(harness.presenter.highlight_log().await, vec![3]);
}

#[tokio::test]
async fn failed_phase_is_recoverable_by_retrying_start() {
    let harness = harness();
    let orch = {
        let mut effects = shell_effects(&harness);
        let broken = Arc::new(AtomicBool::new(true));
        effects.billing = effect(move |_| {
            let broken = broken.clone();
            async move {
                if broken.swap(false, Ordering::SeqCst) {
                    Err(EffectError::new("billing down"))
                } else {
                    Ok(())
                }
            }
        });
        Orchestrator::new(harness.flags.clone(), harness.bus.clone(), effects)
    };

    let first = timeout(TEST_TIMEOUT, orch.start(StartOptions::default()))
        .await
        .expect("run hung");
    assert_eq!(first.unwrap_err().message, "billing down");
    assert_eq!(orch.state().phase, Phase::Error);

    // The guide completed before billing failed, so force a full re-run.
    let second = timeout(TEST_TIMEOUT, orch.start(StartOptions { force: true }))
        .await
        .expect("retry hung");
    assert!(second.is_ok());
    assert_eq!(orch.state().phase, Phase::Complete);
}

#[tokio::test]
async fn reset_clears_flags_but_keeps_tenant() {
    let harness = harness();
    harness.flags.set_tenant_id("tenant-42").await;
    let orch = Orchestrator::new(
        harness.flags.clone(),
        harness.bus.clone(),
        shell_effects(&harness),
    );

    timeout(TEST_TIMEOUT, orch.start(StartOptions::default()))
        .await
        .expect("run hung")
        .expect("run failed");
    assert!(harness.flags.onboarding_done().await);

    orch.reset(Default::default()).await;

    assert_eq!(orch.state().phase, Phase::Idle);
    assert!(!harness.flags.onboarding_done().await);
    assert!(!harness.flags.guide_done().await);
    assert!(!harness.flags.welcome_seen().await);
    assert_eq!(
        harness.flags.tenant_id().await,
        Some("tenant-42".to_string())
    );
}

#[tokio::test]
async fn cross_page_navigation_synchronizes_with_page_readiness() {
    let harness = harness();

    // A shell listener that "mounts" the requested page by answering with
    // the readiness event, like an independently-rendered view would.
    let bus = harness.bus.clone();
    let _shell = harness.bus.subscribe(move |event| {
        if let GuideEvent::NavigateRequested { page } = event {
            bus.emit(GuideEvent::PageReady { page: *page });
        }
    });

    // The dashboard tour's navigate step sits right before the contact
    // slides; walking the whole tour crosses the navigation gate.
    timeout(TEST_TIMEOUT, drive_tour(&harness.runner, Page::Dashboard))
        .await
        .expect("tour hung")
        .unwrap();
    assert!(harness.flags.guide_done().await);
}
