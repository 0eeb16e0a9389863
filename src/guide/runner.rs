//! Tour runner — drives one page's step list through the presenter.
//!
//! A single constructed runner owns all "is a tour running" state. Start is
//! check-and-set: while a tour is starting or running, further starts are
//! no-ops, so two overlays can never fight over the same screen region.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::OnboardingApi;
use crate::config::OnboardingConfig;
use crate::error::{FormError, Result};
use crate::events::{EventBus, GuideEvent};
use crate::flags::FlagStore;
use crate::gate::{NavigationGate, NavigationIntent};
use crate::guide::contact::ContactForm;
use crate::guide::presenter::{self, Presenter};
use crate::guide::registry::{ContactField, GuideStep, Page, StepKind, StepRegistry};

/// Document-level keys the runner intercepts while a tour is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowLeft,
    ArrowRight,
    Other,
}

/// Page-specific "mounted and ready" predicate supplied by the shell.
pub type PageReadyProbe = Arc<dyn Fn(Page) -> bool + Send + Sync>;

/// Everything the runner needs from its surroundings.
pub struct TourRunnerDeps {
    pub registry: Arc<StepRegistry>,
    pub presenter: Arc<dyn Presenter>,
    pub flags: Arc<FlagStore>,
    pub bus: Arc<EventBus>,
    pub api: Arc<dyn OnboardingApi>,
    pub page_ready_probe: PageReadyProbe,
    pub config: OnboardingConfig,
}

struct ActiveTour {
    page: Page,
    steps: Vec<GuideStep>,
    index: usize,
    /// Bound contact form, rehydrated lazily when a capture slide is
    /// highlighted.
    form: Option<ContactForm>,
    /// Distinguishes this tour from any later one, so async work finishing
    /// after a destroy cannot mutate the wrong tour.
    epoch: u64,
}

/// Single-instance tour driver.
pub struct TourRunner {
    deps: TourRunnerDeps,
    /// Built from `deps.config.gate`, so navigation timeouts follow the
    /// runner's configuration.
    gate: NavigationGate,
    active: Mutex<Option<ActiveTour>>,
    starting: AtomicBool,
    /// Serializes advance: while one next/previous is doing async work,
    /// further ones are dropped instead of queued.
    advancing: Mutex<()>,
    epochs: AtomicU64,
}

impl TourRunner {
    pub fn new(deps: TourRunnerDeps) -> Arc<Self> {
        let gate = NavigationGate::new(deps.bus.clone(), deps.config.gate.clone());
        Arc::new(Self {
            deps,
            gate,
            active: Mutex::new(None),
            starting: AtomicBool::new(false),
            advancing: Mutex::new(()),
            epochs: AtomicU64::new(0),
        })
    }

    /// Start the tour for `page` from step 0 (or, with `resume_tours` set
    /// and a matching persisted position, from the persisted index).
    ///
    /// No-op when the page has no registered steps, and idempotent while a
    /// tour is already starting or running.
    pub async fn start(&self, page: Page) -> Result<()> {
        if self.deps.config.resume_tours && self.deps.flags.tour_page().await == Some(page) {
            let steps = self.deps.registry.steps(page);
            if !steps.is_empty() {
                let index = self.deps.flags.tour_step_index().await.min(steps.len() - 1);
                return self.start_at(page, index).await;
            }
        }
        self.start_at(page, 0).await
    }

    /// Resume an interrupted tour at its persisted step index. Returns
    /// whether a tour was resumed.
    pub async fn resume(&self) -> Result<bool> {
        let Some(page) = self.deps.flags.tour_page().await else {
            return Ok(false);
        };
        let steps = self.deps.registry.steps(page);
        if steps.is_empty() {
            return Ok(false);
        }
        let index = self
            .deps
            .flags
            .tour_step_index()
            .await
            .min(steps.len() - 1);
        self.start_at(page, index).await?;
        Ok(self.is_running().await)
    }

    async fn start_at(&self, page: Page, index: usize) -> Result<()> {
        let steps = self.deps.registry.steps(page);
        if steps.is_empty() {
            debug!(%page, "No registered steps; not starting tour");
            return Ok(());
        }
        if self.starting.swap(true, Ordering::SeqCst) {
            debug!(%page, "Tour already starting; ignoring");
            return Ok(());
        }
        let result = self.mount_tour(page, steps.to_vec(), index).await;
        self.starting.store(false, Ordering::SeqCst);
        result
    }

    async fn mount_tour(&self, page: Page, steps: Vec<GuideStep>, index: usize) -> Result<()> {
        if self.active.lock().await.is_some() {
            debug!(%page, "Tour already running; ignoring");
            return Ok(());
        }

        self.deps.flags.set_tour_position(page, index).await;
        self.deps.bus.emit(GuideEvent::PageStarted {
            page,
            total: steps.len(),
        });

        let resolved = presenter::resolve(&steps);
        if let Err(e) = self.deps.presenter.mount(page, resolved).await {
            warn!(%page, "Tour failed to mount: {e}");
            // Never leave a stuck overlay behind a failed mount.
            self.deps.presenter.destroy().await;
            return Err(e.into());
        }

        let epoch = self.epochs.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut active = self.active.lock().await;
            *active = Some(ActiveTour {
                page,
                steps,
                index,
                form: None,
                epoch,
            });
        }
        info!(%page, step = index, "Tour started");
        self.highlight_current().await;
        Ok(())
    }

    /// Per-highlight bookkeeping: persist the index for resume, toggle
    /// click-through, prune duplicate overlays, notify listeners, and
    /// rebind the contact form on capture slides.
    async fn highlight_current(&self) {
        let mut guard = self.active.lock().await;
        let Some(tour) = guard.as_mut() else { return };
        let (page, index) = (tour.page, tour.index);
        let step = tour.steps[index].clone();

        if let Err(e) = self.deps.presenter.highlight(index).await {
            // Skip the offending step rather than aborting the tour.
            warn!(%page, index, "Failed to highlight step: {e}");
        }

        self.deps.flags.set_tour_position(page, index).await;
        self.deps
            .presenter
            .set_click_through(step.allow_clicks)
            .await;

        let removed = self.deps.presenter.remove_extra_overlays().await;
        if removed > 0 {
            warn!(removed, "Removed duplicate tour overlays");
        }

        self.deps.bus.emit(GuideEvent::StepChanged {
            page,
            index,
            title: step.title.clone(),
        });

        if matches!(step.kind, StepKind::ContactCapture { .. }) {
            // Idempotent rebind: prior bindings are replaced wholesale.
            tour.form = Some(ContactForm::load(self.deps.flags.clone()).await);
        }
    }

    /// Advance to the next step, running the current step's exit behavior
    /// first. Completing the final step finishes the tour.
    pub async fn next(&self) {
        let Ok(_advancing) = self.advancing.try_lock() else {
            debug!("Advance already in flight; ignoring");
            return;
        };

        let (index, total, step, epoch) = {
            let guard = self.active.lock().await;
            let Some(tour) = guard.as_ref() else { return };
            (
                tour.index,
                tour.steps.len(),
                tour.steps[tour.index].clone(),
                tour.epoch,
            )
        };

        match &step.kind {
            StepKind::Info => {}
            StepKind::Action { event } => self.deps.bus.emit(event.clone()),
            StepKind::Navigate {
                page: target,
                ready_timeout,
            } => {
                let target = *target;
                let probe = self.deps.page_ready_probe.clone();
                self.gate
                    .await_ready(
                        NavigationIntent {
                            page: target,
                            timeout: *ready_timeout,
                        },
                        move || probe(target),
                    )
                    .await;
            }
            StepKind::ContactCapture { finalize, .. } => {
                let mut guard = self.active.lock().await;
                let Some(tour) = guard.as_mut() else { return };
                if tour.epoch != epoch || tour.index != index {
                    return;
                }
                if tour.form.is_none() {
                    tour.form = Some(ContactForm::load(self.deps.flags.clone()).await);
                }
                let Some(form) = tour.form.as_mut() else {
                    return;
                };

                let errors = form.validate();
                if !errors.is_empty() {
                    info!(?errors, "Contact validation blocked advance");
                    return;
                }
                if *finalize {
                    // Best-effort: a failed submission is shown inline but
                    // never blocks tour completion.
                    form.submit(self.deps.api.as_ref(), true).await;
                }
            }
        }

        // The exit behavior may have awaited; make sure this is still the
        // same tour at the same step before moving on.
        let finished = {
            let mut guard = self.active.lock().await;
            let Some(tour) = guard.as_mut() else { return };
            if tour.epoch != epoch || tour.index != index {
                return;
            }
            if index + 1 >= total {
                true
            } else {
                tour.index = index + 1;
                false
            }
        };

        if finished {
            self.finish().await;
        } else {
            self.highlight_current().await;
        }
    }

    /// Move back one step. A no-op at step 0.
    pub async fn previous(&self) {
        let Ok(_advancing) = self.advancing.try_lock() else {
            return;
        };
        {
            let mut guard = self.active.lock().await;
            let Some(tour) = guard.as_mut() else { return };
            if tour.index == 0 {
                return;
            }
            tour.index -= 1;
        }
        self.highlight_current().await;
    }

    /// Document-level key handling, active only while a tour runs. Returns
    /// whether the key was consumed (arrow keys are captured away from any
    /// other consumer).
    pub async fn handle_key(&self, key: Key) -> bool {
        if !self.is_running().await {
            return false;
        }
        match key {
            Key::ArrowRight => {
                self.next().await;
                true
            }
            Key::ArrowLeft => {
                self.previous().await;
                true
            }
            Key::Other => false,
        }
    }

    /// Update a bound contact field (shell-side change handler).
    pub async fn update_contact(&self, field: ContactField, value: &str) {
        let mut guard = self.active.lock().await;
        let Some(tour) = guard.as_mut() else { return };
        if tour.form.is_none() {
            tour.form = Some(ContactForm::load(self.deps.flags.clone()).await);
        }
        let Some(form) = tour.form.as_mut() else {
            return;
        };
        match field {
            ContactField::Email => form.set_email(value).await,
            ContactField::Phone => form.set_phone(value).await,
        }
    }

    /// Inline validation errors for the bound contact form.
    pub async fn contact_errors(&self) -> Vec<FormError> {
        let guard = self.active.lock().await;
        guard
            .as_ref()
            .and_then(|tour| tour.form.as_ref())
            .map(ContactForm::validate)
            .unwrap_or_default()
    }

    /// Explicitly close the tour, tearing down overlay DOM and key capture
    /// immediately regardless of any pending step work.
    pub async fn destroy(&self) {
        let Some(tour) = self.active.lock().await.take() else {
            return;
        };
        self.teardown(tour, false).await;
    }

    async fn finish(&self) {
        let Some(tour) = self.active.lock().await.take() else {
            return;
        };
        self.teardown(tour, true).await;
    }

    async fn teardown(&self, mut tour: ActiveTour, completed: bool) {
        self.deps.presenter.destroy().await;

        if !completed {
            // Keep the persisted position so an interrupted tour can resume.
            info!(page = %tour.page, step = tour.index, "Tour closed");
            return;
        }

        self.deps.flags.clear_tour_position().await;
        match tour.page {
            Page::Dashboard => {
                self.deps.flags.set_guide_done(true).await;
                if let Some(form) = tour.form.as_mut() {
                    form.clear_draft().await;
                }
                if let Err(e) = self.deps.api.complete_tour(Utc::now()).await {
                    warn!("Failed to record tour completion: {e}");
                }
            }
            Page::Assistant => {
                self.deps.flags.set_quickstart_completed(true).await;
                if let Err(e) = self.deps.api.complete_step("quickstart").await {
                    warn!("Failed to record quickstart completion: {e}");
                }
            }
            _ => {}
        }
        info!(page = %tour.page, "Tour completed");
        self.deps.bus.emit(GuideEvent::PageDone { page: tour.page });
    }

    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// The active page and step index, if a tour is running.
    pub async fn position(&self) -> Option<(Page, usize)> {
        let guard = self.active.lock().await;
        guard.as_ref().map(|tour| (tour.page, tour.index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::NullApi;
    use crate::config::GateConfig;
    use crate::flags::MemoryScope;
    use crate::guide::presenter::HeadlessPresenter;

    fn info_steps(n: usize) -> Vec<GuideStep> {
        (0..n)
            .map(|i| GuideStep::centered(format!("step {i}"), ""))
            .collect()
    }

    struct Fixture {
        runner: Arc<TourRunner>,
        presenter: Arc<HeadlessPresenter>,
        flags: Arc<FlagStore>,
        bus: Arc<EventBus>,
    }

    fn fixture(registry: StepRegistry) -> Fixture {
        fixture_with_config(registry, OnboardingConfig::default())
    }

    fn fixture_with_config(registry: StepRegistry, config: OnboardingConfig) -> Fixture {
        let bus = EventBus::new();
        let presenter = Arc::new(HeadlessPresenter::new());
        let flags = Arc::new(FlagStore::new(
            Arc::new(MemoryScope::new()),
            Arc::new(MemoryScope::new()),
        ));
        let runner = TourRunner::new(TourRunnerDeps {
            registry: Arc::new(registry),
            presenter: presenter.clone(),
            flags: flags.clone(),
            bus: bus.clone(),
            api: Arc::new(NullApi),
            page_ready_probe: Arc::new(|_| true),
            config,
        });
        Fixture {
            runner,
            presenter,
            flags,
            bus,
        }
    }

    fn registry_with(page: Page, steps: Vec<GuideStep>) -> StepRegistry {
        let mut registry = StepRegistry::new();
        for step in steps {
            registry.append(page, step);
        }
        registry
    }

    #[tokio::test]
    async fn next_and_previous_respect_bounds() {
        let fx = fixture(registry_with(Page::Messages, info_steps(4)));
        fx.runner.start(Page::Messages).await.unwrap();
        assert_eq!(fx.runner.position().await, Some((Page::Messages, 0)));

        // Previous at step 0 is a no-op.
        fx.runner.previous().await;
        assert_eq!(fx.runner.position().await, Some((Page::Messages, 0)));

        // N-1 nexts from step 0 reach step N-1.
        for _ in 0..3 {
            fx.runner.next().await;
        }
        assert_eq!(fx.runner.position().await, Some((Page::Messages, 3)));

        fx.runner.previous().await;
        assert_eq!(fx.runner.position().await, Some((Page::Messages, 2)));
    }

    #[tokio::test]
    async fn double_start_keeps_one_overlay() {
        let fx = fixture(registry_with(Page::Inventory, info_steps(2)));
        fx.runner.start(Page::Inventory).await.unwrap();
        fx.runner.start(Page::Inventory).await.unwrap();
        assert_eq!(fx.presenter.overlay_count().await, 1);
    }

    #[tokio::test]
    async fn start_with_no_steps_is_a_noop() {
        let fx = fixture(StepRegistry::new());
        fx.runner.start(Page::Billing).await.unwrap();
        assert!(!fx.runner.is_running().await);
        assert_eq!(fx.presenter.overlay_count().await, 0);
    }

    #[tokio::test]
    async fn resume_reads_back_persisted_index() {
        let registry = registry_with(Page::Dashboard, info_steps(5));
        let fx = fixture(registry);

        // Simulate a prior session that stopped at step 3.
        fx.flags.set_tour_position(Page::Dashboard, 3).await;

        assert!(fx.runner.resume().await.unwrap());
        assert_eq!(fx.runner.position().await, Some((Page::Dashboard, 3)));
        // The index was re-read before any step executed.
        assert_eq!(fx.presenter.highlight_log().await, vec![3]);
    }

    #[tokio::test]
    async fn start_resumes_persisted_position_when_configured() {
        let fx = fixture_with_config(
            registry_with(Page::Dashboard, info_steps(5)),
            OnboardingConfig {
                resume_tours: true,
                ..Default::default()
            },
        );
        fx.flags.set_tour_position(Page::Dashboard, 2).await;

        fx.runner.start(Page::Dashboard).await.unwrap();
        assert_eq!(fx.runner.position().await, Some((Page::Dashboard, 2)));

        // A persisted position for a different page does not apply.
        fx.runner.destroy().await;
        fx.flags.set_tour_position(Page::Clients, 1).await;
        fx.runner.start(Page::Dashboard).await.unwrap();
        assert_eq!(fx.runner.position().await, Some((Page::Dashboard, 0)));
    }

    #[tokio::test]
    async fn completion_sets_dashboard_flags_and_emits_done() {
        let fx = fixture(registry_with(Page::Dashboard, info_steps(2)));
        let mut rx = fx.bus.watch();

        fx.runner.start(Page::Dashboard).await.unwrap();
        fx.runner.next().await;
        fx.runner.next().await; // past the last step

        assert!(!fx.runner.is_running().await);
        assert!(fx.flags.guide_done().await);
        assert_eq!(fx.flags.tour_page().await, None);
        assert_eq!(fx.presenter.overlay_count().await, 0);

        let mut saw_done = false;
        while let Ok(event) = rx.try_recv() {
            if event
                == (GuideEvent::PageDone {
                    page: Page::Dashboard,
                })
            {
                saw_done = true;
            }
        }
        assert!(saw_done, "PageDone should have been emitted");
    }

    #[tokio::test]
    async fn keyboard_maps_arrows_and_ignores_the_rest() {
        let fx = fixture(registry_with(Page::Clients, info_steps(3)));

        // No tour yet: keys pass through.
        assert!(!fx.runner.handle_key(Key::ArrowRight).await);

        fx.runner.start(Page::Clients).await.unwrap();
        assert!(fx.runner.handle_key(Key::ArrowRight).await);
        assert_eq!(fx.runner.position().await, Some((Page::Clients, 1)));
        assert!(fx.runner.handle_key(Key::ArrowLeft).await);
        assert_eq!(fx.runner.position().await, Some((Page::Clients, 0)));
        assert!(!fx.runner.handle_key(Key::Other).await);

        fx.runner.destroy().await;
        assert!(!fx.runner.handle_key(Key::ArrowRight).await);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_uses_the_configured_gate_timeout() {
        use std::time::Duration;

        let steps = vec![
            GuideStep::info("#client-link", "go", "").with_kind(StepKind::Navigate {
                page: Page::Clients,
                ready_timeout: None,
            }),
            GuideStep::centered("after", ""),
        ];
        // Never-ready page, short configured timeout.
        let runner = TourRunner::new(TourRunnerDeps {
            registry: Arc::new(registry_with(Page::Dashboard, steps)),
            presenter: Arc::new(HeadlessPresenter::new()),
            flags: Arc::new(FlagStore::new(
                Arc::new(MemoryScope::new()),
                Arc::new(MemoryScope::new()),
            )),
            bus: EventBus::new(),
            api: Arc::new(NullApi),
            page_ready_probe: Arc::new(|_| false),
            config: OnboardingConfig {
                gate: GateConfig {
                    default_timeout: Duration::from_millis(200),
                    ..Default::default()
                },
                ..Default::default()
            },
        });

        runner.start(Page::Dashboard).await.unwrap();
        let started = tokio::time::Instant::now();
        runner.next().await;
        let elapsed = started.elapsed();

        assert_eq!(runner.position().await, Some((Page::Dashboard, 1)));
        assert!(
            elapsed >= Duration::from_millis(200) && elapsed < Duration::from_millis(300),
            "navigate step should wait out the configured timeout, took {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn click_through_follows_the_active_step() {
        let steps = vec![
            GuideStep::centered("solid", ""),
            GuideStep::info("#form", "interactive", "").with_allow_clicks(),
        ];
        let fx = fixture(registry_with(Page::Messages, steps));

        fx.runner.start(Page::Messages).await.unwrap();
        assert!(!fx.presenter.click_through().await);
        fx.runner.next().await;
        assert!(fx.presenter.click_through().await);
    }

    #[tokio::test]
    async fn invalid_contact_blocks_finalize_advance() {
        let steps = vec![
            GuideStep::centered("email", "").with_kind(StepKind::ContactCapture {
                field: ContactField::Email,
                finalize: true,
            }),
        ];
        let fx = fixture(registry_with(Page::Dashboard, steps));

        fx.runner.start(Page::Dashboard).await.unwrap();
        fx.runner
            .update_contact(ContactField::Email, "not-an-email")
            .await;

        fx.runner.next().await;
        assert!(fx.runner.is_running().await, "advance should be blocked");
        assert_eq!(fx.runner.contact_errors().await, vec![FormError::InvalidEmail]);

        fx.runner
            .update_contact(ContactField::Email, "sam@example.com")
            .await;
        fx.runner.next().await;
        assert!(!fx.runner.is_running().await, "valid form should finish");
    }

    #[tokio::test]
    async fn failed_mount_rolls_up_and_leaves_no_overlay() {
        use crate::error::{Error, PresenterError};
        use crate::guide::presenter::ResolvedStep;

        struct BrokenPresenter {
            destroyed: AtomicBool,
        }

        #[async_trait::async_trait]
        impl Presenter for BrokenPresenter {
            async fn mount(
                &self,
                _page: Page,
                _steps: Vec<ResolvedStep>,
            ) -> std::result::Result<(), PresenterError> {
                Err(PresenterError::Mount("overlay library unavailable".into()))
            }
            async fn highlight(&self, _index: usize) -> std::result::Result<(), PresenterError> {
                Ok(())
            }
            async fn set_click_through(&self, _enabled: bool) {}
            async fn overlay_count(&self) -> usize {
                0
            }
            async fn remove_extra_overlays(&self) -> usize {
                0
            }
            async fn destroy(&self) {
                self.destroyed.store(true, Ordering::SeqCst);
            }
        }

        let presenter = Arc::new(BrokenPresenter {
            destroyed: AtomicBool::new(false),
        });
        let runner = TourRunner::new(TourRunnerDeps {
            registry: Arc::new(registry_with(Page::Dashboard, info_steps(2))),
            presenter: presenter.clone(),
            flags: Arc::new(FlagStore::new(
                Arc::new(MemoryScope::new()),
                Arc::new(MemoryScope::new()),
            )),
            bus: EventBus::new(),
            api: Arc::new(NullApi),
            page_ready_probe: Arc::new(|_| true),
            config: OnboardingConfig::default(),
        });

        let err = runner.start(Page::Dashboard).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Presenter(PresenterError::Mount(_))
        ));
        assert!(!runner.is_running().await);
        assert!(
            presenter.destroyed.load(Ordering::SeqCst),
            "failed mount must still tear the overlay down"
        );
    }

    #[tokio::test]
    async fn destroy_keeps_resume_position() {
        let fx = fixture(registry_with(Page::Dashboard, info_steps(4)));
        fx.runner.start(Page::Dashboard).await.unwrap();
        fx.runner.next().await;
        fx.runner.next().await;

        fx.runner.destroy().await;
        assert!(!fx.runner.is_running().await);
        assert_eq!(fx.flags.tour_page().await, Some(Page::Dashboard));
        assert_eq!(fx.flags.tour_step_index().await, 2);
    }

    #[tokio::test]
    async fn action_step_emits_its_event_on_advance() {
        let steps = vec![
            GuideStep::info("#import", "import", "").with_kind(StepKind::Action {
                event: GuideEvent::ContactImportRequested,
            }),
            GuideStep::centered("after", ""),
        ];
        let fx = fixture(registry_with(Page::Clients, steps));
        let mut rx = fx.bus.watch();

        fx.runner.start(Page::Clients).await.unwrap();
        fx.runner.next().await;

        let mut saw_import = false;
        while let Ok(event) = rx.try_recv() {
            if event == GuideEvent::ContactImportRequested {
                saw_import = true;
            }
        }
        assert!(saw_import);
    }
}
