//! Phase orchestrator — sequences the six onboarding phases.
//!
//! The orchestrator knows nothing about tour mechanics, billing UI, or
//! navigation: each phase is an injected async effect, and the orchestrator
//! is pure sequencing plus state bookkeeping. That keeps it independently
//! testable with stub effects.

pub mod state;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EffectError;
use crate::events::{EventBus, GuideEvent};
use crate::flags::{FlagStore, ForceResetOptions};

pub use state::{OnboardingState, Phase};

/// Context handed to every phase effect.
#[derive(Debug, Clone, Copy)]
pub struct EffectContext {
    /// The run was forced (re-run despite completion flags).
    pub forced: bool,
}

/// An injected phase effect.
pub type Effect =
    Arc<dyn Fn(EffectContext) -> BoxFuture<'static, Result<(), EffectError>> + Send + Sync>;

/// Optional hook invoked once when a phase effect fails.
pub type ErrorHook = Arc<dyn Fn(EffectContext, EffectError) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap a plain async fn/closure as an [`Effect`].
pub fn effect<F, Fut>(f: F) -> Effect
where
    F: Fn(EffectContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), EffectError>> + Send + 'static,
{
    Arc::new(move |cx| f(cx).boxed())
}

/// Wrap a plain async fn/closure as an [`ErrorHook`].
pub fn error_hook<F, Fut>(f: F) -> ErrorHook
where
    F: Fn(EffectContext, EffectError) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |cx, err| f(cx, err).boxed())
}

/// The six injected effects, one per sequenced phase, plus the error hook.
#[derive(Clone)]
pub struct PhaseEffects {
    pub welcome: Effect,
    pub tour: Effect,
    pub billing: Effect,
    pub dashboard: Effect,
    pub quickstart: Effect,
    pub complete: Effect,
    pub on_error: Option<ErrorHook>,
}

impl PhaseEffects {
    /// All effects succeed immediately. Useful as a base for tests and the
    /// demo shell, overriding individual fields.
    pub fn noop() -> Self {
        let ok = effect(|_| async { Ok(()) });
        Self {
            welcome: ok.clone(),
            tour: ok.clone(),
            billing: ok.clone(),
            dashboard: ok.clone(),
            quickstart: ok.clone(),
            complete: ok,
            on_error: None,
        }
    }

    fn for_phase(&self, phase: Phase) -> Option<&Effect> {
        match phase {
            Phase::Welcome => Some(&self.welcome),
            Phase::Tour => Some(&self.tour),
            Phase::Billing => Some(&self.billing),
            Phase::Dashboard => Some(&self.dashboard),
            Phase::Quickstart => Some(&self.quickstart),
            Phase::Complete => Some(&self.complete),
            Phase::Idle | Phase::Error => None,
        }
    }
}

/// Options for [`Orchestrator::start`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StartOptions {
    /// Run the sequence even where completion flags would normally make
    /// individual effects skip their work.
    pub force: bool,
}

/// Options for [`Orchestrator::reset`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResetOptions {
    /// Also clear the server-side onboarding flags.
    pub reset_server_flags: bool,
}

type SharedRun = Shared<BoxFuture<'static, Result<(), EffectError>>>;

struct Inner {
    flags: Arc<FlagStore>,
    bus: Arc<EventBus>,
    effects: PhaseEffects,
    state_tx: watch::Sender<OnboardingState>,
    /// Monotonic run generation. A reset bumps it, so state writebacks from
    /// a superseded run are ignored rather than corrupting fresh state.
    generation: AtomicU64,
    /// The in-flight run, tagged with its generation so a superseded run
    /// settling late cannot evict a newer run from the slot.
    run: Mutex<Option<(u64, SharedRun)>>,
}

/// Top-level onboarding controller.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(flags: Arc<FlagStore>, bus: Arc<EventBus>, effects: PhaseEffects) -> Self {
        let (state_tx, _rx) = watch::channel(OnboardingState::default());
        Self {
            inner: Arc::new(Inner {
                flags,
                bus,
                effects,
                state_tx,
                generation: AtomicU64::new(0),
                run: Mutex::new(None),
            }),
        }
    }

    /// Run the six phases in order.
    ///
    /// Single-flight: if a sequence is already running, this awaits the
    /// same in-flight run and returns its result instead of starting a
    /// second one. A run superseded by [`Orchestrator::reset`] settles
    /// with an error to every caller awaiting it.
    pub async fn start(&self, opts: StartOptions) -> Result<(), EffectError> {
        let run = {
            let mut slot = self.inner.run.lock().await;
            match &*slot {
                Some((_, existing)) => existing.clone(),
                None => {
                    let inner = self.inner.clone();
                    let run_generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let forced = opts.force;
                    let fut: BoxFuture<'static, Result<(), EffectError>> = async move {
                        let result = run_sequence(&inner, run_generation, forced).await;
                        // Only this run's own slot entry may be cleared; a
                        // reset may already have installed a newer run here.
                        let mut slot = inner.run.lock().await;
                        if slot
                            .as_ref()
                            .is_some_and(|(generation, _)| *generation == run_generation)
                        {
                            *slot = None;
                        }
                        result
                    }
                    .boxed();
                    let shared = fut.shared();
                    *slot = Some((run_generation, shared.clone()));
                    shared
                }
            }
        };
        run.await
    }

    /// Clear all persisted flags (keeping the tenant id), forget any
    /// in-flight run, and return to the idle state.
    pub async fn reset(&self, opts: ResetOptions) {
        // Supersede any in-flight run; its remaining writebacks are stale.
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        *self.inner.run.lock().await = None;

        self.inner
            .flags
            .force_reset(ForceResetOptions {
                keep_tenant: true,
                reset_server_flags: opts.reset_server_flags,
            })
            .await;

        self.inner
            .state_tx
            .send_modify(|s| *s = OnboardingState::default());
        self.inner.bus.emit(GuideEvent::OnboardingReset);
        info!("Onboarding reset");
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> OnboardingState {
        self.inner.state_tx.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<OnboardingState> {
        self.inner.state_tx.subscribe()
    }
}

/// Write state only when the run is still current.
fn store_state(inner: &Inner, run_generation: u64, f: impl FnOnce(&mut OnboardingState)) {
    if inner.generation.load(Ordering::SeqCst) != run_generation {
        return;
    }
    inner.state_tx.send_modify(f);
}

async fn run_sequence(
    inner: &Arc<Inner>,
    run_generation: u64,
    forced: bool,
) -> Result<(), EffectError> {
    let run_id = Uuid::new_v4();
    info!(%run_id, forced, "Onboarding sequence starting");

    store_state(inner, run_generation, |s| {
        *s = OnboardingState {
            phase: Phase::Idle,
            forced,
            running: true,
            error: None,
        };
    });

    for phase in Phase::SEQUENCE {
        if inner.generation.load(Ordering::SeqCst) != run_generation {
            debug!(%run_id, "Run superseded by reset; abandoning sequence");
            return Err(EffectError::new("run superseded by reset"));
        }

        store_state(inner, run_generation, |s| s.phase = phase);
        inner.bus.emit(GuideEvent::PhaseChanged { phase });
        debug!(%run_id, %phase, "Phase starting");

        let Some(phase_effect) = inner.effects.for_phase(phase) else {
            continue;
        };
        if let Err(error) = phase_effect(EffectContext { forced }).await {
            warn!(%run_id, %phase, "Phase effect failed: {error}");
            store_state(inner, run_generation, |s| {
                s.phase = Phase::Error;
                s.running = false;
                s.error = Some(error.message.clone());
            });
            if let Some(hook) = &inner.effects.on_error {
                hook(EffectContext { forced }, error.clone()).await;
            }
            inner.bus.emit(GuideEvent::OnboardingError {
                message: error.message.clone(),
            });
            return Err(error);
        }
    }

    store_state(inner, run_generation, |s| s.running = false);
    info!(%run_id, "Onboarding sequence complete");
    Ok(())
}
