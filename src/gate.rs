//! Cross-page navigation gate.
//!
//! When a tour step needs the user on a different page, the engine asks
//! the shell to route there and must not advance until that page is
//! mounted. The gate races a one-shot readiness event against a bounded
//! DOM/state probe poll and a timeout. The timeout is a liveness fallback,
//! not an error — the tour proceeds optimistically rather than hanging.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::config::GateConfig;
use crate::events::{EventBus, GuideEvent};
use crate::guide::registry::Page;

/// One navigation wait. Never persisted.
#[derive(Debug, Clone, Copy)]
pub struct NavigationIntent {
    pub page: Page,
    /// Overrides `GateConfig::default_timeout` when set.
    pub timeout: Option<Duration>,
}

/// How the wait resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// The page announced readiness on the bus.
    Ready,
    /// The readiness probe observed the page mounted.
    Probed,
    /// Neither fired within the timeout; proceeding anyway.
    TimedOut,
}

/// Blocks tour advancement until a target page is ready (or the timeout
/// elapses).
pub struct NavigationGate {
    bus: Arc<EventBus>,
    config: GateConfig,
}

impl NavigationGate {
    pub fn new(bus: Arc<EventBus>, config: GateConfig) -> Self {
        Self { bus, config }
    }

    /// Request the route change and wait for readiness.
    ///
    /// `probe` is the page-specific "mounted and ready" predicate supplied
    /// by the shell; it is polled every `poll_interval`.
    pub async fn await_ready<F>(&self, intent: NavigationIntent, probe: F) -> GateOutcome
    where
        F: Fn() -> bool + Send,
    {
        // Subscribe before requesting the route so a synchronously-emitted
        // readiness event cannot be missed.
        let mut rx = self.bus.watch();
        self.bus.emit(GuideEvent::NavigateRequested { page: intent.page });

        let timeout = intent.timeout.unwrap_or(self.config.default_timeout);
        let deadline = tokio::time::Instant::now() + timeout;
        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut bus_open = true;

        let outcome = loop {
            tokio::select! {
                event = rx.recv(), if bus_open => match event {
                    Ok(GuideEvent::PageReady { page }) if page == intent.page => {
                        break GateOutcome::Ready;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Navigation gate lagged behind the bus");
                    }
                    Err(RecvError::Closed) => {
                        bus_open = false;
                    }
                },
                _ = poll.tick() => {
                    if probe() {
                        break GateOutcome::Probed;
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(page = %intent.page, ?timeout, "Page readiness timed out; proceeding");
                    break GateOutcome::TimedOut;
                }
            }
        };

        debug!(page = %intent.page, ?outcome, "Navigation gate resolved");
        self.bus.emit(GuideEvent::NavigateCompleted { page: intent.page });
        outcome
    }
}
