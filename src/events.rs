//! Typed event bus for cross-view signaling and phase notifications.
//!
//! The engine coordinates independently-rendered views through named
//! events rather than direct calls. The event vocabulary is a closed enum
//! so every consumer match is checked for exhaustiveness at compile time.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use crate::guide::registry::Page;
use crate::orchestrator::state::Phase;

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Every event the onboarding core produces or consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuideEvent {
    /// A tour step asked the shell to route to another page.
    NavigateRequested { page: Page },
    /// The navigation gate resolved (by event, probe, or timeout).
    NavigateCompleted { page: Page },
    /// A page's tour started.
    PageStarted { page: Page, total: usize },
    /// The active step changed.
    StepChanged {
        page: Page,
        index: usize,
        title: String,
    },
    /// A page's tour completed naturally.
    PageDone { page: Page },
    /// The orchestrator entered a new phase.
    PhaseChanged { phase: Phase },
    /// A phase effect failed.
    OnboardingError { message: String },
    /// All onboarding state was reset.
    OnboardingReset,
    /// A page announced it has mounted and is safe to highlight.
    PageReady { page: Page },
    /// The shell should surface the billing prompt.
    BillingPromptRequested,
    /// The user skipped the contact import.
    ImportSkipped,
    /// A contact import finished, possibly with an error.
    ImportCompleted { error: Option<String> },
    /// A tour step pre-fills the AI assistant prompt box.
    PromptPrefill { prompt: String },
    /// A tour step requested the contact import dialog.
    ContactImportRequested,
}

type Listener = Box<dyn Fn(&GuideEvent) + Send + Sync>;

/// Synchronous publish/subscribe bus with an async broadcast mirror.
///
/// Listeners run in subscription order on the emitter's task. Each
/// invocation is individually isolated: a panicking listener cannot stop
/// delivery to the remaining listeners or reach the emitter. Async
/// consumers (the navigation gate's one-shot waits) use [`EventBus::watch`]
/// instead.
pub struct EventBus {
    listeners: Mutex<Vec<(u64, Arc<Listener>)>>,
    next_id: AtomicU64,
    tx: broadcast::Sender<GuideEvent>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            tx,
        })
    }

    /// Deliver an event to every listener, in subscription order, then to
    /// the broadcast mirror.
    pub fn emit(&self, event: GuideEvent) {
        let snapshot: Vec<(u64, Arc<Listener>)> = {
            let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners.clone()
        };
        for (id, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                warn!(listener_id = id, event = ?event, "Event listener panicked");
            }
        }
        // Broadcast — ok if no receivers are listening yet
        let _ = self.tx.send(event);
    }

    /// Register a synchronous listener. Dropping the returned subscription
    /// unsubscribes it.
    pub fn subscribe<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(&GuideEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let boxed: Arc<Listener> = Arc::new(Box::new(listener));
        {
            let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners.push((id, boxed));
        }
        Subscription {
            id,
            bus: Arc::downgrade(self),
        }
    }

    /// Subscribe to the async broadcast mirror of the bus.
    pub fn watch(&self) -> broadcast::Receiver<GuideEvent> {
        self.tx.subscribe()
    }

    fn unsubscribe(&self, id: u64) {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.retain(|(lid, _)| *lid != id);
    }
}

/// Handle for a registered listener; unsubscribes on drop.
pub struct Subscription {
    id: u64,
    bus: Weak<EventBus>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}
