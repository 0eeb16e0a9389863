//! Onboarding phase state machine.

use serde::{Deserialize, Serialize};

/// Top-level onboarding phases.
///
/// A run progresses linearly: Welcome → Tour → Billing → Dashboard →
/// Quickstart → Complete. `Idle` is the rest state before a run (and after
/// a reset); `Error` is entered when a phase effect fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Welcome,
    Tour,
    Billing,
    Dashboard,
    Quickstart,
    Complete,
    Error,
}

impl Phase {
    /// The six phases a run executes, in order. Each has an injected effect.
    pub const SEQUENCE: [Phase; 6] = [
        Phase::Welcome,
        Phase::Tour,
        Phase::Billing,
        Phase::Dashboard,
        Phase::Quickstart,
        Phase::Complete,
    ];

    /// The next phase in the linear progression, if any.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Idle => Some(Phase::Welcome),
            Phase::Welcome => Some(Phase::Tour),
            Phase::Tour => Some(Phase::Billing),
            Phase::Billing => Some(Phase::Dashboard),
            Phase::Dashboard => Some(Phase::Quickstart),
            Phase::Quickstart => Some(Phase::Complete),
            Phase::Complete | Phase::Error => None,
        }
    }

    /// Whether this phase ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Error)
    }
}

impl Default for Phase {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Welcome => "welcome",
            Self::Tour => "tour",
            Self::Billing => "billing",
            Self::Dashboard => "dashboard",
            Self::Quickstart => "quickstart",
            Self::Complete => "complete",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Snapshot of the orchestrator's state.
///
/// `running` is true for the entire duration from `start()` until the
/// terminal phase is reached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnboardingState {
    pub phase: Phase,
    pub forced: bool,
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
