//! Configuration types.

use std::time::Duration;

/// Cross-page navigation gate configuration.
///
/// One default readiness timeout for every navigation; individual
/// `Navigate` steps may override it.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Interval between readiness-probe checks while waiting for a page.
    pub poll_interval: Duration,
    /// Maximum time to wait for page readiness before proceeding anyway.
    pub default_timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(120),
            default_timeout: Duration::from_secs(7),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Default)]
pub struct OnboardingConfig {
    /// Navigation gate settings.
    pub gate: GateConfig,
    /// Resume an interrupted tour at its persisted step index instead of
    /// restarting from step 0.
    pub resume_tours: bool,
}
