//! Guided onboarding / product-tour orchestration engine for the salon
//! business console.

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod flags;
pub mod gate;
pub mod guide;
pub mod orchestrator;

pub use api::{HttpOnboardingApi, NullApi, OnboardingApi};
pub use config::{GateConfig, OnboardingConfig};
pub use error::{EffectError, Error, Result};
pub use events::{EventBus, GuideEvent, Subscription};
pub use flags::{FlagScope, FlagStore, ForceResetOptions, LibSqlScope, MemoryScope};
pub use gate::{GateOutcome, NavigationGate, NavigationIntent};
pub use guide::{GuideStep, Page, StepKind, StepRegistry, TourRunner, TourRunnerDeps};
pub use orchestrator::{
    EffectContext, OnboardingState, Orchestrator, Phase, PhaseEffects, ResetOptions, StartOptions,
};
