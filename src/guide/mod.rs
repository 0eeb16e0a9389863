//! Guided tour system — step registry, presentation seam, and the runner
//! that drives one page's steps through the overlay engine.

pub mod contact;
pub mod presenter;
pub mod registry;
pub mod runner;

pub use contact::{ContactDraft, ContactForm};
pub use presenter::{Anchor, HeadlessPresenter, Presenter, ResolvedStep};
pub use registry::{ContactField, GuideStep, Page, StepKind, StepRegistry};
pub use runner::{Key, TourRunner, TourRunnerDeps};
