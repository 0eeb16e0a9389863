//! Error types for the onboarding engine.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Effect error: {0}")]
    Effect(#[from] EffectError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Presenter error: {0}")]
    Presenter(#[from] PresenterError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Form error: {0}")]
    Form(#[from] FormError),
}

/// A phase effect failed.
///
/// This is the only error category allowed to change orchestrator-level
/// state; everything else is swallowed at its origin.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct EffectError {
    pub message: String,
}

impl EffectError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Flag-storage errors. Callers of `FlagStore` never see these — the store
/// degrades every failure to a logged no-op.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to open storage: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Presentation-layer errors (overlay engine).
#[derive(Debug, thiserror::Error)]
pub enum PresenterError {
    #[error("Failed to mount tour overlay: {0}")]
    Mount(String),

    #[error("Failed to highlight step {index}: {reason}")]
    Highlight { index: usize, reason: String },

    #[error("No tour is mounted")]
    NotMounted,
}

/// Backend API errors. All calls are fire-and-forget from the tour's
/// perspective; these are logged, never propagated as tour-breaking.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Server returned status {code}")]
    Status { code: u16 },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Contact-form validation errors, shown inline rather than raised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("Enter a valid email address")]
    InvalidEmail,

    #[error("Phone number must have 7-15 digits (got {digits})")]
    InvalidPhone { digits: usize },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
