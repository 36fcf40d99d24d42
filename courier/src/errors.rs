use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CourierError {
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Unparseable instruction: {0}")]
    UnparseableInstruction(String),

    #[error(
        "Timed out after {timeout:?} resolving {selector} (provider: {provider}, action #{index})"
    )]
    ResolutionTimeout {
        provider: String,
        index: usize,
        selector: String,
        timeout: Duration,
    },

    #[error("Interaction with {selector} failed (provider: {provider}, action #{index}): {cause}")]
    InteractionFailed {
        provider: String,
        index: usize,
        selector: String,
        cause: String,
    },

    #[error("Diagnostic capture failed: {0}")]
    DiagnosticCaptureFailed(String),

    #[error("Run cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Element is not visible: {0}")]
    ElementNotVisible(String),

    #[error("Element is not enabled: {0}")]
    ElementNotEnabled(String),

    #[error("Session error: {0}")]
    Platform(String),

    #[error("Invalid vocabulary: {0}")]
    InvalidVocabulary(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CourierError {
    /// Whether the error was raised before any UI interaction took place.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CourierError::UnsupportedProvider(_)
                | CourierError::UnparseableInstruction(_)
                | CourierError::InvalidVocabulary(_)
                | CourierError::Config(_)
        )
    }
}
