use thiserror::Error;

/// Errors emitted while generating or writing records.
///
/// Rule violations and fallbacks never surface here; they are reported as
/// diagnostics on the [`crate::GenerationReport`].
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("unknown object: {0}")]
    UnknownObject(String),
    #[error("invalid suggestions: {0}")]
    InvalidSuggestions(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}
