use thiserror::Error;

/// Errors emitted while loading records for pre-validation.
///
/// Validation itself never fails; timeouts and unsupported rules are
/// reported as warnings on the [`crate::ValidationResult`].
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("invalid records: {0}")]
    InvalidRecords(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
