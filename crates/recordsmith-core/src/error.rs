use thiserror::Error;

/// Core error type shared across recordsmith crates.
#[derive(Debug, Error)]
pub enum Error {
    /// The snapshot violates internal invariants.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
    /// The JSON Schema used to check a snapshot could not be compiled.
    #[error("json schema error: {0}")]
    Schema(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for results returned by recordsmith crates.
pub type Result<T> = std::result::Result<T, Error>;
