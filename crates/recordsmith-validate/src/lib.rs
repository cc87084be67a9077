//! Batch pre-validation of candidate records.
//!
//! Runs every evaluable rule over a batch, sequentially for small batches
//! and in parallel chunks for large ones, sampling very large batches and
//! honoring a cooperative deadline. Outcomes are cached per rule and
//! relevant field values in a shared [`EvaluationCache`].

pub mod cache;
pub mod clock;
pub mod errors;
pub mod model;
pub mod records;
pub mod report;
pub mod validator;

pub use cache::{DEFAULT_CACHE_CAPACITY, EvaluationCache, cache_key};
pub use clock::{Clock, Deadline, SteppingClock, SystemClock};
pub use errors::ValidateError;
pub use model::{
    PerformanceCounters, PreValidateOptions, RecordViolation, Suggestion, ValidationResult,
    ValidationWarning, ViolationEstimate, WarningCategory,
};
pub use records::{load_records, parse_records};
pub use report::render_report;
pub use validator::BatchPreValidator;
