//! Rule-aware record generation.
//!
//! [`ValueGenerator`] executes a [`recordsmith_plan::GenerationPlan`] step
//! by step with a seeded RNG; [`ViolationDetector`] and [`Repairer`] check
//! each candidate against the object's validation rules and patch the
//! offending fields from a fixed fallback table. [`RecordPipeline`] ties
//! the two together and produces a [`GenerationReport`].

pub mod errors;
pub mod generators;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod repair;
pub mod suggestions;

pub use errors::GenerationError;
pub use generators::fallback::{fallback_value, placeholder_id};
pub use generators::{ValueGenerator, hash_record_seed};
pub use model::{
    FieldSuggestions, GenerateOptions, GenerationReport, RecordState, RecordSummary,
    RepairOutcome, Violation,
};
pub use output::csv::write_records_csv;
pub use output::json::{write_json, write_records_json};
pub use pipeline::{GenerationRun, RecordPipeline};
pub use repair::{Repairer, ViolationDetector, minimal_fallback_record, violation_field};
pub use suggestions::{RejectedSuggestion, SuggestionPool, parse_suggestions};
