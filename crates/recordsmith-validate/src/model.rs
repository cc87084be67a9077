use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_CACHE_CAPACITY;

/// Tuning knobs for [`crate::BatchPreValidator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreValidateOptions {
    /// Records per parallel chunk.
    pub chunk_size: usize,
    /// Batches larger than this are split into parallel chunks.
    pub parallel_threshold: usize,
    /// Batches larger than this are sampled instead of fully validated.
    pub sample_threshold: usize,
    pub sample_size: usize,
    /// Wall-clock budget; `None` disables the timeout.
    pub timeout_ms: Option<u64>,
    pub cache_capacity: usize,
    pub cache_ttl_secs: Option<u64>,
    /// Seed for sample selection.
    pub seed: u64,
}

impl Default for PreValidateOptions {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            parallel_threshold: 1_000,
            sample_threshold: 50_000,
            sample_size: 1_000,
            timeout_ms: Some(30_000),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl_secs: Some(300),
            seed: 42,
        }
    }
}

impl PreValidateOptions {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }
}

/// A rule violated by one record of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordViolation {
    pub record_index: u64,
    pub rule_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
    pub formula: String,
}

/// Proposed fix for a violation with a known field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub record_index: u64,
    pub field: String,
    pub current_value: String,
    pub suggested_value: String,
    pub confidence: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCategory {
    UnsupportedRule,
    Evaluation,
    Estimate,
    Performance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub category: WarningCategory,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

/// Extrapolation from a sampled batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationEstimate {
    pub population: u64,
    pub sampled_records: u64,
    pub sampled_violations: u64,
    pub sampled_invalid_records: u64,
    pub estimated_violations: u64,
    pub estimated_invalid_records: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceCounters {
    pub rules_evaluated: u64,
    pub records_processed: u64,
    pub records_total: u64,
    pub elapsed_ms: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub timed_out: bool,
}

/// Outcome of pre-validating a batch of candidate records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub violations: Vec<RecordViolation>,
    pub suggestions: Vec<Suggestion>,
    pub warnings: Vec<ValidationWarning>,
    pub unsupported_rules: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<ViolationEstimate>,
    pub performance: PerformanceCounters,
}

impl ValidationResult {
    pub fn empty() -> Self {
        Self {
            is_valid: true,
            violations: Vec::new(),
            suggestions: Vec::new(),
            warnings: Vec::new(),
            unsupported_rules: Vec::new(),
            estimate: None,
            performance: PerformanceCounters::default(),
        }
    }

    pub fn has_warning(&self, code: &str) -> bool {
        self.warnings.iter().any(|warning| warning.code == code)
    }
}
