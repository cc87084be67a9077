use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use recordsmith_core::{Diagnostic, Record};
use recordsmith_formula::EvalContext;
use serde::{Deserialize, Serialize};

/// Advisory candidate values per field, as produced by an external
/// suggestion service (`{ "Field": ["value", ...] }`).
pub type FieldSuggestions = BTreeMap<String, Vec<String>>;

/// Options for record generation and repair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    /// Base seed; each record derives its own RNG from it.
    pub seed: u64,
    /// Maximum repair attempts before a record is flagged.
    pub max_repair_attempts: u32,
    /// Anchor for date heuristics and `TODAY()`; defaults to the current
    /// UTC date.
    pub reference_date: Option<NaiveDate>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            seed: 42,
            max_repair_attempts: 10,
            reference_date: None,
        }
    }
}

impl GenerateOptions {
    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Utc::now().date_naive())
    }

    pub fn eval_context(&self) -> EvalContext {
        EvalContext::at_date(self.reference_date())
    }
}

/// Lifecycle of a candidate record through detection and repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Generated,
    Validated,
    Accepted,
    Repaired,
    Flagged,
}

/// One violated rule on one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    /// Field to repair; `None` when it cannot be attributed.
    pub field: Option<String>,
    pub message: String,
    pub formula: String,
}

/// Result of running one record through the repair loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairOutcome {
    pub record: Record,
    pub state: RecordState,
    pub attempts: u32,
    pub repaired_fields: Vec<String>,
    /// Violations still present on the returned record.
    pub remaining: Vec<Violation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Per-record summary kept in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub index: u64,
    pub state: RecordState,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repaired_fields: Vec<String>,
}

/// Report for a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub run_id: String,
    pub object: String,
    pub plan_fingerprint: String,
    pub records_requested: u64,
    pub records_generated: u64,
    pub accepted: u64,
    pub repaired: u64,
    pub flagged: u64,
    pub retries_total: u64,
    pub fallback_count: u64,
    pub suggestions_used: u64,
    pub suggestions_rejected: u64,
    pub heuristic_usage: BTreeMap<String, u64>,
    pub warnings_by_code: BTreeMap<String, u64>,
    pub warnings: Vec<Diagnostic>,
    pub records: Vec<RecordSummary>,
}

impl GenerationReport {
    pub fn new(run_id: String, object: &str, plan_fingerprint: &str) -> Self {
        Self {
            run_id,
            object: object.to_string(),
            plan_fingerprint: plan_fingerprint.to_string(),
            records_requested: 0,
            records_generated: 0,
            accepted: 0,
            repaired: 0,
            flagged: 0,
            retries_total: 0,
            fallback_count: 0,
            suggestions_used: 0,
            suggestions_rejected: 0,
            heuristic_usage: BTreeMap::new(),
            warnings_by_code: BTreeMap::new(),
            warnings: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn record_heuristic(&mut self, id: &str, count: u64) {
        *self.heuristic_usage.entry(id.to_string()).or_insert(0) += count;
    }

    pub fn record_warning(&mut self, diagnostic: Diagnostic) {
        *self
            .warnings_by_code
            .entry(diagnostic.code.clone())
            .or_insert(0) += 1;
        self.warnings.push(diagnostic);
    }

    pub fn record_outcome(&mut self, index: u64, outcome: &RepairOutcome) {
        self.records_generated += 1;
        match outcome.state {
            RecordState::Repaired => self.repaired += 1,
            RecordState::Flagged => self.flagged += 1,
            _ => self.accepted += 1,
        }
        self.retries_total += u64::from(outcome.attempts);
        self.fallback_count += outcome.repaired_fields.len() as u64;
        for diagnostic in &outcome.diagnostics {
            self.record_warning(diagnostic.clone());
        }
        self.records.push(RecordSummary {
            index,
            state: outcome.state,
            attempts: outcome.attempts,
            repaired_fields: outcome.repaired_fields.clone(),
        });
    }
}
