use serde::{Deserialize, Serialize};

/// Class of best-effort fallback taken by the core.
///
/// None of these abort a run; each is surfaced as a [`Diagnostic`] next to
/// the best-effort result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Formula uses a function outside the supported set; rule skipped.
    FormulaUnsupported,
    /// Formula failed at parse or evaluation time; treated as not violated.
    FormulaEvaluationFailure,
    /// Circular field dependencies; declaration order used for the cycle.
    DependencyCycle,
    /// Malformed validity bitmap; permissive picklist mapping used.
    BitmapDecodeFailure,
    /// Record still violates rules after the retry budget, or no unused
    /// value fits one of its unique fields.
    RepairExhausted,
    /// Wall-clock budget exceeded; partial results returned.
    BatchTimeout,
}

impl DiagnosticKind {
    pub fn code(self) -> &'static str {
        match self {
            DiagnosticKind::FormulaUnsupported => "formula_unsupported",
            DiagnosticKind::FormulaEvaluationFailure => "formula_evaluation_failure",
            DiagnosticKind::DependencyCycle => "dependency_cycle",
            DiagnosticKind::BitmapDecodeFailure => "bitmap_decode_failure",
            DiagnosticKind::RepairExhausted => "repair_exhausted",
            DiagnosticKind::BatchTimeout => "batch_timeout",
        }
    }
}

/// Structured, inspectable record of a fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.code().to_string(),
            message: message.into(),
            object: None,
            field: None,
            rule_id: None,
        }
    }

    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }
}
