use chrono::NaiveDate;
use recordsmith_core::{
    Diagnostic, DiagnosticKind, FieldTypeMap, ObjectSchema, Record, RecordValue,
};
use recordsmith_formula::{
    EvalContext, Formula, blank_checked_fields, can_evaluate, is_truthy, unsupported_functions,
};
use recordsmith_plan::GenerationPlan;
use tracing::{debug, warn};

use crate::generators::fallback::fallback_for_step;
use crate::model::{RecordState, RepairOutcome, Violation};

#[derive(Debug, Clone)]
struct CompiledRule {
    id: String,
    message: String,
    formula: Formula,
    field: Option<String>,
}

/// Evaluates an object's active, evaluable rules against records.
#[derive(Debug, Clone)]
pub struct ViolationDetector {
    object: String,
    field_types: FieldTypeMap,
    ctx: EvalContext,
    rules: Vec<CompiledRule>,
    diagnostics: Vec<Diagnostic>,
}

impl ViolationDetector {
    pub fn new(object: &ObjectSchema, ctx: EvalContext) -> Self {
        let mut rules = Vec::new();
        let mut diagnostics = Vec::new();

        for rule in object.active_rules() {
            if !can_evaluate(&rule.formula) {
                let functions = unsupported_functions(&rule.formula).join(", ");
                warn!(
                    object = %object.name,
                    rule = %rule.id,
                    functions = %functions,
                    "rule uses unsupported functions; skipped"
                );
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::FormulaUnsupported,
                        format!("unsupported functions: {functions}"),
                    )
                    .with_object(&object.name)
                    .with_rule(&rule.id),
                );
                continue;
            }
            let formula = match Formula::parse(&rule.formula) {
                Ok(formula) => formula,
                Err(err) => {
                    warn!(
                        object = %object.name,
                        rule = %rule.id,
                        formula = %rule.formula,
                        error = %err,
                        "rule formula failed to parse; skipped"
                    );
                    diagnostics.push(
                        Diagnostic::new(DiagnosticKind::FormulaEvaluationFailure, err.to_string())
                            .with_object(&object.name)
                            .with_rule(&rule.id),
                    );
                    continue;
                }
            };
            let field = violation_field(object, rule.error_display_field.as_deref(), &formula);
            rules.push(CompiledRule {
                id: rule.id.clone(),
                message: rule.error_message.clone(),
                formula,
                field,
            });
        }

        debug!(object = %object.name, rules = rules.len(), skipped = diagnostics.len(), "detector ready");
        Self {
            object: object.name.clone(),
            field_types: object.field_type_map(),
            ctx,
            rules,
            diagnostics,
        }
    }

    /// Diagnostics for rules excluded at construction time.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn detect(&self, record: &Record) -> Vec<Violation> {
        self.detect_with_diagnostics(record).0
    }

    /// Like [`ViolationDetector::detect`], also returning a diagnostic for
    /// each rule whose evaluation failed (those count as not violated).
    pub fn detect_with_diagnostics(&self, record: &Record) -> (Vec<Violation>, Vec<Diagnostic>) {
        let mut violations = Vec::new();
        let mut diagnostics = Vec::new();
        for rule in &self.rules {
            match rule.formula.evaluate(record, &self.field_types, &self.ctx) {
                Ok(value) if is_truthy(&value) => violations.push(Violation {
                    rule_id: rule.id.clone(),
                    field: rule.field.clone(),
                    message: rule.message.clone(),
                    formula: rule.formula.source().to_string(),
                }),
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        object = %self.object,
                        rule = %rule.id,
                        formula = %rule.formula.source(),
                        error = %err,
                        "formula evaluation failed; treating as not violated"
                    );
                    diagnostics.push(
                        Diagnostic::new(DiagnosticKind::FormulaEvaluationFailure, err.to_string())
                            .with_object(&self.object)
                            .with_rule(&rule.id),
                    );
                }
            }
        }
        (violations, diagnostics)
    }
}

/// Field a violation is attributed to: the display field, else the field
/// the rule blank-checks, else its only referenced field.
pub fn violation_field(
    object: &ObjectSchema,
    display: Option<&str>,
    formula: &Formula,
) -> Option<String> {
    let generatable = |name: &str| {
        object
            .field(name)
            .filter(|field| field.is_generatable())
            .map(|field| field.name.clone())
    };
    if let Some(field) = display.and_then(generatable) {
        return Some(field);
    }
    let blank_checked: Vec<String> = blank_checked_fields(formula.expr())
        .iter()
        .filter_map(|name| generatable(name))
        .collect();
    if let [field] = blank_checked.as_slice() {
        return Some(field.clone());
    }
    let referenced: Vec<String> = formula
        .fields()
        .iter()
        .filter_map(|name| generatable(name))
        .collect();
    match referenced.as_slice() {
        [field] => Some(field.clone()),
        _ => None,
    }
}

/// Bounded field-local repair loop over a [`ViolationDetector`].
#[derive(Debug)]
pub struct Repairer<'a> {
    object: &'a ObjectSchema,
    detector: &'a ViolationDetector,
    max_attempts: u32,
    reference: NaiveDate,
}

impl<'a> Repairer<'a> {
    pub fn new(
        object: &'a ObjectSchema,
        detector: &'a ViolationDetector,
        max_attempts: u32,
        reference: NaiveDate,
    ) -> Self {
        Self {
            object,
            detector,
            max_attempts,
            reference,
        }
    }

    pub fn repair(&self, record: Record, plan: &GenerationPlan) -> RepairOutcome {
        let mut record = record;
        let mut state = RecordState::Generated;
        let (mut violations, mut diagnostics) = self.detector.detect_with_diagnostics(&record);
        state = advance(state, RecordState::Validated);

        if violations.is_empty() {
            return RepairOutcome {
                record,
                state: advance(state, RecordState::Accepted),
                attempts: 0,
                repaired_fields: Vec::new(),
                remaining: Vec::new(),
                diagnostics,
            };
        }

        let mut attempts = 0;
        let mut repaired_fields: Vec<String> = Vec::new();
        while !violations.is_empty() && attempts < self.max_attempts {
            let mut targets: Vec<String> = Vec::new();
            for field in violations.iter().filter_map(|violation| violation.field.clone()) {
                if !targets.contains(&field) {
                    targets.push(field);
                }
            }
            if targets.is_empty() {
                break;
            }
            for name in &targets {
                let Some(field) = self.object.field(name) else {
                    continue;
                };
                let value =
                    fallback_for_step(field, plan.step(name), &record, attempts, self.reference);
                record.insert(field.name.clone(), value);
                if !repaired_fields.contains(name) {
                    repaired_fields.push(name.clone());
                }
            }
            attempts += 1;
            state = advance(state, RecordState::Repaired);
            let (next, next_diagnostics) = self.detector.detect_with_diagnostics(&record);
            violations = next;
            diagnostics.extend(next_diagnostics);
            state = advance(state, RecordState::Validated);
        }

        if violations.is_empty() {
            debug!(object = %self.object.name, attempts, fields = ?repaired_fields, "record repaired");
            return RepairOutcome {
                record,
                state: advance(state, RecordState::Repaired),
                attempts,
                repaired_fields,
                remaining: Vec::new(),
                diagnostics,
            };
        }

        let rule_ids: Vec<&str> = violations.iter().map(|v| v.rule_id.as_str()).collect();
        warn!(
            object = %self.object.name,
            attempts,
            rules = ?rule_ids,
            "repair budget exhausted; emitting minimal fallback record"
        );
        diagnostics.push(
            Diagnostic::new(
                DiagnosticKind::RepairExhausted,
                format!(
                    "still violating {} after {attempts} attempts",
                    rule_ids.join(", ")
                ),
            )
            .with_object(&self.object.name),
        );
        let minimal = minimal_fallback_record(self.object, plan, self.reference);
        let remaining = self.detector.detect(&minimal);
        RepairOutcome {
            record: minimal,
            state: advance(state, RecordState::Flagged),
            attempts,
            repaired_fields,
            remaining,
            diagnostics,
        }
    }
}

fn advance(from: RecordState, to: RecordState) -> RecordState {
    debug_assert!(
        matches!(
            (from, to),
            (RecordState::Generated, RecordState::Validated)
                | (RecordState::Validated, RecordState::Accepted)
                | (RecordState::Validated, RecordState::Repaired)
                | (RecordState::Repaired, RecordState::Validated)
                | (RecordState::Validated, RecordState::Flagged)
        ),
        "invalid record transition {from:?} -> {to:?}"
    );
    to
}

/// Record with only required fields set, each to its first fallback value.
pub fn minimal_fallback_record(
    object: &ObjectSchema,
    plan: &GenerationPlan,
    reference: NaiveDate,
) -> Record {
    let mut record = Record::new();
    for step in &plan.steps {
        let Some(field) = object.field(&step.field) else {
            continue;
        };
        let value = if step.is_required() {
            fallback_for_step(field, Some(step), &record, 0, reference)
        } else {
            RecordValue::Null
        };
        record.insert(field.name.clone(), value);
    }
    record
}
