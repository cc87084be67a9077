use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rand::SeedableRng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use recordsmith_core::{DiagnosticKind, FieldTypeMap, ObjectSchema, Record, RecordValue};
use recordsmith_formula::{EvalContext, Formula, can_evaluate, is_truthy, unsupported_functions};
use recordsmith_generate::{fallback_value, violation_field};
use tracing::{debug, info, warn};

use crate::cache::{EvaluationCache, cache_key};
use crate::clock::Deadline;
use crate::model::{
    PerformanceCounters, PreValidateOptions, RecordViolation, Suggestion, ValidationResult,
    ValidationWarning, ViolationEstimate, WarningCategory,
};

const SAMPLED_ESTIMATE: &str = "sampled_estimate";

struct PreparedRule {
    id: String,
    message: String,
    formula: Formula,
    field: Option<String>,
}

#[derive(Default)]
struct ChunkOutcome {
    violations: Vec<RecordViolation>,
    processed: u64,
    rules_evaluated: u64,
    timed_out: bool,
    /// Rule id to first evaluation error.
    failures: BTreeMap<String, String>,
}

impl ChunkOutcome {
    fn merge(&mut self, other: ChunkOutcome) {
        self.violations.extend(other.violations);
        self.processed += other.processed;
        self.rules_evaluated += other.rules_evaluated;
        self.timed_out |= other.timed_out;
        for (rule, error) in other.failures {
            self.failures.entry(rule).or_insert(error);
        }
    }
}

/// Checks whole batches of candidate records against an object's rules.
#[derive(Debug, Clone)]
pub struct BatchPreValidator {
    options: PreValidateOptions,
    cache: Arc<EvaluationCache>,
}

impl BatchPreValidator {
    pub fn new(options: PreValidateOptions, cache: Arc<EvaluationCache>) -> Self {
        Self { options, cache }
    }

    /// Validator with a fresh cache sized from `options`.
    pub fn with_options(options: PreValidateOptions) -> Self {
        let cache = Arc::new(EvaluationCache::new(
            options.cache_capacity,
            options.cache_ttl(),
        ));
        Self::new(options, cache)
    }

    pub fn options(&self) -> &PreValidateOptions {
        &self.options
    }

    pub fn cache(&self) -> &Arc<EvaluationCache> {
        &self.cache
    }

    pub fn validate(
        &self,
        records: &[Record],
        object: &ObjectSchema,
        ctx: &EvalContext,
        deadline: &Deadline,
    ) -> ValidationResult {
        if records.is_empty() {
            return ValidationResult::empty();
        }

        let mut result = ValidationResult::empty();
        let (rules, unsupported) = prepare_rules(object);
        for (rule_id, functions) in &unsupported {
            warn!(object = %object.name, rule = %rule_id, functions = %functions, "rule skipped");
            result.warnings.push(ValidationWarning {
                category: WarningCategory::UnsupportedRule,
                code: DiagnosticKind::FormulaUnsupported.code().to_string(),
                message: format!("rule {rule_id} is not evaluated locally: {functions}"),
                rule_id: Some(rule_id.clone()),
            });
        }
        result.unsupported_rules = unsupported.into_iter().map(|(rule_id, _)| rule_id).collect();

        let total = records.len();
        let sampled = total > self.options.sample_threshold;
        let indices: Vec<usize> = if sampled {
            let amount = self.options.sample_size.min(total);
            let mut rng = ChaCha8Rng::seed_from_u64(self.options.seed);
            let mut picked = index::sample(&mut rng, total, amount).into_vec();
            picked.sort_unstable();
            picked
        } else {
            (0..total).collect()
        };

        let hits_before = self.cache.hits();
        let misses_before = self.cache.misses();
        let field_types = object.field_type_map();
        let job = ChunkJob {
            object,
            records,
            rules: &rules,
            field_types: &field_types,
            ctx,
            cache: &self.cache,
            deadline,
        };

        info!(
            object = %object.name,
            records = total,
            evaluated = indices.len(),
            rules = rules.len(),
            sampled,
            "pre-validation started"
        );

        let outcome = if indices.len() <= self.options.parallel_threshold {
            job.run(&indices)
        } else {
            let chunk_size = self.options.chunk_size.max(1);
            debug!(chunk_size, chunks = indices.len().div_ceil(chunk_size), "validating in parallel");
            indices
                .par_chunks(chunk_size)
                .map(|chunk| job.run(chunk))
                .collect::<Vec<_>>()
                .into_iter()
                .fold(ChunkOutcome::default(), |mut acc, chunk| {
                    acc.merge(chunk);
                    acc
                })
        };

        for (rule_id, error) in &outcome.failures {
            result.warnings.push(ValidationWarning {
                category: WarningCategory::Evaluation,
                code: DiagnosticKind::FormulaEvaluationFailure.code().to_string(),
                message: format!("rule {rule_id} failed to evaluate and was treated as passing: {error}"),
                rule_id: Some(rule_id.clone()),
            });
        }

        if sampled {
            let estimate = extrapolate(&outcome, total as u64);
            result.warnings.push(ValidationWarning {
                category: WarningCategory::Estimate,
                code: SAMPLED_ESTIMATE.to_string(),
                message: format!(
                    "validated a sample of {} of {total} records; violation counts are estimates",
                    outcome.processed
                ),
                rule_id: None,
            });
            result.estimate = Some(estimate);
        }

        if outcome.timed_out {
            let budget = deadline.budget_ms().unwrap_or_default();
            warn!(
                object = %object.name,
                processed = outcome.processed,
                total,
                budget_ms = budget,
                "pre-validation timed out; returning partial results"
            );
            result.warnings.push(ValidationWarning {
                category: WarningCategory::Performance,
                code: DiagnosticKind::BatchTimeout.code().to_string(),
                message: format!(
                    "processed {} of {} records before the {budget} ms budget ran out",
                    outcome.processed,
                    indices.len()
                ),
                rule_id: None,
            });
        }

        let mut violations = outcome.violations;
        violations.sort_by_key(|violation| violation.record_index);
        result.suggestions = suggestions_for(&violations, records, object, ctx);
        result.is_valid = violations.is_empty() && !outcome.timed_out;
        result.violations = violations;
        result.performance = PerformanceCounters {
            rules_evaluated: outcome.rules_evaluated,
            records_processed: outcome.processed,
            records_total: total as u64,
            elapsed_ms: deadline.elapsed_ms(),
            cache_hits: self.cache.hits().saturating_sub(hits_before),
            cache_misses: self.cache.misses().saturating_sub(misses_before),
            timed_out: outcome.timed_out,
        };

        info!(
            object = %object.name,
            valid = result.is_valid,
            violations = result.violations.len(),
            processed = result.performance.records_processed,
            "pre-validation finished"
        );
        result
    }
}

struct ChunkJob<'a> {
    object: &'a ObjectSchema,
    records: &'a [Record],
    rules: &'a [PreparedRule],
    field_types: &'a FieldTypeMap,
    ctx: &'a EvalContext,
    cache: &'a EvaluationCache,
    deadline: &'a Deadline,
}

impl ChunkJob<'_> {
    fn run(&self, indices: &[usize]) -> ChunkOutcome {
        let mut outcome = ChunkOutcome::default();
        for &index in indices {
            if self.deadline.is_expired() {
                outcome.timed_out = true;
                break;
            }
            let record = &self.records[index];
            for rule in self.rules {
                outcome.rules_evaluated += 1;
                let key = cache_key(&self.object.name, &rule.id, &rule.formula, record, self.ctx);
                let violated = self.cache.get_or_compute(key, || {
                    match rule.formula.evaluate(record, self.field_types, self.ctx) {
                        Ok(value) => is_truthy(&value),
                        Err(err) => {
                            warn!(
                                object = %self.object.name,
                                rule = %rule.id,
                                formula = %rule.formula.source(),
                                error = %err,
                                "formula evaluation failed; treating as not violated"
                            );
                            outcome
                                .failures
                                .entry(rule.id.clone())
                                .or_insert_with(|| err.to_string());
                            false
                        }
                    }
                });
                if violated {
                    outcome.violations.push(RecordViolation {
                        record_index: index as u64,
                        rule_id: rule.id.clone(),
                        field: rule.field.clone(),
                        message: rule.message.clone(),
                        formula: rule.formula.source().to_string(),
                    });
                }
            }
            outcome.processed += 1;
        }
        outcome
    }
}

/// Active rules split into evaluable ones and `(rule id, reason)` for the
/// rest.
fn prepare_rules(object: &ObjectSchema) -> (Vec<PreparedRule>, Vec<(String, String)>) {
    let mut rules = Vec::new();
    let mut unsupported = Vec::new();
    for rule in object.active_rules() {
        if !can_evaluate(&rule.formula) {
            let functions = unsupported_functions(&rule.formula);
            let reason = if functions.is_empty() {
                "formula does not parse".to_string()
            } else {
                format!("unsupported functions {}", functions.join(", "))
            };
            unsupported.push((rule.id.clone(), reason));
            continue;
        }
        let Ok(formula) = Formula::parse(&rule.formula) else {
            unsupported.push((rule.id.clone(), "formula does not parse".to_string()));
            continue;
        };
        let field = violation_field(object, rule.error_display_field.as_deref(), &formula);
        rules.push(PreparedRule {
            id: rule.id.clone(),
            message: rule.error_message.clone(),
            formula,
            field,
        });
    }
    (rules, unsupported)
}

fn extrapolate(outcome: &ChunkOutcome, population: u64) -> ViolationEstimate {
    let sampled_records = outcome.processed;
    let sampled_violations = outcome.violations.len() as u64;
    let sampled_invalid_records = outcome
        .violations
        .iter()
        .map(|violation| violation.record_index)
        .collect::<BTreeSet<_>>()
        .len() as u64;
    let scale = |count: u64| {
        if sampled_records == 0 {
            0
        } else {
            ((count as f64 / sampled_records as f64) * population as f64).round() as u64
        }
    };
    ViolationEstimate {
        population,
        sampled_records,
        sampled_violations,
        sampled_invalid_records,
        estimated_violations: scale(sampled_violations),
        estimated_invalid_records: scale(sampled_invalid_records),
    }
}

/// One suggestion per (record, field): the field's first fallback value.
/// Blank fields flagged by a rule get high confidence.
fn suggestions_for(
    violations: &[RecordViolation],
    records: &[Record],
    object: &ObjectSchema,
    ctx: &EvalContext,
) -> Vec<Suggestion> {
    let mut seen = BTreeSet::new();
    let mut suggestions = Vec::new();
    for violation in violations {
        let Some(field_name) = &violation.field else {
            continue;
        };
        let Some(field) = object.field(field_name) else {
            continue;
        };
        if !seen.insert((violation.record_index, field.name.clone())) {
            continue;
        }
        let current = records
            .get(violation.record_index as usize)
            .and_then(|record| record.get(&field.name))
            .cloned()
            .unwrap_or(RecordValue::Null);
        let suggested = fallback_value(field, 0, ctx.today());
        if suggested.is_blank() || suggested == current {
            continue;
        }
        let confidence = if current.is_blank() { 0.9 } else { 0.5 };
        suggestions.push(Suggestion {
            record_index: violation.record_index,
            field: field.name.clone(),
            current_value: current.to_field_string(),
            suggested_value: suggested.to_field_string(),
            confidence,
            reason: format!("{}: {}", violation.rule_id, violation.message),
        });
    }
    suggestions
}
