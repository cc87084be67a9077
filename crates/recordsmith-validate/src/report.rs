use std::collections::BTreeMap;

use crate::model::ValidationResult;

/// Render a deterministic markdown summary of a pre-validation run.
pub fn render_report(object: &str, result: &ValidationResult, max_examples: usize) -> String {
    let mut lines = Vec::new();
    let performance = &result.performance;

    lines.push("# Recordsmith Pre-Validation Report".to_string());
    lines.push(String::new());
    lines.push("## Run summary".to_string());
    lines.push(format!("- object: {object}"));
    lines.push(format!("- valid: {}", result.is_valid));
    lines.push(format!(
        "- records: {} processed of {}",
        performance.records_processed, performance.records_total
    ));
    lines.push(format!("- rules evaluated: {}", performance.rules_evaluated));
    lines.push(format!("- elapsed_ms: {}", performance.elapsed_ms));
    lines.push(format!(
        "- cache: {} hits / {} misses",
        performance.cache_hits, performance.cache_misses
    ));
    if performance.timed_out {
        lines.push("- timed out: partial results".to_string());
    }
    lines.push(String::new());

    lines.push("## Rule summary".to_string());
    lines.push("| rule | violations |".to_string());
    lines.push("| --- | --- |".to_string());
    let mut per_rule: BTreeMap<&str, u64> = BTreeMap::new();
    for violation in &result.violations {
        *per_rule.entry(violation.rule_id.as_str()).or_insert(0) += 1;
    }
    for (rule, count) in &per_rule {
        lines.push(format!("| {rule} | {count} |"));
    }
    for rule in &result.unsupported_rules {
        lines.push(format!("| {rule} | not evaluated |"));
    }
    lines.push(String::new());

    if let Some(estimate) = &result.estimate {
        lines.push("## Estimate".to_string());
        lines.push(format!(
            "- sampled {} of {} records",
            estimate.sampled_records, estimate.population
        ));
        lines.push(format!(
            "- estimated violations: {}",
            estimate.estimated_violations
        ));
        lines.push(format!(
            "- estimated invalid records: {}",
            estimate.estimated_invalid_records
        ));
        lines.push(String::new());
    }

    if !result.warnings.is_empty() {
        lines.push("## Warnings".to_string());
        for warning in &result.warnings {
            lines.push(format!("- {}: {}", warning.code, warning.message));
        }
        lines.push(String::new());
    }

    if !result.violations.is_empty() {
        lines.push("## Top violations".to_string());
        for violation in result.violations.iter().take(max_examples) {
            let field = violation
                .field
                .as_ref()
                .map(|field| format!(" [{field}]"))
                .unwrap_or_default();
            lines.push(format!(
                "- record {} {}{}: {}",
                violation.record_index, violation.rule_id, field, violation.message
            ));
        }
        lines.push(String::new());
    }

    if !result.suggestions.is_empty() {
        lines.push("## Suggestions".to_string());
        for suggestion in result.suggestions.iter().take(max_examples) {
            lines.push(format!(
                "- record {} {}: {:?} -> {:?} ({:.2})",
                suggestion.record_index,
                suggestion.field,
                suggestion.current_value,
                suggestion.suggested_value,
                suggestion.confidence
            ));
        }
        lines.push(String::new());
    }

    lines.push("## Recommendations".to_string());
    lines.extend(recommendations(result));
    lines.join("\n")
}

fn recommendations(result: &ValidationResult) -> Vec<String> {
    let mut lines = Vec::new();
    if !result.violations.is_empty() {
        lines.push("- regenerate or repair flagged records before inserting.".to_string());
    }
    if !result.unsupported_rules.is_empty() {
        lines.push("- rules not evaluated locally are still enforced by the store.".to_string());
    }
    if result.performance.timed_out {
        lines.push("- raise the timeout or validate in smaller batches.".to_string());
    }
    if result.estimate.is_some() {
        lines.push("- counts are extrapolated; validate fully before a bulk load.".to_string());
    }
    if lines.is_empty() {
        lines.push("- no violations detected.".to_string());
    }
    lines
}
