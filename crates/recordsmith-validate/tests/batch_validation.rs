use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use recordsmith_core::{
    FieldDescriptor, FieldType, ObjectSchema, Record, RecordValue, SchemaSnapshot, ValidationRule,
};
use recordsmith_formula::EvalContext;
use recordsmith_generate::{GenerateOptions, RecordPipeline};
use recordsmith_validate::{
    BatchPreValidator, Deadline, EvaluationCache, PreValidateOptions, SteppingClock,
    WarningCategory, render_report,
};

fn load_snapshot(name: &str) -> SchemaSnapshot {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join(format!("../../snapshots/examples/{name}"));
    let contents =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing json at {}", path.display()));
    serde_json::from_str(&contents).expect("parse snapshot")
}

fn reference() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 15).expect("date")
}

fn ctx() -> EvalContext {
    EvalContext::at_date(reference())
}

fn account_records(count: u64) -> (ObjectSchema, Vec<Record>) {
    let snapshot = load_snapshot("account.snapshot.json");
    let account = snapshot.objects[0].clone();
    let options = GenerateOptions {
        seed: 11,
        max_repair_attempts: 10,
        reference_date: Some(reference()),
    };
    let run = RecordPipeline::new(options).run(&account, count, None);
    (account, run.records)
}

fn task_object() -> ObjectSchema {
    ObjectSchema {
        name: "Task".to_string(),
        label: None,
        fields: vec![
            FieldDescriptor::new("Subject", FieldType::Text).required(),
            FieldDescriptor::new("Hours", FieldType::Integer),
        ],
        validation_rules: vec![
            ValidationRule::new("Subject_Required", "ISBLANK(Subject)", "Subject is required"),
            ValidationRule::new("Hours_Positive", "Hours <= 0", "Hours must be positive"),
        ],
    }
}

fn task(index: usize) -> Record {
    let mut record = Record::new();
    record.insert(
        "Subject".to_string(),
        RecordValue::Text(format!("Task {}", index % 50)),
    );
    let hours = if index % 4 == 0 { 0 } else { (index % 8) as i64 };
    record.insert("Hours".to_string(), RecordValue::Int(hours));
    record
}

#[test]
fn zero_records_are_valid_without_warnings() {
    let (account, _) = account_records(0);
    let validator = BatchPreValidator::with_options(PreValidateOptions::default());
    let result = validator.validate(&[], &account, &ctx(), &Deadline::unbounded());

    assert!(result.is_valid);
    assert!(result.violations.is_empty());
    assert!(result.warnings.is_empty());
    assert_eq!(result.performance.records_total, 0);
}

#[test]
fn reports_violations_with_suggestions() {
    let (account, mut records) = account_records(20);
    let mut broken = Record::new();
    broken.insert("Name".to_string(), RecordValue::Text("Broken Co".to_string()));
    broken.insert("Type".to_string(), RecordValue::Text("Customer".to_string()));
    broken.insert("Industry".to_string(), RecordValue::Null);
    broken.insert("AnnualRevenue".to_string(), RecordValue::Decimal(-5.0));
    records.push(broken);

    let validator = BatchPreValidator::with_options(PreValidateOptions::default());
    let result = validator.validate(&records, &account, &ctx(), &Deadline::unbounded());

    assert!(!result.is_valid);
    let rules: Vec<(u64, &str)> = result
        .violations
        .iter()
        .map(|v| (v.record_index, v.rule_id.as_str()))
        .collect();
    assert_eq!(
        rules,
        vec![(20, "Customer_Needs_Industry"), (20, "Revenue_Not_Negative")]
    );

    let industry = result
        .suggestions
        .iter()
        .find(|s| s.field == "Industry")
        .expect("industry suggestion");
    assert_eq!(industry.current_value, "");
    assert_eq!(industry.suggested_value, "Banking");
    assert!(industry.confidence > 0.8);

    let revenue = result
        .suggestions
        .iter()
        .find(|s| s.field == "AnnualRevenue")
        .expect("revenue suggestion");
    assert_eq!(revenue.current_value, "-5");
    assert!(revenue.confidence < industry.confidence);

    assert!(result.unsupported_rules.is_empty());
    assert_eq!(result.performance.records_processed, 21);
    assert_eq!(result.performance.rules_evaluated, 21 * 3);

    let report = render_report(&account.name, &result, 10);
    assert!(report.starts_with("# Recordsmith Pre-Validation Report"));
    assert!(report.contains("| Customer_Needs_Industry | 1 |"));
}

#[test]
fn second_pass_is_served_from_cache() {
    let (account, records) = account_records(20);
    let cache = Arc::new(EvaluationCache::new(10_000, Some(Duration::from_secs(300))));
    let validator = BatchPreValidator::new(PreValidateOptions::default(), cache.clone());

    let first = validator.validate(&records, &account, &ctx(), &Deadline::unbounded());
    let second = validator.validate(&records, &account, &ctx(), &Deadline::unbounded());

    assert!(first.performance.cache_misses > 0);
    assert_eq!(second.performance.cache_misses, 0);
    assert_eq!(second.performance.cache_hits, second.performance.rules_evaluated);
    assert_eq!(first.violations, second.violations);
}

#[test]
fn unsupported_rules_are_listed_and_warned() {
    let (mut account, records) = account_records(5);
    account.validation_rules.push(ValidationRule::new(
        "Near_Office",
        "DISTANCE(BillingAddress, GEOLOCATION(1, 2), \"km\") > 10",
        "Too far",
    ));

    let validator = BatchPreValidator::with_options(PreValidateOptions::default());
    let result = validator.validate(&records, &account, &ctx(), &Deadline::unbounded());

    assert_eq!(result.unsupported_rules, vec!["Near_Office".to_string()]);
    assert!(result.has_warning("formula_unsupported"));
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.category == WarningCategory::UnsupportedRule)
    );
}

#[test]
fn large_batch_times_out_with_partial_results() {
    let object = task_object();
    let records: Vec<Record> = (0..10_000).map(task).collect();
    let validator = BatchPreValidator::with_options(PreValidateOptions::default());
    let deadline = Deadline::new(
        Arc::new(SteppingClock::new(1)),
        Some(Duration::from_secs(2)),
    );

    let result = validator.validate(&records, &object, &ctx(), &deadline);

    assert!(result.performance.timed_out);
    assert!(result.has_warning("batch_timeout"));
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.category == WarningCategory::Performance)
    );
    assert!(!result.is_valid);
    let processed = result.performance.records_processed;
    assert!(processed > 0 && processed < 10_000, "processed {processed}");
    assert!(result.violations.len() as u64 <= processed);
    assert_eq!(result.performance.records_total, 10_000);
}

#[test]
fn very_large_batches_are_sampled() {
    let object = task_object();
    let records: Vec<Record> = (0..5_000).map(task).collect();
    let options = PreValidateOptions {
        sample_threshold: 1_000,
        sample_size: 200,
        ..PreValidateOptions::default()
    };

    let first = BatchPreValidator::with_options(options.clone()).validate(
        &records,
        &object,
        &ctx(),
        &Deadline::unbounded(),
    );
    let second = BatchPreValidator::with_options(options).validate(
        &records,
        &object,
        &ctx(),
        &Deadline::unbounded(),
    );

    let estimate = first.estimate.clone().expect("estimate");
    assert_eq!(estimate.population, 5_000);
    assert_eq!(estimate.sampled_records, 200);
    assert_eq!(
        estimate.estimated_invalid_records,
        estimate.sampled_invalid_records * 25
    );
    assert!(first.has_warning("sampled_estimate"));
    assert_eq!(first.performance.records_processed, 200);
    assert_eq!(first.estimate, second.estimate);
    assert!(first.violations.iter().all(|v| v.rule_id == "Hours_Positive"));
}

#[test]
fn edited_rules_and_other_objects_miss_the_shared_cache() {
    let cache = Arc::new(EvaluationCache::default());
    let validator = BatchPreValidator::new(PreValidateOptions::default(), Arc::clone(&cache));
    let records = vec![task(0)];

    let mut object = task_object();
    let before = validator.validate(&records, &object, &ctx(), &Deadline::unbounded());
    assert_eq!(before.violations.len(), 1);
    assert_eq!(before.violations[0].rule_id, "Hours_Positive");

    object.validation_rules[1].formula = "Hours > 100".to_string();
    let after = validator.validate(&records, &object, &ctx(), &Deadline::unbounded());
    assert!(after.is_valid);
    assert!(after.violations.is_empty());

    let mut expense = task_object();
    expense.name = "Expense".to_string();
    expense.validation_rules[1].formula = "Hours > 100".to_string();
    object.validation_rules[1].formula = "Hours <= 0".to_string();
    let again = validator.validate(&records, &object, &ctx(), &Deadline::unbounded());
    assert_eq!(again.violations.len(), 1);
    let other = validator.validate(&records, &expense, &ctx(), &Deadline::unbounded());
    assert!(other.violations.is_empty());
    assert_eq!(other.performance.cache_hits, 0);
}
