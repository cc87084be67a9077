use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use recordsmith_core::{
    DiagnosticKind, FieldDescriptor, FieldType, ObjectSchema, Record, RecordValue, SchemaSnapshot,
};
use recordsmith_generate::{
    GenerateOptions, RecordPipeline, RecordState, Repairer, ViolationDetector, write_records_csv,
};
use recordsmith_plan::PlanCache;

fn load_snapshot(name: &str) -> SchemaSnapshot {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join(format!("../../snapshots/examples/{name}"));
    let contents =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing json at {}", path.display()));
    serde_json::from_str(&contents).expect("parse snapshot")
}

fn first_object(snapshot: &SchemaSnapshot) -> &ObjectSchema {
    snapshot.objects.first().expect("object")
}

fn options(seed: u64) -> GenerateOptions {
    GenerateOptions {
        seed,
        max_repair_attempts: 10,
        reference_date: NaiveDate::from_ymd_opt(2024, 6, 15),
    }
}

fn text(value: &str) -> RecordValue {
    RecordValue::Text(value.to_string())
}

#[test]
fn account_records_pass_every_active_rule() {
    let snapshot = load_snapshot("account.snapshot.json");
    let account = first_object(&snapshot);
    let mut pipeline = RecordPipeline::new(options(42));
    let run = pipeline.run(account, 200, None);

    assert_eq!(run.records.len(), 200);
    assert_eq!(run.report.records_generated, 200);
    assert_eq!(run.report.flagged, 0);
    assert_eq!(run.report.accepted + run.report.repaired, 200);

    let detector = ViolationDetector::new(account, options(42).eval_context());
    for record in &run.records {
        assert!(detector.detect(record).is_empty(), "violations in {record:?}");
        assert!(!record.contains_key("Id"));
        assert!(!record.contains_key("Rating_Score__c"));
        assert!(!record["Name"].is_blank());
    }
}

#[test]
fn dependent_state_follows_country() {
    let snapshot = load_snapshot("account.snapshot.json");
    let account = first_object(&snapshot);
    let run = RecordPipeline::new(options(9)).run(account, 100, None);

    let mut countries = Vec::new();
    for record in &run.records {
        let (RecordValue::Text(country), RecordValue::Text(state)) =
            (&record["BillingCountry"], &record["BillingState"])
        else {
            panic!("country and state should both be set: {record:?}");
        };
        let allowed: &[&str] = match country.as_str() {
            "AU" => &["NSW", "VIC"],
            "US" => &["CA", "NY"],
            other => panic!("unexpected country {other}"),
        };
        assert!(allowed.contains(&state.as_str()), "{country}/{state}");
        countries.push(country.clone());
    }
    assert!(countries.iter().any(|c| c == "AU"));
    assert!(countries.iter().any(|c| c == "US"));
}

#[test]
fn customer_without_industry_is_repaired() {
    let snapshot = load_snapshot("account.snapshot.json");
    let account = first_object(&snapshot);
    let plan = PlanCache::new().plan_for(account);
    let detector = ViolationDetector::new(account, options(1).eval_context());

    let mut record = Record::new();
    record.insert("Name".to_string(), text("Acme Pty Ltd"));
    record.insert("Type".to_string(), text("Customer"));
    record.insert("Industry".to_string(), RecordValue::Null);

    let violations = detector.detect(&record);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].rule_id, "Customer_Needs_Industry");
    assert_eq!(violations[0].field.as_deref(), Some("Industry"));

    let reference = NaiveDate::from_ymd_opt(2024, 6, 15).expect("date");
    let repairer = Repairer::new(account, &detector, 10, reference);
    let outcome = repairer.repair(record, &plan);
    assert_eq!(outcome.state, RecordState::Repaired);
    assert_eq!(outcome.record["Industry"], text("Banking"));
    assert!(detector.detect(&outcome.record).is_empty());

    let prospect: Record = [
        ("Name".to_string(), text("Acme")),
        ("Type".to_string(), text("Prospect")),
        ("Industry".to_string(), RecordValue::Null),
    ]
    .into_iter()
    .collect();
    assert!(detector.detect(&prospect).is_empty());
}

#[test]
fn detection_is_idempotent_on_accepted_records() {
    let snapshot = load_snapshot("account.snapshot.json");
    let account = first_object(&snapshot);
    let run = RecordPipeline::new(options(5)).run(account, 50, None);
    let detector = ViolationDetector::new(account, options(5).eval_context());
    for record in &run.records {
        let first = detector.detect(record);
        let second = detector.detect(record);
        assert_eq!(first, second);
    }
}

#[test]
fn same_seed_reproduces_records() {
    let snapshot = load_snapshot("account.snapshot.json");
    let account = first_object(&snapshot);
    let first = RecordPipeline::new(options(77)).run(account, 25, None);
    let second = RecordPipeline::new(options(77)).run(account, 25, None);
    let other = RecordPipeline::new(options(78)).run(account, 25, None);

    assert_eq!(first.records, second.records);
    assert_ne!(first.records, other.records);
    assert_eq!(first.report.plan_fingerprint, second.report.plan_fingerprint);
    assert_ne!(first.report.run_id, second.report.run_id);
}

#[test]
fn anonymized_snapshot_behaves_the_same() {
    let real = load_snapshot("account.snapshot.json");
    let anonymized = load_snapshot("anonymized.snapshot.json");
    let account = first_object(&real);
    let object = first_object(&anonymized);

    let run = RecordPipeline::new(options(42)).run(object, 200, None);
    assert_eq!(run.report.flagged, 0);
    let detector = ViolationDetector::new(object, options(42).eval_context());
    for record in &run.records {
        assert!(detector.detect(record).is_empty());
    }

    let plan = PlanCache::new().plan_for(object);
    let reference = NaiveDate::from_ymd_opt(2024, 6, 15).expect("date");
    let repairer = Repairer::new(object, &detector, 10, reference);
    let record: Record = [
        ("Field_01".to_string(), text("Acme")),
        ("Field_03".to_string(), text("Customer")),
        ("Field_04".to_string(), RecordValue::Null),
    ]
    .into_iter()
    .collect();
    let outcome = repairer.repair(record, &plan);
    assert_eq!(outcome.state, RecordState::Repaired);
    assert_eq!(outcome.repaired_fields, vec!["Field_04".to_string()]);
    assert_eq!(outcome.record["Field_04"], text("Banking"));

    let real_detector = ViolationDetector::new(account, options(42).eval_context());
    assert_eq!(real_detector.rule_count(), detector.rule_count());
}

#[test]
fn writes_csv_with_generatable_columns() {
    let snapshot = load_snapshot("account.snapshot.json");
    let account = first_object(&snapshot);
    let run = RecordPipeline::new(options(3)).run(account, 10, None);

    let dir = std::env::temp_dir().join(format!("recordsmith-csv-{}", run.report.run_id));
    fs::create_dir_all(&dir).expect("temp dir");
    let path = dir.join("Account.csv");
    let bytes = write_records_csv(&path, account, &run.records).expect("write csv");
    let contents = fs::read_to_string(&path).expect("read csv");
    fs::remove_dir_all(&dir).ok();

    assert_eq!(bytes, contents.len() as u64);
    let header = contents.lines().next().expect("header");
    assert!(header.starts_with("Name,AccountNumber,Type,Industry,BillingCountry,BillingState"));
    assert!(!header.contains("Rating_Score__c"));
    assert_eq!(contents.lines().count(), 11);
}

fn ledger() -> ObjectSchema {
    ObjectSchema {
        name: "Ledger".to_string(),
        label: None,
        fields: vec![
            FieldDescriptor::new("Rate", FieldType::Percent).unique(),
            FieldDescriptor::new("Code", FieldType::Text)
                .unique()
                .with_max_length(3),
            FieldDescriptor::new("Due", FieldType::Date).unique(),
        ],
        validation_rules: Vec::new(),
    }
}

#[test]
fn unique_fields_stay_distinct_across_large_runs() {
    let object = ledger();
    let run = RecordPipeline::new(options(11)).run(&object, 2000, None);
    assert_eq!(run.records.len(), 2000);
    assert_eq!(run.report.flagged, 0);

    for field in ["Rate", "Code", "Due"] {
        let distinct: HashSet<String> = run
            .records
            .iter()
            .map(|record| record[field].to_field_string())
            .collect();
        assert_eq!(distinct.len(), 2000, "duplicates in {field}");
    }
    for record in &run.records {
        let code = record["Code"].as_str().expect("code");
        assert!(!code.is_empty());
        assert!(code.chars().count() <= 3, "code {code} exceeds max length");
    }
}

#[test]
fn exhausted_unique_field_flags_the_record() {
    let object = ObjectSchema {
        name: "Toggle".to_string(),
        label: None,
        fields: vec![FieldDescriptor::new("IsPrimary", FieldType::Boolean).unique()],
        validation_rules: Vec::new(),
    };
    let run = RecordPipeline::new(options(3)).run(&object, 3, None);

    assert_ne!(run.records[0]["IsPrimary"], run.records[1]["IsPrimary"]);
    assert_eq!(run.report.records[2].state, RecordState::Flagged);
    assert_eq!(run.report.flagged, 1);
    assert!(run.report.warnings.iter().any(|warning| {
        warning.kind == DiagnosticKind::RepairExhausted
            && warning.field.as_deref() == Some("IsPrimary")
    }));
}
