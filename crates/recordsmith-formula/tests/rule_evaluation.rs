use chrono::NaiveDate;
use recordsmith_core::{FieldType, FieldTypeMap, Record, RecordValue};
use recordsmith_formula::{
    EvalContext, Formula, FormulaValue, evaluate, is_truthy, parse, referenced_fields,
};

const CUSTOMER_RULE: &str = "IF(Type = \"Customer\", ISBLANK(Industry), false)";

fn ctx() -> EvalContext {
    EvalContext::at_date(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap())
}

fn account_types() -> FieldTypeMap {
    let mut types = FieldTypeMap::new();
    types.insert("Type".to_string(), FieldType::SingleSelect);
    types.insert("Industry".to_string(), FieldType::SingleSelect);
    types.insert("Name".to_string(), FieldType::Text);
    types
}

fn record(pairs: &[(&str, RecordValue)]) -> Record {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn text(value: &str) -> RecordValue {
    RecordValue::Text(value.to_string())
}

#[test]
fn customer_without_industry_fires() {
    let types = account_types();
    let blank = record(&[("Type", text("Customer")), ("Industry", RecordValue::Null)]);
    let filled = record(&[("Type", text("Customer")), ("Industry", text("Banking"))]);
    let prospect = record(&[("Type", text("Prospect")), ("Industry", RecordValue::Null)]);

    assert!(is_truthy(&evaluate(CUSTOMER_RULE, &blank, &types, &ctx())));
    assert!(!is_truthy(&evaluate(CUSTOMER_RULE, &filled, &types, &ctx())));
    assert!(!is_truthy(&evaluate(CUSTOMER_RULE, &prospect, &types, &ctx())));
}

#[test]
fn required_field_blank_check() {
    let types = account_types();
    let formula = "ISBLANK(Name)";
    assert!(is_truthy(&evaluate(formula, &Record::new(), &types, &ctx())));
    assert!(is_truthy(&evaluate(
        formula,
        &record(&[("Name", text(""))]),
        &types,
        &ctx()
    )));
    assert!(!is_truthy(&evaluate(
        formula,
        &record(&[("Name", text("Acme"))]),
        &types,
        &ctx()
    )));
}

#[test]
fn evaluation_is_deterministic() {
    let types = account_types();
    let formula = "IF(TODAY() > DATE(2024, 1, 1), LEN(Name) * 2, 0)";
    let record = record(&[("Name", text("Globex"))]);
    let first = evaluate(formula, &record, &types, &ctx());
    for _ in 0..10 {
        assert_eq!(evaluate(formula, &record, &types, &ctx()), first);
    }
    assert_eq!(first, FormulaValue::Number(12.0));
}

#[test]
fn string_literals_never_become_field_references() {
    let expr = parse("Status = 'ISBLANK(Name)' && Owner.Region__c = \"Industry\"").expect("parse");
    let fields: Vec<String> = referenced_fields(&expr).into_iter().collect();
    assert_eq!(fields, vec!["Owner.Region__c".to_string(), "Status".to_string()]);

    let record = record(&[("Status", text("ISBLANK(Name)"))]);
    let value = evaluate("Status = 'ISBLANK(Name)'", &record, &FieldTypeMap::new(), &ctx());
    assert_eq!(value, FormulaValue::Bool(true));
}

#[test]
fn parsed_formula_reuses_tree() {
    let formula = Formula::parse(CUSTOMER_RULE).expect("parse");
    assert_eq!(
        formula.fields().iter().cloned().collect::<Vec<_>>(),
        vec!["Industry".to_string(), "Type".to_string()]
    );
    let types = account_types();
    let blank = record(&[("Type", text("Customer"))]);
    let value = formula.evaluate(&blank, &types, &ctx()).expect("evaluate");
    assert!(is_truthy(&value));
}

#[test]
fn malformed_formula_is_treated_as_not_violated() {
    let value = evaluate("AND(Name = ", &Record::new(), &FieldTypeMap::new(), &ctx());
    assert_eq!(value, FormulaValue::Bool(false));
}
