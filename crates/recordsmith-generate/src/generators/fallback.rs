use chrono::{Duration, NaiveDate, NaiveTime};
use recordsmith_core::{FieldDescriptor, FieldType, Record, RecordValue};
use recordsmith_plan::GenerationStep;

use super::heuristics::{boolean_default, clamp_length};

const TEXT_FALLBACKS: &[&str] = &["Sample", "Fallback Value", "N/A"];
const LONG_TEXT_FALLBACKS: &[&str] = &["Sample description.", "Generated fallback text.", "N/A"];
const INTEGER_FALLBACKS: &[i64] = &[1, 0, 10];
const DECIMAL_FALLBACKS: &[f64] = &[1.0, 0.0, 100.0];
const PERCENT_FALLBACKS: &[f64] = &[50.0, 0.0, 100.0];
/// Day offsets from the reference date.
const DATE_OFFSETS: &[i64] = &[0, 30, 365];

fn pick<T: Copy>(table: &[T], attempt: u32) -> T {
    table[attempt as usize % table.len()]
}

/// 18-character record id placeholder for reference fields.
pub fn placeholder_id(sequence: u64) -> String {
    format!("a0{:013}AAA", sequence % 10_000_000_000_000)
}

/// Guaranteed non-empty value for `field`, cycling a fixed table by
/// `attempt`. Select fields with no active options stay null.
pub fn fallback_value(field: &FieldDescriptor, attempt: u32, reference: NaiveDate) -> RecordValue {
    let date = || {
        let offset = Duration::try_days(pick(DATE_OFFSETS, attempt)).unwrap_or_default();
        reference.checked_add_signed(offset).unwrap_or(reference)
    };
    match field.field_type {
        FieldType::Text => RecordValue::Text(clamp_length(
            pick(TEXT_FALLBACKS, attempt).to_string(),
            field.max_length,
        )),
        FieldType::LongText => RecordValue::Text(clamp_length(
            pick(LONG_TEXT_FALLBACKS, attempt).to_string(),
            field.max_length,
        )),
        FieldType::Email => RecordValue::Text(format!("fallback{attempt}@example.com")),
        FieldType::Phone => RecordValue::Text(format!("555-01{:02}", attempt % 100)),
        FieldType::Url => RecordValue::Text(format!("https://www.example.com/{attempt}")),
        FieldType::Integer => RecordValue::Int(pick(INTEGER_FALLBACKS, attempt)),
        FieldType::Decimal | FieldType::Currency => {
            RecordValue::Decimal(pick(DECIMAL_FALLBACKS, attempt))
        }
        FieldType::Percent => RecordValue::Decimal(pick(PERCENT_FALLBACKS, attempt)),
        FieldType::Date => RecordValue::Date(date()),
        FieldType::Datetime => RecordValue::DateTime(date().and_time(NaiveTime::MIN)),
        FieldType::Boolean => {
            let preferred = boolean_default(&field.name);
            RecordValue::Bool(if attempt % 2 == 0 { preferred } else { !preferred })
        }
        FieldType::SingleSelect => {
            let options = field.active_options();
            if options.is_empty() {
                RecordValue::Null
            } else {
                RecordValue::Text(pick(&options, attempt).to_string())
            }
        }
        FieldType::MultiSelect => {
            let options = field.active_options();
            if options.is_empty() {
                RecordValue::Null
            } else {
                RecordValue::MultiSelect(vec![pick(&options, attempt).to_string()])
            }
        }
        FieldType::Reference | FieldType::Identifier => {
            RecordValue::Text(placeholder_id(u64::from(attempt)))
        }
    }
}

/// Fallback that stays inside the decoded dependent-picklist mapping for
/// the controlling value already present in `record`.
pub fn fallback_for_step(
    field: &FieldDescriptor,
    step: Option<&GenerationStep>,
    record: &Record,
    attempt: u32,
    reference: NaiveDate,
) -> RecordValue {
    let Some(dependency) = step.and_then(|step| step.controlling.as_ref()) else {
        return fallback_value(field, attempt, reference);
    };
    let Some(controlling) = record
        .get(&dependency.controlling_field)
        .and_then(controlling_key)
    else {
        return fallback_value(field, attempt, reference);
    };
    let allowed = dependency.values_for(&controlling);
    if allowed.is_empty() {
        return RecordValue::Null;
    }
    let value = allowed[attempt as usize % allowed.len()].clone();
    match field.field_type {
        FieldType::MultiSelect => RecordValue::MultiSelect(vec![value]),
        _ => RecordValue::Text(value),
    }
}

/// Key into a decoded mapping; booleans use `"false"`/`"true"`.
pub fn controlling_key(value: &RecordValue) -> Option<String> {
    match value {
        RecordValue::Bool(flag) => Some(flag.to_string()),
        RecordValue::Text(text) if !text.trim().is_empty() => Some(text.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordsmith_core::PicklistOption;

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    #[test]
    fn table_cycles_by_attempt() {
        let field = FieldDescriptor::new("Start_Date__c", FieldType::Date);
        assert_eq!(
            fallback_value(&field, 0, reference()),
            RecordValue::Date(reference())
        );
        assert_eq!(
            fallback_value(&field, 2, reference()),
            RecordValue::Date(NaiveDate::from_ymd_opt(2025, 6, 15).unwrap())
        );
        assert_eq!(
            fallback_value(&field, 3, reference()),
            RecordValue::Date(reference())
        );
    }

    #[test]
    fn fallback_is_never_blank_for_typed_fields() {
        let fields = [
            FieldDescriptor::new("Name", FieldType::Text).with_max_length(3),
            FieldDescriptor::new("Email", FieldType::Email),
            FieldDescriptor::new("Amount", FieldType::Currency),
            FieldDescriptor::new("Stage", FieldType::SingleSelect).with_options(["Open"]),
            FieldDescriptor::new("ParentId", FieldType::Reference),
        ];
        for field in &fields {
            for attempt in 0..5 {
                let value = fallback_value(field, attempt, reference());
                assert!(!value.is_blank(), "{} attempt {attempt}", field.name);
            }
        }
        assert_eq!(
            fallback_value(&fields[0], 0, reference()),
            RecordValue::Text("Sam".to_string())
        );
        assert_eq!(placeholder_id(7).len(), 18);
    }

    #[test]
    fn select_without_active_options_stays_null() {
        let field = FieldDescriptor::new("Tier", FieldType::SingleSelect)
            .with_dependent_options("Level", [PicklistOption::new("Gold").inactive()]);
        assert_eq!(fallback_value(&field, 0, reference()), RecordValue::Null);
    }
}
