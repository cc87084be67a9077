//! Constrained value generation, one plan step at a time.

pub mod fallback;
pub mod heuristics;

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Duration, NaiveDate, NaiveTime};
use rand::Rng;
use rand::SeedableRng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use recordsmith_core::{FieldDescriptor, FieldType, ObjectSchema, Record, RecordValue};
use recordsmith_plan::{GenerationPlan, GenerationStep};
use tracing::{debug, warn};

use crate::model::{FieldSuggestions, GenerateOptions};
use crate::suggestions::{RejectedSuggestion, SuggestionPool};

use self::fallback::{controlling_key, fallback_for_step, placeholder_id};
use self::heuristics::{
    boolean_default, clamp_length, classify_text, date_window, email_value, is_start_like,
    numeric_window, phone_value, text_value, url_value,
};

/// Seed for one record attempt, mixed from the session seed.
pub fn hash_record_seed(seed: u64, index: u64, attempt: u32) -> u64 {
    let mut hash = seed ^ index.wrapping_mul(0x9e3779b97f4a7c15);
    hash ^= attempt as u64;
    hash = hash.wrapping_mul(0x100000001b3);
    hash
}

/// Generates candidate records by executing plan steps in order.
///
/// Output is deterministic for a given seed, plan and record index. The
/// unique-value seen sets live for the lifetime of the generator.
#[derive(Debug)]
pub struct ValueGenerator {
    options: GenerateOptions,
    reference: NaiveDate,
    suggestions: SuggestionPool,
    seen: HashMap<String, HashSet<String>>,
    /// Unique fields of the current record left holding a duplicate.
    unsatisfied: Vec<String>,
    heuristic_usage: BTreeMap<String, u64>,
    fallback_count: u64,
    suggestions_used: u64,
}

impl ValueGenerator {
    pub fn new(options: GenerateOptions) -> Self {
        let reference = options.reference_date();
        Self {
            options,
            reference,
            suggestions: SuggestionPool::default(),
            seen: HashMap::new(),
            unsatisfied: Vec::new(),
            heuristic_usage: BTreeMap::new(),
            fallback_count: 0,
            suggestions_used: 0,
        }
    }

    pub fn options(&self) -> &GenerateOptions {
        &self.options
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference
    }

    /// Install advisory candidates; returns the ones that were dropped.
    pub fn set_suggestions(
        &mut self,
        object: &ObjectSchema,
        suggestions: &FieldSuggestions,
    ) -> Vec<RejectedSuggestion> {
        let (pool, rejected) = SuggestionPool::build(object, suggestions);
        self.suggestions = pool;
        rejected
    }

    pub fn heuristic_usage(&self) -> &BTreeMap<String, u64> {
        &self.heuristic_usage
    }

    pub fn fallback_count(&self) -> u64 {
        self.fallback_count
    }

    pub fn suggestions_used(&self) -> u64 {
        self.suggestions_used
    }

    /// Unique fields of the last record for which no unused value fit.
    pub fn unsatisfied_fields(&self) -> &[String] {
        &self.unsatisfied
    }

    pub fn generate_record(
        &mut self,
        object: &ObjectSchema,
        plan: &GenerationPlan,
        index: u64,
    ) -> Record {
        let mut rng = ChaCha8Rng::seed_from_u64(hash_record_seed(self.options.seed, index, 0));
        let mut record = Record::new();
        self.unsatisfied.clear();

        for step in &plan.steps {
            let Some(field) = object.field(&step.field) else {
                continue;
            };
            let (own, heuristic) = self.value_for(object, field, step, &record, &mut rng);
            let mut value = self.merge_suggestions(field, step, &record, own, &mut rng);

            if value.is_blank() && (step.is_required() || step.is_rule_required()) {
                value = fallback_for_step(field, Some(step), &record, 0, self.reference);
                self.fallback_count += 1;
                self.bump("fallback");
            } else {
                self.bump(heuristic);
            }

            if step.is_unique() {
                value = self.ensure_unique(field, step, &record, value, index);
            }
            record.insert(field.name.clone(), value);
        }

        debug!(object = %object.name, index, fields = record.len(), "record generated");
        record
    }

    fn bump(&mut self, heuristic: &str) {
        *self.heuristic_usage.entry(heuristic.to_string()).or_insert(0) += 1;
    }

    fn value_for(
        &self,
        object: &ObjectSchema,
        field: &FieldDescriptor,
        step: &GenerationStep,
        record: &Record,
        rng: &mut ChaCha8Rng,
    ) -> (RecordValue, &'static str) {
        let max_length = step.max_length().or(field.max_length);
        match field.field_type {
            FieldType::Text | FieldType::LongText => {
                let kind = classify_text(&field.name, &object.name);
                let long = field.field_type == FieldType::LongText;
                let text = text_value(kind, &field.name, long, rng);
                (RecordValue::Text(clamp_length(text, max_length)), kind.id())
            }
            FieldType::Email => (
                RecordValue::Text(clamp_length(email_value(rng), max_length)),
                "email",
            ),
            FieldType::Phone => (
                RecordValue::Text(clamp_length(phone_value(rng), max_length)),
                "phone",
            ),
            FieldType::Url => (
                RecordValue::Text(clamp_length(url_value(rng), max_length)),
                "url",
            ),
            FieldType::Integer
            | FieldType::Decimal
            | FieldType::Currency
            | FieldType::Percent => (self.numeric_value(field, step, rng), "numeric"),
            FieldType::Date => (
                RecordValue::Date(self.date_value(field, record, rng)),
                "date.window",
            ),
            FieldType::Datetime => {
                let date = self.date_value(field, record, rng);
                let seconds = rng.random_range(0..86_400u32);
                let time =
                    NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).unwrap_or_default();
                (RecordValue::DateTime(date.and_time(time)), "datetime.window")
            }
            FieldType::Boolean => (
                RecordValue::Bool(boolean_default(&field.name)),
                "boolean.lexicon",
            ),
            FieldType::SingleSelect => single_select(field, step, record, rng),
            FieldType::MultiSelect => (multi_select(field, rng), "select.multi"),
            FieldType::Reference => {
                if step.is_required() || step.is_rule_required() {
                    (
                        RecordValue::Text(placeholder_id(rng.random())),
                        "reference.placeholder",
                    )
                } else {
                    (RecordValue::Null, "reference.null")
                }
            }
            FieldType::Identifier => (RecordValue::Null, "identifier.skipped"),
        }
    }

    fn numeric_value(
        &self,
        field: &FieldDescriptor,
        step: &GenerationStep,
        rng: &mut ChaCha8Rng,
    ) -> RecordValue {
        let integer = field.field_type == FieldType::Integer;
        let scale = if integer {
            0
        } else {
            field.scale.unwrap_or(match field.field_type {
                FieldType::Percent => 0,
                _ => 2,
            })
        };
        let unit = 10f64.powi(-(scale as i32));
        let percent = field.field_type == FieldType::Percent;
        let (mut low, mut high) = numeric_window(&field.name, percent, self.reference);

        if let Some(precision) = field.precision {
            let digits = precision.saturating_sub(scale) as i32;
            let limit = 10f64.powi(digits) - unit;
            low = low.max(-limit);
            high = high.min(limit);
        }
        if let Some((min, max, inclusive)) = step.numeric_range() {
            let nudge = if inclusive { 0.0 } else { unit };
            if let Some(min) = min {
                low = low.max(min + nudge);
            }
            if let Some(max) = max {
                high = high.min(max - nudge);
            }
        }
        if high < low {
            high = low;
        }

        if integer {
            let (low, high) = (low.ceil() as i64, high.floor() as i64);
            let value = if low < high {
                rng.random_range(low..=high)
            } else {
                low
            };
            RecordValue::Int(value)
        } else {
            let raw = if low < high {
                rng.random_range(low..=high)
            } else {
                low
            };
            let factor = 10f64.powi(scale as i32);
            RecordValue::Decimal((raw * factor).round() / factor)
        }
    }

    fn date_value(
        &self,
        field: &FieldDescriptor,
        record: &Record,
        rng: &mut ChaCha8Rng,
    ) -> NaiveDate {
        let sibling_start = record
            .iter()
            .filter(|(name, _)| is_start_like(name))
            .filter_map(|(_, value)| value.as_date())
            .max();
        let (from, to) = date_window(&field.name, self.reference, sibling_start);
        let span = (to - from).num_days().max(0);
        let offset = Duration::try_days(rng.random_range(0..=span)).unwrap_or_default();
        from.checked_add_signed(offset).unwrap_or(from)
    }

    /// Chooses uniformly between the generator's own value and the valid
    /// advisory candidates for the field.
    fn merge_suggestions(
        &mut self,
        field: &FieldDescriptor,
        step: &GenerationStep,
        record: &Record,
        own: RecordValue,
        rng: &mut ChaCha8Rng,
    ) -> RecordValue {
        let candidates: Vec<&RecordValue> = self
            .suggestions
            .candidates(&field.name)
            .iter()
            .filter(|candidate| allowed_by_controller(step, record, candidate))
            .collect();
        if candidates.is_empty() {
            return own;
        }
        let pick = rng.random_range(0..=candidates.len());
        if pick == 0 {
            return own;
        }
        let chosen = candidates[pick - 1].clone();
        self.suggestions_used += 1;
        chosen
    }

    /// Claim a unique value for `field`, stepping away from `value` until
    /// one is free. Records the field as unsatisfied when nothing fits.
    fn ensure_unique(
        &mut self,
        field: &FieldDescriptor,
        step: &GenerationStep,
        record: &Record,
        value: RecordValue,
        index: u64,
    ) -> RecordValue {
        if value.is_blank() {
            return value;
        }
        let seen = self.seen.entry(field.name.clone()).or_default();
        if seen.insert(value.to_field_string()) {
            return value;
        }

        let max_length = step.max_length().or(field.max_length).map(|max| max as usize);
        let options = select_pool(field, step, record);
        // Two misses in a row means both directions ran out of room.
        let mut misses = 0;
        for probe in 0..UNIQUE_PROBE_LIMIT {
            let candidate = unique_candidate(field, &value, &options, max_length, index, probe);
            let Some(candidate) = candidate else {
                misses += 1;
                if misses == 2 {
                    break;
                }
                continue;
            };
            misses = 0;
            if seen.insert(candidate.to_field_string()) {
                return candidate;
            }
        }

        warn!(field = %field.name, index, "no unique value fits the field constraints");
        self.unsatisfied.push(field.name.clone());
        value
    }

    /// Re-claim unique values for fields the repairer overwrote.
    pub fn reserve_repaired(
        &mut self,
        object: &ObjectSchema,
        plan: &GenerationPlan,
        record: &mut Record,
        repaired_fields: &[String],
        index: u64,
    ) {
        for name in repaired_fields {
            let (Some(step), Some(field)) = (plan.step(name), object.field(name)) else {
                continue;
            };
            if !step.is_unique() {
                continue;
            }
            let Some(value) = record.get(&field.name).cloned() else {
                continue;
            };
            let value = self.ensure_unique(field, step, record, value, index);
            record.insert(field.name.clone(), value);
        }
    }
}

const UNIQUE_PROBE_LIMIT: u64 = 100_000;

/// Lowercase base-36 rendering used for compact uniqueness tags.
fn base36(mut number: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    loop {
        out.push(DIGITS[(number % 36) as usize]);
        number /= 36;
        if number == 0 {
            break;
        }
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Signed step for the `probe`-th attempt: +1, -1, +2, -2, ...
fn alternating_step(probe: u64) -> i64 {
    let magnitude = (probe / 2 + 1) as i64;
    if probe % 2 == 0 { magnitude } else { -magnitude }
}

/// Options a select field may take for this record.
fn select_pool(field: &FieldDescriptor, step: &GenerationStep, record: &Record) -> Vec<String> {
    if field.field_type != FieldType::SingleSelect {
        return Vec::new();
    }
    match &step.controlling {
        Some(dependency) => record
            .get(&dependency.controlling_field)
            .and_then(controlling_key)
            .map(|key| dependency.values_for(&key).to_vec())
            .unwrap_or_default(),
        None => field.active_options().into_iter().map(str::to_string).collect(),
    }
}

/// The `probe`-th alternative to a duplicated `value`, or `None` once the
/// field's constraints leave no further candidates.
fn unique_candidate(
    field: &FieldDescriptor,
    value: &RecordValue,
    options: &[String],
    max_length: Option<usize>,
    index: u64,
    probe: u64,
) -> Option<RecordValue> {
    match (field.field_type, value) {
        (FieldType::SingleSelect, _) => options.get(probe as usize).cloned().map(RecordValue::Text),
        (FieldType::Reference, _) => Some(RecordValue::Text(placeholder_id(
            index.wrapping_mul(100_003).wrapping_add(probe),
        ))),
        (FieldType::Email, RecordValue::Text(text)) => {
            let (local, domain) = text.split_once('@').unwrap_or((text.as_str(), "example.com"));
            let tag = base36(index.wrapping_add(probe));
            let room = max_length
                .map(|max| max.checked_sub(tag.len() + domain.len() + 1))
                .unwrap_or(Some(local.len()))?;
            let local: String = local.chars().take(room).collect();
            Some(RecordValue::Text(format!("{local}{tag}@{domain}")))
        }
        (_, RecordValue::Text(text)) => {
            let tag = base36(index.wrapping_add(probe));
            let text = match max_length {
                Some(max) if tag.len() > max => return None,
                Some(max) if tag.len() + 1 < max => {
                    let keep = max - tag.len() - 1;
                    format!("{}-{tag}", text.chars().take(keep).collect::<String>())
                }
                Some(max) => {
                    let keep = max - tag.len();
                    format!("{}{tag}", text.chars().take(keep).collect::<String>())
                }
                None => format!("{text}-{tag}"),
            };
            Some(RecordValue::Text(text))
        }
        (_, RecordValue::Int(number)) => {
            let candidate = number.checked_add(alternating_step(probe))?;
            within_precision(field, 0, candidate).then_some(RecordValue::Int(candidate))
        }
        (_, RecordValue::Decimal(number)) => {
            let scale = field.scale.unwrap_or(match field.field_type {
                FieldType::Percent => 0,
                _ => 2,
            });
            let factor = 10f64.powi(scale as i32);
            let units = (number * factor).round() as i64;
            let candidate = units.checked_add(alternating_step(probe))?;
            within_precision(field, scale, candidate)
                .then(|| RecordValue::Decimal(candidate as f64 / factor))
        }
        (_, RecordValue::Date(date)) => {
            let offset = Duration::try_days(alternating_step(probe))?;
            date.checked_add_signed(offset).map(RecordValue::Date)
        }
        (_, RecordValue::DateTime(moment)) => {
            let offset = Duration::try_seconds(alternating_step(probe))?;
            moment.checked_add_signed(offset).map(RecordValue::DateTime)
        }
        (_, RecordValue::Bool(flag)) => (probe == 0).then_some(RecordValue::Bool(!flag)),
        _ => None,
    }
}

/// Whether `units` (in steps of `10^-scale`) fits the field's precision.
fn within_precision(field: &FieldDescriptor, scale: u32, units: i64) -> bool {
    match field.precision {
        Some(precision) => {
            let exponent = precision.max(scale);
            10u64
                .checked_pow(exponent)
                .is_none_or(|limit| units.unsigned_abs() < limit)
        }
        None => true,
    }
}

fn single_select(
    field: &FieldDescriptor,
    step: &GenerationStep,
    record: &Record,
    rng: &mut ChaCha8Rng,
) -> (RecordValue, &'static str) {
    if let Some(dependency) = &step.controlling {
        let Some(controlling) = record
            .get(&dependency.controlling_field)
            .and_then(controlling_key)
        else {
            return (RecordValue::Null, "select.no_controller");
        };
        let allowed = dependency.values_for(&controlling);
        if allowed.is_empty() {
            return (RecordValue::Null, "select.no_controller");
        }
        let choice = &allowed[rng.random_range(0..allowed.len())];
        return (RecordValue::Text(choice.clone()), "select.dependent");
    }

    let options = field.active_options();
    if options.is_empty() {
        return (RecordValue::Null, "select.empty");
    }
    let choice = options[rng.random_range(0..options.len())];
    (RecordValue::Text(choice.to_string()), "select.uniform")
}

/// One to three distinct active options, kept in declaration order.
fn multi_select(field: &FieldDescriptor, rng: &mut ChaCha8Rng) -> RecordValue {
    let options = field.active_options();
    if options.is_empty() {
        return RecordValue::Null;
    }
    let count = rng.random_range(1..=options.len().min(3));
    let mut picked = index::sample(rng, options.len(), count).into_vec();
    picked.sort_unstable();
    RecordValue::MultiSelect(picked.into_iter().map(|i| options[i].to_string()).collect())
}

fn allowed_by_controller(step: &GenerationStep, record: &Record, candidate: &RecordValue) -> bool {
    let Some(dependency) = &step.controlling else {
        return true;
    };
    let Some(controlling) = record
        .get(&dependency.controlling_field)
        .and_then(controlling_key)
    else {
        return false;
    };
    let allowed = dependency.values_for(&controlling);
    match candidate {
        RecordValue::Text(value) => allowed.contains(value),
        RecordValue::MultiSelect(values) => values.iter().all(|value| allowed.contains(value)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordsmith_core::{PicklistOption, ValidationRule};
    use recordsmith_plan::{PlanCache, encode_valid_for};

    fn options() -> GenerateOptions {
        GenerateOptions {
            seed: 7,
            max_repair_attempts: 10,
            reference_date: NaiveDate::from_ymd_opt(2024, 6, 15),
        }
    }

    fn contact() -> ObjectSchema {
        ObjectSchema {
            name: "Contact".to_string(),
            label: None,
            fields: vec![
                FieldDescriptor::new("LastName", FieldType::Text)
                    .required()
                    .with_max_length(8),
                FieldDescriptor::new("Email", FieldType::Email).unique(),
                FieldDescriptor::new("Country", FieldType::SingleSelect).with_options(["AU", "US"]),
                FieldDescriptor::new("State", FieldType::SingleSelect).with_dependent_options(
                    "Country",
                    [
                        PicklistOption::new("NSW").valid_for(encode_valid_for(&[0])),
                        PicklistOption::new("CA").valid_for(encode_valid_for(&[1])),
                    ],
                ),
                FieldDescriptor::new("Interests", FieldType::MultiSelect)
                    .with_options(["Golf", "Sailing", "Chess", "Tennis"]),
                FieldDescriptor::new("Discount", FieldType::Percent),
                FieldDescriptor::new("HasOptedOutOfEmail", FieldType::Boolean),
                FieldDescriptor::new("ReportsToId", FieldType::Reference),
            ],
            validation_rules: vec![ValidationRule::new(
                "Discount_Range",
                "Discount < 5",
                "Discount must be at least 5",
            )],
        }
    }

    #[test]
    fn same_seed_same_records() {
        let object = contact();
        let plan = PlanCache::new().plan_for(&object);
        let first: Vec<Record> = {
            let mut generator = ValueGenerator::new(options());
            (0..5).map(|i| generator.generate_record(&object, &plan, i)).collect()
        };
        let second: Vec<Record> = {
            let mut generator = ValueGenerator::new(options());
            (0..5).map(|i| generator.generate_record(&object, &plan, i)).collect()
        };
        assert_eq!(first, second);
    }

    #[test]
    fn respects_types_and_constraints() {
        let object = contact();
        let plan = PlanCache::new().plan_for(&object);
        let mut generator = ValueGenerator::new(options());

        for index in 0..50 {
            let record = generator.generate_record(&object, &plan, index);

            let last_name = record["LastName"].as_str().expect("last name");
            assert!(!last_name.trim().is_empty());
            assert!(last_name.chars().count() <= 8);

            match (&record["Country"], &record["State"]) {
                (RecordValue::Text(country), RecordValue::Text(state)) => {
                    let expected = if country == "AU" { "NSW" } else { "CA" };
                    assert_eq!(state, expected);
                }
                other => panic!("unexpected country/state {other:?}"),
            }

            let RecordValue::MultiSelect(interests) = &record["Interests"] else {
                panic!("interests should be multi-select");
            };
            assert!((1..=3).contains(&interests.len()));

            let discount = record["Discount"].as_f64().expect("discount");
            assert!((5.0..=100.0).contains(&discount), "discount {discount}");

            assert_eq!(record["HasOptedOutOfEmail"], RecordValue::Bool(false));
            assert_eq!(record["ReportsToId"], RecordValue::Null);
        }
    }

    #[test]
    fn unique_values_never_repeat() {
        let object = contact();
        let plan = PlanCache::new().plan_for(&object);
        let mut generator = ValueGenerator::new(options());
        let mut emails = HashSet::new();
        for index in 0..200 {
            let record = generator.generate_record(&object, &plan, index);
            assert!(emails.insert(record["Email"].to_field_string()));
        }
    }

    #[test]
    fn suggestions_join_the_candidate_pool() {
        let object = contact();
        let plan = PlanCache::new().plan_for(&object);
        let mut generator = ValueGenerator::new(options());
        let mut suggestions = FieldSuggestions::new();
        suggestions.insert("LastName".to_string(), vec!["Okafor".to_string()]);
        suggestions.insert("State".to_string(), vec!["NSW".to_string(), "Texas".to_string()]);
        let rejected = generator.set_suggestions(&object, &suggestions);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].value, "Texas");

        let mut seen_suggestion = false;
        for index in 0..40 {
            let record = generator.generate_record(&object, &plan, index);
            if record["LastName"] == RecordValue::Text("Okafor".to_string()) {
                seen_suggestion = true;
            }
            if record["Country"] == RecordValue::Text("US".to_string()) {
                assert_eq!(record["State"], RecordValue::Text("CA".to_string()));
            }
        }
        assert!(seen_suggestion);
        assert!(generator.suggestions_used() > 0);
    }

    #[test]
    fn text_tags_fit_narrow_fields() {
        let field = FieldDescriptor::new("Code", FieldType::Text).with_max_length(3);
        let value = RecordValue::Text("abc".to_string());
        for (index, expected) in [(0, "a-0"), (40, "a14"), (1300, "104")] {
            let candidate = unique_candidate(&field, &value, &[], Some(3), index, 0);
            assert_eq!(candidate, Some(RecordValue::Text(expected.to_string())));
        }
        assert_eq!(unique_candidate(&field, &value, &[], Some(2), 1300, 0), None);
    }

    #[test]
    fn numeric_steps_respect_scale_and_precision() {
        let amount = FieldDescriptor::new("Amount", FieldType::Currency).with_precision(4, 2);
        let value = RecordValue::Decimal(99.99);
        assert_eq!(
            unique_candidate(&amount, &value, &[], None, 0, 0),
            None,
            "99.99 is the largest value with precision 4 and scale 2"
        );
        assert_eq!(
            unique_candidate(&amount, &value, &[], None, 0, 1),
            Some(RecordValue::Decimal(99.98))
        );

        let due = FieldDescriptor::new("Due", FieldType::Date);
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).expect("date");
        assert_eq!(
            unique_candidate(&due, &RecordValue::Date(date), &[], None, 0, 1),
            NaiveDate::from_ymd_opt(2024, 6, 14).map(RecordValue::Date)
        );
    }
}
