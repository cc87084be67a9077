use chrono::{Datelike, Duration, NaiveDate};
use fake::Fake;
use fake::faker::address::en::{
    BuildingNumber, CityName, CountryName, StateAbbr, StreetName, StreetSuffix, ZipCode,
};
use fake::faker::company::en::{CompanyName, Industry};
use fake::faker::internet::en::{DomainSuffix, SafeEmail};
use fake::faker::job::en::Title;
use fake::faker::lorem::en::{Sentence, Word, Words};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use rand::Rng;

/// Field names that read as "off" flags default to `false`.
const NEGATIVE_FLAGS: &[&str] = &[
    "inactive",
    "deleted",
    "optedout",
    "optout",
    "donotcall",
    "donotemail",
    "disabled",
    "archived",
    "unsubscribed",
    "blocked",
    "suspended",
    "closed",
];

/// Lower-cased field name without the custom suffix and separators.
pub fn normalize_name(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    let trimmed = lower.strip_suffix("__c").unwrap_or(&lower);
    trimmed.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Text shape inferred from a field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    FirstName,
    LastName,
    FullName,
    Company,
    Street,
    City,
    State,
    PostalCode,
    Country,
    JobTitle,
    Industry,
    Description,
    Website,
    Identifier,
    Generic,
}

impl TextKind {
    pub fn id(self) -> &'static str {
        match self {
            TextKind::FirstName => "text.first_name",
            TextKind::LastName => "text.last_name",
            TextKind::FullName => "text.full_name",
            TextKind::Company => "text.company",
            TextKind::Street => "text.street",
            TextKind::City => "text.city",
            TextKind::State => "text.state",
            TextKind::PostalCode => "text.postal_code",
            TextKind::Country => "text.country",
            TextKind::JobTitle => "text.job_title",
            TextKind::Industry => "text.industry",
            TextKind::Description => "text.description",
            TextKind::Website => "text.website",
            TextKind::Identifier => "text.identifier",
            TextKind::Generic => "text.generic",
        }
    }
}

pub fn classify_text(field_name: &str, object_name: &str) -> TextKind {
    let name = normalize_name(field_name);
    let has = |fragment: &str| name.contains(fragment);

    if has("firstname") || has("givenname") {
        TextKind::FirstName
    } else if has("lastname") || has("surname") || has("familyname") {
        TextKind::LastName
    } else if has("fullname") || has("contactname") {
        TextKind::FullName
    } else if name == "name" {
        let object = normalize_name(object_name);
        if ["account", "company", "organization", "organisation", "vendor", "partner"]
            .iter()
            .any(|fragment| object.contains(fragment))
        {
            TextKind::Company
        } else {
            TextKind::FullName
        }
    } else if has("street") || has("address") {
        TextKind::Street
    } else if has("city") || has("town") {
        TextKind::City
    } else if has("state") || has("province") || has("region") {
        TextKind::State
    } else if has("postal") || has("zip") || has("postcode") {
        TextKind::PostalCode
    } else if has("country") {
        TextKind::Country
    } else if has("number") || has("code") || has("sku") || has("external") {
        TextKind::Identifier
    } else if has("company") || has("account") || has("organization") || has("employer") {
        TextKind::Company
    } else if has("title") || has("position") || has("role") {
        TextKind::JobTitle
    } else if has("industry") || has("sector") {
        TextKind::Industry
    } else if has("description") || has("comment") || has("notes") || has("summary") {
        TextKind::Description
    } else if has("website") || has("url") || has("homepage") {
        TextKind::Website
    } else {
        TextKind::Generic
    }
}

pub fn text_value(kind: TextKind, field_name: &str, long: bool, rng: &mut impl Rng) -> String {
    match kind {
        TextKind::FirstName => FirstName().fake_with_rng(rng),
        TextKind::LastName => LastName().fake_with_rng(rng),
        TextKind::FullName => Name().fake_with_rng(rng),
        TextKind::Company => CompanyName().fake_with_rng(rng),
        TextKind::Street => {
            let number: String = BuildingNumber().fake_with_rng(rng);
            let street: String = StreetName().fake_with_rng(rng);
            let suffix: String = StreetSuffix().fake_with_rng(rng);
            format!("{number} {street} {suffix}")
        }
        TextKind::City => CityName().fake_with_rng(rng),
        TextKind::State => StateAbbr().fake_with_rng(rng),
        TextKind::PostalCode => ZipCode().fake_with_rng(rng),
        TextKind::Country => CountryName().fake_with_rng(rng),
        TextKind::JobTitle => Title().fake_with_rng(rng),
        TextKind::Industry => Industry().fake_with_rng(rng),
        TextKind::Description => {
            if long {
                Sentence(8..20).fake_with_rng(rng)
            } else {
                Sentence(3..8).fake_with_rng(rng)
            }
        }
        TextKind::Website => url_value(rng),
        TextKind::Identifier => identifier_value(field_name, rng),
        TextKind::Generic => {
            if long {
                Sentence(6..14).fake_with_rng(rng)
            } else {
                let words: Vec<String> = Words(1..4).fake_with_rng(rng);
                capitalize(&words.join(" "))
            }
        }
    }
}

pub fn email_value(rng: &mut impl Rng) -> String {
    SafeEmail().fake_with_rng(rng)
}

pub fn phone_value(rng: &mut impl Rng) -> String {
    PhoneNumber().fake_with_rng(rng)
}

pub fn url_value(rng: &mut impl Rng) -> String {
    let word: String = Word().fake_with_rng(rng);
    let suffix: String = DomainSuffix().fake_with_rng(rng);
    format!("https://www.{}.{suffix}", word.to_ascii_lowercase())
}

/// `ABC-004213` style code built from the field name.
fn identifier_value(field_name: &str, rng: &mut impl Rng) -> String {
    let prefix: String = field_name
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .take(3)
        .collect::<String>()
        .to_ascii_uppercase();
    let prefix = if prefix.is_empty() { "REC".to_string() } else { prefix };
    format!("{prefix}-{:06}", rng.random_range(0..1_000_000u32))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn clamp_length(value: String, max_length: Option<u32>) -> String {
    match max_length {
        Some(max) if value.chars().count() > max as usize => {
            value.chars().take(max as usize).collect()
        }
        _ => value,
    }
}

pub fn boolean_default(field_name: &str) -> bool {
    let name = normalize_name(field_name);
    !NEGATIVE_FLAGS.iter().any(|flag| name.contains(flag))
}

/// Default numeric window for a field, before precision and rule bounds.
pub fn numeric_window(field_name: &str, percent: bool, reference: NaiveDate) -> (f64, f64) {
    if percent {
        return (0.0, 100.0);
    }
    let name = normalize_name(field_name);
    let has = |fragment: &str| name.contains(fragment);
    if has("employee") || has("headcount") {
        (1.0, 5_000.0)
    } else if name == "age" || name.starts_with("age") {
        (18.0, 80.0)
    } else if has("year") {
        let year = f64::from(reference.year());
        (year - 20.0, year)
    } else if has("revenue") || has("turnover") {
        (10_000.0, 50_000_000.0)
    } else if has("amount") || has("price") || has("cost") || has("value") {
        (10.0, 100_000.0)
    } else if has("quantity") || has("count") || has("qty") {
        (1.0, 100.0)
    } else if has("score") || has("rating") {
        (0.0, 10.0)
    } else {
        (0.0, 1_000.0)
    }
}

/// Date window for a field; end-like fields start after `sibling_start`.
pub fn date_window(
    field_name: &str,
    reference: NaiveDate,
    sibling_start: Option<NaiveDate>,
) -> (NaiveDate, NaiveDate) {
    let name = normalize_name(field_name);
    let has = |fragment: &str| name.contains(fragment);
    let days = |count: i64| Duration::try_days(count).unwrap_or_default();

    if has("birth") || name == "dob" {
        let from = reference
            .with_year(reference.year() - 80)
            .unwrap_or(reference - days(80 * 365));
        let to = reference
            .with_year(reference.year() - 18)
            .unwrap_or(reference - days(18 * 365));
        (from, to)
    } else if has("start") || has("begin") || has("open") || has("effective") {
        (reference - days(365), reference)
    } else if has("end") || has("close") || has("due") || has("expir") || has("renewal") {
        match sibling_start {
            Some(start) => (start + days(1), start.max(reference) + days(365)),
            None => (reference, reference + days(365)),
        }
    } else {
        (reference - days(365), reference + days(365))
    }
}

pub fn is_start_like(field_name: &str) -> bool {
    let name = normalize_name(field_name);
    ["start", "begin", "effective"]
        .iter()
        .any(|fragment| name.contains(fragment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn classifies_business_names() {
        assert_eq!(classify_text("FirstName", "Contact"), TextKind::FirstName);
        assert_eq!(classify_text("Name", "Account"), TextKind::Company);
        assert_eq!(classify_text("Name", "Contact"), TextKind::FullName);
        assert_eq!(classify_text("Billing_City__c", "Account"), TextKind::City);
        assert_eq!(classify_text("AccountNumber", "Account"), TextKind::Identifier);
        assert_eq!(classify_text("Parent_Company__c", "Contact"), TextKind::Company);
        assert_eq!(classify_text("SKU__c", "Product2"), TextKind::Identifier);
        assert_eq!(classify_text("Field_01", "Object_7"), TextKind::Generic);
    }

    #[test]
    fn negative_flags_default_false() {
        assert!(boolean_default("Active__c"));
        assert!(!boolean_default("Is_Inactive__c"));
        assert!(!boolean_default("Do_Not_Call__c"));
        assert!(!boolean_default("HasOptedOutOfEmail"));
        assert!(boolean_default("Field_12__c"));
    }

    #[test]
    fn end_dates_follow_sibling_start() {
        let reference = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let (from, to) = date_window("End_Date__c", reference, Some(start));
        assert_eq!(from, NaiveDate::from_ymd_opt(2024, 1, 11).unwrap());
        assert!(to > reference);

        let (from, to) = date_window("Birthdate", reference, None);
        assert_eq!(from.year(), 1944);
        assert_eq!(to.year(), 2006);
    }

    #[test]
    fn clamps_to_max_length() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..20 {
            let value = text_value(TextKind::Description, "Description", true, &mut rng);
            assert!(clamp_length(value, Some(12)).chars().count() <= 12);
        }
    }
}
