use chrono::{Datelike, Months, NaiveDate};
use regex::Regex;
use recordsmith_core::MULTI_SELECT_DELIMITER;

use crate::ast::Expr;
use crate::errors::{FormulaError, Result};
use crate::eval::{Evaluator, values_equal};
use crate::value::{FormulaValue, is_truthy, parse_date, parse_datetime};

/// Functions the evaluator implements, upper-cased.
pub const SUPPORTED_FUNCTIONS: &[&str] = &[
    // blank / null
    "ISBLANK",
    "ISNULL",
    "BLANKVALUE",
    "NULLVALUE",
    // logical
    "AND",
    "OR",
    "NOT",
    "IF",
    "CASE",
    // text
    "LEN",
    "LEFT",
    "RIGHT",
    "MID",
    "UPPER",
    "LOWER",
    "TRIM",
    "CONTAINS",
    "BEGINS",
    "SUBSTITUTE",
    "REGEX",
    "TEXT",
    "VALUE",
    "ISNUMBER",
    "ISPICKVAL",
    "INCLUDES",
    "LPAD",
    "RPAD",
    "FIND",
    // math
    "ROUND",
    "FLOOR",
    "CEILING",
    "ABS",
    "MAX",
    "MIN",
    "MOD",
    "SQRT",
    // date
    "TODAY",
    "NOW",
    "DATE",
    "DATEVALUE",
    "YEAR",
    "MONTH",
    "DAY",
    "WEEKDAY",
    "ADDMONTHS",
];

pub fn is_supported(name: &str) -> bool {
    SUPPORTED_FUNCTIONS
        .iter()
        .any(|supported| supported.eq_ignore_ascii_case(name))
}

fn arity(name: &str, args: &[Expr], min: usize, max: Option<usize>) -> Result<()> {
    let found = args.len();
    if found >= min && max.is_none_or(|max| found <= max) {
        return Ok(());
    }
    let expected = match max {
        Some(max) if max == min => min.to_string(),
        Some(max) => format!("{min}..={max}"),
        None => format!("at least {min}"),
    };
    Err(FormulaError::Arity {
        function: name.to_string(),
        expected,
        found,
    })
}

fn number_arg(name: &str, value: &FormulaValue) -> Result<Option<f64>> {
    match value {
        FormulaValue::Null => Ok(None),
        other => other.as_number().map(Some).ok_or_else(|| {
            FormulaError::Type(format!("{name} expects a number, got {}", other.type_name()))
        }),
    }
}

fn date_arg(name: &str, value: &FormulaValue) -> Result<Option<NaiveDate>> {
    match value {
        FormulaValue::Null => Ok(None),
        FormulaValue::Date(date) => Ok(Some(*date)),
        FormulaValue::DateTime(at) => Ok(Some(at.date())),
        FormulaValue::Text(text) if text.is_empty() => Ok(None),
        FormulaValue::Text(text) => parse_date(text).map(Some).ok_or_else(|| {
            FormulaError::Type(format!("{name} expects a date, got `{text}`"))
        }),
        other => Err(FormulaError::Type(format!(
            "{name} expects a date, got {}",
            other.type_name()
        ))),
    }
}

/// Longest text LPAD and RPAD will build.
pub const MAX_PAD_LENGTH: usize = 32_768;

/// Widest month shift ADDMONTHS accepts, ten thousand years either way.
const MAX_MONTH_SHIFT: i64 = 120_000;

fn count_arg(name: &str, value: &FormulaValue) -> Result<usize> {
    Ok(number_arg(name, value)?.map_or(0, |n| n.max(0.0).trunc() as usize))
}

fn map_number(value: Option<f64>, apply: impl FnOnce(f64) -> f64) -> FormulaValue {
    value.map_or(FormulaValue::Null, |n| FormulaValue::Number(apply(n)))
}

fn pad(text: &str, length: usize, filler: &str, left: bool) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() >= length {
        return chars[..length].iter().collect();
    }
    let filler: Vec<char> = if filler.is_empty() {
        vec![' ']
    } else {
        filler.chars().collect()
    };
    let padding: String = filler
        .iter()
        .cycle()
        .take(length - chars.len())
        .collect();
    if left {
        format!("{padding}{text}")
    } else {
        format!("{text}{padding}")
    }
}

impl Evaluator<'_> {
    pub(crate) fn call(&self, name: &str, args: &[Expr]) -> Result<FormulaValue> {
        use FormulaValue::*;

        // Lazily evaluated forms first.
        match name {
            "IF" => {
                arity(name, args, 2, Some(3))?;
                return if is_truthy(&self.eval(&args[0])?) {
                    self.eval(&args[1])
                } else if let Some(otherwise) = args.get(2) {
                    self.eval(otherwise)
                } else {
                    Ok(Null)
                };
            }
            "AND" => {
                arity(name, args, 1, None)?;
                for arg in args {
                    if !is_truthy(&self.eval(arg)?) {
                        return Ok(Bool(false));
                    }
                }
                return Ok(Bool(true));
            }
            "OR" => {
                arity(name, args, 1, None)?;
                for arg in args {
                    if is_truthy(&self.eval(arg)?) {
                        return Ok(Bool(true));
                    }
                }
                return Ok(Bool(false));
            }
            "CASE" => {
                if args.len() < 4 || args.len() % 2 != 0 {
                    return Err(FormulaError::Arity {
                        function: name.to_string(),
                        expected: "an even count of at least 4".to_string(),
                        found: args.len(),
                    });
                }
                let subject = self.eval(&args[0])?;
                let (pairs, otherwise) = args[1..].split_at(args.len() - 2);
                for pair in pairs.chunks(2) {
                    if values_equal(&subject, &self.eval(&pair[0])?) {
                        return self.eval(&pair[1]);
                    }
                }
                return self.eval(&otherwise[0]);
            }
            "BLANKVALUE" | "NULLVALUE" => {
                arity(name, args, 2, Some(2))?;
                let value = self.eval(&args[0])?;
                return if value.is_blank() {
                    self.eval(&args[1])
                } else {
                    Ok(value)
                };
            }
            _ => {}
        }

        if !is_supported(name) {
            return Err(FormulaError::UnsupportedFunction(name.to_string()));
        }

        let values = args
            .iter()
            .map(|arg| self.eval(arg))
            .collect::<Result<Vec<_>>>()?;
        let text = |index: usize| values[index].to_text();

        let value = match name {
            "ISBLANK" | "ISNULL" => {
                arity(name, args, 1, Some(1))?;
                Bool(values[0].is_blank())
            }
            "NOT" => {
                arity(name, args, 1, Some(1))?;
                Bool(!is_truthy(&values[0]))
            }
            "LEN" => {
                arity(name, args, 1, Some(1))?;
                Number(text(0).chars().count() as f64)
            }
            "LEFT" => {
                arity(name, args, 2, Some(2))?;
                let count = count_arg(name, &values[1])?;
                Text(text(0).chars().take(count).collect())
            }
            "RIGHT" => {
                arity(name, args, 2, Some(2))?;
                let count = count_arg(name, &values[1])?;
                let chars: Vec<char> = text(0).chars().collect();
                let start = chars.len().saturating_sub(count);
                Text(chars[start..].iter().collect())
            }
            "MID" => {
                arity(name, args, 3, Some(3))?;
                let start = count_arg(name, &values[1])?.max(1) - 1;
                let count = count_arg(name, &values[2])?;
                Text(text(0).chars().skip(start).take(count).collect())
            }
            "UPPER" => {
                arity(name, args, 1, Some(1))?;
                map_text(&values[0], |value| value.to_uppercase())
            }
            "LOWER" => {
                arity(name, args, 1, Some(1))?;
                map_text(&values[0], |value| value.to_lowercase())
            }
            "TRIM" => {
                arity(name, args, 1, Some(1))?;
                map_text(&values[0], |value| value.trim().to_string())
            }
            "CONTAINS" => {
                arity(name, args, 2, Some(2))?;
                Bool(text(0).contains(&text(1)))
            }
            "BEGINS" => {
                arity(name, args, 2, Some(2))?;
                Bool(text(0).starts_with(&text(1)))
            }
            "SUBSTITUTE" => {
                arity(name, args, 3, Some(3))?;
                let needle = text(1);
                if needle.is_empty() {
                    values[0].clone()
                } else {
                    Text(text(0).replace(&needle, &text(2)))
                }
            }
            "REGEX" => {
                arity(name, args, 2, Some(2))?;
                let pattern = text(1);
                let compiled = Regex::new(&format!("^(?:{pattern})$")).map_err(|err| {
                    FormulaError::InvalidRegex {
                        pattern: pattern.clone(),
                        message: err.to_string(),
                    }
                })?;
                Bool(compiled.is_match(&text(0)))
            }
            "TEXT" => {
                arity(name, args, 1, Some(1))?;
                Text(text(0))
            }
            "VALUE" => {
                arity(name, args, 1, Some(1))?;
                match &values[0] {
                    Null => Null,
                    other => Number(other.as_number().ok_or_else(|| {
                        FormulaError::Type(format!("VALUE cannot parse `{}`", other.to_text()))
                    })?),
                }
            }
            "ISNUMBER" => {
                arity(name, args, 1, Some(1))?;
                Bool(matches!(&values[0], Number(_)) || text(0).trim().parse::<f64>().is_ok())
            }
            "ISPICKVAL" => {
                arity(name, args, 2, Some(2))?;
                Bool(values_equal(&values[0], &values[1]))
            }
            "INCLUDES" => {
                arity(name, args, 2, Some(2))?;
                let wanted = text(1);
                Bool(
                    text(0)
                        .split(MULTI_SELECT_DELIMITER)
                        .any(|selected| selected.trim() == wanted),
                )
            }
            "LPAD" | "RPAD" => {
                arity(name, args, 2, Some(3))?;
                let length = count_arg(name, &values[1])?;
                if length > MAX_PAD_LENGTH {
                    return Err(FormulaError::Type(format!(
                        "{name} length {length} exceeds {MAX_PAD_LENGTH}"
                    )));
                }
                let filler = values.get(2).map(|value| value.to_text()).unwrap_or_default();
                Text(pad(&text(0), length, &filler, name == "LPAD"))
            }
            "FIND" => {
                arity(name, args, 2, Some(3))?;
                let needle: Vec<char> = text(0).chars().collect();
                let haystack: Vec<char> = text(1).chars().collect();
                let start = match values.get(2) {
                    Some(value) => count_arg(name, value)?.max(1) - 1,
                    None => 0,
                };
                let position = if needle.is_empty() {
                    None
                } else {
                    (start..haystack.len().saturating_sub(needle.len() - 1))
                        .find(|&index| haystack[index..index + needle.len()] == needle[..])
                };
                Number(position.map_or(0.0, |index| (index + 1) as f64))
            }
            "ROUND" => {
                arity(name, args, 2, Some(2))?;
                let digits = number_arg(name, &values[1])?.unwrap_or(0.0).trunc() as i32;
                let factor = 10f64.powi(digits);
                map_number(number_arg(name, &values[0])?, |n| (n * factor).round() / factor)
            }
            "FLOOR" => {
                arity(name, args, 1, Some(1))?;
                map_number(number_arg(name, &values[0])?, f64::floor)
            }
            "CEILING" => {
                arity(name, args, 1, Some(1))?;
                map_number(number_arg(name, &values[0])?, f64::ceil)
            }
            "ABS" => {
                arity(name, args, 1, Some(1))?;
                map_number(number_arg(name, &values[0])?, f64::abs)
            }
            "SQRT" => {
                arity(name, args, 1, Some(1))?;
                match number_arg(name, &values[0])? {
                    Some(n) if n < 0.0 => {
                        return Err(FormulaError::Type("SQRT of a negative number".to_string()));
                    }
                    other => map_number(other, f64::sqrt),
                }
            }
            "MAX" | "MIN" => {
                arity(name, args, 1, None)?;
                let mut best: Option<f64> = None;
                for value in &values {
                    let Some(n) = number_arg(name, value)? else {
                        return Ok(Null);
                    };
                    best = Some(match best {
                        Some(current) if name == "MAX" => current.max(n),
                        Some(current) => current.min(n),
                        None => n,
                    });
                }
                map_number(best, |n| n)
            }
            "MOD" => {
                arity(name, args, 2, Some(2))?;
                match (number_arg(name, &values[0])?, number_arg(name, &values[1])?) {
                    (Some(_), Some(divisor)) if divisor == 0.0 => {
                        return Err(FormulaError::DivisionByZero);
                    }
                    (Some(n), Some(divisor)) => Number(n % divisor),
                    _ => Null,
                }
            }
            "TODAY" => {
                arity(name, args, 0, Some(0))?;
                Date(self.ctx.today())
            }
            "NOW" => {
                arity(name, args, 0, Some(0))?;
                DateTime(self.ctx.reference)
            }
            "DATE" => {
                arity(name, args, 3, Some(3))?;
                let parts = (
                    number_arg(name, &values[0])?,
                    number_arg(name, &values[1])?,
                    number_arg(name, &values[2])?,
                );
                let (Some(year), Some(month), Some(day)) = parts else {
                    return Ok(Null);
                };
                let date = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                    .ok_or_else(|| {
                        FormulaError::Type(format!("invalid date {year}-{month}-{day}"))
                    })?;
                Date(date)
            }
            "DATEVALUE" => {
                arity(name, args, 1, Some(1))?;
                match &values[0] {
                    Text(value) if !value.is_empty() => parse_date(value)
                        .or_else(|| parse_datetime(value).map(|at| at.date()))
                        .map(Date)
                        .ok_or_else(|| {
                            FormulaError::Type(format!("DATEVALUE cannot parse `{value}`"))
                        })?,
                    other => date_arg(name, other)?.map_or(Null, Date),
                }
            }
            "YEAR" | "MONTH" | "DAY" | "WEEKDAY" => {
                arity(name, args, 1, Some(1))?;
                match date_arg(name, &values[0])? {
                    None => Null,
                    Some(date) => Number(match name {
                        "YEAR" => date.year() as f64,
                        "MONTH" => date.month() as f64,
                        "DAY" => date.day() as f64,
                        _ => date.weekday().number_from_sunday() as f64,
                    }),
                }
            }
            "ADDMONTHS" => {
                arity(name, args, 2, Some(2))?;
                let (Some(date), Some(months)) =
                    (date_arg(name, &values[0])?, number_arg(name, &values[1])?)
                else {
                    return Ok(Null);
                };
                let months = months.trunc();
                if !(-(MAX_MONTH_SHIFT as f64)..=MAX_MONTH_SHIFT as f64).contains(&months) {
                    return Err(FormulaError::Type(format!(
                        "{name} shift {months} is out of range"
                    )));
                }
                let shift = Months::new(months.abs() as u32);
                let shifted = if months >= 0.0 {
                    date.checked_add_months(shift)
                } else {
                    date.checked_sub_months(shift)
                };
                Date(shifted.ok_or_else(|| FormulaError::Type("date out of range".to_string()))?)
            }
            other => return Err(FormulaError::UnsupportedFunction(other.to_string())),
        };

        Ok(value)
    }
}

fn map_text(value: &FormulaValue, apply: impl FnOnce(&str) -> String) -> FormulaValue {
    match value {
        FormulaValue::Null => FormulaValue::Null,
        other => FormulaValue::Text(apply(&other.to_text())),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use recordsmith_core::{FieldTypeMap, Record, RecordValue};

    use crate::errors::FormulaError;
    use crate::eval::{EvalContext, evaluate, try_evaluate};
    use crate::value::FormulaValue;

    fn ctx() -> EvalContext {
        EvalContext::at_date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap())
    }

    fn eval_with(formula: &str, record: &Record) -> Result<FormulaValue, FormulaError> {
        try_evaluate(formula, record, &FieldTypeMap::new(), &ctx())
    }

    fn eval(formula: &str) -> FormulaValue {
        eval_with(formula, &Record::new()).expect("evaluate")
    }

    fn text(value: &str) -> FormulaValue {
        FormulaValue::Text(value.to_string())
    }

    #[test]
    fn string_functions() {
        assert_eq!(eval("LEN('héllo')"), FormulaValue::Number(5.0));
        assert_eq!(eval("LEFT('abcdef', 2) & RIGHT('abcdef', 2)"), text("abef"));
        assert_eq!(eval("MID('abcdef', 2, 3)"), text("bcd"));
        assert_eq!(eval("SUBSTITUTE('a-b-c', '-', '/')"), text("a/b/c"));
        assert_eq!(eval("LPAD('7', 3, '0')"), text("007"));
        assert_eq!(eval("RPAD('ab', 4)"), text("ab  "));
        assert_eq!(eval("FIND('c', 'abcabc', 4)"), FormulaValue::Number(6.0));
        assert_eq!(eval("FIND('z', 'abc')"), FormulaValue::Number(0.0));
        assert_eq!(eval("UPPER(TRIM('  ok '))"), text("OK"));
    }

    #[test]
    fn regex_requires_full_match() {
        assert_eq!(eval("REGEX('2000', '[0-9]{4}')"), FormulaValue::Bool(true));
        assert_eq!(eval("REGEX('20001', '[0-9]{4}')"), FormulaValue::Bool(false));
        assert!(matches!(
            eval_with("REGEX('x', '(')", &Record::new()),
            Err(FormulaError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn case_and_blankvalue_short_circuit() {
        assert_eq!(eval("CASE(2, 1, 'one', 2, 'two', 'other')"), text("two"));
        assert_eq!(eval("CASE(9, 1, 'one', 'other')"), text("other"));
        // the untaken branch would divide by zero
        assert_eq!(eval("IF(true, 1, 1/0)"), FormulaValue::Number(1.0));
        assert_eq!(eval("OR(true, 1/0 > 1)"), FormulaValue::Bool(true));
        assert_eq!(eval("BLANKVALUE(Missing, 'fallback')"), text("fallback"));
    }

    #[test]
    fn picklist_helpers() {
        let mut record = Record::new();
        record.insert("Stage".to_string(), RecordValue::Text("Won".to_string()));
        record.insert(
            "Regions".to_string(),
            RecordValue::MultiSelect(vec!["EMEA".to_string(), "APAC".to_string()]),
        );
        let check = |formula: &str| eval_with(formula, &record).expect("evaluate");
        assert_eq!(check("ISPICKVAL(Stage, 'Won')"), FormulaValue::Bool(true));
        assert_eq!(check("ISPICKVAL(Missing, '')"), FormulaValue::Bool(true));
        assert_eq!(check("INCLUDES(Regions, 'APAC')"), FormulaValue::Bool(true));
        assert_eq!(check("INCLUDES(Regions, 'AMER')"), FormulaValue::Bool(false));
    }

    #[test]
    fn numeric_functions() {
        assert_eq!(eval("ROUND(2.346, 2)"), FormulaValue::Number(2.35));
        assert_eq!(eval("MAX(1, 7, 3) - MIN(4, 2)"), FormulaValue::Number(5.0));
        assert_eq!(eval("MOD(7, 3)"), FormulaValue::Number(1.0));
        assert_eq!(eval("FLOOR(-1.5)"), FormulaValue::Number(-2.0));
        assert_eq!(eval("SQRT(16)"), FormulaValue::Number(4.0));
        assert_eq!(eval("VALUE('12') + 1"), FormulaValue::Number(13.0));
        assert_eq!(eval("ABS(Missing)"), FormulaValue::Null);
    }

    #[test]
    fn date_functions_use_reference_date() {
        let date = |y, m, d| FormulaValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap());
        assert_eq!(eval("TODAY()"), date(2024, 1, 31));
        assert_eq!(eval("ADDMONTHS(TODAY(), 1)"), date(2024, 2, 29));
        assert_eq!(eval("YEAR(DATE(2023, 5, 9))"), FormulaValue::Number(2023.0));
        assert_eq!(eval("DATEVALUE('2023-05-09T10:00:00Z')"), date(2023, 5, 9));
        // 2024-01-31 was a Wednesday
        assert_eq!(eval("WEEKDAY(TODAY())"), FormulaValue::Number(4.0));
    }

    #[test]
    fn arity_and_unknown_functions_error() {
        assert!(matches!(
            eval_with("LEN()", &Record::new()),
            Err(FormulaError::Arity { .. })
        ));
        assert_eq!(
            eval_with("VLOOKUP(A, B)", &Record::new()),
            Err(FormulaError::UnsupportedFunction("VLOOKUP".to_string()))
        );
    }

    #[test]
    fn oversized_pads_and_month_shifts_fail_closed() {
        for formula in [
            "LEN(LPAD('x', 1000000000000)) > 0",
            "LEN(RPAD('x', 32769, 'ab')) > 0",
            "ADDMONTHS(TODAY(), 10000000000) > TODAY()",
            "ADDMONTHS(TODAY(), -5000000000) < TODAY()",
        ] {
            assert!(
                matches!(eval_with(formula, &Record::new()), Err(FormulaError::Type(_))),
                "{formula} should be a type error"
            );
            assert_eq!(
                evaluate(formula, &Record::new(), &FieldTypeMap::new(), &ctx()),
                FormulaValue::Bool(false)
            );
        }
        assert_eq!(eval("LEN(LPAD('x', 32768))"), FormulaValue::Number(32768.0));
    }

    #[test]
    fn whitespace_text_counts_as_blank() {
        let mut record = Record::new();
        record.insert("Industry".to_string(), RecordValue::Text("   ".to_string()));
        assert!(record["Industry"].is_blank());
        assert_eq!(
            eval_with("ISBLANK(Industry)", &record),
            Ok(FormulaValue::Bool(true))
        );
        assert_eq!(eval("ISBLANK(' \t')"), FormulaValue::Bool(true));
        assert_eq!(eval("BLANKVALUE('  ', 'fallback')"), text("fallback"));
        assert_eq!(eval("ISBLANK(' x ')"), FormulaValue::Bool(false));
    }
}
