use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use recordsmith_core::{FieldTypeMap, Record, RecordValue};
use tracing::warn;

use crate::ast::{BinaryOp, Expr, UnaryOp, referenced_fields};
use crate::errors::{FormulaError, Result};
use crate::parser::parse;
use crate::value::{FormulaValue, is_truthy};

/// Evaluation context; `TODAY()` and `NOW()` read the reference instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalContext {
    pub reference: NaiveDateTime,
}

impl EvalContext {
    pub fn new(reference: NaiveDateTime) -> Self {
        Self { reference }
    }

    /// Context anchored at midnight of `date`.
    pub fn at_date(date: NaiveDate) -> Self {
        Self {
            reference: date.and_time(chrono::NaiveTime::MIN),
        }
    }

    /// Context anchored at the current UTC instant, captured once.
    pub fn now() -> Self {
        Self {
            reference: Utc::now().naive_utc(),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.reference.date()
    }
}

/// A parsed formula ready for repeated evaluation.
#[derive(Debug, Clone)]
pub struct Formula {
    source: String,
    expr: Expr,
    fields: BTreeSet<String>,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self> {
        let expr = parse(source)?;
        let fields = referenced_fields(&expr);
        Ok(Self {
            source: source.to_string(),
            expr,
            fields,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Record fields this formula reads.
    pub fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    pub fn evaluate(
        &self,
        record: &Record,
        field_types: &FieldTypeMap,
        ctx: &EvalContext,
    ) -> Result<FormulaValue> {
        Evaluator {
            record,
            field_types,
            ctx,
        }
        .eval(&self.expr)
    }
}

/// Evaluate `formula` against `record`, surfacing every failure.
pub fn try_evaluate(
    formula: &str,
    record: &Record,
    field_types: &FieldTypeMap,
    ctx: &EvalContext,
) -> Result<FormulaValue> {
    Formula::parse(formula)?.evaluate(record, field_types, ctx)
}

/// Evaluate `formula`, mapping any failure to `Bool(false)` so an
/// unevaluable rule never reports a violation.
pub fn evaluate(
    formula: &str,
    record: &Record,
    field_types: &FieldTypeMap,
    ctx: &EvalContext,
) -> FormulaValue {
    match try_evaluate(formula, record, field_types, ctx) {
        Ok(value) => value,
        Err(err) => {
            warn!(formula, error = %err, "formula evaluation failed; treating as not violated");
            FormulaValue::Bool(false)
        }
    }
}

pub(crate) struct Evaluator<'a> {
    pub(crate) record: &'a Record,
    pub(crate) field_types: &'a FieldTypeMap,
    pub(crate) ctx: &'a EvalContext,
}

impl Evaluator<'_> {
    pub(crate) fn eval(&self, expr: &Expr) -> Result<FormulaValue> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Field(name) => Ok(self.resolve_field(name)),
            Expr::Unary { op, expr } => {
                let value = self.eval(expr)?;
                unary(*op, value)
            }
            Expr::Binary { op, left, right } => match op {
                BinaryOp::And => {
                    if !is_truthy(&self.eval(left)?) {
                        return Ok(FormulaValue::Bool(false));
                    }
                    Ok(FormulaValue::Bool(is_truthy(&self.eval(right)?)))
                }
                BinaryOp::Or => {
                    if is_truthy(&self.eval(left)?) {
                        return Ok(FormulaValue::Bool(true));
                    }
                    Ok(FormulaValue::Bool(is_truthy(&self.eval(right)?)))
                }
                _ => {
                    let left = self.eval(left)?;
                    let right = self.eval(right)?;
                    binary(*op, left, right)
                }
            },
            Expr::Call { name, args } => self.call(name, args),
        }
    }

    fn resolve_field(&self, name: &str) -> FormulaValue {
        if name.starts_with('$') {
            return FormulaValue::Null;
        }
        let value = self.record.get(name).or_else(|| {
            self.record
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        });
        let declared = self.field_types.get(name).copied().or_else(|| {
            self.field_types
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, field_type)| *field_type)
        });
        match value {
            Some(value) => FormulaValue::from_record_value(value, declared),
            None => FormulaValue::from_record_value(&RecordValue::Null, declared),
        }
    }
}

fn unary(op: UnaryOp, value: FormulaValue) -> Result<FormulaValue> {
    match op {
        UnaryOp::Not => Ok(FormulaValue::Bool(!is_truthy(&value))),
        UnaryOp::Neg | UnaryOp::Plus => match value {
            FormulaValue::Null => Ok(FormulaValue::Null),
            other => {
                let number = other.as_number().ok_or_else(|| {
                    FormulaError::Type(format!("cannot negate {}", other.type_name()))
                })?;
                Ok(FormulaValue::Number(if op == UnaryOp::Neg {
                    -number
                } else {
                    number
                }))
            }
        },
    }
}

fn binary(op: BinaryOp, left: FormulaValue, right: FormulaValue) -> Result<FormulaValue> {
    match op {
        BinaryOp::Eq => Ok(FormulaValue::Bool(values_equal(&left, &right))),
        BinaryOp::Ne => Ok(FormulaValue::Bool(!values_equal(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let Some(ordering) = compare(&left, &right)? else {
                return Ok(FormulaValue::Bool(false));
            };
            Ok(FormulaValue::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::Concat => Ok(FormulaValue::Text(format!(
            "{}{}",
            left.to_text(),
            right.to_text()
        ))),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Pow => {
            arithmetic(op, left, right)
        }
        BinaryOp::And | BinaryOp::Or => Ok(FormulaValue::Bool(match op {
            BinaryOp::And => is_truthy(&left) && is_truthy(&right),
            _ => is_truthy(&left) || is_truthy(&right),
        })),
    }
}

/// Equality with blank semantics: Null and empty text are equal.
pub(crate) fn values_equal(left: &FormulaValue, right: &FormulaValue) -> bool {
    if left.is_blank() || right.is_blank() {
        return left.is_blank() && right.is_blank();
    }
    match (left, right) {
        (FormulaValue::Number(a), FormulaValue::Number(b)) => (a - b).abs() < f64::EPSILON,
        (FormulaValue::Text(a), FormulaValue::Text(b)) => a == b,
        (FormulaValue::Bool(a), FormulaValue::Bool(b)) => a == b,
        _ => match compare(left, right) {
            Ok(Some(ordering)) => ordering == Ordering::Equal,
            _ => left.to_text() == right.to_text(),
        },
    }
}

/// Ordering between two values; `None` when either side is Null.
fn compare(left: &FormulaValue, right: &FormulaValue) -> Result<Option<Ordering>> {
    use FormulaValue::*;

    let ordering = match (left, right) {
        (Null, _) | (_, Null) => return Ok(None),
        (Number(a), Number(b)) => a.partial_cmp(b),
        (Text(a), Text(b)) => Some(a.cmp(b)),
        (Bool(a), Bool(b)) => Some(a.cmp(b)),
        (Date(a), Date(b)) => Some(a.cmp(b)),
        (DateTime(a), DateTime(b)) => Some(a.cmp(b)),
        (Date(a), DateTime(b)) => Some(a.and_time(chrono::NaiveTime::MIN).cmp(b)),
        (DateTime(a), Date(b)) => Some(a.cmp(&b.and_time(chrono::NaiveTime::MIN))),
        (Number(_), Text(_)) | (Text(_), Number(_)) => {
            match (left.as_number(), right.as_number()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            }
        }
        _ => None,
    };

    ordering.map(Some).ok_or_else(|| {
        FormulaError::Type(format!(
            "cannot compare {} with {}",
            left.type_name(),
            right.type_name()
        ))
    })
}

fn arithmetic(op: BinaryOp, left: FormulaValue, right: FormulaValue) -> Result<FormulaValue> {
    use FormulaValue::*;

    if matches!(left, Null) || matches!(right, Null) {
        return Ok(Null);
    }

    match (op, &left, &right) {
        (BinaryOp::Add, Text(a), Text(b)) => return Ok(Text(format!("{a}{b}"))),
        (BinaryOp::Add, Date(date), Number(days)) | (BinaryOp::Add, Number(days), Date(date)) => {
            return shift_date(*date, *days).map(Date);
        }
        (BinaryOp::Sub, Date(date), Number(days)) => return shift_date(*date, -*days).map(Date),
        (BinaryOp::Add, DateTime(at), Number(days))
        | (BinaryOp::Add, Number(days), DateTime(at)) => {
            return shift_datetime(*at, *days).map(DateTime);
        }
        (BinaryOp::Sub, DateTime(at), Number(days)) => {
            return shift_datetime(*at, -*days).map(DateTime);
        }
        (BinaryOp::Sub, Date(a), Date(b)) => {
            return Ok(Number(a.signed_duration_since(*b).num_days() as f64));
        }
        (BinaryOp::Sub, DateTime(a), DateTime(b)) => {
            let seconds = a.signed_duration_since(*b).num_seconds() as f64;
            return Ok(Number(seconds / 86_400.0));
        }
        _ => {}
    }

    let (Some(a), Some(b)) = (left.as_number(), right.as_number()) else {
        return Err(FormulaError::Type(format!(
            "arithmetic on {} and {}",
            left.type_name(),
            right.type_name()
        )));
    };

    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            a / b
        }
        _ => a.powf(b),
    };
    Ok(Number(value))
}

fn shift_date(date: NaiveDate, days: f64) -> Result<NaiveDate> {
    Duration::try_days(days.trunc() as i64)
        .and_then(|delta| date.checked_add_signed(delta))
        .ok_or_else(|| FormulaError::Type("date out of range".to_string()))
}

fn shift_datetime(at: NaiveDateTime, days: f64) -> Result<NaiveDateTime> {
    Duration::try_seconds((days * 86_400.0).round() as i64)
        .and_then(|delta| at.checked_add_signed(delta))
        .ok_or_else(|| FormulaError::Type("datetime out of range".to_string()))
}
