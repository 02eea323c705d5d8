//! Runtime values of the formula interpreter

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use std::fmt;

use super::EvalError;
use crate::domain::FieldValue;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Bool(bool),
    Date(DateTime<Utc>),
    List(Vec<String>),
    /// Parent that has no value in the session
    Blank,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::Bool(_) => "boolean",
            Self::Date(_) => "date",
            Self::List(_) => "list",
            Self::Blank => "blank",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Text(s) => !s.is_empty(),
            Self::Bool(b) => *b,
            Self::Date(_) | Self::List(_) => true,
            Self::Blank => false,
        }
    }

    /// Numeric view used by arithmetic and ordering
    pub fn to_number(&self) -> Result<f64, EvalError> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Self::Date(d) => Ok(d.timestamp_millis() as f64),
            Self::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| EvalError::TypeMismatch(format!("{:?} is not a number", s))),
            Self::List(_) | Self::Blank => Err(EvalError::TypeMismatch(format!(
                "{} is not a number",
                self.type_name()
            ))),
        }
    }

    pub fn to_date(&self) -> Result<DateTime<Utc>, EvalError> {
        match self {
            Self::Date(d) => Ok(*d),
            Self::Text(s) => parse_date(s),
            Self::Number(ms) => date_from_millis(*ms),
            other => Err(EvalError::TypeMismatch(format!(
                "{} is not a date",
                other.type_name()
            ))),
        }
    }

    /// Session value produced by a derived field
    pub fn into_field_value(self) -> Result<FieldValue, EvalError> {
        match self {
            Self::Number(n) if n.is_finite() => Ok(FieldValue::Number(n)),
            Self::Number(_) => Err(EvalError::NonFinite),
            Self::Text(s) => Ok(FieldValue::Text(s)),
            Self::Bool(b) => Ok(FieldValue::Text(b.to_string())),
            Self::Date(d) => Ok(FieldValue::Text(d.to_rfc3339_opts(SecondsFormat::Millis, true))),
            Self::List(items) => Ok(FieldValue::List(items)),
            Self::Blank => Ok(FieldValue::blank()),
        }
    }
}

impl From<&FieldValue> for Value {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Number(n) => Self::Number(*n),
            FieldValue::Text(s) => Self::Text(s.clone()),
            FieldValue::List(items) => Self::List(items.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Date(d) => write!(f, "{}", d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Self::List(items) => write!(f, "{}", items.join(",")),
            Self::Blank => Ok(()),
        }
    }
}

/// Parse the date formats a date input or ISO timestamp produces. Values
/// without an offset are read as UTC.
pub fn parse_date(s: &str) -> Result<DateTime<Utc>, EvalError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight));
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(EvalError::InvalidDate(s.to_string()))
}

fn date_from_millis(ms: f64) -> Result<DateTime<Utc>, EvalError> {
    if !ms.is_finite() {
        return Err(EvalError::NonFinite);
    }
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .ok_or_else(|| EvalError::InvalidDate(ms.to_string()))
}

/// Whole days from `from` to `to`, rounded down
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    ((to - from).num_milliseconds() as f64 / MILLIS_PER_DAY).floor()
}

/// Whole days since the Unix epoch
pub fn days_since_epoch(at: DateTime<Utc>) -> f64 {
    (at.timestamp_millis() as f64 / MILLIS_PER_DAY).floor()
}
