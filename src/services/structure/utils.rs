use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use super::types::ColumnStatistics;

const DATETIME_FORMATS: [&str; 7] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: [&str; 9] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

pub fn is_date_string(s: &str) -> bool {
    let s = s.trim();
    if s.is_empty() {
        return false;
    }
    if DateTime::parse_from_rfc3339(s).is_ok() {
        return true;
    }
    DATETIME_FORMATS
        .iter()
        .any(|format| NaiveDateTime::parse_from_str(s, format).is_ok())
        || DATE_FORMATS
            .iter()
            .any(|format| NaiveDate::parse_from_str(s, format).is_ok())
}

pub fn is_datetime_value(value: &Value) -> bool {
    matches!(value, Value::String(s) if is_date_string(s))
}

/// Numeric reading of a value: JSON numbers and float-like strings. Booleans
/// and non-finite values never count.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Value as shown to a reader: strings unquoted, everything else as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Equality used for cardinality: numbers compare by value (`1` == `1.0`),
/// strings never equal numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DistinctKey {
    Number(u64),
    Text(String),
    Other(String),
}

impl DistinctKey {
    pub fn of(value: &Value) -> DistinctKey {
        match value {
            Value::Number(n) => match n.as_f64() {
                // Fold -0.0 onto 0.0
                Some(f) if f == 0.0 => DistinctKey::Number(0f64.to_bits()),
                Some(f) => DistinctKey::Number(f.to_bits()),
                None => DistinctKey::Other(n.to_string()),
            },
            Value::String(s) => DistinctKey::Text(s.clone()),
            other => DistinctKey::Other(other.to_string()),
        }
    }
}

pub fn summarize(mut values: Vec<f64>) -> Option<ColumnStatistics> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let len = values.len();
    let mean = values.iter().sum::<f64>() / len as f64;
    let median = if len % 2 == 0 {
        (values[len / 2 - 1] + values[len / 2]) / 2.0
    } else {
        values[len / 2]
    };

    Some(ColumnStatistics {
        min: values[0],
        max: values[len - 1],
        mean,
        median,
    })
}
