//! Dynamically typed values used by filter conditions and in-memory rows

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use super::{FieldKind, QueryError};

/// A filter operand or a field value read from an in-memory row.
///
/// Filter values arriving from URLs are always `Text`; they are coerced to the
/// field kind when compared or bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    /// Only produced by rows; JSON strings always deserialize as `Text`
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Elements of a list value; a scalar behaves as a one-element list
    pub fn as_list(&self) -> Vec<&Value> {
        match self {
            Value::List(items) => items.iter().collect(),
            other => vec![other],
        }
    }

    /// Text form used for substring matching and URL encoding
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::List(items) => items
                .iter()
                .map(Value::to_text)
                .collect::<Vec<_>>()
                .join(","),
            Value::Timestamp(t) => t.to_rfc3339(),
        }
    }

    /// Coerce to a typed scalar for the given field kind.
    ///
    /// Returns `None` for nulls, lists and values that do not parse as the kind.
    pub fn to_scalar(&self, kind: FieldKind) -> Option<Scalar> {
        match (kind, self) {
            (_, Value::Null) | (_, Value::List(_)) => None,
            (FieldKind::Text, v) | (FieldKind::TextArray, v) => Some(Scalar::Text(normalize_text(&v.to_text()))),
            (FieldKind::Integer, Value::Int(i)) => Some(Scalar::Int(*i)),
            (FieldKind::Integer, Value::Float(f))
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 =>
            {
                Some(Scalar::Int(*f as i64))
            }
            (FieldKind::Integer, Value::Text(s)) => s.trim().parse().ok().map(Scalar::Int),
            (FieldKind::Decimal, Value::Int(i)) => Some(Scalar::Decimal(Decimal::from(*i))),
            (FieldKind::Decimal, Value::Float(f)) => Decimal::try_from(*f).ok().map(Scalar::Decimal),
            (FieldKind::Decimal, Value::Text(s)) => Decimal::from_str(s.trim()).ok().map(Scalar::Decimal),
            (FieldKind::Boolean, Value::Bool(b)) => Some(Scalar::Bool(*b)),
            (FieldKind::Boolean, Value::Text(s)) => parse_bool(s).map(Scalar::Bool),
            (FieldKind::Timestamp, Value::Timestamp(t)) => Some(Scalar::Timestamp(*t)),
            (FieldKind::Timestamp, Value::Text(s)) => parse_timestamp(s).map(Scalar::Timestamp),
            (FieldKind::Uuid, Value::Text(s)) => Uuid::parse_str(s.trim()).ok().map(Scalar::Uuid),
            _ => None,
        }
    }

    /// Like [`Value::to_scalar`] but reports why a filter operand is unusable
    pub fn expect_scalar(&self, kind: FieldKind, field: &str) -> Result<Scalar, QueryError> {
        self.to_scalar(kind).ok_or_else(|| QueryError::InvalidValue {
            field: field.to_string(),
            reason: format!("'{}' is not a valid {:?} value", self.to_text(), kind),
        })
    }
}

/// A filter operand or field value coerced to a field's kind.
///
/// Only scalars of the same variant are compared with each other.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum Scalar {
    Text(String),
    Int(i64),
    Decimal(Decimal),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::List(v.into_iter().map(Value::Text).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "t" | "1" | "yes" => Some(true),
        "false" | "f" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates (midnight UTC)
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// NFC-normalizes text so composed and decomposed Arabic or Latin forms compare equal
pub fn normalize_text(s: &str) -> String {
    s.nfc().collect()
}

/// Case-insensitive comparison key for substring matching
pub fn fold_case(s: &str) -> String {
    normalize_text(s).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_deserialization() {
        let v: Value = serde_json::from_str("42").unwrap();
        assert_eq!(v, Value::Int(42));
        let v: Value = serde_json::from_str("4.5").unwrap();
        assert_eq!(v, Value::Float(4.5));
        let v: Value = serde_json::from_str("\"2024-01-01\"").unwrap();
        assert_eq!(v, Value::Text("2024-01-01".to_string()));
        let v: Value = serde_json::from_str("null").unwrap();
        assert!(v.is_null());
        let v: Value = serde_json::from_str("[1, \"a\"]").unwrap();
        assert_eq!(v, Value::List(vec![Value::Int(1), Value::Text("a".to_string())]));
    }

    #[test]
    fn test_coercion_by_kind() {
        assert_eq!(Value::from("42").to_scalar(FieldKind::Integer), Some(Scalar::Int(42)));
        assert_eq!(Value::Float(3.0).to_scalar(FieldKind::Integer), Some(Scalar::Int(3)));
        assert_eq!(Value::Float(1e300).to_scalar(FieldKind::Integer), None);
        assert_eq!(Value::Float(-1e19).to_scalar(FieldKind::Integer), None);
        assert_eq!(Value::from("abc").to_scalar(FieldKind::Integer), None);
        assert_eq!(Value::from("yes").to_scalar(FieldKind::Boolean), Some(Scalar::Bool(true)));
        assert_eq!(
            Value::from("1.50").to_scalar(FieldKind::Decimal),
            Some(Scalar::Decimal(Decimal::new(150, 2)))
        );
        assert_eq!(Value::Int(7).to_scalar(FieldKind::Text), Some(Scalar::Text("7".to_string())));
        assert_eq!(Value::Null.to_scalar(FieldKind::Text), None);
    }

    #[test]
    fn test_uuid_case_insensitive() {
        let id = Uuid::new_v4();
        let upper = Value::from(id.to_string().to_uppercase());
        assert_eq!(upper.to_scalar(FieldKind::Uuid), Some(Scalar::Uuid(id)));
    }

    #[test]
    fn test_timestamp_against_date_text() {
        let t = parse_timestamp("2024-03-10T12:00:00Z").unwrap();
        let day = Value::from("2024-03-10").to_scalar(FieldKind::Timestamp).unwrap();
        assert!(Scalar::Timestamp(t) > day);
        let next = Value::from("2024-03-11").to_scalar(FieldKind::Timestamp).unwrap();
        assert!(Scalar::Timestamp(t) < next);
    }

    #[test]
    fn test_expect_scalar_reports_field() {
        let err = Value::from("soon").expect_scalar(FieldKind::Timestamp, "due_date").unwrap_err();
        assert!(matches!(err, QueryError::InvalidValue { ref field, .. } if field == "due_date"));
    }

    #[test]
    fn test_fold_case_normalizes() {
        // "é" precomposed vs "e" + combining acute
        assert_eq!(fold_case("Caf\u{e9}"), fold_case("CAFE\u{301}"));
    }
}
