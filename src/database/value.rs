//! Scalar column values.
//!
//! Every attribute of a [`Record`](super::record::Record) and every positional
//! binding of a [`QueryBuilder`](super::query::QueryBuilder) is a [`Value`]. The
//! variants mirror SQLite's storage classes; booleans are stored as `0`/`1` and
//! dates as ISO-8601 text.

use std::fmt;

use chrono::NaiveDate;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use serde::Serialize;

/// A single scalar value read from or bound to the database.
///
/// # Examples
///
/// ```
/// use captacion::database::Value;
///
/// assert_eq!(Value::from(42), Value::Integer(42));
/// assert_eq!(Value::from("ana"), Value::Text("ana".into()));
/// assert_eq!(Value::from(true), Value::Integer(1));
/// assert!(Value::from(None::<i64>).is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of the value. Text is parsed; reals only when integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(*f as i64),
            Value::Real(_) => None,
            Value::Text(s) => s.trim().parse().ok(),
            Value::Null => None,
        }
    }

    /// Floating-point view of the value. Text is parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness as SQLite sees it: non-zero numbers and non-empty text.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Integer(i) => *i != 0,
            Value::Real(f) => *f != 0.0,
            Value::Text(s) => !s.is_empty() && s != "0",
        }
    }

    /// Parses an ISO-8601 (`YYYY-MM-DD`) date, ignoring any time suffix.
    pub fn as_date(&self) -> Option<NaiveDate> {
        let s = self.as_str()?;
        let day = s.get(..10).unwrap_or(s);
        NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
    }

    /// Converts a decoded JSON scalar into a column value.
    ///
    /// Booleans become `0`/`1`; arrays and objects are stored as their JSON text.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::from(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map_or(Value::Null, Value::Real),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Text(v.format("%Y-%m-%d").to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Real(f) => ToSqlOutput::from(*f),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Text(hex::encode(b)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_views() {
        assert_eq!(Value::Text(" 12 ".into()).as_i64(), Some(12));
        assert_eq!(Value::Real(3.0).as_i64(), Some(3));
        assert_eq!(Value::Real(1.9).as_i64(), None);
        assert_eq!(Value::Real(f64::NAN).as_i64(), None);
        assert_eq!(Value::Real(1e300).as_i64(), None);
        assert_eq!(Value::Integer(3).as_f64(), Some(3.0));
        assert_eq!(Value::Null.as_f64(), None);
    }

    #[test]
    fn date_view_ignores_time_suffix() {
        let v = Value::from("2010-05-17 00:00:00");
        assert_eq!(v.as_date(), NaiveDate::from_ymd_opt(2010, 5, 17));
        assert_eq!(Value::from("17/05/2010").as_date(), None);
    }

    #[test]
    fn json_scalars_convert() {
        let json = serde_json::json!({"a": true, "b": 1.5, "c": "x", "d": null, "e": [1]});
        assert_eq!(Value::from_json(&json["a"]), Value::Integer(1));
        assert_eq!(Value::from_json(&json["b"]), Value::Real(1.5));
        assert_eq!(Value::from_json(&json["c"]), Value::from("x"));
        assert_eq!(Value::from_json(&json["d"]), Value::Null);
        assert_eq!(Value::from_json(&json["e"]), Value::from("[1]"));
    }

    #[test]
    fn serializes_untagged() {
        let out = serde_json::to_string(&vec![
            Value::Null,
            Value::Integer(1),
            Value::Text("a".into()),
        ])
        .unwrap();
        assert_eq!(out, r#"[null,1,"a"]"#);
    }

    #[test]
    fn truthiness() {
        assert!(Value::Integer(1).as_bool());
        assert!(!Value::Text("0".into()).as_bool());
        assert!(!Value::Null.as_bool());
    }
}
