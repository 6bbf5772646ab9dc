use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;

/// Values that can be stored in a database row or used as query parameters.
///
/// ```rust
/// use sql_session::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Wall-clock timestamp, rendered as-is
    Timestamp(NaiveDateTime),
    /// Instant in time, rendered in the connection's timezone
    TimestampTz(DateTime<Utc>),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RowValues::Bool(value) => Some(*value),
            RowValues::Int(1) => Some(true),
            RowValues::Int(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            RowValues::Timestamp(value) => Some(*value),
            RowValues::TimestampTz(value) => Some(value.naive_utc()),
            RowValues::Text(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                .ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<i32> for RowValues {
    fn from(value: i32) -> Self {
        RowValues::Int(i64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_string())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<NaiveDateTime> for RowValues {
    fn from(value: NaiveDateTime) -> Self {
        RowValues::Timestamp(value)
    }
}

impl From<DateTime<Utc>> for RowValues {
    fn from(value: DateTime<Utc>) -> Self {
        RowValues::TimestampTz(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// Parameters handed to a query, resolved once at the call site.
///
/// `Single` is shorthand for a one-element positional list. `Named` is only
/// honoured when the connection config enables named parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    #[default]
    None,
    Positional(Vec<RowValues>),
    Named(BTreeMap<String, RowValues>),
    Single(RowValues),
}

impl Params {
    /// Build a named parameter map from `(name, value)` pairs.
    pub fn named<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RowValues>,
    {
        Params::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Collapse `Single` and `None` into positional form; `Named` is kept as is.
    #[must_use]
    pub fn normalize(self) -> Self {
        match self {
            Params::None => Params::Positional(Vec::new()),
            Params::Single(value) => Params::Positional(vec![value]),
            other => other,
        }
    }

    /// Positional values, or `None` for a named map.
    #[must_use]
    pub fn positional(&self) -> Option<&[RowValues]> {
        match self {
            Params::None => Some(&[]),
            Params::Positional(values) => Some(values),
            Params::Single(value) => Some(std::slice::from_ref(value)),
            Params::Named(_) => None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Params::None => true,
            Params::Positional(values) => values.is_empty(),
            Params::Named(map) => map.is_empty(),
            Params::Single(_) => false,
        }
    }
}

impl From<Vec<RowValues>> for Params {
    fn from(values: Vec<RowValues>) -> Self {
        Params::Positional(values)
    }
}

impl From<&[RowValues]> for Params {
    fn from(values: &[RowValues]) -> Self {
        Params::Positional(values.to_vec())
    }
}

impl From<RowValues> for Params {
    fn from(value: RowValues) -> Self {
        Params::Single(value)
    }
}

impl From<BTreeMap<String, RowValues>> for Params {
    fn from(map: BTreeMap<String, RowValues>) -> Self {
        Params::Named(map)
    }
}

impl From<()> for Params {
    fn from((): ()) -> Self {
        Params::None
    }
}
