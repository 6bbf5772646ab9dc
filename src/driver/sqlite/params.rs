use rusqlite::types::Value;

use crate::format::DATETIME_FORMAT;
use crate::types::RowValues;

/// Convert a single `RowValues` to a rusqlite `Value`.
///
/// Instants reaching the driver directly are stored as UTC text; handles render them in
/// the configured timezone first. Booleans are stored as 0/1.
#[must_use]
pub fn row_value_to_sqlite_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Real(*f),
        RowValues::Text(s) => Value::Text(s.clone()),
        RowValues::Bool(b) => Value::Integer(i64::from(*b)),
        RowValues::Timestamp(dt) => Value::Text(dt.format(DATETIME_FORMAT).to_string()),
        RowValues::TimestampTz(dt) => {
            Value::Text(dt.naive_utc().format(DATETIME_FORMAT).to_string())
        }
        RowValues::Null => Value::Null,
        RowValues::JSON(jval) => Value::Text(jval.to_string()),
        RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Convert a `SQLite` value back into `RowValues`.
#[must_use]
pub fn sqlite_value_to_row_value(value: Value) -> RowValues {
    match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    }
}

/// Convert a parameter list into owned `SQLite` values.
#[must_use]
pub fn convert_params(params: &[RowValues]) -> Vec<Value> {
    params.iter().map(row_value_to_sqlite_value).collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn booleans_and_timestamps_bind_as_sqlite_natives() {
        let ts = NaiveDate::from_ymd_opt(2024, 2, 29)
            .and_then(|d| d.and_hms_opt(8, 30, 0))
            .unwrap();
        let values = convert_params(&[RowValues::Bool(true), RowValues::Timestamp(ts)]);
        assert_eq!(values[0], Value::Integer(1));
        assert_eq!(values[1], Value::Text("2024-02-29 08:30:00.000".into()));
    }
}
