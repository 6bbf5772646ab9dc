use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{Statement, params_from_iter};

use super::params::sqlite_value_to_row_value;
use crate::driver::QueryOutcome;
use crate::error::SqlSessionError;
use crate::results::ResultSet;

/// Build a result set from a prepared row-returning statement.
///
/// # Errors
/// Returns `SqlSessionError::Driver` if execution or value extraction fails.
pub fn build_result_set(
    stmt: &mut Statement<'_>,
    params: &[Value],
) -> Result<ResultSet, SqlSessionError> {
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let col_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(10);
    result_set.set_column_names(Arc::new(column_names));

    let mut rows_iter = stmt.query(params_from_iter(params.iter()))?;
    while let Some(row) = rows_iter.next()? {
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            let value: Value = row.get(i)?;
            row_values.push(sqlite_value_to_row_value(value));
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

fn generates_rowid(sql: &str) -> bool {
    let verb = sql
        .split_whitespace()
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    matches!(verb.as_str(), "insert" | "replace")
}

/// Run one statement on a blocking connection.
///
/// A trailing `;` is accepted. Only the first statement of a batch is run.
///
/// # Errors
/// Returns `SqlSessionError::Driver` when `SQLite` rejects the statement.
pub fn run_statement(
    conn: &mut rusqlite::Connection,
    sql: &str,
    params: &[Value],
) -> Result<QueryOutcome, SqlSessionError> {
    let sql = sql.trim().trim_end_matches(';').trim_end();
    if sql.is_empty() {
        return Ok(QueryOutcome::Write {
            affected_rows: 0,
            insert_id: None,
            changed_rows: 0,
        });
    }

    let mut stmt = conn.prepare(sql)?;
    if stmt.column_count() > 0 {
        return build_result_set(&mut stmt, params).map(QueryOutcome::Rows);
    }

    let affected = stmt.execute(params_from_iter(params.iter()))?;
    drop(stmt);

    let affected_rows = u64::try_from(affected).unwrap_or(u64::MAX);
    let insert_id = generates_rowid(sql).then(|| conn.last_insert_rowid());
    Ok(QueryOutcome::Write {
        affected_rows,
        insert_id,
        changed_rows: affected_rows,
    })
}
