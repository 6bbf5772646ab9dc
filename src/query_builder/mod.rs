//! Fluent insert and update builders that run through a connection handle.

mod insert;
mod update;

pub use insert::InsertBuilder;
pub use update::UpdateBuilder;

use crate::results::CustomDbRow;
use crate::types::RowValues;

/// Row filter for an update.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    /// Raw SQL with its own `?` parameters, appended after the SET values.
    Sql(String, Vec<RowValues>),
    /// `column = ?` for every pair, joined with `AND`.
    Equals(Vec<(String, RowValues)>),
    /// No filter: every row is updated.
    All,
}

impl WhereClause {
    #[must_use]
    pub fn sql(clause: impl Into<String>, params: Vec<RowValues>) -> Self {
        WhereClause::Sql(clause.into(), params)
    }

    pub fn equals<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RowValues>,
    {
        WhereClause::Equals(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn summary_int(rows: &[CustomDbRow], column: &str) -> Option<i64> {
    rows.first()
        .and_then(|row| row.get(column))
        .and_then(|v| v.as_int().copied())
}
