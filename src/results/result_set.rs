use std::collections::HashMap;
use std::sync::Arc;

use super::row::{CustomDbRow, index_columns};
use crate::types::RowValues;

/// A result set from a database query
///
/// For write statements the driver reports counts instead of rows; the connection
/// handle turns those into a single summary row (see [`ResultSet::write_summary`]).
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<CustomDbRow>,
    /// The number of rows affected (for DML statements)
    pub rows_affected: usize,
    column_names: Option<Arc<Vec<String>>>,
    column_index: Option<Arc<HashMap<String, usize>>>,
}

impl ResultSet {
    /// Create a new result set with a known capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            ..ResultSet::default()
        }
    }

    /// Set the column names for this result set (to be shared by all rows)
    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        self.column_index = Some(index_columns(&column_names));
        self.column_names = Some(column_names);
    }

    /// Get the column names for this result set
    #[must_use]
    pub fn get_column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    /// Add a row to the result set. Ignored until column names are set.
    pub fn add_row_values(&mut self, row_values: Vec<RowValues>) {
        if let (Some(column_names), Some(column_index)) = (&self.column_names, &self.column_index)
        {
            self.results.push(CustomDbRow::with_index(
                Arc::clone(column_names),
                Arc::clone(column_index),
                row_values,
            ));
            self.rows_affected += 1;
        }
    }

    /// Add a prebuilt row
    pub fn add_row(&mut self, row: CustomDbRow) {
        if self.column_names.is_none() {
            self.set_column_names(Arc::clone(&row.column_names));
        }
        self.results.push(row);
        self.rows_affected += 1;
    }

    /// One-row result describing a write: `affected_rows`, `insert_id`, `changed_rows`.
    #[must_use]
    pub fn write_summary(affected_rows: u64, insert_id: Option<i64>, changed_rows: u64) -> Self {
        let mut rs = ResultSet::with_capacity(1);
        rs.set_column_names(Arc::new(vec![
            "affected_rows".to_string(),
            "insert_id".to_string(),
            "changed_rows".to_string(),
        ]));
        rs.add_row_values(vec![
            RowValues::Int(i64::try_from(affected_rows).unwrap_or(i64::MAX)),
            insert_id.map_or(RowValues::Null, RowValues::Int),
            RowValues::Int(i64::try_from(changed_rows).unwrap_or(i64::MAX)),
        ]);
        rs.rows_affected = usize::try_from(affected_rows).unwrap_or(usize::MAX);
        rs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<CustomDbRow> {
        self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_share_column_lookup() {
        let mut rs = ResultSet::with_capacity(2);
        rs.set_column_names(Arc::new(vec!["id".into(), "name".into()]));
        rs.add_row_values(vec![RowValues::Int(1), RowValues::Text("a".into())]);
        rs.add_row_values(vec![RowValues::Int(2), RowValues::Text("b".into())]);

        assert_eq!(rs.len(), 2);
        assert_eq!(rs.results[1].get("name"), Some(&RowValues::Text("b".into())));
        assert!(rs.results[0].get("missing").is_none());
    }

    #[test]
    fn rows_without_columns_are_dropped() {
        let mut rs = ResultSet::default();
        rs.add_row_values(vec![RowValues::Int(1)]);
        assert!(rs.is_empty());
    }

    #[test]
    fn write_summary_exposes_counts() {
        let rs = ResultSet::write_summary(3, Some(42), 2);
        let row = &rs.results[0];
        assert_eq!(row.get("affected_rows"), Some(&RowValues::Int(3)));
        assert_eq!(row.get("insert_id"), Some(&RowValues::Int(42)));
        assert_eq!(row.get("changed_rows"), Some(&RowValues::Int(2)));
        assert_eq!(rs.rows_affected, 3);
    }
}
