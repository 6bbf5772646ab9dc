use super::{WhereClause, summary_int};
use crate::error::SqlSessionError;
use crate::handle::ConnectionHandle;
use crate::types::RowValues;

/// Builds an `UPDATE ... SET ... WHERE ...`.
#[derive(Debug)]
pub struct UpdateBuilder<'h> {
    handle: &'h ConnectionHandle,
    table: String,
    values: Vec<(String, RowValues)>,
    where_clause: WhereClause,
}

impl<'h> UpdateBuilder<'h> {
    pub(crate) fn new(handle: &'h ConnectionHandle, table: &str, where_clause: WhereClause) -> Self {
        Self {
            handle,
            table: table.to_string(),
            values: Vec::new(),
            where_clause,
        }
    }

    /// Set one column.
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<RowValues>) -> Self {
        let column = column.into();
        let value = value.into();
        match self.values.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.values.push((column, value)),
        }
        self
    }

    /// Replace all values to set.
    #[must_use]
    pub fn values<K, V, I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RowValues>,
    {
        self.values = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// The statement and its parameters: SET values first, then WHERE values.
    ///
    /// # Errors
    /// Returns `SqlSessionError::Parameter` when no values were set.
    pub fn to_sql(&self) -> Result<(String, Vec<RowValues>), SqlSessionError> {
        if self.values.is_empty() {
            return Err(SqlSessionError::Parameter(
                "no values were provided to be updated".into(),
            ));
        }

        let mut params: Vec<RowValues> = Vec::with_capacity(self.values.len());
        let assignments = self
            .values
            .iter()
            .map(|(column, value)| {
                params.push(value.clone());
                format!("{}=?", self.handle.escape_id(column))
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "update {} set {assignments}",
            self.handle.escape_id(&self.table)
        );
        match &self.where_clause {
            WhereClause::Sql(clause, where_params) if !clause.trim().is_empty() => {
                sql.push_str(" where ");
                sql.push_str(clause);
                params.extend(where_params.iter().cloned());
            }
            WhereClause::Equals(pairs) if !pairs.is_empty() => {
                let conditions = pairs
                    .iter()
                    .map(|(column, value)| {
                        params.push(value.clone());
                        format!("{}=?", self.handle.escape_id(column))
                    })
                    .collect::<Vec<_>>()
                    .join(" AND ");
                sql.push_str(" where ");
                sql.push_str(&conditions);
            }
            _ => {}
        }
        Ok((sql, params))
    }

    /// Run the update; returns the number of changed rows reported by the driver.
    ///
    /// # Errors
    /// `Parameter` when no values were set, otherwise see [`ConnectionHandle::query`].
    pub async fn run(self) -> Result<u64, SqlSessionError> {
        let (sql, params) = match self.to_sql() {
            Ok(built) => built,
            Err(err) => return self.handle.settle(Err(err)),
        };
        let rows = self.handle.query(&sql, params).await?;
        Ok(summary_int(&rows, "changed_rows")
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0))
    }

    /// Alias of [`run`](Self::run).
    ///
    /// # Errors
    /// See [`run`](Self::run).
    pub async fn execute(self) -> Result<u64, SqlSessionError> {
        self.run().await
    }
}
