use super::summary_int;
use crate::error::SqlSessionError;
use crate::handle::ConnectionHandle;
use crate::types::RowValues;

/// Builds a multi-row `INSERT`.
///
/// Columns come from the first row; later rows missing one of those columns insert
/// `NULL` for it, and columns the first row lacks are ignored.
///
/// ```rust,no_run
/// # use sql_session::prelude::*;
/// # async fn demo(db: &ConnectionHandle) -> Result<(), SqlSessionError> {
/// let id = db
///     .insert("users")
///     .set("name", "alice")
///     .set("age", 30)
///     .run()
///     .await?;
/// # let _ = id;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InsertBuilder<'h> {
    handle: &'h ConnectionHandle,
    table: String,
    rows: Vec<Vec<(String, RowValues)>>,
}

impl<'h> InsertBuilder<'h> {
    pub(crate) fn new(handle: &'h ConnectionHandle, table: &str) -> Self {
        Self {
            handle,
            table: table.to_string(),
            rows: Vec::new(),
        }
    }

    /// Set one column on the current row, starting a row if there is none.
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<RowValues>) -> Self {
        if self.rows.is_empty() {
            self.rows.push(Vec::new());
        }
        let column = column.into();
        let value = value.into();
        if let Some(current) = self.rows.last_mut() {
            match current.iter_mut().find(|(c, _)| *c == column) {
                Some(slot) => slot.1 = value,
                None => current.push((column, value)),
            }
        }
        self
    }

    /// Start a new empty row for subsequent [`set`](Self::set) calls.
    #[must_use]
    pub fn new_row(mut self) -> Self {
        self.rows.push(Vec::new());
        self
    }

    /// Add a complete row.
    #[must_use]
    pub fn row<K, V, I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RowValues>,
    {
        self.rows.push(
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// The statement and its parameters.
    ///
    /// # Errors
    /// Returns `SqlSessionError::Parameter` when there is no row or the first row is empty.
    pub fn to_sql(&self) -> Result<(String, Vec<RowValues>), SqlSessionError> {
        let Some(first) = self.rows.iter().find(|r| !r.is_empty()) else {
            return Err(SqlSessionError::Parameter(
                "no rows were provided to be inserted".into(),
            ));
        };
        let columns: Vec<&str> = first.iter().map(|(c, _)| c.as_str()).collect();
        let placeholders = vec!["?"; columns.len()].join(",");
        let column_list = columns
            .iter()
            .map(|c| self.handle.escape_id(c))
            .collect::<Vec<_>>()
            .join(",");

        let mut params = Vec::with_capacity(columns.len() * self.rows.len());
        let mut groups = Vec::with_capacity(self.rows.len());
        for row in self.rows.iter().filter(|r| !r.is_empty()) {
            for column in &columns {
                let value = row
                    .iter()
                    .find(|(c, _)| c == column)
                    .map_or(RowValues::Null, |(_, v)| v.clone());
                params.push(value);
            }
            groups.push(format!("({placeholders})"));
        }

        let sql = format!(
            "insert into {} ({column_list}) VALUES {}",
            self.handle.escape_id(&self.table),
            groups.join(",")
        );
        Ok((sql, params))
    }

    /// Run the insert; returns the generated key if the driver reports one.
    ///
    /// # Errors
    /// `Parameter` when no rows were given, otherwise see [`ConnectionHandle::query`].
    pub async fn run(self) -> Result<Option<i64>, SqlSessionError> {
        let (sql, params) = match self.to_sql() {
            Ok(built) => built,
            Err(err) => return self.handle.settle(Err(err)),
        };
        let rows = self.handle.query(&sql, params).await?;
        Ok(summary_int(&rows, "insert_id"))
    }

    /// Alias of [`run`](Self::run).
    ///
    /// # Errors
    /// See [`run`](Self::run).
    pub async fn execute(self) -> Result<Option<i64>, SqlSessionError> {
        self.run().await
    }
}
