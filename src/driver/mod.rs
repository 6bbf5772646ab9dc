//! The boundary between connection handles and a concrete database driver.
//!
//! A driver creates pools and dedicated connections; connections execute one statement
//! at a time. Wire protocols live entirely behind these traits.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::DriverParams;
use crate::error::SqlSessionError;
use crate::format::EscapeStyle;
use crate::results::ResultSet;
use crate::types::RowValues;

#[cfg(feature = "sqlite")]
pub mod sqlite;

/// What a statement produced.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    /// A row-returning statement.
    Rows(ResultSet),
    /// A write; `insert_id` is set when the statement generated a key.
    Write {
        affected_rows: u64,
        insert_id: Option<i64>,
        changed_rows: u64,
    },
}

impl QueryOutcome {
    /// Rows as the handle exposes them; writes become a one-row summary.
    #[must_use]
    pub fn into_result_set(self) -> ResultSet {
        match self {
            QueryOutcome::Rows(rs) => rs,
            QueryOutcome::Write {
                affected_rows,
                insert_id,
                changed_rows,
            } => ResultSet::write_summary(affected_rows, insert_id, changed_rows),
        }
    }
}

/// Entry point of a database driver.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    /// Build a pool for `params`. Called at most once per distinct params by the registry.
    async fn create_pool(
        &self,
        params: &DriverParams,
    ) -> Result<Arc<dyn DriverPool>, SqlSessionError>;

    /// Open a connection that is not shared with any pool.
    async fn connect(
        &self,
        params: &DriverParams,
    ) -> Result<Box<dyn DriverConnection>, SqlSessionError>;

    /// Literal dialect for locally formatted statements.
    fn escape_style(&self) -> EscapeStyle {
        EscapeStyle::MySql
    }
}

#[async_trait]
pub trait DriverPool: Send + Sync {
    /// Lease a connection; may wait indefinitely for one to free up.
    async fn get_connection(&self) -> Result<Box<dyn DriverConnection>, SqlSessionError>;

    /// Shut the pool down. Leases already handed out stay usable until released.
    async fn end(&self) -> Result<(), SqlSessionError>;
}

#[async_trait]
pub trait DriverConnection: Send {
    /// Execute one statement with positional parameters bound by the driver.
    async fn query(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<QueryOutcome, SqlSessionError>;

    /// Hand a pooled lease back to its pool.
    fn release(self: Box<Self>);

    /// Physically close the connection.
    async fn end(self: Box<Self>) -> Result<(), SqlSessionError>;
}
