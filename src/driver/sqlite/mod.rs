//! Embedded `SQLite` driver: `rusqlite` connections pooled with `bb8`.
//!
//! `DriverParams::database` is the file path (`:memory:` for a private in-memory
//! database per connection) and `connection_limit` caps the pool size.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};

mod manager;
mod params;
mod query;

pub use manager::{SharedSqliteConnection, SqliteManager};
pub use params::{convert_params, row_value_to_sqlite_value, sqlite_value_to_row_value};
pub use query::{build_result_set, run_statement};

use manager::{open_shared, run_blocking};

use super::{Driver, DriverConnection, DriverPool, QueryOutcome};
use crate::config::DriverParams;
use crate::error::SqlSessionError;
use crate::format::EscapeStyle;
use crate::types::RowValues;

const DEFAULT_POOL_SIZE: u32 = 10;
// Long enough that pool diagnostics, not bb8, report slow acquisitions
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(3600);

fn database_path(params: &DriverParams) -> Result<String, SqlSessionError> {
    params
        .database
        .clone()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| SqlSessionError::Config("sqlite driver needs a database path".into()))
}

/// Driver for embedded `SQLite` databases.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl SqliteDriver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn create_pool(
        &self,
        params: &DriverParams,
    ) -> Result<Arc<dyn DriverPool>, SqlSessionError> {
        let path = database_path(params)?;
        let max_size = params.connection_limit.unwrap_or(DEFAULT_POOL_SIZE).max(1);
        let pool = Pool::builder()
            .max_size(max_size)
            .connection_timeout(CHECKOUT_TIMEOUT)
            .build(SqliteManager::new(path.clone()))
            .await
            .map_err(|e| SqlSessionError::Connection(format!("sqlite pool error: {e}")))?;
        tracing::debug!(path = %path, max_size, "created sqlite pool");
        Ok(Arc::new(SqlitePool {
            pool: parking_lot::Mutex::new(Some(pool)),
        }))
    }

    async fn connect(
        &self,
        params: &DriverParams,
    ) -> Result<Box<dyn DriverConnection>, SqlSessionError> {
        let path = database_path(params)?;
        let conn = open_shared(path).await?;
        Ok(Box::new(SqliteConnection {
            slot: Slot::Dedicated(conn),
        }))
    }

    fn escape_style(&self) -> EscapeStyle {
        EscapeStyle::Standard
    }
}

/// A bb8 pool that can be shut down while shared.
pub struct SqlitePool {
    pool: parking_lot::Mutex<Option<Pool<SqliteManager>>>,
}

#[async_trait]
impl DriverPool for SqlitePool {
    async fn get_connection(&self) -> Result<Box<dyn DriverConnection>, SqlSessionError> {
        let pool = self
            .pool
            .lock()
            .clone()
            .ok_or_else(|| SqlSessionError::Acquisition("sqlite pool has been closed".into()))?;
        let conn = pool.get_owned().await?;
        Ok(Box::new(SqliteConnection {
            slot: Slot::Pooled(conn),
        }))
    }

    async fn end(&self) -> Result<(), SqlSessionError> {
        // Idle connections close once the last clone of the pool is dropped
        self.pool.lock().take();
        Ok(())
    }
}

enum Slot {
    Pooled(PooledConnection<'static, SqliteManager>),
    Dedicated(SharedSqliteConnection),
}

/// One `SQLite` connection, pooled or dedicated.
pub struct SqliteConnection {
    slot: Slot,
}

impl SqliteConnection {
    fn conn_handle(&self) -> SharedSqliteConnection {
        match &self.slot {
            Slot::Pooled(conn) => Arc::clone(&**conn),
            Slot::Dedicated(conn) => Arc::clone(conn),
        }
    }
}

#[async_trait]
impl DriverConnection for SqliteConnection {
    async fn query(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<QueryOutcome, SqlSessionError> {
        let sql = sql.to_owned();
        let values = convert_params(params);
        run_blocking(self.conn_handle(), move |conn| {
            run_statement(conn, &sql, &values)
        })
        .await
    }

    fn release(self: Box<Self>) {
        drop(self);
    }

    async fn end(self: Box<Self>) -> Result<(), SqlSessionError> {
        match self.slot {
            Slot::Pooled(conn) => {
                drop(conn);
                Ok(())
            }
            Slot::Dedicated(conn) => match Arc::try_unwrap(conn) {
                Ok(mutex) => {
                    let conn = mutex.into_inner();
                    tokio::task::spawn_blocking(move || conn.close().map_err(|(_, e)| e))
                        .await??;
                    Ok(())
                }
                // Another clone is mid-statement; it closes when dropped
                Err(_) => Ok(()),
            },
        }
    }
}
