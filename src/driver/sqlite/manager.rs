use std::sync::Arc;
use std::time::Duration;

use bb8::ManageConnection;
use tokio::sync::Mutex;

use crate::error::SqlSessionError;

/// Shared handle to a blocking `SQLite` connection.
pub type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const MEMORY_PATH: &str = ":memory:";

/// bb8 manager for `SQLite` connections to one database file.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    path: String,
}

impl SqliteManager {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Open and prepare a connection on the blocking pool.
pub(crate) async fn open_shared(path: String) -> Result<SharedSqliteConnection, SqlSessionError> {
    let conn = tokio::task::spawn_blocking(move || open_blocking(&path)).await??;
    Ok(Arc::new(Mutex::new(conn)))
}

fn open_blocking(path: &str) -> Result<rusqlite::Connection, SqlSessionError> {
    if path == MEMORY_PATH {
        let conn = rusqlite::Connection::open_in_memory()?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        return Ok(conn);
    }
    let conn = rusqlite::Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    Ok(conn)
}

/// Run `func` against the connection on the blocking thread pool.
pub(crate) async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    func: F,
) -> Result<R, SqlSessionError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlSessionError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await?
}

impl ManageConnection for SqliteManager {
    type Connection = SharedSqliteConnection;
    type Error = SqlSessionError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let path = self.path.clone();
        async move {
            tracing::trace!(path = %path, "opening pooled sqlite connection");
            open_shared(path).await
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let handle = Arc::clone(conn);
        async move {
            run_blocking(handle, |guard| {
                guard.execute_batch("SELECT 1")?;
                Ok(())
            })
            .await
        }
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}
