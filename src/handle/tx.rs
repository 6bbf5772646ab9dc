use super::ConnectionHandle;
use crate::error::SqlSessionError;

impl ConnectionHandle {
    /// Issue `BEGIN;`.
    ///
    /// # Errors
    /// See [`ConnectionHandle::query`].
    pub async fn begin(&self) -> Result<(), SqlSessionError> {
        self.query("BEGIN;", ()).await.map(drop)
    }

    /// Issue `COMMIT;`.
    ///
    /// # Errors
    /// See [`ConnectionHandle::query`].
    pub async fn commit(&self) -> Result<(), SqlSessionError> {
        self.query("COMMIT;", ()).await.map(drop)
    }

    /// Issue `ROLLBACK;`.
    ///
    /// # Errors
    /// See [`ConnectionHandle::query`].
    pub async fn rollback(&self) -> Result<(), SqlSessionError> {
        self.query("ROLLBACK;", ()).await.map(drop)
    }
}
