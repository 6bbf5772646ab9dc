use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::config::{ConnectionConfig, DriverParams};
use crate::driver::Driver;
use crate::error::SqlSessionError;
use crate::format::{EscapeStyle, ValueFormatter};
use crate::handle::{ConnectionHandle, HandleInner, OpenHandleInfo, OpenHandles};
use crate::pool::PoolRegistry;
use crate::reaper::{IdleReaper, ReapReport, reap_once};
use crate::token::TokenRegistry;
use crate::types::RowValues;

pub(crate) struct ContextInner {
    driver: Arc<dyn Driver>,
    config: RwLock<Arc<ConnectionConfig>>,
    pools: PoolRegistry,
    open: OpenHandles,
    tokens: TokenRegistry,
    reaper: IdleReaper,
}

/// Shared state behind every connection handle: the driver, the default config, the
/// pool registry, the open-handle and token registries, and the idle reaper.
///
/// Cheap to clone; clones share everything.
///
/// ```rust,no_run
/// use sql_session::prelude::*;
///
/// # async fn demo() -> Result<(), SqlSessionError> {
/// let cfg = ConnectionConfig::new(DriverParams::for_database("app.db"))
///     .with_pool(true)
///     .with_auto_close_minutes(5.0);
/// let ctx = DbContext::sqlite(cfg)?;
///
/// let db = ctx.create_and_start().await?;
/// let rows = db.query("select 1 as one", ()).await?;
/// assert_eq!(rows.len(), 1);
/// db.end().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DbContext {
    inner: Arc<ContextInner>,
}

impl DbContext {
    /// Build a context around `driver` with `config` as the default handle config.
    ///
    /// # Errors
    /// Returns `SqlSessionError::Config` if `config.auto_close_minutes` enables the reaper
    /// outside a tokio runtime.
    pub fn new(driver: impl Driver, config: ConnectionConfig) -> Result<Self, SqlSessionError> {
        Self::with_driver(Arc::new(driver), config)
    }

    /// Like [`DbContext::new`] for an already shared driver.
    ///
    /// # Errors
    /// See [`DbContext::new`].
    pub fn with_driver(
        driver: Arc<dyn Driver>,
        config: ConnectionConfig,
    ) -> Result<Self, SqlSessionError> {
        let minutes = config.auto_close_minutes;
        let ctx = DbContext {
            inner: Arc::new(ContextInner {
                driver,
                config: RwLock::new(config.into_shared()),
                pools: PoolRegistry::new(),
                open: OpenHandles::default(),
                tokens: TokenRegistry::new(),
                reaper: IdleReaper::default(),
            }),
        };
        ctx.set_auto_close_minutes(minutes)?;
        Ok(ctx)
    }

    /// Context backed by the embedded `SQLite` driver.
    ///
    /// # Errors
    /// See [`DbContext::new`].
    #[cfg(feature = "sqlite")]
    pub fn sqlite(config: ConnectionConfig) -> Result<Self, SqlSessionError> {
        Self::new(crate::driver::sqlite::SqliteDriver::new(), config)
    }

    pub(crate) fn upgrade(weak: &Weak<ContextInner>) -> Option<Self> {
        weak.upgrade().map(|inner| DbContext { inner })
    }

    fn downgrade(&self) -> Weak<ContextInner> {
        Arc::downgrade(&self.inner)
    }

    /// A closed handle using the current default config.
    #[must_use]
    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle::new(self.clone(), self.config())
    }

    /// A closed handle with its own config.
    #[must_use]
    pub fn handle_with_config(&self, config: ConnectionConfig) -> ConnectionHandle {
        ConnectionHandle::new(self.clone(), config.into_shared())
    }

    /// Create a handle with the default config and start it.
    ///
    /// # Errors
    /// Returns the start error in `Raise` mode (the default).
    pub async fn create_and_start(&self) -> Result<ConnectionHandle, SqlSessionError> {
        let handle = self.handle();
        handle.start().await?;
        Ok(handle)
    }

    /// Create a handle with `config` and start it.
    ///
    /// # Errors
    /// Returns the start error in `Raise` mode (the default).
    pub async fn create_and_start_with_config(
        &self,
        config: ConnectionConfig,
    ) -> Result<ConnectionHandle, SqlSessionError> {
        let handle = self.handle_with_config(config);
        handle.start().await?;
        Ok(handle)
    }

    /// Close every open handle. Pools stay alive. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let mut closed = 0;
        for inner in self.inner.open.snapshot() {
            let Some(info) = inner.describe() else {
                continue;
            };
            // false when the reaper or the owner got there first
            if ConnectionHandle::from_inner(inner).close_if_guid(&info.guid).await {
                closed += 1;
            }
        }
        tracing::debug!(closed, "closed all open handles");
        closed
    }

    /// End and forget the pool for `params`. Returns whether one existed.
    ///
    /// # Errors
    /// Propagates the driver's error from ending the pool.
    pub async fn close_pool(&self, params: &DriverParams) -> Result<bool, SqlSessionError> {
        self.inner.pools.close_pool(params).await
    }

    /// End and forget the pool of the default config.
    ///
    /// # Errors
    /// Propagates the driver's error from ending the pool.
    pub async fn close_default_pool(&self) -> Result<bool, SqlSessionError> {
        let params = self.config().driver.clone();
        self.close_pool(&params).await
    }

    /// End and forget every pool. Returns how many were ended.
    ///
    /// # Errors
    /// Returns the first error reported by a pool.
    pub async fn close_all_pools(&self) -> Result<usize, SqlSessionError> {
        self.inner.pools.close_all_pools().await
    }

    /// Replace the reaper. `minutes <= 0` or NaN disables it.
    ///
    /// # Errors
    /// Returns `SqlSessionError::Config` when enabling outside a tokio runtime.
    pub fn set_auto_close_minutes(&self, minutes: f64) -> Result<(), SqlSessionError> {
        self.inner.reaper.configure(self.downgrade(), minutes)
    }

    /// Threshold of the running reaper; `0.0` when disabled.
    #[must_use]
    pub fn auto_close_minutes(&self) -> f64 {
        self.inner.reaper.minutes()
    }

    /// Run one reaper pass now with the given threshold.
    pub async fn reap_idle(&self, minutes: f64) -> ReapReport {
        reap_once(self, minutes).await
    }

    /// Replace the default config and reconfigure the reaper from it.
    /// Handles already created keep the config they were given.
    ///
    /// # Errors
    /// See [`DbContext::set_auto_close_minutes`].
    pub fn set_config(&self, config: ConnectionConfig) -> Result<(), SqlSessionError> {
        let minutes = config.auto_close_minutes;
        *self.inner.config.write() = config.into_shared();
        self.set_auto_close_minutes(minutes)
    }

    #[must_use]
    pub fn config(&self) -> Arc<ConnectionConfig> {
        Arc::clone(&self.inner.config.read())
    }

    #[must_use]
    pub fn open_handle_count(&self) -> usize {
        self.inner.open.len()
    }

    #[must_use]
    pub fn is_handle_open(&self, guid: &str) -> bool {
        self.inner.open.contains(guid)
    }

    /// Guid, age, and start stack of every open handle.
    #[must_use]
    pub fn open_handles(&self) -> Vec<OpenHandleInfo> {
        self.inner.open.describe()
    }

    #[must_use]
    pub fn pools(&self) -> &PoolRegistry {
        &self.inner.pools
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenRegistry {
        &self.inner.tokens
    }

    #[must_use]
    pub fn driver(&self) -> &dyn Driver {
        self.inner.driver.as_ref()
    }

    #[must_use]
    pub fn escape_style(&self) -> EscapeStyle {
        self.inner.driver.escape_style()
    }

    /// Render `value` as a literal in the driver's dialect and the default timezone.
    #[must_use]
    pub fn escape(&self, value: &RowValues) -> String {
        let config = self.config();
        ValueFormatter::new(self.escape_style())
            .with_timezone(config.timezone())
            .escape(value)
    }

    pub(crate) fn open_registry(&self) -> &OpenHandles {
        &self.inner.open
    }

    pub(crate) fn open_handle_snapshot(&self) -> Vec<Arc<HandleInner>> {
        self.inner.open.snapshot()
    }
}

impl std::fmt::Debug for DbContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbContext")
            .field("driver", &self.inner.driver.name())
            .field("open_handles", &self.inner.open.len())
            .field("auto_close_minutes", &self.inner.reaper.minutes())
            .finish_non_exhaustive()
    }
}
