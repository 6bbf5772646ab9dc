use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::config::DriverParams;
use crate::driver::{Driver, DriverPool};
use crate::error::SqlSessionError;

type PoolCell = Arc<OnceCell<Arc<dyn DriverPool>>>;

/// One pool per distinct set of driver parameters, created on first use.
///
/// Each key gets its own cell, so racing handles for one config share a single
/// creation while other configs are looked up without waiting on it.
#[derive(Default)]
pub struct PoolRegistry {
    pools: Mutex<HashMap<DriverParams, PoolCell>>,
}

impl PoolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, params: &DriverParams) -> PoolCell {
        Arc::clone(self.pools.lock().entry(params.clone()).or_default())
    }

    /// Return the pool for `params`, creating it through `driver` if none exists.
    ///
    /// # Errors
    /// Propagates the driver's pool-creation error; nothing is registered in that case.
    pub async fn get_or_create(
        &self,
        driver: &dyn Driver,
        params: &DriverParams,
    ) -> Result<Arc<dyn DriverPool>, SqlSessionError> {
        let cell = self.cell(params);
        let created = AtomicBool::new(false);
        let created_flag = &created;
        let result = cell
            .get_or_try_init(move || async move {
                created_flag.store(true, Ordering::Relaxed);
                driver.create_pool(params).await
            })
            .await
            .map(Arc::clone);

        match result {
            Ok(pool) => {
                if created.load(Ordering::Relaxed) {
                    tracing::debug!(
                        driver = driver.name(),
                        database = ?params.database,
                        pools = self.len(),
                        "registered new pool"
                    );
                }
                Ok(pool)
            }
            Err(err) => {
                let mut pools = self.pools.lock();
                if let Some(current) = pools.get(params)
                    && Arc::ptr_eq(current, &cell)
                    && !current.initialized()
                {
                    pools.remove(params);
                }
                Err(err)
            }
        }
    }

    /// End and forget the pool for `params`. Returns whether one existed.
    ///
    /// # Errors
    /// Propagates the driver's error from ending the pool; the entry is removed regardless.
    pub async fn close_pool(&self, params: &DriverParams) -> Result<bool, SqlSessionError> {
        let removed = self.pools.lock().remove(params);
        match removed.as_deref().and_then(OnceCell::get) {
            Some(pool) => {
                pool.end().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// End and forget every pool.
    ///
    /// # Errors
    /// Returns the first error reported by a pool; every pool is still ended.
    pub async fn close_all_pools(&self) -> Result<usize, SqlSessionError> {
        let drained: Vec<_> = self
            .pools
            .lock()
            .drain()
            .filter_map(|(params, cell)| cell.get().map(|pool| (params, Arc::clone(pool))))
            .collect();
        let count = drained.len();
        let mut first_err = None;
        for (params, pool) in drained {
            if let Err(e) = pool.end().await {
                tracing::warn!(database = ?params.database, error = %e, "failed to end pool");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(count), Err)
    }

    /// Number of pools that have been created and not closed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools
            .lock()
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains(&self, params: &DriverParams) -> bool {
        self.pools
            .lock()
            .get(params)
            .is_some_and(|cell| cell.initialized())
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("pools", &self.len())
            .finish_non_exhaustive()
    }
}
