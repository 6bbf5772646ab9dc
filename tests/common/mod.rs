#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sql_session::prelude::*;

/// Shared counters and scripted behaviour of the in-memory driver.
#[derive(Default)]
pub struct MockState {
    pub pools_created: AtomicUsize,
    pub pools_ended: AtomicUsize,
    pub connects: AtomicUsize,
    pub leases: AtomicUsize,
    pub releases: AtomicUsize,
    pub ends: AtomicUsize,
    next_id: AtomicI64,
    acquire_delay: Mutex<Duration>,
    query_delay: Mutex<Duration>,
    create_delays: Mutex<HashMap<String, Duration>>,
    fail_acquire: Mutex<bool>,
    select_rows: Mutex<Vec<Vec<RowValues>>>,
    failures: Mutex<HashMap<String, String>>,
    executed: Mutex<Vec<(String, Vec<RowValues>)>>,
}

impl MockState {
    /// Every pool checkout sleeps this long first.
    pub fn set_acquire_delay(&self, delay: Duration) {
        *self.acquire_delay.lock() = delay;
    }

    /// Creating a pool for `database` sleeps this long first.
    pub fn set_create_delay(&self, database: &str, delay: Duration) {
        self.create_delays.lock().insert(database.to_string(), delay);
    }

    /// Every statement sleeps this long before it runs.
    pub fn set_query_delay(&self, delay: Duration) {
        *self.query_delay.lock() = delay;
    }

    pub fn set_fail_acquire(&self, fail: bool) {
        *self.fail_acquire.lock() = fail;
    }

    /// Rows returned (columns `id`, `name`) by any statement starting with `select`.
    pub fn set_select_rows(&self, rows: Vec<Vec<RowValues>>) {
        *self.select_rows.lock() = rows;
    }

    /// Statements containing `needle` fail with `message`.
    pub fn fail_when(&self, needle: &str, message: &str) {
        self.failures
            .lock()
            .insert(needle.to_string(), message.to_string());
    }

    pub fn executed(&self) -> Vec<(String, Vec<RowValues>)> {
        self.executed.lock().clone()
    }

    pub fn last_executed(&self) -> Option<(String, Vec<RowValues>)> {
        self.executed.lock().last().cloned()
    }

    fn run(&self, sql: &str, params: &[RowValues]) -> Result<QueryOutcome, SqlSessionError> {
        self.executed.lock().push((sql.to_string(), params.to_vec()));
        let failure = self
            .failures
            .lock()
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, message)| message.clone());
        if let Some(message) = failure {
            return Err(SqlSessionError::Driver(message));
        }

        if sql.trim_start().to_lowercase().starts_with("select") {
            let mut rs = ResultSet::with_capacity(4);
            rs.set_column_names(Arc::new(vec!["id".to_string(), "name".to_string()]));
            for row in self.select_rows.lock().iter() {
                rs.add_row_values(row.clone());
            }
            return Ok(QueryOutcome::Rows(rs));
        }

        let is_insert = sql.trim_start().to_lowercase().starts_with("insert");
        Ok(QueryOutcome::Write {
            affected_rows: 1,
            insert_id: is_insert.then(|| self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
            changed_rows: 1,
        })
    }
}

#[derive(Clone, Default)]
pub struct MockDriver {
    pub state: Arc<MockState>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_pool(
        &self,
        params: &DriverParams,
    ) -> Result<Arc<dyn DriverPool>, SqlSessionError> {
        let delay = params
            .database
            .as_deref()
            .and_then(|db| self.state.create_delays.lock().get(db).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state.pools_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockPool {
            state: Arc::clone(&self.state),
        }))
    }

    async fn connect(
        &self,
        _params: &DriverParams,
    ) -> Result<Box<dyn DriverConnection>, SqlSessionError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct MockPool {
    state: Arc<MockState>,
}

#[async_trait]
impl DriverPool for MockPool {
    async fn get_connection(&self) -> Result<Box<dyn DriverConnection>, SqlSessionError> {
        let delay = *self.state.acquire_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if *self.state.fail_acquire.lock() {
            return Err(SqlSessionError::Connection("pool exhausted".into()));
        }
        self.state.leases.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }

    async fn end(&self) -> Result<(), SqlSessionError> {
        self.state.pools_ended.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockConnection {
    state: Arc<MockState>,
}

#[async_trait]
impl DriverConnection for MockConnection {
    async fn query(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<QueryOutcome, SqlSessionError> {
        let delay = *self.state.query_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.state.run(sql, params)
    }

    fn release(self: Box<Self>) {
        self.state.releases.fetch_add(1, Ordering::SeqCst);
    }

    async fn end(self: Box<Self>) -> Result<(), SqlSessionError> {
        self.state.ends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn params(database: &str) -> DriverParams {
    DriverParams::for_database(database)
}

/// Route library logs to the test writer; filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Context over a fresh mock driver with the given default config.
pub fn mock_context(config: ConnectionConfig) -> (DbContext, Arc<MockState>) {
    init_tracing();
    let driver = MockDriver::new();
    let state = Arc::clone(&driver.state);
    let ctx = DbContext::new(driver, config).expect("context");
    (ctx, state)
}

pub fn pooled_config() -> ConnectionConfig {
    ConnectionConfig::new(params("main")).with_pool(true)
}

pub fn named_rows() -> Vec<Vec<RowValues>> {
    vec![
        vec![RowValues::Int(1), RowValues::Text("a".into())],
        vec![RowValues::Int(2), RowValues::Text("b".into())],
        vec![RowValues::Int(3), RowValues::Text("c".into())],
    ]
}
