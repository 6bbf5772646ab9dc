//! Connection handles: one logical database session each.

use std::borrow::Cow;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tokio::time::Instant;

mod registry;
mod state;
mod tx;

pub use registry::OpenHandleInfo;
pub(crate) use registry::OpenHandles;
pub use state::{ErrorMode, HandleState};

use state::{Lease, SessionState, capture_stack};

use crate::callbacks;
use crate::config::ConnectionConfig;
use crate::context::DbContext;
use crate::error::{QueryError, SqlSessionError};
use crate::format::ValueFormatter;
use crate::pool::{report_slow_acquisition, watch_acquisition};
use crate::query_builder::{InsertBuilder, UpdateBuilder, WhereClause};
use crate::results::{CustomDbRow, RowCursor};
use crate::token::HANDLE_TOKEN_LEN;
use crate::types::{Params, RowValues};

pub(crate) struct HandleInner {
    ctx: DbContext,
    config: Arc<ConnectionConfig>,
    // Held for the whole of start/query/close so calls on one handle run in order.
    // Lock order: `session`, then `state`; `state` is never held across an await.
    session: tokio::sync::Mutex<Option<Lease>>,
    state: parking_lot::Mutex<SessionState>,
}

impl HandleInner {
    pub(crate) fn describe(&self) -> Option<OpenHandleInfo> {
        let state = self.state.lock();
        if state.phase != HandleState::Open {
            return None;
        }
        Some(OpenHandleInfo {
            guid: state.guid.clone()?,
            open_for: state.opened_at.map(|t| t.elapsed()).unwrap_or_default(),
            start_stack: state.start_stack.clone().unwrap_or_default(),
        })
    }
}

/// One database session over a pooled lease or a dedicated connection.
///
/// Handles are cheap to clone; clones refer to the same session. A handle starts
/// `Closed`, becomes `Open` after [`start`](Self::start), and can be started again
/// after [`end`](Self::end).
///
/// ```rust,no_run
/// use sql_session::prelude::*;
///
/// # async fn demo(ctx: DbContext) -> Result<(), SqlSessionError> {
/// let db = ctx.handle();
/// db.start().await?;
/// db.query("select id, name from users where id > ?", RowValues::Int(10)).await?;
/// while let Some(row) = db.row() {
///     println!("{:?}", row.get("name"));
/// }
/// db.end().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl ConnectionHandle {
    pub(crate) fn new(ctx: DbContext, config: Arc<ConnectionConfig>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                ctx,
                config,
                session: tokio::sync::Mutex::new(None),
                state: parking_lot::Mutex::new(SessionState::default()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<HandleInner>) -> Self {
        Self { inner }
    }

    /// Apply the error mode: record the failure, then raise it or swallow it.
    pub(crate) fn settle<T: Default>(
        &self,
        result: Result<T, SqlSessionError>,
    ) -> Result<T, SqlSessionError> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                let mode = {
                    let mut state = self.inner.state.lock();
                    state.last_error = Some(err.clone());
                    state.error_mode
                };
                match mode {
                    ErrorMode::Raise => Err(err),
                    ErrorMode::Return => {
                        tracing::debug!(error = %err, "error recorded on handle");
                        Ok(T::default())
                    }
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // lifecycle
    // ---------------------------------------------------------------------

    /// Acquire a connection and mark the handle open.
    ///
    /// # Errors
    /// `AlreadyOpen` unless the handle is closed; `Acquisition` when no connection
    /// could be obtained.
    pub async fn start(&self) -> Result<(), SqlSessionError> {
        let result = self.start_inner().await;
        self.settle(result)
    }

    /// Alias of [`start`](Self::start).
    ///
    /// # Errors
    /// See [`start`](Self::start).
    pub async fn open(&self) -> Result<(), SqlSessionError> {
        self.start().await
    }

    async fn start_inner(&self) -> Result<(), SqlSessionError> {
        if self.state() != HandleState::Closed {
            return Err(SqlSessionError::AlreadyOpen);
        }
        let mut session = self.inner.session.lock().await;
        {
            let mut state = self.inner.state.lock();
            if state.phase != HandleState::Closed {
                return Err(SqlSessionError::AlreadyOpen);
            }
            state.phase = HandleState::Opening;
            state.last_error = None;
            state.start_stack = Some(capture_stack(self.inner.config.traces_enabled()));
        }

        let lease = match self.acquire().await {
            Ok(lease) => lease,
            Err(err) => {
                self.inner.state.lock().clear();
                return Err(match err {
                    SqlSessionError::Acquisition(_) => err,
                    other => SqlSessionError::Acquisition(other.to_string()),
                });
            }
        };

        let guid = match self.inner.ctx.tokens().generate(HANDLE_TOKEN_LEN) {
            Ok(guid) => guid,
            Err(err) => {
                if let Err(e) = lease.finish().await {
                    tracing::warn!(error = %e, "failed to give back connection");
                }
                self.inner.state.lock().clear();
                return Err(err);
            }
        };

        let pooled = lease.is_pooled();
        *session = Some(lease);
        {
            let mut state = self.inner.state.lock();
            state.guid = Some(guid.clone());
            state.phase = HandleState::Open;
            state.opened_at = Some(Instant::now());
            state.opened_at_utc = Some(Utc::now());
        }
        self.inner
            .ctx
            .open_registry()
            .insert(guid.clone(), Arc::clone(&self.inner));
        tracing::debug!(guid = %guid, pooled, "connection handle opened");
        Ok(())
    }

    async fn acquire(&self) -> Result<Lease, SqlSessionError> {
        let ctx = &self.inner.ctx;
        let config = &self.inner.config;
        if !config.use_pool {
            let conn = ctx.driver().connect(&config.driver).await?;
            return Ok(Lease::Dedicated(conn));
        }

        let pool = ctx.pools().get_or_create(ctx.driver(), &config.driver).await?;
        let timeout = config.pool_timeout();
        let conn = watch_acquisition(pool.get_connection(), timeout, || {
            report_slow_acquisition(&ctx.open_handles(), timeout, config.traces_enabled());
        })
        .await?;
        Ok(Lease::Pooled(conn))
    }

    /// Give the connection back (pooled) or close it (dedicated) and reset the handle.
    ///
    /// Ending a handle that is not open only logs a warning.
    ///
    /// # Errors
    /// Currently always `Ok`; driver failures while closing are logged.
    pub async fn end(&self) -> Result<(), SqlSessionError> {
        self.close_matching(None).await;
        Ok(())
    }

    /// Alias of [`end`](Self::end).
    ///
    /// # Errors
    /// See [`end`](Self::end).
    pub async fn close(&self) -> Result<(), SqlSessionError> {
        self.end().await
    }

    /// Close only if the handle is still the session identified by `guid`.
    pub(crate) async fn close_if_guid(&self, guid: &str) -> bool {
        self.close_matching(Some(guid)).await
    }

    async fn close_matching(&self, expected: Option<&str>) -> bool {
        let mut session = self.inner.session.lock().await;
        let guid = {
            let state = self.inner.state.lock();
            if state.phase != HandleState::Open {
                if expected.is_none() {
                    tracing::warn!(error = %SqlSessionError::AlreadyClosed, "close on a handle that is not open");
                }
                return false;
            }
            if let Some(expected) = expected
                && state.guid.as_deref() != Some(expected)
            {
                return false;
            }
            state.guid.clone()
        };

        if let Some(lease) = session.take()
            && let Err(e) = lease.finish().await
        {
            tracing::warn!(guid = ?guid, error = %e, "failed to close driver connection");
        }

        self.inner.state.lock().clear();
        if let Some(guid) = guid {
            self.inner.ctx.open_registry().remove(&guid);
            self.inner.ctx.tokens().release(&guid);
            tracing::debug!(guid = %guid, "connection handle closed");
        }
        true
    }

    // ---------------------------------------------------------------------
    // queries
    // ---------------------------------------------------------------------

    /// Run `sql` and return its rows; the rows are also kept for [`row`](Self::row).
    ///
    /// Write statements return one row with `affected_rows`, `insert_id` and
    /// `changed_rows`.
    ///
    /// # Errors
    /// `NotOpen` if the handle is not open, `Parameter` for named parameters without
    /// `use_named_params`, and `Query` when the driver rejects the statement.
    pub async fn query(
        &self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<Vec<CustomDbRow>, SqlSessionError> {
        self.query_with_context(sql, params, None).await
    }

    /// [`query`](Self::query) with a value passed through to callbacks.
    ///
    /// # Errors
    /// See [`query`](Self::query).
    pub async fn query_with_context(
        &self,
        sql: &str,
        params: impl Into<Params>,
        context: Option<JsonValue>,
    ) -> Result<Vec<CustomDbRow>, SqlSessionError> {
        let result = self.query_inner(sql, params.into(), context).await;
        self.settle(result)
    }

    /// Alias of [`query`](Self::query).
    ///
    /// # Errors
    /// See [`query`](Self::query).
    pub async fn select_array(
        &self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<Vec<CustomDbRow>, SqlSessionError> {
        self.query(sql, params).await
    }

    /// First row of the result, if any.
    ///
    /// # Errors
    /// See [`query`](Self::query).
    pub async fn select_row(
        &self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<Option<CustomDbRow>, SqlSessionError> {
        let rows = self.query(sql, params).await?;
        Ok(rows.into_iter().next())
    }

    async fn query_inner(
        &self,
        sql: &str,
        params: Params,
        context: Option<JsonValue>,
    ) -> Result<Vec<CustomDbRow>, SqlSessionError> {
        let mut session = self.inner.session.lock().await;
        let guid = {
            let mut state = self.inner.state.lock();
            state.reset_results();
            state.error_stack = None;
            state.guid.clone()
        };
        let Some(lease) = session.as_mut() else {
            return Err(SqlSessionError::NotOpen);
        };

        let config = &self.inner.config;
        let params = params.normalize();
        let formatter = self.formatter();
        let (statement, bind): (Cow<'_, str>, Cow<'_, [RowValues]>) = match &params {
            Params::Named(values) if config.use_named_params => {
                (formatter.format_named(sql, values), Cow::Borrowed(&[][..]))
            }
            Params::Named(_) => {
                return Err(SqlSessionError::Parameter(
                    "named parameters need use_named_params enabled".into(),
                ));
            }
            other => (
                Cow::Borrowed(sql),
                formatter.bind_values(other.positional().unwrap_or_default()),
            ),
        };

        let started = Instant::now();
        let outcome = lease.conn_mut().query(&statement, &bind).await;
        drop(bind);
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(guid = ?guid, elapsed_ms, ok = outcome.is_ok(), "query finished");

        match outcome {
            Ok(outcome) => {
                let rows = Arc::new(outcome.into_result_set().into_rows());
                {
                    let mut state = self.inner.state.lock();
                    state.rows = Arc::clone(&rows);
                    state.cursor = 0;
                }
                drop(session);
                callbacks::dispatch(config.callbacks.as_ref(), sql, &params, context.as_ref());
                Ok(rows.as_ref().clone())
            }
            Err(err) => {
                let stack = if config.traces_enabled() {
                    capture_stack(true)
                } else {
                    String::new()
                };
                let message = err.driver_message();
                let message = if message.trim().is_empty() {
                    QueryError::UNSPECIFIED.to_string()
                } else {
                    message
                };
                self.inner.state.lock().error_stack = Some(stack.clone());
                tracing::debug!(guid = ?guid, sql, error = %message, "query failed");
                Err(SqlSessionError::Query(QueryError {
                    stack,
                    sql: sql.to_string(),
                    params,
                    message,
                }))
            }
        }
    }

    // ---------------------------------------------------------------------
    // result cursor
    // ---------------------------------------------------------------------

    /// Next row of the last result; `None` once exhausted (the cursor stays put).
    #[must_use]
    pub fn row(&self) -> Option<CustomDbRow> {
        self.inner.state.lock().next_row()
    }

    /// Whether [`row`](Self::row) would return a row.
    #[must_use]
    pub fn has_rows(&self) -> bool {
        self.inner.state.lock().has_rows()
    }

    /// All rows of the last result.
    #[must_use]
    pub fn rows(&self) -> Vec<CustomDbRow> {
        self.inner.state.lock().rows.as_ref().clone()
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.inner.state.lock().rows.len()
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.inner.state.lock().cursor
    }

    pub fn reset_cursor(&self) {
        self.inner.state.lock().cursor = 0;
    }

    /// Iterator over the rows not yet consumed by [`row`](Self::row).
    ///
    /// The iterator works on a snapshot and does not move the handle's cursor.
    #[must_use]
    pub fn iter_rows(&self) -> RowCursor {
        let state = self.inner.state.lock();
        RowCursor::new(Arc::clone(&state.rows), state.cursor)
    }

    /// Visit every row of the last result, yielding to the scheduler between rows.
    /// Stops early when `on_each` breaks. Returns the number of rows visited.
    pub async fn for_each_async<F>(&self, mut on_each: F) -> usize
    where
        F: FnMut(usize, &CustomDbRow) -> ControlFlow<()>,
    {
        let rows = Arc::clone(&self.inner.state.lock().rows);
        let mut visited = 0;
        for (idx, row) in rows.iter().enumerate() {
            visited += 1;
            if on_each(idx, row).is_break() {
                break;
            }
            tokio::task::yield_now().await;
        }
        visited
    }

    // ---------------------------------------------------------------------
    // accessors
    // ---------------------------------------------------------------------

    /// Identifier assigned by the last successful start.
    #[must_use]
    pub fn guid(&self) -> Option<String> {
        self.inner.state.lock().guid.clone()
    }

    #[must_use]
    pub fn start_stack(&self) -> Option<String> {
        self.inner.state.lock().start_stack.clone()
    }

    /// Stack captured when the last query failed (empty unless traces are on).
    #[must_use]
    pub fn error_stack(&self) -> Option<String> {
        self.inner.state.lock().error_stack.clone()
    }

    #[must_use]
    pub fn state(&self) -> HandleState {
        self.inner.state.lock().phase
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == HandleState::Open
    }

    /// Wall-clock time of the last successful start.
    #[must_use]
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.inner.state.lock().opened_at_utc
    }

    /// How long the handle has been open.
    #[must_use]
    pub fn open_for(&self) -> Option<Duration> {
        self.inner.state.lock().opened_at.map(|t| t.elapsed())
    }

    /// The last recorded failure.
    #[must_use]
    pub fn error(&self) -> Option<SqlSessionError> {
        self.inner.state.lock().last_error.clone()
    }

    #[must_use]
    pub fn error_mode(&self) -> ErrorMode {
        self.inner.state.lock().error_mode
    }

    pub fn set_error_mode(&self, mode: ErrorMode) {
        self.inner.state.lock().error_mode = mode;
    }

    /// `true` selects [`ErrorMode::Raise`], `false` [`ErrorMode::Return`].
    pub fn set_throw_errors(&self, throw: bool) {
        self.set_error_mode(if throw {
            ErrorMode::Raise
        } else {
            ErrorMode::Return
        });
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn context(&self) -> &DbContext {
        &self.inner.ctx
    }

    fn formatter(&self) -> ValueFormatter<'_> {
        ValueFormatter::new(self.inner.ctx.escape_style())
            .with_timezone(self.inner.config.timezone())
    }

    /// Render `value` as a literal for this handle's driver and timezone.
    #[must_use]
    pub fn escape(&self, value: &RowValues) -> String {
        self.formatter().escape(value)
    }

    #[must_use]
    pub fn escape_id(&self, name: &str) -> String {
        self.formatter().escape_id(name)
    }

    /// The statement with `params` substituted, for diagnostics only.
    #[must_use]
    pub fn print_query(&self, sql: &str, params: impl Into<Params>) -> String {
        let params = params.into().normalize();
        self.formatter().format(sql, &params).into_owned()
    }

    // ---------------------------------------------------------------------
    // builders
    // ---------------------------------------------------------------------

    #[must_use]
    pub fn insert(&self, table: &str) -> InsertBuilder<'_> {
        InsertBuilder::new(self, table)
    }

    #[must_use]
    pub fn update(&self, table: &str, where_clause: WhereClause) -> UpdateBuilder<'_> {
        UpdateBuilder::new(self, table, where_clause)
    }

    /// Insert one row and return the generated key, if the driver reports one.
    ///
    /// # Errors
    /// See [`InsertBuilder::run`].
    pub async fn insert_and_run<K, V, I>(
        &self,
        table: &str,
        row: I,
    ) -> Result<Option<i64>, SqlSessionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RowValues>,
    {
        self.insert(table).row(row).run().await
    }

    /// Update matching rows and return how many changed.
    ///
    /// # Errors
    /// See [`UpdateBuilder::run`].
    pub async fn update_and_run<K, V, I>(
        &self,
        table: &str,
        values: I,
        where_clause: WhereClause,
    ) -> Result<u64, SqlSessionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RowValues>,
    {
        self.update(table, where_clause).values(values).run().await
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ConnectionHandle")
            .field("guid", &state.guid)
            .field("state", &state.phase)
            .field("rows", &state.rows.len())
            .field("cursor", &state.cursor)
            .finish_non_exhaustive()
    }
}
