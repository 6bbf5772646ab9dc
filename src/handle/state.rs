use std::backtrace::Backtrace;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::driver::DriverConnection;
use crate::error::SqlSessionError;
use crate::results::CustomDbRow;

/// Lifecycle of a connection handle. `Closed` handles may be started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandleState {
    #[default]
    Closed,
    Opening,
    Open,
}

/// How a handle surfaces failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Failures are returned as `Err`.
    #[default]
    Raise,
    /// Failures resolve to an empty value; read them back with `error()`.
    Return,
}

/// The driver connection an open handle owns.
pub(crate) enum Lease {
    Pooled(Box<dyn DriverConnection>),
    Dedicated(Box<dyn DriverConnection>),
}

impl Lease {
    pub(crate) fn conn_mut(&mut self) -> &mut dyn DriverConnection {
        match self {
            Lease::Pooled(conn) | Lease::Dedicated(conn) => conn.as_mut(),
        }
    }

    /// Release a pooled lease or physically close a dedicated connection.
    pub(crate) async fn finish(self) -> Result<(), SqlSessionError> {
        match self {
            Lease::Pooled(conn) => {
                conn.release();
                Ok(())
            }
            Lease::Dedicated(conn) => conn.end().await,
        }
    }

    pub(crate) fn is_pooled(&self) -> bool {
        matches!(self, Lease::Pooled(_))
    }
}

#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) guid: Option<String>,
    pub(crate) phase: HandleState,
    pub(crate) opened_at: Option<Instant>,
    pub(crate) opened_at_utc: Option<DateTime<Utc>>,
    pub(crate) rows: Arc<Vec<CustomDbRow>>,
    pub(crate) cursor: usize,
    pub(crate) last_error: Option<SqlSessionError>,
    pub(crate) start_stack: Option<String>,
    pub(crate) error_stack: Option<String>,
    pub(crate) error_mode: ErrorMode,
}

impl SessionState {
    pub(crate) fn reset_results(&mut self) {
        self.rows = Arc::new(Vec::new());
        self.cursor = 0;
    }

    /// Back to a fresh closed handle; the error mode is a caller preference and survives.
    pub(crate) fn clear(&mut self) {
        let error_mode = self.error_mode;
        *self = SessionState {
            error_mode,
            ..SessionState::default()
        };
    }

    pub(crate) fn next_row(&mut self) -> Option<CustomDbRow> {
        let row = self.rows.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(row)
    }

    pub(crate) fn has_rows(&self) -> bool {
        self.cursor < self.rows.len()
    }
}

/// Capture the current stack; forced when traces are on, otherwise only if the
/// environment enables backtraces.
pub(crate) fn capture_stack(traces: bool) -> String {
    let trace = if traces {
        Backtrace::force_capture()
    } else {
        Backtrace::capture()
    };
    trace.to_string()
}
