//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types
//! to make it easier to get started with the library.

pub use crate::callbacks::{CallbackRegistrations, Operation, OperationEvent};
pub use crate::config::{ConnectionConfig, DriverParams};
pub use crate::context::DbContext;
pub use crate::driver::{Driver, DriverConnection, DriverPool, QueryOutcome};
pub use crate::error::{QueryError, SqlSessionError};
pub use crate::format::{EscapeStyle, ValueFormatter};
pub use crate::handle::{ConnectionHandle, ErrorMode, HandleState};
pub use crate::query_builder::WhereClause;
pub use crate::results::{CustomDbRow, ResultSet, RowCursor};
pub use crate::types::{Params, RowValues};

#[cfg(feature = "sqlite")]
pub use crate::driver::sqlite::SqliteDriver;
