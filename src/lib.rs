//! Async database session handles over pooled or dedicated connections.
//!
//! A [`DbContext`] owns a driver, the default [`ConnectionConfig`], one pool per
//! distinct [`DriverParams`], and an optional idle reaper that force-closes handles
//! left open too long. [`ConnectionHandle`]s are created from the context, started,
//! queried, and ended:
//!
//! ```rust,no_run
//! use sql_session::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlSessionError> {
//! let ctx = DbContext::sqlite(
//!     ConnectionConfig::new(DriverParams::for_database("app.db")).with_pool(true),
//! )?;
//! let db = ctx.create_and_start().await?;
//! db.begin().await?;
//! db.insert("users").set("name", "alice").run().await?;
//! db.commit().await?;
//! if let Some(row) = db.select_row("select count(*) as n from users", ()).await? {
//!     println!("{:?}", row.get("n"));
//! }
//! db.end().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Statements are passed to the driver with positional `?` parameters. With
//! `use_named_params` enabled, `:name` parameters are substituted locally by the
//! [`ValueFormatter`] instead.

pub mod callbacks;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod format;
pub mod handle;
pub mod pool;
pub mod prelude;
pub mod query_builder;
pub mod reaper;
pub mod results;
pub mod token;
pub mod types;

pub use callbacks::{CallbackRegistrations, Operation, OperationEvent};
pub use config::{ConnectionConfig, DriverParams};
pub use context::DbContext;
pub use driver::{Driver, DriverConnection, DriverPool, QueryOutcome};
pub use error::{QueryError, SqlSessionError};
pub use format::{EscapeStyle, ValueFormatter};
pub use handle::{ConnectionHandle, ErrorMode, HandleState, OpenHandleInfo};
pub use pool::PoolRegistry;
pub use query_builder::{InsertBuilder, UpdateBuilder, WhereClause};
pub use reaper::{IdleReaper, REAP_INTERVAL, ReapReport};
pub use results::{CustomDbRow, ResultSet, RowCursor};
pub use token::TokenRegistry;
pub use types::{Params, RowValues};

#[cfg(feature = "sqlite")]
pub use driver::sqlite::SqliteDriver;
