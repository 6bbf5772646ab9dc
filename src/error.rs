use std::fmt;

use thiserror::Error;

use crate::types::Params;

/// Structured failure reported when the driver rejects a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryError {
    /// Stack trace captured when the query was issued (empty when tracing is off).
    pub stack: String,
    /// The statement text as handed to the handle.
    pub sql: String,
    /// Parameters after normalization.
    pub params: Params,
    /// Driver message, or a generic message when the driver gave none.
    pub message: String,
}

impl QueryError {
    pub(crate) const UNSPECIFIED: &'static str = "Unspecified Database Query Error.";
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (sql: {})", self.message, self.sql)
    }
}

#[derive(Debug, Clone, Error)]
pub enum SqlSessionError {
    #[error("Database connection already open.")]
    AlreadyOpen,

    #[error("Database connection is not open.")]
    NotOpen,

    #[error("Database connection is already closed.")]
    AlreadyClosed,

    #[error("Problem getting database connection: {0}")]
    Acquisition(String),

    #[error("Database query error: {0}")]
    Query(QueryError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Parameter error: {0}")]
    Parameter(String),

    #[error("Token space exhausted for length {0}")]
    TokenSpaceExhausted(usize),

    #[error("Driver error: {0}")]
    Driver(String),
}

impl SqlSessionError {
    /// Message suitable for a [`QueryError`] built from this error.
    #[must_use]
    pub fn driver_message(&self) -> String {
        match self {
            SqlSessionError::Driver(msg)
            | SqlSessionError::Connection(msg)
            | SqlSessionError::Parameter(msg) => msg.clone(),
            SqlSessionError::Query(err) => err.message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for SqlSessionError {
    fn from(err: rusqlite::Error) -> Self {
        SqlSessionError::Driver(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<bb8::RunError<SqlSessionError>> for SqlSessionError {
    fn from(err: bb8::RunError<SqlSessionError>) -> Self {
        match err {
            bb8::RunError::User(inner) => {
                SqlSessionError::Acquisition(format!("SQLite pool error: {inner}"))
            }
            bb8::RunError::TimedOut => {
                SqlSessionError::Acquisition("SQLite pool checkout timed out".into())
            }
        }
    }
}

impl From<tokio::task::JoinError> for SqlSessionError {
    fn from(err: tokio::task::JoinError) -> Self {
        SqlSessionError::Driver(format!("blocking task join error: {err}"))
    }
}
