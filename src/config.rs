use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::callbacks::CallbackRegistrations;
use crate::error::SqlSessionError;

pub(crate) const DEFAULT_POOL_TIMEOUT_SECS: u64 = 30;

/// Parameters handed to the driver when creating a pool or a dedicated connection.
///
/// Equality and hashing cover every field, so two configs that differ only in
/// `connection_limit` map to two different pools. Driver options this crate does not
/// model land in `extra` with their JSON type intact.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverParams {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "connectionLimit")]
    pub connection_limit: Option<u32>,
    pub timezone: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl DriverParams {
    /// Params naming only a database (a file path for the SQLite driver).
    #[must_use]
    pub fn for_database(database: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_connection_limit(mut self, limit: u32) -> Self {
        self.connection_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Set a driver-specific option such as `multipleStatements` or `connectTimeout`.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

impl Hash for DriverParams {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
        self.database.hash(state);
        self.user.hash(state);
        self.password.hash(state);
        self.connection_limit.hash(state);
        self.timezone.hash(state);
        // compact JSON text is canonical for equal values; map keys are sorted
        for (key, value) in &self.extra {
            key.hash(state);
            value.to_string().hash(state);
        }
    }
}

// Manual Debug so passwords never reach the logs
impl fmt::Debug for DriverParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("connection_limit", &self.connection_limit)
            .field("timezone", &self.timezone)
            .field("extra", &self.extra)
            .finish()
    }
}

/// Options for a connection handle.
///
/// Loadable from JSON; the camelCase keys of older configuration files are accepted as
/// aliases:
/// ```rust
/// use sql_session::prelude::*;
///
/// let cfg = ConnectionConfig::from_json_str(r#"{
///     "usePool": true,
///     "poolTimeout": 10,
///     "mysql": { "database": "app.db", "connectionLimit": 4 },
///     "autoCloseMinutes": 5
/// }"#).unwrap();
/// assert!(cfg.use_pool);
/// assert_eq!(cfg.driver.connection_limit, Some(4));
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    #[serde(alias = "usePool")]
    pub use_pool: bool,
    #[serde(alias = "poolTimeout", alias = "pool_timeout")]
    pub pool_timeout_secs: u64,
    #[serde(alias = "mysql", alias = "driverParams")]
    pub driver: DriverParams,
    #[serde(alias = "autoCloseMinutes", deserialize_with = "lenient_minutes")]
    pub auto_close_minutes: f64,
    #[serde(alias = "useNamedParamsQueryFormat", alias = "useNamedParams")]
    pub use_named_params: bool,
    #[serde(alias = "showDebugTraces")]
    pub show_debug_traces: bool,
    #[serde(alias = "showConnectionLeftOpenTrace")]
    pub show_connection_left_open_trace: bool,
    #[serde(skip)]
    pub callbacks: Option<CallbackRegistrations>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            use_pool: false,
            pool_timeout_secs: DEFAULT_POOL_TIMEOUT_SECS,
            driver: DriverParams::default(),
            auto_close_minutes: 0.0,
            use_named_params: false,
            show_debug_traces: false,
            show_connection_left_open_trace: false,
            callbacks: None,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("use_pool", &self.use_pool)
            .field("pool_timeout_secs", &self.pool_timeout_secs)
            .field("driver", &self.driver)
            .field("auto_close_minutes", &self.auto_close_minutes)
            .field("use_named_params", &self.use_named_params)
            .field("show_debug_traces", &self.show_debug_traces)
            .field(
                "show_connection_left_open_trace",
                &self.show_connection_left_open_trace,
            )
            .field("callbacks", &self.callbacks.is_some())
            .finish()
    }
}

impl ConnectionConfig {
    #[must_use]
    pub fn new(driver: DriverParams) -> Self {
        Self {
            driver,
            ..Self::default()
        }
    }

    /// Parse a config from JSON text.
    ///
    /// # Errors
    /// Returns `SqlSessionError::Config` if the text is not a valid config document.
    pub fn from_json_str(text: &str) -> Result<Self, SqlSessionError> {
        serde_json::from_str(text)
            .map_err(|e| SqlSessionError::Config(format!("invalid connection config: {e}")))
    }

    /// Read and parse a JSON config file.
    ///
    /// # Errors
    /// Returns `SqlSessionError::Config` if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SqlSessionError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SqlSessionError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    #[must_use]
    pub fn with_pool(mut self, use_pool: bool) -> Self {
        self.use_pool = use_pool;
        self
    }

    #[must_use]
    pub fn with_pool_timeout_secs(mut self, secs: u64) -> Self {
        self.pool_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn with_auto_close_minutes(mut self, minutes: f64) -> Self {
        self.auto_close_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_named_params(mut self, enabled: bool) -> Self {
        self.use_named_params = enabled;
        self
    }

    #[must_use]
    pub fn with_debug_traces(mut self, enabled: bool) -> Self {
        self.show_debug_traces = enabled;
        self
    }

    #[must_use]
    pub fn with_connection_left_open_trace(mut self, enabled: bool) -> Self {
        self.show_connection_left_open_trace = enabled;
        self
    }

    #[must_use]
    pub fn with_callbacks(mut self, callbacks: CallbackRegistrations) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    /// Acquisition timer period; a zero setting falls back to the default.
    #[must_use]
    pub fn pool_timeout(&self) -> Duration {
        let secs = if self.pool_timeout_secs == 0 {
            DEFAULT_POOL_TIMEOUT_SECS
        } else {
            self.pool_timeout_secs
        };
        Duration::from_secs(secs)
    }

    /// Whether stack traces of open handles should be captured and reported.
    #[must_use]
    pub fn traces_enabled(&self) -> bool {
        self.show_debug_traces || self.show_connection_left_open_trace
    }

    #[must_use]
    pub fn timezone(&self) -> Option<&str> {
        self.driver.timezone.as_deref()
    }

    pub(crate) fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

/// Accepts any JSON number; anything else (strings, null, objects) disables reaping.
fn lenient_minutes<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64().filter(|m| m.is_finite()).unwrap_or(0.0))
}
