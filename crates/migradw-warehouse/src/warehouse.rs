//! Warehouse connection trait and connection parameters

use migradw_core::{Config, ConfigError};
use std::error::Error as StdError;
use std::fmt;

/// Boxed driver error, kept as the source of a [`WarehouseError`]
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// TLS mode for the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Plain TCP
    Disable,

    /// TLS when the server offers it, plain TCP otherwise
    #[default]
    Prefer,

    /// TLS via native-tls, failing if the server refuses it
    Require,
}

impl std::str::FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disable" => Ok(Self::Disable),
            "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            other => Err(format!(
                "unknown sslmode '{}' (expected disable, prefer or require)",
                other
            )),
        }
    }
}

/// Parameters for the single warehouse connection of a run
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub sslmode: SslMode,
}

impl ConnectionParams {
    /// Read the `[dwh]` section
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let sslmode = match config.get("dwh", "sslmode") {
            Ok(raw) => raw.parse().map_err(|reason| ConfigError::InvalidValue {
                section: "dwh".to_string(),
                key: "sslmode".to_string(),
                reason,
            })?,
            Err(_) => SslMode::default(),
        };

        Ok(Self {
            host: config.get("dwh", "host")?.to_string(),
            port: config.get_u16("dwh", "dwh_port")?,
            database: config.get("dwh", "dwh_db")?.to_string(),
            user: config.get("dwh", "dwh_db_user")?.to_string(),
            password: config.get("dwh", "dwh_db_password")?.to_string(),
            sslmode,
        })
    }

    /// `host:port/database`, for logs and errors
    pub fn target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("sslmode", &self.sslmode)
            .finish()
    }
}

/// Errors that can occur talking to the warehouse
///
/// `message` holds the full driver text, so Display never interpolates the
/// boxed source.
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    #[error("Failed to connect to {target}: {message}")]
    Connection {
        target: String,
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    /// The driver's error for a failed statement
    #[error("{message}")]
    Execution {
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("Connection is closed")]
    Closed,
}

impl WarehouseError {
    /// Wrap a driver error from a failed statement
    pub fn execution(source: impl Into<BoxError>) -> Self {
        let source = source.into();
        Self::Execution {
            message: describe(source.as_ref()),
            source,
        }
    }

    /// Wrap a driver error raised while connecting
    pub fn connection(target: impl Into<String>, source: impl Into<BoxError>) -> Self {
        let source = source.into();
        Self::Connection {
            target: target.into(),
            message: describe(source.as_ref()),
            source,
        }
    }

    /// Whether the error happened before any statement could run
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Tls(_))
    }
}

/// Join the messages along an error's source chain
///
/// Drivers often display a generic summary and keep the server's text in
/// the source. A link whose text already appears is skipped.
pub fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut next = err.source();
    while let Some(cause) = next {
        let text = cause.to_string();
        if !text.is_empty() && !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        next = cause.source();
    }
    message
}

/// A live connection with a single cursor
///
/// Statements run one at a time on the caller's task. `execute` opens a
/// transaction if none is open; `commit` ends it.
#[async_trait::async_trait]
pub trait Warehouse: Send {
    /// Get the warehouse name (e.g., "PostgreSQL")
    fn name(&self) -> &'static str;

    /// Check the connection answers a trivial query
    async fn test_connection(&mut self) -> Result<(), WarehouseError>;

    /// Execute one statement, returning the rows it reported
    ///
    /// Result sets are discarded.
    async fn execute(&mut self, sql: &str) -> Result<u64, WarehouseError>;

    /// Commit the open transaction
    async fn commit(&mut self) -> Result<(), WarehouseError>;

    /// Close the connection; uncommitted work is discarded
    async fn close(&mut self) -> Result<(), WarehouseError>;
}
