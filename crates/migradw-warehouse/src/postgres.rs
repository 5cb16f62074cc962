//! PostgreSQL wire protocol connection
//!
//! Works with:
//! - Amazon Redshift
//! - PostgreSQL 10+
//!
//! Statements go over the simple query protocol, the same way an interactive
//! client sends them, so vendor statements like Redshift's `COPY ... CREDENTIALS`
//! are never prepared. A transaction is opened lazily before the first
//! statement and closed by `commit`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let params = ConnectionParams::from_config(&config)?;
//! let mut warehouse = PostgresWarehouse::connect(&params).await?;
//! warehouse.execute("DROP TABLE IF EXISTS t").await?;
//! warehouse.commit().await?;
//! ```

use crate::warehouse::{describe, ConnectionParams, SslMode, Warehouse, WarehouseError};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio::task::JoinHandle;
use tokio_postgres::config::SslMode as PgSslMode;
use tokio_postgres::{Client, Config as PgConfig, NoTls, SimpleQueryMessage};

/// Connection to a PostgreSQL-compatible warehouse
pub struct PostgresWarehouse {
    /// Dropped on close
    client: Option<Client>,

    /// Task driving the socket
    connection: Option<JoinHandle<()>>,

    /// `host:port/database`
    target: String,

    in_transaction: bool,
}

impl PostgresWarehouse {
    /// Connect with plain TCP or TLS depending on `sslmode`
    pub async fn connect(params: &ConnectionParams) -> Result<Self, WarehouseError> {
        let target = params.target();
        let config = Self::pg_config(params);

        tracing::info!(warehouse = %target, sslmode = ?params.sslmode, "Connecting to warehouse");

        let (client, connection) = match params.sslmode {
            SslMode::Disable => {
                let (client, connection) = config
                    .connect(NoTls)
                    .await
                    .map_err(|e| connection_error(&target, e))?;
                (client, Self::spawn_connection(target.clone(), connection))
            }
            SslMode::Prefer | SslMode::Require => {
                let connector = TlsConnector::builder()
                    .build()
                    .map_err(|e| WarehouseError::Tls(e.to_string()))?;
                let tls = MakeTlsConnector::new(connector);

                let (client, connection) = config
                    .connect(tls)
                    .await
                    .map_err(|e| connection_error(&target, e))?;
                (client, Self::spawn_connection(target.clone(), connection))
            }
        };

        Ok(Self {
            client: Some(client),
            connection: Some(connection),
            target,
            in_transaction: false,
        })
    }

    /// Build the driver config field by field so no value is ever spliced
    /// into a connection string
    fn pg_config(params: &ConnectionParams) -> PgConfig {
        let mut config = PgConfig::new();
        config
            .host(&params.host)
            .port(params.port)
            .dbname(&params.database)
            .user(&params.user)
            .password(&params.password)
            .application_name("migradw")
            .ssl_mode(match params.sslmode {
                SslMode::Disable => PgSslMode::Disable,
                SslMode::Prefer => PgSslMode::Prefer,
                SslMode::Require => PgSslMode::Require,
            });
        config
    }

    fn spawn_connection<F>(target: String, connection: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = Result<(), tokio_postgres::Error>> + Send + 'static,
    {
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(warehouse = %target, error = %e, "Warehouse connection error");
            }
        })
    }

    /// Connection target, `host:port/database`
    pub fn target(&self) -> &str {
        &self.target
    }

    fn client(&self) -> Result<&Client, WarehouseError> {
        self.client.as_ref().ok_or(WarehouseError::Closed)
    }

    async fn rollback(&mut self) {
        if !self.in_transaction {
            return;
        }
        self.in_transaction = false;
        if let Ok(client) = self.client() {
            if let Err(e) = client.batch_execute("ROLLBACK").await {
                tracing::warn!(warehouse = %self.target, error = %e, "Rollback failed");
            }
        }
    }
}

/// The server's own text when it sent one, otherwise the error chain
///
/// tokio-postgres displays a server error as just "db error".
fn driver_message(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => db.to_string(),
        None => describe(e),
    }
}

fn connection_error(target: &str, e: tokio_postgres::Error) -> WarehouseError {
    WarehouseError::Connection {
        target: target.to_string(),
        message: driver_message(&e),
        source: Box::new(e),
    }
}

fn execution_error(e: tokio_postgres::Error) -> WarehouseError {
    WarehouseError::Execution {
        message: driver_message(&e),
        source: Box::new(e),
    }
}

/// Sum the row counts the server reported for a simple query
fn rows_affected(messages: &[SimpleQueryMessage]) -> u64 {
    messages
        .iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::CommandComplete(rows) => Some(*rows),
            _ => None,
        })
        .sum()
}

#[async_trait::async_trait]
impl Warehouse for PostgresWarehouse {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    async fn test_connection(&mut self) -> Result<(), WarehouseError> {
        let target = self.target.clone();
        self.client()?
            .simple_query("SELECT 1")
            .await
            .map_err(|e| connection_error(&target, e))?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, WarehouseError> {
        if !self.in_transaction {
            self.client()?
                .batch_execute("BEGIN")
                .await
                .map_err(execution_error)?;
            self.in_transaction = true;
        }

        let result = self.client()?.simple_query(sql).await;
        match result {
            Ok(messages) => Ok(rows_affected(&messages)),
            Err(e) => {
                self.rollback().await;
                Err(execution_error(e))
            }
        }
    }

    async fn commit(&mut self) -> Result<(), WarehouseError> {
        if !self.in_transaction {
            return Ok(());
        }
        self.client()?
            .batch_execute("COMMIT")
            .await
            .map_err(execution_error)?;
        self.in_transaction = false;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), WarehouseError> {
        self.rollback().await;

        // Dropping the client ends the connection task
        drop(self.client.take());
        if let Some(connection) = self.connection.take() {
            let _ = connection.await;
        }

        tracing::debug!(warehouse = %self.target, "Closed warehouse connection");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConnectionParams {
        ConnectionParams {
            host: "localhost".to_string(),
            port: 5439,
            database: "dwh".to_string(),
            user: "loader".to_string(),
            password: "secret".to_string(),
            sslmode: SslMode::Disable,
        }
    }

    #[test]
    fn test_pg_config_fields() {
        let config = PostgresWarehouse::pg_config(&params());
        assert_eq!(config.get_ports(), &[5439]);
        assert_eq!(config.get_dbname(), Some("dwh"));
        assert_eq!(config.get_user(), Some("loader"));
        assert_eq!(config.get_password(), Some(&b"secret"[..]));
    }

    #[test]
    fn test_pg_config_ssl_mode() {
        let mut params = params();
        assert_eq!(PostgresWarehouse::pg_config(&params).get_ssl_mode(), PgSslMode::Disable);

        params.sslmode = SslMode::Prefer;
        assert_eq!(PostgresWarehouse::pg_config(&params).get_ssl_mode(), PgSslMode::Prefer);

        params.sslmode = SslMode::Require;
        assert_eq!(PostgresWarehouse::pg_config(&params).get_ssl_mode(), PgSslMode::Require);
    }

    #[test]
    fn test_pg_config_does_not_parse_values() {
        let mut params = params();
        params.database = "dwh user=admin".to_string();
        let config = PostgresWarehouse::pg_config(&params);
        assert_eq!(config.get_dbname(), Some("dwh user=admin"));
        assert_eq!(config.get_user(), Some("loader"));
    }

    #[tokio::test]
    async fn test_connect_refused_is_connectivity_error() {
        let mut params = params();
        // Port 1 is reserved and closed on test machines
        params.port = 1;
        let result = PostgresWarehouse::connect(&params).await;
        match result {
            Err(err) => {
                assert!(err.is_connectivity(), "unexpected error: {}", err);
                // The socket error from the source chain is part of the message
                let text = err.to_string();
                assert!(text.starts_with("Failed to connect to localhost:1/dwh: "));
                assert!(text.to_lowercase().contains("refused"), "unexpected error: {}", text);
            }
            Ok(_) => panic!("connection to port 1 should fail"),
        }
    }

    #[tokio::test]
    async fn test_connect_refused_with_prefer_is_connectivity_error() {
        let mut params = params();
        params.port = 1;
        params.sslmode = SslMode::Prefer;
        match PostgresWarehouse::connect(&params).await {
            Err(err) => assert!(err.is_connectivity(), "unexpected error: {}", err),
            Ok(_) => panic!("connection to port 1 should fail"),
        }
    }
}
