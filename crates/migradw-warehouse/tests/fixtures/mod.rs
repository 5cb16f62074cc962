//! Test fixtures for warehouse integration tests

use migradw_core::Config;
use migradw_warehouse::{ConnectionParams, SslMode};

/// Check if PostgreSQL credentials are available
pub fn has_postgres_credentials() -> bool {
    std::env::var("PGHOST").is_ok()
}

/// Connection parameters from the standard libpq variables
pub fn postgres_params() -> ConnectionParams {
    ConnectionParams {
        host: std::env::var("PGHOST").unwrap_or_else(|_| "localhost".to_string()),
        port: std::env::var("PGPORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5432),
        database: std::env::var("PGDATABASE").unwrap_or_else(|_| "postgres".to_string()),
        user: std::env::var("PGUSER").unwrap_or_else(|_| "postgres".to_string()),
        password: std::env::var("PGPASSWORD").unwrap_or_default(),
        sslmode: SslMode::Disable,
    }
}

/// A postgres-dialect config whose bulk sources are never read
pub fn postgres_config() -> Config {
    let mut config = Config::new();
    config.set("dwh", "dialect", "postgres");
    config.set("s3", "immigration_data", "/nonexistent/immigration.csv");
    config.set("s3", "demographics_data", "/nonexistent/demographics.csv");
    config
}

/// A redshift config with every key the loader reads
pub fn redshift_config() -> Config {
    Config::from_toml(
        r#"
[dwh]
host = "dwhcluster.example.ap-southeast-2.redshift.amazonaws.com"
dwh_db = "dwh"
dwh_db_user = "dwhuser"
dwh_db_password = "Passw0rd"
dwh_port = 5439

[s3]
immigration_data = "s3://capstone/immigration.csv"
demographics_data = "s3://capstone/demographics.csv"

[iam_role]
arn = "arn:aws:iam::123456789012:role/dwhRole"
"#,
    )
    .expect("fixture config parses")
}
