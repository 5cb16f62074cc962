//! Integration tests for warehouse connections
//!
//! Tests requiring a live PostgreSQL server are marked with `#[ignore]` and
//! can be run with `cargo test -- --ignored`.
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all non-ignored tests (no database required)
//! cargo test -p migradw-warehouse --test integration_tests
//!
//! # Run PostgreSQL integration tests
//! PGHOST=localhost \
//! PGPORT=5432 \
//! PGDATABASE=dwh_test \
//! PGUSER=user \
//! PGPASSWORD=pass \
//! cargo test -p migradw-warehouse --test integration_tests -- --ignored
//! ```

mod fixtures;

use migradw_core::Phase;
use migradw_sql::QueryCatalog;
use migradw_warehouse::{
    ConnectionParams, Event, PostgresWarehouse, RecordingWarehouse, Warehouse, WarehouseError,
};

async fn drop_and_create(warehouse: &mut dyn Warehouse, catalog: &QueryCatalog) {
    for phase in [Phase::Drop, Phase::Create] {
        for statement in catalog.statements(phase) {
            warehouse.execute(&statement.sql).await.unwrap();
            warehouse.commit().await.unwrap();
        }
    }
}

// =============================================================================
// Recording Warehouse Tests (No database required)
// =============================================================================

#[tokio::test]
async fn test_recording_drop_create_is_idempotent() {
    let catalog = QueryCatalog::from_config(&fixtures::redshift_config()).unwrap();
    let mut warehouse = RecordingWarehouse::new();

    drop_and_create(&mut warehouse, &catalog).await;
    let first = warehouse.existing_tables().await;

    drop_and_create(&mut warehouse, &catalog).await;
    let second = warehouse.existing_tables().await;

    assert_eq!(first.len(), 6);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_recording_drop_on_empty_warehouse_succeeds() {
    let catalog = QueryCatalog::from_config(&fixtures::redshift_config()).unwrap();
    let mut warehouse = RecordingWarehouse::new();

    for statement in catalog.statements(Phase::Drop) {
        warehouse.execute(&statement.sql).await.unwrap();
        warehouse.commit().await.unwrap();
    }

    assert!(warehouse.existing_tables().await.is_empty());
    assert_eq!(warehouse.committed().await.len(), 6);
}

#[tokio::test]
async fn test_recording_commit_after_each_statement() {
    let catalog = QueryCatalog::from_config(&fixtures::redshift_config()).unwrap();
    let mut warehouse = RecordingWarehouse::new();
    drop_and_create(&mut warehouse, &catalog).await;

    let events = warehouse.events().await;
    assert_eq!(events.len(), 24);
    for pair in events.chunks(2) {
        assert!(matches!(pair[0], Event::Execute(_)));
        assert_eq!(pair[1], Event::Commit);
    }
}

#[tokio::test]
async fn test_recording_latency_simulation() {
    let mut warehouse = RecordingWarehouse::new().with_latency(50);

    let start = std::time::Instant::now();
    warehouse.execute("SELECT 1").await.unwrap();
    assert!(start.elapsed() >= std::time::Duration::from_millis(50));
}

#[test]
fn test_params_from_redshift_config() {
    let params = ConnectionParams::from_config(&fixtures::redshift_config()).unwrap();
    assert_eq!(params.port, 5439);
    assert_eq!(params.user, "dwhuser");
    assert_eq!(params.database, "dwh");
}

// =============================================================================
// PostgreSQL Tests (Require a live server)
// =============================================================================

#[tokio::test]
#[ignore]
async fn test_postgres_connection() {
    if !fixtures::has_postgres_credentials() {
        eprintln!("Skipping PostgreSQL test: PGHOST not set");
        return;
    }

    let mut warehouse = PostgresWarehouse::connect(&fixtures::postgres_params())
        .await
        .expect("Failed to connect to PostgreSQL");
    warehouse.test_connection().await.unwrap();
    warehouse.close().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_postgres_wrong_password() {
    if !fixtures::has_postgres_credentials() {
        return;
    }

    let mut params = fixtures::postgres_params();
    params.password = "definitely-not-the-password".to_string();
    params.user = "migradw_no_such_user".to_string();

    match PostgresWarehouse::connect(&params).await {
        Err(err) => assert!(err.is_connectivity()),
        Ok(_) => panic!("connection with bad credentials should fail"),
    }
}

#[tokio::test]
#[ignore]
async fn test_postgres_drop_create_twice() {
    if !fixtures::has_postgres_credentials() {
        return;
    }

    let catalog = QueryCatalog::from_config(&fixtures::postgres_config()).unwrap();
    let mut warehouse = PostgresWarehouse::connect(&fixtures::postgres_params())
        .await
        .unwrap();

    drop_and_create(&mut warehouse, &catalog).await;
    let first = schema_snapshot().await;

    drop_and_create(&mut warehouse, &catalog).await;
    let second = schema_snapshot().await;

    warehouse.close().await.unwrap();

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[tokio::test]
#[ignore]
async fn test_postgres_failed_statement_surfaces_driver_error() {
    if !fixtures::has_postgres_credentials() {
        return;
    }

    let mut warehouse = PostgresWarehouse::connect(&fixtures::postgres_params())
        .await
        .unwrap();

    let err = warehouse
        .execute("INSERT INTO migradw_table_that_does_not_exist VALUES (1)")
        .await
        .unwrap_err();
    assert!(matches!(err, WarehouseError::Execution { .. }));
    assert!(err.to_string().contains("migradw_table_that_does_not_exist"));

    // The connection is usable again after the failed transaction
    warehouse.execute("SELECT 1").await.unwrap();
    warehouse.commit().await.unwrap();
    warehouse.close().await.unwrap();
}

/// Table and column layout of the loader's tables, sorted
async fn schema_snapshot() -> Vec<(String, String, String)> {
    let params = fixtures::postgres_params();
    let (client, connection) = tokio_postgres::connect(
        &format!(
            "host={} port={} dbname={} user={} password={}",
            params.host, params.port, params.database, params.user, params.password
        ),
        tokio_postgres::NoTls,
    )
    .await
    .unwrap();
    tokio::spawn(connection);

    let rows = client
        .query(
            "SELECT table_name::text, column_name::text, data_type::text \
             FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name LIKE '%\\_table' \
             ORDER BY table_name, ordinal_position",
            &[],
        )
        .await
        .unwrap();

    rows.iter()
        .map(|row| (row.get(0), row.get(1), row.get(2)))
        .collect()
}
