//! Warehouse connections for the loader
//!
//! One connection per run, used sequentially. The [`Warehouse`] trait is the
//! seam between the ETL driver and the database:
//!
//! - [`PostgresWarehouse`] speaks the PostgreSQL wire protocol (Redshift or
//!   PostgreSQL), enabled by the `postgres` feature (on by default)
//! - [`RecordingWarehouse`] records calls in memory for tests

pub mod recording;
pub mod warehouse;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use recording::{Event, RecordingWarehouse};
pub use warehouse::{BoxError, ConnectionParams, SslMode, Warehouse, WarehouseError};

#[cfg(feature = "postgres")]
pub use postgres::PostgresWarehouse;
