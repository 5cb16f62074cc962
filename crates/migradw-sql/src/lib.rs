//! Query catalog for the immigration warehouse
//!
//! Renders the drop, create, bulk-load and insert statements of a load run
//! from typed table definitions, and validates them before anything is sent
//! to the warehouse.
//!
//! ## Example
//!
//! ```rust,ignore
//! use migradw_core::{Config, Phase};
//! use migradw_sql::QueryCatalog;
//!
//! let config = Config::from_file("dwh.toml".as_ref())?;
//! let catalog = QueryCatalog::from_config(&config)?;
//! for statement in catalog.statements(Phase::Drop) {
//!     println!("{}", statement.sql);
//! }
//! ```

pub mod catalog;
pub mod statement;
pub mod tables;
pub mod validate;

pub use catalog::{CatalogError, CatalogParams, QueryCatalog, DEFAULT_REGION};
pub use statement::{BulkSource, InsertSelect, Statement, StatementKind};
pub use validate::StatementValidator;
