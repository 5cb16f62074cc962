//! migradw Core
//!
//! Shared domain model for the warehouse loader: configuration sections,
//! table definitions, load phases and the run report.

pub mod config;
pub mod phase;
pub mod report;
pub mod schema;

pub use config::{Config, ConfigError, Dialect};
pub use phase::Phase;
pub use report::{PhaseSummary, ReportVersion, RunReport, RunStatus};
pub use schema::{ColumnDef, ForeignKey, SchemaError, SqlType, TableDef, TableRole};
