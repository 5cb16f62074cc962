//! migradw engine - the load run
//!
//! Runs the four phases of a load against one warehouse connection:
//! - Drop every table
//! - Create every table
//! - Bulk-load the staging tables
//! - Insert into dimension and fact tables
//!
//! Every statement is committed on its own. The first failure stops the run.

pub mod driver;

pub use driver::{run_phase, EtlDriver, EtlError};
