//! Load phases, in the order a run executes them

use serde::{Deserialize, Serialize};

/// One of the four phases of a load run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Drop every table
    Drop,

    /// Recreate every table empty
    Create,

    /// Bulk-load the staging tables
    Load,

    /// Populate dimension and fact tables from staging
    Insert,
}

impl Phase {
    /// All phases in execution order
    pub const ALL: [Phase; 4] = [Phase::Drop, Phase::Create, Phase::Load, Phase::Insert];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drop => "drop",
            Self::Create => "create",
            Self::Load => "load",
            Self::Insert => "insert",
        }
    }

    /// Status line printed when the phase starts
    pub fn status_line(&self) -> &'static str {
        match self {
            Self::Drop => "Dropping Tables",
            Self::Create => "Creating Tables",
            Self::Load => "Loading Tables",
            Self::Insert => "Inserting Tables",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
