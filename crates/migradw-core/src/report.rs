//! Run report (run-report.json v1)

use crate::phase::Phase;
use serde::{Deserialize, Serialize};

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Statements executed in one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub phase: Phase,

    /// Statements executed and committed
    pub statements_committed: usize,

    /// Rows reported by the warehouse across the phase's statements
    pub rows_affected: u64,

    /// Wall-clock time spent in the phase
    pub elapsed_ms: u64,
}

impl PhaseSummary {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            statements_committed: 0,
            rows_affected: 0,
            elapsed_ms: 0,
        }
    }
}

/// Outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunStatus {
    /// Every phase completed
    Succeeded,

    /// The warehouse did not answer the connection check
    Unreachable { message: String },

    /// A statement failed and the run stopped
    Failed {
        phase: Phase,
        /// 1-based position of the failing statement within the phase
        position: usize,
        table: String,
        message: String,
    },
}

/// Report of a single load run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Schema version
    pub version: ReportVersion,

    /// Start timestamp (ISO 8601)
    pub started_at: String,

    /// Finish timestamp (ISO 8601), set when the run ends
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,

    /// Warehouse the run targeted
    pub warehouse: String,

    /// Phases that started, in order
    pub phases: Vec<PhaseSummary>,

    pub status: RunStatus,
}

impl RunReport {
    /// Start a new report
    pub fn new(warehouse: impl Into<String>) -> Self {
        Self {
            version: ReportVersion::CURRENT,
            started_at: chrono::Utc::now().to_rfc3339(),
            finished_at: None,
            warehouse: warehouse.into(),
            phases: Vec::new(),
            status: RunStatus::Succeeded,
        }
    }

    /// Stamp the finish time
    pub fn finish(&mut self) {
        self.finished_at = Some(chrono::Utc::now().to_rfc3339());
    }

    /// Whether the run completed every phase
    pub fn succeeded(&self) -> bool {
        matches!(self.status, RunStatus::Succeeded)
    }

    /// Summary for a phase, if it started
    pub fn phase(&self, phase: Phase) -> Option<&PhaseSummary> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    /// Total statements committed across all phases
    pub fn statements_committed(&self) -> usize {
        self.phases.iter().map(|p| p.statements_committed).sum()
    }

    /// Export as pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
