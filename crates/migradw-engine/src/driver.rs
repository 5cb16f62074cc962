//! ETL driver
//!
//! Executes the catalog phase by phase over a single connection. Within a
//! phase statements run in catalog order and each one is committed before
//! the next is sent. There is no retry: the first failing statement ends the
//! run and earlier commits stay in place.

use migradw_core::{Phase, PhaseSummary, RunReport, RunStatus};
use migradw_sql::{QueryCatalog, Statement};
use migradw_warehouse::{Warehouse, WarehouseError};
use std::time::Instant;

/// Errors that stop a load run
///
/// The warehouse's message is reached through `source()` or [`EtlError::cause`].
#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    #[error("Warehouse connection check failed")]
    Connection(#[source] WarehouseError),

    #[error("{phase} phase failed at statement {position} ({table})")]
    Statement {
        phase: Phase,

        /// 1-based position within the phase
        position: usize,

        table: String,

        #[source]
        source: WarehouseError,
    },
}

impl EtlError {
    /// Phase the run stopped in, if it got that far
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Connection(_) => None,
            Self::Statement { phase, .. } => Some(*phase),
        }
    }

    /// The warehouse error that stopped the run
    pub fn cause(&self) -> &WarehouseError {
        match self {
            Self::Connection(source) | Self::Statement { source, .. } => source,
        }
    }

    fn status(&self) -> RunStatus {
        match self {
            Self::Connection(source) => RunStatus::Unreachable {
                message: source.to_string(),
            },
            Self::Statement {
                phase,
                position,
                table,
                source,
            } => RunStatus::Failed {
                phase: *phase,
                position: *position,
                table: table.clone(),
                message: source.to_string(),
            },
        }
    }
}

type PhaseHook = Box<dyn FnMut(Phase) + Send>;

/// Runs a [`QueryCatalog`] against a warehouse
pub struct EtlDriver {
    catalog: QueryCatalog,

    /// Called as each phase starts; prints the status line by default
    on_phase: PhaseHook,
}

impl EtlDriver {
    pub fn new(catalog: QueryCatalog) -> Self {
        Self {
            catalog,
            on_phase: Box::new(|phase| println!("{}", phase.status_line())),
        }
    }

    /// Replace the phase-start hook
    pub fn on_phase(mut self, hook: impl FnMut(Phase) + Send + 'static) -> Self {
        self.on_phase = Box::new(hook);
        self
    }

    pub fn catalog(&self) -> &QueryCatalog {
        &self.catalog
    }

    /// Run every phase, then close the connection
    ///
    /// `report` is filled in whether or not the run succeeds: one summary per
    /// phase that started, and the final status.
    pub async fn run(
        &mut self,
        warehouse: &mut dyn Warehouse,
        report: &mut RunReport,
    ) -> Result<(), EtlError> {
        let result = self.run_phases(warehouse, report).await;

        if let Err(e) = warehouse.close().await {
            tracing::warn!(warehouse = warehouse.name(), error = %e, "Failed to close connection");
        }

        report.status = match &result {
            Ok(()) => RunStatus::Succeeded,
            Err(err) => err.status(),
        };
        report.finish();

        match &result {
            Ok(()) => tracing::info!(
                statements = report.statements_committed(),
                "Load run completed"
            ),
            Err(err) => tracing::error!(error = %err, cause = %err.cause(), "Load run failed"),
        }

        result
    }

    async fn run_phases(
        &mut self,
        warehouse: &mut dyn Warehouse,
        report: &mut RunReport,
    ) -> Result<(), EtlError> {
        warehouse
            .test_connection()
            .await
            .map_err(EtlError::Connection)?;

        for phase in Phase::ALL {
            (self.on_phase)(phase);

            let statements = self.catalog.statements(phase);
            tracing::info!(phase = %phase, statements = statements.len(), "Starting phase");

            let mut summary = PhaseSummary::new(phase);
            let result = run_phase(warehouse, statements, &mut summary).await;
            report.phases.push(summary);
            result?;
        }

        Ok(())
    }
}

/// Execute and commit each statement in order
///
/// `summary` counts the statements committed before any failure, so on error
/// it holds exactly the work that persisted.
pub async fn run_phase(
    warehouse: &mut dyn Warehouse,
    statements: &[Statement],
    summary: &mut PhaseSummary,
) -> Result<(), EtlError> {
    let phase = summary.phase;
    let start = Instant::now();

    for (index, statement) in statements.iter().enumerate() {
        let position = index + 1;
        tracing::debug!(
            phase = %phase,
            position,
            kind = %statement.kind,
            table = %statement.table,
            "Executing statement"
        );

        let outcome = match warehouse.execute(&statement.sql).await {
            Ok(rows) => warehouse.commit().await.map(|()| rows),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(rows) => {
                summary.statements_committed += 1;
                summary.rows_affected += rows;
            }
            Err(source) => {
                summary.elapsed_ms = elapsed_ms(start);
                tracing::error!(
                    phase = %phase,
                    position,
                    table = %statement.table,
                    error = %source,
                    "Statement failed"
                );
                return Err(EtlError::Statement {
                    phase,
                    position,
                    table: statement.table.clone(),
                    source,
                });
            }
        }
    }

    summary.elapsed_ms = elapsed_ms(start);
    tracing::info!(
        phase = %phase,
        statements = summary.statements_committed,
        rows = summary.rows_affected,
        elapsed_ms = summary.elapsed_ms,
        "Phase complete"
    );
    Ok(())
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
