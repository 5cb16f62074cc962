use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use migradw_core::{Config, Phase, RunReport, RunStatus};
use migradw_engine::EtlDriver;
use migradw_sql::QueryCatalog;
use migradw_warehouse::{ConnectionParams, PostgresWarehouse, Warehouse, WarehouseError};

/// Default config file, looked up in the working directory
const DEFAULT_CONFIG: &str = "dwh.toml";

/// Crates whose logs `--verbose` raises to debug
const VERBOSE_FILTER: &str =
    "info,migradw_core=debug,migradw_sql=debug,migradw_warehouse=debug,migradw_engine=debug";

/// migradw - Load the immigration star schema into Redshift
#[derive(Parser)]
#[command(name = "migradw")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: dwh.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print every statement in run order without connecting
    #[arg(long)]
    dry_run: bool,

    /// Write a JSON run report to this path
    #[arg(short, long)]
    report: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // A missing .env file is fine
    dotenvy::dotenv().ok();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli).await {
        eprintln!("{} {}", "error:".red().bold(), render_error(&e));
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(cli: &Cli) -> Result<()> {
    run_with(cli, |params| async move { PostgresWarehouse::connect(&params).await }).await
}

/// Run the loader, opening the warehouse with `connect`
///
/// The catalog is built and checked before `connect` is called.
async fn run_with<C, F, W>(cli: &Cli, connect: C) -> Result<()>
where
    C: FnOnce(ConnectionParams) -> F,
    F: Future<Output = Result<W, WarehouseError>>,
    W: Warehouse,
{
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(path) = &config.source_path {
        tracing::info!(path = %path.display(), "Loaded configuration");
    }
    let applied = config.apply_env_overrides(std::env::vars());
    if applied > 0 {
        tracing::debug!(applied, "Applied environment overrides");
    }

    // Render and check every statement before touching the network
    let catalog = QueryCatalog::from_config(&config).context("Failed to build query catalog")?;
    tracing::debug!(
        dialect = %catalog.dialect(),
        statements = catalog.len(),
        "Query catalog ready"
    );

    if cli.dry_run {
        print_plan(&catalog);
        return Ok(());
    }

    let params = ConnectionParams::from_config(&config)?;
    let mut report = RunReport::new(params.target());

    let mut warehouse = match connect(params).await {
        Ok(warehouse) => warehouse,
        Err(e) => {
            report.status = RunStatus::Unreachable {
                message: e.to_string(),
            };
            report.finish();
            let written = write_report(&report, cli.report.as_deref());
            return finish(Err(e.into()), written);
        }
    };

    let mut driver = EtlDriver::new(catalog);
    let result = driver.run(&mut warehouse, &mut report).await;
    let written = write_report(&report, cli.report.as_deref());
    finish(result.map_err(Into::into), written)?;

    eprintln!(
        "{} {} statements committed",
        "Load complete:".green().bold(),
        report.statements_committed()
    );
    Ok(())
}

/// Combine the run outcome with the report write, keeping the run's error
/// when both fail
fn finish(result: Result<()>, written: Result<()>) -> Result<()> {
    match (result, written) {
        (Err(e), Err(write_err)) => {
            let message = format!("{:#}", write_err);
            tracing::error!(error = %message, "Failed to write run report");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), written) => written,
    }
}

/// Format an error and its causes on one line
///
/// The chain stops at the warehouse error, whose message already carries the
/// driver's text.
fn render_error(err: &anyhow::Error) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        parts.push(cause.to_string());
        if cause.is::<WarehouseError>() {
            break;
        }
    }
    parts.join(": ")
}

/// Load the config file, falling back to an empty config when the default
/// file is absent so environment overrides can supply every value
fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }

    let default = Path::new(DEFAULT_CONFIG);
    if default.exists() {
        Config::from_file(default)
            .with_context(|| format!("Failed to load config from {}", default.display()))
    } else {
        tracing::warn!("No {} found, reading configuration from the environment", DEFAULT_CONFIG);
        Ok(Config::new())
    }
}

fn print_plan(catalog: &QueryCatalog) {
    for phase in Phase::ALL {
        println!("{}", phase.status_line());
        for statement in catalog.statements(phase) {
            let sql = statement.sql.trim_end();
            if sql.ends_with(';') {
                println!("{}\n", sql);
            } else {
                println!("{};\n", sql);
            }
        }
    }
}

fn write_report(report: &RunReport, path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };

    let json = report.to_json().context("Failed to serialize run report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write run report to {}", path.display()))?;
    tracing::info!(path = %path.display(), "Wrote run report");
    Ok(())
}
