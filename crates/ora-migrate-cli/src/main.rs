//! ora-migrate CLI - batched Oracle to Oracle table copy.

use clap::{Parser, Subcommand, ValueEnum};
use ora_migrate::api::{self, AppState};
use ora_migrate::{
    BatchCopier, Config, ConnectionTester, Coordinator, Endpoints, MappingConfig, MappingStore,
    MigrateError, OutcomeStatus, RunReport,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Exit code when a run finished but at least one mapping failed.
const EXIT_MAPPING_FAILED: u8 = 4;

/// Exit code when a run was interrupted by a signal.
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(name = "ora-migrate")]
#[command(about = "Batched table copy between Oracle databases")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP control surface
    Serve {
        /// Override server.bind from the configuration
        #[arg(long)]
        bind: Option<String>,

        /// Mapping document to load at startup (JSON)
        #[arg(long)]
        mappings: Option<PathBuf>,
    },

    /// Run the configured mappings once and exit
    Run {
        /// Which mappings to run
        #[arg(value_enum)]
        scope: RunScope,

        /// Mapping document to use instead of migration.mapping_file (JSON)
        #[arg(long)]
        mappings: Option<PathBuf>,
    },

    /// Test database connections
    HealthCheck,
}

#[derive(Clone, Copy, ValueEnum)]
enum RunScope {
    /// Every table mapping
    Tables,
    /// Every partition mapping
    Partitions,
    /// Table mappings, then partition mappings
    All,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Serve { bind, mappings } => {
            let addr = match bind {
                Some(bind) => bind.parse::<SocketAddr>().map_err(|e| {
                    MigrateError::Config(format!("--bind '{}' is invalid: {}", bind, e))
                })?,
                None => config.bind_addr()?,
            };
            let mappings = load_mappings(&config, mappings)?;
            let cancel_token = setup_signal_handler();
            let state = build_state(&config, mappings, cancel_token.clone())?;

            api::serve(addr, state, cancel_token).await?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Run { scope, mappings } => {
            let mappings = load_mappings(&config, mappings)?;
            if mappings.is_empty() {
                warn!("No mappings configured; nothing to do");
            }
            let cancel_token = setup_signal_handler();
            let state = build_state(&config, mappings, cancel_token)?;

            let report = match scope {
                RunScope::Tables => state.coordinator.migrate_all_tables().await,
                RunScope::Partitions => state.coordinator.migrate_all_partitions().await,
                RunScope::All => state.coordinator.migrate_all().await,
            };

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                print_report(&report);
            }

            Ok(exit_code_for(&report))
        }

        Commands::HealthCheck => {
            let endpoints = Endpoints::from_config(&config)?;
            let tester = ConnectionTester::new(endpoints.source, endpoints.target);
            let result = tester.test_all().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source ({}): {}",
                    config.source.connect_string,
                    if result.source_connection { "OK" } else { "FAILED" }
                );
                println!(
                    "  Target ({}): {}",
                    config.target.connect_string,
                    if result.target_connection { "OK" } else { "FAILED" }
                );
                println!(
                    "\n  Overall: {}",
                    if result.all_ok() { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.all_ok() {
                return Err(MigrateError::connectivity(
                    "Health check failed",
                    "run with --verbosity debug for probe errors",
                ));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_mappings(config: &Config, path: Option<PathBuf>) -> Result<MappingConfig, MigrateError> {
    match path {
        Some(path) => MappingConfig::load(path),
        None => config.load_mappings(),
    }
}

/// Wire the engine: two database handles, one mapping store.
fn build_state(
    config: &Config,
    mappings: MappingConfig,
    cancel_token: CancellationToken,
) -> Result<AppState, MigrateError> {
    let endpoints = Endpoints::from_config(config)?;
    let copier = BatchCopier::new(
        endpoints.source.clone(),
        endpoints.target.clone(),
        config.migration.default_batch_size,
    )
    .with_cancellation(cancel_token);
    let coordinator = Coordinator::new(copier, MappingStore::new(mappings));
    let tester = ConnectionTester::new(endpoints.source, endpoints.target);
    Ok(AppState::new(coordinator, tester))
}

fn print_report(report: &RunReport) {
    println!("\nRun {} finished", report.run_id);
    for outcome in &report.outcomes {
        match outcome.status {
            OutcomeStatus::Success => println!(
                "  OK        {} -> {}: {} rows, {} batches ({:.2}s)",
                outcome.source_table,
                outcome.target_table,
                outcome.rows,
                outcome.batches,
                outcome.duration_seconds
            ),
            OutcomeStatus::Failed | OutcomeStatus::Cancelled => println!(
                "  {:<9} {} -> {}: {}",
                if outcome.status == OutcomeStatus::Failed { "FAILED" } else { "CANCELLED" },
                outcome.source_table,
                outcome.target_table,
                outcome.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
    println!(
        "  Mappings: {}/{} succeeded",
        report.outcomes.len() - report.failed(),
        report.outcomes.len()
    );
    println!("  Rows: {}", report.rows_copied());
}

fn exit_code_for(report: &RunReport) -> ExitCode {
    if report.all_succeeded() {
        ExitCode::SUCCESS
    } else if report
        .outcomes
        .iter()
        .any(|o| o.status == OutcomeStatus::Cancelled)
    {
        ExitCode::from(EXIT_CANCELLED)
    } else {
        ExitCode::from(EXIT_MAPPING_FAILED)
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json leaves stdout parseable.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Stopping at the next batch boundary...", name);
                    token.cancel();
                });
            }
            Err(e) => warn!("Failed to install {} handler: {}", name, e),
        }
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping at the next batch boundary...");
            token.cancel();
        }
    });

    cancel_token
}
