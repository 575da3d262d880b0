//! rowtally CLI: count rows in every table of the selected schemas.

mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use rowtally_core::config::{Config, ConnectionMode};
use rowtally_core::filter::{catalog_query, OwnerFilter};
use rowtally_core::manifest::RunSummary;
use rowtally_db::PgConnectionProvider;
use rowtally_exec::{RunOptions, Runner};
use rowtally_io::{ReportLayout, ReportWriter};

use crate::logging::EventLog;

#[derive(Parser)]
#[command(name = "rowtally")]
#[command(about = "Concurrent per-table row counts written to a CSV report", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enumerate tables and count their rows
    Run(RunArgs),

    /// Parse and validate the configuration file
    Validate {
        /// Path to the YAML config (defaults to conf/config.yaml next to the binary)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the catalog query a run would issue
    Explain {
        /// Path to the YAML config (defaults to conf/config.yaml next to the binary)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Restrict to a single schema instead of the exclusion list
        #[arg(long)]
        owner: Option<String>,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Path to the YAML config (defaults to conf/config.yaml next to the binary)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Restrict to a single schema instead of the exclusion list
    #[arg(long)]
    owner: Option<String>,

    /// Timeout in seconds for the catalog query and each count (0 = none)
    #[arg(long)]
    timeout: Option<u64>,

    /// Worker count (overrides config)
    #[arg(long)]
    workers: Option<usize>,

    /// Report path (overrides config)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Give every worker its own connection instead of a shared pool
    #[arg(long)]
    per_worker_connections: bool,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => std::process::exit(run(args)),
        Commands::Validate { config } => {
            if let Err(e) = load_config(config.as_deref()).and_then(|c| c.validate().map_err(Into::into)) {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
            println!("✓ Configuration is valid");
        }
        Commands::Explain { config, owner } => {
            if let Err(e) = explain(config.as_deref(), owner) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

/// Returns the process exit code. The event log is closed on every path
/// that opened it.
fn run(args: RunArgs) -> i32 {
    let config = match load_config(args.config.as_deref()) {
        Ok(mut config) => {
            apply_run_args(&mut config, &args);
            match config.validate() {
                Ok(()) => config,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return 1;
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let log = match EventLog::init(&config.logger.log_file_name) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("Error: cannot open event log {}: {}", config.logger.log_file_name.display(), e);
            return 1;
        }
    };

    let code = match execute(&config, &args) {
        Ok(summary) => {
            println!("✓ Row counts written to {}", config.software.output_file.display());
            println!("  Tables: {} counted, {} failed", summary.counted, summary.count_failed);
            println!("  Duration: {}ms", summary.elapsed().as_millis());
            0
        }
        Err(e) => {
            error!(error = %e, "Run aborted");
            1
        }
    };
    log.close();
    code
}

fn execute(config: &Config, args: &RunArgs) -> Result<RunSummary, Box<dyn std::error::Error>> {
    let timeout = args.timeout.map(Duration::from_secs);
    let layout = ReportLayout::from_owner_column(config.software.include_owner_column);
    let report = ReportWriter::create(&config.software.output_file, layout)?;
    info!(output = %config.software.output_file.display(), "Report file created");

    let options = RunOptions::new(owner_filter(config, args.owner.as_deref()), config.software.worker_threads)
        .with_mode(config.database.connection_mode)
        .with_max_open_connections(config.database.max_open_connections)
        .with_timeout(timeout);
    let provider = Arc::new(PgConnectionProvider::new(&config.database, options.timeout));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let summary = runtime.block_on(Runner::new(options).run(provider, report))?;
    Ok(summary)
}

fn explain(config: Option<&Path>, owner: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config)?;
    let filter = owner_filter(&config, owner.as_deref());

    println!("=== Target ===");
    println!(
        "postgres://{}@{}:{}/{}",
        config.database.database_user,
        config.database.host_name,
        config.database.port,
        config.database.service_name
    );
    println!("mode: {}", config.database.connection_mode);
    println!("workers: {}", config.software.worker_threads);
    println!();
    println!("=== Catalog query ===");
    println!("{}", catalog_query(&filter));
    Ok(())
}

/// File values with environment overrides applied on top.
fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };
    let mut config = Config::load(&path)?;
    config.apply_env();
    Ok(config)
}

fn default_config_path() -> std::io::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join("conf").join("config.yaml"))
}

/// CLI flags win over both the environment and the file.
fn apply_run_args(config: &mut Config, args: &RunArgs) {
    if let Some(workers) = args.workers {
        config.software.worker_threads = workers;
    }
    if let Some(output) = &args.output {
        config.software.output_file = output.clone();
    }
    if args.per_worker_connections {
        config.database.connection_mode = ConnectionMode::PerWorker;
    }
}

fn owner_filter(config: &Config, owner: Option<&str>) -> OwnerFilter {
    match owner.map(str::trim).filter(|o| !o.is_empty()) {
        Some(owner) => OwnerFilter::Include(owner.to_string()),
        None => OwnerFilter::exclude_from_list(&config.database.exclude_owner),
    }
}
