//! budgetsync CLI
//!
//! Replicates the finance tracker's primary SQLite store into the
//! analytical store.
//!
//! # Commands
//!
//! - `init` - Create the primary schema (and optionally a local analytical store)
//! - `run` - Perform one full sync pass
//! - `check` - Test connectivity and table structure of both stores
//! - `inspect` - List primary tables with columns and row counts

mod commands;

use budgetsync_protocol::EntityKind;
use clap::{Parser, Subcommand};
use commands::{CliError, OutputFormat, Target};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Primary-to-analytical store synchronization.
#[derive(Parser)]
#[command(name = "budgetsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the primary SQLite database
    #[arg(global = true, short, long, env = "BUDGETSYNC_PRIMARY")]
    primary: Option<PathBuf>,

    /// Secondary store: an http(s) RPC gateway URL or a SQLite file path
    #[arg(global = true, short, long, env = "BUDGETSYNC_TARGET")]
    target: Option<String>,

    /// API key sent to an HTTP secondary store
    #[arg(global = true, long, env = "BUDGETSYNC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(global = true, long, default_value_t = 30)]
    timeout: u64,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the primary schema
    Init {
        /// Also create a SQLite analytical store at this path
        #[arg(long)]
        target_schema: Option<PathBuf>,
    },

    /// Perform one full sync pass
    Run {
        /// Upsert calls in flight per entity type
        #[arg(short, long, default_value_t = 1)]
        workers: usize,

        /// Rows read from the primary store per page
        #[arg(short, long, default_value_t = 500)]
        batch_size: usize,

        /// Attempts per call for transient failures
        #[arg(short, long, default_value_t = 3)]
        retries: u32,

        /// Prefix for procedure names (e.g. sp_)
        #[arg(long, default_value = "")]
        procedure_prefix: String,

        /// Sync only these entity types (and what they depend on)
        #[arg(long, value_delimiter = ',', conflicts_with = "order")]
        only: Vec<EntityKind>,

        /// Sync exactly these entity types in this order
        #[arg(long, value_delimiter = ',')]
        order: Vec<EntityKind>,

        /// Record the completion time in the primary store's sync_status table
        #[arg(long)]
        record_status: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Check connectivity and table structure of both stores
    Check {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List primary tables with their columns and row counts
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show version information
    Version,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let timeout = Duration::from_secs(cli.timeout);
    let target = || -> Result<Target, CliError> {
        let spec = cli.target.as_deref().ok_or(CliError::MissingArgument("--target"))?;
        Ok(Target::parse(spec, cli.api_key.clone(), timeout))
    };
    let primary = || cli.primary.clone().ok_or(CliError::MissingArgument("--primary"));

    let code = match &cli.command {
        Commands::Init { target_schema } => {
            commands::init::run(&primary()?, target_schema.as_deref())?;
            ExitCode::SUCCESS
        }
        Commands::Run {
            workers,
            batch_size,
            retries,
            procedure_prefix,
            only,
            order,
            record_status,
            format,
        } => {
            let options = commands::run::RunOptions {
                workers: *workers,
                batch_size: *batch_size,
                retries: *retries,
                procedure_prefix: procedure_prefix.clone(),
                only: only.clone(),
                order: order.clone(),
                record_status: *record_status,
                format: *format,
            };
            ExitCode::from(commands::run::run(&primary()?, &target()?, &options)?)
        }
        Commands::Check { format } => {
            ExitCode::from(commands::check::run(&primary()?, &target()?, *format)?)
        }
        Commands::Inspect { format } => {
            commands::inspect::run(&primary()?, *format)?;
            ExitCode::SUCCESS
        }
        Commands::Version => {
            println!("budgetsync v{}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
    };

    Ok(code)
}
