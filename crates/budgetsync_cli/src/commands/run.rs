//! Run command implementation.

use budgetsync_engine::{
    RetryConfig, RunOutcome, SqliteSourceConnector, SyncConfig, SyncEngine, SyncReport,
    TargetConnector,
};
use budgetsync_protocol::EntityKind;
use budgetsync_store::PrimaryDatabase;
use chrono::Utc;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{info, warn};

use super::{OutputFormat, Target};

/// Options for one sync pass.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Upsert calls in flight per entity type.
    pub workers: usize,
    /// Rows read per page.
    pub batch_size: usize,
    /// Attempts per call.
    pub retries: u32,
    /// Procedure name prefix.
    pub procedure_prefix: String,
    /// Entity filter; empty means every kind.
    pub only: Vec<EntityKind>,
    /// Explicit entity order; empty means dependency order.
    pub order: Vec<EntityKind>,
    /// Write `sync_status` after a completed run.
    pub record_status: bool,
    /// Report format.
    pub format: OutputFormat,
}

impl RunOptions {
    /// Engine configuration for these options.
    pub fn config(&self) -> SyncConfig {
        let mut config = SyncConfig::new()
            .with_read_batch_size(self.batch_size)
            .with_max_workers(self.workers)
            .with_retry(RetryConfig::new(self.retries))
            .with_procedure_prefix(self.procedure_prefix.clone());
        if !self.only.is_empty() {
            config = config.with_entities(self.only.clone());
        }
        if !self.order.is_empty() {
            config = config.with_order(self.order.clone());
        }
        config
    }
}

/// Runs one sync pass from `primary` into `target`, prints the report and
/// returns the process exit status.
pub fn run(
    primary: &Path,
    target: &Target,
    options: &RunOptions,
) -> Result<u8, Box<dyn std::error::Error>> {
    info!(primary = %primary.display(), target = %target.describe(), "Starting sync");

    let config = options.config();
    let source = SqliteSourceConnector::new(primary);
    let report = match target {
        Target::Http {
            url,
            api_key,
            timeout,
        } => execute(config, source, Target::http_connector(url, api_key.clone(), *timeout)?),
        Target::Sqlite(path) => execute(config, source, Target::sqlite_connector(path)),
    };

    if options.record_status && report.outcome == RunOutcome::Completed {
        // A failed status write does not change the run's outcome.
        if let Err(e) = record_status(primary) {
            warn!(error = %e, "Could not record sync status");
        }
    }

    match options.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", render_text(&report)),
    }

    Ok(exit_status(&report))
}

fn execute<T: TargetConnector>(
    config: SyncConfig,
    source: SqliteSourceConnector,
    target: T,
) -> SyncReport {
    SyncEngine::new(config, source, target).run()
}

fn record_status(primary: &Path) -> budgetsync_store::StoreResult<()> {
    let db = PrimaryDatabase::open(primary)?;
    db.record_sync_status(Utc::now())?;
    db.close()
}

/// Process exit status: 0 clean, 2 completed with record failures,
/// 1 aborted.
pub fn exit_status(report: &SyncReport) -> u8 {
    if report.is_aborted() {
        1
    } else if report.is_degraded() {
        2
    } else {
        0
    }
}

/// Human-readable report.
pub fn render_text(report: &SyncReport) -> String {
    let mut out = String::new();
    let status = match &report.outcome {
        RunOutcome::Completed if report.failures.is_empty() => "completed".to_string(),
        RunOutcome::Completed => "completed with failures".to_string(),
        RunOutcome::Aborted { cause } => format!("aborted: {cause}"),
    };
    let _ = writeln!(out, "Sync {status}");
    let _ = writeln!(
        out,
        "Started {} ({} ms, {} calls)",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.duration_ms,
        report.dispatched
    );
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:<22} {:>9} {:>9} {:>9}",
        "entity", "attempted", "succeeded", "failed"
    );
    for entity in &report.entities {
        let _ = writeln!(
            out,
            "{:<22} {:>9} {:>9} {:>9}",
            entity.entity.table(),
            entity.attempted,
            entity.succeeded,
            entity.failed
        );
    }
    let (attempted, succeeded, failed) = report.totals();
    let _ = writeln!(
        out,
        "{:<22} {:>9} {:>9} {:>9}",
        "total", attempted, succeeded, failed
    );

    if !report.failures.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Failures:");
        for failure in &report.failures {
            let _ = writeln!(out, "  {failure}");
        }
    }
    out
}
