//! Check command implementation.

use budgetsync_engine::{ProcedureExecutor, TargetConnector};
use budgetsync_protocol::EntityKind;
use budgetsync_store::PrimaryDatabase;
use serde::Serialize;
use std::path::Path;

use super::{OutputFormat, Target};

/// Result of probing both stores.
#[derive(Debug, Serialize)]
pub struct CheckResult {
    /// Primary database path.
    pub primary: String,
    /// Whether the primary store could be opened.
    pub primary_reachable: bool,
    /// Entity tables missing from the primary store.
    pub missing_tables: Vec<String>,
    /// Last recorded completion time, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<String>,
    /// Secondary store description.
    pub target: String,
    /// Whether the secondary store accepted a connection.
    pub target_reachable: bool,
    /// Problems found, one per line.
    pub problems: Vec<String>,
}

impl CheckResult {
    /// True when both stores are usable.
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Probes the primary file and the secondary store. Returns 0 when both
/// are usable and 1 otherwise.
pub fn run(
    primary: &Path,
    target: &Target,
    format: OutputFormat,
) -> Result<u8, Box<dyn std::error::Error>> {
    let result = probe(primary, target)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => {
            println!("Primary store:   {}", result.primary);
            println!("  reachable:     {}", result.primary_reachable);
            if let Some(last) = &result.last_sync {
                println!("  last sync:     {last}");
            }
            println!("Secondary store: {}", result.target);
            println!("  reachable:     {}", result.target_reachable);
            if result.is_ok() {
                println!("OK");
            } else {
                for problem in &result.problems {
                    println!("  ! {problem}");
                }
            }
        }
    }

    Ok(if result.is_ok() { 0 } else { 1 })
}

/// Gathers the check result without printing it.
pub fn probe(primary: &Path, target: &Target) -> Result<CheckResult, Box<dyn std::error::Error>> {
    let mut result = CheckResult {
        primary: primary.display().to_string(),
        primary_reachable: false,
        missing_tables: Vec::new(),
        last_sync: None,
        target: target.describe(),
        target_reachable: false,
        problems: Vec::new(),
    };

    match PrimaryDatabase::open_read_only(primary) {
        Ok(db) => {
            result.primary_reachable = true;
            for kind in EntityKind::ALL {
                if !db.has_table(kind.table())? {
                    result.missing_tables.push(kind.table().to_string());
                    result.problems.push(format!("primary table {} is missing", kind.table()));
                }
            }
            result.last_sync = db.last_sync()?;
            db.close()?;
        }
        Err(e) => result.problems.push(format!("primary store: {e}")),
    }

    let connected = match target {
        Target::Http {
            url,
            api_key,
            timeout,
        } => connect(&Target::http_connector(url, api_key.clone(), *timeout)?),
        Target::Sqlite(path) => connect(&Target::sqlite_connector(path)),
    };
    match connected {
        Ok(()) => result.target_reachable = true,
        Err(e) => result.problems.push(format!("secondary store: {e}")),
    }

    Ok(result)
}

fn connect<T: TargetConnector>(connector: &T) -> budgetsync_engine::SyncResult<()> {
    let executor = connector.connect()?;
    executor.close()
}
