//! Inspect command implementation.

use budgetsync_store::{PrimaryDatabase, TableInfo};
use serde::Serialize;
use std::path::Path;

/// Primary-store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Tables with their columns and row counts.
    pub tables: Vec<TableInfo>,
}

/// Lists the primary store's tables.
pub fn run(path: &Path, format: super::OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;

    match format {
        super::OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        super::OutputFormat::Text => {
            println!("Database: {}", result.path);
            for table in &result.tables {
                println!();
                println!("{} ({} rows)", table.name, table.row_count);
                for column in &table.columns {
                    let mut flags = Vec::new();
                    if column.primary_key {
                        flags.push("primary key".to_string());
                    }
                    if column.not_null {
                        flags.push("not null".to_string());
                    }
                    if let Some(default) = &column.default_value {
                        flags.push(format!("default {default}"));
                    }
                    println!(
                        "  {:<24} {:<10} {}",
                        column.name,
                        column.decl_type,
                        flags.join(", ")
                    );
                }
            }
        }
    }

    Ok(())
}

/// Reads table metadata without printing it.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let db = PrimaryDatabase::open_read_only(path)?;
    let tables = db.tables()?;
    db.close()?;
    Ok(InspectResult {
        path: path.display().to_string(),
        tables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use budgetsync_testkit::prelude::*;

    #[test]
    fn lists_tables_with_counts() {
        let primary = TestPrimary::new();
        seed_reference_scenario(&primary);

        let result = inspect(primary.path()).unwrap();
        let expenses = result
            .tables
            .iter()
            .find(|t| t.name == "expenses")
            .unwrap();
        assert_eq!(expenses.row_count, 1);
        assert!(expenses.columns.iter().any(|c| c.name == "date"));

        let json = serde_json::to_value(&result).unwrap();
        assert!(json["tables"].is_array());
    }

    #[test]
    fn missing_file_is_an_error() {
        let (_dir, missing) = missing_database_path();
        assert!(inspect(&missing).is_err());
    }
}
