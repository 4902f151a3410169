//! Init command implementation.

use budgetsync_engine::SqliteAnalyticalStore;
use budgetsync_store::PrimaryDatabase;
use std::path::Path;
use tracing::info;

/// Creates the primary schema at `primary`, and an analytical store at
/// `target_schema` when given. Existing tables are left untouched.
pub fn run(primary: &Path, target_schema: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let db = PrimaryDatabase::create(primary)?;
    db.close()?;
    info!(path = %primary.display(), "Primary schema ready");
    println!("Primary store ready: {}", primary.display());

    if let Some(path) = target_schema {
        let store = SqliteAnalyticalStore::open(path)?;
        drop(store);
        info!(path = %path.display(), "Analytical schema ready");
        println!("Analytical store ready: {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use budgetsync_protocol::EntityKind;

    #[test]
    fn creates_both_stores() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("primary.db");
        let target = dir.path().join("nested").join("analytics.db");

        run(&primary, Some(&target)).unwrap();
        run(&primary, Some(&target)).unwrap();

        let db = PrimaryDatabase::open_read_only(&primary).unwrap();
        for kind in EntityKind::ALL {
            assert!(db.has_table(kind.table()).unwrap(), "{kind}");
        }
        let store = SqliteAnalyticalStore::open(&target).unwrap();
        assert_eq!(store.row_count(EntityKind::User).unwrap(), 0);
    }
}
