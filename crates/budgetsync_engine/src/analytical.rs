//! SQLite-backed secondary store.
//!
//! Implements every upsert procedure as a named-parameter
//! `INSERT .. ON CONFLICT(id) DO UPDATE` against the analytical schema, with
//! foreign keys enforced. Used for local deployments and to check ordering
//! and idempotence against real referential integrity.

use budgetsync_protocol::{EntityKind, ParamValue, ProcedureCall, RawRecord};
use budgetsync_store::schema::{analytical_table, apply_analytical_schema};
use budgetsync_store::{raw_record, StoreError, StoreResult};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode, ToSql};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ExecuteError, StoreSide, SyncError, SyncResult};
use crate::executor::{ProcedureExecutor, TargetConnector};

/// A SQLite database standing in for the secondary store.
pub struct SqliteAnalyticalStore {
    conn: Mutex<Option<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteAnalyticalStore {
    /// Opens (creating if needed) the database at `path` and applies the
    /// analytical schema.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(|e| StoreError::Open {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        apply_analytical_schema(&conn)?;
        debug!(path = %path.display(), "Analytical store opened");

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Opens an in-memory analytical store.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_analytical_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path: None,
        })
    }

    /// Path of the database file, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Rows stored for `kind`.
    pub fn row_count(&self, kind: EntityKind) -> StoreResult<u64> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or_else(closed)?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", analytical_table(kind)),
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Fetches the stored row for record `id` of `kind`.
    pub fn fetch(&self, kind: EntityKind, id: i64) -> StoreResult<Option<RawRecord>> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or_else(closed)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} WHERE id = ?1",
            analytical_table(kind)
        ))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query_map([id], |row| raw_record(row, &columns))?;
        let row = rows.next().transpose()?;
        Ok(row)
    }
}

fn closed() -> StoreError {
    StoreError::NotFound("analytical store connection is closed".into())
}

/// Upsert statement for `kind`, keyed on `id`.
fn upsert_sql(kind: EntityKind) -> String {
    let names = kind.parameter_names();
    let placeholders: Vec<String> = names.iter().map(|name| format!(":{name}")).collect();
    let updates: Vec<String> = names
        .iter()
        .filter(|name| **name != "id")
        .map(|name| format!("{name} = excluded.{name}"))
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {}",
        analytical_table(kind),
        names.join(", "),
        placeholders.join(", "),
        updates.join(", ")
    )
}

fn sql_value(value: &ParamValue) -> Value {
    match value {
        ParamValue::Null => Value::Null,
        ParamValue::Integer(v) => Value::Integer(*v),
        other => other.to_wire_text().map_or(Value::Null, Value::Text),
    }
}

fn execute_error(err: rusqlite::Error) -> ExecuteError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            ExecuteError::transient(err.to_string())
        }
        _ => ExecuteError::rejected(err.to_string()),
    }
}

impl ProcedureExecutor for SqliteAnalyticalStore {
    fn execute(&self, call: &ProcedureCall) -> Result<(), ExecuteError> {
        let guard = self.conn.lock();
        let conn = guard
            .as_ref()
            .ok_or_else(|| ExecuteError::transient("analytical store connection is closed"))?;

        let names: Vec<String> = call.params().iter().map(|(name, _)| format!(":{name}")).collect();
        let values: Vec<Value> = call.params().iter().map(|(_, value)| sql_value(value)).collect();
        let bound: Vec<(&str, &dyn ToSql)> = names
            .iter()
            .zip(values.iter())
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect();

        let mut stmt = conn
            .prepare_cached(&upsert_sql(call.entity()))
            .map_err(execute_error)?;
        stmt.execute(bound.as_slice()).map_err(execute_error)?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.conn.lock().is_some()
    }

    fn close(&self) -> SyncResult<()> {
        if let Some(conn) = self.conn.lock().take() {
            conn.close()
                .map_err(|(_, e)| SyncError::connection(StoreSide::Secondary, e.to_string()))?;
            debug!("Analytical store closed");
        }
        Ok(())
    }
}

/// Opens a file-backed analytical store for each run.
#[derive(Debug, Clone)]
pub struct AnalyticalConnector {
    path: PathBuf,
}

impl AnalyticalConnector {
    /// Connector for the database at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TargetConnector for AnalyticalConnector {
    type Executor = SqliteAnalyticalStore;

    fn connect(&self) -> SyncResult<SqliteAnalyticalStore> {
        SqliteAnalyticalStore::open(&self.path)
            .map_err(|e| SyncError::connection(StoreSide::Secondary, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use budgetsync_protocol::{BudgetRecord, EntityRecord, RawValue, UserRecord};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn user(id: i64, name: &str) -> UserRecord {
        UserRecord {
            id,
            username: name.into(),
            email: format!("{name}@example.com"),
            password_hash: "hash".into(),
            created_at: NaiveDate::from_ymd_opt(2024, 1, 2),
        }
    }

    fn budget(id: i64, user_id: i64) -> BudgetRecord {
        BudgetRecord {
            id,
            user_id,
            name: "Groceries".into(),
            category: "food".into(),
            budget_amount: dec!(500.00),
            created_date: None,
        }
    }

    #[test]
    fn upsert_sql_shape() {
        assert_eq!(
            upsert_sql(EntityKind::Expense),
            "INSERT INTO expenses (id, budget_id, amount, description, expense_date) \
             VALUES (:id, :budget_id, :amount, :description, :expense_date) \
             ON CONFLICT(id) DO UPDATE SET budget_id = excluded.budget_id, \
             amount = excluded.amount, description = excluded.description, \
             expense_date = excluded.expense_date"
        );
    }

    #[test]
    fn upsert_is_idempotent() {
        let store = SqliteAnalyticalStore::open_in_memory().unwrap();
        store.execute(&user(7, "ana").to_call()).unwrap();
        store.execute(&user(7, "ana").to_call()).unwrap();
        assert_eq!(store.row_count(EntityKind::User).unwrap(), 1);

        store.execute(&user(7, "anna").to_call()).unwrap();
        let row = store.fetch(EntityKind::User, 7).unwrap().unwrap();
        assert_eq!(row.get("username"), Some(&RawValue::from("anna")));
        assert_eq!(row.get("created_at"), Some(&RawValue::from("2024-01-02")));
    }

    #[test]
    fn money_is_stored_numerically() {
        let store = SqliteAnalyticalStore::open_in_memory().unwrap();
        store.execute(&user(7, "ana").to_call()).unwrap();
        store.execute(&budget(3, 7).to_call()).unwrap();
        let row = store.fetch(EntityKind::Budget, 3).unwrap().unwrap();
        assert_eq!(row.get("budget_amount"), Some(&RawValue::Integer(500)));
        assert_eq!(row.get("user_id"), Some(&RawValue::Integer(7)));
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let store = SqliteAnalyticalStore::open_in_memory().unwrap();
        let err = store.execute(&budget(3, 99).to_call()).unwrap_err();
        assert!(!err.retryable);
        assert!(err.message.contains("FOREIGN KEY"));
    }

    #[test]
    fn prefix_does_not_change_the_table() {
        let store = SqliteAnalyticalStore::open_in_memory().unwrap();
        store
            .execute(&user(1, "ana").to_call().with_prefix("sp_"))
            .unwrap();
        assert_eq!(store.row_count(EntityKind::User).unwrap(), 1);
    }

    #[test]
    fn closed_store_reports_disconnected() {
        let store = SqliteAnalyticalStore::open_in_memory().unwrap();
        assert!(store.is_connected());
        store.close().unwrap();
        store.close().unwrap();
        assert!(!store.is_connected());
        assert!(store.execute(&user(1, "ana").to_call()).unwrap_err().retryable);
    }

    #[test]
    fn connector_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let connector = AnalyticalConnector::new(dir.path().join("nested/analytics.db"));

        let first = connector.connect().unwrap();
        first.execute(&user(1, "ana").to_call()).unwrap();
        first.close().unwrap();

        let second = connector.connect().unwrap();
        assert_eq!(second.row_count(EntityKind::User).unwrap(), 1);
    }
}
