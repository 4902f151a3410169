//! Primary-store connection and queries.

use budgetsync_protocol::{EntityKind, RawRecord, RawValue};
use chrono::{DateTime, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::models::{
    NewBudget, NewExpense, NewSavingsGoal, NewSavingsTransaction, NewUser, NewUserPreferences,
};
use crate::schema;

/// Column metadata from `PRAGMA table_info`.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub decl_type: String,
    /// NOT NULL constraint.
    pub not_null: bool,
    /// Part of the primary key.
    pub primary_key: bool,
    /// Default expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

/// A table with its columns and row count.
#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Columns in table order.
    pub columns: Vec<ColumnInfo>,
    /// Number of rows.
    pub row_count: u64,
}

/// Connection to the primary (transactional) store.
pub struct PrimaryDatabase {
    conn: Connection,
    path: Option<PathBuf>,
}

impl PrimaryDatabase {
    /// Opens or creates a database at `path` and applies the schema.
    pub fn create(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(|e| open_error(path, e))?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        schema::apply_primary_schema(&conn)?;
        info!(path = %path.display(), "Primary store ready");

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Opens an existing database without write access.
    ///
    /// Fails if the file does not exist; nothing is created.
    pub fn open_read_only(path: &Path) -> StoreResult<Self> {
        if !path.is_file() {
            return Err(StoreError::Open {
                path: path.display().to_string(),
                message: "database file does not exist".into(),
            });
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| open_error(path, e))?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        debug!(path = %path.display(), "Primary store opened read-only");

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Opens an existing database for writing without touching its schema.
    ///
    /// Fails if the file does not exist; nothing is created.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if !path.is_file() {
            return Err(StoreError::Open {
                path: path.display().to_string(),
                message: "database file does not exist".into(),
            });
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| open_error(path, e))?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        debug!(path = %path.display(), "Primary store opened");

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Opens an in-memory database with the schema applied.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::apply_primary_schema(&conn)?;
        Ok(Self { conn, path: None })
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Path of the database file, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Closes the connection, surfacing any close error.
    pub fn close(self) -> StoreResult<()> {
        self.conn.close().map_err(|(_, e)| StoreError::from(e))
    }

    // ==========================================
    // Inserts
    // ==========================================

    /// Inserts a user and returns its id.
    pub fn insert_user(&self, user: &NewUser) -> StoreResult<i64> {
        self.conn.execute(
            "INSERT INTO users (username, email, password, created_at)
             VALUES (?1, ?2, ?3, COALESCE(?4, CURRENT_TIMESTAMP))",
            params![user.username, user.email, user.password, user.created_at],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Inserts a budget and returns its id.
    pub fn insert_budget(&self, budget: &NewBudget) -> StoreResult<i64> {
        self.conn.execute(
            "INSERT INTO budgets (user_id, name, category, budget_amount, created_date)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                budget.user_id,
                budget.name,
                budget.category,
                budget.budget_amount,
                budget.created_date,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Inserts an expense and returns its id.
    pub fn insert_expense(&self, expense: &NewExpense) -> StoreResult<i64> {
        self.conn.execute(
            "INSERT INTO expenses (budget_id, amount, description, date)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                expense.budget_id,
                expense.amount,
                expense.description,
                expense.date,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Inserts a savings goal and returns its id.
    pub fn insert_savings_goal(&self, goal: &NewSavingsGoal) -> StoreResult<i64> {
        self.conn.execute(
            "INSERT INTO savings_goals
                (user_id, name, target_amount, current_amount, deadline, category, description, created_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                goal.user_id,
                goal.name,
                goal.target_amount,
                goal.current_amount,
                goal.deadline,
                goal.category,
                goal.description,
                goal.created_date,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Inserts a savings transaction and returns its id.
    pub fn insert_savings_transaction(&self, txn: &NewSavingsTransaction) -> StoreResult<i64> {
        self.conn.execute(
            "INSERT INTO savings_transactions (goal_id, amount, transaction_type, description, date)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                txn.goal_id,
                txn.amount,
                txn.transaction_type,
                txn.description,
                txn.date,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Inserts a preferences row and returns its id.
    pub fn insert_user_preferences(&self, prefs: &NewUserPreferences) -> StoreResult<i64> {
        self.conn.execute(
            "INSERT INTO user_preferences
                (user_id, currency, date_format, notifications_enabled, budget_alerts,
                 savings_reminders, theme, language)
             VALUES (?1, COALESCE(?2, 'USD'), COALESCE(?3, 'Y-m-d'), COALESCE(?4, 1),
                     COALESCE(?5, 1), COALESCE(?6, 1), COALESCE(?7, 'light'), COALESCE(?8, 'en'))",
            params![
                prefs.user_id,
                prefs.currency,
                prefs.date_format,
                prefs.notifications_enabled,
                prefs.budget_alerts,
                prefs.savings_reminders,
                prefs.theme,
                prefs.language,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    // ==========================================
    // Entity reads
    // ==========================================

    /// Returns true if `table` exists.
    pub fn has_table(&self, table: &str) -> StoreResult<bool> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Number of rows in `kind`'s table.
    pub fn count_rows(&self, kind: EntityKind) -> StoreResult<u64> {
        self.require_table(kind.table())?;
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_identifier(kind.table())),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Reads up to `limit` rows of `kind` with `id` greater than `after_id`,
    /// ordered by id.
    ///
    /// Paging by id keeps each page an unfiltered `SELECT *` over the rest of
    /// the table; passing `None` starts from the beginning.
    pub fn read_page(
        &self,
        kind: EntityKind,
        after_id: Option<i64>,
        limit: usize,
    ) -> StoreResult<Vec<RawRecord>> {
        self.require_table(kind.table())?;

        let sql = format!(
            "SELECT * FROM {} WHERE (?1 IS NULL OR id > ?1) ORDER BY id LIMIT ?2",
            quote_identifier(kind.table())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = stmt
            .query_map(params![after_id, limit], |row| {
                raw_record(row, &columns)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        debug!(table = kind.table(), after_id, rows = rows.len(), "Read page");
        Ok(rows)
    }

    /// Lists user tables with their columns and row counts.
    pub fn tables(&self) -> StoreResult<Vec<TableInfo>> {
        let names: Vec<String> = {
            let mut stmt = self.conn.prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            names
        };

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let columns = {
                let mut stmt = self
                    .conn
                    .prepare(&format!("PRAGMA table_info({})", quote_identifier(&name)))?;
                let columns = stmt
                    .query_map([], |row| {
                        Ok(ColumnInfo {
                            name: row.get(1)?,
                            decl_type: row.get(2)?,
                            not_null: row.get::<_, i64>(3)? != 0,
                            default_value: row.get(4)?,
                            primary_key: row.get::<_, i64>(5)? != 0,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                columns
            };
            let row_count: i64 = self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", quote_identifier(&name)),
                [],
                |row| row.get(0),
            )?;
            tables.push(TableInfo {
                name,
                columns,
                row_count: row_count.max(0) as u64,
            });
        }
        Ok(tables)
    }

    // ==========================================
    // Sync status
    // ==========================================

    /// Records the completion time of a sync run.
    ///
    /// Creates the `sync_status` table if it is missing; no other table is
    /// touched.
    pub fn record_sync_status(&self, at: DateTime<Utc>) -> StoreResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sync_status (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                last_sync DATETIME
            );",
        )?;
        self.conn.execute(
            "INSERT INTO sync_status (last_sync) VALUES (?1)",
            params![at.format("%Y-%m-%d %H:%M:%S").to_string()],
        )?;
        Ok(())
    }

    /// Most recently recorded sync time.
    pub fn last_sync(&self) -> StoreResult<Option<String>> {
        if !self.has_table("sync_status")? {
            return Ok(None);
        }
        let last = self
            .conn
            .query_row(
                "SELECT last_sync FROM sync_status ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(last.flatten())
    }

    fn require_table(&self, table: &str) -> StoreResult<()> {
        if self.has_table(table)? {
            Ok(())
        } else {
            Err(StoreError::MissingTable(table.to_string()))
        }
    }
}

fn open_error(path: &Path, err: rusqlite::Error) -> StoreError {
    StoreError::Open {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Converts a result row into a [`RawRecord`] using `columns` as names.
pub fn raw_record(row: &rusqlite::Row<'_>, columns: &[String]) -> rusqlite::Result<RawRecord> {
    let mut record = RawRecord::new();
    for (i, name) in columns.iter().enumerate() {
        let value = match row.get_ref(i)? {
            ValueRef::Null => RawValue::Null,
            ValueRef::Integer(v) => RawValue::Integer(v),
            ValueRef::Real(v) => RawValue::Real(v),
            ValueRef::Text(t) => RawValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => RawValue::Blob(b.to_vec()),
        };
        record.push(name.clone(), value);
    }
    Ok(record)
}
