//! SQL schemas.
//!
//! [`PRIMARY_SCHEMA`] is the transactional store the application writes.
//! [`ANALYTICAL_SCHEMA`] mirrors the secondary store's tables for local
//! deployments and tests: one table per upsert procedure, columns named
//! after the procedure's parameters, foreign keys enforced.

use budgetsync_protocol::EntityKind;
use rusqlite::Connection;
use tracing::debug;

use crate::error::StoreResult;

/// Primary-store tables.
pub const PRIMARY_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    email TEXT UNIQUE NOT NULL,
    password TEXT NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS budgets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    category TEXT NOT NULL,
    budget_amount REAL NOT NULL,
    created_date TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS expenses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    budget_id INTEGER NOT NULL,
    amount REAL NOT NULL,
    description TEXT,
    date TEXT NOT NULL,
    FOREIGN KEY (budget_id) REFERENCES budgets(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS savings_goals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    target_amount REAL NOT NULL,
    current_amount REAL DEFAULT 0,
    deadline TEXT,
    category TEXT NOT NULL,
    description TEXT,
    created_date TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS savings_transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    goal_id INTEGER NOT NULL,
    amount REAL NOT NULL,
    transaction_type TEXT NOT NULL,
    description TEXT,
    date TEXT NOT NULL,
    FOREIGN KEY (goal_id) REFERENCES savings_goals(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS user_preferences (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL UNIQUE,
    currency TEXT DEFAULT 'USD',
    date_format TEXT DEFAULT 'Y-m-d',
    notifications_enabled INTEGER DEFAULT 1,
    budget_alerts INTEGER DEFAULT 1,
    savings_reminders INTEGER DEFAULT 1,
    theme TEXT DEFAULT 'light',
    language TEXT DEFAULT 'en',
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS sync_status (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    last_sync DATETIME
);
";

/// Secondary-store tables, keyed by the primary-store id.
///
/// Ids are plain `INTEGER PRIMARY KEY` without AUTOINCREMENT: rows only
/// ever arrive with the id the primary store assigned.
pub const ANALYTICAL_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL,
    email TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    created_at TEXT
);

CREATE TABLE IF NOT EXISTS budgets (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    category TEXT NOT NULL,
    budget_amount NUMERIC NOT NULL,
    created_date TEXT,
    user_id INTEGER NOT NULL REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS expenses (
    id INTEGER PRIMARY KEY,
    budget_id INTEGER NOT NULL REFERENCES budgets(id),
    amount NUMERIC NOT NULL,
    description TEXT,
    expense_date TEXT
);

CREATE TABLE IF NOT EXISTS savings_goals (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id),
    name TEXT NOT NULL,
    target_amount NUMERIC NOT NULL,
    current_amount NUMERIC,
    deadline TEXT,
    category TEXT NOT NULL,
    description TEXT,
    created_date TEXT
);

CREATE TABLE IF NOT EXISTS savings_transactions (
    id INTEGER PRIMARY KEY,
    goal_id INTEGER NOT NULL REFERENCES savings_goals(id),
    amount NUMERIC NOT NULL,
    transaction_type TEXT NOT NULL CHECK (transaction_type IN ('deposit', 'withdrawal')),
    description TEXT,
    transaction_date TEXT
);

CREATE TABLE IF NOT EXISTS user_preferences (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL UNIQUE REFERENCES users(id),
    currency TEXT,
    date_format TEXT,
    notifications_enabled INTEGER,
    budget_alerts INTEGER,
    savings_reminders INTEGER,
    theme TEXT,
    language TEXT
);
";

/// Creates the primary-store tables if they do not exist.
pub fn apply_primary_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(PRIMARY_SCHEMA)?;
    debug!("Primary schema applied");
    Ok(())
}

/// Creates the analytical tables if they do not exist.
pub fn apply_analytical_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(ANALYTICAL_SCHEMA)?;
    debug!("Analytical schema applied");
    Ok(())
}

/// Analytical table receiving rows from `kind`'s procedure.
///
/// Tables share the primary-store names.
pub fn analytical_table(kind: EntityKind) -> &'static str {
    kind.table()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info('{table}')"))
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn primary_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_primary_schema(&conn).unwrap();
        apply_primary_schema(&conn).unwrap();
        for kind in EntityKind::ALL {
            assert!(!columns(&conn, kind.table()).is_empty(), "{kind}");
        }
    }

    #[test]
    fn analytical_columns_match_procedure_parameters() {
        let conn = Connection::open_in_memory().unwrap();
        apply_analytical_schema(&conn).unwrap();
        for kind in EntityKind::ALL {
            let mut cols = columns(&conn, analytical_table(kind));
            let mut params: Vec<String> =
                kind.parameter_names().iter().map(|p| p.to_string()).collect();
            cols.sort();
            params.sort();
            assert_eq!(cols, params, "{kind}");
        }
    }
}
