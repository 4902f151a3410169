//! Test fixtures and store helpers.
//!
//! Provides temporary stores that clean up after themselves and seeded
//! scenarios with known contents.

use budgetsync_protocol::{EntityKind, RawRecord, RawValue};
use budgetsync_store::{
    NewBudget, NewExpense, NewSavingsGoal, NewSavingsTransaction, NewUser, NewUserPreferences,
    PrimaryDatabase,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A file-backed primary store in a temporary directory.
pub struct TestPrimary {
    /// The database instance.
    pub db: PrimaryDatabase,
    path: PathBuf,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestPrimary {
    /// Creates an empty primary store with the full schema.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("primary.db");
        let db = PrimaryDatabase::create(&path).expect("Failed to create primary database");
        Self {
            db,
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs raw SQL against the store (for rows the application API would
    /// not produce).
    pub fn execute(&self, sql: &str) {
        self.db
            .connection()
            .execute_batch(sql)
            .expect("Failed to execute fixture SQL");
    }
}

impl Default for TestPrimary {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestPrimary {
    type Target = PrimaryDatabase;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// A location for a file-backed analytical store.
///
/// The file is created by whoever connects first.
pub struct TestAnalytical {
    path: PathBuf,
    _temp_dir: TempDir,
}

impl TestAnalytical {
    /// Reserves a path in a fresh temporary directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("analytics.db");
        Self {
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for TestAnalytical {
    fn default() -> Self {
        Self::new()
    }
}

/// A path inside a temporary directory where no database exists.
pub fn missing_database_path() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("does-not-exist.db");
    (temp_dir, path)
}

/// Seeds one user (id 7), one budget (id 3, 500.00) and one expense
/// (id 9, 42.50 on 2024-03-01), with every other table empty.
pub fn seed_reference_scenario(primary: &TestPrimary) {
    primary.execute(
        "INSERT INTO users (id, username, email, password, created_at)
             VALUES (7, 'ana', 'ana@example.com', '$2y$10$hash', '2024-01-05 09:30:00');
         INSERT INTO budgets (id, user_id, name, category, budget_amount, created_date)
             VALUES (3, 7, 'Groceries', 'food', 500.00, '2024-01-05');
         INSERT INTO expenses (id, budget_id, amount, description, date)
             VALUES (9, 3, 42.50, NULL, '2024-03-01');",
    );
}

/// Seeds `users` households through the application insert API and returns
/// the number of rows written per kind.
///
/// Each household has a preferences row, two budgets with three expenses
/// each, and one savings goal with a deposit and a withdrawal.
pub fn seed_households(db: &PrimaryDatabase, users: usize) -> BTreeMap<EntityKind, u64> {
    let mut counts: BTreeMap<EntityKind, u64> = EntityKind::ALL.iter().map(|k| (*k, 0)).collect();
    let mut bump = |kind: EntityKind| *counts.entry(kind).or_default() += 1;

    for n in 0..users {
        let user_id = db
            .insert_user(&NewUser {
                username: format!("user{n}"),
                email: format!("user{n}@example.com"),
                password: format!("$2y$10$hash{n}"),
                created_at: Some(format!("2024-01-{:02} 08:00:00", n % 28 + 1)),
            })
            .expect("Failed to insert user");
        bump(EntityKind::User);

        db.insert_user_preferences(&NewUserPreferences {
            user_id,
            currency: Some("EUR".into()),
            ..NewUserPreferences::default()
        })
        .expect("Failed to insert preferences");
        bump(EntityKind::UserPreferences);

        for (b, category) in ["food", "transport"].iter().enumerate() {
            let budget_id = db
                .insert_budget(&NewBudget {
                    user_id,
                    name: format!("{category} budget"),
                    category: (*category).to_string(),
                    budget_amount: 250.0 * (b as f64 + 1.0),
                    created_date: "2024-02-01".into(),
                })
                .expect("Failed to insert budget");
            bump(EntityKind::Budget);

            for e in 0..3u32 {
                db.insert_expense(&NewExpense {
                    budget_id,
                    amount: 12.25 + f64::from(e),
                    description: (e % 2 == 0).then(|| format!("expense {e}")),
                    date: format!("2024-02-{:02}", e + 10),
                })
                .expect("Failed to insert expense");
                bump(EntityKind::Expense);
            }
        }

        let goal_id = db
            .insert_savings_goal(&NewSavingsGoal {
                user_id,
                name: "Emergency fund".into(),
                target_amount: 1000.0,
                current_amount: 150.0,
                deadline: (n % 2 == 0).then(|| "2025-12-31".to_string()),
                category: "safety".into(),
                description: None,
                created_date: "2024-01-15".into(),
            })
            .expect("Failed to insert savings goal");
        bump(EntityKind::SavingsGoal);

        for (kind, amount) in [("deposit", 200.0), ("withdrawal", 50.0)] {
            db.insert_savings_transaction(&NewSavingsTransaction {
                goal_id,
                amount,
                transaction_type: kind.into(),
                description: None,
                date: "2024-03-01".into(),
            })
            .expect("Failed to insert savings transaction");
            bump(EntityKind::SavingsTransaction);
        }
    }

    counts
}

/// A raw `users` row.
pub fn raw_user(id: i64) -> RawRecord {
    RawRecord::new()
        .with("id", id)
        .with("username", format!("user{id}"))
        .with("email", format!("user{id}@example.com"))
        .with("password", format!("$2y$10$hash{id}"))
        .with("created_at", "2024-01-05 09:30:00")
}

/// A raw `budgets` row.
pub fn raw_budget(id: i64, user_id: i64) -> RawRecord {
    RawRecord::new()
        .with("id", id)
        .with("user_id", user_id)
        .with("name", format!("budget {id}"))
        .with("category", "food")
        .with("budget_amount", 500.0)
        .with("created_date", "2024-01-05")
}

/// A raw `expenses` row with the given date value.
pub fn raw_expense(id: i64, budget_id: i64, date: impl Into<RawValue>) -> RawRecord {
    RawRecord::new()
        .with("id", id)
        .with("budget_id", budget_id)
        .with("amount", 42.5)
        .with("description", RawValue::Null)
        .with("date", date)
}

/// A raw `savings_goals` row with no deadline.
pub fn raw_savings_goal(id: i64, user_id: i64) -> RawRecord {
    RawRecord::new()
        .with("id", id)
        .with("user_id", user_id)
        .with("name", format!("goal {id}"))
        .with("target_amount", 1000.0)
        .with("current_amount", 0.0)
        .with("deadline", RawValue::Null)
        .with("category", "safety")
        .with("description", RawValue::Null)
        .with("created_date", "2024-01-15")
}

/// A raw `savings_transactions` row.
pub fn raw_savings_transaction(id: i64, goal_id: i64, kind: &str) -> RawRecord {
    RawRecord::new()
        .with("id", id)
        .with("goal_id", goal_id)
        .with("amount", 25.0)
        .with("transaction_type", kind)
        .with("description", RawValue::Null)
        .with("date", "2024-03-01")
}

/// A raw `user_preferences` row.
pub fn raw_preferences(id: i64, user_id: i64) -> RawRecord {
    RawRecord::new()
        .with("id", id)
        .with("user_id", user_id)
        .with("currency", "USD")
        .with("date_format", "Y-m-d")
        .with("notifications_enabled", 1)
        .with("budget_alerts", 1)
        .with("savings_reminders", 0)
        .with("theme", "light")
        .with("language", "en")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_scenario_counts() {
        let primary = TestPrimary::new();
        seed_reference_scenario(&primary);
        assert_eq!(primary.count_rows(EntityKind::User).unwrap(), 1);
        assert_eq!(primary.count_rows(EntityKind::Budget).unwrap(), 1);
        assert_eq!(primary.count_rows(EntityKind::Expense).unwrap(), 1);
        assert_eq!(primary.count_rows(EntityKind::SavingsGoal).unwrap(), 0);
    }

    #[test]
    fn households_report_counts() {
        let primary = TestPrimary::new();
        let counts = seed_households(&primary, 2);
        assert_eq!(counts[&EntityKind::User], 2);
        assert_eq!(counts[&EntityKind::Expense], 12);
        for (kind, expected) in counts {
            assert_eq!(primary.count_rows(kind).unwrap(), expected, "{kind}");
        }
    }

    #[test]
    fn missing_path_does_not_exist() {
        let (_dir, path) = missing_database_path();
        assert!(!path.exists());
    }
}
