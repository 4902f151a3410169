//! Entity kinds and their declared dependencies.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the replicated record kinds.
///
/// The variant order is the declaration order used to break ties when
/// computing a [`SyncPlan`](crate::SyncPlan).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    /// Application users.
    #[serde(rename = "users")]
    User,
    /// Per-user budgets.
    #[serde(rename = "budgets")]
    Budget,
    /// Expenses booked against a budget.
    #[serde(rename = "expenses")]
    Expense,
    /// Per-user savings goals.
    #[serde(rename = "savings_goals")]
    SavingsGoal,
    /// Deposits and withdrawals against a savings goal.
    #[serde(rename = "savings_transactions")]
    SavingsTransaction,
    /// Per-user display and notification preferences.
    #[serde(rename = "user_preferences")]
    UserPreferences,
}

impl EntityKind {
    /// All kinds in declaration order.
    pub const ALL: [EntityKind; 6] = [
        EntityKind::User,
        EntityKind::Budget,
        EntityKind::Expense,
        EntityKind::SavingsGoal,
        EntityKind::SavingsTransaction,
        EntityKind::UserPreferences,
    ];

    /// Primary-store table holding this kind.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Budget => "budgets",
            EntityKind::Expense => "expenses",
            EntityKind::SavingsGoal => "savings_goals",
            EntityKind::SavingsTransaction => "savings_transactions",
            EntityKind::UserPreferences => "user_preferences",
        }
    }

    /// Name of the secondary-store upsert procedure for this kind.
    pub fn procedure(&self) -> &'static str {
        match self {
            EntityKind::User => "sync_user",
            EntityKind::Budget => "sync_budget",
            EntityKind::Expense => "sync_expense",
            EntityKind::SavingsGoal => "sync_savings_goal",
            EntityKind::SavingsTransaction => "sync_savings_transaction",
            EntityKind::UserPreferences => "sync_user_preferences",
        }
    }

    /// Named parameters of the upsert procedure, in call order.
    ///
    /// The first parameter is always `id`, the primary-store identity that
    /// the procedure treats as its natural key.
    pub fn parameter_names(&self) -> &'static [&'static str] {
        match self {
            EntityKind::User => &["id", "username", "email", "password_hash", "created_at"],
            EntityKind::Budget => &[
                "id",
                "name",
                "category",
                "budget_amount",
                "created_date",
                "user_id",
            ],
            EntityKind::Expense => &["id", "budget_id", "amount", "description", "expense_date"],
            EntityKind::SavingsGoal => &[
                "id",
                "user_id",
                "name",
                "target_amount",
                "current_amount",
                "deadline",
                "category",
                "description",
                "created_date",
            ],
            EntityKind::SavingsTransaction => &[
                "id",
                "goal_id",
                "amount",
                "transaction_type",
                "description",
                "transaction_date",
            ],
            EntityKind::UserPreferences => &[
                "id",
                "user_id",
                "currency",
                "date_format",
                "notifications_enabled",
                "budget_alerts",
                "savings_reminders",
                "theme",
                "language",
            ],
        }
    }

    /// Kinds this kind holds a foreign key to.
    pub fn dependencies(&self) -> &'static [EntityKind] {
        match self {
            EntityKind::User => &[],
            EntityKind::Budget | EntityKind::SavingsGoal | EntityKind::UserPreferences => {
                &[EntityKind::User]
            }
            EntityKind::Expense => &[EntityKind::Budget],
            EntityKind::SavingsTransaction => &[EntityKind::SavingsGoal],
        }
    }

    /// Returns true if `other` is a direct dependency of this kind.
    pub fn depends_on(&self, other: EntityKind) -> bool {
        self.dependencies().contains(&other)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for EntityKind {
    type Err = ProtocolError;

    /// Accepts the table name, the singular form, or the short report name.
    fn from_str(s: &str) -> ProtocolResult<Self> {
        let kind = match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "users" | "user" => EntityKind::User,
            "budgets" | "budget" => EntityKind::Budget,
            "expenses" | "expense" => EntityKind::Expense,
            "savings_goals" | "savings_goal" | "goals" | "goal" => EntityKind::SavingsGoal,
            "savings_transactions" | "savings_transaction" | "transactions" | "transaction" => {
                EntityKind::SavingsTransaction
            }
            "user_preferences" | "preferences" | "prefs" => EntityKind::UserPreferences,
            _ => return Err(ProtocolError::UnknownEntity(s.to_string())),
        };
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_procedure_is_keyed_by_id() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.parameter_names()[0], "id", "{kind}");
        }
    }

    #[test]
    fn dependencies_reference_declared_kinds_only() {
        assert!(EntityKind::User.dependencies().is_empty());
        assert!(EntityKind::Expense.depends_on(EntityKind::Budget));
        assert!(EntityKind::SavingsTransaction.depends_on(EntityKind::SavingsGoal));
        assert!(EntityKind::UserPreferences.depends_on(EntityKind::User));
        assert!(!EntityKind::Expense.depends_on(EntityKind::User));
    }

    #[test]
    fn parse_entity_names() {
        assert_eq!("users".parse::<EntityKind>().unwrap(), EntityKind::User);
        assert_eq!("goals".parse::<EntityKind>().unwrap(), EntityKind::SavingsGoal);
        assert_eq!(
            "savings-transactions".parse::<EntityKind>().unwrap(),
            EntityKind::SavingsTransaction
        );
        assert_eq!(
            "Preferences".parse::<EntityKind>().unwrap(),
            EntityKind::UserPreferences
        );
        assert!("invoices".parse::<EntityKind>().is_err());
    }

    #[test]
    fn serializes_as_table_name() {
        let json = serde_json::to_string(&EntityKind::SavingsGoal).unwrap();
        assert_eq!(json, "\"savings_goals\"");
        let kind: EntityKind = serde_json::from_str("\"user_preferences\"").unwrap();
        assert_eq!(kind, EntityKind::UserPreferences);
    }
}
