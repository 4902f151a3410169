//! Typed, normalized entity records.
//!
//! These are the records produced by the field normalizer: dates are
//! calendar dates (or absent), money is `Decimal`, flags are booleans.
//! Each record knows how to bind itself to its upsert procedure.

use crate::call::{ParamValue, ProcedureCall};
use crate::entity::EntityKind;
use crate::error::ProtocolError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

/// A normalized record of one entity kind.
pub trait EntityRecord {
    /// The kind this record type replicates.
    const KIND: EntityKind;

    /// Primary-store id.
    fn id(&self) -> i64;

    /// Parameter values in [`EntityKind::parameter_names`] order.
    fn values(&self) -> Vec<ParamValue>;

    /// Builds the upsert procedure call for this record.
    fn to_call(&self) -> ProcedureCall {
        ProcedureCall::new(Self::KIND, self.id(), self.values())
    }
}

/// A user account.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    /// Primary-store id.
    pub id: i64,
    /// Login name.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Password hash, copied verbatim.
    pub password_hash: String,
    /// Account creation date.
    pub created_at: Option<NaiveDate>,
}

impl EntityRecord for UserRecord {
    const KIND: EntityKind = EntityKind::User;

    fn id(&self) -> i64 {
        self.id
    }

    fn values(&self) -> Vec<ParamValue> {
        vec![
            self.id.into(),
            self.username.as_str().into(),
            self.email.as_str().into(),
            self.password_hash.as_str().into(),
            self.created_at.into(),
        ]
    }
}

/// A spending budget owned by a user.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetRecord {
    /// Primary-store id.
    pub id: i64,
    /// Owning user.
    pub user_id: i64,
    /// Display name.
    pub name: String,
    /// Spending category.
    pub category: String,
    /// Budgeted amount.
    pub budget_amount: Decimal,
    /// Creation date.
    pub created_date: Option<NaiveDate>,
}

impl EntityRecord for BudgetRecord {
    const KIND: EntityKind = EntityKind::Budget;

    fn id(&self) -> i64 {
        self.id
    }

    fn values(&self) -> Vec<ParamValue> {
        vec![
            self.id.into(),
            self.name.as_str().into(),
            self.category.as_str().into(),
            self.budget_amount.into(),
            self.created_date.into(),
            self.user_id.into(),
        ]
    }
}

/// An expense booked against a budget.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseRecord {
    /// Primary-store id.
    pub id: i64,
    /// Budget the expense belongs to.
    pub budget_id: i64,
    /// Amount spent.
    pub amount: Decimal,
    /// Free-text note.
    pub description: Option<String>,
    /// Date of the expense.
    pub date: Option<NaiveDate>,
}

impl EntityRecord for ExpenseRecord {
    const KIND: EntityKind = EntityKind::Expense;

    fn id(&self) -> i64 {
        self.id
    }

    fn values(&self) -> Vec<ParamValue> {
        vec![
            self.id.into(),
            self.budget_id.into(),
            self.amount.into(),
            self.description.clone().into(),
            self.date.into(),
        ]
    }
}

/// A savings goal owned by a user.
#[derive(Debug, Clone, PartialEq)]
pub struct SavingsGoalRecord {
    /// Primary-store id.
    pub id: i64,
    /// Owning user.
    pub user_id: i64,
    /// Display name.
    pub name: String,
    /// Amount to reach.
    pub target_amount: Decimal,
    /// Amount saved so far; absent rows default on the secondary side.
    pub current_amount: Option<Decimal>,
    /// Optional target date.
    pub deadline: Option<NaiveDate>,
    /// Goal category.
    pub category: String,
    /// Free-text note.
    pub description: Option<String>,
    /// Creation date.
    pub created_date: Option<NaiveDate>,
}

impl EntityRecord for SavingsGoalRecord {
    const KIND: EntityKind = EntityKind::SavingsGoal;

    fn id(&self) -> i64 {
        self.id
    }

    fn values(&self) -> Vec<ParamValue> {
        vec![
            self.id.into(),
            self.user_id.into(),
            self.name.as_str().into(),
            self.target_amount.into(),
            self.current_amount.into(),
            self.deadline.into(),
            self.category.as_str().into(),
            self.description.clone().into(),
            self.created_date.into(),
        ]
    }
}

/// Direction of a savings transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    /// Money added to the goal.
    Deposit,
    /// Money taken out of the goal.
    Withdrawal,
}

impl TransactionType {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
        }
    }
}

impl FromStr for TransactionType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deposit" => Ok(TransactionType::Deposit),
            "withdrawal" => Ok(TransactionType::Withdrawal),
            _ => Err(ProtocolError::InvalidTransactionType(s.to_string())),
        }
    }
}

/// A deposit or withdrawal against a savings goal.
#[derive(Debug, Clone, PartialEq)]
pub struct SavingsTransactionRecord {
    /// Primary-store id.
    pub id: i64,
    /// Goal the transaction applies to.
    pub goal_id: i64,
    /// Amount moved.
    pub amount: Decimal,
    /// Deposit or withdrawal.
    pub transaction_type: TransactionType,
    /// Free-text note.
    pub description: Option<String>,
    /// Date of the transaction.
    pub date: Option<NaiveDate>,
}

impl EntityRecord for SavingsTransactionRecord {
    const KIND: EntityKind = EntityKind::SavingsTransaction;

    fn id(&self) -> i64 {
        self.id
    }

    fn values(&self) -> Vec<ParamValue> {
        vec![
            self.id.into(),
            self.goal_id.into(),
            self.amount.into(),
            self.transaction_type.as_str().into(),
            self.description.clone().into(),
            self.date.into(),
        ]
    }
}

/// Per-user preferences (one row per user).
#[derive(Debug, Clone, PartialEq)]
pub struct UserPreferencesRecord {
    /// Primary-store id.
    pub id: i64,
    /// Owning user (unique).
    pub user_id: i64,
    /// ISO currency code.
    pub currency: Option<String>,
    /// Display date format, e.g. `Y-m-d`.
    pub date_format: Option<String>,
    /// Master notification switch.
    pub notifications_enabled: Option<bool>,
    /// Budget overrun alerts.
    pub budget_alerts: Option<bool>,
    /// Savings reminders.
    pub savings_reminders: Option<bool>,
    /// UI theme.
    pub theme: Option<String>,
    /// UI language.
    pub language: Option<String>,
}

impl EntityRecord for UserPreferencesRecord {
    const KIND: EntityKind = EntityKind::UserPreferences;

    fn id(&self) -> i64 {
        self.id
    }

    fn values(&self) -> Vec<ParamValue> {
        vec![
            self.id.into(),
            self.user_id.into(),
            self.currency.clone().into(),
            self.date_format.clone().into(),
            self.notifications_enabled.into(),
            self.budget_alerts.into(),
            self.savings_reminders.into(),
            self.theme.clone().into(),
            self.language.clone().into(),
        ]
    }
}

/// A normalized record of any kind, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertRequest {
    /// `sync_user`.
    User(UserRecord),
    /// `sync_budget`.
    Budget(BudgetRecord),
    /// `sync_expense`.
    Expense(ExpenseRecord),
    /// `sync_savings_goal`.
    SavingsGoal(SavingsGoalRecord),
    /// `sync_savings_transaction`.
    SavingsTransaction(SavingsTransactionRecord),
    /// `sync_user_preferences`.
    UserPreferences(UserPreferencesRecord),
}

impl UpsertRequest {
    /// Entity kind of the wrapped record.
    pub fn kind(&self) -> EntityKind {
        match self {
            UpsertRequest::User(_) => EntityKind::User,
            UpsertRequest::Budget(_) => EntityKind::Budget,
            UpsertRequest::Expense(_) => EntityKind::Expense,
            UpsertRequest::SavingsGoal(_) => EntityKind::SavingsGoal,
            UpsertRequest::SavingsTransaction(_) => EntityKind::SavingsTransaction,
            UpsertRequest::UserPreferences(_) => EntityKind::UserPreferences,
        }
    }

    /// Primary-store id of the wrapped record.
    pub fn record_id(&self) -> i64 {
        match self {
            UpsertRequest::User(r) => r.id(),
            UpsertRequest::Budget(r) => r.id(),
            UpsertRequest::Expense(r) => r.id(),
            UpsertRequest::SavingsGoal(r) => r.id(),
            UpsertRequest::SavingsTransaction(r) => r.id(),
            UpsertRequest::UserPreferences(r) => r.id(),
        }
    }

    /// Builds the procedure call for the wrapped record.
    pub fn to_call(&self) -> ProcedureCall {
        match self {
            UpsertRequest::User(r) => r.to_call(),
            UpsertRequest::Budget(r) => r.to_call(),
            UpsertRequest::Expense(r) => r.to_call(),
            UpsertRequest::SavingsGoal(r) => r.to_call(),
            UpsertRequest::SavingsTransaction(r) => r.to_call(),
            UpsertRequest::UserPreferences(r) => r.to_call(),
        }
    }
}

macro_rules! impl_from_record {
    ($($record:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$record> for UpsertRequest {
                fn from(record: $record) -> Self {
                    UpsertRequest::$variant(record)
                }
            }
        )*
    };
}

impl_from_record!(
    UserRecord => User,
    BudgetRecord => Budget,
    ExpenseRecord => Expense,
    SavingsGoalRecord => SavingsGoal,
    SavingsTransactionRecord => SavingsTransaction,
    UserPreferencesRecord => UserPreferences,
);
