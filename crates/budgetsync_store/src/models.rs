//! Insert models for the primary-store tables.
//!
//! Dates are stored as the application writes them (text); the sync
//! normalizer is responsible for canonicalizing them.

/// A new user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Login name.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Password hash.
    pub password: String,
    /// Creation timestamp; the column default applies when `None`.
    pub created_at: Option<String>,
}

/// A new budget row.
#[derive(Debug, Clone)]
pub struct NewBudget {
    /// Owning user.
    pub user_id: i64,
    /// Display name.
    pub name: String,
    /// Spending category.
    pub category: String,
    /// Budgeted amount.
    pub budget_amount: f64,
    /// Creation date.
    pub created_date: String,
}

/// A new expense row.
#[derive(Debug, Clone)]
pub struct NewExpense {
    /// Budget the expense is booked against.
    pub budget_id: i64,
    /// Amount spent.
    pub amount: f64,
    /// Free-text note.
    pub description: Option<String>,
    /// Date of the expense.
    pub date: String,
}

/// A new savings goal row.
#[derive(Debug, Clone)]
pub struct NewSavingsGoal {
    /// Owning user.
    pub user_id: i64,
    /// Display name.
    pub name: String,
    /// Amount to reach.
    pub target_amount: f64,
    /// Amount already saved.
    pub current_amount: f64,
    /// Optional target date.
    pub deadline: Option<String>,
    /// Goal category.
    pub category: String,
    /// Free-text note.
    pub description: Option<String>,
    /// Creation date.
    pub created_date: String,
}

/// A new savings transaction row.
#[derive(Debug, Clone)]
pub struct NewSavingsTransaction {
    /// Goal the transaction applies to.
    pub goal_id: i64,
    /// Amount moved.
    pub amount: f64,
    /// `deposit` or `withdrawal`.
    pub transaction_type: String,
    /// Free-text note.
    pub description: Option<String>,
    /// Date of the transaction.
    pub date: String,
}

/// A new preferences row. Unset fields take the column defaults.
#[derive(Debug, Clone, Default)]
pub struct NewUserPreferences {
    /// Owning user.
    pub user_id: i64,
    /// ISO currency code.
    pub currency: Option<String>,
    /// Display date format.
    pub date_format: Option<String>,
    /// Master notification switch.
    pub notifications_enabled: Option<bool>,
    /// Budget alerts.
    pub budget_alerts: Option<bool>,
    /// Savings reminders.
    pub savings_reminders: Option<bool>,
    /// UI theme.
    pub theme: Option<String>,
    /// UI language.
    pub language: Option<String>,
}
