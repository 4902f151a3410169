//! Field normalizer.
//!
//! Turns loosely typed primary-store rows into typed [`UpsertRequest`]s:
//! dates become calendar dates, money becomes `Decimal`, flags become
//! booleans. A value that cannot be converted fails only its own record,
//! with a [`RecordFailure`] naming the column.

use budgetsync_protocol::{
    BudgetRecord, EntityKind, ExpenseRecord, RawRecord, RawValue, SavingsGoalRecord,
    SavingsTransactionRecord, TransactionType, UpsertRequest, UserPreferencesRecord, UserRecord,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::report::RecordFailure;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parses a date column.
///
/// NULL and blank text are absent dates. Accepts `YYYY-MM-DD`, date-times
/// with a space or `T` separator (fractional seconds optional), RFC 3339,
/// `YYYY/MM/DD`, and integer unix seconds. Time-of-day is discarded.
pub fn parse_date(value: &RawValue) -> Result<Option<NaiveDate>, String> {
    if value.is_blank() {
        return Ok(None);
    }
    match value {
        RawValue::Text(text) => parse_date_text(text.trim())
            .map(Some)
            .ok_or_else(|| format!("unrecognized date {text:?}")),
        RawValue::Integer(secs) => DateTime::from_timestamp(*secs, 0)
            .map(|dt| Some(dt.date_naive()))
            .ok_or_else(|| format!("timestamp {secs} out of range")),
        other => Err(format!("expected a date, found {}", other.type_name())),
    }
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(text, "%Y/%m/%d").ok()
}

/// Parses a money column. NULL is absent; blank text is an error.
pub fn parse_decimal(value: &RawValue) -> Result<Option<Decimal>, String> {
    match value {
        RawValue::Null => Ok(None),
        RawValue::Integer(v) => Ok(Some(Decimal::from(*v))),
        RawValue::Real(v) => Decimal::from_f64(*v)
            .map(|d| Some(d.normalize()))
            .ok_or_else(|| format!("{v} is not a finite amount")),
        RawValue::Text(text) => {
            let trimmed = text.trim();
            Decimal::from_str(trimmed)
                .or_else(|_| Decimal::from_scientific(trimmed))
                .map(Some)
                .map_err(|_| format!("invalid amount {text:?}"))
        }
        RawValue::Blob(_) => Err("expected an amount, found blob".to_string()),
    }
}

/// Parses a 0/1 preference flag. NULL is absent.
pub fn parse_flag(value: &RawValue) -> Result<Option<bool>, String> {
    match value {
        RawValue::Null => Ok(None),
        RawValue::Integer(v) => Ok(Some(*v != 0)),
        RawValue::Real(v) => Ok(Some(*v != 0.0)),
        RawValue::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => Ok(Some(true)),
            "0" | "false" => Ok(Some(false)),
            _ => Err(format!("invalid flag {text:?}")),
        },
        RawValue::Blob(_) => Err("expected a flag, found blob".to_string()),
    }
}

/// Converts raw rows of any kind into upsert requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldNormalizer;

impl FieldNormalizer {
    /// Creates a normalizer.
    pub fn new() -> Self {
        Self
    }

    /// Normalizes one row of `kind`.
    pub fn normalize(&self, kind: EntityKind, raw: &RawRecord) -> Result<UpsertRequest, RecordFailure> {
        let row = Row::new(kind, raw);
        let id = row.id()?;

        let request = match kind {
            EntityKind::User => UserRecord {
                id,
                username: row.text(&["username"])?,
                email: row.text(&["email"])?,
                password_hash: row.text(&["password", "password_hash"])?,
                created_at: row.date(&["created_at"])?,
            }
            .into(),
            EntityKind::Budget => BudgetRecord {
                id,
                user_id: row.integer(&["user_id"])?,
                name: row.text(&["name"])?,
                category: row.text(&["category"])?,
                budget_amount: row.amount(&["budget_amount"])?,
                created_date: row.date(&["created_date"])?,
            }
            .into(),
            EntityKind::Expense => ExpenseRecord {
                id,
                budget_id: row.integer(&["budget_id"])?,
                amount: row.amount(&["amount"])?,
                description: row.optional_text(&["description"])?,
                date: row.date(&["date", "expense_date", "Edate"])?,
            }
            .into(),
            EntityKind::SavingsGoal => SavingsGoalRecord {
                id,
                user_id: row.integer(&["user_id"])?,
                name: row.text(&["name"])?,
                target_amount: row.amount(&["target_amount"])?,
                current_amount: row.optional_amount(&["current_amount"])?,
                deadline: row.date(&["deadline"])?,
                category: row.text(&["category"])?,
                description: row.optional_text(&["description"])?,
                created_date: row.date(&["created_date"])?,
            }
            .into(),
            EntityKind::SavingsTransaction => SavingsTransactionRecord {
                id,
                goal_id: row.integer(&["goal_id"])?,
                amount: row.amount(&["amount"])?,
                transaction_type: row.transaction_type(&["transaction_type"])?,
                description: row.optional_text(&["description"])?,
                date: row.date(&["date", "transaction_date", "Sdate"])?,
            }
            .into(),
            EntityKind::UserPreferences => UserPreferencesRecord {
                id,
                user_id: row.integer(&["user_id"])?,
                currency: row.optional_text(&["currency"])?,
                date_format: row.optional_text(&["date_format"])?,
                notifications_enabled: row.flag(&["notifications_enabled"])?,
                budget_alerts: row.flag(&["budget_alerts"])?,
                savings_reminders: row.flag(&["savings_reminders"])?,
                theme: row.optional_text(&["theme"])?,
                language: row.optional_text(&["language"])?,
            }
            .into(),
        };
        Ok(request)
    }
}

/// Column lookup for one row, producing failures tagged with the row's
/// kind and id.
struct Row<'a> {
    kind: EntityKind,
    raw: &'a RawRecord,
    id: Option<i64>,
}

static NULL: RawValue = RawValue::Null;

impl<'a> Row<'a> {
    fn new(kind: EntityKind, raw: &'a RawRecord) -> Self {
        Self {
            kind,
            raw,
            id: raw.id(),
        }
    }

    /// First present alias and its value; absent columns read as NULL
    /// under the first name.
    fn lookup(&self, names: &[&'static str]) -> (&'static str, &'a RawValue) {
        names
            .iter()
            .find_map(|name| self.raw.get(name).map(|value| (*name, value)))
            .unwrap_or((names[0], &NULL))
    }

    fn fail(&self, field: &str, reason: impl Into<String>) -> RecordFailure {
        RecordFailure::normalization(self.kind, self.id, field, reason)
    }

    fn id(&self) -> Result<i64, RecordFailure> {
        self.integer(&["id"])
    }

    fn integer(&self, names: &[&'static str]) -> Result<i64, RecordFailure> {
        let (field, value) = self.lookup(names);
        match value {
            RawValue::Integer(v) => Ok(*v),
            RawValue::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| self.fail(field, format!("expected an integer, found {text:?}"))),
            RawValue::Null => Err(self.fail(field, "missing value")),
            other => Err(self.fail(field, format!("expected an integer, found {}", other.type_name()))),
        }
    }

    fn text(&self, names: &[&'static str]) -> Result<String, RecordFailure> {
        let (field, _) = self.lookup(names);
        self.optional_text(names)?
            .ok_or_else(|| self.fail(field, "missing value"))
    }

    fn optional_text(&self, names: &[&'static str]) -> Result<Option<String>, RecordFailure> {
        let (field, value) = self.lookup(names);
        match value {
            RawValue::Null => Ok(None),
            RawValue::Text(text) => Ok(Some(text.clone())),
            RawValue::Integer(v) => Ok(Some(v.to_string())),
            RawValue::Real(v) => Ok(Some(v.to_string())),
            RawValue::Blob(_) => Err(self.fail(field, "expected text, found blob")),
        }
    }

    fn date(&self, names: &[&'static str]) -> Result<Option<NaiveDate>, RecordFailure> {
        let (field, value) = self.lookup(names);
        parse_date(value).map_err(|reason| self.fail(field, reason))
    }

    fn amount(&self, names: &[&'static str]) -> Result<Decimal, RecordFailure> {
        let (field, _) = self.lookup(names);
        self.optional_amount(names)?
            .ok_or_else(|| self.fail(field, "missing value"))
    }

    fn optional_amount(&self, names: &[&'static str]) -> Result<Option<Decimal>, RecordFailure> {
        let (field, value) = self.lookup(names);
        parse_decimal(value).map_err(|reason| self.fail(field, reason))
    }

    fn flag(&self, names: &[&'static str]) -> Result<Option<bool>, RecordFailure> {
        let (field, value) = self.lookup(names);
        parse_flag(value).map_err(|reason| self.fail(field, reason))
    }

    fn transaction_type(&self, names: &[&'static str]) -> Result<TransactionType, RecordFailure> {
        let (field, _) = self.lookup(names);
        let text = self.text(names)?;
        text.parse::<TransactionType>()
            .map_err(|e| self.fail(field, e.to_string()))
    }
}
