//! Property-based test generators using proptest.
//!
//! Provides strategies for source values in every representation the
//! normalizer accepts, and for datasets whose rows arrive in arbitrary
//! order but always reference existing parents.

use chrono::{NaiveDate, NaiveTime};
use proptest::prelude::*;
use rust_decimal::Decimal;

use crate::fixtures::{raw_budget, raw_expense, raw_user};
use budgetsync_protocol::RawRecord;

/// Strategy for calendar dates between 2000 and 2035.
pub fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (2000i32..2036, 1u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).expect("day 1..=28 is valid"))
}

/// Strategy for a date together with one accepted textual rendering of it.
pub fn date_text_strategy() -> impl Strategy<Value = (NaiveDate, String)> {
    (date_strategy(), 0u32..86_400, 0usize..6).prop_map(|(date, secs, style)| {
        let time = NaiveTime::from_num_seconds_from_midnight_opt(secs, 0)
            .expect("seconds within a day");
        let dt = date.and_time(time);
        let text = match style {
            0 => date.format("%Y-%m-%d").to_string(),
            1 => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            2 => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
            3 => dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            4 => format!("{}+02:00", dt.format("%Y-%m-%dT%H:%M:%S")),
            _ => date.format("%Y/%m/%d").to_string(),
        };
        (date, text)
    })
}

/// Strategy for non-empty text that is not a date in any accepted form.
pub fn invalid_date_text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("31/12/2024".to_string()),
        Just("2024-02-30".to_string()),
        Just("2024-13-01".to_string()),
        Just("next tuesday".to_string()),
        prop::string::string_regex("[a-z]{3,12}").expect("Invalid regex"),
    ]
}

/// Strategy for non-negative money amounts with two decimal places.
pub fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..100_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

/// Users, budgets and expenses with valid references, each list in random
/// order.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// `users` rows.
    pub users: Vec<RawRecord>,
    /// `budgets` rows, each owned by one of `users`.
    pub budgets: Vec<RawRecord>,
    /// `expenses` rows, each booked against one of `budgets`.
    pub expenses: Vec<RawRecord>,
}

impl Dataset {
    /// Total rows across all lists.
    pub fn len(&self) -> usize {
        self.users.len() + self.budgets.len() + self.expenses.len()
    }

    /// Returns true if the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Strategy for a referentially valid [`Dataset`] with shuffled rows.
pub fn dataset_strategy(max_users: usize) -> impl Strategy<Value = Dataset> {
    (1..=max_users.max(1))
        .prop_flat_map(|users| {
            let budgets = prop::collection::vec(0..users, 0..users * 3);
            (Just(users), budgets)
        })
        .prop_flat_map(|(users, budget_owners)| {
            let budget_count = budget_owners.len();
            let expenses = if budget_count == 0 {
                Just(Vec::new()).boxed()
            } else {
                prop::collection::vec((0..budget_count, date_text_strategy()), 0..budget_count * 3)
                    .prop_map(|v| v.into_iter().map(|(b, (_, text))| (b, text)).collect())
                    .boxed()
            };
            (Just(users), Just(budget_owners), expenses)
        })
        .prop_map(|(users, budget_owners, expenses)| Dataset {
            users: (1..=users as i64).map(raw_user).collect(),
            budgets: budget_owners
                .iter()
                .enumerate()
                .map(|(i, owner)| raw_budget(i as i64 + 1, *owner as i64 + 1))
                .collect(),
            expenses: expenses
                .into_iter()
                .enumerate()
                .map(|(i, (budget, date))| raw_expense(i as i64 + 1, budget as i64 + 1, date))
                .collect(),
        })
        .prop_flat_map(|dataset| {
            (
                Just(dataset.users).prop_shuffle(),
                Just(dataset.budgets).prop_shuffle(),
                Just(dataset.expenses).prop_shuffle(),
            )
        })
        .prop_map(|(users, budgets, expenses)| Dataset {
            users,
            budgets,
            expenses,
        })
}
