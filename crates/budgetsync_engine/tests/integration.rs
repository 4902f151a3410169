//! Integration tests for the sync engine against real and in-memory stores.

use budgetsync_engine::{
    AnalyticalConnector, ExecuteError, FailureKind, HttpClient, HttpConnector, HttpResponse,
    MemorySource, ProcedureExecutor, RecordingExecutor, RetryConfig, SqliteSourceConnector,
    StoreSide, SyncConfig, SyncEngine, SyncError, SyncState, TargetConnector,
};
use budgetsync_protocol::{EntityKind, ParamValue, RawValue, SyncPlan};
use budgetsync_testkit::prelude::*;
use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal_macros::dec;
use std::time::Duration;

fn config() -> SyncConfig {
    SyncConfig::new().with_retry(RetryConfig::no_retry())
}

fn fast_retry() -> RetryConfig {
    RetryConfig::new(2)
        .with_initial_delay(Duration::from_millis(1))
        .with_jitter(false)
}

/// Position of every call's kind in the full plan.
fn plan_positions(target: &RecordingExecutor) -> Vec<usize> {
    let plan = SyncPlan::full();
    target
        .call_kinds()
        .into_iter()
        .map(|kind| plan.position(kind).unwrap())
        .collect()
}

#[test]
fn empty_source_attempts_nothing() {
    let primary = TestPrimary::new();
    let target = RecordingExecutor::new();
    let engine = SyncEngine::new(config(), SqliteSourceConnector::new(primary.path()), target.clone());

    let report = engine.run();

    assert!(report.is_clean());
    assert_eq!(report.totals(), (0, 0, 0));
    assert_eq!(report.dispatched, 0);
    assert_eq!(report.entities.len(), EntityKind::ALL.len());
    assert!(target.calls().is_empty());
    assert_eq!(engine.state(), SyncState::Completed);
}

#[test]
fn reference_scenario_end_to_end() {
    let primary = TestPrimary::new();
    seed_reference_scenario(&primary);
    let target = RecordingExecutor::new();
    let engine = SyncEngine::new(config(), SqliteSourceConnector::new(primary.path()), target.clone());

    let report = engine.run();

    assert!(report.is_clean(), "{report:?}");
    for (kind, expected) in [
        (EntityKind::User, 1),
        (EntityKind::Budget, 1),
        (EntityKind::Expense, 1),
        (EntityKind::SavingsGoal, 0),
        (EntityKind::SavingsTransaction, 0),
        (EntityKind::UserPreferences, 0),
    ] {
        let counts = report.entity(kind).unwrap();
        assert_eq!((counts.attempted, counts.succeeded, counts.failed), (expected, expected, 0), "{kind}");
    }
    assert_eq!(
        target.call_kinds(),
        vec![EntityKind::User, EntityKind::Budget, EntityKind::Expense]
    );

    let calls = target.calls();
    assert_eq!(calls[0].procedure(), "sync_user");
    assert_eq!(calls[0].record_id(), 7);
    assert_eq!(calls[0].param("created_at"), Some(&ParamValue::Date(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())));
    assert_eq!(calls[1].param("budget_amount"), Some(&ParamValue::Decimal(dec!(500.00))));
    assert_eq!(calls[1].param("user_id"), Some(&ParamValue::Integer(7)));
    assert_eq!(calls[2].param("amount"), Some(&ParamValue::Decimal(dec!(42.50))));
    assert_eq!(
        calls[2].param("expense_date").and_then(ParamValue::to_wire_text).as_deref(),
        Some("2024-03-01")
    );
}

#[test]
fn reference_scenario_into_analytical_store() {
    let primary = TestPrimary::new();
    seed_reference_scenario(&primary);
    let analytical = TestAnalytical::new();
    let engine = SyncEngine::new(
        config(),
        SqliteSourceConnector::new(primary.path()),
        AnalyticalConnector::new(analytical.path()),
    );

    let report = engine.run();
    assert!(report.is_clean(), "{report:?}");

    let store = AnalyticalConnector::new(analytical.path()).connect().unwrap();
    let expense = store.fetch(EntityKind::Expense, 9).unwrap().unwrap();
    assert_eq!(expense.get("budget_id"), Some(&RawValue::Integer(3)));
    assert_eq!(expense.get("amount"), Some(&RawValue::Real(42.5)));
    assert_eq!(expense.get("expense_date"), Some(&RawValue::from("2024-03-01")));
    assert_eq!(expense.get("description"), Some(&RawValue::Null));
}

#[test]
fn repeated_runs_are_idempotent() {
    let primary = TestPrimary::new();
    let seeded = seed_households(&primary, 3);
    let analytical = TestAnalytical::new();
    let engine = SyncEngine::new(
        config().with_read_batch_size(4),
        SqliteSourceConnector::new(primary.path()),
        AnalyticalConnector::new(analytical.path()),
    );

    let first = engine.run();
    let store = AnalyticalConnector::new(analytical.path()).connect().unwrap();
    let before = store.fetch(EntityKind::SavingsGoal, 1).unwrap();
    store.close().unwrap();

    let second = engine.run();
    assert!(first.is_clean(), "{first:?}");
    assert!(second.is_clean(), "{second:?}");
    assert_eq!(first.totals(), second.totals());

    let store = AnalyticalConnector::new(analytical.path()).connect().unwrap();
    for (kind, expected) in seeded {
        assert_eq!(store.row_count(kind).unwrap(), expected, "{kind}");
    }
    assert_eq!(store.fetch(EntityKind::SavingsGoal, 1).unwrap(), before);
}

#[test]
fn single_bad_date_is_isolated() {
    let source = MemorySource::new()
        .with(EntityKind::User, raw_user(1))
        .with(EntityKind::Budget, raw_budget(1, 1));
    for id in 1..=5 {
        let date = if id == 4 { "04/31/2024" } else { "2024-03-01" };
        source.insert(EntityKind::Expense, raw_expense(id, 1, date));
    }
    let target = RecordingExecutor::new();
    let engine = SyncEngine::new(config(), source, target.clone());

    let report = engine.run();

    assert!(report.is_degraded());
    let expenses = report.entity(EntityKind::Expense).unwrap();
    assert_eq!((expenses.attempted, expenses.succeeded, expenses.failed), (5, 4, 1));
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.entity, EntityKind::Expense);
    assert_eq!(failure.record_id, Some(4));
    assert!(matches!(&failure.kind, FailureKind::Normalization { field, .. } if field == "date"));
    assert_eq!(target.row_count(EntityKind::Expense), 4);
}

#[test]
fn null_deadline_is_passed_as_null() {
    let source = MemorySource::new()
        .with(EntityKind::User, raw_user(1))
        .with(EntityKind::SavingsGoal, raw_savings_goal(2, 1));
    let target = RecordingExecutor::new();
    let engine = SyncEngine::new(config(), source, target.clone());

    let report = engine.run();

    assert!(report.is_clean());
    let rows = target.rows();
    let goal = &rows[&(EntityKind::SavingsGoal, 2)];
    assert_eq!(goal.param("deadline"), Some(&ParamValue::Null));
}

#[test]
fn rejected_upsert_does_not_stop_the_run() {
    let source = MemorySource::new()
        .with(EntityKind::User, raw_user(1))
        .with(EntityKind::User, raw_user(2))
        .with(EntityKind::UserPreferences, raw_preferences(1, 1));
    let target = RecordingExecutor::new();
    target.fail_record(EntityKind::User, 2, ExecuteError::rejected("duplicate key value"));
    let engine = SyncEngine::new(config(), source, target.clone());

    let report = engine.run();

    assert!(report.is_degraded());
    assert_eq!(engine.state(), SyncState::Completed);
    assert!(matches!(
        &report.failures[0].kind,
        FailureKind::Upsert { retryable: false, .. }
    ));
    assert_eq!(target.row_count(EntityKind::UserPreferences), 1);
}

#[test]
fn missing_primary_aborts_without_dispatching() {
    let (_dir, path) = missing_database_path();
    let target = RecordingExecutor::new();
    let engine = SyncEngine::new(config(), SqliteSourceConnector::new(&path), target.clone());

    let report = engine.run();

    assert!(matches!(
        report.abort_cause(),
        Some(SyncError::Connection {
            store: StoreSide::Primary,
            ..
        })
    ));
    assert_eq!(report.dispatched, 0);
    assert!(report.entities.is_empty());
    assert!(target.calls().is_empty());
    assert_eq!(target.close_count(), 0);
    assert_eq!(engine.state(), SyncState::Aborted);
}

#[test]
fn missing_table_aborts_with_read_error() {
    let primary = TestPrimary::new();
    seed_reference_scenario(&primary);
    primary.execute("DROP TABLE savings_transactions;");
    let target = RecordingExecutor::new();
    let engine = SyncEngine::new(config(), SqliteSourceConnector::new(primary.path()), target.clone());

    let report = engine.run();

    assert!(matches!(
        report.abort_cause(),
        Some(SyncError::Read {
            entity: EntityKind::SavingsTransaction,
            ..
        })
    ));
    assert_eq!(report.entity(EntityKind::Expense).unwrap().succeeded, 1);
    assert_eq!(target.close_count(), 1);
}

#[test]
fn lost_connection_aborts_and_closes_both_stores() {
    let source = MemorySource::new();
    for id in 1..=5 {
        source.insert(EntityKind::User, raw_user(id));
    }
    source.insert(EntityKind::Budget, raw_budget(1, 1));
    let target = RecordingExecutor::new();
    target.disconnect_after(2);
    let engine = SyncEngine::new(config().with_retry(fast_retry()), source.clone(), target.clone());

    let report = engine.run();

    assert!(matches!(
        report.abort_cause(),
        Some(SyncError::ConnectionLost {
            store: StoreSide::Secondary,
            ..
        })
    ));
    assert!(report.entity(EntityKind::Budget).is_none());
    assert_eq!(source.close_count(), 1);
    assert_eq!(target.close_count(), 1);
}

/// Gateway whose request for user 1 dies in transit while every other
/// request succeeds a little later.
struct FlakyGateway;

impl HttpClient for FlakyGateway {
    fn post(&self, _url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        let params: serde_json::Value = serde_json::from_slice(&body).map_err(|e| e.to_string())?;
        if params["id"] == 1 {
            std::thread::sleep(Duration::from_millis(40));
            return Err("connection reset by peer".into());
        }
        std::thread::sleep(Duration::from_millis(150));
        Ok(HttpResponse {
            status: 204,
            body: Vec::new(),
        })
    }

    fn probe(&self, _url: &str) -> Result<(), String> {
        Ok(())
    }
}

#[test]
fn worker_pool_aborts_when_connection_drops_mid_batch() {
    let source = MemorySource::new().with(EntityKind::Budget, raw_budget(1, 1));
    for id in 1..=10 {
        source.insert(EntityKind::User, raw_user(id));
    }
    let target = HttpConnector::new("http://gateway.test", FlakyGateway);
    let engine = SyncEngine::new(config().with_max_workers(2), source.clone(), target);

    let report = engine.run();

    assert!(matches!(
        report.abort_cause(),
        Some(SyncError::ConnectionLost {
            store: StoreSide::Secondary,
            ..
        })
    ));
    let users = report.entity(EntityKind::User).unwrap();
    assert!(users.attempted < 10, "{users:?}");
    assert!(report.entity(EntityKind::Budget).is_none());
    assert_eq!(engine.state(), SyncState::Aborted);
    assert_eq!(source.close_count(), 1);
}

#[test]
fn cancellation_drains_in_flight_calls() {
    let source = MemorySource::new().with(EntityKind::Budget, raw_budget(1, 1));
    for id in 1..=40 {
        source.insert(EntityKind::User, raw_user(id));
    }
    let target = RecordingExecutor::new();
    let engine = SyncEngine::new(config().with_max_workers(4), source.clone(), target.clone());
    target.cancel_after(3, engine.cancel_handle());

    let report = engine.run();

    assert_eq!(report.abort_cause(), Some(&SyncError::Cancelled));
    let calls = target.calls().len();
    assert!(calls >= 3 && calls <= 3 + 4, "{calls} calls");
    assert!(!target.call_kinds().contains(&EntityKind::Budget));
    assert_eq!(report.entity(EntityKind::User).unwrap().attempted, calls as u64);
    assert_eq!(source.close_count(), 1);
    assert_eq!(target.close_count(), 1);
}

#[test]
fn engine_can_run_again_after_abort() {
    let source = MemorySource::new().with(EntityKind::User, raw_user(1));
    let target = RecordingExecutor::new();
    target.set_unreachable(true);
    let engine = SyncEngine::new(config(), source, target.clone());

    assert!(engine.run().is_aborted());

    target.set_unreachable(false);
    let report = engine.run();
    assert!(report.is_clean());
    assert_eq!(engine.state(), SyncState::Completed);
}

#[test]
fn entity_filter_pulls_in_dependencies() {
    let primary = TestPrimary::new();
    seed_households(&primary, 1);
    let target = RecordingExecutor::new();
    let engine = SyncEngine::new(
        config().with_entities(vec![EntityKind::Expense]),
        SqliteSourceConnector::new(primary.path()),
        target.clone(),
    );

    let report = engine.run();

    assert!(report.is_clean());
    let kinds: Vec<EntityKind> = report.entities.iter().map(|e| e.entity).collect();
    assert_eq!(kinds, vec![EntityKind::User, EntityKind::Budget, EntityKind::Expense]);
    assert_eq!(target.row_count(EntityKind::SavingsGoal), 0);
}

#[test]
fn procedure_prefix_is_applied() {
    let source = MemorySource::new().with(EntityKind::User, raw_user(1));
    let target = RecordingExecutor::new();
    let engine = SyncEngine::new(config().with_procedure_prefix("sp_"), source, target.clone());

    engine.run();

    assert_eq!(target.calls()[0].procedure(), "sp_sync_user");
}

#[test]
fn worker_pool_keeps_entity_barrier() {
    let primary = TestPrimary::new();
    let seeded = seed_households(&primary, 6);
    let target = RecordingExecutor::new();
    let engine = SyncEngine::new(
        config().with_max_workers(4).with_read_batch_size(5),
        SqliteSourceConnector::new(primary.path()),
        target.clone(),
    );

    let report = engine.run();

    assert!(report.is_clean());
    let positions = plan_positions(&target);
    assert!(positions.windows(2).all(|w| w[0] <= w[1]), "{positions:?}");
    let total: u64 = seeded.values().sum();
    assert_eq!(report.dispatched, total);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn dispatch_order_follows_plan(dataset in dataset_strategy(5)) {
        let source = MemorySource::new();
        for row in dataset.expenses.iter().cloned() {
            source.insert(EntityKind::Expense, row);
        }
        for row in dataset.budgets.iter().cloned() {
            source.insert(EntityKind::Budget, row);
        }
        for row in dataset.users.iter().cloned() {
            source.insert(EntityKind::User, row);
        }

        let analytical = TestAnalytical::new();
        let engine = SyncEngine::new(config(), source, AnalyticalConnector::new(analytical.path()));
        let report = engine.run();

        prop_assert!(report.is_clean(), "{:?}", report.failures);
        prop_assert_eq!(report.dispatched, dataset.len() as u64);
    }

    #[test]
    fn recorded_order_never_regresses(dataset in dataset_strategy(5), workers in 1usize..4) {
        let source = MemorySource::new();
        for row in dataset.expenses.iter().chain(&dataset.budgets).chain(&dataset.users) {
            let kind = if row.get("budget_id").is_some() {
                EntityKind::Expense
            } else if row.get("user_id").is_some() {
                EntityKind::Budget
            } else {
                EntityKind::User
            };
            source.insert(kind, row.clone());
        }

        let target = RecordingExecutor::new();
        let engine = SyncEngine::new(config().with_max_workers(workers), source, target.clone());
        engine.run();

        let positions = plan_positions(&target);
        prop_assert!(positions.windows(2).all(|w| w[0] <= w[1]));
    }
}
