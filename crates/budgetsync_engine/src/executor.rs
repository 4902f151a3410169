//! Secondary-store execution abstraction.

use budgetsync_protocol::{EntityKind, ProcedureCall};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::cancel::CancelHandle;
use crate::error::{ExecuteError, StoreSide, SyncError, SyncResult};

/// Executes upsert procedure calls against the secondary store.
///
/// Implementations must be shareable across dispatcher workers.
pub trait ProcedureExecutor: Send + Sync {
    /// Executes one call.
    fn execute(&self, call: &ProcedureCall) -> Result<(), ExecuteError>;

    /// Returns true while the store is believed reachable.
    fn is_connected(&self) -> bool;

    /// Releases the connection.
    fn close(&self) -> SyncResult<()>;
}

/// Opens a secondary-store handle for one run.
pub trait TargetConnector {
    /// Handle type.
    type Executor: ProcedureExecutor;

    /// Connects. Failure aborts the run before anything is dispatched.
    fn connect(&self) -> SyncResult<Self::Executor>;
}

#[derive(Default)]
struct Recorded {
    calls: Vec<ProcedureCall>,
    rows: BTreeMap<(EntityKind, i64), ProcedureCall>,
    failures: HashMap<(EntityKind, i64), ExecuteError>,
    transient: HashMap<(EntityKind, i64), usize>,
    cancel_after: Option<(usize, CancelHandle)>,
    disconnect_after: Option<usize>,
}

/// In-memory secondary store that records every call.
///
/// Clones share state, so a test keeps one clone for assertions while the
/// engine owns another. Successful calls upsert into a keyed row map, which
/// makes repeated runs observable the way a real store would see them.
#[derive(Clone)]
pub struct RecordingExecutor {
    state: Arc<Mutex<Recorded>>,
    connected: Arc<AtomicBool>,
    unreachable: Arc<AtomicBool>,
    closes: Arc<AtomicUsize>,
}

impl RecordingExecutor {
    /// Creates a connected executor with no injected failures.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(Recorded::default())),
            connected: Arc::new(AtomicBool::new(true)),
            unreachable: Arc::new(AtomicBool::new(false)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fails every call for record `id` of `kind` with `error`.
    pub fn fail_record(&self, kind: EntityKind, id: i64, error: ExecuteError) {
        self.state.lock().failures.insert((kind, id), error);
    }

    /// Fails the first `times` calls for record `id` of `kind` with a
    /// transient error, then succeeds.
    pub fn fail_transiently(&self, kind: EntityKind, id: i64, times: usize) {
        self.state.lock().transient.insert((kind, id), times);
    }

    /// Requests cancellation through `handle` once `calls` calls were
    /// recorded.
    pub fn cancel_after(&self, calls: usize, handle: CancelHandle) {
        self.state.lock().cancel_after = Some((calls, handle));
    }

    /// Drops the connection once `calls` calls were recorded.
    pub fn disconnect_after(&self, calls: usize) {
        self.state.lock().disconnect_after = Some(calls);
    }

    /// Sets the connected flag directly.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Makes subsequent connects fail.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Every call received, in arrival order, including failed ones.
    pub fn calls(&self) -> Vec<ProcedureCall> {
        self.state.lock().calls.clone()
    }

    /// Entity kind of every call, in arrival order.
    pub fn call_kinds(&self) -> Vec<EntityKind> {
        self.state.lock().calls.iter().map(ProcedureCall::entity).collect()
    }

    /// Last successful call per record, keyed by kind and id.
    pub fn rows(&self) -> BTreeMap<(EntityKind, i64), ProcedureCall> {
        self.state.lock().rows.clone()
    }

    /// Number of distinct records stored for `kind`.
    pub fn row_count(&self, kind: EntityKind) -> usize {
        self.state.lock().rows.keys().filter(|(k, _)| *k == kind).count()
    }

    /// Times [`ProcedureExecutor::close`] was called.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Default for RecordingExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcedureExecutor for RecordingExecutor {
    fn execute(&self, call: &ProcedureCall) -> Result<(), ExecuteError> {
        let mut state = self.state.lock();

        if !self.is_connected() {
            state.calls.push(call.clone());
            return Err(ExecuteError::transient("connection reset by peer"));
        }

        state.calls.push(call.clone());
        let count = state.calls.len();
        if let Some((after, handle)) = &state.cancel_after {
            if count >= *after {
                handle.cancel();
            }
        }
        if matches!(state.disconnect_after, Some(after) if count >= after) {
            self.connected.store(false, Ordering::SeqCst);
        }

        let key = (call.entity(), call.record_id());
        if let Some(error) = state.failures.get(&key) {
            return Err(error.clone());
        }
        if let Some(remaining) = state.transient.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ExecuteError::transient("database is locked"));
            }
        }

        state.rows.insert(key, call.clone());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> SyncResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl TargetConnector for RecordingExecutor {
    type Executor = RecordingExecutor;

    fn connect(&self) -> SyncResult<RecordingExecutor> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SyncError::connection(StoreSide::Secondary, "target unreachable"));
        }
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use budgetsync_protocol::{EntityRecord, ParamValue, UserRecord};

    fn user_call(id: i64, name: &str) -> ProcedureCall {
        UserRecord {
            id,
            username: name.into(),
            email: format!("{name}@example.com"),
            password_hash: "hash".into(),
            created_at: None,
        }
        .to_call()
    }

    #[test]
    fn records_calls_and_upserts_rows() {
        let executor = RecordingExecutor::new();
        executor.execute(&user_call(1, "ana")).unwrap();
        executor.execute(&user_call(1, "ana2")).unwrap();

        assert_eq!(executor.calls().len(), 2);
        assert_eq!(executor.row_count(EntityKind::User), 1);
        let rows = executor.rows();
        assert_eq!(
            rows[&(EntityKind::User, 1)].param("username"),
            Some(&ParamValue::Text("ana2".into()))
        );
    }

    #[test]
    fn injected_failures() {
        let executor = RecordingExecutor::new();
        executor.fail_record(EntityKind::User, 2, ExecuteError::rejected("duplicate email"));
        executor.fail_transiently(EntityKind::User, 3, 1);

        assert!(executor.execute(&user_call(1, "ana")).is_ok());
        assert!(!executor.execute(&user_call(2, "ben")).unwrap_err().retryable);
        assert!(executor.execute(&user_call(3, "cy")).unwrap_err().retryable);
        assert!(executor.execute(&user_call(3, "cy")).is_ok());
        assert_eq!(executor.row_count(EntityKind::User), 2);
    }

    #[test]
    fn disconnect_and_cancel_hooks() {
        let executor = RecordingExecutor::new();
        let cancel = CancelHandle::new();
        executor.cancel_after(2, cancel.clone());
        executor.disconnect_after(3);

        executor.execute(&user_call(1, "a")).unwrap();
        assert!(!cancel.is_cancelled());
        executor.execute(&user_call(2, "b")).unwrap();
        assert!(cancel.is_cancelled());
        assert!(executor.is_connected());
        executor.execute(&user_call(3, "c")).unwrap();
        assert!(!executor.is_connected());
        assert!(executor.execute(&user_call(4, "d")).unwrap_err().retryable);
    }

    #[test]
    fn connector_shares_state() {
        let executor = RecordingExecutor::new();
        let handle = executor.connect().unwrap();
        handle.execute(&user_call(1, "ana")).unwrap();
        handle.close().unwrap();
        assert_eq!(executor.calls().len(), 1);
        assert_eq!(executor.close_count(), 1);

        executor.set_unreachable(true);
        assert!(executor.connect().is_err());
    }
}
