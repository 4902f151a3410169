//! Sync orchestrator state machine.

use budgetsync_protocol::EntityKind;
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, info_span, warn};

use crate::cancel::CancelHandle;
use crate::config::SyncConfig;
use crate::dispatch::Dispatcher;
use crate::error::{StoreSide, SyncError, SyncResult};
use crate::executor::{ProcedureExecutor, TargetConnector};
use crate::normalize::FieldNormalizer;
use crate::report::{EntityReport, RunOutcome, SyncReport};
use crate::source::{EntitySource, SourceConnector};

/// Where the engine is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "entity", rename_all = "snake_case")]
pub enum SyncState {
    /// No run has started, or a run is connecting.
    Idle,
    /// Processing one entity kind.
    Running(EntityKind),
    /// The last run processed every planned kind.
    Completed,
    /// The last run stopped on a fatal condition.
    Aborted,
}

impl SyncState {
    /// Returns true while a kind is being processed.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Running(_))
    }

    /// Returns true once a run has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Completed | SyncState::Aborted)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Idle => f.write_str("idle"),
            SyncState::Running(kind) => write!(f, "running({kind})"),
            SyncState::Completed => f.write_str("completed"),
            SyncState::Aborted => f.write_str("aborted"),
        }
    }
}

/// Both store handles of one run. Dropping the scope closes them, so every
/// exit path (including unwinding) releases the connections.
struct ConnectionScope<Src: EntitySource, Exe: ProcedureExecutor> {
    source: Src,
    executor: Exe,
}

impl<Src: EntitySource, Exe: ProcedureExecutor> Drop for ConnectionScope<Src, Exe> {
    fn drop(&mut self) {
        if let Err(e) = self.executor.close() {
            warn!(error = %e, "Failed to close secondary store");
        }
        close_source(&mut self.source);
        debug!("Store connections released");
    }
}

fn close_source<Src: EntitySource>(source: &mut Src) {
    if let Err(e) = source.close() {
        warn!(error = %e, "Failed to close primary store");
    }
}

/// Clears the engine's running flag when a run ends, including by unwinding.
struct RunGuard<'a> {
    running: &'a AtomicBool,
    state: &'a RwLock<SyncState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            *self.state.write() = SyncState::Aborted;
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Copies every entity kind from the primary store to the secondary store.
///
/// Each call to [`run`](Self::run) is one full pass: it opens both stores,
/// walks the plan in dependency order, and closes both stores before
/// returning. Nothing is carried between runs.
pub struct SyncEngine<S: SourceConnector, T: TargetConnector> {
    config: SyncConfig,
    source: S,
    target: T,
    normalizer: FieldNormalizer,
    state: RwLock<SyncState>,
    cancel: CancelHandle,
    running: AtomicBool,
}

impl<S: SourceConnector, T: TargetConnector> SyncEngine<S, T> {
    /// Creates an engine over the given connectors.
    pub fn new(config: SyncConfig, source: S, target: T) -> Self {
        Self {
            config,
            source,
            target,
            normalizer: FieldNormalizer::new(),
            state: RwLock::new(SyncState::Idle),
            cancel: CancelHandle::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Requests cancellation of the current run.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A handle that cancels the current run from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Performs one full sync pass.
    ///
    /// Always returns a report; a fatal condition is reported as
    /// [`RunOutcome::Aborted`] rather than as an error.
    pub fn run(&self) -> SyncReport {
        let report = SyncReport::start();
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Sync requested while a run is in progress");
            return report.finish(RunOutcome::Aborted {
                cause: SyncError::AlreadyRunning,
            });
        }

        let _guard = RunGuard {
            running: &self.running,
            state: &self.state,
        };
        self.cancel.reset();
        self.set_state(SyncState::Idle);

        let span = info_span!("sync_run");
        let _enter = span.enter();

        let mut report = report;
        let report = match self.execute_plan(&mut report) {
            Ok(()) => {
                let (attempted, succeeded, failed) = report.totals();
                info!(attempted, succeeded, failed, "Sync completed");
                self.set_state(SyncState::Completed);
                report.finish(RunOutcome::Completed)
            }
            Err(cause) => {
                error!(error = %cause, "Sync aborted");
                self.set_state(SyncState::Aborted);
                report.finish(RunOutcome::Aborted { cause })
            }
        };

        report
    }

    fn execute_plan(&self, report: &mut SyncReport) -> SyncResult<()> {
        self.config.validate()?;
        let plan = self.config.plan()?;

        let mut source = self.source.connect()?;
        let executor = match self.target.connect() {
            Ok(executor) => executor,
            Err(e) => {
                close_source(&mut source);
                return Err(e);
            }
        };
        let scope = ConnectionScope { source, executor };

        info!(entities = plan.len(), workers = self.config.max_workers, "Sync started");

        for kind in plan.iter() {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            self.set_state(SyncState::Running(kind));
            self.sync_entity(kind, &scope.source, &scope.executor, report)?;
        }

        Ok(())
    }

    fn sync_entity<Src: EntitySource, Exe: ProcedureExecutor>(
        &self,
        kind: EntityKind,
        source: &Src,
        executor: &Exe,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let span = info_span!("entity", entity = %kind);
        let _enter = span.enter();

        let mut counts = EntityReport::new(kind);
        let result = self.sync_pages(kind, source, executor, &mut counts, report);
        info!(
            attempted = counts.attempted,
            succeeded = counts.succeeded,
            failed = counts.failed,
            "Entity finished"
        );
        report.entities.push(counts);
        result
    }

    fn sync_pages<Src: EntitySource, Exe: ProcedureExecutor>(
        &self,
        kind: EntityKind,
        source: &Src,
        executor: &Exe,
        counts: &mut EntityReport,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let dispatcher = Dispatcher::new(executor, &self.config.retry, &self.config.procedure_prefix);

        for page in source.reader(kind, self.config.read_batch_size) {
            let page = page?;
            debug!(rows = page.len(), "Page read");

            let mut requests = Vec::with_capacity(page.len());
            for raw in &page {
                match self.normalizer.normalize(kind, raw) {
                    Ok(request) => requests.push(request),
                    Err(failure) => {
                        warn!(%failure, "Record skipped");
                        counts.attempted += 1;
                        counts.failed += 1;
                        report.failures.push(failure);
                    }
                }
            }

            let outcome = dispatcher.dispatch_batch(&requests, self.config.max_workers, &self.cancel);
            counts.attempted += outcome.dispatched;
            counts.succeeded += outcome.succeeded;
            counts.failed += outcome.failures.len() as u64;
            report.dispatched += outcome.dispatched;
            report.failures.extend(outcome.failures);

            if let Some(message) = outcome.connection_lost {
                return Err(SyncError::ConnectionLost {
                    store: StoreSide::Secondary,
                    message,
                });
            }
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if outcome.skipped > 0 {
                // A batch only halts early on cancellation or a lost connection.
                return Err(SyncError::ConnectionLost {
                    store: StoreSide::Secondary,
                    message: format!("{} {kind} records were not sent", outcome.skipped),
                });
            }
        }

        Ok(())
    }
}
