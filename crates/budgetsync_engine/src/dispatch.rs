//! Upsert dispatcher.
//!
//! Binds each normalized record to its procedure's named parameters and
//! executes it, retrying transient failures. Within one entity kind calls
//! may run on a bounded pool of scoped worker threads; results are reported
//! in record order regardless of completion order.

use budgetsync_protocol::{ProcedureCall, UpsertRequest};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use tracing::{debug, warn};

use crate::cancel::CancelHandle;
use crate::config::RetryConfig;
use crate::error::ExecuteError;
use crate::executor::ProcedureExecutor;
use crate::report::RecordFailure;

/// Outcome of dispatching one batch of records.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Records whose call was issued.
    pub dispatched: u64,
    /// Records upserted.
    pub succeeded: u64,
    /// Records that failed, in record order.
    pub failures: Vec<RecordFailure>,
    /// Records never started because of cancellation or a lost connection.
    pub skipped: usize,
    /// Set when a transient failure left the executor disconnected.
    pub connection_lost: Option<String>,
}

/// Issues upsert calls through an executor.
pub struct Dispatcher<'a, E: ProcedureExecutor> {
    executor: &'a E,
    retry: &'a RetryConfig,
    prefix: &'a str,
}

impl<'a, E: ProcedureExecutor> Dispatcher<'a, E> {
    /// Creates a dispatcher. `prefix` is prepended to every procedure name.
    pub fn new(executor: &'a E, retry: &'a RetryConfig, prefix: &'a str) -> Self {
        Self {
            executor,
            retry,
            prefix,
        }
    }

    /// The procedure call for `request`.
    pub fn call_for(&self, request: &UpsertRequest) -> ProcedureCall {
        request.to_call().with_prefix(self.prefix)
    }

    /// Executes `call`, retrying transient failures with backoff.
    pub fn invoke(&self, call: &ProcedureCall) -> Result<(), ExecuteError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let delay = self.retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                thread::sleep(delay);
            }

            match self.executor.execute(call) {
                Ok(()) => return Ok(()),
                Err(e) if e.retryable && attempt + 1 < attempts => {
                    debug!(
                        procedure = call.procedure(),
                        id = call.record_id(),
                        attempt = attempt + 1,
                        error = %e,
                        "Transient upsert failure, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Dispatches `requests` with up to `workers` calls in flight.
    ///
    /// No new call starts once `cancel` is set or the executor has dropped
    /// its connection; calls already in flight finish.
    pub fn dispatch_batch(
        &self,
        requests: &[UpsertRequest],
        workers: usize,
        cancel: &CancelHandle,
    ) -> BatchOutcome {
        // The loss is latched when the failing call returns: a call that
        // succeeds later on another worker may mark the executor connected
        // again, but the records behind the halt were still never sent.
        let lost: Mutex<Option<String>> = Mutex::new(None);
        let stop = AtomicBool::new(false);
        let run_one = |request: &UpsertRequest| {
            let result = self.invoke(&self.call_for(request));
            if let Err(e) = &result {
                if e.retryable && !self.executor.is_connected() {
                    lost.lock().get_or_insert_with(|| e.message.clone());
                    stop.store(true, Ordering::SeqCst);
                }
            }
            result
        };
        let halted = || cancel.is_cancelled() || stop.load(Ordering::SeqCst);

        let results: Vec<(usize, Result<(), ExecuteError>)> = if workers <= 1 || requests.len() <= 1 {
            let mut results = Vec::with_capacity(requests.len());
            for (index, request) in requests.iter().enumerate() {
                if halted() {
                    break;
                }
                results.push((index, run_one(request)));
            }
            results
        } else {
            let next = AtomicUsize::new(0);
            let collected = Mutex::new(Vec::with_capacity(requests.len()));
            thread::scope(|scope| {
                for _ in 0..workers.min(requests.len()) {
                    scope.spawn(|| loop {
                        if halted() {
                            break;
                        }
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        let Some(request) = requests.get(index) else {
                            break;
                        };
                        let result = run_one(request);
                        collected.lock().push((index, result));
                    });
                }
            });
            let mut results = collected.into_inner();
            results.sort_by_key(|(index, _)| *index);
            results
        };

        let mut outcome = BatchOutcome {
            skipped: requests.len() - results.len(),
            connection_lost: lost.into_inner(),
            ..BatchOutcome::default()
        };
        for (index, result) in results {
            let request = &requests[index];
            outcome.dispatched += 1;
            match result {
                Ok(()) => {
                    debug!(entity = %request.kind(), id = request.record_id(), "Upserted");
                    outcome.succeeded += 1;
                }
                Err(e) => {
                    warn!(
                        entity = %request.kind(),
                        id = request.record_id(),
                        retryable = e.retryable,
                        error = %e,
                        "Upsert failed"
                    );
                    outcome.failures.push(RecordFailure::upsert(
                        request.kind(),
                        request.record_id(),
                        e.message,
                        e.retryable,
                    ));
                }
            }
        }
        outcome
    }
}
