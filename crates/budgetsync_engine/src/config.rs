//! Configuration for the sync engine.

use budgetsync_protocol::{EntityKind, SyncPlan};
use std::time::Duration;

use crate::error::{SyncError, SyncResult};

/// Configuration for sync runs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Rows fetched from the primary store per page.
    pub read_batch_size: usize,
    /// Upsert calls in flight within one entity kind. `1` dispatches
    /// sequentially.
    pub max_workers: usize,
    /// Retry behavior for transient call failures.
    pub retry: RetryConfig,
    /// Prepended to every procedure name (e.g. `sp_`).
    pub procedure_prefix: String,
    /// Restricts the run to these kinds plus everything they depend on.
    /// `None` syncs all six.
    pub entities: Option<Vec<EntityKind>>,
    /// Explicit entity order. Must list every dependency before its
    /// dependents; cannot be combined with `entities`.
    pub order: Option<Vec<EntityKind>>,
}

impl SyncConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self {
            read_batch_size: 500,
            max_workers: 1,
            retry: RetryConfig::default(),
            procedure_prefix: String::new(),
            entities: None,
            order: None,
        }
    }

    /// Sets the read page size.
    pub fn with_read_batch_size(mut self, size: usize) -> Self {
        self.read_batch_size = size;
        self
    }

    /// Sets the worker pool size.
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the procedure name prefix.
    pub fn with_procedure_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.procedure_prefix = prefix.into();
        self
    }

    /// Restricts the run to `kinds` and their dependencies.
    pub fn with_entities(mut self, kinds: Vec<EntityKind>) -> Self {
        self.entities = Some(kinds);
        self
    }

    /// Runs kinds in exactly this order.
    pub fn with_order(mut self, order: Vec<EntityKind>) -> Self {
        self.order = Some(order);
        self
    }

    /// Checks the configuration for unusable values.
    pub fn validate(&self) -> SyncResult<()> {
        if self.read_batch_size == 0 {
            return Err(SyncError::Config("read batch size must be at least 1".into()));
        }
        if self.max_workers == 0 {
            return Err(SyncError::Config("worker count must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(SyncError::Config("retry attempts must be at least 1".into()));
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 0.0 {
            return Err(SyncError::Config(format!(
                "backoff multiplier must be a finite number of at least 0, got {multiplier}"
            )));
        }
        if !self
            .procedure_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            return Err(SyncError::Config(format!(
                "procedure prefix {:?} may only contain letters, digits, '_' and '.'",
                self.procedure_prefix
            )));
        }
        if matches!(&self.entities, Some(kinds) if kinds.is_empty()) {
            return Err(SyncError::Config("entity filter is empty".into()));
        }
        if self.entities.is_some() && self.order.is_some() {
            return Err(SyncError::Config(
                "an entity filter and an explicit order are mutually exclusive".into(),
            ));
        }
        Ok(())
    }

    /// Entity order for a run under this configuration.
    pub fn plan(&self) -> SyncResult<SyncPlan> {
        match (&self.order, &self.entities) {
            (Some(order), _) => Ok(SyncPlan::from_order(order.clone())?),
            (None, Some(kinds)) => Ok(SyncPlan::for_entities(kinds)),
            (None, None) => Ok(SyncPlan::full()),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retrying transient call failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a retry configuration with `max_attempts` total attempts.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// One attempt per call.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.add_jitter = enabled;
        self
    }

    /// Delay before attempt `attempt` (0-indexed; the first attempt is
    /// immediate).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let delay_secs = (self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent))
            .min(self.max_delay.as_secs_f64());

        let delay_secs = if self.add_jitter {
            delay_secs * (1.0 + 0.25 * jitter_fraction())
        } else {
            delay_secs
        };
        // Negative or NaN products come from an unvalidated multiplier.
        Duration::try_from_secs_f64(delay_secs).unwrap_or(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Pseudo-random value in `[0, 1)` from the clock's sub-second nanos.
fn jitter_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}
