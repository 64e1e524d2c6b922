//! The retry executor.

use crate::cancel::CancelToken;
use crate::error::RetryError;
use crate::kind::Classify;
use crate::metrics::{RetryMetrics, RetrySummary};
use crate::policy::RetryPolicy;
use crate::sleeper::{Sleeper, ThreadSleeper};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Longest uninterrupted sleep while a cancel token is being watched.
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs operations under a [`RetryPolicy`] and keeps per-operation metrics.
///
/// Each run makes up to `max_attempts` attempts. A failure whose kind the
/// policy classifies as fatal, or does not classify at all, is returned at
/// once. A retryable failure is followed by a backoff sleep and another
/// attempt, until the attempts run out. The error returned is always the
/// operation's own, unchanged.
///
/// # Example
///
/// ```rust
/// use resync_retry::{OperationError, RetryExecutor, RetryPolicy, RecordingSleeper};
/// use std::sync::Arc;
///
/// let executor = RetryExecutor::with_sleeper(
///     RetryPolicy::new(3).with_jitter(false),
///     Arc::new(RecordingSleeper::new()),
/// );
///
/// let mut calls = 0;
/// let result = executor.execute("fetch_users", || {
///     calls += 1;
///     if calls < 3 {
///         Err(OperationError::retryable("connection reset"))
///     } else {
///         Ok(calls)
///     }
/// });
///
/// assert_eq!(result, Ok(3));
/// assert_eq!(executor.metrics("fetch_users").unwrap().failed_attempts, 2);
/// ```
#[derive(Debug)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    metrics: Mutex<BTreeMap<String, RetryMetrics>>,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl RetryExecutor {
    /// Creates an executor that sleeps the calling thread between attempts.
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_sleeper(policy, Arc::new(ThreadSleeper))
    }

    /// Creates an executor with a custom sleeper.
    pub fn with_sleeper(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            policy,
            sleeper,
            metrics: Mutex::new(BTreeMap::new()),
        }
    }

    /// The default policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `op` under the default policy.
    ///
    /// # Errors
    ///
    /// Returns the last error of `op` when it fails fatally or exhausts its
    /// attempts.
    pub fn execute<T, E, F>(&self, name: &str, op: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: Classify + fmt::Display,
    {
        self.run(&self.policy, name, None, op)
            .map_err(RetryError::into_inner)
    }

    /// Runs `op` under `policy` instead of the default one.
    ///
    /// # Errors
    ///
    /// Returns the last error of `op` when it fails fatally or exhausts its
    /// attempts.
    pub fn execute_with<T, E, F>(&self, policy: &RetryPolicy, name: &str, op: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: Classify + fmt::Display,
    {
        self.run(policy, name, None, op)
            .map_err(RetryError::into_inner)
    }

    /// Runs `op` under the default policy, stopping early once `token` fires.
    ///
    /// The first attempt always runs. The token is checked before every
    /// retry and every [`CANCEL_POLL_INTERVAL`] while waiting.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Failed`] like [`RetryExecutor::execute`], or
    /// [`RetryError::Cancelled`] with the last error if the token fired.
    pub fn execute_cancellable<T, E, F>(
        &self,
        name: &str,
        token: &CancelToken,
        op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Classify + fmt::Display,
    {
        self.run(&self.policy, name, Some(token), op)
    }

    /// Metrics of one operation.
    pub fn metrics(&self, name: &str) -> Option<RetryMetrics> {
        self.metrics.lock().get(name).cloned()
    }

    /// Metrics of every tracked operation.
    pub fn all_metrics(&self) -> BTreeMap<String, RetryMetrics> {
        self.metrics.lock().clone()
    }

    /// Forgets the metrics of one operation.
    pub fn reset(&self, name: &str) {
        self.metrics.lock().remove(name);
    }

    /// Forgets all metrics.
    pub fn reset_all(&self) {
        self.metrics.lock().clear();
    }

    /// Summary across all tracked operations.
    pub fn summary(&self) -> RetrySummary {
        RetrySummary {
            operations: self.all_metrics(),
        }
    }

    fn record<R>(&self, name: &str, f: impl FnOnce(&mut RetryMetrics) -> R) -> R {
        let mut metrics = self.metrics.lock();
        f(metrics.entry(name.to_string()).or_default())
    }

    fn run<T, E, F>(
        &self,
        policy: &RetryPolicy,
        name: &str,
        token: Option<&CancelToken>,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Classify + fmt::Display,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            if attempt > 1 {
                debug!(operation = name, attempt, max_attempts, "retrying operation");
            }

            let err = match op() {
                Ok(value) => {
                    self.record(name, RetryMetrics::record_success);
                    if attempt > 1 {
                        info!(operation = name, attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let kind = err.kind();
            self.record(name, |m| m.record_failure(err.to_string(), kind));

            if !policy.is_retryable(kind) {
                error!(operation = name, attempt, %kind, error = %err, "operation failed, not retryable");
                return Err(RetryError::Failed(err));
            }
            if attempt >= max_attempts {
                error!(operation = name, attempts = attempt, %kind, error = %err, "operation failed, attempts exhausted");
                return Err(RetryError::Failed(err));
            }

            let delay = policy.delay_for_attempt(attempt, &mut rand::thread_rng());
            self.record(name, |m| m.record_retry(attempt, kind, delay.as_secs_f64()));
            warn!(
                operation = name,
                attempt,
                max_attempts,
                %kind,
                error = %err,
                delay_secs = delay.as_secs_f64(),
                "attempt failed, retrying"
            );

            let proceed = match token {
                None => {
                    self.sleeper.sleep(delay);
                    true
                }
                Some(token) => self.wait(token, delay),
            };
            if !proceed {
                warn!(operation = name, attempts = attempt, "retry cancelled");
                return Err(RetryError::Cancelled {
                    attempts: attempt,
                    last_error: err,
                });
            }
            attempt += 1;
        }
    }

    /// Sleeps for `delay` in slices. Returns `false` if `token` fired.
    fn wait(&self, token: &CancelToken, delay: Duration) -> bool {
        let mut remaining = delay;
        while !remaining.is_zero() {
            if token.is_cancelled() {
                return false;
            }
            let step = remaining.min(CANCEL_POLL_INTERVAL);
            self.sleeper.sleep(step);
            remaining -= step;
        }
        !token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperationError;
    use crate::kind::ErrorKind;
    use crate::sleeper::RecordingSleeper;

    fn executor(policy: RetryPolicy) -> (RetryExecutor, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::new());
        (RetryExecutor::with_sleeper(policy, sleeper.clone()), sleeper)
    }

    fn failing_then_ok(
        failures: u32,
        kind: ErrorKind,
    ) -> impl FnMut() -> Result<&'static str, OperationError> {
        let mut calls = 0;
        move || {
            calls += 1;
            if calls <= failures {
                Err(OperationError::new(kind, format!("failure {calls}")))
            } else {
                Ok("done")
            }
        }
    }

    #[test]
    fn succeeds_after_n_minus_one_failures() {
        let n = 4;
        let (exec, sleeper) = executor(RetryPolicy::new(n).with_jitter(false));

        let result = exec.execute("op", failing_then_ok(n - 1, ErrorKind::Retryable));

        assert_eq!(result, Ok("done"));
        let m = exec.metrics("op").unwrap();
        assert_eq!(m.total_attempts, u64::from(n));
        assert_eq!(m.successful_attempts, 1);
        assert_eq!(m.failed_attempts, u64::from(n - 1));
        assert_eq!(m.delays_used, vec![1.0, 2.0, 4.0]);
        assert_eq!(sleeper.sleeps().len(), 3);
    }

    #[test]
    fn fatal_error_short_circuits() {
        let (exec, sleeper) = executor(RetryPolicy::new(5));

        let result = exec.execute("op", failing_then_ok(10, ErrorKind::Fatal));

        assert_eq!(result, Err(OperationError::fatal("failure 1")));
        let m = exec.metrics("op").unwrap();
        assert_eq!(m.total_attempts, 1);
        assert!(m.delays_used.is_empty());
        assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn unclassified_error_is_not_retried() {
        let (exec, sleeper) = executor(RetryPolicy::new(5));

        let result = exec.execute("op", failing_then_ok(10, ErrorKind::Api));

        assert_eq!(result.unwrap_err().kind, ErrorKind::Api);
        assert_eq!(exec.metrics("op").unwrap().total_attempts, 1);
        assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn exhaustion_returns_last_error() {
        let (exec, sleeper) = executor(RetryPolicy::new(3).with_jitter(false));

        let result = exec.execute("op", failing_then_ok(10, ErrorKind::Timeout));

        assert_eq!(result.unwrap_err().message, "failure 3");
        let m = exec.metrics("op").unwrap();
        assert_eq!(m.total_attempts, 3);
        assert_eq!(m.failed_attempts, 3);
        // no delay is recorded for the final attempt
        assert_eq!(m.delays_used, vec![1.0, 2.0]);
        assert_eq!(m.retry_reasons, vec!["Attempt 1: timeout", "Attempt 2: timeout"]);
        assert_eq!(m.last_error.as_deref(), Some("timeout: failure 3"));
        assert_eq!(
            sleeper.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[test]
    fn backoff_is_clamped_to_max_delay() {
        let (exec, sleeper) = executor(
            RetryPolicy::new(5)
                .with_jitter(false)
                .with_max_delay(Duration::from_millis(2500)),
        );

        let _ = exec.execute("op", failing_then_ok(10, ErrorKind::Connection));

        assert_eq!(
            sleeper.sleeps(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_millis(2500),
                Duration::from_millis(2500),
            ]
        );
    }

    #[test]
    fn execute_with_overrides_policy() {
        let (exec, sleeper) = executor(RetryPolicy::new(5));
        let policy = RetryPolicy::no_retry();

        let result = exec.execute_with(&policy, "op", failing_then_ok(1, ErrorKind::Retryable));

        assert!(result.is_err());
        assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let (exec, _) = executor(RetryPolicy::new(0));
        assert_eq!(exec.execute("op", failing_then_ok(0, ErrorKind::Other)), Ok("done"));
    }

    #[test]
    fn io_errors_are_retried() {
        let (exec, _) = executor(RetryPolicy::new(2).with_jitter(false));
        let mut calls = 0;

        let result = exec.execute("read", || {
            calls += 1;
            if calls == 1 {
                Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow disk"))
            } else {
                Ok(calls)
            }
        });

        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn cancellation_between_attempts() {
        let (exec, sleeper) = executor(RetryPolicy::new(5).with_jitter(false));
        let token = CancelToken::new();
        let mut calls = 0;

        let result: Result<(), _> = exec.execute_cancellable("op", &token, || {
            calls += 1;
            if calls == 2 {
                token.cancel();
            }
            Err(OperationError::retryable("down"))
        });

        match result {
            Err(RetryError::Cancelled { attempts, last_error }) => {
                assert_eq!(attempts, 2);
                assert_eq!(last_error.message, "down");
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert_eq!(calls, 2);
        // the first wait is sliced, the second never starts
        assert_eq!(sleeper.total(), Duration::from_secs(1));
        assert_eq!(sleeper.sleeps().len(), 20);
    }

    #[test]
    fn expired_deadline_stops_before_retry() {
        let (exec, sleeper) = executor(RetryPolicy::new(5));
        let token = CancelToken::with_deadline(std::time::Instant::now());

        let result: Result<(), _> =
            exec.execute_cancellable("op", &token, || Err(OperationError::retryable("down")));

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(exec.metrics("op").unwrap().total_attempts, 1);
        assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn cancellable_fatal_is_failed() {
        let (exec, _) = executor(RetryPolicy::new(5));
        let result: Result<(), _> = exec.execute_cancellable("op", &CancelToken::new(), || {
            Err(OperationError::fatal("bad input"))
        });
        assert!(matches!(result, Err(RetryError::Failed(_))));
    }

    #[test]
    fn reset_and_summary() {
        let (exec, _) = executor(RetryPolicy::new(1));
        let _ = exec.execute("a", failing_then_ok(0, ErrorKind::Other));
        let _ = exec.execute("b", failing_then_ok(1, ErrorKind::Other));

        let summary = exec.summary();
        assert_eq!(summary.total_attempts(), 2);
        assert_eq!(summary.successful_attempts(), 1);
        assert!(summary.to_string().contains("    a: 1/1 (100.0%)"));

        exec.reset("a");
        assert!(exec.metrics("a").is_none());
        assert!(exec.metrics("b").is_some());

        exec.reset_all();
        assert!(exec.all_metrics().is_empty());
    }

    #[test]
    fn concurrent_operations_keep_separate_metrics() {
        use std::thread;

        let exec = Arc::new(RetryExecutor::with_sleeper(
            RetryPolicy::new(3).with_jitter(false),
            Arc::new(RecordingSleeper::new()),
        ));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let exec = Arc::clone(&exec);
                thread::spawn(move || {
                    let name = format!("op{i}");
                    for _ in 0..10 {
                        let _ = exec.execute(&name, failing_then_ok(1, ErrorKind::Retryable));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        for i in 0..4 {
            let m = exec.metrics(&format!("op{i}")).unwrap();
            assert_eq!(m.total_attempts, 20);
            assert_eq!(m.successful_attempts, 10);
        }
    }
}
