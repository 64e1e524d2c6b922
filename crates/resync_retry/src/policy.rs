//! Retry policies and backoff strategies.

use crate::kind::ErrorKind;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Lower bound on a jittered delay, in seconds.
pub const MIN_JITTERED_DELAY_SECS: f64 = 0.1;

/// How the delay grows with the attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// `base`
    Constant,
    /// `base * n`
    Linear,
    /// `base * exponential_base^(n-1)`
    #[default]
    Exponential,
    /// `base * fib(n)`
    Fibonacci,
}

impl BackoffStrategy {
    /// Multiplier applied to the base delay after failed attempt `attempt` (1-based).
    #[allow(clippy::cast_precision_loss)]
    pub fn multiplier(self, attempt: u32, exponential_base: f64) -> f64 {
        match self {
            Self::Constant => 1.0,
            Self::Linear => f64::from(attempt),
            Self::Exponential => {
                let exp = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
                exponential_base.powi(exp)
            }
            Self::Fibonacci => fibonacci(attempt) as f64,
        }
    }

    /// The name used in configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Linear => "linear",
            Self::Exponential => "exponential",
            Self::Fibonacci => "fibonacci",
        }
    }
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown strategy name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown backoff strategy: {0} (expected constant, linear, exponential or fibonacci)")]
pub struct UnknownStrategy(pub String);

impl FromStr for BackoffStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "constant" => Ok(Self::Constant),
            "linear" => Ok(Self::Linear),
            "exponential" => Ok(Self::Exponential),
            "fibonacci" => Ok(Self::Fibonacci),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}

/// The `n`-th Fibonacci number with `fib(0) = 0` and `fib(1) = 1`,
/// saturating at `u64::MAX`.
pub fn fibonacci(n: u32) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    a
}

/// Configuration of a retry run.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay unit scaled by the strategy.
    pub base_delay: Duration,
    /// Upper bound on any un-jittered delay.
    pub max_delay: Duration,
    /// Growth factor of [`BackoffStrategy::Exponential`].
    pub exponential_base: f64,
    /// Delay growth strategy.
    pub strategy: BackoffStrategy,
    /// Whether to perturb delays randomly.
    pub jitter: bool,
    /// Relative size of the jitter, in `[0, 1]`.
    pub jitter_factor: f64,
    /// Kinds that are retried.
    pub retryable: BTreeSet<ErrorKind>,
    /// Kinds that are never retried. Checked before `retryable`.
    pub fatal: BTreeSet<ErrorKind>,
}

impl RetryPolicy {
    /// Creates the default policy with the given attempt limit.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            strategy: BackoffStrategy::Exponential,
            jitter: true,
            jitter_factor: 0.1,
            retryable: BTreeSet::from([
                ErrorKind::Connection,
                ErrorKind::Timeout,
                ErrorKind::Io,
                ErrorKind::Retryable,
            ]),
            fatal: BTreeSet::from([
                ErrorKind::Fatal,
                ErrorKind::InvalidArgument,
                ErrorKind::InvalidType,
            ]),
        }
    }

    /// A policy that makes a single attempt.
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    /// Preset for remote API calls: 3 attempts, 2s base, 30s cap, exponential.
    pub fn api() -> Self {
        Self::new(3)
            .with_base_delay(Duration::from_secs(2))
            .with_max_delay(Duration::from_secs(30))
            .with_strategy(BackoffStrategy::Exponential)
    }

    /// Preset for database queries: 3 attempts, 1s base, 10s cap, linear.
    pub fn database() -> Self {
        Self::new(3)
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(10))
            .with_strategy(BackoffStrategy::Linear)
    }

    /// Sets the attempt limit.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the exponential growth factor.
    #[must_use]
    pub fn with_exponential_base(mut self, base: f64) -> Self {
        self.exponential_base = base;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the relative jitter size.
    #[must_use]
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    /// Replaces the retryable kinds.
    #[must_use]
    pub fn with_retryable(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable = kinds.into_iter().collect();
        self
    }

    /// Replaces the fatal kinds.
    #[must_use]
    pub fn with_fatal(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.fatal = kinds.into_iter().collect();
        self
    }

    /// Adds a retryable kind.
    #[must_use]
    pub fn retry_on(mut self, kind: ErrorKind) -> Self {
        self.retryable.insert(kind);
        self
    }

    /// Adds a fatal kind.
    #[must_use]
    pub fn fail_on(mut self, kind: ErrorKind) -> Self {
        self.fatal.insert(kind);
        self
    }

    /// Whether a failure of `kind` should be retried.
    ///
    /// Fatal kinds win over retryable ones; kinds in neither set are not
    /// retried.
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        if self.fatal.contains(&kind) {
            return false;
        }
        self.retryable.contains(&kind)
    }

    /// The un-jittered delay after failed attempt `attempt` (1-based),
    /// clamped to `[0, max_delay]`.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let max = self.max_delay.as_secs_f64();
        let secs =
            self.base_delay.as_secs_f64() * self.strategy.multiplier(attempt, self.exponential_base);
        // 0 * inf is NaN when the base delay is zero.
        let secs = if secs.is_nan() { 0.0 } else { secs.clamp(0.0, max) };
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }

    /// The delay after failed attempt `attempt` (1-based), with jitter
    /// of `± delay * jitter_factor` floored at 0.1s when enabled.
    pub fn delay_for_attempt<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let delay = self.base_delay_for_attempt(attempt);
        if !self.jitter {
            return delay;
        }
        let secs = delay.as_secs_f64();
        let factor = self.jitter_factor.clamp(0.0, 1.0);
        let jitter = secs * factor * rng.gen_range(-1.0..=1.0);
        Duration::try_from_secs_f64((secs + jitter).max(MIN_JITTERED_DELAY_SECS)).unwrap_or(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
