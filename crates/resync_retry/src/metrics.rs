//! Per-operation retry metrics.

use crate::kind::ErrorKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Counters for one named operation.
///
/// `total_attempts == successful_attempts + failed_attempts` always holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetryMetrics {
    /// Attempts made.
    pub total_attempts: u64,
    /// Attempts that succeeded.
    pub successful_attempts: u64,
    /// Attempts that failed.
    pub failed_attempts: u64,
    /// `successful_attempts / total_attempts`, or 0 before any attempt.
    pub success_rate: f64,
    /// Sum of all delays waited, in seconds.
    pub total_delay_seconds: f64,
    /// Mean of `delays_used`, or 0 when empty.
    pub average_delay: f64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// Kind of the most recent failure.
    pub last_error_kind: Option<ErrorKind>,
    /// One entry per retry, e.g. `"Attempt 1: timeout"`.
    pub retry_reasons: Vec<String>,
    /// Delay before each retry, in seconds.
    pub delays_used: Vec<f64>,
}

impl RetryMetrics {
    pub(crate) fn record_success(&mut self) {
        self.total_attempts += 1;
        self.successful_attempts += 1;
        self.refresh();
    }

    pub(crate) fn record_failure(&mut self, message: String, kind: ErrorKind) {
        self.total_attempts += 1;
        self.failed_attempts += 1;
        self.last_error = Some(message);
        self.last_error_kind = Some(kind);
        self.refresh();
    }

    pub(crate) fn record_retry(&mut self, attempt: u32, kind: ErrorKind, delay_secs: f64) {
        self.total_delay_seconds += delay_secs;
        self.delays_used.push(delay_secs);
        self.retry_reasons.push(format!("Attempt {attempt}: {kind}"));
        self.refresh();
    }

    #[allow(clippy::cast_precision_loss)]
    fn refresh(&mut self) {
        self.success_rate = if self.total_attempts == 0 {
            0.0
        } else {
            self.successful_attempts as f64 / self.total_attempts as f64
        };
        self.average_delay = if self.delays_used.is_empty() {
            0.0
        } else {
            self.delays_used.iter().sum::<f64>() / self.delays_used.len() as f64
        };
    }
}

/// Metrics of every tracked operation, renderable as a text summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrySummary {
    /// Metrics by operation name.
    pub operations: BTreeMap<String, RetryMetrics>,
}

impl RetrySummary {
    /// Attempts across all operations.
    pub fn total_attempts(&self) -> u64 {
        self.operations.values().map(|m| m.total_attempts).sum()
    }

    /// Successful attempts across all operations.
    pub fn successful_attempts(&self) -> u64 {
        self.operations.values().map(|m| m.successful_attempts).sum()
    }

    /// Failed attempts across all operations.
    pub fn failed_attempts(&self) -> u64 {
        self.operations.values().map(|m| m.failed_attempts).sum()
    }

    /// Seconds waited across all operations.
    pub fn total_delay_seconds(&self) -> f64 {
        self.operations.values().map(|m| m.total_delay_seconds).sum()
    }
}

impl fmt::Display for RetrySummary {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operations.is_empty() {
            return write!(f, "No retry metrics recorded.");
        }

        let total = self.total_attempts();
        let successes = self.successful_attempts();
        let rate = if total == 0 {
            0.0
        } else {
            successes as f64 / total as f64 * 100.0
        };

        writeln!(f, "Retry Summary:")?;
        writeln!(f, "  Attempts: {total}")?;
        writeln!(f, "  Successes: {successes}")?;
        writeln!(f, "  Failures: {}", self.failed_attempts())?;
        writeln!(f, "  Success Rate: {rate:.1}%")?;
        writeln!(f, "  Total Delay: {:.2}s", self.total_delay_seconds())?;
        write!(f, "  Operations:")?;
        for (name, m) in &self.operations {
            write!(
                f,
                "\n    {name}: {}/{} ({:.1}%) - {:.2}s",
                m.successful_attempts,
                m.total_attempts,
                m.success_rate * 100.0,
                m.total_delay_seconds
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_stay_consistent() {
        let mut m = RetryMetrics::default();
        m.record_failure("timed out".into(), ErrorKind::Timeout);
        m.record_retry(1, ErrorKind::Timeout, 1.0);
        m.record_failure("timed out".into(), ErrorKind::Timeout);
        m.record_retry(2, ErrorKind::Timeout, 3.0);
        m.record_success();

        assert_eq!(m.total_attempts, m.successful_attempts + m.failed_attempts);
        assert_eq!(m.total_attempts, 3);
        assert!((m.success_rate - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(m.average_delay, 2.0);
        assert_eq!(m.total_delay_seconds, 4.0);
        assert_eq!(m.retry_reasons, vec!["Attempt 1: timeout", "Attempt 2: timeout"]);
        assert_eq!(m.last_error_kind, Some(ErrorKind::Timeout));
    }

    #[test]
    fn empty_summary() {
        assert_eq!(RetrySummary::default().to_string(), "No retry metrics recorded.");
    }

    #[test]
    fn summary_lines() {
        let mut ok = RetryMetrics::default();
        ok.record_success();
        let mut flaky = RetryMetrics::default();
        flaky.record_failure("reset".into(), ErrorKind::Connection);
        flaky.record_retry(1, ErrorKind::Connection, 1.5);
        flaky.record_success();

        let summary = RetrySummary {
            operations: BTreeMap::from([("fetch".to_string(), flaky), ("load".to_string(), ok)]),
        };
        let text = summary.to_string();

        assert!(text.contains("  Attempts: 3\n"));
        assert!(text.contains("  Success Rate: 66.7%\n"));
        assert!(text.contains("    fetch: 1/2 (50.0%) - 1.50s"));
        assert!(text.ends_with("    load: 1/1 (100.0%) - 0.00s"));
    }
}
