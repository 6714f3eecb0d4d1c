//! Process-wide request counters.
//!
//! Counters are plain atomics owned by the gateway state for the life of
//! the process. They are never reset and never share a lock with the
//! prediction path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::PredictionError;

#[derive(Debug)]
pub struct GatewayMetrics {
    started_at: Instant,
    total_requests: AtomicU64,
    successes: AtomicU64,
    validation_failures: AtomicU64,
    rate_limit_denials: AtomicU64,
    model_unavailable: AtomicU64,
    internal_errors: AtomicU64,
}

/// Point-in-time view served by `GET /metrics`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_predictions: u64,
    pub validation_failures: u64,
    pub rate_limit_denials: u64,
    pub model_unavailable: u64,
    pub internal_errors: u64,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_requests: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            validation_failures: AtomicU64::new(0),
            rate_limit_denials: AtomicU64::new(0),
            model_unavailable: AtomicU64::new(0),
            internal_errors: AtomicU64::new(0),
        }
    }

    pub fn record_received(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, error: &PredictionError) {
        let counter = match error {
            PredictionError::Validation(_) => &self.validation_failures,
            PredictionError::RateLimited { .. } => &self.rate_limit_denials,
            PredictionError::ModelUnavailable(_) => &self.model_unavailable,
            PredictionError::Internal(_) => &self.internal_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_predictions: self.successes.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            rate_limit_denials: self.rate_limit_denials.load(Ordering::Relaxed),
            model_unavailable: self.model_unavailable.load(Ordering::Relaxed),
            internal_errors: self.internal_errors.load(Ordering::Relaxed),
            uptime_seconds: self.uptime_seconds(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationError;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_counters_track_outcomes() {
        let metrics = GatewayMetrics::new();
        for _ in 0..4 {
            metrics.record_received();
        }
        metrics.record_success();
        metrics.record_failure(&PredictionError::Validation(ValidationError::body("bad")));
        metrics.record_failure(&PredictionError::RateLimited {
            retry_after: Duration::from_secs(3),
        });
        metrics.record_failure(&PredictionError::ModelUnavailable("gone".to_string()));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 4);
        assert_eq!(snapshot.successful_predictions, 1);
        assert_eq!(snapshot.validation_failures, 1);
        assert_eq!(snapshot.rate_limit_denials, 1);
        assert_eq!(snapshot.model_unavailable, 1);
        assert_eq!(snapshot.internal_errors, 0);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let metrics = Arc::new(GatewayMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.record_received();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().total_requests, 8000);
    }
}
