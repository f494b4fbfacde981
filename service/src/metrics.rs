//! Request counters for service monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use earnzy_common::LedgerError;

/// Service metrics.
pub struct Metrics {
    /// Total requests received.
    pub requests_total: AtomicU64,
    /// Requests answered with a result.
    pub requests_success: AtomicU64,
    /// Requests refused by a ledger rule (not found, funds, state...).
    pub requests_rejected: AtomicU64,
    /// Requests whose commit failed in the store.
    pub requests_failed: AtomicU64,
    /// Lines that did not decode into a request.
    pub requests_malformed: AtomicU64,
    /// Requests in progress.
    pub requests_active: AtomicU64,
    /// Rejections caused by an insufficient balance or escrow.
    pub insufficient_funds: AtomicU64,
    /// Rejections caused by a caller lacking ownership or role.
    pub unauthorized: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            requests_success: AtomicU64::new(0),
            requests_rejected: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            requests_malformed: AtomicU64::new(0),
            requests_active: AtomicU64::new(0),
            insufficient_funds: AtomicU64::new(0),
            unauthorized: AtomicU64::new(0),
        }
    }

    /// Increment request started.
    pub fn request_started(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.requests_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record request success.
    pub fn request_succeeded(&self) {
        self.requests_success.fetch_add(1, Ordering::Relaxed);
        self.requests_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a request that ended in `error`.
    pub fn request_errored(&self, error: &LedgerError) {
        match error {
            LedgerError::Storage(_) => {
                self.requests_failed.fetch_add(1, Ordering::Relaxed);
            }
            LedgerError::InsufficientFunds { .. } => {
                self.insufficient_funds.fetch_add(1, Ordering::Relaxed);
                self.requests_rejected.fetch_add(1, Ordering::Relaxed);
            }
            LedgerError::Unauthorized(_) => {
                self.unauthorized.fetch_add(1, Ordering::Relaxed);
                self.requests_rejected.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.requests_rejected.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.requests_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Increment malformed requests.
    pub fn request_malformed(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.requests_malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_success: self.requests_success.load(Ordering::Relaxed),
            requests_rejected: self.requests_rejected.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            requests_malformed: self.requests_malformed.load(Ordering::Relaxed),
            requests_active: self.requests_active.load(Ordering::Relaxed),
            insufficient_funds: self.insufficient_funds.load(Ordering::Relaxed),
            unauthorized: self.unauthorized.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP earnzy_requests_total Total number of requests
# TYPE earnzy_requests_total counter
earnzy_requests_total {}

# HELP earnzy_requests_success Requests answered with a result
# TYPE earnzy_requests_success counter
earnzy_requests_success {}

# HELP earnzy_requests_rejected Requests refused by a ledger rule
# TYPE earnzy_requests_rejected counter
earnzy_requests_rejected {}

# HELP earnzy_requests_failed Requests whose commit failed
# TYPE earnzy_requests_failed counter
earnzy_requests_failed {}

# HELP earnzy_requests_malformed Lines that did not decode
# TYPE earnzy_requests_malformed counter
earnzy_requests_malformed {}

# HELP earnzy_requests_active Requests in progress
# TYPE earnzy_requests_active gauge
earnzy_requests_active {}

# HELP earnzy_insufficient_funds Rejections for insufficient funds
# TYPE earnzy_insufficient_funds counter
earnzy_insufficient_funds {}

# HELP earnzy_unauthorized Rejections for missing ownership or role
# TYPE earnzy_unauthorized counter
earnzy_unauthorized {}
"#,
            snapshot.requests_total,
            snapshot.requests_success,
            snapshot.requests_rejected,
            snapshot.requests_failed,
            snapshot.requests_malformed,
            snapshot.requests_active,
            snapshot.insufficient_funds,
            snapshot.unauthorized,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_success: u64,
    pub requests_rejected: u64,
    pub requests_failed: u64,
    pub requests_malformed: u64,
    pub requests_active: u64,
    pub insufficient_funds: u64,
    pub unauthorized: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;
