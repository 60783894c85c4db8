//! Per-resource counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of a resource's counters.
///
/// Values are best-effort: fields are loaded independently, so a snapshot
/// taken mid-update may be off by one between fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStats {
    /// Admitted and waiting for dispatch
    pub queued: u64,
    /// Executor invocations in flight
    pub active: u64,
    /// Requests completed successfully
    pub succeeded: u64,
    /// Requests that ended with a provider failure
    pub failed: u64,
    /// Retries scheduled after transient failures
    pub retried: u64,
    /// Dispatch attempts refused by the rate limiter
    pub rate_limited: u64,
    /// Requests withdrawn by their caller
    pub cancelled: u64,
    /// Requests refused at admission (queue full)
    pub rejected: u64,
}

/// Lock-free counters behind [`ResourceStats`].
///
/// The resource worker is the only writer apart from admission, which
/// reserves `queued` slots so the hard cap holds under concurrent callers.
#[derive(Debug, Default)]
pub struct StatsCounters {
    queued: AtomicU64,
    active: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    rate_limited: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
}

impl StatsCounters {
    /// Fresh zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot all counters.
    pub fn snapshot(&self) -> ResourceStats {
        ResourceStats {
            queued: self.queued.load(Ordering::Acquire),
            active: self.active.load(Ordering::Acquire),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    /// Reserve one queue slot unless `capacity` is already reached.
    ///
    /// Returns false (and counts a rejection) when the queue is full.
    pub fn try_reserve_queued(&self, capacity: usize) -> bool {
        let reserved = self
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |queued| {
                (queued < capacity as u64).then_some(queued + 1)
            })
            .is_ok();
        if !reserved {
            self.record_rejected();
        }
        reserved
    }

    /// An item re-entered the queue without admission (retry).
    pub fn record_queued(&self) {
        self.queued.fetch_add(1, Ordering::AcqRel);
    }

    /// An item left the queue (dispatch, cancellation, shutdown).
    pub fn record_dequeued(&self) {
        saturating_decrement(&self.queued);
    }

    /// An executor invocation started.
    pub fn record_started(&self) {
        self.active.fetch_add(1, Ordering::AcqRel);
    }

    /// An executor invocation ended, whatever the outcome.
    pub fn record_finished(&self) {
        saturating_decrement(&self.active);
    }

    /// A request completed successfully.
    pub fn record_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// A request ended with a provider failure.
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// A retry was scheduled.
    pub fn record_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    /// The rate limiter refused a dispatch.
    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// A caller withdrew a request.
    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// A request was refused at admission.
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }
}

fn saturating_decrement(counter: &AtomicU64) {
    // Never wraps: a stray double decrement must not report u64::MAX.
    let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1));
}
