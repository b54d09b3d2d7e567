//! Observer contract - how the filler reports back to its hosting shell
//!
//! The original surface of this component is a log panel plus three counter
//! read-outs; the observer is that surface as a trait. Callbacks arrive in
//! write-completion order (at most one append is ever in flight, so the
//! ordering is trivial) and must not block for long: they run on the
//! filler's driver task.

use fillfs_store::StoreError;
use tracing::{error, info};

/// Caller-supplied sink for progress, quota, and error reports
pub trait FillObserver: Send + Sync {
    /// Human-readable log line (the original's log panel).
    fn on_log(&self, message: &str);

    /// Current file length after a completed operation.
    fn on_progress(&self, bytes_written: u64);

    /// Fresh usage/quota snapshot, pulled after each write.
    fn on_quota(&self, used: u64, quota: u64);

    /// A failed operation; emitted exactly once per failure, never retried.
    fn on_error(&self, error: &StoreError);
}

/// Observer that routes every report through `tracing`
pub struct TracingObserver;

impl FillObserver for TracingObserver {
    fn on_log(&self, message: &str) {
        info!("{message}");
    }

    fn on_progress(&self, bytes_written: u64) {
        info!(bytes_written, "progress");
    }

    fn on_quota(&self, used: u64, quota: u64) {
        info!(used, quota, "quota");
    }

    fn on_error(&self, error: &StoreError) {
        error!(%error, "storage error");
    }
}

/// Observer that discards every report
pub struct NullObserver;

impl FillObserver for NullObserver {
    fn on_log(&self, _message: &str) {}
    fn on_progress(&self, _bytes_written: u64) {}
    fn on_quota(&self, _used: u64, _quota: u64) {}
    fn on_error(&self, _error: &StoreError) {}
}
