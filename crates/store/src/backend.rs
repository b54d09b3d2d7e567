//! Storage backend trait - all persistent-store operations go through this
//!
//! Mirrors the contract of a browser's sandboxed persistent filesystem:
//! a grant request, open-or-create by fixed name, serialized appends, a
//! remove, and an informational usage/quota query.

use async_trait::async_trait;

use crate::error::StoreResult;

/// Usage/quota snapshot pulled from the store after each write.
///
/// Never cached: each report reflects the store at the moment of the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaReport {
    pub used_bytes: u64,
    pub quota_bytes: u64,
}

impl QuotaReport {
    /// Bytes still available under the quota.
    pub fn remaining(&self) -> u64 {
        self.quota_bytes.saturating_sub(self.used_bytes)
    }
}

/// Append cursor over a single file
///
/// The cursor is positioned at end-of-file when the handle is opened and
/// only ever moves forward. The caller issues at most one `append` at a
/// time; cancellation is expressed by dropping the in-flight future, so a
/// partial platform write may remain after an abort.
#[async_trait]
pub trait AppendHandle: Send + Sync {
    /// Append `data` at end-of-file; resolves to the new file length.
    ///
    /// Quota is checked before any byte is written: an append that would
    /// exceed the quota fails with `QuotaExceeded` and writes nothing.
    async fn append(&mut self, data: &[u8]) -> StoreResult<u64>;

    /// Current file length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sandboxed, quota-limited persistent store
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Request a persistent grant covering at least `min_bytes`.
    ///
    /// Fails with `StorageUnavailable` if the store refuses persistence or
    /// the grant cannot cover `min_bytes`.
    async fn request_persistent(&self, min_bytes: u64) -> StoreResult<()>;

    /// Open a file by name for appending, creating it if absent.
    ///
    /// The returned handle's cursor sits at the file's current end-of-file
    /// offset, so appends extend whatever is already there.
    async fn open_append(&self, name: &str) -> StoreResult<Box<dyn AppendHandle>>;

    /// Remove the named file. Removing a missing file succeeds.
    async fn remove(&self, name: &str) -> StoreResult<()>;

    /// Informational usage/quota read; no ordering guarantee relative to
    /// concurrent operations beyond "issued after the current append".
    async fn usage_and_quota(&self) -> StoreResult<QuotaReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_saturates_at_zero() {
        let report = QuotaReport {
            used_bytes: 10,
            quota_bytes: 4,
        };
        assert_eq!(report.remaining(), 0);

        let report = QuotaReport {
            used_bytes: 4,
            quota_bytes: 10,
        };
        assert_eq!(report.remaining(), 6);
    }
}
