//! In-memory store backend for testing
//!
//! Ephemeral, quota-limited store that exists only in memory. Useful for
//! exercising filler behavior without disk I/O, with knobs for the failure
//! paths a real store can hit:
//! - `set_persistent_denied` - the grant request is refused
//! - `set_removes_fail` - file removal is refused
//! - `gate_appends` - appends park on a semaphore so a test can hold a
//!   write in flight
//!
//! The store also tracks a high-water mark of concurrently in-flight
//! appends, letting tests assert the single-outstanding-write discipline.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::backend::{AppendHandle, QuotaReport, StorageBackend};
use crate::error::{StoreError, StoreResult};

struct MemoryInner {
    files: RwLock<HashMap<String, Vec<u8>>>,
    quota_bytes: u64,
    persistent_denied: AtomicBool,
    removes_fail: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
    inflight: AtomicU64,
    inflight_high_water: AtomicU64,
}

impl MemoryInner {
    fn used_bytes(&self) -> StoreResult<u64> {
        let files = self.files.read().map_err(|_| poisoned())?;
        Ok(files.values().map(|data| data.len() as u64).sum())
    }
}

fn poisoned() -> StoreError {
    StoreError::Write(io::Error::other("lock poisoned"))
}

/// In-memory quota-limited store
///
/// Thread-safe via internal locks; cheap to clone through `Arc`.
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    /// Create a store with the given quota.
    pub fn new(quota_bytes: u64) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                files: RwLock::new(HashMap::new()),
                quota_bytes,
                persistent_denied: AtomicBool::new(false),
                removes_fail: AtomicBool::new(false),
                gate: Mutex::new(None),
                inflight: AtomicU64::new(0),
                inflight_high_water: AtomicU64::new(0),
            }),
        }
    }

    /// Refuse (or allow again) persistent grant requests.
    pub fn set_persistent_denied(&self, denied: bool) {
        self.inner.persistent_denied.store(denied, Ordering::SeqCst);
    }

    /// Refuse (or allow again) file removal.
    pub fn set_removes_fail(&self, fail: bool) {
        self.inner.removes_fail.store(fail, Ordering::SeqCst);
    }

    /// Gate subsequent appends behind a semaphore.
    ///
    /// Each append takes one permit before touching the file, so a test
    /// can hold a write in flight by withholding permits.
    pub fn gate_appends(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.inner.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Highest number of appends ever in flight at once.
    pub fn inflight_high_water(&self) -> u64 {
        self.inner.inflight_high_water.load(Ordering::SeqCst)
    }

    /// Length of the named file, 0 if absent (test helper).
    pub fn file_len(&self, name: &str) -> u64 {
        self.inner
            .files
            .read()
            .map(|files| files.get(name).map_or(0, |data| data.len() as u64))
            .unwrap_or(0)
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryStore {
    async fn request_persistent(&self, min_bytes: u64) -> StoreResult<()> {
        if self.inner.persistent_denied.load(Ordering::SeqCst) {
            return Err(StoreError::StorageUnavailable(
                "persistent grant denied".into(),
            ));
        }
        if min_bytes > self.inner.quota_bytes {
            return Err(StoreError::StorageUnavailable(format!(
                "grant of {min_bytes} bytes exceeds quota of {} bytes",
                self.inner.quota_bytes
            )));
        }
        Ok(())
    }

    async fn open_append(&self, name: &str) -> StoreResult<Box<dyn AppendHandle>> {
        let len = {
            let mut files = self.inner.files.write().map_err(|_| poisoned())?;
            files.entry(name.to_string()).or_default().len() as u64
        };
        Ok(Box::new(MemoryAppendHandle {
            name: name.to_string(),
            len,
            inner: self.inner.clone(),
        }))
    }

    async fn remove(&self, name: &str) -> StoreResult<()> {
        if self.inner.removes_fail.load(Ordering::SeqCst) {
            return Err(StoreError::DeleteFailed(format!(
                "removal of {name} refused"
            )));
        }
        let mut files = self.inner.files.write().map_err(|_| poisoned())?;
        files.remove(name);
        Ok(())
    }

    async fn usage_and_quota(&self) -> StoreResult<QuotaReport> {
        Ok(QuotaReport {
            used_bytes: self.inner.used_bytes()?,
            quota_bytes: self.inner.quota_bytes,
        })
    }
}

/// Append cursor over one in-memory file
struct MemoryAppendHandle {
    name: String,
    len: u64,
    inner: Arc<MemoryInner>,
}

/// Decrements the in-flight counter even when the append future is dropped
/// mid-await (cancellation).
struct InflightGuard(Arc<MemoryInner>);

impl InflightGuard {
    fn enter(inner: Arc<MemoryInner>) -> Self {
        let now = inner.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        inner.inflight_high_water.fetch_max(now, Ordering::SeqCst);
        Self(inner)
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.0.inflight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AppendHandle for MemoryAppendHandle {
    async fn append(&mut self, data: &[u8]) -> StoreResult<u64> {
        let _guard = InflightGuard::enter(self.inner.clone());

        let gate = self.inner.gate.lock().map_err(|_| poisoned())?.clone();
        if let Some(gate) = gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| StoreError::Write(io::Error::other("append gate closed")))?;
            permit.forget();
        }

        let used = self.inner.used_bytes()?;
        let requested = data.len() as u64;
        if used + requested > self.inner.quota_bytes {
            return Err(StoreError::QuotaExceeded {
                requested,
                used,
                quota: self.inner.quota_bytes,
            });
        }

        let mut files = self.inner.files.write().map_err(|_| poisoned())?;
        let file = files.entry(self.name.clone()).or_default();
        file.extend_from_slice(data);
        self.len = file.len() as u64;
        Ok(self.len)
    }

    fn len(&self) -> u64 {
        self.len
    }
}
