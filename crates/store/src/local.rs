//! Local filesystem store backend
//!
//! Maps the sandboxed persistent store onto a directory on the real
//! filesystem. The directory is the sandbox: file names must be plain
//! (no separators, no `..`), usage is the total size of the sandbox's
//! direct children, and a configured quota bounds every append.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::backend::{AppendHandle, QuotaReport, StorageBackend};
use crate::error::{StoreError, StoreResult};

/// Persistent store rooted at a sandbox directory
pub struct LocalStore {
    root: PathBuf,
    quota_bytes: u64,
}

impl LocalStore {
    /// Create a store rooted at `root` with the given quota.
    ///
    /// The root directory is created if absent.
    pub fn new(root: impl Into<PathBuf>, quota_bytes: u64) -> Self {
        let root_path = root.into();
        let _ = std::fs::create_dir_all(&root_path);
        Self {
            root: root_path.canonicalize().unwrap_or(root_path),
            quota_bytes,
        }
    }

    /// Resolve a file name inside the sandbox.
    ///
    /// Names are flat identifiers: anything that could escape the sandbox
    /// (separators, `..`, empty) is refused.
    fn resolve(&self, name: &str) -> StoreResult<PathBuf> {
        if name.is_empty()
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(StoreError::StorageUnavailable(format!(
                "invalid file name: {name:?}"
            )));
        }
        Ok(self.root.join(name))
    }

    /// Total size of the sandbox's direct children.
    async fn used_bytes(&self) -> io::Result<u64> {
        let mut used = 0u64;
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_file() {
                used += meta.len();
            }
        }
        Ok(used)
    }
}

#[async_trait]
impl StorageBackend for LocalStore {
    async fn request_persistent(&self, min_bytes: u64) -> StoreResult<()> {
        if min_bytes > self.quota_bytes {
            return Err(StoreError::StorageUnavailable(format!(
                "grant of {min_bytes} bytes exceeds quota of {} bytes",
                self.quota_bytes
            )));
        }
        fs::create_dir_all(&self.root).await.map_err(|e| {
            StoreError::StorageUnavailable(format!(
                "sandbox {} unavailable: {e}",
                self.root.display()
            ))
        })?;
        debug!(root = %self.root.display(), quota = self.quota_bytes, "persistent grant accepted");
        Ok(())
    }

    async fn open_append(&self, name: &str) -> StoreResult<Box<dyn AppendHandle>> {
        let path = self.resolve(name)?;
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .await
            .map_err(|e| {
                StoreError::StorageUnavailable(format!("open {} failed: {e}", path.display()))
            })?;
        let len = file
            .metadata()
            .await
            .map_err(|e| {
                StoreError::StorageUnavailable(format!("stat {} failed: {e}", path.display()))
            })?
            .len();
        debug!(path = %path.display(), len, "opened append handle");
        Ok(Box::new(LocalAppendHandle {
            file,
            len,
            store: Self {
                root: self.root.clone(),
                quota_bytes: self.quota_bytes,
            },
        }))
    }

    async fn remove(&self, name: &str) -> StoreResult<()> {
        let path = self.resolve(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed file");
                Ok(())
            }
            // Removing a missing file succeeds
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::DeleteFailed(format!(
                "remove {} failed: {e}",
                path.display()
            ))),
        }
    }

    async fn usage_and_quota(&self) -> StoreResult<QuotaReport> {
        let used_bytes = self.used_bytes().await.map_err(StoreError::Write)?;
        Ok(QuotaReport {
            used_bytes,
            quota_bytes: self.quota_bytes,
        })
    }
}

/// Append cursor over one sandboxed file
struct LocalAppendHandle {
    file: tokio::fs::File,
    len: u64,
    store: LocalStore,
}

#[async_trait]
impl AppendHandle for LocalAppendHandle {
    async fn append(&mut self, data: &[u8]) -> StoreResult<u64> {
        let used = self.store.used_bytes().await.map_err(StoreError::Write)?;
        let requested = data.len() as u64;
        if used + requested > self.store.quota_bytes {
            return Err(StoreError::QuotaExceeded {
                requested,
                used,
                quota: self.store.quota_bytes,
            });
        }

        self.file.write_all(data).await.map_err(StoreError::Write)?;
        self.file.flush().await.map_err(StoreError::Write)?;
        self.len += requested;
        Ok(self.len)
    }

    fn len(&self) -> u64 {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), 1024);

        let mut handle = store.open_append("big.bin").await.unwrap();
        assert_eq!(handle.append(&[7u8; 100]).await.unwrap(), 100);
        assert_eq!(handle.append(&[7u8; 50]).await.unwrap(), 150);

        let on_disk = std::fs::read(dir.path().join("big.bin")).unwrap();
        assert_eq!(on_disk.len(), 150);
        assert!(on_disk.iter().all(|&b| b == 7));
    }

    #[tokio::test]
    async fn reopen_seeds_cursor_at_eof() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), 1024);

        {
            let mut handle = store.open_append("big.bin").await.unwrap();
            handle.append(&[1u8; 64]).await.unwrap();
        }

        let mut handle = store.open_append("big.bin").await.unwrap();
        assert_eq!(handle.len(), 64);
        assert_eq!(handle.append(&[2u8; 16]).await.unwrap(), 80);
    }

    #[tokio::test]
    async fn quota_bounds_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), 128);

        let mut handle = store.open_append("big.bin").await.unwrap();
        handle.append(&[0u8; 100]).await.unwrap();

        let err = handle.append(&[0u8; 100]).await.unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { used: 100, .. }));
        // The failed append wrote nothing
        assert_eq!(handle.len(), 100);
        assert_eq!(
            std::fs::metadata(dir.path().join("big.bin")).unwrap().len(),
            100
        );
    }

    #[tokio::test]
    async fn usage_reflects_sandbox_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), 1024);

        let mut handle = store.open_append("big.bin").await.unwrap();
        handle.append(&[0u8; 200]).await.unwrap();

        let report = store.usage_and_quota().await.unwrap();
        assert_eq!(report.used_bytes, 200);
        assert_eq!(report.quota_bytes, 1024);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), 1024);

        let mut handle = store.open_append("big.bin").await.unwrap();
        handle.append(&[0u8; 10]).await.unwrap();
        drop(handle);

        store.remove("big.bin").await.unwrap();
        store.remove("big.bin").await.unwrap();
        assert!(!dir.path().join("big.bin").exists());
    }

    #[tokio::test]
    async fn sandbox_escape_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), 1024);

        for name in ["", "..", "../evil.bin", "a/b.bin", "a\\b.bin"] {
            let err = store.open_append(name).await.map(|_| ()).unwrap_err();
            assert!(matches!(err, StoreError::StorageUnavailable(_)), "{name:?}");
        }
    }

    #[tokio::test]
    async fn oversized_grant_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), 100);
        let err = store.request_persistent(200).await.unwrap_err();
        assert!(matches!(err, StoreError::StorageUnavailable(_)));
    }
}
