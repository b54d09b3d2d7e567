//! Error taxonomy for store operations
//!
//! Every failure a backend can surface maps onto one of these variants;
//! callers decide policy (the filler treats all of them as terminal for
//! the current run and never retries).

/// Storage error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The persistent grant or file-open was refused.
    #[error("persistent storage unavailable: {0}")]
    StorageUnavailable(String),

    /// An append failed for a non-quota reason.
    #[error("write failed: {0}")]
    Write(#[from] std::io::Error),

    /// The append would push usage past the quota. Nothing was written.
    #[error("quota exceeded: append of {requested} bytes with {used} of {quota} bytes used")]
    QuotaExceeded {
        requested: u64,
        used: u64,
        quota: u64,
    },

    /// The file could not be removed; caller state is untouched.
    #[error("delete failed: {0}")]
    DeleteFailed(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// True for errors that terminate a fill run (`start()` may be called
    /// again after corrective action).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::DeleteFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_error_formats_all_fields() {
        let err = StoreError::QuotaExceeded {
            requested: 1024,
            used: 512,
            quota: 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("1024"));
        assert!(msg.contains("512"));
    }

    #[test]
    fn delete_failed_is_not_terminal() {
        assert!(!StoreError::DeleteFailed("busy".into()).is_terminal());
        assert!(StoreError::StorageUnavailable("denied".into()).is_terminal());
    }
}
