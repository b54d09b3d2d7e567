//! Common test utilities
#![allow(dead_code)] // Helpers may not be used in all test files

use std::sync::Mutex;
use std::time::Duration;

use fillfs::{FillObserver, FillState, StorageFiller};
use fillfs_store::StoreError;

pub const MIB: u64 = 1024 * 1024;

/// Observer that records every report for later assertions.
#[derive(Default)]
pub struct RecordingObserver {
    logs: Mutex<Vec<String>>,
    progress: Mutex<Vec<u64>>,
    quota: Mutex<Vec<(u64, u64)>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn logs(&self) -> Vec<String> {
        self.logs.lock().unwrap().clone()
    }

    pub fn progress_reports(&self) -> Vec<u64> {
        self.progress.lock().unwrap().clone()
    }

    pub fn quota_reports(&self) -> Vec<(u64, u64)> {
        self.quota.lock().unwrap().clone()
    }

    pub fn error_reports(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl FillObserver for RecordingObserver {
    fn on_log(&self, message: &str) {
        self.logs.lock().unwrap().push(message.to_string());
    }

    fn on_progress(&self, bytes_written: u64) {
        self.progress.lock().unwrap().push(bytes_written);
    }

    fn on_quota(&self, used: u64, quota: u64) {
        self.quota.lock().unwrap().push((used, quota));
    }

    fn on_error(&self, error: &StoreError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

/// Poll until the filler reaches `want`, panicking after 5 seconds.
pub async fn wait_for_state(filler: &StorageFiller, want: FillState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while filler.state() != want {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {want:?}, at {:?}", filler.state()));
}

/// Poll until `cond` holds, panicking after 5 seconds.
pub async fn wait_until(cond: impl Fn() -> bool, what: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}
