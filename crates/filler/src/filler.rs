//! The filler - repeatedly appends one fixed buffer to one file
//!
//! Re-expresses the callback-chained write loop of the original as an
//! explicit state machine driven by a spawned task, with cancellation as a
//! first-class request (`CancellationToken`) rather than a best-effort
//! abort. At most one append is ever in flight: the driver task issues the
//! next append only after the previous one resolves, and every append runs
//! under the handle lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use fillfs_store::{AppendHandle, StorageBackend, StoreResult};

use crate::config::FillConfig;
use crate::format::format_bytes;
use crate::observer::FillObserver;

/// Filler lifecycle state
///
/// `Stopped` and `Failed` are both quiescent: `start()` resumes from
/// either one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillState {
    /// No write in flight; `start()` will issue one.
    Idle,
    /// An append is in flight.
    Writing,
    /// A stop/abort took effect.
    Stopped,
    /// An operation failed; the error was reported once, never retried.
    Failed,
}

struct Control {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    /// Run sequence, bumped by each `start()`. A superseded driver task
    /// must not touch the lifecycle state of the run that replaced it.
    seq: u64,
}

/// Quota-bounded append filler over a single sandboxed file
///
/// Constructed once by the hosting shell and shared via `Arc`; all mutable
/// state lives inside. The append buffer is allocated exactly once here
/// and reused for every write - `delete_file`'s re-initialization opens a
/// fresh file but never reallocates the buffer.
pub struct StorageFiller {
    backend: Arc<dyn StorageBackend>,
    observer: Arc<dyn FillObserver>,
    buffer: Arc<[u8]>,
    file_name: String,
    min_grant_bytes: u64,
    running: AtomicBool,
    /// The single append cursor. Held across each append, so holding it
    /// is what serializes writes.
    handle: Mutex<Option<Box<dyn AppendHandle>>>,
    /// Lifecycle snapshot; never held across an await.
    state: StdMutex<FillState>,
    control: StdMutex<Control>,
}

impl StorageFiller {
    /// Create a filler over `backend`, reporting to `observer`.
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        observer: Arc<dyn FillObserver>,
        config: &FillConfig,
    ) -> Self {
        let buffer: Arc<[u8]> = vec![0u8; config.buffer_bytes() as usize].into();
        Self {
            backend,
            observer,
            buffer,
            file_name: config.file_name.clone(),
            min_grant_bytes: config.min_grant_bytes,
            running: AtomicBool::new(false),
            handle: Mutex::new(None),
            state: StdMutex::new(FillState::Idle),
            control: StdMutex::new(Control {
                cancel: CancellationToken::new(),
                task: None,
                seq: 0,
            }),
        }
    }

    /// Request the persistent grant and open the append handle at EOF.
    ///
    /// On refusal the error is surfaced via the observer, the filler enters
    /// `Failed`, and nothing is retried; a later call may try again after
    /// corrective action.
    pub async fn initialize(&self) -> StoreResult<()> {
        self.observer.on_log("requesting persistent store");
        let mut slot = self.handle.lock().await;
        match self.open_store(&mut slot).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.set_state(FillState::Failed);
                warn!(error = %e, "initialize failed");
                self.observer.on_error(&e);
                Err(e)
            }
        }
    }

    /// Grant request plus open-at-EOF, filling the caller's handle slot.
    /// The caller holds the slot lock, so a running driver never observes
    /// a half-initialized handle.
    async fn open_store(&self, slot: &mut Option<Box<dyn AppendHandle>>) -> StoreResult<()> {
        self.backend.request_persistent(self.min_grant_bytes).await?;
        self.observer.on_log("got persistent store");

        let handle = self.backend.open_append(&self.file_name).await?;
        let len = handle.len();
        self.observer.on_log(&format!("opened {}", self.file_name));

        *slot = Some(handle);
        self.set_state(FillState::Idle);

        self.observer
            .on_log(&format!("file size: {}", format_bytes(len)));
        self.observer.on_progress(len);
        self.report_quota().await;
        self.observer.on_log("ready");
        Ok(())
    }

    /// Set the running flag and issue the first append unless a write is
    /// already in flight. Idempotent while running.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            // A write is already chained; nothing to issue.
            return;
        }
        let mut control = self.control.lock().unwrap();
        let cancel = CancellationToken::new();
        control.cancel = cancel.clone();
        control.seq += 1;
        let seq = control.seq;
        let filler = self.clone();
        control.task = Some(tokio::spawn(async move { filler.run(cancel, seq).await }));
    }

    /// Clear the running flag and abort any in-flight append.
    ///
    /// Takes effect synchronously: the cancelled append's completion never
    /// emits progress and never schedules a further append.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.control.lock().unwrap().cancel.cancel();
        self.observer.on_log("aborted append writer");
    }

    /// Remove the file, then re-initialize against a fresh zero-length one.
    ///
    /// On failure the error is surfaced once and all state is left
    /// untouched. The append buffer is reused, never reallocated.
    pub async fn delete_file(&self) -> StoreResult<()> {
        self.observer.on_log("removing file..");

        // Held from removal through the reopen: a driver mid-run blocks on
        // the slot and wakes to a fresh handle, never to a missing one.
        let mut slot = self.handle.lock().await;
        if let Err(e) = self.backend.remove(&self.file_name).await {
            warn!(error = %e, "delete failed");
            self.observer.on_error(&e);
            return Err(e);
        }
        *slot = None;

        self.observer.on_log("file removed");
        self.observer.on_progress(0);
        self.report_quota().await;
        match self.open_store(&mut slot).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.set_state(FillState::Failed);
                warn!(error = %e, "reinitialize after delete failed");
                self.observer.on_error(&e);
                Err(e)
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> FillState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: FillState) {
        *self.state.lock().unwrap() = state;
    }

    /// State write from a driver task: dropped if the task was superseded
    /// by a newer `start()`.
    fn set_run_state(&self, seq: u64, state: FillState) {
        if self.control.lock().unwrap().seq == seq {
            self.set_state(state);
        }
    }

    /// Wait for the current driver task, if any, to finish winding down.
    pub async fn join(&self) {
        let task = self.control.lock().unwrap().task.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Driver loop: one append in flight at a time, chained until stopped,
    /// cancelled, or failed.
    async fn run(self: Arc<Self>, cancel: CancellationToken, seq: u64) {
        loop {
            let mut slot = self.handle.lock().await;
            if cancel.is_cancelled() || !self.running.load(Ordering::SeqCst) {
                self.set_run_state(seq, FillState::Stopped);
                break;
            }
            let Some(handle) = slot.as_mut() else {
                self.running.store(false, Ordering::SeqCst);
                self.set_run_state(seq, FillState::Failed);
                self.observer.on_log("no open file; stopping");
                break;
            };

            self.set_run_state(seq, FillState::Writing);
            self.observer.on_log(&format!(
                "writing chunk of size {}",
                format_bytes(self.buffer.len() as u64)
            ));
            let started = Instant::now();

            // Abort takes precedence over completion: once the token fires,
            // the append future is dropped and its result is never observed.
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                res = handle.append(&self.buffer) => Some(res),
            };

            match outcome {
                None => {
                    self.set_run_state(seq, FillState::Stopped);
                    debug!("append aborted");
                    break;
                }
                Some(Ok(new_len)) => {
                    self.set_run_state(seq, FillState::Idle);
                    drop(slot);
                    debug!(
                        new_len,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "append complete"
                    );
                    self.observer
                        .on_log(&format!("file size: {}", format_bytes(new_len)));
                    self.observer.on_progress(new_len);
                    self.report_quota().await;
                }
                Some(Err(e)) => {
                    self.running.store(false, Ordering::SeqCst);
                    self.set_run_state(seq, FillState::Failed);
                    drop(slot);
                    warn!(error = %e, "append failed");
                    self.observer.on_error(&e);
                    break;
                }
            }
        }
    }

    /// Pull and report a fresh usage/quota snapshot.
    ///
    /// Informational read: a failure here is logged but never terminates
    /// the run.
    async fn report_quota(&self) {
        match self.backend.usage_and_quota().await {
            Ok(report) => {
                self.observer.on_log(&format!(
                    "storage usage: {}, quota: {}",
                    format_bytes(report.used_bytes),
                    format_bytes(report.quota_bytes)
                ));
                self.observer.on_quota(report.used_bytes, report.quota_bytes);
            }
            Err(e) => {
                warn!(error = %e, "usage/quota query failed");
                self.observer
                    .on_log(&format!("usage/quota query failed: {e}"));
            }
        }
    }
}
