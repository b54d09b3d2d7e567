//! fillfs
//!
//! Repeatedly appends one fixed-size buffer to one file in a sandboxed,
//! quota-limited persistent store, reporting bytes written and quota usage
//! to an observer after every write, until stopped or the quota runs out.

pub mod config;
pub mod filler;
pub mod format;
pub mod observer;

pub use config::FillConfig;
pub use filler::{FillState, StorageFiller};
pub use format::format_bytes;
pub use observer::{FillObserver, NullObserver, TracingObserver};
