pub mod backend;
pub mod error;
pub mod local;
pub mod memory;

pub use backend::{AppendHandle, QuotaReport, StorageBackend};
pub use error::{StoreError, StoreResult};
pub use local::LocalStore;
pub use memory::MemoryStore;
