//! Persistent, gap-free game history backed by SQLite.

pub mod error;
pub mod record;
pub mod registry;
pub mod storage;
pub mod store;
pub mod xml;

pub use error::StoreError;
pub use record::Record;
pub use registry::{InstanceId, StoreRegistry, MAX_INSTANCES};
pub use storage::{SqliteStorage, StorageStatus};
pub use store::RecordStore;
