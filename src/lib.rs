pub mod address;
pub mod code;
pub mod error;
pub mod model;
pub mod registry;
pub mod render;
pub mod storage;

pub use address::BaseAddress;
pub use code::ShortCode;
pub use error::RegistryError;
pub use model::LinkRecord;
pub use registry::{Registry, RegistryConfig};
pub use storage::{FileStorage, MemoryStorage, SqliteStorage, Storage, StorageError};
