mod blob_storage;
mod memory;
mod register;

pub use blob_storage::BlobStorageBackend;
pub use memory::MemoryBackend;
pub use register::BackendConfigs;
