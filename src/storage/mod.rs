pub mod backends;
pub mod template;

pub use template::{ObjectInfo, ObjectListing, StorageBackend};
