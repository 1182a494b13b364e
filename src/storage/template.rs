use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

/// What the object store knows about a single key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub content_type: Option<String>,
    pub size: u64,
}

/// The result of a prefix scan.
///
/// When listing with a delimiter, `common_prefixes` holds every distinct
/// group directly below the prefix (each ending in the delimiter) and `keys`
/// only holds the objects found at that level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectListing {
    pub keys: Vec<String>,
    pub common_prefixes: Vec<String>,
}

#[async_trait]
pub trait StorageBackend: Sync + Send + 'static {
    async fn store(
        &self,
        key: &str,
        content_type: &str,
        data: Bytes,
    ) -> anyhow::Result<()>;

    async fn fetch(&self, key: &str) -> anyhow::Result<Option<Bytes>>;

    /// Returns `None` if the key does not exist.
    async fn head(&self, key: &str) -> anyhow::Result<Option<ObjectInfo>>;

    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Lists keys under `prefix` in the order the store returns them.
    async fn list(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> anyhow::Result<ObjectListing>;

    /// Mints a URL granting temporary read access to `key`.
    async fn signed_url(&self, key: &str, expires_in: Duration) -> anyhow::Result<String>;
}
