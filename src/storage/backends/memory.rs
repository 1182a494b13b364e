use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::storage::{ObjectInfo, ObjectListing, StorageBackend};

#[derive(Debug, Clone)]
struct StoredObject {
    content_type: String,
    data: Bytes,
}

/// An in-process object store.
///
/// Keys are kept sorted, matching the lexicographic listing order of S3.
/// Signed URLs use the `memory://` scheme and are not dereferenceable.
#[derive(Default)]
pub struct MemoryBackend {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    writes: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of successful `store` calls since creation.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::Relaxed)
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn store(&self, key: &str, content_type: &str, data: Bytes) -> Result<()> {
        debug!("Storing image in memory @ {}", key);
        let obj = StoredObject {
            content_type: content_type.to_string(),
            data,
        };

        self.objects.write().await.insert(key.to_string(), obj);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<Bytes>> {
        debug!("Retrieving image in memory @ {}", key);
        let objects = self.objects.read().await;
        Ok(objects.get(key).map(|obj| obj.data.clone()))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectInfo>> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).map(|obj| ObjectInfo {
            content_type: Some(obj.content_type.clone()),
            size: obj.data.len() as u64,
        }))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        debug!("Purging image in memory @ {}", key);
        if self.objects.write().await.remove(key).is_some() {
            self.deletes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn list(&self, prefix: &str, delimiter: Option<&str>) -> Result<ObjectListing> {
        let objects = self.objects.read().await;
        let mut listing = ObjectListing::default();

        let matching = objects
            .range(prefix.to_string()..)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix));

        for key in matching {
            let rest = &key[prefix.len()..];
            let group = delimiter
                .filter(|d| !d.is_empty())
                .and_then(|d| rest.find(d).map(|idx| &key[..prefix.len() + idx + d.len()]));

            match group {
                Some(group) => {
                    // Keys are sorted so members of a group are always adjacent.
                    if listing.common_prefixes.last().map(|v| v.as_str()) != Some(group) {
                        listing.common_prefixes.push(group.to_string());
                    }
                },
                None => listing.keys.push(key.clone()),
            }
        }

        Ok(listing)
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String> {
        let expires_at = Utc::now().timestamp() + expires_in.as_secs() as i64;
        Ok(format!("memory://{}?expires={}", key, expires_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn populated() -> MemoryBackend {
        let backend = MemoryBackend::new();
        for key in ["a/1/x.png", "a/2/x.png", "b/1/x.png", "c.txt", "images/a/original.png"] {
            backend.store(key, "image/png", Bytes::from_static(b"data")).await.unwrap();
        }
        backend
    }

    #[tokio::test]
    async fn test_delimiter_grouping() {
        let backend = populated().await;

        let listing = backend.list("", Some("/")).await.unwrap();
        assert_eq!(listing.common_prefixes, vec!["a/", "b/", "images/"]);
        assert_eq!(listing.keys, vec!["c.txt"]);

        let listing = backend.list("a/", Some("/")).await.unwrap();
        assert_eq!(listing.common_prefixes, vec!["a/1/", "a/2/"]);
        assert!(listing.keys.is_empty());
    }

    #[tokio::test]
    async fn test_flat_listing() {
        let backend = populated().await;
        let listing = backend.list("a/", None).await.unwrap();
        assert_eq!(listing.keys, vec!["a/1/x.png", "a/2/x.png"]);
        assert!(listing.common_prefixes.is_empty());
    }

    #[tokio::test]
    async fn test_head_and_delete() {
        let backend = populated().await;

        let info = backend.head("c.txt").await.unwrap().unwrap();
        assert_eq!(info.size, 4);
        assert_eq!(info.content_type.as_deref(), Some("image/png"));

        backend.delete("c.txt").await.unwrap();
        backend.delete("c.txt").await.unwrap();
        assert!(backend.head("c.txt").await.unwrap().is_none());
        assert_eq!(backend.delete_count(), 1);
        assert_eq!(backend.write_count(), 5);
    }
}
