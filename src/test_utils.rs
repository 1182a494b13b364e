use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageOutputFormat};

use crate::storage::backends::MemoryBackend;
use crate::storage::{ObjectInfo, ObjectListing, StorageBackend};

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut buff = Cursor::new(Vec::new());
    DynamicImage::new_rgb8(width, height)
        .write_to(&mut buff, ImageOutputFormat::Png)
        .unwrap();
    buff.into_inner()
}

/// Wraps a [MemoryBackend] and fails selected operations on keys
/// containing a marker.
///
/// With a store latency set, accepted writes land in the inner backend
/// only after the delay, even if the caller stopped waiting for them.
#[derive(Default)]
pub struct FailingBackend {
    pub inner: Arc<MemoryBackend>,
    store_marker: Option<&'static str>,
    head_marker: Option<&'static str>,
    store_latency: Option<Duration>,
}

impl FailingBackend {
    pub fn failing_store_on(marker: &'static str) -> Self {
        Self {
            store_marker: Some(marker),
            ..Default::default()
        }
    }

    pub fn failing_head_on(marker: &'static str) -> Self {
        Self {
            head_marker: Some(marker),
            ..Default::default()
        }
    }

    pub fn with_store_latency(mut self, latency: Duration) -> Self {
        self.store_latency = Some(latency);
        self
    }
}

fn trips(marker: Option<&'static str>, key: &str) -> bool {
    marker.map(|m| key.contains(m)).unwrap_or(false)
}

#[async_trait]
impl StorageBackend for FailingBackend {
    async fn store(&self, key: &str, content_type: &str, data: Bytes) -> Result<()> {
        if trips(self.store_marker, key) {
            return Err(anyhow!("store refused for {}", key));
        }

        match self.store_latency {
            Some(latency) => {
                let inner = self.inner.clone();
                let key = key.to_string();
                let content_type = content_type.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(latency).await;
                    inner.store(&key, &content_type, data).await
                })
                .await?
            },
            None => self.inner.store(key, content_type, data).await,
        }
    }

    async fn fetch(&self, key: &str) -> Result<Option<Bytes>> {
        self.inner.fetch(key).await
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectInfo>> {
        if trips(self.head_marker, key) {
            return Err(anyhow!("head refused for {}", key));
        }
        self.inner.head(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str, delimiter: Option<&str>) -> Result<ObjectListing> {
        self.inner.list(prefix, delimiter).await
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String> {
        self.inner.signed_url(key, expires_in).await
    }
}
