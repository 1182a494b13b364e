use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures::future::{join_all, try_join_all};
use tracing::instrument;
use uuid::Uuid;

use crate::config::{BatchPolicy, RuntimeConfig};
use crate::error::{ImageError, Result, ValidationError};
use crate::layouts::{stored_extension, Layout, LayoutSelector, ALLOWED_EXTENSIONS};
use crate::models::{BatchFailure, BatchResult, ImageMetadata, ImageSize, ImageUpload, ImageUrls, UploadResult};
use crate::processor::{validate_upload, SourceFormat, VariantProducer};
use crate::storage::StorageBackend;

const METADATA_CONTENT_TYPE: &str = "application/json";

/// One object waiting to be written as part of an upload.
struct PendingObject {
    key: String,
    content_type: String,
    data: Bytes,
}

/// Orchestrates uploads, URL minting, deletion and listing of images
/// stored in a single bucket.
pub struct ImageController {
    pub(crate) config: Arc<RuntimeConfig>,
    pub(crate) layout: LayoutSelector,
    producer: VariantProducer,
    pub(crate) storage: Arc<dyn StorageBackend>,
}

impl ImageController {
    pub fn new(config: Arc<RuntimeConfig>, storage: Arc<dyn StorageBackend>) -> Result<Self> {
        config.validate()?;

        let layout = config.layout.build_layout(config.folder_path.clone());
        let producer = VariantProducer::new(config.sizes.clone());

        Ok(Self {
            config,
            layout,
            producer,
            storage,
        })
    }

    #[inline]
    pub fn cfg(&self) -> &RuntimeConfig {
        &self.config
    }

    #[inline]
    pub fn layout(&self) -> &LayoutSelector {
        &self.layout
    }

    #[instrument(skip(self, upload), fields(filename = %upload.original_name, size = upload.size))]
    pub async fn upload_image(&self, upload: ImageUpload) -> Result<UploadResult> {
        validate_upload(&self.config, &upload)?;

        let ext = stored_extension(&upload.original_name, &upload.mime_type)
            .ok_or_else(|| ValidationError::UnsupportedFileType(upload.mime_type.clone()))?;

        let image_id = Uuid::new_v4();
        let source = SourceFormat::from_extension(ext);
        let format = self.layout.variant_format(ext);

        let producer = self.producer.clone();
        let data = upload.data.clone();
        let variants = tokio::task::spawn_blocking(move || producer.produce(&data, source, format))
            .await
            .map_err(|e| ImageError::Processing {
                variant: ImageSize::Original,
                source: e.into(),
            })??;

        let mut objects = Vec::with_capacity(variants.len() + 1);
        objects.push((
            ImageSize::Original,
            PendingObject {
                key: self.layout.derive_key(image_id, ImageSize::Original, ext),
                content_type: upload.mime_type.clone(),
                data: upload.data.clone(),
            },
        ));

        for (size, encoded) in variants {
            objects.push((
                size,
                PendingObject {
                    key: self.layout.derive_key(image_id, size, ext),
                    content_type: encoded.format.content_type().to_string(),
                    data: encoded.buff,
                },
            ));
        }

        let mut written: Vec<String> = objects.iter().map(|(_, obj)| obj.key.clone()).collect();
        if let Err(e) = self.store_all(objects.iter().map(|(_, obj)| obj)).await {
            self.cleanup(&written).await;
            return Err(e);
        }

        let urls = match self.sign_keys(objects.iter().map(|(size, obj)| (*size, obj.key.as_str()))).await {
            Ok(urls) => urls,
            Err(e) => {
                self.cleanup(&written).await;
                return Err(e);
            },
        };

        if let Some(metadata_key) = self.layout.metadata_key(image_id) {
            let metadata = ImageMetadata {
                id: image_id,
                original_name: upload.original_name.clone(),
                mime_type: upload.mime_type.clone(),
                extension: ext.to_string(),
                sizes: objects
                    .iter()
                    .map(|(size, obj)| (*size, obj.data.len() as u64))
                    .collect(),
                created_at: Utc::now(),
                urls: urls.clone(),
            };

            written.push(metadata_key.clone());
            if let Err(e) = self.store_metadata(&metadata_key, &metadata).await {
                self.cleanup(&written).await;
                return Err(e);
            }
        }

        info!("Stored image {} with {} objects", image_id, written.len());

        Ok(UploadResult {
            id: image_id,
            key: self.layout.base_prefix(image_id),
            original_filename: upload.original_name,
            mime_type: upload.mime_type,
            size: upload.data.len() as u64,
            urls,
        })
    }

    /// Uploads every file concurrently, failures are reported by filename.
    pub async fn upload_multiple_images(&self, uploads: Vec<ImageUpload>) -> BatchResult<UploadResult, String> {
        let results = join_all(uploads.into_iter().map(|upload| async move {
            let name = upload.original_name.clone();
            (name, self.upload_image(upload).await)
        }))
        .await;

        let mut batch = BatchResult::default();
        for (name, result) in results {
            match result {
                Ok(uploaded) => batch.succeeded.push(uploaded),
                Err(e) => {
                    warn!("Failed to upload {:?} as part of a batch: {}", name, e);
                    batch.failed.push(BatchFailure::from_error(name, &e));
                },
            }
        }

        batch
    }

    #[instrument(skip(self))]
    pub async fn get_image_url(&self, image_id: Uuid, size: ImageSize) -> Result<String> {
        if size != ImageSize::Original && !self.config.sizes.contains_key(&size) {
            return Err(ValidationError::InvalidImageSize(size.to_string()).into());
        }

        let ext = self.resolve_extension(image_id).await?;
        let key = self.layout.derive_key(image_id, size, &ext);
        self.sign(&key).await
    }

    #[instrument(skip(self))]
    pub async fn get_image_urls(&self, image_id: Uuid) -> Result<ImageUrls> {
        let ext = self.resolve_extension(image_id).await?;
        self.sign_variants(image_id, &ext).await
    }

    /// Removes every object under the image's base prefix.
    #[instrument(skip(self))]
    pub async fn delete_image(&self, image_id: Uuid) -> Result<()> {
        let prefix = self.layout.base_prefix(image_id);
        let listing = self
            .storage
            .list(&prefix, None)
            .await
            .map_err(|e| ImageError::list(&prefix, e))?;

        if listing.keys.is_empty() {
            return Err(ImageError::NotFound(image_id.to_string()));
        }

        try_join_all(listing.keys.iter().map(|key| async move {
            self.storage
                .delete(key)
                .await
                .map_err(|e| ImageError::delete(key, e))
        }))
        .await?;

        info!("Deleted image {} ({} objects)", image_id, listing.keys.len());
        Ok(())
    }

    /// Deletes each image following the configured [BatchPolicy].
    ///
    /// With `continue` every id is deleted concurrently. With `abort` ids are
    /// deleted one at a time in the given order and the first failure stops
    /// the batch, the remaining ids are reported as aborted.
    pub async fn delete_multiple_images(&self, image_ids: &[Uuid]) -> BatchResult<Uuid> {
        let mut batch = BatchResult::default();

        match self.config.batch_policy {
            BatchPolicy::Continue => {
                let results = join_all(
                    image_ids
                        .iter()
                        .map(|id| async move { (*id, self.delete_image(*id).await) }),
                )
                .await;

                for (id, result) in results {
                    match result {
                        Ok(()) => batch.succeeded.push(id),
                        Err(e) => batch.failed.push(BatchFailure::from_error(id, &e)),
                    }
                }
            },
            BatchPolicy::Abort => {
                let mut remaining = image_ids.iter().copied();
                for id in remaining.by_ref() {
                    match self.delete_image(id).await {
                        Ok(()) => batch.succeeded.push(id),
                        Err(e) => {
                            batch.failed.push(BatchFailure::from_error(id, &e));
                            break;
                        },
                    }
                }

                batch.failed.extend(remaining.map(BatchFailure::aborted));
            },
        }

        if !batch.is_complete() {
            warn!(
                "Batch delete finished with {} failures out of {}",
                batch.failed.len(),
                image_ids.len(),
            );
        }

        batch
    }

    /// Reads the metadata record of an image.
    ///
    /// Returns `None` when the layout keeps no records, when the record is
    /// missing or when it cannot be decoded.
    pub async fn metadata(&self, image_id: Uuid) -> Result<Option<ImageMetadata>> {
        let key = match self.layout.metadata_key(image_id) {
            Some(key) => key,
            None => return Ok(None),
        };

        let data = match self.storage.fetch(&key).await {
            Ok(Some(data)) => data,
            Ok(None) => return Ok(None),
            Err(e) => return Err(ImageError::download(key, e)),
        };

        match serde_json::from_slice::<ImageMetadata>(&data) {
            Ok(metadata) if metadata.id == image_id => Ok(Some(metadata)),
            Ok(_) => {
                warn!("Metadata record {} belongs to another image, ignoring", key);
                Ok(None)
            },
            Err(e) => {
                warn!("Metadata record {} is unreadable, ignoring: {}", key, e);
                Ok(None)
            },
        }
    }

    /// A record can replace probing once it names the extension and
    /// describes every variant we would sign.
    pub(crate) fn is_complete(&self, metadata: &ImageMetadata) -> bool {
        !metadata.extension.is_empty() && metadata.covers(self.config.stored_sizes())
    }

    /// Finds the extension the original was stored with.
    pub(crate) async fn resolve_extension(&self, image_id: Uuid) -> Result<String> {
        if let Some(metadata) = self.metadata(image_id).await? {
            if self.is_complete(&metadata) {
                return Ok(metadata.extension);
            }
        }

        self.probe_extension(image_id)
            .await?
            .ok_or_else(|| ImageError::NotFound(image_id.to_string()))
    }

    /// Tries each allowed extension in order, the first original that
    /// exists wins.
    pub(crate) async fn probe_extension(&self, image_id: Uuid) -> Result<Option<String>> {
        for ext in ALLOWED_EXTENSIONS {
            let key = self.layout.derive_key(image_id, ImageSize::Original, ext);
            let found = self
                .storage
                .head(&key)
                .await
                .map_err(|e| ImageError::download(&key, e))?;

            if found.is_some() {
                debug!("Resolved original of {} @ {}", image_id, key);
                return Ok(Some(ext.to_string()));
            }
        }

        Ok(None)
    }

    pub(crate) async fn sign(&self, key: &str) -> Result<String> {
        self.storage
            .signed_url(key, self.config.url_expiration())
            .await
            .map_err(|e| ImageError::download(key, e))
    }

    /// Signs a fresh URL for every stored variant of the image.
    pub(crate) async fn sign_variants(&self, image_id: Uuid, ext: &str) -> Result<ImageUrls> {
        let keys: Vec<(ImageSize, String)> = self
            .config
            .stored_sizes()
            .into_iter()
            .map(|size| (size, self.layout.derive_key(image_id, size, ext)))
            .collect();

        self.sign_keys(keys.iter().map(|(size, key)| (*size, key.as_str())))
            .await
    }

    async fn sign_keys<'a>(&self, keys: impl Iterator<Item = (ImageSize, &'a str)>) -> Result<ImageUrls> {
        let signed = try_join_all(keys.map(|(size, key)| async move {
            self.sign(key).await.map(|url| (size, url))
        }))
        .await?;

        Ok(signed.into_iter().collect())
    }

    /// Writes every object, waiting for all writes to settle before
    /// reporting the first failure so no write is still in flight
    /// when the caller cleans up.
    async fn store_all<'a>(&self, objects: impl Iterator<Item = &'a PendingObject>) -> Result<()> {
        let results = join_all(objects.map(|obj| async move {
            self.storage
                .store(&obj.key, &obj.content_type, obj.data.clone())
                .await
                .map_err(|e| ImageError::upload(&obj.key, e))
        }))
        .await;

        results.into_iter().collect::<Result<Vec<()>>>()?;
        Ok(())
    }

    async fn store_metadata(&self, key: &str, metadata: &ImageMetadata) -> Result<()> {
        let data = serde_json::to_vec(metadata).map_err(|e| ImageError::upload(key, e.into()))?;
        self.storage
            .store(key, METADATA_CONTENT_TYPE, Bytes::from(data))
            .await
            .map_err(|e| ImageError::upload(key, e))
    }

    /// Best-effort removal of a failed upload's objects.
    async fn cleanup(&self, keys: &[String]) {
        let results = join_all(keys.iter().map(|key| self.storage.delete(key))).await;
        for (key, result) in keys.iter().zip(results) {
            if let Err(e) = result {
                warn!("Failed to clean up {} after a failed upload: {}", key, e);
            }
        }
    }
}
