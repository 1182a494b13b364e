use futures::future::join_all;
use tracing::instrument;
use uuid::Uuid;

use crate::controller::ImageController;
use crate::error::{ImageError, Result};
use crate::layouts::Layout;
use crate::models::{ImageList, ImageSize, ImageUrls, UploadResult};

/// Served when the original's details cannot be looked up.
pub const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// The 1-indexed window of `items` for the given page.
///
/// Pages past the end yield an empty slice.
pub fn paginate<T>(items: &[T], page: usize, limit: usize) -> &[T] {
    let page = page.max(1);
    let limit = limit.max(1);

    let start = (page - 1).saturating_mul(limit);
    if start >= items.len() {
        return &[];
    }

    let end = start.saturating_add(limit).min(items.len());
    &items[start..end]
}

#[inline]
pub fn total_pages(total: usize, limit: usize) -> usize {
    let limit = limit.max(1);
    (total + limit - 1) / limit
}

impl ImageController {
    /// Enumerates stored images a page at a time.
    ///
    /// Every image is one delimiter group directly below the layout's
    /// listing prefix, the groups are paged in the order the store
    /// returns them. A failure looking up the details of a single item
    /// degrades that item rather than the page.
    #[instrument(skip(self))]
    pub async fn get_images_list(&self, page: Option<usize>, limit: Option<usize>) -> Result<ImageList> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(self.config.default_page_size).max(1);

        let prefix = self.layout.listing_prefix();
        let listing = self
            .storage
            .list(&prefix, Some("/"))
            .await
            .map_err(|e| ImageError::list(&prefix, e))?;

        let image_ids: Vec<Uuid> = listing
            .common_prefixes
            .iter()
            .filter_map(|group| {
                let image_id = self.layout.image_id_from_prefix(group);
                if image_id.is_none() {
                    debug!("Skipping foreign prefix {} while listing", group);
                }
                image_id
            })
            .collect();

        let total = image_ids.len();
        let window = paginate(&image_ids, page, limit);
        let items = join_all(window.iter().map(|image_id| self.describe(*image_id))).await;

        Ok(ImageList {
            items,
            total,
            page,
            limit,
            total_pages: total_pages(total, limit),
        })
    }

    /// Builds the listing entry for one image, never failing.
    async fn describe(&self, image_id: Uuid) -> UploadResult {
        let base = self.layout.base_prefix(image_id);

        match self.metadata(image_id).await {
            Ok(Some(metadata)) if self.is_complete(&metadata) => {
                let urls = self.try_sign_variants(image_id, &metadata.extension).await;
                return UploadResult {
                    id: image_id,
                    key: base,
                    original_filename: metadata.original_name,
                    mime_type: metadata.mime_type,
                    size: metadata.sizes.get(&ImageSize::Original).copied().unwrap_or_default(),
                    urls,
                };
            },
            Ok(_) => {},
            Err(e) => warn!("Failed to read the metadata record of {}: {}", image_id, e),
        }

        let ext = match self.probe_extension(image_id).await {
            Ok(ext) => ext,
            Err(e) => {
                warn!("Failed to resolve the original of {}: {}", image_id, e);
                None
            },
        };

        let (mime_type, size, urls) = match ext.as_deref() {
            Some(ext) => {
                let key = self.layout.derive_key(image_id, ImageSize::Original, ext);
                let (mime_type, size) = match self.storage.head(&key).await {
                    Ok(Some(info)) => (info.content_type, info.size),
                    Ok(None) => (None, 0),
                    Err(e) => {
                        warn!("Failed to look up details of {}: {}", key, e);
                        (None, 0)
                    },
                };
                (mime_type, size, self.try_sign_variants(image_id, ext).await)
            },
            None => (None, 0, ImageUrls::new()),
        };

        UploadResult {
            id: image_id,
            key: base,
            original_filename: format!("{}{}", image_id, ext.as_deref().unwrap_or_default()),
            mime_type: mime_type.unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string()),
            size,
            urls,
        }
    }

    async fn try_sign_variants(&self, image_id: Uuid, ext: &str) -> ImageUrls {
        match self.sign_variants(image_id, ext).await {
            Ok(urls) => urls,
            Err(e) => {
                warn!("Failed to sign URLs for {}: {}", image_id, e);
                ImageUrls::new()
            },
        }
    }
}
