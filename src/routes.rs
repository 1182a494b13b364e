use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use poem::error::{BadRequest, ResponseError};
use poem::http::{Method, StatusCode};
use poem::web::headers::{ContentLength, HeaderMapExt};
use poem::{Body, Endpoint, Middleware, Request, Result};
use poem_openapi::param::{Header, Path, Query};
use poem_openapi::payload::{Binary, Json};
use poem_openapi::types::multipart::Upload;
use poem_openapi::{Multipart, Object, OpenApi};
use tokio::io::AsyncReadExt;
use uuid::Uuid;

use crate::config::RuntimeConfig;
use crate::controller::ImageController;
use crate::error::{ErrorKind, ImageError, ValidationError};
use crate::listing::FALLBACK_MIME_TYPE;
use crate::models::{BatchFailure, ImageList, ImageSize, ImageUpload, ImageUrls, UploadResult};

impl ResponseError for ImageError {
    fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Processing => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Caps the request body of the upload routes before it is buffered.
///
/// A declared `content-length` over the limit is refused outright,
/// undeclared or understated bodies are cut off one byte past the limit
/// so the handler sees an oversized upload instead of reading on.
/// Every other route passes through untouched.
pub struct UploadLimit {
    single: usize,
    batch: usize,
}

impl UploadLimit {
    pub fn new(single: usize, batch: usize) -> Self {
        Self { single, batch }
    }

    pub fn from_config(cfg: &RuntimeConfig) -> Self {
        Self::new(cfg.max_upload_size, cfg.batch_upload_limit())
    }
}

impl<E: Endpoint> Middleware<E> for UploadLimit {
    type Output = UploadLimitEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        UploadLimitEndpoint {
            inner: ep,
            single: self.single,
            batch: self.batch,
        }
    }
}

pub struct UploadLimitEndpoint<E> {
    inner: E,
    single: usize,
    batch: usize,
}

impl<E> UploadLimitEndpoint<E> {
    fn limit_for(&self, req: &Request) -> Option<usize> {
        if req.method() != Method::POST {
            return None;
        }

        let path = req.uri().path().trim_end_matches('/');
        if path.ends_with("/images/batch") {
            Some(self.batch)
        } else if path.ends_with("/images") {
            Some(self.single)
        } else {
            None
        }
    }
}

#[poem::async_trait]
impl<E: Endpoint> Endpoint for UploadLimitEndpoint<E> {
    type Output = E::Output;

    async fn call(&self, mut req: Request) -> Result<Self::Output> {
        let limit = match self.limit_for(&req) {
            Some(limit) => limit,
            None => return self.inner.call(req).await,
        };

        if let Some(declared) = req.headers().typed_get::<ContentLength>() {
            let size = usize::try_from(declared.0).unwrap_or(usize::MAX);
            if size > limit {
                debug!("Refusing a {} byte upload body, limit is {}", size, limit);
                return Err(ImageError::from(ValidationError::FileSizeExceeded { size, max: limit }).into());
            }
        }

        let body = req.take_body().into_async_read();
        req.set_body(Body::from_async_read(body.take((limit as u64).saturating_add(1))));

        self.inner.call(req).await
    }
}

fn parse_image_id(raw: &str) -> std::result::Result<Uuid, ImageError> {
    Uuid::parse_str(raw).map_err(|_| ValidationError::InvalidImageId(raw.to_string()).into())
}

fn to_labelled(urls: ImageUrls) -> HashMap<String, String> {
    urls.into_iter()
        .map(|(size, url)| (size.to_string(), url))
        .collect()
}

#[derive(Object, Debug)]
pub struct UploadedImage {
    /// The unique ID of the image.
    id: String,

    /// The prefix shared by every stored object of this image.
    key: String,
    original_filename: String,
    mime_type: String,

    /// The size of the original upload in bytes.
    size: u64,

    /// Signed, expiring URLs keyed by size label.
    urls: HashMap<String, String>,
}

impl From<UploadResult> for UploadedImage {
    fn from(res: UploadResult) -> Self {
        Self {
            id: res.id.to_string(),
            key: res.key,
            original_filename: res.original_filename,
            mime_type: res.mime_type,
            size: res.size,
            urls: to_labelled(res.urls),
        }
    }
}

#[derive(Object, Debug)]
pub struct ImageUrl {
    url: String,
}

#[derive(Object, Debug)]
pub struct ImageUrlSet {
    urls: HashMap<String, String>,
}

#[derive(Object, Debug)]
pub struct ImagePage {
    items: Vec<UploadedImage>,
    total: u64,
    page: u64,
    limit: u64,
    total_pages: u64,
}

impl From<ImageList> for ImagePage {
    fn from(list: ImageList) -> Self {
        Self {
            items: list.items.into_iter().map(UploadedImage::from).collect(),
            total: list.total as u64,
            page: list.page as u64,
            limit: list.limit as u64,
            total_pages: list.total_pages as u64,
        }
    }
}

#[derive(Object, Debug)]
pub struct DeletedImage {
    id: String,
}

#[derive(Object, Debug)]
pub struct DeleteBatch {
    /// The IDs of the images to remove.
    ids: Vec<String>,
}

#[derive(Object, Debug)]
pub struct BatchFailureInfo {
    id: String,

    /// A stable label for the failure, `aborted` marks items never attempted.
    kind: String,
    message: String,
}

impl<T: ToString> From<BatchFailure<T>> for BatchFailureInfo {
    fn from(failure: BatchFailure<T>) -> Self {
        Self {
            id: failure.id.to_string(),
            kind: failure.kind.to_string(),
            message: failure.message,
        }
    }
}

#[derive(Object, Debug)]
pub struct BatchUploadReport {
    succeeded: Vec<UploadedImage>,
    failed: Vec<BatchFailureInfo>,
}

#[derive(Object, Debug)]
pub struct BatchDeleteReport {
    succeeded: Vec<String>,
    failed: Vec<BatchFailureInfo>,
}

#[derive(Multipart, Debug)]
pub struct UploadBatch {
    files: Vec<Upload>,
}

pub struct ImageApi {
    controller: Arc<ImageController>,
}

impl ImageApi {
    pub fn new(controller: Arc<ImageController>) -> Self {
        Self { controller }
    }
}

#[OpenApi]
impl ImageApi {
    /// Upload Image
    ///
    /// Upload an image, producing every configured size variant.
    ///
    /// The raw image is sent as the request body, the MIME type the client
    /// declares is checked against the allowed types before any work happens.
    #[oai(path = "/images", method = "post")]
    pub async fn upload_image(
        &self,
        /// The original name of the file, its extension decides how the
        /// image is stored when it is one we recognise.
        filename: Query<String>,

        /// The MIME type of the upload.
        mime_type: Query<String>,

        #[oai(name = "content-length")] content_length: Header<usize>,

        file: Binary<Vec<u8>>,
    ) -> Result<Json<UploadedImage>> {
        let mut upload = ImageUpload::new(file.0, filename.0, mime_type.0);
        upload.size = content_length.0;

        let uploaded = self.controller.upload_image(upload).await?;
        Ok(Json(uploaded.into()))
    }

    /// Upload Images
    ///
    /// Upload several images at once, each one succeeds or fails on its own.
    #[oai(path = "/images/batch", method = "post")]
    pub async fn upload_multiple_images(&self, batch: UploadBatch) -> Result<Json<BatchUploadReport>> {
        let mut uploads = Vec::with_capacity(batch.files.len());
        for file in batch.files {
            let name = file.file_name().unwrap_or_default().to_string();
            let mime_type = file.content_type().unwrap_or(FALLBACK_MIME_TYPE).to_string();
            let data = file.into_vec().await.map_err(BadRequest)?;
            uploads.push(ImageUpload::new(data, name, mime_type));
        }

        let res = self.controller.upload_multiple_images(uploads).await;
        Ok(Json(BatchUploadReport {
            succeeded: res.succeeded.into_iter().map(UploadedImage::from).collect(),
            failed: res.failed.into_iter().map(BatchFailureInfo::from).collect(),
        }))
    }

    /// List Images
    ///
    /// Page through every stored image, pages start at 1.
    #[oai(path = "/images", method = "get")]
    pub async fn get_images_list(
        &self,
        page: Query<Option<usize>>,
        limit: Query<Option<usize>>,
    ) -> Result<Json<ImagePage>> {
        let list = self.controller.get_images_list(page.0, limit.0).await?;
        Ok(Json(list.into()))
    }

    /// Get Image URLs
    ///
    /// Mint a fresh signed URL for every stored size of the image.
    #[oai(path = "/images/:image_id", method = "get")]
    pub async fn get_image_urls(&self, image_id: Path<String>) -> Result<Json<ImageUrlSet>> {
        let image_id = parse_image_id(&image_id.0)?;
        let urls = self.controller.get_image_urls(image_id).await?;
        Ok(Json(ImageUrlSet {
            urls: to_labelled(urls),
        }))
    }

    /// Get Image URL
    ///
    /// Mint a fresh signed URL for a single size of the image.
    #[oai(path = "/images/:image_id/:size", method = "get")]
    pub async fn get_image_url(&self, image_id: Path<String>, size: Path<String>) -> Result<Json<ImageUrl>> {
        let image_id = parse_image_id(&image_id.0)?;
        let size = ImageSize::from_str(&size.0)
            .map_err(|_| ImageError::from(ValidationError::InvalidImageSize(size.0.clone())))?;

        let url = self.controller.get_image_url(image_id, size).await?;
        Ok(Json(ImageUrl { url }))
    }

    /// Delete Image
    ///
    /// Remove the image and every one of its stored sizes.
    #[oai(path = "/images/:image_id", method = "delete")]
    pub async fn delete_image(&self, image_id: Path<String>) -> Result<Json<DeletedImage>> {
        let image_id = parse_image_id(&image_id.0)?;
        self.controller.delete_image(image_id).await?;
        Ok(Json(DeletedImage {
            id: image_id.to_string(),
        }))
    }

    /// Delete Images
    ///
    /// Remove several images, how failures are handled depends on the
    /// configured batch policy.
    #[oai(path = "/images/delete", method = "post")]
    pub async fn delete_multiple_images(&self, batch: Json<DeleteBatch>) -> Result<Json<BatchDeleteReport>> {
        let image_ids = batch
            .0
            .ids
            .iter()
            .map(|raw| parse_image_id(raw))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let res = self.controller.delete_multiple_images(&image_ids).await;
        Ok(Json(BatchDeleteReport {
            succeeded: res.succeeded.iter().map(|id| id.to_string()).collect(),
            failed: res.failed.into_iter().map(BatchFailureInfo::from).collect(),
        }))
    }
}
