use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};

use crate::storage::{ObjectInfo, ObjectListing, StorageBackend};

pub struct BlobStorageBackend {
    bucket: Bucket,
}

impl BlobStorageBackend {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        region: &str,
        endpoint: Option<&str>,
        access_key: &str,
        secret_key: &str,
        session_token: Option<&str>,
        path_style: bool,
        request_timeout: Option<Duration>,
    ) -> Result<Self> {
        let creds = Credentials::new(Some(access_key), Some(secret_key), None, session_token, None)?;
        let region = match endpoint {
            Some(endpoint) => Region::Custom {
                region: region.to_string(),
                endpoint: endpoint.to_string(),
            },
            None => region.parse()?,
        };

        let mut bucket = Bucket::new(name, region, creds)?;
        if path_style {
            bucket = bucket.with_path_style();
        }
        bucket.set_request_timeout(request_timeout);

        Ok(Self { bucket })
    }
}

/// Buckets may answer a missing key either with a 404 status or,
/// with `fail-on-err` enabled, with an error carrying the status.
#[inline]
fn is_missing(err: &S3Error) -> bool {
    matches!(err, S3Error::HttpFailWithBody(404, _))
}

#[inline]
fn check_status(code: u16, action: &str) -> Result<()> {
    if (200..300).contains(&code) {
        Ok(())
    } else {
        Err(anyhow!(
            "Remote storage bucket did not respond correctly to {}, expected status 2xx got {}",
            action,
            code,
        ))
    }
}

#[async_trait]
impl StorageBackend for BlobStorageBackend {
    async fn store(&self, key: &str, content_type: &str, data: Bytes) -> Result<()> {
        debug!("Storing image in bucket @ {}", key);
        let response = self
            .bucket
            .put_object_with_content_type(key, &data, content_type)
            .await?;

        check_status(response.status_code(), "put")
    }

    async fn fetch(&self, key: &str) -> Result<Option<Bytes>> {
        debug!("Retrieving image in bucket @ {}", key);
        let response = match self.bucket.get_object(key).await {
            Ok(response) => response,
            Err(ref e) if is_missing(e) => return Ok(None),
            Err(other) => return Err(other.into()),
        };

        let code = response.status_code();
        if code == 404 {
            return Ok(None);
        }

        check_status(code, "get")?;
        Ok(Some(Bytes::copy_from_slice(response.as_slice())))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectInfo>> {
        debug!("Inspecting image in bucket @ {}", key);
        let (head, code) = match self.bucket.head_object(key).await {
            Ok(result) => result,
            Err(ref e) if is_missing(e) => return Ok(None),
            Err(other) => return Err(other.into()),
        };

        if code == 404 {
            return Ok(None);
        }

        check_status(code, "head")?;
        Ok(Some(ObjectInfo {
            content_type: head.content_type,
            size: head.content_length.unwrap_or_default().max(0) as u64,
        }))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        debug!("Purging file in bucket @ {}", key);
        match self.bucket.delete_object(key).await {
            Ok(response) if response.status_code() == 404 => Ok(()),
            Ok(response) => check_status(response.status_code(), "delete"),
            Err(ref e) if is_missing(e) => Ok(()),
            Err(other) => Err(other.into()),
        }
    }

    async fn list(&self, prefix: &str, delimiter: Option<&str>) -> Result<ObjectListing> {
        debug!("Listing bucket @ {:?} (delimiter: {:?})", prefix, delimiter);
        let pages = self
            .bucket
            .list(prefix.to_string(), delimiter.map(|v| v.to_string()))
            .await?;

        let mut listing = ObjectListing::default();
        for page in pages {
            listing
                .keys
                .extend(page.contents.into_iter().map(|obj| obj.key));
            listing.common_prefixes.extend(
                page.common_prefixes
                    .into_iter()
                    .flatten()
                    .map(|p| p.prefix),
            );
        }

        Ok(listing)
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> Result<String> {
        let expiry_secs = u32::try_from(expires_in.as_secs())?;
        let url = self.bucket.presign_get(key, expiry_secs, None).await?;
        Ok(url)
    }
}
