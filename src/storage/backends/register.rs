use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ImageError, Result};
use crate::StorageBackend;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendConfigs {
    BlobStorage {
        #[serde(default)]
        name: String,
        #[serde(default)]
        region: String,
        endpoint: Option<String>,
        #[serde(default)]
        access_key: String,
        #[serde(default)]
        secret_key: String,
        session_token: Option<String>,

        #[serde(default)]
        /// Address the bucket as `{endpoint}/{bucket}` instead of a subdomain.
        ///
        /// Most self-hosted S3 implementations require this.
        path_style: bool,

        /// The request timeout in seconds.
        request_timeout: Option<u64>,
    },
    Memory,
}

impl BackendConfigs {
    /// Ensures the connection parameters are present.
    pub fn validate(&self) -> Result<()> {
        if let Self::BlobStorage {
            name,
            region,
            access_key,
            secret_key,
            ..
        } = self
        {
            let required = [
                (region, "S3 region is required"),
                (name, "S3 bucket name is required"),
                (access_key, "AWS access key ID is required"),
                (secret_key, "AWS secret access key is required"),
            ];

            for (value, message) in required {
                if value.trim().is_empty() {
                    return Err(ImageError::Configuration(message.to_string()));
                }
            }
        }

        Ok(())
    }

    pub async fn connect(&self) -> Result<Arc<dyn StorageBackend>> {
        self.validate()?;

        match self {
            Self::BlobStorage {
                name,
                region,
                endpoint,
                access_key,
                secret_key,
                session_token,
                path_style,
                request_timeout,
            } => {
                let backend = super::BlobStorageBackend::new(
                    name,
                    region,
                    endpoint.as_deref(),
                    access_key,
                    secret_key,
                    session_token.as_deref(),
                    *path_style,
                    request_timeout.map(Duration::from_secs),
                )
                .map_err(|e| ImageError::Configuration(format!("invalid blob storage config: {}", e)))?;

                Ok(Arc::new(backend))
            },
            Self::Memory => Ok(Arc::new(super::MemoryBackend::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_are_rejected() {
        let yaml = "\
blobstorage:
  name: images
  region: us-east-1
  access_key: abc
";
        let cfg: BackendConfigs = serde_yaml::from_str(yaml).unwrap();
        match cfg.validate() {
            Err(ImageError::Configuration(msg)) => {
                assert_eq!(msg, "AWS secret access key is required")
            },
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_region_is_reported_first() {
        let cfg: BackendConfigs = serde_yaml::from_str("blobstorage: {}").unwrap();
        match cfg.validate() {
            Err(ImageError::Configuration(msg)) => assert_eq!(msg, "S3 region is required"),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_blob_storage() {
        let yaml = "\
blobstorage:
  name: images
  region: us-east-1
  endpoint: http://127.0.0.1:9000
  access_key: abc
  secret_key: def
  path_style: true
";
        let cfg: BackendConfigs = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.connect().await.is_ok());
    }
}
