use strum::{AsRefStr, Display};
use thiserror::Error;

use crate::models::ImageSize;

pub type Result<T> = std::result::Result<T, ImageError>;

/// Input was rejected before any object-store work took place.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unsupported image type: {0}")]
    UnsupportedFileType(String),

    #[error("file size exceeds limit ({size} bytes > {max} bytes)")]
    FileSizeExceeded { size: usize, max: usize },

    #[error("invalid image size: {0}")]
    InvalidImageSize(String),

    #[error("invalid image id: {0:?}")]
    InvalidImageId(String),
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to process image variant {variant}: {source}")]
    Processing {
        variant: ImageSize,
        #[source]
        source: anyhow::Error,
    },

    #[error("image not found: {0}")]
    NotFound(String),

    #[error("failed to upload image object {key}")]
    UploadFailed {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to retrieve image object {key}")]
    DownloadFailed {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to delete image object {key}")]
    DeleteFailed {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to list images under {prefix:?}")]
    ListFailed {
        prefix: String,
        #[source]
        source: anyhow::Error,
    },
}

/// A flat description of an [ImageError] that can be reported
/// back to callers of the batch operations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Validation,
    Processing,
    NotFound,
    UploadFailed,
    DownloadFailed,
    DeleteFailed,
    ListFailed,

    /// The operation was never attempted because an earlier
    /// item in the batch failed.
    Aborted,
}

impl ImageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Processing { .. } => ErrorKind::Processing,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::UploadFailed { .. } => ErrorKind::UploadFailed,
            Self::DownloadFailed { .. } => ErrorKind::DownloadFailed,
            Self::DeleteFailed { .. } => ErrorKind::DeleteFailed,
            Self::ListFailed { .. } => ErrorKind::ListFailed,
        }
    }

    pub(crate) fn upload(key: impl Into<String>, source: anyhow::Error) -> Self {
        Self::UploadFailed { key: key.into(), source }
    }

    pub(crate) fn download(key: impl Into<String>, source: anyhow::Error) -> Self {
        Self::DownloadFailed { key: key.into(), source }
    }

    pub(crate) fn delete(key: impl Into<String>, source: anyhow::Error) -> Self {
        Self::DeleteFailed { key: key.into(), source }
    }

    pub(crate) fn list(prefix: impl Into<String>, source: anyhow::Error) -> Self {
        Self::ListFailed { prefix: prefix.into(), source }
    }
}
