use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use uuid::Uuid;

use crate::error::{ErrorKind, ImageError};

/// A rendition of a stored image.
///
/// `Original` is always the untouched upload, every other variant
/// is resized following the configured size table.
#[derive(
    Debug,
    Copy,
    Clone,
    Hash,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImageSize {
    Original,
    Thumb,
    Sm,
    Md,
    Lg,
    Xl,
}

impl ImageSize {
    /// The folder / label used for this variant in object keys.
    #[inline]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Thumb => "thumb",
            Self::Sm => "sm",
            Self::Md => "md",
            Self::Lg => "lg",
            Self::Xl => "xl",
        }
    }

    /// All variants that go through the resizer.
    pub fn resizable() -> impl Iterator<Item = ImageSize> {
        Self::iter().filter(|size| *size != Self::Original)
    }
}

/// Signed retrieval URLs keyed by variant.
pub type ImageUrls = BTreeMap<ImageSize, String>;

/// A file handed over by the upload transport.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub data: Bytes,
    pub original_name: String,
    pub mime_type: String,

    /// The length declared by the transport, this may differ
    /// from the buffer length if the client lied.
    pub size: usize,
}

impl ImageUpload {
    pub fn new(data: impl Into<Bytes>, original_name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        let data = data.into();
        Self {
            size: data.len(),
            data,
            original_name: original_name.into(),
            mime_type: mime_type.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadResult {
    pub id: Uuid,

    /// The base prefix shared by every object of this image.
    pub key: String,
    pub original_filename: String,
    pub mime_type: String,
    pub size: u64,
    pub urls: ImageUrls,
}

/// The record persisted alongside the variants in the flat layout.
///
/// Written once on upload and never modified afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageMetadata {
    pub id: Uuid,
    pub original_name: String,
    pub mime_type: String,

    /// The extension the original was stored with, including the leading dot.
    pub extension: String,

    /// Byte length of each stored variant.
    pub sizes: BTreeMap<ImageSize, u64>,
    pub created_at: DateTime<Utc>,

    /// The URLs minted at upload time. These expire, readers must re-sign.
    pub urls: ImageUrls,
}

impl ImageMetadata {
    /// A record is complete once it describes every variant we expect.
    pub fn covers(&self, expected: impl IntoIterator<Item = ImageSize>) -> bool {
        expected.into_iter().all(|size| self.sizes.contains_key(&size))
    }
}

#[derive(Debug, Clone)]
pub struct ImageList {
    pub items: Vec<UploadResult>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone)]
pub struct BatchFailure<T> {
    pub id: T,
    pub kind: ErrorKind,
    pub message: String,
}

impl<T> BatchFailure<T> {
    pub fn from_error(id: T, error: &ImageError) -> Self {
        Self {
            id,
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn aborted(id: T) -> Self {
        Self {
            id,
            kind: ErrorKind::Aborted,
            message: "not attempted after an earlier failure".to_string(),
        }
    }
}

/// The outcome of a batch operation, nothing is silently dropped.
#[derive(Debug, Clone)]
pub struct BatchResult<S, F = S> {
    pub succeeded: Vec<S>,
    pub failed: Vec<BatchFailure<F>>,
}

impl<S, F> Default for BatchResult<S, F> {
    fn default() -> Self {
        Self {
            succeeded: vec![],
            failed: vec![],
        }
    }
}

impl<S, F> BatchResult<S, F> {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
