use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use image::imageops;
use serde::Deserialize;

use crate::error::{ImageError, Result};
use crate::models::ImageSize;
use crate::storage::backends::BackendConfigs;

/// The longest lifetime an S3 presigned URL may have.
pub const MAX_URL_EXPIRATION_SECS: u32 = 3600 * 24 * 7;

pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// How many full-size files a batch upload body may carry by default.
pub const DEFAULT_BATCH_UPLOAD_FILES: usize = 5;

pub const DEFAULT_PAGE_SIZE: usize = 10;

pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "image/bmp",
    "image/tiff",
];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    /// `[folder/]{id}/{size}/{id}.{ext}`, no metadata record.
    ///
    /// The original extension is recovered by probing.
    Path,

    /// `[folder/]images/{id}/{size}.webp` alongside a `metadata.json` record.
    Flat,
}

impl Default for LayoutKind {
    fn default() -> Self {
        Self::Path
    }
}

/// What a batch delete does once one of its items fails.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchPolicy {
    /// Attempt every item and report each failure.
    Continue,

    /// Stop issuing new operations after the first failure.
    Abort,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self::Continue
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizingFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl Default for ResizingFilter {
    fn default() -> Self {
        Self::Lanczos3
    }
}

impl From<ResizingFilter> for imageops::FilterType {
    fn from(filter: ResizingFilter) -> Self {
        match filter {
            ResizingFilter::Nearest => Self::Nearest,
            ResizingFilter::Triangle => Self::Triangle,
            ResizingFilter::CatmullRom => Self::CatmullRom,
            ResizingFilter::Gaussian => Self::Gaussian,
            ResizingFilter::Lanczos3 => Self::Lanczos3,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
pub struct ResizingConfig {
    /// The maximum width of the variant.
    pub width: u32,

    /// The maximum height of the variant.
    pub height: u32,

    /// The encoder quality from 1 to 100.
    pub quality: u8,

    #[serde(default)]
    /// The resampling filter used when shrinking.
    ///
    /// Defaults to `lanczos3`.
    pub filter: ResizingFilter,
}

impl ResizingConfig {
    pub const fn new(width: u32, height: u32, quality: u8) -> Self {
        Self {
            width,
            height,
            quality,
            filter: ResizingFilter::Lanczos3,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    /// The set storage backend configuration.
    pub backend: BackendConfigs,

    #[serde(default)]
    /// The key layout used within the bucket.
    ///
    /// See `config::LayoutKind` for more.
    pub layout: LayoutKind,

    #[serde(default)]
    /// An optional folder every key is placed under.
    pub folder_path: Option<String>,

    #[serde(default = "default_url_expiration")]
    /// How long signed URLs stay valid for in seconds.
    ///
    /// Defaults to one week, which is also the maximum.
    pub url_expiration_secs: u32,

    #[serde(default = "default_page_size")]
    /// The page size used when listing without an explicit limit.
    pub default_page_size: usize,

    #[serde(default = "default_max_upload_size")]
    /// The largest accepted upload in bytes.
    ///
    /// Defaults to 10 MiB.
    pub max_upload_size: usize,

    #[serde(default)]
    /// The largest accepted batch upload request body in bytes.
    ///
    /// Defaults to `max_upload_size` times five. Every file in the
    /// batch is still held to `max_upload_size` on its own.
    pub max_batch_upload_size: Option<usize>,

    #[serde(default = "default_allowed_mime_types")]
    /// The MIME types accepted on upload.
    pub allowed_mime_types: BTreeSet<String>,

    #[serde(default = "default_sizes")]
    /// The resized variants produced for every upload.
    pub sizes: BTreeMap<ImageSize, ResizingConfig>,

    #[serde(default)]
    /// Behaviour of batch deletes when an item fails.
    pub batch_policy: BatchPolicy,
}

impl RuntimeConfig {
    pub fn from_file(file: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(file)?;
        Ok(Self::from_yaml(&data)?)
    }

    pub fn from_yaml(data: &str) -> anyhow::Result<Self> {
        let mut cfg = serde_yaml::from_str::<Self>(data)?;
        cfg.normalise();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks everything that would otherwise surface as a
    /// confusing runtime failure.
    pub fn validate(&self) -> Result<()> {
        self.backend.validate()?;

        if self.url_expiration_secs == 0 || self.url_expiration_secs > MAX_URL_EXPIRATION_SECS {
            return Err(ImageError::Configuration(format!(
                "url_expiration_secs must be between 1 and {}, got {}",
                MAX_URL_EXPIRATION_SECS, self.url_expiration_secs,
            )));
        }

        if self.default_page_size == 0 {
            return Err(ImageError::Configuration("default_page_size must be at least 1".into()));
        }

        if self.max_upload_size == 0 {
            return Err(ImageError::Configuration("max_upload_size must be at least 1".into()));
        }

        if let Some(limit) = self.max_batch_upload_size {
            if limit < self.max_upload_size {
                return Err(ImageError::Configuration(format!(
                    "max_batch_upload_size must be at least max_upload_size ({}), got {}",
                    self.max_upload_size, limit,
                )));
            }
        }

        if self.allowed_mime_types.is_empty() {
            return Err(ImageError::Configuration("allowed_mime_types cannot be empty".into()));
        }

        for mime_type in self.allowed_mime_types.iter() {
            if mime_type.parse::<mime::Mime>().is_err() {
                return Err(ImageError::Configuration(format!(
                    "allowed_mime_types contains an invalid MIME type {:?}",
                    mime_type
                )));
            }
        }

        if self.sizes.contains_key(&ImageSize::Original) {
            return Err(ImageError::Configuration(
                "the original variant is stored untouched and cannot be given a size".into(),
            ));
        }

        for (size, cfg) in self.sizes.iter() {
            if cfg.width == 0 || cfg.height == 0 {
                return Err(ImageError::Configuration(format!(
                    "size {} must have a non-zero width and height",
                    size
                )));
            }

            if cfg.quality == 0 || cfg.quality > 100 {
                return Err(ImageError::Configuration(format!(
                    "size {} must have a quality between 1 and 100, got {}",
                    size, cfg.quality
                )));
            }
        }

        Ok(())
    }

    /// Lowercases MIME types and strips slashes around the folder path.
    pub fn normalise(&mut self) {
        self.allowed_mime_types = self
            .allowed_mime_types
            .iter()
            .map(|v| v.trim().to_ascii_lowercase())
            .collect();

        self.folder_path = self
            .folder_path
            .take()
            .map(|v| v.trim_matches('/').to_string())
            .filter(|v| !v.is_empty());
    }

    #[inline]
    pub fn url_expiration(&self) -> Duration {
        Duration::from_secs(self.url_expiration_secs as u64)
    }

    /// The variants stored for every image, original first.
    pub fn stored_sizes(&self) -> Vec<ImageSize> {
        std::iter::once(ImageSize::Original)
            .chain(self.sizes.keys().copied())
            .collect()
    }

    #[inline]
    pub fn batch_upload_limit(&self) -> usize {
        self.max_batch_upload_size
            .unwrap_or_else(|| self.max_upload_size.saturating_mul(DEFAULT_BATCH_UPLOAD_FILES))
    }

    pub fn is_allowed_mime_type(&self, mime_type: &str) -> bool {
        self.allowed_mime_types
            .contains(&mime_type.trim().to_ascii_lowercase())
    }
}

const fn default_url_expiration() -> u32 {
    MAX_URL_EXPIRATION_SECS
}

const fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

const fn default_max_upload_size() -> usize {
    DEFAULT_MAX_UPLOAD_SIZE
}

fn default_allowed_mime_types() -> BTreeSet<String> {
    DEFAULT_ALLOWED_MIME_TYPES
        .iter()
        .map(|v| v.to_string())
        .collect()
}

pub fn default_sizes() -> BTreeMap<ImageSize, ResizingConfig> {
    let mut sizes = BTreeMap::new();
    sizes.insert(ImageSize::Thumb, ResizingConfig::new(100, 100, 80));
    sizes.insert(ImageSize::Sm, ResizingConfig::new(300, 300, 80));
    sizes.insert(ImageSize::Md, ResizingConfig::new(600, 600, 85));
    sizes.insert(ImageSize::Lg, ResizingConfig::new(900, 900, 85));
    sizes.insert(ImageSize::Xl, ResizingConfig::new(1200, 1200, 90));
    sizes
}
