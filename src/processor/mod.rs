use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use image::DynamicImage;

use crate::config::{ResizingConfig, RuntimeConfig};
use crate::error::{ImageError, Result, ValidationError};
use crate::models::{ImageSize, ImageUpload};

mod encoder;
mod resizer;
mod svg;

pub use encoder::{encode_to, OutputFormat};
pub use resizer::resize;
pub use svg::rasterize;

/// How an original is decoded before it is resized.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SourceFormat {
    /// Anything the `image` crate can detect from the data itself.
    Raster,

    /// An SVG document, rendered to pixels first.
    Svg,
}

impl SourceFormat {
    pub fn from_extension(ext: &str) -> Self {
        if ext.trim_start_matches('.').eq_ignore_ascii_case("svg") {
            Self::Svg
        } else {
            Self::Raster
        }
    }

    pub fn decode(&self, data: &[u8]) -> anyhow::Result<DynamicImage> {
        match self {
            Self::Raster => Ok(image::load_from_memory(data)?),
            Self::Svg => rasterize(data),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub size: ImageSize,
    pub format: OutputFormat,
    pub buff: Bytes,
}

/// Rejects uploads before any decoding or storage work happens.
pub fn validate_upload(cfg: &RuntimeConfig, upload: &ImageUpload) -> Result<()> {
    if !cfg.is_allowed_mime_type(&upload.mime_type) {
        return Err(ValidationError::UnsupportedFileType(upload.mime_type.clone()).into());
    }

    let size = upload.size.max(upload.data.len());
    if size > cfg.max_upload_size {
        return Err(ValidationError::FileSizeExceeded {
            size,
            max: cfg.max_upload_size,
        }
        .into());
    }

    Ok(())
}

/// Produces every configured variant of one original.
#[derive(Debug, Clone)]
pub struct VariantProducer {
    presets: Arc<BTreeMap<ImageSize, ResizingConfig>>,
}

impl VariantProducer {
    pub fn new(presets: BTreeMap<ImageSize, ResizingConfig>) -> Self {
        Self {
            presets: Arc::new(presets),
        }
    }

    /// Decodes the original and resizes + encodes each preset in parallel
    /// on the rayon pool.
    ///
    /// This blocks until every variant is done and so must not be
    /// called from an async worker directly.
    pub fn produce(
        &self,
        data: &[u8],
        source: SourceFormat,
        format: OutputFormat,
    ) -> Result<BTreeMap<ImageSize, EncodedImage>> {
        let original_image = source.decode(data).map_err(|source| ImageError::Processing {
            variant: ImageSize::Original,
            source,
        })?;
        let original_image = Arc::new(original_image);

        let (tx, rx) = crossbeam::channel::bounded(self.presets.len().max(1));
        for (size, cfg) in self.presets.iter() {
            let size = *size;
            let cfg = *cfg;
            let local_tx = tx.clone();
            let local = original_image.clone();
            rayon::spawn(move || {
                let result = produce_one(size, cfg, format, &local);

                // The receiver only goes away once it has seen a failure.
                let _ = local_tx.send(result);
            });
        }

        // Needed to prevent deadlock.
        drop(tx);

        let mut finished = BTreeMap::new();
        while let Ok(encoded) = rx.recv() {
            let encoded = encoded?;
            finished.insert(encoded.size, encoded);
        }

        Ok(finished)
    }
}

fn produce_one(
    size: ImageSize,
    cfg: ResizingConfig,
    format: OutputFormat,
    img: &DynamicImage,
) -> Result<EncodedImage> {
    let resized = resize(cfg, img);
    let buff = encode_to(&resized, format, cfg.quality)
        .map_err(|source| ImageError::Processing { variant: size, source })?;

    Ok(EncodedImage { size, format, buff })
}
