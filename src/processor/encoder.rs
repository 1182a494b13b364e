use std::io::Cursor;

use bytes::Bytes;
use image::{DynamicImage, ImageOutputFormat};

/// The formats variants can be re-encoded in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl OutputFormat {
    /// Picks the encoder for an original's extension, falling back
    /// to JPEG for anything we do not re-encode natively.
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Self::Jpeg,
            "png" => Self::Png,
            "webp" => Self::WebP,
            "gif" => Self::Gif,
            _ => Self::Jpeg,
        }
    }

    #[inline]
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }

    #[inline]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }
}

/// Encodes the image, `quality` only applies to the lossy encoders.
pub fn encode_to(img: &DynamicImage, format: OutputFormat, quality: u8) -> anyhow::Result<Bytes> {
    let mut buff = Cursor::new(Vec::new());
    match format {
        OutputFormat::WebP => {
            let encoded = webp::Encoder::from_image(img).encode(quality as f32)?;
            return Ok(Bytes::copy_from_slice(&encoded));
        },
        // JPEG has no alpha channel.
        OutputFormat::Jpeg => {
            DynamicImage::ImageRgb8(img.to_rgb8()).write_to(&mut buff, ImageOutputFormat::Jpeg(quality))?
        },
        OutputFormat::Png => img.write_to(&mut buff, ImageOutputFormat::Png)?,
        OutputFormat::Gif => img.write_to(&mut buff, ImageOutputFormat::Gif)?,
    }

    Ok(Bytes::from(buff.into_inner()))
}
