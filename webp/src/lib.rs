use image::DynamicImage;
use libwebp_sys::*;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;

/// The reason libwebp refused to encode an image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EncodeError {
    /// The image has a zero or overly large dimension.
    InvalidDimensions { width: u32, height: u32 },

    /// The quality factor was outside of `0.0..=100.0`.
    InvalidQuality(f32),

    /// libwebp returned an empty buffer.
    EncodingFailed,
}

impl Display for EncodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDimensions { width, height } => {
                write!(f, "cannot encode a {}x{} image as webp", width, height)
            },
            Self::InvalidQuality(quality) => {
                write!(f, "webp quality {} is not within 0.0 and 100.0", quality)
            },
            Self::EncodingFailed => write!(f, "libwebp failed to encode the image"),
        }
    }
}

impl std::error::Error for EncodeError {}

/// The largest dimension libwebp accepts.
pub const MAX_DIMENSION: u32 = 16383;

#[derive(Copy, Clone)]
pub enum PixelLayout {
    RGB,
    RGBA,
}

pub struct Encoder {
    layout: PixelLayout,
    image: Vec<u8>,
    width: u32,
    height: u32,
}

impl Encoder {
    /// Creates a new encoder from the given image.
    ///
    /// Images are converted to 8 bit RGB, or RGBA if the source
    /// carries an alpha channel.
    pub fn from_image(image: &DynamicImage) -> Self {
        if image.color().has_alpha() {
            let buffer = image.to_rgba8();
            Self {
                width: buffer.width(),
                height: buffer.height(),
                image: buffer.into_raw(),
                layout: PixelLayout::RGBA,
            }
        } else {
            let buffer = image.to_rgb8();
            Self {
                width: buffer.width(),
                height: buffer.height(),
                image: buffer.into_raw(),
                layout: PixelLayout::RGB,
            }
        }
    }

    /// Encode the image with the given quality.
    /// The image quality must be between 0.0 and 100.0 inclusive for minimal
    /// and maximal quality respectively.
    pub fn encode(&self, quality: f32) -> Result<WebPMemory, EncodeError> {
        if !(0.0..=100.0).contains(&quality) {
            return Err(EncodeError::InvalidQuality(quality));
        }

        self.check_dimensions()?;
        unsafe { encode(&self.image, self.layout, self.width, self.height, quality) }
    }

    /// Encode the image losslessly.
    pub fn encode_lossless(&self) -> Result<WebPMemory, EncodeError> {
        self.check_dimensions()?;
        unsafe { encode(&self.image, self.layout, self.width, self.height, -1.0) }
    }

    fn check_dimensions(&self) -> Result<(), EncodeError> {
        let invalid = self.width == 0
            || self.height == 0
            || self.width > MAX_DIMENSION
            || self.height > MAX_DIMENSION;

        if invalid {
            Err(EncodeError::InvalidDimensions {
                width: self.width,
                height: self.height,
            })
        } else {
            Ok(())
        }
    }
}

unsafe fn encode(
    image: &[u8],
    layout: PixelLayout,
    width: u32,
    height: u32,
    quality: f32,
) -> Result<WebPMemory, EncodeError> {
    let width = width as _;
    let height = height as _;
    let mut buffer = std::ptr::null_mut::<u8>();

    let len = match layout {
        PixelLayout::RGB if quality < 0.0 => {
            let stride = width * 3;
            WebPEncodeLosslessRGB(image.as_ptr(), width, height, stride, &mut buffer as *mut _)
        },
        PixelLayout::RGB => {
            let stride = width * 3;
            WebPEncodeRGB(image.as_ptr(), width, height, stride, quality, &mut buffer as *mut _)
        },
        PixelLayout::RGBA if quality < 0.0 => {
            let stride = width * 4;
            WebPEncodeLosslessRGBA(image.as_ptr(), width, height, stride, &mut buffer as *mut _)
        },
        PixelLayout::RGBA => {
            let stride = width * 4;
            WebPEncodeRGBA(image.as_ptr(), width, height, stride, quality, &mut buffer as *mut _)
        },
    };

    if len == 0 || buffer.is_null() {
        if !buffer.is_null() {
            WebPFree(buffer as _);
        }
        return Err(EncodeError::EncodingFailed);
    }

    Ok(WebPMemory(buffer, len))
}

/// This struct represents a safe wrapper around memory owned by libwebp.
/// Its data contents can be accessed through the Deref trait.
pub struct WebPMemory(pub(crate) *mut u8, pub(crate) usize);

unsafe impl Send for WebPMemory {}

impl Debug for WebPMemory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebpMemory").field("len", &self.1).finish()
    }
}

impl Drop for WebPMemory {
    fn drop(&mut self) {
        unsafe { WebPFree(self.0 as _) }
    }
}

impl Deref for WebPMemory {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        unsafe { std::slice::from_raw_parts(self.0, self.1) }
    }
}
