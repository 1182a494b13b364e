use image::DynamicImage;

use crate::config::ResizingConfig;

/// Fits the image inside the configured box keeping its aspect ratio.
///
/// Images already inside the box are returned as-is, we never enlarge.
pub fn resize(cfg: ResizingConfig, img: &DynamicImage) -> DynamicImage {
    if img.width() <= cfg.width && img.height() <= cfg.height {
        return img.clone();
    }

    img.resize(cfg.width, cfg.height, cfg.filter.into())
}
