use anyhow::anyhow;
use image::{DynamicImage, RgbaImage};
use resvg::{tiny_skia, usvg};

/// The longest edge a vector original is rasterized at.
pub const MAX_RASTER_EDGE: u32 = 4096;

/// Renders an SVG document at its intrinsic size.
///
/// Documents larger than [MAX_RASTER_EDGE] on either side are scaled
/// down uniformly to fit. The result always carries an alpha channel.
pub fn rasterize(data: &[u8]) -> anyhow::Result<DynamicImage> {
    let tree = usvg::Tree::from_data(data, &usvg::Options::default())?;
    let size = tree.size().to_int_size();

    let longest = size.width().max(size.height());
    let scale = if longest > MAX_RASTER_EDGE {
        MAX_RASTER_EDGE as f32 / longest as f32
    } else {
        1.0
    };

    let width = ((size.width() as f32 * scale).round() as u32).max(1);
    let height = ((size.height() as f32 * scale).round() as u32).max(1);
    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| anyhow!("cannot allocate a {}x{} canvas", width, height))?;

    resvg::render(&tree, tiny_skia::Transform::from_scale(scale, scale), &mut pixmap.as_mut());

    // tiny-skia works in premultiplied alpha, `image` does not.
    let mut pixels = Vec::with_capacity(pixmap.pixels().len() * 4);
    for pixel in pixmap.pixels() {
        let color = pixel.demultiply();
        pixels.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }

    let buffer = RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| anyhow!("rendered canvas does not match {}x{}", width, height))?;

    Ok(DynamicImage::ImageRgba8(buffer))
}
