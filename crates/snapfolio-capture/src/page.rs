// SPDX-License-Identifier: MIT
//
// Raster page buffer — one in-memory pixel buffer per logical document page,
// plus the pixel-to-point scale hint used later to size output pages.

use image::{DynamicImage, ImageFormat};
use snapfolio_core::SnapfolioError;
use snapfolio_core::error::Result;
use tracing::{debug, instrument};

/// A single raster page moving through the pipeline.
///
/// Each stage takes the page by value, transforms it, and hands a new page
/// downstream — buffers are never shared between stages, which keeps memory
/// bounded on large captures.
#[derive(Debug, Clone)]
pub struct RasterPage {
    image: DynamicImage,
    /// Device-independent points per pixel. A 300 DPI capture carries
    /// 72/300 = 0.24; the output page is sized as pixels × this factor.
    points_per_pixel: f32,
}

impl RasterPage {
    // -- Construction ---------------------------------------------------------

    /// Wrap an already-decoded image.
    pub fn new(image: DynamicImage, points_per_pixel: f32) -> Self {
        Self {
            image,
            points_per_pixel,
        }
    }

    /// Decode a page from a file on disk.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>, points_per_pixel: f32) -> Result<Self> {
        let image = image::open(path.as_ref()).map_err(|err| {
            SnapfolioError::Decode(format!(
                "failed to open image {}: {}",
                path.as_ref().display(),
                err
            ))
        })?;
        debug!(width = image.width(), height = image.height(), "Page image loaded");
        Ok(Self::new(image, points_per_pixel))
    }

    /// Decode a page from raw encoded bytes (JPEG, PNG, etc.).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8], points_per_pixel: f32) -> Result<Self> {
        let image = image::load_from_memory(data)
            .map_err(|err| SnapfolioError::Decode(format!("failed to decode image: {}", err)))?;
        Ok(Self::new(image, points_per_pixel))
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn points_per_pixel(&self) -> f32 {
        self.points_per_pixel
    }

    /// Page dimensions in output points (width, height).
    pub fn dimensions_pt(&self) -> (f32, f32) {
        (
            self.width() as f32 * self.points_per_pixel,
            self.height() as f32 * self.points_per_pixel,
        )
    }

    /// Borrow the underlying image.
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Consume the page and return the underlying image.
    pub fn into_image(self) -> DynamicImage {
        self.image
    }

    // -- Encoding -------------------------------------------------------------

    /// Encode as JPEG with the given quality, clamped into 1..=100 — options
    /// structs carry `quality` as a plain field, so the bound is enforced
    /// here at the encode site rather than trusted from the caller.
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>> {
        let quality = quality.clamp(1, 100);
        let mut buffer = Vec::new();
        let rgb = self.image.to_rgb8();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
        rgb.write_with_encoder(encoder)
            .map_err(|err| SnapfolioError::Encode(format!("JPEG encoding failed: {}", err)))?;
        Ok(buffer)
    }

    /// Encode as PNG.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        self.image
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|err| SnapfolioError::Encode(format!("PNG encoding failed: {}", err)))?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn test_page(w: u32, h: u32) -> RasterPage {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(w, h, Luma([128u8])));
        RasterPage::new(img, 0.24)
    }

    #[test]
    fn dimensions_in_points_use_the_hint() {
        let page = test_page(300, 600);
        let (w_pt, h_pt) = page.dimensions_pt();
        assert!((w_pt - 72.0).abs() < 1e-4);
        assert!((h_pt - 144.0).abs() < 1e-4);
    }

    #[test]
    fn jpeg_encoding_produces_a_decodable_image() {
        let page = test_page(40, 30);
        let bytes = page.to_jpeg_bytes(85).unwrap();
        let reloaded = RasterPage::from_bytes(&bytes, 0.24).unwrap();
        assert_eq!(reloaded.width(), 40);
        assert_eq!(reloaded.height(), 30);
    }

    /// `quality` reaches the encoder from a plain struct field, so values
    /// outside 1..=100 must be clamped rather than passed through.
    #[test]
    fn jpeg_quality_out_of_range_is_clamped() {
        let page = test_page(20, 20);
        let low = page.to_jpeg_bytes(0).unwrap();
        let high = page.to_jpeg_bytes(255).unwrap();
        assert!(RasterPage::from_bytes(&low, 0.24).is_ok());
        assert!(RasterPage::from_bytes(&high, 0.24).is_ok());
        // Quality 0 clamps to 1, the coarsest legal setting.
        assert_eq!(low, page.to_jpeg_bytes(1).unwrap());
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        let result = RasterPage::from_bytes(&[0u8; 16], 0.24);
        assert!(matches!(result, Err(SnapfolioError::Decode(_))));
    }
}
