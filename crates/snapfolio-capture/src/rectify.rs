// SPDX-License-Identifier: MIT
//
// Perspective rectification — warps a detected quadrilateral into an upright
// rectangular page, with a conservative margin-crop fallback for pages where
// detection declined.

use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use snapfolio_core::EngineConfig;
use tracing::{debug, instrument, warn};

use crate::boundary::DetectedQuad;
use crate::page::RasterPage;

/// Result of a rectification attempt.
///
/// `rectified` is `false` when the quad was degenerate and the original page
/// was passed through unmodified — silently producing a zero-size image would
/// be worse than skipping the correction, so the caller is told instead.
#[derive(Debug)]
pub struct Rectified {
    pub page: RasterPage,
    pub rectified: bool,
}

/// Warps detected quadrilaterals into axis-aligned rectangular pages.
pub struct PerspectiveRectifier {
    config: EngineConfig,
}

impl PerspectiveRectifier {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Rectify `page` using the detected `quad`.
    ///
    /// The output rectangle takes its width from the longer of the top/bottom
    /// sides and its height from the longer of the left/right sides, so a
    /// document photographed at a slant keeps its true aspect ratio. Pixels
    /// are resampled with bilinear interpolation.
    ///
    /// Never fails: degenerate quads (zero or near-zero area, unsolvable
    /// homography) return the original page with `rectified = false`.
    #[instrument(skip_all, fields(width = page.width(), height = page.height(), confidence = quad.confidence))]
    pub fn rectify(&self, page: RasterPage, quad: &DetectedQuad) -> Rectified {
        let (top, bottom, left, right) = quad.side_lengths();
        let out_w = top.max(bottom).round() as u32;
        let out_h = left.max(right).round() as u32;

        let min_area = (page.width() as f32 * page.height() as f32) * 1e-4;
        if out_w < 2 || out_h < 2 || quad.area() < min_area.max(4.0) {
            warn!(out_w, out_h, area = quad.area(), "Degenerate quad; skipping rectification");
            return Rectified {
                page,
                rectified: false,
            };
        }

        let src: [(f32, f32); 4] = [
            (quad.top_left.x, quad.top_left.y),
            (quad.top_right.x, quad.top_right.y),
            (quad.bottom_right.x, quad.bottom_right.y),
            (quad.bottom_left.x, quad.bottom_left.y),
        ];
        let dest: [(f32, f32); 4] = [
            (0.0, 0.0),
            (out_w as f32, 0.0),
            (out_w as f32, out_h as f32),
            (0.0, out_h as f32),
        ];

        let Some(projection) = Projection::from_control_points(src, dest) else {
            warn!("No projective transform for quad; skipping rectification");
            return Rectified {
                page,
                rectified: false,
            };
        };

        let points_per_pixel = page.points_per_pixel();
        let rgba_input = page.image().to_rgba8();
        let default_pixel = Rgba([255u8, 255, 255, 255]);
        let mut output = RgbaImage::new(out_w, out_h);

        warp_into(
            &rgba_input,
            &projection,
            Interpolation::Bilinear,
            default_pixel,
            &mut output,
        );

        debug!(out_w, out_h, "Perspective rectification applied");
        Rectified {
            page: RasterPage::new(DynamicImage::ImageRgba8(output), points_per_pixel),
            rectified: true,
        }
    }

    /// Fixed-fraction margin crop, used when no quadrilateral is available
    /// (detection declined, or the caller chose not to run it).
    ///
    /// This is a conservative policy fallback, not geometric correction: it
    /// trims `fallback_crop_fraction` of each edge and nothing more.
    #[instrument(skip_all, fields(width = page.width(), height = page.height()))]
    pub fn fallback_crop(&self, page: RasterPage) -> RasterPage {
        let fraction = self.config.fallback_crop_fraction.clamp(0.0, 0.25);
        let (w, h) = (page.width(), page.height());

        let margin_x = (w as f32 * fraction) as u32;
        let margin_y = (h as f32 * fraction) as u32;
        let crop_w = w.saturating_sub(2 * margin_x);
        let crop_h = h.saturating_sub(2 * margin_y);
        if crop_w < 2 || crop_h < 2 {
            return page;
        }

        let points_per_pixel = page.points_per_pixel();
        let cropped = page.image().crop_imm(margin_x, margin_y, crop_w, crop_h);
        debug!(margin_x, margin_y, "Fallback margin crop applied");
        RasterPage::new(cropped, points_per_pixel)
    }
}
