// SPDX-License-Identifier: MIT
//
// Engine configuration. Constructor-injected into the capture and conversion
// components — there is no global state.

use serde::{Deserialize, Serialize};

/// Tunables for the capture and conversion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum confidence a detected quadrilateral must reach before the
    /// detector reports it. Below this, `detect` returns nothing and callers
    /// decide whether to fall back.
    pub detection_floor: f32,
    /// Fraction of each edge trimmed by the fallback margin crop applied when
    /// no quadrilateral is available. A policy choice, not a detection result.
    pub fallback_crop_fraction: f32,
    /// Default JPEG quality (1..=100) when options do not override it.
    pub default_quality: u8,
    /// Assumed resolution of photographed pages, in dots per inch. Used to
    /// derive the pixel-to-point scale when the source supplies no hint.
    pub capture_dpi: f32,
    /// Gaussian blur sigma applied before edge detection.
    pub blur_sigma: f32,
    /// How many of the strongest lines per orientation the detector combines
    /// into candidate quadrilaterals.
    pub max_candidate_lines: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            detection_floor: 0.35,
            fallback_crop_fraction: 0.04,
            default_quality: 85,
            capture_dpi: 300.0,
            blur_sigma: 2.0,
            max_candidate_lines: 4,
        }
    }
}

impl EngineConfig {
    /// Device-independent points per pixel at the assumed capture resolution.
    pub fn points_per_pixel(&self) -> f32 {
        72.0 / self.capture_dpi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scale_matches_300_dpi() {
        let config = EngineConfig::default();
        assert!((config.points_per_pixel() - 0.24).abs() < 1e-6);
    }

    #[test]
    fn defaults_are_in_range() {
        let config = EngineConfig::default();
        assert!((0.0..=1.0).contains(&config.detection_floor));
        assert!((0.0..0.5).contains(&config.fallback_crop_fraction));
        assert!((1..=100).contains(&config.default_quality));
    }
}
