// SPDX-License-Identifier: MIT
//
// Page raster sources — one raster page per logical page for each supported
// input. Image decoding is built in; PDF rasterisation and DOCX/PPTX content
// extraction are format-specific decoders supplied by the caller as
// collaborator traits.

use std::path::{Path, PathBuf};

use snapfolio_capture::RasterPage;
use snapfolio_core::error::Result;
use snapfolio_core::{EngineConfig, SnapfolioError};
use tracing::{debug, instrument};

use crate::layout::StructuredContent;

/// Renders the pages of an existing PDF to raster images. Supplied by the
/// caller; the conversion core ships no PDF rasteriser of its own.
pub trait PdfPageRenderer: Send + Sync {
    fn render_pages(&self, data: &[u8]) -> Result<Vec<RasterPage>>;
}

/// Decodes a structured-text container (DOCX, PPTX) into its text content.
/// Supplied by the caller.
pub trait StructuredDecoder: Send + Sync {
    fn decode(&self, data: &[u8]) -> Result<StructuredContent>;
}

/// Produces raster pages and structured content from input files.
pub struct PageRasterSource {
    config: EngineConfig,
}

impl PageRasterSource {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Load the raster pages of an image-set input.
    ///
    /// A single image file is one page; a directory is one page per image
    /// file, in sorted name order. The pixel-to-point hint comes from the
    /// configured capture DPI.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load_image_pages(&self, path: impl AsRef<Path>) -> Result<Vec<RasterPage>> {
        let path = path.as_ref();
        let points_per_pixel = self.config.points_per_pixel();

        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_image_file(p))
                .collect();
            entries.sort();

            if entries.is_empty() {
                return Err(SnapfolioError::Decode(format!(
                    "no image files found in {}",
                    path.display()
                )));
            }

            let mut pages = Vec::with_capacity(entries.len());
            for entry in &entries {
                pages.push(RasterPage::open(entry, points_per_pixel)?);
            }
            debug!(page_count = pages.len(), "Image set loaded from directory");
            return Ok(pages);
        }

        if !path.is_file() {
            return Err(SnapfolioError::Decode(format!(
                "input not found: {}",
                path.display()
            )));
        }

        Ok(vec![RasterPage::open(path, points_per_pixel)?])
    }

    /// Read a plain-text input into structured content.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load_plain_text(&self, path: impl AsRef<Path>) -> Result<StructuredContent> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|err| {
            SnapfolioError::Decode(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                err
            ))
        })?;
        Ok(StructuredContent::from_plain_text(&text))
    }

    /// Read an input file into memory for a collaborator decoder.
    pub fn read_bytes(&self, path: impl AsRef<Path>) -> Result<Vec<u8>> {
        std::fs::read(path.as_ref()).map_err(|err| {
            SnapfolioError::Decode(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                err
            ))
        })
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            matches!(
                ext.to_ascii_lowercase().as_str(),
                "jpg" | "jpeg" | "png" | "tif" | "tiff" | "bmp" | "webp"
            )
        })
}
