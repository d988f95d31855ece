// SPDX-License-Identifier: MIT
//
// Text recognition boundary.
//
// The conversion core does not implement recognition. It consumes any engine
// through the `TextRecognizer` trait and only requires that bounding boxes
// come back in the pixel space of the page passed in. Recognition failure is
// an error the converter recovers from per page — the page is emitted without
// a text layer rather than aborting the conversion.

use snapfolio_capture::RasterPage;
use snapfolio_core::error::Result;

/// An axis-aligned box in page pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PixelBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clamp the box so it lies fully inside a `page_width` x `page_height`
    /// page. Recognition engines occasionally report boxes a pixel or two
    /// outside the frame; the block invariant requires containment.
    pub fn clamped(self, page_width: u32, page_height: u32) -> Self {
        let max_w = page_width as f32;
        let max_h = page_height as f32;
        let x = self.x.clamp(0.0, max_w);
        let y = self.y.clamp(0.0, max_h);
        Self {
            x,
            y,
            width: self.width.min(max_w - x).max(0.0),
            height: self.height.min(max_h - y).max(0.0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// A recognized line of text within a block.
#[derive(Debug, Clone)]
pub struct TextLine {
    pub text: String,
    pub confidence: f32,
    pub bounds: PixelBox,
}

/// A recognized block of text, in the pixel space of the page it was
/// recognized from.
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub text: String,
    /// Recognition confidence in [0, 1].
    pub confidence: f32,
    pub bounds: PixelBox,
    pub lines: Vec<TextLine>,
}

impl TextBlock {
    /// A single-line block.
    pub fn line(text: impl Into<String>, confidence: f32, bounds: PixelBox) -> Self {
        let text = text.into();
        Self {
            lines: vec![TextLine {
                text: text.clone(),
                confidence,
                bounds,
            }],
            text,
            confidence,
            bounds,
        }
    }
}

/// External text-recognition engine boundary.
///
/// Implementations must report bounding boxes in the same pixel space as the
/// page they were given, and report failure as `SnapfolioError::Recognition`
/// rather than panicking — the converter degrades the affected page instead
/// of aborting.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, page: &RasterPage) -> Result<Vec<TextBlock>>;
}

// -- ocrs-backed implementation ------------------------------------------------

#[cfg(feature = "ocr")]
pub mod ocrs_engine {
    //! Recognition via the pure-Rust `ocrs` engine (`rten` model runtime).
    //!
    //! Requires two model files, discovered in the XDG cache directory by
    //! default (`$XDG_CACHE_HOME/ocrs`, typically `~/.cache/ocrs`); run
    //! `ocrs-cli` once to download them.

    use std::path::{Path, PathBuf};

    use ocrs::{ImageSource, OcrEngine, OcrEngineParams, TextItem};
    use rten::Model;
    use snapfolio_core::SnapfolioError;
    use snapfolio_core::error::Result;
    use tracing::{debug, info, instrument};

    use super::{PixelBox, TextBlock, TextLine, TextRecognizer};
    use snapfolio_capture::RasterPage;

    const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
    const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

    /// The `ocrs` engine exposes no per-line confidence, so its adapter
    /// reports this fixed value for every line.
    const LINE_CONFIDENCE: f32 = 0.9;

    fn default_model_dir() -> PathBuf {
        if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
            PathBuf::from(xdg).join("ocrs")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home).join(".cache").join("ocrs")
        } else {
            PathBuf::from("ocrs-models")
        }
    }

    /// Model locations for constructing an [`OcrsRecognizer`].
    #[derive(Debug, Clone)]
    pub struct OcrsConfig {
        pub detection_model_path: PathBuf,
        pub recognition_model_path: PathBuf,
    }

    impl Default for OcrsConfig {
        fn default() -> Self {
            Self::from_dir(default_model_dir())
        }
    }

    impl OcrsConfig {
        /// Expects the directory to contain `text-detection.rten` and
        /// `text-recognition.rten`.
        pub fn from_dir(dir: impl AsRef<Path>) -> Self {
            let dir = dir.as_ref();
            Self {
                detection_model_path: dir.join(DETECTION_MODEL_FILENAME),
                recognition_model_path: dir.join(RECOGNITION_MODEL_FILENAME),
            }
        }

        /// Verify that both model files exist before attempting the load.
        pub fn validate(&self) -> Result<()> {
            for path in [&self.detection_model_path, &self.recognition_model_path] {
                if !path.exists() {
                    return Err(SnapfolioError::Recognition(format!(
                        "OCR model not found at {}; run `ocrs-cli` once to download models",
                        path.display()
                    )));
                }
            }
            Ok(())
        }
    }

    /// `TextRecognizer` backed by the `ocrs` neural engine.
    ///
    /// Model loading is the expensive step — build once, reuse per page.
    pub struct OcrsRecognizer {
        engine: OcrEngine,
    }

    impl OcrsRecognizer {
        #[instrument(skip_all, fields(
            detection = %config.detection_model_path.display(),
            recognition = %config.recognition_model_path.display(),
        ))]
        pub fn new(config: OcrsConfig) -> Result<Self> {
            config.validate()?;

            info!("Loading OCR models");
            let detection_model = Model::load_file(&config.detection_model_path)
                .map_err(|err| {
                    SnapfolioError::Recognition(format!("failed to load detection model: {}", err))
                })?;
            let recognition_model = Model::load_file(&config.recognition_model_path)
                .map_err(|err| {
                    SnapfolioError::Recognition(format!(
                        "failed to load recognition model: {}",
                        err
                    ))
                })?;

            let engine = OcrEngine::new(OcrEngineParams {
                detection_model: Some(detection_model),
                recognition_model: Some(recognition_model),
                ..Default::default()
            })
            .map_err(|err| {
                SnapfolioError::Recognition(format!("failed to initialise OCR engine: {}", err))
            })?;

            info!("OCR engine initialised");
            Ok(Self { engine })
        }

        pub fn with_defaults() -> Result<Self> {
            Self::new(OcrsConfig::default())
        }
    }

    impl TextRecognizer for OcrsRecognizer {
        #[instrument(skip_all, fields(width = page.width(), height = page.height()))]
        fn recognize(&self, page: &RasterPage) -> Result<Vec<TextBlock>> {
            let rgb = page.image().to_rgb8();
            let (width, height) = rgb.dimensions();

            let source = ImageSource::from_bytes(rgb.as_raw(), (width, height))
                .map_err(|err| {
                    SnapfolioError::Recognition(format!("failed to create image source: {}", err))
                })?;
            let input = self.engine.prepare_input(source).map_err(|err| {
                SnapfolioError::Recognition(format!("OCR preprocessing failed: {}", err))
            })?;

            let word_rects = self.engine.detect_words(&input).map_err(|err| {
                SnapfolioError::Recognition(format!("word detection failed: {}", err))
            })?;
            let line_rects = self.engine.find_text_lines(&input, &word_rects);
            let line_texts = self
                .engine
                .recognize_text(&input, &line_rects)
                .map_err(|err| {
                    SnapfolioError::Recognition(format!("line recognition failed: {}", err))
                })?;

            let mut blocks = Vec::with_capacity(line_texts.len());
            for line in line_texts.iter().flatten() {
                let text = line.to_string();
                if text.trim().is_empty() {
                    continue;
                }

                let rect = line.rotated_rect().bounding_rect();
                let bounds = PixelBox::new(
                    rect.left(),
                    rect.top(),
                    rect.width(),
                    rect.height(),
                )
                .clamped(width, height);
                if bounds.is_empty() {
                    continue;
                }

                blocks.push(TextBlock {
                    text: text.clone(),
                    confidence: LINE_CONFIDENCE,
                    bounds,
                    lines: vec![TextLine {
                        text,
                        confidence: LINE_CONFIDENCE,
                        bounds,
                    }],
                });
            }

            debug!(block_count = blocks.len(), "OCR recognition complete");
            Ok(blocks)
        }
    }
}
