// SPDX-License-Identifier: MIT
//
// Format converter — the public entry point of the conversion pipeline.
//
// Dispatches on the (source format, target format) pair; each supported pair
// is a self-contained strategy. Unsupported pairs fail with a descriptive
// error and never silently substitute the closest supported pair. A failure
// at any per-page stage aborts the whole conversion, and every partially
// written output file is deleted before the failure result is returned, so
// callers never observe a half-written file at the requested path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use snapfolio_capture::{BoundaryDetector, PerspectiveRectifier, RasterPage};
use snapfolio_core::error::Result;
use snapfolio_core::{
    CancelToken, ConversionOptions, ConversionResult, ConversionStage, DocumentFormat,
    EngineConfig, SnapfolioError,
};
use tracing::{debug, info, instrument, warn};

use crate::layout::TextLayout;
use crate::pdf::{AssembledPage, SearchablePdfAssembler};
use crate::recognize::{TextBlock, TextRecognizer};
use crate::source::{PageRasterSource, PdfPageRenderer, StructuredDecoder};

/// Orchestrates conversions between document formats.
///
/// Built once with its collaborators and reused across conversions; each
/// `convert` call is independent and carries its own options and cancellation
/// token.
pub struct Converter {
    config: EngineConfig,
    detector: BoundaryDetector,
    rectifier: PerspectiveRectifier,
    source: PageRasterSource,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    pdf_renderer: Option<Arc<dyn PdfPageRenderer>>,
    docx_decoder: Option<Arc<dyn StructuredDecoder>>,
    pptx_decoder: Option<Arc<dyn StructuredDecoder>>,
}

impl Converter {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            detector: BoundaryDetector::new(config.clone()),
            rectifier: PerspectiveRectifier::new(config.clone()),
            source: PageRasterSource::new(config.clone()),
            config,
            recognizer: None,
            pdf_renderer: None,
            docx_decoder: None,
            pptx_decoder: None,
        }
    }

    /// Inject the text-recognition engine used when `ocr_enabled` is set.
    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    /// Inject a renderer for PDF sources.
    pub fn with_pdf_renderer(mut self, renderer: Arc<dyn PdfPageRenderer>) -> Self {
        self.pdf_renderer = Some(renderer);
        self
    }

    /// Inject a DOCX content decoder.
    pub fn with_docx_decoder(mut self, decoder: Arc<dyn StructuredDecoder>) -> Self {
        self.docx_decoder = Some(decoder);
        self
    }

    /// Inject a PPTX content decoder.
    pub fn with_pptx_decoder(mut self, decoder: Arc<dyn StructuredDecoder>) -> Self {
        self.pptx_decoder = Some(decoder);
        self
    }

    /// Convert `input` into `output` according to `options`.
    ///
    /// The sole public entry point: all intermediate types stay internal, and
    /// errors come back as a structured [`ConversionResult`], never as a
    /// panic. The output location is caller-chosen; the converter writes
    /// nowhere else.
    #[instrument(skip_all, fields(
        source = ?options.source_format,
        target = ?options.target_format,
        input = %input.as_ref().display(),
    ))]
    pub fn convert(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        options: &ConversionOptions,
        cancel: &CancelToken,
    ) -> ConversionResult {
        match self.run(input.as_ref(), output.as_ref(), options, cancel) {
            Ok(path) => {
                info!(output = %path, "Conversion complete");
                ConversionResult::ok(path)
            }
            Err(err) => {
                warn!(error = %err, "Conversion failed");
                ConversionResult::failed(err.to_string())
            }
        }
    }

    /// Dispatch table keyed by the format pair.
    fn run(
        &self,
        input: &Path,
        output: &Path,
        options: &ConversionOptions,
        cancel: &CancelToken,
    ) -> Result<String> {
        debug!(stage = ?ConversionStage::Decoding, "Conversion started");
        cancel.check()?;

        use DocumentFormat::*;
        match (options.source_format, options.target_format) {
            (ImageSet, Pdf) => self.image_set_to_pdf(input, output, options, cancel),
            (ImageSet, ImageSet) => self.reencode_image_set(input, output, options, cancel),
            (ImageSet, PlainText) => self.image_set_to_text(input, output, options, cancel),
            (PlainText | Docx | Pptx, Pdf) => {
                self.structured_to_pdf(input, output, options, cancel)
            }
            (Pdf, ImageSet) => self.pdf_to_image_set(input, output, options, cancel),
            (source_format, target_format) => Err(SnapfolioError::UnsupportedFormatPair {
                source_format,
                target_format,
            }),
        }
    }

    // -- Strategies -----------------------------------------------------------

    /// Photographed/exported pages → searchable PDF. The core strategy:
    /// rectify each page, optionally recognize text, then assemble the raster
    /// with an invisible aligned text layer.
    fn image_set_to_pdf(
        &self,
        input: &Path,
        output: &Path,
        options: &ConversionOptions,
        cancel: &CancelToken,
    ) -> Result<String> {
        let pages = self.source.load_image_pages(input)?;
        let mut assembled = Vec::with_capacity(pages.len());

        for (index, page) in pages.into_iter().enumerate() {
            cancel.check()?;
            debug!(page = index + 1, stage = ?ConversionStage::Rectifying, "Processing page");

            let page = self.rectify_page(page);

            cancel.check()?;
            let blocks = if options.ocr_enabled {
                debug!(page = index + 1, stage = ?ConversionStage::Recognizing, "Recognizing");
                self.recognize_page(&page)
            } else {
                Vec::new()
            };

            debug!(page = index + 1, stage = ?ConversionStage::Assembling, "Page ready");
            assembled.push(AssembledPage { page, blocks });
        }

        cancel.check()?;
        debug!(stage = ?ConversionStage::Encoding, "Assembling PDF");
        let bytes = SearchablePdfAssembler::new(options.quality)
            .include_images(options.include_images)
            .assemble(&assembled)?;

        cancel.check()?;
        self.write_output(output, &bytes)
    }

    /// Re-encode raster pages as JPEG at the requested quality, no text
    /// layer. One page keeps the requested path; N pages become numbered
    /// siblings (`stem-001.jpg`, ...).
    fn reencode_image_set(
        &self,
        input: &Path,
        output: &Path,
        options: &ConversionOptions,
        cancel: &CancelToken,
    ) -> Result<String> {
        let pages = self.source.load_image_pages(input)?;
        self.write_image_pages(&pages, output, options.quality, cancel)
    }

    /// OCR text dump: every page is recognized and the block texts joined
    /// with newlines. Requires a recognizer — there is no output without one.
    fn image_set_to_text(
        &self,
        input: &Path,
        output: &Path,
        _options: &ConversionOptions,
        cancel: &CancelToken,
    ) -> Result<String> {
        let recognizer = self.recognizer.as_ref().ok_or_else(|| {
            SnapfolioError::Recognition(
                "plain-text output requires a text recognizer, but none is configured".into(),
            )
        })?;

        let pages = self.source.load_image_pages(input)?;
        let mut text = String::new();

        for (index, page) in pages.into_iter().enumerate() {
            cancel.check()?;
            let page = self.rectify_page(page);

            match recognizer.recognize(&page) {
                Ok(blocks) => {
                    for block in &blocks {
                        text.push_str(&block.text);
                        text.push('\n');
                    }
                }
                // A failed page contributes no text but does not abort the
                // dump.
                Err(err) => {
                    warn!(page = index + 1, error = %err, "Recognition failed; page skipped")
                }
            }
        }

        cancel.check()?;
        self.write_output(output, text.as_bytes())
    }

    /// Structured text (plain text, or DOCX/PPTX via injected decoders) →
    /// laid-out visible-text PDF pages.
    fn structured_to_pdf(
        &self,
        input: &Path,
        output: &Path,
        options: &ConversionOptions,
        cancel: &CancelToken,
    ) -> Result<String> {
        let content = match options.source_format {
            DocumentFormat::PlainText => self.source.load_plain_text(input)?,
            DocumentFormat::Docx => {
                let decoder = self.docx_decoder.as_ref().ok_or_else(|| {
                    SnapfolioError::Decode("no DOCX decoder is configured".into())
                })?;
                decoder.decode(&self.source.read_bytes(input)?)?
            }
            DocumentFormat::Pptx => {
                let decoder = self.pptx_decoder.as_ref().ok_or_else(|| {
                    SnapfolioError::Decode("no PPTX decoder is configured".into())
                })?;
                decoder.decode(&self.source.read_bytes(input)?)?
            }
            other => {
                return Err(SnapfolioError::Decode(format!(
                    "{other:?} is not a structured-text source"
                )));
            }
        };

        cancel.check()?;
        debug!(stage = ?ConversionStage::Rendering, "Laying out text");
        let layouts = TextLayout::default().paginate(&content);

        cancel.check()?;
        debug!(stage = ?ConversionStage::Encoding, "Assembling PDF");
        let bytes = SearchablePdfAssembler::new(options.quality).assemble_text_pages(&layouts)?;

        cancel.check()?;
        self.write_output(output, &bytes)
    }

    /// Existing PDF → raster pages, via the injected renderer.
    fn pdf_to_image_set(
        &self,
        input: &Path,
        output: &Path,
        options: &ConversionOptions,
        cancel: &CancelToken,
    ) -> Result<String> {
        let renderer = self.pdf_renderer.as_ref().ok_or_else(|| {
            SnapfolioError::Decode("no PDF page renderer is configured".into())
        })?;

        let data = self.source.read_bytes(input)?;
        cancel.check()?;
        let pages = renderer.render_pages(&data)?;
        if pages.is_empty() {
            return Err(SnapfolioError::Decode("PDF rendered zero pages".into()));
        }

        self.write_image_pages(&pages, output, options.quality, cancel)
    }

    // -- Per-page helpers -----------------------------------------------------

    /// Detect and rectify a photographed page. When the detector declines,
    /// the configured margin crop is applied instead — a policy fallback, not
    /// a detection result.
    fn rectify_page(&self, page: RasterPage) -> RasterPage {
        match self.detector.detect(&page) {
            Some(quad) => {
                let result = self.rectifier.rectify(page, &quad);
                if !result.rectified {
                    debug!("Quad was degenerate; page passed through");
                }
                result.page
            }
            None => {
                debug!(
                    crop = self.config.fallback_crop_fraction,
                    "No boundary detected; applying fallback margin crop"
                );
                self.rectifier.fallback_crop(page)
            }
        }
    }

    /// Recognize one page, degrading to an empty block list on failure —
    /// recognition failure must not abort an otherwise-successful
    /// conversion.
    fn recognize_page(&self, page: &RasterPage) -> Vec<TextBlock> {
        let Some(recognizer) = self.recognizer.as_ref() else {
            warn!("OCR requested but no recognizer configured; emitting page without text layer");
            return Vec::new();
        };

        match recognizer.recognize(page) {
            Ok(blocks) => blocks,
            Err(err) => {
                warn!(error = %err, "Recognition failed; emitting page without text layer");
                Vec::new()
            }
        }
    }

    // -- Output writing -------------------------------------------------------

    /// Write a single output file, removing any partial file on error.
    fn write_output(&self, output: &Path, bytes: &[u8]) -> Result<String> {
        if let Err(err) = std::fs::write(output, bytes) {
            let _ = std::fs::remove_file(output);
            return Err(SnapfolioError::Io(err));
        }
        Ok(output.display().to_string())
    }

    /// Write one JPEG per page. All written paths are tracked and removed on
    /// failure or cancellation, so no partial set survives.
    fn write_image_pages(
        &self,
        pages: &[RasterPage],
        output: &Path,
        quality: u8,
        cancel: &CancelToken,
    ) -> Result<String> {
        let mut written: Vec<PathBuf> = Vec::with_capacity(pages.len());

        let result = (|| -> Result<()> {
            for (index, page) in pages.iter().enumerate() {
                cancel.check()?;
                let path = page_output_path(output, index, pages.len());
                let bytes = page.to_jpeg_bytes(quality)?;
                std::fs::write(&path, &bytes)?;
                written.push(path);
            }
            Ok(())
        })();

        match result {
            Ok(()) => Ok(output.display().to_string()),
            Err(err) => {
                for path in &written {
                    let _ = std::fs::remove_file(path);
                }
                let _ = std::fs::remove_file(output);
                Err(err)
            }
        }
    }
}

/// Output path for page `index` of `count`: the requested path itself for a
/// single page, numbered siblings otherwise.
fn page_output_path(output: &Path, index: usize, count: usize) -> PathBuf {
    if count <= 1 {
        return output.to_path_buf();
    }
    numbered_page_path(output, index)
}

/// `stem-NNN.ext` sibling of `output` for page `index` (zero-based).
pub(crate) fn numbered_page_path(output: &Path, index: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("page");
    let ext = output
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("jpg");
    output.with_file_name(format!("{stem}-{:03}.{ext}", index + 1))
}
