// SPDX-License-Identifier: MIT
//
// Searchable-PDF assembly.
//
// Each output page carries the raster image as its full visible content and,
// behind it, one invisible text run (render mode 3) per recognized block so
// the document is selectable and full-text searchable. Image placement and
// every text run share one pixel-to-point scale factor per page; using two
// different factors would leave the text layer unselectably misaligned with
// the visible content, so the factor is computed once per page and threaded
// through both.
//
// Built directly on `lopdf` objects: output must be byte-for-byte
// reproducible for identical input, so no timestamps, no document IDs, and a
// fixed object insertion order.

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, StringFormat, dictionary};
use snapfolio_core::SnapfolioError;
use snapfolio_core::error::Result;
use tracing::{debug, instrument};

use crate::layout::{PageLayout, text_width_pt};
use crate::recognize::{PixelBox, TextBlock};
use snapfolio_capture::RasterPage;

/// One rectified page paired with the text blocks recognized on it (empty
/// when recognition was skipped or failed for the page).
pub struct AssembledPage {
    pub page: RasterPage,
    pub blocks: Vec<TextBlock>,
}

/// Assembles raster pages and recognized text into a single searchable PDF.
pub struct SearchablePdfAssembler {
    /// JPEG quality for embedded page images, 1..=100.
    quality: u8,
    /// When false, the raster is omitted and recognized text is rendered
    /// visibly instead of as a hidden layer.
    include_images: bool,
}

impl SearchablePdfAssembler {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            include_images: true,
        }
    }

    pub fn include_images(mut self, include: bool) -> Self {
        self.include_images = include;
        self
    }

    // -- Raster pages with text layer -----------------------------------------

    /// Assemble `pages` into a PDF byte stream.
    ///
    /// Page dimensions are `pixel dimensions × points_per_pixel` of each
    /// page. Text run font sizes derive from box heights (the largest size
    /// whose rendered height stays within the recognized box); run widths are
    /// fitted with horizontal scaling against standard Helvetica metrics.
    #[instrument(skip_all, fields(page_count = pages.len()))]
    pub fn assemble(&self, pages: &[AssembledPage]) -> Result<Vec<u8>> {
        if pages.is_empty() {
            return Err(SnapfolioError::Pdf("no pages to assemble".into()));
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let mut page_ids: Vec<Object> = Vec::with_capacity(pages.len());

        for assembled in pages {
            let (width_pt, height_pt) = assembled.page.dimensions_pt();
            if width_pt <= 0.0 || height_pt <= 0.0 {
                return Err(SnapfolioError::Pdf("page with zero point size".into()));
            }

            // The single scale factor shared by the image matrix and every
            // text run on this page.
            let scale = assembled.page.points_per_pixel();

            let mut operations: Vec<Operation> = Vec::new();
            let mut resources = dictionary! {
                "Font" => dictionary! { "F0" => font_id },
            };

            if self.include_images {
                let jpeg = assembled.page.to_jpeg_bytes(self.quality)?;
                let image_id = doc.add_object(
                    Stream::new(
                        dictionary! {
                            "Type" => "XObject",
                            "Subtype" => "Image",
                            "Width" => assembled.page.width() as i64,
                            "Height" => assembled.page.height() as i64,
                            "ColorSpace" => "DeviceRGB",
                            "BitsPerComponent" => 8,
                            "Filter" => "DCTDecode",
                        },
                        jpeg,
                    )
                    .with_compression(false),
                );
                resources.set(
                    "XObject",
                    dictionary! { "Im0" => image_id },
                );

                operations.push(Operation::new("q", vec![]));
                operations.push(Operation::new(
                    "cm",
                    vec![
                        width_pt.into(),
                        0.into(),
                        0.into(),
                        height_pt.into(),
                        0.into(),
                        0.into(),
                    ],
                ));
                operations.push(Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]));
                operations.push(Operation::new("Q", vec![]));
            }

            // Mode 3 paints nothing but leaves the glyphs selectable; when
            // the raster is omitted the text is the visible content instead.
            let render_mode: i64 = if self.include_images { 3 } else { 0 };

            for block in &assembled.blocks {
                for (text, bounds) in block_runs(block) {
                    self.push_text_run(
                        &mut operations,
                        text,
                        bounds,
                        scale,
                        height_pt,
                        assembled.page.width(),
                        assembled.page.height(),
                        render_mode,
                    );
                }
            }

            let content = Content { operations };
            let content_bytes = content
                .encode()
                .map_err(|err| SnapfolioError::Pdf(format!("content encoding failed: {}", err)))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content_bytes));

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), width_pt.into(), height_pt.into()],
                "Contents" => content_id,
                "Resources" => resources,
            });
            page_ids.push(page_id.into());
        }

        self.finish(doc, pages_id, page_ids)
    }

    /// Emit one invisible (or visible) text run whose rendered box matches
    /// the recognized pixel box under the page's scale factor.
    #[allow(clippy::too_many_arguments)]
    fn push_text_run(
        &self,
        operations: &mut Vec<Operation>,
        text: &str,
        bounds: PixelBox,
        scale: f32,
        page_height_pt: f32,
        page_width_px: u32,
        page_height_px: u32,
        render_mode: i64,
    ) {
        let bounds = bounds.clamped(page_width_px, page_height_px);
        if bounds.is_empty() || text.trim().is_empty() {
            return;
        }

        // Largest font size whose rendered height does not exceed the box
        // height: with Helvetica's ascent+descent under 1 em, that is the box
        // height itself.
        let font_size = (bounds.height * scale).max(1.0);

        let natural_width = text_width_pt(text, font_size);
        if natural_width <= f32::EPSILON {
            return;
        }
        let target_width = bounds.width * scale;
        let horizontal_scale = (target_width / natural_width * 100.0).clamp(1.0, 1000.0);

        // Pixel space has its origin top-left, PDF bottom-left; the baseline
        // sits at the bottom of the recognized box.
        let x_pt = bounds.x * scale;
        let baseline_pt = page_height_pt - (bounds.y + bounds.height) * scale;

        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new("Tr", vec![render_mode.into()]));
        operations.push(Operation::new(
            "Tf",
            vec![Object::Name(b"F0".to_vec()), font_size.into()],
        ));
        operations.push(Operation::new("Tz", vec![horizontal_scale.into()]));
        operations.push(Operation::new("Td", vec![x_pt.into(), baseline_pt.into()]));
        operations.push(Operation::new(
            "Tj",
            vec![Object::String(winansi_bytes(text), StringFormat::Literal)],
        ));
        operations.push(Operation::new("ET", vec![]));
    }

    // -- Visible text pages ---------------------------------------------------

    /// Assemble laid-out text pages (structured-text sources) into a PDF with
    /// visible Helvetica text and no raster content.
    #[instrument(skip_all, fields(page_count = pages.len()))]
    pub fn assemble_text_pages(&self, pages: &[PageLayout]) -> Result<Vec<u8>> {
        if pages.is_empty() {
            return Err(SnapfolioError::Pdf("no pages to assemble".into()));
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let mut page_ids: Vec<Object> = Vec::with_capacity(pages.len());

        for layout in pages {
            let mut operations: Vec<Operation> = Vec::new();
            for line in &layout.lines {
                if line.text.is_empty() {
                    continue;
                }
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new(
                    "Tf",
                    vec![Object::Name(b"F0".to_vec()), line.font_size_pt.into()],
                ));
                operations.push(Operation::new(
                    "Td",
                    vec![line.x_pt.into(), line.baseline_pt.into()],
                ));
                operations.push(Operation::new(
                    "Tj",
                    vec![Object::String(winansi_bytes(&line.text), StringFormat::Literal)],
                ));
                operations.push(Operation::new("ET", vec![]));
            }

            let content = Content { operations };
            let content_bytes = content
                .encode()
                .map_err(|err| SnapfolioError::Pdf(format!("content encoding failed: {}", err)))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content_bytes));

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    0.into(),
                    0.into(),
                    layout.width_pt.into(),
                    layout.height_pt.into(),
                ],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F0" => font_id },
                },
            });
            page_ids.push(page_id.into());
        }

        self.finish(doc, pages_id, page_ids)
    }

    /// Attach the page tree and catalog and serialise.
    fn finish(
        &self,
        mut doc: Document,
        pages_id: lopdf::ObjectId,
        page_ids: Vec<Object>,
    ) -> Result<Vec<u8>> {
        let count = page_ids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => count,
                "Kids" => page_ids,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|err| SnapfolioError::Pdf(format!("PDF serialisation failed: {}", err)))?;

        debug!(bytes = bytes.len(), "PDF assembled");
        Ok(bytes)
    }
}

/// Text runs of a block: its lines when present, otherwise the block itself.
fn block_runs(block: &TextBlock) -> Vec<(&str, PixelBox)> {
    if block.lines.is_empty() {
        vec![(block.text.as_str(), block.bounds)]
    } else {
        block
            .lines
            .iter()
            .map(|line| (line.text.as_str(), line.bounds))
            .collect()
    }
}

/// Encode text for a WinAnsi literal string.
///
/// WinAnsi is CP1252: ASCII and the 0xA0..=0xFF Latin-1 range map to their
/// codepoint, while 0x80..=0x9F holds typographic characters (curly quotes,
/// dashes, euro sign) that recognition engines commonly emit. Unicode C1
/// controls and anything outside the codepage are replaced.
fn winansi_bytes(text: &str) -> Vec<u8> {
    text.chars().map(winansi_byte).collect()
}

fn winansi_byte(c: char) -> u8 {
    match c {
        '\u{20AC}' => 0x80, // €
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85, // …
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91, // '
        '\u{2019}' => 0x92, // '
        '\u{201C}' => 0x93, // "
        '\u{201D}' => 0x94, // "
        '\u{2022}' => 0x95, // •
        '\u{2013}' => 0x96, // –
        '\u{2014}' => 0x97, // —
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99, // ™
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        _ => {
            let code = c as u32;
            if code < 0x80 || (0xA0..=0xFF).contains(&code) {
                code as u8
            } else {
                b'?'
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{StructuredContent, TextLayout};
    use crate::recognize::TextBlock;
    use image::{DynamicImage, RgbImage};

    fn solid_page(w: u32, h: u32, points_per_pixel: f32) -> RasterPage {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, image::Rgb([250, 250, 245])));
        RasterPage::new(img, points_per_pixel)
    }

    fn float_operands(op: &Operation) -> Vec<f32> {
        op.operands
            .iter()
            .filter_map(|o| o.as_float().ok())
            .collect()
    }

    fn decode_first_page_ops(bytes: &[u8]) -> Vec<Operation> {
        let doc = Document::load_mem(bytes).expect("output must be a loadable PDF");
        let page_id = *doc.get_pages().get(&1).expect("page 1 must exist");
        let content = doc.get_page_content(page_id).expect("page content");
        Content::decode(&content).expect("decodable content").operations
    }

    /// The alignment invariant: the image matrix and the text run must use
    /// the same pixel-to-point scale.
    #[test]
    fn image_and_text_share_one_scale_factor() {
        let scale = 0.25f32;
        let page = solid_page(500, 700, scale);
        let block = TextBlock::line("Invoice", 0.9, PixelBox::new(100.0, 140.0, 200.0, 70.0));

        let bytes = SearchablePdfAssembler::new(85)
            .assemble(&[AssembledPage {
                page,
                blocks: vec![block],
            }])
            .unwrap();

        let ops = decode_first_page_ops(&bytes);

        // Image: full-page placement at pixel dims x scale.
        let cm = ops.iter().find(|op| op.operator == "cm").expect("cm op");
        let cm_vals = float_operands(cm);
        assert!((cm_vals[0] - 500.0 * scale).abs() < 1e-3);
        assert!((cm_vals[3] - 700.0 * scale).abs() < 1e-3);

        // Text: font size from box height, position from the same scale.
        let tf = ops.iter().find(|op| op.operator == "Tf").expect("Tf op");
        let tf_size = *float_operands(tf).last().unwrap();
        assert!((tf_size - 70.0 * scale).abs() < 1e-3);

        let td = ops.iter().find(|op| op.operator == "Td").expect("Td op");
        let td_vals = float_operands(td);
        assert!((td_vals[0] - 100.0 * scale).abs() < 1e-3);
        let expected_baseline = 700.0 * scale - (140.0 + 70.0) * scale;
        assert!((td_vals[1] - expected_baseline).abs() < 1e-3);

        // Render mode must be invisible.
        let tr = ops.iter().find(|op| op.operator == "Tr").expect("Tr op");
        assert_eq!(tr.operands[0].as_i64().unwrap(), 3);
    }

    /// Selectable text round-trips through a PDF text extractor.
    #[test]
    fn recognized_text_is_extractable() {
        let page = solid_page(400, 600, 0.24);
        let block = TextBlock::line(
            "Quarterly Report",
            0.95,
            PixelBox::new(40.0, 50.0, 320.0, 40.0),
        );
        let bytes = SearchablePdfAssembler::new(85)
            .assemble(&[AssembledPage {
                page,
                blocks: vec![block],
            }])
            .unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        let text = doc.extract_text(&[1]).unwrap();
        assert!(
            text.contains("Quarterly Report"),
            "extracted text was {text:?}"
        );
    }

    /// Identical input must produce byte-identical output.
    #[test]
    fn assembly_is_deterministic() {
        let build = || {
            let page = solid_page(300, 400, 0.24);
            let block = TextBlock::line("same", 0.9, PixelBox::new(10.0, 10.0, 100.0, 20.0));
            SearchablePdfAssembler::new(80)
                .assemble(&[AssembledPage {
                    page,
                    blocks: vec![block],
                }])
                .unwrap()
        };
        assert_eq!(build(), build());
    }

    /// Pages without blocks still produce a valid PDF with no text ops.
    #[test]
    fn page_without_blocks_has_no_text_layer() {
        let bytes = SearchablePdfAssembler::new(85)
            .assemble(&[AssembledPage {
                page: solid_page(200, 300, 0.24),
                blocks: Vec::new(),
            }])
            .unwrap();

        let ops = decode_first_page_ops(&bytes);
        assert!(ops.iter().any(|op| op.operator == "Do"));
        assert!(!ops.iter().any(|op| op.operator == "Tj"));
    }

    #[test]
    fn empty_input_is_an_error() {
        let result = SearchablePdfAssembler::new(85).assemble(&[]);
        assert!(matches!(result, Err(SnapfolioError::Pdf(_))));
    }

    /// Blocks reported slightly outside the page are clamped, not dropped.
    #[test]
    fn out_of_bounds_blocks_are_clamped() {
        let page = solid_page(200, 300, 0.24);
        let block = TextBlock::line("edge", 0.9, PixelBox::new(-4.0, -2.0, 120.0, 30.0));
        let bytes = SearchablePdfAssembler::new(85)
            .assemble(&[AssembledPage {
                page,
                blocks: vec![block],
            }])
            .unwrap();

        let ops = decode_first_page_ops(&bytes);
        let td = ops.iter().find(|op| op.operator == "Td").expect("Td op");
        let td_vals = float_operands(td);
        assert!(td_vals[0] >= 0.0);
    }

    #[test]
    fn text_pages_render_visible_lines() {
        let content = StructuredContent::from_plain_text("alpha\nbeta");
        let layouts = TextLayout::default().paginate(&content);
        let bytes = SearchablePdfAssembler::new(85)
            .assemble_text_pages(&layouts)
            .unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        let text = doc.extract_text(&[1]).unwrap();
        assert!(text.contains("alpha") && text.contains("beta"));

        // No invisible render mode in visible text pages.
        let ops = decode_first_page_ops(&bytes);
        assert!(!ops.iter().any(|op| op.operator == "Tr"));
    }

    #[test]
    fn winansi_replaces_unmappable_chars() {
        assert_eq!(winansi_bytes("abc"), b"abc".to_vec());
        assert_eq!(winansi_bytes("héllo"), vec![b'h', 0xE9, b'l', b'l', b'o']);
        assert_eq!(winansi_bytes("日本"), vec![b'?', b'?']);
        // Unicode C1 controls are not WinAnsi glyphs.
        assert_eq!(winansi_bytes("\u{0085}"), vec![b'?']);
    }

    /// CP1252's 0x80..=0x9F slots carry the typographic characters OCR
    /// output tends to contain; they must encode, not degrade to '?'.
    #[test]
    fn winansi_maps_typographic_characters() {
        assert_eq!(
            winansi_bytes("\u{2018}a\u{2019}"),
            vec![0x91, b'a', 0x92]
        );
        assert_eq!(
            winansi_bytes("\u{201C}b\u{201D}"),
            vec![0x93, b'b', 0x94]
        );
        assert_eq!(
            winansi_bytes("1\u{2013}2\u{2014}3"),
            vec![b'1', 0x96, b'2', 0x97, b'3']
        );
        assert_eq!(winansi_bytes("\u{20AC}9"), vec![0x80, b'9']);
        assert_eq!(winansi_bytes("x\u{2026}"), vec![b'x', 0x85]);
    }
}
