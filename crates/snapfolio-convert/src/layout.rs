// SPDX-License-Identifier: MIT
//
// Structured text layout — renders decoded text content into an intermediate
// representation of positioned lines, which the PDF assembler turns into
// fixed pages. Also owns the Helvetica metrics used for measurement both here
// and for fitting invisible text runs in the assembler.

use tracing::{debug, instrument};

/// Decoded content of a structured-text source (plain text, or the text runs
/// extracted from a DOCX/PPTX by an injected decoder).
#[derive(Debug, Clone, Default)]
pub struct StructuredContent {
    pub units: Vec<ContentUnit>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentUnit {
    Paragraph(String),
    /// Forced page break (e.g. between slides of a presentation).
    PageBreak,
}

impl StructuredContent {
    /// Build content from plain text: one paragraph per input line.
    pub fn from_plain_text(text: &str) -> Self {
        Self {
            units: text
                .split('\n')
                .map(|line| ContentUnit::Paragraph(line.trim_end_matches('\r').to_string()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// A line positioned on a fixed page, in PDF point space (origin bottom-left,
/// `y` is the text baseline).
#[derive(Debug, Clone)]
pub struct LayoutLine {
    pub text: String,
    pub x_pt: f32,
    pub baseline_pt: f32,
    pub font_size_pt: f32,
}

/// One fully laid-out output page.
#[derive(Debug, Clone)]
pub struct PageLayout {
    pub width_pt: f32,
    pub height_pt: f32,
    pub lines: Vec<LayoutLine>,
}

/// Lays structured content out onto fixed A4 pages: word wrap at measured
/// Helvetica widths, fixed line height, uniform margins.
#[derive(Debug, Clone)]
pub struct TextLayout {
    pub page_width_pt: f32,
    pub page_height_pt: f32,
    pub margin_pt: f32,
    pub font_size_pt: f32,
    pub line_height_pt: f32,
}

impl Default for TextLayout {
    fn default() -> Self {
        Self {
            // A4 in points.
            page_width_pt: 595.28,
            page_height_pt: 841.89,
            margin_pt: 56.7,
            font_size_pt: 11.0,
            line_height_pt: 14.0,
        }
    }
}

impl TextLayout {
    fn usable_width(&self) -> f32 {
        self.page_width_pt - 2.0 * self.margin_pt
    }

    /// Lay the content out into pages. Always produces at least one page,
    /// even for empty content.
    #[instrument(skip_all, fields(units = content.units.len()))]
    pub fn paginate(&self, content: &StructuredContent) -> Vec<PageLayout> {
        let usable = self.usable_width();
        let lines_per_page =
            (((self.page_height_pt - 2.0 * self.margin_pt) / self.line_height_pt) as usize).max(1);

        let mut pages = Vec::new();
        let mut current: Vec<LayoutLine> = Vec::new();

        let mut flush =
            |current: &mut Vec<LayoutLine>, pages: &mut Vec<PageLayout>| {
                pages.push(PageLayout {
                    width_pt: self.page_width_pt,
                    height_pt: self.page_height_pt,
                    lines: std::mem::take(current),
                });
            };

        for unit in &content.units {
            match unit {
                ContentUnit::PageBreak => {
                    flush(&mut current, &mut pages);
                }
                ContentUnit::Paragraph(text) => {
                    for wrapped in wrap_line(text, self.font_size_pt, usable) {
                        if current.len() >= lines_per_page {
                            flush(&mut current, &mut pages);
                        }
                        let baseline = self.page_height_pt
                            - self.margin_pt
                            - (current.len() as f32 + 1.0) * self.line_height_pt;
                        current.push(LayoutLine {
                            text: wrapped,
                            x_pt: self.margin_pt,
                            baseline_pt: baseline,
                            font_size_pt: self.font_size_pt,
                        });
                    }
                }
            }
        }

        if !current.is_empty() || pages.is_empty() {
            flush(&mut current, &mut pages);
        }

        debug!(pages = pages.len(), "Text layout complete");
        pages
    }
}

/// Wrap one paragraph so no line is wider than `max_width_pt` at the given
/// font size. Words longer than a full line are force-broken.
fn wrap_line(text: &str, font_size_pt: f32, max_width_pt: f32) -> Vec<String> {
    if text.trim().is_empty() {
        return vec![String::new()];
    }

    let mut result = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let word_width = text_width_pt(word, font_size_pt);

        if word_width > max_width_pt {
            if !current.is_empty() {
                result.push(std::mem::take(&mut current));
            }
            // Force-break the oversized word character by character.
            let mut chunk = String::new();
            for c in word.chars() {
                if text_width_pt(&chunk, font_size_pt) + char_width_pt(c, font_size_pt)
                    > max_width_pt
                    && !chunk.is_empty()
                {
                    result.push(std::mem::take(&mut chunk));
                }
                chunk.push(c);
            }
            current = chunk;
            continue;
        }

        let candidate_width = if current.is_empty() {
            word_width
        } else {
            text_width_pt(&current, font_size_pt)
                + char_width_pt(' ', font_size_pt)
                + word_width
        };

        if candidate_width > max_width_pt && !current.is_empty() {
            result.push(std::mem::take(&mut current));
            current.push_str(word);
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
    }

    if !current.is_empty() {
        result.push(current);
    }
    result
}

// -- Helvetica metrics ---------------------------------------------------------

/// Advance widths for Helvetica, printable ASCII 32..=126, in 1/1000 of the
/// font size (standard AFM values).
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, // 'A'..'P'
    778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'Q'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, // 'a'..'p'
    556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'q'..'z'
    334, 260, 334, 584, // '{'..'~'
];

/// Fallback advance for characters outside the table.
const DEFAULT_WIDTH: u16 = 556;

/// Helvetica advance width of a single character, in points.
pub fn char_width_pt(c: char, font_size_pt: f32) -> f32 {
    let units = match c as u32 {
        32..=126 => HELVETICA_WIDTHS[(c as usize) - 32],
        _ => DEFAULT_WIDTH,
    };
    units as f32 / 1000.0 * font_size_pt
}

/// Helvetica advance width of a string, in points.
pub fn text_width_pt(text: &str, font_size_pt: f32) -> f32 {
    text.chars().map(|c| char_width_pt(c, font_size_pt)).sum()
}
