// SPDX-License-Identifier: MIT
//
// Core domain types for the Snapfolio conversion pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supported document formats, on both the source and target side of a
/// conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Pptx,
    PlainText,
    /// One or more raster images (photographed or exported pages).
    ImageSet,
}

impl DocumentFormat {
    /// MIME type string for the format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            Self::PlainText => "text/plain",
            Self::ImageSet => "image/jpeg",
        }
    }

    /// Infer the format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" | "doc" => Some(Self::Docx),
            "pptx" | "ppt" => Some(Self::Pptx),
            "txt" => Some(Self::PlainText),
            "jpg" | "jpeg" | "png" | "tif" | "tiff" | "bmp" | "webp" => Some(Self::ImageSet),
            _ => None,
        }
    }

    /// Preferred file extension for output files of this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Pptx => "pptx",
            Self::PlainText => "txt",
            Self::ImageSet => "jpg",
        }
    }

    /// Whether sources of this format decode to raster pages (as opposed to
    /// structured text content).
    pub fn is_raster_source(&self) -> bool {
        matches!(self, Self::ImageSet | Self::Pdf)
    }
}

/// Options controlling a single conversion. Immutable once the conversion
/// starts — the converter borrows them and never writes back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOptions {
    pub source_format: DocumentFormat,
    pub target_format: DocumentFormat,
    /// Output quality for lossy encodings, 1..=100. `with_quality` clamps
    /// early; encode sites clamp again, so a hand-built value outside the
    /// range never reaches an encoder.
    pub quality: u8,
    /// Whether raster content is carried into the output.
    pub include_images: bool,
    /// Whether text recognition runs on raster pages.
    pub ocr_enabled: bool,
}

impl ConversionOptions {
    pub fn new(source_format: DocumentFormat, target_format: DocumentFormat) -> Self {
        Self {
            source_format,
            target_format,
            quality: 85,
            include_images: true,
            ocr_enabled: false,
        }
    }

    /// Clamp `quality` into its valid 1..=100 range.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn with_ocr(mut self, enabled: bool) -> Self {
        self.ocr_enabled = enabled;
        self
    }
}

/// Outcome of a conversion, returned once to the caller.
///
/// Exactly one of `output_path` / `error_message` is populated; the
/// constructors are the only way to build one, which keeps the two fields
/// mutually exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    pub success: bool,
    pub output_path: Option<String>,
    pub error_message: Option<String>,
}

impl ConversionResult {
    /// A successful conversion that wrote its output to `path`.
    pub fn ok(path: impl Into<String>) -> Self {
        Self {
            success: true,
            output_path: Some(path.into()),
            error_message: None,
        }
    }

    /// A failed conversion with a human-readable reason.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output_path: None,
            error_message: Some(message.into()),
        }
    }
}

/// Stages of the conversion state machine, used for tracing spans and
/// failure diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionStage {
    Idle,
    Decoding,
    Rendering,
    Rectifying,
    Recognizing,
    Assembling,
    Encoding,
    Done,
    Failed,
}

/// Bookkeeping record for a background conversion job.
///
/// Carries identity and timing only — the options live with the request and
/// never leak into output bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub id: JobId,
    pub options: ConversionOptions,
    pub created_at: DateTime<Utc>,
}

impl ConversionJob {
    pub fn new(options: ConversionOptions) -> Self {
        Self {
            id: JobId::new(),
            options,
            created_at: Utc::now(),
        }
    }
}

/// Classified payload of a recognized text snippet.
///
/// A closed set of variants, each carrying only the payload relevant to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecognizedField {
    Url(String),
    Email(String),
    Phone(String),
    BusinessCard {
        name: String,
        phone: Option<String>,
        email: Option<String>,
    },
    Text(String),
}

impl RecognizedField {
    /// Classify a recognized string by its shape.
    ///
    /// Heuristic only: URLs by scheme prefix, emails by a single `@` with a
    /// dotted domain, phone numbers by digit density. Anything else is plain
    /// text.
    pub fn classify(text: &str) -> Self {
        let trimmed = text.trim();

        if trimmed.starts_with("http://")
            || trimmed.starts_with("https://")
            || trimmed.starts_with("www.")
        {
            return Self::Url(trimmed.to_string());
        }

        if looks_like_email(trimmed) {
            return Self::Email(trimmed.to_string());
        }

        if looks_like_phone(trimmed) {
            return Self::Phone(trimmed.to_string());
        }

        Self::Text(trimmed.to_string())
    }
}

fn looks_like_email(s: &str) -> bool {
    if s.contains(char::is_whitespace) {
        return false;
    }
    let mut parts = s.splitn(2, '@');
    let (Some(local), Some(domain)) = (parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

fn looks_like_phone(s: &str) -> bool {
    let digits = s.chars().filter(|c| c.is_ascii_digit()).count();
    if digits < 7 {
        return false;
    }
    // Everything non-digit must be phone punctuation.
    s.chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')' | '.'))
}
