// SPDX-License-Identifier: MIT
//
// snapfolio-convert — Multi-format document conversion.
//
// Turns decoded source documents into target outputs: photographed pages into
// searchable PDFs with an invisible geometry-aligned text layer, image sets
// into re-encoded images or plain text, and structured text into laid-out PDF
// pages. The format converter is the public entry point; recognition and
// non-image decoding sit behind injected collaborator traits.

pub mod convert;
pub mod layout;
pub mod pdf;
pub mod recognize;
pub mod source;
pub mod worker;

pub use convert::Converter;
pub use layout::{PageLayout, StructuredContent, TextLayout};
pub use pdf::{AssembledPage, SearchablePdfAssembler};
pub use recognize::{PixelBox, TextBlock, TextLine, TextRecognizer};
pub use source::{PageRasterSource, PdfPageRenderer, StructuredDecoder};
pub use worker::{ConversionHandle, spawn_conversion};

#[cfg(feature = "ocr")]
pub use recognize::ocrs_engine::{OcrsConfig, OcrsRecognizer};
