// SPDX-License-Identifier: MIT
//
// Unified error types for Snapfolio.

use thiserror::Error;

use crate::types::DocumentFormat;

/// Top-level error type for all Snapfolio operations.
#[derive(Debug, Error)]
pub enum SnapfolioError {
    // -- Conversion errors --
    #[error("unsupported conversion: {source_format:?} -> {target_format:?}")]
    UnsupportedFormatPair {
        source_format: DocumentFormat,
        target_format: DocumentFormat,
    },

    #[error("failed to decode source: {0}")]
    Decode(String),

    #[error("failed to encode output: {0}")]
    Encode(String),

    #[error("conversion cancelled")]
    Cancelled,

    // -- Capture / image errors --
    #[error("image processing failed: {0}")]
    Image(String),

    #[error("PDF assembly failed: {0}")]
    Pdf(String),

    // -- Recognition boundary --
    #[error("text recognition failed: {0}")]
    Recognition(String),

    // -- I/O --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SnapfolioError {
    /// Whether this error aborts an entire conversion.
    ///
    /// Recognition failures are recovered per page (the page is emitted
    /// without a text layer); everything else is fatal to the conversion.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Recognition(_))
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SnapfolioError>;
