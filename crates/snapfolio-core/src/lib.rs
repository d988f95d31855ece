// SPDX-License-Identifier: MIT
//
// snapfolio-core — Shared types, error taxonomy, and configuration for the
// Snapfolio document conversion pipeline.

pub mod cancel;
pub mod config;
pub mod error;
pub mod types;

pub use cancel::CancelToken;
pub use config::EngineConfig;
pub use error::SnapfolioError;
pub use types::*;
