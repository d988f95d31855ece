// SPDX-License-Identifier: MIT
//
// snapfolio-capture — Turning photographed pages into upright rectangular
// document images.
//
// Provides the raster page buffer shared by the pipeline, quadrilateral
// boundary detection, perspective rectification with a conservative crop
// fallback, and a throttled detector for live preview streams.

pub mod boundary;
pub mod page;
pub mod preview;
pub mod rectify;

pub use boundary::{BoundaryDetector, DetectedQuad, Point};
pub use page::RasterPage;
pub use preview::PreviewDetector;
pub use rectify::{PerspectiveRectifier, Rectified};
