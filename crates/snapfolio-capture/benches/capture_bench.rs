// SPDX-License-Identifier: MIT
//
// Criterion benchmarks for the capture pipeline: boundary detection and
// perspective rectification on small synthetic document photos.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, GrayImage, Luma};

use snapfolio_capture::{BoundaryDetector, PerspectiveRectifier, RasterPage};
use snapfolio_core::EngineConfig;

/// Synthetic capture: a bright document rectangle on a dark background.
fn synthetic_capture(width: u32, height: u32) -> RasterPage {
    let mut img = GrayImage::from_pixel(width, height, Luma([25u8]));
    let (x0, y0) = (width / 8, height / 8);
    let (x1, y1) = (width - width / 8, height - height / 8);
    for y in y0..y1 {
        for x in x0..x1 {
            img.put_pixel(x, y, Luma([235u8]));
        }
    }
    RasterPage::new(DynamicImage::ImageLuma8(img), 0.24)
}

fn bench_boundary_detection(c: &mut Criterion) {
    let page = synthetic_capture(400, 500);
    let detector = BoundaryDetector::new(EngineConfig::default());

    c.bench_function("boundary_detection (400x500)", |b| {
        b.iter(|| black_box(detector.detect(black_box(&page))));
    });
}

fn bench_rectification(c: &mut Criterion) {
    let page = synthetic_capture(400, 500);
    let detector = BoundaryDetector::new(EngineConfig::default());
    let rectifier = PerspectiveRectifier::new(EngineConfig::default());
    let quad = detector
        .detect(&page)
        .expect("synthetic capture should yield a quad");

    c.bench_function("perspective_rectification (400x500)", |b| {
        b.iter(|| {
            let result = rectifier.rectify(black_box(page.clone()), black_box(&quad));
            black_box(result.page);
        });
    });
}

criterion_group!(benches, bench_boundary_detection, bench_rectification);
criterion_main!(benches);
