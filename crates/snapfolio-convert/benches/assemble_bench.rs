// SPDX-License-Identifier: MIT
//
// Searchable-PDF assembly throughput.

use criterion::{Criterion, criterion_group, criterion_main};
use image::{DynamicImage, Rgb, RgbImage};
use snapfolio_capture::RasterPage;
use snapfolio_convert::{AssembledPage, PixelBox, SearchablePdfAssembler, TextBlock};

fn sample_page(width: u32, height: u32) -> RasterPage {
    let mut img = RgbImage::from_pixel(width, height, Rgb([230u8, 230, 230]));
    for y in (20..height - 20).step_by(30) {
        for x in 20..width - 20 {
            img.put_pixel(x, y, Rgb([30u8, 30, 30]));
        }
    }
    RasterPage::new(DynamicImage::ImageRgb8(img), 72.0 / 300.0)
}

fn sample_blocks(width: u32, height: u32) -> Vec<TextBlock> {
    (0..20)
        .map(|i| {
            TextBlock::line(
                format!("recognized line number {i} with some ordinary words"),
                0.9,
                PixelBox::new(
                    20.0,
                    20.0 + i as f32 * 30.0,
                    width as f32 - 40.0,
                    (height as f32 / 40.0).max(8.0),
                ),
            )
        })
        .collect()
}

fn bench_assemble(c: &mut Criterion) {
    let (width, height) = (1240u32, 1754u32); // A4 at 150 DPI
    let pages: Vec<AssembledPage> = (0..4)
        .map(|_| AssembledPage {
            page: sample_page(width, height),
            blocks: sample_blocks(width, height),
        })
        .collect();

    c.bench_function("assemble_4_pages_with_text_layer", |b| {
        b.iter(|| {
            SearchablePdfAssembler::new(85)
                .assemble(std::hint::black_box(&pages))
                .unwrap()
        })
    });

    c.bench_function("assemble_1_page_image_only", |b| {
        let single = [AssembledPage {
            page: sample_page(width, height),
            blocks: Vec::new(),
        }];
        b.iter(|| {
            SearchablePdfAssembler::new(85)
                .assemble(std::hint::black_box(&single))
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_assemble);
criterion_main!(benches);
