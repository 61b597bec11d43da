use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, ImageBuffer, Rgb};
use tempfile::TempDir;
use thumbsizer::config::{FilterType, SearchStrategy, ThumbnailConfig};
use thumbsizer::processing::{candidate_size, encode, OutputFormat};
use thumbsizer::ThumbnailSizer;

fn photo_like(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
        let wave = ((x as f32 / 17.0).sin() * (y as f32 / 23.0).cos() * 120.0 + 128.0) as u8;
        Rgb([wave, (x % 256) as u8, (y % 256) as u8])
    }))
}

fn benchmark_search(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let raster = photo_like(1200, 800);
    let mut group = c.benchmark_group("search");
    group.sample_size(10);

    let strategies = [
        ("binary", SearchStrategy::BinarySearch),
        ("fixed_step", SearchStrategy::fixed_step()),
    ];
    for (name, strategy) in strategies {
        let sizer = ThumbnailSizer::new(ThumbnailConfig {
            ceiling_bytes: 40 * 1024,
            filter: FilterType::Triangle,
            strategy,
            ..Default::default()
        })
        .unwrap();
        let output = dir.path().join(format!("{}.jpg", name));

        group.bench_function(BenchmarkId::new("1200x800", name), |b| {
            b.iter(|| sizer.run(black_box(&raster), &output).unwrap())
        });
    }
    group.finish();
}

fn benchmark_trial_parts(c: &mut Criterion) {
    let raster = photo_like(1200, 800);
    let (width, height) = candidate_size(raster.width(), raster.height(), 0.5);

    c.bench_function("scale_half_lanczos3", |b| {
        b.iter(|| {
            raster.resize_exact(
                black_box(width),
                black_box(height),
                FilterType::Lanczos3.into(),
            )
        })
    });

    let half = raster.resize_exact(width, height, FilterType::Triangle.into());
    c.bench_function("encode_jpeg_q75", |b| {
        b.iter(|| encode(black_box(&half), OutputFormat::Jpeg { quality: 75 }).unwrap())
    });
}

criterion_group!(benches, benchmark_search, benchmark_trial_parts);
criterion_main!(benches);
