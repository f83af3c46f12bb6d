//! Benchmarks for dense and sparse block matching

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use disparity_core::census::census_5x5;
use disparity_core::{BorderMode, CensusVariant, ImageGray};
use disparity_stereo::{
    BlockApproach, BlockMatcher, Census, DisparityConfig, DisparityImage, Ncc, Sad,
    SparseBlockMatcher,
};
use image::{ImageBuffer, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Random texture seen with a constant disparity.
fn create_stereo_pair(width: u32, height: u32, disparity: u32) -> (ImageGray<u8>, ImageGray<u8>) {
    let mut rng = StdRng::seed_from_u64(42);
    let base: ImageGray<u8> =
        ImageBuffer::from_fn(width + disparity, height, |_, _| Luma([rng.gen::<u8>()]));
    let left = ImageBuffer::from_fn(width, height, |x, y| *base.get_pixel(x, y));
    let right = ImageBuffer::from_fn(width, height, |x, y| *base.get_pixel(x + disparity, y));
    (left, right)
}

fn config() -> DisparityConfig {
    DisparityConfig::new()
        .with_disparity(0, 64)
        .with_region_radius(3, 3)
}

fn benchmark_dense_sad(c: &mut Criterion) {
    let mut group = c.benchmark_group("dense_sad");
    group.measurement_time(Duration::from_secs(5));
    group.sample_size(20);

    for size in [128u32, 256, 512] {
        let (left, right) = create_stereo_pair(size, size, 10);
        let matcher = BlockMatcher::new(config(), Sad).unwrap();
        group.bench_with_input(
            BenchmarkId::new("u8", format!("{}x{}", size, size)),
            &(left, right),
            |b, (l, r)| {
                b.iter(|| {
                    let d: DisparityImage = matcher.compute(black_box(l), black_box(r)).unwrap();
                    d
                });
            },
        );
    }

    group.finish();
}

fn benchmark_dense_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("dense_metrics_256");
    group.sample_size(10);

    let (left, right) = create_stereo_pair(256, 256, 10);
    let left_f = disparity_core::convert_to_f32(&left);
    let right_f = disparity_core::convert_to_f32(&right);
    let left_c = census_5x5(&left, &BorderMode::Replicate).unwrap();
    let right_c = census_5x5(&right, &BorderMode::Replicate).unwrap();

    let sad_f32 = BlockMatcher::new(config(), Sad).unwrap();
    group.bench_function("sad_f32", |b| {
        b.iter(|| {
            let d: DisparityImage = sad_f32.compute(black_box(&left_f), black_box(&right_f)).unwrap();
            d
        })
    });

    let census = BlockMatcher::new(config(), Census::from_variant(CensusVariant::Block5x5)).unwrap();
    group.bench_function("census_5x5", |b| {
        b.iter(|| {
            let d: DisparityImage = census.compute(black_box(&left_c), black_box(&right_c)).unwrap();
            d
        })
    });

    let ncc = BlockMatcher::new(config(), Ncc::new()).unwrap();
    group.bench_function("ncc_f32", |b| {
        b.iter(|| {
            let d: DisparityImage = ncc.compute(black_box(&left_f), black_box(&right_f)).unwrap();
            d
        })
    });

    let best_five = BlockMatcher::new(config().with_approach(BlockApproach::BestFive), Sad).unwrap();
    group.bench_function("sad_best_five", |b| {
        b.iter(|| {
            let d: DisparityImage = best_five.compute(black_box(&left), black_box(&right)).unwrap();
            d
        })
    });

    group.finish();
}

fn benchmark_sparse(c: &mut Criterion) {
    let (left, right) = create_stereo_pair(256, 256, 10);
    let mut matcher = SparseBlockMatcher::new(config(), Sad).unwrap();
    let pair = matcher.prepare(&left, &right).unwrap();

    c.bench_function("sparse_sad_100_points", |b| {
        b.iter(|| {
            for i in 0..100usize {
                let x = 64 + (i * 37) % 180;
                let y = 8 + (i * 53) % 240;
                black_box(matcher.process(&pair, x, y).unwrap());
            }
        })
    });
}

criterion_group!(
    benches,
    benchmark_dense_sad,
    benchmark_dense_metrics,
    benchmark_sparse
);
criterion_main!(benches);
