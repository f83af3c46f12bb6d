use disparity_core::census::{census_5x5, census_7x7};
use disparity_core::{BorderFn, BorderMode, CensusVariant, ImageGray};
use disparity_stereo::metric::SadPixel;
use disparity_stereo::*;
use image::{ImageBuffer, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

fn random_u8(width: u32, height: u32, seed: u64) -> ImageGray<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    ImageBuffer::from_fn(width, height, |_, _| Luma([rng.gen::<u8>()]))
}

/// Left and right views of a random scene where every left pixel appears `shift` columns to
/// the left in the right image.
fn shifted_pair(width: u32, height: u32, shift: u32, seed: u64) -> (ImageGray<u8>, ImageGray<u8>) {
    let base = random_u8(width + shift, height, seed);
    let left = ImageBuffer::from_fn(width, height, |x, y| *base.get_pixel(x, y));
    let right = ImageBuffer::from_fn(width, height, |x, y| *base.get_pixel(x + shift, y));
    (left, right)
}

fn to_f32(image: &ImageGray<u8>, scale: f32) -> ImageGray<f32> {
    ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        Luma([image.get_pixel(x, y)[0] as f32 * scale])
    })
}

/// Every interior pixel of the dense result must match the sparse query. Returns the number
/// of valid pixels.
fn assert_dense_matches_sparse<T, M>(
    config: &DisparityConfig,
    dense_metric: M,
    sparse_metric: M,
    left: &ImageGray<T>,
    right: &ImageGray<T>,
) -> usize
where
    T: disparity_core::Pixel,
    M: CostMetric<T>,
{
    let dense: DisparityImage = BlockMatcher::new(config.clone(), dense_metric)
        .unwrap()
        .compute(left, right)
        .unwrap();
    let mut sparse = SparseBlockMatcher::new(config.clone(), sparse_metric).unwrap();
    let pair = sparse.prepare(left, right).unwrap();
    let geometry = *pair.geometry();

    let mut valid = 0;
    for y in geometry.interior_rows() {
        for x in geometry.interior_columns() {
            let expected = dense.get(x, y).unwrap();
            let found = sparse.process(&pair, x, y).unwrap();
            if dense.is_invalid(expected) {
                assert!(!found.valid, "({x}, {y}) dense invalid, sparse {found:?}");
            } else {
                valid += 1;
                assert!(found.valid, "({x}, {y}) dense {expected}, sparse invalid");
                assert_eq!(
                    found.disparity,
                    (expected as usize + geometry.disparity_min) as f64,
                    "({x}, {y})"
                );
            }
        }
    }
    valid
}

#[test]
fn dense_is_deterministic_and_thread_independent() {
    let (left, right) = shifted_pair(80, 40, 6, 1);
    let config = DisparityConfig::new()
        .with_disparity(0, 20)
        .with_region_radius(2, 2);

    let parallel = BlockMatcher::new(config.clone(), Sad).unwrap();
    let sequential = BlockMatcher::new(config, Sad)
        .unwrap()
        .with_concurrency(false);

    let a: DisparityImage = parallel.compute(&left, &right).unwrap();
    let b: DisparityImage = parallel.compute(&left, &right).unwrap();
    let c: DisparityImage = sequential.compute(&left, &right).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, c);
}

#[test]
fn dense_and_sparse_agree_for_sad() {
    let (left, right) = shifted_pair(60, 24, 5, 2);
    let config = DisparityConfig::new()
        .with_disparity(2, 14)
        .with_region_radius(2, 1);
    assert!(assert_dense_matches_sparse(&config, Sad, Sad, &left, &right) > 0);

    // Unrelated images exercise the rejection paths.
    let noise = random_u8(60, 24, 3);
    assert_dense_matches_sparse(&config, Sad, Sad, &left, &noise);
}

#[test]
fn dense_and_sparse_agree_with_custom_border() {
    let (left, right) = shifted_pair(40, 16, 3, 4);
    let border = || {
        BorderFn(|_: &ImageGray<u8>, x: isize, y: isize| {
            (x * 31 + y * 7).rem_euclid(256) as u8
        })
    };
    let config = DisparityConfig::new()
        .with_disparity(0, 12)
        .with_region_radius(2, 2)
        .with_right_to_left_tolerance(-1);

    let dense: DisparityImage = BlockMatcher::new(config.clone(), Sad)
        .unwrap()
        .with_border(border())
        .compute(&left, &right)
        .unwrap();
    let mut sparse = SparseBlockMatcher::new(config, Sad)
        .unwrap()
        .with_border(border());
    let pair = sparse.prepare(&left, &right).unwrap();
    for y in 2..14 {
        for x in 2..38 {
            let found = sparse.process(&pair, x, y).unwrap();
            match dense.disparity_at(x, y) {
                Some(d) => assert_eq!(found.disparity, d as f64),
                None => assert!(!found.valid),
            }
        }
    }
}

#[test]
fn dense_and_sparse_agree_for_census() {
    let (left, right) = shifted_pair(56, 24, 4, 5);
    let left_c = census_5x5(&left, &BorderMode::Replicate).unwrap();
    let right_c = census_5x5(&right, &BorderMode::Replicate).unwrap();
    let census = Census::from_variant(CensusVariant::Block5x5);

    let config = DisparityConfig::new()
        .with_disparity(0, 12)
        .with_region_radius(1, 1);
    assert!(assert_dense_matches_sparse(&config, census, census, &left_c, &right_c) > 0);

    let dense: DisparityImage = BlockMatcher::new(config, census)
        .unwrap()
        .compute(&left_c, &right_c)
        .unwrap();
    // Census windows near the shifted edge differ, so only check well inside.
    assert_eq!(dense.disparity_at(30, 12), Some(4));
}

#[test]
fn dense_and_sparse_agree_for_ncc() {
    let (left, right) = shifted_pair(48, 20, 3, 6);
    let left = to_f32(&left, 1.0);
    let right = to_f32(&right, 1.0);
    let config = DisparityConfig::new()
        .with_disparity(0, 10)
        .with_region_radius(2, 2);
    assert!(assert_dense_matches_sparse(&config, Ncc::new(), Ncc::new(), &left, &right) > 0);
}

/// Dense and sparse SAD on a shifted pair mapped into `T`. Every pixel whose right region is
/// inside the image has an exact match at the true shift.
fn check_sad_pixel_type<T: SadPixel>(map: impl Fn(u8) -> T) {
    let shift = 5;
    let (left, right) = shifted_pair(48, 18, shift, 20);
    let convert = |img: &ImageGray<u8>| -> ImageGray<T> {
        ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
            Luma([map(img.get_pixel(x, y)[0])])
        })
    };
    let (left, right) = (convert(&left), convert(&right));
    let config = DisparityConfig::new()
        .with_disparity(1, 12)
        .with_region_radius(2, 1);

    assert!(assert_dense_matches_sparse(&config, Sad, Sad, &left, &right) > 0);

    let dense: DisparityImage = BlockMatcher::new(config, Sad)
        .unwrap()
        .compute(&left, &right)
        .unwrap();
    for y in 1..17 {
        for x in shift as usize + 2..46 {
            assert_eq!(dense.disparity_at(x, y), Some(shift as usize), "({x}, {y})");
        }
    }
}

#[test]
fn sad_matches_for_every_pixel_type() {
    check_sad_pixel_type(|v| v);
    check_sad_pixel_type(|v| (v as i16 - 128) as i8);
    check_sad_pixel_type(|v| v as u16 * 257);
    check_sad_pixel_type(|v| (v as i16 - 128) * 200);
    check_sad_pixel_type(|v| v as i32 * 3_000_000 - 400_000_000);
    check_sad_pixel_type(|v| v as f32 * 0.5 + 3.0);
    check_sad_pixel_type(|v| v as f64 * 0.25 - 10.0);
}

#[test]
fn dense_and_sparse_agree_for_census_7x7() {
    let (left, right) = shifted_pair(50, 22, 3, 21);
    let left_c = census_7x7(&left, &BorderMode::Reflect101).unwrap();
    let right_c = census_7x7(&right, &BorderMode::Reflect101).unwrap();
    let census = Census::from_variant(CensusVariant::Block7x7);
    let config = DisparityConfig::new()
        .with_disparity(0, 10)
        .with_region_radius(2, 2);
    assert!(assert_dense_matches_sparse(&config, census, census, &left_c, &right_c) > 0);
}

#[test]
fn dense_and_sparse_agree_for_mutual_information() {
    let (left, right) = shifted_pair(56, 24, 4, 22);
    let config = DisparityConfig::new()
        .with_disparity(0, 12)
        .with_region_radius(2, 2);

    let initial: DisparityImage = BlockMatcher::new(config.clone().without_validation(), Sad)
        .unwrap()
        .compute(&left, &right)
        .unwrap();
    let mut table = StereoMutualInformation::new();
    table.process(&left, &right, &initial).unwrap();
    table.precompute_scaled_cost(1000);
    let table = Arc::new(table);

    let valid = assert_dense_matches_sparse(
        &config,
        MutualInfo::from_shared(Arc::clone(&table)),
        MutualInfo::from_shared(Arc::clone(&table)),
        &left,
        &right,
    );
    assert!(valid > 0);
}

#[test]
fn ncc_accepts_integer_input() {
    let shift = 3;
    let (left, right) = shifted_pair(48, 20, shift, 23);
    let to_u16 = |img: &ImageGray<u8>| -> ImageGray<u16> {
        ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
            Luma([img.get_pixel(x, y)[0] as u16 * 3 + 7])
        })
    };
    let (left, right) = (to_u16(&left), to_u16(&right));
    let config = DisparityConfig::new()
        .with_disparity(0, 10)
        .with_region_radius(2, 2);

    for normalize in [false, true] {
        let ncc = Ncc::new().with_normalize_input(normalize);
        let dense: DisparityImage = BlockMatcher::<f32, _>::new(config.clone(), ncc)
            .unwrap()
            .compute_converted(&left, &right)
            .unwrap();
        for y in 2..18 {
            for x in shift as usize + 2..46 {
                assert_eq!(dense.disparity_at(x, y), Some(shift as usize), "({x}, {y})");
            }
        }

        let mut sparse = SparseBlockMatcher::<f32, _>::new(config.clone(), ncc).unwrap();
        let pair = sparse.prepare_converted(&left, &right).unwrap();
        for (x, y) in [(10, 5), (25, 10), (40, 15)] {
            let found = sparse.process(&pair, x, y).unwrap();
            assert_eq!(found, SparseMatch { valid: true, disparity: shift as f64 });
        }
    }
}

#[test]
fn best_five_from_json() {
    let config: DisparityConfig = serde_json::from_str(
        r#"{"disparity_range": 12, "region_radius_x": 2, "region_radius_y": 2,
            "approach": "BestFive", "max_per_pixel_error": 40}"#,
    )
    .unwrap();
    assert_eq!(config.approach, BlockApproach::BestFive);
    assert_eq!(config.effective_max_error(), 40 * 25 * 3);

    let (left, right) = shifted_pair(48, 24, 4, 24);
    let dense: DisparityImage = BlockMatcher::new(config.clone(), Sad)
        .unwrap()
        .compute(&left, &right)
        .unwrap();
    assert_eq!(dense.disparity_at(24, 12), Some(4));
    assert!(SparseBlockMatcher::<u8, _>::new(config, Sad).is_err());
}

#[test]
fn values_are_offsets_or_sentinel() {
    let (left, right) = shifted_pair(50, 20, 7, 7);
    let config = DisparityConfig::new()
        .with_disparity(3, 12)
        .with_region_radius(1, 2);
    let dense: DisparityImage = BlockMatcher::new(config, Sad)
        .unwrap()
        .compute(&left, &right)
        .unwrap();
    assert!(dense.data.iter().all(|&v| v <= 12));
    // Border columns and rows never get a disparity.
    for y in 0..20 {
        assert_eq!(dense.get(0, y), Some(12));
        assert_eq!(dense.get(49, y), Some(12));
    }
    for x in 0..50 {
        assert_eq!(dense.get(x, 0), Some(12));
        assert_eq!(dense.get(x, 19), Some(12));
    }
}

#[test]
fn impossible_max_error_rejects_everything() {
    let left = random_u8(40, 20, 8);
    let right = random_u8(40, 20, 9);
    let config = DisparityConfig::new()
        .with_disparity(0, 16)
        .with_region_radius(1, 1)
        .with_max_error(1);
    let dense: DisparityImage = BlockMatcher::new(config.clone(), Sad)
        .unwrap()
        .compute(&left, &right)
        .unwrap();
    assert_eq!(dense.count_invalid(), 40 * 20);

    let mut sparse = SparseBlockMatcher::new(config, Sad).unwrap();
    let pair = sparse.prepare(&left, &right).unwrap();
    assert!(!sparse.process(&pair, 20, 10).unwrap().valid);
}

#[test]
fn disparity_never_exceeds_column() {
    let (left, right) = shifted_pair(40, 12, 10, 10);
    let config = DisparityConfig::new()
        .with_disparity(0, 30)
        .with_region_radius(1, 1)
        .without_validation();
    let dense: DisparityImage = BlockMatcher::new(config, Sad)
        .unwrap()
        .compute(&left, &right)
        .unwrap();
    for y in 0..12 {
        for x in 0..40 {
            if let Some(d) = dense.disparity_at(x, y) {
                assert!(d <= x, "({x}, {y}) has disparity {d}");
            }
        }
    }
    assert_eq!(dense.disparity_at(25, 6), Some(10));
}

#[test]
fn identical_images_select_zero() {
    let img = random_u8(36, 16, 11);
    let config = DisparityConfig::new()
        .with_disparity(0, 8)
        .with_region_radius(2, 1);
    let dense: DisparityImage = BlockMatcher::new(config.clone(), Sad)
        .unwrap()
        .compute(&img, &img)
        .unwrap();
    for y in 1..15 {
        for x in 2..34 {
            assert_eq!(dense.get(x, y), Some(0), "({x}, {y})");
        }
    }

    let mut sparse = SparseBlockMatcher::new(config, Sad).unwrap();
    let pair = sparse.prepare(&img, &img).unwrap();
    let found = sparse.process(&pair, 20, 8).unwrap();
    assert_eq!(found, SparseMatch { valid: true, disparity: 0.0 });
    assert_eq!(sparse.scores()[0], 0);
    assert!(sparse.scores()[1..].iter().all(|&s| s > 0));
}

#[test]
fn ncc_ignores_intensity_scale() {
    let shift = 4;
    let (left, right) = shifted_pair(48, 20, shift, 12);
    let left = to_f32(&left, 1.0);
    let config = DisparityConfig::new()
        .with_disparity(0, 12)
        .with_region_radius(2, 2)
        .without_validation();
    let matcher = BlockMatcher::new(config, Ncc::new()).unwrap();

    let plain: DisparityImage = matcher.compute(&left, &to_f32(&right, 1.0)).unwrap();
    let scaled: DisparityImage = matcher.compute(&left, &to_f32(&right, 2.0)).unwrap();
    for y in 2..18 {
        for x in shift as usize + 2..46 {
            assert_eq!(plain.disparity_at(x, y), Some(shift as usize), "({x}, {y})");
            assert_eq!(scaled.disparity_at(x, y), Some(shift as usize), "({x}, {y})");
        }
    }
}

#[test]
fn right_to_left_rejects_repeated_texture() {
    let (width, height, shift) = (64u32, 5u32, 4u32);
    // Vertical bars: every row is the same random sequence.
    let mut rng = StdRng::seed_from_u64(13);
    let bars: Vec<u8> = (0..width + shift).map(|_| rng.gen()).collect();
    let mut left_row: Vec<u8> = bars[..width as usize].to_vec();
    let right_row: Vec<u8> = bars[shift as usize..].to_vec();

    // The left window around column 27 repeats the one around column 30.
    let (x0, k) = (30usize, 3usize);
    for dx in 0..3 {
        left_row[x0 - k - 1 + dx] = left_row[x0 - 1 + dx];
    }
    let left: ImageGray<u8> =
        ImageBuffer::from_fn(width, height, |x, _| Luma([left_row[x as usize]]));
    let right: ImageGray<u8> =
        ImageBuffer::from_fn(width, height, |x, _| Luma([right_row[x as usize]]));

    let config = DisparityConfig::new()
        .with_disparity(0, 16)
        .with_region_radius(1, 1)
        .with_texture_threshold(0.0)
        .with_right_to_left_tolerance(1);
    let dense: DisparityImage = BlockMatcher::new(config.clone(), Sad)
        .unwrap()
        .compute(&left, &right)
        .unwrap();

    assert_eq!(dense.disparity_at(x0, 2), None);
    for x in 36..63 {
        assert_eq!(dense.disparity_at(x, 2), Some(shift as usize), "x={x}");
    }

    let mut sparse = SparseBlockMatcher::new(config.clone(), Sad).unwrap();
    let pair = sparse.prepare(&left, &right).unwrap();
    assert!(!sparse.process(&pair, x0, 2).unwrap().valid);
    assert_eq!(sparse.process(&pair, 40, 2).unwrap().disparity, shift as f64);

    // Without the check the repeated window keeps its left-to-right match.
    let unchecked: DisparityImage = BlockMatcher::new(config.with_right_to_left_tolerance(-1), Sad)
        .unwrap()
        .compute(&left, &right)
        .unwrap();
    assert_eq!(unchecked.disparity_at(x0, 2), Some(shift as usize));
}

#[test]
fn mutual_information_matches_after_training() {
    let (left, right) = shifted_pair(64, 32, 5, 14);
    let config = DisparityConfig::new()
        .with_disparity(0, 12)
        .with_region_radius(2, 2)
        .without_validation();

    // Train on the SAD result, then match with the learned table.
    let initial: DisparityImage = BlockMatcher::new(config.clone(), Sad)
        .unwrap()
        .compute(&left, &right)
        .unwrap();
    let mut table = StereoMutualInformation::new();
    table.process(&left, &right, &initial).unwrap();
    table.precompute_scaled_cost(2048);

    let matcher = BlockMatcher::new(config, MutualInfo::new(table)).unwrap();
    let dense: DisparityImage = matcher.compute(&left, &right).unwrap();
    let correct = (20..60)
        .flat_map(|x| (4..28).map(move |y| (x, y)))
        .filter(|&(x, y)| dense.disparity_at(x, y) == Some(5))
        .count();
    assert!(correct > 40 * 24 * 9 / 10, "only {correct} correct");
}

#[test]
fn config_from_json_drives_matcher() {
    let config: DisparityConfig = serde_json::from_str(
        r#"{"disparity_min": 1, "disparity_range": 8, "region_radius_x": 1, "region_radius_y": 1,
            "border": "Replicate"}"#,
    )
    .unwrap();
    assert_eq!(config.border, BorderMode::Replicate);
    let (left, right) = shifted_pair(30, 10, 3, 15);
    let dense: DisparityImage = BlockMatcher::new(config, Sad)
        .unwrap()
        .compute(&left, &right)
        .unwrap();
    assert_eq!(dense.disparity_at(15, 5), Some(3));
}

#[test]
fn invalid_configuration_is_rejected() {
    let bad = DisparityConfig::new().with_disparity(0, 1);
    assert!(matches!(
        BlockMatcher::<u8, _>::new(bad.clone(), Sad),
        Err(Error::InvalidParameters(_))
    ));
    assert!(SparseBlockMatcher::<u8, _>::new(bad, Sad).is_err());

    let tiny = random_u8(4, 4, 16);
    let matcher = BlockMatcher::new(DisparityConfig::new().with_region_radius(3, 3), Sad).unwrap();
    let res: Result<DisparityImage> = matcher.compute(&tiny, &tiny);
    assert!(matches!(res, Err(Error::DimensionMismatch(_))));
}
