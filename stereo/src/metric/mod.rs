//! Pixel similarity metrics. Every metric produces costs where smaller is better so the
//! accumulation and selection code does not need to know which metric is in use.

mod census;
mod mutual_info;
mod ncc;
mod sad;

pub use census::Census;
pub use mutual_info::{IntensityPixel, MutualInfo};
pub use ncc::{Ncc, NccStats};
pub use sad::{Sad, SadPixel};

use crate::config::MatchGeometry;
use crate::{Error, Result};
use disparity_core::{ImageBorder, ImageGray, Pixel};
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Numeric type used for per-pixel costs and their window sums.
pub trait Score:
    Copy
    + Debug
    + PartialOrd
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + AddAssign
    + SubAssign
    + 'static
{
    const ZERO: Self;
    /// Larger than any score a metric can produce.
    const WORST: Self;

    fn to_f64(self) -> f64;

    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_score {
    ($($t:ty),*) => {
        $(
            impl Score for $t {
                const ZERO: Self = 0 as $t;
                const WORST: Self = <$t>::MAX;

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn from_f64(value: f64) -> Self {
                    value as $t
                }
            }
        )*
    };
}

impl_score!(i32, i64, f32, f64);

/// Fails when the sum of `regions` region scores of `area` pixels can exceed the range of the
/// metric's score type. Metrics without a per-pixel bound are accepted.
pub fn check_score_range<T: Pixel, M: CostMetric<T>>(
    metric: &M,
    area: usize,
    regions: usize,
) -> Result<()> {
    let Ok(per_pixel) = metric.max_per_pixel_error() else {
        return Ok(());
    };
    let worst = per_pixel as f64 * area as f64 * regions as f64;
    if worst > M::Score::WORST.to_f64() {
        return Err(Error::InvalidParameters(format!(
            "{} scores over {regions} region(s) of {area} pixels can reach {worst}, beyond the \
             {} accumulator",
            metric.name(),
            std::any::type_name::<M::Score>()
        )));
    }
    Ok(())
}

/// Cost between a left and a right pixel.
///
/// Metrics that need per-image statistics compute them once per image pair in
/// [`prepare`](CostMetric::prepare) and finish each region score in
/// [`normalize`](CostMetric::normalize).
pub trait CostMetric<T: Pixel>: Send + Sync {
    type Score: Score;
    type Stats: Send + Sync;

    fn name(&self) -> &'static str;

    /// Writes `cost(left[i], right[i])` into `out[i]` for every element of `out`.
    fn score_elements(&self, left: &[T], right: &[T], out: &mut [Self::Score]);

    /// Largest cost a single pixel pair can produce.
    fn max_per_pixel_error(&self) -> Result<u64>;

    fn requires_normalize(&self) -> bool {
        false
    }

    /// Pre-pass over the image pair.
    fn prepare(
        &self,
        left: &ImageGray<T>,
        right: &ImageGray<T>,
        border: &dyn ImageBorder<T>,
        geometry: &MatchGeometry,
    ) -> Result<Self::Stats>;

    /// Converts the raw sum of a region centred at `(x_left, y)` in the left image and
    /// `(x_right, y)` in the right image into its final score.
    fn normalize(
        &self,
        _stats: &Self::Stats,
        _x_left: usize,
        _x_right: usize,
        _y: usize,
        _raw: Self::Score,
        _area: usize,
    ) -> Result<Self::Score> {
        Err(Error::Unsupported(format!(
            "{} scores do not require normalization",
            self.name()
        )))
    }
}
