use super::{CostMetric, Score};
use crate::config::MatchGeometry;
use crate::{Error, Result};
use disparity_core::{ImageBorder, ImageGray, Pixel};
use wide::{f32x8, f64x4};

/// Pixel types the sum of absolute differences is defined for.
pub trait SadPixel: Pixel {
    /// Accumulator wide enough for region sums of this pixel type.
    type SadScore: Score;

    /// Value range of the type, `None` for floating point types.
    const MAX_ERROR: Option<u64>;

    fn abs_diff(self, other: Self) -> Self::SadScore;

    fn sad_elements(left: &[Self], right: &[Self], out: &mut [Self::SadScore]) {
        for ((o, &l), &r) in out.iter_mut().zip(left).zip(right) {
            *o = l.abs_diff(r);
        }
    }
}

macro_rules! impl_sad_int {
    ($($t:ty => $acc:ty, $max:expr);* $(;)?) => {
        $(
            impl SadPixel for $t {
                type SadScore = $acc;
                const MAX_ERROR: Option<u64> = Some($max);

                #[inline]
                fn abs_diff(self, other: Self) -> $acc {
                    (self as $acc - other as $acc).abs()
                }
            }
        )*
    };
}

impl_sad_int!(
    u8 => i32, u8::MAX as u64;
    i8 => i32, u8::MAX as u64;
    u16 => i32, u16::MAX as u64;
    i16 => i32, u16::MAX as u64;
    i32 => i64, u32::MAX as u64;
);

impl SadPixel for f32 {
    type SadScore = f32;
    const MAX_ERROR: Option<u64> = None;

    #[inline]
    fn abs_diff(self, other: Self) -> f32 {
        (self - other).abs()
    }

    fn sad_elements(left: &[f32], right: &[f32], out: &mut [f32]) {
        let n = out.len();
        let lanes = n - n % 8;
        let mut l = [0.0f32; 8];
        let mut r = [0.0f32; 8];
        for i in (0..lanes).step_by(8) {
            l.copy_from_slice(&left[i..i + 8]);
            r.copy_from_slice(&right[i..i + 8]);
            let diff = (f32x8::from(l) - f32x8::from(r)).abs();
            out[i..i + 8].copy_from_slice(&diff.to_array());
        }
        for i in lanes..n {
            out[i] = (left[i] - right[i]).abs();
        }
    }
}

impl SadPixel for f64 {
    type SadScore = f64;
    const MAX_ERROR: Option<u64> = None;

    #[inline]
    fn abs_diff(self, other: Self) -> f64 {
        (self - other).abs()
    }

    fn sad_elements(left: &[f64], right: &[f64], out: &mut [f64]) {
        let n = out.len();
        let lanes = n - n % 4;
        let mut l = [0.0f64; 4];
        let mut r = [0.0f64; 4];
        for i in (0..lanes).step_by(4) {
            l.copy_from_slice(&left[i..i + 4]);
            r.copy_from_slice(&right[i..i + 4]);
            let diff = (f64x4::from(l) - f64x4::from(r)).abs();
            out[i..i + 4].copy_from_slice(&diff.to_array());
        }
        for i in lanes..n {
            out[i] = (left[i] - right[i]).abs();
        }
    }
}

/// Sum of Absolute Differences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sad;

impl<T: SadPixel> CostMetric<T> for Sad {
    type Score = T::SadScore;
    type Stats = ();

    fn name(&self) -> &'static str {
        "SAD"
    }

    fn score_elements(&self, left: &[T], right: &[T], out: &mut [Self::Score]) {
        T::sad_elements(left, right, out);
    }

    fn max_per_pixel_error(&self) -> Result<u64> {
        T::MAX_ERROR.ok_or_else(|| {
            Error::Unsupported(format!(
                "SAD over {:?} pixels has no upper bound on the per-pixel error",
                T::PIXEL_TYPE
            ))
        })
    }

    fn prepare(
        &self,
        _left: &ImageGray<T>,
        _right: &ImageGray<T>,
        _border: &dyn ImageBorder<T>,
        _geometry: &MatchGeometry,
    ) -> Result<()> {
        Ok(())
    }
}
