//! Stereo block matching
//!
//! Dense and sparse disparity estimation from rectified image pairs using interchangeable
//! cost metrics (SAD, Census, NCC and mutual information) and winner-take-all selection with
//! optional validation checks.

use image::GrayImage;
use std::fmt::Debug;

pub mod config;
pub mod dense;
pub mod metric;
pub mod mutual_information;
pub mod row_score;
pub mod select;
pub mod sparse;

pub use config::{BlockApproach, DisparityConfig, MatchGeometry};
pub use dense::BlockMatcher;
pub use metric::{Census, CostMetric, MutualInfo, Ncc, Sad, Score};
pub use mutual_information::StereoMutualInformation;
pub use select::SelectWithChecks;
pub use sparse::{PreparedPair, SparseBlockMatcher, SparseMatch};

pub use disparity_core::{Error, Result};

use disparity_core::{ImageGray, Pixel};

/// Stereo matching algorithm trait
pub trait StereoDisparity<T: Pixel, D: DisparityValue = u8> {
    fn compute(&self, left: &ImageGray<T>, right: &ImageGray<T>) -> Result<DisparityImage<D>>;
}

/// Element type of a [`DisparityImage`].
pub trait DisparityValue: Copy + Debug + PartialEq + Send + Sync + 'static {
    const MAX: usize;

    fn from_usize(value: usize) -> Self;

    fn to_usize(self) -> usize;
}

impl DisparityValue for u8 {
    const MAX: usize = u8::MAX as usize;

    #[inline]
    fn from_usize(value: usize) -> Self {
        value as u8
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

impl DisparityValue for u16 {
    const MAX: usize = u16::MAX as usize;

    #[inline]
    fn from_usize(value: usize) -> Self {
        value as u16
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

/// Disparity image.
///
/// Each pixel holds the selected disparity minus `disparity_min`, or `disparity_range` when no
/// disparity could be estimated.
#[derive(Debug, Clone, PartialEq)]
pub struct DisparityImage<D = u8> {
    pub data: Vec<D>,
    pub width: usize,
    pub height: usize,
    pub disparity_min: usize,
    pub disparity_range: usize,
}

impl<D: DisparityValue> DisparityImage<D> {
    /// Image with every pixel marked invalid.
    pub fn new(
        width: usize,
        height: usize,
        disparity_min: usize,
        disparity_range: usize,
    ) -> Result<Self> {
        Self::check_range(disparity_range)?;
        Ok(Self {
            data: vec![D::from_usize(disparity_range); width * height],
            width,
            height,
            disparity_min,
            disparity_range,
        })
    }

    pub fn from_raw(
        width: usize,
        height: usize,
        disparity_min: usize,
        disparity_range: usize,
        data: Vec<D>,
    ) -> Result<Self> {
        Self::check_range(disparity_range)?;
        if data.len() != width * height {
            return Err(Error::DimensionMismatch(format!(
                "expected {} disparity values for {width}x{height}, got {}",
                width * height,
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            disparity_min,
            disparity_range,
        })
    }

    fn check_range(disparity_range: usize) -> Result<()> {
        if disparity_range > D::MAX {
            return Err(Error::InvalidParameters(format!(
                "disparity range {disparity_range} doesn't fit in a {}",
                std::any::type_name::<D>()
            )));
        }
        Ok(())
    }

    pub fn invalid_value(&self) -> D {
        D::from_usize(self.disparity_range)
    }

    pub fn is_invalid(&self, value: D) -> bool {
        value.to_usize() >= self.disparity_range
    }

    pub fn get(&self, x: usize, y: usize) -> Option<D> {
        if x >= self.width {
            return None;
        }
        self.data.get(y * self.width + x).copied()
    }

    pub fn set(&mut self, x: usize, y: usize, value: D) {
        if x >= self.width {
            return;
        }
        if let Some(cell) = self.data.get_mut(y * self.width + x) {
            *cell = value;
        }
    }

    /// Actual disparity at `(x, y)`, `None` outside the image or for invalid pixels.
    pub fn disparity_at(&self, x: usize, y: usize) -> Option<usize> {
        let value = self.get(x, y)?;
        (!self.is_invalid(value)).then(|| value.to_usize() + self.disparity_min)
    }

    pub fn validity_mask(&self) -> Vec<bool> {
        self.data.iter().map(|&v| !self.is_invalid(v)).collect()
    }

    pub fn count_invalid(&self) -> usize {
        self.data.iter().filter(|&&v| self.is_invalid(v)).count()
    }

    /// Convert to a grayscale image for visualization. Invalid pixels are black and valid
    /// disparities are spread over `1..=255`.
    pub fn to_image(&self) -> GrayImage {
        let mut img = GrayImage::new(self.width as u32, self.height as u32);
        let span = self.disparity_range.saturating_sub(1).max(1) as f32;
        for (pixel, &value) in img.pixels_mut().zip(&self.data) {
            pixel[0] = if self.is_invalid(value) {
                0
            } else {
                (1.0 + value.to_usize() as f32 / span * 254.0).round() as u8
            };
        }
        img
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disparity_image() {
        let mut disp = DisparityImage::<u8>::new(10, 10, 5, 64).unwrap();
        assert_eq!(disp.count_invalid(), 100);
        assert_eq!(disp.disparity_at(5, 5), None);

        disp.set(5, 5, 32);
        assert_eq!(disp.get(5, 5), Some(32));
        assert_eq!(disp.disparity_at(5, 5), Some(37));
        assert_eq!(disp.get(10, 0), None);
        assert!(disp.validity_mask()[55]);

        let img = disp.to_image();
        assert_eq!(img.dimensions(), (10, 10));
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        assert!(img.get_pixel(5, 5)[0] > 0);
    }

    #[test]
    fn range_must_fit_the_element_type() {
        assert!(DisparityImage::<u8>::new(4, 4, 0, 256).is_err());
        assert!(DisparityImage::<u16>::new(4, 4, 0, 256).is_ok());
        assert!(DisparityImage::<u8>::from_raw(4, 4, 0, 16, vec![0; 3]).is_err());
    }
}
