use crate::{Error, Result};
use disparity_core::BorderMode;
use serde::{Deserialize, Serialize};

/// How region scores are combined into the score of a pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockApproach {
    /// The score of the region centred on the pixel.
    #[default]
    Basic,
    /// The centre region plus the two best of the four regions centred at
    /// `(x ± radius_x, y ± radius_y)`. Dense matching only.
    BestFive,
}

impl BlockApproach {
    /// Number of regions summed into one pixel score.
    pub fn regions(self) -> usize {
        match self {
            BlockApproach::Basic => 1,
            BlockApproach::BestFive => 3,
        }
    }
}

/// Block matching parameters shared by the dense and sparse matchers.
///
/// Integer fields are signed so that nonsensical values are reported by [`validate`]
/// instead of wrapping around.
///
/// [`validate`]: DisparityConfig::validate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisparityConfig {
    /// Smallest disparity considered.
    pub disparity_min: i32,
    /// Number of disparities considered, `disparity_max - disparity_min + 1`.
    pub disparity_range: i32,
    pub region_radius_x: i32,
    pub region_radius_y: i32,
    /// Largest accepted pixel score. `<= 0` disables the check.
    pub max_error: i32,
    /// When `> 0`, replaces `max_error` with this value times the number of pixels that
    /// contribute to a pixel score.
    pub max_per_pixel_error: i32,
    /// Allowed difference between left-to-right and right-to-left matches. `< 0` disables.
    pub right_to_left_tolerance: i32,
    /// Minimum relative gap between the best and second best score. `<= 0` disables.
    pub texture_threshold: f64,
    /// Border used for samples outside the image.
    pub border: BorderMode,
    pub approach: BlockApproach,
}

impl Default for DisparityConfig {
    fn default() -> Self {
        Self {
            disparity_min: 0,
            disparity_range: 64,
            region_radius_x: 3,
            region_radius_y: 3,
            max_error: -1,
            max_per_pixel_error: -1,
            right_to_left_tolerance: 1,
            texture_threshold: 0.15,
            border: BorderMode::Reflect101,
            approach: BlockApproach::Basic,
        }
    }
}

impl DisparityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_disparity(mut self, min: i32, range: i32) -> Self {
        self.disparity_min = min;
        self.disparity_range = range;
        self
    }

    pub fn with_region_radius(mut self, radius_x: i32, radius_y: i32) -> Self {
        self.region_radius_x = radius_x;
        self.region_radius_y = radius_y;
        self
    }

    pub fn with_max_error(mut self, max_error: i32) -> Self {
        self.max_error = max_error;
        self
    }

    /// Error limit per pixel, resolved against the final region size by
    /// [`effective_max_error`](Self::effective_max_error).
    pub fn with_max_per_pixel_error(mut self, per_pixel: i32) -> Self {
        self.max_per_pixel_error = per_pixel;
        self
    }

    pub fn with_approach(mut self, approach: BlockApproach) -> Self {
        self.approach = approach;
        self
    }

    /// Limit applied to the selected score, `<= 0` when the check is off.
    ///
    /// With the best-five approach three regions contribute to a score, so a per-pixel
    /// limit is scaled by three region areas.
    pub fn effective_max_error(&self) -> i32 {
        if self.max_per_pixel_error <= 0 {
            return self.max_error;
        }
        let area = (2 * self.region_radius_x.max(0) + 1) * (2 * self.region_radius_y.max(0) + 1);
        self.max_per_pixel_error
            .saturating_mul(area)
            .saturating_mul(self.approach.regions() as i32)
    }

    pub fn with_right_to_left_tolerance(mut self, tolerance: i32) -> Self {
        self.right_to_left_tolerance = tolerance;
        self
    }

    pub fn with_texture_threshold(mut self, threshold: f64) -> Self {
        self.texture_threshold = threshold;
        self
    }

    pub fn with_border(mut self, border: BorderMode) -> Self {
        self.border = border;
        self
    }

    /// Turns off the max error, texture and right-to-left checks.
    pub fn without_validation(mut self) -> Self {
        self.max_error = -1;
        self.max_per_pixel_error = -1;
        self.right_to_left_tolerance = -1;
        self.texture_threshold = 0.0;
        self
    }

    pub fn disparity_max(&self) -> i32 {
        self.disparity_min + self.disparity_range - 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.disparity_min < 0 {
            return Err(Error::InvalidParameters(format!(
                "disparity_min must be >= 0, got {}",
                self.disparity_min
            )));
        }
        if self.disparity_range < 2 {
            return Err(Error::InvalidParameters(format!(
                "disparity_min must be smaller than disparity_max, got range {}",
                self.disparity_range
            )));
        }
        if self.disparity_min.checked_add(self.disparity_range).is_none() {
            return Err(Error::InvalidParameters(
                "disparity_min + disparity_range overflows".to_string(),
            ));
        }
        if self.region_radius_x < 0 || self.region_radius_y < 0 {
            return Err(Error::InvalidParameters(format!(
                "region radius must be >= 0, got ({}, {})",
                self.region_radius_x, self.region_radius_y
            )));
        }
        if !self.texture_threshold.is_finite() {
            return Err(Error::InvalidParameters(format!(
                "texture_threshold must be finite, got {}",
                self.texture_threshold
            )));
        }
        if let BorderMode::Constant(v) = self.border {
            if !v.is_finite() {
                return Err(Error::InvalidParameters(
                    "constant border value must be finite".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Derives the matching geometry for an image of the given size.
    pub fn geometry(&self, width: usize, height: usize) -> Result<MatchGeometry> {
        self.validate()?;
        let radius_x = self.region_radius_x as usize;
        let radius_y = self.region_radius_y as usize;
        let region_width = 2 * radius_x + 1;
        let region_height = 2 * radius_y + 1;
        if width < region_width || height < region_height {
            return Err(Error::DimensionMismatch(format!(
                "image {width}x{height} is smaller than the {region_width}x{region_height} region"
            )));
        }

        let disparity_min = self.disparity_min as usize;
        let disparity_range = self.disparity_range as usize;
        Ok(MatchGeometry {
            width,
            height,
            radius_x,
            radius_y,
            region_width,
            region_height,
            disparity_min,
            disparity_max: disparity_min + disparity_range - 1,
            disparity_range,
        })
    }
}

/// Validated sizes derived from a [`DisparityConfig`] and an image shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchGeometry {
    pub width: usize,
    pub height: usize,
    pub radius_x: usize,
    pub radius_y: usize,
    pub region_width: usize,
    pub region_height: usize,
    pub disparity_min: usize,
    pub disparity_max: usize,
    pub disparity_range: usize,
}

impl MatchGeometry {
    pub fn area(&self) -> usize {
        self.region_width * self.region_height
    }

    /// Columns whose region lies inside the image horizontally.
    pub fn interior_columns(&self) -> std::ops::Range<usize> {
        self.radius_x..self.width - self.radius_x
    }

    /// Rows whose region lies inside the image vertically.
    pub fn interior_rows(&self) -> std::ops::Range<usize> {
        self.radius_y..self.height - self.radius_y
    }

    pub fn is_interior(&self, x: usize, y: usize) -> bool {
        self.interior_columns().contains(&x) && self.interior_rows().contains(&y)
    }

    /// Largest disparity that keeps the right image column `x - d` inside the image, or
    /// `None` when not even `disparity_min` does.
    pub fn local_max(&self, x: usize) -> Option<usize> {
        let max = x.min(self.disparity_max);
        (max >= self.disparity_min).then_some(max)
    }

    /// First column with a score at disparity `d`.
    pub fn first_column(&self, d: usize) -> usize {
        self.radius_x.max(d)
    }

    /// Index of column `x` at disparity `d` in a score buffer.
    #[inline]
    pub fn score_index(&self, x: usize, d: usize) -> usize {
        x + (d - self.disparity_min) * self.width
    }

    pub fn score_len(&self) -> usize {
        self.width * self.disparity_range
    }
}
