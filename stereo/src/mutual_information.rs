//! Mutual information cost table trained from a disparity estimate.
//!
//! A joint histogram of left and right intensities is collected over pixels with a valid
//! disparity, converted into Parzen smoothed entropies and finally rescaled into an integer
//! lookup table used by [`MutualInfo`](crate::metric::MutualInfo).

use crate::metric::IntensityPixel;
use crate::{DisparityImage, DisparityValue, Error, Result};
use disparity_core::check_same_shape;
use disparity_core::filter::{
    convolve_normalized_horizontal, convolve_normalized_vertical, gaussian_kernel_for_radius,
};
use disparity_core::ImageGray;
use rand::Rng;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct StereoMutualInformation {
    levels: usize,
    smooth_kernel: Vec<f32>,
    eps: f32,
    total_pixels: u64,
    hist_joint: Vec<u32>,
    entropy_joint: Vec<f32>,
    entropy_left: Vec<f32>,
    entropy_right: Vec<f32>,
    scaled_cost: Vec<u16>,
    max_cost: u16,
}

impl Default for StereoMutualInformation {
    fn default() -> Self {
        Self::new()
    }
}

impl StereoMutualInformation {
    /// Table for 8-bit images with a smoothing radius of 1.
    pub fn new() -> Self {
        let mut table = Self {
            levels: 0,
            smooth_kernel: Vec::new(),
            eps: f32::EPSILON,
            total_pixels: 0,
            hist_joint: Vec::new(),
            entropy_joint: Vec::new(),
            entropy_left: Vec::new(),
            entropy_right: Vec::new(),
            scaled_cost: Vec::new(),
            max_cost: 0,
        };
        table.resize(256);
        table.configure_smoothing(1);
        table
    }

    /// Number of gray levels in the input images.
    pub fn configure_histogram(&mut self, levels: usize) -> Result<()> {
        if !(2..=1 << 16).contains(&levels) {
            return Err(Error::InvalidParameters(format!(
                "histogram needs between 2 and 65536 gray levels, got {levels}"
            )));
        }
        self.resize(levels);
        Ok(())
    }

    fn resize(&mut self, levels: usize) {
        self.levels = levels;
        self.total_pixels = 0;
        self.max_cost = 0;
        self.hist_joint = vec![0; levels * levels];
        self.entropy_joint = vec![0.0; levels * levels];
        self.entropy_left = vec![0.0; levels];
        self.entropy_right = vec![0.0; levels];
        self.scaled_cost = vec![0; levels * levels];
    }

    /// Radius of the Gaussian used for Parzen smoothing of the histograms.
    pub fn configure_smoothing(&mut self, radius: usize) {
        self.smooth_kernel = gaussian_kernel_for_radius(radius);
    }

    pub fn set_eps(&mut self, eps: f32) {
        self.eps = eps;
    }

    pub fn eps(&self) -> f32 {
        self.eps
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    /// Pixels that contributed to the last [`process`](Self::process).
    pub fn total_pixels(&self) -> u64 {
        self.total_pixels
    }

    /// Fills the scaled cost with a low value where `right == left * scale` and a high value
    /// elsewhere. Useful as a first guess before any disparity is known.
    pub fn diagonal_histogram(&mut self, scale_left_to_right: f64, max_cost: u16) {
        let n = self.levels;
        let cost_low = max_cost / 20;
        let cost_high = max_cost / 3;
        for (left, row) in self.scaled_cost.chunks_mut(n).enumerate() {
            let matching = (left as f64 * scale_left_to_right)
                .max(0.0)
                .min((n - 1) as f64)
                .round() as usize;
            for (right, v) in row.iter_mut().enumerate() {
                *v = if right == matching { cost_low } else { cost_high };
            }
        }
        self.max_cost = max_cost;
    }

    /// Fills the scaled cost with values drawn uniformly from `[0, max_cost)`.
    pub fn random_histogram<R: Rng + ?Sized>(&mut self, rng: &mut R, max_cost: u16) {
        let upper = max_cost.max(1);
        for v in self.scaled_cost.iter_mut() {
            *v = rng.gen_range(0..upper);
        }
        self.max_cost = max_cost;
    }

    /// Trains the entropy tables from an image pair and its disparity image.
    ///
    /// Invalid pixels and disparities pointing outside the right image are skipped.
    pub fn process<T: IntensityPixel, D: DisparityValue>(
        &mut self,
        left: &ImageGray<T>,
        right: &ImageGray<T>,
        disparity: &DisparityImage<D>,
    ) -> Result<()> {
        check_same_shape(left, right)?;
        if (left.width() as usize, left.height() as usize) != (disparity.width, disparity.height)
        {
            return Err(Error::DimensionMismatch(format!(
                "disparity image {}x{} doesn't match input {}x{}",
                disparity.width,
                disparity.height,
                left.width(),
                left.height()
            )));
        }

        self.compute_joint_histogram(left, right, disparity)?;
        if self.total_pixels == 0 {
            warn!("no valid disparities to train the mutual information table from");
            return Err(Error::InvalidParameters(
                "disparity image has no valid pixels".to_string(),
            ));
        }
        self.compute_probabilities();
        self.compute_entropy();
        debug!(
            levels = self.levels,
            pixels = self.total_pixels,
            "trained mutual information"
        );
        Ok(())
    }

    fn compute_joint_histogram<T: IntensityPixel, D: DisparityValue>(
        &mut self,
        left: &ImageGray<T>,
        right: &ImageGray<T>,
        disparity: &DisparityImage<D>,
    ) -> Result<()> {
        self.hist_joint.iter_mut().for_each(|v| *v = 0);
        self.total_pixels = 0;

        let n = self.levels;
        let width = disparity.width;
        let left_raw = left.as_raw();
        let right_raw = right.as_raw();
        for (idx, value) in disparity.data.iter().enumerate() {
            if disparity.is_invalid(*value) {
                continue;
            }
            let d = value.to_usize() + disparity.disparity_min;
            let x = idx % width;
            if d > x {
                continue;
            }
            let l = left_raw[idx].intensity();
            let r = right_raw[idx - d].intensity();
            if l >= n || r >= n {
                return Err(Error::InvalidParameters(format!(
                    "intensity {} is outside the {n} histogram levels",
                    l.max(r)
                )));
            }
            self.hist_joint[l * n + r] += 1;
            self.total_pixels += 1;
        }
        Ok(())
    }

    fn compute_probabilities(&mut self) {
        let n = self.levels;
        let total = self.total_pixels as f32;
        for (p, &h) in self.entropy_joint.iter_mut().zip(&self.hist_joint) {
            *p = h as f32 / total;
        }

        self.entropy_right.iter_mut().for_each(|v| *v = 0.0);
        for (l, row) in self.entropy_joint.chunks(n).enumerate() {
            let mut sum = 0.0f32;
            for (r, &p) in row.iter().enumerate() {
                sum += p;
                self.entropy_right[r] += p;
            }
            self.entropy_left[l] = sum;
        }
    }

    fn compute_entropy(&mut self) {
        let n = self.levels;
        let kernel = &self.smooth_kernel;
        let eps = self.eps;
        let scale = -(self.total_pixels as f32);

        let smooth_2d = |data: &[f32]| {
            let tmp = convolve_normalized_horizontal(data, n, n, kernel);
            convolve_normalized_vertical(&tmp, n, n, kernel)
        };
        let mut joint = smooth_2d(&self.entropy_joint);
        joint.iter_mut().for_each(|v| *v = (*v + eps).ln());
        let mut joint = smooth_2d(&joint);
        joint.iter_mut().for_each(|v| *v /= scale);
        self.entropy_joint = joint;

        let smooth_1d = |data: &[f32]| {
            let mut tmp = convolve_normalized_horizontal(data, n, 1, kernel);
            tmp.iter_mut().for_each(|v| *v = (*v + eps).ln());
            let mut out = convolve_normalized_horizontal(&tmp, n, 1, kernel);
            out.iter_mut().for_each(|v| *v /= scale);
            out
        };
        self.entropy_left = smooth_1d(&self.entropy_left);
        self.entropy_right = smooth_1d(&self.entropy_right);
    }

    /// Mutual information cost of matching `left` with `right`, lower is better.
    pub fn cost(&self, left: usize, right: usize) -> f32 {
        let n = self.levels;
        let (l, r) = (left.min(n - 1), right.min(n - 1));
        self.entropy_joint[l * n + r] - self.entropy_left[l] - self.entropy_right[r]
    }

    /// Rescales [`cost`](Self::cost) into integers in `[0, max_cost]`.
    pub fn precompute_scaled_cost(&mut self, max_cost: u16) {
        let n = self.levels;
        let mut min_value = f32::MAX;
        let mut max_value = f32::MIN;
        for l in 0..n {
            for r in 0..n {
                let v = self.cost(l, r);
                min_value = min_value.min(v);
                max_value = max_value.max(v);
            }
        }

        let range = max_value - min_value;
        for l in 0..n {
            for r in 0..n {
                let v = self.cost(l, r);
                self.scaled_cost[l * n + r] = if range > 0.0 {
                    (max_cost as f32 * (v - min_value) / range) as u16
                } else {
                    0
                };
            }
        }
        self.max_cost = max_cost;
        debug!(max_cost, min_value, max_value, "scaled mutual information cost");
    }

    #[inline]
    pub fn cost_scaled(&self, left: usize, right: usize) -> u16 {
        let n = self.levels;
        self.scaled_cost[left.min(n - 1) * n + right.min(n - 1)]
    }

    /// Largest value of [`cost_scaled`](Self::cost_scaled).
    pub fn max_cost(&self) -> u16 {
        self.max_cost
    }
}
