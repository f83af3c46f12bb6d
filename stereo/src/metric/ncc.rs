use super::{CostMetric, Score};
use crate::config::MatchGeometry;
use crate::{Error, Result};
use disparity_core::filter::local_mean_and_std;
use disparity_core::{
    convert_to_f32, normalize_to_f32, FloatPixel, ImageBorder, ImageGray, Pixel,
};

/// Normalized cross correlation.
///
/// Element costs are plain products. Each region sum is then turned into
/// `-(sum / area - mean_l * mean_r) / (eps + std_l * std_r)` so smaller is better.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ncc {
    eps: f64,
    normalize_input: bool,
}

impl Default for Ncc {
    fn default() -> Self {
        Self {
            eps: f32::EPSILON as f64,
            normalize_input: false,
        }
    }
}

impl Ncc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Added to the denominator so flat regions don't divide by zero.
    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }

    /// Rescale each input image to zero mean and unit standard deviation in
    /// [`convert_input`](Self::convert_input).
    pub fn with_normalize_input(mut self, normalize_input: bool) -> Self {
        self.normalize_input = normalize_input;
        self
    }

    pub fn normalize_input(&self) -> bool {
        self.normalize_input
    }

    /// Converts an image of any pixel type into the `f32` image matched by this metric.
    pub fn convert_input<T: Pixel>(&self, image: &ImageGray<T>) -> ImageGray<f32> {
        if self.normalize_input {
            normalize_to_f32(image)
        } else {
            convert_to_f32(image)
        }
    }
}

/// Local mean and standard deviation of both images over the matching region.
#[derive(Debug, Clone)]
pub struct NccStats<F> {
    pub width: usize,
    pub mean_left: Vec<F>,
    pub std_left: Vec<F>,
    pub mean_right: Vec<F>,
    pub std_right: Vec<F>,
}

impl<F: FloatPixel + Score> CostMetric<F> for Ncc {
    type Score = F;
    type Stats = NccStats<F>;

    fn name(&self) -> &'static str {
        "NCC"
    }

    fn score_elements(&self, left: &[F], right: &[F], out: &mut [F]) {
        for ((o, &l), &r) in out.iter_mut().zip(left).zip(right) {
            *o = l * r;
        }
    }

    fn max_per_pixel_error(&self) -> Result<u64> {
        Err(Error::Unsupported(
            "NCC scores are not bounded per pixel".to_string(),
        ))
    }

    fn requires_normalize(&self) -> bool {
        true
    }

    fn prepare(
        &self,
        left: &ImageGray<F>,
        right: &ImageGray<F>,
        border: &dyn ImageBorder<F>,
        geometry: &MatchGeometry,
    ) -> Result<NccStats<F>> {
        if !self.eps.is_finite() || self.eps < 0.0 {
            return Err(Error::InvalidParameters(format!(
                "NCC eps must be finite and >= 0, got {}",
                self.eps
            )));
        }
        let (mean_left, std_left) =
            local_mean_and_std(left, border, geometry.radius_x, geometry.radius_y);
        let (mean_right, std_right) =
            local_mean_and_std(right, border, geometry.radius_x, geometry.radius_y);
        Ok(NccStats {
            width: geometry.width,
            mean_left,
            std_left,
            mean_right,
            std_right,
        })
    }

    fn normalize(
        &self,
        stats: &NccStats<F>,
        x_left: usize,
        x_right: usize,
        y: usize,
        raw: F,
        area: usize,
    ) -> Result<F> {
        let il = y * stats.width + x_left;
        let ir = y * stats.width + x_right;
        let (Some(&ml), Some(&sl), Some(&mr), Some(&sr)) = (
            stats.mean_left.get(il),
            stats.std_left.get(il),
            stats.mean_right.get(ir),
            stats.std_right.get(ir),
        ) else {
            return Err(Error::DimensionMismatch(format!(
                "({x_left}, {y}) / ({x_right}, {y}) outside the NCC statistics"
            )));
        };

        let correlation = raw / <F as Pixel>::from_f64(area as f64) - ml * mr;
        let denominator = <F as Pixel>::from_f64(self.eps) + sl * sr;
        Ok(<F as Score>::ZERO - correlation / denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DisparityConfig;
    use disparity_core::BorderMode;
    use image::{ImageBuffer, Luma};

    #[test]
    fn perfect_correlation_scores_minus_one() {
        let img: ImageGray<f32> =
            ImageBuffer::from_fn(9, 9, |x, y| Luma([((x * 7 + y * 3) % 11) as f32]));
        let geometry = DisparityConfig::new()
            .with_disparity(0, 4)
            .with_region_radius(1, 1)
            .geometry(9, 9)
            .unwrap();
        let ncc = Ncc::new();
        let stats = ncc
            .prepare(&img, &img, &BorderMode::Reflect101, &geometry)
            .unwrap();

        let (x, y) = (4usize, 4usize);
        let mut raw = 0.0f32;
        for dy in 0..3 {
            for dx in 0..3 {
                let v = img.get_pixel((x + dx - 1) as u32, (y + dy - 1) as u32)[0];
                raw += v * v;
            }
        }
        let score = ncc.normalize(&stats, x, x, y, raw, 9).unwrap();
        assert!((score + 1.0).abs() < 1e-4, "score {score}");
    }

    #[test]
    fn normalize_out_of_range_is_an_error() {
        let stats = NccStats::<f64> {
            width: 2,
            mean_left: vec![0.0; 4],
            std_left: vec![0.0; 4],
            mean_right: vec![0.0; 4],
            std_right: vec![0.0; 4],
        };
        assert!(Ncc::new().normalize(&stats, 5, 0, 0, 1.0, 9).is_err());
    }

    #[test]
    fn input_conversion_follows_the_flag() {
        let img: ImageGray<u16> = ImageBuffer::from_fn(6, 3, |x, y| Luma([(x * 1000 + y) as u16]));
        let plain = Ncc::new().convert_input(&img);
        assert_eq!(plain.get_pixel(5, 2)[0], 5002.0);

        let ncc = Ncc::new().with_normalize_input(true);
        assert!(ncc.normalize_input());
        let normalized = ncc.convert_input(&img);
        let mean = normalized.as_raw().iter().sum::<f32>() / 18.0;
        assert!(mean.abs() < 1e-5);
        assert!(normalized.get_pixel(5, 2)[0] > 1.0);
    }
}
