//! Local image filters: box mean statistics and normalized 1-D Gaussian smoothing.

use crate::border::{sample, ImageBorder};
use crate::image::{FloatPixel, ImageGray};
use rayon::prelude::*;

pub fn gaussian_kernel_1d(sigma: f32, size: usize) -> Vec<f32> {
    let mut kernel = Vec::with_capacity(size);
    let center = (size / 2) as isize;
    let sigma2 = sigma * sigma;
    let mut sum = 0.0f32;

    for i in 0..size as isize {
        let d = (i - center) as f32;
        let v = (-(d * d) / (2.0 * sigma2)).exp();
        kernel.push(v);
        sum += v;
    }

    if sum > 0.0 {
        for v in &mut kernel {
            *v /= sum;
        }
    }
    kernel
}

/// Standard deviation of a Gaussian whose kernel is truncated at `radius`.
pub fn sigma_for_radius(radius: usize) -> f32 {
    (2 * radius + 1) as f32 / 5.0
}

/// Gaussian kernel of `2 * radius + 1` taps.
pub fn gaussian_kernel_for_radius(radius: usize) -> Vec<f32> {
    gaussian_kernel_1d(sigma_for_radius(radius).max(f32::EPSILON), 2 * radius + 1)
}

/// Convolves every row of a `width x height` buffer. Kernel weights that fall outside the
/// row are dropped and the remaining weights renormalized.
pub fn convolve_normalized_horizontal(
    data: &[f32],
    width: usize,
    height: usize,
    kernel: &[f32],
) -> Vec<f32> {
    let radius = (kernel.len() / 2) as isize;
    let mut out = vec![0.0f32; width * height];
    for (src, dst) in data.chunks(width).zip(out.chunks_mut(width)).take(height) {
        for (x, d) in dst.iter_mut().enumerate() {
            let mut total = 0.0f32;
            let mut weight = 0.0f32;
            for (k, &kv) in kernel.iter().enumerate() {
                let sx = x as isize + k as isize - radius;
                if sx >= 0 && (sx as usize) < width {
                    total += kv * src[sx as usize];
                    weight += kv;
                }
            }
            *d = if weight > 0.0 { total / weight } else { 0.0 };
        }
    }
    out
}

/// Column counterpart of [`convolve_normalized_horizontal`].
pub fn convolve_normalized_vertical(
    data: &[f32],
    width: usize,
    height: usize,
    kernel: &[f32],
) -> Vec<f32> {
    let radius = (kernel.len() / 2) as isize;
    let mut out = vec![0.0f32; width * height];
    for y in 0..height {
        for x in 0..width {
            let mut total = 0.0f32;
            let mut weight = 0.0f32;
            for (k, &kv) in kernel.iter().enumerate() {
                let sy = y as isize + k as isize - radius;
                if sy >= 0 && (sy as usize) < height {
                    total += kv * data[sy as usize * width + x];
                    weight += kv;
                }
            }
            out[y * width + x] = if weight > 0.0 { total / weight } else { 0.0 };
        }
    }
    out
}

/// Local mean and mean of squares over a `(2rx+1) x (2ry+1)` window centred on each pixel.
///
/// Samples outside the image come from `border`. Each output is the vertical sum of
/// horizontal window sums, accumulated in increasing coordinate order.
pub fn local_mean_and_sq<F: FloatPixel>(
    image: &ImageGray<F>,
    border: &dyn ImageBorder<F>,
    radius_x: usize,
    radius_y: usize,
) -> (Vec<F>, Vec<F>) {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let region_height = 2 * radius_y + 1;
    let area = F::from_f64(((2 * radius_x + 1) * region_height) as f64);
    let rx = radius_x as isize;

    // Horizontal sums for every row the windows touch, including border rows.
    let extended_rows = height + 2 * radius_y;
    let mut hsum = vec![F::ZERO; extended_rows * width];
    let mut hsq = vec![F::ZERO; extended_rows * width];
    hsum.par_chunks_mut(width.max(1))
        .zip(hsq.par_chunks_mut(width.max(1)))
        .enumerate()
        .for_each(|(er, (sum_row, sq_row))| {
            let y = er as isize - radius_y as isize;
            for x in 0..width {
                let mut s = F::ZERO;
                let mut s2 = F::ZERO;
                for sx in x as isize - rx..=x as isize + rx {
                    let v = sample(image, border, sx, y);
                    s += v;
                    s2 += v * v;
                }
                sum_row[x] = s;
                sq_row[x] = s2;
            }
        });

    let mut mean = vec![F::ZERO; width * height];
    let mut mean_sq = vec![F::ZERO; width * height];
    mean.par_chunks_mut(width.max(1))
        .zip(mean_sq.par_chunks_mut(width.max(1)))
        .enumerate()
        .for_each(|(y, (mean_row, sq_row))| {
            for x in 0..width {
                let mut s = F::ZERO;
                let mut s2 = F::ZERO;
                for k in 0..region_height {
                    s += hsum[(y + k) * width + x];
                    s2 += hsq[(y + k) * width + x];
                }
                mean_row[x] = s / area;
                sq_row[x] = s2 / area;
            }
        });

    (mean, mean_sq)
}

/// Local mean and standard deviation, see [`local_mean_and_sq`].
pub fn local_mean_and_std<F: FloatPixel>(
    image: &ImageGray<F>,
    border: &dyn ImageBorder<F>,
    radius_x: usize,
    radius_y: usize,
) -> (Vec<F>, Vec<F>) {
    let (mean, mut spread) = local_mean_and_sq(image, border, radius_x, radius_y);
    for (s, &m) in spread.iter_mut().zip(mean.iter()) {
        *s = (*s - m * m).max(F::ZERO).sqrt();
    }
    (mean, spread)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::border::BorderMode;
    use image::{ImageBuffer, Luma};

    #[test]
    fn gaussian_kernel_1d_is_normalized() {
        let k = gaussian_kernel_for_radius(3);
        assert_eq!(k.len(), 7);
        let sum: f32 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(k[3] > k[2] && k[2] > k[1]);
    }

    #[test]
    fn normalized_convolution_keeps_constant_rows() {
        let data = vec![2.0f32; 6 * 3];
        let k = gaussian_kernel_for_radius(2);
        let h = convolve_normalized_horizontal(&data, 6, 3, &k);
        let v = convolve_normalized_vertical(&h, 6, 3, &k);
        assert!(v.iter().all(|&x| (x - 2.0).abs() < 1e-5));
    }

    #[test]
    fn local_statistics_of_constant_image() {
        let img: ImageGray<f32> = ImageBuffer::from_fn(9, 7, |_, _| Luma([5.0]));
        let (mean, std) = local_mean_and_std(&img, &BorderMode::Replicate, 2, 1);
        assert!(mean.iter().all(|&m| (m - 5.0).abs() < 1e-5));
        assert!(std.iter().all(|&s| s.abs() < 1e-3));
    }

    #[test]
    fn local_mean_matches_direct_window_average() {
        let img: ImageGray<f64> =
            ImageBuffer::from_fn(8, 6, |x, y| Luma([(x * 3 + y * 5 % 7) as f64]));
        let (mean, mean_sq) = local_mean_and_sq(&img, &BorderMode::Reflect101, 1, 1);
        let (x, y) = (4usize, 3usize);
        let mut s = 0.0;
        let mut s2 = 0.0;
        for yy in y - 1..=y + 1 {
            for xx in x - 1..=x + 1 {
                let v = img.get_pixel(xx as u32, yy as u32)[0];
                s += v;
                s2 += v * v;
            }
        }
        assert!((mean[y * 8 + x] - s / 9.0).abs() < 1e-9);
        assert!((mean_sq[y * 8 + x] - s2 / 9.0).abs() < 1e-9);
    }
}
