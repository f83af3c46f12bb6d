use crate::image::{ImageGray, Pixel};
use serde::{Deserialize, Serialize};

/// Supplies pixel values for coordinates outside the image.
///
/// Called only for out-of-bounds coordinates; in-bounds reads go straight to the image.
pub trait ImageBorder<T: Pixel>: Send + Sync {
    fn outside(&self, image: &ImageGray<T>, x: isize, y: isize) -> T;
}

/// Standard border extension policies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BorderMode {
    Constant(f64),
    Replicate,
    Reflect,
    Reflect101,
    Wrap,
}

impl Default for BorderMode {
    fn default() -> Self {
        BorderMode::Reflect101
    }
}

/// Maps a possibly out of range coordinate back into `[0, len)`.
///
/// Returns `None` for [`BorderMode::Constant`] when the coordinate is outside.
pub fn map_coord(coord: isize, len: usize, mode: BorderMode) -> Option<usize> {
    let n = len as isize;
    if n <= 0 {
        return None;
    }

    match mode {
        BorderMode::Constant(_) => {
            if coord < 0 || coord >= n {
                None
            } else {
                Some(coord as usize)
            }
        }
        BorderMode::Replicate => Some(coord.clamp(0, n - 1) as usize),
        BorderMode::Wrap => Some(coord.rem_euclid(n) as usize),
        BorderMode::Reflect => {
            if n == 1 {
                return Some(0);
            }
            let period = 2 * n;
            let mut c = coord.rem_euclid(period);
            if c >= n {
                c = period - c - 1;
            }
            Some(c as usize)
        }
        BorderMode::Reflect101 => {
            if n == 1 {
                return Some(0);
            }
            let period = 2 * n - 2;
            let mut c = coord.rem_euclid(period);
            if c >= n {
                c = period - c;
            }
            Some(c as usize)
        }
    }
}

impl<T: Pixel> ImageBorder<T> for BorderMode {
    fn outside(&self, image: &ImageGray<T>, x: isize, y: isize) -> T {
        let width = image.width() as usize;
        let height = image.height() as usize;
        match (map_coord(x, width, *self), map_coord(y, height, *self)) {
            (Some(mx), Some(my)) => image.as_raw()[my * width + mx],
            _ => match self {
                BorderMode::Constant(v) => T::from_f64(*v),
                _ => T::from_f64(0.0),
            },
        }
    }
}

/// Adapts a closure `(image, x, y) -> value` into an [`ImageBorder`].
pub struct BorderFn<F>(pub F);

impl<T, F> ImageBorder<T> for BorderFn<F>
where
    T: Pixel,
    F: Fn(&ImageGray<T>, isize, isize) -> T + Send + Sync,
{
    fn outside(&self, image: &ImageGray<T>, x: isize, y: isize) -> T {
        (self.0)(image, x, y)
    }
}

/// Reads `(x, y)`, asking `border` when it falls outside the image.
#[inline]
pub fn sample<T: Pixel>(image: &ImageGray<T>, border: &dyn ImageBorder<T>, x: isize, y: isize) -> T {
    let width = image.width() as isize;
    let height = image.height() as isize;
    if x >= 0 && y >= 0 && x < width && y < height {
        image.as_raw()[(y * width + x) as usize]
    } else {
        border.outside(image, x, y)
    }
}

/// Copies row `y` into `out`, prefixed with `pad` border samples on the left.
///
/// `out[i]` holds column `i - pad`; `out` must hold `width + pad` elements.
pub fn grow_row_left<T: Pixel>(
    image: &ImageGray<T>,
    border: &dyn ImageBorder<T>,
    y: usize,
    pad: usize,
    out: &mut [T],
) {
    let width = image.width() as usize;
    for (i, v) in out[..pad].iter_mut().enumerate() {
        *v = border.outside(image, i as isize - pad as isize, y as isize);
    }
    out[pad..pad + width].copy_from_slice(&image.as_raw()[y * width..(y + 1) * width]);
}

/// Copies the `width` x `height` block whose top left corner is `(x0, y0)` into `out`, row
/// after row, replacing its previous contents.
pub fn extract_region<T: Pixel>(
    image: &ImageGray<T>,
    border: &dyn ImageBorder<T>,
    x0: isize,
    y0: isize,
    width: usize,
    height: usize,
    out: &mut Vec<T>,
) {
    out.clear();
    out.reserve(width * height);
    let image_width = image.width() as isize;
    let image_height = image.height() as isize;
    let inside_x = x0 >= 0 && x0 + width as isize <= image_width;
    for y in y0..y0 + height as isize {
        if inside_x && y >= 0 && y < image_height {
            let start = (y * image_width + x0) as usize;
            out.extend_from_slice(&image.as_raw()[start..start + width]);
        } else {
            out.extend((0..width as isize).map(|i| sample(image, border, x0 + i, y)));
        }
    }
}
