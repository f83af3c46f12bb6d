use crate::{Error, Result};
use image::{ImageBuffer, Luma, Primitive};
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, Sub};

/// Single band image with elements of type `T`.
pub type ImageGray<T> = ImageBuffer<Luma<T>, Vec<T>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

/// Element type of a gray image the engine can read.
pub trait Pixel: Primitive + Debug + Send + Sync + 'static {
    const PIXEL_TYPE: PixelType;

    fn to_f64(self) -> f64;

    /// Converts with saturation for integer types.
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_pixel {
    ($($t:ty => $kind:ident),* $(,)?) => {
        $(
            impl Pixel for $t {
                const PIXEL_TYPE: PixelType = PixelType::$kind;

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

impl_pixel!(
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
);

/// Floating point pixels used for correlation statistics.
pub trait FloatPixel:
    Pixel
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + AddAssign
{
    const ZERO: Self;

    fn sqrt(self) -> Self;

    fn max(self, other: Self) -> Self;
}

impl FloatPixel for f32 {
    const ZERO: Self = 0.0;

    #[inline]
    fn sqrt(self) -> Self {
        f32::sqrt(self)
    }

    #[inline]
    fn max(self, other: Self) -> Self {
        f32::max(self, other)
    }
}

impl FloatPixel for f64 {
    const ZERO: Self = 0.0;

    #[inline]
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    #[inline]
    fn max(self, other: Self) -> Self {
        f64::max(self, other)
    }
}

/// Fails unless both images have the same width and height.
pub fn check_same_shape<A: Pixel, B: Pixel>(a: &ImageGray<A>, b: &ImageGray<B>) -> Result<()> {
    if a.dimensions() != b.dimensions() {
        return Err(Error::DimensionMismatch(format!(
            "expected images of the same shape, got {}x{} and {}x{}",
            a.width(),
            a.height(),
            b.width(),
            b.height()
        )));
    }
    Ok(())
}

pub fn convert_to_f32<T: Pixel>(image: &ImageGray<T>) -> ImageGray<f32> {
    let data = image.as_raw().iter().map(|&v| Pixel::to_f64(v) as f32).collect();
    ImageBuffer::from_raw(image.width(), image.height(), data)
        .unwrap_or_else(|| ImageBuffer::new(image.width(), image.height()))
}

/// Converts to `f32` with zero mean and unit standard deviation.
///
/// A constant image is only shifted to zero mean.
pub fn normalize_to_f32<T: Pixel>(image: &ImageGray<T>) -> ImageGray<f32> {
    let raw = image.as_raw();
    if raw.is_empty() {
        return ImageBuffer::new(image.width(), image.height());
    }

    let n = raw.len() as f64;
    let mean = raw.iter().map(|&v| Pixel::to_f64(v)).sum::<f64>() / n;
    let variance = raw
        .iter()
        .map(|&v| {
            let d = Pixel::to_f64(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let std = variance.sqrt();
    let scale = if std > f64::EPSILON { 1.0 / std } else { 1.0 };

    let data = raw
        .iter()
        .map(|&v| ((Pixel::to_f64(v) - mean) * scale) as f32)
        .collect();
    ImageBuffer::from_raw(image.width(), image.height(), data)
        .unwrap_or_else(|| ImageBuffer::new(image.width(), image.height()))
}
