//! Census transform: encodes each pixel as a bit pattern of intensity comparisons with its
//! neighbours, so that images can be compared with the Hamming distance.

use crate::border::{sample, ImageBorder};
use crate::image::{ImageGray, Pixel};
use crate::{Error, Result};
use image::ImageBuffer;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Integer word holding a census bit pattern.
pub trait CensusWord: Pixel {
    const BITS: u32;

    fn from_bits(bits: u64) -> Self;

    /// Number of differing bits.
    fn hamming(self, other: Self) -> u32;
}

macro_rules! impl_census_word {
    ($($t:ty),*) => {
        $(
            impl CensusWord for $t {
                const BITS: u32 = <$t>::BITS;

                #[inline]
                fn from_bits(bits: u64) -> Self {
                    bits as $t
                }

                #[inline]
                fn hamming(self, other: Self) -> u32 {
                    (self ^ other).count_ones()
                }
            }
        )*
    };
}

impl_census_word!(u8, u16, u32, u64, i32, i64);

/// Square neighbourhoods with the smallest word that stores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CensusVariant {
    /// 8 bits, stored in `u8`.
    Block3x3,
    /// 24 bits, stored in `u32`.
    Block5x5,
    /// 48 bits, stored in `u64`.
    Block7x7,
}

impl CensusVariant {
    pub fn radius(self) -> usize {
        match self {
            CensusVariant::Block3x3 => 1,
            CensusVariant::Block5x5 => 2,
            CensusVariant::Block7x7 => 3,
        }
    }

    pub fn bits(self) -> u32 {
        let side = 2 * self.radius() as u32 + 1;
        side * side - 1
    }
}

/// Computes the census transform of `image` over a `(2r+1)^2` neighbourhood.
///
/// Bits are assigned in raster order skipping the centre; a bit is set when the neighbour is
/// brighter than the centre pixel.
pub fn census_transform<T: Pixel, C: CensusWord>(
    image: &ImageGray<T>,
    radius: usize,
    border: &dyn ImageBorder<T>,
) -> Result<ImageGray<C>> {
    let side = 2 * radius + 1;
    let bits = side * side - 1;
    if bits > C::BITS as usize || bits > 64 {
        return Err(Error::InvalidParameters(format!(
            "census radius {radius} needs {bits} bits but the output word has {}",
            C::BITS
        )));
    }

    let width = image.width() as usize;
    let height = image.height() as usize;
    let r = radius as isize;
    let mut data = vec![C::from_bits(0); width * height];

    data.par_chunks_mut(width.max(1))
        .enumerate()
        .for_each(|(y, row)| {
            let raw = image.as_raw();
            for (x, out) in row.iter_mut().enumerate() {
                let center = raw[y * width + x];
                let mut code = 0u64;
                let mut bit = 0u32;
                for dy in -r..=r {
                    for dx in -r..=r {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let v = sample(image, border, x as isize + dx, y as isize + dy);
                        if v > center {
                            code |= 1u64 << bit;
                        }
                        bit += 1;
                    }
                }
                *out = C::from_bits(code);
            }
        });

    ImageBuffer::from_raw(image.width(), image.height(), data).ok_or_else(|| {
        Error::RuntimeError("census output buffer does not match image size".to_string())
    })
}

pub fn census_3x3<T: Pixel>(image: &ImageGray<T>, border: &dyn ImageBorder<T>) -> Result<ImageGray<u8>> {
    census_transform(image, CensusVariant::Block3x3.radius(), border)
}

pub fn census_5x5<T: Pixel>(image: &ImageGray<T>, border: &dyn ImageBorder<T>) -> Result<ImageGray<u32>> {
    census_transform(image, CensusVariant::Block5x5.radius(), border)
}

pub fn census_7x7<T: Pixel>(image: &ImageGray<T>, border: &dyn ImageBorder<T>) -> Result<ImageGray<u64>> {
    census_transform(image, CensusVariant::Block7x7.radius(), border)
}
