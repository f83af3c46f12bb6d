use super::CostMetric;
use crate::config::MatchGeometry;
use crate::{Error, Result};
use disparity_core::{CensusVariant, CensusWord, ImageBorder, ImageGray};

/// Hamming distance between census transformed images.
///
/// The images given to the matcher must already hold census words, see
/// [`disparity_core::census_transform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Census {
    bits: u32,
}

impl Census {
    /// `bits` is the number of meaningful bits in each census word.
    pub fn new(bits: u32) -> Self {
        Self { bits }
    }

    pub fn from_variant(variant: CensusVariant) -> Self {
        Self::new(variant.bits())
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }
}

impl<C: CensusWord> CostMetric<C> for Census {
    type Score = i32;
    type Stats = ();

    fn name(&self) -> &'static str {
        "Census"
    }

    fn score_elements(&self, left: &[C], right: &[C], out: &mut [i32]) {
        for ((o, &l), &r) in out.iter_mut().zip(left).zip(right) {
            *o = l.hamming(r) as i32;
        }
    }

    fn max_per_pixel_error(&self) -> Result<u64> {
        if self.bits == 0 || self.bits > C::BITS {
            return Err(Error::InvalidParameters(format!(
                "census words of {} bits can't hold {} bits",
                C::BITS,
                self.bits
            )));
        }
        Ok(self.bits as u64)
    }

    fn prepare(
        &self,
        _left: &ImageGray<C>,
        _right: &ImageGray<C>,
        _border: &dyn ImageBorder<C>,
        _geometry: &MatchGeometry,
    ) -> Result<()> {
        Ok(())
    }
}
