use super::CostMetric;
use crate::config::MatchGeometry;
use crate::mutual_information::StereoMutualInformation;
use crate::Result;
use disparity_core::{ImageBorder, ImageGray, Pixel};
use std::sync::Arc;

/// Pixels that can index a mutual information table.
pub trait IntensityPixel: Pixel {
    fn intensity(self) -> usize;
}

impl IntensityPixel for u8 {
    #[inline]
    fn intensity(self) -> usize {
        self as usize
    }
}

impl IntensityPixel for u16 {
    #[inline]
    fn intensity(self) -> usize {
        self as usize
    }
}

/// Cost looked up in a trained [`StereoMutualInformation`] table.
///
/// The table must have been trained or filled before matching; an untrained table scores
/// every pair as zero.
#[derive(Debug, Clone)]
pub struct MutualInfo {
    table: Arc<StereoMutualInformation>,
}

impl MutualInfo {
    pub fn new(table: StereoMutualInformation) -> Self {
        Self::from_shared(Arc::new(table))
    }

    pub fn from_shared(table: Arc<StereoMutualInformation>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &StereoMutualInformation {
        &self.table
    }
}

impl<T: IntensityPixel> CostMetric<T> for MutualInfo {
    type Score = i32;
    type Stats = ();

    fn name(&self) -> &'static str {
        "MutualInformation"
    }

    fn score_elements(&self, left: &[T], right: &[T], out: &mut [i32]) {
        for ((o, &l), &r) in out.iter_mut().zip(left).zip(right) {
            *o = self.table.cost_scaled(l.intensity(), r.intensity()) as i32;
        }
    }

    fn max_per_pixel_error(&self) -> Result<u64> {
        Ok(self.table.max_cost() as u64)
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
