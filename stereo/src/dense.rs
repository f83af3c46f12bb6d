//! Dense block matching: a disparity for every pixel of the left image.

use crate::config::{BlockApproach, DisparityConfig, MatchGeometry};
use crate::metric::{check_score_range, CostMetric, Ncc, Score};
use crate::row_score::accumulate_row;
use crate::select::SelectWithChecks;
use crate::{DisparityImage, DisparityValue, Result, StereoDisparity};
use disparity_core::{check_same_shape, grow_row_left, Error, ImageBorder, ImageGray, Pixel};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, trace};

/// Block matching stereo matcher
///
/// Rows are split into blocks that are processed in parallel. Inside a block the region
/// score of each row is built from the previous one by adding the horizontal scores of the
/// row entering the region and removing those of the row leaving it. With
/// [`BlockApproach::BestFive`] the pixel score also takes the best two of the four diagonal
/// neighbour regions.
pub struct BlockMatcher<T: Pixel, M: CostMetric<T>> {
    config: DisparityConfig,
    metric: M,
    border: Arc<dyn ImageBorder<T>>,
    selector: SelectWithChecks,
    concurrent: bool,
}

impl<T: Pixel, M: CostMetric<T>> BlockMatcher<T, M> {
    pub fn new(config: DisparityConfig, metric: M) -> Result<Self> {
        config.validate()?;
        let selector = SelectWithChecks::from_config(&config);
        let border: Arc<dyn ImageBorder<T>> = Arc::new(config.border);
        Ok(Self {
            config,
            metric,
            border,
            selector,
            concurrent: true,
        })
    }

    /// Replaces the border from the configuration.
    pub fn with_border(mut self, border: impl ImageBorder<T> + 'static) -> Self {
        self.border = Arc::new(border);
        self
    }

    /// When disabled, row blocks are processed one after another on the calling thread.
    pub fn with_concurrency(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    pub fn config(&self) -> &DisparityConfig {
        &self.config
    }

    pub fn metric(&self) -> &M {
        &self.metric
    }

    /// Largest score a pixel can have with this metric and approach.
    pub fn max_region_error(&self) -> Result<u64> {
        let per_pixel = self.metric.max_per_pixel_error()?;
        let area = (2 * self.config.region_radius_x as u64 + 1)
            * (2 * self.config.region_radius_y as u64 + 1);
        let regions = self.config.approach.regions() as u64;
        Ok(per_pixel.saturating_mul(area).saturating_mul(regions))
    }

    pub fn compute<D: DisparityValue>(
        &self,
        left: &ImageGray<T>,
        right: &ImageGray<T>,
    ) -> Result<DisparityImage<D>> {
        let mut out = DisparityImage::new(
            left.width() as usize,
            left.height() as usize,
            self.config.disparity_min as usize,
            self.config.disparity_range as usize,
        )?;
        self.compute_into(left, right, &mut out)?;
        Ok(out)
    }

    /// Like [`compute`](Self::compute) but reuses the storage of `out`.
    pub fn compute_into<D: DisparityValue>(
        &self,
        left: &ImageGray<T>,
        right: &ImageGray<T>,
        out: &mut DisparityImage<D>,
    ) -> Result<()> {
        check_same_shape(left, right)?;
        let geometry = self
            .config
            .geometry(left.width() as usize, left.height() as usize)?;
        if geometry.disparity_range > D::MAX {
            return Err(Error::InvalidParameters(format!(
                "disparity range {} doesn't fit in a {}",
                geometry.disparity_range,
                std::any::type_name::<D>()
            )));
        }
        check_score_range(&self.metric, geometry.area(), self.config.approach.regions())?;

        out.width = geometry.width;
        out.height = geometry.height;
        out.disparity_min = geometry.disparity_min;
        out.disparity_range = geometry.disparity_range;
        out.data.clear();
        out.data
            .resize(geometry.width * geometry.height, D::from_usize(geometry.disparity_range));

        debug!(
            width = geometry.width,
            height = geometry.height,
            metric = self.metric.name(),
            approach = ?self.config.approach,
            disparity_min = geometry.disparity_min,
            disparity_range = geometry.disparity_range,
            concurrent = self.concurrent,
            "computing dense disparity"
        );

        let stats = self
            .metric
            .prepare(left, right, self.border.as_ref(), &geometry)?;

        let rows_per_block = self.rows_per_block(&geometry);
        let block_len = rows_per_block * geometry.width;
        let region_slots = self.region_slots(&geometry);
        let approach = self.config.approach;
        let new_workspace =
            || DenseWorkspace::<T, M::Score>::new(&geometry, approach, region_slots);

        if self.concurrent {
            out.data
                .par_chunks_mut(block_len)
                .enumerate()
                .try_for_each_init(new_workspace, |ws, (block, rows)| {
                    let y0 = block * rows_per_block;
                    self.process_block(left, right, &stats, &geometry, ws, y0, rows)
                })?;
        } else {
            let mut ws = new_workspace();
            for (block, rows) in out.data.chunks_mut(block_len).enumerate() {
                let y0 = block * rows_per_block;
                self.process_block(left, right, &stats, &geometry, &mut ws, y0, rows)?;
            }
        }

        debug!(invalid = out.count_invalid(), "dense disparity done");
        Ok(())
    }

    fn rows_per_block(&self, geometry: &MatchGeometry) -> usize {
        if !self.concurrent {
            return geometry.height;
        }
        let blocks = rayon::current_num_threads() * 4;
        geometry
            .height
            .div_ceil(blocks)
            .max(geometry.region_height)
            .max(1)
    }

    /// Number of finished region rows kept per worker.
    fn region_slots(&self, geometry: &MatchGeometry) -> usize {
        match self.config.approach {
            BlockApproach::BestFive => geometry.region_height,
            BlockApproach::Basic if self.metric.requires_normalize() => 1,
            BlockApproach::Basic => 0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn process_block<D: DisparityValue>(
        &self,
        left: &ImageGray<T>,
        right: &ImageGray<T>,
        stats: &M::Stats,
        geometry: &MatchGeometry,
        ws: &mut DenseWorkspace<T, M::Score>,
        y0: usize,
        rows: &mut [D],
    ) -> Result<()> {
        let width = geometry.width;
        let ry = geometry.radius_y;
        let region_height = geometry.region_height;
        let y1 = y0 + rows.len() / width;
        let interior = geometry.interior_rows();
        let first = y0.max(interior.start);
        let last = y1.min(interior.end);
        trace!(y0, y1, "dense block");
        if first >= last {
            return Ok(());
        }

        // Region rows the output rows of this block depend on.
        let (start, end) = match self.config.approach {
            BlockApproach::Basic => (first, last),
            BlockApproach::BestFive => (
                first.saturating_sub(ry).max(interior.start),
                (last + ry).min(interior.end),
            ),
        };

        // Horizontal scores of the first region except its last row.
        ws.vertical.iter_mut().for_each(|v| *v = M::Score::ZERO);
        for row in start - ry..start + ry {
            let slot = row % region_height;
            self.score_row(left, right, geometry, ws, row, slot);
            for (v, &s) in ws.vertical.iter_mut().zip(&ws.ring[slot]) {
                *v += s;
            }
        }

        for y in start..end {
            // The entering row takes the slot of the row leaving the region.
            let entering = y + ry;
            let slot = entering % region_height;
            if y > start {
                for (v, &s) in ws.vertical.iter_mut().zip(&ws.ring[slot]) {
                    *v -= s;
                }
            }
            self.score_row(left, right, geometry, ws, entering, slot);
            for (v, &s) in ws.vertical.iter_mut().zip(&ws.ring[slot]) {
                *v += s;
            }
            self.store_region(stats, geometry, ws, y)?;

            match self.config.approach {
                BlockApproach::Basic => {
                    let scores = match ws.regions.first() {
                        Some(normalized) => normalized,
                        None => &ws.vertical,
                    };
                    let out = &mut rows[(y - y0) * width..][..width];
                    self.selector.select_row(geometry, scores, out);
                }
                BlockApproach::BestFive => {
                    // Output rows whose lowest region row is `y`.
                    let bottom = interior.end - 1;
                    let from = y.saturating_sub(ry).max(first);
                    let to = if y == bottom { last } else { (y + 1).saturating_sub(ry).min(last) };
                    for out_y in from..to {
                        let out = &mut rows[(out_y - y0) * width..][..width];
                        self.select_best_five(geometry, ws, out_y, out);
                    }
                }
            }
        }
        Ok(())
    }

    fn score_row(
        &self,
        left: &ImageGray<T>,
        right: &ImageGray<T>,
        geometry: &MatchGeometry,
        ws: &mut DenseWorkspace<T, M::Score>,
        y: usize,
        slot: usize,
    ) {
        let width = geometry.width;
        grow_row_left(right, self.border.as_ref(), y, geometry.radius_x, &mut ws.right_grown);
        let left_row = &left.as_raw()[y * width..(y + 1) * width];
        accumulate_row(
            &self.metric,
            left_row,
            &ws.right_grown,
            geometry,
            &mut ws.element,
            &mut ws.ring[slot],
        );
    }

    /// Saves the finished region scores of centre row `y`, normalized when the metric
    /// requires it.
    fn store_region(
        &self,
        stats: &M::Stats,
        geometry: &MatchGeometry,
        ws: &mut DenseWorkspace<T, M::Score>,
        y: usize,
    ) -> Result<()> {
        if ws.regions.is_empty() {
            return Ok(());
        }
        let slot = y % ws.regions.len();
        let region = &mut ws.regions[slot];
        if !self.metric.requires_normalize() {
            region.copy_from_slice(&ws.vertical);
            return Ok(());
        }

        let area = geometry.area();
        let x_end = geometry.width - geometry.radius_x;
        for d in geometry.disparity_min..=geometry.disparity_max {
            for x in geometry.first_column(d)..x_end {
                let idx = geometry.score_index(x, d);
                region[idx] = self
                    .metric
                    .normalize(stats, x, x - d, y, ws.vertical[idx], area)?;
            }
        }
        Ok(())
    }

    /// Combines the centre region of row `y` with the two best of its four diagonal
    /// neighbours and selects the disparities of that row.
    ///
    /// Neighbour rows are clamped to the rows with a region inside the image. A neighbour
    /// column without a score at some disparity counts as the centre score.
    fn select_best_five<D: DisparityValue>(
        &self,
        geometry: &MatchGeometry,
        ws: &mut DenseWorkspace<T, M::Score>,
        y: usize,
        out: &mut [D],
    ) {
        let rx = geometry.radius_x;
        let ry = geometry.radius_y;
        let interior = geometry.interior_rows();
        let slots = ws.regions.len();
        let top = &ws.regions[y.saturating_sub(ry).max(interior.start) % slots];
        let middle = &ws.regions[y % slots];
        let bottom = &ws.regions[(y + ry).min(interior.end - 1) % slots];

        let x_end = geometry.width - rx;
        for d in geometry.disparity_min..=geometry.disparity_max {
            let x_first = geometry.first_column(d);
            for x in x_first..x_end {
                let idx = geometry.score_index(x, d);
                let centre = middle[idx];
                let mut around = [centre; 4];
                if x >= x_first + rx {
                    around[0] = top[idx - rx];
                    around[1] = bottom[idx - rx];
                }
                if x + rx < x_end {
                    around[2] = top[idx + rx];
                    around[3] = bottom[idx + rx];
                }
                ws.five[idx] = centre + sum_two_smallest(around);
            }
        }
        self.selector.select_row(geometry, &ws.five, out);
    }
}

/// Sum of the two smallest of four scores.
fn sum_two_smallest<S: Score>(v: [S; 4]) -> S {
    let (a, b) = if v[0] <= v[1] { (v[0], v[1]) } else { (v[1], v[0]) };
    let (c, e) = if v[2] <= v[3] { (v[2], v[3]) } else { (v[3], v[2]) };
    if b <= c {
        a + b
    } else if e <= a {
        c + e
    } else {
        a + c
    }
}

impl BlockMatcher<f32, Ncc> {
    /// Converts a pair of any pixel type with [`Ncc::convert_input`] and matches it.
    pub fn compute_converted<S: Pixel, D: DisparityValue>(
        &self,
        left: &ImageGray<S>,
        right: &ImageGray<S>,
    ) -> Result<DisparityImage<D>> {
        check_same_shape(left, right)?;
        let left = self.metric.convert_input(left);
        let right = self.metric.convert_input(right);
        self.compute(&left, &right)
    }
}

impl<T: Pixel, M: CostMetric<T>, D: DisparityValue> StereoDisparity<T, D> for BlockMatcher<T, M> {
    fn compute(&self, left: &ImageGray<T>, right: &ImageGray<T>) -> Result<DisparityImage<D>> {
        BlockMatcher::compute(self, left, right)
    }
}

/// Scratch owned by one worker.
struct DenseWorkspace<T, S> {
    /// Horizontal scores of the rows inside the current region, indexed by `row % height`.
    ring: Vec<Vec<S>>,
    /// Raw region scores of the current centre row.
    vertical: Vec<S>,
    /// Finished region scores of recent centre rows, indexed by `row % regions.len()`.
    regions: Vec<Vec<S>>,
    five: Vec<S>,
    element: Vec<S>,
    right_grown: Vec<T>,
}

impl<T: Pixel, S: Score> DenseWorkspace<T, S> {
    fn new(geometry: &MatchGeometry, approach: BlockApproach, region_slots: usize) -> Self {
        let len = geometry.score_len();
        let five_len = match approach {
            BlockApproach::BestFive => len,
            BlockApproach::Basic => 0,
        };
        Self {
            ring: vec![vec![S::ZERO; len]; geometry.region_height],
            vertical: vec![S::ZERO; len],
            regions: vec![vec![S::ZERO; len]; region_slots],
            five: vec![S::ZERO; five_len],
            element: vec![S::ZERO; geometry.width],
            right_grown: vec![T::from_f64(0.0); geometry.width + geometry.radius_x],
        }
    }
}
