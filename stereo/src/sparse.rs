//! Sparse block matching: the disparity of individual pixels.
//!
//! Produces the same disparities as [`BlockMatcher`](crate::BlockMatcher) for the same
//! configuration and metric, without computing scores for the rest of the image.

use crate::config::{BlockApproach, DisparityConfig, MatchGeometry};
use crate::metric::{check_score_range, CostMetric, Ncc, NccStats, Score};
use crate::select::SelectWithChecks;
use crate::{Error, Result};
use disparity_core::{check_same_shape, extract_region, ImageBorder, ImageGray, Pixel};
use std::borrow::Cow;
use std::sync::Arc;

/// Image pair with the metric statistics computed once for all queries.
pub struct PreparedPair<'a, T: Pixel, S> {
    left: Cow<'a, ImageGray<T>>,
    right: Cow<'a, ImageGray<T>>,
    stats: S,
    geometry: MatchGeometry,
}

impl<'a, T: Pixel, S> PreparedPair<'a, T, S> {
    pub fn geometry(&self) -> &MatchGeometry {
        &self.geometry
    }

    pub fn stats(&self) -> &S {
        &self.stats
    }

    pub fn left(&self) -> &ImageGray<T> {
        &self.left
    }

    pub fn right(&self) -> &ImageGray<T> {
        &self.right
    }
}

/// Result of a sparse query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparseMatch {
    pub valid: bool,
    /// Selected disparity, including `disparity_min`. Zero when `valid` is false.
    pub disparity: f64,
}

impl SparseMatch {
    pub const INVALID: SparseMatch = SparseMatch {
        valid: false,
        disparity: 0.0,
    };
}

/// Region scores of one query.
///
/// A fixed patch is compared against every position of a strip from the other image; the
/// strip is extracted once and covers all candidate disparities.
struct PatchScratch<T, S> {
    fixed: Vec<T>,
    strip: Vec<T>,
    element: Vec<S>,
}

impl<T: Pixel, S: Score> PatchScratch<T, S> {
    fn new(region_width: usize) -> Self {
        Self {
            fixed: Vec::new(),
            strip: Vec::new(),
            element: vec![S::ZERO; region_width],
        }
    }

    /// Raw score of the fixed patch against the strip window starting at column `offset`.
    /// `fixed_is_left` tells which image the fixed patch comes from.
    fn raw_score<M: CostMetric<T, Score = S>>(
        &mut self,
        metric: &M,
        geometry: &MatchGeometry,
        strip_width: usize,
        offset: usize,
        fixed_is_left: bool,
    ) -> S {
        let region_width = geometry.region_width;
        let mut sum = S::ZERO;
        for row in 0..geometry.region_height {
            let fixed = &self.fixed[row * region_width..][..region_width];
            let window = &self.strip[row * strip_width + offset..][..region_width];
            if fixed_is_left {
                metric.score_elements(fixed, window, &mut self.element);
            } else {
                metric.score_elements(window, fixed, &mut self.element);
            }
            for &e in &self.element {
                sum += e;
            }
        }
        sum
    }
}

pub struct SparseBlockMatcher<T: Pixel, M: CostMetric<T>> {
    config: DisparityConfig,
    metric: Arc<M>,
    border: Arc<dyn ImageBorder<T>>,
    selector: SelectWithChecks,
    scores: Vec<M::Score>,
    scratch: PatchScratch<T, M::Score>,
}

impl<T: Pixel, M: CostMetric<T>> SparseBlockMatcher<T, M> {
    /// Fails for invalid configurations and for [`BlockApproach::BestFive`], which is only
    /// available to the dense matcher.
    pub fn new(config: DisparityConfig, metric: M) -> Result<Self> {
        config.validate()?;
        if config.approach != BlockApproach::Basic {
            return Err(Error::Unsupported(format!(
                "sparse matching does not support the {:?} approach",
                config.approach
            )));
        }
        let selector = SelectWithChecks::from_config(&config);
        let border: Arc<dyn ImageBorder<T>> = Arc::new(config.border);
        let region_width = 2 * config.region_radius_x as usize + 1;
        Ok(Self {
            scores: Vec::with_capacity(config.disparity_range as usize),
            scratch: PatchScratch::new(region_width),
            config,
            metric: Arc::new(metric),
            border,
            selector,
        })
    }

    pub fn with_border(mut self, border: impl ImageBorder<T> + 'static) -> Self {
        self.border = Arc::new(border);
        self
    }

    pub fn config(&self) -> &DisparityConfig {
        &self.config
    }

    /// A matcher sharing the metric and border with `self` but with its own scratch, so it can
    /// run on another thread.
    pub fn concurrent_copy(&self) -> Self {
        Self {
            config: self.config.clone(),
            metric: Arc::clone(&self.metric),
            border: Arc::clone(&self.border),
            selector: self.selector,
            scores: Vec::with_capacity(self.config.disparity_range as usize),
            scratch: PatchScratch::new(self.scratch.element.len()),
        }
    }

    /// Validates the pair and runs the metric pre-pass.
    pub fn prepare<'a>(
        &self,
        left: &'a ImageGray<T>,
        right: &'a ImageGray<T>,
    ) -> Result<PreparedPair<'a, T, M::Stats>> {
        self.prepare_pair(Cow::Borrowed(left), Cow::Borrowed(right))
    }

    fn prepare_pair<'a>(
        &self,
        left: Cow<'a, ImageGray<T>>,
        right: Cow<'a, ImageGray<T>>,
    ) -> Result<PreparedPair<'a, T, M::Stats>> {
        check_same_shape(&*left, &*right)?;
        let geometry = self
            .config
            .geometry(left.width() as usize, left.height() as usize)?;
        check_score_range(self.metric.as_ref(), geometry.area(), 1)?;
        let stats = self
            .metric
            .prepare(&*left, &*right, self.border.as_ref(), &geometry)?;
        Ok(PreparedPair {
            left,
            right,
            stats,
            geometry,
        })
    }

    /// Left-to-right scores of the last [`process`](Self::process) call, indexed by
    /// `disparity - disparity_min`.
    pub fn scores(&self) -> &[M::Score] {
        &self.scores
    }

    /// Estimates the disparity of pixel `(x, y)` in the left image.
    ///
    /// Pixels whose region leaves the image, or with no candidate disparity, are reported as
    /// invalid.
    pub fn process(
        &mut self,
        pair: &PreparedPair<'_, T, M::Stats>,
        x: usize,
        y: usize,
    ) -> Result<SparseMatch> {
        self.scores.clear();
        let geometry = pair.geometry;
        if !geometry.is_interior(x, y) {
            return Ok(SparseMatch::INVALID);
        }
        let Some(local_max) = geometry.local_max(x) else {
            return Ok(SparseMatch::INVALID);
        };
        let dmin = geometry.disparity_min;
        let rx = geometry.radius_x as isize;
        let y0 = y as isize - geometry.radius_y as isize;
        let border = self.border.as_ref();

        // Left region at x against right regions at x - local_max ..= x - dmin.
        let strip_width = local_max - dmin + geometry.region_width;
        let rh = geometry.region_height;
        let rw = geometry.region_width;
        let scratch = &mut self.scratch;
        let left_x0 = x as isize - rx;
        extract_region(pair.left(), border, left_x0, y0, rw, rh, &mut scratch.fixed);
        let strip_x0 = (x - local_max) as isize - rx;
        extract_region(pair.right(), border, strip_x0, y0, strip_width, rh, &mut scratch.strip);
        for d in dmin..=local_max {
            let raw = self
                .scratch
                .raw_score(self.metric.as_ref(), &geometry, strip_width, local_max - d, true);
            let score = self.finish(pair, x, x - d, y, raw)?;
            self.scores.push(score);
        }

        let scores = &self.scores;
        let Some(offset) = self.selector.check_forward(scores.len(), |i| scores[i]) else {
            return Ok(SparseMatch::INVALID);
        };
        let d1 = dmin + offset;

        if self.selector.right_to_left_tolerance.is_some() {
            let xr = x - d1;
            let interior = geometry.interior_columns();
            // Disparities whose left region at xr + d lies inside the image.
            let d_lo = dmin.max(interior.start.saturating_sub(xr));
            let d_hi = geometry.disparity_max.min(interior.end - 1 - xr);
            let mut candidates = Vec::with_capacity(geometry.disparity_range);
            if d_lo <= d_hi {
                let strip_width = d_hi - d_lo + rw;
                let scratch = &mut self.scratch;
                let right_x0 = xr as isize - rx;
                extract_region(pair.right(), border, right_x0, y0, rw, rh, &mut scratch.fixed);
                let strip_x0 = (xr + d_lo) as isize - rx;
                let strip = &mut scratch.strip;
                extract_region(pair.left(), border, strip_x0, y0, strip_width, rh, strip);
                for d in d_lo..=d_hi {
                    let raw = self
                        .scratch
                        .raw_score(self.metric.as_ref(), &geometry, strip_width, d - d_lo, false);
                    candidates.push((d, self.finish(pair, xr + d, xr, y, raw)?));
                }
            }
            if !self.selector.check_right_to_left(d1, candidates) {
                return Ok(SparseMatch::INVALID);
            }
        }

        Ok(SparseMatch {
            valid: true,
            disparity: d1 as f64,
        })
    }

    /// Final score of the region centred at `(x_left, y)` in the left image against the
    /// region centred at `(x_right, y)` in the right image.
    fn finish(
        &self,
        pair: &PreparedPair<'_, T, M::Stats>,
        x_left: usize,
        x_right: usize,
        y: usize,
        raw: M::Score,
    ) -> Result<M::Score> {
        if self.metric.requires_normalize() {
            self.metric
                .normalize(&pair.stats, x_left, x_right, y, raw, pair.geometry.area())
        } else {
            Ok(raw)
        }
    }
}

impl SparseBlockMatcher<f32, Ncc> {
    /// Converts a pair of any pixel type with [`Ncc::convert_input`] and prepares it. The
    /// returned pair owns the converted images.
    pub fn prepare_converted<S: Pixel>(
        &self,
        left: &ImageGray<S>,
        right: &ImageGray<S>,
    ) -> Result<PreparedPair<'static, f32, NccStats<f32>>> {
        check_same_shape(left, right)?;
        let left = self.metric.convert_input(left);
        let right = self.metric.convert_input(right);
        self.prepare_pair(Cow::Owned(left), Cow::Owned(right))
    }
}

impl<T: Pixel, M: CostMetric<T>> Clone for SparseBlockMatcher<T, M> {
    fn clone(&self) -> Self {
        self.concurrent_copy()
    }
}
