//! Winner-take-all disparity selection with optional validation checks.

use crate::config::{DisparityConfig, MatchGeometry};
use crate::metric::Score;
use crate::DisparityValue;

/// Selects the lowest scoring disparity and rejects it when one of the enabled checks fails.
///
/// Ties are resolved in favour of the smallest disparity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectWithChecks {
    /// Pixel scores above this are rejected.
    pub max_error: Option<f64>,
    /// Largest allowed difference between the left-to-right and right-to-left match.
    pub right_to_left_tolerance: Option<usize>,
    /// Minimum gap between the best and second best score, relative to the best.
    pub texture_threshold: Option<f64>,
}

impl SelectWithChecks {
    pub fn from_config(config: &DisparityConfig) -> Self {
        Self {
            max_error: {
                let max_error = config.effective_max_error();
                (max_error > 0).then_some(max_error as f64)
            },
            right_to_left_tolerance: (config.right_to_left_tolerance >= 0)
                .then_some(config.right_to_left_tolerance as usize),
            texture_threshold: (config.texture_threshold > 0.0)
                .then_some(config.texture_threshold),
        }
    }

    /// No checks, only the winner-take-all search.
    pub fn unchecked() -> Self {
        Self {
            max_error: None,
            right_to_left_tolerance: None,
            texture_threshold: None,
        }
    }

    /// Offset of the lowest of the `n` scores returned by `score_at`.
    pub fn best<S: Score>(n: usize, score_at: impl Fn(usize) -> S) -> (usize, S) {
        let mut best_index = 0;
        let mut best = score_at(0);
        for i in 1..n {
            let s = score_at(i);
            if s < best {
                best = s;
                best_index = i;
            }
        }
        (best_index, best)
    }

    /// Runs the search over `n` candidate offsets followed by the max error and texture checks.
    /// Returns the winning offset if it passes.
    pub fn check_forward<S: Score>(&self, n: usize, score_at: impl Fn(usize) -> S) -> Option<usize> {
        if n == 0 {
            return None;
        }
        let (best_index, best) = Self::best(n, &score_at);

        if let Some(max_error) = self.max_error {
            if best.to_f64() > max_error {
                return None;
            }
        }

        if let Some(threshold) = self.texture_threshold {
            if n >= 3 {
                let mut second = S::WORST;
                for i in 0..n {
                    if i.abs_diff(best_index) > 1 {
                        let s = score_at(i);
                        if s < second {
                            second = s;
                        }
                    }
                }
                if second != S::WORST {
                    let gap = second.to_f64() - best.to_f64();
                    if gap <= threshold * best.to_f64().abs() {
                        return None;
                    }
                }
            }
        }

        Some(best_index)
    }

    /// Right-to-left consistency of `disparity`, given the scores of every candidate match of
    /// the right pixel as `(disparity, score)` in increasing disparity order.
    pub fn check_right_to_left<S: Score>(
        &self,
        disparity: usize,
        candidates: impl IntoIterator<Item = (usize, S)>,
    ) -> bool {
        let Some(tolerance) = self.right_to_left_tolerance else {
            return true;
        };
        let mut best: Option<(usize, S)> = None;
        for (d, s) in candidates {
            if best.map_or(true, |(_, b)| s < b) {
                best = Some((d, s));
            }
        }
        match best {
            Some((d, _)) => d.abs_diff(disparity) <= tolerance,
            None => true,
        }
    }

    /// Fills one row of a disparity image from a score buffer laid out as described by
    /// [`MatchGeometry::score_index`]. Columns without a region inside the image, and
    /// rejected columns, get the invalid value `disparity_range`.
    pub fn select_row<S: Score, D: DisparityValue>(
        &self,
        geometry: &MatchGeometry,
        scores: &[S],
        out: &mut [D],
    ) {
        let invalid = D::from_usize(geometry.disparity_range);
        let dmin = geometry.disparity_min;
        let width = geometry.width;
        let interior = geometry.interior_columns();

        for (x, value) in out.iter_mut().enumerate().take(width) {
            *value = invalid;
            if !interior.contains(&x) {
                continue;
            }
            let Some(local_max) = geometry.local_max(x) else {
                continue;
            };
            let n = local_max - dmin + 1;
            let Some(offset) = self.check_forward(n, |i| scores[x + i * width]) else {
                continue;
            };

            let d1 = dmin + offset;
            if self.right_to_left_tolerance.is_some() {
                let xr = x - d1;
                let candidates = (dmin..=geometry.disparity_max)
                    .map(|d| (d, xr + d))
                    .take_while(|&(_, xl)| xl < interior.end)
                    .filter(|&(_, xl)| xl >= interior.start)
                    .map(|(d, xl)| (d, scores[geometry.score_index(xl, d)]));
                if !self.check_right_to_left(d1, candidates) {
                    continue;
                }
            }

            *value = D::from_usize(offset);
        }
    }
}
