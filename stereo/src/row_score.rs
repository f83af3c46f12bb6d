//! Horizontal region sums for one image row at every disparity.

use crate::config::MatchGeometry;
use crate::metric::{CostMetric, Score};
use disparity_core::Pixel;

/// Computes the horizontal window sum of `metric` costs for every valid centre of one row.
///
/// `right_grown` is the right image row prefixed with `radius_x` border samples, so that
/// `right_grown[i]` holds column `i - radius_x`. `element` is scratch of at least `width`
/// entries. Scores are written to `out[geometry.score_index(x, d)]` for
/// `x in geometry.first_column(d)..width - radius_x`; other cells are left untouched.
///
/// Disparities are the outer loop and columns the inner one, each column reusing the sum
/// of its left neighbour.
pub fn accumulate_row<T, M>(
    metric: &M,
    left: &[T],
    right_grown: &[T],
    geometry: &MatchGeometry,
    element: &mut [M::Score],
    out: &mut [M::Score],
) where
    T: Pixel,
    M: CostMetric<T>,
{
    let width = geometry.width;
    let rx = geometry.radius_x;
    let region_width = geometry.region_width;
    let x_end = width - rx;

    for d in geometry.disparity_min..=geometry.disparity_max {
        let x_first = geometry.first_column(d);
        if x_first >= x_end {
            continue;
        }

        // Elements for left columns j0..width against right columns j0-d..width-d.
        let j0 = x_first - rx;
        let n = width - j0;
        let right_start = j0 + rx - d;
        let elem = &mut element[..n];
        metric.score_elements(&left[j0..width], &right_grown[right_start..right_start + n], elem);

        let row_out = &mut out[(d - geometry.disparity_min) * width..][..width];
        let mut sum = M::Score::ZERO;
        for &e in &elem[..region_width] {
            sum += e;
        }
        row_out[x_first] = sum;

        for x in x_first + 1..x_end {
            sum -= elem[x - rx - 1 - j0];
            sum += elem[x + rx - j0];
            row_out[x] = sum;
        }
    }
}
