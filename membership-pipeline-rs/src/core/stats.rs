//! Small numeric helpers shared by the estimator stages.

use nalgebra::DMatrix;

/// Copy the rows of a matrix into contiguous point vectors.
///
/// nalgebra stores matrices column-major; the distance-heavy stages want
/// row-contiguous points instead.
pub fn matrix_rows(matrix: &DMatrix<f64>) -> Vec<Vec<f64>> {
    (0..matrix.nrows())
        .map(|i| matrix.row(i).iter().copied().collect())
        .collect()
}

/// Euclidean distance between two points of equal dimension.
#[inline]
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "points must have same dimension");
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Percentile `q` (0..=100) of `values` with linear interpolation between
/// the two closest ranks.
///
/// Returns `None` for an empty slice. NaN values sort last.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }

    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Element-wise mean of the selected points, or `None` if nothing is selected.
pub fn masked_centroid(points: &[Vec<f64>], mask: &[bool]) -> Option<Vec<f64>> {
    let dim = points.first()?.len();
    let mut sum = vec![0.0; dim];
    let mut count = 0usize;

    for (point, _) in points.iter().zip(mask).filter(|(_, m)| **m) {
        for (s, v) in sum.iter_mut().zip(point) {
            *s += v;
        }
        count += 1;
    }

    if count == 0 {
        return None;
    }
    Some(sum.into_iter().map(|s| s / count as f64).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_rows() {
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let rows = matrix_rows(&m);
        assert_eq!(rows, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
    }

    #[test]
    fn test_euclidean() {
        assert!((euclidean(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-12);
        assert_eq!(euclidean(&[1.5], &[1.5]), 0.0);
    }

    #[test]
    fn test_percentile_linear_interpolation() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 100.0), Some(4.0));
        assert_eq!(percentile(&values, 50.0), Some(2.5));
        // rank 0.75 * 3 = 2.25 -> 3 + 0.25
        assert_eq!(percentile(&values, 75.0), Some(3.25));
    }

    #[test]
    fn test_percentile_single_and_empty() {
        assert_eq!(percentile(&[7.0], 95.0), Some(7.0));
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn test_masked_centroid() {
        let points = vec![vec![0.0, 0.0], vec![2.0, 4.0], vec![100.0, 100.0]];
        let centroid = masked_centroid(&points, &[true, true, false]).unwrap();
        assert_eq!(centroid, vec![1.0, 2.0]);
    }

    #[test]
    fn test_masked_centroid_empty_selection() {
        let points = vec![vec![0.0, 0.0]];
        assert!(masked_centroid(&points, &[false]).is_none());
        assert!(masked_centroid(&[], &[]).is_none());
    }
}
