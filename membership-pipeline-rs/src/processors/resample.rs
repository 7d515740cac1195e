//! Monte-Carlo resampling of measurements within their uncertainties.

use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::StandardNormal;

/// Perturb every star's feature vector by its uncertainties.
///
/// One standard normal draw `z` is taken per star and broadcast across that
/// star's features: `row' = row + z * uncertainty_row`. The features of a
/// star therefore move together under a single draw rather than
/// independently. Zero uncertainties leave the value untouched.
///
/// # Arguments
///
/// * `features` - N×D feature matrix
/// * `uncertainties` - N×D non-negative uncertainties, same shape
/// * `rng` - Random stream owned by the calling trial
///
/// # Returns
///
/// A new N×D matrix; the inputs are not modified.
pub fn resample<R: Rng>(
    features: &DMatrix<f64>,
    uncertainties: &DMatrix<f64>,
    rng: &mut R,
) -> DMatrix<f64> {
    debug_assert_eq!(
        features.shape(),
        uncertainties.shape(),
        "features and uncertainties must have same shape"
    );

    let mut sampled = features.clone();
    for i in 0..features.nrows() {
        let z: f64 = rng.sample(StandardNormal);
        for j in 0..features.ncols() {
            sampled[(i, j)] += z * uncertainties[(i, j)];
        }
    }
    sampled
}
