//! Principal component projection of the resampled feature matrix.

use nalgebra::{DMatrix, DVector, SymmetricEigen};

use super::{MembershipError, Result};

/// A fitted principal component model.
#[derive(Debug, Clone)]
pub struct Pca {
    /// Per-feature mean removed before projecting.
    mean: DVector<f64>,
    /// D×K matrix whose columns are the kept principal axes, by decreasing variance.
    components: DMatrix<f64>,
    /// Variance along each kept axis.
    explained_variance: Vec<f64>,
    /// Total variance over all D axes.
    total_variance: f64,
}

impl Pca {
    /// Fit `n_components` principal axes to the rows of `data`.
    ///
    /// The axes are the eigenvectors of the sample covariance of the centered
    /// data with the largest eigenvalues. Each axis is sign-normalised so its
    /// largest-magnitude loading is positive, which makes the projection
    /// deterministic.
    ///
    /// # Errors
    ///
    /// `ParameterRange` if `n_components` is 0 or exceeds the number of
    /// columns, `InputShape` if there are fewer than `n_components + 1` rows.
    pub fn fit(data: &DMatrix<f64>, n_components: usize) -> Result<Self> {
        let (n, d) = data.shape();

        if n_components == 0 || n_components > d {
            return Err(MembershipError::ParameterRange(format!(
                "cannot keep {} components of {}-dimensional data",
                n_components, d
            )));
        }
        if n < n_components + 1 {
            return Err(MembershipError::InputShape(format!(
                "PCA with {} components needs at least {} rows, got {}",
                n_components,
                n_components + 1,
                n
            )));
        }

        let mean = DVector::from_fn(d, |j, _| data.column(j).mean());
        let centered = center(data, &mean);
        let covariance = (centered.transpose() * &centered) / (n - 1) as f64;

        let eigen = SymmetricEigen::new(covariance);
        let mut order: Vec<usize> = (0..d).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

        let mut components = DMatrix::zeros(d, n_components);
        let mut explained_variance = Vec::with_capacity(n_components);
        for (c, &idx) in order.iter().take(n_components).enumerate() {
            let mut axis = eigen.eigenvectors.column(idx).clone_owned();
            let pivot = axis
                .iter()
                .copied()
                .max_by(|a, b| a.abs().total_cmp(&b.abs()))
                .unwrap_or(0.0);
            if pivot < 0.0 {
                axis.neg_mut();
            }
            components.set_column(c, &axis);
            // Round-off can leave tiny negative eigenvalues on degenerate data
            explained_variance.push(eigen.eigenvalues[idx].max(0.0));
        }

        let total_variance = eigen.eigenvalues.iter().map(|v| v.max(0.0)).sum();

        Ok(Self {
            mean,
            components,
            explained_variance,
            total_variance,
        })
    }

    /// Number of kept axes (K).
    #[inline]
    pub fn n_components(&self) -> usize {
        self.components.ncols()
    }

    /// Variance captured along each kept axis.
    pub fn explained_variance(&self) -> &[f64] {
        &self.explained_variance
    }

    /// Fraction of the total variance captured along each kept axis.
    pub fn explained_variance_ratio(&self) -> Vec<f64> {
        if self.total_variance <= 0.0 {
            return vec![0.0; self.explained_variance.len()];
        }
        self.explained_variance
            .iter()
            .map(|v| v / self.total_variance)
            .collect()
    }

    /// Project N×D rows onto the kept axes, giving an N×K matrix.
    pub fn transform(&self, data: &DMatrix<f64>) -> DMatrix<f64> {
        center(data, &self.mean) * &self.components
    }

    /// Map N×K projected rows back into the original D-dimensional space.
    pub fn inverse_transform(&self, reduced: &DMatrix<f64>) -> DMatrix<f64> {
        let mut restored = reduced * self.components.transpose();
        for j in 0..restored.ncols() {
            let m = self.mean[j];
            restored.column_mut(j).add_scalar_mut(m);
        }
        restored
    }
}

/// Fit a PCA with `n_components` axes and return the projected data.
pub fn reduce(data: &DMatrix<f64>, n_components: usize) -> Result<DMatrix<f64>> {
    let pca = Pca::fit(data, n_components)?;
    Ok(pca.transform(data))
}

fn center(data: &DMatrix<f64>, mean: &DVector<f64>) -> DMatrix<f64> {
    let mut centered = data.clone();
    for j in 0..centered.ncols() {
        let m = mean[j];
        centered.column_mut(j).add_scalar_mut(-m);
    }
    centered
}
