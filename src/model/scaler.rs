//! Per-feature standardization fitted on a training matrix.

use ndarray::{Array1, Array2, Axis};

use super::ModelError;

/// Mean/standard-deviation scaler.
///
/// Uses the population standard deviation. A column whose variance is zero up
/// to floating-point noise keeps a scale of 1, so its transformed value is
/// `raw - mean` instead of a non-finite number.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
    constant_columns: Vec<usize>,
}

impl StandardScaler {
    /// Fit on the rows of `x`.
    pub fn fit(x: &Array2<f64>) -> Result<Self, ModelError> {
        let n = x.nrows();
        if n == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }

        let mean = x.mean_axis(Axis(0)).ok_or(ModelError::EmptyTrainingSet)?;
        let var = x.var_axis(Axis(0), 0.0);

        let mut scale = var.mapv(f64::sqrt);
        let mut constant_columns = Vec::new();
        for (j, (v, m)) in var.iter().zip(mean.iter()).enumerate() {
            if is_constant(*v, *m, n) {
                scale[j] = 1.0;
                constant_columns.push(j);
            }
        }

        Ok(Self {
            mean,
            scale,
            constant_columns,
        })
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        if x.ncols() != self.mean.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.mean.len(),
                got: x.ncols(),
            });
        }
        Ok((x - &self.mean) / &self.scale)
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    /// Indices of columns treated as zero-variance during the fit.
    pub fn constant_columns(&self) -> &[usize] {
        &self.constant_columns
    }
}

/// Variance below the rounding error accumulated over `n` samples counts as zero.
fn is_constant(var: f64, mean: f64, n: usize) -> bool {
    let eps = f64::EPSILON;
    let n = n as f64;
    let bound = n * eps * var + (n * mean * eps).powi(2);
    var <= bound
}
