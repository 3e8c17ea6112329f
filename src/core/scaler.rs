// scaler.rs - Per-feature standardizing scaler

use serde::{Deserialize, Serialize};
use crate::error::{AnalysisError, Result};

/// Affine transform `(x - mean) / scale` per feature
///
/// Scale is the population standard deviation; constant columns get a scale
/// of 1 so they map to zero instead of NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit on a non-empty, rectangular matrix
    pub fn fit(matrix: &[Vec<f64>]) -> Result<Self> {
        let n = matrix.len();
        if n == 0 {
            return Err(AnalysisError::Training("cannot fit scaler on an empty matrix".to_string()));
        }
        let width = matrix[0].len();
        if let Some(bad) = matrix.iter().position(|row| row.len() != width) {
            return Err(AnalysisError::Training(format!(
                "row {} has {} features, expected {}",
                bad,
                matrix[bad].len(),
                width
            )));
        }

        let mut mean = vec![0.0; width];
        for row in matrix {
            for (m, &x) in mean.iter_mut().zip(row) {
                *m += x;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n as f64);

        let mut var = vec![0.0; width];
        for row in matrix {
            for ((v, &x), &m) in var.iter_mut().zip(row).zip(&mean) {
                *v += (x - m) * (x - m);
            }
        }

        let scale = var
            .into_iter()
            .map(|v| {
                let sd = (v / n as f64).sqrt();
                if sd > f64::EPSILON { sd } else { 1.0 }
            })
            .collect();

        Ok(Self { mean, scale })
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    /// Scale one row; missing trailing values are read as zero
    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        self.mean
            .iter()
            .zip(&self.scale)
            .enumerate()
            .map(|(i, (m, s))| (row.get(i).copied().unwrap_or(0.0) - m) / s)
            .collect()
    }

    pub fn transform(&self, matrix: &[Vec<f64>]) -> Vec<Vec<f64>> {
        matrix.iter().map(|row| self.transform_row(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_transform() {
        let m = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = StandardScaler::fit(&m).unwrap();
        let t = scaler.transform(&m);
        assert_eq!(t[0], vec![-1.0, 0.0]);
        assert_eq!(t[1], vec![1.0, 0.0]);
    }

    #[test]
    fn test_empty_and_ragged_rejected() {
        assert!(StandardScaler::fit(&[]).is_err());
        assert!(StandardScaler::fit(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }
}
