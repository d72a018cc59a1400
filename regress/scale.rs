//! Column standardization (zero mean, unit variance).
//!
//! Fit statistics use the population variance (ddof = 0), matching the
//! standard scaler the original tables were produced with. Zero-variance
//! columns scale by 1 so they standardize to all zeros instead of NaN.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScaleError {
    #[error("scaler was fit on {fit} columns but asked to transform {got}")]
    ColumnCountMismatch { fit: usize, got: usize },
    #[error("cannot fit a scaler on an empty table")]
    EmptyTable,
}

/// A fitted per-column mean/std standardizer.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    /// Fits one mean/std pair per column. Columns are slices of equal length.
    pub fn fit(columns: &[Vec<f64>]) -> Result<Self, ScaleError> {
        if columns.is_empty() || columns[0].is_empty() {
            return Err(ScaleError::EmptyTable);
        }
        let mut means = Vec::with_capacity(columns.len());
        let mut stds = Vec::with_capacity(columns.len());
        for column in columns {
            let n = column.len() as f64;
            let mean = column.iter().sum::<f64>() / n;
            let var = column.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
            let std = var.sqrt();
            means.push(mean);
            stds.push(if std > 0.0 { std } else { 1.0 });
        }
        Ok(Self { means, stds })
    }

    /// Standardizes the columns in place, preserving row order.
    pub fn transform(&self, columns: &mut [Vec<f64>]) -> Result<(), ScaleError> {
        self.check_width(columns.len())?;
        for (j, column) in columns.iter_mut().enumerate() {
            for value in column.iter_mut() {
                *value = (*value - self.means[j]) / self.stds[j];
            }
        }
        Ok(())
    }

    /// Undoes `transform` using the fitted statistics.
    pub fn inverse_transform(&self, columns: &mut [Vec<f64>]) -> Result<(), ScaleError> {
        self.check_width(columns.len())?;
        for (j, column) in columns.iter_mut().enumerate() {
            for value in column.iter_mut() {
                *value = *value * self.stds[j] + self.means[j];
            }
        }
        Ok(())
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn stds(&self) -> &[f64] {
        &self.stds
    }

    fn check_width(&self, got: usize) -> Result<(), ScaleError> {
        if got != self.means.len() {
            return Err(ScaleError::ColumnCountMismatch {
                fit: self.means.len(),
                got,
            });
        }
        Ok(())
    }
}
