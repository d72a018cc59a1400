//! Bivariate Pearson screening of candidate predictors.
//!
//! For each candidate column the filter computes Pearson's r against the
//! dependent column together with a two-sided p-value from the Student-t
//! distribution, keeps only candidates with p below the significance level,
//! and ranks the survivors by |r|.
//!
//! The p-values are the classical t-approximation (t = r * sqrt((n-2)/(1-r^2))
//! with n-2 degrees of freedom), the same statistic reference libraries
//! report for `pearsonr`.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use thiserror::Error;

/// Significance level for the screening filter.
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;
/// At most this many candidates survive the filter.
pub const MAX_RETAINED: usize = 200;

#[derive(Error, Debug)]
pub enum CorrError {
    #[error("correlation requires at least 3 paired observations, got {0}")]
    TooFewObservations(usize),
    #[error("column '{name}' has {len} rows but the dependent column has {expected}")]
    LengthMismatch {
        name: String,
        len: usize,
        expected: usize,
    },
}

/// One retained candidate: name, |r|, and signed r, in the column order the
/// persisted pearson table uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub x_var: String,
    pub abs_r: f64,
    pub r: f64,
}

/// Pearson's r and its two-sided p-value.
///
/// Returns `None` when either input has zero variance: the correlation is
/// undefined there, and a constant candidate can never pass the significance
/// filter anyway.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n = x.len();
    if n < 3 || n != y.len() {
        return None;
    }
    let n_f = n as f64;
    let mean_x = x.iter().sum::<f64>() / n_f;
    let mean_y = y.iter().sum::<f64>() / n_f;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }

    let r = (cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0);
    if !r.is_finite() {
        return None;
    }

    // Perfect correlation saturates the t statistic.
    let denom = 1.0 - r * r;
    let p = if denom <= f64::EPSILON {
        0.0
    } else {
        let df = (n - 2) as f64;
        let t = r.abs() * (df / denom).sqrt();
        let dist = StudentsT::new(0.0, 1.0, df).ok()?;
        2.0 * (1.0 - dist.cdf(t))
    };

    Some((r, p.clamp(0.0, 1.0)))
}

/// Screens candidate columns against the dependent column.
///
/// Candidates with p < 0.05 are retained, sorted by |r| descending, and
/// truncated to the top 200. Candidates whose correlation is undefined
/// (constant columns, NaN values) are skipped.
pub fn filter_candidates(
    y: &[f64],
    candidates: &[(String, Vec<f64>)],
) -> Result<Vec<CorrelationRecord>, CorrError> {
    if y.len() < 3 {
        return Err(CorrError::TooFewObservations(y.len()));
    }

    let mut retained = Vec::new();
    for (name, column) in candidates {
        if column.len() != y.len() {
            return Err(CorrError::LengthMismatch {
                name: name.clone(),
                len: column.len(),
                expected: y.len(),
            });
        }
        let Some((r, p)) = pearson(column, y) else {
            log::warn!("skipping '{name}': correlation undefined (constant or non-finite)");
            continue;
        };
        if p < SIGNIFICANCE_LEVEL {
            retained.push(CorrelationRecord {
                x_var: name.clone(),
                abs_r: r.abs(),
                r,
            });
        }
    }

    retained.sort_by(|a, b| b.abs_r.partial_cmp(&a.abs_r).unwrap_or(std::cmp::Ordering::Equal));
    retained.truncate(MAX_RETAINED);
    Ok(retained)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn perfect_positive_correlation() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [2.0, 4.0, 6.0, 8.0, 10.0];
        let (r, p) = pearson(&x, &y).unwrap();
        assert_abs_diff_eq!(r, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn constant_column_is_undefined() {
        let x = [3.0, 3.0, 3.0, 3.0];
        let y = [1.0, 2.0, 3.0, 4.0];
        assert!(pearson(&x, &y).is_none());
    }

    #[test]
    fn outlier_weakens_r_below_significance_at_n5() {
        // Reference values from scipy.stats.pearsonr: r ~ 0.725, p ~ 0.166.
        let y = [10.0, 20.0, 30.0, 40.0, 50.0];
        let x = [1.0, 2.0, 3.0, 4.0, 100.0];
        let (r, p) = pearson(&x, &y).unwrap();
        assert_abs_diff_eq!(r, 0.7250, epsilon = 1e-3);
        assert!(p > SIGNIFICANCE_LEVEL, "p = {p} should fail the filter at n=5");

        let candidates = vec![("x".to_string(), x.to_vec())];
        let kept = filter_candidates(&y, &candidates).unwrap();
        assert!(kept.is_empty());
    }

    #[test]
    fn filter_orders_by_abs_r_and_caps_at_200() {
        let n = 40;
        let y: Vec<f64> = (0..n).map(|i| i as f64).collect();
        // 250 noisy copies of y with growing noise: all significant, later
        // columns weaker.
        let mut candidates = Vec::new();
        for c in 0..250 {
            let column: Vec<f64> = (0..n)
                .map(|i| {
                    let noise = (((i * 37 + c * 13) % 17) as f64 - 8.0) * (c as f64 * 0.05);
                    i as f64 + noise
                })
                .collect();
            candidates.push((format!("x{c}"), column));
        }
        let kept = filter_candidates(&y, &candidates).unwrap();
        assert!(kept.len() <= MAX_RETAINED);
        for pair in kept.windows(2) {
            assert!(pair[0].abs_r >= pair[1].abs_r);
        }
        for record in &kept {
            let column = &candidates
                .iter()
                .find(|(name, _)| *name == record.x_var)
                .unwrap()
                .1;
            let (_, p) = pearson(column, &y).unwrap();
            assert!(p < SIGNIFICANCE_LEVEL);
        }
    }

    #[test]
    fn fewer_than_cap_returns_all() {
        let y = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let candidates = vec![
            ("a".to_string(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]),
            ("b".to_string(), vec![8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0]),
        ];
        let kept = filter_candidates(&y, &candidates).unwrap();
        assert_eq!(kept.len(), 2);
    }
}
