//! Elastic net regression with cross-validated hyperparameter selection.
//!
//! The solver is coordinate descent over a randomly shuffled coordinate
//! order, with the residual updated incrementally after every coefficient
//! move. The objective follows the usual parametrization
//!
//! ```text
//! (1/2n) * ||y - X w||^2  +  alpha * l1 * ||w||_1  +  (alpha/2) * (1 - l1) * ||w||_2^2
//! ```
//!
//! No intercept is fit: the design matrix is assumed pre-centered by the
//! scaling stage. `fit` evaluates every (alpha, l1_ratio) pair on k-fold
//! cross-validation over the training rows, picks the pair with the lowest
//! mean validation MSE, and refits it on all training rows.

use crate::metrics::mean_squared_error;
use crate::split::k_fold;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnetError {
    #[error("design matrix has {rows} rows but the target has {targets}")]
    ShapeMismatch { rows: usize, targets: usize },
    #[error("hyperparameter grid is empty")]
    EmptyGrid,
    #[error("training split of {rows} rows cannot be cut into {folds} folds")]
    TooFewRows { rows: usize, folds: usize },
}

/// Hyperparameter grid and solver settings.
#[derive(Debug, Clone)]
pub struct ElasticNetConfig {
    pub alphas: Vec<f64>,
    pub l1_ratios: Vec<f64>,
    pub cv_folds: usize,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for ElasticNetConfig {
    fn default() -> Self {
        Self {
            alphas: vec![0.0005, 0.001, 0.01, 0.03, 0.05, 0.1],
            l1_ratios: vec![0.1, 0.5, 0.7, 0.9, 0.95, 0.99, 1.0],
            cv_folds: 5,
            max_iter: 10_000,
            tol: 1e-6,
        }
    }
}

/// A fitted elastic net: coefficient vector plus the selected grid point.
#[derive(Debug, Clone)]
pub struct ElasticNetFit {
    pub coefficients: Array1<f64>,
    pub alpha: f64,
    pub l1_ratio: f64,
}

impl ElasticNetFit {
    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.dot(&self.coefficients)
    }
}

fn soft_threshold(z: f64, gamma: f64) -> f64 {
    if z > gamma {
        z - gamma
    } else if z < -gamma {
        z + gamma
    } else {
        0.0
    }
}

/// Coordinate descent for one (alpha, l1_ratio) pair, warm-startable.
fn coordinate_descent(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    alpha: f64,
    l1_ratio: f64,
    beta_init: &[f64],
    max_iter: usize,
    tol: f64,
    rng: &mut StdRng,
) -> Vec<f64> {
    let (n, p) = x.dim();
    if n == 0 || p == 0 {
        return vec![0.0; p];
    }

    let mut beta = beta_init.to_vec();
    beta.resize(p, 0.0);

    // r = y - X beta
    let mut residual: Vec<f64> = y.to_vec();
    if beta.iter().any(|b| *b != 0.0) {
        for i in 0..n {
            let mut dot = 0.0;
            for j in 0..p {
                dot += x[[i, j]] * beta[j];
            }
            residual[i] -= dot;
        }
    }

    let n_f = n as f64;
    let penalty_l1 = alpha * l1_ratio;
    let penalty_l2 = alpha * (1.0 - l1_ratio);
    let norm_cache: Vec<f64> = (0..p)
        .map(|j| x.column(j).iter().map(|&v| v * v).sum::<f64>() / n_f)
        .collect();

    let mut coords: Vec<usize> = (0..p).collect();

    for _ in 0..max_iter {
        coords.shuffle(rng);
        let mut max_delta: f64 = 0.0;

        for &j in &coords {
            if norm_cache[j] <= 1e-12 {
                beta[j] = 0.0;
                continue;
            }
            let col = x.column(j);
            let old = beta[j];

            let mut rho = 0.0;
            for (i, &xij) in col.iter().enumerate() {
                rho += xij * (residual[i] + xij * old);
            }
            rho /= n_f;

            let updated = soft_threshold(rho, penalty_l1) / (norm_cache[j] + penalty_l2);
            let diff = updated - old;
            if diff != 0.0 {
                for (i, &xij) in col.iter().enumerate() {
                    residual[i] -= diff * xij;
                }
                beta[j] = updated;
                max_delta = max_delta.max(diff.abs());
            }
        }

        if max_delta < tol {
            return beta;
        }
    }

    log::warn!("elastic net coordinate descent hit max_iter without converging");
    beta
}

/// Mean cross-validation MSE for one grid point.
fn cv_score(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    alpha: f64,
    l1_ratio: f64,
    config: &ElasticNetConfig,
    seed: u64,
) -> f64 {
    let folds = k_fold(x.nrows(), config.cv_folds);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut total = 0.0;
    for (train_idx, valid_idx) in &folds {
        let x_train = x.select(Axis(0), train_idx);
        let y_train = y.select(Axis(0), train_idx);
        let beta = coordinate_descent(
            x_train.view(),
            y_train.view(),
            alpha,
            l1_ratio,
            &vec![0.0; x.ncols()],
            config.max_iter,
            config.tol,
            &mut rng,
        );
        let x_valid = x.select(Axis(0), valid_idx);
        let y_valid = y.select(Axis(0), valid_idx);
        let beta = Array1::from_vec(beta);
        let predicted = x_valid.dot(&beta);
        total += mean_squared_error(&y_valid.to_vec(), &predicted.to_vec());
    }
    total / folds.len() as f64
}

/// Cross-validated grid search plus final refit on all training rows.
pub fn fit(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    config: &ElasticNetConfig,
    seed: u64,
) -> Result<ElasticNetFit, EnetError> {
    if x.nrows() != y.len() {
        return Err(EnetError::ShapeMismatch {
            rows: x.nrows(),
            targets: y.len(),
        });
    }
    if config.alphas.is_empty() || config.l1_ratios.is_empty() {
        return Err(EnetError::EmptyGrid);
    }
    if x.nrows() < config.cv_folds {
        return Err(EnetError::TooFewRows {
            rows: x.nrows(),
            folds: config.cv_folds,
        });
    }

    let grid: Vec<(f64, f64)> = config
        .alphas
        .iter()
        .flat_map(|&a| config.l1_ratios.iter().map(move |&l| (a, l)))
        .collect();

    // The library's internal parallelism is the only concurrency here: the
    // grid points are independent and each one is scored deterministically
    // from the seed and its own index.
    let scored: Vec<(usize, f64)> = grid
        .par_iter()
        .enumerate()
        .map(|(idx, &(alpha, l1_ratio))| {
            let candidate_seed = seed.wrapping_mul(0x9E37_79B9).wrapping_add(idx as u64);
            (idx, cv_score(x, y, alpha, l1_ratio, config, candidate_seed))
        })
        .collect();

    let (best_idx, _) = scored
        .iter()
        .copied()
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .ok_or(EnetError::EmptyGrid)?;
    let (alpha, l1_ratio) = grid[best_idx];

    let mut rng = StdRng::seed_from_u64(seed);
    let beta = coordinate_descent(
        x,
        y,
        alpha,
        l1_ratio,
        &vec![0.0; x.ncols()],
        config.max_iter,
        config.tol,
        &mut rng,
    );

    Ok(ElasticNetFit {
        coefficients: Array1::from_vec(beta),
        alpha,
        l1_ratio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn small_config() -> ElasticNetConfig {
        ElasticNetConfig {
            alphas: vec![0.001, 0.01],
            l1_ratios: vec![0.5, 1.0],
            cv_folds: 3,
            max_iter: 5_000,
            tol: 1e-8,
        }
    }

    /// Centered design with y = 2*x1 - 1*x2 exactly.
    fn linear_problem(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 3), |(i, j)| {
            let t = i as f64 - (n as f64 - 1.0) / 2.0;
            match j {
                0 => t,
                1 => (t * 0.7).sin() * 3.0,
                _ => (t * 1.3).cos(),
            }
        });
        let y = Array1::from_shape_fn(n, |i| 2.0 * x[[i, 0]] - 1.0 * x[[i, 1]]);
        (x, y)
    }

    #[test]
    fn recovers_linear_coefficients() {
        let (x, y) = linear_problem(60);
        let fit = fit(x.view(), y.view(), &small_config(), 1).unwrap();
        assert_abs_diff_eq!(fit.coefficients[0], 2.0, epsilon = 0.1);
        assert_abs_diff_eq!(fit.coefficients[1], -1.0, epsilon = 0.1);
        assert_abs_diff_eq!(fit.coefficients[2], 0.0, epsilon = 0.1);
    }

    #[test]
    fn fit_is_deterministic_per_seed() {
        let (x, y) = linear_problem(40);
        let a = fit(x.view(), y.view(), &small_config(), 9).unwrap();
        let b = fit(x.view(), y.view(), &small_config(), 9).unwrap();
        assert_eq!(a.alpha, b.alpha);
        assert_eq!(a.l1_ratio, b.l1_ratio);
        for (ca, cb) in a.coefficients.iter().zip(b.coefficients.iter()) {
            assert_abs_diff_eq!(ca, cb, epsilon = 1e-12);
        }
    }

    #[test]
    fn selected_pair_comes_from_the_grid() {
        let (x, y) = linear_problem(30);
        let config = small_config();
        let fitted = fit(x.view(), y.view(), &config, 3).unwrap();
        assert!(config.alphas.contains(&fitted.alpha));
        assert!(config.l1_ratios.contains(&fitted.l1_ratio));
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let x = Array2::<f64>::zeros((10, 2));
        let y = Array1::<f64>::zeros(9);
        assert!(matches!(
            fit(x.view(), y.view(), &small_config(), 0),
            Err(EnetError::ShapeMismatch { .. })
        ));
    }
}
