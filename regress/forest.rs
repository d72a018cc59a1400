//! Random forest regression with grid-searched hyperparameters.
//!
//! Each tree is a CART regressor grown on a bootstrap sample: the best split
//! at every node minimizes the summed squared error of the two children,
//! searching a random subset of features whose size is set by the
//! max-features policy. Forest predictions average the trees; feature
//! importances accumulate the impurity decrease attributed to each feature
//! and are normalized to sum to one.
//!
//! `fit` scores every (tree count, min leaf, max-features) grid point with
//! k-fold cross-validation by mean squared error, then refits the best
//! configuration on all training rows.

use crate::metrics::mean_squared_error;
use crate::split::k_fold;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForestError {
    #[error("design matrix has {rows} rows but the target has {targets}")]
    ShapeMismatch { rows: usize, targets: usize },
    #[error("hyperparameter grid is empty")]
    EmptyGrid,
    #[error("training split of {rows} rows cannot be cut into {folds} folds")]
    TooFewRows { rows: usize, folds: usize },
}

/// Size policy for the feature subset searched at each split.
///
/// The legacy "auto" policy meant every feature for regression forests, so
/// it duplicates `All` and is dropped from the grid as redundant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    Fraction(f64),
    All,
}

impl MaxFeatures {
    /// The label used in model files and reports: `sqrt`, `log2`, `all`,
    /// or the bare fraction (`0.33`).
    pub fn label(self) -> String {
        match self {
            MaxFeatures::Sqrt => "sqrt".to_string(),
            MaxFeatures::Log2 => "log2".to_string(),
            MaxFeatures::Fraction(f) => format!("{f}"),
            MaxFeatures::All => "all".to_string(),
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "sqrt" => Some(MaxFeatures::Sqrt),
            "log2" => Some(MaxFeatures::Log2),
            "all" => Some(MaxFeatures::All),
            other => other.parse::<f64>().ok().map(MaxFeatures::Fraction),
        }
    }

    fn count(self, p: usize) -> usize {
        let m = match self {
            MaxFeatures::Sqrt => (p as f64).sqrt().round() as usize,
            MaxFeatures::Log2 => (p as f64).log2().round() as usize,
            MaxFeatures::Fraction(f) => (p as f64 * f).round() as usize,
            MaxFeatures::All => p,
        };
        m.clamp(1, p)
    }
}

/// Hyperparameter grid and CV settings.
#[derive(Debug, Clone)]
pub struct ForestConfig {
    pub n_estimators_grid: Vec<usize>,
    pub min_leaf_grid: Vec<usize>,
    pub max_features_grid: Vec<MaxFeatures>,
    pub cv_folds: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators_grid: vec![200, 300, 500, 700, 900, 1000],
            min_leaf_grid: vec![1, 2, 5, 10, 25],
            max_features_grid: vec![
                MaxFeatures::Sqrt,
                MaxFeatures::Log2,
                MaxFeatures::Fraction(0.33),
                MaxFeatures::Fraction(0.20),
                MaxFeatures::Fraction(0.10),
                MaxFeatures::All,
            ],
            cv_folds: 5,
        }
    }
}

/// One node of a flattened regression tree. `feature` is `None` at leaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<usize>,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub left: usize,
    #[serde(default)]
    pub right: usize,
    pub value: f64,
}

/// A fitted CART regression tree stored as a flat node arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = 0;
        loop {
            let current = &self.nodes[node];
            match current.feature {
                None => return current.value,
                Some(f) => {
                    node = if row[f] <= current.threshold {
                        current.left
                    } else {
                        current.right
                    };
                }
            }
        }
    }

    fn fit(
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        sample: &[usize],
        min_leaf: usize,
        max_features: usize,
        rng: &mut StdRng,
        importances: &mut [f64],
    ) -> Self {
        let mut tree = RegressionTree { nodes: Vec::new() };
        tree.grow(x, y, sample.to_vec(), min_leaf, max_features, rng, importances);
        tree
    }

    /// Grows a subtree from `sample` and returns its root index.
    fn grow(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        mut sample: Vec<usize>,
        min_leaf: usize,
        max_features: usize,
        rng: &mut StdRng,
        importances: &mut [f64],
    ) -> usize {
        let n = sample.len();
        let mean = sample.iter().map(|&i| y[i]).sum::<f64>() / n as f64;
        let sse: f64 = sample.iter().map(|&i| (y[i] - mean) * (y[i] - mean)).sum();

        let leaf = |nodes: &mut Vec<TreeNode>| {
            nodes.push(TreeNode {
                feature: None,
                threshold: 0.0,
                left: 0,
                right: 0,
                value: mean,
            });
            nodes.len() - 1
        };

        if n < 2 * min_leaf || sse <= 1e-12 {
            return leaf(&mut self.nodes);
        }

        let p = x.ncols();
        let mut feature_pool: Vec<usize> = (0..p).collect();
        feature_pool.shuffle(rng);
        feature_pool.truncate(max_features);

        let mut best: Option<(usize, f64, f64, usize)> = None; // (feature, threshold, child sse, split pos)
        let mut best_order: Vec<usize> = Vec::new();

        for &f in &feature_pool {
            let mut order = sample.clone();
            order.sort_by(|&a, &b| {
                x[[a, f]]
                    .partial_cmp(&x[[b, f]])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            // Left-to-right running sums let each candidate split be scored
            // in O(1): SSE = sum(y^2) - (sum(y))^2 / n per side.
            let total_sum: f64 = order.iter().map(|&i| y[i]).sum();
            let total_sq: f64 = order.iter().map(|&i| y[i] * y[i]).sum();
            let mut left_sum = 0.0;
            let mut left_sq = 0.0;

            for pos in 1..n {
                let prev = order[pos - 1];
                left_sum += y[prev];
                left_sq += y[prev] * y[prev];

                if pos < min_leaf || n - pos < min_leaf {
                    continue;
                }
                let lo = x[[prev, f]];
                let hi = x[[order[pos], f]];
                if hi <= lo {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let left_sse = left_sq - left_sum * left_sum / pos as f64;
                let right_sse = right_sq - right_sum * right_sum / (n - pos) as f64;
                let child_sse = left_sse + right_sse;

                if best.as_ref().map_or(true, |b| child_sse < b.2) {
                    best = Some((f, (lo + hi) / 2.0, child_sse, pos));
                    best_order = order.clone();
                }
            }
        }

        let Some((feature, threshold, child_sse, pos)) = best else {
            return leaf(&mut self.nodes);
        };
        if sse - child_sse <= 1e-12 {
            return leaf(&mut self.nodes);
        }

        importances[feature] += sse - child_sse;

        let right_sample = best_order.split_off(pos);
        sample = best_order;

        let node = self.nodes.len();
        self.nodes.push(TreeNode {
            feature: Some(feature),
            threshold,
            left: 0,
            right: 0,
            value: mean,
        });
        let left = self.grow(x, y, sample, min_leaf, max_features, rng, importances);
        let right = self.grow(x, y, right_sample, min_leaf, max_features, rng, importances);
        self.nodes[node].left = left;
        self.nodes[node].right = right;
        node
    }
}

/// A fitted forest: the trees, the selected grid point, and the normalized
/// feature importances from the final refit.
#[derive(Debug, Clone)]
pub struct ForestFit {
    pub trees: Vec<RegressionTree>,
    pub n_estimators: usize,
    pub min_leaf: usize,
    pub max_features: MaxFeatures,
    pub importances: Vec<f64>,
}

impl ForestFit {
    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        Array1::from_shape_fn(x.nrows(), |i| {
            let row = x.row(i);
            self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
                / self.trees.len() as f64
        })
    }
}

/// Grows one forest over the given rows; bootstrap sampling is always on.
fn grow_forest(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    n_estimators: usize,
    min_leaf: usize,
    max_features: MaxFeatures,
    seed: u64,
) -> (Vec<RegressionTree>, Vec<f64>) {
    let n = x.nrows();
    let m = max_features.count(x.ncols());
    let mut rng = StdRng::seed_from_u64(seed);
    let mut importances = vec![0.0; x.ncols()];
    let mut trees = Vec::with_capacity(n_estimators);

    for _ in 0..n_estimators {
        let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
        trees.push(RegressionTree::fit(
            x,
            y,
            &sample,
            min_leaf,
            m,
            &mut rng,
            &mut importances,
        ));
    }

    let total: f64 = importances.iter().sum();
    if total > 0.0 {
        for v in importances.iter_mut() {
            *v /= total;
        }
    }
    (trees, importances)
}

fn cv_score(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    n_estimators: usize,
    min_leaf: usize,
    max_features: MaxFeatures,
    cv_folds: usize,
    seed: u64,
) -> f64 {
    let folds = k_fold(x.nrows(), cv_folds);
    let mut total = 0.0;
    for (fold_idx, (train_idx, valid_idx)) in folds.iter().enumerate() {
        let x_train = x.select(Axis(0), train_idx);
        let y_train = y.select(Axis(0), train_idx);
        let (trees, _) = grow_forest(
            x_train.view(),
            y_train.view(),
            n_estimators,
            min_leaf,
            max_features,
            seed.wrapping_add(fold_idx as u64),
        );
        let forest = ForestFit {
            trees,
            n_estimators,
            min_leaf,
            max_features,
            importances: Vec::new(),
        };
        let x_valid = x.select(Axis(0), valid_idx);
        let y_valid = y.select(Axis(0), valid_idx);
        let predicted = forest.predict(x_valid.view());
        total += mean_squared_error(&y_valid.to_vec(), &predicted.to_vec());
    }
    total / folds.len() as f64
}

/// Cross-validated grid search (scored by mean squared error) plus final
/// refit on all training rows.
pub fn fit(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    config: &ForestConfig,
    seed: u64,
) -> Result<ForestFit, ForestError> {
    if x.nrows() != y.len() {
        return Err(ForestError::ShapeMismatch {
            rows: x.nrows(),
            targets: y.len(),
        });
    }
    if config.n_estimators_grid.is_empty()
        || config.min_leaf_grid.is_empty()
        || config.max_features_grid.is_empty()
    {
        return Err(ForestError::EmptyGrid);
    }
    if x.nrows() < config.cv_folds {
        return Err(ForestError::TooFewRows {
            rows: x.nrows(),
            folds: config.cv_folds,
        });
    }

    let grid: Vec<(usize, usize, MaxFeatures)> = config
        .n_estimators_grid
        .iter()
        .flat_map(|&n_est| {
            config.min_leaf_grid.iter().flat_map(move |&leaf| {
                config
                    .max_features_grid
                    .iter()
                    .map(move |&mf| (n_est, leaf, mf))
            })
        })
        .collect();

    let scored: Vec<(usize, f64)> = grid
        .par_iter()
        .enumerate()
        .map(|(idx, &(n_est, leaf, mf))| {
            let candidate_seed = seed.wrapping_mul(0x9E37_79B9).wrapping_add(idx as u64);
            (
                idx,
                cv_score(x, y, n_est, leaf, mf, config.cv_folds, candidate_seed),
            )
        })
        .collect();

    let (best_idx, _) = scored
        .iter()
        .copied()
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .ok_or(ForestError::EmptyGrid)?;
    let (n_estimators, min_leaf, max_features) = grid[best_idx];

    let (trees, importances) = grow_forest(x, y, n_estimators, min_leaf, max_features, seed);
    Ok(ForestFit {
        trees,
        n_estimators,
        min_leaf,
        max_features,
        importances,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn small_config() -> ForestConfig {
        ForestConfig {
            n_estimators_grid: vec![15],
            min_leaf_grid: vec![1, 3],
            max_features_grid: vec![MaxFeatures::Sqrt, MaxFeatures::All],
            cv_folds: 3,
        }
    }

    /// Step function of the first feature; the second is noise.
    fn step_problem(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| match j {
            0 => i as f64,
            _ => ((i * 7919) % 13) as f64,
        });
        let y = Array1::from_shape_fn(n, |i| if i < n / 2 { 1.0 } else { 5.0 });
        (x, y)
    }

    #[test]
    fn learns_a_step_function() {
        let (x, y) = step_problem(60);
        let forest = fit(x.view(), y.view(), &small_config(), 11).unwrap();
        let predicted = forest.predict(x.view());
        assert!(predicted[2] < 2.5, "low plateau predicted {}", predicted[2]);
        assert!(predicted[57] > 3.5, "high plateau predicted {}", predicted[57]);
    }

    #[test]
    fn importances_identify_the_informative_feature() {
        let (x, y) = step_problem(60);
        let forest = fit(x.view(), y.view(), &small_config(), 4).unwrap();
        assert!(forest.importances[0] > forest.importances[1]);
        let total: f64 = forest.importances.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn fit_is_deterministic_per_seed() {
        let (x, y) = step_problem(45);
        let a = fit(x.view(), y.view(), &small_config(), 21).unwrap();
        let b = fit(x.view(), y.view(), &small_config(), 21).unwrap();
        let pa = a.predict(x.view());
        let pb = b.predict(x.view());
        for (va, vb) in pa.iter().zip(pb.iter()) {
            assert_eq!(va, vb);
        }
    }

    #[test]
    fn max_features_counts_are_clamped() {
        assert_eq!(MaxFeatures::Sqrt.count(16), 4);
        assert_eq!(MaxFeatures::Log2.count(16), 4);
        assert_eq!(MaxFeatures::Fraction(0.10).count(5), 1);
        assert_eq!(MaxFeatures::All.count(7), 7);
    }
}
