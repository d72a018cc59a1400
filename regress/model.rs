//! Persistence of trained regressors.
//!
//! Every seed's winning model is written to disk in a human-readable TOML
//! format so a run can be audited or replayed without retraining. The file
//! records the feature order the model was fitted against; prediction from
//! a reloaded model requires columns in that same order.

use crate::elastic_net::ElasticNetFit;
use crate::forest::{ForestFit, MaxFeatures, RegressionTree};
use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write model file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML model file: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize model to TOML format: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Unrecognized max-features label '{0}' in model file")]
    BadMaxFeatures(String),
    #[error("Prediction data has {found} columns, but the model was trained on {expected}.")]
    MismatchedColumns { found: usize, expected: usize },
}

/// A trained model plus the metadata needed to reapply it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub dependent_variable: String,
    pub feature_names: Vec<String>,
    pub seed: u64,
    pub estimator: Estimator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Estimator {
    ElasticNet {
        coefficients: Vec<f64>,
        alpha: f64,
        l1_ratio: f64,
    },
    Forest {
        n_estimators: usize,
        min_leaf: usize,
        max_features: String,
        importances: Vec<f64>,
        trees: Vec<RegressionTree>,
    },
}

impl TrainedModel {
    pub fn from_elastic_net(
        dependent_variable: &str,
        feature_names: &[String],
        seed: u64,
        fit: &ElasticNetFit,
    ) -> Self {
        Self {
            dependent_variable: dependent_variable.to_string(),
            feature_names: feature_names.to_vec(),
            seed,
            estimator: Estimator::ElasticNet {
                coefficients: fit.coefficients.to_vec(),
                alpha: fit.alpha,
                l1_ratio: fit.l1_ratio,
            },
        }
    }

    pub fn from_forest(
        dependent_variable: &str,
        feature_names: &[String],
        seed: u64,
        fit: &ForestFit,
    ) -> Self {
        Self {
            dependent_variable: dependent_variable.to_string(),
            feature_names: feature_names.to_vec(),
            seed,
            estimator: Estimator::Forest {
                n_estimators: fit.n_estimators,
                min_leaf: fit.min_leaf,
                max_features: fit.max_features.label(),
                importances: fit.importances.clone(),
                trees: fit.trees.clone(),
            },
        }
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        if x.ncols() != self.feature_names.len() {
            return Err(ModelError::MismatchedColumns {
                found: x.ncols(),
                expected: self.feature_names.len(),
            });
        }
        match &self.estimator {
            Estimator::ElasticNet { coefficients, .. } => {
                let beta = Array1::from(coefficients.clone());
                Ok(x.dot(&beta))
            }
            Estimator::Forest {
                trees,
                n_estimators,
                min_leaf,
                max_features,
                importances,
            } => {
                let max_features = MaxFeatures::parse(max_features)
                    .ok_or_else(|| ModelError::BadMaxFeatures(max_features.clone()))?;
                let forest = ForestFit {
                    trees: trees.clone(),
                    n_estimators: *n_estimators,
                    min_leaf: *min_leaf,
                    max_features,
                    importances: importances.clone(),
                };
                Ok(forest.predict(x))
            }
        }
    }

    /// Saves the model to a file in a human-readable TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Loads a previously saved model from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let model = toml::from_str(&toml_string)?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn elastic_net_round_trips_through_toml() {
        let model = TrainedModel {
            dependent_variable: "pop_density_km".to_string(),
            feature_names: vec!["hog_sc30_mean".to_string(), "lbpm_sc50_var".to_string()],
            seed: 7,
            estimator: Estimator::ElasticNet {
                coefficients: vec![1.5, -0.25],
                alpha: 0.01,
                l1_ratio: 0.9,
            },
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.toml");
        model.save(&path).unwrap();
        let reloaded = TrainedModel::load(&path).unwrap();

        let x = array![[2.0, 4.0], [0.0, 1.0]];
        let before = model.predict(x.view()).unwrap();
        let after = reloaded.predict(x.view()).unwrap();
        assert_eq!(before, after);
        assert_eq!(before[0], 2.0 * 1.5 - 4.0 * 0.25);
    }

    #[test]
    fn forest_round_trips_through_toml() {
        use crate::forest::TreeNode;
        // A single stump: feature 0 <= 0.5 -> 1.0, else 3.0.
        let stump = RegressionTree {
            nodes: vec![
                TreeNode {
                    feature: Some(0),
                    threshold: 0.5,
                    left: 1,
                    right: 2,
                    value: 2.0,
                },
                TreeNode {
                    feature: None,
                    threshold: 0.0,
                    left: 0,
                    right: 0,
                    value: 1.0,
                },
                TreeNode {
                    feature: None,
                    threshold: 0.0,
                    left: 0,
                    right: 0,
                    value: 3.0,
                },
            ],
        };
        let model = TrainedModel {
            dependent_variable: "RD_LENGTH".to_string(),
            feature_names: vec!["f0".to_string()],
            seed: 1,
            estimator: Estimator::Forest {
                n_estimators: 1,
                min_leaf: 1,
                max_features: "sqrt".to_string(),
                importances: vec![1.0],
                trees: vec![stump],
            },
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.toml");
        model.save(&path).unwrap();
        let reloaded = TrainedModel::load(&path).unwrap();

        let x = array![[0.0], [1.0]];
        let predicted = reloaded.predict(x.view()).unwrap();
        assert_eq!(predicted[0], 1.0);
        assert_eq!(predicted[1], 3.0);
    }

    #[test]
    fn predict_rejects_mismatched_width() {
        let model = TrainedModel {
            dependent_variable: "y".to_string(),
            feature_names: vec!["a".to_string(), "b".to_string()],
            seed: 0,
            estimator: Estimator::ElasticNet {
                coefficients: vec![1.0, 1.0],
                alpha: 0.1,
                l1_ratio: 0.5,
            },
        };
        let x = array![[1.0]];
        assert!(matches!(
            model.predict(x.view()),
            Err(ModelError::MismatchedColumns { found: 1, expected: 2 })
        ));
    }
}
