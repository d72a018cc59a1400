//! The analyze stage: per (country, dependent variable, method), run the
//! seed loop of Split, Fit, Evaluate, Persist, then aggregate across seeds.
//!
//! The seed loop itself is sequential so each seed's artifacts land in a
//! stable order; the grid search inside each fit is where the parallelism
//! lives.

use crate::country::country_bucket;
use crate::data::{self, DataError};
use crate::elastic_net::{self, ElasticNetConfig, EnetError};
use crate::forest::{self, ForestConfig, ForestError};
use crate::metrics;
use crate::model::{ModelError, TrainedModel};
use crate::shared::files;
use crate::split::train_test_split;
use log::info;
use ndarray::{Array1, Array2, Axis};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("Unrecognized method '{0}' (expected 'enr' or 'rfr')")]
    UnknownMethod(String),
    #[error("Unrecognized dependent-variable set '{0}' (expected 'pop' or 'osm')")]
    UnknownDepSet(String),
    #[error("Scaled table for '{y_var}' has no independent columns")]
    NoFeatures { y_var: String },
    #[error("Scaled table for '{y_var}' has a non-finite value in column '{column}'")]
    NonFinite { y_var: String, column: String },
    #[error("Data error: {0}")]
    Data(#[from] DataError),
    #[error("Elastic net error: {0}")]
    Enet(#[from] EnetError),
    #[error("Random forest error: {0}")]
    Forest(#[from] ForestError),
    #[error("Model persistence error: {0}")]
    Model(#[from] ModelError),
    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Enr,
    Rfr,
}

impl Method {
    pub fn parse(label: &str) -> Result<Self, TrainError> {
        match label {
            "enr" => Ok(Method::Enr),
            "rfr" => Ok(Method::Rfr),
            other => Err(TrainError::UnknownMethod(other.to_string())),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Method::Enr => "enr",
            Method::Rfr => "rfr",
        }
    }
}

/// The eight OSM-derived urban attributes.
pub const OSM_VARIABLES: [&str; 8] = [
    "BUILD_DEN",
    "BUILTUP_AREA",
    "BUILTUP_DEN_PRCNT",
    "COUNT_BUILD",
    "RD_AREA",
    "RD_DEN",
    "RD_LENGTH",
    "SUM_BUILD_AREA",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepVarSet {
    Pop,
    Osm,
}

impl DepVarSet {
    pub fn parse(label: &str) -> Result<Self, TrainError> {
        match label {
            "pop" => Ok(DepVarSet::Pop),
            "osm" => Ok(DepVarSet::Osm),
            other => Err(TrainError::UnknownDepSet(other.to_string())),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DepVarSet::Pop => "pop",
            DepVarSet::Osm => "osm",
        }
    }

    pub fn variables(self) -> Vec<String> {
        match self {
            DepVarSet::Pop => vec!["pop_density_km".to_string()],
            DepVarSet::Osm => OSM_VARIABLES.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// One analyze run over a country, a dependent-variable set, and a method.
#[derive(Debug, Clone)]
pub struct AnalyzeConfig {
    pub country: String,
    pub method: String,
    pub dep_set: String,
    pub seeds: RangeInclusive<u64>,
    pub key_name: String,
    /// Directory holding the prepare stage's scaled tables.
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub enet: ElasticNetConfig,
    pub forest: ForestConfig,
}

/// One seed's evaluation record. `alpha` and `l1_ratio` are present for the
/// elastic net only.
#[derive(Debug, Clone)]
pub struct SeedRecord {
    pub seed: u64,
    pub in_sample_r2: f64,
    pub alpha: Option<f64>,
    pub l1_ratio: Option<f64>,
    pub out_r2: f64,
    pub out_mse: f64,
    pub out_mae: f64,
    pub out_mape: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSummary {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}

fn summarize(values: impl Iterator<Item = f64>) -> MetricSummary {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut n = 0usize;
    for v in values {
        min = min.min(v);
        max = max.max(v);
        sum += v;
        n += 1;
    }
    MetricSummary {
        min,
        mean: sum / n as f64,
        max,
    }
}

/// Accumulates per-seed records and importances for one dependent variable.
#[derive(Debug, Clone)]
pub struct RunAccumulator {
    pub y_var: String,
    pub feature_names: Vec<String>,
    pub records: Vec<SeedRecord>,
    /// One importance vector per seed, aligned with `feature_names`.
    pub importances: Vec<Vec<f64>>,
}

impl RunAccumulator {
    fn new(y_var: &str, feature_names: Vec<String>) -> Self {
        Self {
            y_var: y_var.to_string(),
            feature_names,
            records: Vec::new(),
            importances: Vec::new(),
        }
    }

    pub fn summary(&self) -> YSummary {
        YSummary {
            y_var: self.y_var.clone(),
            out_r2: summarize(self.records.iter().map(|r| r.out_r2)),
            out_mse: summarize(self.records.iter().map(|r| r.out_mse)),
            out_mae: summarize(self.records.iter().map(|r| r.out_mae)),
            out_mape: summarize(self.records.iter().map(|r| r.out_mape)),
            in_r2: summarize(self.records.iter().map(|r| r.in_sample_r2)),
            alpha: self.records.first().and_then(|r| r.alpha).map(|_| {
                summarize(self.records.iter().filter_map(|r| r.alpha))
            }),
            l1_ratio: self.records.first().and_then(|r| r.l1_ratio).map(|_| {
                summarize(self.records.iter().filter_map(|r| r.l1_ratio))
            }),
        }
    }

    /// Per-feature min/mean/max of the importances, sorted by mean
    /// descending.
    pub fn importance_summary(&self) -> Vec<(String, Vec<f64>, MetricSummary)> {
        let mut rows: Vec<(String, Vec<f64>, MetricSummary)> = self
            .feature_names
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let per_seed: Vec<f64> =
                    self.importances.iter().map(|seed| seed[j]).collect();
                let stats = summarize(per_seed.iter().copied());
                (name.clone(), per_seed, stats)
            })
            .collect();
        rows.sort_by(|a, b| {
            b.2.mean
                .partial_cmp(&a.2.mean)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        rows
    }
}

/// Min/mean/max across seeds for each metric of one dependent variable.
#[derive(Debug, Clone)]
pub struct YSummary {
    pub y_var: String,
    pub out_r2: MetricSummary,
    pub out_mse: MetricSummary,
    pub out_mae: MetricSummary,
    pub out_mape: MetricSummary,
    pub in_r2: MetricSummary,
    pub alpha: Option<MetricSummary>,
    pub l1_ratio: Option<MetricSummary>,
}

pub fn run(config: &AnalyzeConfig) -> Result<(), TrainError> {
    // Configuration errors are fatal before any file is touched.
    let method = Method::parse(&config.method)?;
    let dep_set = DepVarSet::parse(&config.dep_set)?;

    let mut summaries = Vec::new();
    for y_var in dep_set.variables() {
        let accumulator = analyze_one(config, method, dep_set, &y_var)?;
        write_seed_output(config, method, &accumulator)?;
        write_summary_importance(config, method, &accumulator)?;
        summaries.push(accumulator.summary());
    }
    write_summary_stats(config, method, &summaries)?;
    Ok(())
}

fn analyze_one(
    config: &AnalyzeConfig,
    method: Method,
    dep_set: DepVarSet,
    y_var: &str,
) -> Result<RunAccumulator, TrainError> {
    let scaled_path = config
        .input_dir
        .join(files::scaled_csv_name(&config.country, y_var));
    let table = data::load_table(&scaled_path, &config.key_name)?;

    let feature_names: Vec<String> = table
        .names
        .iter()
        .filter(|n| n.as_str() != y_var)
        .cloned()
        .collect();
    if feature_names.is_empty() {
        return Err(TrainError::NoFeatures {
            y_var: y_var.to_string(),
        });
    }
    let x: Array2<f64> = table.to_matrix(&feature_names)?;
    let y: Array1<f64> = Array1::from(table.column(y_var)?.to_vec());

    // A pooled table can carry NaN fill for columns absent from one country;
    // the estimators would propagate it into every published metric.
    for (j, name) in feature_names.iter().enumerate() {
        if x.column(j).iter().any(|v| !v.is_finite()) {
            return Err(TrainError::NonFinite {
                y_var: y_var.to_string(),
                column: name.clone(),
            });
        }
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(TrainError::NonFinite {
            y_var: y_var.to_string(),
            column: y_var.to_string(),
        });
    }

    let mut accumulator = RunAccumulator::new(y_var, feature_names.clone());

    for seed in config.seeds.clone() {
        info!("{} / {} / {} seed {}", config.country, y_var, method.label(), seed);

        let (train_idx, test_idx) = train_test_split(x.nrows(), 0.20, seed);
        let x_train = x.select(Axis(0), &train_idx);
        let y_train = y.select(Axis(0), &train_idx);
        let x_test = x.select(Axis(0), &test_idx);
        let y_test = y.select(Axis(0), &test_idx);

        let (model, importances, alpha, l1_ratio) = match method {
            Method::Enr => {
                let fit = elastic_net::fit(x_train.view(), y_train.view(), &config.enet, seed)?;
                let importances = fit.coefficients.to_vec();
                let (alpha, l1) = (fit.alpha, fit.l1_ratio);
                let model = TrainedModel::from_elastic_net(y_var, &feature_names, seed, &fit);
                (model, importances, Some(alpha), Some(l1))
            }
            Method::Rfr => {
                let fit = forest::fit(x_train.view(), y_train.view(), &config.forest, seed)?;
                let importances = fit.importances.clone();
                let model = TrainedModel::from_forest(y_var, &feature_names, seed, &fit);
                (model, importances, None, None)
            }
        };

        let train_pred = model.predict(x_train.view())?;
        let test_pred = model.predict(x_test.view())?;

        let record = SeedRecord {
            seed,
            in_sample_r2: metrics::r_squared(&y_train.to_vec(), &train_pred.to_vec()),
            alpha,
            l1_ratio,
            out_r2: metrics::r_squared(&y_test.to_vec(), &test_pred.to_vec()),
            out_mse: metrics::mean_squared_error(&y_test.to_vec(), &test_pred.to_vec()),
            out_mae: metrics::mean_absolute_error(&y_test.to_vec(), &test_pred.to_vec()),
            out_mape: metrics::mean_absolute_percentage_error(
                &y_test.to_vec(),
                &test_pred.to_vec(),
            ),
        };

        let model_path = config.output_dir.join(files::model_file_name(
            &config.country,
            y_var,
            seed,
            method.label(),
            dep_set.label(),
        ));
        model.save(&model_path)?;

        write_predicted(config, method, dep_set, y_var, seed, &table.key, &y, &model, &x)?;

        accumulator.records.push(record);
        accumulator.importances.push(importances);
    }

    Ok(accumulator)
}

/// Full-sample predicted-vs-actual table, one row per tract, tagged with
/// the country bucket its id falls in.
fn write_predicted(
    config: &AnalyzeConfig,
    method: Method,
    dep_set: DepVarSet,
    y_var: &str,
    seed: u64,
    keys: &[i64],
    actual: &Array1<f64>,
    model: &TrainedModel,
    x: &Array2<f64>,
) -> Result<(), TrainError> {
    let predicted = model.predict(x.view())?;
    let path = config.output_dir.join(files::predicted_csv_name(
        &config.country,
        y_var,
        seed,
        method.label(),
        dep_set.label(),
    ));
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record([config.key_name.as_str(), "Country", "Actual", "Predicted"])?;
    for (i, &key) in keys.iter().enumerate() {
        writer.write_record([
            key.to_string(),
            country_bucket(key).to_string(),
            actual[i].to_string(),
            predicted[i].to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_seed_output(
    config: &AnalyzeConfig,
    method: Method,
    accumulator: &RunAccumulator,
) -> Result<(), TrainError> {
    let path = config.output_dir.join(files::seed_output_name(
        &config.country,
        method.label(),
        &accumulator.y_var,
    ));
    let mut writer = csv::Writer::from_path(&path)?;

    let mut header = vec!["seed", "In_Sample_R2"];
    if method == Method::Enr {
        header.extend(["Alpha", "l1_ratio"]);
    }
    header.extend([
        "Out_of_Sample R2",
        "Out_of_Sample MSE",
        "Out_of_Sample MAE",
        "Out_of_Sample MAPE",
    ]);
    writer.write_record(&header)?;

    for record in &accumulator.records {
        let mut row = vec![record.seed.to_string(), record.in_sample_r2.to_string()];
        if method == Method::Enr {
            row.push(record.alpha.unwrap_or(f64::NAN).to_string());
            row.push(record.l1_ratio.unwrap_or(f64::NAN).to_string());
        }
        row.extend([
            record.out_r2.to_string(),
            record.out_mse.to_string(),
            record.out_mae.to_string(),
            record.out_mape.to_string(),
        ]);
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_summary_importance(
    config: &AnalyzeConfig,
    method: Method,
    accumulator: &RunAccumulator,
) -> Result<(), TrainError> {
    let path = config.output_dir.join(files::summary_importance_name(
        &config.country,
        method.label(),
        &accumulator.y_var,
    ));
    let mut writer = csv::Writer::from_path(&path)?;

    let mut header = vec!["Feature_Index".to_string()];
    for record in &accumulator.records {
        header.push(format!("Importance_{}", record.seed));
    }
    header.extend(["mean".to_string(), "min".to_string(), "max".to_string()]);
    writer.write_record(&header)?;

    for (name, per_seed, stats) in accumulator.importance_summary() {
        let mut row = vec![name];
        row.extend(per_seed.iter().map(|v| v.to_string()));
        row.extend([
            stats.mean.to_string(),
            stats.min.to_string(),
            stats.max.to_string(),
        ]);
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_summary_stats(
    config: &AnalyzeConfig,
    method: Method,
    summaries: &[YSummary],
) -> Result<(), TrainError> {
    let path = config
        .output_dir
        .join(files::summary_stats_name(&config.country, method.label()));
    let mut writer = csv::Writer::from_path(&path)?;

    let mut header = vec![
        "y_variable",
        "Min_Out_R2",
        "Mean_Out_R2",
        "Max_Out_R2",
        "Min_Out_MSE",
        "Mean_Out_MSE",
        "Max_Out_MSE",
        "Min_Out_MAE",
        "Mean_Out_MAE",
        "Max_Out_MAE",
        "Min_Out_MAPE",
        "Mean_Out_MAPE",
        "Max_Out_MAPE",
        "Min_In_R2",
        "Mean_In_R2",
        "Max_In_R2",
    ];
    if method == Method::Enr {
        header.extend([
            "Min_alpha",
            "Mean_alpha",
            "Max_alpha",
            "Min_l1",
            "Mean_l1",
            "Max_l1",
        ]);
    }
    writer.write_record(&header)?;

    let push = |row: &mut Vec<String>, s: &MetricSummary| {
        row.extend([s.min.to_string(), s.mean.to_string(), s.max.to_string()]);
    };
    for summary in summaries {
        let mut row = vec![summary.y_var.clone()];
        push(&mut row, &summary.out_r2);
        push(&mut row, &summary.out_mse);
        push(&mut row, &summary.out_mae);
        push(&mut row, &summary.out_mape);
        push(&mut row, &summary.in_r2);
        if method == Method::Enr {
            let fallback = MetricSummary {
                min: f64::NAN,
                mean: f64::NAN,
                max: f64::NAN,
            };
            push(&mut row, summary.alpha.as_ref().unwrap_or(&fallback));
            push(&mut row, summary.l1_ratio.as_ref().unwrap_or(&fallback));
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}
