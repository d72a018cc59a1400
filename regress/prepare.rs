//! The prepare stage: merge source tables, screen candidates by Pearson
//! correlation, standardize, and persist the per-(country, dependent
//! variable) tables the analyze stage consumes.

use crate::correlation::{self, CorrError};
use crate::data::{self, DataError, FeatureTable};
use crate::scale::{ScaleError, StandardScaler};
use crate::shared::files;
use log::info;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),
    #[error("Correlation error: {0}")]
    Correlation(#[from] CorrError),
    #[error("Scaling error: {0}")]
    Scale(#[from] ScaleError),
    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No candidate passed the significance filter for '{0}'")]
    NothingRetained(String),
}

/// One country's prepare run.
#[derive(Debug, Clone)]
pub struct PrepareConfig {
    pub country: String,
    /// Contextual-feature CSV, keyed by the tract id column.
    pub features_csv: PathBuf,
    /// Auxiliary tables joined onto the features (tract geometry,
    /// population counts, OSM attributes). All joins are inner.
    pub aux_csvs: Vec<PathBuf>,
    pub key_name: String,
    /// Dependent columns to prepare, each yielding its own output pair.
    pub dependent_vars: Vec<String>,
    /// Derive `pop_density_km` from `Population` / `area_m` and drop the
    /// source columns, as the population analysis requires.
    pub derive_population_density: bool,
    /// Standardize the dependent column too. When set, the unscaled and
    /// scaled dependent values are also written side by side for later
    /// back-conversion.
    pub scale_y: bool,
    pub output_dir: PathBuf,
}

pub fn run(config: &PrepareConfig) -> Result<(), PrepareError> {
    let mut table = data::load_table(&config.features_csv, &config.key_name)?;
    for aux in &config.aux_csvs {
        let aux_table = data::load_table(aux, &config.key_name)?;
        table = data::inner_join(&table, &aux_table)?;
    }

    if config.derive_population_density {
        table.derive_pop_density("Population", "area_m")?;
        table.remove_column("Population");
        table.remove_column("area_m");
    }

    for y_var in &config.dependent_vars {
        prepare_one(config, &table, y_var)?;
    }
    Ok(())
}

fn prepare_one(
    config: &PrepareConfig,
    table: &FeatureTable,
    y_var: &str,
) -> Result<(), PrepareError> {
    info!("preparing {} / {}", config.country, y_var);

    // Missing dependent values count as zero. A tract with no recorded
    // value genuinely has none of the attribute (no buildings, no roads),
    // so this is imputation of an observed absence, not of missing data.
    let y: Vec<f64> = table
        .column(y_var)?
        .iter()
        .map(|&v| if v.is_nan() { 0.0 } else { v })
        .collect();

    let candidates: Vec<(String, Vec<f64>)> = table
        .names
        .iter()
        .zip(table.columns.iter())
        .filter(|(name, _)| !config.dependent_vars.iter().any(|d| d == *name))
        .map(|(name, col)| (name.clone(), col.clone()))
        .collect();

    let retained = correlation::filter_candidates(&y, &candidates)?;
    if retained.is_empty() {
        return Err(PrepareError::NothingRetained(y_var.to_string()));
    }
    info!("{} of {} candidates retained", retained.len(), candidates.len());

    let pearson_path = config
        .output_dir
        .join(files::pearson_csv_name(&config.country, y_var));
    let mut writer = csv::Writer::from_path(&pearson_path)?;
    writer.write_record(["x_var", "abs_r", "r"])?;
    for record in &retained {
        writer.write_record([
            record.x_var.as_str(),
            &record.abs_r.to_string(),
            &record.r.to_string(),
        ])?;
    }
    writer.flush()?;

    // Standardize the dependent column together with the retained
    // candidates, then keep only the requested dependent variant.
    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(retained.len() + 1);
    columns.push(y.clone());
    for record in &retained {
        columns.push(table.column(&record.x_var)?.to_vec());
    }
    let scaler = StandardScaler::fit(&columns)?;
    let mut scaled = columns;
    scaler.transform(&mut scaled)?;

    let mut names = vec![y_var.to_string()];
    names.extend(retained.iter().map(|r| r.x_var.clone()));

    if config.scale_y {
        let y_values = FeatureTable {
            key_name: config.key_name.clone(),
            key: table.key.clone(),
            names: vec![format!("{y_var}_unscaled"), format!("{y_var}_scaled")],
            columns: vec![y.clone(), scaled[0].clone()],
        };
        let y_values_path = config
            .output_dir
            .join(files::y_values_csv_name(&config.country, y_var));
        data::write_table(&y_values, &y_values_path)?;
    } else {
        scaled[0] = y;
    }

    let out = FeatureTable {
        key_name: config.key_name.clone(),
        key: table.key.clone(),
        names,
        columns: scaled,
    };
    let scaled_path = config
        .output_dir
        .join(files::scaled_csv_name(&config.country, y_var));
    data::write_table(&out, &scaled_path)?;
    info!("wrote {}", scaled_path.display());
    Ok(())
}
