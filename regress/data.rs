//! Loading, joining, and writing tract-level feature tables.
//!
//! A [`FeatureTable`] is a column-major numeric table keyed by an integer
//! tract identifier. CSV input goes through Polars so type sniffing and
//! malformed rows are handled uniformly; output goes through the plain
//! `csv` writer since every written table is already numeric.

use log::{info, warn};
use ndarray::Array2;
use polars::prelude::*;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Key column '{0}' contains null values")]
    NullKey(String),
    #[error("Column '{column}' could not be read as numeric")]
    ColumnWrongType { column: String },
    #[error("Column '{0}' not found in table")]
    ColumnNotFound(String),
    #[error("Tables share no rows after joining on the key column")]
    EmptyJoin,
    #[error("Cannot concatenate zero tables")]
    NothingToConcat,
}

/// A numeric table keyed by tract identifier. `columns[j]` holds the values
/// of `names[j]` for every key, with `f64::NAN` standing in for nulls.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub key_name: String,
    pub key: Vec<i64>,
    pub names: Vec<String>,
    pub columns: Vec<Vec<f64>>,
}

impl FeatureTable {
    pub fn n_rows(&self) -> usize {
        self.key.len()
    }

    pub fn column(&self, name: &str) -> Result<&[f64], DataError> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|j| self.columns[j].as_slice())
            .ok_or_else(|| DataError::ColumnNotFound(name.to_string()))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Drops the named column if present.
    pub fn remove_column(&mut self, name: &str) {
        if let Some(j) = self.names.iter().position(|n| n == name) {
            self.names.remove(j);
            self.columns.remove(j);
        }
    }

    /// Assembles the named columns into a row-major design matrix.
    pub fn to_matrix(&self, names: &[String]) -> Result<Array2<f64>, DataError> {
        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            selected.push(self.column(name)?);
        }
        let n = self.n_rows();
        Ok(Array2::from_shape_fn((n, names.len()), |(i, j)| {
            selected[j][i]
        }))
    }

    /// Adds `pop_density_km`, persons per square kilometer, from the
    /// population count and the tract area in square meters.
    pub fn derive_pop_density(
        &mut self,
        population: &str,
        area_m: &str,
    ) -> Result<(), DataError> {
        let pop = self.column(population)?.to_vec();
        let area = self.column(area_m)?;
        let density: Vec<f64> = pop
            .iter()
            .zip(area.iter())
            .map(|(&p, &a)| p / a * 1.0e6)
            .collect();
        self.names.push("pop_density_km".to_string());
        self.columns.push(density);
        Ok(())
    }
}

fn key_values(df: &DataFrame, key_name: &str) -> Result<Vec<i64>, DataError> {
    let series = df.column(key_name)?.as_materialized_series();
    if series.null_count() > 0 {
        return Err(DataError::NullKey(key_name.to_string()));
    }
    let casted = series
        .cast(&DataType::Int64)
        .map_err(|_| DataError::ColumnWrongType {
            column: key_name.to_string(),
        })?;
    Ok(casted.i64()?.rechunk().into_no_null_iter().collect())
}

fn numeric_values(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
    let series = df.column(column_name)?.as_materialized_series();
    let casted = series
        .cast(&DataType::Float64)
        .map_err(|_| DataError::ColumnWrongType {
            column: column_name.to_string(),
        })?;
    let chunked = casted.f64()?.rechunk();
    Ok(chunked.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// Reads one CSV file into a [`FeatureTable`], keyed by `key_name`. Every
/// column other than the key is cast to f64; nulls become NaN.
pub fn load_table(path: &Path, key_name: &str) -> Result<FeatureTable, DataError> {
    let df = CsvReader::new(File::open(path)?)
        .with_options(CsvReadOptions::default().with_has_header(true))
        .finish()?;

    let key = key_values(&df, key_name)?;
    let mut names = Vec::new();
    let mut columns = Vec::new();
    for column in df.get_column_names() {
        if column.as_str() == key_name {
            continue;
        }
        names.push(column.to_string());
        columns.push(numeric_values(&df, column)?);
    }
    info!(
        "loaded {} rows x {} columns from {}",
        key.len(),
        names.len(),
        path.display()
    );
    Ok(FeatureTable {
        key_name: key_name.to_string(),
        key,
        names,
        columns,
    })
}

/// Inner-joins two tables on the key column. Rows missing from either side
/// are dropped; the surviving row count is logged because silent shrinkage
/// here has produced misleading fits before.
pub fn inner_join(left: &FeatureTable, right: &FeatureTable) -> Result<FeatureTable, DataError> {
    let right_index: std::collections::HashMap<i64, usize> = right
        .key
        .iter()
        .enumerate()
        .map(|(i, &k)| (k, i))
        .collect();

    let mut key = Vec::new();
    let mut left_rows = Vec::new();
    let mut right_rows = Vec::new();
    for (i, &k) in left.key.iter().enumerate() {
        if let Some(&j) = right_index.get(&k) {
            key.push(k);
            left_rows.push(i);
            right_rows.push(j);
        }
    }
    if key.is_empty() {
        return Err(DataError::EmptyJoin);
    }
    if key.len() < left.n_rows() || key.len() < right.n_rows() {
        warn!(
            "inner join kept {} rows (left had {}, right had {})",
            key.len(),
            left.n_rows(),
            right.n_rows()
        );
    }

    let mut names = left.names.clone();
    let mut columns: Vec<Vec<f64>> = left
        .columns
        .iter()
        .map(|col| left_rows.iter().map(|&i| col[i]).collect())
        .collect();
    for (name, col) in right.names.iter().zip(right.columns.iter()) {
        if names.contains(name) {
            continue;
        }
        names.push(name.clone());
        columns.push(right_rows.iter().map(|&j| col[j]).collect());
    }

    Ok(FeatureTable {
        key_name: left.key_name.clone(),
        key,
        names,
        columns,
    })
}

/// Stacks tables row-wise over the sorted union of their columns, filling
/// NaN where a table lacks a column. Keys are kept in input order, so the
/// result can carry duplicate keys if the inputs overlap.
pub fn concat_tables(tables: &[FeatureTable]) -> Result<FeatureTable, DataError> {
    let first = tables.first().ok_or(DataError::NothingToConcat)?;

    let union: BTreeSet<String> = tables
        .iter()
        .flat_map(|t| t.names.iter().cloned())
        .collect();
    let names: Vec<String> = union.into_iter().collect();

    let total_rows: usize = tables.iter().map(|t| t.n_rows()).sum();
    let mut key = Vec::with_capacity(total_rows);
    let mut columns: Vec<Vec<f64>> = names
        .iter()
        .map(|_| Vec::with_capacity(total_rows))
        .collect();

    for table in tables {
        key.extend_from_slice(&table.key);
        for (j, name) in names.iter().enumerate() {
            match table.column(name) {
                Ok(values) => columns[j].extend_from_slice(values),
                Err(_) => columns[j].extend(std::iter::repeat(f64::NAN).take(table.n_rows())),
            }
        }
    }

    Ok(FeatureTable {
        key_name: first.key_name.clone(),
        key,
        names,
        columns,
    })
}

/// Writes the table as CSV with the key column first. NaN cells are written
/// empty so downstream readers see them as nulls again.
pub fn write_table(table: &FeatureTable, path: &Path) -> Result<(), DataError> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec![table.key_name.clone()];
    header.extend(table.names.iter().cloned());
    writer.write_record(&header)?;

    for i in 0..table.n_rows() {
        let mut record = vec![table.key[i].to_string()];
        for col in &table.columns {
            if col[i].is_nan() {
                record.push(String::new());
            } else {
                record.push(col[i].to_string());
            }
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
