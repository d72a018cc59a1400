//! The summarize stage: collect the persisted pearson, importance, and
//! statistics tables across areas, rank them, and pivot everything into one
//! workbook per analysis type.
//!
//! Expected layout under the base directory: the per-area pearson tables at
//! the top level, and one subdirectory per method (`enr/`, `rfr/`) holding
//! that method's summary-importance and summary-statistics tables, as the
//! analyze stage leaves them when pointed at the scaffolded regression
//! folders.

pub mod rank;
pub mod workbook;

use self::rank::{Cell, RankedTable};
use self::workbook::Block;
use crate::shared::files::{self, FileError};
use crate::trainer::OSM_VARIABLES;
use log::info;
use rust_xlsxwriter::{Workbook, XlsxError};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const METHODS: [&str; 2] = ["enr", "rfr"];

#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("Unrecognized analysis '{0}' (expected 'population' or 'osm')")]
    UnknownAnalysis(String),
    #[error("File lookup error: {0}")]
    File(#[from] FileError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Column '{column}' missing from {path}")]
    MissingColumn { column: String, path: String },
    #[error("Malformed number in {path}: {value}")]
    BadNumber { path: String, value: String },
    #[error("Workbook error: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Analysis {
    Population,
    Osm,
}

impl Analysis {
    pub fn parse(label: &str) -> Result<Self, SummarizeError> {
        match label {
            "population" => Ok(Analysis::Population),
            "osm" => Ok(Analysis::Osm),
            other => Err(SummarizeError::UnknownAnalysis(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SummarizeConfig {
    pub analysis: String,
    /// Directory holding the pearson tables and the per-method subfolders.
    pub base_dir: PathBuf,
    /// Areas in presentation order, e.g. `["blz", "sl", "gh", "sl-blz-gh"]`.
    pub areas: Vec<String>,
    pub output_xlsx: PathBuf,
}

fn column_index(
    headers: &csv::StringRecord,
    column: &str,
    path: &Path,
) -> Result<usize, SummarizeError> {
    headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| SummarizeError::MissingColumn {
            column: column.to_string(),
            path: path.display().to_string(),
        })
}

fn parse_number(value: &str, path: &Path) -> Result<f64, SummarizeError> {
    value.parse().map_err(|_| SummarizeError::BadNumber {
        path: path.display().to_string(),
        value: value.to_string(),
    })
}

/// Reads a pearson table into (x_var, r, abs_r) records.
fn read_pearson(path: &Path) -> Result<Vec<(String, f64, f64)>, SummarizeError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let x_var = column_index(&headers, "x_var", path)?;
    let abs_r = column_index(&headers, "abs_r", path)?;
    let r = column_index(&headers, "r", path)?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        records.push((
            row[x_var].to_string(),
            parse_number(&row[r], path)?,
            parse_number(&row[abs_r], path)?,
        ));
    }
    Ok(records)
}

/// Reads a summary-importance table into (feature, mean importance) pairs.
fn read_importance(path: &Path) -> Result<Vec<(String, f64)>, SummarizeError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let feature = column_index(&headers, "Feature_Index", path)?;
    let mean = column_index(&headers, "mean", path)?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        records.push((row[feature].to_string(), parse_number(&row[mean], path)?));
    }
    Ok(records)
}

/// Reads a summary-statistics table verbatim: headers plus string rows.
fn read_stats(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), SummarizeError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for row in reader.records() {
        rows.push(row?.iter().map(str::to_string).collect());
    }
    Ok((headers, rows))
}

fn importance_tables(values: &[(String, f64)]) -> Vec<RankedTable> {
    vec![
        rank::full_top(values, "mean"),
        rank::feature_output_top(values),
        rank::feature_top(values),
        rank::feature_freq_top(values, rank::IMPORTANCE_FREQ_WINDOW, "feature-freq_5"),
    ]
}

fn pearson_tables(records: &[(String, f64, f64)]) -> Vec<RankedTable> {
    // Frequency here reads the (name, |r|) view of the same records.
    let by_abs: Vec<(String, f64)> = records
        .iter()
        .map(|(name, _, abs_r)| (name.clone(), *abs_r))
        .collect();
    vec![
        rank::pearson_full_top(records),
        rank::feature_freq_top(&by_abs, rank::PEARSON_FREQ_WINDOW, "feature-freq_5"),
    ]
}

fn top_by_abs(values: &[(String, f64)], window: usize) -> Vec<(String, f64)> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| {
        b.1.abs()
            .partial_cmp(&a.1.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted.truncate(window);
    sorted
}

pub fn run(config: &SummarizeConfig) -> Result<(), SummarizeError> {
    let analysis = Analysis::parse(&config.analysis)?;
    let mut book = Workbook::new();

    // stats_<method> sheets first, mirroring the workbook order readers
    // expect.
    for method in METHODS {
        let mut headers: Vec<String> = vec!["area".to_string()];
        let mut rows: Vec<Vec<Cell>> = Vec::new();
        for area in &config.areas {
            let path = files::find_one(
                &config.base_dir.join(method),
                &format!("{area}_{method}_y_summary_stats*"),
            )?;
            let (file_headers, file_rows) = read_stats(&path)?;
            if headers.len() == 1 {
                headers.extend(file_headers);
            }
            for row in file_rows {
                let mut cells = vec![Cell::Text(area.clone())];
                cells.extend(row.into_iter().map(|v| match v.parse::<f64>() {
                    Ok(n) => Cell::Number(n),
                    Err(_) => Cell::Text(v),
                }));
                rows.push(cells);
            }
        }
        let sheet = book.add_worksheet();
        sheet.set_name(format!("stats_{method}"))?;
        workbook::write_stats(sheet, &headers, &rows)?;
    }

    // importance_<method> sheets.
    for method in METHODS {
        let method_dir = config.base_dir.join(method);
        let mut bands: Vec<Vec<Block>> = Vec::new();

        match analysis {
            Analysis::Population => {
                let mut band = Vec::new();
                for area in &config.areas {
                    let path = files::find_one(
                        &method_dir,
                        &format!("{area}_{method}_pop_density*summary_importance*"),
                    )?;
                    let values = read_importance(&path)?;
                    band.push(Block {
                        header: area.clone(),
                        tables: importance_tables(&values),
                    });
                }
                bands.push(band);
            }
            Analysis::Osm => {
                let mut all_entries: Vec<(String, String)> = Vec::new();
                let mut top25_entries: Vec<(String, String)> = Vec::new();
                for area in &config.areas {
                    let mut band = Vec::new();
                    for urban in OSM_VARIABLES {
                        let path = files::find_one(
                            &method_dir,
                            &format!("{area}_{method}_{urban}_summary_importance*"),
                        )?;
                        let values = read_importance(&path)?;
                        all_entries.extend(
                            values.iter().map(|(name, _)| (area.clone(), name.clone())),
                        );
                        top25_entries.extend(
                            top_by_abs(&values, rank::IMPORTANCE_FREQ_WINDOW)
                                .into_iter()
                                .map(|(name, _)| (area.clone(), name)),
                        );
                        band.push(Block {
                            header: format!("{area}_{urban}"),
                            tables: importance_tables(&values),
                        });
                    }
                    bands.push(band);
                }
                // Cross-area frequency tables close out the sheet.
                bands.push(vec![
                    Block {
                        header: "all".to_string(),
                        tables: vec![rank::per_area_feature_freq(
                            &all_entries,
                            "feature-freq_5-all",
                        )],
                    },
                    Block {
                        header: "top-25".to_string(),
                        tables: vec![rank::per_area_feature_freq(
                            &top25_entries,
                            "feature-freq_5-top25",
                        )],
                    },
                ]);
            }
        }

        let sheet = book.add_worksheet();
        sheet.set_name(format!("importance_{method}"))?;
        workbook::write_bands(sheet, &bands)?;
    }

    // One pearson sheet for all areas.
    let mut bands: Vec<Vec<Block>> = Vec::new();
    match analysis {
        Analysis::Population => {
            let mut band = Vec::new();
            for area in &config.areas {
                let path = files::find_one(
                    &config.base_dir,
                    &format!("{area}_pop_density*pearson*"),
                )?;
                let records = read_pearson(&path)?;
                band.push(Block {
                    header: area.clone(),
                    tables: pearson_tables(&records),
                });
            }
            bands.push(band);
        }
        Analysis::Osm => {
            for area in &config.areas {
                let mut band = Vec::new();
                for urban in OSM_VARIABLES {
                    let path = files::find_one(
                        &config.base_dir,
                        &format!("{area}_{urban}_pearson*"),
                    )?;
                    let records = read_pearson(&path)?;
                    band.push(Block {
                        header: format!("{area}_{urban}"),
                        tables: pearson_tables(&records),
                    });
                }
                bands.push(band);
            }
        }
    }
    let sheet = book.add_worksheet();
    sheet.set_name("pearson")?;
    workbook::write_bands(sheet, &bands)?;

    book.save(&config.output_xlsx)?;
    info!("wrote {}", config.output_xlsx.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(path: &Path, body: &str) {
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    /// Lays out a minimal population-analysis results directory for one
    /// area and both methods.
    fn fixture(dir: &Path, area: &str) {
        write_file(
            &dir.join(format!("{area}_pop_density_km_pearson.csv")),
            "x_var,abs_r,r\n\
             gabor_sc30_filter_3,0.7,-0.7\n\
             hog_sc30_mean,0.5,0.5\n",
        );
        for method in METHODS {
            let method_dir = dir.join(method);
            std::fs::create_dir_all(&method_dir).unwrap();
            write_file(
                &method_dir.join(format!("{area}_{method}_y_summary_stats.csv")),
                "y_variable,Min_Out_R2,Mean_Out_R2,Max_Out_R2\n\
                 pop_density_km,0.1,0.5,0.8\n",
            );
            write_file(
                &method_dir.join(format!(
                    "{area}_{method}_pop_density_km_summary_importance.csv"
                )),
                "Feature_Index,Importance_1,mean,min,max\n\
                 gabor_sc30_filter_3,0.8,0.8,0.8,0.8\n\
                 hog_sc30_mean,0.3,0.3,0.3,0.3\n",
            );
        }
    }

    #[test]
    fn unknown_analysis_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(&SummarizeConfig {
            analysis: "census".to_string(),
            base_dir: dir.path().to_path_buf(),
            areas: vec!["sl".to_string()],
            output_xlsx: dir.path().join("out.xlsx"),
        })
        .unwrap_err();
        assert!(matches!(err, SummarizeError::UnknownAnalysis(_)));
    }

    #[test]
    fn missing_input_reports_the_pattern() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("enr")).unwrap();
        let err = run(&SummarizeConfig {
            analysis: "population".to_string(),
            base_dir: dir.path().to_path_buf(),
            areas: vec!["sl".to_string()],
            output_xlsx: dir.path().join("out.xlsx"),
        })
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("y_summary_stats"), "got: {message}");
    }

    #[test]
    fn population_run_writes_the_workbook() {
        let dir = tempfile::tempdir().unwrap();
        fixture(dir.path(), "sl");
        fixture(dir.path(), "gh");
        let out = dir.path().join("summarized_population_results.xlsx");
        run(&SummarizeConfig {
            analysis: "population".to_string(),
            base_dir: dir.path().to_path_buf(),
            areas: vec!["sl".to_string(), "gh".to_string()],
            output_xlsx: out.clone(),
        })
        .unwrap();
        assert!(out.exists());
        assert!(std::fs::metadata(&out).unwrap().len() > 0);
    }

    #[test]
    fn pearson_reader_round_trips_the_prepare_format() {
        let dir = tempfile::tempdir().unwrap();
        fixture(dir.path(), "sl");
        let records =
            read_pearson(&dir.path().join("sl_pop_density_km_pearson.csv")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, "gabor_sc30_filter_3");
        assert_eq!(records[0].1, -0.7);
        assert_eq!(records[0].2, 0.7);
    }
}
