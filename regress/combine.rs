//! The combine stage: stack per-country tables into one multi-country
//! table for the pooled analysis.

use crate::data::{self, DataError};
use log::info;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CombineError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),
    #[error("Dependent column '{0}' missing from the combined table")]
    MissingDependent(String),
}

#[derive(Debug, Clone)]
pub struct CombineConfig {
    /// Per-country CSVs sharing the key column, in stacking order.
    pub inputs: Vec<PathBuf>,
    pub key_name: String,
    /// Column stacking sorts names alphabetically, which buries the
    /// dependent column mid-table; it is moved back to the end.
    pub dependent_var: String,
    pub output_csv: PathBuf,
}

pub fn run(config: &CombineConfig) -> Result<(), CombineError> {
    let mut tables = Vec::with_capacity(config.inputs.len());
    for path in &config.inputs {
        tables.push(data::load_table(path, &config.key_name)?);
    }
    let mut combined = data::concat_tables(&tables)?;

    let j = combined
        .names
        .iter()
        .position(|n| n == &config.dependent_var)
        .ok_or_else(|| CombineError::MissingDependent(config.dependent_var.clone()))?;
    let name = combined.names.remove(j);
    let column = combined.columns.remove(j);
    combined.names.push(name);
    combined.columns.push(column);

    data::write_table(&combined, &config.output_csv)?;
    info!(
        "combined {} tables into {} ({} rows)",
        config.inputs.len(),
        config.output_csv.display(),
        combined.n_rows()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn combine_stacks_rows_and_keeps_the_dependent_last() {
        let dir = tempfile::tempdir().unwrap();
        let sl = write_csv(
            dir.path(),
            "sl.csv",
            "FIPS,pop_density_km,zz_feature\n9000001,10.0,1.0\n",
        );
        let gh = write_csv(
            dir.path(),
            "gh.csv",
            "FIPS,aa_feature,pop_density_km\n3000001,2.0,20.0\n",
        );
        let out = dir.path().join("sl-gh_combined.csv");
        run(&CombineConfig {
            inputs: vec![sl, gh],
            key_name: "FIPS".to_string(),
            dependent_var: "pop_density_km".to_string(),
            output_csv: out.clone(),
        })
        .unwrap();

        let combined = data::load_table(&out, "FIPS").unwrap();
        assert_eq!(combined.key, vec![9_000_001, 3_000_001]);
        // Sorted union of columns, dependent moved to the end.
        assert_eq!(
            combined.names,
            vec![
                "aa_feature".to_string(),
                "zz_feature".to_string(),
                "pop_density_km".to_string()
            ]
        );
        // Columns absent from one country are NaN-filled.
        assert!(combined.column("aa_feature").unwrap()[0].is_nan());
        assert_eq!(combined.column("pop_density_km").unwrap(), &[10.0, 20.0]);
    }

    #[test]
    fn missing_dependent_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sl = write_csv(dir.path(), "sl.csv", "FIPS,x\n1,1.0\n");
        let err = run(&CombineConfig {
            inputs: vec![sl],
            key_name: "FIPS".to_string(),
            dependent_var: "pop_density_km".to_string(),
            output_csv: dir.path().join("out.csv"),
        })
        .unwrap_err();
        assert!(matches!(err, CombineError::MissingDependent(_)));
    }
}
