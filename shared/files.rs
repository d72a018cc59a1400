//! Output-file naming conventions and pattern-based lookup.
//!
//! Every stage derives its file names here so the next stage can find them.
//! Names follow the `<country>_<y>_...` scheme throughout.

use log::warn;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No file matching '{pattern}' found in {dir}")]
    NoMatch { pattern: String, dir: String },
}

pub fn pearson_csv_name(country: &str, y_var: &str) -> String {
    format!("{country}_{y_var}_pearson.csv")
}

pub fn y_values_csv_name(country: &str, y_var: &str) -> String {
    format!("{country}_{y_var}_y-values.csv")
}

pub fn scaled_csv_name(country: &str, y_var: &str) -> String {
    format!("{country}_{y_var}_scaled.csv")
}

pub fn model_file_name(country: &str, y_var: &str, seed: u64, method: &str, dep_set: &str) -> String {
    format!("{country}_{y_var}_{seed}_{method}_{dep_set}_model.toml")
}

pub fn predicted_csv_name(
    country: &str,
    y_var: &str,
    seed: u64,
    method: &str,
    dep_set: &str,
) -> String {
    format!("{country}_{y_var}_{seed}_{method}_{dep_set}_predicted.csv")
}

pub fn seed_output_name(country: &str, method: &str, y_var: &str) -> String {
    format!("{country}_{method}_{y_var}_seed_output.csv")
}

pub fn summary_importance_name(country: &str, method: &str, y_var: &str) -> String {
    format!("{country}_{method}_{y_var}_summary_importance.csv")
}

pub fn summary_stats_name(country: &str, method: &str) -> String {
    format!("{country}_{method}_y_summary_stats.csv")
}

/// Does a glob-style `*` pattern match a file name?
fn matches(pattern: &str, name: &str) -> bool {
    // A star-free pattern is a literal name, not a prefix.
    if !pattern.contains('*') {
        return pattern == name;
    }
    // Anchored match over the literal segments between `*`s.
    let segments: Vec<&str> = pattern.split('*').collect();
    let mut rest = name;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(segment) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == segments.len() - 1 && !pattern.ends_with('*') {
            match rest.strip_suffix(segment) {
                Some(r) => rest = r,
                None => return false,
            }
        } else {
            match rest.find(segment) {
                Some(pos) => rest = &rest[pos + segment.len()..],
                None => return false,
            }
        }
    }
    true
}

/// Finds the single file in `dir` whose name matches the `*` pattern.
///
/// Zero matches is an error naming the pattern. Multiple matches takes the
/// lexicographically first and warns, so the selection is at least
/// deterministic rather than directory-order dependent.
pub fn find_one(dir: &Path, pattern: &str) -> Result<PathBuf, FileError> {
    let mut hits: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if matches(pattern, name) {
            hits.push(entry.path());
        }
    }
    hits.sort();
    match hits.len() {
        0 => Err(FileError::NoMatch {
            pattern: pattern.to_string(),
            dir: dir.display().to_string(),
        }),
        1 => Ok(hits.remove(0)),
        n => {
            warn!(
                "{n} files match '{pattern}' in {}; using {}",
                dir.display(),
                hits[0].display()
            );
            Ok(hits.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn glob_matching_is_anchored() {
        assert!(matches("sl_*_pearson.csv", "sl_pop_density_km_pearson.csv"));
        assert!(!matches("sl_*_pearson.csv", "blz_pop_density_km_pearson.csv"));
        assert!(matches("sl_enr_y_summary_stats*", "sl_enr_y_summary_stats.csv"));
        assert!(!matches("sl_enr_y_summary_stats*", "old_sl_enr_y_summary_stats.csv"));
        assert!(matches("*_scaled.csv", "gh_RD_DEN_scaled.csv"));
    }

    #[test]
    fn star_free_pattern_matches_the_exact_name_only() {
        assert!(matches("sl_pop_pearson.csv", "sl_pop_pearson.csv"));
        assert!(!matches("sl_pop_pearson.csv", "sl_pop_pearson.csvx"));
        assert!(!matches("sl_pop_pearson.csv", "x_sl_pop_pearson.csv"));
    }

    #[test]
    fn find_one_errors_on_zero_and_warns_on_many() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            find_one(dir.path(), "missing_*"),
            Err(FileError::NoMatch { .. })
        ));

        File::create(dir.path().join("gh_b_pearson.csv")).unwrap();
        File::create(dir.path().join("gh_a_pearson.csv")).unwrap();
        let hit = find_one(dir.path(), "gh_*_pearson.csv").unwrap();
        assert!(hit.ends_with("gh_a_pearson.csv"));
    }

    #[test]
    fn file_names_follow_the_country_y_scheme() {
        assert_eq!(
            model_file_name("sl", "RD_DEN", 7, "enr", "osm"),
            "sl_RD_DEN_7_enr_osm_model.toml"
        );
        assert_eq!(
            seed_output_name("blz", "rfr", "pop_density_km"),
            "blz_rfr_pop_density_km_seed_output.csv"
        );
        assert_eq!(summary_stats_name("gh", "enr"), "gh_enr_y_summary_stats.csv");
    }
}
