//! Ranking tables for the results workbook.
//!
//! All rankings keep six rows for a "top 5" so a tie at fifth place stays
//! visible. Frequencies are counted within a fixed-size head of the raw
//! ranking (top 25 for importances, top 200 for correlations).

use crate::features;
use itertools::Itertools;
use std::collections::BTreeMap;

/// One laid-out table: a subheader title, column headers, and cell rows.
#[derive(Debug, Clone)]
pub struct RankedTable {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl RankedTable {
    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn height(&self) -> usize {
        self.rows.len() + 1
    }
}

pub const TOP_ROWS: usize = 6;
/// Frequency window for importance rankings.
pub const IMPORTANCE_FREQ_WINDOW: usize = 25;
/// Frequency window for Pearson rankings.
pub const PEARSON_FREQ_WINDOW: usize = 200;

fn sorted_by_abs(values: &[(String, f64)]) -> Vec<(String, f64)> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| {
        b.1.abs()
            .partial_cmp(&a.1.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted
}

/// Top raw entries by |value|: (normalized name, value, |value|).
pub fn full_top(values: &[(String, f64)], value_header: &str) -> RankedTable {
    let rows = sorted_by_abs(values)
        .into_iter()
        .take(TOP_ROWS)
        .map(|(name, v)| {
            vec![
                Cell::Text(features::normalize(&name)),
                Cell::Number(v),
                Cell::Number(v.abs()),
            ]
        })
        .collect();
    RankedTable {
        title: "full_5".to_string(),
        headers: vec![
            "Feature_Index".to_string(),
            value_header.to_string(),
            format!("abs_{value_header}"),
        ],
        rows,
    }
}

fn group_mean(values: &[(String, f64)], key: impl Fn(&str) -> Vec<String>) -> Vec<(Vec<String>, f64)> {
    let mut groups: BTreeMap<Vec<String>, (f64, usize)> = BTreeMap::new();
    for (name, v) in values {
        let entry = groups.entry(key(name)).or_insert((0.0, 0));
        entry.0 += v;
        entry.1 += 1;
    }
    let mut means: Vec<(Vec<String>, f64)> = groups
        .into_iter()
        .map(|(k, (sum, n))| (k, sum / n as f64))
        .collect();
    means.sort_by(|a, b| {
        b.1.abs()
            .partial_cmp(&a.1.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    means
}

/// Mean value per (feature, output) pair, ranked by |mean|.
pub fn feature_output_top(values: &[(String, f64)]) -> RankedTable {
    let means = group_mean(values, |name| {
        let parts = features::decompose(name);
        vec![parts.feature, parts.output.unwrap_or_default()]
    });
    let rows = means
        .into_iter()
        .take(TOP_ROWS)
        .map(|(key, mean)| {
            vec![
                Cell::Text(key[0].clone()),
                Cell::Text(key[1].clone()),
                Cell::Number(mean),
            ]
        })
        .collect();
    RankedTable {
        title: "feature-output_5".to_string(),
        headers: vec!["feature".to_string(), "output".to_string(), "mean".to_string()],
        rows,
    }
}

/// Mean value per feature, ranked by |mean|.
pub fn feature_top(values: &[(String, f64)]) -> RankedTable {
    let means = group_mean(values, |name| vec![features::decompose(name).feature]);
    let rows = means
        .into_iter()
        .take(TOP_ROWS)
        .map(|(key, mean)| vec![Cell::Text(key[0].clone()), Cell::Number(mean)])
        .collect();
    RankedTable {
        title: "feature_5".to_string(),
        headers: vec!["feature".to_string(), "mean".to_string()],
        rows,
    }
}

fn count_features(head: &[(String, f64)]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for (name, _) in head {
        *counts.entry(features::decompose(name).feature).or_insert(0) += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
}

/// Most frequent base features within the top `window` raw entries.
pub fn feature_freq_top(values: &[(String, f64)], window: usize, title: &str) -> RankedTable {
    let sorted = sorted_by_abs(values);
    let head = &sorted[..sorted.len().min(window)];
    let rows = count_features(head)
        .into_iter()
        .take(TOP_ROWS)
        .map(|(feature, count)| vec![Cell::Text(feature), Cell::Number(count as f64)])
        .collect();
    RankedTable {
        title: title.to_string(),
        headers: vec!["feature".to_string(), "count".to_string()],
        rows,
    }
}

/// Top Pearson entries by |r|: (normalized name, r, |r|).
pub fn pearson_full_top(records: &[(String, f64, f64)]) -> RankedTable {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
    let rows = sorted
        .into_iter()
        .take(TOP_ROWS)
        .map(|(name, r, abs_r)| {
            vec![
                Cell::Text(features::normalize(&name)),
                Cell::Number(r),
                Cell::Number(abs_r),
            ]
        })
        .collect();
    RankedTable {
        title: "full_5".to_string(),
        headers: vec!["x_var".to_string(), "r".to_string(), "abs_r".to_string()],
        rows,
    }
}

/// Per-area feature frequencies for the cross-area OSM tables. `entries`
/// holds (area, feature-output name) pairs; counting happens within each
/// area and the top rows of every area are stacked.
pub fn per_area_feature_freq(entries: &[(String, String)], title: &str) -> RankedTable {
    let by_area: BTreeMap<String, Vec<(String, f64)>> = entries
        .iter()
        .map(|(area, name)| (area.clone(), (name.clone(), 0.0)))
        .into_group_map()
        .into_iter()
        .collect();
    let mut rows = Vec::new();
    for (area, names) in by_area {
        for (feature, count) in count_features(&names).into_iter().take(TOP_ROWS) {
            rows.push(vec![
                Cell::Text(area.clone()),
                Cell::Text(feature),
                Cell::Number(count as f64),
            ]);
        }
    }
    RankedTable {
        title: title.to_string(),
        headers: vec!["area".to_string(), "feature".to_string(), "count".to_string()],
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn importances() -> Vec<(String, f64)> {
        vec![
            ("gabor_sc30_filter_3".to_string(), -0.9),
            ("gabor_sc50_filter_1".to_string(), 0.5),
            ("hog_sc30_mean".to_string(), 0.8),
            ("hog_sc50_var".to_string(), 0.1),
            ("lbpm_sc30_max".to_string(), 0.2),
            ("lsr_sc30_line_length".to_string(), 0.05),
            ("ndvi_sc30_mean".to_string(), 0.01),
        ]
    }

    #[test]
    fn full_top_ranks_by_absolute_value_and_keeps_six() {
        let table = full_top(&importances(), "mean");
        assert_eq!(table.rows.len(), 6);
        assert_eq!(table.rows[0][0], Cell::Text("gabor_sc30_filter-3".to_string()));
        assert_eq!(table.rows[0][1], Cell::Number(-0.9));
        assert_eq!(table.rows[1][0], Cell::Text("hog_sc30_mean".to_string()));
    }

    #[test]
    fn feature_top_averages_within_a_feature() {
        let table = feature_top(&importances());
        // hog: (0.8 + 0.1) / 2 = 0.45; gabor: (-0.9 + 0.5) / 2 = -0.2.
        let hog = table
            .rows
            .iter()
            .find(|r| r[0] == Cell::Text("hog".to_string()))
            .unwrap();
        assert_eq!(hog[1], Cell::Number(0.45));
        assert_eq!(table.rows[0][0], Cell::Text("hog".to_string()));
    }

    #[test]
    fn feature_freq_counts_within_the_window() {
        let table = feature_freq_top(&importances(), 3, "feature-freq_5");
        // Window of 3 by |value|: gabor(-0.9), hog(0.8), gabor(0.5).
        assert_eq!(table.rows[0][0], Cell::Text("gabor".to_string()));
        assert_eq!(table.rows[0][1], Cell::Number(2.0));
        assert_eq!(table.rows[1][1], Cell::Number(1.0));
    }

    #[test]
    fn pearson_full_top_ranks_by_abs_r() {
        let records = vec![
            ("hog_sc30_mean".to_string(), 0.4, 0.4),
            ("gabor_sc30_filter_3".to_string(), -0.7, 0.7),
        ];
        let table = pearson_full_top(&records);
        assert_eq!(table.rows[0][0], Cell::Text("gabor_sc30_filter-3".to_string()));
        assert_eq!(table.rows[0][1], Cell::Number(-0.7));
    }

    #[test]
    fn per_area_freq_groups_by_area() {
        let entries = vec![
            ("sl".to_string(), "gabor_sc30_filter_3".to_string()),
            ("sl".to_string(), "gabor_sc50_filter_1".to_string()),
            ("gh".to_string(), "hog_sc30_mean".to_string()),
        ];
        let table = per_area_feature_freq(&entries, "feature-freq_5-all");
        assert_eq!(table.rows[0][0], Cell::Text("gh".to_string()));
        assert_eq!(table.rows[1][0], Cell::Text("sl".to_string()));
        assert_eq!(table.rows[1][1], Cell::Text("gabor".to_string()));
        assert_eq!(table.rows[1][2], Cell::Number(2.0));
    }
}
