//! Decomposition of full feature-output names into their sub-components.
//!
//! Contextual-feature columns are named `<feature>_<scale>_<output>` with an
//! optional trailing `_<zonal-stat>`. Some outputs themselves contain
//! underscores ("filter_3", "line_contrast"), so a substitution pass rewrites
//! those into hyphenated forms before the split. The table is ordered and
//! only the first matching rule fires for a given name.

/// Ordered substitution rules. Order matters: "line_contrast" and
/// "max_line_length" must be tested before the bare "line_length" rule.
const REPLACEMENTS: &[(&str, &str)] = &[
    ("filter_", "filter-"),
    ("line_contrast", "line-contrast"),
    ("max_line_length", "max-line-length"),
    ("min_line_length", "min-line-length"),
    ("line_length", "line-length"),
    ("line_mean", "line-mean"),
    (
        "max_ratio_of_orthgonal_angles",
        "max-ratio-of-orthgonal-angles",
    ),
    ("_w_mean_", "_w-mean_"),
];

/// A full feature-output name split into its sub-components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureName {
    pub feature: String,
    pub scale: String,
    pub output: Option<String>,
    pub zonal_stat: Option<String>,
}

/// Applies the substitution table (first match wins) without splitting.
pub fn normalize(raw: &str) -> String {
    for (from, to) in REPLACEMENTS {
        if raw.contains(from) {
            return raw.replace(from, to);
        }
    }
    raw.to_string()
}

/// Normalizes and splits a full feature-output name.
///
/// Missing trailing components are simply absent; a bare feature name
/// decomposes with an empty scale.
pub fn decompose(raw: &str) -> FeatureName {
    let normalized = normalize(raw);
    let mut parts = normalized.split('_');
    FeatureName {
        feature: parts.next().unwrap_or_default().to_string(),
        scale: parts.next().unwrap_or_default().to_string(),
        output: parts.next().map(str::to_string),
        zonal_stat: parts.next().map(str::to_string),
    }
}
