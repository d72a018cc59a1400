//! End-to-end pipeline test: scaffold, combine, prepare, analyze with both
//! methods, then summarize into a workbook, all inside a scratch directory.

use std::io::Write;
use std::path::Path;

use tractfit::combine::{self, CombineConfig};
use tractfit::elastic_net::ElasticNetConfig;
use tractfit::forest::{ForestConfig, MaxFeatures};
use tractfit::prepare::{self, PrepareConfig};
use tractfit::scaffold::{self, StudyLayout};
use tractfit::summarize::{self, SummarizeConfig};
use tractfit::trainer::{self, AnalyzeConfig};

fn write_file(path: &Path, body: &str) {
    let mut f = std::fs::File::create(path).unwrap();
    f.write_all(body.as_bytes()).unwrap();
}

/// Writes one country's feature and population tables. The tract ids fall
/// in the requested range and the dependent variable is a noisy linear
/// function of the informative features.
fn country_fixture(dir: &Path, country: &str, first_tract: i64) {
    let mut features = String::from("FIPS,hog_sc30_mean,gabor_sc50_filter_1,lbpm_sc30_var\n");
    let mut population = String::from("FIPS,Population,area_m\n");
    for i in 0..40i64 {
        let tract = first_tract + i;
        let a = i as f64 / 4.0;
        let b = ((i * 31 % 11) as f64) / 5.0;
        let c = ((i * 17 % 7) as f64) / 3.0;
        features.push_str(&format!("{tract},{a},{b},{c}\n"));
        // Density driven by the first two features plus a small wobble.
        let pop = 1000.0 + 400.0 * a + 150.0 * b + 10.0 * c;
        population.push_str(&format!("{tract},{pop},1000000\n"));
    }
    write_file(&dir.join(format!("{country}_features.csv")), &features);
    write_file(&dir.join(format!("{country}_population.csv")), &population);
}

fn small_enet() -> ElasticNetConfig {
    ElasticNetConfig {
        alphas: vec![0.001, 0.01],
        l1_ratios: vec![0.5, 0.9],
        cv_folds: 3,
        max_iter: 2_000,
        tol: 1e-5,
    }
}

fn small_forest() -> ForestConfig {
    ForestConfig {
        n_estimators_grid: vec![10],
        min_leaf_grid: vec![2],
        max_features_grid: vec![MaxFeatures::Sqrt],
        cv_folds: 3,
    }
}

#[test]
fn full_population_pipeline() {
    let scratch = tempfile::tempdir().unwrap();
    let dir = scratch.path();

    // Scaffold the study tree; the regression folders receive the outputs.
    let study = scaffold::create(&dir.join("features-analysis"), &StudyLayout::default()).unwrap();
    let base = study.join("regressions/population_density");
    assert!(base.join("enr").is_dir());
    assert!(base.join("rfr").is_dir());

    // Two countries with tract ids in the Sri Lanka and Ghana ranges.
    country_fixture(dir, "sl", 9_000_001);
    country_fixture(dir, "gh", 3_000_001);

    // Prepare each country: derive density, screen, standardize.
    for country in ["sl", "gh"] {
        prepare::run(&PrepareConfig {
            country: country.to_string(),
            features_csv: dir.join(format!("{country}_features.csv")),
            aux_csvs: vec![dir.join(format!("{country}_population.csv"))],
            key_name: "FIPS".to_string(),
            dependent_vars: vec!["pop_density_km".to_string()],
            derive_population_density: true,
            scale_y: false,
            output_dir: base.clone(),
        })
        .unwrap();
        assert!(base
            .join(format!("{country}_pop_density_km_pearson.csv"))
            .exists());
        assert!(base
            .join(format!("{country}_pop_density_km_scaled.csv"))
            .exists());
    }

    // Combine the two scaled tables into a pooled area.
    combine::run(&CombineConfig {
        inputs: vec![
            base.join("sl_pop_density_km_scaled.csv"),
            base.join("gh_pop_density_km_scaled.csv"),
        ],
        key_name: "FIPS".to_string(),
        dependent_var: "pop_density_km".to_string(),
        output_csv: base.join("sl-gh_pop_density_km_scaled.csv"),
    })
    .unwrap();

    // Analyze each country with both methods, writing into the method dirs.
    for country in ["sl", "gh"] {
        for method in ["enr", "rfr"] {
            trainer::run(&AnalyzeConfig {
                country: country.to_string(),
                method: method.to_string(),
                dep_set: "pop".to_string(),
                seeds: 1..=2,
                key_name: "FIPS".to_string(),
                input_dir: base.clone(),
                output_dir: base.join(method),
                enet: small_enet(),
                forest: small_forest(),
            })
            .unwrap();
            assert!(base
                .join(method)
                .join(format!("{country}_{method}_y_summary_stats.csv"))
                .exists());
            assert!(base
                .join(method)
                .join(format!("{country}_{method}_pop_density_km_summary_importance.csv"))
                .exists());
        }
    }

    // Each seed leaves a reloadable model behind.
    let model_path = base.join("enr/sl_pop_density_km_1_enr_pop_model.toml");
    let model = tractfit::model::TrainedModel::load(&model_path).unwrap();
    assert_eq!(model.dependent_variable, "pop_density_km");
    assert_eq!(model.seed, 1);

    // The predicted table tags tracts with their country bucket.
    let predicted = std::fs::read_to_string(
        base.join("enr/gh_pop_density_km_1_enr_pop_predicted.csv"),
    )
    .unwrap();
    assert!(predicted.starts_with("FIPS,Country,Actual,Predicted"));
    assert!(predicted.contains("Ghana"));

    // Summarize everything into one workbook.
    let out = base.join("summarized_population_results.xlsx");
    summarize::run(&SummarizeConfig {
        analysis: "population".to_string(),
        base_dir: base.clone(),
        areas: vec!["sl".to_string(), "gh".to_string()],
        output_xlsx: out.clone(),
    })
    .unwrap();
    assert!(std::fs::metadata(&out).unwrap().len() > 0);
}

#[test]
fn analyze_seed_results_are_reproducible() {
    let scratch = tempfile::tempdir().unwrap();
    let dir = scratch.path();
    country_fixture(dir, "sl", 9_000_001);

    prepare::run(&PrepareConfig {
        country: "sl".to_string(),
        features_csv: dir.join("sl_features.csv"),
        aux_csvs: vec![dir.join("sl_population.csv")],
        key_name: "FIPS".to_string(),
        dependent_vars: vec!["pop_density_km".to_string()],
        derive_population_density: true,
        scale_y: false,
        output_dir: dir.to_path_buf(),
    })
    .unwrap();

    let run_once = |out: &Path| {
        std::fs::create_dir_all(out).unwrap();
        trainer::run(&AnalyzeConfig {
            country: "sl".to_string(),
            method: "enr".to_string(),
            dep_set: "pop".to_string(),
            seeds: 3..=3,
            key_name: "FIPS".to_string(),
            input_dir: dir.to_path_buf(),
            output_dir: out.to_path_buf(),
            enet: small_enet(),
            forest: small_forest(),
        })
        .unwrap();
        std::fs::read_to_string(out.join("sl_enr_pop_density_km_seed_output.csv")).unwrap()
    };

    let first = run_once(&dir.join("run_a"));
    let second = run_once(&dir.join("run_b"));
    assert_eq!(first, second);
}
