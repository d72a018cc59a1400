#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use tractfit::combine::{self, CombineConfig};
use tractfit::elastic_net::ElasticNetConfig;
use tractfit::forest::ForestConfig;
use tractfit::prepare::{self, PrepareConfig};
use tractfit::scaffold::{self, StudyLayout};
use tractfit::summarize::{self, SummarizeConfig};
use tractfit::trainer::{self, AnalyzeConfig};

#[derive(Parser)]
#[command(
    name = "tractfit",
    about = "Regression engine for contextual-feature analysis of census tracts",
    long_about = "Runs the tract-level regression pipeline: scaffold the study \
                 folders, combine per-country tables, screen and standardize \
                 candidates, train elastic net and random forest models over \
                 seeds, and pivot the results into summary workbooks."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the study folder tree
    #[command(about = "Create the study folder tree")]
    Scaffold {
        /// Root folder to create (suffixed if it already exists)
        #[arg(value_name = "ROOT")]
        root: PathBuf,
    },

    /// Stack per-country CSVs into one table
    #[command(about = "Stack per-country CSVs into one multi-country table")]
    Combine {
        /// Input CSVs in stacking order
        #[arg(value_name = "CSV", required = true)]
        inputs: Vec<PathBuf>,

        /// Tract id column shared by all inputs
        #[arg(long, default_value = "FIPS")]
        key: String,

        /// Dependent column to keep last in the combined table
        #[arg(long)]
        dependent_var: String,

        /// Combined output CSV
        #[arg(long)]
        output: PathBuf,
    },

    /// Screen and standardize candidates for one country
    #[command(about = "Correlation-filter and standardize one country's table")]
    Prepare {
        /// Short country label used in output file names (e.g. sl, blz, gh)
        #[arg(long)]
        country: String,

        /// Contextual-feature CSV keyed by the tract id column
        #[arg(long)]
        features: PathBuf,

        /// Auxiliary CSVs inner-joined onto the features
        #[arg(long = "aux", value_name = "CSV")]
        aux_csvs: Vec<PathBuf>,

        /// Tract id column shared by all inputs
        #[arg(long, default_value = "FIPS")]
        key: String,

        /// Dependent columns to prepare
        #[arg(long = "dependent-var", value_name = "NAME", required = true)]
        dependent_vars: Vec<String>,

        /// Derive pop_density_km from Population / area_m before screening
        #[arg(long)]
        population_density: bool,

        /// Standardize the dependent column as well
        #[arg(long)]
        scale_y: bool,

        /// Directory for the pearson and scaled tables
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Train models over seeds and aggregate the results
    #[command(about = "Run the seed loop for one country, method, and dependent-variable set")]
    Analyze {
        /// Short country label matching the prepare outputs
        #[arg(long)]
        country: String,

        /// Regression method: enr or rfr
        #[arg(long)]
        method: String,

        /// Dependent-variable set: pop or osm
        #[arg(long)]
        dep_set: String,

        /// First seed of the range (inclusive)
        #[arg(long, default_value = "1")]
        seed_start: u64,

        /// Last seed of the range (inclusive)
        #[arg(long, default_value = "100")]
        seed_end: u64,

        /// Tract id column of the scaled tables
        #[arg(long, default_value = "FIPS")]
        key: String,

        /// Directory holding the prepare stage's scaled tables
        #[arg(long, default_value = ".")]
        input_dir: PathBuf,

        /// Directory for models, predictions, and summary tables
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Pivot persisted results into one workbook
    #[command(about = "Rank and pivot persisted results into a workbook")]
    Summarize {
        /// Analysis type: population or osm
        #[arg(long)]
        analysis: String,

        /// Directory holding pearson tables and enr/, rfr/ subfolders
        #[arg(long, default_value = ".")]
        base_dir: PathBuf,

        /// Areas in presentation order
        #[arg(
            long = "area",
            value_name = "AREA",
            default_values_t = ["blz".to_string(), "sl".to_string(), "gh".to_string(), "sl-blz-gh".to_string()]
        )]
        areas: Vec<String>,

        /// Output workbook path
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let Cli { command } = cli;

    let result: Result<(), Box<dyn std::error::Error>> = match command {
        Some(Commands::Scaffold { root }) => run_scaffold(root),
        Some(Commands::Combine {
            inputs,
            key,
            dependent_var,
            output,
        }) => run_combine(inputs, key, dependent_var, output),
        Some(Commands::Prepare {
            country,
            features,
            aux_csvs,
            key,
            dependent_vars,
            population_density,
            scale_y,
            output_dir,
        }) => run_prepare(
            country,
            features,
            aux_csvs,
            key,
            dependent_vars,
            population_density,
            scale_y,
            output_dir,
        ),
        Some(Commands::Analyze {
            country,
            method,
            dep_set,
            seed_start,
            seed_end,
            key,
            input_dir,
            output_dir,
        }) => run_analyze(
            country, method, dep_set, seed_start, seed_end, key, input_dir, output_dir,
        ),
        Some(Commands::Summarize {
            analysis,
            base_dir,
            areas,
            output,
        }) => run_summarize(analysis, base_dir, areas, output),
        None => Cli::command().print_help().map_err(|e| e.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_scaffold(root: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("> Creating study folders under {}", root.display());
    let created = scaffold::create(&root, &StudyLayout::default())?;
    eprintln!("> Created {}", created.display());
    Ok(())
}

fn run_combine(
    inputs: Vec<PathBuf>,
    key: String,
    dependent_var: String,
    output: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("> Combining {} tables", inputs.len());
    combine::run(&CombineConfig {
        inputs,
        key_name: key,
        dependent_var,
        output_csv: output.clone(),
    })?;
    eprintln!("> Wrote {}", output.display());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_prepare(
    country: String,
    features: PathBuf,
    aux_csvs: Vec<PathBuf>,
    key: String,
    dependent_vars: Vec<String>,
    population_density: bool,
    scale_y: bool,
    output_dir: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("> Preparing {country} ({} dependent variables)", dependent_vars.len());
    prepare::run(&PrepareConfig {
        country,
        features_csv: features,
        aux_csvs,
        key_name: key,
        dependent_vars,
        derive_population_density: population_density,
        scale_y,
        output_dir,
    })?;
    eprintln!("> Prepare complete");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_analyze(
    country: String,
    method: String,
    dep_set: String,
    seed_start: u64,
    seed_end: u64,
    key: String,
    input_dir: PathBuf,
    output_dir: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("> Analyzing {country} / {dep_set} / {method}, seeds {seed_start}..={seed_end}");
    trainer::run(&AnalyzeConfig {
        country,
        method,
        dep_set,
        seeds: seed_start..=seed_end,
        key_name: key,
        input_dir,
        output_dir,
        enet: ElasticNetConfig::default(),
        forest: ForestConfig::default(),
    })?;
    eprintln!("> Analyze complete");
    Ok(())
}

fn run_summarize(
    analysis: String,
    base_dir: PathBuf,
    areas: Vec<String>,
    output: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("> Summarizing {analysis} results from {}", base_dir.display());
    summarize::run(&SummarizeConfig {
        analysis,
        base_dir,
        areas,
        output_xlsx: output.clone(),
    })?;
    eprintln!("> Wrote {}", output.display());
    Ok(())
}
