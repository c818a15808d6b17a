//! Envelope tuner CLI module
//!
//! Command-line interface for tuning, grid previews and data inspection.

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::data::{energy_efficiency_schema, ColumnKind, ColumnSpec, Dataset, Schema};
use crate::optimizer::{GridSearch, GridSearchConfig, HyperparameterGrid, ParameterValue};
use crate::pipeline::{PipelineOutput, TargetSpec, TuningConfig, TuningPipeline};
use crate::report::RunReport;
use crate::training::{ModelBackend, RandomForestBackend, RidgeBackend};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "envelope-tuner")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cross-validated grid search for building heating and cooling load models")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Model family driven by the search
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Bagged regression trees (ntrees, max_depth, min_rows, mtries, sample_rate)
    Forest,
    /// Ridge / least squares (lambda)
    Ridge,
}

/// Overrides applied on top of a [`TuningConfig`]
#[derive(clap::Args, Debug, Clone, Default)]
pub struct TuneArgs {
    /// Tuning configuration file (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Target columns, comma separated
    #[arg(long, value_delimiter = ',')]
    pub targets: Vec<String>,

    /// Number of cross-validation folds
    #[arg(long)]
    pub cv_folds: Option<usize>,

    /// Fraction of rows used for training
    #[arg(long)]
    pub train_ratio: Option<f64>,

    /// Seed for the split, the fold shuffle and the forest
    #[arg(long)]
    pub seed: Option<u64>,

    /// Worker threads (1 runs sequentially)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Per-fold training time limit in seconds
    #[arg(long)]
    pub fold_timeout: Option<f64>,

    /// Candidate tree counts
    #[arg(long, value_delimiter = ',')]
    pub ntrees: Vec<i64>,

    /// Candidate depth limits (0 = unlimited)
    #[arg(long, value_delimiter = ',')]
    pub max_depth: Vec<i64>,

    /// Candidate minimum rows per leaf
    #[arg(long, value_delimiter = ',')]
    pub min_rows: Vec<i64>,

    /// Candidate ridge penalties
    #[arg(long, value_delimiter = ',')]
    pub lambda: Vec<f64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Tune every target and report test-set RMSE
    Tune {
        /// Input data file (CSV, JSON, or Parquet)
        #[arg(short, long)]
        data: PathBuf,

        /// Model backend
        #[arg(short, long, value_enum, default_value = "forest")]
        backend: BackendKind,

        #[command(flatten)]
        args: TuneArgs,

        /// Write the run report (.json) or the results table (.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the configurations a search would train
    Grid {
        /// Model backend
        #[arg(short, long, value_enum, default_value = "forest")]
        backend: BackendKind,

        #[command(flatten)]
        args: TuneArgs,
    },

    /// Show data information
    Info {
        /// Input data file
        #[arg(short, long)]
        data: PathBuf,
    },
}

// ─── Data loading ──────────────────────────────────────────────────────────────

pub fn load_data(path: &Path) -> anyhow::Result<DataFrame> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let df = match ext {
        "csv" => CsvReadOptions::default()
            .with_infer_schema_length(Some(1000))
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?,
        "json" => JsonReader::new(std::fs::File::open(path)?)
            .finish()?,
        "parquet" => ParquetReader::new(std::fs::File::open(path)?)
            .finish()?,
        _ => anyhow::bail!("Unsupported file format: {}", ext),
    };

    Ok(df)
}

/// Schema for the columns `config` uses; energy-efficiency columns keep their
/// declared kinds, anything else is read as numeric
pub fn schema_for(config: &TuningConfig) -> Schema {
    let known = energy_efficiency_schema();
    let names = config
        .features
        .iter()
        .chain(config.targets.iter().map(|t| &t.column));

    Schema::new(
        names
            .map(|name| {
                known
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| ColumnSpec::numeric(name.as_str()))
            })
            .collect(),
    )
}

// ─── Configuration ─────────────────────────────────────────────────────────────

/// Resolve the tuning configuration: file (or defaults), then flag overrides
pub fn resolve_config(backend: BackendKind, args: &TuneArgs) -> anyhow::Result<TuningConfig> {
    let mut config = match &args.config {
        Some(path) => TuningConfig::from_json_file(path)?,
        None => TuningConfig::energy_efficiency(),
    };

    if backend == BackendKind::Ridge && args.config.is_none() {
        config.grid = HyperparameterGrid::new().add("lambda", [0.0, 0.1, 1.0, 10.0]);
    }

    if !args.targets.is_empty() {
        let known: Vec<TargetSpec> = config.targets.clone();
        config.targets = args
            .targets
            .iter()
            .map(|column| {
                known
                    .iter()
                    .find(|t| &t.column == column)
                    .cloned()
                    .unwrap_or_else(|| TargetSpec::new(column.as_str(), column.as_str()))
            })
            .collect();
    }

    let mut search: GridSearchConfig = config.search.clone();
    if let Some(k) = args.cv_folds {
        search = search.with_cv_folds(k);
    }
    if let Some(seed) = args.seed {
        search = search.with_random_state(Some(seed));
        config.random_state = Some(seed);
    }
    if let Some(jobs) = args.jobs {
        search = search.with_n_jobs(Some(jobs));
    }
    if let Some(secs) = args.fold_timeout {
        search = search.with_fold_timeout(secs);
    }
    config.search = search;

    if let Some(ratio) = args.train_ratio {
        config.train_ratio = ratio;
    }

    let overrides: Vec<(&str, Vec<ParameterValue>)> = match backend {
        BackendKind::Forest => vec![
            ("ntrees", args.ntrees.iter().copied().map(ParameterValue::Int).collect()),
            ("max_depth", args.max_depth.iter().copied().map(ParameterValue::Int).collect()),
            ("min_rows", args.min_rows.iter().copied().map(ParameterValue::Int).collect()),
        ],
        BackendKind::Ridge => vec![(
            "lambda",
            args.lambda.iter().copied().map(ParameterValue::Float).collect(),
        )],
    };
    if overrides.iter().any(|(_, values)| !values.is_empty()) {
        config.grid = override_grid(&config.grid, overrides);
    }

    Ok(config)
}

/// Replace the values of the overridden parameters, keeping declaration order
fn override_grid(base: &HyperparameterGrid, overrides: Vec<(&str, Vec<ParameterValue>)>) -> HyperparameterGrid {
    let mut grid = HyperparameterGrid::new();
    for param in base.parameters() {
        let values = overrides
            .iter()
            .find(|(name, values)| *name == param.name && !values.is_empty())
            .map(|(_, values)| values.clone())
            .unwrap_or_else(|| param.values.clone());
        grid = grid.add(param.name.clone(), values);
    }
    for (name, values) in overrides {
        if !values.is_empty() && base.parameters().iter().all(|p| p.name != name) {
            grid = grid.add(name, values);
        }
    }
    grid
}

fn forest_backend(config: &TuningConfig) -> RandomForestBackend {
    RandomForestBackend::new()
        .with_n_jobs(config.search.n_jobs)
        .with_seed(config.random_state)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_tune(
    data_path: &Path,
    backend: BackendKind,
    args: &TuneArgs,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Tune");

    let config = resolve_config(backend, args)?;

    step_run("Loading data");
    let start = Instant::now();
    let df = load_data(data_path)?;
    let dataset = Dataset::from_dataframe(&df, &schema_for(&config))?;
    step_done(&format!("{} rows × {} cols in {:?}", dataset.n_rows(), df.width(), start.elapsed()));

    println!("  {:<16} {}", muted("Backend"), format!("{:?}", backend).to_lowercase().white());
    println!("  {:<16} {}", muted("Configurations"), config.grid.size().to_string().white());
    println!("  {:<16} {}", muted("Folds"), config.search.cv_folds.to_string().white());

    match backend {
        BackendKind::Forest => run_pipeline(forest_backend(&config), config, &dataset, output),
        BackendKind::Ridge => run_pipeline(RidgeBackend::new(), config, &dataset, output),
    }
}

fn run_pipeline<B: ModelBackend>(
    backend: B,
    config: TuningConfig,
    dataset: &Dataset,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let backend_name = backend.name().to_string();
    let mut pipeline = TuningPipeline::new(backend, config);

    step_run("Searching");
    let start = Instant::now();
    let result = pipeline.run(dataset)?;
    step_done(&format!("{:?}", start.elapsed()));

    print_outcome(&result);

    if let Some(path) = output {
        step_run(&format!("Saving → {}", path.display()));
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => result.results.save(path)?,
            _ => RunReport::new(backend_name, &result).save(path)?,
        }
        step_done("");
    }

    println!();
    Ok(())
}

fn print_outcome(output: &PipelineOutput) {
    for outcome in &output.outcomes {
        section(&outcome.label);
        println!(
            "  {:<6} {:<44} {:>10}",
            muted("Rank"),
            muted("Configuration"),
            muted("CV RMSE")
        );
        println!("  {}", dim(&"─".repeat(62)));
        for (i, record) in outcome.search.ranked().take(5).enumerate() {
            println!(
                "  {:<6} {:<44} {:>10.4}",
                i + 1,
                record.configuration.to_string(),
                record.score().unwrap_or(f64::NAN)
            );
        }
        let excluded = outcome.search.unscored().count();
        if excluded > 0 {
            println!("  {}", format!("{} configuration(s) excluded", excluded).yellow());
        }
    }

    println!();
    line_box_top();
    line_box(&format!("{}", "Results".white().bold()));
    line_box_sep();
    for row in &output.results {
        line_box(&kv(&format!("{:<16}", row.label), &format!("RMSE {:.4}", row.rmse)));
    }
    line_box_sep();
    line_box(&kv("Train / test   ", &format!("{} / {} rows", output.n_train, output.n_test)));
    line_box_bottom();
}

pub fn cmd_grid(backend: BackendKind, args: &TuneArgs) -> anyhow::Result<()> {
    section("Grid");

    let config = resolve_config(backend, args)?;
    let configurations = match backend {
        BackendKind::Forest => preview(&forest_backend(&config), &config)?,
        BackendKind::Ridge => preview(&RidgeBackend::new(), &config)?,
    };

    for (i, configuration) in configurations.iter().enumerate() {
        println!("  {:>4}  {}", dim(&i.to_string()), configuration);
    }
    println!();
    println!("  {} {}", ok(&configurations.len().to_string()), muted("configurations"));
    println!();
    Ok(())
}

fn preview<B: ModelBackend>(backend: &B, config: &TuningConfig) -> anyhow::Result<Vec<String>> {
    let search = GridSearch::new(backend, config.grid.clone(), config.search.clone());
    let configurations = search.enumerate()?;
    for configuration in &configurations {
        backend.validate(configuration)?;
    }
    Ok(configurations.iter().map(ToString::to_string).collect())
}

pub fn cmd_info(data_path: &Path) -> anyhow::Result<()> {
    section("Data Info");

    let df = load_data(data_path)?;
    let schema = energy_efficiency_schema();

    println!("  {:<12} {}", muted("File"), data_path.display());
    println!("  {:<12} {}", muted("Rows"), df.height());
    println!("  {:<12} {}", muted("Columns"), df.width());
    println!("  {:<12} {:.2} MB", muted("Memory"), df.estimated_size() as f64 / 1024.0 / 1024.0);
    println!();

    println!(
        "  {:<8} {:<12} {:>6} {:>8}  {}",
        muted("Column"),
        muted("Type"),
        muted("Nulls"),
        muted("Unique"),
        muted("Role")
    );
    println!("  {}", dim(&"─".repeat(62)));

    for col in df.get_columns() {
        let role = match schema.get(col.name().as_str()) {
            Some(spec) => {
                let kind = match &spec.kind {
                    ColumnKind::Numeric => "numeric".to_string(),
                    ColumnKind::Categorical { levels } => format!("categorical {{{}}}", levels.join(",")),
                };
                format!("{} · {}", spec.description.clone().unwrap_or_default(), kind)
            }
            None => "-".to_string(),
        };
        println!(
            "  {:<8} {:<12} {:>6} {:>8}  {}",
            col.name(),
            format!("{:?}", col.dtype()).truecolor(140, 140, 140),
            col.null_count(),
            col.n_unique().unwrap_or(0),
            dim(&role)
        );
    }

    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_tune_flags() {
        let cli = Cli::try_parse_from([
            "envelope-tuner",
            "tune",
            "--data",
            "energy.csv",
            "--ntrees",
            "50,100",
            "--cv-folds",
            "5",
            "--targets",
            "Y1",
        ])
        .unwrap();

        match cli.command {
            Commands::Tune { data, backend, args, output } => {
                assert_eq!(data, PathBuf::from("energy.csv"));
                assert_eq!(backend, BackendKind::Forest);
                assert_eq!(args.ntrees, vec![50, 100]);
                assert_eq!(args.cv_folds, Some(5));
                assert!(output.is_none());
            }
            _ => panic!("expected tune"),
        }
    }

    #[test]
    fn test_overrides_keep_declaration_order() {
        let args = TuneArgs {
            ntrees: vec![10],
            min_rows: vec![3, 4],
            jobs: Some(1),
            targets: vec!["Y2".to_string()],
            ..Default::default()
        };
        let config = resolve_config(BackendKind::Forest, &args).unwrap();

        let names: Vec<&str> = config.grid.parameters().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["ntrees", "max_depth", "min_rows"]);
        assert_eq!(config.grid.size(), 4);
        assert_eq!(config.search.n_jobs, Some(1));
        assert_eq!(config.targets, vec![TargetSpec::new("Y2", "Cooling Load")]);
    }

    #[test]
    fn test_ridge_defaults_to_lambda_grid() {
        let config = resolve_config(BackendKind::Ridge, &TuneArgs::default()).unwrap();
        assert_eq!(config.grid.parameters()[0].name, "lambda");
    }

    #[test]
    fn test_schema_for_energy_columns() {
        let schema = schema_for(&TuningConfig::energy_efficiency());
        assert_eq!(schema.columns().len(), 10);
        assert!(matches!(
            schema.get("X6").map(|c| &c.kind),
            Some(ColumnKind::Categorical { .. })
        ));
    }
}
