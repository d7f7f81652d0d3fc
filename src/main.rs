use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use supplement_sales_cleaner::config::{CleanerConfig, InvalidRowPolicy};
use supplement_sales_cleaner::logging;
use supplement_sales_cleaner::metrics;
use supplement_sales_cleaner::pipeline::{self, Pipeline, RunMode};
use supplement_sales_cleaner::report::print_formula_summary;

#[derive(Parser)]
#[command(name = "sales_cleaner")]
#[command(about = "Clean and validate the weekly supplement sales dataset")]
#[command(version = "0.1.0")]
struct Cli {
    /// Config file (defaults to cleaner.toml or $SALES_CLEANER_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write the cleaned CSV
    Clean {
        /// Raw CSV to read
        #[arg(long)]
        input: Option<PathBuf>,
        /// Cleaned CSV to write
        #[arg(long)]
        output: Option<PathBuf>,
        /// JSON run report to write
        #[arg(long)]
        report: Option<PathBuf>,
        /// What to do with invalid rows
        #[arg(long, value_enum)]
        policy: Option<InvalidRowPolicy>,
    },
    /// Run every check and print the report without writing anything
    Check {
        /// Raw CSV to read
        #[arg(long)]
        input: Option<PathBuf>,
        /// Also save the JSON run report here
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Only print the revenue formula inference
    Infer {
        /// Raw CSV to read
        #[arg(long)]
        input: Option<PathBuf>,
        /// Absolute tolerance for revenue comparisons
        #[arg(long)]
        tolerance: Option<f64>,
    },
}

impl Commands {
    /// Fold command-line overrides into the loaded config
    fn apply_to(&self, config: &mut CleanerConfig) -> anyhow::Result<()> {
        match self {
            Commands::Clean {
                input,
                output,
                report,
                policy,
            } => {
                if let Some(input) = input {
                    config.paths.input = input.clone();
                }
                if let Some(output) = output {
                    config.paths.output = output.clone();
                }
                if let Some(report) = report {
                    config.paths.report = Some(report.clone());
                }
                if let Some(policy) = policy {
                    config.run.policy = *policy;
                }
            }
            Commands::Check { input, report } => {
                if let Some(input) = input {
                    config.paths.input = input.clone();
                }
                // Only an explicit --report is written by a check run
                config.paths.report = report.clone();
                config.run.metrics_path = None;
            }
            Commands::Infer { input, tolerance } => {
                if let Some(input) = input {
                    config.paths.input = input.clone();
                }
                if let Some(tolerance) = tolerance {
                    config.validation.revenue_tolerance = *tolerance;
                }
            }
        }
        config.validate().context("Invalid command-line override")?;
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let mut config = CleanerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.command.apply_to(&mut config)?;

    let _log_guard = logging::init_logging(&config.paths.log_dir);

    let metrics_handle = match &config.run.metrics_path {
        Some(_) => Some(metrics::install_recorder()?),
        None => None,
    };

    let result = match cli.command {
        Commands::Clean { .. } => {
            println!("🧹 Running cleaning pipeline...");
            run_pipeline(config.clone(), RunMode::Clean)
        }
        Commands::Check { .. } => {
            println!("🔍 Checking raw data...");
            run_pipeline(config.clone(), RunMode::Check)
        }
        Commands::Infer { .. } => infer_only(&config.paths.input, config.validation.revenue_tolerance),
    };

    if let (Some(handle), Some(path)) = (&metrics_handle, &config.run.metrics_path) {
        metrics::write_textfile(handle, path).context("Failed to write metrics file")?;
    }

    if let Err(e) = &result {
        error!("Run failed: {:#}", e);
    }
    result
}

fn run_pipeline(config: CleanerConfig, mode: RunMode) -> anyhow::Result<()> {
    let input = config.paths.input.clone();
    let report_path = config.paths.report.clone();
    let pipeline = Pipeline::new(config);
    let report = pipeline
        .run(mode)
        .with_context(|| format!("Cleaning run over '{}' failed", input.display()))?;

    // The pipeline itself writes nothing in check mode
    if let (RunMode::Check, Some(path)) = (mode, &report_path) {
        report.write_json(path)?;
    }

    report.print_summary();
    report.into_result()?;
    Ok(())
}

fn infer_only(input: &Path, tolerance: f64) -> anyhow::Result<()> {
    info!("Inferring revenue formula for {}", input.display());
    let check = pipeline::check_formula(input, tolerance)
        .with_context(|| format!("Failed to load '{}'", input.display()))?;
    if check.malformed_rows > 0 {
        println!("⚠️  {} malformed row(s) skipped", check.malformed_rows);
    }

    print_formula_summary(&check.summary);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("sales_cleaner").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_clean_overrides_paths_and_policy() {
        let cli = parse(&["clean", "--input", "in.csv", "--output", "out.csv", "--policy", "reject"]);
        let mut config = CleanerConfig::default();
        cli.command.apply_to(&mut config).unwrap();

        assert_eq!(config.paths.input, PathBuf::from("in.csv"));
        assert_eq!(config.paths.output, PathBuf::from("out.csv"));
        assert_eq!(config.run.policy, InvalidRowPolicy::Reject);
        assert!(config.paths.report.is_some());
    }

    #[test]
    fn test_check_drops_configured_outputs() {
        let mut config = CleanerConfig::default();
        config.run.metrics_path = Some(PathBuf::from("metrics.prom"));

        parse(&["check"]).command.apply_to(&mut config).unwrap();
        assert!(config.paths.report.is_none());
        assert!(config.run.metrics_path.is_none());

        parse(&["check", "--report", "r.json"]).command.apply_to(&mut config).unwrap();
        assert_eq!(config.paths.report, Some(PathBuf::from("r.json")));
    }

    #[test]
    fn test_infer_tolerance_is_validated() {
        let mut config = CleanerConfig::default();
        parse(&["infer", "--tolerance", "0.5"]).command.apply_to(&mut config).unwrap();
        assert!((config.validation.revenue_tolerance - 0.5).abs() < 1e-12);

        let cli = parse(&["infer", "--tolerance=-1"]);
        assert!(cli.command.apply_to(&mut config).is_err());
    }

    #[test]
    fn test_global_config_flag_after_subcommand() {
        let cli = parse(&["check", "--config", "custom.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
    }
}
