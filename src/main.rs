//! Walk-forward return prediction CLI.
//!
//! # Usage
//!
//! ```bash
//! # Build the feature panel from wide prices
//! walkforward-returns features --prices data/prices.csv --output data/features.csv
//!
//! # Build forward-return labels aligned to features
//! walkforward-returns labels --config config/default.toml
//!
//! # Train and predict from existing feature and label files
//! walkforward-returns train --features data/features.csv --labels data/labels.csv
//!
//! # Run every stage and write a JSON report
//! walkforward-returns run --config config/default.toml --report results/report.json
//!
//! # Check containment and finiteness of written panels
//! walkforward-returns validate
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use walkforward_returns::data::{DataLoader, PricePanel};
use walkforward_returns::validation::{IntegrityReport, PanelIntegrityValidator};
use walkforward_returns::{
    FeatureEngine, LabelEngine, Pipeline, PipelineConfig, WalkForwardTrainer,
};

const SEPARATOR: &str = "============================================================";

#[derive(Parser)]
#[command(name = "walkforward-returns")]
#[command(about = "Walk-forward ridge forecasts of forward returns over a price panel")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (defaults are used when absent)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute momentum and volatility features
    Features {
        /// Wide price file (date column followed by one column per asset)
        #[arg(long, default_value = "data/prices.csv")]
        prices: PathBuf,

        #[arg(short, long, default_value = "data/features.csv")]
        output: PathBuf,
    },

    /// Compute forward-return labels on the feature keys
    Labels {
        #[arg(long, default_value = "data/prices.csv")]
        prices: PathBuf,

        #[arg(long, default_value = "data/features.csv")]
        features: PathBuf,

        #[arg(short, long, default_value = "data/labels.csv")]
        output: PathBuf,
    },

    /// Fit walk-forward ridge models and write out-of-sample predictions
    Train {
        #[arg(long, default_value = "data/features.csv")]
        features: PathBuf,

        #[arg(long, default_value = "data/labels.csv")]
        labels: PathBuf,

        #[arg(short, long, default_value = "data/predictions.csv")]
        output: PathBuf,
    },

    /// Run features, labels and training end to end
    Run {
        #[arg(long, default_value = "data/prices.csv")]
        prices: PathBuf,

        /// Directory for features.csv, labels.csv and predictions.csv
        #[arg(short, long, default_value = "data")]
        output: PathBuf,

        /// Optional JSON run report
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Check integrity of written panels
    Validate {
        #[arg(long, default_value = "data/prices.csv")]
        prices: PathBuf,

        #[arg(long, default_value = "data/features.csv")]
        features: PathBuf,

        #[arg(long, default_value = "data/labels.csv")]
        labels: PathBuf,

        #[arg(long, default_value = "data/predictions.csv")]
        predictions: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("walkforward_returns=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let loader = DataLoader::new().with_price_cleaning(config.clean_prices);

    match cli.command {
        Commands::Features { prices, output } => {
            let prices = load_prices(&loader, &prices, &config)?;
            let features = FeatureEngine::new(config.features.clone())
                .compute(&prices)
                .context("Feature computation failed")?;
            loader.write_features(&features, &output)?;
            info!("Wrote {} feature rows to {}", features.len(), output.display());
        }
        Commands::Labels {
            prices,
            features,
            output,
        } => {
            let prices = load_prices(&loader, &prices, &config)?;
            let features = loader.load_features(&features)?;
            let labels = LabelEngine::new(config.labels.horizon)
                .compute(&prices, &features)
                .context("Label computation failed")?;
            loader.write_scalar(&labels, &output)?;
            info!("Wrote {} label rows to {}", labels.len(), output.display());
        }
        Commands::Train {
            features,
            labels,
            output,
        } => {
            let features = loader.load_features(&features)?;
            let labels = loader.load_labels(&labels)?;
            let start = Instant::now();
            let run = WalkForwardTrainer::new(config.trainer.clone())
                .run(&features, &labels)
                .context("Walk-forward training failed")?;
            loader.write_scalar(&run.predictions, &output)?;
            info!(
                "Wrote {} predictions from {} steps to {} in {:.1}s",
                run.predictions.len(),
                run.steps.len(),
                output.display(),
                start.elapsed().as_secs_f64()
            );
        }
        Commands::Run {
            prices,
            output,
            report,
        } => {
            let prices = load_prices(&loader, &prices, &config)?;
            let start = Instant::now();
            let result = Pipeline::new(config.clone())
                .run(&prices)
                .context("Pipeline run failed")?;

            loader.write_features(&result.features, output.join("features.csv"))?;
            loader.write_scalar(&result.labels, output.join("labels.csv"))?;
            loader.write_scalar(&result.run.predictions, output.join("predictions.csv"))?;

            let integrity = result.validate(&prices, config.trainer.train_window);
            print_integrity(&integrity);

            let summary = result.report(&prices, &config);
            println!("\n{}", SEPARATOR);
            println!("Walk-forward run");
            println!("{}", SEPARATOR);
            println!("  Assets: {}", summary.assets);
            println!("  Price dates: {}", summary.price_dates);
            println!("  Features: {} rows {:?}", summary.features.rows, summary.feature_names);
            println!("  Labels: {} rows", summary.labels.rows);
            println!(
                "  Predictions: {} rows over {} steps",
                summary.predictions.rows, summary.steps
            );
            println!("  Training rows fitted: {}", summary.train_rows);
            if let (Some(first), Some(last)) =
                (summary.predictions.first_date, summary.predictions.last_date)
            {
                println!("  Test dates: {} to {}", first, last);
            }
            println!("  Elapsed: {:.1}s", start.elapsed().as_secs_f64());
            println!("{}", SEPARATOR);

            if let Some(path) = report {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let content = serde_json::to_string_pretty(&summary)?;
                fs::write(&path, content)
                    .with_context(|| format!("Failed to write report {}", path.display()))?;
                info!("Wrote run report to {}", path.display());
            }
        }
        Commands::Validate {
            prices,
            features,
            labels,
            predictions,
        } => {
            let prices = load_prices(&loader, &prices, &config)?;
            let features = loader.load_features(&features)?;
            let labels = loader.load_labels(&labels)?;
            let predictions = loader.load_predictions(&predictions)?;

            let integrity = PanelIntegrityValidator::new()
                .check_prices(&prices)
                .check_features(&features, &prices)
                .check_labels(&labels, &features)
                .check_predictions(&predictions, &labels)
                .finish();
            print_integrity(&integrity);

            if !integrity.all_passed() {
                bail!("{}", integrity.summary());
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Load prices for the configured universe and date range.
fn load_prices(loader: &DataLoader, path: &Path, config: &PipelineConfig) -> Result<PricePanel> {
    loader
        .load_price_universe(path, &config.universe, config.start_date, config.end_date)
        .with_context(|| format!("Failed to load prices from {}", path.display()))
}

fn print_integrity(report: &IntegrityReport) {
    println!("\n{}", SEPARATOR);
    println!("Integrity checks");
    println!("{}", SEPARATOR);
    for check in &report.checks {
        let status = if check.passed() { "PASS" } else { "FAIL" };
        println!("  [{}] {}", status, check);
    }
    println!("  {}", report.summary());
    if !report.all_passed() {
        warn!("{} integrity checks failed", report.failed().count());
    }
}
