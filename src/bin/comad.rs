//! comad - neutral community model CLI
//!
//! Fits a neutral community model to a microbial abundance table and reports
//! the taxa that deviate from it.

use clap::{Args, Parser, Subcommand};
use comad::error::Result;
use comad::pipeline::{NeufitConfig, Pipeline, PipelineRun};
use comad::report::OutputPaths;
use std::path::{Path, PathBuf};

/// Neutral community model fitting for microbial abundance data
#[derive(Parser)]
#[command(name = "comad")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a feature table and fit the neutral model
    Full {
        /// Path to the feature table TSV (taxa x samples, optional taxonomy column)
        #[arg(short, long)]
        feature_table: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Fit the neutral model from pre-extracted data and taxonomy tables
    Neufit {
        /// Path to the abundance table TSV
        #[arg(short, long)]
        data: PathBuf,

        /// Path to the taxonomy table TSV
        #[arg(short, long)]
        taxonomy: Option<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Write an example configuration file
    Example {
        /// Output path for the YAML configuration
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Dataset nickname, used in every output file name
    #[arg(short, long)]
    name: String,

    /// Directory receiving a <name>/ folder with all outputs
    #[arg(short, long)]
    output_dir: PathBuf,

    /// Ignore taxa with at most this many reads in total
    #[arg(long, allow_negative_numbers = true)]
    ignore_level: Option<i64>,

    /// Reads per sample after rarefaction (0 = highest possible uniform depth)
    #[arg(long, allow_negative_numbers = true)]
    rarefaction_level: Option<i64>,

    /// Seed for reproducible rarefaction
    #[arg(long)]
    seed: Option<u64>,

    /// Minimum |observed - predicted| occurrence for the outlier table
    #[arg(long)]
    threshold: Option<f64>,

    /// YAML configuration; command-line options take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl RunArgs {
    fn pipeline(&self) -> Result<Pipeline> {
        let mut config = match &self.config {
            Some(path) => {
                eprintln!("Loading configuration from {:?}...", path);
                NeufitConfig::from_file(path)?
            }
            None => NeufitConfig::default(),
        };

        config.name = self.name.clone();
        if let Some(level) = self.ignore_level {
            config.ignore_level = level;
        }
        if let Some(level) = self.rarefaction_level {
            config.rarefaction_level = level;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(threshold) = self.threshold {
            config.outlier_threshold = threshold;
        }

        let pipeline = Pipeline::from_config(&config);
        pipeline.validate()?;
        Ok(pipeline)
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Full { feature_table, run } => cmd_full(&feature_table, &run),
        Commands::Neufit {
            data,
            taxonomy,
            run,
        } => cmd_neufit(&data, taxonomy.as_deref(), &run),
        Commands::Example { output } => cmd_example(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Ingest a feature table, then fit
fn cmd_full(feature_table: &Path, args: &RunArgs) -> Result<()> {
    let pipeline = args.pipeline()?;

    eprintln!("Loading feature table {:?}...", feature_table);
    let (run, paths) = pipeline.run_feature_table(feature_table, &args.output_dir)?;
    print_summary(&run, &paths);
    Ok(())
}

/// Fit from pre-extracted tables
fn cmd_neufit(data: &Path, taxonomy: Option<&Path>, args: &RunArgs) -> Result<()> {
    let pipeline = args.pipeline()?;

    eprintln!("Loading data from {:?}...", data);
    if let Some(path) = taxonomy {
        eprintln!("Loading taxonomy from {:?}...", path);
    }
    let (run, paths) = pipeline.run_files(data, taxonomy, &args.output_dir)?;
    print_summary(&run, &paths);
    Ok(())
}

fn print_summary(run: &PipelineRun, paths: &OutputPaths) {
    println!("{}", run.fit);
    println!("\n R^2 = {:.2}", run.fit.r_squared);
    println!("=========================================================");

    eprintln!(
        "Done! {} samples, {} taxa at {} reads per sample",
        run.n_samples,
        run.n_taxa,
        run.n_reads()
    );
    let counts = run.deviation_counts();
    eprintln!(
        "  {} non-neutral ({} above, {} below), {} outliers beyond {}",
        counts.non_neutral(),
        counts.above,
        counts.below,
        run.outliers.len(),
        run.outlier_threshold
    );
    eprintln!("Report written to {:?}", paths.report);
}

/// Generate example configuration
fn cmd_example(output_path: &Path) -> Result<()> {
    let config = Pipeline::new()
        .name("example")
        .ignore_level(0)
        .rarefaction_level(0)
        .seed(42)
        .to_config();
    let yaml = config.to_yaml()?;

    std::fs::write(output_path, &yaml)?;
    eprintln!("Wrote example configuration to {:?}", output_path);
    eprintln!();
    eprintln!("Contents:");
    println!("{}", yaml);

    Ok(())
}
