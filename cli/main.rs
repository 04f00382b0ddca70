#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::fs::{self, File};
use std::path::PathBuf;
use std::process;

use cuppa::config::{DEFAULT_EXCL_CHROMS, RunnerConfig};
use cuppa::cv::CvSource;
use cuppa::features::{FeaturesFormat, GenomeVersion};
use cuppa::{ClassifierGroup, PredictionRunner};

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Path to the trained classifier (TOML)
    #[arg(long, value_name = "PATH")]
    pub classifier_path: PathBuf,

    /// Feature file, or directory of per-family files with --using-old-features-format
    #[arg(long, value_name = "PATH")]
    pub features_path: PathBuf,

    /// Directory for the prediction outputs; created if absent
    #[arg(long, value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Sample to report on. Required when the features hold more than one sample
    #[arg(long)]
    pub sample_id: Option<String>,

    /// Gzip the tsv outputs
    #[arg(long)]
    pub compress_tsv_files: bool,

    /// Read features from a directory of per-family tables
    #[arg(long)]
    pub using_old_features_format: bool,

    /// Reference genome of the legacy feature files (37 or 38)
    #[arg(long, default_value_t = 37)]
    pub genome_version: u32,

    /// Chromosomes whose genomic position features are ignored
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_EXCL_CHROMS.map(String::from))]
    pub excl_chroms: Vec<String>,

    /// Precomputed cross-validation predictions for training samples
    #[arg(long, value_name = "PATH")]
    pub cv_predictions_path: Option<PathBuf>,

    /// Classifier outputs to keep: 'all' or 'dna'
    #[arg(long, default_value_t = ClassifierGroup::All)]
    pub clf_group: ClassifierGroup,

    /// Renderer invoked as `<command> <vis_data.tsv> <plot.png>`; plotting is skipped when unset
    #[arg(long)]
    pub plot_command: Option<String>,

    /// Write the log to <output_dir>/predict.log instead of stderr
    #[arg(long)]
    pub log_to_file: bool,

    /// Explicit log file path
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,
}

#[derive(Parser)]
#[command(name = "cuppa", version, about = "Cancer of unknown primary tissue-of-origin prediction")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict the tissue of origin of one or more samples
    Predict(PredictArgs),
}

impl PredictArgs {
    fn into_config(self) -> Result<RunnerConfig, Box<dyn std::error::Error>> {
        let mut config = RunnerConfig::new(self.classifier_path, self.features_path, self.output_dir);
        config.sample_id = self.sample_id;
        config.compress_tsv_files = self.compress_tsv_files;
        config.features_format = if self.using_old_features_format {
            FeaturesFormat::Legacy
        } else {
            FeaturesFormat::Current
        };
        config.genome_version = GenomeVersion::from_number(self.genome_version)?;
        config.excl_chroms = self.excl_chroms;
        config.cv_source = self.cv_predictions_path.map(CvSource::File);
        config.clf_group = self.clf_group;
        config.plot_command = self.plot_command;
        config.log_to_file = self.log_to_file;
        config.log_path = self.log_path;
        Ok(config)
    }
}

fn init_logging(config: &RunnerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(log_path) = config.resolved_log_path() {
        if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&log_path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.try_init()?;
    Ok(())
}

fn predict(args: PredictArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.into_config()?;
    init_logging(&config)?;
    let mut runner = PredictionRunner::new(config);
    runner.run()?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Predict(args)) => predict(args),
        None => {
            let _ = Cli::command().print_help();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
