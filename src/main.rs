//! `medimg` command-line interface.
//!
//! ```bash
//! medimg train --config experiment.json
//! medimg evaluate --config experiment.json --split test
//! medimg predict --config experiment.json exam.png
//! medimg compare before.png after.png
//! medimg report --config experiment.json --image exam.png --output-dir reports
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use medimg::dataset::{index_split, BatchLoader};
use medimg::inference::InferenceRunner;
use medimg::network::Classifier;
use medimg::report::{write_reports, ReportOptions};
use medimg::train::{evaluate, ExperimentConfig, RunState, Trainer};

#[derive(Parser)]
#[command(name = "medimg")]
#[command(about = "Train, run and compare medical exam image classifiers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Split {
    Val,
    Test,
}

#[derive(Subcommand)]
enum Command {
    /// Train a classifier as described by a config file
    Train {
        /// Path to the JSON experiment config
        #[arg(short, long)]
        config: PathBuf,

        /// Continue from the latest checkpoint under the output directory
        #[arg(long)]
        resume: bool,
    },
    /// Evaluate a checkpoint on a labeled split
    Evaluate {
        #[arg(short, long)]
        config: PathBuf,

        /// Checkpoint to evaluate (default: best checkpoint of the run)
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "val")]
        split: Split,
    },
    /// Print per-class probabilities for one or more images
    Predict {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(long)]
        checkpoint: Option<PathBuf>,

        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Structural comparison of two exams
    Compare {
        /// Reference exam; its size is kept
        reference: PathBuf,
        /// Exam compared against the reference
        target: PathBuf,
    },
    /// Write clinician and patient reports for one image
    Report {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(long)]
        checkpoint: Option<PathBuf>,

        #[arg(long)]
        image: PathBuf,

        #[arg(long, default_value = "reports")]
        output_dir: PathBuf,

        /// Class whose probability drives the risk level
        #[arg(long, default_value = "lesao")]
        lesion_class: String,

        /// Lesion probability from which risk is high
        #[arg(long, default_value_t = 0.7)]
        high_risk_threshold: f64,
    },
}

fn main() -> anyhow::Result<()> {
    medimg::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Train { config, resume } => {
            let mut config = load_config(&config)?;
            config.train.resume |= resume;
            let outcome = Trainer::new(config).run().context("training failed")?;
            match outcome.state {
                RunState::Completed => info!(
                    "Completed after epoch {}; best metric {:?} at epoch {:?}",
                    outcome.last_epoch, outcome.best_metric, outcome.best_epoch
                ),
                other => info!("Run ended in state {:?}: {:?}", other, outcome.message),
            }
            if let Some(msg) = outcome.message {
                println!("{}", msg);
            }
            if let Some(report) = outcome.test_report {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        Command::Evaluate {
            config,
            checkpoint,
            split,
        } => {
            let config = load_config(&config)?;
            let checkpoint = checkpoint.unwrap_or_else(|| config.best_checkpoint_path());
            let (model, _) = Classifier::load(&checkpoint, &config.classes)
                .with_context(|| format!("cannot load {}", checkpoint.display()))?;
            let (name, root) = match split {
                Split::Val => ("val", config.paths.val.clone()),
                Split::Test => match &config.paths.test {
                    Some(root) => ("test", root.clone()),
                    None => bail!("config has no paths.test"),
                },
            };
            let index = index_split(&root, &config.classes)?;
            let loader = BatchLoader::new(index.entries, config.pipeline()?, config.train.batch_size)
                .with_prefetch(config.train.prefetch_batches);
            let report = evaluate(&model, &loader, &config.classes, name)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Predict {
            config,
            checkpoint,
            images,
        } => {
            let config = load_config(&config)?;
            let runner = load_runner(&config, checkpoint)?;
            for image in images {
                let prediction = runner
                    .infer_path(&image)
                    .with_context(|| format!("cannot classify {}", image.display()))?;
                let line = serde_json::json!({
                    "image": image,
                    "probabilities": prediction,
                    "top": prediction.top().0,
                });
                println!("{}", line);
            }
        }
        Command::Compare { reference, target } => {
            let result = medimg::compare_paths(&reference, &target)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Report {
            config,
            checkpoint,
            image,
            output_dir,
            lesion_class,
            high_risk_threshold,
        } => {
            let config = load_config(&config)?;
            let runner = load_runner(&config, checkpoint)?;
            let prediction = runner.infer_path(&image)?;
            let options = ReportOptions {
                lesion_class,
                high_risk_threshold,
            };
            let (clinician, patient) = write_reports(&output_dir, &prediction, &options)?;
            for (name, p) in prediction.iter() {
                println!("  {}: {:.4}", name, p);
            }
            println!("Reports written: {} and {}", clinician.display(), patient.display());
        }
    }
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<ExperimentConfig> {
    ExperimentConfig::load_json(path).with_context(|| format!("loading config {}", path.display()))
}

fn load_runner(config: &ExperimentConfig, checkpoint: Option<PathBuf>) -> anyhow::Result<InferenceRunner> {
    let checkpoint = checkpoint.unwrap_or_else(|| config.best_checkpoint_path());
    InferenceRunner::load(&checkpoint, config)
        .with_context(|| format!("cannot load checkpoint {}", checkpoint.display()))
}
