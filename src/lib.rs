pub mod activation;
pub mod compare;
pub mod dataset;
pub mod error;
pub mod inference;
pub mod layers;
pub mod loss;
pub mod math;
pub mod network;
pub mod optim;
pub mod report;
pub mod train;
pub mod transform;
pub mod util;

// Convenience re-exports
pub use compare::{compare, compare_paths, ComparisonResult};
pub use dataset::{index_split, BatchLoader, ClassSchema, DatasetEntry, DatasetIndex};
pub use error::{Error, Result};
pub use inference::{infer, InferenceRunner, Prediction};
pub use network::{ArchitectureSpec, CheckpointMeta, Classifier};
pub use report::{ReportOptions, RiskLevel};
pub use train::{CancelToken, ExperimentConfig, Monitor, RunState, TrainOutcome, Trainer, TrainingStatus};
pub use transform::{Augmentation, Pipeline, PreprocessSpec};

/// Installs a `tracing` subscriber filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
