pub mod config;
pub mod epoch_stats;
pub mod loop_fn;
pub mod metrics;
pub mod status;
pub mod trainer;

pub use config::{ExperimentConfig, Monitor, OptimizerKind};
pub use epoch_stats::EpochStats;
pub use loop_fn::{evaluate, run_epoch};
pub use metrics::{ConfusionMatrix, EvaluationReport};
pub use status::{read_status, RunState, StatusTracker, TrainingStatus};
pub use trainer::{CancelToken, TrainOutcome, Trainer};
