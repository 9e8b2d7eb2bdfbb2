use serde::{Deserialize, Serialize};

/// Per-epoch statistics, appended to the metrics history and embedded in the
/// status file.
///
/// When a progress channel is attached to the trainer, one `EpochStats` is sent
/// at the end of every completed epoch as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Total epochs requested for this run.
    pub total_epochs: usize,
    /// Mean training loss over every example seen this epoch.
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    /// Learning rate in effect during this epoch.
    pub learning_rate: f64,
    /// Images that failed to decode this epoch (train and val).
    pub skipped: usize,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
    /// Whether the monitored metric improved, i.e. "best" was saved.
    pub improved: bool,
}
