use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::train::config::Monitor;
use crate::train::epoch_stats::EpochStats;
use crate::util::{append_json_line, write_json_atomic, write_json_lines_atomic};

/// Lifecycle of a training run.
///
/// `Initializing → Running { epoch } → Completed | Failed | Stopped`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum RunState {
    Initializing,
    Running { epoch: usize },
    Completed,
    Failed,
    Stopped,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed | RunState::Stopped)
    }
}

/// Snapshot written to `logs/status.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingStatus {
    pub state: RunState,
    /// Last finished epoch, 0 before the first one.
    pub epoch: usize,
    pub total_epochs: usize,
    pub monitor: Monitor,
    pub best_metric: Option<f64>,
    pub history: Vec<EpochStats>,
    /// Undecodable images skipped over the whole run.
    pub skipped: usize,
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// The single writer of a run's status snapshot and metrics history.
///
/// Every update overwrites the snapshot atomically, so readers polling the file
/// never see a partial record. Epoch records are also appended, one JSON line
/// each, to the history file.
pub struct StatusTracker {
    status_path: PathBuf,
    metrics_path: PathBuf,
    status: TrainingStatus,
}

impl StatusTracker {
    pub fn new(status_path: PathBuf, metrics_path: PathBuf, total_epochs: usize, monitor: Monitor) -> StatusTracker {
        StatusTracker {
            status_path,
            metrics_path,
            status: TrainingStatus {
                state: RunState::Initializing,
                epoch: 0,
                total_epochs,
                monitor,
                best_metric: None,
                history: Vec::new(),
                skipped: 0,
                message: None,
                updated_at: Utc::now(),
            },
        }
    }

    pub fn status(&self) -> &TrainingStatus {
        &self.status
    }

    /// Starts from `history`, the epochs kept from an earlier run (empty for a
    /// fresh run). The history file is rewritten to match, so epochs that are
    /// about to run again never appear twice.
    pub fn restore(&mut self, history: Vec<EpochStats>, best_metric: Option<f64>) -> Result<()> {
        write_json_lines_atomic(&self.metrics_path, &history)?;
        self.status.epoch = history.last().map(|s| s.epoch).unwrap_or(0);
        self.status.skipped = history.iter().map(|s| s.skipped).sum();
        self.status.history = history;
        self.status.best_metric = best_metric;
        Ok(())
    }

    pub fn set_state(&mut self, state: RunState, message: Option<String>) -> Result<()> {
        self.status.state = state;
        self.status.message = message;
        self.flush()
    }

    /// Records one finished epoch: appends to the history file, then rewrites
    /// the snapshot.
    pub fn record_epoch(&mut self, stats: EpochStats, best_metric: Option<f64>) -> Result<()> {
        append_json_line(&self.metrics_path, &stats)?;
        self.status.epoch = stats.epoch;
        self.status.skipped += stats.skipped;
        self.status.best_metric = best_metric;
        self.status.history.push(stats);
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        self.status.updated_at = Utc::now();
        write_json_atomic(&self.status_path, &self.status, true)
    }
}

pub fn read_status(path: &Path) -> Result<TrainingStatus> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
