use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{error, info, warn};

use crate::dataset::indexer::{index_split, DatasetIndex};
use crate::dataset::loader::BatchLoader;
use crate::dataset::schema::ClassSchema;
use crate::error::{Error, Result};
use crate::network::checkpoint::{read_meta, CheckpointMeta};
use crate::network::classifier::Classifier;
use crate::optim::{AdamW, Optimizer, ReduceOnPlateau, Sgd};
use crate::train::config::{ExperimentConfig, OptimizerKind};
use crate::train::epoch_stats::EpochStats;
use crate::train::loop_fn::{evaluate, run_epoch};
use crate::train::metrics::EvaluationReport;
use crate::train::status::{read_status, RunState, StatusTracker, TrainingStatus};
use crate::util::write_json_atomic;

/// Cooperative cancellation flag, polled by the trainer at epoch boundaries.
///
/// Clones share the same flag, so one can be handed to a signal handler or
/// another thread while the trainer keeps its own.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What a finished (not failed) run produced.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    /// `Completed` or `Stopped`.
    pub state: RunState,
    /// Last epoch that ran to completion, 0 if none did.
    pub last_epoch: usize,
    pub best_metric: Option<f64>,
    pub best_epoch: Option<usize>,
    pub history: Vec<EpochStats>,
    pub message: Option<String>,
    /// Evaluation of the best checkpoint on the test split, when one is configured.
    pub test_report: Option<EvaluationReport>,
}

/// Drives one training run through
/// `Initializing → Running(epoch) → Completed | Failed | Stopped`,
/// keeping the status file current at every transition.
pub struct Trainer {
    config: ExperimentConfig,
    cancel: CancelToken,
    progress_tx: Option<mpsc::Sender<EpochStats>>,
}

struct Resumed {
    model: Classifier,
    meta: CheckpointMeta,
}

impl Trainer {
    pub fn new(config: ExperimentConfig) -> Trainer {
        Trainer {
            config,
            cancel: CancelToken::new(),
            progress_tx: None,
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Trainer {
        self.cancel = token;
        self
    }

    /// Sends one [`EpochStats`] per finished epoch. If the receiver is dropped
    /// the run stops at the next epoch boundary.
    pub fn with_progress(mut self, tx: mpsc::Sender<EpochStats>) -> Trainer {
        self.progress_tx = Some(tx);
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Runs to completion, cancellation, or failure.
    ///
    /// On failure the status file is moved to `Failed` with the error message
    /// and the error is returned; checkpoints already written stay on disk.
    pub fn run(&self) -> Result<TrainOutcome> {
        let config = &self.config;
        let prior = if config.train.resume {
            read_status(&config.status_path()).ok()
        } else {
            None
        };

        let mut tracker = StatusTracker::new(
            config.status_path(),
            config.metrics_path(),
            config.train.epochs,
            config.checkpoint.monitor,
        );
        tracker.set_state(RunState::Initializing, None)?;

        match self.run_inner(&mut tracker, prior) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!("Training failed: {}", e);
                if let Err(status_err) = tracker.set_state(RunState::Failed, Some(e.to_string())) {
                    warn!("Cannot record failed status: {}", status_err);
                }
                Err(e)
            }
        }
    }

    fn run_inner(&self, tracker: &mut StatusTracker, prior: Option<TrainingStatus>) -> Result<TrainOutcome> {
        let config = &self.config;
        config.validate()?;
        let schema = &config.classes;
        let monitor = config.checkpoint.monitor;
        let total_epochs = config.train.epochs;

        let train_index = index_split(&config.paths.train, schema)?;
        if !train_index.missing_classes.is_empty() {
            return Err(Error::config(format!(
                "training split {} has no directory for classes {:?}",
                config.paths.train.display(),
                train_index.missing_classes
            )));
        }
        warn_empty_classes(&train_index, schema, "train");
        let val_index = index_split(&config.paths.val, schema)?;
        if !val_index.missing_classes.is_empty() {
            warn!(
                "Validation split {} has no directory for classes {:?}",
                config.paths.val.display(),
                val_index.missing_classes
            );
        }

        let pipeline = config.pipeline()?;
        let prefetch = config.train.prefetch_batches;
        let train_loader = BatchLoader::new(train_index.entries, pipeline.clone(), config.train.batch_size)
            .shuffled(config.train.seed)
            .with_augmentation(config.augmentation())
            .with_prefetch(prefetch);
        let val_loader =
            BatchLoader::new(val_index.entries, pipeline, config.train.batch_size).with_prefetch(prefetch);

        let resumed = if config.train.resume {
            self.restore(schema)?
        } else {
            None
        };

        let (mut model, start_epoch, mut best_metric) = match resumed {
            Some(Resumed { model, meta }) => {
                info!("Resuming after epoch {} (best {} = {:.6})", meta.epoch, monitor, meta.best_metric);
                (model, meta.epoch + 1, Some(meta.best_metric))
            }
            None => {
                let mut rng = match config.train.seed {
                    Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                    None => ChaCha8Rng::from_entropy(),
                };
                let model = Classifier::new(config.model.clone(), schema.clone(), &mut rng)?;
                (model, 1, None)
            }
        };

        let mut history: Vec<EpochStats> = prior
            .map(|s| s.history)
            .unwrap_or_default()
            .into_iter()
            .filter(|s| s.epoch < start_epoch)
            .collect();
        tracker.restore(history.clone(), best_metric)?;
        let mut best_epoch = if start_epoch > 1 {
            read_meta(&config.best_checkpoint_path()).ok().map(|m| m.epoch)
        } else {
            None
        };

        let mut optimizer: Box<dyn Optimizer> = match config.train.optimizer {
            OptimizerKind::Sgd => Box::new(
                Sgd::new(config.train.learning_rate)
                    .with_momentum(config.train.momentum)
                    .with_weight_decay(config.train.weight_decay),
            ),
            OptimizerKind::Adamw => Box::new(AdamW::new(config.train.learning_rate, config.train.weight_decay)),
        };
        if let Some(last) = history.last() {
            optimizer.set_learning_rate(last.learning_rate);
        }
        let mut scheduler = ReduceOnPlateau::new(
            monitor,
            config.train.lr_factor,
            config.train.lr_patience,
            config.train.min_lr,
        )
        .with_best(best_metric);
        let mut stale_epochs = history.iter().rev().take_while(|s| !s.improved).count();

        info!(
            "Training {} parameters on {} images ({} val), {} classes {}",
            model.param_count(),
            train_loader.len(),
            val_loader.len(),
            schema.len(),
            schema
        );

        let mut message = None;
        for epoch in start_epoch..=total_epochs {
            if self.cancel.is_cancelled() {
                let msg = format!("cancelled before epoch {}", epoch);
                info!("Training {}", msg);
                tracker.set_state(RunState::Stopped, Some(msg.clone()))?;
                return Ok(TrainOutcome {
                    state: RunState::Stopped,
                    last_epoch: epoch - 1,
                    best_metric,
                    best_epoch,
                    history,
                    message: Some(msg),
                    test_report: None,
                });
            }
            tracker.set_state(RunState::Running { epoch }, None)?;

            let started = Instant::now();
            let learning_rate = optimizer.learning_rate();
            let train = run_epoch(&mut model, &train_loader, epoch, optimizer.as_mut())?;
            let val = evaluate(&model, &val_loader, schema, "val")?;

            let metric = monitor.select(val.loss, val.accuracy);
            let improved = monitor.improved(metric, best_metric);
            if improved {
                best_metric = Some(metric);
                best_epoch = Some(epoch);
            }
            let meta = CheckpointMeta::new(
                epoch,
                monitor,
                metric,
                val.loss,
                val.accuracy,
                best_metric.unwrap_or(metric),
                config.preprocess_spec(),
            );
            if improved {
                model.save(&config.best_checkpoint_path(), &meta)?;
            }
            if config.checkpoint.save_latest {
                model.save(&config.latest_checkpoint_path(), &meta)?;
            }

            let stats = EpochStats {
                epoch,
                total_epochs,
                train_loss: train.loss,
                train_accuracy: train.accuracy,
                val_loss: val.loss,
                val_accuracy: val.accuracy,
                learning_rate,
                skipped: train.skipped + val.skipped,
                elapsed_ms: started.elapsed().as_millis() as u64,
                improved,
            };
            info!(
                "Epoch {}/{}: train_loss={:.4} train_acc={:.3} val_loss={:.4} val_acc={:.3} lr={:e}{}",
                epoch,
                total_epochs,
                stats.train_loss,
                stats.train_accuracy,
                stats.val_loss,
                stats.val_accuracy,
                learning_rate,
                if improved { " *" } else { "" }
            );
            tracker.record_epoch(stats.clone(), best_metric)?;
            if let Some(tx) = &self.progress_tx {
                if tx.send(stats.clone()).is_err() {
                    info!("Progress receiver dropped; stopping at next epoch boundary");
                    self.cancel.cancel();
                }
            }
            history.push(stats);

            scheduler.step(metric, optimizer.as_mut());

            stale_epochs = if improved { 0 } else { stale_epochs + 1 };
            let patience = config.train.patience;
            if patience > 0 && stale_epochs >= patience && epoch < total_epochs {
                let msg = format!(
                    "early stopping after epoch {}: no {} improvement in {} epochs",
                    epoch, monitor, patience
                );
                info!("{}", msg);
                message = Some(msg);
                break;
            }
        }

        let last_epoch = history.last().map(|s| s.epoch).unwrap_or(0);
        tracker.set_state(RunState::Completed, message.clone())?;
        info!(
            "Training completed after epoch {} (best {} = {:?} at epoch {:?})",
            last_epoch, monitor, best_metric, best_epoch
        );

        let test_report = match self.evaluate_test_split(schema) {
            Ok(report) => report,
            Err(e) => {
                warn!("Test split evaluation failed: {}", e);
                None
            }
        };

        Ok(TrainOutcome {
            state: RunState::Completed,
            last_epoch,
            best_metric,
            best_epoch,
            history,
            message,
            test_report,
        })
    }

    /// Loads "latest", falling back to "best" when "latest" is unreadable.
    /// `None` means there is nothing to resume from.
    fn restore(&self, schema: &ClassSchema) -> Result<Option<Resumed>> {
        let config = &self.config;
        let latest = config.latest_checkpoint_path();
        let best = config.best_checkpoint_path();

        let loaded = match Classifier::load(&latest, schema) {
            Ok(found) => Some(found),
            Err(Error::CheckpointNotFound(_)) => None,
            Err(e @ Error::CheckpointIo { .. }) => {
                warn!("Cannot resume from latest checkpoint ({}); falling back to best", e);
                None
            }
            Err(e) => return Err(e),
        };
        let loaded = match loaded {
            Some(found) => found,
            None => match Classifier::load(&best, schema) {
                Ok(found) => found,
                Err(Error::CheckpointNotFound(_)) => {
                    info!("No checkpoint under {:?}; starting fresh", config.checkpoints_dir());
                    return Ok(None);
                }
                Err(e) => return Err(e),
            },
        };

        let (model, meta) = loaded;
        if meta.preprocess != config.preprocess_spec() {
            return Err(Error::config(
                "checkpoint was trained with different preprocessing than configured",
            ));
        }
        if model.architecture != config.model {
            return Err(Error::config(
                "checkpoint architecture differs from the configured model",
            ));
        }
        Ok(Some(Resumed { model, meta }))
    }

    fn evaluate_test_split(&self, schema: &ClassSchema) -> Result<Option<EvaluationReport>> {
        let config = &self.config;
        let test_root = match &config.paths.test {
            Some(root) if root.is_dir() => root,
            Some(root) => {
                warn!("Test split {} does not exist; skipping", root.display());
                return Ok(None);
            }
            None => return Ok(None),
        };

        let (model, _) = Classifier::load(&config.best_checkpoint_path(), schema)?;
        let index = index_split(test_root, schema)?;
        let loader = BatchLoader::new(index.entries, config.pipeline()?, config.train.batch_size)
            .with_prefetch(config.train.prefetch_batches);
        let report = evaluate(&model, &loader, schema, "test")?;
        write_json_atomic(&config.test_metrics_path(), &report, true)?;
        info!(
            "Test split: loss={:.4} accuracy={:.3} over {} images",
            report.loss, report.accuracy, report.examples
        );
        Ok(Some(report))
    }
}

fn warn_empty_classes(index: &DatasetIndex, schema: &ClassSchema, split: &str) {
    for (i, name) in schema.iter() {
        if index.class_counts[i] == 0 && !index.missing_classes.iter().any(|m| m == name) {
            warn!("Class '{}' has no images in the {} split", name, split);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
