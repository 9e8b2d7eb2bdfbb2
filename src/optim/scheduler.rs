use tracing::info;

use crate::optim::Optimizer;
use crate::train::config::Monitor;

/// Multiplies the learning rate by `factor` after `patience` epochs in a row
/// without improvement of the monitored metric, never going below `min_lr`.
#[derive(Debug, Clone)]
pub struct ReduceOnPlateau {
    pub monitor: Monitor,
    pub factor: f64,
    pub patience: usize,
    pub min_lr: f64,
    best: Option<f64>,
    bad_epochs: usize,
}

impl ReduceOnPlateau {
    pub fn new(monitor: Monitor, factor: f64, patience: usize, min_lr: f64) -> ReduceOnPlateau {
        ReduceOnPlateau {
            monitor,
            factor,
            patience,
            min_lr,
            best: None,
            bad_epochs: 0,
        }
    }

    /// Seeds the best value, e.g. when resuming from a checkpoint.
    pub fn with_best(mut self, best: Option<f64>) -> ReduceOnPlateau {
        self.best = best;
        self
    }

    /// Call once per epoch. Returns the new learning rate when it was reduced.
    pub fn step(&mut self, metric: f64, optimizer: &mut dyn Optimizer) -> Option<f64> {
        if self.monitor.improved(metric, self.best) {
            self.best = Some(metric);
            self.bad_epochs = 0;
            return None;
        }
        self.bad_epochs += 1;
        if self.bad_epochs < self.patience {
            return None;
        }
        self.bad_epochs = 0;
        let current = optimizer.learning_rate();
        let reduced = (current * self.factor).max(self.min_lr);
        if reduced >= current {
            return None;
        }
        optimizer.set_learning_rate(reduced);
        info!("Reducing learning rate from {:e} to {:e}", current, reduced);
        Some(reduced)
    }
}
