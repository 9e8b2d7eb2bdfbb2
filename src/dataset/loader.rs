use std::panic;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{error, warn};

use crate::dataset::indexer::DatasetEntry;
use crate::math::tensor::Tensor;
use crate::transform::augment::Augmentation;
use crate::transform::pipeline::{decode_file, Pipeline};

/// One mini-batch of decoded, preprocessed examples.
#[derive(Debug, Clone)]
pub struct Batch {
    pub inputs: Vec<Tensor>,
    pub labels: Vec<usize>,
    /// Entries of this batch that failed to decode and were left out.
    pub skipped: Vec<PathBuf>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Turns indexed entries into batches, one epoch at a time.
///
/// Batch order is a pure function of `(seed, epoch)`: a single producer loads
/// batches in order, so background prefetching never reorders anything.
/// Unreadable images are logged and dropped from their batch.
#[derive(Debug, Clone)]
pub struct BatchLoader {
    entries: Arc<Vec<DatasetEntry>>,
    pipeline: Pipeline,
    augmentation: Option<Augmentation>,
    batch_size: usize,
    shuffle: bool,
    seed: Option<u64>,
    prefetch: usize,
}

impl BatchLoader {
    pub fn new(entries: Vec<DatasetEntry>, pipeline: Pipeline, batch_size: usize) -> BatchLoader {
        BatchLoader {
            entries: Arc::new(entries),
            pipeline,
            augmentation: None,
            batch_size: batch_size.max(1),
            shuffle: false,
            seed: None,
            prefetch: 0,
        }
    }

    /// Re-shuffles every epoch. With a seed the permutation for epoch `e` is
    /// always the same.
    pub fn shuffled(mut self, seed: Option<u64>) -> Self {
        self.shuffle = true;
        self.seed = seed;
        self
    }

    pub fn with_augmentation(mut self, augmentation: Option<Augmentation>) -> Self {
        self.augmentation = augmentation.filter(|a| !a.is_noop());
        self
    }

    /// Number of batches decoded ahead on a background thread; 0 loads inline.
    pub fn with_prefetch(mut self, batches: usize) -> Self {
        self.prefetch = batches;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        (self.entries.len() + self.batch_size - 1) / self.batch_size
    }

    fn job(&self, epoch: usize) -> BatchJob {
        let mut rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed.wrapping_add(epoch as u64)),
            None => ChaCha8Rng::from_entropy(),
        };
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        if self.shuffle {
            order.shuffle(&mut rng);
        }
        BatchJob {
            entries: Arc::clone(&self.entries),
            order,
            pipeline: self.pipeline.clone(),
            augmentation: self.augmentation.clone(),
            rng,
            batch_size: self.batch_size,
        }
    }

    /// Batches for one epoch (1-based `epoch`).
    pub fn epoch(&self, epoch: usize) -> EpochBatches {
        if self.prefetch == 0 {
            return EpochBatches {
                inner: Inner::Inline { job: self.job(epoch), next: 0 },
            };
        }

        let mut job = self.job(epoch);
        let (tx, rx) = mpsc::sync_channel::<Batch>(self.prefetch);
        let spawned = thread::Builder::new()
            .name(format!("prefetch-epoch-{}", epoch))
            .spawn(move || {
                for b in 0..job.num_batches() {
                    // Receiver dropped: the consumer stopped early.
                    if tx.send(job.batch(b)).is_err() {
                        break;
                    }
                }
            });

        match spawned {
            Ok(worker) => EpochBatches {
                inner: Inner::Prefetched {
                    rx,
                    worker: Some(worker),
                },
            },
            Err(e) => {
                warn!("Cannot spawn prefetch thread ({}); loading inline", e);
                EpochBatches {
                    inner: Inner::Inline { job: self.job(epoch), next: 0 },
                }
            }
        }
    }
}

struct BatchJob {
    entries: Arc<Vec<DatasetEntry>>,
    order: Vec<usize>,
    pipeline: Pipeline,
    augmentation: Option<Augmentation>,
    rng: ChaCha8Rng,
    batch_size: usize,
}

impl BatchJob {
    fn num_batches(&self) -> usize {
        (self.order.len() + self.batch_size - 1) / self.batch_size
    }

    fn batch(&mut self, b: usize) -> Batch {
        let start = b * self.batch_size;
        let end = (start + self.batch_size).min(self.order.len());
        let mut batch = Batch {
            inputs: Vec::with_capacity(end - start),
            labels: Vec::with_capacity(end - start),
            skipped: Vec::new(),
        };

        for &idx in &self.order[start..end] {
            let entry = &self.entries[idx];
            match decode_file(&entry.path) {
                Ok(img) => {
                    let tensor = match &self.augmentation {
                        Some(aug) => self.pipeline.apply(&aug.apply(&img, &mut self.rng)),
                        None => self.pipeline.apply(&img),
                    };
                    batch.inputs.push(tensor);
                    batch.labels.push(entry.label);
                }
                Err(e) => {
                    warn!("Skipping unreadable image: {}", e);
                    batch.skipped.push(entry.path.clone());
                }
            }
        }
        batch
    }
}

enum Inner {
    Inline { job: BatchJob, next: usize },
    Prefetched {
        rx: mpsc::Receiver<Batch>,
        worker: Option<JoinHandle<()>>,
    },
}

/// Iterator over one epoch's batches.
pub struct EpochBatches {
    inner: Inner,
}

impl Iterator for EpochBatches {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        match &mut self.inner {
            Inner::Inline { job, next } => {
                if *next >= job.num_batches() {
                    return None;
                }
                let batch = job.batch(*next);
                *next += 1;
                Some(batch)
            }
            Inner::Prefetched { rx, worker } => match rx.recv() {
                Ok(batch) => Some(batch),
                Err(_) => {
                    // Re-raise a worker panic, as inline loading would.
                    if let Some(handle) = worker.take() {
                        if let Err(payload) = handle.join() {
                            error!("Prefetch thread panicked");
                            panic::resume_unwind(payload);
                        }
                    }
                    None
                }
            },
        }
    }
}
