use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::info;

use crate::dataset::schema::ClassSchema;
use crate::error::{Error, Result};
use crate::inference::prediction::Prediction;
use crate::math::tensor::Tensor;
use crate::network::checkpoint::CheckpointMeta;
use crate::network::classifier::Classifier;
use crate::train::config::ExperimentConfig;
use crate::transform::pipeline::{decode_bytes, Pipeline, PreprocessSpec};

/// A checkpoint loaded once and reused for many predictions.
///
/// All prediction methods take `&self` and the runner is `Send + Sync`, so the
/// service shares one behind an `Arc`.
#[derive(Debug)]
pub struct InferenceRunner {
    model: Classifier,
    pipeline: Pipeline,
    meta: Option<CheckpointMeta>,
    source: Option<PathBuf>,
}

impl InferenceRunner {
    /// Loads `checkpoint` for the classes and preprocessing of `config`.
    pub fn load(checkpoint: &Path, config: &ExperimentConfig) -> Result<InferenceRunner> {
        InferenceRunner::load_with(checkpoint, &config.classes, config.preprocess_spec())
    }

    /// Refuses checkpoints trained for a different schema or with different
    /// preprocessing.
    pub fn load_with(
        checkpoint: &Path,
        schema: &ClassSchema,
        preprocess: PreprocessSpec,
    ) -> Result<InferenceRunner> {
        let (model, meta) = Classifier::load(checkpoint, schema)?;
        if meta.preprocess != preprocess {
            return Err(Error::config(format!(
                "checkpoint {} was trained with preprocessing {:?}, configured {:?}",
                checkpoint.display(),
                meta.preprocess,
                preprocess
            )));
        }
        let pipeline = Pipeline::new(preprocess)?;
        info!(
            "Inference runner ready: {} (epoch {}, classes {})",
            checkpoint.display(),
            meta.epoch,
            model.schema
        );
        Ok(InferenceRunner {
            model,
            pipeline,
            meta: Some(meta),
            source: Some(checkpoint.to_path_buf()),
        })
    }

    /// Wraps an in-memory model.
    pub fn from_model(model: Classifier, pipeline: Pipeline) -> InferenceRunner {
        InferenceRunner {
            model,
            pipeline,
            meta: None,
            source: None,
        }
    }

    pub fn schema(&self) -> &ClassSchema {
        &self.model.schema
    }

    pub fn meta(&self) -> Option<&CheckpointMeta> {
        self.meta.as_ref()
    }

    pub fn checkpoint_path(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn infer_tensor(&self, input: &Tensor) -> Result<Prediction> {
        let logits = self.model.logits(input);
        Prediction::from_logits(&self.model.schema, &logits)
    }

    pub fn infer(&self, image: &DynamicImage) -> Result<Prediction> {
        self.infer_tensor(&self.pipeline.apply(image))
    }

    pub fn infer_path(&self, path: &Path) -> Result<Prediction> {
        self.infer_tensor(&self.pipeline.load(path)?)
    }

    pub fn infer_bytes(&self, bytes: &[u8]) -> Result<Prediction> {
        self.infer(&decode_bytes(bytes)?)
    }
}

/// One-shot inference: load `checkpoint`, classify the image at `image`.
pub fn infer(image: &Path, checkpoint: &Path, config: &ExperimentConfig) -> Result<Prediction> {
    InferenceRunner::load(checkpoint, config)?.infer_path(image)
}
