use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::activation::activation::ActivationFunction;
use crate::dataset::schema::ClassSchema;
use crate::error::{Error, Result};
use crate::layers::dense::Layer;
use crate::math::tensor::Tensor;
use crate::network::backbone::{Backbone, BackboneTrace};
use crate::network::checkpoint::{Checkpoint, CheckpointMeta};
use crate::network::spec::ArchitectureSpec;

/// Convolutional backbone plus a linear head with one output per class.
///
/// Inference methods take `&self`, so a loaded classifier can be shared
/// between threads. Training uses [`Classifier::forward_train`] and
/// [`Classifier::backward`], which keep intermediate values outside the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classifier {
    pub architecture: ArchitectureSpec,
    pub schema: ClassSchema,
    pub backbone: Backbone,
    pub head: Layer,
}

/// Forward-pass intermediates for one example.
#[derive(Debug)]
pub struct Trace {
    backbone: BackboneTrace,
    features: Vec<f64>,
    logits: Vec<f64>,
}

/// Gradient buffers laid out like [`Classifier::parameters_mut`].
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub buffers: Vec<Vec<f64>>,
}

impl Gradients {
    pub fn scale(&mut self, factor: f64) {
        for buf in &mut self.buffers {
            buf.iter_mut().for_each(|g| *g *= factor);
        }
    }

    pub fn is_finite(&self) -> bool {
        self.buffers.iter().flatten().all(|g| g.is_finite())
    }
}

impl Classifier {
    pub fn new<R: Rng + ?Sized>(
        architecture: ArchitectureSpec,
        schema: ClassSchema,
        rng: &mut R,
    ) -> Result<Classifier> {
        architecture.validate()?;
        let backbone = Backbone::new(&architecture, rng);
        let head = Layer::new(
            schema.len(),
            architecture.feature_size(),
            ActivationFunction::Identity,
            rng,
        );
        Ok(Classifier {
            architecture,
            schema,
            backbone,
            head,
        })
    }

    /// Replaces the head with a freshly initialized one sized for `schema`,
    /// keeping the backbone.
    pub fn with_head_for<R: Rng + ?Sized>(mut self, schema: ClassSchema, rng: &mut R) -> Classifier {
        self.head = Layer::new(
            schema.len(),
            self.architecture.feature_size(),
            ActivationFunction::Identity,
            rng,
        );
        self.schema = schema;
        self
    }

    pub fn num_classes(&self) -> usize {
        self.schema.len()
    }

    /// Logits for a single example.
    pub fn logits(&self, input: &Tensor) -> Vec<f64> {
        let features = self.backbone.features(input);
        self.head.feed_from(&features).1
    }

    /// Logits for a batch; output `i` belongs to input `i`.
    pub fn forward(&self, batch: &[Tensor]) -> Vec<Vec<f64>> {
        batch.iter().map(|x| self.logits(x)).collect()
    }

    pub fn forward_train(&self, input: &Tensor) -> (Vec<f64>, Trace) {
        let (features, backbone) = self.backbone.features_with_trace(input);
        let (logits, _) = self.head.feed_from(&features);
        (
            logits.clone(),
            Trace {
                backbone,
                features,
                logits,
            },
        )
    }

    /// Accumulates ∂L/∂θ into `grads` given ∂L/∂logits for one example.
    pub fn backward(&self, trace: &Trace, d_logits: &[f64], grads: &mut Gradients) {
        let n = grads.buffers.len();
        let (body, head) = grads.buffers.split_at_mut(n - 2);
        let (hw, hb) = head.split_at_mut(1);
        let d_features = self
            .head
            .backward(&trace.features, &trace.logits, d_logits, &mut hw[0], &mut hb[0]);
        self.backbone.backward(&trace.backbone, &d_features, body);
    }

    /// Parameters in a fixed order: each block's weights then biases, then the
    /// head's weights and biases. Optimizer state is indexed by this order.
    pub fn parameters_mut(&mut self) -> Vec<&mut Vec<f64>> {
        let mut params = Vec::with_capacity(2 * self.backbone.blocks.len() + 2);
        for block in &mut self.backbone.blocks {
            params.push(&mut block.conv.weights);
            params.push(&mut block.conv.biases);
        }
        params.push(&mut self.head.weights.data);
        params.push(&mut self.head.biases);
        params
    }

    pub fn zero_gradients(&self) -> Gradients {
        let mut buffers = Vec::with_capacity(2 * self.backbone.blocks.len() + 2);
        for block in &self.backbone.blocks {
            buffers.push(vec![0.0; block.conv.weights.len()]);
            buffers.push(vec![0.0; block.conv.biases.len()]);
        }
        buffers.push(vec![0.0; self.head.weights.data.len()]);
        buffers.push(vec![0.0; self.head.biases.len()]);
        Gradients { buffers }
    }

    pub fn param_count(&self) -> usize {
        self.backbone.param_count() + self.head.param_count()
    }

    /// Checks that the parameter buffers agree with the stored architecture
    /// and schema. A checkpoint that fails this is treated as corrupt.
    pub fn check_consistency(&self) -> std::result::Result<(), String> {
        let spec = &self.architecture;
        spec.validate().map_err(|e| e.to_string())?;
        if self.backbone.blocks.len() != spec.conv_channels.len() {
            return Err(format!(
                "expected {} convolution blocks, found {}",
                spec.conv_channels.len(),
                self.backbone.blocks.len()
            ));
        }
        let mut in_channels = spec.input_channels;
        for (i, (block, &out)) in self.backbone.blocks.iter().zip(&spec.conv_channels).enumerate() {
            let conv = &block.conv;
            if conv.in_channels != in_channels
                || conv.out_channels != out
                || conv.kernel != spec.kernel
                || conv.weights.len() != out * in_channels * spec.kernel * spec.kernel
                || conv.biases.len() != out
            {
                return Err(format!("block {} has inconsistent parameter shapes", i));
            }
            in_channels = out;
        }
        let head = &self.head;
        if head.input_size != spec.feature_size()
            || head.size != self.schema.len()
            || head.weights.rows != head.input_size
            || head.weights.cols != head.size
            || head.weights.data.len() != head.input_size * head.size
            || head.biases.len() != head.size
        {
            return Err("classification head has inconsistent parameter shapes".into());
        }
        Ok(())
    }

    /// Writes this model plus `meta` to `path` atomically.
    pub fn save(&self, path: &Path, meta: &CheckpointMeta) -> Result<()> {
        Checkpoint::write(path, meta, self)?;
        info!(
            "Checkpoint saved to {:?} (epoch {}, {} = {:.6})",
            path, meta.epoch, meta.monitor, meta.metric
        );
        Ok(())
    }

    /// Restores a model saved with [`Classifier::save`], refusing it when its
    /// class schema differs from `schema`.
    pub fn load(path: &Path, schema: &ClassSchema) -> Result<(Classifier, CheckpointMeta)> {
        let checkpoint = Checkpoint::read(path)?;
        if checkpoint.model.schema != *schema {
            return Err(Error::SchemaMismatch {
                checkpoint: checkpoint.model.schema.names().to_vec(),
                runtime: schema.names().to_vec(),
            });
        }
        info!("Checkpoint loaded from {:?} (epoch {})", path, checkpoint.meta.epoch);
        Ok((checkpoint.model, checkpoint.meta))
    }
}
