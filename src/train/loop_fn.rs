use tracing::debug;

use crate::activation::activation::argmax;
use crate::dataset::loader::BatchLoader;
use crate::dataset::schema::ClassSchema;
use crate::error::{Error, Result};
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::network::classifier::Classifier;
use crate::optim::Optimizer;
use crate::train::metrics::{ConfusionMatrix, EvaluationReport};

/// Totals of one training pass. Means are over examples, not batches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochTotals {
    pub loss: f64,
    pub accuracy: f64,
    pub examples: usize,
    pub skipped: usize,
}

/// Runs one full pass of mini-batch training over `loader`, one optimizer step
/// per non-empty batch, gradients averaged over the batch.
///
/// Fails with an inference error when the loss stops being finite, since no
/// later epoch can recover from NaN parameters.
pub fn run_epoch(
    model: &mut Classifier,
    loader: &BatchLoader,
    epoch: usize,
    optimizer: &mut dyn Optimizer,
) -> Result<EpochTotals> {
    let mut total_loss = 0.0;
    let mut correct = 0usize;
    let mut examples = 0usize;
    let mut skipped = 0usize;

    for (b, batch) in loader.epoch(epoch).enumerate() {
        skipped += batch.skipped.len();
        if batch.is_empty() {
            debug!("Batch {} of epoch {} had no decodable images", b, epoch);
            continue;
        }

        let mut grads = model.zero_gradients();
        for (input, &label) in batch.inputs.iter().zip(&batch.labels) {
            let (logits, trace) = model.forward_train(input);
            let (loss, d_logits) = CrossEntropyLoss::loss_and_grad(&logits, label);
            if !loss.is_finite() {
                return Err(Error::Inference(format!(
                    "non-finite training loss in epoch {} batch {}",
                    epoch, b
                )));
            }
            total_loss += loss;
            if argmax(&logits) == label {
                correct += 1;
            }
            model.backward(&trace, &d_logits, &mut grads);
        }
        examples += batch.len();

        grads.scale(1.0 / batch.len() as f64);
        if !grads.is_finite() {
            return Err(Error::Inference(format!(
                "non-finite gradients in epoch {} batch {}",
                epoch, b
            )));
        }
        optimizer.step(model.parameters_mut(), &grads.buffers);
    }

    if examples == 0 {
        return Err(Error::config(format!(
            "no decodable training images in epoch {} ({} skipped)",
            epoch, skipped
        )));
    }
    Ok(EpochTotals {
        loss: total_loss / examples as f64,
        accuracy: correct as f64 / examples as f64,
        examples,
        skipped,
    })
}

/// Full pass over `loader` without gradients.
pub fn evaluate(
    model: &Classifier,
    loader: &BatchLoader,
    schema: &ClassSchema,
    split: &str,
) -> Result<EvaluationReport> {
    let mut confusion = ConfusionMatrix::new(schema);
    let mut total_loss = 0.0;
    let mut skipped = 0usize;

    for batch in loader.epoch(0) {
        skipped += batch.skipped.len();
        let logits = model.forward(&batch.inputs);
        for (z, &label) in logits.iter().zip(&batch.labels) {
            if z.iter().any(|v| !v.is_finite()) {
                return Err(Error::Inference(format!("non-finite logits on {} split", split)));
            }
            total_loss += CrossEntropyLoss::loss(z, label);
            confusion.record(label, argmax(z));
        }
    }

    if confusion.total() == 0 {
        return Err(Error::config(format!(
            "no decodable images in {} split ({} skipped)",
            split, skipped
        )));
    }
    Ok(EvaluationReport::new(split, total_loss, skipped, confusion))
}
