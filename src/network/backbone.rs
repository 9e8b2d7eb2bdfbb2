use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activation::activation::ActivationFunction;
use crate::layers::conv::Conv2d;
use crate::layers::pool::{global_avg_pool, global_avg_pool_backward, max_pool, max_pool_backward};
use crate::math::tensor::Tensor;
use crate::network::spec::ArchitectureSpec;

/// Convolution → activation → 2×2 max pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvBlock {
    pub conv: Conv2d,
    pub activation: ActivationFunction,
}

/// Intermediate values of one block, kept for the backward pass.
#[derive(Debug)]
struct BlockTrace {
    input: Tensor,
    pre: Tensor,
    argmax: Vec<usize>,
}

/// Everything the backward pass needs from one forward pass.
#[derive(Debug)]
pub struct BackboneTrace {
    blocks: Vec<BlockTrace>,
    pooled_shape: (usize, usize, usize),
}

/// Feature extractor: a stack of [`ConvBlock`]s followed by global average
/// pooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backbone {
    pub blocks: Vec<ConvBlock>,
}

impl Backbone {
    pub fn new<R: Rng + ?Sized>(spec: &ArchitectureSpec, rng: &mut R) -> Backbone {
        let mut in_channels = spec.input_channels;
        let blocks = spec
            .conv_channels
            .iter()
            .map(|&out| {
                let conv = Conv2d::new(in_channels, out, spec.kernel, rng);
                in_channels = out;
                ConvBlock {
                    conv,
                    activation: spec.activation,
                }
            })
            .collect();
        Backbone { blocks }
    }

    pub fn features(&self, input: &Tensor) -> Vec<f64> {
        let mut x = input.clone();
        for block in &self.blocks {
            let mut z = block.conv.forward(&x);
            z.data.iter_mut().for_each(|v| *v = block.activation.function(*v));
            x = max_pool(&z).0;
        }
        global_avg_pool(&x)
    }

    pub fn features_with_trace(&self, input: &Tensor) -> (Vec<f64>, BackboneTrace) {
        let mut traces = Vec::with_capacity(self.blocks.len());
        let mut x = input.clone();
        for block in &self.blocks {
            let pre = block.conv.forward(&x);
            let mut activated = pre.clone();
            activated
                .data
                .iter_mut()
                .for_each(|v| *v = block.activation.function(*v));
            let (pooled, argmax) = max_pool(&activated);
            traces.push(BlockTrace {
                input: std::mem::replace(&mut x, pooled),
                pre,
                argmax,
            });
        }
        let pooled_shape = x.shape();
        (
            global_avg_pool(&x),
            BackboneTrace {
                blocks: traces,
                pooled_shape,
            },
        )
    }

    /// Accumulates gradients for every block. `grads` holds one
    /// `(weights, biases)` pair of buffers per block, in block order.
    pub fn backward(&self, trace: &BackboneTrace, d_features: &[f64], grads: &mut [Vec<f64>]) {
        let mut d = global_avg_pool_backward(d_features, trace.pooled_shape);
        for (i, (block, bt)) in self.blocks.iter().zip(&trace.blocks).enumerate().rev() {
            let mut d_act = max_pool_backward(&d, &bt.argmax, bt.pre.shape());
            for (g, &z) in d_act.data.iter_mut().zip(&bt.pre.data) {
                *g *= block.activation.derivative(z);
            }
            let (head, tail) = grads.split_at_mut(2 * i + 1);
            d = block
                .conv
                .backward(&bt.input, &d_act, &mut head[2 * i], &mut tail[0]);
        }
    }

    pub fn param_count(&self) -> usize {
        self.blocks.iter().map(|b| b.conv.param_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn small() -> (Backbone, Tensor) {
        let spec = ArchitectureSpec {
            input_channels: 2,
            conv_channels: vec![3, 2],
            kernel: 3,
            activation: ActivationFunction::LeakyReLU { alpha: 0.1 },
        };
        let backbone = Backbone::new(&spec, &mut ChaCha8Rng::seed_from_u64(9));
        let input = Tensor::from_data(
            2,
            4,
            4,
            (0..32).map(|v| ((v * 13) % 17) as f64 / 17.0 - 0.5).collect(),
        );
        (backbone, input)
    }

    #[test]
    fn trace_and_plain_forward_agree() {
        let (backbone, input) = small();
        let plain = backbone.features(&input);
        let (traced, _) = backbone.features_with_trace(&input);
        assert_eq!(plain, traced);
        assert_eq!(plain.len(), 2);
    }

    #[test]
    fn backward_matches_finite_difference() {
        let (backbone, input) = small();
        let loss = |b: &Backbone| -> f64 {
            let f = b.features(&input);
            f[0] * 1.5 - f[1]
        };

        let (_, trace) = backbone.features_with_trace(&input);
        let mut grads: Vec<Vec<f64>> = backbone
            .blocks
            .iter()
            .flat_map(|b| vec![vec![0.0; b.conv.weights.len()], vec![0.0; b.conv.biases.len()]])
            .collect();
        backbone.backward(&trace, &[1.5, -1.0], &mut grads);

        let eps = 1e-6;
        for (block, idx) in [(0usize, 0usize), (0, 20), (1, 7), (1, 50)] {
            let mut plus = backbone.clone();
            plus.blocks[block].conv.weights[idx] += eps;
            let mut minus = backbone.clone();
            minus.blocks[block].conv.weights[idx] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
            assert!(
                (numeric - grads[2 * block][idx]).abs() < 1e-5,
                "block {} weight {}: numeric {} vs analytic {}",
                block,
                idx,
                numeric,
                grads[2 * block][idx]
            );
        }
    }
}
