use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::{activation::activation::ActivationFunction, math::matrix::Matrix};

/// Fully connected layer. Serves as the classifier head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub size: usize,
    pub input_size: usize,
    /// Shape (input_size, size).
    pub weights: Matrix,
    pub biases: Vec<f64>,
    pub activator: ActivationFunction,
}

impl Layer {
    pub fn new<R: Rng + ?Sized>(
        size: usize,
        input_size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Layer {
        let weights = match activation {
            ActivationFunction::Identity => Matrix::xavier(input_size, size, rng),
            _ => Matrix::he(input_size, size, rng),
        };
        Layer {
            size,
            input_size,
            weights,
            biases: vec![0.0; size],
            activator: activation,
        }
    }

    /// Forward pass returning `(z, a)`: the pre-activation `z = xW + b`,
    /// needed for the derivative, and the activation `a = σ(z)`.
    pub fn feed_from(&self, input: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let mut z = self.weights.vec_mul(input);
        for (zi, b) in z.iter_mut().zip(&self.biases) {
            *zi += b;
        }
        let a = z.iter().map(|&x| self.activator.function(x)).collect();
        (z, a)
    }

    /// Accumulates gradients for one sample and returns ∂L/∂input.
    ///
    /// `delta` is ∂L/∂a for this layer (error in activation space); `pre` is the
    /// `z` returned by `feed_from` for the same `input`.
    pub fn backward(
        &self,
        input: &[f64],
        pre: &[f64],
        delta: &[f64],
        weights_grad: &mut [f64],
        biases_grad: &mut [f64],
    ) -> Vec<f64> {
        // δ = error ⊙ σ'(z)
        let layer_delta: Vec<f64> = delta
            .iter()
            .zip(pre)
            .map(|(d, &z)| d * self.activator.derivative(z))
            .collect();

        Matrix::add_outer(weights_grad, input, &layer_delta);
        for (g, d) in biases_grad.iter_mut().zip(&layer_delta) {
            *g += d;
        }
        self.weights.mul_vec(&layer_delta)
    }

    pub fn param_count(&self) -> usize {
        self.weights.data.len() + self.biases.len()
    }
}
