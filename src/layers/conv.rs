use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::math::matrix::Matrix;
use crate::math::tensor::Tensor;

/// Square 2-D convolution with stride 1 and "same" zero padding.
///
/// Weights are laid out `[out][in][ky][kx]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conv2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel: usize,
    pub weights: Vec<f64>,
    pub biases: Vec<f64>,
}

/// Destination range `[start, end)` along one axis for which
/// `dst + offset` stays inside `0..len`.
#[inline]
fn valid_range(len: usize, offset: isize) -> (usize, usize) {
    let start = (-offset).max(0) as usize;
    let end = (len as isize - offset).clamp(0, len as isize) as usize;
    (start.min(end), end)
}

impl Conv2d {
    /// He-initialized layer; `kernel` must be odd.
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        rng: &mut R,
    ) -> Conv2d {
        debug_assert!(kernel % 2 == 1, "kernel must be odd");
        let fan_in = in_channels * kernel * kernel;
        let std_dev = (2.0 / fan_in as f64).sqrt();
        let weights = (0..out_channels * fan_in)
            .map(|_| Matrix::sample_standard_normal(rng) * std_dev)
            .collect();
        Conv2d {
            in_channels,
            out_channels,
            kernel,
            weights,
            biases: vec![0.0; out_channels],
        }
    }

    #[inline]
    fn w_index(&self, o: usize, i: usize, ky: usize, kx: usize) -> usize {
        ((o * self.in_channels + i) * self.kernel + ky) * self.kernel + kx
    }

    fn pad(&self) -> isize {
        (self.kernel / 2) as isize
    }

    /// Pre-activation output, same spatial size as the input.
    pub fn forward(&self, input: &Tensor) -> Tensor {
        let (_, h, w) = input.shape();
        let mut out = Tensor::zeros(self.out_channels, h, w);
        let pad = self.pad();

        for o in 0..self.out_channels {
            let bias = self.biases[o];
            for v in &mut out.data[o * h * w..(o + 1) * h * w] {
                *v = bias;
            }
            for i in 0..self.in_channels {
                let src = input.plane(i);
                for ky in 0..self.kernel {
                    let dy = ky as isize - pad;
                    let (y0, y1) = valid_range(h, dy);
                    for kx in 0..self.kernel {
                        let dx = kx as isize - pad;
                        let (x0, x1) = valid_range(w, dx);
                        let weight = self.weights[self.w_index(o, i, ky, kx)];
                        for y in y0..y1 {
                            let sy = (y as isize + dy) as usize;
                            let dst_row = (o * h + y) * w;
                            let src_row = sy * w;
                            for x in x0..x1 {
                                let sx = (x as isize + dx) as usize;
                                out.data[dst_row + x] += weight * src[src_row + sx];
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// Accumulates weight/bias gradients for one sample and returns
    /// ∂L/∂input. `d_out` is ∂L/∂z for this layer's pre-activation output.
    pub fn backward(
        &self,
        input: &Tensor,
        d_out: &Tensor,
        weights_grad: &mut [f64],
        biases_grad: &mut [f64],
    ) -> Tensor {
        let (_, h, w) = input.shape();
        let mut d_input = Tensor::zeros(self.in_channels, h, w);
        let pad = self.pad();

        for o in 0..self.out_channels {
            let d_plane = d_out.plane(o);
            biases_grad[o] += d_plane.iter().sum::<f64>();

            for i in 0..self.in_channels {
                let src = input.plane(i);
                for ky in 0..self.kernel {
                    let dy = ky as isize - pad;
                    let (y0, y1) = valid_range(h, dy);
                    for kx in 0..self.kernel {
                        let dx = kx as isize - pad;
                        let (x0, x1) = valid_range(w, dx);
                        let wi = self.w_index(o, i, ky, kx);
                        let weight = self.weights[wi];
                        let mut acc = 0.0;
                        for y in y0..y1 {
                            let sy = (y as isize + dy) as usize;
                            for x in x0..x1 {
                                let sx = (x as isize + dx) as usize;
                                let g = d_plane[y * w + x];
                                acc += g * src[sy * w + sx];
                                d_input.data[(i * h + sy) * w + sx] += g * weight;
                            }
                        }
                        weights_grad[wi] += acc;
                    }
                }
            }
        }
        d_input
    }

    pub fn param_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}
