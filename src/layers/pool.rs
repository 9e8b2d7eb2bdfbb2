use crate::math::tensor::Tensor;

/// 2×2 max pooling with stride 2.
///
/// Odd trailing rows/columns are dropped. An axis of length 1 is passed
/// through unpooled so deep backbones never collapse to an empty tensor.
/// Returns the pooled tensor and, for each output element, the flat input
/// index that produced it (needed to route gradients back).
pub fn max_pool(input: &Tensor) -> (Tensor, Vec<usize>) {
    let (c, h, w) = input.shape();
    let (sy, sx) = (if h >= 2 { 2 } else { 1 }, if w >= 2 { 2 } else { 1 });
    let (oh, ow) = (h / sy, w / sx);
    let mut out = Tensor::zeros(c, oh, ow);
    let mut argmax = vec![0usize; c * oh * ow];

    for ch in 0..c {
        for oy in 0..oh {
            for ox in 0..ow {
                let mut best = f64::NEG_INFINITY;
                let mut best_idx = input.index(ch, oy * sy, ox * sx);
                for py in 0..sy {
                    for px in 0..sx {
                        let idx = input.index(ch, oy * sy + py, ox * sx + px);
                        if input.data[idx] > best {
                            best = input.data[idx];
                            best_idx = idx;
                        }
                    }
                }
                let o = out.index(ch, oy, ox);
                out.data[o] = input.data[best_idx];
                argmax[o] = best_idx;
            }
        }
    }
    (out, argmax)
}

/// Routes pooled gradients back to the winning input positions.
pub fn max_pool_backward(d_out: &Tensor, argmax: &[usize], input_shape: (usize, usize, usize)) -> Tensor {
    let (c, h, w) = input_shape;
    let mut d_input = Tensor::zeros(c, h, w);
    for (g, &idx) in d_out.data.iter().zip(argmax) {
        d_input.data[idx] += g;
    }
    d_input
}

/// Mean of every channel plane; the feature vector fed to the head.
pub fn global_avg_pool(input: &Tensor) -> Vec<f64> {
    let n = (input.height * input.width).max(1) as f64;
    (0..input.channels)
        .map(|c| input.plane(c).iter().sum::<f64>() / n)
        .collect()
}

pub fn global_avg_pool_backward(d_features: &[f64], input_shape: (usize, usize, usize)) -> Tensor {
    let (c, h, w) = input_shape;
    let n = (h * w).max(1) as f64;
    let mut data = Vec::with_capacity(c * h * w);
    for &g in d_features.iter().take(c) {
        data.extend(std::iter::repeat(g / n).take(h * w));
    }
    Tensor::from_data(c, h, w, data)
}
