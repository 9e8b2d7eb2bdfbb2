use crate::activation::activation::softmax;

/// Categorical cross-entropy applied to raw logits.
///
/// The softmax is folded into the loss so the classifier head can stay linear
/// and inference can run its own stable softmax on the same logits.
pub struct CrossEntropyLoss;

/// Small epsilon added inside log() to prevent log(0) = -inf.
const EPS: f64 = 1e-12;

impl CrossEntropyLoss {
    /// Returns `(loss, ∂L/∂logits)` for one example whose true class is `target`.
    ///
    /// With p = softmax(z):
    ///   L = -log(p[target])
    ///   ∂L/∂z_i = p_i - 1{i = target}
    pub fn loss_and_grad(logits: &[f64], target: usize) -> (f64, Vec<f64>) {
        let probs = softmax(logits);
        let loss = -(probs[target] + EPS).ln();
        let grad = probs
            .iter()
            .enumerate()
            .map(|(i, p)| if i == target { p - 1.0 } else { *p })
            .collect();
        (loss, grad)
    }

    /// Loss only, for evaluation passes.
    pub fn loss(logits: &[f64], target: usize) -> f64 {
        let probs = softmax(logits);
        -(probs[target] + EPS).ln()
    }
}
