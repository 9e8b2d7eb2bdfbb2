use crate::optim::Optimizer;

/// Stochastic gradient descent with classical momentum and L2 weight decay.
///
/// v ← μ·v + (g + λ·θ)
/// θ ← θ − η·v
pub struct Sgd {
    pub learning_rate: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    velocity: Vec<Vec<f64>>,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd {
            learning_rate,
            momentum: 0.0,
            weight_decay: 0.0,
            velocity: Vec::new(),
        }
    }

    pub fn with_momentum(mut self, momentum: f64) -> Sgd {
        self.momentum = momentum;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f64) -> Sgd {
        self.weight_decay = weight_decay;
        self
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: Vec<&mut Vec<f64>>, grads: &[Vec<f64>]) {
        if self.velocity.len() != params.len() {
            self.velocity = params.iter().map(|p| vec![0.0; p.len()]).collect();
        }
        for ((param, grad), vel) in params.into_iter().zip(grads).zip(&mut self.velocity) {
            for ((w, g), v) in param.iter_mut().zip(grad).zip(vel.iter_mut()) {
                let d = g + self.weight_decay * *w;
                *v = self.momentum * *v + d;
                *w -= self.learning_rate * *v;
            }
        }
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::testing::minimize_quadratic;

    #[test]
    fn plain_step_moves_against_gradient() {
        let mut sgd = Sgd::new(0.1);
        let mut w = vec![1.0, -1.0];
        sgd.step(vec![&mut w], &[vec![2.0, -4.0]]);
        assert!((w[0] - 0.8).abs() < 1e-12);
        assert!((w[1] - (-0.6)).abs() < 1e-12);
    }

    #[test]
    fn momentum_converges_on_quadratic() {
        let mut sgd = Sgd::new(0.05).with_momentum(0.9);
        let (start, end) = minimize_quadratic(&mut sgd, 200);
        assert!(end < start * 1e-4, "{} -> {}", start, end);
    }

    #[test]
    fn weight_decay_shrinks_parameters_without_gradient() {
        let mut sgd = Sgd::new(0.1).with_weight_decay(0.5);
        let mut w = vec![2.0];
        sgd.step(vec![&mut w], &[vec![0.0]]);
        assert!((w[0] - 1.9).abs() < 1e-12);
    }
}
