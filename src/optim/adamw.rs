use crate::optim::Optimizer;

/// Adam with decoupled weight decay (Loshchilov & Hutter).
pub struct AdamW {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
    t: i32,
    m: Vec<Vec<f64>>,
    v: Vec<Vec<f64>>,
}

impl AdamW {
    pub fn new(learning_rate: f64, weight_decay: f64) -> AdamW {
        AdamW {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }
}

impl Optimizer for AdamW {
    fn step(&mut self, params: Vec<&mut Vec<f64>>, grads: &[Vec<f64>]) {
        if self.m.len() != params.len() {
            self.m = params.iter().map(|p| vec![0.0; p.len()]).collect();
            self.v = self.m.clone();
            self.t = 0;
        }
        self.t += 1;
        let bc1 = 1.0 - self.beta1.powi(self.t);
        let bc2 = 1.0 - self.beta2.powi(self.t);

        for (i, (param, grad)) in params.into_iter().zip(grads).enumerate() {
            let (m, v) = (&mut self.m[i], &mut self.v[i]);
            for j in 0..param.len() {
                let g = grad[j];
                m[j] = self.beta1 * m[j] + (1.0 - self.beta1) * g;
                v[j] = self.beta2 * v[j] + (1.0 - self.beta2) * g * g;
                let m_hat = m[j] / bc1;
                let v_hat = v[j] / bc2;
                let w = &mut param[j];
                *w -= self.learning_rate * self.weight_decay * *w;
                *w -= self.learning_rate * m_hat / (v_hat.sqrt() + self.eps);
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
    fn first_step_has_magnitude_of_learning_rate() {
        let mut opt = AdamW::new(0.01, 0.0);
        let mut w = vec![0.0, 0.0];
        opt.step(vec![&mut w], &[vec![5.0, -0.001]]);
        assert!((w[0] + 0.01).abs() < 1e-6);
        assert!((w[1] - 0.01).abs() < 1e-4);
    }

    #[test]
    fn converges_on_quadratic() {
        let mut opt = AdamW::new(0.1, 0.0);
        let (start, end) = minimize_quadratic(&mut opt, 500);
        assert!(end < start * 1e-2, "{} -> {}", start, end);
    }

    #[test]
    fn decay_is_decoupled_from_gradient() {
        let mut opt = AdamW::new(0.1, 0.1);
        let mut w = vec![10.0];
        opt.step(vec![&mut w], &[vec![0.0]]);
        assert!((w[0] - 9.9).abs() < 1e-9);
    }
}
