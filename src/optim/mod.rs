pub mod adamw;
pub mod scheduler;
pub mod sgd;

pub use adamw::AdamW;
pub use scheduler::ReduceOnPlateau;
pub use sgd::Sgd;

/// Updates parameters in place from accumulated gradients.
///
/// `params` and `grads` are parallel: buffer `i` of `grads` is the gradient of
/// buffer `i` of `params`. Implementations keep per-buffer state indexed the
/// same way, so the order must not change between steps.
pub trait Optimizer: Send {
    fn step(&mut self, params: Vec<&mut Vec<f64>>, grads: &[Vec<f64>]);
    fn learning_rate(&self) -> f64;
    fn set_learning_rate(&mut self, lr: f64);
}
