pub mod activation;

pub use activation::{argmax, softmax, ActivationFunction};
