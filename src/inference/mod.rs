pub mod prediction;
pub mod runner;

pub use prediction::Prediction;
pub use runner::{infer, InferenceRunner};
