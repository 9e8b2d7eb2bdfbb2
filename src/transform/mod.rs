pub mod augment;
pub mod pipeline;

pub use augment::Augmentation;
pub use pipeline::{decode_bytes, decode_file, Pipeline, PreprocessSpec, RESIZE_FILTER};
