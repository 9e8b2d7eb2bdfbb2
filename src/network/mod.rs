pub mod backbone;
pub mod checkpoint;
pub mod classifier;
pub mod spec;

pub use backbone::Backbone;
pub use checkpoint::{read_meta, CheckpointMeta, CHECKPOINT_FORMAT_VERSION};
pub use classifier::{Classifier, Gradients, Trace};
pub use spec::ArchitectureSpec;
