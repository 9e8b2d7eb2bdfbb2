pub mod conv;
pub mod dense;
pub mod pool;

pub use conv::Conv2d;
pub use dense::Layer;
