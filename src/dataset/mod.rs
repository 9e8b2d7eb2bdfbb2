pub mod indexer;
pub mod loader;
pub mod schema;

pub use indexer::{index_split, DatasetEntry, DatasetIndex};
pub use loader::{Batch, BatchLoader};
pub use schema::ClassSchema;
