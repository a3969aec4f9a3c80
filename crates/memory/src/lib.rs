//! Memory store implementations for Cairn.

pub mod file_store;
pub mod in_memory;
pub mod vector;

pub use file_store::FileStore;
pub use in_memory::InMemoryStore;
pub use vector::{cosine_similarity, rank_by_keyword, rank_by_similarity, rank_by_tags};
