//! Key-addressed persistence of stage outputs.
//!
//! This module provides:
//! - Deterministic cache keys derived from a stage's ancestry and parameters
//! - The `ArtifactStore` contract with atomic publish
//! - File-system and in-memory stores

mod fs_store;
mod key;
mod memory_store;
mod store;

pub use fs_store::FsArtifactStore;
pub use key::{CacheKey, CacheKeyBuilder, KeySegment, KeyValue};
pub use memory_store::InMemoryArtifactStore;
pub use store::{decode_artifact, encode_artifact, ArtifactHeader, ArtifactStore, SaveOutcome, FORMAT_VERSION};

#[cfg(test)]
pub use store::MockArtifactStore;
