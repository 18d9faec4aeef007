//! In-memory artifact store.

use super::key::CacheKey;
use super::store::{decode_artifact, encode_artifact, ArtifactStore, SaveOutcome};
use crate::core::StageData;
use crate::errors::CnaflowError;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Keeps encoded artifacts in a concurrent map.
///
/// Payloads go through the same envelope as on disk, so decoding failures
/// behave the same way.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifactStore {
    entries: Arc<DashMap<CacheKey, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns all stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Stores raw bytes under a key, bypassing encoding.
    pub fn insert_raw(&self, key: CacheKey, bytes: Vec<u8>) {
        self.entries.insert(key, bytes);
    }

    /// Removes an artifact.
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn exists(&self, key: &CacheKey) -> Result<bool, CnaflowError> {
        Ok(self.entries.contains_key(key))
    }

    async fn load(&self, key: &CacheKey) -> Result<StageData, CnaflowError> {
        let bytes = self
            .entries
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CnaflowError::NotFound {
                key: key.to_string(),
            })?;
        decode_artifact(key, &bytes)
    }

    async fn save(&self, key: &CacheKey, data: &StageData) -> Result<SaveOutcome, CnaflowError> {
        let bytes = encode_artifact(key, data)?;
        match self.entries.entry(key.clone()) {
            Entry::Occupied(_) => Ok(SaveOutcome::AlreadyPresent),
            Entry::Vacant(slot) => {
                slot.insert(bytes);
                Ok(SaveOutcome::Written)
            }
        }
    }

    async fn replace(&self, key: &CacheKey, data: &StageData) -> Result<(), CnaflowError> {
        let bytes = encode_artifact(key, data)?;
        self.entries.insert(key.clone(), bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKeyBuilder, KeySegment};
    use crate::core::CoreCells;

    fn key() -> CacheKey {
        CacheKeyBuilder::new("mem").build(&[KeySegment::new("qc")])
    }

    #[tokio::test]
    async fn test_publish_if_absent() {
        let store = InMemoryArtifactStore::new();
        let a = StageData::CoreCells(CoreCells::new(vec!["a".to_string()]));
        let b = StageData::CoreCells(CoreCells::new(vec!["b".to_string()]));

        assert_eq!(store.save(&key(), &a).await.unwrap(), SaveOutcome::Written);
        assert_eq!(store.save(&key(), &b).await.unwrap(), SaveOutcome::AlreadyPresent);
        assert_eq!(store.load(&key()).await.unwrap(), a);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_raw_garbage_is_corrupt() {
        let store = InMemoryArtifactStore::new();
        store.insert_raw(key(), b"{}\n{}".to_vec());
        assert!(store.exists(&key()).await.unwrap());
        assert!(matches!(
            store.load(&key()).await.unwrap_err(),
            CnaflowError::CorruptArtifact { .. }
        ));
    }
}
