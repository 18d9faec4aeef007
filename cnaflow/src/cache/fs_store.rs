//! File-system artifact store.

use super::key::CacheKey;
use super::store::{decode_artifact, encode_artifact, ArtifactStore, SaveOutcome};
use crate::core::StageData;
use crate::errors::CnaflowError;
use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const EXTENSION: &str = "artifact";

/// Stores one file per key under a directory.
///
/// Writes go to a temporary file in the same directory and are published by
/// rename, so a crash mid-write leaves only an unnamed temporary behind.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    /// Creates a store rooted at an existing directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates the directory if needed and returns a store rooted there.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, CnaflowError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path an artifact is published at.
    #[must_use]
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", key.file_name()))
    }

    async fn publish(&self, key: &CacheKey, data: &StageData, clobber: bool) -> Result<SaveOutcome, CnaflowError> {
        let bytes = encode_artifact(key, data)?;
        let dir = self.dir.clone();
        let path = self.path_for(key);

        tokio::task::spawn_blocking(move || -> Result<SaveOutcome, CnaflowError> {
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            if clobber {
                tmp.persist(&path).map_err(|e| e.error)?;
                return Ok(SaveOutcome::Written);
            }
            match tmp.persist_noclobber(&path) {
                Ok(_) => Ok(SaveOutcome::Written),
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(SaveOutcome::AlreadyPresent),
                Err(e) => Err(e.error.into()),
            }
        })
        .await
        .map_err(|e| CnaflowError::Internal(format!("artifact write task failed: {e}")))?
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn exists(&self, key: &CacheKey) -> Result<bool, CnaflowError> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await?)
    }

    async fn load(&self, key: &CacheKey) -> Result<StageData, CnaflowError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CnaflowError::NotFound {
                    key: key.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let key = key.clone();
        tokio::task::spawn_blocking(move || decode_artifact(&key, &bytes))
            .await
            .map_err(|e| CnaflowError::Internal(format!("artifact decode task failed: {e}")))?
    }

    async fn save(&self, key: &CacheKey, data: &StageData) -> Result<SaveOutcome, CnaflowError> {
        self.publish(key, data, false).await
    }

    async fn replace(&self, key: &CacheKey, data: &StageData) -> Result<(), CnaflowError> {
        self.publish(key, data, true).await.map(|_| ())
    }
}
