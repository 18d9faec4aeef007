//! Mock stages and stores for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::cache::{ArtifactStore, CacheKey, KeySegment, SaveOutcome};
use crate::context::{RunConfig, RunContext};
use crate::core::{CoreCells, StageData};
use crate::errors::CnaflowError;
use crate::stages::{Stage, StageInputs};

/// A stage that counts its calls and records which inputs it saw.
///
/// Its output is a core-cell set holding its own name plus every name found
/// in its inputs, so a chain `a -> b -> c` produces `{a, b, c}` at `c`.
#[derive(Debug)]
pub struct CountingStage {
    name: &'static str,
    calls: Mutex<usize>,
    last_inputs: Mutex<Vec<String>>,
}

impl CountingStage {
    /// Creates a counting stage whose key segment is its name.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            calls: Mutex::new(0),
            last_inputs: Mutex::new(Vec::new()),
        }
    }

    /// Returns the number of times the stage computed.
    #[must_use]
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }

    /// Returns the inputs present on the most recent call, sorted.
    #[must_use]
    pub fn last_inputs(&self) -> Vec<String> {
        self.last_inputs.lock().clone()
    }

    /// Resets call tracking.
    pub fn reset(&self) {
        *self.calls.lock() = 0;
        self.last_inputs.lock().clear();
    }
}

impl Stage for CountingStage {
    fn name(&self) -> &str {
        self.name
    }

    fn key_segment(&self, _config: &RunConfig) -> KeySegment {
        KeySegment::new(self.name)
    }

    fn compute(&self, inputs: &StageInputs, _ctx: &RunContext) -> Result<StageData, CnaflowError> {
        *self.calls.lock() += 1;
        let present: Vec<String> = inputs.stages().into_iter().map(str::to_string).collect();

        let mut cells = vec![self.name.to_string()];
        for stage in &present {
            cells.extend(inputs.core_cells(stage)?.iter().cloned());
        }
        *self.last_inputs.lock() = present;
        Ok(StageData::CoreCells(CoreCells::new(cells)))
    }
}

/// A stage that always fails with a transform error.
#[derive(Debug)]
pub struct FailingStage {
    name: &'static str,
    message: String,
}

impl FailingStage {
    /// Creates a failing stage.
    #[must_use]
    pub fn new(name: &'static str, message: impl Into<String>) -> Self {
        Self {
            name,
            message: message.into(),
        }
    }
}

impl Stage for FailingStage {
    fn name(&self) -> &str {
        self.name
    }

    fn key_segment(&self, _config: &RunConfig) -> KeySegment {
        KeySegment::new(self.name)
    }

    fn compute(&self, _inputs: &StageInputs, _ctx: &RunContext) -> Result<StageData, CnaflowError> {
        Err(CnaflowError::transform(self.name, self.message.clone()))
    }
}

#[derive(Debug, Default)]
struct Calls {
    exists: Vec<CacheKey>,
    loads: Vec<CacheKey>,
    saves: Vec<CacheKey>,
    replaces: Vec<CacheKey>,
}

/// An artifact store wrapper that records every call.
///
/// Saves whose key contains a configured fragment fail before anything is
/// published, which stands in for a crash mid-write.
pub struct RecordingStore {
    inner: Arc<dyn ArtifactStore>,
    calls: Mutex<Calls>,
    fail_saves: Mutex<Option<String>>,
}

impl std::fmt::Debug for RecordingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingStore")
            .field("calls", &*self.calls.lock())
            .finish_non_exhaustive()
    }
}

impl RecordingStore {
    /// Wraps a store.
    #[must_use]
    pub fn new(inner: impl ArtifactStore + 'static) -> Self {
        Self {
            inner: Arc::new(inner),
            calls: Mutex::new(Calls::default()),
            fail_saves: Mutex::new(None),
        }
    }

    /// Makes saves and replaces fail for keys containing `fragment`.
    pub fn fail_saves_containing(&self, fragment: impl Into<String>) {
        *self.fail_saves.lock() = Some(fragment.into());
    }

    /// Returns the keys passed to `exists`.
    #[must_use]
    pub fn exists_checks(&self) -> Vec<CacheKey> {
        self.calls.lock().exists.clone()
    }

    /// Returns the keys loaded.
    #[must_use]
    pub fn loads(&self) -> Vec<CacheKey> {
        self.calls.lock().loads.clone()
    }

    /// Returns the keys saved.
    #[must_use]
    pub fn saves(&self) -> Vec<CacheKey> {
        self.calls.lock().saves.clone()
    }

    /// Returns the keys replaced.
    #[must_use]
    pub fn replaces(&self) -> Vec<CacheKey> {
        self.calls.lock().replaces.clone()
    }

    /// Clears the recorded calls and any injected failure.
    pub fn reset(&self) {
        *self.calls.lock() = Calls::default();
        *self.fail_saves.lock() = None;
    }

    fn check_write(&self, key: &CacheKey) -> Result<(), CnaflowError> {
        match self.fail_saves.lock().as_deref() {
            Some(fragment) if key.as_str().contains(fragment) => Err(CnaflowError::Io(
                std::io::Error::other(format!("injected write failure for {key}")),
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ArtifactStore for RecordingStore {
    async fn exists(&self, key: &CacheKey) -> Result<bool, CnaflowError> {
        self.calls.lock().exists.push(key.clone());
        self.inner.exists(key).await
    }

    async fn load(&self, key: &CacheKey) -> Result<StageData, CnaflowError> {
        self.calls.lock().loads.push(key.clone());
        self.inner.load(key).await
    }

    async fn save(&self, key: &CacheKey, data: &StageData) -> Result<SaveOutcome, CnaflowError> {
        self.calls.lock().saves.push(key.clone());
        self.check_write(key)?;
        self.inner.save(key, data).await
    }

    async fn replace(&self, key: &CacheKey, data: &StageData) -> Result<(), CnaflowError> {
        self.calls.lock().replaces.push(key.clone());
        self.check_write(key)?;
        self.inner.replace(key, data).await
    }
}
