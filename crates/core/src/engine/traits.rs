//! Trait definitions for the engine module.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::bundle::EngineAssets;
use super::error::EngineError;
use crate::progress::EngineProgress;

/// Contents of a file read back from the engine's private filesystem.
#[derive(Debug, Clone, PartialEq)]
pub enum FileData {
    Binary(Bytes),
    Text(String),
}

/// The external transcoding engine.
///
/// Implementations own a private filesystem that inputs are written into and
/// outputs are read back from. Codec work happens entirely behind `exec`.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Returns the name of this engine implementation.
    fn name(&self) -> &str;

    /// Loads the engine from the given assets. Empty assets mean the engine
    /// loads from its local installation.
    async fn load(&self, assets: &EngineAssets) -> Result<(), EngineError>;

    /// Whether `load` has completed successfully.
    fn is_loaded(&self) -> bool;

    async fn write_file(&self, name: &str, bytes: Bytes) -> Result<(), EngineError>;

    /// Runs one command. Raw progress is pushed to `progress` without
    /// blocking; events are dropped when the receiver lags.
    async fn exec(
        &self,
        args: &[String],
        progress: mpsc::Sender<EngineProgress>,
    ) -> Result<(), EngineError>;

    async fn read_file(&self, name: &str) -> Result<FileData, EngineError>;

    async fn delete_file(&self, name: &str) -> Result<(), EngineError>;

    /// Releases the engine instance. A terminated engine must be loaded again.
    async fn terminate(&self);
}

/// Builds fresh engine instances.
///
/// The isolated worker needs its own instance per worker thread, so it takes
/// a factory rather than a shared engine.
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Arc<dyn MediaEngine>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> Arc<dyn MediaEngine> + Send + Sync,
{
    fn create(&self) -> Arc<dyn MediaEngine> {
        self()
    }
}
