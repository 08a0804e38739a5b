//! Trait definitions for the adapter module.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::engine::EngineError;
use crate::media::{InputMedia, OutputAudio};
use crate::progress::ProgressSnapshot;

/// Uniform capability surface over the transcoding engine.
///
/// Progress senders are used without blocking; snapshots are dropped if the
/// receiver falls behind.
#[async_trait]
pub trait TranscodeAdapter: Send + Sync {
    /// Returns the name of this adapter implementation.
    fn name(&self) -> &str;

    /// Whether the engine behind this adapter is loaded.
    fn is_ready(&self) -> bool;

    /// Loads the engine. Concurrent calls share one pending load.
    async fn initialize(&self, progress: mpsc::Sender<ProgressSnapshot>) -> Result<(), EngineError>;

    /// Converts `input` to MP3. The returned output's handle belongs to the
    /// caller.
    async fn transcode(
        &self,
        input: &InputMedia,
        progress: mpsc::Sender<ProgressSnapshot>,
    ) -> Result<OutputAudio, EngineError>;

    /// Releases the engine.
    async fn shutdown(&self);

    /// Hard-stops in-flight work, if the adapter supports it.
    ///
    /// Returns whether a stop was requested. Adapters that cannot interrupt
    /// their engine return `false` and let the call run to completion.
    fn abort(&self) -> bool {
        false
    }
}
