use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use super::pipeline::{run_transcode, TranscodeJob};
use super::traits::TranscodeAdapter;
use crate::engine::{EngineError, EngineHandle, MP3_MIME_TYPE};
use crate::media::{InputMedia, OutputAudio};
use crate::progress::{EstimatorConfig, ProgressSnapshot};
use crate::resources::ResourceStore;

/// Runs the engine in the caller's execution context.
///
/// An in-flight transcode cannot be interrupted; [`TranscodeAdapter::abort`]
/// always returns `false`.
#[derive(Clone)]
pub struct DirectAdapter {
    engine: EngineHandle,
    resources: ResourceStore,
    estimator: EstimatorConfig,
}

impl DirectAdapter {
    pub fn new(engine: EngineHandle, resources: ResourceStore, estimator: EstimatorConfig) -> Self {
        Self {
            engine,
            resources,
            estimator,
        }
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }
}

#[async_trait]
impl TranscodeAdapter for DirectAdapter {
    fn name(&self) -> &str {
        "direct"
    }

    fn is_ready(&self) -> bool {
        self.engine.is_ready()
    }

    async fn initialize(&self, progress: mpsc::Sender<ProgressSnapshot>) -> Result<(), EngineError> {
        self.engine.initialize(Some(progress)).await
    }

    async fn transcode(
        &self,
        input: &InputMedia,
        progress: mpsc::Sender<ProgressSnapshot>,
    ) -> Result<OutputAudio, EngineError> {
        if !self.engine.is_ready() {
            return Err(EngineError::NotLoaded);
        }

        let bytes = input
            .source
            .read()
            .await
            .map_err(|e| EngineError::InputRead {
                reason: e.to_string(),
            })?;

        let job = TranscodeJob {
            file_name: input.file_name.clone(),
            duration_secs: input.duration_secs,
            bytes,
        };
        let audio = run_transcode(self.engine.engine().as_ref(), job, self.estimator, &progress).await?;

        let size_bytes = audio.bytes.len() as u64;
        let handle = self.resources.create(audio.bytes, MP3_MIME_TYPE);
        info!(output = %audio.name, size = size_bytes, handle = %handle, "Direct transcode finished");

        Ok(OutputAudio {
            name: audio.name,
            size_bytes,
            handle,
            bitrate_kbps: audio.bitrate_kbps,
            duration_secs: audio.duration_secs,
        })
    }

    async fn shutdown(&self) {
        self.engine.shutdown().await;
    }
}
