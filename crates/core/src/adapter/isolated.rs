use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::traits::TranscodeAdapter;
use crate::engine::{EngineError, SingleFlight, MP3_MIME_TYPE};
use crate::media::{InputMedia, OutputAudio};
use crate::progress::ProgressSnapshot;
use crate::protocol::{
    spawn_worker, ConvertRequest, TransferBuffer, WorkerConfig, WorkerLink, WorkerPayload,
    WorkerRequest,
};
use crate::resources::ResourceStore;

/// Runs the engine inside a dedicated worker reached over the worker message
/// protocol.
///
/// The worker is spawned on first initialization and owns its own engine
/// instance. Input bytes are handed over without copying. Only one request
/// can be outstanding at a time; a transcode arriving while another holds
/// the worker fails with [`EngineError::WorkerBusy`].
#[derive(Clone)]
pub struct IsolatedAdapter {
    inner: Arc<IsolatedInner>,
}

struct IsolatedInner {
    config: WorkerConfig,
    resources: ResourceStore,
    link: tokio::sync::Mutex<Option<WorkerLink>>,
    /// Reaches the worker without waiting for the link.
    control: Mutex<Option<mpsc::UnboundedSender<WorkerRequest>>>,
    ready: AtomicBool,
    /// Set once `Terminate` was sent; the link is replaced on the next load.
    retired: AtomicBool,
    init: SingleFlight,
}

impl IsolatedAdapter {
    pub fn new(config: WorkerConfig, resources: ResourceStore) -> Self {
        Self {
            inner: Arc::new(IsolatedInner {
                config,
                resources,
                link: tokio::sync::Mutex::new(None),
                control: Mutex::new(None),
                ready: AtomicBool::new(false),
                retired: AtomicBool::new(false),
                init: SingleFlight::new(),
            }),
        }
    }

    /// Number of worker loads actually started.
    pub fn load_attempts(&self) -> u64 {
        self.inner.init.attempts()
    }
}

impl IsolatedInner {
    async fn load(&self, progress: mpsc::Sender<ProgressSnapshot>) -> Result<(), EngineError> {
        let mut guard = self.link.lock().await;

        if self.retired.swap(false, Ordering::SeqCst) {
            debug!("Discarding terminated worker");
            guard.take();
        }

        if guard.is_none() {
            let link = spawn_worker(self.config.clone())?;
            *self.control.lock().unwrap_or_else(PoisonError::into_inner) = Some(link.control());
            *guard = Some(link);
            info!("Spawned engine worker");
        }

        let Some(link) = guard.as_mut() else {
            return Err(EngineError::MissingInstance);
        };

        match link.request(WorkerRequest::Load, &progress).await {
            Ok(WorkerPayload::Loaded) if self.retired.load(Ordering::SeqCst) => {
                Err(EngineError::transport("worker was terminated while loading"))
            }
            Ok(WorkerPayload::Loaded) => {
                self.ready.store(true, Ordering::SeqCst);
                Ok(())
            }
            Ok(other) => Err(EngineError::protocol(format!(
                "unexpected answer to load: {other:?}"
            ))),
            Err(e) => {
                if matches!(e, EngineError::Transport { .. }) {
                    guard.take();
                }
                Err(e)
            }
        }
    }

    /// Sends `Terminate` without waiting for an answer.
    fn terminate(&self) -> bool {
        self.ready.store(false, Ordering::SeqCst);
        let control = self
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match control {
            Some(tx) => {
                self.retired.store(true, Ordering::SeqCst);
                if tx.send(WorkerRequest::Terminate).is_err() {
                    debug!("Worker already stopped");
                }
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl TranscodeAdapter for IsolatedAdapter {
    fn name(&self) -> &str {
        "isolated"
    }

    fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    async fn initialize(&self, progress: mpsc::Sender<ProgressSnapshot>) -> Result<(), EngineError> {
        if self.is_ready() {
            return Ok(());
        }
        self.inner.config.capabilities.require_isolation()?;

        let inner = Arc::clone(&self.inner);
        self.inner
            .init
            .run(move || async move { inner.load(progress).await })
            .await
    }

    async fn transcode(
        &self,
        input: &InputMedia,
        progress: mpsc::Sender<ProgressSnapshot>,
    ) -> Result<OutputAudio, EngineError> {
        let mut guard = self
            .inner
            .link
            .try_lock()
            .map_err(|_| EngineError::WorkerBusy)?;
        if !self.is_ready() {
            return Err(EngineError::NotLoaded);
        }
        let Some(link) = guard.as_mut() else {
            return Err(EngineError::MissingInstance);
        };

        let bytes = input
            .source
            .read()
            .await
            .map_err(|e| EngineError::InputRead {
                reason: e.to_string(),
            })?;

        let request = WorkerRequest::Convert(ConvertRequest {
            name: input.file_name.clone(),
            size: input.size_bytes,
            kind: input.kind,
            duration_secs: input.duration_secs,
            bytes: TransferBuffer::new(bytes),
        });

        match link.request(request, &progress).await {
            Ok(WorkerPayload::Converted(audio)) => {
                let bytes = audio.bytes.into_bytes();
                let size_bytes = bytes.len() as u64;
                let handle = self.inner.resources.create(bytes, MP3_MIME_TYPE);
                info!(output = %audio.name, size = size_bytes, handle = %handle, "Isolated transcode finished");

                Ok(OutputAudio {
                    name: audio.name,
                    size_bytes,
                    handle,
                    bitrate_kbps: audio.bitrate_kbps,
                    duration_secs: audio.duration_secs,
                })
            }
            Ok(WorkerPayload::Terminated) => {
                guard.take();
                self.inner.retired.store(false, Ordering::SeqCst);
                Err(EngineError::transport("worker was terminated during conversion"))
            }
            Ok(WorkerPayload::Loaded) => Err(EngineError::protocol(
                "worker answered a conversion with a load",
            )),
            Err(e) => {
                if matches!(e, EngineError::Transport { .. }) {
                    warn!(error = %e, "Worker channel failed, discarding worker");
                    guard.take();
                    self.inner.ready.store(false, Ordering::SeqCst);
                }
                Err(e)
            }
        }
    }

    async fn shutdown(&self) {
        if self.inner.terminate() {
            info!("Terminated engine worker");
        }
        // A conversion still holding the link discards it when the worker
        // answers `Terminated`.
        if let Ok(mut guard) = self.inner.link.try_lock() {
            guard.take();
            self.inner.retired.store(false, Ordering::SeqCst);
        }
    }

    fn abort(&self) -> bool {
        self.inner.terminate()
    }
}
