use std::future::Future;
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::{
    ConvertRequest, ConvertedAudio, TransferBuffer, WorkerFault, WorkerPayload, WorkerRequest,
    WorkerResponse,
};
use crate::adapter::pipeline::{run_transcode, TranscodeJob};
use crate::engine::{BundleSource, EngineError, EngineFactory, EngineHandle, HostCapabilities};
use crate::metrics;
use crate::progress::{EstimatorConfig, ProgressSnapshot};
use crate::resources::ResourceStore;

const WORKER_THREAD_NAME: &str = "vidmp3-worker";
const PROGRESS_BUFFER: usize = 64;

/// What a worker needs to build its own engine.
#[derive(Clone)]
pub struct WorkerConfig {
    pub factory: Arc<dyn EngineFactory>,
    pub bundle: BundleSource,
    pub capabilities: HostCapabilities,
    pub estimator: EstimatorConfig,
}

/// Caller side of a running worker.
///
/// Holds the only response receiver, so whoever holds the link is the only
/// party that can have a request in flight.
pub struct WorkerLink {
    requests: mpsc::UnboundedSender<WorkerRequest>,
    responses: mpsc::UnboundedReceiver<WorkerResponse>,
}

impl WorkerLink {
    /// Sender that can reach the worker without holding the link, for
    /// fire-and-forget `Terminate`.
    pub fn control(&self) -> mpsc::UnboundedSender<WorkerRequest> {
        self.requests.clone()
    }

    /// Sends one request and waits for its terminal response, relaying
    /// progress on the way.
    ///
    /// A worker that goes away without answering yields
    /// [`EngineError::Transport`] instead of hanging.
    pub async fn request(
        &mut self,
        request: WorkerRequest,
        progress: &mpsc::Sender<ProgressSnapshot>,
    ) -> Result<WorkerPayload, EngineError> {
        let label = request.label();
        metrics::WORKER_REQUESTS.with_label_values(&[label]).inc();
        debug!(request = label, "Sending worker request");

        self.requests
            .send(request)
            .map_err(|_| EngineError::transport("worker is not running"))?;

        loop {
            match self.responses.recv().await {
                Some(WorkerResponse::Progress(snapshot)) => {
                    let _ = progress.try_send(snapshot);
                }
                Some(WorkerResponse::Success(payload)) => {
                    debug!(request = label, "Worker request succeeded");
                    return Ok(payload);
                }
                Some(WorkerResponse::Error(fault)) => {
                    debug!(request = label, code = %fault.code, "Worker request failed");
                    return Err(fault.into());
                }
                None => {
                    return Err(EngineError::transport(format!(
                        "worker exited before answering {label}"
                    )));
                }
            }
        }
    }
}

/// Worker side: owns its engine instance and serves requests one at a time.
pub struct EngineWorker {
    requests: mpsc::UnboundedReceiver<WorkerRequest>,
    responses: mpsc::UnboundedSender<WorkerResponse>,
    engine: EngineHandle,
    estimator: EstimatorConfig,
}

impl EngineWorker {
    pub fn new(
        config: WorkerConfig,
        requests: mpsc::UnboundedReceiver<WorkerRequest>,
        responses: mpsc::UnboundedSender<WorkerResponse>,
    ) -> Self {
        let engine = EngineHandle::new(
            config.factory.create(),
            config.bundle,
            ResourceStore::new(),
            config.capabilities,
        );
        Self {
            requests,
            responses,
            engine,
            estimator: config.estimator,
        }
    }

    /// Serves requests until `Terminate` or until the caller goes away.
    pub async fn run(mut self) {
        info!("Engine worker started");

        while let Some(request) = self.requests.recv().await {
            match request {
                WorkerRequest::Load => {
                    let engine = self.engine.clone();
                    let result = relay_progress(&self.responses, |tx| async move {
                        engine.initialize(Some(tx)).await
                    })
                    .await;
                    self.respond(result.map(|()| WorkerPayload::Loaded));
                }
                WorkerRequest::Convert(request) => {
                    if !self.serve_convert(request).await {
                        info!("Engine worker stopped");
                        return;
                    }
                }
                WorkerRequest::Terminate => {
                    self.engine.shutdown().await;
                    self.respond(Ok(WorkerPayload::Terminated));
                    info!("Engine worker stopped");
                    return;
                }
            }
        }

        debug!("Worker caller went away");
        self.engine.shutdown().await;
        info!("Engine worker stopped");
    }

    /// Runs a conversion while still listening for `Terminate`.
    ///
    /// Returns `false` once the engine has been shut down and the worker
    /// must stop.
    async fn serve_convert(&mut self, request: ConvertRequest) -> bool {
        let engine = self.engine.clone();
        let estimator = self.estimator;
        let responses = self.responses.clone();
        let mut conversion = Box::pin(relay_progress(&responses, |tx| async move {
            convert(&engine, request, estimator, tx).await
        }));

        let terminate_requested = loop {
            tokio::select! {
                result = &mut conversion => {
                    self.respond(result.map(WorkerPayload::Converted));
                    return true;
                }
                next = self.requests.recv() => match next {
                    Some(WorkerRequest::Terminate) => break true,
                    None => break false,
                    Some(other) => {
                        warn!(request = other.label(), "Ignoring request while a conversion is in flight");
                    }
                },
            }
        };

        info!("Terminating worker during conversion");
        // Dropping the conversion kills the engine process.
        drop(conversion);
        self.engine.shutdown().await;
        if terminate_requested {
            self.respond(Ok(WorkerPayload::Terminated));
        }
        false
    }

    fn respond(&self, result: Result<WorkerPayload, EngineError>) {
        let response = match result {
            Ok(payload) => WorkerResponse::Success(payload),
            Err(e) => WorkerResponse::Error(WorkerFault::from(&e)),
        };
        if self.responses.send(response).is_err() {
            debug!("Worker response dropped, caller is gone");
        }
    }
}

async fn convert(
    engine: &EngineHandle,
    request: ConvertRequest,
    estimator: EstimatorConfig,
    progress: mpsc::Sender<ProgressSnapshot>,
) -> Result<ConvertedAudio, EngineError> {
    debug!(name = %request.name, size = request.size, kind = %request.kind, "Converting in worker");

    let job = TranscodeJob {
        file_name: request.name,
        duration_secs: request.duration_secs,
        bytes: request.bytes.into_bytes(),
    };
    let audio = run_transcode(engine.engine().as_ref(), job, estimator, &progress).await?;

    Ok(ConvertedAudio {
        name: audio.name,
        bytes: TransferBuffer::new(audio.bytes),
        bitrate_kbps: audio.bitrate_kbps,
        duration_secs: audio.duration_secs,
    })
}

/// Runs `op` with a fresh progress sender whose snapshots are forwarded as
/// `Progress` responses until `op` settles.
async fn relay_progress<F, Fut, T>(responses: &mpsc::UnboundedSender<WorkerResponse>, op: F) -> T
where
    F: FnOnce(mpsc::Sender<ProgressSnapshot>) -> Fut,
    Fut: Future<Output = T>,
{
    let (tx, mut rx) = mpsc::channel(PROGRESS_BUFFER);
    let work = op(tx);
    let forward = async {
        while let Some(snapshot) = rx.recv().await {
            let _ = responses.send(WorkerResponse::Progress(snapshot));
        }
    };
    let (result, ()) = tokio::join!(work, forward);
    result
}

/// Starts a worker on a dedicated thread with its own runtime.
pub fn spawn_worker(config: WorkerConfig) -> Result<WorkerLink, EngineError> {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (response_tx, response_rx) = mpsc::unbounded_channel();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .thread_name(WORKER_THREAD_NAME)
        .build()
        .map_err(|e| EngineError::transport(format!("failed to build worker runtime: {e}")))?;

    let worker = EngineWorker::new(config, request_rx, response_tx);
    thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || runtime.block_on(worker.run()))
        .map_err(|e| EngineError::transport(format!("failed to spawn worker thread: {e}")))?;

    Ok(WorkerLink {
        requests: request_tx,
        responses: response_rx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MediaEngine;
    use crate::error::ErrorKind;
    use crate::media::MediaKind;
    use crate::testing::MockEngine;
    use bytes::Bytes;
    use std::time::Duration;

    fn config(engine: Arc<MockEngine>, capabilities: HostCapabilities) -> WorkerConfig {
        let factory = move || -> Arc<dyn MediaEngine> { engine.clone() };
        WorkerConfig {
            factory: Arc::new(factory),
            bundle: BundleSource::Local,
            capabilities,
            estimator: EstimatorConfig::default(),
        }
    }

    fn convert_request() -> WorkerRequest {
        WorkerRequest::Convert(ConvertRequest {
            name: "clip.mp4".to_string(),
            size: 4,
            kind: MediaKind::Mp4,
            duration_secs: Some(12.0),
            bytes: TransferBuffer::new(Bytes::from_static(b"mp4!")),
        })
    }

    #[tokio::test]
    async fn test_load_then_convert() {
        let engine = Arc::new(MockEngine::new());
        let mut link = spawn_worker(config(engine.clone(), HostCapabilities::full())).unwrap();
        let (tx, _rx) = mpsc::channel(64);

        let loaded = link.request(WorkerRequest::Load, &tx).await.unwrap();
        assert!(matches!(loaded, WorkerPayload::Loaded));

        let converted = link.request(convert_request(), &tx).await.unwrap();
        match converted {
            WorkerPayload::Converted(audio) => {
                assert_eq!(audio.name, "clip.mp3");
                assert_eq!(audio.bitrate_kbps, 128);
                assert_eq!(audio.duration_secs, Some(12.0));
                assert!(!audio.bytes.is_empty());
            }
            other => panic!("unexpected payload: {other:?}"),
        }
        assert_eq!(engine.load_count().await, 1);
    }

    #[tokio::test]
    async fn test_load_fault_keeps_its_kind() {
        let caps = HostCapabilities {
            isolated_execution: true,
            shared_memory: false,
        };
        let mut link = spawn_worker(config(Arc::new(MockEngine::new()), caps)).unwrap();
        let (tx, _rx) = mpsc::channel(64);

        let err = link.request(WorkerRequest::Load, &tx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EngineUnavailable);
    }

    #[tokio::test]
    async fn test_terminate_interrupts_conversion() {
        let engine = Arc::new(MockEngine::new());
        engine.set_exec_delay(Duration::from_secs(30)).await;
        let mut link = spawn_worker(config(engine.clone(), HostCapabilities::full())).unwrap();
        let control = link.control();
        let (tx, _rx) = mpsc::channel(64);

        link.request(WorkerRequest::Load, &tx).await.unwrap();

        let terminate = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            control.send(WorkerRequest::Terminate).unwrap();
        };
        let (result, ()) = tokio::join!(link.request(convert_request(), &tx), terminate);

        assert!(matches!(result, Ok(WorkerPayload::Terminated)));
        assert!(engine.terminate_count().await >= 1);
    }

    #[tokio::test]
    async fn test_request_after_worker_exit_is_transport_error() {
        let mut link = spawn_worker(config(Arc::new(MockEngine::new()), HostCapabilities::full())).unwrap();
        let (tx, _rx) = mpsc::channel(64);

        link.request(WorkerRequest::Terminate, &tx).await.unwrap();
        let err = link.request(WorkerRequest::Load, &tx).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TransportError);
    }
}
