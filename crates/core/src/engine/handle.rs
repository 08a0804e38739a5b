use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::bundle::BundleSource;
use super::capabilities::HostCapabilities;
use super::error::EngineError;
use super::single_flight::SingleFlight;
use super::traits::MediaEngine;
use crate::metrics;
use crate::progress::{steps, ProgressSnapshot};
use crate::resources::ResourceStore;

/// Shared, lazily initialized engine instance.
///
/// Cheap to clone; every clone refers to the same engine and the same
/// pending initialization. Whoever builds the adapters owns the handle.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    engine: Arc<dyn MediaEngine>,
    bundle: BundleSource,
    resources: ResourceStore,
    capabilities: HostCapabilities,
    init: SingleFlight,
}

impl EngineHandle {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        bundle: BundleSource,
        resources: ResourceStore,
        capabilities: HostCapabilities,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                engine,
                bundle,
                resources,
                capabilities,
                init: SingleFlight::new(),
            }),
        }
    }

    pub fn engine(&self) -> &Arc<dyn MediaEngine> {
        &self.inner.engine
    }

    pub fn capabilities(&self) -> HostCapabilities {
        self.inner.capabilities
    }

    pub fn is_ready(&self) -> bool {
        self.inner.engine.is_loaded()
    }

    /// Number of initializations actually started.
    pub fn load_attempts(&self) -> u64 {
        self.inner.init.attempts()
    }

    /// Loads the engine once.
    ///
    /// Returns immediately when already loaded. Concurrent calls await the
    /// same pending load; only the caller that started it receives progress.
    pub async fn initialize(
        &self,
        progress: Option<mpsc::Sender<ProgressSnapshot>>,
    ) -> Result<(), EngineError> {
        if self.is_ready() {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        self.inner
            .init
            .run(move || async move { inner.load(progress).await })
            .await
    }

    /// Releases the engine instance.
    pub async fn shutdown(&self) {
        if self.is_ready() {
            info!(engine = self.inner.engine.name(), "Terminating engine");
        }
        self.inner.engine.terminate().await;
    }
}

impl EngineInner {
    async fn load(&self, progress: Option<mpsc::Sender<ProgressSnapshot>>) -> Result<(), EngineError> {
        let report = |percentage: f64, step: &str| {
            if let Some(tx) = &progress {
                let _ = tx.try_send(ProgressSnapshot::starting(percentage, step));
            }
        };

        self.capabilities.require_shared_memory()?;

        info!(engine = self.engine.name(), bundle = ?self.bundle, "Loading engine");
        report(10.0, steps::INITIALIZING);

        let result = self.fetch_and_load(&report).await;

        match &result {
            Ok(()) => {
                metrics::ENGINE_LOADS.with_label_values(&["success"]).inc();
                info!(engine = self.engine.name(), "Engine ready");
                report(100.0, steps::ENGINE_READY);
            }
            Err(e) => {
                metrics::ENGINE_LOADS.with_label_values(&["failed"]).inc();
                warn!(engine = self.engine.name(), error = %e, "Engine failed to load");
            }
        }

        result
    }

    async fn fetch_and_load(&self, report: &impl Fn(f64, &str)) -> Result<(), EngineError> {
        let assets = self
            .bundle
            .resolve(&self.resources)
            .await
            .map_err(into_load_error)?;
        report(50.0, steps::FETCHING_ENGINE);

        let result = self.engine.load(&assets).await;
        // The engine holds its own copy once loading settles.
        assets.release(&self.resources);

        result.map_err(into_load_error)
    }
}

fn into_load_error(err: EngineError) -> EngineError {
    match err {
        EngineError::CapabilityMissing { .. }
        | EngineError::LoadFailed { .. }
        | EngineError::BundleFetch { .. } => err,
        other => EngineError::load_failed(other.to_string()),
    }
}
