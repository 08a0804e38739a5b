//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the engine-facing traits,
//! allowing full session lifecycles to be tested without ffmpeg or network
//! access.
//!
//! # Example
//!
//! ```rust,ignore
//! use vidmp3_core::testing::{fixtures, MockEngine, MockProber};
//!
//! let engine = Arc::new(MockEngine::new());
//! let prober = MockProber::new().with_duration(Some(12.0));
//!
//! // Configure mock behavior
//! engine.set_exec_delay(Duration::from_millis(50)).await;
//!
//! // Build adapters with fixtures::engine_factory(engine.clone())...
//! ```

mod mock_bundle_fetcher;
mod mock_engine;
mod mock_prober;

pub use mock_bundle_fetcher::MockBundleFetcher;
pub use mock_engine::MockEngine;
pub use mock_prober::MockProber;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::sync::Arc;

    use super::MockEngine;
    use crate::adapter::AdapterParts;
    use crate::engine::{BundleSource, EngineFactory, HostCapabilities, MediaEngine};
    use crate::media::InputCandidate;
    use crate::progress::EstimatorConfig;
    use crate::resources::ResourceStore;

    /// An in-memory candidate of `size_bytes` zero bytes.
    pub fn video_candidate(file_name: &str, declared_type: &str, size_bytes: usize) -> InputCandidate {
        InputCandidate::from_bytes(file_name, Some(declared_type), vec![0u8; size_bytes])
    }

    /// A `video/mp4` candidate.
    pub fn mp4_candidate(file_name: &str, size_bytes: usize) -> InputCandidate {
        video_candidate(file_name, "video/mp4", size_bytes)
    }

    /// A factory that hands out the same mock engine every time.
    pub fn engine_factory(engine: Arc<MockEngine>) -> Arc<dyn EngineFactory> {
        Arc::new(move || -> Arc<dyn MediaEngine> { engine.clone() })
    }

    /// Adapter parts backed by a mock engine and a local bundle.
    pub fn adapter_parts(
        engine: Arc<MockEngine>,
        capabilities: HostCapabilities,
        resources: ResourceStore,
    ) -> AdapterParts {
        AdapterParts {
            factory: engine_factory(engine),
            bundle: BundleSource::Local,
            capabilities,
            estimator: EstimatorConfig::default(),
            resources,
        }
    }
}
