use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use super::direct::DirectAdapter;
use super::isolated::IsolatedAdapter;
use super::traits::TranscodeAdapter;
use crate::engine::{BundleSource, EngineError, EngineFactory, EngineHandle, HostCapabilities};
use crate::media::{InputMedia, OutputAudio};
use crate::progress::{EstimatorConfig, ProgressSnapshot};
use crate::protocol::WorkerConfig;
use crate::resources::ResourceStore;

/// Which adapter to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterPreference {
    /// Isolated when the host supports it, Direct otherwise.
    #[default]
    Auto,
    Direct,
    Isolated,
}

/// The adapter variant actually built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    Direct,
    Isolated,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Isolated => "isolated",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AdapterPreference {
    /// Resolves the preference against the host.
    ///
    /// An explicit preference is honored as is; an Isolated adapter on a host
    /// without isolation then fails at initialization.
    pub fn resolve(self, capabilities: &HostCapabilities) -> AdapterKind {
        match self {
            Self::Direct => AdapterKind::Direct,
            Self::Isolated => AdapterKind::Isolated,
            Self::Auto if capabilities.isolated_execution => AdapterKind::Isolated,
            Self::Auto => AdapterKind::Direct,
        }
    }
}

/// Everything needed to build either adapter.
#[derive(Clone)]
pub struct AdapterParts {
    pub factory: Arc<dyn EngineFactory>,
    pub bundle: BundleSource,
    pub capabilities: HostCapabilities,
    pub estimator: EstimatorConfig,
    pub resources: ResourceStore,
}

/// The strategy chosen once at construction.
#[derive(Clone)]
pub enum EngineAdapter {
    Direct(DirectAdapter),
    Isolated(IsolatedAdapter),
}

impl EngineAdapter {
    pub fn kind(&self) -> AdapterKind {
        match self {
            Self::Direct(_) => AdapterKind::Direct,
            Self::Isolated(_) => AdapterKind::Isolated,
        }
    }

    fn as_dyn(&self) -> &dyn TranscodeAdapter {
        match self {
            Self::Direct(a) => a,
            Self::Isolated(a) => a,
        }
    }
}

/// Factory function to build the adapter for `preference`.
pub fn create_adapter(preference: AdapterPreference, parts: AdapterParts) -> EngineAdapter {
    let kind = preference.resolve(&parts.capabilities);
    info!(
        preference = ?preference,
        adapter = %kind,
        isolated_execution = parts.capabilities.isolated_execution,
        shared_memory = parts.capabilities.shared_memory,
        "Selected transcoding adapter"
    );

    match kind {
        AdapterKind::Direct => {
            let engine = EngineHandle::new(
                parts.factory.create(),
                parts.bundle,
                parts.resources.clone(),
                parts.capabilities,
            );
            EngineAdapter::Direct(DirectAdapter::new(engine, parts.resources, parts.estimator))
        }
        AdapterKind::Isolated => {
            let config = WorkerConfig {
                factory: parts.factory,
                bundle: parts.bundle,
                capabilities: parts.capabilities,
                estimator: parts.estimator,
            };
            EngineAdapter::Isolated(IsolatedAdapter::new(config, parts.resources))
        }
    }
}

#[async_trait]
impl TranscodeAdapter for EngineAdapter {
    fn name(&self) -> &str {
        self.as_dyn().name()
    }

    fn is_ready(&self) -> bool {
        self.as_dyn().is_ready()
    }

    async fn initialize(&self, progress: mpsc::Sender<ProgressSnapshot>) -> Result<(), EngineError> {
        self.as_dyn().initialize(progress).await
    }

    async fn transcode(
        &self,
        input: &InputMedia,
        progress: mpsc::Sender<ProgressSnapshot>,
    ) -> Result<OutputAudio, EngineError> {
        self.as_dyn().transcode(input, progress).await
    }

    async fn shutdown(&self) {
        self.as_dyn().shutdown().await
    }

    fn abort(&self) -> bool {
        self.as_dyn().abort()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MediaEngine;
    use crate::testing::MockEngine;

    fn parts(capabilities: HostCapabilities) -> AdapterParts {
        let engine = Arc::new(MockEngine::new());
        let factory = move || -> Arc<dyn MediaEngine> { engine.clone() };
        AdapterParts {
            factory: Arc::new(factory),
            bundle: BundleSource::Local,
            capabilities,
            estimator: EstimatorConfig::default(),
            resources: ResourceStore::new(),
        }
    }

    #[test]
    fn test_auto_prefers_isolated_when_available() {
        let adapter = create_adapter(AdapterPreference::Auto, parts(HostCapabilities::full()));
        assert_eq!(adapter.kind(), AdapterKind::Isolated);
        assert_eq!(adapter.name(), "isolated");
    }

    #[test]
    fn test_auto_falls_back_to_direct() {
        let caps = HostCapabilities {
            isolated_execution: false,
            shared_memory: true,
        };
        let adapter = create_adapter(AdapterPreference::Auto, parts(caps));
        assert_eq!(adapter.kind(), AdapterKind::Direct);
        assert_eq!(adapter.name(), "direct");
    }

    #[test]
    fn test_explicit_preference_is_honored() {
        let caps = HostCapabilities {
            isolated_execution: false,
            shared_memory: true,
        };
        assert_eq!(AdapterPreference::Isolated.resolve(&caps), AdapterKind::Isolated);
        assert_eq!(
            AdapterPreference::Direct.resolve(&HostCapabilities::full()),
            AdapterKind::Direct
        );
    }

    #[test]
    fn test_preference_deserializes_lowercase() {
        let pref: AdapterPreference = serde_json::from_str("\"isolated\"").unwrap();
        assert_eq!(pref, AdapterPreference::Isolated);
    }
}
