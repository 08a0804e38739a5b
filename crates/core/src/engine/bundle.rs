//! Engine resource bundle fetching and relocation.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::EngineError;
use crate::resources::{ResourceHandle, ResourceStore};

/// Locations of the three engine bundle resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Engine core script.
    #[serde(default = "default_core_url")]
    pub core_url: String,

    /// Binary codec payload.
    #[serde(default = "default_payload_url")]
    pub payload_url: String,

    /// Worker bootstrap script.
    #[serde(default = "default_bootstrap_url")]
    pub bootstrap_url: String,

    /// Timeout for each fetch in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

const BUNDLE_BASE_URL: &str = "https://unpkg.com/@ffmpeg/core@0.12.6/dist/esm";

fn default_core_url() -> String {
    format!("{BUNDLE_BASE_URL}/ffmpeg-core.js")
}

fn default_payload_url() -> String {
    format!("{BUNDLE_BASE_URL}/ffmpeg-core.wasm")
}

fn default_bootstrap_url() -> String {
    format!("{BUNDLE_BASE_URL}/ffmpeg-core.worker.js")
}

fn default_fetch_timeout() -> u64 {
    60
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            core_url: default_core_url(),
            payload_url: default_payload_url(),
            bootstrap_url: default_bootstrap_url(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

impl BundleConfig {
    fn entries(&self) -> [(AssetRole, &str); 3] {
        [
            (AssetRole::Core, self.core_url.as_str()),
            (AssetRole::Payload, self.payload_url.as_str()),
            (AssetRole::Bootstrap, self.bootstrap_url.as_str()),
        ]
    }
}

/// What a bundle resource is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetRole {
    Core,
    Payload,
    Bootstrap,
}

impl AssetRole {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Core | Self::Bootstrap => "text/javascript",
            Self::Payload => "application/wasm",
        }
    }
}

/// Fetches raw bundle bytes from a URL.
#[async_trait]
pub trait BundleFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, EngineError>;
}

/// Fetches bundle resources over HTTP.
pub struct HttpBundleFetcher {
    client: Client,
}

impl HttpBundleFetcher {
    pub fn new(timeout: Duration) -> Result<Self, EngineError> {
        let client = Client::builder()
            .user_agent(format!("vidmp3/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::load_failed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn from_config(config: &BundleConfig) -> Result<Self, EngineError> {
        Self::new(Duration::from_secs(config.fetch_timeout_secs))
    }
}

#[async_trait]
impl BundleFetcher for HttpBundleFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, EngineError> {
        let fetch_error = |reason: String| EngineError::BundleFetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    fetch_error("request timed out".to_string())
                } else {
                    fetch_error(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(fetch_error(format!("HTTP {}", response.status())));
        }

        response.bytes().await.map_err(|e| fetch_error(e.to_string()))
    }
}

/// One relocated bundle resource.
#[derive(Debug, Clone)]
pub struct EngineAsset {
    pub role: AssetRole,
    pub source_url: String,
    /// Local handle the bytes were relocated to.
    pub handle: ResourceHandle,
    pub bytes: Bytes,
}

/// The set of relocated resources handed to [`MediaEngine::load`](super::MediaEngine::load).
///
/// Empty when the engine loads from its local installation.
#[derive(Debug, Clone, Default)]
pub struct EngineAssets {
    assets: Vec<EngineAsset>,
}

impl EngineAssets {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn get(&self, role: AssetRole) -> Option<&EngineAsset> {
        self.assets.iter().find(|a| a.role == role)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EngineAsset> {
        self.assets.iter()
    }

    /// Releases every relocated handle.
    pub fn release(&self, store: &ResourceStore) {
        for asset in &self.assets {
            store.release(&asset.handle);
        }
    }
}

/// Fetches every bundle resource and registers it in `store`.
///
/// On failure the resources relocated so far are released before returning.
pub async fn relocate_bundle(
    config: &BundleConfig,
    fetcher: &dyn BundleFetcher,
    store: &ResourceStore,
) -> Result<EngineAssets, EngineError> {
    let mut relocated = EngineAssets::empty();

    for (role, url) in config.entries() {
        match fetcher.fetch(url).await {
            Ok(bytes) => {
                let handle = store.create(bytes.clone(), role.mime_type());
                debug!(?role, url, handle = %handle, size = bytes.len(), "Relocated engine resource");
                relocated.assets.push(EngineAsset {
                    role,
                    source_url: url.to_string(),
                    handle,
                    bytes,
                });
            }
            Err(e) => {
                warn!(?role, url, error = %e, "Failed to fetch engine resource");
                relocated.release(store);
                return Err(e);
            }
        }
    }

    Ok(relocated)
}

/// Where the engine loads from.
#[derive(Clone, Default)]
pub enum BundleSource {
    /// The engine's local installation.
    #[default]
    Local,
    /// A remote bundle relocated through the resource store before loading.
    Remote {
        config: BundleConfig,
        fetcher: Arc<dyn BundleFetcher>,
    },
}

impl BundleSource {
    pub fn remote(config: BundleConfig, fetcher: Arc<dyn BundleFetcher>) -> Self {
        Self::Remote { config, fetcher }
    }

    /// Resolves the assets to load the engine from.
    pub async fn resolve(&self, store: &ResourceStore) -> Result<EngineAssets, EngineError> {
        match self {
            Self::Local => Ok(EngineAssets::empty()),
            Self::Remote { config, fetcher } => relocate_bundle(config, fetcher.as_ref(), store).await,
        }
    }
}

impl fmt::Debug for BundleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("Local"),
            Self::Remote { config, .. } => f.debug_struct("Remote").field("config", config).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBundleFetcher;

    #[test]
    fn test_default_urls() {
        let config = BundleConfig::default();
        assert!(config.core_url.ends_with("ffmpeg-core.js"));
        assert!(config.payload_url.ends_with("ffmpeg-core.wasm"));
        assert!(config.bootstrap_url.ends_with("ffmpeg-core.worker.js"));
    }

    #[tokio::test]
    async fn test_relocate_registers_every_resource() {
        let store = ResourceStore::new();
        let fetcher = MockBundleFetcher::new();
        let config = BundleConfig::default();

        let assets = relocate_bundle(&config, &fetcher, &store).await.unwrap();

        assert_eq!(assets.len(), 3);
        assert_eq!(store.live_count(), 3);
        let payload = assets.get(AssetRole::Payload).unwrap();
        assert_eq!(store.mime_type(&payload.handle).as_deref(), Some("application/wasm"));
        assert_eq!(fetcher.fetched_urls().await.len(), 3);

        assets.release(&store);
        assert_eq!(store.live_count(), 0);
    }

    #[tokio::test]
    async fn test_relocate_failure_releases_partial_resources() {
        let store = ResourceStore::new();
        let config = BundleConfig::default();
        let fetcher = MockBundleFetcher::new();
        fetcher.fail_url(&config.payload_url).await;

        let err = relocate_bundle(&config, &fetcher, &store).await.unwrap_err();

        assert!(matches!(err, EngineError::BundleFetch { .. }));
        assert_eq!(store.live_count(), 0);
    }

    #[tokio::test]
    async fn test_local_source_resolves_to_no_assets() {
        let store = ResourceStore::new();
        let assets = BundleSource::Local.resolve(&store).await.unwrap();
        assert!(assets.is_empty());
    }
}
