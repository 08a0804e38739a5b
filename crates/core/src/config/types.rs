use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::adapter::AdapterPreference;
use crate::engine::{EngineConfig, HostCapabilities};
use crate::progress::{EstimatorConfig, ProgressBand};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub host: HostConfig,
}

/// Conversion behavior
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConversionConfig {
    /// Size ceiling for inputs in bytes (default: unlimited)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_size_bytes: Option<u64>,

    /// Minimum gap between progress updates in milliseconds (default: 100)
    #[serde(default = "default_progress_throttle_ms")]
    pub progress_throttle_ms: u64,

    /// Start of the transcode progress band (default: 20)
    #[serde(default = "default_band_lower")]
    pub progress_band_lower: f64,

    /// End of the transcode progress band (default: 95)
    #[serde(default = "default_band_upper")]
    pub progress_band_upper: f64,

    /// Extract a preview frame when an input is selected (default: false)
    #[serde(default)]
    pub preview_enabled: bool,
}

fn default_progress_throttle_ms() -> u64 {
    100
}

fn default_band_lower() -> f64 {
    20.0
}

fn default_band_upper() -> f64 {
    95.0
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: None,
            progress_throttle_ms: default_progress_throttle_ms(),
            progress_band_lower: default_band_lower(),
            progress_band_upper: default_band_upper(),
            preview_enabled: false,
        }
    }
}

impl ConversionConfig {
    pub fn estimator(&self) -> EstimatorConfig {
        EstimatorConfig {
            band: ProgressBand {
                lower: self.progress_band_lower,
                upper: self.progress_band_upper,
            },
            throttle: Duration::from_millis(self.progress_throttle_ms),
        }
    }
}

/// Adapter selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AdapterConfig {
    /// "auto", "direct" or "isolated" (default: auto)
    #[serde(default)]
    pub mode: AdapterPreference,
}

/// Overrides for detected host capabilities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct HostConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolated_execution: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_memory: Option<bool>,
}

impl HostConfig {
    /// Detected capabilities with the configured overrides applied.
    pub fn capabilities(&self) -> HostCapabilities {
        HostCapabilities::detect().with_overrides(self.isolated_execution, self.shared_memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.adapter.mode, AdapterPreference::Auto);
        assert_eq!(config.conversion, ConversionConfig::default());
        assert_eq!(config.engine.exec_timeout_secs, 3600);
        assert!(config.engine.bundle.is_none());
        assert_eq!(config.host, HostConfig::default());
    }

    #[test]
    fn test_deserialize_full_config() {
        let toml = r#"
[engine]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
exec_timeout_secs = 120

[engine.bundle]
core_url = "https://cdn.example.com/core.js"

[conversion]
max_file_size_bytes = 524288000
progress_throttle_ms = 250
preview_enabled = true

[adapter]
mode = "direct"

[host]
shared_memory = false
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.engine.ffmpeg_path.to_str().unwrap(), "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.engine.exec_timeout_secs, 120);
        let bundle = config.engine.bundle.as_ref().unwrap();
        assert_eq!(bundle.core_url, "https://cdn.example.com/core.js");
        assert!(bundle.payload_url.ends_with("ffmpeg-core.wasm")); // default
        assert_eq!(config.conversion.max_file_size_bytes, Some(524_288_000));
        assert!(config.conversion.preview_enabled);
        assert_eq!(config.adapter.mode, AdapterPreference::Direct);
        assert_eq!(config.host.shared_memory, Some(false));
        assert!(!config.host.capabilities().shared_memory);
    }

    #[test]
    fn test_estimator_from_conversion_config() {
        let conversion = ConversionConfig {
            progress_throttle_ms: 250,
            progress_band_lower: 10.0,
            ..Default::default()
        };
        let estimator = conversion.estimator();
        assert_eq!(estimator.throttle, Duration::from_millis(250));
        assert_eq!(estimator.band.lower, 10.0);
        assert_eq!(estimator.band.upper, 95.0);
    }

    #[test]
    fn test_unknown_adapter_mode_fails() {
        let result: Result<Config, _> = toml::from_str("[adapter]\nmode = \"remote\"\n");
        assert!(result.is_err());
    }
}
