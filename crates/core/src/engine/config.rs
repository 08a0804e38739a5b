//! Configuration for the engine module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::bundle::BundleConfig;

/// Configuration for the ffmpeg-backed engine and prober.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// Directory the engine's private workspaces are created in.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Timeout for a single engine command in seconds.
    #[serde(default = "default_exec_timeout")]
    pub exec_timeout_secs: u64,

    /// FFmpeg log level. Must be `info` or more verbose for the input
    /// duration to be reported.
    #[serde(default = "default_log_level")]
    pub ffmpeg_log_level: String,

    /// Additional global ffmpeg arguments.
    #[serde(default)]
    pub extra_ffmpeg_args: Vec<String>,

    /// Remote resource bundle. When unset the engine loads from the local
    /// installation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<BundleConfig>,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_workspace_root() -> PathBuf {
    std::env::temp_dir().join("vidmp3")
}

fn default_exec_timeout() -> u64 {
    3600 // 1 hour
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            workspace_root: default_workspace_root(),
            exec_timeout_secs: default_exec_timeout(),
            ffmpeg_log_level: default_log_level(),
            extra_ffmpeg_args: Vec::new(),
            bundle: None,
        }
    }
}

impl EngineConfig {
    /// Creates a new config with custom ffmpeg/ffprobe paths.
    pub fn with_paths(ffmpeg_path: PathBuf, ffprobe_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            ..Default::default()
        }
    }

    pub fn with_workspace_root(mut self, root: PathBuf) -> Self {
        self.workspace_root = root;
        self
    }

    /// Sets the timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.exec_timeout_secs = timeout_secs;
        self
    }

    pub fn with_bundle(mut self, bundle: BundleConfig) -> Self {
        self.bundle = Some(bundle);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(config.ffprobe_path, PathBuf::from("ffprobe"));
        assert_eq!(config.exec_timeout_secs, 3600);
        assert!(config.bundle.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::with_paths(
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffprobe"),
        )
        .with_workspace_root(PathBuf::from("/tmp/test"))
        .with_timeout(60)
        .with_bundle(BundleConfig::default());

        assert_eq!(config.ffmpeg_path, PathBuf::from("/usr/local/bin/ffmpeg"));
        assert_eq!(config.workspace_root, PathBuf::from("/tmp/test"));
        assert_eq!(config.exec_timeout_secs, 60);
        assert!(config.bundle.is_some());
    }
}
