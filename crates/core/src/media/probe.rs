//! Metadata probing and preview extraction.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::types::InputSource;

/// Preview bounding box.
pub const PREVIEW_MAX_WIDTH: u32 = 320;
pub const PREVIEW_MAX_HEIGHT: u32 = 240;

/// What probing learned about an input. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaMetadata {
    pub duration_secs: Option<f64>,
    pub format: Option<String>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub video_width: Option<u32>,
    pub video_height: Option<u32>,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    /// Probe binary not found.
    #[error("probe binary not found at path: {path}")]
    BinaryNotFound { path: PathBuf },

    #[error("probe failed: {reason}")]
    Failed { reason: String },

    /// Failed to parse probe output.
    #[error("failed to parse probe output: {reason}")]
    Parse { reason: String },

    #[error("probe timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Optional metadata collaborator used during input selection.
#[async_trait]
pub trait MediaProber: Send + Sync {
    fn name(&self) -> &str;

    /// Reads container metadata.
    async fn probe(&self, source: &InputSource) -> Result<MediaMetadata, ProbeError>;

    /// Extracts a single JPEG frame no larger than the preview bounding box.
    async fn preview(
        &self,
        source: &InputSource,
        duration_secs: Option<f64>,
    ) -> Result<Bytes, ProbeError>;
}

/// Metadata probe timeout: 1s per MB, between 5s and 20s.
pub fn metadata_timeout(size_bytes: u64) -> Duration {
    scaled_timeout(size_bytes, 1_000.0, 5_000.0, 20_000.0)
}

/// Preview timeout: 1.5s per MB, between 10s and 30s.
pub fn preview_timeout(size_bytes: u64) -> Duration {
    scaled_timeout(size_bytes, 1_500.0, 10_000.0, 30_000.0)
}

fn scaled_timeout(size_bytes: u64, per_mb_ms: f64, base_ms: f64, max_ms: f64) -> Duration {
    let size_mb = size_bytes as f64 / (1024.0 * 1024.0);
    let ms = (size_mb * per_mb_ms).min(max_ms).max(base_ms);
    Duration::from_millis(ms as u64)
}

/// Where to grab the preview frame: 1s in, but never past 10% of the
/// duration or half a second before the end.
pub fn preview_seek_secs(duration_secs: Option<f64>) -> f64 {
    match duration_secs {
        Some(d) if d.is_finite() => 1.0_f64.min(d * 0.1).min(d - 0.5).max(0.0),
        _ => 0.0,
    }
}

/// Prober backed by `ffprobe` and `ffmpeg`.
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
    ffmpeg_path: PathBuf,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: PathBuf, ffmpeg_path: PathBuf) -> Self {
        Self {
            ffprobe_path,
            ffmpeg_path,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(PathBuf::from("ffprobe"), PathBuf::from("ffmpeg"))
    }

    /// Runs `program` reading the input either from its path or from stdin.
    async fn run(
        program: &Path,
        leading: &[String],
        source: &InputSource,
        trailing: &[String],
    ) -> Result<Output, ProbeError> {
        let input = match source {
            InputSource::File(path) => path.to_string_lossy().into_owned(),
            InputSource::Memory(_) => "pipe:0".to_string(),
        };

        let mut child = Command::new(program)
            .args(leading)
            .arg(&input)
            .args(trailing)
            .stdin(if matches!(source, InputSource::Memory(_)) {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ProbeError::BinaryNotFound {
                        path: program.to_path_buf(),
                    }
                } else {
                    ProbeError::Io(e)
                }
            })?;

        if let (InputSource::Memory(bytes), Some(mut stdin)) = (source, child.stdin.take()) {
            let bytes = bytes.clone();
            tokio::spawn(async move {
                // The reader may stop early once it has what it needs.
                if let Err(e) = stdin.write_all(&bytes).await {
                    debug!(error = %e, "Probe stdin closed early");
                }
            });
        }

        Ok(child.wait_with_output().await?)
    }

    /// Parses ffprobe JSON output into MediaMetadata.
    fn parse_probe_output(output: &str) -> Result<MediaMetadata, ProbeError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            format_name: Option<String>,
            duration: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: String,
            codec_name: Option<String>,
            width: Option<u32>,
            height: Option<u32>,
        }

        let probe: ProbeOutput = serde_json::from_str(output).map_err(|e| ProbeError::Parse {
            reason: format!("Failed to parse ffprobe output: {}", e),
        })?;

        let duration_secs = probe
            .format
            .duration
            .as_ref()
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0);

        let audio_stream = probe.streams.iter().find(|s| s.codec_type == "audio");
        let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");

        Ok(MediaMetadata {
            duration_secs,
            format: probe
                .format
                .format_name
                .as_deref()
                .and_then(|f| f.split(',').next())
                .map(str::to_string),
            video_codec: video_stream.and_then(|s| s.codec_name.clone()),
            audio_codec: audio_stream.and_then(|s| s.codec_name.clone()),
            video_width: video_stream.and_then(|s| s.width),
            video_height: video_stream.and_then(|s| s.height),
        })
    }

    fn preview_args(duration_secs: Option<f64>) -> (Vec<String>, Vec<String>) {
        let leading = vec![
            "-v".to_string(),
            "error".to_string(),
            "-ss".to_string(),
            format!("{:.3}", preview_seek_secs(duration_secs)),
            "-i".to_string(),
        ];
        let trailing = vec![
            "-frames:v".to_string(),
            "1".to_string(),
            // Scale down to the bounding box, keeping the aspect ratio
            "-vf".to_string(),
            format!(
                "scale='min({},iw)':'min({},ih)':force_original_aspect_ratio=decrease",
                PREVIEW_MAX_WIDTH, PREVIEW_MAX_HEIGHT
            ),
            "-q:v".to_string(),
            "3".to_string(),
            "-f".to_string(),
            "image2pipe".to_string(),
            "-vcodec".to_string(),
            "mjpeg".to_string(),
            "pipe:1".to_string(),
        ];
        (leading, trailing)
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    fn name(&self) -> &str {
        "ffprobe"
    }

    async fn probe(&self, source: &InputSource) -> Result<MediaMetadata, ProbeError> {
        let leading: Vec<String> = ["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let output = Self::run(&self.ffprobe_path, &leading, source, &[]).await?;
        if !output.status.success() {
            return Err(ProbeError::failed(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_probe_output(&stdout)
    }

    async fn preview(
        &self,
        source: &InputSource,
        duration_secs: Option<f64>,
    ) -> Result<Bytes, ProbeError> {
        let (leading, trailing) = Self::preview_args(duration_secs);
        let output = Self::run(&self.ffmpeg_path, &leading, source, &trailing).await?;

        if !output.status.success() || output.stdout.is_empty() {
            return Err(ProbeError::failed(format!(
                "preview extraction failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(Bytes::from(output.stdout))
    }
}
