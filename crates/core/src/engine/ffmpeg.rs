//! FFmpeg-based engine implementation.

use async_trait::async_trait;
use bytes::Bytes;
use regex_lite::Regex;
use std::collections::VecDeque;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

use super::bundle::EngineAssets;
use super::config::EngineConfig;
use super::error::EngineError;
use super::traits::{FileData, MediaEngine};
use crate::progress::EngineProgress;

/// Number of trailing stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Engine that drives an `ffmpeg` executable.
///
/// Its private filesystem is a temporary directory created on load and
/// removed on terminate.
pub struct FfmpegEngine {
    config: EngineConfig,
    workspace: Mutex<Option<TempDir>>,
}

impl FfmpegEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            workspace: Mutex::new(None),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    fn workspace_dir(&self) -> Result<PathBuf, EngineError> {
        self.workspace
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .ok_or(EngineError::NotLoaded)
    }

    /// Resolves a file name inside the workspace.
    fn resolve(&self, name: &str) -> Result<PathBuf, EngineError> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.workspace_dir()?.join(name)),
            _ => Err(EngineError::filesystem(format!("invalid file name: {name:?}"))),
        }
    }

    /// Builds the full ffmpeg argument list around a command.
    fn build_args(&self, args: &[String]) -> Vec<String> {
        let mut full = vec![
            "-y".to_string(), // Overwrite output
            "-nostdin".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            // Progress output for parsing
            "-progress".to_string(),
            "pipe:2".to_string(),
        ];
        full.extend(self.config.extra_ffmpeg_args.iter().cloned());
        full.extend(args.iter().cloned());
        full
    }

    async fn check_binary(&self) -> Result<(), EngineError> {
        let output = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::load_failed(format!(
                        "ffmpeg not found at path: {}",
                        self.config.ffmpeg_path.display()
                    ))
                } else {
                    EngineError::load_failed(e.to_string())
                }
            })?;

        if !output.status.success() {
            return Err(EngineError::load_failed(format!(
                "ffmpeg -version exited with code: {:?}",
                output.status.code()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn load(&self, assets: &EngineAssets) -> Result<(), EngineError> {
        for asset in assets.iter() {
            debug!(role = ?asset.role, handle = %asset.handle, size = asset.bytes.len(), "Engine asset");
        }

        self.check_binary().await?;

        tokio::fs::create_dir_all(&self.config.workspace_root)
            .await
            .map_err(|e| {
                EngineError::load_failed(format!(
                    "failed to create workspace root {}: {e}",
                    self.config.workspace_root.display()
                ))
            })?;

        let root = self.config.workspace_root.clone();
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix("engine-").tempdir_in(root)
        })
        .await
        .map_err(|e| EngineError::load_failed(e.to_string()))?
        .map_err(|e| EngineError::load_failed(format!("failed to create workspace: {e}")))?;

        info!(workspace = %dir.path().display(), "FFmpeg engine loaded");
        *self.workspace.lock().unwrap_or_else(PoisonError::into_inner) = Some(dir);
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.workspace
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn write_file(&self, name: &str, bytes: Bytes) -> Result<(), EngineError> {
        let path = self.resolve(name)?;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| EngineError::filesystem(format!("failed to write {name}: {e}")))
    }

    async fn exec(
        &self,
        args: &[String],
        progress: mpsc::Sender<EngineProgress>,
    ) -> Result<(), EngineError> {
        let workspace = self.workspace_dir()?;
        let args = self.build_args(args);
        debug!(?args, "Running ffmpeg");

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .current_dir(&workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::exec_failed(format!("failed to spawn ffmpeg: {e}"), None))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::exec_failed("ffmpeg stderr was not captured", None))?;
        let mut reader = BufReader::new(stderr).split(b'\n');

        let duration_regex = Regex::new(r"Duration: (\d+):(\d{2}):(\d{2}(?:\.\d+)?)").ok();
        let time_regex = Regex::new(r"^out_time_(?:us|ms)=(\d+)").ok();

        let timeout_duration = Duration::from_secs(self.config.exec_timeout_secs);
        let result = timeout(timeout_duration, async {
            let mut total_secs = None;
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

            // Metadata tags are not always UTF-8; keep draining until EOF so
            // ffmpeg never blocks on a full pipe.
            while let Some(raw) = reader.next_segment().await? {
                let line = decode_line(&raw);

                if total_secs.is_none() {
                    total_secs = duration_regex.as_ref().and_then(|re| parse_duration(re, &line));
                }

                if let Some(processed_us) = time_regex.as_ref().and_then(|re| parse_out_time(re, &line)) {
                    // Non-blocking send
                    let _ = progress.try_send(EngineProgress {
                        fraction: progress_fraction(processed_us, total_secs),
                        processed_us,
                    });
                    continue;
                }

                if line == "progress=end" {
                    let _ = progress.try_send(EngineProgress {
                        fraction: 1.0,
                        processed_us: total_secs.map(|t| (t * 1_000_000.0) as i64).unwrap_or(0),
                    });
                    continue;
                }

                if is_progress_key_value(&line) {
                    continue;
                }

                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }

            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, tail))
        })
        .await;

        match result {
            Ok(Ok((status, tail))) => {
                if status.success() {
                    Ok(())
                } else {
                    let stderr = Vec::from(tail).join("\n");
                    Err(EngineError::exec_failed(
                        format!("ffmpeg exited with code: {:?}", status.code()),
                        (!stderr.is_empty()).then_some(stderr),
                    ))
                }
            }
            Ok(Err(e)) => Err(EngineError::exec_failed(e.to_string(), None)),
            Err(_) => {
                // Kill the process on timeout
                let _ = child.kill().await;
                Err(EngineError::exec_failed(
                    format!("ffmpeg timed out after {} seconds", self.config.exec_timeout_secs),
                    None,
                ))
            }
        }
    }

    async fn read_file(&self, name: &str) -> Result<FileData, EngineError> {
        let path = self.resolve(name)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| EngineError::filesystem(format!("failed to read {name}: {e}")))?;
        Ok(FileData::Binary(Bytes::from(bytes)))
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        let path = self.resolve(name)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| EngineError::filesystem(format!("failed to delete {name}: {e}")))
    }

    async fn terminate(&self) {
        let dir = self
            .workspace
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(dir) = dir {
            debug!(workspace = %dir.path().display(), "Removing engine workspace");
            let _ = tokio::task::spawn_blocking(move || dir.close()).await;
        }
    }
}

/// Decodes one stderr line, replacing invalid UTF-8.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Parses the input duration from ffmpeg's `Duration: HH:MM:SS.xx` line.
fn parse_duration(re: &Regex, line: &str) -> Option<f64> {
    let caps = re.captures(line)?;
    let hours = caps.get(1)?.as_str().parse::<f64>().ok()?;
    let minutes = caps.get(2)?.as_str().parse::<f64>().ok()?;
    let seconds = caps.get(3)?.as_str().parse::<f64>().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Parses `out_time_us=` (or the legacy, equally microsecond `out_time_ms=`).
fn parse_out_time(re: &Regex, line: &str) -> Option<i64> {
    re.captures(line)?.get(1)?.as_str().parse::<i64>().ok()
}

fn progress_fraction(processed_us: i64, total_secs: Option<f64>) -> f64 {
    match total_secs {
        Some(total) if total > 0.0 => (processed_us as f64 / 1_000_000.0 / total).clamp(0.0, 1.0),
        _ => 0.0,
    }
}

fn is_progress_key_value(line: &str) -> bool {
    line.split_once('=').is_some_and(|(key, _)| {
        !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
    })
}
