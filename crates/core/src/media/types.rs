//! Types for the media module.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::resources::ResourceHandle;

/// Accepted input container kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Mp4,
    Webm,
    Ogg,
    Avi,
    Mov,
    Mkv,
    Flv,
    Wmv,
}

impl MediaKind {
    pub const ALL: [MediaKind; 8] = [
        Self::Mp4,
        Self::Webm,
        Self::Ogg,
        Self::Avi,
        Self::Mov,
        Self::Mkv,
        Self::Flv,
        Self::Wmv,
    ];

    /// Canonical declared type.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp4 => "video/mp4",
            Self::Webm => "video/webm",
            Self::Ogg => "video/ogg",
            Self::Avi => "video/avi",
            Self::Mov => "video/mov",
            Self::Mkv => "video/mkv",
            Self::Flv => "video/flv",
            Self::Wmv => "video/wmv",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
            Self::Ogg => "ogg",
            Self::Avi => "avi",
            Self::Mov => "mov",
            Self::Mkv => "mkv",
            Self::Flv => "flv",
            Self::Wmv => "wmv",
        }
    }

    /// Matches a declared type, ignoring case and parameters.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "video/mp4" => Some(Self::Mp4),
            "video/webm" => Some(Self::Webm),
            "video/ogg" => Some(Self::Ogg),
            "video/avi" | "video/x-msvideo" | "video/msvideo" => Some(Self::Avi),
            "video/mov" | "video/quicktime" => Some(Self::Mov),
            "video/mkv" | "video/x-matroska" => Some(Self::Mkv),
            "video/flv" | "video/x-flv" => Some(Self::Flv),
            "video/wmv" | "video/x-ms-wmv" => Some(Self::Wmv),
            _ => None,
        }
    }

    /// Matches a file extension, with or without the leading dot.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "mp4" => Some(Self::Mp4),
            "webm" => Some(Self::Webm),
            "ogg" | "ogv" => Some(Self::Ogg),
            "avi" => Some(Self::Avi),
            "mov" => Some(Self::Mov),
            "mkv" => Some(Self::Mkv),
            "flv" => Some(Self::Flv),
            "wmv" => Some(Self::Wmv),
            _ => None,
        }
    }

    /// Declared type first, file extension as fallback.
    pub fn detect(declared_type: Option<&str>, file_name: &str) -> Option<Self> {
        declared_type
            .and_then(Self::from_mime)
            .or_else(|| file_extension(file_name).and_then(Self::from_extension))
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Position of the extension dot, ignoring a leading dot.
fn extension_dot(file_name: &str) -> Option<usize> {
    file_name.rfind('.').filter(|&i| i > 0)
}

/// Extension of `file_name` without the dot.
pub fn file_extension(file_name: &str) -> Option<&str> {
    extension_dot(file_name).map(|i| &file_name[i + 1..])
}

/// `file_name` without its last extension.
pub fn display_name(file_name: &str) -> &str {
    match extension_dot(file_name) {
        Some(i) => &file_name[..i],
        None => file_name,
    }
}

/// Suggested output name: the input name with its extension replaced.
pub fn replace_extension(file_name: &str, extension: &str) -> String {
    format!("{}.{}", display_name(file_name), extension)
}

/// Where the input bytes live.
#[derive(Debug, Clone)]
pub enum InputSource {
    File(PathBuf),
    Memory(Bytes),
}

impl InputSource {
    pub async fn read(&self) -> std::io::Result<Bytes> {
        match self {
            Self::File(path) => tokio::fs::read(path).await.map(Bytes::from),
            Self::Memory(bytes) => Ok(bytes.clone()),
        }
    }

    pub async fn byte_len(&self) -> std::io::Result<u64> {
        match self {
            Self::File(path) => tokio::fs::metadata(path).await.map(|m| m.len()),
            Self::Memory(bytes) => Ok(bytes.len() as u64),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Memory(_) => None,
        }
    }
}

/// A not-yet-validated input offered by the caller.
#[derive(Debug, Clone)]
pub struct InputCandidate {
    pub file_name: String,
    pub declared_type: Option<String>,
    pub source: InputSource,
}

impl InputCandidate {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            file_name,
            declared_type: None,
            source: InputSource::File(path),
        }
    }

    pub fn from_bytes(
        file_name: impl Into<String>,
        declared_type: Option<&str>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            declared_type: declared_type.map(str::to_string),
            source: InputSource::Memory(bytes.into()),
        }
    }

    pub fn with_declared_type(mut self, declared_type: impl Into<String>) -> Self {
        self.declared_type = Some(declared_type.into());
        self
    }
}

/// A validated input. A new selection always builds a new value.
#[derive(Debug, Clone, Serialize)]
pub struct InputMedia {
    pub file_name: String,
    /// File name without its extension.
    pub display_name: String,
    pub size_bytes: u64,
    pub kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// JPEG still, owned by the session that selected this input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<ResourceHandle>,
    #[serde(skip)]
    pub source: InputSource,
}

impl InputMedia {
    pub fn output_name(&self) -> String {
        replace_extension(&self.file_name, "mp3")
    }
}

/// The produced MP3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputAudio {
    pub name: String,
    pub size_bytes: u64,
    pub handle: ResourceHandle,
    pub bitrate_kbps: u32,
    /// Copied from the input, never recomputed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}
