//! Types for the conversion session.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::error::ConversionFailure;
use crate::media::{InputMedia, OutputAudio};
use crate::progress::ProgressSnapshot;
use crate::resources::ResourceHandle;

/// Lifecycle status of a conversion session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    #[default]
    Idle,
    /// Validating an input or initializing the engine.
    Loading,
    Processing,
    Completed,
    Error,
}

impl ConversionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Whether work started by the session is still running.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Loading | Self::Processing)
    }
}

impl fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single source of truth for one session.
///
/// `output` is set only in `Completed`, `error` only in `Error`, and
/// `progress` only in `Loading`, `Processing` and `Completed`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionState {
    pub status: ConversionStatus,
    pub input: Option<InputMedia>,
    pub output: Option<OutputAudio>,
    pub progress: Option<ProgressSnapshot>,
    pub error: Option<ConversionFailure>,
}

impl ConversionState {
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    pub fn can_convert(&self) -> bool {
        self.input.is_some()
            && matches!(self.status, ConversionStatus::Idle | ConversionStatus::Error)
    }

    pub fn can_download(&self) -> bool {
        self.status == ConversionStatus::Completed && self.output.is_some()
    }

    /// Handles this state owns and must release before it is discarded.
    pub(crate) fn owned_handles(&self) -> impl Iterator<Item = &ResourceHandle> {
        self.output
            .as_ref()
            .map(|o| &o.handle)
            .into_iter()
            .chain(self.input.as_ref().and_then(|i| i.preview.as_ref()))
    }
}

/// What `retrieve_output` hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputArtifact {
    pub handle: ResourceHandle,
    /// Source name with its extension replaced by `.mp3`.
    pub file_name: String,
    pub size_bytes: u64,
    pub bitrate_kbps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

impl From<&OutputAudio> for OutputArtifact {
    fn from(output: &OutputAudio) -> Self {
        Self {
            handle: output.handle.clone(),
            file_name: output.name.clone(),
            size_bytes: output.size_bytes,
            bitrate_kbps: output.bitrate_kbps,
            duration_secs: output.duration_secs,
        }
    }
}

/// Misuse of the session API. Conversion failures are not errors here; they
/// land in the state as [`ConversionFailure`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("invalid session state: expected {expected}, got {actual}")]
    InvalidState {
        expected: String,
        actual: ConversionStatus,
    },

    #[error("no input selected")]
    NoInput,

    /// Another operation of this session is still running.
    #[error("session is busy")]
    Busy,
}
