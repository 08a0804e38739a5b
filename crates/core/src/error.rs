//! Error taxonomy shared by every layer of the conversion engine.
//!
//! Component errors (`EngineError`, `ValidationError`, ...) stay specific to
//! where they are raised. Each of them maps onto exactly one [`ErrorKind`],
//! and the session stores the result as a [`ConversionFailure`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::media::ValidationError;

/// Stable classification of everything that can put a session into `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Input kind is not in the accepted set.
    UnsupportedFormat,
    /// Input exceeds the configured size ceiling.
    FileTooLarge,
    /// Reading the input raised an I/O fault.
    FileReadError,
    /// Fetching the resource bundle or initializing the engine failed.
    EngineLoadError,
    /// A required host capability is absent.
    EngineUnavailable,
    /// The engine rejected the transcode.
    ConversionError,
    /// The isolated worker's message channel faulted.
    TransportError,
}

impl ErrorKind {
    /// Whether the user can retry without fixing the environment first.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::EngineUnavailable | Self::ConversionError)
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            Self::FileTooLarge => "FILE_TOO_LARGE",
            Self::FileReadError => "FILE_READ_ERROR",
            Self::EngineLoadError => "ENGINE_LOAD_ERROR",
            Self::EngineUnavailable => "ENGINE_UNAVAILABLE",
            Self::ConversionError => "CONVERSION_ERROR",
            Self::TransportError => "TRANSPORT_ERROR",
        }
    }

    /// Human-readable message shown when nothing more specific is known.
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat => "Unsupported file format",
            Self::FileTooLarge => "File is too large",
            Self::FileReadError => "Failed to read the file",
            Self::EngineLoadError => "Failed to load the transcoding engine",
            Self::EngineUnavailable => "The transcoding engine is unavailable on this host",
            Self::ConversionError => "MP3 conversion failed",
            Self::TransportError => "Lost connection to the background worker",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// The error record carried by a session in the `Error` state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionFailure {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ConversionFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details,
            timestamp: Utc::now(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind.is_recoverable()
    }
}

impl From<&EngineError> for ConversionFailure {
    fn from(err: &EngineError) -> Self {
        match err {
            // Already classified on the other side of the worker boundary.
            EngineError::Reported {
                kind,
                message,
                details,
            } => Self::new(*kind, message.clone(), details.clone()),
            other => {
                let kind = other.kind();
                Self::new(kind, kind.default_message(), other.details())
            }
        }
    }
}

impl From<&ValidationError> for ConversionFailure {
    fn from(err: &ValidationError) -> Self {
        Self::new(err.kind(), err.to_string(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability_table() {
        assert!(ErrorKind::UnsupportedFormat.is_recoverable());
        assert!(ErrorKind::FileTooLarge.is_recoverable());
        assert!(ErrorKind::FileReadError.is_recoverable());
        assert!(ErrorKind::EngineLoadError.is_recoverable());
        assert!(ErrorKind::TransportError.is_recoverable());
        assert!(!ErrorKind::EngineUnavailable.is_recoverable());
        assert!(!ErrorKind::ConversionError.is_recoverable());
    }

    #[test]
    fn test_kind_serializes_as_code() {
        let json = serde_json::to_string(&ErrorKind::EngineUnavailable).unwrap();
        assert_eq!(json, "\"ENGINE_UNAVAILABLE\"");
        assert_eq!(ErrorKind::EngineUnavailable.to_string(), "ENGINE_UNAVAILABLE");
    }

    #[test]
    fn test_failure_from_engine_error_keeps_raw_detail() {
        let err = EngineError::exec_failed("exit status 1", Some("moov atom not found".into()));
        let failure = ConversionFailure::from(&err);
        assert_eq!(failure.kind, ErrorKind::ConversionError);
        assert_eq!(failure.message, "MP3 conversion failed");
        assert!(failure.details.as_deref().unwrap().contains("exit status 1"));
        assert!(!failure.is_recoverable());
    }

    #[test]
    fn test_failure_from_reported_error_is_not_downgraded() {
        let err = EngineError::Reported {
            kind: ErrorKind::EngineUnavailable,
            message: "shared memory is not available".to_string(),
            details: None,
        };
        let failure = ConversionFailure::from(&err);
        assert_eq!(failure.kind, ErrorKind::EngineUnavailable);
        assert_eq!(failure.message, "shared memory is not available");
    }
}
