//! Error types for the engine module.

use thiserror::Error;

use crate::error::ErrorKind;

/// Errors raised at the engine/adapter boundary.
///
/// `Clone` because a single in-flight initialization hands the same outcome
/// to every caller awaiting it.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A host capability the engine depends on is missing.
    #[error("required host capability is not available: {capability}")]
    CapabilityMissing { capability: String },

    /// Fetching one of the engine bundle resources failed.
    #[error("failed to fetch engine resource {url}: {reason}")]
    BundleFetch { url: String, reason: String },

    /// The engine could not be initialized.
    #[error("engine failed to load: {reason}")]
    LoadFailed { reason: String },

    /// No engine instance exists to run the operation on.
    #[error("no engine instance available")]
    MissingInstance,

    /// The engine exists but has not finished loading.
    #[error("engine is not loaded")]
    NotLoaded,

    /// The transcode command was rejected by the engine.
    #[error("engine command failed: {reason}")]
    ExecFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// Reading an output file returned text instead of binary data.
    #[error("engine returned non-binary data for {name}")]
    NonBinaryOutput { name: String },

    /// The engine's private filesystem failed.
    #[error("engine filesystem error: {reason}")]
    Filesystem { reason: String },

    /// The worker already has a request in flight.
    #[error("worker is busy with another request")]
    WorkerBusy,

    /// The input bytes could not be read.
    #[error("failed to read input: {reason}")]
    InputRead { reason: String },

    /// The channel to the isolated worker faulted.
    #[error("worker transport failed: {reason}")]
    Transport { reason: String },

    /// A message violated the request/response contract.
    #[error("worker protocol violation: {reason}")]
    Protocol { reason: String },

    /// An error already classified on the far side of the worker boundary.
    #[error("{message}")]
    Reported {
        kind: ErrorKind,
        message: String,
        details: Option<String>,
    },
}

impl EngineError {
    pub fn capability_missing(capability: impl Into<String>) -> Self {
        Self::CapabilityMissing {
            capability: capability.into(),
        }
    }

    pub fn load_failed(reason: impl Into<String>) -> Self {
        Self::LoadFailed {
            reason: reason.into(),
        }
    }

    /// Creates an exec failure carrying the engine's stderr output.
    pub fn exec_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ExecFailed {
            reason: reason.into(),
            stderr,
        }
    }

    pub fn filesystem(reason: impl Into<String>) -> Self {
        Self::Filesystem {
            reason: reason.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Taxonomy kind this error is surfaced as.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CapabilityMissing { .. } => ErrorKind::EngineUnavailable,
            Self::BundleFetch { .. } | Self::LoadFailed { .. } => ErrorKind::EngineLoadError,
            Self::MissingInstance
            | Self::NotLoaded
            | Self::ExecFailed { .. }
            | Self::NonBinaryOutput { .. }
            | Self::Filesystem { .. }
            | Self::WorkerBusy => ErrorKind::ConversionError,
            Self::InputRead { .. } => ErrorKind::FileReadError,
            Self::Transport { .. } | Self::Protocol { .. } => ErrorKind::TransportError,
            Self::Reported { kind, .. } => *kind,
        }
    }

    /// Raw detail worth keeping next to the human message.
    pub fn details(&self) -> Option<String> {
        match self {
            Self::ExecFailed {
                stderr: Some(stderr),
                reason,
            } => Some(format!("{reason}\n{stderr}")),
            Self::Reported { details, .. } => details.clone(),
            other => Some(other.to_string()),
        }
    }

    /// Whether retrying the same call can succeed without changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BundleFetch { .. } | Self::Transport { .. } | Self::WorkerBusy
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            EngineError::capability_missing("shared memory").kind(),
            ErrorKind::EngineUnavailable
        );
        assert_eq!(
            EngineError::load_failed("bad wasm").kind(),
            ErrorKind::EngineLoadError
        );
        assert_eq!(EngineError::NotLoaded.kind(), ErrorKind::ConversionError);
        assert_eq!(
            EngineError::NonBinaryOutput {
                name: "output.mp3".into()
            }
            .kind(),
            ErrorKind::ConversionError
        );
        assert_eq!(
            EngineError::transport("worker thread exited").kind(),
            ErrorKind::TransportError
        );
    }

    #[test]
    fn test_exec_failure_details_include_stderr() {
        let err = EngineError::exec_failed("exit status 1", Some("Invalid data found".into()));
        let details = err.details().unwrap();
        assert!(details.contains("exit status 1"));
        assert!(details.contains("Invalid data found"));
    }

    #[test]
    fn test_retryable() {
        assert!(EngineError::transport("x").is_retryable());
        assert!(!EngineError::NotLoaded.is_retryable());
        assert!(!EngineError::capability_missing("x").is_retryable());
    }
}
