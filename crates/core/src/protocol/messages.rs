use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::error::ErrorKind;
use crate::media::MediaKind;
use crate::progress::ProgressSnapshot;

/// A binary payload whose ownership moves with the message.
///
/// Deliberately not `Clone`: once a buffer is placed in a message the sender
/// has given it up, and the receiver takes it out with
/// [`into_bytes`](Self::into_bytes) without copying.
#[derive(Debug)]
pub struct TransferBuffer(Bytes);

impl TransferBuffer {
    pub fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

#[derive(Debug)]
pub struct ConvertRequest {
    pub name: String,
    pub size: u64,
    pub kind: MediaKind,
    pub duration_secs: Option<f64>,
    pub bytes: TransferBuffer,
}

/// Caller to worker.
#[derive(Debug)]
pub enum WorkerRequest {
    Load,
    Convert(ConvertRequest),
    /// Releases the worker's engine. Fire-and-forget.
    Terminate,
}

impl WorkerRequest {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Convert(_) => "convert",
            Self::Terminate => "terminate",
        }
    }
}

#[derive(Debug)]
pub struct ConvertedAudio {
    pub name: String,
    pub bytes: TransferBuffer,
    pub bitrate_kbps: u32,
    pub duration_secs: Option<f64>,
}

#[derive(Debug)]
pub enum WorkerPayload {
    Loaded,
    Converted(ConvertedAudio),
    Terminated,
}

/// A classified error carried across the worker boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerFault {
    pub code: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<&EngineError> for WorkerFault {
    fn from(err: &EngineError) -> Self {
        let (code, message) = match err {
            EngineError::Reported { kind, message, .. } => (*kind, message.clone()),
            other => (other.kind(), other.kind().default_message().to_string()),
        };
        Self {
            code,
            message,
            details: err.details(),
            timestamp: Utc::now(),
        }
    }
}

impl From<WorkerFault> for EngineError {
    fn from(fault: WorkerFault) -> Self {
        EngineError::Reported {
            kind: fault.code,
            message: fault.message,
            details: fault.details,
        }
    }
}

/// Worker to caller.
///
/// Every request is answered by zero or more `Progress` responses followed by
/// exactly one `Success` or `Error`.
#[derive(Debug)]
pub enum WorkerResponse {
    Progress(ProgressSnapshot),
    Success(WorkerPayload),
    Error(WorkerFault),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_round_trip_keeps_kind() {
        let err = EngineError::capability_missing("shared memory");
        let fault = WorkerFault::from(&err);
        assert_eq!(fault.code, ErrorKind::EngineUnavailable);

        let back = EngineError::from(fault);
        assert_eq!(back.kind(), ErrorKind::EngineUnavailable);
        assert!(matches!(back, EngineError::Reported { .. }));
    }

    #[test]
    fn test_fault_serializes_code() {
        let fault = WorkerFault::from(&EngineError::exec_failed("exit status 1", None));
        let json = serde_json::to_value(&fault).unwrap();
        assert_eq!(json["code"], "CONVERSION_ERROR");
        assert_eq!(json["message"], "MP3 conversion failed");
    }

    #[test]
    fn test_transfer_buffer_hands_over_without_copy() {
        let bytes = Bytes::from(vec![1u8; 4096]);
        let ptr = bytes.as_ptr();
        let buffer = TransferBuffer::new(bytes);
        assert_eq!(buffer.len(), 4096);
        assert_eq!(buffer.into_bytes().as_ptr(), ptr);
    }
}
