//! Types for the progress module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Labels for the phases a conversion walks through.
pub mod steps {
    pub const INITIALIZING: &str = "Initializing transcoding engine...";
    pub const FETCHING_ENGINE: &str = "Loading engine core files...";
    pub const ENGINE_READY: &str = "Transcoding engine ready";
    pub const READING_METADATA: &str = "Reading file metadata...";
    pub const LOADING_FILE: &str = "Loading file...";
    pub const CONVERTING: &str = "Converting to MP3...";
    pub const FINALIZING: &str = "Finalizing conversion...";
    pub const COMPLETED: &str = "Conversion complete";
}

/// A raw progress signal from the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineProgress {
    /// Completion fraction, nominally in `[0, 1]`.
    pub fraction: f64,
    /// Media timestamp processed so far, in microseconds.
    pub processed_us: i64,
}

/// Point-in-time view of conversion progress. Replaced, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// 0 to 100.
    pub percentage: f64,
    /// Current step label.
    pub step: String,
    /// When the current phase started.
    pub started_at: DateTime<Utc>,
    /// Estimated milliseconds remaining, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_ms: Option<u64>,
}

impl ProgressSnapshot {
    pub fn new(percentage: f64, step: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            percentage: percentage.clamp(0.0, 100.0),
            step: step.into(),
            started_at,
            eta_ms: None,
        }
    }

    /// A snapshot for a phase that starts now.
    pub fn starting(percentage: f64, step: impl Into<String>) -> Self {
        Self::new(percentage, step, Utc::now())
    }

    pub fn with_eta(mut self, eta_ms: Option<u64>) -> Self {
        self.eta_ms = eta_ms;
        self
    }
}
