//! Mock media prober for testing.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::media::{InputSource, MediaMetadata, MediaProber, ProbeError};

/// Minimal JPEG start and end markers.
const PREVIEW_JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0xFF, 0xD9];

/// Mock implementation of the MediaProber trait.
///
/// Reports a fixed duration and returns a tiny JPEG as the preview, or fails
/// both operations when built with [`failing`](Self::failing).
#[derive(Debug, Clone)]
pub struct MockProber {
    duration_secs: Option<f64>,
    fail: bool,
    probe_count: Arc<RwLock<usize>>,
}

impl Default for MockProber {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProber {
    pub fn new() -> Self {
        Self {
            duration_secs: None,
            fail: false,
            probe_count: Arc::new(RwLock::new(0)),
        }
    }

    pub fn with_duration(mut self, duration_secs: Option<f64>) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    /// Make every probe and preview fail.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub async fn probe_count(&self) -> usize {
        *self.probe_count.read().await
    }
}

#[async_trait]
impl MediaProber for MockProber {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, _source: &InputSource) -> Result<MediaMetadata, ProbeError> {
        *self.probe_count.write().await += 1;
        if self.fail {
            return Err(ProbeError::failed("mock probe failure"));
        }
        Ok(MediaMetadata {
            duration_secs: self.duration_secs,
            format: Some("mov,mp4,m4a,3gp,3g2,mj2".to_string()),
            video_codec: Some("h264".to_string()),
            audio_codec: Some("aac".to_string()),
            video_width: Some(1280),
            video_height: Some(720),
        })
    }

    async fn preview(
        &self,
        _source: &InputSource,
        _duration_secs: Option<f64>,
    ) -> Result<Bytes, ProbeError> {
        if self.fail {
            return Err(ProbeError::failed("mock preview failure"));
        }
        Ok(Bytes::from_static(PREVIEW_JPEG))
    }
}
