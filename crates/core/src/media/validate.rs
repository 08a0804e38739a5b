use std::sync::Arc;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info};

use super::probe::{metadata_timeout, preview_timeout, MediaMetadata, MediaProber};
use super::types::{display_name, InputCandidate, InputMedia, MediaKind};
use crate::error::ErrorKind;
use crate::resources::{ResourceHandle, ResourceStore};

pub const PREVIEW_MIME_TYPE: &str = "image/jpeg";

/// Why a candidate input was rejected.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("No file selected")]
    NoInput,

    #[error("Unsupported file format: {file_name}")]
    UnsupportedFormat {
        file_name: String,
        declared_type: Option<String>,
    },

    #[error("File is too large: {size_bytes} bytes exceeds the limit of {limit_bytes} bytes")]
    FileTooLarge { size_bytes: u64, limit_bytes: u64 },

    #[error("Failed to read {file_name}: {reason}")]
    Read { file_name: String, reason: String },
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoInput | Self::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            Self::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            Self::Read { .. } => ErrorKind::FileReadError,
        }
    }
}

/// Validates candidate inputs and builds [`InputMedia`].
///
/// The kind check runs before anything touches the bytes. Probing and
/// preview extraction are optional and their failures leave the
/// corresponding fields unset.
#[derive(Clone)]
pub struct InputValidator {
    resources: ResourceStore,
    max_file_size_bytes: Option<u64>,
    prober: Option<Arc<dyn MediaProber>>,
    preview_enabled: bool,
}

impl InputValidator {
    pub fn new(resources: ResourceStore) -> Self {
        Self {
            resources,
            max_file_size_bytes: None,
            prober: None,
            preview_enabled: false,
        }
    }

    /// Sets the size ceiling. `None` means unlimited.
    pub fn with_max_file_size(mut self, max_bytes: Option<u64>) -> Self {
        self.max_file_size_bytes = max_bytes;
        self
    }

    pub fn with_prober(mut self, prober: Arc<dyn MediaProber>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn with_preview(mut self, enabled: bool) -> Self {
        self.preview_enabled = enabled;
        self
    }

    /// Validates the candidates in order and returns the first accepted one.
    ///
    /// When every candidate is rejected, the first candidate's error is
    /// returned.
    pub async fn select_first(
        &self,
        candidates: Vec<InputCandidate>,
    ) -> Result<InputMedia, ValidationError> {
        let mut first_error = None;

        for candidate in candidates {
            match self.validate(candidate).await {
                Ok(media) => return Ok(media),
                Err(e) => {
                    debug!(error = %e, "Rejected input candidate");
                    first_error.get_or_insert(e);
                }
            }
        }

        Err(first_error.unwrap_or(ValidationError::NoInput))
    }

    pub async fn validate(&self, candidate: InputCandidate) -> Result<InputMedia, ValidationError> {
        let InputCandidate {
            file_name,
            declared_type,
            source,
        } = candidate;

        let kind = MediaKind::detect(declared_type.as_deref(), &file_name).ok_or_else(|| {
            ValidationError::UnsupportedFormat {
                file_name: file_name.clone(),
                declared_type: declared_type.clone(),
            }
        })?;

        let size_bytes = source
            .byte_len()
            .await
            .map_err(|e| ValidationError::Read {
                file_name: file_name.clone(),
                reason: e.to_string(),
            })?;

        if let Some(limit_bytes) = self.max_file_size_bytes {
            if size_bytes > limit_bytes {
                return Err(ValidationError::FileTooLarge {
                    size_bytes,
                    limit_bytes,
                });
            }
        }

        let mut media = InputMedia {
            display_name: display_name(&file_name).to_string(),
            file_name,
            size_bytes,
            kind,
            declared_type,
            duration_secs: None,
            preview: None,
            source,
        };

        if let Some(prober) = &self.prober {
            let metadata = self.probe(prober.as_ref(), &media).await;
            media.duration_secs = metadata.and_then(|m| m.duration_secs);

            if self.preview_enabled {
                media.preview = self.extract_preview(prober.as_ref(), &media).await;
            }
        }

        info!(
            file = %media.file_name,
            kind = %media.kind,
            size = media.size_bytes,
            duration = ?media.duration_secs,
            "Input selected"
        );
        Ok(media)
    }

    async fn probe(&self, prober: &dyn MediaProber, media: &InputMedia) -> Option<MediaMetadata> {
        let limit = metadata_timeout(media.size_bytes);
        match timeout(limit, prober.probe(&media.source)).await {
            Ok(Ok(metadata)) => Some(metadata),
            Ok(Err(e)) => {
                debug!(file = %media.file_name, error = %e, "Metadata probe failed");
                None
            }
            Err(_) => {
                debug!(file = %media.file_name, timeout_ms = limit.as_millis() as u64, "Metadata probe timed out");
                None
            }
        }
    }

    async fn extract_preview(
        &self,
        prober: &dyn MediaProber,
        media: &InputMedia,
    ) -> Option<ResourceHandle> {
        let limit = preview_timeout(media.size_bytes);
        match timeout(limit, prober.preview(&media.source, media.duration_secs)).await {
            Ok(Ok(jpeg)) => Some(self.resources.create(jpeg, PREVIEW_MIME_TYPE)),
            Ok(Err(e)) => {
                debug!(file = %media.file_name, error = %e, "Preview extraction failed");
                None
            }
            Err(_) => {
                debug!(file = %media.file_name, timeout_ms = limit.as_millis() as u64, "Preview extraction timed out");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::InputSource;
    use crate::testing::MockProber;
    use bytes::Bytes;

    fn mp4(name: &str, size: usize) -> InputCandidate {
        InputCandidate::from_bytes(name, Some("video/mp4"), vec![0u8; size])
    }

    #[tokio::test]
    async fn test_unsupported_kind_is_rejected_before_reading() {
        let validator = InputValidator::new(ResourceStore::new());
        let candidate = InputCandidate {
            file_name: "missing.zip".to_string(),
            declared_type: Some("application/zip".to_string()),
            // Reading this would fail with FileReadError.
            source: InputSource::File("/nonexistent/missing.zip".into()),
        };

        let err = validator.validate(candidate).await.unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedFormat { .. }));
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[tokio::test]
    async fn test_size_ceiling() {
        let validator = InputValidator::new(ResourceStore::new()).with_max_file_size(Some(1024));

        let err = validator.validate(mp4("big.mp4", 2048)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileTooLarge);
        assert!(validator.validate(mp4("small.mp4", 1024)).await.is_ok());
    }

    #[tokio::test]
    async fn test_unreadable_file_is_read_error() {
        let validator = InputValidator::new(ResourceStore::new());
        let candidate = InputCandidate::from_path("/nonexistent/clip.mp4");

        let err = validator.validate(candidate).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileReadError);
    }

    #[tokio::test]
    async fn test_probe_populates_duration_and_preview() {
        let store = ResourceStore::new();
        let prober = Arc::new(MockProber::new().with_duration(Some(12.0)));
        let validator = InputValidator::new(store.clone())
            .with_prober(prober)
            .with_preview(true);

        let media = validator.validate(mp4("clip.final.mp4", 64)).await.unwrap();

        assert_eq!(media.duration_secs, Some(12.0));
        assert_eq!(media.display_name, "clip.final");
        assert_eq!(media.output_name(), "clip.final.mp3");
        let preview = media.preview.unwrap();
        assert_eq!(store.mime_type(&preview).as_deref(), Some("image/jpeg"));
    }

    #[tokio::test]
    async fn test_probe_failures_are_swallowed() {
        let store = ResourceStore::new();
        let prober = Arc::new(MockProber::new().failing());
        let validator = InputValidator::new(store.clone())
            .with_prober(prober)
            .with_preview(true);

        let media = validator.validate(mp4("clip.mp4", 64)).await.unwrap();

        assert!(media.duration_secs.is_none());
        assert!(media.preview.is_none());
        assert_eq!(store.live_count(), 0);
    }

    #[tokio::test]
    async fn test_select_first_skips_rejected_candidates() {
        let validator = InputValidator::new(ResourceStore::new());
        let candidates = vec![
            InputCandidate::from_bytes("notes.txt", Some("text/plain"), Bytes::from_static(b"hi")),
            mp4("talk.mp4", 16),
        ];

        let media = validator.select_first(candidates).await.unwrap();
        assert_eq!(media.file_name, "talk.mp4");
    }

    #[tokio::test]
    async fn test_select_first_reports_first_error() {
        let validator = InputValidator::new(ResourceStore::new()).with_max_file_size(Some(8));
        let candidates = vec![
            InputCandidate::from_bytes("a.zip", Some("application/zip"), Bytes::new()),
            mp4("b.mp4", 16),
        ];

        let err = validator.select_first(candidates).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);

        let err = validator.select_first(Vec::new()).await.unwrap_err();
        assert!(matches!(err, ValidationError::NoInput));
    }
}
