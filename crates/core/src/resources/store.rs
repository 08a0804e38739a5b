use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Opaque reference to bytes held by a [`ResourceStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceHandle(String);

impl ResourceHandle {
    fn generate() -> Self {
        Self(format!("blob:vidmp3/{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum ResourceError {
    /// The handle was never created or has already been released.
    #[error("resource handle is not live: {0}")]
    NotLive(ResourceHandle),

    #[error("failed to write resource {handle} to disk: {source}")]
    Write {
        handle: ResourceHandle,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug)]
struct StoredResource {
    bytes: Bytes,
    mime_type: String,
}

/// Registry of live binary resources.
///
/// Cheap to clone; clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct ResourceStore {
    entries: Arc<RwLock<HashMap<ResourceHandle, StoredResource>>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `bytes` and returns the handle that now owns them.
    pub fn create(&self, bytes: impl Into<Bytes>, mime_type: &str) -> ResourceHandle {
        let handle = ResourceHandle::generate();
        let bytes = bytes.into();
        debug!(handle = %handle, size = bytes.len(), mime_type, "Created resource");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                handle.clone(),
                StoredResource {
                    bytes,
                    mime_type: mime_type.to_string(),
                },
            );
        handle
    }

    /// Returns the bytes behind a live handle.
    pub fn fetch(&self, handle: &ResourceHandle) -> Result<Bytes, ResourceError> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle)
            .map(|r| r.bytes.clone())
            .ok_or_else(|| ResourceError::NotLive(handle.clone()))
    }

    pub fn mime_type(&self, handle: &ResourceHandle) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle)
            .map(|r| r.mime_type.clone())
    }

    /// Releases a handle. Releasing an already-invalid handle is a no-op.
    ///
    /// Returns whether the handle was live.
    pub fn release(&self, handle: &ResourceHandle) -> bool {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(handle)
            .is_some();
        if removed {
            debug!(handle = %handle, "Released resource");
        } else {
            debug!(handle = %handle, "Ignoring release of a handle that is not live");
        }
        removed
    }

    pub fn is_live(&self, handle: &ResourceHandle) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(handle)
    }

    /// Number of handles currently alive.
    pub fn live_count(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Writes the bytes behind `handle` to `path`.
    pub async fn save_to(&self, handle: &ResourceHandle, path: &Path) -> Result<u64, ResourceError> {
        let bytes = self.fetch(handle)?;
        tokio::fs::write(path, &bytes)
            .await
            .map_err(|source| ResourceError::Write {
                handle: handle.clone(),
                source,
            })?;
        Ok(bytes.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_fetch() {
        let store = ResourceStore::new();
        let handle = store.create(vec![1u8, 2, 3], "audio/mpeg");

        assert!(handle.as_str().starts_with("blob:"));
        assert_eq!(store.fetch(&handle).unwrap().as_ref(), &[1, 2, 3]);
        assert_eq!(store.mime_type(&handle).as_deref(), Some("audio/mpeg"));
        assert_eq!(store.live_count(), 1);
    }

    #[test]
    fn test_release_invalidates_handle() {
        let store = ResourceStore::new();
        let handle = store.create(Bytes::from_static(b"mp3"), "audio/mpeg");

        assert!(store.release(&handle));
        assert!(!store.is_live(&handle));
        assert!(matches!(store.fetch(&handle), Err(ResourceError::NotLive(_))));
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn test_double_release_is_swallowed() {
        let store = ResourceStore::new();
        let handle = store.create(Bytes::from_static(b"x"), "image/jpeg");

        assert!(store.release(&handle));
        assert!(!store.release(&handle));
    }

    #[test]
    fn test_clones_share_registry() {
        let store = ResourceStore::new();
        let other = store.clone();
        let handle = store.create(Bytes::from_static(b"shared"), "audio/mpeg");

        assert!(other.is_live(&handle));
        other.release(&handle);
        assert!(!store.is_live(&handle));
    }

    #[test]
    fn test_handles_are_unique() {
        let store = ResourceStore::new();
        let a = store.create(Bytes::new(), "audio/mpeg");
        let b = store.create(Bytes::new(), "audio/mpeg");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_save_to_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp3");
        let store = ResourceStore::new();
        let handle = store.create(Bytes::from_static(b"ID3"), "audio/mpeg");

        let written = store.save_to(&handle, &path).await.unwrap();
        assert_eq!(written, 3);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"ID3");
    }
}
