//! Mock transcoding engine for testing.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::engine::{EngineAssets, EngineError, FileData, MediaEngine};
use crate::progress::EngineProgress;

/// Mock implementation of the MediaEngine trait.
///
/// Provides controllable behavior for testing:
/// - Track loads, commands and terminations for assertions
/// - Inject a failure into the next load or exec
/// - Script the raw progress events an exec emits
/// - Return text instead of bytes, or fail deletes
///
/// A successful exec writes the configured output bytes to the file named by
/// the last argument, so the read-back step finds it.
///
/// # Example
///
/// ```rust,ignore
/// use vidmp3_core::testing::MockEngine;
///
/// let engine = Arc::new(MockEngine::new());
/// engine.set_next_error(EngineError::exec_failed("exit status 1", None)).await;
///
/// // ... run a conversion through an adapter ...
///
/// assert!(engine.files().await.is_empty());
/// ```
#[derive(Debug)]
pub struct MockEngine {
    loaded: AtomicBool,
    /// Files in the engine's private filesystem.
    files: Arc<RwLock<HashMap<String, Bytes>>>,
    /// Argument lists of every exec call.
    recorded_args: Arc<RwLock<Vec<Vec<String>>>>,
    /// If set, the next load or exec fails with this error.
    next_error: Arc<RwLock<Option<EngineError>>>,
    load_count: Arc<RwLock<usize>>,
    terminate_count: Arc<RwLock<usize>>,
    last_loaded_asset_count: Arc<RwLock<Option<usize>>>,
    /// How long an exec takes before it writes its output.
    exec_delay: Arc<RwLock<Duration>>,
    progress_script: Arc<RwLock<Vec<EngineProgress>>>,
    output_bytes: Arc<RwLock<Bytes>>,
    fail_deletes: Arc<RwLock<bool>>,
    text_output: Arc<RwLock<bool>>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Create a new, unloaded mock engine.
    pub fn new() -> Self {
        let script = (1..=4)
            .map(|i| EngineProgress {
                fraction: f64::from(i) * 0.25,
                processed_us: i64::from(i) * 3_000_000,
            })
            .collect();

        Self {
            loaded: AtomicBool::new(false),
            files: Arc::new(RwLock::new(HashMap::new())),
            recorded_args: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            load_count: Arc::new(RwLock::new(0)),
            terminate_count: Arc::new(RwLock::new(0)),
            last_loaded_asset_count: Arc::new(RwLock::new(None)),
            exec_delay: Arc::new(RwLock::new(Duration::ZERO)),
            progress_script: Arc::new(RwLock::new(script)),
            output_bytes: Arc::new(RwLock::new(Bytes::from_static(b"ID3\x04\x00mock mp3 frames"))),
            fail_deletes: Arc::new(RwLock::new(false)),
            text_output: Arc::new(RwLock::new(false)),
        }
    }

    /// Number of successful loads.
    pub async fn load_count(&self) -> usize {
        *self.load_count.read().await
    }

    pub async fn terminate_count(&self) -> usize {
        *self.terminate_count.read().await
    }

    /// Number of assets passed to the most recent successful load.
    pub async fn last_loaded_asset_count(&self) -> Option<usize> {
        *self.last_loaded_asset_count.read().await
    }

    pub async fn recorded_args(&self) -> Vec<Vec<String>> {
        self.recorded_args.read().await.clone()
    }

    /// Names of the files currently in the engine filesystem, sorted.
    pub async fn files(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Configure the next load or exec to fail with the given error.
    pub async fn set_next_error(&self, error: EngineError) {
        *self.next_error.write().await = Some(error);
    }

    /// Clear any pending error.
    pub async fn clear_next_error(&self) {
        *self.next_error.write().await = None;
    }

    pub async fn set_exec_delay(&self, delay: Duration) {
        *self.exec_delay.write().await = delay;
    }

    /// Replace the raw progress events emitted by each exec.
    pub async fn set_progress_script(&self, events: Vec<EngineProgress>) {
        *self.progress_script.write().await = events;
    }

    pub async fn set_output_bytes(&self, bytes: impl Into<Bytes>) {
        *self.output_bytes.write().await = bytes.into();
    }

    /// Make every delete fail.
    pub async fn set_fail_deletes(&self, fail: bool) {
        *self.fail_deletes.write().await = fail;
    }

    /// Make reads return text instead of bytes.
    pub async fn set_text_output(&self, text: bool) {
        *self.text_output.write().await = text;
    }

    async fn take_error(&self) -> Option<EngineError> {
        self.next_error.write().await.take()
    }

    fn ensure_loaded(&self) -> Result<(), EngineError> {
        if self.is_loaded() {
            Ok(())
        } else {
            Err(EngineError::NotLoaded)
        }
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn load(&self, assets: &EngineAssets) -> Result<(), EngineError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        *self.load_count.write().await += 1;
        *self.last_loaded_asset_count.write().await = Some(assets.len());
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    async fn write_file(&self, name: &str, bytes: Bytes) -> Result<(), EngineError> {
        self.ensure_loaded()?;
        self.files.write().await.insert(name.to_string(), bytes);
        Ok(())
    }

    async fn exec(
        &self,
        args: &[String],
        progress: mpsc::Sender<EngineProgress>,
    ) -> Result<(), EngineError> {
        self.ensure_loaded()?;
        self.recorded_args.write().await.push(args.to_vec());

        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        let input = args
            .windows(2)
            .find(|w| w[0] == "-i")
            .map(|w| w[1].clone())
            .ok_or_else(|| EngineError::exec_failed("no input argument", None))?;
        if !self.files.read().await.contains_key(&input) {
            return Err(EngineError::exec_failed(
                "exit status 1",
                Some(format!("{input}: No such file or directory")),
            ));
        }

        let delay = *self.exec_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        for event in self.progress_script.read().await.iter() {
            let _ = progress.try_send(*event);
        }

        let output = args
            .last()
            .cloned()
            .ok_or_else(|| EngineError::exec_failed("no output argument", None))?;
        let bytes = self.output_bytes.read().await.clone();
        self.files.write().await.insert(output, bytes);
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<FileData, EngineError> {
        self.ensure_loaded()?;
        let bytes = self
            .files
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::filesystem(format!("no such file: {name}")))?;

        if *self.text_output.read().await {
            Ok(FileData::Text(String::from_utf8_lossy(&bytes).into_owned()))
        } else {
            Ok(FileData::Binary(bytes))
        }
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        if *self.fail_deletes.read().await {
            return Err(EngineError::filesystem(format!("cannot delete {name}")));
        }
        match self.files.write().await.remove(name) {
            Some(_) => Ok(()),
            None => Err(EngineError::filesystem(format!("no such file: {name}"))),
        }
    }

    async fn terminate(&self) {
        *self.terminate_count.write().await += 1;
        self.loaded.store(false, Ordering::SeqCst);
        self.files.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exec_requires_written_input() {
        let engine = MockEngine::new();
        engine.load(&EngineAssets::empty()).await.unwrap();
        let (tx, _rx) = mpsc::channel(8);
        let args = vec!["-i".to_string(), "in".to_string(), "out".to_string()];

        assert!(engine.exec(&args, tx.clone()).await.is_err());

        engine.write_file("in", Bytes::from_static(b"x")).await.unwrap();
        engine.exec(&args, tx).await.unwrap();
        assert_eq!(engine.files().await, vec!["in".to_string(), "out".to_string()]);
    }

    #[tokio::test]
    async fn test_terminate_unloads() {
        let engine = MockEngine::new();
        engine.load(&EngineAssets::empty()).await.unwrap();
        engine.terminate().await;

        assert!(!engine.is_loaded());
        assert_eq!(engine.terminate_count().await, 1);
        assert!(matches!(
            engine.write_file("in", Bytes::new()).await,
            Err(EngineError::NotLoaded)
        ));
    }
}
