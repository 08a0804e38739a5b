use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::types::{ConversionState, ConversionStatus, OutputArtifact, SessionError};
use crate::adapter::{EngineAdapter, TranscodeAdapter};
use crate::engine::EngineError;
use crate::error::ConversionFailure;
use crate::media::{InputCandidate, InputValidator, OutputAudio};
use crate::metrics;
use crate::progress::{steps, ProgressSnapshot};
use crate::resources::{ResourceHandle, ResourceStore};

const PROGRESS_BUFFER: usize = 64;

/// Drives one user-facing conversion session.
///
/// State is published on a watch channel; [`subscribe`](Self::subscribe)
/// gets a receiver and dropping it unsubscribes. Every operation takes
/// `&self`, so `reset` can run while a conversion is awaiting its adapter.
/// Work started before a reset or a new selection may still finish, but its
/// results are discarded: each state write is checked against a generation
/// counter that those operations bump.
///
/// The session owns the input preview handle and the output handle it
/// holds, and releases them before replacing or discarding them.
pub struct ConversionSession<A: TranscodeAdapter = EngineAdapter> {
    adapter: A,
    validator: InputValidator,
    resources: ResourceStore,
    state: watch::Sender<ConversionState>,
    /// Held while the state is written.
    generation: Mutex<u64>,
    converting: AtomicBool,
}

/// Clears the in-flight flag when a conversion settles or is dropped.
struct ConvertingGuard<'a>(&'a AtomicBool);

impl Drop for ConvertingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<A: TranscodeAdapter> ConversionSession<A> {
    /// `resources` must be the store the adapter registers outputs in.
    pub fn new(adapter: A, validator: InputValidator, resources: ResourceStore) -> Self {
        let (state, _) = watch::channel(ConversionState::default());
        Self {
            adapter,
            validator,
            resources,
            state,
            generation: Mutex::new(0),
            converting: AtomicBool::new(false),
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn resources(&self) -> &ResourceStore {
        &self.resources
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ConversionState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> ConversionStatus {
        self.state.borrow().status
    }

    pub fn can_convert(&self) -> bool {
        self.state.borrow().can_convert() && !self.converting.load(Ordering::SeqCst)
    }

    pub fn can_download(&self) -> bool {
        self.state.borrow().can_download()
    }

    /// Validates the candidates and keeps the first acceptable one.
    ///
    /// Ends in `Idle` with the input set, or in `Error` with the first
    /// candidate's rejection. Rejected with [`SessionError::Busy`] while the
    /// session is loading or processing.
    pub async fn select_input(
        &self,
        candidates: Vec<InputCandidate>,
    ) -> Result<ConversionStatus, SessionError> {
        let generation = {
            let mut generation = self.lock_generation();
            if self.state.borrow().status.is_busy() {
                return Err(SessionError::Busy);
            }
            *generation += 1;
            self.replace_state(ConversionState {
                status: ConversionStatus::Loading,
                progress: Some(ProgressSnapshot::starting(0.0, steps::READING_METADATA)),
                ..ConversionState::default()
            });
            *generation
        };

        match self.validator.select_first(candidates).await {
            Ok(media) => {
                let preview = media.preview.clone();
                let applied = self.apply(generation, |s| {
                    s.status = ConversionStatus::Idle;
                    s.progress = None;
                    s.input = Some(media);
                    true
                });
                if !applied {
                    if let Some(handle) = preview {
                        self.resources.release(&handle);
                    }
                }
            }
            Err(e) => {
                let failure = ConversionFailure::from(&e);
                warn!(kind = %failure.kind, error = %e, "Input rejected");
                if self.apply(generation, |s| {
                    s.status = ConversionStatus::Error;
                    s.progress = None;
                    s.error = Some(failure);
                    true
                }) {
                    metrics::CONVERSION_FAILURES
                        .with_label_values(&[e.kind().code()])
                        .inc();
                }
            }
        }

        Ok(self.status())
    }

    /// Initializes the engine if needed and converts the selected input.
    ///
    /// Returns the status the session ended in. Only valid from `Idle` or
    /// `Error` with an input set; a second call while a conversion is in
    /// flight is rejected, never queued.
    pub async fn start_conversion(&self) -> Result<ConversionStatus, SessionError> {
        let (generation, input, started_at) = {
            let generation = self.lock_generation();
            let (status, input) = {
                let state = self.state.borrow();
                (state.status, state.input.clone())
            };
            if !matches!(status, ConversionStatus::Idle | ConversionStatus::Error) {
                return Err(SessionError::InvalidState {
                    expected: "idle or error".to_string(),
                    actual: status,
                });
            }
            let input = input.ok_or(SessionError::NoInput)?;
            if self.converting.swap(true, Ordering::SeqCst) {
                return Err(SessionError::Busy);
            }

            let ready = self.adapter.is_ready();
            let started_at = Utc::now();
            self.state.send_modify(|s| {
                let (status, step) = if ready {
                    (ConversionStatus::Processing, steps::LOADING_FILE)
                } else {
                    (ConversionStatus::Loading, steps::INITIALIZING)
                };
                s.status = status;
                s.output = None;
                s.error = None;
                s.progress = Some(ProgressSnapshot::new(0.0, step, started_at));
            });
            (*generation, input, started_at)
        };
        let _converting = ConvertingGuard(&self.converting);
        let started = Instant::now();

        info!(
            file = %input.file_name,
            adapter = self.adapter.name(),
            size = input.size_bytes,
            "Starting conversion"
        );

        if !self.adapter.is_ready() {
            let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
            let (result, ()) = tokio::join!(
                self.adapter.initialize(tx),
                self.follow_progress(generation, ConversionStatus::Loading, started_at, rx)
            );
            if let Err(e) = result {
                return Ok(self.fail(generation, &e));
            }

            if !self.apply(generation, |s| {
                s.status = ConversionStatus::Processing;
                s.progress = Some(ProgressSnapshot::new(0.0, steps::LOADING_FILE, started_at));
                true
            }) {
                debug!("Conversion abandoned after engine initialization");
                return Ok(self.status());
            }
        }

        let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
        let (result, ()) = tokio::join!(
            self.adapter.transcode(&input, tx),
            self.follow_progress(generation, ConversionStatus::Processing, started_at, rx)
        );

        Ok(match result {
            Ok(output) => self.complete(generation, output, started),
            Err(e) => self.fail(generation, &e),
        })
    }

    /// The produced artifact. Valid only in `Completed`; repeated calls
    /// return the same handle.
    pub fn retrieve_output(&self) -> Result<OutputArtifact, SessionError> {
        let state = self.state.borrow();
        match (&state.status, &state.output) {
            (ConversionStatus::Completed, Some(output)) => Ok(OutputArtifact::from(output)),
            (status, _) => Err(SessionError::InvalidState {
                expected: ConversionStatus::Completed.to_string(),
                actual: *status,
            }),
        }
    }

    /// Releases everything the session owns and returns to `Idle`.
    ///
    /// A conversion in flight is abandoned. Adapters that can hard-stop
    /// their engine are asked to.
    pub fn reset(&self) {
        let mut generation = self.lock_generation();
        *generation += 1;

        let status = self.state.borrow().status;
        if status == ConversionStatus::Processing && self.adapter.abort() {
            info!(adapter = self.adapter.name(), "Stopped in-flight conversion");
        }

        self.replace_state(ConversionState::default());
        info!(from = %status, "Session reset");
    }

    /// Resets the session and releases the engine.
    pub async fn shutdown(&self) {
        self.reset();
        self.adapter.shutdown().await;
    }

    fn lock_generation(&self) -> MutexGuard<'_, u64> {
        self.generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `update` unless `generation` was superseded. `update` returns
    /// whether it changed anything.
    fn apply(&self, generation: u64, update: impl FnOnce(&mut ConversionState) -> bool) -> bool {
        let current = self.lock_generation();
        if *current != generation {
            return false;
        }
        self.state.send_if_modified(update);
        true
    }

    /// Releases the handles of the current state, then installs `next`.
    /// The caller holds the generation lock.
    fn replace_state(&self, next: ConversionState) {
        let owned: Vec<ResourceHandle> = self.state.borrow().owned_handles().cloned().collect();
        for handle in &owned {
            self.resources.release(handle);
        }
        self.state.send_replace(next);
    }

    /// Publishes snapshots for one phase, stamped with the conversion's start.
    async fn follow_progress(
        &self,
        generation: u64,
        status: ConversionStatus,
        started_at: DateTime<Utc>,
        mut rx: mpsc::Receiver<ProgressSnapshot>,
    ) {
        while let Some(mut snapshot) = rx.recv().await {
            snapshot.started_at = started_at;
            debug!(
                percentage = snapshot.percentage,
                step = %snapshot.step,
                eta_ms = ?snapshot.eta_ms,
                "Progress"
            );
            self.apply(generation, |s| {
                if s.status != status {
                    return false;
                }
                let current = s.progress.as_ref().map_or(0.0, |p| p.percentage);
                if snapshot.percentage < current {
                    return false;
                }
                s.progress = Some(snapshot);
                true
            });
        }
    }

    fn complete(&self, generation: u64, output: OutputAudio, started: Instant) -> ConversionStatus {
        let elapsed = started.elapsed();
        let handle = output.handle.clone();
        let name = output.name.clone();

        let applied = self.apply(generation, |s| {
            let started_at = s
                .progress
                .as_ref()
                .map_or_else(Utc::now, |p| p.started_at);
            s.status = ConversionStatus::Completed;
            s.output = Some(output);
            s.progress = Some(ProgressSnapshot::new(100.0, steps::COMPLETED, started_at));
            true
        });

        if !applied {
            // Nobody is left to own the output.
            self.resources.release(&handle);
            metrics::CONVERSIONS.with_label_values(&["abandoned"]).inc();
            debug!(output = %name, "Discarded output of an abandoned conversion");
            return self.status();
        }

        metrics::CONVERSIONS.with_label_values(&["completed"]).inc();
        metrics::CONVERSION_DURATION
            .with_label_values(&[self.adapter.name()])
            .observe(elapsed.as_secs_f64());
        info!(
            output = %name,
            handle = %handle,
            elapsed_ms = elapsed.as_millis() as u64,
            "Conversion completed"
        );
        ConversionStatus::Completed
    }

    fn fail(&self, generation: u64, err: &EngineError) -> ConversionStatus {
        let failure = ConversionFailure::from(err);
        let kind = failure.kind;

        let applied = self.apply(generation, |s| {
            s.status = ConversionStatus::Error;
            s.output = None;
            s.progress = None;
            s.error = Some(failure);
            true
        });

        if applied {
            warn!(
                kind = %kind,
                recoverable = kind.is_recoverable(),
                error = %err,
                "Conversion failed"
            );
            metrics::CONVERSIONS.with_label_values(&["failed"]).inc();
            metrics::CONVERSION_FAILURES
                .with_label_values(&[kind.code()])
                .inc();
        } else {
            debug!(error = %err, "Abandoned conversion failed");
            metrics::CONVERSIONS.with_label_values(&["abandoned"]).inc();
        }
        self.status()
    }
}

impl<A: TranscodeAdapter> Drop for ConversionSession<A> {
    fn drop(&mut self) {
        for handle in self.state.borrow().owned_handles() {
            self.resources.release(handle);
        }
    }
}
