use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use super::error::EngineError;

type SharedInit = Shared<BoxFuture<'static, Result<(), EngineError>>>;

/// Collapses concurrent initializations onto one in-flight operation.
///
/// Callers arriving while an operation is pending await the same future and
/// observe the same outcome. Once it settles the slot is cleared, so a later
/// call after a failure starts a fresh attempt.
#[derive(Default)]
pub struct SingleFlight {
    slot: Mutex<Option<(u64, SharedInit)>>,
    next_id: AtomicU64,
    attempts: AtomicU64,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `make()` unless an operation is already in flight, in which case
    /// the pending one is awaited instead.
    pub async fn run<F, Fut>(&self, make: F) -> Result<(), EngineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), EngineError>> + Send + 'static,
    {
        let (id, shared) = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some((id, pending)) => (*id, pending.clone()),
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    self.attempts.fetch_add(1, Ordering::Relaxed);
                    let pending = make().boxed().shared();
                    *slot = Some((id, pending.clone()));
                    (id, pending)
                }
            }
        };

        let result = shared.await;

        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(slot.as_ref(), Some((current, _)) if *current == id) {
            *slot = None;
        }

        result
    }

    pub fn in_flight(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Number of operations actually started.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}
