//! Host capability detection.

use serde::{Deserialize, Serialize};

use super::error::EngineError;

/// Host features the engine adapters depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCapabilities {
    /// A separate execution context can run in parallel with the caller.
    pub isolated_execution: bool,
    /// Shared-memory atomics are available to the engine.
    pub shared_memory: bool,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self::detect()
    }
}

impl HostCapabilities {
    /// Detects capabilities of the current host.
    pub fn detect() -> Self {
        let isolated_execution = std::thread::available_parallelism()
            .map(|n| n.get() > 1)
            .unwrap_or(false);

        Self {
            isolated_execution,
            shared_memory: cfg!(target_has_atomic = "ptr"),
        }
    }

    /// Applies configured overrides on top of detected values.
    pub fn with_overrides(mut self, isolated_execution: Option<bool>, shared_memory: Option<bool>) -> Self {
        if let Some(value) = isolated_execution {
            self.isolated_execution = value;
        }
        if let Some(value) = shared_memory {
            self.shared_memory = value;
        }
        self
    }

    /// Every capability present.
    pub fn full() -> Self {
        Self {
            isolated_execution: true,
            shared_memory: true,
        }
    }

    pub fn require_shared_memory(&self) -> Result<(), EngineError> {
        if self.shared_memory {
            Ok(())
        } else {
            Err(EngineError::capability_missing("shared memory"))
        }
    }

    pub fn require_isolation(&self) -> Result<(), EngineError> {
        if self.isolated_execution {
            Ok(())
        } else {
            Err(EngineError::capability_missing("isolated execution"))
        }
    }
}
