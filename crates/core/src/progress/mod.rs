//! Progress estimation.
//!
//! Raw engine progress arrives at whatever rate the engine produces it. The
//! [`ProgressEstimator`] turns it into throttled [`ProgressSnapshot`]s with a
//! percentage inside the conversion band and an ETA.

mod estimator;
mod types;

pub use estimator::{estimate_remaining_ms, EstimatorConfig, ProgressBand, ProgressEstimator};
pub use types::{steps, EngineProgress, ProgressSnapshot};
