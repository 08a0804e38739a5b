//! Worker message protocol.
//!
//! The isolated adapter talks to its engine through a worker that runs on
//! its own thread. Every request is answered by zero or more progress
//! responses and exactly one terminal response. Binary payloads travel as
//! [`TransferBuffer`]s, which move ownership instead of copying.

mod messages;
mod worker;

pub use messages::{
    ConvertRequest, ConvertedAudio, TransferBuffer, WorkerFault, WorkerPayload, WorkerRequest,
    WorkerResponse,
};
pub use worker::{spawn_worker, EngineWorker, WorkerConfig, WorkerLink};
