//! Engine module wrapping the external transcoding engine.
//!
//! The engine is a black box with a private filesystem: inputs are written
//! in, a fixed command is executed, and outputs are read back. This module
//! provides the [`MediaEngine`] trait, the ffmpeg-backed implementation, the
//! resource bundle the engine can be loaded from, and the shared
//! [`EngineHandle`] that serializes initialization.
//!
//! # Example
//!
//! ```ignore
//! use vidmp3_core::engine::{BundleSource, EngineHandle, FfmpegEngine, HostCapabilities};
//! use vidmp3_core::resources::ResourceStore;
//!
//! let handle = EngineHandle::new(
//!     Arc::new(FfmpegEngine::with_defaults()),
//!     BundleSource::Local,
//!     ResourceStore::new(),
//!     HostCapabilities::detect(),
//! );
//!
//! // Concurrent callers share one load
//! handle.initialize(None).await?;
//! ```

mod bundle;
mod capabilities;
mod command;
mod config;
mod error;
mod ffmpeg;
mod handle;
mod single_flight;
mod traits;

pub use bundle::{
    relocate_bundle, AssetRole, BundleConfig, BundleFetcher, BundleSource, EngineAsset,
    EngineAssets, HttpBundleFetcher,
};
pub use capabilities::HostCapabilities;
pub use command::{
    mp3_extract_args, INPUT_FILE_NAME, MP3_BITRATE_KBPS, MP3_CHANNELS, MP3_MIME_TYPE,
    MP3_SAMPLE_RATE_HZ, OUTPUT_FILE_NAME,
};
pub use config::EngineConfig;
pub use error::EngineError;
pub use ffmpeg::FfmpegEngine;
pub use handle::EngineHandle;
pub use single_flight::SingleFlight;
pub use traits::{EngineFactory, FileData, MediaEngine};
