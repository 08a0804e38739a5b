pub mod adapter;
pub mod config;
pub mod engine;
pub mod error;
pub mod media;
pub mod metrics;
pub mod progress;
pub mod protocol;
pub mod resources;
pub mod session;
pub mod testing;

pub use adapter::{
    create_adapter, AdapterKind, AdapterParts, AdapterPreference, DirectAdapter, EngineAdapter,
    IsolatedAdapter, TranscodeAdapter,
};
pub use config::{
    load_config, load_config_from_str, load_default_config, validate_config, Config, ConfigError,
};
pub use engine::{EngineError, EngineHandle, FfmpegEngine, HostCapabilities, MediaEngine};
pub use error::{ConversionFailure, ErrorKind};
pub use media::{InputCandidate, InputMedia, MediaKind, OutputAudio, ValidationError};
pub use progress::{ProgressSnapshot, ProgressEstimator};
pub use resources::{ResourceError, ResourceHandle, ResourceStore};
pub use session::{
    session_from_config, ConversionSession, ConversionState, ConversionStatus, OutputArtifact,
    SessionError,
};
