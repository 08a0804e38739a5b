//! Input media: accepted kinds, validation and optional probing.

mod probe;
mod types;
mod validate;

pub use probe::{
    metadata_timeout, preview_seek_secs, preview_timeout, FfprobeProber, MediaMetadata,
    MediaProber, ProbeError, PREVIEW_MAX_HEIGHT, PREVIEW_MAX_WIDTH,
};
pub use types::{
    display_name, file_extension, replace_extension, InputCandidate, InputMedia, InputSource,
    MediaKind, OutputAudio,
};
pub use validate::{InputValidator, ValidationError, PREVIEW_MIME_TYPE};
