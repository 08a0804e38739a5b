//! Transcoding engine adapters.
//!
//! [`TranscodeAdapter`] is the capability surface the session drives. The
//! [`DirectAdapter`] runs the engine in the caller's context; the
//! [`IsolatedAdapter`] relays every operation to a worker over the
//! [`protocol`](crate::protocol). [`create_adapter`] picks one at
//! construction and the choice never changes afterwards.

mod direct;
mod isolated;
pub(crate) mod pipeline;
mod select;
mod traits;

pub use direct::DirectAdapter;
pub use isolated::IsolatedAdapter;
pub use pipeline::{run_transcode, TranscodeJob, TranscodedAudio};
pub use select::{create_adapter, AdapterKind, AdapterParts, AdapterPreference, EngineAdapter};
pub use traits::TranscodeAdapter;
