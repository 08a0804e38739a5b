//! Conversion session: the state machine that owns a conversion's lifecycle.
//!
//! ```text
//! Idle --select_input--> Loading --ok--> Idle
//!                                 --rejected--> Error
//! Idle/Error --start_conversion--> [Loading while the engine initializes]
//!                              --> Processing --> Completed | Error
//! any --reset--> Idle
//! ```

mod build;
mod machine;
mod types;

pub use build::session_from_config;
pub use machine::ConversionSession;
pub use types::{ConversionState, ConversionStatus, OutputArtifact, SessionError};
