//! Resource lifecycle management.
//!
//! Produced bytes (output audio, input previews, relocated engine assets) are
//! registered in a [`ResourceStore`] and referenced through opaque
//! [`ResourceHandle`]s. Whoever creates a handle owns it and must release it
//! before discarding or replacing the artifact it points to.

mod store;

pub use store::{ResourceError, ResourceHandle, ResourceStore};
