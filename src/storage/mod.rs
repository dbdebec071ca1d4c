//! Persistence primitives
//!
//! The blob store is the only medium stages share; the progress table carries
//! monotone, non-critical run metadata.

pub mod blob_store;
pub mod progress;

pub use blob_store::*;
pub use progress::*;
