//! Speech-to-text stage
//!
//! Fan-out transcription over per-speaker clips. The model itself is an
//! opaque seam; this module owns the per-segment handler and its blob
//! formats.

pub mod transcriber;
pub mod types;

pub use transcriber::SegmentTranscriber;
pub use types::*;
