//! Audio processing
//!
//! Normalization, chunking and per-segment slicing of the recording. All
//! audio inside the pipeline is mono 16 kHz 16-bit PCM WAV.

pub mod chunker;
pub mod extractor;
pub mod splitter;
pub mod wav;

pub use chunker::{ChunkDescriptor, Chunker};
pub use extractor::{AudioExtractor, ExtractOutput};
pub use splitter::{SegmentFile, SpeakerSplitter, SplitOutput};
