//! Pipeline orchestration
//!
//! The driver sequences the stages and owns the run id; stages exchange
//! manifests defined in `messages`, and the aggregator assembles the final
//! transcript.

pub mod aggregator;
pub mod driver;
pub mod messages;

pub use aggregator::{AggregateOutput, ResultAggregator, READ_ERROR_TEXT};
pub use driver::{PipelineDriver, RunRequest, RunSummary};
pub use messages::*;
