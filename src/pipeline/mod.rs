//! Streaming pipeline: batch accumulation, progress and the run driver.

pub mod accumulate;
pub mod driver;
pub mod progress;

pub use accumulate::Accumulator;
pub use driver::{report, run, stream_batches, stream_eval, RunState, RunSummary};
pub use progress::{ProgressMode, ProgressReporter};
