pub mod blocks;
pub mod error;
pub mod pipe;
pub mod sample;
pub mod scheduler;
pub mod template;
pub mod threaded;

use std::rc::Rc;

pub use error::{BlockError, PipelineError};
pub use pipe::{Pipe, PipeReader, PipeStats, PipeWriter};
pub use sample::{Complex, Element, Scalar};
pub use scheduler::{RunSummary, Scheduler, SchedulerConfig};

/// A unit of stream work driven by the [`Scheduler`].
///
/// `run` is called over and over. Each call checks how much input is
/// readable and how much output is writable, returns straight away when it
/// cannot move anything, and otherwise processes the largest batch it can
/// and commits exactly what it processed on each pipe it touched.
pub trait Block {
    fn name(&self) -> &str;

    fn run(&mut self) -> Result<(), BlockError>;

    /// Pipes this block reads or writes. Their traffic is what the
    /// scheduler counts as progress.
    fn pipes(&self) -> Vec<Rc<PipeStats>> {
        Vec::new()
    }

    /// True while the block waits on an external source that may still
    /// deliver, so a pass without progress is not the end of the stream.
    fn pending(&self) -> bool {
        false
    }

    /// Called once after the last pass of a run that did not fail. Sinks
    /// flush here so that late output errors still stop the pipeline.
    fn finish(&mut self) -> Result<(), BlockError> {
        Ok(())
    }
}
