//! Cooperative round-robin driver for a set of blocks.
//!
//! Blocks run one after another on the calling thread, in registration
//! order, until a whole pass leaves every tracked pipe cursor where it was.
//! Blocks that report `pending()` keep the run alive; the scheduler backs
//! off and polls again instead of declaring the graph drained.

use std::fmt;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use crossbeam_utils::Backoff;
use log::*;

use crate::error::PipelineError;
use crate::pipe::{Pipe, PipeStats};
use crate::sample::Element;
use crate::Block;

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Log every pipe's fill level after each pass.
    pub debug: bool,
    /// Sleep between polls once spinning on pending blocks stops paying off.
    pub idle_sleep: Duration,
    /// Stop after this many passes even if the graph is still moving.
    pub max_passes: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> SchedulerConfig {
        SchedulerConfig {
            debug: false,
            idle_sleep: Duration::from_millis(10),
            max_passes: None,
        }
    }
}

impl SchedulerConfig {
    /// Runs until the graph runs dry.
    pub fn batch() -> SchedulerConfig {
        SchedulerConfig::default()
    }

    /// Runs at most `passes` passes; needed for looping sources.
    pub fn bounded(passes: u64) -> SchedulerConfig {
        SchedulerConfig {
            max_passes: Some(passes),
            ..SchedulerConfig::default()
        }
    }

    pub fn with_debug(mut self, debug: bool) -> SchedulerConfig {
        self.debug = debug;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipeTotals {
    pub name: String,
    pub written: u64,
    pub read: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub passes: u64,
    /// Passes that made no progress while some block was pending.
    pub idle_passes: u64,
    /// True when the run stopped on `max_passes` rather than running dry.
    pub truncated: bool,
    pub pipes: Vec<PipeTotals>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} passes ({} idle{})",
            self.passes,
            self.idle_passes,
            if self.truncated { ", truncated" } else { "" }
        )?;
        for p in &self.pipes {
            write!(f, "; {} w={} r={}", p.name, p.written, p.read)?;
        }
        Ok(())
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    blocks: Vec<Box<dyn Block>>,
    pipes: Vec<Rc<PipeStats>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Scheduler {
        Scheduler {
            config,
            blocks: Vec::new(),
            pipes: Vec::new(),
        }
    }

    /// Creates a pipe whose traffic counts as progress.
    pub fn pipe<T: Element>(&mut self, name: &str, capacity: usize) -> Pipe<T> {
        let pipe = Pipe::new(name, capacity);
        self.track(pipe.stats());
        pipe
    }

    /// Counts traffic on a pipe as progress. Tracking a pipe twice is a
    /// no-op.
    pub fn track(&mut self, stats: Rc<PipeStats>) {
        if !self.pipes.iter().any(|p| Rc::ptr_eq(p, &stats)) {
            self.pipes.push(stats);
        }
    }

    /// Registers a block after those already added, tracking every pipe it
    /// reports through [`Block::pipes`].
    pub fn add<B: Block + 'static>(&mut self, block: B) {
        debug!("registered block {}", block.name());
        for stats in block.pipes() {
            self.track(stats);
        }
        self.blocks.push(Box::new(block));
    }

    pub fn block_names(&self) -> Vec<&str> {
        self.blocks.iter().map(|b| b.name()).collect()
    }

    pub fn pending(&self) -> bool {
        self.blocks.iter().any(|b| b.pending())
    }

    fn activity(&self) -> u64 {
        self.pipes.iter().map(|p| p.activity()).sum()
    }

    /// Runs every block once. Returns whether any pipe cursor moved.
    pub fn pass(&mut self) -> Result<bool, PipelineError> {
        let before = self.activity();
        for block in self.blocks.iter_mut() {
            if let Err(error) = block.run() {
                error!("{} failed: {}", block.name(), error);
                return Err(PipelineError {
                    block: block.name().to_string(),
                    error,
                });
            }
        }
        Ok(self.activity() != before)
    }

    /// Runs passes until nothing moves and nothing is pending, or until
    /// `max_passes` is reached, then lets every block finish.
    pub fn run(&mut self) -> Result<RunSummary, PipelineError> {
        if self.pipes.is_empty() {
            warn!("no tracked pipes, the run stops after one pass");
        }

        let backoff = Backoff::new();
        let mut passes = 0;
        let mut idle_passes = 0;
        let mut truncated = false;

        loop {
            if let Some(max) = self.config.max_passes {
                if passes >= max {
                    truncated = true;
                    break;
                }
            }

            let progress = self.pass()?;
            passes += 1;
            if self.config.debug {
                self.dump();
            }

            if progress {
                backoff.reset();
                continue;
            }
            if !self.pending() {
                break;
            }

            idle_passes += 1;
            if backoff.is_completed() {
                thread::sleep(self.config.idle_sleep);
            } else {
                backoff.snooze();
            }
        }

        for block in self.blocks.iter_mut() {
            if let Err(error) = block.finish() {
                error!("{} failed to finish: {}", block.name(), error);
                return Err(PipelineError {
                    block: block.name().to_string(),
                    error,
                });
            }
        }

        let summary = RunSummary {
            passes,
            idle_passes,
            truncated,
            pipes: self
                .pipes
                .iter()
                .map(|p| PipeTotals {
                    name: p.name().to_string(),
                    written: p.total_written(),
                    read: p.total_read(),
                })
                .collect(),
        };
        info!("scheduler finished: {}", summary);
        Ok(summary)
    }

    fn dump(&self) {
        for p in &self.pipes {
            debug!("{}", p);
        }
    }
}
