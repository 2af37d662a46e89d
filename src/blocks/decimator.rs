use std::rc::Rc;

use log::*;

use crate::error::BlockError;
use crate::pipe::{PipeReader, PipeStats, PipeWriter};
use crate::sample::Element;
use crate::Block;

/// Forwards 1 in `d` elements, dropping the rest of each group of `d`.
pub struct Decimator<T> {
    name: String,
    d: usize,
    input: PipeReader<T>,
    out: PipeWriter<T>,
}

impl<T: Element> Decimator<T> {
    pub fn new(
        d: usize,
        input: PipeReader<T>,
        out: PipeWriter<T>,
    ) -> Result<Decimator<T>, BlockError> {
        let name = format!("decimator({})", input.name());
        if d == 0 {
            return Err(BlockError::Config {
                block: name,
                reason: "decimation ratio must be at least 1".to_string(),
            });
        }
        debug!("{} 1/{} -> {}", name, d, out.name());
        Ok(Decimator { name, d, input, out })
    }

    pub fn ratio(&self) -> usize {
        self.d
    }
}

impl<T: Element> Block for Decimator<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn pipes(&self) -> Vec<Rc<PipeStats>> {
        vec![self.input.stats(), self.out.stats()]
    }

    fn run(&mut self) -> Result<(), BlockError> {
        let count = (self.input.readable() / self.d).min(self.out.writable());
        if count == 0 {
            return Ok(());
        }

        {
            let rd = self.input.rd();
            let mut wr = self.out.wr();
            for (dst, src) in wr[..count].iter_mut().zip(rd.iter().step_by(self.d)) {
                *dst = *src;
            }
        }

        trace!("{} kept {} of {}", self.name, count, count * self.d);
        self.input.consume(count * self.d)?;
        self.out.produce(count)
    }
}
