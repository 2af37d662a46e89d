use std::rc::Rc;

use log::*;

use crate::error::BlockError;
use crate::pipe::{PipeReader, PipeStats, PipeWriter};
use crate::sample::{Element, Scalar};
use crate::Block;

/// Collapses whatever is readable into a single element holding the count.
/// Nothing is emitted for an empty input.
pub struct ItemCounter<Tin, Tout> {
    name: String,
    input: PipeReader<Tin>,
    out: PipeWriter<Tout>,
}

impl<Tin: Element, Tout: Scalar> ItemCounter<Tin, Tout> {
    pub fn new(input: PipeReader<Tin>, out: PipeWriter<Tout>) -> ItemCounter<Tin, Tout> {
        let name = format!("itemcounter({})", input.name());
        debug!("{} -> {}", name, out.name());
        ItemCounter { name, input, out }
    }
}

impl<Tin: Element, Tout: Scalar> Block for ItemCounter<Tin, Tout> {
    fn name(&self) -> &str {
        &self.name
    }

    fn pipes(&self) -> Vec<Rc<PipeStats>> {
        vec![self.input.stats(), self.out.stats()]
    }

    fn run(&mut self) -> Result<(), BlockError> {
        if self.out.writable() < 1 {
            return Ok(());
        }
        let count = self.input.readable();
        if count == 0 {
            return Ok(());
        }

        self.out.wr()[0] = Tout::from_count(count);
        self.input.consume(count)?;
        trace!("{} counted {}", self.name, count);
        self.out.produce(1)
    }
}
