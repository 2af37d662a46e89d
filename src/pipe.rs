//! Bounded single-producer/single-consumer element pipes.
//!
//! A [`Pipe`] owns a contiguous buffer and is split into exactly one
//! [`PipeWriter`] and one [`PipeReader`], each bound to one block. Neither
//! side ever blocks: they report how much they can move right now, hand out
//! a view of exactly that many elements, and commit what was actually moved.
//! Views are borrow guards, so they cannot be held across the next commit.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use log::*;

use crate::error::BlockError;
use crate::sample::Element;

/// Cursor totals of one pipe, shared with the scheduler for progress
/// detection and diagnostics.
#[derive(Debug)]
pub struct PipeStats {
    name: String,
    capacity: usize,
    total_read: Cell<u64>,
    total_written: Cell<u64>,
}

impl PipeStats {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_read(&self) -> u64 {
        self.total_read.get()
    }

    pub fn total_written(&self) -> u64 {
        self.total_written.get()
    }

    /// Elements written but not yet read.
    pub fn fill(&self) -> usize {
        (self.total_written() - self.total_read()) as usize
    }

    /// Monotonic counter that moves whenever either cursor moves.
    pub fn activity(&self) -> u64 {
        self.total_read() + self.total_written()
    }
}

impl fmt::Display for PipeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}/{}] written={} read={}",
            self.name,
            self.fill(),
            self.capacity,
            self.total_written(),
            self.total_read()
        )
    }
}

// Backed by twice the capacity so the free space only has to be moved to
// the front once the read cursor passes the capacity.
struct PipeBuf<T> {
    buf: Vec<T>,
    capacity: usize,
    rd: usize,
    wr: usize,
}

impl<T: Element> PipeBuf<T> {
    fn readable(&self) -> usize {
        self.wr - self.rd
    }

    fn writable(&self) -> usize {
        self.capacity - self.readable()
    }

    // move unread elements to the front when the tail is too short for all
    // of the free space
    fn pack(&mut self) {
        if self.buf.len() - self.wr >= self.writable() {
            return;
        }
        self.buf.copy_within(self.rd..self.wr, 0);
        self.wr -= self.rd;
        self.rd = 0;
    }
}

pub struct Pipe<T> {
    buf: Rc<RefCell<PipeBuf<T>>>,
    stats: Rc<PipeStats>,
}

impl<T: Element> Pipe<T> {
    pub fn new(name: &str, capacity: usize) -> Pipe<T> {
        debug!("new pipe {} with capacity {}", name, capacity);
        Pipe {
            buf: Rc::new(RefCell::new(PipeBuf {
                buf: vec![T::default(); capacity * 2],
                capacity,
                rd: 0,
                wr: 0,
            })),
            stats: Rc::new(PipeStats {
                name: name.to_string(),
                capacity,
                total_read: Cell::new(0),
                total_written: Cell::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.stats.name()
    }

    pub fn stats(&self) -> Rc<PipeStats> {
        self.stats.clone()
    }

    pub fn split(self) -> (PipeWriter<T>, PipeReader<T>) {
        let writer = PipeWriter {
            buf: self.buf.clone(),
            stats: self.stats.clone(),
        };
        let reader = PipeReader {
            buf: self.buf,
            stats: self.stats,
        };
        (writer, reader)
    }
}

pub struct PipeReader<T> {
    buf: Rc<RefCell<PipeBuf<T>>>,
    stats: Rc<PipeStats>,
}

impl<T: Element> PipeReader<T> {
    pub fn name(&self) -> &str {
        self.stats.name()
    }

    pub fn stats(&self) -> Rc<PipeStats> {
        self.stats.clone()
    }

    pub fn readable(&self) -> usize {
        self.buf.borrow().readable()
    }

    /// View of the next `readable()` elements.
    pub fn rd(&self) -> Ref<'_, [T]> {
        Ref::map(self.buf.borrow(), |b| &b.buf[b.rd..b.wr])
    }

    /// Marks `n` elements as consumed.
    pub fn consume(&mut self, n: usize) -> Result<(), BlockError> {
        let mut b = self.buf.borrow_mut();
        let available = b.readable();
        if n > available {
            return Err(BlockError::Underflow {
                pipe: self.stats.name.clone(),
                requested: n,
                available,
            });
        }
        b.rd += n;
        if b.rd == b.wr {
            b.rd = 0;
            b.wr = 0;
        }
        self.stats.total_read.set(self.stats.total_read.get() + n as u64);
        Ok(())
    }

    /// Copies up to `dst.len()` elements out and consumes them.
    pub fn pop_slice(&mut self, dst: &mut [T]) -> usize {
        let n = {
            let src = self.rd();
            let n = src.len().min(dst.len());
            dst[..n].copy_from_slice(&src[..n]);
            n
        };
        self.advance(n);
        n
    }

    /// Consumes everything readable into a new vector.
    pub fn pop_all(&mut self) -> Vec<T> {
        let out = self.rd().to_vec();
        self.advance(out.len());
        out
    }

    fn advance(&mut self, n: usize) {
        // n never exceeds what rd() just exposed
        if let Err(e) = self.consume(n) {
            error!("{}", e);
        }
    }
}

pub struct PipeWriter<T> {
    buf: Rc<RefCell<PipeBuf<T>>>,
    stats: Rc<PipeStats>,
}

impl<T: Element> PipeWriter<T> {
    pub fn name(&self) -> &str {
        self.stats.name()
    }

    pub fn stats(&self) -> Rc<PipeStats> {
        self.stats.clone()
    }

    pub fn writable(&self) -> usize {
        self.buf.borrow().writable()
    }

    /// View of the next `writable()` free slots.
    pub fn wr(&mut self) -> RefMut<'_, [T]> {
        let mut b = self.buf.borrow_mut();
        b.pack();
        RefMut::map(b, |b| {
            let (wr, n) = (b.wr, b.writable());
            &mut b.buf[wr..wr + n]
        })
    }

    /// Marks `n` slots of the last `wr()` view as filled.
    pub fn produce(&mut self, n: usize) -> Result<(), BlockError> {
        let mut b = self.buf.borrow_mut();
        let available = b.writable();
        if n > available {
            return Err(BlockError::Overflow {
                pipe: self.stats.name.clone(),
                requested: n,
                available,
            });
        }
        if b.wr + n > b.buf.len() {
            b.pack();
        }
        b.wr += n;
        self.stats
            .total_written
            .set(self.stats.total_written.get() + n as u64);
        Ok(())
    }

    /// Copies as many elements of `src` as fit and produces them.
    pub fn push_slice(&mut self, src: &[T]) -> usize {
        let n = {
            let mut dst = self.wr();
            let n = dst.len().min(src.len());
            dst[..n].copy_from_slice(&src[..n]);
            n
        };
        if let Err(e) = self.produce(n) {
            error!("{}", e);
        }
        n
    }
}
