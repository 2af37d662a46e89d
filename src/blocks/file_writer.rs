use std::io::Write;
use std::mem;
use std::rc::Rc;

use log::*;

use super::would_block;
use crate::error::BlockError;
use crate::pipe::{PipeReader, PipeStats};
use crate::sample::Element;
use crate::Block;

/// Writes raw elements from a pipe to a file handle.
pub struct FileWriter<T, W> {
    name: String,
    input: PipeReader<T>,
    output: W,
    pending: bool,
}

impl<T: Element, W: Write> FileWriter<T, W> {
    pub fn new(input: PipeReader<T>, output: W) -> FileWriter<T, W> {
        let name = input.name().to_string();
        debug!("file_writer {} ({} byte elements)", name, mem::size_of::<T>());
        FileWriter {
            name,
            input,
            output,
            pending: false,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.output
    }

    pub fn into_inner(self) -> W {
        self.output
    }
}

impl<T: Element, W: Write> Block for FileWriter<T, W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn pipes(&self) -> Vec<Rc<PipeStats>> {
        vec![self.input.stats()]
    }

    fn run(&mut self) -> Result<(), BlockError> {
        self.pending = false;
        let element_size = mem::size_of::<T>();
        let size = self.input.readable() * element_size;
        if size == 0 {
            return Ok(());
        }

        let result = {
            let rd = self.input.rd();
            self.output.write(bytemuck::cast_slice(&rd[..]))
        };

        let nw = match result {
            Ok(0) => {
                return Err(BlockError::BrokenPipe {
                    block: self.name.clone(),
                })
            }
            Ok(n) => n,
            Err(ref e) if would_block(e) => {
                trace!("{} output not ready", self.name);
                self.pending = true;
                return Ok(());
            }
            Err(error) => {
                return Err(BlockError::Write {
                    block: self.name.clone(),
                    error,
                })
            }
        };

        if nw % element_size != 0 {
            return Err(BlockError::PartialWrite {
                block: self.name.clone(),
                written: nw,
                expected: size,
                element_size,
            });
        }

        trace!("{} wrote {} bytes", self.name, nw);
        self.input.consume(nw / element_size)
    }

    fn pending(&self) -> bool {
        self.pending
    }

    fn finish(&mut self) -> Result<(), BlockError> {
        debug!("{} flushing", self.name);
        self.output.flush().map_err(|error| BlockError::Write {
            block: self.name.clone(),
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::Pipe;
    use std::io;

    // accepts at most `limit` bytes per call
    struct Trickle {
        limit: usize,
        data: Vec<u8>,
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.limit);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writes_all_readable_elements() {
        let (mut w, r) = Pipe::<u16>::new("out", 8).split();
        w.push_slice(&[0x0102, 0x0304]);
        let mut writer = FileWriter::new(r, Vec::<u8>::new());
        writer.run().unwrap();
        let mut expected = 0x0102u16.to_ne_bytes().to_vec();
        expected.extend_from_slice(&0x0304u16.to_ne_bytes());
        assert_eq!(writer.get_ref(), &expected);
        assert_eq!(w.writable(), 8);
    }

    #[test]
    fn empty_input_is_a_noop() {
        let (_w, r) = Pipe::<u16>::new("out", 8).split();
        let mut writer = FileWriter::new(
            r,
            Trickle {
                limit: 0,
                data: vec![],
            },
        );
        // a zero-byte sink would be fatal if the block touched it
        writer.run().unwrap();
    }

    #[test]
    fn short_aligned_writes_consume_what_was_written() {
        let (mut w, r) = Pipe::<u32>::new("slow", 8).split();
        w.push_slice(&[1, 2, 3]);
        let stats = w.stats();
        let mut writer = FileWriter::new(
            r,
            Trickle {
                limit: 8,
                data: vec![],
            },
        );
        writer.run().unwrap();
        assert_eq!(stats.total_read(), 2);
        writer.run().unwrap();
        assert_eq!(stats.total_read(), 3);
        assert_eq!(writer.into_inner().data.len(), 12);
    }

    #[test]
    fn zero_byte_write_is_broken_pipe() {
        let (mut w, r) = Pipe::<u8>::new("closed", 4).split();
        w.push_slice(&[1]);
        let mut writer = FileWriter::new(
            r,
            Trickle {
                limit: 0,
                data: vec![],
            },
        );
        assert!(matches!(writer.run(), Err(BlockError::BrokenPipe { .. })));
    }

    // keeps data but cannot flush it out
    struct NoFlush;

    impl Write for NoFlush {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "flush refused"))
        }
    }

    #[test]
    fn finish_flushes_the_output() {
        let (mut w, r) = Pipe::<u8>::new("tail", 4).split();
        w.push_slice(&[1, 2]);
        let mut writer = FileWriter::new(r, io::BufWriter::new(Vec::<u8>::new()));
        writer.run().unwrap();
        assert!(writer.get_ref().get_ref().is_empty());
        writer.finish().unwrap();
        assert_eq!(writer.get_ref().get_ref(), &vec![1, 2]);

        let (_w, r) = Pipe::<u8>::new("stuck", 4).split();
        let mut writer = FileWriter::new(r, NoFlush);
        assert!(matches!(writer.finish(), Err(BlockError::Write { .. })));
    }

    #[test]
    fn partial_element_write_is_fatal() {
        let (mut w, r) = Pipe::<u32>::new("framing", 4).split();
        w.push_slice(&[1, 2]);
        let stats = w.stats();
        let mut writer = FileWriter::new(
            r,
            Trickle {
                limit: 6,
                data: vec![],
            },
        );
        match writer.run() {
            Err(BlockError::PartialWrite {
                written, expected, ..
            }) => {
                assert_eq!(written, 6);
                assert_eq!(expected, 8);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(stats.total_read(), 0);
    }
}
