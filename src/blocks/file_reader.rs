use std::io::{self, Read, Seek, SeekFrom};
use std::mem;
use std::rc::Rc;

use log::*;

use super::would_block;
use crate::error::BlockError;
use crate::pipe::{PipeStats, PipeWriter};
use crate::sample::Element;
use crate::Block;

/// Reads raw elements from a file handle into a pipe.
///
/// With looping enabled the handle is rewound to offset 0 whenever it hits
/// end of stream, so a finite capture can be replayed forever.
pub struct FileReader<T, R> {
    name: String,
    input: R,
    out: PipeWriter<T>,
    looping: bool,
    eof: bool,
    pending: bool,
    loops: u64,
}

impl<T: Element, R: Read + Seek> FileReader<T, R> {
    pub fn new(input: R, out: PipeWriter<T>) -> FileReader<T, R> {
        let name = out.name().to_string();
        debug!("file_reader {} ({} byte elements)", name, mem::size_of::<T>());
        FileReader {
            name,
            input,
            out,
            looping: false,
            eof: false,
            pending: false,
            loops: 0,
        }
    }

    pub fn with_loop(mut self, looping: bool) -> FileReader<T, R> {
        self.looping = looping;
        self
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    /// True once end of stream was reached without looping. The block
    /// stays idle from then on.
    pub fn at_eof(&self) -> bool {
        self.eof
    }

    /// How many times the input was rewound.
    pub fn loops(&self) -> u64 {
        self.loops
    }

    pub fn get_ref(&self) -> &R {
        &self.input
    }

    // one read into the free part of the output; None when the handle
    // has nothing for us yet
    fn read_once(&mut self) -> Result<Option<usize>, BlockError> {
        let result = {
            let mut wr = self.out.wr();
            self.input.read(bytemuck::cast_slice_mut(&mut wr[..]))
        };
        match result {
            Ok(n) => Ok(Some(n)),
            Err(ref e) if would_block(e) => {
                trace!("{} input not ready", self.name);
                self.pending = true;
                Ok(None)
            }
            Err(error) => Err(BlockError::Read {
                block: self.name.clone(),
                error,
            }),
        }
    }
}

impl<T: Element, R: Read + Seek> Block for FileReader<T, R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn pipes(&self) -> Vec<Rc<PipeStats>> {
        vec![self.out.stats()]
    }

    fn run(&mut self) -> Result<(), BlockError> {
        self.pending = false;
        if self.eof {
            return Ok(());
        }

        let element_size = mem::size_of::<T>();
        let size = self.out.writable() * element_size;
        if size == 0 {
            return Ok(());
        }

        let mut nr = match self.read_once()? {
            Some(n) => n,
            None => return Ok(()),
        };

        if nr == 0 {
            if !self.looping {
                debug!("{} reached end of stream", self.name);
                self.eof = true;
                return Ok(());
            }

            debug!("{} looping", self.name);
            if let Err(error) = self.input.seek(SeekFrom::Start(0)) {
                return Err(BlockError::Seek {
                    block: self.name.clone(),
                    error,
                });
            }
            self.loops += 1;

            nr = match self.read_once()? {
                Some(n) => n,
                None => return Ok(()),
            };
            if nr == 0 {
                trace!("{} is empty, nothing to loop over", self.name);
                return Ok(());
            }
        }

        if nr % element_size != 0 {
            return Err(BlockError::PartialRead {
                block: self.name.clone(),
                bytes: nr,
                element_size,
            });
        }

        trace!("{} read {} bytes", self.name, nr);
        self.out.produce(nr / element_size)
    }

    fn pending(&self) -> bool {
        self.pending
    }
}

/// Adapter for handles that cannot seek (stdin, pipes, sockets). Reading
/// passes through; any seek fails, so looping over one is a fatal error.
pub struct Unseekable<R>(pub R);

impl<R: Read> Read for Unseekable<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R> Seek for Unseekable<R> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Other,
            "input does not support seeking",
        ))
    }
}
