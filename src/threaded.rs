//! Blocking file handles moved onto worker threads.
//!
//! A [`ThreadedReader`] runs the blocking reads of some source on its own
//! thread and parks the bytes in a ring buffer; its own `Read` impl never
//! blocks and answers `WouldBlock` while the worker has nothing new. A
//! [`ThreadedWriter`] does the same for a sink. Wrapped in the file blocks,
//! they keep a slow device from stalling the scheduler thread while every
//! other block keeps the same contract.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use crossbeam_utils::Backoff;
use log::*;
use ringbuf::{Consumer, Producer, RingBuffer};

pub const THREADED_BUFFER_SIZE: usize = 256 * 1024;

const CHUNK_SIZE: usize = 16 * 1024;
const IDLE_SLEEP: Duration = Duration::from_millis(1);

fn ring_capacity(align: usize) -> usize {
    THREADED_BUFFER_SIZE.max(align * 2)
}

// the other side hung up
fn stopped(stop: &Receiver<()>) -> bool {
    matches!(stop.try_recv(), Err(TryRecvError::Disconnected))
}

fn idle(backoff: &Backoff) {
    if backoff.is_completed() {
        thread::sleep(IDLE_SLEEP);
    } else {
        backoff.snooze();
    }
}

pub struct ThreadedReader {
    name: String,
    consumer: Consumer<u8>,
    align: usize,
    done: Receiver<io::Result<()>>,
    finished: Option<Result<(), (io::ErrorKind, String)>>,
    _stop: Sender<()>,
}

impl ThreadedReader {
    /// Starts reading `input` on a new thread. Reads hand out multiples of
    /// `align` bytes, except for a short tail left over at end of stream.
    pub fn spawn<R: Read + Send + 'static>(
        name: &str,
        input: R,
        align: usize,
    ) -> io::Result<ThreadedReader> {
        let align = align.max(1);
        let (producer, consumer) = RingBuffer::<u8>::new(ring_capacity(align)).split();
        let (done_tx, done_rx) = bounded(1);
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let thread_name = name.to_string();
        thread::Builder::new()
            .name(format!("{}-reader", name))
            .spawn(move || {
                let result = fill(input, producer, &stop_rx);
                match &result {
                    Ok(()) => debug!("{} reader thread reached end of stream", thread_name),
                    Err(e) => error!("{} reader thread failed: {}", thread_name, e),
                }
                let _ = done_tx.send(result);
            })?;

        Ok(ThreadedReader {
            name: name.to_string(),
            consumer,
            align,
            done: done_rx,
            finished: None,
            _stop: stop_tx,
        })
    }

    fn poll_done(&mut self) {
        if self.finished.is_some() {
            return;
        }
        match self.done.try_recv() {
            Ok(Ok(())) => self.finished = Some(Ok(())),
            Ok(Err(e)) => self.finished = Some(Err((e.kind(), e.to_string()))),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                self.finished = Some(Err((
                    io::ErrorKind::Other,
                    format!("{} reader thread exited", self.name),
                )))
            }
        }
    }
}

fn fill<R: Read>(mut input: R, mut producer: Producer<u8>, stop: &Receiver<()>) -> io::Result<()> {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let backoff = Backoff::new();
    loop {
        let n = match input.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        let mut pushed = 0;
        while pushed < n {
            let k = producer.push_slice(&chunk[pushed..n]);
            pushed += k;
            if k > 0 {
                backoff.reset();
                continue;
            }
            if stopped(stop) {
                return Ok(());
            }
            idle(&backoff);
        }
        trace!("reader thread queued {} bytes", n);
    }
}

impl Read for ThreadedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // look at the worker first: whatever it queued before finishing is
        // visible once its completion is
        self.poll_done();

        let queued = self.consumer.len();
        let mut n = queued.min(buf.len());
        let tail = self.finished.is_some() && n == queued;
        if !tail {
            n -= n % self.align;
        }
        if n > 0 {
            return Ok(self.consumer.pop_slice(&mut buf[..n]));
        }

        match &self.finished {
            None => Err(io::ErrorKind::WouldBlock.into()),
            Some(Ok(())) => Ok(0),
            Some(Err((kind, msg))) => Err(io::Error::new(*kind, msg.clone())),
        }
    }
}

impl Seek for ThreadedReader {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Other,
            "threaded input does not support seeking",
        ))
    }
}

pub struct ThreadedWriter {
    name: String,
    producer: Producer<u8>,
    align: usize,
    status: Receiver<io::Error>,
    failed: Option<String>,
    flushes: Sender<()>,
    flushed: Receiver<io::Result<()>>,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

// what the worker listens on besides the ring
struct Control {
    stop: Receiver<()>,
    flushes: Receiver<()>,
    flushed: Sender<io::Result<()>>,
}

impl ThreadedWriter {
    /// Starts draining into `output` on a new thread. Writes accept
    /// multiples of `align` bytes.
    pub fn spawn<W: Write + Send + 'static>(
        name: &str,
        output: W,
        align: usize,
    ) -> io::Result<ThreadedWriter> {
        let align = align.max(1);
        let (producer, consumer) = RingBuffer::<u8>::new(ring_capacity(align)).split();
        let (status_tx, status_rx) = bounded(1);
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let (flush_tx, flush_rx) = bounded(1);
        let (flushed_tx, flushed_rx) = bounded(1);
        let control = Control {
            stop: stop_rx,
            flushes: flush_rx,
            flushed: flushed_tx,
        };

        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(format!("{}-writer", name))
            .spawn(move || match drain(output, consumer, &control) {
                Ok(()) => debug!("{} writer thread finished", thread_name),
                Err(e) => {
                    error!("{} writer thread failed: {}", thread_name, e);
                    let _ = status_tx.send(e);
                }
            })?;

        Ok(ThreadedWriter {
            name: name.to_string(),
            producer,
            align,
            status: status_rx,
            failed: None,
            flushes: flush_tx,
            flushed: flushed_rx,
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    fn check(&mut self) -> io::Result<()> {
        if let Some(msg) = &self.failed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, msg.clone()));
        }
        match self.status.try_recv() {
            Ok(e) => {
                self.failed = Some(e.to_string());
                Err(e)
            }
            Err(TryRecvError::Empty) => Ok(()),
            Err(TryRecvError::Disconnected) => {
                let msg = format!("{} writer thread exited", self.name);
                self.failed = Some(msg.clone());
                Err(io::Error::new(io::ErrorKind::BrokenPipe, msg))
            }
        }
    }

    /// Hands the remaining bytes to the sink, waits for the worker and
    /// reports its last error.
    pub fn finish(mut self) -> io::Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> io::Result<()> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => return Ok(()),
        };
        self.stop.take();
        if handle.join().is_err() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} writer thread panicked", self.name),
            ));
        }
        match (self.status.try_recv(), &self.failed) {
            (Ok(e), _) => Err(e),
            (Err(_), Some(msg)) => Err(io::Error::new(io::ErrorKind::BrokenPipe, msg.clone())),
            (Err(_), None) => Ok(()),
        }
    }
}

fn drain<W: Write>(mut output: W, mut consumer: Consumer<u8>, control: &Control) -> io::Result<()> {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let backoff = Backoff::new();
    let mut dirty = false;
    loop {
        let n = consumer.pop_slice(&mut chunk);
        if n > 0 {
            output.write_all(&chunk[..n])?;
            dirty = true;
            backoff.reset();
            continue;
        }

        if stopped(&control.stop) {
            // the writer is gone; anything it queued is visible now
            write_queued(&mut output, &mut consumer, &mut chunk)?;
            return output.flush();
        }

        // the writer is parked in flush(), so the ring only holds what it
        // pushed before asking
        if control.flushes.try_recv().is_ok() {
            let result =
                write_queued(&mut output, &mut consumer, &mut chunk).and_then(|()| output.flush());
            let reply = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = control.flushed.send(reply);
            result?;
            dirty = false;
            continue;
        }

        if dirty {
            output.flush()?;
            dirty = false;
        }
        idle(&backoff);
    }
}

fn write_queued<W: Write>(
    output: &mut W,
    consumer: &mut Consumer<u8>,
    chunk: &mut [u8],
) -> io::Result<()> {
    loop {
        let n = consumer.pop_slice(chunk);
        if n == 0 {
            return Ok(());
        }
        output.write_all(&chunk[..n])?;
    }
}

impl Write for ThreadedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check()?;
        if buf.is_empty() {
            return Ok(0);
        }
        let room = self.producer.remaining().min(buf.len());
        let n = room - room % self.align;
        if n == 0 {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        Ok(self.producer.push_slice(&buf[..n]))
    }

    /// Waits until the worker has written and flushed everything queued so
    /// far, and reports what the sink said.
    fn flush(&mut self) -> io::Result<()> {
        self.check()?;
        let reply = match self.flushes.send(()) {
            Ok(()) => self.flushed.recv().ok(),
            Err(_) => None,
        };
        match reply {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => {
                self.failed = Some(e.to_string());
                Err(e)
            }
            // the worker died before answering; its error is on status
            None => {
                self.check()?;
                Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    format!("{} writer thread exited", self.name),
                ))
            }
        }
    }
}

impl Drop for ThreadedWriter {
    fn drop(&mut self) {
        let reported = self.failed.is_some();
        if let Err(e) = self.shutdown() {
            if !reported {
                error!("{} writer shutdown failed: {}", self.name, e);
            }
        }
    }
}
