use std::fs::{self, File};
use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pipeblocks::blocks::{CArrayPrinter, Decimator, FilePrinter, FileReader, FileWriter, ItemCounter};
use pipeblocks::threaded::{ThreadedReader, ThreadedWriter};
use pipeblocks::{BlockError, Complex, Scheduler, SchedulerConfig};

#[derive(Clone, Default)]
struct Shared(Arc<Mutex<Vec<u8>>>);

impl Shared {
    fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for Shared {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// takes every write, fails every flush
#[derive(Clone, Default)]
struct Unflushable(Arc<Mutex<Vec<u8>>>);

impl Write for Unflushable {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "device full"))
    }
}

fn temp_input(data: &[u8]) -> File {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(data).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    file
}

fn polling() -> SchedulerConfig {
    SchedulerConfig {
        idle_sleep: Duration::from_millis(1),
        ..SchedulerConfig::default()
    }
}

#[test]
fn decimates_file_to_file() {
    let samples: Vec<i32> = (0..100).collect();
    let out = tempfile::NamedTempFile::new().unwrap();

    let mut sch = Scheduler::new(SchedulerConfig::batch());
    let (raw_w, raw_r) = sch.pipe::<i32>("raw", 16).split();
    let (dec_w, dec_r) = sch.pipe::<i32>("decimated", 8).split();
    sch.add(FileReader::new(temp_input(bytemuck::cast_slice::<_, u8>(&samples)), raw_w));
    sch.add(Decimator::new(3, raw_r, dec_w).unwrap());
    sch.add(FileWriter::new(dec_r, File::create(out.path()).unwrap()));

    let summary = sch.run().unwrap();
    assert!(!summary.truncated);
    drop(sch);

    let expected: Vec<i32> = (0..100).step_by(3).take(100 / 3).collect();
    assert_eq!(fs::read(out.path()).unwrap(), bytemuck::cast_slice::<_, u8>(&expected));
}

#[test]
fn looping_file_replays_its_content() {
    let sink = Shared::default();
    let mut sch = Scheduler::new(SchedulerConfig::bounded(5));
    let (w, r) = sch.pipe::<u8>("loop", 4).split();
    sch.add(FileReader::new(temp_input(&[1, 2, 3]), w).with_loop(true));
    sch.add(FileWriter::new(r, sink.clone()));

    let summary = sch.run().unwrap();
    assert!(summary.truncated);

    let out = sink.contents();
    assert!(out.len() >= 6);
    assert_eq!(out.len() % 3, 0);
    for chunk in out.chunks(3) {
        assert_eq!(chunk, &[1, 2, 3]);
    }
}

#[test]
fn counts_each_batch_and_prints_it() {
    let sink = Shared::default();
    let mut sch = Scheduler::new(SchedulerConfig::batch());
    let (w, r) = sch.pipe::<u8>("bytes", 4).split();
    let (cw, cr) = sch.pipe::<u32>("count", 4).split();
    sch.add(FileReader::new(temp_input(&[0u8; 10]), w));
    sch.add(ItemCounter::new(r, cw));
    sch.add(FilePrinter::new("%d\n", cr, sink.clone()).unwrap());

    sch.run().unwrap();
    assert_eq!(String::from_utf8(sink.contents()).unwrap(), "4\n4\n2\n");
}

#[test]
fn prints_scaled_complex_batches() {
    let sink = Shared::default();
    let iq: Vec<i16> = vec![1, -1, 2, -2];
    let mut sch = Scheduler::new(SchedulerConfig::batch());
    let (w, r) = sch.pipe::<Complex<i16>>("iq", 8).split();
    sch.add(FileReader::new(Cursor::new(bytemuck::cast_slice::<_, u8>(&iq).to_vec()), w));
    let printer = CArrayPrinter::new("[%u]", " %d%+di", ";\n", r, Some(sink.clone()))
        .unwrap()
        .with_scale(10);
    sch.add(printer);

    sch.run().unwrap();
    assert_eq!(
        String::from_utf8(sink.contents()).unwrap(),
        "[2] 10-10i 20-20i;\n"
    );
}

#[test]
fn framing_errors_name_the_block() {
    let mut sch = Scheduler::new(SchedulerConfig::batch());
    let (w, r) = sch.pipe::<u32>("words", 8).split();
    sch.add(FileReader::new(temp_input(&[0u8; 6]), w));
    sch.add(FileWriter::new(r, io::sink()));

    let err = sch.run().unwrap_err();
    assert_eq!(err.block, "words");
    match err.error {
        BlockError::PartialRead {
            bytes,
            element_size,
            ..
        } => {
            assert_eq!(bytes, 6);
            assert_eq!(element_size, 4);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn threaded_input_feeds_the_scheduler() {
    let samples: Vec<i16> = (0..10_000).map(|i| (i % 700) as i16 - 350).collect();
    let bytes = bytemuck::cast_slice::<_, u8>(&samples).to_vec();
    let sink = Shared::default();

    let input = ThreadedReader::spawn("threaded", Cursor::new(bytes.clone()), 2).unwrap();
    let mut sch = Scheduler::new(polling());
    let (w, r) = sch.pipe::<i16>("threaded", 256).split();
    sch.add(FileReader::new(input, w));
    sch.add(FileWriter::new(r, sink.clone()));

    sch.run().unwrap();
    assert_eq!(sink.contents(), bytes);
}

#[test]
fn threaded_output_drains_on_shutdown() {
    let words: Vec<u32> = (0..5_000).collect();
    let bytes = bytemuck::cast_slice::<_, u8>(&words).to_vec();
    let sink = Shared::default();

    let output = ThreadedWriter::spawn("threaded", sink.clone(), 4).unwrap();
    let mut sch = Scheduler::new(polling());
    let (w, r) = sch.pipe::<u32>("words", 64).split();
    sch.add(FileReader::new(Cursor::new(bytes.clone()), w));
    sch.add(FileWriter::new(r, output));

    sch.run().unwrap();
    // dropping the writer block joins its worker
    drop(sch);
    assert_eq!(sink.contents(), bytes);
}

#[test]
fn threaded_output_failure_stops_the_run() {
    let words: Vec<u32> = (0..64).collect();
    let bytes = bytemuck::cast_slice::<_, u8>(&words).to_vec();

    let output = ThreadedWriter::spawn("threaded", Unflushable::default(), 4).unwrap();
    let mut sch = Scheduler::new(polling());
    let (w, r) = sch.pipe::<u32>("words", 16).split();
    sch.add(FileReader::new(Cursor::new(bytes), w));
    sch.add(FileWriter::new(r, output));

    let err = sch.run().unwrap_err();
    assert_eq!(err.block, "words");
    assert!(matches!(err.error, BlockError::Write { .. }));
}
