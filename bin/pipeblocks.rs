use failure::*;
use log::*;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, Write};
use std::mem;
use structopt::StructOpt;

use pipeblocks::blocks::{
    CArrayPrinter, Decimator, FilePrinter, FileReader, FileWriter, ItemCounter, Unseekable,
};
use pipeblocks::threaded::{ThreadedReader, ThreadedWriter};
use pipeblocks::{Complex, Element, PipeReader, RunSummary, Scalar, Scheduler, SchedulerConfig};

#[derive(StructOpt)]
#[structopt(name = "pipeblocks", about = "run a file through a chain of stream blocks")]
struct Cli {
    /// Input file, `-` for stdin
    #[structopt(default_value = "-")]
    input: String,

    /// Output file, `-` for stdout
    #[structopt(default_value = "-")]
    output: String,

    /// Element type of the input
    #[structopt(
        short,
        long,
        default_value = "u8",
        possible_values = &["u8", "i8", "i16", "u16", "i32", "f32", "f64"]
    )]
    sample: String,

    /// Rewind the input at end of file (use with --passes)
    #[structopt(short, long = "loop")]
    looping: bool,

    /// Keep 1 in N elements
    #[structopt(short, long)]
    decimate: Option<usize>,

    /// Emit the number of elements read per step instead of the elements
    #[structopt(short, long)]
    count: bool,

    /// Print each element through a printf-style template
    #[structopt(short, long)]
    print: Option<String>,

    /// Multiply elements by this before printing
    #[structopt(long)]
    scale: Option<f64>,

    /// Read interleaved complex pairs and print each batch as an array
    #[structopt(long)]
    carray: bool,

    #[structopt(long, default_value = "{ /* %u */")]
    head: String,

    #[structopt(long, default_value = " {%g, %g},")]
    body: String,

    #[structopt(long, default_value = " }\n")]
    tail: String,

    /// Do file I/O on worker threads
    #[structopt(short, long)]
    threaded: bool,

    /// Pipe capacity in elements
    #[structopt(long, default_value = "4096")]
    capacity: usize,

    /// Stop after this many scheduler passes
    #[structopt(long)]
    passes: Option<u64>,

    /// Log pipe fill levels after every pass
    #[structopt(long)]
    debug: bool,
}

// templates typed on a shell arrive with literal backslash escapes
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

trait Input: Read + Seek {}
impl<R: Read + Seek> Input for R {}

impl Cli {
    fn scheduler_config(&self) -> SchedulerConfig {
        let config = match self.passes {
            Some(n) => SchedulerConfig::bounded(n),
            None => SchedulerConfig::batch(),
        };
        config.with_debug(self.debug)
    }

    fn open_input(&self, align: usize) -> Result<Box<dyn Input>, Error> {
        let stdin = self.input == "-";
        if self.threaded {
            let reader: Box<dyn Read + Send> = if stdin {
                Box::new(io::stdin())
            } else {
                Box::new(File::open(&self.input)?)
            };
            return Ok(Box::new(ThreadedReader::spawn("input", reader, align)?));
        }
        if stdin {
            return Ok(Box::new(Unseekable(io::stdin())));
        }
        Ok(Box::new(File::open(&self.input)?))
    }

    fn open_raw_output(&self) -> Result<Box<dyn Write + Send>, Error> {
        if self.output == "-" {
            return Ok(Box::new(io::stdout()));
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.output)?;
        Ok(Box::new(file))
    }

    // printers need every write to land whole, so only raw output goes
    // through a worker thread
    fn open_output(&self, align: Option<usize>) -> Result<Box<dyn Write>, Error> {
        let raw = self.open_raw_output()?;
        let out: Box<dyn Write> = match align {
            Some(align) if self.threaded => Box::new(ThreadedWriter::spawn("output", raw, align)?),
            _ => raw,
        };
        Ok(out)
    }

    fn decimate<T: Element>(
        &self,
        sch: &mut Scheduler,
        input: PipeReader<T>,
    ) -> Result<PipeReader<T>, Error> {
        match self.decimate {
            Some(d) => {
                let (w, r) = sch.pipe::<T>("decimated", self.capacity).split();
                sch.add(Decimator::new(d, input, w)?);
                Ok(r)
            }
            None => Ok(input),
        }
    }
}

fn report(summary: RunSummary) -> Result<(), Error> {
    if summary.truncated {
        info!("stopped after {} passes", summary.passes);
    }
    Ok(())
}

fn run_carray<T: Scalar>(cli: &Cli, mut sch: Scheduler) -> Result<(), Error> {
    let align = mem::size_of::<Complex<T>>();
    let (w, r) = sch.pipe::<Complex<T>>("input", cli.capacity).split();
    sch.add(FileReader::new(cli.open_input(align)?, w).with_loop(cli.looping));
    let r = cli.decimate(&mut sch, r)?;

    let out = cli.open_output(None)?;
    let (head, body, tail) = (unescape(&cli.head), unescape(&cli.body), unescape(&cli.tail));
    let mut printer = CArrayPrinter::new(&head, &body, &tail, r, Some(out))?;
    if let Some(scale) = cli.scale {
        printer.set_scale(T::from_f64(scale));
    }
    sch.add(printer);
    report(sch.run()?)
}

fn run<T: Scalar>(cli: &Cli) -> Result<(), Error> {
    let mut sch = Scheduler::new(cli.scheduler_config());
    if cli.carray {
        return run_carray::<T>(cli, sch);
    }

    let align = mem::size_of::<T>();
    let (w, r) = sch.pipe::<T>("input", cli.capacity).split();
    sch.add(FileReader::new(cli.open_input(align)?, w).with_loop(cli.looping));
    let r = cli.decimate(&mut sch, r)?;

    if cli.count {
        let (cw, cr) = sch.pipe::<u64>("count", cli.capacity).split();
        sch.add(ItemCounter::new(r, cw));
        let format = cli.print.as_deref().map(unescape);
        let format = format.as_deref().unwrap_or("%lu\n");
        sch.add(FilePrinter::new(format, cr, cli.open_output(None)?)?);
    } else if let Some(format) = &cli.print {
        let mut printer = FilePrinter::new(&unescape(format), r, cli.open_output(None)?)?;
        if let Some(scale) = cli.scale {
            printer.set_scale(T::from_f64(scale));
        }
        sch.add(printer);
    } else {
        sch.add(FileWriter::new(r, cli.open_output(Some(align))?));
    }

    report(sch.run()?)
}

fn main() -> Result<(), Error> {
    pretty_env_logger::init();
    let args = Cli::from_args();

    if args.capacity == 0 {
        bail!("pipe capacity must be at least 1");
    }
    if args.looping && args.passes.is_none() {
        warn!("looping input without --passes runs until interrupted");
    }
    if args.scale.is_some() && args.print.is_none() && !args.carray {
        warn!("--scale only applies to --print and --carray");
    }

    match args.sample.as_str() {
        "u8" => run::<u8>(&args),
        "i8" => run::<i8>(&args),
        "i16" => run::<i16>(&args),
        "u16" => run::<u16>(&args),
        "i32" => run::<i32>(&args),
        "f32" => run::<f32>(&args),
        "f64" => run::<f64>(&args),
        other => Err(format_err!("unsupported sample type {}", other)),
    }
}
