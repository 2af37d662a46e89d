use std::io;

pub mod carray_printer;
pub mod decimator;
pub mod file_printer;
pub mod file_reader;
pub mod file_writer;
pub mod item_counter;

pub use carray_printer::CArrayPrinter;
pub use decimator::Decimator;
pub use file_printer::FilePrinter;
pub use file_reader::{FileReader, Unseekable};
pub use file_writer::FileWriter;
pub use item_counter::ItemCounter;

/// Largest text a printer renders for a single element.
pub const RENDER_LIMIT: usize = 256;

// the handle has nothing for us right now; try again on a later step
fn would_block(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
