use std::io;

use failure::Fail;

use crate::template::TemplateError;

/// Fatal condition raised by a block step. Blocks never recover from these;
/// the scheduler stops and hands the error to its caller.
#[derive(Debug, Fail)]
pub enum BlockError {
    #[fail(display = "{}: read failed: {}", block, error)]
    Read {
        block: String,
        #[fail(cause)]
        error: io::Error,
    },

    #[fail(display = "{}: seek failed: {}", block, error)]
    Seek {
        block: String,
        #[fail(cause)]
        error: io::Error,
    },

    #[fail(display = "{}: write failed: {}", block, error)]
    Write {
        block: String,
        #[fail(cause)]
        error: io::Error,
    },

    #[fail(display = "{}: broken pipe (sink accepted no bytes)", block)]
    BrokenPipe { block: String },

    #[fail(
        display = "{}: partial read ({} bytes, element size {})",
        block, bytes, element_size
    )]
    PartialRead {
        block: String,
        bytes: usize,
        element_size: usize,
    },

    #[fail(
        display = "{}: partial write ({} of {} bytes, element size {})",
        block, written, expected, element_size
    )]
    PartialWrite {
        block: String,
        written: usize,
        expected: usize,
        element_size: usize,
    },

    #[fail(display = "{}: short write ({} of {} bytes)", block, written, expected)]
    ShortWrite {
        block: String,
        written: usize,
        expected: usize,
    },

    #[fail(display = "{}: rendering failed: {}", block, reason)]
    Render { block: String, reason: String },

    #[fail(display = "{}: bad template: {}", block, error)]
    Template {
        block: String,
        #[fail(cause)]
        error: TemplateError,
    },

    #[fail(
        display = "{}: consumed {} elements with only {} readable",
        pipe, requested, available
    )]
    Underflow {
        pipe: String,
        requested: usize,
        available: usize,
    },

    #[fail(
        display = "{}: produced {} elements with only {} writable",
        pipe, requested, available
    )]
    Overflow {
        pipe: String,
        requested: usize,
        available: usize,
    },

    #[fail(display = "{}: {}", block, reason)]
    Config { block: String, reason: String },
}

/// A block error tagged with the block that raised it.
#[derive(Debug, Fail)]
#[fail(display = "block {} stopped the pipeline: {}", block, error)]
pub struct PipelineError {
    pub block: String,
    #[fail(cause)]
    pub error: BlockError,
}
