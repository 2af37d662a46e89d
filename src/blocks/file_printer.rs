use std::io::Write;
use std::rc::Rc;

use bytes::BytesMut;
use log::*;

use super::RENDER_LIMIT;
use crate::error::BlockError;
use crate::pipe::{PipeReader, PipeStats};
use crate::sample::Scalar;
use crate::template::Template;
use crate::Block;

/// Prints every element of a pipe through a one-argument template,
/// optionally scaled, one write per element.
pub struct FilePrinter<T, W> {
    name: String,
    input: PipeReader<T>,
    output: W,
    template: Template,
    scale: T,
    text: BytesMut,
}

impl<T: Scalar, W: Write> FilePrinter<T, W> {
    pub fn new(
        format: &str,
        input: PipeReader<T>,
        output: W,
    ) -> Result<FilePrinter<T, W>, BlockError> {
        let name = input.name().to_string();
        let template = Template::parse(format)
            .and_then(|t| t.expect_args(1))
            .map_err(|error| BlockError::Template {
                block: name.clone(),
                error,
            })?;
        debug!("file_printer {} with template {}", name, template);

        Ok(FilePrinter {
            name,
            input,
            output,
            template,
            scale: T::one(),
            text: BytesMut::with_capacity(RENDER_LIMIT),
        })
    }

    pub fn with_scale(mut self, scale: T) -> FilePrinter<T, W> {
        self.scale = scale;
        self
    }

    pub fn set_scale(&mut self, scale: T) {
        self.scale = scale;
    }

    pub fn scale(&self) -> T {
        self.scale
    }

    pub fn get_ref(&self) -> &W {
        &self.output
    }

    pub fn into_inner(self) -> W {
        self.output
    }
}

impl<T: Scalar, W: Write> Block for FilePrinter<T, W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn pipes(&self) -> Vec<Rc<PipeStats>> {
        vec![self.input.stats()]
    }

    fn run(&mut self) -> Result<(), BlockError> {
        let n = self.input.readable();
        if n == 0 {
            return Ok(());
        }

        {
            let rd = self.input.rd();
            for &v in rd.iter() {
                self.text.clear();
                if let Err(e) = self
                    .template
                    .render(&mut self.text, &[v.scaled(self.scale).to_arg()])
                {
                    return Err(BlockError::Render {
                        block: self.name.clone(),
                        reason: e.to_string(),
                    });
                }

                let len = self.text.len();
                if len > RENDER_LIMIT {
                    return Err(BlockError::Render {
                        block: self.name.clone(),
                        reason: format!("{} bytes over the {} byte limit", len, RENDER_LIMIT),
                    });
                }

                let nw = self.output.write(&self.text).map_err(|error| BlockError::Write {
                    block: self.name.clone(),
                    error,
                })?;
                if nw != len {
                    return Err(BlockError::ShortWrite {
                        block: self.name.clone(),
                        written: nw,
                        expected: len,
                    });
                }
            }
        }

        trace!("{} printed {} elements", self.name, n);
        self.input.consume(n)
    }

    fn finish(&mut self) -> Result<(), BlockError> {
        self.output.flush().map_err(|error| BlockError::Write {
            block: self.name.clone(),
            error,
        })
    }
}
