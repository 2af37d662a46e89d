use std::io::{BufWriter, Write};
use std::rc::Rc;

use bytes::BytesMut;
use log::*;

use crate::error::BlockError;
use crate::pipe::{PipeReader, PipeStats};
use crate::sample::{Complex, Scalar};
use crate::template::{Arg, Template, TemplateError};
use crate::Block;

/// Prints everything readable from a complex pipe as one group:
/// `head` with the element count, `body` once per element with the scaled
/// real and imaginary parts, then `tail`, then a flush.
///
/// Without an output stream the input is still drained, just not printed.
pub struct CArrayPrinter<T, W: Write> {
    name: String,
    input: PipeReader<Complex<T>>,
    output: Option<BufWriter<W>>,
    head: Template,
    body: Template,
    tail: Template,
    scale: T,
    text: BytesMut,
}

impl<T: Scalar, W: Write> CArrayPrinter<T, W> {
    pub fn new(
        head: &str,
        body: &str,
        tail: &str,
        input: PipeReader<Complex<T>>,
        output: Option<W>,
    ) -> Result<CArrayPrinter<T, W>, BlockError> {
        let name = input.name().to_string();
        let parse = |text: &str, args: usize| {
            Template::parse(text)
                .and_then(|t| t.expect_args(args))
                .map_err(|error| BlockError::Template {
                    block: name.clone(),
                    error,
                })
        };
        let head = parse(head, 1)?;
        let body = parse(body, 2)?;
        let tail = parse(tail, 0)?;

        if output.is_none() {
            warn!("carray_printer {} has no output, input will be discarded", name);
        }

        Ok(CArrayPrinter {
            name,
            input,
            output: output.map(BufWriter::new),
            head,
            body,
            tail,
            scale: T::one(),
            text: BytesMut::new(),
        })
    }

    pub fn with_scale(mut self, scale: T) -> CArrayPrinter<T, W> {
        self.scale = scale;
        self
    }

    pub fn set_scale(&mut self, scale: T) {
        self.scale = scale;
    }

    pub fn get_ref(&self) -> Option<&W> {
        self.output.as_ref().map(|o| o.get_ref())
    }

    fn print(&mut self, rd: &[Complex<T>]) -> Result<(), BlockError> {
        let out = match self.output.as_mut() {
            Some(out) => out,
            None => return Ok(()),
        };
        let name = &self.name;
        let render_err = |e: TemplateError| BlockError::Render {
            block: name.clone(),
            reason: e.to_string(),
        };
        let write_err = |error| BlockError::Write {
            block: name.clone(),
            error,
        };

        self.text.clear();
        self.head
            .render(&mut self.text, &[Arg::Uint(rd.len() as u64)])
            .map_err(render_err)?;
        for v in rd {
            let v = Complex::new(v.re.scaled(self.scale), v.im.scaled(self.scale));
            self.body
                .render(&mut self.text, &[v.re.to_arg(), v.im.to_arg()])
                .map_err(render_err)?;
        }
        self.tail.render(&mut self.text, &[]).map_err(render_err)?;

        out.write_all(&self.text).map_err(write_err)?;
        out.flush().map_err(write_err)
    }
}

impl<T: Scalar, W: Write> Block for CArrayPrinter<T, W> {
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

        if self.output.is_some() {
            let batch = self.input.rd().to_vec();
            self.print(&batch)?;
        }

        trace!("{} drained {} elements", self.name, n);
        self.input.consume(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::Pipe;

    #[test]
    fn prints_one_group_per_step() {
        let (mut w, r) = Pipe::<Complex<f32>>::new("iq", 8).split();
        w.push_slice(&[Complex::new(1.0, 2.0), Complex::new(3.0, -1.0)]);
        let out = Some(Vec::<u8>::new());
        let mut printer = CArrayPrinter::new("%d:", " %.1f,%.1f", "\n", r, out)
            .unwrap()
            .with_scale(2.0);
        printer.run().unwrap();
        assert_eq!(
            printer.get_ref().unwrap().as_slice(),
            b"2: 2.0,4.0 6.0,-2.0\n"
        );

        w.push_slice(&[Complex::new(0.5, 0.0)]);
        printer.run().unwrap();
        assert_eq!(
            printer.get_ref().unwrap().as_slice(),
            b"2: 2.0,4.0 6.0,-2.0\n1: 1.0,0.0\n"
        );
    }

    #[test]
    fn empty_input_prints_nothing() {
        let (_w, r) = Pipe::<Complex<i16>>::new("iq", 8).split();
        let out = Some(Vec::<u8>::new());
        let mut printer = CArrayPrinter::new("[%d]", "%d%d", "\n", r, out).unwrap();
        printer.run().unwrap();
        assert!(printer.get_ref().unwrap().is_empty());
    }

    #[test]
    fn missing_output_still_drains() {
        let (mut w, r) = Pipe::<Complex<i16>>::new("void", 4).split();
        let stats = w.stats();
        let mut printer =
            CArrayPrinter::<i16, Vec<u8>>::new("%d", "%d %d", "", r, None).unwrap();

        w.push_slice(&[Complex::new(1, 1), Complex::new(2, 2), Complex::new(3, 3)]);
        printer.run().unwrap();
        assert_eq!(stats.total_read(), 3);
        assert_eq!(w.writable(), 4);

        w.push_slice(&[Complex::new(4, 4); 4]);
        printer.run().unwrap();
        assert_eq!(stats.total_read(), 7);
        assert!(printer.get_ref().is_none());
    }

    #[test]
    fn each_template_has_its_own_arity() {
        let attempts = [("%d", "%f", ""), ("", "%f %f", ""), ("%d", "%f %f", "%d")];
        for (head, body, tail) in attempts.iter() {
            let (_w, r) = Pipe::<Complex<f32>>::new("iq", 1).split();
            let built = CArrayPrinter::new(head, body, tail, r, Some(Vec::<u8>::new()));
            assert!(
                matches!(built, Err(BlockError::Template { .. })),
                "{:?} {:?} {:?} accepted",
                head,
                body,
                tail
            );
        }
    }
}
