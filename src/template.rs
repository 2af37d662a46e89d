//! printf-style output templates for the text printers.
//!
//! Supports literal text, `%%`, and conversions of the form
//! `%[flags][width][.precision][length]conv` where flags are any of
//! `- + space 0 #`, length modifiers are accepted and ignored, and `conv` is
//! one of `d i u x X o c f F e E g G`.

use std::fmt;

use bytes::BytesMut;
use failure::Fail;

use crate::blocks::RENDER_LIMIT;

/// A value handed to a conversion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Arg {
    Int(i64),
    Uint(u64),
    Float(f64),
}

impl Arg {
    fn as_f64(self) -> f64 {
        match self {
            Arg::Int(v) => v as f64,
            Arg::Uint(v) => v as f64,
            Arg::Float(v) => v,
        }
    }

    fn as_i128(self) -> i128 {
        match self {
            Arg::Int(v) => v as i128,
            Arg::Uint(v) => v as i128,
            Arg::Float(v) => v.trunc() as i64 as i128,
        }
    }

    // same reinterpretation as passing a negative int to %u / %x
    fn as_u64(self) -> u64 {
        match self {
            Arg::Int(v) => v as u64,
            Arg::Uint(v) => v,
            Arg::Float(v) => v.trunc() as i64 as u64,
        }
    }
}

#[derive(Debug, Fail, PartialEq)]
pub enum TemplateError {
    #[fail(display = "template ends inside a conversion")]
    Truncated,

    #[fail(display = "unsupported conversion '%{}' at offset {}", conv, offset)]
    Unsupported { conv: char, offset: usize },

    #[fail(display = "'*' width or precision at offset {}", offset)]
    Star { offset: usize },

    #[fail(
        display = "width or precision at offset {} is over {} bytes",
        offset, limit
    )]
    Width { offset: usize, limit: usize },

    #[fail(display = "expected {} conversions, found {}", expected, found)]
    Arity { expected: usize, found: usize },
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Conv {
    Signed,
    Unsigned,
    Octal,
    Hex { upper: bool },
    Char,
    Fixed { upper: bool },
    Exp { upper: bool },
    General { upper: bool },
}

#[derive(Clone, Debug, Default)]
struct Flags {
    left: bool,
    plus: bool,
    space: bool,
    zero: bool,
    alt: bool,
}

#[derive(Clone, Debug)]
struct Directive {
    flags: Flags,
    width: Option<usize>,
    precision: Option<usize>,
    conv: Conv,
}

#[derive(Clone, Debug)]
enum Piece {
    Text(String),
    Conv(Directive),
}

#[derive(Clone, Debug)]
pub struct Template {
    source: String,
    pieces: Vec<Piece>,
}

impl Template {
    pub fn parse(text: &str) -> Result<Template, TemplateError> {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut chars = text.char_indices().peekable();

        while let Some((offset, c)) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }
            if let Some(&(_, '%')) = chars.peek() {
                chars.next();
                literal.push('%');
                continue;
            }

            let mut flags = Flags::default();
            while let Some(&(_, f)) = chars.peek() {
                match f {
                    '-' => flags.left = true,
                    '+' => flags.plus = true,
                    ' ' => flags.space = true,
                    '0' => flags.zero = true,
                    '#' => flags.alt = true,
                    _ => break,
                }
                chars.next();
            }

            let width = Self::number(&mut chars, offset)?;
            let mut precision = None;
            if let Some(&(_, '.')) = chars.peek() {
                chars.next();
                precision = Some(Self::number(&mut chars, offset)?.unwrap_or(0));
            }

            // length modifiers carry no meaning once the argument is an Arg
            while let Some(&(_, l)) = chars.peek() {
                match l {
                    'h' | 'l' | 'L' | 'q' | 'j' | 'z' | 't' => {
                        chars.next();
                    }
                    _ => break,
                }
            }

            let conv = match chars.next() {
                None => return Err(TemplateError::Truncated),
                Some((_, c)) => match c {
                    'd' | 'i' => Conv::Signed,
                    'u' => Conv::Unsigned,
                    'o' => Conv::Octal,
                    'x' => Conv::Hex { upper: false },
                    'X' => Conv::Hex { upper: true },
                    'c' => Conv::Char,
                    'f' => Conv::Fixed { upper: false },
                    'F' => Conv::Fixed { upper: true },
                    'e' => Conv::Exp { upper: false },
                    'E' => Conv::Exp { upper: true },
                    'g' => Conv::General { upper: false },
                    'G' => Conv::General { upper: true },
                    conv => return Err(TemplateError::Unsupported { conv, offset }),
                },
            };

            if !literal.is_empty() {
                pieces.push(Piece::Text(std::mem::take(&mut literal)));
            }
            pieces.push(Piece::Conv(Directive {
                flags,
                width,
                precision,
                conv,
            }));
        }

        if !literal.is_empty() {
            pieces.push(Piece::Text(literal));
        }

        Ok(Template {
            source: text.to_string(),
            pieces,
        })
    }

    fn number(
        chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
        offset: usize,
    ) -> Result<Option<usize>, TemplateError> {
        if let Some(&(_, '*')) = chars.peek() {
            return Err(TemplateError::Star { offset });
        }
        let mut value: Option<usize> = None;
        while let Some(&(_, d)) = chars.peek() {
            let digit = match d.to_digit(10) {
                Some(digit) => digit as usize,
                None => break,
            };
            let next = value
                .unwrap_or(0)
                .checked_mul(10)
                .and_then(|v| v.checked_add(digit))
                .filter(|&v| v <= RENDER_LIMIT)
                .ok_or(TemplateError::Width {
                    offset,
                    limit: RENDER_LIMIT,
                })?;
            value = Some(next);
            chars.next();
        }
        Ok(value)
    }

    /// Number of conversions (arguments) the template consumes.
    pub fn arity(&self) -> usize {
        self.pieces
            .iter()
            .filter(|p| matches!(p, Piece::Conv(_)))
            .count()
    }

    /// Checks that the template takes exactly `n` arguments.
    pub fn expect_args(self, n: usize) -> Result<Template, TemplateError> {
        let found = self.arity();
        if found != n {
            return Err(TemplateError::Arity { expected: n, found });
        }
        Ok(self)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Appends the rendered template to `out`.
    pub fn render(&self, out: &mut BytesMut, args: &[Arg]) -> Result<(), TemplateError> {
        let arity = self.arity();
        if args.len() != arity {
            return Err(TemplateError::Arity {
                expected: arity,
                found: args.len(),
            });
        }

        let mut args = args.iter();
        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => out.extend_from_slice(text.as_bytes()),
                Piece::Conv(directive) => {
                    // arity was checked above
                    if let Some(&arg) = args.next() {
                        out.extend_from_slice(&directive.format(arg));
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.source)
    }
}

impl Directive {
    fn format(&self, arg: Arg) -> Vec<u8> {
        let (sign, prefix, body, numeric) = match self.conv {
            Conv::Signed => {
                let v = arg.as_i128();
                let sign = self.sign_of(v < 0);
                (sign, "", self.int_digits(v.unsigned_abs(), 10, false), true)
            }
            Conv::Unsigned => ("", "", self.int_digits(arg.as_u64() as u128, 10, false), true),
            Conv::Octal => {
                let v = arg.as_u64() as u128;
                let mut digits = self.int_digits(v, 8, false);
                if self.flags.alt && !digits.starts_with('0') {
                    digits.insert(0, '0');
                }
                ("", "", digits, true)
            }
            Conv::Hex { upper } => {
                let v = arg.as_u64() as u128;
                let prefix = match (self.flags.alt && v != 0, upper) {
                    (true, false) => "0x",
                    (true, true) => "0X",
                    _ => "",
                };
                ("", prefix, self.int_digits(v, 16, upper), true)
            }
            Conv::Char => {
                // one byte, whatever the value
                return self.pad("", "", vec![arg.as_u64() as u8], false);
            }
            Conv::Fixed { upper } | Conv::Exp { upper } | Conv::General { upper } => {
                let v = arg.as_f64();
                let sign = self.sign_of(v.is_sign_negative() && !v.is_nan());
                if !v.is_finite() {
                    let text = match (v.is_nan(), upper) {
                        (true, false) => "nan",
                        (true, true) => "NAN",
                        (false, false) => "inf",
                        (false, true) => "INF",
                    };
                    (sign, "", text.to_string(), false)
                } else {
                    (sign, "", self.float_body(v.abs()), true)
                }
            }
        };

        self.pad(sign, prefix, body.into_bytes(), numeric)
    }

    fn sign_of(&self, negative: bool) -> &'static str {
        if negative {
            "-"
        } else if self.flags.plus {
            "+"
        } else if self.flags.space {
            " "
        } else {
            ""
        }
    }

    fn int_digits(&self, v: u128, radix: u32, upper: bool) -> String {
        let mut digits = match (radix, upper) {
            (8, _) => format!("{:o}", v),
            (16, false) => format!("{:x}", v),
            (16, true) => format!("{:X}", v),
            _ => v.to_string(),
        };
        if let Some(p) = self.precision {
            if p == 0 && v == 0 {
                digits.clear();
            }
            while digits.len() < p {
                digits.insert(0, '0');
            }
        }
        digits
    }

    fn float_body(&self, v: f64) -> String {
        let p = self.precision.unwrap_or(6);
        let mut body = match self.conv {
            Conv::Fixed { .. } => {
                let mut s = format!("{:.*}", p, v);
                if self.flags.alt && p == 0 {
                    s.push('.');
                }
                s
            }
            Conv::Exp { .. } => exp_notation(v, p, self.flags.alt),
            _ => {
                let p = if p == 0 { 1 } else { p };
                let x = exponent_of(v, p - 1);
                let mut s = if x < p as i32 && x >= -4 {
                    format!("{:.*}", (p as i32 - 1 - x) as usize, v)
                } else {
                    exp_notation(v, p - 1, self.flags.alt)
                };
                if !self.flags.alt {
                    s = strip_fraction_zeros(&s);
                }
                s
            }
        };
        let upper = match self.conv {
            Conv::Fixed { upper } | Conv::Exp { upper } | Conv::General { upper } => upper,
            _ => false,
        };
        if upper {
            body = body.to_uppercase();
        }
        body
    }

    fn pad(&self, sign: &str, prefix: &str, body: Vec<u8>, numeric: bool) -> Vec<u8> {
        let len = sign.len() + prefix.len() + body.len();
        let fill = self.width.unwrap_or(0).saturating_sub(len);
        let int_conv = matches!(
            self.conv,
            Conv::Signed | Conv::Unsigned | Conv::Octal | Conv::Hex { .. }
        );
        let zero_pad =
            self.flags.zero && !self.flags.left && numeric && !(int_conv && self.precision.is_some());

        let mut out = Vec::with_capacity(len + fill);
        if fill > 0 && !self.flags.left && !zero_pad {
            out.resize(fill, b' ');
        }
        out.extend_from_slice(sign.as_bytes());
        out.extend_from_slice(prefix.as_bytes());
        if fill > 0 && zero_pad {
            out.resize(out.len() + fill, b'0');
        }
        out.extend_from_slice(&body);
        if fill > 0 && self.flags.left {
            out.resize(out.len() + fill, b' ');
        }
        out
    }
}

// decimal exponent of v once rounded to `digits` fractional mantissa digits
fn exponent_of(v: f64, digits: usize) -> i32 {
    let s = format!("{:.*e}", digits, v);
    s.rsplit('e')
        .next()
        .and_then(|e| e.parse().ok())
        .unwrap_or(0)
}

// C layout: mantissa, 'e', sign, at least two exponent digits
fn exp_notation(v: f64, precision: usize, alt: bool) -> String {
    let s = format!("{:.*e}", precision, v);
    let mut parts = s.splitn(2, 'e');
    let mut mantissa = parts.next().unwrap_or("0").to_string();
    let exp: i32 = parts.next().and_then(|e| e.parse().ok()).unwrap_or(0);
    if alt && precision == 0 {
        mantissa.push('.');
    }
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{}e{}{:02}", mantissa, sign, exp.abs())
}

fn strip_fraction_zeros(s: &str) -> String {
    let (mantissa, exp) = match s.find('e') {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    };
    if !mantissa.contains('.') {
        return s.to_string();
    }
    let trimmed = mantissa.trim_end_matches('0').trim_end_matches('.');
    format!("{}{}", trimmed, exp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(t: &str, args: &[Arg]) -> String {
        let mut out = BytesMut::new();
        Template::parse(t).unwrap().render(&mut out, args).unwrap();
        String::from_utf8(out.to_vec()).unwrap()
    }

    #[test]
    fn integers() {
        assert_eq!(render("%d\n", &[Arg::Int(2)]), "2\n");
        assert_eq!(render("[%5d]", &[Arg::Int(-42)]), "[  -42]");
        assert_eq!(render("[%-5d]", &[Arg::Int(42)]), "[42   ]");
        assert_eq!(render("[%05d]", &[Arg::Int(-42)]), "[-0042]");
        assert_eq!(render("[%+d]", &[Arg::Int(7)]), "[+7]");
        assert_eq!(render("[%.3d]", &[Arg::Int(7)]), "[007]");
        assert_eq!(render("[%ld]", &[Arg::Uint(u64::MAX)]), "[18446744073709551615]");
        assert_eq!(render("%u", &[Arg::Int(-1)]), "18446744073709551615");
    }

    #[test]
    fn radix_conversions() {
        assert_eq!(render("%x %X", &[Arg::Int(255), Arg::Int(255)]), "ff FF");
        assert_eq!(render("%#x", &[Arg::Int(255)]), "0xff");
        assert_eq!(render("%#o", &[Arg::Int(8)]), "010");
        assert_eq!(render("%c", &[Arg::Int(65)]), "A");
        assert_eq!(render("[%3c]", &[Arg::Int(66)]), "[  B]");
    }

    #[test]
    fn char_is_a_single_byte() {
        let mut out = BytesMut::new();
        let t = Template::parse("%c|%c").unwrap();
        t.render(&mut out, &[Arg::Int(0xe9), Arg::Int(0x141)]).unwrap();
        assert_eq!(&out[..], &[0xe9, b'|', 0x41]);
    }

    #[test]
    fn oversized_fields_are_rejected_at_parse() {
        let limit = RENDER_LIMIT;
        assert_eq!(
            Template::parse("%99999999999999999999999d").unwrap_err(),
            TemplateError::Width { offset: 0, limit }
        );
        assert_eq!(
            Template::parse("x %1000000000000d").unwrap_err(),
            TemplateError::Width { offset: 2, limit }
        );
        assert_eq!(
            Template::parse("%.99999999f").unwrap_err(),
            TemplateError::Width { offset: 0, limit }
        );
        let widest = format!("%{}d", RENDER_LIMIT);
        assert_eq!(render(&widest, &[Arg::Int(1)]).len(), RENDER_LIMIT);
    }

    #[test]
    fn floats() {
        assert_eq!(render("%f", &[Arg::Float(1.5)]), "1.500000");
        assert_eq!(render("[%8.3f]", &[Arg::Float(-3.14159)]), "[  -3.142]");
        assert_eq!(render("%e", &[Arg::Float(12345.678)]), "1.234568e+04");
        assert_eq!(render("%.2E", &[Arg::Float(0.000123)]), "1.23E-04");
        assert_eq!(render("%f", &[Arg::Float(f64::INFINITY)]), "inf");
        assert_eq!(render("%f", &[Arg::Float(-0.0)]), "-0.000000");
    }

    #[test]
    fn general_float() {
        assert_eq!(render("%g", &[Arg::Float(100.0)]), "100");
        assert_eq!(render("%g", &[Arg::Float(0.0001)]), "0.0001");
        assert_eq!(render("%g", &[Arg::Float(0.00001)]), "1e-05");
        assert_eq!(render("%g", &[Arg::Float(123456789.0)]), "1.23457e+08");
        assert_eq!(render("%g", &[Arg::Float(0.0)]), "0");
        assert_eq!(render("%.3g", &[Arg::Float(3.14159)]), "3.14");
    }

    #[test]
    fn mixed_argument_kinds() {
        assert_eq!(render("%d", &[Arg::Float(2.9)]), "2");
        assert_eq!(render("%d", &[Arg::Float(-2.9)]), "-2");
        assert_eq!(render("%.1f", &[Arg::Int(3)]), "3.0");
    }

    #[test]
    fn literals_and_percent() {
        assert_eq!(render("100%% done\n", &[]), "100% done\n");
        let t = Template::parse("%d,%d;").unwrap();
        assert_eq!(t.arity(), 2);
        assert_eq!(t.as_str(), "%d,%d;");
    }

    #[test]
    fn malformed_templates() {
        assert_eq!(Template::parse("%").unwrap_err(), TemplateError::Truncated);
        assert_eq!(Template::parse("x %5").unwrap_err(), TemplateError::Truncated);
        assert_eq!(
            Template::parse("ok %s").unwrap_err(),
            TemplateError::Unsupported {
                conv: 's',
                offset: 3
            }
        );
        assert_eq!(
            Template::parse("%*d").unwrap_err(),
            TemplateError::Star { offset: 0 }
        );
    }

    #[test]
    fn arity_is_enforced() {
        let err = Template::parse("%f %f").unwrap().expect_args(1).unwrap_err();
        assert_eq!(
            err,
            TemplateError::Arity {
                expected: 1,
                found: 2
            }
        );
        let t = Template::parse("%d").unwrap();
        let mut out = BytesMut::new();
        assert!(t.render(&mut out, &[]).is_err());
        assert!(out.is_empty());
    }
}
