use bytemuck::Pod;

use crate::template::Arg;

/// Interleaved I/Q sample, two consecutive scalars as in raw capture files.
pub use num_complex::Complex;

/// Fixed-size element that can travel through a pipe and be moved to and
/// from raw file descriptors byte for byte.
pub trait Element: Pod + Default + Send {}

impl<T: Pod + Default + Send> Element for T {}

/// Numeric element that can be scaled and rendered through a template.
pub trait Scalar: Element + PartialEq + std::fmt::Debug {
    fn one() -> Self;
    /// Multiplies by `k`. Integer types wrap instead of overflowing.
    fn scaled(self, k: Self) -> Self;
    fn from_count(n: usize) -> Self;
    fn from_f64(v: f64) -> Self;
    fn to_arg(self) -> Arg;
}

macro_rules! int_scalar {
    ($($t:ty),*) => {$(
        impl Scalar for $t {
            fn one() -> Self {
                1
            }
            fn scaled(self, k: Self) -> Self {
                self.wrapping_mul(k)
            }
            fn from_count(n: usize) -> Self {
                n as $t
            }
            fn from_f64(v: f64) -> Self {
                v as $t
            }
            fn to_arg(self) -> Arg {
                Arg::Int(self as i64)
            }
        }
    )*};
}

macro_rules! float_scalar {
    ($($t:ty),*) => {$(
        impl Scalar for $t {
            fn one() -> Self {
                1.0
            }
            fn scaled(self, k: Self) -> Self {
                self * k
            }
            fn from_count(n: usize) -> Self {
                n as $t
            }
            fn from_f64(v: f64) -> Self {
                v as $t
            }
            fn to_arg(self) -> Arg {
                Arg::Float(self as f64)
            }
        }
    )*};
}

int_scalar!(u8, i8, u16, i16, u32, i32, i64);
float_scalar!(f32, f64);

// u64 does not fit the signed argument slot.
impl Scalar for u64 {
    fn one() -> Self {
        1
    }
    fn scaled(self, k: Self) -> Self {
        self.wrapping_mul(k)
    }
    fn from_count(n: usize) -> Self {
        n as u64
    }
    fn from_f64(v: f64) -> Self {
        v as u64
    }
    fn to_arg(self) -> Arg {
        Arg::Uint(self)
    }
}
