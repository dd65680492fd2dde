// src/isa/angle.rs

//! Rotation angles as rational multiples of π.
//!
//! An angle is a pair `(n, d)` meaning `n·π / 2^d`. Both fields are encoded
//! as one-byte immediates, which bounds the representable angles: with the
//! numerator normalized to a full turn, `n < 2^(d+1)` must hold, so the
//! largest usable exponent is [`MAX_DENOM`].
//!
//! The pair is stored as written: `(8, 4)` and `(1, 1)` denote the same
//! rotation but encode differently. [`Angle::reduce`] produces the canonical
//! lowest-terms form (numerator odd, or zero with exponent zero) used by the
//! compiler for byte-for-byte deterministic subroutines, and
//! [`Angle::with_denominator`] re-expresses an angle at the fixed exponent a
//! hardware flavour requires.

use std::f64::consts::PI;
use std::fmt;

use crate::core::NetQasmError;

/// Largest denominator exponent whose full-turn numerator range fits a
/// one-byte immediate (`2^(7+1) = 256`).
pub const MAX_DENOM: u8 = 7;

/// Tolerance used when converting a floating-point angle to rational-π form.
const FLOAT_TOLERANCE: f64 = 1e-6;

/// A rotation angle `n·π / 2^d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Angle {
    num: u8,
    denom: u8,
}

impl Angle {
    /// Zero rotation.
    pub const ZERO: Angle = Angle { num: 0, denom: 0 };

    /// Creates an angle `num·π / 2^denom`.
    ///
    /// The numerator is taken modulo a full turn (`2^(denom+1)`), so e.g.
    /// `(34, 4)` and `(2, 4)` denote the same angle. No reduction is
    /// performed; callers that need the canonical form use [`Angle::reduce`].
    pub fn new(num: u8, denom: u8) -> Result<Angle, NetQasmError> {
        if denom > MAX_DENOM {
            return Err(NetQasmError::Encoding {
                message: format!("angle denominator exponent {denom} exceeds maximum {MAX_DENOM}"),
            });
        }
        let full_turn = 1u16 << (denom + 1);
        let num = (num as u16 % full_turn) as u8;
        Ok(Angle { num, denom })
    }

    /// The numerator `n` of `n·π / 2^d`.
    pub fn num(self) -> u8 {
        self.num
    }

    /// The denominator exponent `d` of `n·π / 2^d`.
    pub fn denom(self) -> u8 {
        self.denom
    }

    /// The angle in radians, in `[0, 2π)`.
    pub fn to_radians(self) -> f64 {
        self.num as f64 * PI / f64::from(1u32 << self.denom)
    }

    /// Reduces to lowest terms: numerator odd, or zero with exponent zero.
    ///
    /// Idempotent; reducing an already-reduced angle returns it unchanged.
    pub fn reduce(self) -> Angle {
        let mut num = self.num;
        let mut denom = self.denom;
        while num != 0 && num % 2 == 0 {
            num /= 2;
            denom -= 1;
        }
        if num == 0 {
            denom = 0;
        }
        Angle { num, denom }
    }

    /// Converts an angle in radians to the nearest rational-π form, reduced.
    ///
    /// Searches exponents `0..=MAX_DENOM` for the smallest one whose nearest
    /// numerator reproduces the input within `1e-6` radians; angles with no
    /// such representation are rejected rather than silently rounded.
    pub fn from_radians(radians: f64) -> Result<Angle, NetQasmError> {
        if !radians.is_finite() {
            return Err(NetQasmError::UnsupportedOperation {
                message: format!("rotation angle {radians} is not finite"),
            });
        }
        let normalized = radians.rem_euclid(2.0 * PI);
        for denom in 0..=MAX_DENOM {
            let steps = normalized * f64::from(1u32 << denom) / PI;
            let num = steps.round();
            if (steps - num).abs() * PI / f64::from(1u32 << denom) <= FLOAT_TOLERANCE {
                let full_turn = f64::from(1u32 << (denom + 1));
                let num = if num >= full_turn { 0 } else { num as u8 };
                return Ok(Angle::new(num, denom)?.reduce());
            }
        }
        Err(NetQasmError::UnsupportedOperation {
            message: format!(
                "rotation angle {radians} rad has no n*pi/2^d representation with d <= {MAX_DENOM}"
            ),
        })
    }

    /// Re-expresses this angle with the exact denominator exponent `denom`,
    /// as required by flavours with a fixed hardware exponent.
    ///
    /// Exact when `denom` is at least the stored exponent. When the target
    /// exponent is smaller the numerator is rounded half-to-even, trading
    /// precision for hardware compatibility; the result is deterministic for
    /// identical inputs. The returned angle is *not* reduced: its exponent
    /// is exactly `denom`.
    pub fn with_denominator(self, denom: u8) -> Result<Angle, NetQasmError> {
        if denom > MAX_DENOM {
            return Err(NetQasmError::Encoding {
                message: format!("angle denominator exponent {denom} exceeds maximum {MAX_DENOM}"),
            });
        }
        let full_turn = 1u16 << (denom + 1);
        if denom >= self.denom {
            let num = (self.num as u16) << (denom - self.denom);
            return Ok(Angle {
                num: (num % full_turn) as u8,
                denom,
            });
        }
        // Lossy path: round half to even in units of pi/2^denom.
        let shift = self.denom - denom;
        let step = 1u16 << shift;
        let num = self.num as u16;
        let quotient = num / step;
        let remainder = num % step;
        let half = step / 2;
        let rounded = if remainder > half || (remainder == half && quotient % 2 == 1) {
            quotient + 1
        } else {
            quotient
        };
        Ok(Angle {
            num: (rounded % full_turn) as u8,
            denom,
        })
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.num, self.denom)
    }
}
