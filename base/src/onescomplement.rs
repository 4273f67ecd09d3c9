//! Ones-complement arithmetic on [`Word36`] values and on 72-bit
//! double words.
//!
//! The adder is subtractive: the only way to produce negative zero
//! is to add negative zero to negative zero.  Overflowing sums wrap
//! modulo 2^36 - 1, as an end-around-carry adder would.
use std::cmp::Ordering;

use serde::Serialize;

use super::error::DivideCheck;
use super::word36::Word36;

#[cfg(test)]
mod tests;

/// Largest magnitude representable in one word.
const MAX_MAGNITUDE: i64 = (1 << 35) - 1;
const MAX_DOUBLE_MAGNITUDE: i128 = (1 << 71) - 1;
const DOUBLE_MASK: u128 = (1 << 72) - 1;

/// Result of an addition, with the carry and overflow designator
/// values the hardware derives from the operand and result signs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Sum<T> {
    pub value: T,
    pub carry: bool,
    pub overflow: bool,
}

/// Computes DB18 (carry) and DB19 (overflow) from the signs of the
/// two addends and of their sum.
///
/// | addend1 | addend2 | sum | carry | overflow |
/// |---|---|---|---|---|
/// | + | + | + | 0 | 0 |
/// | + | + | - | 0 | 1 |
/// | + | - | + | 1 | 0 |
/// | + | - | - | 0 | 0 |
/// | - | - | + | 1 | 1 |
/// | - | - | - | 1 | 0 |
#[must_use]
pub fn carry_and_overflow(
    addend1_negative: bool,
    addend2_negative: bool,
    sum_negative: bool,
) -> (bool, bool) {
    let carry = (addend1_negative && addend2_negative)
        || (addend1_negative != addend2_negative && !sum_negative);
    let overflow = addend1_negative == addend2_negative && addend1_negative != sum_negative;
    (carry, overflow)
}

/// Interprets the word as a ones-complement integer.  Both zeros map to 0.
#[must_use]
pub fn to_i64(w: Word36) -> i64 {
    if w.is_negative() {
        -(w.negate().bits() as i64)
    } else {
        w.bits() as i64
    }
}

/// Converts a native integer to ones-complement form, wrapping values
/// outside the representable range modulo 2^36 - 1.
#[must_use]
pub fn from_i64(value: i64) -> Word36 {
    if value >= 0 {
        Word36::masked(value as u64)
    } else {
        let magnitude = value.unsigned_abs();
        if magnitude <= MAX_MAGNITUDE as u64 {
            Word36::masked(magnitude).negate()
        } else {
            Word36::masked((value + Word36::MASK as i64) as u64)
        }
    }
}

/// Ones-complement addition.
#[must_use]
pub fn add(a: Word36, b: Word36) -> Sum<Word36> {
    let value = if a.is_negative_zero() && b.is_negative_zero() {
        Word36::NEGATIVE_ZERO
    } else {
        from_i64(to_i64(a) + to_i64(b))
    };
    let (carry, overflow) = carry_and_overflow(a.is_negative(), b.is_negative(), value.is_negative());
    Sum {
        value,
        carry,
        overflow,
    }
}

/// Adds two fields of `width` bits independently of any neighbouring
/// fields, discarding carry and overflow.
fn add_field(a: u64, b: u64, width: u32) -> u64 {
    let mask: u64 = (1 << width) - 1;
    let sign: u64 = 1 << (width - 1);
    let native = |v: u64| -> i64 {
        if v & sign != 0 {
            -(((v ^ mask) & mask) as i64)
        } else {
            v as i64
        }
    };
    if a == mask && b == mask {
        return mask;
    }
    let total = native(a & mask) + native(b & mask);
    let modulus = mask as i64;
    let wrapped = if total > (sign as i64) - 1 {
        total - modulus
    } else if total < -((sign as i64) - 1) {
        total + modulus
    } else {
        total
    };
    if wrapped < 0 {
        (wrapped.unsigned_abs() ^ mask) & mask
    } else {
        wrapped as u64
    }
}

/// Adds the H1 and H2 halves of the two words independently.
#[must_use]
pub fn add_halves(a: Word36, b: Word36) -> Word36 {
    Word36::from_halves(add_field(a.h1(), b.h1(), 18), add_field(a.h2(), b.h2(), 18))
}

/// Adds the T1, T2 and T3 thirds of the two words independently.
#[must_use]
pub fn add_thirds(a: Word36, b: Word36) -> Word36 {
    Word36::ZERO
        .with_t1(add_field(a.t1(), b.t1(), 12))
        .with_t2(add_field(a.t2(), b.t2(), 12))
        .with_t3(add_field(a.t3(), b.t3(), 12))
}

/// Orders two words numerically, with positive zero above negative zero.
#[must_use]
pub fn compare(a: Word36, b: Word36) -> Ordering {
    match (a.is_negative(), b.is_negative()) {
        (false, true) => Ordering::Greater,
        (true, false) => Ordering::Less,
        _ => a.bits().cmp(&b.bits()),
    }
}

/// A 72-bit value held in two consecutive words.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct DoubleWord {
    pub high: Word36,
    pub low: Word36,
}

impl DoubleWord {
    pub const ZERO: DoubleWord = DoubleWord {
        high: Word36::ZERO,
        low: Word36::ZERO,
    };

    #[must_use]
    pub const fn new(high: Word36, low: Word36) -> DoubleWord {
        DoubleWord { high, low }
    }

    fn bits(self) -> u128 {
        (u128::from(self.high.bits()) << 36) | u128::from(self.low.bits())
    }

    fn from_bits(bits: u128) -> DoubleWord {
        let bits = bits & DOUBLE_MASK;
        DoubleWord {
            high: Word36::masked((bits >> 36) as u64),
            low: Word36::masked(bits as u64),
        }
    }

    pub const fn is_negative(self) -> bool {
        self.high.is_negative()
    }

    pub fn is_positive_zero(self) -> bool {
        self.high.is_positive_zero() && self.low.is_positive_zero()
    }

    pub fn is_negative_zero(self) -> bool {
        self.high.is_negative_zero() && self.low.is_negative_zero()
    }

    pub fn is_zero(self) -> bool {
        self.is_positive_zero() || self.is_negative_zero()
    }

    #[must_use]
    pub fn negate(self) -> DoubleWord {
        DoubleWord {
            high: self.high.negate(),
            low: self.low.negate(),
        }
    }

    #[must_use]
    pub fn magnitude(self) -> DoubleWord {
        if self.is_negative() {
            self.negate()
        } else {
            self
        }
    }

    #[must_use]
    pub fn to_i128(self) -> i128 {
        if self.is_negative() {
            -(self.negate().bits() as i128)
        } else {
            self.bits() as i128
        }
    }

    #[must_use]
    pub fn from_i128(value: i128) -> DoubleWord {
        if value >= 0 {
            DoubleWord::from_bits(value as u128)
        } else {
            let magnitude = value.unsigned_abs();
            if magnitude <= MAX_DOUBLE_MAGNITUDE as u128 {
                DoubleWord::from_bits(magnitude).negate()
            } else {
                DoubleWord::from_bits((value + DOUBLE_MASK as i128) as u128)
            }
        }
    }

    /// 72-bit ones-complement addition.
    #[must_use]
    pub fn add(self, other: DoubleWord) -> Sum<DoubleWord> {
        let value = if self.is_negative_zero() && other.is_negative_zero() {
            self
        } else {
            DoubleWord::from_i128(self.to_i128() + other.to_i128())
        };
        let (carry, overflow) =
            carry_and_overflow(self.is_negative(), other.is_negative(), value.is_negative());
        Sum {
            value,
            carry,
            overflow,
        }
    }

    /// Shifts the 72-bit value right, replicating the sign bit.
    #[must_use]
    pub fn shift_right_algebraic(self, count: u32) -> DoubleWord {
        if count == 0 {
            return self;
        }
        if count >= 71 {
            return if self.is_negative() {
                DoubleWord::from_bits(DOUBLE_MASK)
            } else {
                DoubleWord::ZERO
            };
        }
        let shifted = self.bits() >> count;
        if self.is_negative() {
            let fill = DOUBLE_MASK & !(DOUBLE_MASK >> count);
            DoubleWord::from_bits(shifted | fill)
        } else {
            DoubleWord::from_bits(shifted)
        }
    }

    #[must_use]
    pub fn shift_right_logical(self, count: u32) -> DoubleWord {
        if count >= 72 {
            DoubleWord::ZERO
        } else {
            DoubleWord::from_bits(self.bits() >> count)
        }
    }

    #[must_use]
    pub fn shift_left_logical(self, count: u32) -> DoubleWord {
        if count >= 72 {
            DoubleWord::ZERO
        } else {
            DoubleWord::from_bits(self.bits() << count)
        }
    }

    #[must_use]
    pub fn rotate_left(self, count: u32) -> DoubleWord {
        let count = count % 72;
        if count == 0 {
            self
        } else {
            let bits = self.bits();
            DoubleWord::from_bits((bits << count) | (bits >> (72 - count)))
        }
    }

    #[must_use]
    pub fn rotate_right(self, count: u32) -> DoubleWord {
        self.rotate_left(72 - (count % 72))
    }
}

/// Orders two double words numerically, with positive zero above
/// negative zero.
#[must_use]
pub fn compare_double(a: DoubleWord, b: DoubleWord) -> Ordering {
    match (a.is_negative(), b.is_negative()) {
        (false, true) => Ordering::Greater,
        (true, false) => Ordering::Less,
        _ => a.bits().cmp(&b.bits()),
    }
}

/// Forms the 72-bit product of two words.
#[must_use]
pub fn multiply(a: Word36, b: Word36) -> DoubleWord {
    let product = i128::from(to_i64(a)) * i128::from(to_i64(b));
    DoubleWord::from_i128(product)
}

/// Divides a 72-bit dividend by a word, returning quotient and
/// remainder.  The remainder takes the sign of the dividend.
pub fn divide(dividend: DoubleWord, divisor: Word36) -> Result<(Word36, Word36), DivideCheck> {
    if divisor.is_zero() {
        return Err(DivideCheck::DivideByZero);
    }
    let numerator = dividend.to_i128();
    let denominator = i128::from(to_i64(divisor));
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if quotient.abs() > i128::from(MAX_MAGNITUDE) {
        return Err(DivideCheck::QuotientOverflow);
    }
    let as_word = |v: i128| -> Word36 {
        // Both values are within one word's range at this point.
        from_i64(v as i64)
    };
    let mut remainder_word = as_word(remainder);
    if remainder == 0 && dividend.is_negative() {
        remainder_word = Word36::NEGATIVE_ZERO;
    }
    Ok((as_word(quotient), remainder_word))
}
