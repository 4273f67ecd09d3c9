//! The 36-bit machine word and its partial-word fields.
//!
//! Bits are numbered here as the hardware documentation numbers
//! them: bit 0 is the most significant (sign) bit and bit 35 the
//! least significant.  Field names follow the same convention:
//!
//! | Field | Bits | Width |
//! | ----- | ---- | ----- |
//! | H1, H2 | 0-17, 18-35 | 18 |
//! | Q1..Q4 | 0-8, 9-17, 18-26, 27-35 | 9 |
//! | S1..S6 | 0-5, ..., 30-35 | 6 |
//! | T1..T3 | 0-11, 12-23, 24-35 | 12 |
//!
//! XH1, XH2 and XT1..XT3 are the sign-extended forms of the
//! corresponding fields.
use std::fmt::{self, Debug, Display, Formatter, Octal};

use serde::{Deserialize, Serialize};

use super::error::ConversionFailed;

#[cfg(test)]
mod tests;

/// A 36-bit word.  The value is always held masked to 36 bits.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Word36 {
    bits: u64,
}

impl Word36 {
    pub const MASK: u64 = 0o777_777_777_777;
    pub const SIGN_BIT: u64 = 0o400_000_000_000;

    pub const ZERO: Word36 = Word36 { bits: 0 };
    pub const NEGATIVE_ZERO: Word36 = Word36 { bits: Self::MASK };
    pub const ONE: Word36 = Word36 { bits: 1 };
    pub const NEGATIVE_ONE: Word36 = Word36 {
        bits: Self::MASK ^ 1,
    };

    // Fails at compile time for out-of-range values; used by w36!().
    pub const fn new<const N: u64>() -> Word36 {
        struct Helper<const M: u64>;
        impl<const M: u64> Helper<M> {
            const W: Word36 = {
                if M > Word36::MASK {
                    panic!("input value is out of range")
                } else {
                    Word36 { bits: M }
                }
            };
        }
        Helper::<N>::W
    }

    /// Builds a word from the low 36 bits of `value`, discarding the rest.
    #[must_use]
    pub const fn masked(value: u64) -> Word36 {
        Word36 {
            bits: value & Self::MASK,
        }
    }

    #[must_use]
    pub const fn bits(self) -> u64 {
        self.bits
    }

    pub const fn h1(self) -> u64 {
        self.bits >> 18
    }

    pub const fn h2(self) -> u64 {
        self.bits & 0o777_777
    }

    pub const fn xh1(self) -> u64 {
        sign_extend(self.h1(), 18)
    }

    pub const fn xh2(self) -> u64 {
        sign_extend(self.h2(), 18)
    }

    pub const fn q1(self) -> u64 {
        self.bits >> 27
    }

    pub const fn q2(self) -> u64 {
        (self.bits >> 18) & 0o777
    }

    pub const fn q3(self) -> u64 {
        (self.bits >> 9) & 0o777
    }

    pub const fn q4(self) -> u64 {
        self.bits & 0o777
    }

    pub const fn s1(self) -> u64 {
        self.bits >> 30
    }

    pub const fn s2(self) -> u64 {
        (self.bits >> 24) & 0o77
    }

    pub const fn s3(self) -> u64 {
        (self.bits >> 18) & 0o77
    }

    pub const fn s4(self) -> u64 {
        (self.bits >> 12) & 0o77
    }

    pub const fn s5(self) -> u64 {
        (self.bits >> 6) & 0o77
    }

    pub const fn s6(self) -> u64 {
        self.bits & 0o77
    }

    pub const fn t1(self) -> u64 {
        self.bits >> 24
    }

    pub const fn t2(self) -> u64 {
        (self.bits >> 12) & 0o7777
    }

    pub const fn t3(self) -> u64 {
        self.bits & 0o7777
    }

    pub const fn xt1(self) -> u64 {
        sign_extend(self.t1(), 12)
    }

    pub const fn xt2(self) -> u64 {
        sign_extend(self.t2(), 12)
    }

    pub const fn xt3(self) -> u64 {
        sign_extend(self.t3(), 12)
    }

    #[must_use]
    pub const fn with_h1(self, value: u64) -> Word36 {
        self.with_field(18, 18, value)
    }

    #[must_use]
    pub const fn with_h2(self, value: u64) -> Word36 {
        self.with_field(0, 18, value)
    }

    #[must_use]
    pub const fn with_q1(self, value: u64) -> Word36 {
        self.with_field(27, 9, value)
    }

    #[must_use]
    pub const fn with_q2(self, value: u64) -> Word36 {
        self.with_field(18, 9, value)
    }

    #[must_use]
    pub const fn with_q3(self, value: u64) -> Word36 {
        self.with_field(9, 9, value)
    }

    #[must_use]
    pub const fn with_q4(self, value: u64) -> Word36 {
        self.with_field(0, 9, value)
    }

    #[must_use]
    pub const fn with_s1(self, value: u64) -> Word36 {
        self.with_field(30, 6, value)
    }

    #[must_use]
    pub const fn with_s2(self, value: u64) -> Word36 {
        self.with_field(24, 6, value)
    }

    #[must_use]
    pub const fn with_s3(self, value: u64) -> Word36 {
        self.with_field(18, 6, value)
    }

    #[must_use]
    pub const fn with_s4(self, value: u64) -> Word36 {
        self.with_field(12, 6, value)
    }

    #[must_use]
    pub const fn with_s5(self, value: u64) -> Word36 {
        self.with_field(6, 6, value)
    }

    #[must_use]
    pub const fn with_s6(self, value: u64) -> Word36 {
        self.with_field(0, 6, value)
    }

    #[must_use]
    pub const fn with_t1(self, value: u64) -> Word36 {
        self.with_field(24, 12, value)
    }

    #[must_use]
    pub const fn with_t2(self, value: u64) -> Word36 {
        self.with_field(12, 12, value)
    }

    #[must_use]
    pub const fn with_t3(self, value: u64) -> Word36 {
        self.with_field(0, 12, value)
    }

    const fn with_field(self, shift: u32, width: u32, value: u64) -> Word36 {
        let mask: u64 = ((1 << width) - 1) << shift;
        Word36 {
            bits: (self.bits & !mask) | ((value << shift) & mask),
        }
    }

    /// Joins two 18-bit halves.
    #[must_use]
    pub const fn from_halves(h1: u64, h2: u64) -> Word36 {
        Word36::ZERO.with_h1(h1).with_h2(h2)
    }

    pub const fn is_negative(self) -> bool {
        self.bits & Self::SIGN_BIT != 0
    }

    pub const fn is_positive(self) -> bool {
        !self.is_negative()
    }

    /// True for both positive and negative zero.
    pub const fn is_zero(self) -> bool {
        self.bits == 0 || self.bits == Self::MASK
    }

    pub const fn is_positive_zero(self) -> bool {
        self.bits == 0
    }

    pub const fn is_negative_zero(self) -> bool {
        self.bits == Self::MASK
    }

    /// Ones-complement negation.
    #[must_use]
    pub const fn negate(self) -> Word36 {
        Word36 {
            bits: self.bits ^ Self::MASK,
        }
    }

    #[must_use]
    pub const fn magnitude(self) -> Word36 {
        if self.is_negative() {
            self.negate()
        } else {
            self
        }
    }

    /// Number of one bits in the word.
    pub const fn count_ones(self) -> u32 {
        self.bits.count_ones()
    }

    #[must_use]
    pub const fn rotate_left(self, count: u32) -> Word36 {
        let count = count % 36;
        if count == 0 {
            self
        } else {
            Word36::masked((self.bits << count) | (self.bits >> (36 - count)))
        }
    }

    #[must_use]
    pub const fn rotate_right(self, count: u32) -> Word36 {
        self.rotate_left(36 - (count % 36))
    }

    #[must_use]
    pub const fn shift_left_logical(self, count: u32) -> Word36 {
        if count >= 36 {
            Word36::ZERO
        } else {
            Word36::masked(self.bits << count)
        }
    }

    #[must_use]
    pub const fn shift_right_logical(self, count: u32) -> Word36 {
        if count >= 36 {
            Word36::ZERO
        } else {
            Word36 {
                bits: self.bits >> count,
            }
        }
    }

    /// Shifts right, replicating the sign bit into the vacated positions.
    #[must_use]
    pub const fn shift_right_algebraic(self, count: u32) -> Word36 {
        if !self.is_negative() {
            self.shift_right_logical(count)
        } else if count >= 35 {
            Word36::NEGATIVE_ZERO
        } else {
            let fill = Self::MASK & !(Self::MASK >> count);
            Word36 {
                bits: (self.bits >> count) | fill,
            }
        }
    }
}

/// Sign-extends the low `width` bits of `value` to 36 bits.
#[must_use]
pub const fn sign_extend(value: u64, width: u32) -> u64 {
    let field_mask: u64 = (1 << width) - 1;
    let value = value & field_mask;
    if value & (1 << (width - 1)) != 0 {
        (value | !field_mask) & Word36::MASK
    } else {
        value
    }
}

impl TryFrom<u64> for Word36 {
    type Error = ConversionFailed;
    fn try_from(value: u64) -> Result<Word36, ConversionFailed> {
        if value > Word36::MASK {
            Err(ConversionFailed::TooLarge)
        } else {
            Ok(Word36 { bits: value })
        }
    }
}

impl From<u32> for Word36 {
    fn from(value: u32) -> Word36 {
        Word36 {
            bits: u64::from(value),
        }
    }
}

impl From<Word36> for u64 {
    fn from(w: Word36) -> u64 {
        w.bits
    }
}

impl Debug for Word36 {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:012o}", self.bits)
    }
}

impl Display for Word36 {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:012o}", self.bits)
    }
}

impl Octal for Word36 {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        Octal::fmt(&self.bits, f)
    }
}

impl std::ops::BitAnd for Word36 {
    type Output = Word36;
    fn bitand(self, rhs: Word36) -> Word36 {
        Word36 {
            bits: self.bits & rhs.bits,
        }
    }
}

impl std::ops::BitOr for Word36 {
    type Output = Word36;
    fn bitor(self, rhs: Word36) -> Word36 {
        Word36 {
            bits: self.bits | rhs.bits,
        }
    }
}

impl std::ops::BitXor for Word36 {
    type Output = Word36;
    fn bitxor(self, rhs: Word36) -> Word36 {
        Word36 {
            bits: self.bits ^ rhs.bits,
        }
    }
}

impl std::ops::Not for Word36 {
    type Output = Word36;
    fn not(self) -> Word36 {
        self.negate()
    }
}

/// The partial-word selections a j-field can make.  Several j values
/// are dual-purpose and select either a quarter word or an extended
/// field depending on the quarter-word mode designator (DB32).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PartialWord {
    W,
    H2,
    H1,
    XH2,
    XH1,
    Q1,
    Q2,
    Q3,
    Q4,
    T1,
    T2,
    T3,
    XT1,
    XT2,
    XT3,
    S1,
    S2,
    S3,
    S4,
    S5,
    S6,
}

/// j-field values.
pub mod jfield {
    pub const W: u64 = 0;
    pub const H2: u64 = 1;
    pub const H1: u64 = 2;
    pub const XH2: u64 = 3;
    pub const XH1_Q2: u64 = 4;
    pub const T3_Q4: u64 = 5;
    pub const T2_Q3: u64 = 6;
    pub const T1_Q1: u64 = 7;
    pub const S6: u64 = 8;
    pub const S5: u64 = 9;
    pub const S4: u64 = 10;
    pub const S3: u64 = 11;
    pub const S2: u64 = 12;
    pub const S1: u64 = 13;
    pub const U: u64 = 0o16;
    pub const XU: u64 = 0o17;
}

impl PartialWord {
    /// Decodes a j-field.  Returns `None` for U and XU, which are
    /// immediate forms rather than partial-word selections.
    pub fn from_j(j: u64, quarter_word_mode: bool) -> Option<PartialWord> {
        use PartialWord::*;
        let qw = quarter_word_mode;
        match j {
            jfield::W => Some(W),
            jfield::H2 => Some(H2),
            jfield::H1 => Some(H1),
            jfield::XH2 => Some(XH2),
            jfield::XH1_Q2 => Some(if qw { Q2 } else { XH1 }),
            jfield::T3_Q4 => Some(if qw { Q4 } else { XT3 }),
            jfield::T2_Q3 => Some(if qw { Q3 } else { XT2 }),
            jfield::T1_Q1 => Some(if qw { Q1 } else { XT1 }),
            jfield::S6 => Some(S6),
            jfield::S5 => Some(S5),
            jfield::S4 => Some(S4),
            jfield::S3 => Some(S3),
            jfield::S2 => Some(S2),
            jfield::S1 => Some(S1),
            _ => None,
        }
    }

    /// Extracts this field from `word`, right-justified (and sign
    /// extended for the X forms).
    pub fn extract(self, word: Word36) -> Word36 {
        use PartialWord::*;
        Word36::masked(match self {
            W => word.bits(),
            H1 => word.h1(),
            H2 => word.h2(),
            XH1 => word.xh1(),
            XH2 => word.xh2(),
            Q1 => word.q1(),
            Q2 => word.q2(),
            Q3 => word.q3(),
            Q4 => word.q4(),
            T1 => word.t1(),
            T2 => word.t2(),
            T3 => word.t3(),
            XT1 => word.xt1(),
            XT2 => word.xt2(),
            XT3 => word.xt3(),
            S1 => word.s1(),
            S2 => word.s2(),
            S3 => word.s3(),
            S4 => word.s4(),
            S5 => word.s5(),
            S6 => word.s6(),
        })
    }

    /// Replaces this field of `word` with the low-order bits of
    /// `value`, leaving every other bit of `word` alone.
    pub fn inject(self, word: Word36, value: Word36) -> Word36 {
        use PartialWord::*;
        let v = value.bits();
        match self {
            W => value,
            H1 | XH1 => word.with_h1(v),
            H2 | XH2 => word.with_h2(v),
            Q1 => word.with_q1(v),
            Q2 => word.with_q2(v),
            Q3 => word.with_q3(v),
            Q4 => word.with_q4(v),
            T1 | XT1 => word.with_t1(v),
            T2 | XT2 => word.with_t2(v),
            T3 | XT3 => word.with_t3(v),
            S1 => word.with_s1(v),
            S2 => word.with_s2(v),
            S3 => word.with_s3(v),
            S4 => word.with_s4(v),
            S5 => word.with_s5(v),
            S6 => word.with_s6(v),
        }
    }

    /// Width of the stored field in bits.
    pub fn width(self) -> u32 {
        use PartialWord::*;
        match self {
            W => 36,
            H1 | H2 | XH1 | XH2 => 18,
            Q1 | Q2 | Q3 | Q4 => 9,
            T1 | T2 | T3 | XT1 | XT2 | XT3 => 12,
            S1 | S2 | S3 | S4 | S5 | S6 => 6,
        }
    }
}

/// Extracts the partial word selected by `j` (no-op for U and XU,
/// which never reach the extraction path).
pub fn extract(word: Word36, j: u64, quarter_word_mode: bool) -> Word36 {
    match PartialWord::from_j(j, quarter_word_mode) {
        Some(pw) => pw.extract(word),
        None => word,
    }
}

/// Merges `value` into the partial word of `word` selected by `j`.
pub fn inject(word: Word36, j: u64, quarter_word_mode: bool, value: Word36) -> Word36 {
    match PartialWord::from_j(j, quarter_word_mode) {
        Some(pw) => pw.inject(word, value),
        None => value,
    }
}
