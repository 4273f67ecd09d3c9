//! Instruction word decoding.
//!
//! ```text
//!  f      j    a    x    h i u
//!  6 bits 4    4    4    1 1 16
//! ```
//!
//! In extended mode the low 16 bits are a 4-bit base register
//! selector `b` over a 12-bit displacement `d`.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use base::prelude::*;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct InstructionWord(Word36);

impl InstructionWord {
    #[must_use]
    pub const fn from_word(w: Word36) -> InstructionWord {
        InstructionWord(w)
    }

    /// Assembles a basic-mode instruction.
    #[must_use]
    pub const fn new(f: u64, j: u64, a: u64, x: u64, h: u64, i: u64, u: u64) -> InstructionWord {
        InstructionWord(Word36::masked(
            ((f & 0o77) << 30)
                | ((j & 0o17) << 26)
                | ((a & 0o17) << 22)
                | ((x & 0o17) << 18)
                | ((h & 1) << 17)
                | ((i & 1) << 16)
                | (u & 0o177777),
        ))
    }

    /// Assembles an extended-mode instruction.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub const fn new_extended(
        f: u64,
        j: u64,
        a: u64,
        x: u64,
        h: u64,
        i: u64,
        b: u64,
        d: u64,
    ) -> InstructionWord {
        InstructionWord::new(f, j, a, x, h, i, ((b & 0o17) << 12) | (d & 0o7777))
    }

    #[must_use]
    pub const fn word(self) -> Word36 {
        self.0
    }

    pub const fn f(self) -> u64 {
        self.0.bits() >> 30
    }

    pub const fn j(self) -> u64 {
        (self.0.bits() >> 26) & 0o17
    }

    pub const fn a(self) -> u64 {
        (self.0.bits() >> 22) & 0o17
    }

    pub const fn x(self) -> u64 {
        (self.0.bits() >> 18) & 0o17
    }

    pub const fn h(self) -> bool {
        self.0.bits() & 0o400000 != 0
    }

    pub const fn i(self) -> bool {
        self.0.bits() & 0o200000 != 0
    }

    pub const fn u(self) -> u64 {
        self.0.bits() & 0o177777
    }

    /// H, I and U together.
    pub const fn hiu(self) -> u64 {
        self.0.bits() & 0o777777
    }

    pub const fn b(self) -> u64 {
        (self.0.bits() >> 12) & 0o17
    }

    pub const fn d(self) -> u64 {
        self.0.bits() & 0o7777
    }

    /// Replaces X, H, I and U, as an indirect reference does.
    #[must_use]
    pub const fn with_xhiu(self, value: u64) -> InstructionWord {
        InstructionWord(Word36::masked(
            (self.0.bits() & !0o17777777) | (value & 0o17777777),
        ))
    }
}

impl Display for InstructionWord {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "f={:02o} j={:02o} a={:02o} x={:02o} h={} i={} u={:06o}",
            self.f(),
            self.j(),
            self.a(),
            self.x(),
            u8::from(self.h()),
            u8::from(self.i()),
            self.u()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields() {
        let iw = InstructionWord::new(0o10, 0o16, 3, 5, 1, 0, 0o123);
        assert_eq!(iw.word().bits(), 0o107065_400123);
        assert_eq!((iw.f(), iw.j(), iw.a(), iw.x()), (0o10, 0o16, 3, 5));
        assert!(iw.h());
        assert!(!iw.i());
        assert_eq!(iw.u(), 0o123);
        assert_eq!(iw.hiu(), 0o400123);
    }

    #[test]
    fn test_extended_fields() {
        let iw = InstructionWord::new_extended(0o74, 0o4, 0, 0, 0, 1, 2, 0o1000);
        assert_eq!(iw.b(), 2);
        assert_eq!(iw.d(), 0o1000);
        assert!(iw.i());
    }

    #[test]
    fn test_with_xhiu() {
        let iw = InstructionWord::new(0o10, 0, 3, 5, 1, 1, 0o123);
        let replaced = iw.with_xhiu(0o02_000777);
        assert_eq!(replaced.x(), 0o2);
        assert!(!replaced.h());
        assert_eq!(replaced.u(), 0o777);
        assert_eq!(replaced.a(), 3);
    }
}
