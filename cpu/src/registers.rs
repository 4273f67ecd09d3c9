//! The general register set.
//!
//! There are 128 register slots.  Programs see either the user set
//! (X, A and R registers starting at [`X0`], [`A0`] and [`R0`]) or,
//! when DB17 is set, the executive set starting at [`EX0`], [`EA0`]
//! and [`ER0`].  User A0..A3 overlap user X12..X15.
use std::ops::{Index, IndexMut};

use serde::Serialize;

use base::prelude::*;
use base::word36::sign_extend;
use base::onescomplement;

pub const GRS_SIZE: usize = 0o200;

pub const X0: usize = 0;
pub const A0: usize = 0o14;
pub const R0: usize = 0o100;
pub const ER0: usize = 0o120;
pub const EX0: usize = 0o140;
pub const EA0: usize = 0o154;

/// Which register set an instruction's a and x fields refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RegisterSet {
    User,
    Exec,
}

impl RegisterSet {
    #[must_use]
    pub const fn x(self, n: usize) -> usize {
        match self {
            RegisterSet::User => X0 + n,
            RegisterSet::Exec => EX0 + n,
        }
    }

    #[must_use]
    pub const fn a(self, n: usize) -> usize {
        match self {
            RegisterSet::User => A0 + n,
            RegisterSet::Exec => EA0 + n,
        }
    }

    #[must_use]
    pub const fn r(self, n: usize) -> usize {
        match self {
            RegisterSet::User => R0 + n,
            RegisterSet::Exec => ER0 + n,
        }
    }
}

/// Whether a program running at processor privilege `pp` may touch
/// GRS slot `index`.
#[must_use]
pub const fn is_access_allowed(index: usize, pp: u64, write: bool) -> bool {
    if index < 0o40 {
        true
    } else if index < 0o100 {
        false
    } else if index < 0o120 {
        true
    } else if write {
        pp == 0
    } else {
        pp <= 2
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralRegisterSet {
    registers: [Word36; GRS_SIZE],
}

impl Default for GeneralRegisterSet {
    fn default() -> GeneralRegisterSet {
        GeneralRegisterSet {
            registers: [Word36::ZERO; GRS_SIZE],
        }
    }
}

impl GeneralRegisterSet {
    #[must_use]
    pub fn new() -> GeneralRegisterSet {
        GeneralRegisterSet::default()
    }

    pub fn clear(&mut self) {
        self.registers = [Word36::ZERO; GRS_SIZE];
    }

    pub fn as_slice(&self) -> &[Word36] {
        &self.registers
    }

    /// Names a slot for dumps: X, A, R, EX, EA, ER plus a number, or
    /// its octal index for the unnamed slots.
    #[must_use]
    pub fn name(index: usize) -> String {
        match index {
            0..=0o13 => format!("X{}", index),
            0o14..=0o33 => format!("A{}", index - A0),
            0o100..=0o117 => format!("R{}", index - R0),
            0o120..=0o137 => format!("ER{}", index - ER0),
            0o140..=0o153 => format!("EX{}", index - EX0),
            0o154..=0o173 => format!("EA{}", index - EA0),
            _ => format!("{:03o}", index),
        }
    }

    pub fn dump(&self) -> Vec<String> {
        self.registers
            .chunks(8)
            .enumerate()
            .map(|(row, words)| {
                let text: Vec<String> = words.iter().map(|w| format!("{w}")).collect();
                format!("GRS {:03o}: {}", row * 8, text.join(" "))
            })
            .collect()
    }
}

impl Index<usize> for GeneralRegisterSet {
    type Output = Word36;

    fn index(&self, index: usize) -> &Word36 {
        &self.registers[index % GRS_SIZE]
    }
}

impl IndexMut<usize> for GeneralRegisterSet {
    fn index_mut(&mut self, index: usize) -> &mut Word36 {
        &mut self.registers[index % GRS_SIZE]
    }
}

/// Views a word as an index register.  The normal form is an 18-bit
/// increment (XI) over an 18-bit modifier (XM); the 24-bit form used
/// by exec 24-bit indexing has a 12-bit increment (XI12) over a
/// 24-bit modifier (XM24).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct IndexRegister(pub Word36);

impl IndexRegister {
    #[must_use]
    pub const fn xi(self) -> u64 {
        self.0.bits() >> 18
    }

    #[must_use]
    pub const fn xm(self) -> u64 {
        self.0.bits() & 0o777777
    }

    #[must_use]
    pub const fn xi12(self) -> u64 {
        self.0.bits() >> 24
    }

    #[must_use]
    pub const fn xm24(self) -> u64 {
        self.0.bits() & 0o77777777
    }

    /// The modifier, sign extended to 36 bits.
    #[must_use]
    pub const fn signed_xm(self) -> Word36 {
        Word36::masked(sign_extend(self.xm(), 18))
    }

    #[must_use]
    pub const fn signed_xm24(self) -> Word36 {
        Word36::masked(sign_extend(self.xm24(), 24))
    }

    #[must_use]
    pub const fn with_xm(self, value: u64) -> IndexRegister {
        IndexRegister(self.0.with_h2(value))
    }

    #[must_use]
    pub const fn with_xi(self, value: u64) -> IndexRegister {
        IndexRegister(self.0.with_h1(value))
    }

    #[must_use]
    pub const fn with_xm24(self, value: u64) -> IndexRegister {
        IndexRegister(Word36::masked(
            (self.0.bits() & !0o77777777) | (value & 0o77777777),
        ))
    }

    #[must_use]
    pub const fn with_xi12(self, value: u64) -> IndexRegister {
        IndexRegister(Word36::masked(
            (self.0.bits() & 0o77777777) | ((value & 0o7777) << 24),
        ))
    }

    fn add_to_field(field: u64, delta: Word36, width: u32) -> u64 {
        let mask = (1_u64 << width) - 1;
        let sum = onescomplement::add(Word36::masked(sign_extend(field, width)), delta);
        sum.value.bits() & mask
    }

    /// Adds the signed increment to the modifier.
    #[must_use]
    pub fn increment_modifier(self) -> IndexRegister {
        let delta = Word36::masked(sign_extend(self.xi(), 18));
        self.with_xm(Self::add_to_field(self.xm(), delta, 18))
    }

    #[must_use]
    pub fn increment_modifier24(self) -> IndexRegister {
        let delta = Word36::masked(sign_extend(self.xi12(), 12));
        self.with_xm24(Self::add_to_field(self.xm24(), delta, 24))
    }

    /// Subtracts the signed increment from the modifier.
    #[must_use]
    pub fn decrement_modifier(self) -> IndexRegister {
        let delta = Word36::masked(sign_extend(self.xi(), 18)).negate();
        self.with_xm(Self::add_to_field(self.xm(), delta, 18))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_sets() {
        assert_eq!(RegisterSet::User.a(2), 0o16);
        assert_eq!(RegisterSet::Exec.a(2), 0o156);
        assert_eq!(RegisterSet::User.x(12), RegisterSet::User.a(0));
        assert_eq!(RegisterSet::Exec.r(1), 0o121);
    }

    #[test]
    fn test_access_policy() {
        assert!(is_access_allowed(0o37, 3, true));
        assert!(!is_access_allowed(0o40, 0, false));
        assert!(!is_access_allowed(0o77, 0, true));
        assert!(is_access_allowed(0o100, 3, true));
        assert!(is_access_allowed(0o120, 2, false));
        assert!(!is_access_allowed(0o120, 3, false));
        assert!(!is_access_allowed(0o120, 1, true));
        assert!(is_access_allowed(0o177, 0, true));
    }

    #[test]
    fn test_names() {
        assert_eq!(GeneralRegisterSet::name(5), "X5");
        assert_eq!(GeneralRegisterSet::name(0o16), "A2");
        assert_eq!(GeneralRegisterSet::name(0o101), "R1");
        assert_eq!(GeneralRegisterSet::name(0o156), "EA2");
        assert_eq!(GeneralRegisterSet::name(0o50), "050");
    }

    #[test]
    fn test_increment_modifier() {
        let x = IndexRegister(Word36::from_halves(2, 0o1000));
        assert_eq!(x.increment_modifier().xm(), 0o1002);
        assert_eq!(x.decrement_modifier().xm(), 0o776);
        assert_eq!(x.increment_modifier().xi(), 2);
    }

    #[test]
    fn test_negative_increment() {
        // XI = -1 in 18-bit ones complement.
        let x = IndexRegister(Word36::from_halves(0o777776, 5));
        assert_eq!(x.increment_modifier().xm(), 4);
    }

    #[test]
    fn test_increment_modifier24() {
        let x = IndexRegister(Word36::masked((3 << 24) | 0o7777777));
        let y = x.increment_modifier24();
        assert_eq!(y.xm24(), 0o10000002);
        assert_eq!(y.xi12(), 3);
    }
}
