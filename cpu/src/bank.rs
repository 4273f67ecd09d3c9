//! Bank descriptors, base registers and virtual addresses.
//!
//! A bank descriptor is the eight-word in-storage description of a
//! bank.  Loading one into a base register gives the engine a window
//! onto main storage: a relative address `r` within the register's
//! limits refers to the word at `base + (r - lower)`.
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use serde::Serialize;

use base::prelude::*;

use crate::access::{effective_permissions, AccessKey, AccessLock, AccessPermissions};
use crate::interrupt::{Interrupt, ReferenceViolationKind};
use crate::memory::{AbsoluteAddress, Segment};

pub const BANK_DESCRIPTOR_WORDS: usize = 8;

const G_BIT: u64 = 0o000020000000;
const LARGE_BIT: u64 = 0o000004000000;
const U_BIT: u64 = 0o000002000000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BankType {
    ExtendedMode = 0,
    BasicMode = 1,
    Gate = 2,
    Indirect = 3,
    Queue = 4,
    Postern = 5,
    QueueRepository = 6,
    DataExpanse = 7,
}

impl BankType {
    pub const fn from_code(code: u64) -> Option<BankType> {
        match code {
            0 => Some(BankType::ExtendedMode),
            1 => Some(BankType::BasicMode),
            2 => Some(BankType::Gate),
            3 => Some(BankType::Indirect),
            4 => Some(BankType::Queue),
            5 => Some(BankType::Postern),
            6 => Some(BankType::QueueRepository),
            7 => Some(BankType::DataExpanse),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankDescriptorError {
    TooShort(usize),
    InvalidBankType(u64),
}

impl Display for BankDescriptorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            BankDescriptorError::TooShort(n) => {
                write!(f, "bank descriptor needs 8 words but only {n} were supplied")
            }
            BankDescriptorError::InvalidBankType(code) => {
                write!(f, "bank type {code:o} is not defined")
            }
        }
    }
}

impl Error for BankDescriptorError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BankDescriptor {
    pub general: AccessPermissions,
    pub special: AccessPermissions,
    pub bank_type: BankType,
    pub general_fault: bool,
    pub large: bool,
    pub upper_limit_suppression: bool,
    pub lock: AccessLock,
    /// 9-bit lower limit, before normalisation.
    pub lower_limit: u64,
    /// 27-bit upper limit, before normalisation.
    pub upper_limit: u64,
    /// Target of an indirect bank, as (level, BDI).
    pub target: (u64, u64),
    pub inactive: bool,
    pub displacement: u64,
    pub base: AbsoluteAddress,
}

impl BankDescriptor {
    /// A small extended-mode bank with the given limits.
    #[must_use]
    pub fn extended(base: AbsoluteAddress, lower_limit: u64, upper_limit: u64) -> BankDescriptor {
        BankDescriptor {
            general: AccessPermissions::ALL,
            special: AccessPermissions::ALL,
            bank_type: BankType::ExtendedMode,
            general_fault: false,
            large: false,
            upper_limit_suppression: false,
            lock: AccessLock::MASTER,
            lower_limit,
            upper_limit,
            target: (0, 0),
            inactive: false,
            displacement: 0,
            base,
        }
    }

    pub fn from_words(words: &[Word36]) -> Result<BankDescriptor, BankDescriptorError> {
        if words.len() < BANK_DESCRIPTOR_WORDS {
            return Err(BankDescriptorError::TooShort(words.len()));
        }
        let w0 = words[0].bits();
        let w1 = words[1].bits();
        let w2 = words[2].bits();
        let type_code = (w0 >> 24) & 0o17;
        let bank_type =
            BankType::from_code(type_code).ok_or(BankDescriptorError::InvalidBankType(type_code))?;
        let indirect = bank_type == BankType::Indirect;
        let (lower_limit, upper_limit, target) = if indirect {
            (0, 0, (words[1].h1() >> 15, words[1].h1() & 0o77777))
        } else {
            ((w1 >> 27) & 0o777, w1 & 0o777777777, (0, 0))
        };
        Ok(BankDescriptor {
            general: AccessPermissions::from_bits(w0 >> 33),
            special: AccessPermissions::from_bits(w0 >> 30),
            bank_type,
            general_fault: w0 & G_BIT != 0,
            large: w0 & LARGE_BIT != 0,
            upper_limit_suppression: w0 & U_BIT != 0,
            lock: AccessLock::from_composite(w0 & 0o777777),
            lower_limit,
            upper_limit,
            target,
            inactive: words[2].is_negative(),
            displacement: (w2 >> 18) & 0o77777,
            base: AbsoluteAddress::new(words[2].h2() as u32, words[3].bits()),
        })
    }

    #[must_use]
    pub fn to_words(&self) -> [Word36; BANK_DESCRIPTOR_WORDS] {
        let mut words = [Word36::ZERO; BANK_DESCRIPTOR_WORDS];
        let mut w0 = (self.general.bits() << 33)
            | (self.special.bits() << 30)
            | ((self.bank_type as u64) << 24)
            | self.lock.composite();
        if self.general_fault {
            w0 |= G_BIT;
        }
        if self.large {
            w0 |= LARGE_BIT;
        }
        if self.upper_limit_suppression {
            w0 |= U_BIT;
        }
        words[0] = Word36::masked(w0);
        words[1] = if self.bank_type == BankType::Indirect {
            Word36::from_halves(((self.target.0 & 0o7) << 15) | (self.target.1 & 0o77777), 0)
        } else {
            Word36::masked(((self.lower_limit & 0o777) << 27) | (self.upper_limit & 0o777777777))
        };
        let mut w2 = ((self.displacement & 0o77777) << 18) | u64::from(self.base.segment & 0o777777);
        if self.inactive {
            w2 |= Word36::SIGN_BIT;
        }
        words[2] = Word36::masked(w2);
        words[3] = Word36::masked(self.base.offset);
        words
    }

    #[must_use]
    pub const fn lower_limit_normalized(&self) -> u64 {
        if self.large {
            self.lower_limit << 15
        } else {
            self.lower_limit << 9
        }
    }

    #[must_use]
    pub const fn upper_limit_normalized(&self) -> u64 {
        if self.large {
            self.upper_limit << 6
        } else {
            self.upper_limit
        }
    }
}

/// A base register: the engine's view of one bank.
#[derive(Debug, Clone)]
pub struct BaseRegister {
    pub void: bool,
    pub base: AbsoluteAddress,
    pub lock: AccessLock,
    pub general: AccessPermissions,
    pub special: AccessPermissions,
    pub large: bool,
    pub lower: u64,
    pub upper: u64,
    pub storage: Option<Arc<Segment>>,
}

impl Default for BaseRegister {
    fn default() -> BaseRegister {
        BaseRegister::void()
    }
}

impl BaseRegister {
    #[must_use]
    pub fn void() -> BaseRegister {
        BaseRegister {
            void: true,
            base: AbsoluteAddress::default(),
            lock: AccessLock::MASTER,
            general: AccessPermissions::NONE,
            special: AccessPermissions::NONE,
            large: false,
            lower: 0,
            upper: 0,
            storage: None,
        }
    }

    #[must_use]
    pub fn from_descriptor(bd: &BankDescriptor, storage: Option<Arc<Segment>>) -> BaseRegister {
        BaseRegister {
            void: false,
            base: bd.base,
            lock: bd.lock,
            general: bd.general,
            special: bd.special,
            large: bd.large,
            lower: bd.lower_limit_normalized(),
            upper: bd.upper_limit_normalized(),
            storage,
        }
    }

    /// A window onto the part of `bd` starting at relative address
    /// `offset`.  Subsets cannot be entered.
    #[must_use]
    pub fn subset(bd: &BankDescriptor, offset: u64, storage: Option<Arc<Segment>>) -> BaseRegister {
        let parent_lower = bd.lower_limit_normalized();
        let parent_upper = bd.upper_limit_normalized();
        let lower = parent_lower.saturating_sub(offset);
        let (upper, void) = match parent_upper.checked_sub(offset) {
            Some(upper) => (upper, upper < lower),
            None => (0, true),
        };
        BaseRegister {
            void,
            base: bd.base.add_offset(offset.saturating_sub(parent_lower)),
            lock: bd.lock,
            general: bd.general.without_enter(),
            special: bd.special.without_enter(),
            large: bd.large,
            lower,
            upper,
            storage,
        }
    }

    pub fn contains(&self, relative_address: u64) -> bool {
        !self.void && relative_address >= self.lower && relative_address <= self.upper
    }

    pub fn check_limits(&self, relative_address: u64, fetch: bool) -> Result<(), Interrupt> {
        if self.contains(relative_address) {
            Ok(())
        } else {
            Err(Interrupt::ReferenceViolation {
                kind: ReferenceViolationKind::StorageLimits,
                fetch,
            })
        }
    }

    pub fn effective_permissions(&self, key: AccessKey) -> AccessPermissions {
        effective_permissions(key, self.lock, self.general, self.special)
    }

    /// The absolute address of `relative_address`, which the caller
    /// has already checked against the limits.
    pub fn absolute_address(&self, relative_address: u64) -> AbsoluteAddress {
        self.base
            .add_offset(relative_address.saturating_sub(self.lower))
    }

    fn storage_offset(&self, relative_address: u64) -> Option<u64> {
        if self.contains(relative_address) {
            Some(self.base.offset + (relative_address - self.lower))
        } else {
            None
        }
    }

    /// Reads a word through the register.  `None` means the address is
    /// outside the limits or the bank has no backing storage.
    pub fn read(&self, relative_address: u64) -> Option<Word36> {
        let offset = self.storage_offset(relative_address)?;
        self.storage.as_ref()?.get(offset)
    }

    pub fn write(&self, relative_address: u64, value: Word36) -> bool {
        match (self.storage_offset(relative_address), self.storage.as_ref()) {
            (Some(offset), Some(seg)) => seg.set(offset, value),
            _ => false,
        }
    }
}

/// Records which bank a base register holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ActiveBaseTableEntry {
    pub level: u64,
    pub bdi: u64,
    pub offset: u64,
}

impl ActiveBaseTableEntry {
    #[must_use]
    pub const fn composite(self) -> u64 {
        ((self.level & 0o7) << 33) | ((self.bdi & 0o77777) << 18) | (self.offset & 0o777777)
    }

    #[must_use]
    pub const fn from_composite(value: u64) -> ActiveBaseTableEntry {
        ActiveBaseTableEntry {
            level: (value >> 33) & 0o7,
            bdi: (value >> 18) & 0o77777,
            offset: value & 0o777777,
        }
    }
}

const BASIC_EXEC_FLAG: u64 = 0o400000000000;
const BASIC_LEVEL_FLAG: u64 = 0o040000000000;

/// A virtual address in either of its two encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VirtualAddress {
    Basic {
        exec: bool,
        level_flag: bool,
        bdi: u64,
        offset: u64,
    },
    Extended {
        level: u64,
        bdi: u64,
        offset: u64,
    },
}

impl VirtualAddress {
    #[must_use]
    pub const fn extended(level: u64, bdi: u64, offset: u64) -> VirtualAddress {
        VirtualAddress::Extended {
            level: level & 0o7,
            bdi: bdi & 0o77777,
            offset: offset & 0o777777,
        }
    }

    /// Translates an extended L,BDI to basic form.  Only even levels
    /// with a 12-bit BDI have a basic form.
    #[must_use]
    pub const fn basic_from_level(level: u64, bdi: u64, offset: u64) -> Option<VirtualAddress> {
        if level % 2 != 0 || level > 7 || bdi > 0o7777 {
            return None;
        }
        Some(VirtualAddress::Basic {
            exec: level < 4,
            level_flag: level == 0 || level == 6,
            bdi,
            offset: offset & 0o777777,
        })
    }

    #[must_use]
    pub const fn composite(self) -> u64 {
        match self {
            VirtualAddress::Basic {
                exec,
                level_flag,
                bdi,
                offset,
            } => {
                (if exec { BASIC_EXEC_FLAG } else { 0 })
                    | (if level_flag { BASIC_LEVEL_FLAG } else { 0 })
                    | ((bdi & 0o7777) << 18)
                    | (offset & 0o777777)
            }
            VirtualAddress::Extended { level, bdi, offset } => {
                ((level & 0o7) << 33) | ((bdi & 0o77777) << 18) | (offset & 0o777777)
            }
        }
    }
}

impl Display for VirtualAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:012o}", self.composite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BankDescriptor {
        BankDescriptor {
            general: AccessPermissions::from_bits(0o2),
            special: AccessPermissions::from_bits(0o7),
            bank_type: BankType::BasicMode,
            general_fault: false,
            large: false,
            upper_limit_suppression: true,
            lock: AccessLock::new(2, 0o1234),
            lower_limit: 1,
            upper_limit: 0o7777,
            target: (0, 0),
            inactive: false,
            displacement: 0,
            base: AbsoluteAddress::new(3, 0o40000),
        }
    }

    #[test]
    fn test_descriptor_words() {
        let bd = sample();
        let words = bd.to_words();
        assert_eq!(words[0].bits(), 0o270102_401234);
        assert_eq!(words[1].bits(), 0o001000_007777);
        assert_eq!(words[2].bits(), 0o000000_000003);
        assert_eq!(words[3].bits(), 0o40000);
        assert_eq!(BankDescriptor::from_words(&words), Ok(bd));
    }

    #[test]
    fn test_invalid_bank_type() {
        let mut words = sample().to_words();
        words[0] = Word36::masked(words[0].bits() | (0o17 << 24));
        assert_eq!(
            BankDescriptor::from_words(&words),
            Err(BankDescriptorError::InvalidBankType(0o17))
        );
    }

    #[test]
    fn test_normalised_limits() {
        let mut bd = sample();
        assert_eq!(bd.lower_limit_normalized(), 0o1000);
        assert_eq!(bd.upper_limit_normalized(), 0o7777);
        bd.large = true;
        assert_eq!(bd.lower_limit_normalized(), 0o100000);
        assert_eq!(bd.upper_limit_normalized(), 0o777700);
    }

    #[test]
    fn test_relative_addressing() {
        let storage = crate::memory::MainStorage::new();
        let seg = storage.allocate(3, 0o50000).expect("fresh segment");
        let br = BaseRegister::from_descriptor(&sample(), Some(seg));
        assert!(br.write(0o1005, w36!(0o55)));
        assert_eq!(
            storage.read(AbsoluteAddress::new(3, 0o40005)),
            Ok(w36!(0o55))
        );
        assert_eq!(br.read(0o1005), Some(w36!(0o55)));
        assert_eq!(br.read(0o777), None);
        assert_eq!(
            br.check_limits(0o10000, true),
            Err(Interrupt::ReferenceViolation {
                kind: ReferenceViolationKind::StorageLimits,
                fetch: true
            })
        );
    }

    #[test]
    fn test_subset() {
        let bd = sample();
        let br = BaseRegister::subset(&bd, 0o2000, None);
        assert!(!br.void);
        assert_eq!(br.lower, 0);
        assert_eq!(br.upper, 0o5777);
        assert_eq!(br.base, AbsoluteAddress::new(3, 0o41000));
        assert!(!br.special.enter);
        assert!(br.special.write);

        let br = BaseRegister::subset(&bd, 0o400, None);
        assert_eq!(br.lower, 0o400);
        assert_eq!(br.base, AbsoluteAddress::new(3, 0o40000));

        assert!(BaseRegister::subset(&bd, 0o10000, None).void);
    }

    #[test]
    fn test_virtual_address_forms() {
        assert_eq!(
            VirtualAddress::basic_from_level(0, 0o41, 0o1000).map(VirtualAddress::composite),
            Some(0o440041_001000)
        );
        assert_eq!(
            VirtualAddress::basic_from_level(4, 0o41, 0o1000).map(VirtualAddress::composite),
            Some(0o000041_001000)
        );
        assert_eq!(VirtualAddress::basic_from_level(1, 0o41, 0), None);
        assert_eq!(VirtualAddress::basic_from_level(2, 0o10000, 0), None);
        assert_eq!(
            VirtualAddress::extended(4, 0o41, 0o1000).composite(),
            0o400041_001000
        );
    }
}
