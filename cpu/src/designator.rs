//! The designator register, indicator/key register and program
//! address register.
use serde::Serialize;

use base::prelude::*;

use crate::access::AccessKey;
use crate::registers::RegisterSet;

/// Designator bit numbers.  DB0 is the most significant bit of the
/// register word and DB35 the least.
pub mod db {
    pub const ACTIVITY_LEVEL_QUEUE_MONITOR: u32 = 0;
    pub const FAULT_HANDLING_IN_PROGRESS: u32 = 6;
    pub const EXEC_24BIT_INDEXING: u32 = 11;
    pub const QUANTUM_TIMER_ENABLE: u32 = 12;
    pub const DEFERRABLE_INTERRUPT_ENABLE: u32 = 13;
    /// Two bits, DB14 and DB15.
    pub const PROCESSOR_PRIVILEGE: u32 = 14;
    pub const BASIC_MODE: u32 = 16;
    pub const EXEC_REGISTER_SET: u32 = 17;
    pub const CARRY: u32 = 18;
    pub const OVERFLOW: u32 = 19;
    pub const CHARACTERISTIC_UNDERFLOW: u32 = 21;
    pub const CHARACTERISTIC_OVERFLOW: u32 = 22;
    pub const DIVIDE_CHECK: u32 = 23;
    pub const OPERATION_TRAP_ENABLE: u32 = 27;
    pub const ARITHMETIC_EXCEPTION_ENABLE: u32 = 29;
    pub const BASIC_MODE_BASE_SELECTION: u32 = 31;
    pub const QUARTER_WORD_MODE: u32 = 32;
}

/// The bits LPD loads: DB27, DB29, DB30 and DB32 through DB35.
pub const PROGRAM_CONTROL_MASK: u64 = 0o000557;
/// The bits LUD loads: the program control bits plus DB18, DB19 and
/// DB21 through DB23.
pub const USER_DESIGNATOR_MASK: u64 = 0o670557;

const PP_SHIFT: u32 = 35 - (db::PROCESSOR_PRIVILEGE + 1);

const fn mask_of(n: u32) -> u64 {
    1 << (35 - n)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct DesignatorRegister(u64);

impl DesignatorRegister {
    #[must_use]
    pub const fn from_bits(bits: u64) -> DesignatorRegister {
        DesignatorRegister(bits & Word36::MASK)
    }

    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn word(self) -> Word36 {
        Word36::masked(self.0)
    }

    pub const fn bit(self, n: u32) -> bool {
        self.0 & mask_of(n) != 0
    }

    pub fn set_bit(&mut self, n: u32, value: bool) {
        if value {
            self.0 |= mask_of(n);
        } else {
            self.0 &= !mask_of(n);
        }
    }

    /// Replaces the bits selected by `mask` with those of `value`.
    pub fn merge(&mut self, mask: u64, value: u64) {
        self.0 = (self.0 & !mask) | (value & mask);
    }

    pub const fn processor_privilege(self) -> u64 {
        (self.0 >> PP_SHIFT) & 0o3
    }

    pub fn set_processor_privilege(&mut self, pp: u64) {
        self.merge(0o3 << PP_SHIFT, pp << PP_SHIFT);
    }

    pub const fn basic_mode(self) -> bool {
        self.bit(db::BASIC_MODE)
    }

    pub const fn exec_register_set(self) -> bool {
        self.bit(db::EXEC_REGISTER_SET)
    }

    pub const fn register_set(self) -> RegisterSet {
        if self.exec_register_set() {
            RegisterSet::Exec
        } else {
            RegisterSet::User
        }
    }

    pub const fn quarter_word_mode(self) -> bool {
        self.bit(db::QUARTER_WORD_MODE)
    }

    pub const fn exec_24bit_indexing(self) -> bool {
        self.bit(db::EXEC_24BIT_INDEXING)
    }

    pub const fn deferrable_interrupt_enabled(self) -> bool {
        self.bit(db::DEFERRABLE_INTERRUPT_ENABLE)
    }

    pub const fn fault_handling_in_progress(self) -> bool {
        self.bit(db::FAULT_HANDLING_IN_PROGRESS)
    }

    pub const fn basic_mode_base_selection(self) -> bool {
        self.bit(db::BASIC_MODE_BASE_SELECTION)
    }

    pub const fn operation_trap_enabled(self) -> bool {
        self.bit(db::OPERATION_TRAP_ENABLE)
    }

    pub const fn arithmetic_exception_enabled(self) -> bool {
        self.bit(db::ARITHMETIC_EXCEPTION_ENABLE)
    }

    pub const fn carry(self) -> bool {
        self.bit(db::CARRY)
    }

    pub const fn overflow(self) -> bool {
        self.bit(db::OVERFLOW)
    }

    pub const fn divide_check(self) -> bool {
        self.bit(db::DIVIDE_CHECK)
    }

    pub const fn characteristic_underflow(self) -> bool {
        self.bit(db::CHARACTERISTIC_UNDERFLOW)
    }

    pub const fn characteristic_overflow(self) -> bool {
        self.bit(db::CHARACTERISTIC_OVERFLOW)
    }

    /// True when address formation uses the 24-bit index modifier.
    pub const fn uses_24bit_indexing(self) -> bool {
        !self.basic_mode() && self.processor_privilege() < 2 && self.exec_24bit_indexing()
    }
}

const IKR_IN_F0: u64 = 0o004000000000;
const IKR_EXR: u64 = 0o002000000000;
const IKR_BREAKPOINT_MATCH: u64 = 0o000400000000;
const IKR_SOFTWARE_BREAK: u64 = 0o000200000000;

/// The indicator/key register.  S1 holds the short status of the
/// last interrupt, S3 its class and H2 the access key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct IndicatorKeyRegister(Word36);

impl IndicatorKeyRegister {
    #[must_use]
    pub const fn from_word(w: Word36) -> IndicatorKeyRegister {
        IndicatorKeyRegister(w)
    }

    #[must_use]
    pub const fn word(self) -> Word36 {
        self.0
    }

    fn flag(self, mask: u64) -> bool {
        self.0.bits() & mask != 0
    }

    fn set_flag(&mut self, mask: u64, value: bool) {
        let bits = if value {
            self.0.bits() | mask
        } else {
            self.0.bits() & !mask
        };
        self.0 = Word36::masked(bits);
    }

    pub fn short_status(self) -> u64 {
        self.0.s1()
    }

    pub fn set_short_status(&mut self, ssf: u64) {
        self.0 = self.0.with_s1(ssf);
    }

    pub fn interrupt_class(self) -> u64 {
        self.0.s3()
    }

    pub fn set_interrupt_class(&mut self, class: u64) {
        self.0 = self.0.with_s3(class);
    }

    pub fn access_key(self) -> AccessKey {
        AccessKey::from_composite(self.0.h2())
    }

    pub fn set_access_key(&mut self, key: AccessKey) {
        self.0 = self.0.with_h2(key.composite());
    }

    pub fn instruction_in_f0(self) -> bool {
        self.flag(IKR_IN_F0)
    }

    pub fn set_instruction_in_f0(&mut self, value: bool) {
        self.set_flag(IKR_IN_F0, value);
    }

    pub fn execute_repeated(self) -> bool {
        self.flag(IKR_EXR)
    }

    pub fn set_execute_repeated(&mut self, value: bool) {
        self.set_flag(IKR_EXR, value);
    }

    pub fn breakpoint_match(self) -> bool {
        self.flag(IKR_BREAKPOINT_MATCH)
    }

    pub fn set_breakpoint_match(&mut self, value: bool) {
        self.set_flag(IKR_BREAKPOINT_MATCH, value);
    }

    pub fn software_break(self) -> bool {
        self.flag(IKR_SOFTWARE_BREAK)
    }

    pub fn set_software_break(&mut self, value: bool) {
        self.set_flag(IKR_SOFTWARE_BREAK, value);
    }
}

/// The program address register: L,BDI of the current instruction
/// bank and the program counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ProgramAddressRegister {
    pub level: u64,
    pub bdi: u64,
    pub program_counter: u64,
}

impl ProgramAddressRegister {
    #[must_use]
    pub const fn new(level: u64, bdi: u64, program_counter: u64) -> ProgramAddressRegister {
        ProgramAddressRegister {
            level: level & 0o7,
            bdi: bdi & 0o77777,
            program_counter: program_counter & 0o777777,
        }
    }

    #[must_use]
    pub const fn from_word(w: Word36) -> ProgramAddressRegister {
        ProgramAddressRegister::new(w.bits() >> 33, w.bits() >> 18, w.bits())
    }

    #[must_use]
    pub const fn word(self) -> Word36 {
        Word36::masked((self.level << 33) | (self.bdi << 18) | self.program_counter)
    }

    pub fn set_program_counter(&mut self, pc: u64) {
        self.program_counter = pc & 0o777777;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privilege_and_modes() {
        let mut dr = DesignatorRegister::default();
        dr.set_processor_privilege(3);
        dr.set_bit(db::BASIC_MODE, true);
        assert_eq!(dr.processor_privilege(), 3);
        assert!(dr.basic_mode());
        assert_eq!(dr.bits(), (0o3 << 20) | (1 << 19));
        dr.set_processor_privilege(1);
        assert_eq!(dr.processor_privilege(), 1);
        assert!(dr.basic_mode());
    }

    #[test]
    fn test_24bit_indexing_needs_extended_mode_and_privilege() {
        let mut dr = DesignatorRegister::default();
        dr.set_bit(db::EXEC_24BIT_INDEXING, true);
        assert!(dr.uses_24bit_indexing());
        dr.set_processor_privilege(2);
        assert!(!dr.uses_24bit_indexing());
        dr.set_processor_privilege(0);
        dr.set_bit(db::BASIC_MODE, true);
        assert!(!dr.uses_24bit_indexing());
    }

    #[test]
    fn test_indicator_fields() {
        let mut ikr = IndicatorKeyRegister::default();
        ikr.set_instruction_in_f0(true);
        ikr.set_short_status(0o21);
        ikr.set_interrupt_class(0o10);
        ikr.set_access_key(AccessKey::new(3, 0o1234));
        assert_eq!(ikr.word().bits(), 0o214010_601234);
        ikr.set_instruction_in_f0(false);
        assert!(!ikr.instruction_in_f0());
        assert_eq!(ikr.access_key(), AccessKey::new(3, 0o1234));
    }

    #[test]
    fn test_par_word() {
        let par = ProgramAddressRegister::new(4, 0o41, 0o1000);
        assert_eq!(par.word().bits(), 0o400041_001000);
        assert_eq!(ProgramAddressRegister::from_word(par.word()), par);
    }

    #[test]
    fn test_bit_numbering() {
        let mut dr = DesignatorRegister::default();
        dr.set_bit(db::CARRY, true);
        dr.set_bit(db::QUARTER_WORD_MODE, true);
        assert_eq!(dr.bits(), 0o000000_400010);
        assert!(dr.carry());
        assert!(dr.quarter_word_mode());
        assert_eq!(PROGRAM_CONTROL_MASK & !USER_DESIGNATOR_MASK, 0);
    }
}
