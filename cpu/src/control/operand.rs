//! Address resolution and operand services.
//!
//! Every service which has to develop a relative address may find an
//! indirect reference (basic mode, I set, PP > 1).  In that case the
//! X, H, I and U fields of F0 are replaced from the referenced word
//! and the service returns [`Resolution::Retry`]; the engine comes
//! back to the same instruction on its next cycle.
use base::onescomplement;
use base::prelude::*;
use base::word36::{extract, inject, sign_extend};

use super::{BreakpointKind, Engine, Resolution};
use crate::interrupt::{Interrupt, InstructionPoint, ReferenceViolationKind, StopReason};
use crate::memory::AbsoluteAddress;
use crate::registers::{is_access_allowed, IndexRegister, GRS_SIZE};

/// Where an operand was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandLocation {
    Grs(usize),
    Storage {
        base_register: usize,
        relative: u64,
        absolute: AbsoluteAddress,
    },
}

fn limits_violation(fetch: bool) -> Interrupt {
    Interrupt::ReferenceViolation {
        kind: ReferenceViolationKind::StorageLimits,
        fetch,
    }
}

fn grs_violation() -> Interrupt {
    Interrupt::ReferenceViolation {
        kind: ReferenceViolationKind::GeneralRegisterSet,
        fetch: false,
    }
}

const BASIC_MODE_PRIMARY_ORDER: [usize; 4] = [12, 14, 13, 15];
const BASIC_MODE_SECONDARY_ORDER: [usize; 4] = [13, 15, 12, 14];

impl Engine {
    /// Finds the basic-mode base register (B12 to B15) whose bank
    /// contains `relative_address`, searching in the order DB31
    /// selects.
    pub(crate) fn find_basic_mode_bank(&self, relative_address: u64) -> Option<usize> {
        let order = if self.asp.dr.basic_mode_base_selection() {
            BASIC_MODE_SECONDARY_ORDER
        } else {
            BASIC_MODE_PRIMARY_ORDER
        };
        order
            .into_iter()
            .find(|&brx| self.base_registers[brx].contains(relative_address))
    }

    /// The base register an extended-mode F0 refers to: B or, below
    /// PP 2, I and B together.
    pub(crate) fn extended_base_register_index(&self) -> usize {
        let iw = self.asp.current_instruction;
        if self.asp.dr.processor_privilege() < 2 && iw.i() {
            16 + iw.b() as usize
        } else {
            iw.b() as usize
        }
    }

    /// Applies the H-bit increment of Xx, remembering the old value so
    /// interrupt acceptance can back it out.
    pub(crate) fn increment_index_register(&mut self) {
        let iw = self.asp.current_instruction;
        if iw.x() == 0 || !iw.h() {
            return;
        }
        let xx = self.x_index(iw.x());
        let old = self.grs[xx];
        self.undo_x.push((xx, old));
        let x = IndexRegister(old);
        self.grs[xx] = if self.asp.dr.uses_24bit_indexing() {
            x.increment_modifier24().0
        } else {
            x.increment_modifier().0
        };
    }

    fn signed_modifier(&self, x: u64) -> Word36 {
        let xreg = IndexRegister(self.grs[self.x_index(x)]);
        if self.asp.dr.uses_24bit_indexing() {
            xreg.signed_xm24()
        } else {
            xreg.signed_xm()
        }
    }

    /// Develops the relative address of F0: U (basic mode, or
    /// `use_u`) or D, plus the signed modifier of Xx.
    pub(crate) fn resolve_relative_address(&mut self, use_u: bool) -> Result<Resolution<u64>, Interrupt> {
        self.instruction_point = InstructionPoint::ResolvingAddress;
        let iw = self.asp.current_instruction;
        let dr = self.asp.dr;
        let base = if dr.basic_mode() || use_u { iw.u() } else { iw.d() };
        let relative = if iw.x() == 0 {
            base
        } else {
            let mask = if dr.uses_24bit_indexing() { 0o77777777 } else { 0o777777 };
            onescomplement::add(Word36::masked(base), self.signed_modifier(iw.x())).value.bits() & mask
        };

        if iw.i() && dr.basic_mode() && dr.processor_privilege() > 1 {
            let brx = self.find_basic_mode_bank(relative).ok_or(limits_violation(false))?;
            self.check_access(brx, relative, true, false)?;
            let word = self.read_storage(brx, relative, BreakpointKind::Read)?;
            self.increment_index_register();
            self.asp.current_instruction = iw.with_xhiu(word.bits());
            return Ok(Resolution::Retry);
        }

        self.instruction_point = InstructionPoint::MidExecution;
        Ok(Resolution::Done(relative))
    }

    pub(crate) fn check_access(
        &self,
        brx: usize,
        relative_address: u64,
        read: bool,
        write: bool,
    ) -> Result<(), Interrupt> {
        self.check_access_range(brx, relative_address, 1, read, write)
    }

    fn check_access_range(
        &self,
        brx: usize,
        relative_address: u64,
        count: u64,
        read: bool,
        write: bool,
    ) -> Result<(), Interrupt> {
        let br = &self.base_registers[brx];
        br.check_limits(relative_address, false)?;
        if count > 1 {
            br.check_limits(relative_address + count - 1, false)?;
        }
        let permissions = br.effective_permissions(self.asp.ikr.access_key());
        if read && !permissions.read {
            Err(Interrupt::ReferenceViolation {
                kind: ReferenceViolationKind::ReadAccess,
                fetch: false,
            })
        } else if write && !permissions.write {
            Err(Interrupt::ReferenceViolation {
                kind: ReferenceViolationKind::WriteAccess,
                fetch: false,
            })
        } else {
            Ok(())
        }
    }

    /// Reads through base register `brx`.  A word inside the limits
    /// with no storage behind it is a hardware check.
    pub(crate) fn read_storage(
        &mut self,
        brx: usize,
        relative_address: u64,
        kind: BreakpointKind,
    ) -> Result<Word36, Interrupt> {
        let br = &self.base_registers[brx];
        let address = br.absolute_address(relative_address);
        let word = br
            .read(relative_address)
            .ok_or(Interrupt::HardwareCheck { address })?;
        self.check_breakpoint(address, kind);
        Ok(word)
    }

    pub(crate) fn write_storage(&mut self, brx: usize, relative_address: u64, value: Word36) -> Result<(), Interrupt> {
        let br = &self.base_registers[brx];
        let address = br.absolute_address(relative_address);
        if !br.write(relative_address, value) {
            return Err(Interrupt::HardwareCheck { address });
        }
        self.check_breakpoint(address, BreakpointKind::Write);
        Ok(())
    }

    pub(crate) fn check_breakpoint(&mut self, address: AbsoluteAddress, kind: BreakpointKind) {
        let Some(breakpoint) = self.breakpoint else {
            return;
        };
        if !breakpoint.matches(address, kind) {
            return;
        }
        self.asp.ikr.set_breakpoint_match(true);
        if breakpoint.halt {
            self.stop(StopReason::Breakpoint, Word36::masked(address.offset));
        } else {
            self.post_interrupt(Interrupt::Breakpoint);
        }
    }

    /// Resolves F0 to a GRS slot or a checked storage location.
    fn locate_operand(&mut self, grs_check: bool, read: bool, write: bool) -> Result<Resolution<OperandLocation>, Interrupt> {
        let relative = or_retry!(self.resolve_relative_address(false));
        let dr = self.asp.dr;
        let extended_brx = if dr.basic_mode() {
            None
        } else {
            Some(self.extended_base_register_index())
        };
        self.increment_index_register();

        if grs_check && relative < GRS_SIZE as u64 && extended_brx.map_or(true, |brx| brx == 0) {
            let index = relative as usize;
            if !is_access_allowed(index, dr.processor_privilege(), write) {
                return Err(grs_violation());
            }
            return Ok(Resolution::Done(OperandLocation::Grs(index)));
        }

        let brx = match extended_brx {
            Some(brx) => brx,
            None => self.find_basic_mode_bank(relative).ok_or(limits_violation(false))?,
        };
        self.check_access(brx, relative, read, write)?;
        Ok(Resolution::Done(OperandLocation::Storage {
            base_register: brx,
            relative,
            absolute: self.base_registers[brx].absolute_address(relative),
        }))
    }

    /// The operand of a U or XU instruction, developed from the
    /// instruction itself.  Negative zero in U is taken as +0; XU
    /// sign-extends.
    pub(crate) fn immediate_operand(&mut self) -> Word36 {
        let iw = self.asp.current_instruction;
        let dr = self.asp.dr;
        let pp = dr.processor_privilege();
        let extend = iw.j() == jfield::XU;
        let wide = (pp < 2 && dr.exec_24bit_indexing()) || (pp > 1 && iw.i());

        let value = if iw.x() == 0 {
            let hiu = iw.hiu();
            if hiu == 0o777777 && !extend {
                0
            } else {
                hiu
            }
        } else {
            let u = iw.u();
            let u = if u == 0o177777 && !extend { 0 } else { u };
            let sum = onescomplement::add(Word36::masked(u), self.signed_modifier(iw.x()))
                .value
                .bits();
            self.increment_index_register();
            sum
        };

        let (mask, width) = if wide { (0o77777777, 24) } else { (0o777777, 18) };
        let value = value & mask;
        Word36::masked(if extend { sign_extend(value, width) } else { value })
    }

    /// Fetches the operand of F0.
    ///
    /// - `grs_dest`: the value is headed for a register, so a GRS
    ///   source is read as a full word.
    /// - `grs_check`: addresses below 0200 may refer to the GRS.
    /// - `allow_immediate`: j = U or XU gives an immediate operand.
    /// - `allow_partial`: honour the j-field partial word selection.
    pub(crate) fn get_operand(
        &mut self,
        grs_dest: bool,
        grs_check: bool,
        allow_immediate: bool,
        allow_partial: bool,
    ) -> Result<Resolution<Word36>, Interrupt> {
        let iw = self.asp.current_instruction;
        if allow_immediate && iw.j() >= jfield::U {
            return Ok(Resolution::Done(self.immediate_operand()));
        }
        let qw = self.asp.dr.quarter_word_mode();
        let value = match or_retry!(self.locate_operand(grs_check, true, false)) {
            OperandLocation::Grs(index) => {
                let word = self.grs[index];
                if grs_dest || !allow_partial {
                    word
                } else {
                    extract(word, iw.j(), qw)
                }
            }
            OperandLocation::Storage {
                base_register,
                relative,
                ..
            } => {
                let word = self.read_storage(base_register, relative, BreakpointKind::Read)?;
                if allow_partial {
                    extract(word, iw.j(), qw)
                } else {
                    word
                }
            }
        };
        Ok(Resolution::Done(value))
    }

    /// Fetches the full word operand of F0 for a read-modify-write
    /// instruction, taking the storage lock on it when `lock` is set.
    /// The lock is dropped when the instruction completes.
    pub(crate) fn get_operand_for_update(&mut self, lock: bool) -> Result<Resolution<(OperandLocation, Word36)>, Interrupt> {
        let location = or_retry!(self.locate_operand(true, true, true));
        let value = match location {
            OperandLocation::Grs(index) => self.grs[index],
            OperandLocation::Storage {
                base_register,
                relative,
                absolute,
            } => {
                if lock {
                    self.locks.lock_wait(self.id, absolute);
                }
                self.read_storage(base_register, relative, BreakpointKind::Read)?
            }
        };
        Ok(Resolution::Done((location, value)))
    }

    pub(crate) fn write_back(&mut self, location: OperandLocation, value: Word36) -> Result<(), Interrupt> {
        match location {
            OperandLocation::Grs(index) => {
                self.grs[index] = value;
                Ok(())
            }
            OperandLocation::Storage {
                base_register,
                relative,
                ..
            } => self.write_storage(base_register, relative, value),
        }
    }

    /// Stores `value` at the operand of F0.  The GRS is always written
    /// as a full word when the value came from a register
    /// (`grs_source`).  With `check_immediate`, a U or XU store only
    /// applies the X increment.
    pub(crate) fn store_operand(
        &mut self,
        grs_source: bool,
        grs_check: bool,
        check_immediate: bool,
        allow_partial: bool,
        value: Word36,
    ) -> Result<Resolution<()>, Interrupt> {
        let iw = self.asp.current_instruction;
        if check_immediate && iw.j() >= jfield::U {
            self.increment_index_register();
            return Ok(Resolution::Done(()));
        }
        let qw = self.asp.dr.quarter_word_mode();
        match or_retry!(self.locate_operand(grs_check, false, true)) {
            OperandLocation::Grs(index) => {
                self.grs[index] = if !grs_source && allow_partial {
                    inject(self.grs[index], iw.j(), qw, value)
                } else {
                    value
                };
            }
            OperandLocation::Storage {
                base_register,
                relative,
                absolute,
            } => {
                let merged = if allow_partial {
                    let original = self.base_registers[base_register]
                        .read(relative)
                        .ok_or(Interrupt::HardwareCheck { address: absolute })?;
                    inject(original, iw.j(), qw, value)
                } else {
                    value
                };
                self.write_storage(base_register, relative, merged)?;
            }
        }
        Ok(Resolution::Done(()))
    }

    /// Finds the range of `count` words starting at the operand of F0.
    fn locate_consecutive(
        &mut self,
        grs_check: bool,
        count: u64,
        write: bool,
    ) -> Result<Resolution<OperandLocation>, Interrupt> {
        let relative = or_retry!(self.resolve_relative_address(false));
        let dr = self.asp.dr;
        let extended_brx = if dr.basic_mode() {
            None
        } else {
            Some(self.extended_base_register_index())
        };
        self.increment_index_register();

        if grs_check && relative < GRS_SIZE as u64 && extended_brx.map_or(true, |brx| brx == 0) {
            for index in relative..relative + count {
                if index >= GRS_SIZE as u64 {
                    return Err(grs_violation());
                }
                if !is_access_allowed(index as usize, dr.processor_privilege(), write) {
                    return Err(grs_violation());
                }
            }
            return Ok(Resolution::Done(OperandLocation::Grs(relative as usize)));
        }

        let brx = match extended_brx {
            Some(brx) => brx,
            None => self.find_basic_mode_bank(relative).ok_or(limits_violation(false))?,
        };
        self.check_access_range(brx, relative, count, !write, write)?;
        Ok(Resolution::Done(OperandLocation::Storage {
            base_register: brx,
            relative,
            absolute: self.base_registers[brx].absolute_address(relative),
        }))
    }

    pub(crate) fn get_consecutive_operands(
        &mut self,
        grs_check: bool,
        count: u64,
    ) -> Result<Resolution<Vec<Word36>>, Interrupt> {
        let values = match or_retry!(self.locate_consecutive(grs_check, count, false)) {
            OperandLocation::Grs(first) => (first..first + count as usize).map(|ix| self.grs[ix]).collect(),
            OperandLocation::Storage {
                base_register,
                relative,
                ..
            } => {
                let mut values = Vec::with_capacity(count as usize);
                for n in 0..count {
                    values.push(self.read_storage(base_register, relative + n, BreakpointKind::Read)?);
                }
                values
            }
        };
        Ok(Resolution::Done(values))
    }

    pub(crate) fn store_consecutive_operands(
        &mut self,
        grs_check: bool,
        values: &[Word36],
    ) -> Result<Resolution<()>, Interrupt> {
        let count = values.len() as u64;
        match or_retry!(self.locate_consecutive(grs_check, count, true)) {
            OperandLocation::Grs(first) => {
                for (n, value) in values.iter().enumerate() {
                    self.grs[first + n] = *value;
                }
            }
            OperandLocation::Storage {
                base_register,
                relative,
                ..
            } => {
                for (n, value) in values.iter().enumerate() {
                    self.write_storage(base_register, relative + n as u64, *value)?;
                }
            }
        }
        Ok(Resolution::Done(()))
    }

    /// The target of a jump, and whether taking it moves basic-mode
    /// execution to the other base register pair (so DB31 must flip).
    pub(crate) fn get_jump_operand(&mut self) -> Result<Resolution<(u64, bool)>, Interrupt> {
        let target = or_retry!(self.resolve_relative_address(true));
        self.increment_index_register();
        let flip = self.asp.dr.basic_mode()
            && self
                .find_basic_mode_bank(target)
                .map_or(false, |brx| brx % 2 != self.fetch_base_register % 2);
        Ok(Resolution::Done((target, flip)))
    }

    /// The developed U itself, for instructions whose j field is part
    /// of the function code (shifts, LPD).
    pub(crate) fn developed_u(&mut self) -> Result<Resolution<u64>, Interrupt> {
        let relative = or_retry!(self.resolve_relative_address(true));
        self.increment_index_register();
        Ok(Resolution::Done(relative))
    }

    /// Develops U for its side effects only.  Storage references are
    /// limits checked, nothing is read.
    pub(crate) fn ignore_operand(&mut self) -> Result<Resolution<()>, Interrupt> {
        let relative = or_retry!(self.resolve_relative_address(false));
        self.increment_index_register();
        let dr = self.asp.dr;
        if dr.basic_mode() {
            if relative >= GRS_SIZE as u64 {
                self.find_basic_mode_bank(relative).ok_or(limits_violation(false))?;
            }
        } else {
            let brx = self.extended_base_register_index();
            if brx > 0 || relative >= GRS_SIZE as u64 {
                self.base_registers[brx].check_limits(relative, false)?;
            }
        }
        Ok(Resolution::Done(()))
    }
}
