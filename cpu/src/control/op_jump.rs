use base::onescomplement;
use base::prelude::*;

use super::{BreakpointKind, Completion, Engine, ACTIVE_BASE_TABLE_SIZE};
use crate::bank::VirtualAddress;
use crate::designator::db;
use crate::interrupt::{Interrupt, ReferenceViolationKind, StopReason};
use crate::registers::{is_access_allowed, IndexRegister};

/// ## Jump instructions
///
/// - J, HKJ, JK: unconditional (JK only develops its operand)
/// - SLJ, LMJ: jumps which save a return point
/// - HLTJ: [`Engine::op_hltj`]
/// - PAIJ, AAIJ: jump, changing the deferrable interrupt enable
/// - JZ, JNZ, JP, JN, JPS, JNS, JB, JNB, DJZ: tests of Aa
/// - JGD, JMGI: counting jumps
/// - JC, JNC, JO, JNO, JDF, JNDF, JFO, JNFO, JFU, JNFU: tests of
///   the designator register
///
/// A conditional jump whose condition fails does not develop its
/// operand at all.
impl Engine {
    /// The virtual address of the instruction in F0, as recorded in
    /// the jump history.
    pub(crate) fn current_virtual_address(&self) -> u64 {
        let pc = self.asp.par.program_counter;
        if self.asp.dr.basic_mode() {
            let entry = self.active_base_table[self.fetch_base_register % ACTIVE_BASE_TABLE_SIZE];
            VirtualAddress::basic_from_level(entry.level, entry.bdi, pc)
                .unwrap_or(VirtualAddress::extended(entry.level, entry.bdi, pc))
                .composite()
        } else {
            VirtualAddress::extended(self.asp.par.level, self.asp.par.bdi, pc).composite()
        }
    }

    /// Records the jump in the history and moves PAR.PC to `target`.
    /// `flip` toggles DB31 for a basic-mode jump to the other bank
    /// pair.
    pub(crate) fn take_jump(&mut self, target: u64, flip: bool) {
        let va = self.current_virtual_address();
        if let Some(full) = self.jump_history.store(va) {
            self.post_interrupt(full);
        }
        self.set_program_counter(target, true);
        if flip {
            let selection = self.asp.dr.basic_mode_base_selection();
            self.asp.dr.set_bit(db::BASIC_MODE_BASE_SELECTION, !selection);
        }
    }

    fn jump(&mut self) -> Result<Completion, Interrupt> {
        let (target, flip) = resolved!(self.get_jump_operand());
        self.take_jump(target, flip);
        Ok(Completion::Complete)
    }

    fn jump_if(&mut self, condition: bool) -> Result<Completion, Interrupt> {
        if condition {
            self.jump()
        } else {
            Ok(Completion::Complete)
        }
    }

    pub(crate) fn op_j(&mut self) -> Result<Completion, Interrupt> {
        self.jump()
    }

    pub(crate) fn op_hkj(&mut self) -> Result<Completion, Interrupt> {
        self.jump()
    }

    pub(crate) fn op_jk(&mut self) -> Result<Completion, Interrupt> {
        resolved!(self.get_jump_operand());
        Ok(Completion::Complete)
    }

    /// Store location and jump: the return point goes to H2 of the
    /// word at U and execution continues at U+1.
    pub(crate) fn op_slj(&mut self) -> Result<Completion, Interrupt> {
        let (target, flip) = resolved!(self.get_jump_operand());
        let brx = if self.asp.dr.basic_mode() {
            self.find_basic_mode_bank(target)
                .ok_or(Interrupt::ReferenceViolation {
                    kind: ReferenceViolationKind::StorageLimits,
                    fetch: false,
                })?
        } else {
            self.extended_base_register_index()
        };
        self.check_access(brx, target, true, true)?;
        let original = self.read_storage(brx, target, BreakpointKind::Read)?;
        let return_point = (self.asp.par.program_counter + 1) & 0o777777;
        self.write_storage(brx, target, original.with_h2(return_point))?;
        self.take_jump(target + 1, flip);
        Ok(Completion::Complete)
    }

    /// Load modifier and jump: Xa.XM gets the return point.
    pub(crate) fn op_lmj(&mut self) -> Result<Completion, Interrupt> {
        let (target, flip) = resolved!(self.get_jump_operand());
        let xa = self.xa_index();
        let return_point = (self.asp.par.program_counter + 1) & 0o777777;
        self.grs[xa] = IndexRegister(self.grs[xa]).with_xm(return_point).0;
        self.take_jump(target, flip);
        Ok(Completion::Complete)
    }

    /// Halt jump: jumps, then stops the engine.
    pub(crate) fn op_hltj(&mut self) -> Result<Completion, Interrupt> {
        self.check_privilege(0)?;
        let (target, flip) = resolved!(self.get_jump_operand());
        self.take_jump(target, flip);
        self.stop(StopReason::HaltJumpExecuted, Word36::ZERO);
        Ok(Completion::Complete)
    }

    /// Prevent all interrupts and jump.
    pub(crate) fn op_paij(&mut self) -> Result<Completion, Interrupt> {
        self.check_privilege(0)?;
        let (target, flip) = resolved!(self.get_jump_operand());
        self.asp.dr.set_bit(db::DEFERRABLE_INTERRUPT_ENABLE, false);
        self.take_jump(target, flip);
        Ok(Completion::Complete)
    }

    /// Allow all interrupts and jump.  Privileged in extended mode
    /// only.
    pub(crate) fn op_aaij(&mut self) -> Result<Completion, Interrupt> {
        if !self.asp.dr.basic_mode() {
            self.check_privilege(0)?;
        }
        let (target, flip) = resolved!(self.get_jump_operand());
        self.asp.dr.set_bit(db::DEFERRABLE_INTERRUPT_ENABLE, true);
        self.take_jump(target, flip);
        Ok(Completion::Complete)
    }

    pub(crate) fn op_jz(&mut self) -> Result<Completion, Interrupt> {
        self.jump_if(self.a_reg(0).is_zero())
    }

    pub(crate) fn op_jnz(&mut self) -> Result<Completion, Interrupt> {
        self.jump_if(!self.a_reg(0).is_zero())
    }

    pub(crate) fn op_jp(&mut self) -> Result<Completion, Interrupt> {
        self.jump_if(!self.a_reg(0).is_negative())
    }

    pub(crate) fn op_jn(&mut self) -> Result<Completion, Interrupt> {
        self.jump_if(self.a_reg(0).is_negative())
    }

    /// JPS and JNS rotate Aa left one place whether or not they jump,
    /// but only once the jump target (if any) has been developed.
    fn jump_and_rotate(&mut self, condition: bool) -> Result<Completion, Interrupt> {
        let jump = if condition {
            Some(resolved!(self.get_jump_operand()))
        } else {
            None
        };
        let rotated = self.a_reg(0).rotate_left(1);
        self.set_a_reg(0, rotated);
        if let Some((target, flip)) = jump {
            self.take_jump(target, flip);
        }
        Ok(Completion::Complete)
    }

    pub(crate) fn op_jps(&mut self) -> Result<Completion, Interrupt> {
        self.jump_and_rotate(!self.a_reg(0).is_negative())
    }

    pub(crate) fn op_jns(&mut self) -> Result<Completion, Interrupt> {
        self.jump_and_rotate(self.a_reg(0).is_negative())
    }

    pub(crate) fn op_jb(&mut self) -> Result<Completion, Interrupt> {
        self.jump_if(self.a_reg(0).bits() & 1 == 1)
    }

    pub(crate) fn op_jnb(&mut self) -> Result<Completion, Interrupt> {
        self.jump_if(self.a_reg(0).bits() & 1 == 0)
    }

    /// Double jump zero: (Aa,Aa+1) is +0 or -0 as a 72-bit value.
    pub(crate) fn op_djz(&mut self) -> Result<Completion, Interrupt> {
        self.jump_if(DoubleWord::new(self.a_reg(0), self.a_reg(1)).is_zero())
    }

    /// Jump greater and decrement: the GRS word selected by j and a
    /// (an absolute GRS address) is tested for greater than zero and
    /// then decremented.
    pub(crate) fn op_jgd(&mut self) -> Result<Completion, Interrupt> {
        let iw = self.asp.current_instruction;
        let index = (((iw.j() << 4) | iw.a()) & 0o177) as usize;
        if !is_access_allowed(index, self.asp.dr.processor_privilege(), true) {
            return Err(Interrupt::ReferenceViolation {
                kind: ReferenceViolationKind::GeneralRegisterSet,
                fetch: false,
            });
        }
        let value = self.grs[index];
        let jump = if value.is_positive() && !value.is_zero() {
            Some(resolved!(self.get_jump_operand()))
        } else {
            None
        };
        self.grs[index] = onescomplement::add(value, Word36::NEGATIVE_ONE).value;
        if let Some((target, flip)) = jump {
            self.take_jump(target, flip);
        }
        Ok(Completion::Complete)
    }

    /// Jump modifier greater and increment: jumps if Xa.XM is greater
    /// than zero, and always adds Xa.XI to Xa.XM.
    pub(crate) fn op_jmgi(&mut self) -> Result<Completion, Interrupt> {
        let xa = self.xa_index();
        let wide = self.asp.dr.uses_24bit_indexing();
        let x = IndexRegister(self.grs[xa]);
        let modifier = if wide { x.signed_xm24() } else { x.signed_xm() };
        let jump = if modifier.is_positive() && !modifier.is_zero() {
            Some(resolved!(self.get_jump_operand()))
        } else {
            None
        };
        let x = IndexRegister(self.grs[xa]);
        self.grs[xa] = if wide {
            x.increment_modifier24().0
        } else {
            x.increment_modifier().0
        };
        if let Some((target, flip)) = jump {
            self.take_jump(target, flip);
        }
        Ok(Completion::Complete)
    }

    pub(crate) fn op_jc(&mut self) -> Result<Completion, Interrupt> {
        self.jump_if(self.asp.dr.carry())
    }

    pub(crate) fn op_jnc(&mut self) -> Result<Completion, Interrupt> {
        self.jump_if(!self.asp.dr.carry())
    }

    pub(crate) fn op_jo(&mut self) -> Result<Completion, Interrupt> {
        self.jump_if(self.asp.dr.overflow())
    }

    pub(crate) fn op_jno(&mut self) -> Result<Completion, Interrupt> {
        self.jump_if(!self.asp.dr.overflow())
    }

    pub(crate) fn op_jdf(&mut self) -> Result<Completion, Interrupt> {
        self.jump_if(self.asp.dr.divide_check())
    }

    pub(crate) fn op_jndf(&mut self) -> Result<Completion, Interrupt> {
        self.jump_if(!self.asp.dr.divide_check())
    }

    pub(crate) fn op_jfo(&mut self) -> Result<Completion, Interrupt> {
        self.jump_if(self.asp.dr.characteristic_overflow())
    }

    pub(crate) fn op_jnfo(&mut self) -> Result<Completion, Interrupt> {
        self.jump_if(!self.asp.dr.characteristic_overflow())
    }

    pub(crate) fn op_jfu(&mut self) -> Result<Completion, Interrupt> {
        self.jump_if(self.asp.dr.characteristic_underflow())
    }

    pub(crate) fn op_jnfu(&mut self) -> Result<Completion, Interrupt> {
        self.jump_if(!self.asp.dr.characteristic_underflow())
    }
}
