//! Interrupt acceptance.
//!
//! Accepting an interrupt backs out the X increments of the aborted
//! instruction, pushes a frame describing the interrupted activity
//! onto the interrupt control stack (based on B26, with EX1 as the
//! stack pointer) and transfers to the handler named by the class's
//! vector word in the level 0 bank descriptor table (B16).  Anything
//! which prevents that is a stop.
use tracing::{event, Level};

use base::prelude::*;

use super::{Engine, BDT_BASE_REGISTER, ICS_BASE_REGISTER};
use crate::access::AccessKey;
use crate::bank::{ActiveBaseTableEntry, BankType, BaseRegister};
use crate::designator::{db, DesignatorRegister, ProgramAddressRegister};
use crate::interrupt::{InstructionPoint, Interrupt, InterruptClass, StopReason};
use crate::registers::{IndexRegister, EX0};

impl Engine {
    pub(crate) fn accept_interrupt(&mut self, interrupt: Interrupt) {
        if self.log_interrupts {
            event!(Level::INFO, "{}: accepting {}", self.name, interrupt);
        }
        let class = interrupt.class();
        let hardware_check = class == InterruptClass::HardwareCheck;
        if hardware_check && self.asp.dr.fault_handling_in_progress() {
            self.stop(StopReason::InterruptHandlerHardwareFailure, Word36::ZERO);
            return;
        }

        while let Some((index, value)) = self.undo_x.pop() {
            self.grs[index] = value;
        }

        self.asp.ikr.set_short_status(interrupt.short_status());
        self.asp.ikr.set_interrupt_class(class.value());
        self.asp.interrupt_status_word0 = Word36::masked(interrupt.status_word0());
        self.asp.interrupt_status_word1 = Word36::masked(interrupt.status_word1());

        let ics = self.base_registers[ICS_BASE_REGISTER].clone();
        if ics.void {
            self.stop(StopReason::IcsBaseRegisterInvalid, Word36::ZERO);
            return;
        }
        let ex1 = EX0 + 1;
        let pointer = IndexRegister(self.grs[ex1]).decrement_modifier();
        let frame = self.asp.frame();
        let first = pointer.xm();
        let last = first + frame.len() as u64 - 1;
        if !ics.contains(first) || !ics.contains(last) {
            self.stop(StopReason::IcsOverflow, Word36::ZERO);
            return;
        }
        self.grs[ex1] = pointer.0;
        for (n, word) in frame.iter().enumerate() {
            if !ics.write(first + n as u64, *word) {
                self.stop(StopReason::IcsOverflow, Word36::ZERO);
                return;
            }
        }

        let va = self.current_virtual_address();
        if let Some(full) = self.jump_history.store(va) {
            self.pending.post(full);
        }

        let l0 = self.base_registers[BDT_BASE_REGISTER].clone();
        if l0.void {
            self.stop(StopReason::L0BaseRegisterInvalid, Word36::ZERO);
            return;
        }
        let Some(vector) = l0.read(l0.lower + class.value()) else {
            self.stop(
                StopReason::InterruptHandlerOffsetOutOfRange,
                Word36::masked(class.value()),
            );
            return;
        };
        let level = vector.bits() >> 33;
        let bdi = (vector.bits() >> 18) & 0o77777;
        let offset = vector.h2();
        let level_bdi = Word36::masked((level << 15) | bdi);
        if level == 0 && bdi < 32 {
            self.stop(StopReason::InterruptHandlerInvalidLevelBdi, level_bdi);
            return;
        }
        let Some(bd) = self.find_bank_descriptor(level, bdi) else {
            self.stop(StopReason::InterruptHandlerInvalidLevelBdi, level_bdi);
            return;
        };
        if bd.bank_type != BankType::ExtendedMode {
            self.stop(StopReason::InterruptHandlerInvalidBankType, level_bdi);
            return;
        }

        self.base_registers[0] = BaseRegister::from_descriptor(&bd, self.storage.segment(bd.base.segment));
        self.active_base_table[0] = ActiveBaseTableEntry { level, bdi, offset: 0 };
        self.asp.par = ProgramAddressRegister::new(level, bdi, offset);

        let mut dr = DesignatorRegister::default();
        dr.set_bit(db::EXEC_REGISTER_SET, true);
        dr.set_bit(db::FAULT_HANDLING_IN_PROGRESS, hardware_check);
        self.asp.dr = dr;

        self.asp.ikr.set_instruction_in_f0(false);
        self.asp.ikr.set_execute_repeated(false);
        self.asp.ikr.set_access_key(AccessKey::MASTER);

        self.locks.release_all(self.id);
        self.instruction_point = InstructionPoint::BetweenInstructions;
        self.prevent_pc_update = false;
    }
}
