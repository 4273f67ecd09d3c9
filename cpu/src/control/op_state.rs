use base::prelude::*;

use super::{Completion, Engine};
use crate::designator::{DesignatorRegister, PROGRAM_CONTROL_MASK, USER_DESIGNATOR_MASK};
use crate::interrupt::Interrupt;

/// Words moved by ACEL and DCEL: the 32 registers from X0 (X0-X11,
/// A0-A15 and the four slots after A15), then R0-R15, of the current
/// register set.
const ENVIRONMENT_WORDS: u64 = 48;

/// ## Processor state instructions
///
/// - LD, SD: load and store the whole designator register
/// - LPD, SPD: program designators
/// - LUD, SUD: user designators
/// - ACEL, DCEL: load and store the user register environment
impl Engine {
    pub(crate) fn op_ld(&mut self) -> Result<Completion, Interrupt> {
        self.check_privilege(0)?;
        let operand = resolved!(self.get_operand(true, true, false, false));
        self.asp.dr = DesignatorRegister::from_bits(operand.bits());
        Ok(Completion::Complete)
    }

    pub(crate) fn op_sd(&mut self) -> Result<Completion, Interrupt> {
        self.check_privilege(1)?;
        let value = self.asp.dr.word();
        resolved!(self.store_operand(false, true, false, false, value));
        Ok(Completion::Complete)
    }

    /// Load program designators: DB27-35 under the program control
    /// mask come from U.
    pub(crate) fn op_lpd(&mut self) -> Result<Completion, Interrupt> {
        let value = resolved!(self.developed_u());
        self.asp.dr.merge(PROGRAM_CONTROL_MASK, value);
        Ok(Completion::Complete)
    }

    pub(crate) fn op_spd(&mut self) -> Result<Completion, Interrupt> {
        let value = Word36::masked(self.asp.dr.bits() & 0o777);
        resolved!(self.store_operand(false, true, false, false, value));
        Ok(Completion::Complete)
    }

    pub(crate) fn op_lud(&mut self) -> Result<Completion, Interrupt> {
        let operand = resolved!(self.get_operand(true, true, false, false));
        self.asp.dr.merge(USER_DESIGNATOR_MASK, operand.bits());
        Ok(Completion::Complete)
    }

    pub(crate) fn op_sud(&mut self) -> Result<Completion, Interrupt> {
        let value = Word36::masked(self.asp.dr.bits() & 0o777777);
        resolved!(self.store_operand(false, true, false, false, value));
        Ok(Completion::Complete)
    }

    fn environment_slots(&self) -> Vec<usize> {
        let set = self.register_set();
        (0..32)
            .map(|n| set.x(n))
            .chain((0..16).map(|n| set.r(n)))
            .collect()
    }

    /// Load the register environment from 48 consecutive words.
    pub(crate) fn op_acel(&mut self) -> Result<Completion, Interrupt> {
        self.check_privilege(2)?;
        let words = resolved!(self.get_consecutive_operands(false, ENVIRONMENT_WORDS));
        for (slot, word) in self.environment_slots().into_iter().zip(words) {
            self.grs[slot] = word;
        }
        Ok(Completion::Complete)
    }

    pub(crate) fn op_dcel(&mut self) -> Result<Completion, Interrupt> {
        self.check_privilege(2)?;
        let words: Vec<Word36> = self
            .environment_slots()
            .into_iter()
            .map(|slot| self.grs[slot])
            .collect();
        resolved!(self.store_consecutive_operands(false, &words));
        Ok(Completion::Complete)
    }
}
