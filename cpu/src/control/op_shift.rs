use base::prelude::*;

use super::{Completion, Engine, Resolution};
use crate::interrupt::Interrupt;

/// ## Shift instructions
///
/// The shift count is the low seven bits of the developed U.
///
/// - SSC, DSC, LSSC, LDSC: circular shifts
/// - SSL, DSL, LSSL, LDSL: logical shifts
/// - SSA, DSA: algebraic (right) shifts
/// - LSC, DLSC: [`Engine::op_lsc`], [`Engine::op_dlsc`]
impl Engine {
    fn shift_count(&mut self) -> Result<Resolution<u32>, Interrupt> {
        let u = or_retry!(self.developed_u());
        Ok(Resolution::Done((u & 0o177) as u32))
    }

    fn shift_single(&mut self, shift: fn(Word36, u32) -> Word36) -> Result<Completion, Interrupt> {
        let count = resolved!(self.shift_count());
        let value = shift(self.a_reg(0), count);
        self.set_a_reg(0, value);
        Ok(Completion::Complete)
    }

    fn shift_double(&mut self, shift: fn(DoubleWord, u32) -> DoubleWord) -> Result<Completion, Interrupt> {
        let count = resolved!(self.shift_count());
        let value = shift(DoubleWord::new(self.a_reg(0), self.a_reg(1)), count);
        self.set_a_reg(0, value.high);
        self.set_a_reg(1, value.low);
        Ok(Completion::Complete)
    }

    pub(crate) fn op_ssc(&mut self) -> Result<Completion, Interrupt> {
        self.shift_single(Word36::rotate_right)
    }

    pub(crate) fn op_dsc(&mut self) -> Result<Completion, Interrupt> {
        self.shift_double(DoubleWord::rotate_right)
    }

    pub(crate) fn op_ssl(&mut self) -> Result<Completion, Interrupt> {
        self.shift_single(Word36::shift_right_logical)
    }

    pub(crate) fn op_dsl(&mut self) -> Result<Completion, Interrupt> {
        self.shift_double(DoubleWord::shift_right_logical)
    }

    pub(crate) fn op_ssa(&mut self) -> Result<Completion, Interrupt> {
        self.shift_single(Word36::shift_right_algebraic)
    }

    pub(crate) fn op_dsa(&mut self) -> Result<Completion, Interrupt> {
        self.shift_double(DoubleWord::shift_right_algebraic)
    }

    pub(crate) fn op_lssc(&mut self) -> Result<Completion, Interrupt> {
        self.shift_single(Word36::rotate_left)
    }

    pub(crate) fn op_ldsc(&mut self) -> Result<Completion, Interrupt> {
        self.shift_double(DoubleWord::rotate_left)
    }

    pub(crate) fn op_lssl(&mut self) -> Result<Completion, Interrupt> {
        self.shift_single(Word36::shift_left_logical)
    }

    pub(crate) fn op_ldsl(&mut self) -> Result<Completion, Interrupt> {
        self.shift_double(DoubleWord::shift_left_logical)
    }

    /// Load shift and count: the operand is rotated left until its
    /// two leading bits differ; the result goes to Aa and the number
    /// of places to Aa+1.  A zero operand counts 35.
    pub(crate) fn op_lsc(&mut self) -> Result<Completion, Interrupt> {
        let operand = resolved!(self.get_operand(true, true, false, false));
        let (value, count) = if operand.is_zero() {
            (operand, 35)
        } else {
            let mut value = operand;
            let mut count = 0;
            while (value.bits() >> 35) == ((value.bits() >> 34) & 1) {
                value = value.rotate_left(1);
                count += 1;
            }
            (value, count)
        };
        self.set_a_reg(0, value);
        self.set_a_reg(1, Word36::masked(count));
        Ok(Completion::Complete)
    }

    /// Double load shift and count: as LSC over a two-word operand,
    /// with the count (71 for zero) in Aa+2.
    pub(crate) fn op_dlsc(&mut self) -> Result<Completion, Interrupt> {
        let words = resolved!(self.get_consecutive_operands(true, 2));
        let operand = DoubleWord::new(words[0], words[1]);
        let (value, count) = if operand.is_zero() {
            (operand, 71)
        } else {
            let mut value = operand;
            let mut count = 0;
            while (value.high.bits() >> 35) == ((value.high.bits() >> 34) & 1) {
                value = value.rotate_left(1);
                count += 1;
            }
            (value, count)
        };
        self.set_a_reg(0, value.high);
        self.set_a_reg(1, value.low);
        self.set_a_reg(2, Word36::masked(count));
        Ok(Completion::Complete)
    }
}
