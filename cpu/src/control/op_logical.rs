use base::prelude::*;

use super::{Completion, Engine};
use crate::interrupt::Interrupt;

/// ## Logical instructions
///
/// Each combines Aa with the operand and leaves Aa untouched; the
/// result goes to Aa+1.  MLU merges under the mask in R2.
impl Engine {
    fn logical(&mut self, combine: fn(Word36, Word36) -> Word36) -> Result<Completion, Interrupt> {
        let operand = resolved!(self.get_operand(false, true, true, true));
        let result = combine(self.a_reg(0), operand);
        self.set_a_reg(1, result);
        Ok(Completion::Complete)
    }

    pub(crate) fn op_or(&mut self) -> Result<Completion, Interrupt> {
        self.logical(|a, op| a | op)
    }

    pub(crate) fn op_xor(&mut self) -> Result<Completion, Interrupt> {
        self.logical(|a, op| a ^ op)
    }

    pub(crate) fn op_and(&mut self) -> Result<Completion, Interrupt> {
        self.logical(|a, op| a & op)
    }

    /// Masked load upper: operand bits where R2 is set, Aa bits where
    /// it is clear.
    pub(crate) fn op_mlu(&mut self) -> Result<Completion, Interrupt> {
        let operand = resolved!(self.get_operand(false, true, true, true));
        let mask = self.grs[self.r_index(2)];
        let result = (operand & mask) | (self.a_reg(0) & !mask);
        self.set_a_reg(1, result);
        Ok(Completion::Complete)
    }
}
