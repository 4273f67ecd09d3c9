use base::prelude::*;

use super::{Completion, Engine};
use crate::interrupt::Interrupt;
use crate::registers::IndexRegister;

/// ## Load instructions
///
/// - LA, LNA, LMA, LNMA: [`Engine::op_la`] and friends
/// - LR, LX: [`Engine::op_lr`], [`Engine::op_lx`]
/// - LXM, LXI, LXLM, LXSI: load one field of Xa
/// - DL, DLN, DLM: load Aa and Aa+1 from two consecutive words
/// - LAQW: [`Engine::op_laqw`]
impl Engine {
    fn load_a(&mut self, transform: fn(Word36) -> Word36) -> Result<Completion, Interrupt> {
        let operand = resolved!(self.get_operand(true, true, true, true));
        self.set_a_reg(0, transform(operand));
        Ok(Completion::Complete)
    }

    pub(crate) fn op_la(&mut self) -> Result<Completion, Interrupt> {
        self.load_a(|w| w)
    }

    pub(crate) fn op_lna(&mut self) -> Result<Completion, Interrupt> {
        self.load_a(Word36::negate)
    }

    pub(crate) fn op_lma(&mut self) -> Result<Completion, Interrupt> {
        self.load_a(Word36::magnitude)
    }

    pub(crate) fn op_lnma(&mut self) -> Result<Completion, Interrupt> {
        self.load_a(|w| w.magnitude().negate())
    }

    pub(crate) fn op_lr(&mut self) -> Result<Completion, Interrupt> {
        let operand = resolved!(self.get_operand(true, true, true, true));
        let ix = self.ra_index();
        self.grs[ix] = operand;
        Ok(Completion::Complete)
    }

    pub(crate) fn op_lx(&mut self) -> Result<Completion, Interrupt> {
        let operand = resolved!(self.get_operand(true, true, true, true));
        let ix = self.xa_index();
        self.grs[ix] = operand;
        Ok(Completion::Complete)
    }

    fn load_x_field(&mut self, update: fn(IndexRegister, u64) -> IndexRegister) -> Result<Completion, Interrupt> {
        let operand = resolved!(self.get_operand(true, true, true, true));
        let ix = self.xa_index();
        self.grs[ix] = update(IndexRegister(self.grs[ix]), operand.bits()).0;
        Ok(Completion::Complete)
    }

    /// Load modifier: the low 18 bits of the operand into Xa.XM.
    pub(crate) fn op_lxm(&mut self) -> Result<Completion, Interrupt> {
        self.load_x_field(IndexRegister::with_xm)
    }

    /// Load increment: the low 18 bits of the operand into Xa.XI.
    pub(crate) fn op_lxi(&mut self) -> Result<Completion, Interrupt> {
        self.load_x_field(IndexRegister::with_xi)
    }

    /// Load long modifier: the low 24 bits of the operand into
    /// Xa.XM24.
    pub(crate) fn op_lxlm(&mut self) -> Result<Completion, Interrupt> {
        self.load_x_field(IndexRegister::with_xm24)
    }

    /// Load short increment: the low 12 bits of the operand into
    /// Xa.XI12.
    pub(crate) fn op_lxsi(&mut self) -> Result<Completion, Interrupt> {
        self.load_x_field(IndexRegister::with_xi12)
    }

    fn load_double(&mut self, transform: fn(DoubleWord) -> DoubleWord) -> Result<Completion, Interrupt> {
        let words = resolved!(self.get_consecutive_operands(true, 2));
        let value = transform(DoubleWord::new(words[0], words[1]));
        self.set_a_reg(0, value.high);
        self.set_a_reg(1, value.low);
        Ok(Completion::Complete)
    }

    pub(crate) fn op_dl(&mut self) -> Result<Completion, Interrupt> {
        self.load_double(|d| d)
    }

    pub(crate) fn op_dln(&mut self) -> Result<Completion, Interrupt> {
        self.load_double(DoubleWord::negate)
    }

    pub(crate) fn op_dlm(&mut self) -> Result<Completion, Interrupt> {
        self.load_double(DoubleWord::magnitude)
    }

    /// Load A quarter word: Xx bits 4-5 (taken before any increment)
    /// pick the quarter of the operand which goes to Aa.
    pub(crate) fn op_laqw(&mut self) -> Result<Completion, Interrupt> {
        let quarter = self.quarter_selector();
        let operand = resolved!(self.get_operand(false, true, false, false));
        let value = match quarter {
            0 => operand.q1(),
            1 => operand.q2(),
            2 => operand.q3(),
            _ => operand.q4(),
        };
        self.set_a_reg(0, Word36::masked(value));
        Ok(Completion::Complete)
    }

    pub(crate) fn quarter_selector(&self) -> u64 {
        let x = self.asp.current_instruction.x();
        (self.grs[self.x_index(x)].bits() >> 30) & 0o3
    }
}
