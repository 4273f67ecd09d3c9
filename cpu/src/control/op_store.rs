use base::prelude::*;

use super::{Completion, Engine};
use crate::interrupt::Interrupt;

const FIELDATA_SPACES: Word36 = Word36::masked(0o050505_050505);
const FIELDATA_ZEROES: Word36 = Word36::masked(0o606060_606060);
const ASCII_SPACES: Word36 = Word36::masked(0o040040_040040);
const ASCII_ZEROES: Word36 = Word36::masked(0o060060_060060);

/// ## Store instructions
///
/// - SA, SNA, SMA: [`Engine::op_sa`] and friends
/// - SR, SX: store Ra, Xa
/// - SZ, SNZ, SP1, SN1: store +0, -0, +1, -1
/// - SFS, SFZ, SAS, SAZ: store Fieldata or ASCII spaces or zeroes
/// - DS: store Aa and Aa+1 to two consecutive words
/// - SAQW: [`Engine::op_saqw`]
impl Engine {
    fn store(&mut self, value: Word36) -> Result<Completion, Interrupt> {
        resolved!(self.store_operand(false, true, true, true, value));
        Ok(Completion::Complete)
    }

    pub(crate) fn op_sa(&mut self) -> Result<Completion, Interrupt> {
        self.store(self.a_reg(0))
    }

    pub(crate) fn op_sna(&mut self) -> Result<Completion, Interrupt> {
        self.store(self.a_reg(0).negate())
    }

    pub(crate) fn op_sma(&mut self) -> Result<Completion, Interrupt> {
        self.store(self.a_reg(0).magnitude())
    }

    pub(crate) fn op_sr(&mut self) -> Result<Completion, Interrupt> {
        self.store(self.grs[self.ra_index()])
    }

    pub(crate) fn op_sx(&mut self) -> Result<Completion, Interrupt> {
        self.store(self.grs[self.xa_index()])
    }

    pub(crate) fn op_sz(&mut self) -> Result<Completion, Interrupt> {
        self.store(Word36::ZERO)
    }

    pub(crate) fn op_snz(&mut self) -> Result<Completion, Interrupt> {
        self.store(Word36::NEGATIVE_ZERO)
    }

    pub(crate) fn op_sp1(&mut self) -> Result<Completion, Interrupt> {
        self.store(Word36::ONE)
    }

    pub(crate) fn op_sn1(&mut self) -> Result<Completion, Interrupt> {
        self.store(Word36::NEGATIVE_ONE)
    }

    pub(crate) fn op_sfs(&mut self) -> Result<Completion, Interrupt> {
        self.store(FIELDATA_SPACES)
    }

    pub(crate) fn op_sfz(&mut self) -> Result<Completion, Interrupt> {
        self.store(FIELDATA_ZEROES)
    }

    pub(crate) fn op_sas(&mut self) -> Result<Completion, Interrupt> {
        self.store(ASCII_SPACES)
    }

    pub(crate) fn op_saz(&mut self) -> Result<Completion, Interrupt> {
        self.store(ASCII_ZEROES)
    }

    pub(crate) fn op_ds(&mut self) -> Result<Completion, Interrupt> {
        let values = [self.a_reg(0), self.a_reg(1)];
        resolved!(self.store_consecutive_operands(true, &values));
        Ok(Completion::Complete)
    }

    /// Store A quarter word: the low nine bits of Aa replace the
    /// quarter of the operand selected by Xx bits 4-5.
    pub(crate) fn op_saqw(&mut self) -> Result<Completion, Interrupt> {
        let quarter = self.quarter_selector();
        let value = self.a_reg(0).bits() & 0o777;
        let (location, original) = resolved!(self.get_operand_for_update(false));
        let updated = match quarter {
            0 => original.with_q1(value),
            1 => original.with_q2(value),
            2 => original.with_q3(value),
            _ => original.with_q4(value),
        };
        self.write_back(location, updated)?;
        Ok(Completion::Complete)
    }
}
