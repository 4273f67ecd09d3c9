use base::prelude::*;

use super::{Completion, Engine};
use crate::instruction::InstructionWord;
use crate::interrupt::{Interrupt, InvalidInstructionKind, SignalKind, StopReason};

/// Whether `iw` is itself EX or EXR.
fn is_execute(iw: InstructionWord, basic_mode: bool) -> bool {
    if basic_mode {
        iw.f() == 0o72 && iw.j() == 0o10
    } else {
        iw.f() == 0o73 && iw.j() == 0o14 && (iw.a() == 0o05 || iw.a() == 0o06)
    }
}

/// ## Miscellaneous instructions
///
/// - ER, SGNL: [`Engine::op_er`], [`Engine::op_sgnl`]
/// - RMD: read the day clock into Aa, Aa+1
/// - NOP: develops its operand and nothing else
/// - EX, EXR: [`Engine::op_ex`], [`Engine::op_exr`]
/// - IAR: [`Engine::op_iar`]
/// - DCB: count the one bits of a double word
impl Engine {
    /// Executive request.  The signal is posted and the instruction
    /// completes; the interrupt is taken between instructions.
    pub(crate) fn op_er(&mut self) -> Result<Completion, Interrupt> {
        let code = resolved!(self.developed_u());
        self.post_interrupt(Interrupt::Signal {
            kind: SignalKind::ExecutiveRequest,
            code,
        });
        Ok(Completion::Complete)
    }

    pub(crate) fn op_sgnl(&mut self) -> Result<Completion, Interrupt> {
        let code = resolved!(self.developed_u());
        self.post_interrupt(Interrupt::Signal {
            kind: SignalKind::Signal,
            code,
        });
        Ok(Completion::Complete)
    }

    pub(crate) fn op_rmd(&mut self) -> Result<Completion, Interrupt> {
        let now = self.clock.read();
        self.set_a_reg(0, Word36::masked(now >> 36));
        self.set_a_reg(1, Word36::masked(now));
        Ok(Completion::Complete)
    }

    pub(crate) fn op_nop(&mut self) -> Result<Completion, Interrupt> {
        resolved!(self.ignore_operand());
        Ok(Completion::Complete)
    }

    /// Execute: the operand replaces F0 and is run in place of EX.
    pub(crate) fn op_ex(&mut self) -> Result<Completion, Interrupt> {
        let target = resolved!(self.get_operand(false, true, false, false));
        self.asp.current_instruction = InstructionWord::from_word(target);
        Ok(Completion::Incomplete)
    }

    /// Execute repeated: the operand replaces F0 and is run R1 times.
    /// With R1 zero nothing is run.  The target may not be EX or EXR.
    pub(crate) fn op_exr(&mut self) -> Result<Completion, Interrupt> {
        let target = resolved!(self.get_operand(false, true, false, false));
        let iw = InstructionWord::from_word(target);
        if is_execute(iw, self.asp.dr.basic_mode()) {
            return Err(Interrupt::InvalidInstruction(
                InvalidInstructionKind::ExrInvalidTarget,
            ));
        }
        if self.grs[self.r_index(1)].bits() == 0 {
            return Ok(Completion::Complete);
        }
        self.asp.current_instruction = iw;
        self.asp.ikr.set_execute_repeated(true);
        Ok(Completion::Incomplete)
    }

    /// Initiate auto-recovery: stops the engine, with the operand as
    /// the stop detail.
    pub(crate) fn op_iar(&mut self) -> Result<Completion, Interrupt> {
        self.check_privilege(0)?;
        let operand = resolved!(self.get_operand(false, true, true, false));
        self.stop(StopReason::InitiateAutoRecovery, operand);
        Ok(Completion::Complete)
    }

    pub(crate) fn op_dcb(&mut self) -> Result<Completion, Interrupt> {
        let words = resolved!(self.get_consecutive_operands(true, 2));
        let count: u32 = words.iter().map(|w| w.count_ones()).sum();
        self.set_a_reg(0, Word36::masked(u64::from(count)));
        Ok(Completion::Complete)
    }
}
