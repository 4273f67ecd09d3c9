//! The activity state packet.
use serde::Serialize;

use base::prelude::*;

use crate::designator::{DesignatorRegister, IndicatorKeyRegister, ProgramAddressRegister};
use crate::instruction::InstructionWord;

/// The architecturally visible state of the running activity.  The
/// first seven words are what interrupt acceptance saves on the
/// interrupt control stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivityStatePacket {
    pub par: ProgramAddressRegister,
    pub dr: DesignatorRegister,
    pub ikr: IndicatorKeyRegister,
    pub current_instruction: InstructionWord,
    pub quantum_timer: u64,
    pub interrupt_status_word0: Word36,
    pub interrupt_status_word1: Word36,
}

pub const INTERRUPT_FRAME_WORDS: usize = 7;

impl ActivityStatePacket {
    /// The words of an interrupt control stack frame: PAR, DR, IKR,
    /// quantum timer, F0, ISW0, ISW1.
    #[must_use]
    pub fn frame(&self) -> [Word36; INTERRUPT_FRAME_WORDS] {
        [
            self.par.word(),
            self.dr.word(),
            self.ikr.word(),
            Word36::masked(self.quantum_timer),
            self.current_instruction.word(),
            self.interrupt_status_word0,
            self.interrupt_status_word1,
        ]
    }
}
