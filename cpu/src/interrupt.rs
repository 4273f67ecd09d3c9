//! Interrupts, the pending-interrupt stack and engine stop reasons.
//!
//! Instruction handlers and operand services report ISA-visible
//! failures by returning an [`Interrupt`] through `Result` and `?`.
//! The cycle posts returned interrupts on the engine's
//! [`InterruptStack`], and the run loop accepts them between cycles
//! when the pop rules allow.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use crate::memory::AbsoluteAddress;

/// Interrupt classes.  The class is the priority: lower values are
/// serviced first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum InterruptClass {
    HardwareDefault = 0,
    HardwareCheck = 1,
    ReferenceViolation = 0o10,
    AddressingException = 0o11,
    Signal = 0o14,
    TestAndSet = 0o15,
    InvalidInstruction = 0o16,
    ArithmeticException = 0o17,
    OperationTrap = 0o22,
    Breakpoint = 0o23,
    JumpHistoryFull = 0o31,
}

impl InterruptClass {
    #[must_use]
    pub const fn value(self) -> u64 {
        self as u64
    }

    pub const fn name(self) -> &'static str {
        match self {
            InterruptClass::HardwareDefault => "Hardware Default",
            InterruptClass::HardwareCheck => "Hardware Check",
            InterruptClass::ReferenceViolation => "Reference Violation",
            InterruptClass::AddressingException => "Addressing Exception",
            InterruptClass::Signal => "Signal",
            InterruptClass::TestAndSet => "Test And Set",
            InterruptClass::InvalidInstruction => "Invalid Instruction",
            InterruptClass::ArithmeticException => "Arithmetic Exception",
            InterruptClass::OperationTrap => "Operation Trap",
            InterruptClass::Breakpoint => "Breakpoint",
            InterruptClass::JumpHistoryFull => "Jump History Full",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Synchrony {
    Synchronous,
    Asynchronous,
    Pended,
}

/// Where in the instruction cycle an interrupt may be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InterruptPoint {
    BetweenInstructions,
    MidExecution,
    Any,
}

/// Where the engine currently is in the instruction cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum InstructionPoint {
    #[default]
    BetweenInstructions,
    ResolvingAddress,
    MidExecution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReferenceViolationKind {
    GeneralRegisterSet = 0,
    StorageLimits = 1,
    ReadAccess = 2,
    WriteAccess = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AddressingExceptionKind {
    Fatal = 0,
    InvalidSourceLevelBdi = 3,
    InvalidBankType = 0o16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SignalKind {
    ExecutiveRequest = 0,
    Signal = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InvalidInstructionKind {
    BadFunctionCode = 0,
    BadPp = 1,
    ExrInvalidTarget = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ArithmeticExceptionKind {
    DivideCheck = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperationTrapKind {
    FixedPointBinaryOverflow = 0,
    MultiplySingleIntegerOverflow = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Interrupt {
    HardwareDefault,
    HardwareCheck {
        address: AbsoluteAddress,
    },
    ReferenceViolation {
        kind: ReferenceViolationKind,
        fetch: bool,
    },
    AddressingException {
        kind: AddressingExceptionKind,
        level: u64,
        bdi: u64,
    },
    Signal {
        kind: SignalKind,
        code: u64,
    },
    TestAndSet {
        base_register: usize,
        relative_address: u64,
    },
    InvalidInstruction(InvalidInstructionKind),
    ArithmeticException(ArithmeticExceptionKind),
    OperationTrap(OperationTrapKind),
    Breakpoint,
    JumpHistoryFull,
}

impl Interrupt {
    #[must_use]
    pub const fn class(&self) -> InterruptClass {
        match self {
            Interrupt::HardwareDefault => InterruptClass::HardwareDefault,
            Interrupt::HardwareCheck { .. } => InterruptClass::HardwareCheck,
            Interrupt::ReferenceViolation { .. } => InterruptClass::ReferenceViolation,
            Interrupt::AddressingException { .. } => InterruptClass::AddressingException,
            Interrupt::Signal { .. } => InterruptClass::Signal,
            Interrupt::TestAndSet { .. } => InterruptClass::TestAndSet,
            Interrupt::InvalidInstruction(_) => InterruptClass::InvalidInstruction,
            Interrupt::ArithmeticException(_) => InterruptClass::ArithmeticException,
            Interrupt::OperationTrap(_) => InterruptClass::OperationTrap,
            Interrupt::Breakpoint => InterruptClass::Breakpoint,
            Interrupt::JumpHistoryFull => InterruptClass::JumpHistoryFull,
        }
    }

    /// The six-bit short status field.
    #[must_use]
    pub const fn short_status(&self) -> u64 {
        match self {
            Interrupt::ReferenceViolation { kind, fetch } => {
                ((*kind as u64 & 0o3) << 4) | (*fetch as u64)
            }
            Interrupt::AddressingException { kind, .. } => *kind as u64,
            Interrupt::Signal { kind, .. } => *kind as u64,
            Interrupt::InvalidInstruction(kind) => *kind as u64,
            Interrupt::ArithmeticException(kind) => *kind as u64,
            Interrupt::OperationTrap(kind) => *kind as u64,
            _ => 0,
        }
    }

    #[must_use]
    pub const fn status_word0(&self) -> u64 {
        match self {
            Interrupt::HardwareCheck { address } => address.segment as u64,
            Interrupt::Signal { code, .. } => *code & 0o777777777777,
            Interrupt::TestAndSet {
                base_register,
                relative_address,
            } => ((*base_register as u64 & 0o77) << 30) | (*relative_address & 0o7777777777),
            _ => 0,
        }
    }

    #[must_use]
    pub const fn status_word1(&self) -> u64 {
        match self {
            Interrupt::HardwareCheck { address } => address.offset & 0o777777777777,
            Interrupt::AddressingException { level, bdi, .. } => {
                ((*level & 0o7) << 33) | ((*bdi & 0o77777) << 18)
            }
            _ => 0,
        }
    }

    #[must_use]
    pub const fn synchrony(&self) -> Synchrony {
        match self {
            Interrupt::Breakpoint => Synchrony::Pended,
            Interrupt::JumpHistoryFull => Synchrony::Asynchronous,
            _ => Synchrony::Synchronous,
        }
    }

    #[must_use]
    pub const fn is_deferrable(&self) -> bool {
        matches!(
            self,
            Interrupt::Signal { .. }
                | Interrupt::ArithmeticException(_)
                | Interrupt::OperationTrap(_)
                | Interrupt::Breakpoint
                | Interrupt::JumpHistoryFull
        )
    }

    #[must_use]
    pub const fn interrupt_point(&self) -> InterruptPoint {
        match self {
            Interrupt::HardwareDefault
            | Interrupt::HardwareCheck { .. }
            | Interrupt::ReferenceViolation { .. }
            | Interrupt::AddressingException { .. } => InterruptPoint::MidExecution,
            Interrupt::Signal { .. } | Interrupt::Breakpoint | Interrupt::JumpHistoryFull => {
                InterruptPoint::BetweenInstructions
            }
            Interrupt::TestAndSet { .. }
            | Interrupt::InvalidInstruction(_)
            | Interrupt::ArithmeticException(_)
            | Interrupt::OperationTrap(_) => InterruptPoint::Any,
        }
    }

    /// Whether the interrupt may be taken with the engine at `point`.
    #[must_use]
    pub fn may_be_taken_at(&self, point: InstructionPoint) -> bool {
        match (self.interrupt_point(), point) {
            (InterruptPoint::BetweenInstructions, InstructionPoint::BetweenInstructions) => true,
            (InterruptPoint::BetweenInstructions, _) => false,
            (InterruptPoint::MidExecution, InstructionPoint::ResolvingAddress) => false,
            _ => true,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.class().name()
    }
}

impl Display for Interrupt {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "{}({:03o}) SSF:{:03o} ISW0={:012o} ISW1={:012o}",
            self.name(),
            self.class().value(),
            self.short_status(),
            self.status_word0(),
            self.status_word1()
        )
    }
}

impl Error for Interrupt {}

/// Pending interrupts, ordered by class.
#[derive(Debug, Clone, Default)]
pub struct InterruptStack {
    entries: Vec<Interrupt>,
}

impl InterruptStack {
    #[must_use]
    pub fn new() -> InterruptStack {
        InterruptStack::default()
    }

    /// Inserts `interrupt` ahead of every entry of a strictly greater
    /// class, discarding those that are synchronous.
    pub fn post(&mut self, interrupt: Interrupt) {
        let class = interrupt.class();
        match self.entries.iter().position(|e| e.class() > class) {
            Some(pos) => {
                let mut tail = self.entries.split_off(pos);
                tail.retain(|e| e.synchrony() != Synchrony::Synchronous);
                self.entries.push(interrupt);
                self.entries.extend(tail);
            }
            None => self.entries.push(interrupt),
        }
    }

    /// Removes and returns the first entry which may be taken at
    /// `point`, skipping deferrable entries unless `deferrable_enabled`.
    pub fn pop(&mut self, point: InstructionPoint, deferrable_enabled: bool) -> Option<Interrupt> {
        let pos = self
            .entries
            .iter()
            .position(|e| (deferrable_enabled || !e.is_deferrable()) && e.may_be_taken_at(point))?;
        Some(self.entries.remove(pos))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interrupt> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Why an engine stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum StopReason {
    #[default]
    NotStopped,
    Initial,
    Cleared,
    Debug,
    Development,
    Breakpoint,
    HaltJumpExecuted,
    IcsBaseRegisterInvalid,
    IcsOverflow,
    InitiateAutoRecovery,
    L0BaseRegisterInvalid,
    PanelHalt,
    InterruptHandlerHardwareFailure,
    InterruptHandlerOffsetOutOfRange,
    InterruptHandlerInvalidBankType,
    InterruptHandlerInvalidLevelBdi,
}

impl Display for StopReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            StopReason::NotStopped => "not stopped",
            StopReason::Initial => "initial",
            StopReason::Cleared => "cleared",
            StopReason::Debug => "debug",
            StopReason::Development => "development",
            StopReason::Breakpoint => "breakpoint",
            StopReason::HaltJumpExecuted => "halt jump executed",
            StopReason::IcsBaseRegisterInvalid => "ICS base register invalid",
            StopReason::IcsOverflow => "ICS overflow",
            StopReason::InitiateAutoRecovery => "initiate auto-recovery",
            StopReason::L0BaseRegisterInvalid => "level 0 BDT base register invalid",
            StopReason::PanelHalt => "panel halt",
            StopReason::InterruptHandlerHardwareFailure => "interrupt handler hardware failure",
            StopReason::InterruptHandlerOffsetOutOfRange => "interrupt handler offset out of range",
            StopReason::InterruptHandlerInvalidBankType => "interrupt handler bank type invalid",
            StopReason::InterruptHandlerInvalidLevelBdi => "interrupt handler L,BDI invalid",
        })
    }
}

#[cfg(test)]
mod tests {
    use test_strategy::proptest;

    use super::*;

    fn signal(code: u64) -> Interrupt {
        Interrupt::Signal {
            kind: SignalKind::ExecutiveRequest,
            code,
        }
    }

    #[test]
    fn test_display() {
        let i = Interrupt::ReferenceViolation {
            kind: ReferenceViolationKind::WriteAccess,
            fetch: false,
        };
        assert_eq!(
            i.to_string(),
            "Reference Violation(010) SSF:060 ISW0=000000000000 ISW1=000000000000"
        );
        let i = Interrupt::TestAndSet {
            base_register: 12,
            relative_address: 0o1234,
        };
        assert_eq!(
            i.to_string(),
            "Test And Set(015) SSF:000 ISW0=140000001234 ISW1=000000000000"
        );
    }

    #[test]
    fn test_addressing_exception_status() {
        let i = Interrupt::AddressingException {
            kind: AddressingExceptionKind::InvalidSourceLevelBdi,
            level: 2,
            bdi: 0o41,
        };
        assert_eq!(i.short_status(), 3);
        assert_eq!(i.status_word1(), 0o200041_000000);
    }

    #[test]
    fn test_post_discards_lower_priority_synchronous() {
        let mut stack = InterruptStack::new();
        stack.post(Interrupt::OperationTrap(OperationTrapKind::FixedPointBinaryOverflow));
        stack.post(Interrupt::JumpHistoryFull);
        stack.post(Interrupt::InvalidInstruction(InvalidInstructionKind::BadPp));
        let classes: Vec<InterruptClass> = stack.iter().map(Interrupt::class).collect();
        assert_eq!(
            classes,
            vec![InterruptClass::InvalidInstruction, InterruptClass::JumpHistoryFull]
        );
    }

    #[test]
    fn test_pop_honours_instruction_point() {
        let mut stack = InterruptStack::new();
        stack.post(signal(1));
        stack.post(Interrupt::ReferenceViolation {
            kind: ReferenceViolationKind::StorageLimits,
            fetch: false,
        });
        assert_eq!(stack.pop(InstructionPoint::ResolvingAddress, true), None);
        assert_eq!(
            stack.pop(InstructionPoint::MidExecution, true).map(|i| i.class()),
            Some(InterruptClass::ReferenceViolation)
        );
        assert_eq!(stack.pop(InstructionPoint::MidExecution, true), None);
        assert_eq!(stack.pop(InstructionPoint::BetweenInstructions, false), None);
        assert_eq!(stack.pop(InstructionPoint::BetweenInstructions, true), Some(signal(1)));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_equal_class_keeps_posting_order() {
        let mut stack = InterruptStack::new();
        stack.post(signal(1));
        stack.post(signal(2));
        assert_eq!(stack.pop(InstructionPoint::BetweenInstructions, true), Some(signal(1)));
        assert_eq!(stack.pop(InstructionPoint::BetweenInstructions, true), Some(signal(2)));
    }

    fn asynchronous(n: u8) -> Interrupt {
        match n % 3 {
            0 => Interrupt::JumpHistoryFull,
            1 => Interrupt::Breakpoint,
            _ => signal(0),
        }
    }

    #[proptest]
    fn pop_order_follows_class(#[strategy(proptest::collection::vec(0_u8..3, 0..12))] picks: Vec<u8>) {
        let mut stack = InterruptStack::new();
        for &n in &picks {
            stack.post(asynchronous(n));
        }
        let mut previous = InterruptClass::HardwareDefault;
        while let Some(i) = stack.pop(InstructionPoint::BetweenInstructions, true) {
            assert!(i.class() >= previous);
            previous = i.class();
        }
        assert!(stack.is_empty());
    }
}
