//! This crate emulates the instruction processor: the registers and
//! banking model it sees, main storage and its locks, and the engine
//! which decodes and executes instructions and takes interrupts.
#![crate_name = "cpu"]

pub mod access;
pub mod bank;
pub mod clock;
mod control;
pub mod designator;
pub mod history;
pub mod instruction;
pub mod interrupt;
pub mod locks;
pub mod memory;
pub mod registers;
pub mod state;

pub use control::{
    BreakpointKind, BreakpointRegister, Completion, Engine, OperandLocation, ACTIVE_BASE_TABLE_SIZE,
    BASE_REGISTER_COUNT, BDT_BASE_REGISTER, ICS_BASE_REGISTER,
};
pub use interrupt::{Interrupt, InterruptClass, StopReason};
pub use memory::{AbsoluteAddress, MainStorage};
