//! The instruction processor engine.
//!
//! An [`Engine`] interprets the instruction stream of one activity.
//! Each call to [`Engine::do_cycle`] does one of three things:
//!
//! - fetch the instruction at PAR.PC into F0,
//! - continue an instruction which is part way through resolving an
//!   indirect address (or an EX/EXR target), or
//! - execute the instruction in F0.
//!
//! Instruction handlers report their outcome as
//! `Result<Completion, Interrupt>`.  An interrupt is posted to the
//! pending interrupt stack, from which the run loop later accepts it
//! through the interrupt vector (see `acceptance.rs`).
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{event, span, Level};

use base::prelude::*;

use crate::bank::{ActiveBaseTableEntry, BankDescriptor, BaseRegister, BANK_DESCRIPTOR_WORDS};
use crate::clock::DayClock;
use crate::designator::DesignatorRegister;
use crate::history::JumpHistory;
use crate::instruction::InstructionWord;
use crate::interrupt::{
    AddressingExceptionKind, InstructionPoint, Interrupt, InterruptStack, InvalidInstructionKind,
    StopReason,
};
use crate::locks::{LockOwner, StorageLocks};
use crate::memory::{AbsoluteAddress, MainStorage};
use crate::registers::{GeneralRegisterSet, RegisterSet};
use crate::state::ActivityStatePacket;

/// Unwraps a [`Resolution`] inside an instruction handler, returning
/// `Ok(Completion::Incomplete)` from the handler when the operand
/// services need another cycle.
macro_rules! resolved {
    ($e:expr) => {
        match $e? {
            $crate::control::Resolution::Done(value) => value,
            $crate::control::Resolution::Retry => {
                return Ok($crate::control::Completion::Incomplete);
            }
        }
    };
}

/// As `resolved!`, but for functions which themselves return a
/// [`Resolution`].
macro_rules! or_retry {
    ($e:expr) => {
        match $e? {
            $crate::control::Resolution::Done(value) => value,
            $crate::control::Resolution::Retry => {
                return Ok($crate::control::Resolution::Retry);
            }
        }
    };
}

mod acceptance;
mod dispatch;
mod op_fixed;
mod op_jump;
mod op_load;
mod op_logical;
mod op_shift;
mod op_special;
mod op_state;
mod op_store;
mod operand;


pub use operand::OperandLocation;

/// How far an instruction handler got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The instruction is finished.
    Complete,
    /// F0 holds a new instruction (an indirect reference, or the
    /// target of EX/EXR) and the engine must come back to it.
    Incomplete,
}

/// The result of an operand service which may need the engine to
/// cycle again before it can produce its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution<T> {
    Done(T),
    Retry,
}

pub(crate) type Handler = fn(&mut Engine) -> Result<Completion, Interrupt>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointKind {
    Fetch,
    Read,
    Write,
}

/// Compares storage references against one absolute address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointRegister {
    pub address: AbsoluteAddress,
    /// Stop the engine rather than post a breakpoint interrupt.
    pub halt: bool,
    pub fetch: bool,
    pub read: bool,
    pub write: bool,
}

impl BreakpointRegister {
    fn matches(&self, address: AbsoluteAddress, kind: BreakpointKind) -> bool {
        self.address == address
            && match kind {
                BreakpointKind::Fetch => self.fetch,
                BreakpointKind::Read => self.read,
                BreakpointKind::Write => self.write,
            }
    }
}

pub const BASE_REGISTER_COUNT: usize = 32;
/// The base registers described by the active base table.
pub const ACTIVE_BASE_TABLE_SIZE: usize = 16;
/// Base register 16 + L holds the bank descriptor table of level L.
pub const BDT_BASE_REGISTER: usize = 16;
pub const ICS_BASE_REGISTER: usize = 26;

#[derive(Debug)]
pub struct Engine {
    name: String,
    id: LockOwner,
    storage: Arc<MainStorage>,
    locks: Arc<StorageLocks>,
    clock: Arc<DayClock>,
    asp: ActivityStatePacket,
    grs: GeneralRegisterSet,
    base_registers: [BaseRegister; BASE_REGISTER_COUNT],
    active_base_table: [ActiveBaseTableEntry; ACTIVE_BASE_TABLE_SIZE],
    /// Base register the instruction in F0 was fetched through.
    fetch_base_register: usize,
    pending: InterruptStack,
    jump_history: JumpHistory,
    breakpoint: Option<BreakpointRegister>,
    stop_reason: StopReason,
    stop_detail: Word36,
    prevent_pc_update: bool,
    instruction_point: InstructionPoint,
    /// Index registers incremented by the instruction in F0, with
    /// their values before the increment.
    undo_x: Vec<(usize, Word36)>,
    log_instructions: bool,
    log_interrupts: bool,
}

impl Engine {
    /// Creates an engine.  It starts stopped (with
    /// [`StopReason::Initial`]); call [`Engine::start`] once its
    /// state has been set up.
    #[must_use]
    pub fn new(
        name: &str,
        id: LockOwner,
        storage: Arc<MainStorage>,
        locks: Arc<StorageLocks>,
        clock: Arc<DayClock>,
    ) -> Engine {
        Engine {
            name: name.to_string(),
            id,
            storage,
            locks,
            clock,
            asp: ActivityStatePacket::default(),
            grs: GeneralRegisterSet::new(),
            base_registers: std::array::from_fn(|_| BaseRegister::void()),
            active_base_table: [ActiveBaseTableEntry::default(); ACTIVE_BASE_TABLE_SIZE],
            fetch_base_register: 0,
            pending: InterruptStack::new(),
            jump_history: JumpHistory::new(),
            breakpoint: None,
            stop_reason: StopReason::Initial,
            stop_detail: Word36::ZERO,
            prevent_pc_update: false,
            instruction_point: InstructionPoint::BetweenInstructions,
            undo_x: Vec::new(),
            log_instructions: false,
            log_interrupts: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> LockOwner {
        self.id
    }

    pub fn storage(&self) -> &Arc<MainStorage> {
        &self.storage
    }

    pub fn asp(&self) -> &ActivityStatePacket {
        &self.asp
    }

    pub fn asp_mut(&mut self) -> &mut ActivityStatePacket {
        &mut self.asp
    }

    pub fn designator_register(&self) -> DesignatorRegister {
        self.asp.dr
    }

    pub fn set_designator_register(&mut self, dr: DesignatorRegister) {
        self.asp.dr = dr;
    }

    pub fn grs(&self) -> &GeneralRegisterSet {
        &self.grs
    }

    pub fn grs_mut(&mut self) -> &mut GeneralRegisterSet {
        &mut self.grs
    }

    pub fn base_register(&self, index: usize) -> &BaseRegister {
        &self.base_registers[index % BASE_REGISTER_COUNT]
    }

    pub fn set_base_register(&mut self, index: usize, register: BaseRegister) {
        self.base_registers[index % BASE_REGISTER_COUNT] = register;
    }

    pub fn active_base_table_entry(&self, index: usize) -> ActiveBaseTableEntry {
        self.active_base_table[index % ACTIVE_BASE_TABLE_SIZE]
    }

    pub fn pending_interrupts(&self) -> &InterruptStack {
        &self.pending
    }

    pub fn instruction_point(&self) -> InstructionPoint {
        self.instruction_point
    }

    /// Loads base register `index` with the bank at `level`,`bdi` of
    /// the bank descriptor tables, windowed from `offset`.  Base
    /// registers 0 to 15 also get an active base table entry.
    pub fn load_bank(&mut self, index: usize, level: u64, bdi: u64, offset: u64) -> Result<(), Interrupt> {
        let fatal = Interrupt::AddressingException {
            kind: AddressingExceptionKind::Fatal,
            level,
            bdi,
        };
        let bd = self.find_bank_descriptor(level, bdi).ok_or(fatal)?;
        let segment = self.storage.segment(bd.base.segment);
        let register = if offset == 0 {
            BaseRegister::from_descriptor(&bd, segment)
        } else {
            BaseRegister::subset(&bd, offset, segment)
        };
        event!(
            Level::DEBUG,
            "{}: B{} <- L,BDI {}:{:05o} offset {:o} limits {:o}..{:o}",
            self.name,
            index,
            level,
            bdi,
            offset,
            register.lower,
            register.upper
        );
        self.set_base_register(index, register);
        if index < ACTIVE_BASE_TABLE_SIZE {
            self.active_base_table[index] = ActiveBaseTableEntry { level, bdi, offset };
        }
        Ok(())
    }

    /// Reads the bank descriptor for `level`,`bdi` from the bank
    /// descriptor table based on B16+level.
    fn find_bank_descriptor(&self, level: u64, bdi: u64) -> Option<BankDescriptor> {
        let table = &self.base_registers[BDT_BASE_REGISTER + (level as usize & 0o7)];
        if table.void {
            return None;
        }
        let first = table.lower + bdi * BANK_DESCRIPTOR_WORDS as u64;
        let words: Option<Vec<Word36>> = (0..BANK_DESCRIPTOR_WORDS as u64)
            .map(|n| table.read(first + n))
            .collect();
        BankDescriptor::from_words(&words?).ok()
    }

    pub fn set_program_counter(&mut self, pc: u64, prevent_increment: bool) {
        self.asp.par.set_program_counter(pc);
        self.prevent_pc_update = prevent_increment;
    }

    /// Lets a stopped engine run again.
    pub fn start(&mut self) {
        self.stop_reason = StopReason::NotStopped;
        self.stop_detail = Word36::ZERO;
    }

    pub fn stop(&mut self, reason: StopReason, detail: Word36) {
        event!(
            Level::WARN,
            "{}: stopped: {} detail {:012o} at PC {:06o}",
            self.name,
            reason,
            detail.bits(),
            self.asp.par.program_counter
        );
        self.stop_reason = reason;
        self.stop_detail = detail;
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_reason != StopReason::NotStopped
    }

    pub fn stop_reason(&self) -> (StopReason, Word36) {
        (self.stop_reason, self.stop_detail)
    }

    /// Returns the engine to its power-on state: registers cleared,
    /// base registers void, nothing pending.
    pub fn clear(&mut self) {
        self.asp = ActivityStatePacket::default();
        self.grs.clear();
        self.base_registers = std::array::from_fn(|_| BaseRegister::void());
        self.active_base_table = [ActiveBaseTableEntry::default(); ACTIVE_BASE_TABLE_SIZE];
        self.fetch_base_register = 0;
        self.pending.clear();
        self.jump_history.clear();
        self.breakpoint = None;
        self.prevent_pc_update = false;
        self.instruction_point = InstructionPoint::BetweenInstructions;
        self.undo_x.clear();
        self.locks.release_all(self.id);
        self.stop_reason = StopReason::Cleared;
        self.stop_detail = Word36::ZERO;
    }

    pub fn post_interrupt(&mut self, interrupt: Interrupt) {
        if self.log_interrupts {
            event!(Level::INFO, "{}: posting {}", self.name, interrupt);
        }
        self.pending.post(interrupt);
    }

    /// Returns the jump history oldest first and empties it.
    pub fn take_jump_history(&mut self) -> Vec<u64> {
        self.jump_history.take_entries()
    }

    pub fn set_breakpoint(&mut self, breakpoint: Option<BreakpointRegister>) {
        self.breakpoint = breakpoint;
    }

    pub fn set_logging(&mut self, instructions: bool, interrupts: bool) {
        self.log_instructions = instructions;
        self.log_interrupts = interrupts;
    }

    /// Runs one cycle.  Does nothing while the engine is stopped.
    pub fn do_cycle(&mut self) {
        if self.is_stopped() {
            return;
        }
        if !self.asp.ikr.instruction_in_f0() {
            if let Err(interrupt) = self.fetch_instruction() {
                self.post_interrupt(interrupt);
            }
            return;
        }

        let was_repeating = self.asp.ikr.execute_repeated();
        let mut complete = was_repeating && self.grs[self.r_index(1)].bits() == 0;
        if !complete {
            self.instruction_point = InstructionPoint::MidExecution;
            match self.execute_instruction() {
                Ok(Completion::Complete) => {
                    complete = true;
                    if was_repeating && self.asp.ikr.execute_repeated() {
                        let r1 = self.r_index(1);
                        self.grs[r1] = Word36::masked(self.grs[r1].bits().wrapping_sub(1));
                        // Each repeat is a complete instruction of its own.
                        self.locks.release_all(self.id);
                        self.undo_x.clear();
                        complete = self.prevent_pc_update;
                    }
                }
                Ok(Completion::Incomplete) => (),
                Err(interrupt) => {
                    // A deferrable interrupt describes an instruction which
                    // has done its work; anything else leaves F0 to be
                    // retried once the interrupt has been handled.
                    complete = interrupt.is_deferrable();
                    if !complete {
                        self.instruction_point = InstructionPoint::MidExecution;
                    }
                    self.post_interrupt(interrupt);
                }
            }
        }

        if complete {
            self.complete_instruction();
        }
    }

    /// One step of the run loop: accept an interrupt if one may be
    /// taken now, otherwise run a cycle.
    pub fn step(&mut self) {
        if self.is_stopped() {
            return;
        }
        let deferrable = self.asp.dr.deferrable_interrupt_enabled();
        match self.pending.pop(self.instruction_point, deferrable) {
            Some(interrupt) => self.accept_interrupt(interrupt),
            None => self.do_cycle(),
        }
    }

    /// Runs until the engine stops or `halt` is raised, returning the
    /// reason the engine stopped.
    pub fn run(&mut self, halt: &AtomicBool) -> StopReason {
        let span = span!(Level::INFO, "engine", name = %self.name);
        let _enter = span.enter();
        event!(
            Level::INFO,
            "starting at L,BDI {}:{:05o} PC {:06o}",
            self.asp.par.level,
            self.asp.par.bdi,
            self.asp.par.program_counter
        );
        while !self.is_stopped() {
            if halt.load(Ordering::Relaxed) {
                self.stop(StopReason::PanelHalt, Word36::ZERO);
                break;
            }
            self.step();
        }
        self.stop_reason
    }

    fn complete_instruction(&mut self) {
        self.instruction_point = InstructionPoint::BetweenInstructions;
        self.locks.release_all(self.id);
        self.asp.ikr.set_instruction_in_f0(false);
        self.asp.ikr.set_execute_repeated(false);
        if !self.prevent_pc_update {
            let pc = self.asp.par.program_counter + 1;
            self.asp.par.set_program_counter(pc);
        }
        self.undo_x.clear();
    }

    fn fetch_instruction(&mut self) -> Result<(), Interrupt> {
        let dr = self.asp.dr;
        let pc = self.asp.par.program_counter;
        let limits = Interrupt::ReferenceViolation {
            kind: crate::interrupt::ReferenceViolationKind::StorageLimits,
            fetch: true,
        };
        let brx = if dr.basic_mode() {
            self.find_basic_mode_bank(pc).ok_or(limits)?
        } else {
            0
        };
        if pc < 0o200 {
            // The GRS cannot be executed.
            return Err(limits);
        }
        let br = &self.base_registers[brx];
        br.check_limits(pc, true)?;
        if dr.basic_mode() && !br.effective_permissions(self.asp.ikr.access_key()).enter {
            return Err(Interrupt::ReferenceViolation {
                kind: crate::interrupt::ReferenceViolationKind::ReadAccess,
                fetch: true,
            });
        }
        let word = self.read_storage(brx, pc, BreakpointKind::Fetch)?;

        self.asp.current_instruction = InstructionWord::from_word(word);
        self.asp.ikr.set_instruction_in_f0(true);
        self.asp.ikr.set_execute_repeated(false);
        self.fetch_base_register = brx;
        self.prevent_pc_update = false;
        self.undo_x.clear();
        Ok(())
    }

    fn execute_instruction(&mut self) -> Result<Completion, Interrupt> {
        let iw = self.asp.current_instruction;
        let handler = dispatch::lookup(iw, self.asp.dr.basic_mode()).ok_or(
            Interrupt::InvalidInstruction(InvalidInstructionKind::BadFunctionCode),
        )?;
        if self.log_instructions {
            event!(
                Level::TRACE,
                "{}: {:06o} {:012o} {}",
                self.name,
                self.asp.par.program_counter,
                iw.word().bits(),
                iw
            );
        }
        handler(self)
    }

    /// A multi-line description of the engine state.
    pub fn dump(&self) -> Vec<String> {
        let mut lines = vec![format!("Engine {} (id {})", self.name, self.id)];
        lines.push(format!("  Stop: {} detail {}", self.stop_reason, self.stop_detail));
        lines.push(format!(
            "  PAR L:{:o} BDI:{:05o} PC:{:06o}",
            self.asp.par.level, self.asp.par.bdi, self.asp.par.program_counter
        ));
        lines.push(format!("  DR  {}", self.asp.dr.word()));
        lines.push(format!("  IKR {}", self.asp.ikr.word()));
        if self.asp.ikr.instruction_in_f0() {
            lines.push(format!("  F0  {} ({})", self.asp.current_instruction.word(), self.asp.current_instruction));
        } else {
            lines.push("  F0  invalid".to_string());
        }
        for interrupt in self.pending.iter() {
            lines.push(format!("  Pending {interrupt}"));
        }
        lines.extend(self.grs.dump().into_iter().map(|line| format!("  {line}")));
        for (n, br) in self.base_registers.iter().enumerate().filter(|(_, br)| !br.void) {
            lines.push(format!(
                "  B{:<2} base {} limits {:o}..{:o} lock {} GAP {:o} SAP {:o}",
                n,
                br.base,
                br.lower,
                br.upper,
                br.lock,
                br.general.bits(),
                br.special.bits()
            ));
        }
        lines.push(format!("  Jump history: {} entries", self.jump_history.len()));
        lines
    }

    // Register helpers.  The a, x and r fields of F0 select registers
    // from the set chosen by DB17.

    fn register_set(&self) -> RegisterSet {
        self.asp.dr.register_set()
    }

    fn a_index(&self, offset: u64) -> usize {
        self.register_set().a((self.asp.current_instruction.a() + offset) as usize)
    }

    fn x_index(&self, n: u64) -> usize {
        self.register_set().x(n as usize)
    }

    fn r_index(&self, n: u64) -> usize {
        self.register_set().r(n as usize)
    }

    fn a_reg(&self, offset: u64) -> Word36 {
        self.grs[self.a_index(offset)]
    }

    fn set_a_reg(&mut self, offset: u64, value: Word36) {
        let ix = self.a_index(offset);
        self.grs[ix] = value;
    }

    fn xa_index(&self) -> usize {
        self.x_index(self.asp.current_instruction.a())
    }

    fn ra_index(&self) -> usize {
        self.r_index(self.asp.current_instruction.a())
    }

    fn check_privilege(&self, max_pp: u64) -> Result<(), Interrupt> {
        if self.asp.dr.processor_privilege() > max_pp {
            Err(Interrupt::InvalidInstruction(InvalidInstructionKind::BadPp))
        } else {
            Ok(())
        }
    }
}
