//! The executive: boots sessions, runs the exec activity on an
//! instruction processor, and writes dumps.
//!
//! A session starts with a boot.  The initial boot (session 0)
//! either initializes mass storage (jump key 13) or recovers it;
//! every later boot recovers it.  The system library files are then
//! cataloged if jump key 4 or 13 is set, and the exec activity runs
//! until the engine stops.  The stop becomes the session's stop code.
//!
//! The exec activity runs in extended mode from L,BDI 0,040.  Its
//! bank descriptor table is at the start of storage segment 0.  An
//! activity which wants to stop the system with a particular code
//! leaves it in A0 and executes a halt jump.
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{event, span, Level};

use base::prelude::*;
use cpu::bank::{BankDescriptor, BaseRegister};
use cpu::clock::DayClock;
use cpu::designator::ProgramAddressRegister;
use cpu::instruction::InstructionWord;
use cpu::locks::StorageLocks;
use cpu::memory::MainStorageError;
use cpu::registers::A0;
use cpu::{AbsoluteAddress, Engine, MainStorage, StopReason, BDT_BASE_REGISTER};
use storage::mfd::MFD_FILENAME;
use storage::{
    Channel, Console, Device, DiskDevice, FixedPack, IoPacket, IoStatus, MfdError, MfdManager,
    NodeId, NodeType, StopCode, TrackRegion,
};

use super::config::{Configuration, LibraryFileSize};
use super::jumpkeys::JumpKeys;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const BDT_OFFSET: u64 = 0;
const EXEC_BANK_OFFSET: u64 = 0o10000;
const EXEC_BDI: u64 = 0o40;
/// First relative address of the exec bank, where the activity starts.
const EXEC_START: u64 = 0o1000;
const EXEC_LIMIT: u64 = 0o7777;
const EXEC_ACTIVITY_ID: u32 = 1;

/// `LA,U A0,0150` then a halt jump to itself: stop with
/// OperatorInitiatedRecovery.
fn builtin_program() -> Vec<Word36> {
    vec![
        InstructionWord::new(0o10, 0o16, 0, 0, 0, 0, 0o150).word(),
        InstructionWord::new(0o74, 0o15, 0o05, 0, 0, 0, EXEC_START + 1).word(),
    ]
}

#[derive(Debug)]
pub enum ExecError {
    Mount {
        path: PathBuf,
        status: IoStatus,
    },
    Attach {
        node_id: NodeId,
        status: IoStatus,
    },
    Storage(MainStorageError),
}

impl Display for ExecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ExecError::Mount { path, status } => {
                write!(f, "failed to mount {}: {status}", path.display())
            }
            ExecError::Attach { node_id, status } => {
                write!(f, "failed to attach {node_id} to the disk channel: {status}")
            }
            ExecError::Storage(e) => write!(f, "failed to set up main storage: {e}"),
        }
    }
}

impl Error for ExecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ExecError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

/// Where the exec is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    Booting,
    Running,
    Stopped,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            Phase::NotStarted => "not started",
            Phase::Booting => "booting",
            Phase::Running => "running",
            Phase::Stopped => "stopped",
        })
    }
}

#[derive(Debug)]
struct Status {
    phase: Phase,
    session: u32,
    stop_code: Option<StopCode>,
    /// The stop code an operator asked for, if any.
    requested: Option<StopCode>,
    engine_dump: Vec<String>,
}

pub struct Exec {
    config: Configuration,
    jump_keys: JumpKeys,
    console: Arc<dyn Console>,
    devices: Vec<Arc<DiskDevice>>,
    fixed_packs: Vec<FixedPack>,
    mfd: MfdManager,
    storage: Arc<MainStorage>,
    locks: Arc<StorageLocks>,
    clock: Arc<DayClock>,
    halt: AtomicBool,
    dumps_written: AtomicU32,
    status: Mutex<Status>,
}

impl Exec {
    /// Mounts the fixed packs, creating missing host files, and sets
    /// up main storage.  Nothing is read from the packs until boot.
    pub fn new(
        config: Configuration,
        jump_keys: JumpKeys,
        console: Arc<dyn Console>,
    ) -> Result<Exec, ExecError> {
        let mut channel = Channel::new(NodeType::Disk);
        let mut devices = Vec::new();
        let mut fixed_packs = Vec::new();
        for (index, pack) in config.fixed_packs.iter().enumerate() {
            let node_id = NodeId(index as u32 + 1);
            let device = Arc::new(DiskDevice::new(&format!("DISK{index}"), config.log_ios));
            let mut packet = IoPacket::mount(node_id, pack.path.clone(), false);
            device.start_io(&mut packet);
            packet.check().map_err(|status| ExecError::Mount {
                path: pack.path.clone(),
                status,
            })?;
            channel
                .attach(node_id, Arc::clone(&device) as Arc<dyn Device>)
                .map_err(|status| ExecError::Attach { node_id, status })?;
            devices.push(device);
            fixed_packs.push(FixedPack {
                node_id,
                pack_name: pack.pack_name.clone(),
                prep_factor: pack.prep_factor.words(),
                track_count: pack.track_count,
            });
        }

        let storage = Arc::new(MainStorage::new());
        storage
            .allocate(0, config.storage_segment_words)
            .map_err(ExecError::Storage)?;
        let mfd = MfdManager::new(Arc::new(channel), config.identity());
        Ok(Exec {
            config,
            jump_keys,
            console,
            devices,
            fixed_packs,
            mfd,
            storage,
            locks: Arc::new(StorageLocks::new()),
            clock: Arc::new(DayClock::new()),
            halt: AtomicBool::new(false),
            dumps_written: AtomicU32::new(0),
            status: Mutex::new(Status {
                phase: Phase::NotStarted,
                session: 0,
                stop_code: None,
                requested: None,
                engine_dump: Vec::new(),
            }),
        })
    }

    fn status(&self) -> std::sync::MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn jump_keys(&self) -> JumpKeys {
        self.jump_keys
    }

    pub fn phase(&self) -> Phase {
        self.status().phase
    }

    pub fn stop_code(&self) -> Option<StopCode> {
        self.status().stop_code
    }

    pub fn mfd(&self) -> &MfdManager {
        &self.mfd
    }

    /// True when a stop ends the run rather than starting a recovery
    /// boot.
    pub fn auto_recovery_inhibited(&self, session: u32) -> bool {
        self.jump_keys.is_set(3)
            || (self.config.auto_recovery_limit != 0
                && session + 1 >= self.config.auto_recovery_limit)
    }

    /// Asks a running exec to stop with `code`.  May be called from
    /// any thread.
    pub fn stop(&self, code: StopCode) {
        event!(Level::WARN, "operator requested stop {code}");
        self.status().requested.get_or_insert(code);
        self.halt.store(true, Ordering::Relaxed);
    }

    /// Runs one session and returns the code it stopped with.
    pub fn boot(&self, session: u32) -> StopCode {
        let span = span!(Level::INFO, "session", session);
        let _enter = span.enter();
        {
            let mut status = self.status();
            status.phase = Phase::Booting;
            status.session = session;
            status.stop_code = None;
            status.requested = None;
        }
        self.halt.store(false, Ordering::Relaxed);
        self.console
            .send_read_only_message(&format!("KEXEC Startup - Version v{VERSION}"));

        let code = match self.start_up(session).and_then(|()| self.run_exec_activity()) {
            Ok(code) | Err(code) => code,
        };
        event!(Level::ERROR, "exec stopped with code {code}");
        {
            let mut status = self.status();
            status.phase = Phase::Stopped;
            status.stop_code = Some(code);
        }
        let verb = if self.auto_recovery_inhibited(session) {
            "Stopping"
        } else {
            "Restarting"
        };
        self.console.send_read_only_message(&format!(
            "{verb} Exec: Status Code {:03o}",
            code.code()
        ));
        code
    }

    fn start_up(&self, session: u32) -> Result<(), StopCode> {
        if self.jump_keys.is_set(1) {
            event!(
                Level::INFO,
                "jump key 1 is set; configuration cannot be modified before boot"
            );
        }
        if session == 0 {
            self.initial_boot()?;
        } else {
            self.recovery_boot()?;
        }

        let qualifier = &self.config.system_qualifier;
        if self.mfd.lookup(qualifier, MFD_FILENAME).is_none() {
            event!(Level::ERROR, "cannot assign {qualifier}*{MFD_FILENAME}");
            return Err(StopCode::FileAssignErrorDuringInit);
        }

        if self.jump_keys.is_set(4) || self.jump_keys.is_set(13) {
            self.load_system_library()?;
        }
        if self.jump_keys.is_set(7) {
            event!(Level::INFO, "jump key 7 is set; TIP is not supported");
        }
        if session == 0 && self.jump_keys.is_set(9) {
            event!(Level::INFO, "jump key 9 is set; there are no queues to recover");
        }
        Ok(())
    }

    fn initial_boot(&self) -> Result<(), StopCode> {
        if self.jump_keys.is_set(13) {
            if !self.jump_keys.is_set(4) {
                self.console
                    .send_read_only_message("Jump key 13 requires jump key 4");
                return Err(StopCode::InitializationSystemConfigurationError);
            }
            self.mfd
                .initialize_mass_storage(&self.fixed_packs, self.console.as_ref())
                .map_err(mass_storage_stop)?;
        } else {
            self.recover_mass_storage()?;
        }
        Ok(())
    }

    fn recovery_boot(&self) -> Result<(), StopCode> {
        if self.jump_keys.is_set(13) {
            self.console
                .send_read_only_message("Jump key 13 is set on recovery boot and will be ignored");
        }
        self.recover_mass_storage()
    }

    fn recover_mass_storage(&self) -> Result<(), StopCode> {
        self.mfd
            .recover_mass_storage(&self.fixed_packs, self.console.as_ref())
            .map(|_| ())
            .map_err(mass_storage_stop)
    }

    /// Catalogs SYS$*LIB$, SYS$*RUN$ and SYS$*RLIB$ with their initial
    /// reserves.  Files which already exist are kept.
    fn load_system_library(&self) -> Result<(), StopCode> {
        let config = &self.config;
        let files = [
            ("LIB$", config.library_file, &config.assign_mnemonic),
            ("RUN$", config.run_file, &config.assign_mnemonic),
            (
                "RLIB$",
                config.relocatable_library_file,
                &config.mass_storage_default_mnemonic,
            ),
        ];
        for (filename, size, mnemonic) in files {
            self.catalog_library_file(filename, size, mnemonic)?;
        }
        Ok(())
    }

    fn catalog_library_file(
        &self,
        filename: &str,
        size: LibraryFileSize,
        mnemonic: &str,
    ) -> Result<(), StopCode> {
        let qualifier = &self.config.system_qualifier;
        let mut request = self.mfd.identity().catalog_request(qualifier, filename);
        request.mnemonic = mnemonic.to_string();
        request.read_key = self.config.system_read_key.clone();
        request.write_key = self.config.system_write_key.clone();
        request.reserve = size.reserve;
        request.max_granules = size.maximum;

        let main_item0 = match self.mfd.catalog_mass_storage_file(&request) {
            Ok(address) => address,
            Err(MfdError::FileAlreadyCataloged { .. }) => {
                event!(Level::INFO, "{qualifier}*{filename} is already cataloged");
                return Ok(());
            }
            Err(e) => {
                event!(Level::ERROR, "cannot catalog {qualifier}*{filename}: {e}");
                return Err(StopCode::FileAssignErrorDuringInit);
            }
        };

        let reserve = TrackRegion::new(0, size.reserve);
        let assign = || -> Result<(), MfdError> {
            self.mfd.load_file_allocations(main_item0)?;
            if size.reserve > 0 {
                self.mfd.allocate_file_tracks(main_item0, reserve)?;
                if self.config.residue_clear {
                    self.mfd.clear_file_tracks(main_item0, reserve)?;
                }
            }
            self.mfd.unload_file_allocations(main_item0)
        };
        assign().map_err(|e| {
            event!(Level::ERROR, "cannot assign {qualifier}*{filename}: {e}");
            StopCode::FileAssignErrorDuringInit
        })?;
        event!(
            Level::INFO,
            "cataloged {qualifier}*{filename} with {} tracks",
            size.reserve
        );
        Ok(())
    }

    fn write_storage(&self, offset: u64, words: &[Word36]) -> Result<(), MainStorageError> {
        for (address, word) in (offset..).zip(words) {
            self.storage.write(AbsoluteAddress::new(0, address), *word)?;
        }
        Ok(())
    }

    /// Loads the exec bank and its bank descriptor, and builds an
    /// engine ready to run it.
    fn prepare_engine(&self) -> Result<Engine, StopCode> {
        let program: Vec<Word36> = if self.config.exec_program.is_empty() {
            builtin_program()
        } else {
            self.config
                .exec_program
                .iter()
                .map(|&w| Word36::masked(w))
                .collect()
        };
        let exec_bank = BankDescriptor::extended(
            AbsoluteAddress::new(0, EXEC_BANK_OFFSET),
            1,
            EXEC_LIMIT,
        );
        let loaded = self
            .write_storage(BDT_OFFSET + EXEC_BDI * 8, &exec_bank.to_words())
            .and_then(|()| self.write_storage(EXEC_BANK_OFFSET, &program));
        if let Err(e) = loaded {
            event!(Level::ERROR, "cannot load the exec bank: {e}");
            return Err(StopCode::InitializationSystemConfigurationError);
        }

        let mut engine = Engine::new(
            "IP0",
            EXEC_ACTIVITY_ID,
            Arc::clone(&self.storage),
            Arc::clone(&self.locks),
            Arc::clone(&self.clock),
        );
        engine.set_logging(self.config.log_instructions, self.config.log_interrupts);
        let bdt = BankDescriptor::extended(AbsoluteAddress::new(0, BDT_OFFSET), 0, EXEC_BANK_OFFSET - 1);
        engine.set_base_register(
            BDT_BASE_REGISTER,
            BaseRegister::from_descriptor(&bdt, self.storage.segment(0)),
        );
        if let Err(interrupt) = engine.load_bank(0, 0, EXEC_BDI, 0) {
            event!(Level::ERROR, "cannot base the exec bank: {interrupt}");
            return Err(StopCode::ExecContingencyHandler);
        }
        engine.asp_mut().par = ProgramAddressRegister::new(0, EXEC_BDI, EXEC_START);
        engine.start();
        Ok(engine)
    }

    fn run_exec_activity(&self) -> Result<StopCode, StopCode> {
        let mut engine = self.prepare_engine()?;
        self.status().phase = Phase::Running;
        let reason = thread::scope(|scope| {
            let running = thread::Builder::new()
                .name("IP0".to_string())
                .spawn_scoped(scope, || engine.run(&self.halt));
            match running {
                Ok(handle) => handle.join().ok(),
                Err(e) => {
                    event!(Level::ERROR, "cannot start the exec activity: {e}");
                    None
                }
            }
        });
        let (_, detail) = engine.stop_reason();
        let mut status = self.status();
        status.engine_dump = engine.dump();
        let code = match reason {
            Some(StopReason::HaltJumpExecuted) => {
                let a0 = engine.grs()[A0].bits();
                u32::try_from(a0)
                    .ok()
                    .and_then(StopCode::from_code)
                    .unwrap_or(StopCode::ExecContingencyHandler)
            }
            Some(StopReason::PanelHalt) => status
                .requested
                .unwrap_or(StopCode::OperatorInitiatedRecovery),
            Some(other) => {
                event!(Level::ERROR, "exec activity stopped: {other} detail {detail}");
                StopCode::ExecContingencyHandler
            }
            None => StopCode::ExecContingencyHandler,
        };
        Ok(code)
    }

    /// Writes a description of the system.  A full dump includes main
    /// storage.
    pub fn dump(&self, full: bool, out: &mut dyn Write) -> io::Result<()> {
        let status = self.status();
        writeln!(out, "KEXEC v{VERSION} {} dump", if full { "full" } else { "partial" })?;
        writeln!(out, "Phase: {}", status.phase)?;
        writeln!(out, "Session: {:03}", status.session)?;
        writeln!(out, "Stopped: {}", status.phase == Phase::Stopped)?;
        match status.stop_code {
            Some(code) => writeln!(out, "Stop Code: {code}")?,
            None => writeln!(out, "Stop Code: none")?,
        }
        writeln!(out, "Jump Keys Set: {}", self.jump_keys)?;

        writeln!(out, "Configuration:")?;
        match toml::to_string(&self.config) {
            Ok(text) => {
                for line in text.lines() {
                    writeln!(out, "  {line}")?;
                }
            }
            Err(e) => writeln!(out, "  unavailable: {e}")?,
        }

        writeln!(out, "Devices:")?;
        for device in &self.devices {
            let file = device
                .host_file()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "not mounted".to_string());
            match (device.pack_name(), device.geometry()) {
                (Some(name), Some(geometry)) => {
                    writeln!(out, "  {} {file}: {name} {geometry}", device.name())?
                }
                _ => writeln!(out, "  {} {file}: not prepped", device.name())?,
            }
        }

        self.mfd.dump(out, "")?;

        writeln!(out, "Storage locks:")?;
        for line in self.locks.dump() {
            writeln!(out, "  {line}")?;
        }
        for line in &status.engine_dump {
            writeln!(out, "{line}")?;
        }
        if full {
            writeln!(out, "Main storage:")?;
            for line in self.storage.dump() {
                writeln!(out, "  {line}")?;
            }
        }
        Ok(())
    }

    /// Dumps to a new file in the dump directory and returns its name.
    pub fn perform_dump(&self, full: bool) -> io::Result<PathBuf> {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let sequence = self.dumps_written.fetch_add(1, Ordering::Relaxed);
        let path = self
            .config
            .dump_directory
            .join(format!("kexec-{seconds}-{sequence:03}.dump"));
        write_dump(self, full, &path)?;
        event!(Level::INFO, "dump written to {}", path.display());
        Ok(path)
    }

    /// Writes any outstanding directory changes.
    pub fn close(&self) -> Result<(), MfdError> {
        if self.phase() == Phase::NotStarted {
            return Ok(());
        }
        self.mfd.flush()
    }
}

fn write_dump(exec: &Exec, full: bool, path: &Path) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    exec.dump(full, &mut out)?;
    out.flush()
}

fn mass_storage_stop(e: MfdError) -> StopCode {
    e.stop_code()
        .unwrap_or(StopCode::ExecRequestForMassStorageFailed)
}

#[cfg(test)]
mod tests;
