use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use cpu::instruction::InstructionWord;
use storage::{RecordingConsole, StopCode};

use super::{Exec, Phase};
use crate::config::{Configuration, FixedPackConfig, LibraryFileSize};
use crate::jumpkeys::JumpKeys;

const AVAILABLE: u64 = 9_996;

fn config(dir: &TempDir) -> Configuration {
    let mut config = Configuration::default();
    config.fixed_packs = vec![FixedPackConfig {
        path: dir.path().join("fix000.pack"),
        pack_name: "FIX000".to_string(),
        prep_factor: storage::PrepFactor::WHOLE_TRACK,
        track_count: 10_000,
    }];
    config.library_file = LibraryFileSize {
        reserve: 4,
        maximum: 100,
    };
    config.run_file = LibraryFileSize {
        reserve: 2,
        maximum: 100,
    };
    config.relocatable_library_file = LibraryFileSize {
        reserve: 4,
        maximum: 100,
    };
    config.log_ios = false;
    config.dump_directory = dir.path().to_path_buf();
    config
}

fn exec_with(config: Configuration, keys: &str) -> (Exec, Arc<RecordingConsole>) {
    let console = Arc::new(RecordingConsole::new());
    let exec = Exec::new(
        config,
        keys.parse::<JumpKeys>().expect("valid jump keys"),
        console.clone(),
    )
    .expect("exec should start");
    (exec, console)
}

fn program(words: &[InstructionWord]) -> Vec<u64> {
    words.iter().map(|iw| iw.word().bits()).collect()
}

/// `LA,U A0,code` then a halt jump.
fn halt_with(code: u64) -> Vec<u64> {
    program(&[
        InstructionWord::new(0o10, 0o16, 0, 0, 0, 0, code),
        InstructionWord::new(0o74, 0o15, 0o05, 0, 0, 0, 0o1001),
    ])
}

#[test]
fn test_initial_boot_initializes_mass_storage() {
    let dir = TempDir::new().expect("temporary directory");
    let (exec, console) = exec_with(config(&dir), "4,13");
    assert_eq!(exec.phase(), Phase::NotStarted);

    assert_eq!(exec.boot(0), StopCode::OperatorInitiatedRecovery);
    assert_eq!(exec.phase(), Phase::Stopped);
    assert_eq!(exec.stop_code(), Some(StopCode::OperatorInitiatedRecovery));

    let messages = console.messages();
    assert_eq!(
        messages.first().map(String::as_str),
        Some(format!("KEXEC Startup - Version v{}", super::VERSION).as_str())
    );
    assert!(messages.contains(&format!("MS Initialized - {AVAILABLE} Tracks Available")));
    assert_eq!(
        messages.last().map(String::as_str),
        Some("Restarting Exec: Status Code 150")
    );

    let mfd = exec.mfd();
    for filename in ["MFD$$", "LIB$", "RUN$", "RLIB$"] {
        assert!(mfd.lookup("SYS$", filename).is_some(), "{filename} is cataloged");
    }
    assert_eq!(mfd.free_track_count(), AVAILABLE - 10);
    exec.close().expect("directory flushes");
}

#[test]
fn test_jump_key_13_requires_jump_key_4() {
    let dir = TempDir::new().expect("temporary directory");
    let (exec, console) = exec_with(config(&dir), "13");
    assert_eq!(exec.boot(0), StopCode::InitializationSystemConfigurationError);
    assert!(console
        .messages()
        .contains(&"Jump key 13 requires jump key 4".to_string()));
}

#[test]
fn test_recovery_boot_keeps_the_library() {
    let dir = TempDir::new().expect("temporary directory");
    let (exec, console) = exec_with(config(&dir), "4,13");
    assert_eq!(exec.boot(0), StopCode::OperatorInitiatedRecovery);
    let lib = exec.mfd().lookup("SYS$", "LIB$");

    assert_eq!(exec.boot(1), StopCode::OperatorInitiatedRecovery);
    let messages = console.messages();
    assert!(messages
        .contains(&"Jump key 13 is set on recovery boot and will be ignored".to_string()));
    assert!(messages.contains(&format!("MS Recovered - {} Tracks Available", AVAILABLE - 10)));
    assert_eq!(exec.mfd().lookup("SYS$", "LIB$"), lib);
    assert_eq!(exec.mfd().free_track_count(), AVAILABLE - 10);
}

#[test]
fn test_recovery_of_a_new_pack_fails() {
    let dir = TempDir::new().expect("temporary directory");
    let (exec, console) = exec_with(config(&dir), "");
    assert_eq!(exec.boot(0), StopCode::InternalExecIOFailed);
    assert_eq!(
        console.messages().last().map(String::as_str),
        Some("Restarting Exec: Status Code 040")
    );
}

#[test]
fn test_a0_selects_the_stop_code() {
    let dir = TempDir::new().expect("temporary directory");
    let mut config = config(&dir);
    config.exec_program = halt_with(0o151);
    let (exec, _) = exec_with(config, "3,4,13");
    assert_eq!(exec.boot(0), StopCode::DirectoryErrors);

    let dir = TempDir::new().expect("temporary directory");
    let mut config = self::config(&dir);
    config.exec_program = halt_with(0o2);
    let (exec, console) = exec_with(config, "3,4,13");
    assert_eq!(exec.boot(0), StopCode::ExecContingencyHandler);
    assert_eq!(
        console.messages().last().map(String::as_str),
        Some("Stopping Exec: Status Code 103")
    );
}

#[test]
fn test_fault_without_interrupt_handling_is_a_contingency() {
    let dir = TempDir::new().expect("temporary directory");
    let mut config = config(&dir);
    config.exec_program = vec![0];
    let (exec, _) = exec_with(config, "4,13");
    assert_eq!(exec.boot(0), StopCode::ExecContingencyHandler);
}

#[test]
fn test_operator_stop() {
    let dir = TempDir::new().expect("temporary directory");
    let mut config = config(&dir);
    // J 01000: loop until stopped.
    config.exec_program = program(&[InstructionWord::new(0o74, 0o15, 0o04, 0, 0, 0, 0o1000)]);
    let (exec, _) = exec_with(config, "4,13");
    let code = thread::scope(|scope| {
        let session = scope.spawn(|| exec.boot(0));
        while exec.phase() != Phase::Running {
            thread::sleep(Duration::from_millis(1));
        }
        exec.stop(StopCode::ResourceReleaseFailure);
        session.join().expect("boot thread should not panic")
    });
    assert_eq!(code, StopCode::ResourceReleaseFailure);
}

#[test]
fn test_auto_recovery_limit() {
    let dir = TempDir::new().expect("temporary directory");
    let (exec, _) = exec_with(config(&dir), "");
    assert!(!exec.auto_recovery_inhibited(0));
    assert!(!exec.auto_recovery_inhibited(1));
    assert!(exec.auto_recovery_inhibited(2));

    let mut unlimited = config(&dir);
    unlimited.auto_recovery_limit = 0;
    let (exec, _) = exec_with(unlimited, "");
    assert!(!exec.auto_recovery_inhibited(100));

    let (exec, _) = exec_with(config(&dir), "3");
    assert!(exec.auto_recovery_inhibited(0));
}

#[test]
fn test_dumps() {
    let dir = TempDir::new().expect("temporary directory");
    let (exec, _) = exec_with(config(&dir), "4,6,13");

    let before = exec.perform_dump(false).expect("dump is written");
    let text = fs::read_to_string(&before).expect("dump is readable");
    assert!(text.contains("Phase: not started"));
    assert!(text.contains("Stop Code: none"));
    assert!(text.contains("not prepped"));

    exec.boot(0);
    let partial = exec.perform_dump(false).expect("dump is written");
    let full = exec.perform_dump(true).expect("dump is written");
    assert_ne!(partial, full);
    let text = fs::read_to_string(&partial).expect("dump is readable");
    assert!(text.contains("Stop Code: 150 (OperatorInitiatedRecovery)"));
    assert!(text.contains("Jump Keys Set: 4,6,13"));
    assert!(text.contains("FIX000"));
    assert!(text.contains("Engine IP0"));
    assert!(!text.contains("Main storage:"));
    let text = fs::read_to_string(&full).expect("dump is readable");
    assert!(text.contains("Main storage:"));
}
