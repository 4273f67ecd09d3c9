use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;

use clap::ArgAction::Set;
use clap::Parser;
use tracing::{event, span, Level};
use tracing_subscriber::prelude::*;

use kexec::jumpkeys::JumpKeys;
use kexec::{ConfigError, Configuration, Exec, ExecError, StdoutConsole};

/// Runs the executive on an emulated 36-bit mainframe.
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None, after_help = JumpKeys::help())]
struct Cli {
    /// TOML file overriding the built-in configuration.
    #[clap(action = Set, short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Comma-separated jump keys to set, each from 1 to 36.
    #[clap(action = Set, short = 'j', long = "jump-keys", default_value = "")]
    jump_keys: JumpKeys,
}

#[derive(Debug)]
enum Fail {
    Config(ConfigError),
    Exec(ExecError),
    InitialisationFailure(String),
}

impl Display for Fail {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Fail::Config(e) => write!(f, "Error in configuration file: {e}"),
            Fail::Exec(e) => write!(f, "::Cannot continue - error in exec initialization\n::{e}"),
            Fail::InitialisationFailure(msg) => f.write_str(msg.as_str()),
        }
    }
}

impl Error for Fail {}

fn init_tracing() -> Result<(), Fail> {
    // RUST_LOG selects which trace messages get printed.
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let filter_layer = match tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
    {
        Err(e) => {
            return Err(Fail::InitialisationFailure(format!(
                "failed to initialise tracing filter (perhaps there is a problem with environment variables): {e}"
            )));
        }
        Ok(layer) => layer,
    };
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
    Ok(())
}

fn dump(exec: &Exec, console: &StdoutConsole) {
    match exec.perform_dump(exec.jump_keys().is_set(6)) {
        Ok(path) => console.announce(&format!("::Dump written to file {}", path.display())),
        Err(e) => console.announce(&format!("::Error producing dump file: {e}")),
    }
}

fn run_kexec(cli: Cli) -> Result<(), Fail> {
    init_tracing()?;
    let config = match &cli.config {
        Some(path) => Configuration::from_file(path).map_err(Fail::Config)?,
        None => Configuration::default(),
    };
    let console = Arc::new(StdoutConsole::new(config.log_console_messages));
    let exec = Exec::new(config, cli.jump_keys, console.clone()).map_err(Fail::Exec)?;

    let span = span!(Level::INFO, "kexec", jump_keys = %cli.jump_keys);
    let _enter = span.enter();
    let mut session: u32 = 0;
    loop {
        if cli.jump_keys.is_set(2) {
            console.announce("::Performing pre-boot system dump...");
            dump(&exec, &console);
        }

        console.announce(&format!("::Starting KEXEC session {session:03}..."));
        let stop_code = exec.boot(session);
        console.announce(&format!(
            "::System error {:03o} terminated session {session:03}",
            stop_code.code()
        ));
        if exec.auto_recovery_inhibited(session) {
            console.announce("::Auto-recovery inhibited - producing final post-mortem dump...");
            dump(&exec, &console);
            break;
        }
        console.announce("::Recovering system...");
        session += 1;
    }

    if let Err(e) = exec.close() {
        event!(Level::ERROR, "failed to flush the directory: {e}");
    }
    Ok(())
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version requests are not failures.
            let code = if e.use_stderr() { 1 } else { 0 };
            if let Err(print_error) = e.print() {
                eprintln!("{print_error}");
            }
            std::process::exit(code);
        }
    };
    match run_kexec(cli) {
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
        Ok(()) => {
            std::process::exit(0);
        }
    }
}
