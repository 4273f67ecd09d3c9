//! The executive which runs beside the instruction processor, and
//! the pieces shared by the `kexec` and `packprep` programs.
#![crate_name = "kexec"]

pub mod config;
pub mod console;
pub mod exec;
pub mod jumpkeys;
pub mod packprep;

pub use config::{ConfigError, Configuration};
pub use console::StdoutConsole;
pub use exec::{Exec, ExecError, Phase};
pub use jumpkeys::{JumpKeyError, JumpKeys};
