use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use clap::ArgAction::Set;
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;

use kexec::packprep::{prep, show, PackPrepError, PrepRequest};

/// Prepares disk pack images and describes their contents
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prep a pack, creating its file if need be.
    Prep {
        #[clap(action = Set)]
        file: PathBuf,
        /// 1 to 6 characters, alphabetic then alphanumeric.
        #[clap(action = Set)]
        pack_name: String,
        /// Words per block: 28, 56, 112, 224, 448, 896 or 1792.
        #[clap(action = Set)]
        prep_factor: String,
        /// At least 10000.
        #[clap(action = Set)]
        track_count: String,
        /// REM to prep a removable pack.
        #[clap(action = Set)]
        removable: Option<String>,
    },
    /// Show the label and initial directory of a pack.
    Show {
        #[clap(action = Set)]
        file: PathBuf,
    },
}

#[derive(Debug)]
enum Fail {
    Pack(PackPrepError),
    InitialisationFailure(String),
}

impl Display for Fail {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Fail::Pack(e) => e.fmt(f),
            Fail::InitialisationFailure(msg) => f.write_str(msg.as_str()),
        }
    }
}

impl Error for Fail {}

fn run_packprep() -> Result<(), Fail> {
    let cli = Cli::parse();

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let filter_layer = match tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("warn"))
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

    let lines = match cli.command {
        Command::Prep {
            file,
            pack_name,
            prep_factor,
            track_count,
            removable,
        } => {
            let request =
                PrepRequest::parse(&pack_name, &prep_factor, &track_count, removable.as_deref())
                    .map_err(Fail::Pack)?;
            prep(&file, &request).map_err(Fail::Pack)?
        }
        Command::Show { file } => show(&file).map_err(Fail::Pack)?,
    };
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

fn main() {
    match run_packprep() {
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
        Ok(()) => {
            std::process::exit(0);
        }
    }
}
