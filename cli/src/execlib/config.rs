//! Exec configuration.
//!
//! Every setting has a built-in default.  A TOML file given with `-c`
//! overrides whichever settings it names.
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use storage::geometry::{validate_pack_name, validate_track_count, GeometryError};
use storage::{PrepFactor, SystemIdentity, TrackCount};

/// The smallest storage segment which holds the bank descriptor table
/// and the exec bank.
pub const MINIMUM_SEGMENT_WORDS: usize = 0o20000;

/// The exec bank spans relative addresses 01000 to 07777.
pub const MAXIMUM_PROGRAM_WORDS: usize = 0o7000;

#[derive(Debug)]
pub enum ConfigError {
    Read(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Pack { index: usize, error: GeometryError },
    DuplicatePackName(String),
    NoFixedPacks,
    SegmentTooSmall(usize),
    BadMnemonic(String),
    BadIdentifier { field: &'static str, value: String },
    LimitBelowReserve { file: &'static str, reserve: u64, maximum: u64 },
    ProgramTooLong(usize),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ConfigError::Read(path, e) => {
                write!(f, "failed to read configuration {}: {e}", path.display())
            }
            ConfigError::Parse(path, e) => {
                write!(f, "failed to parse configuration {}: {e}", path.display())
            }
            ConfigError::Pack { index, error } => write!(f, "fixed pack {index}: {error}"),
            ConfigError::DuplicatePackName(name) => {
                write!(f, "more than one fixed pack is named {name}")
            }
            ConfigError::NoFixedPacks => f.write_str("no fixed packs are configured"),
            ConfigError::SegmentTooSmall(words) => write!(
                f,
                "storage segment of {words:o} words is smaller than the minimum of {MINIMUM_SEGMENT_WORDS:o}"
            ),
            ConfigError::BadMnemonic(m) => {
                write!(f, "equipment mnemonic '{m}' must be 1 to 6 characters")
            }
            ConfigError::BadIdentifier { field, value } => {
                write!(f, "{field} '{value}' must be 1 to 12 characters")
            }
            ConfigError::LimitBelowReserve {
                file,
                reserve,
                maximum,
            } => write!(
                f,
                "{file}: maximum of {maximum} granules is less than the reserve of {reserve}"
            ),
            ConfigError::ProgramTooLong(words) => write!(
                f,
                "exec program of {words:o} words does not fit in the {MAXIMUM_PROGRAM_WORDS:o} word exec bank"
            ),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Read(_, e) => Some(e),
            ConfigError::Parse(_, e) => Some(e),
            ConfigError::Pack { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// One pack of the fixed pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedPackConfig {
    /// Host file holding the pack image.  Relative paths are taken
    /// relative to the working directory.
    pub path: PathBuf,
    pub pack_name: String,
    /// Used only when the pack has to be prepped.
    pub prep_factor: PrepFactor,
    pub track_count: TrackCount,
}

/// Reserve and maximum size, in granules, of a system library file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryFileSize {
    pub reserve: u64,
    pub maximum: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub master_account_id: String,
    pub system_qualifier: String,
    pub system_project_id: String,
    pub system_account_id: String,
    pub system_read_key: String,
    pub system_write_key: String,
    pub mass_storage_default_mnemonic: String,
    pub max_granules: u64,
    /// The mnemonic the system library files are cataloged with.
    pub assign_mnemonic: String,
    /// Zero the tracks of library files when they are cataloged.
    pub residue_clear: bool,
    pub log_ios: bool,
    pub log_instructions: bool,
    pub log_interrupts: bool,
    pub log_console_messages: bool,
    pub fixed_packs: Vec<FixedPackConfig>,
    pub storage_segment_words: usize,
    pub library_file: LibraryFileSize,
    pub run_file: LibraryFileSize,
    pub relocatable_library_file: LibraryFileSize,
    /// Words loaded at the start of the exec bank.  When empty, the
    /// exec runs its built-in program.
    pub exec_program: Vec<u64>,
    /// Sessions after which the exec stops instead of recovering.
    pub auto_recovery_limit: u32,
    /// Where dump files are written.
    pub dump_directory: PathBuf,
}

impl Default for Configuration {
    fn default() -> Configuration {
        Configuration {
            master_account_id: "SYSTEM".to_string(),
            system_qualifier: "SYS$".to_string(),
            system_project_id: "EXEC-8".to_string(),
            system_account_id: "SYSTEM".to_string(),
            system_read_key: String::new(),
            system_write_key: String::new(),
            mass_storage_default_mnemonic: "F".to_string(),
            max_granules: 256,
            assign_mnemonic: "F".to_string(),
            residue_clear: true,
            log_ios: true,
            log_instructions: false,
            log_interrupts: true,
            log_console_messages: true,
            fixed_packs: vec![FixedPackConfig {
                path: PathBuf::from("fix000.pack"),
                pack_name: "FIX000".to_string(),
                prep_factor: PrepFactor::WHOLE_TRACK,
                track_count: 10_000,
            }],
            storage_segment_words: 0o100000,
            library_file: LibraryFileSize {
                reserve: 128,
                maximum: 9999,
            },
            run_file: LibraryFileSize {
                reserve: 10,
                maximum: 256,
            },
            relocatable_library_file: LibraryFileSize {
                reserve: 128,
                maximum: 9999,
            },
            exec_program: Vec::new(),
            auto_recovery_limit: 3,
            dump_directory: PathBuf::from("."),
        }
    }
}

fn check_identifier(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() || value.len() > 12 {
        Err(ConfigError::BadIdentifier {
            field,
            value: value.to_string(),
        })
    } else {
        Ok(())
    }
}

impl Configuration {
    /// Reads overrides from a TOML file.  The result is validated.
    pub fn from_file(path: &Path) -> Result<Configuration, ConfigError> {
        let text =
            fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        Configuration::from_toml(&text).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    pub fn from_toml(text: &str) -> Result<Configuration, ConfigError> {
        let config: Configuration =
            toml::from_str(text).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fixed_packs.is_empty() {
            return Err(ConfigError::NoFixedPacks);
        }
        for (index, pack) in self.fixed_packs.iter().enumerate() {
            validate_pack_name(&pack.pack_name)
                .and_then(|()| validate_track_count(pack.track_count))
                .map_err(|error| ConfigError::Pack { index, error })?;
            if self.fixed_packs[..index]
                .iter()
                .any(|other| other.pack_name == pack.pack_name)
            {
                return Err(ConfigError::DuplicatePackName(pack.pack_name.clone()));
            }
        }
        if self.storage_segment_words < MINIMUM_SEGMENT_WORDS {
            return Err(ConfigError::SegmentTooSmall(self.storage_segment_words));
        }
        for mnemonic in [&self.mass_storage_default_mnemonic, &self.assign_mnemonic] {
            if mnemonic.is_empty() || mnemonic.len() > 6 {
                return Err(ConfigError::BadMnemonic(mnemonic.clone()));
            }
        }
        check_identifier("master_account_id", &self.master_account_id)?;
        check_identifier("system_qualifier", &self.system_qualifier)?;
        check_identifier("system_project_id", &self.system_project_id)?;
        check_identifier("system_account_id", &self.system_account_id)?;
        for (file, size) in [
            ("LIB$", self.library_file),
            ("RUN$", self.run_file),
            ("RLIB$", self.relocatable_library_file),
        ] {
            if size.maximum < size.reserve {
                return Err(ConfigError::LimitBelowReserve {
                    file,
                    reserve: size.reserve,
                    maximum: size.maximum,
                });
            }
        }
        if self.exec_program.len() > MAXIMUM_PROGRAM_WORDS {
            return Err(ConfigError::ProgramTooLong(self.exec_program.len()));
        }
        Ok(())
    }

    /// The names under which the exec catalogs its own files.
    pub fn identity(&self) -> SystemIdentity {
        SystemIdentity {
            qualifier: self.system_qualifier.clone(),
            project_id: self.system_project_id.clone(),
            account_id: self.system_account_id.clone(),
            mnemonic: self.mass_storage_default_mnemonic.clone(),
            max_granules: self.max_granules,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Configuration::default();
        assert_eq!(config.validate().map_err(|e| e.to_string()), Ok(()));
        assert_eq!(config.mass_storage_default_mnemonic, "F");
        assert_eq!(config.max_granules, 256);
        assert!(config.residue_clear);
        let identity = config.identity();
        assert_eq!(identity.qualifier, "SYS$");
        assert_eq!(identity.account_id, "SYSTEM");
    }

    #[test]
    fn test_overrides_keep_other_defaults() {
        let config = Configuration::from_toml(
            r#"
            max_granules = 512
            log_ios = false

            [[fixed_packs]]
            path = "a.pack"
            pack_name = "FIXA"
            prep_factor = 28
            track_count = 10000

            [[fixed_packs]]
            path = "b.pack"
            pack_name = "FIXB"
            prep_factor = 112
            track_count = 20000
            "#,
        )
        .expect("configuration should be accepted");
        assert_eq!(config.max_granules, 512);
        assert!(!config.log_ios);
        assert_eq!(config.fixed_packs.len(), 2);
        assert_eq!(config.fixed_packs[1].prep_factor.words(), 112);
        assert_eq!(config.system_qualifier, "SYS$");
        assert_eq!(config.auto_recovery_limit, 3);
    }

    #[test]
    fn test_bad_prep_factor_is_a_parse_error() {
        let result = Configuration::from_toml(
            r#"
            [[fixed_packs]]
            path = "a.pack"
            pack_name = "FIXA"
            prep_factor = 100
            track_count = 10000
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_, _))));
    }

    #[test]
    fn test_validation() {
        let mut config = Configuration::default();
        config.fixed_packs[0].track_count = 9999;
        assert!(matches!(config.validate(), Err(ConfigError::Pack { index: 0, .. })));

        let mut config = Configuration::default();
        let mut second = config.fixed_packs[0].clone();
        second.path = PathBuf::from("other.pack");
        config.fixed_packs.push(second);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicatePackName(name)) if name == "FIX000"
        ));

        let mut config = Configuration::default();
        config.fixed_packs.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoFixedPacks)));

        let mut config = Configuration::default();
        config.storage_segment_words = 0o1000;
        assert!(matches!(config.validate(), Err(ConfigError::SegmentTooSmall(0o1000))));

        let mut config = Configuration::default();
        config.run_file.maximum = 5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LimitBelowReserve { file: "RUN$", .. })
        ));

        let mut config = Configuration::default();
        config.exec_program = vec![0; MAXIMUM_PROGRAM_WORDS + 1];
        assert!(matches!(config.validate(), Err(ConfigError::ProgramTooLong(_))));
    }

    #[test]
    fn test_unreadable_file() {
        let dir = tempfile::tempdir().expect("temporary directory");
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            Configuration::from_file(&missing),
            Err(ConfigError::Read(path, _)) if path == missing
        ));
    }
}
