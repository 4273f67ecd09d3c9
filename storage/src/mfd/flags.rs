//! Flag fields of main item sector 0.
use std::fmt::{self, Display, Formatter};
use std::ops::BitOr;

use serde::Serialize;

macro_rules! flag_field {
    ($name:ident, $mask:expr, { $($flag:ident = $value:expr),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
        pub struct $name(u64);

        impl $name {
            $(pub const $flag: $name = $name($value);)+

            pub const NONE: $name = $name(0);

            const NAMES: &'static [(&'static str, u64)] = &[$((stringify!($flag), $value)),+];

            pub const fn from_field(field: u64) -> $name {
                $name(field & $mask)
            }

            pub const fn bits(self) -> u64 {
                self.0
            }

            pub const fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl BitOr for $name {
            type Output = $name;

            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
                let names: Vec<&str> = $name::NAMES
                    .iter()
                    .filter(|(_, value)| self.0 & value == *value)
                    .map(|(name, _)| *name)
                    .collect();
                if names.is_empty() {
                    f.write_str("NONE")
                } else {
                    f.write_str(&names.join("|"))
                }
            }
        }
    };
}

// Each disable condition carries the 040 bit.
flag_field!(DisableFlags, 0o77, {
    DIRECTORY_ERROR = 0o60,
    ASSIGNED_AND_WRITTEN_AT_SYSTEM_STOP = 0o50,
    INACCESSIBLE_BACKUP = 0o44,
    CACHE_DRAIN_FAILURE = 0o42,
});

flag_field!(InhibitFlags, 0o77, {
    GUARDED = 0o40,
    UNLOAD_INHIBITED = 0o20,
    PRIVATE = 0o10,
    ASSIGNED_EXCLUSIVE = 0o4,
    WRITE_ONLY = 0o2,
    READ_ONLY = 0o1,
});

flag_field!(DescriptorFlags, 0o7777, {
    UNLOADED = 0o4000,
    BACKED_UP = 0o2000,
    SAVE_ON_CHECKPOINT = 0o1000,
    TO_BE_CATALOGED = 0o100,
    TAPE_FILE = 0o40,
    REMOVABLE_DISK_FILE = 0o10,
    TO_BE_WRITE_ONLY = 0o4,
    TO_BE_READ_ONLY = 0o2,
    TO_BE_DROPPED = 0o1,
});

/// Granularity and addressing of a mass storage file (PCHAR).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct FileCharacteristics {
    pub position_granularity: bool,
    pub word_addressable: bool,
}

impl FileCharacteristics {
    pub const fn compose(self) -> u64 {
        (if self.position_granularity { 0o40 } else { 0 })
            | (if self.word_addressable { 0o10 } else { 0 })
    }

    pub const fn from_field(field: u64) -> FileCharacteristics {
        FileCharacteristics {
            position_granularity: field & 0o40 != 0,
            word_addressable: field & 0o10 != 0,
        }
    }
}
