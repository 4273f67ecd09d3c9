//! The master file directory (MFD).
//!
//! The directory lives in MFD tracks spread across the fixed packs.
//! It is itself a file, SYS$*MFD$$, whose file-relative track
//! `(ldat << 12) | n` is MFD track `n` of the pack with that LDAT.
//! Every ninth MFD track of a pack starts with a DAS, which records
//! where its group of tracks lives on the pack and which of their
//! sectors are in use.
//!
//! ## DAS sector
//!
//! | Word     | Contents                                              |
//! | -------- | ----------------------------------------------------- |
//! | 000      | Device word address of this track; S1 03 (fixed)      |
//! | 001-002  | Sector bitmap of this track, bit 35 of 001 first      |
//! | 3k       | Device word address of the k-th track of the group    |
//! | 3k+1, +2 | Its sector bitmap                                     |
//! | 033      | Device word address of the next DAS, or no link       |
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use crate::freespace::FreeSpaceError;
use crate::layout::LabelError;
use crate::packet::{IoStatus, NodeId};
use crate::stop::StopCode;
use crate::types::{LdatIndex, TrackCount, TrackRegion};

mod address;
mod cache;
mod flags;
mod items;
mod manager;

#[cfg(test)]
mod tests;

pub use address::{MfdRelativeAddress, TRACKS_PER_DAS};
pub use cache::MfdCache;
pub use flags::{DescriptorFlags, DisableFlags, FileCharacteristics, InhibitFlags};
pub use items::{CatalogRequest, DadEntry, DadItem, LeadItem, MainItem};
pub use manager::{FixedPack, MfdManager, SystemIdentity, MFD_FILENAME};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MfdError {
    NoFixedPacks,
    PackNameConflict(String),
    PrepRejected { node_id: NodeId, status: IoStatus },
    Io { node_id: NodeId, status: IoStatus },
    BadLabel { node_id: NodeId, error: LabelError },
    UninitializedPack(NodeId),
    UnknownLdat(LdatIndex),
    NoDirectorySpace,
    OutOfSpace { requested: TrackCount },
    SectorNotCached(MfdRelativeAddress),
    DasNotFound(MfdRelativeAddress),
    SectorNotAllocated(MfdRelativeAddress),
    TrackNotAllocated(LdatIndex, TrackRegion),
    FreeSpace(LdatIndex, FreeSpaceError),
    NotMainItem(MfdRelativeAddress),
    AllocationsAlreadyLoaded(MfdRelativeAddress),
    AllocationsNotLoaded(MfdRelativeAddress),
    FileAlreadyCataloged { qualifier: String, filename: String },
    DirectoryCorrupt(String),
}

impl MfdError {
    /// The code the exec stops with when this error occurs, or `None`
    /// for errors which are reported to the requester instead.
    pub fn stop_code(&self) -> Option<StopCode> {
        match self {
            MfdError::Io { .. } => Some(StopCode::InternalExecIOFailed),
            MfdError::NoFixedPacks | MfdError::PrepRejected { .. } | MfdError::BadLabel { .. } => {
                Some(StopCode::InitializationSystemConfigurationError)
            }
            MfdError::UnknownLdat(_) => Some(StopCode::InvalidLDAT),
            MfdError::NoDirectorySpace => Some(StopCode::ExecRequestForMassStorageFailed),
            MfdError::TrackNotAllocated(..) | MfdError::FreeSpace(..) => {
                Some(StopCode::TrackToBeReleasedWasNotAllocated)
            }
            MfdError::SectorNotAllocated(_) => Some(StopCode::SectorToBeReleasedWasNotAllocated),
            MfdError::PackNameConflict(_)
            | MfdError::UninitializedPack(_)
            | MfdError::SectorNotCached(_)
            | MfdError::DasNotFound(_)
            | MfdError::NotMainItem(_)
            | MfdError::AllocationsAlreadyLoaded(_)
            | MfdError::AllocationsNotLoaded(_)
            | MfdError::DirectoryCorrupt(_) => Some(StopCode::DirectoryErrors),
            MfdError::OutOfSpace { .. } | MfdError::FileAlreadyCataloged { .. } => None,
        }
    }
}

impl Display for MfdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            MfdError::NoFixedPacks => f.write_str("there are no fixed packs"),
            MfdError::PackNameConflict(name) => {
                write!(f, "more than one fixed pack is named {name}")
            }
            MfdError::PrepRejected { node_id, status } => {
                write!(f, "prep of {node_id} was rejected: {status}")
            }
            MfdError::Io { node_id, status } => write!(f, "I/O on {node_id} failed: {status}"),
            MfdError::BadLabel { node_id, error } => {
                write!(f, "pack label on {node_id} is unusable: {error}")
            }
            MfdError::UninitializedPack(node_id) => {
                write!(f, "fixed pack on {node_id} has never been initialized")
            }
            MfdError::UnknownLdat(ldat) => write!(f, "LDAT {ldat} is not a fixed pack"),
            MfdError::NoDirectorySpace => f.write_str("no pack has room for another MFD track"),
            MfdError::OutOfSpace { requested } => {
                write!(f, "fixed mass storage cannot supply {requested} tracks")
            }
            MfdError::SectorNotCached(addr) => write!(f, "MFD sector {addr} is not in the cache"),
            MfdError::DasNotFound(addr) => write!(f, "no DAS describes MFD sector {addr}"),
            MfdError::SectorNotAllocated(addr) => {
                write!(f, "MFD sector {addr} was released but is not allocated")
            }
            MfdError::TrackNotAllocated(ldat, region) => {
                write!(f, "tracks {region} of LDAT {ldat} were released but are not allocated")
            }
            MfdError::FreeSpace(ldat, error) => write!(f, "free space of LDAT {ldat}: {error}"),
            MfdError::NotMainItem(addr) => write!(f, "MFD sector {addr} is not a main item"),
            MfdError::AllocationsAlreadyLoaded(addr) => {
                write!(f, "allocations for main item {addr} are already loaded")
            }
            MfdError::AllocationsNotLoaded(addr) => {
                write!(f, "allocations for main item {addr} are not loaded")
            }
            MfdError::FileAlreadyCataloged {
                qualifier,
                filename,
            } => write!(f, "{qualifier}*{filename} is already cataloged"),
            MfdError::DirectoryCorrupt(detail) => write!(f, "MFD is corrupt: {detail}"),
        }
    }
}

impl Error for MfdError {}
