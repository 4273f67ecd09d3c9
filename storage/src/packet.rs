//! I/O packets.
//!
//! The caller fills in the node, function and payload; the device
//! fills in the status.  A packet which is never started stays
//! [`IoStatus::NotStarted`].
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use base::prelude::*;

use super::geometry::LABEL_WORDS;
use super::types::{BlockId, TrackCount};

/// Identifies a device attached to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "node{:03o}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeType {
    Disk,
    Tape,
}

impl Display for NodeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            NodeType::Disk => "disk",
            NodeType::Tape => "tape",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoFunction {
    Mount,
    Prep,
    Read,
    ReadLabel,
    Reset,
    Unmount,
    Write,
    WriteLabel,
}

impl Display for IoFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            IoFunction::Mount => "Mount",
            IoFunction::Prep => "Prep",
            IoFunction::Read => "Read",
            IoFunction::ReadLabel => "ReadLabel",
            IoFunction::Reset => "Reset",
            IoFunction::Unmount => "Unmount",
            IoFunction::Write => "Write",
            IoFunction::WriteLabel => "WriteLabel",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoStatus {
    NotStarted,
    InProgress,
    Complete,
    Canceled,
    DeviceDoesNotExist,
    DeviceIsDown,
    DeviceIsNotReady,
    InternalError,
    InvalidBlockId,
    InvalidBufferSize,
    InvalidFunction,
    InvalidNodeType,
    InvalidPacket,
    InvalidPackName,
    InvalidPrepFactor,
    InvalidTrackCount,
    MediaAlreadyMounted,
    MediaNotMounted,
    PackNotPrepped,
    SystemError,
    WriteProtected,
}

impl IoStatus {
    pub fn is_complete(self) -> bool {
        self == IoStatus::Complete
    }
}

impl Display for IoStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            IoStatus::NotStarted => "not started",
            IoStatus::InProgress => "in progress",
            IoStatus::Complete => "complete",
            IoStatus::Canceled => "canceled",
            IoStatus::DeviceDoesNotExist => "device does not exist",
            IoStatus::DeviceIsDown => "device is down",
            IoStatus::DeviceIsNotReady => "device is not ready",
            IoStatus::InternalError => "internal error",
            IoStatus::InvalidBlockId => "invalid block id",
            IoStatus::InvalidBufferSize => "invalid buffer size",
            IoStatus::InvalidFunction => "invalid function",
            IoStatus::InvalidNodeType => "invalid node type",
            IoStatus::InvalidPacket => "invalid packet",
            IoStatus::InvalidPackName => "invalid pack name",
            IoStatus::InvalidPrepFactor => "invalid prep factor",
            IoStatus::InvalidTrackCount => "invalid track count",
            IoStatus::MediaAlreadyMounted => "media already mounted",
            IoStatus::MediaNotMounted => "media not mounted",
            IoStatus::PackNotPrepped => "pack not prepped",
            IoStatus::SystemError => "system error",
            IoStatus::WriteProtected => "write protected",
        })
    }
}

/// Function-specific packet contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoPayload {
    None,
    Mount {
        file_name: PathBuf,
        write_protected: bool,
    },
    Prep {
        pack_name: String,
        prep_factor: u64,
        track_count: TrackCount,
        removable: bool,
    },
    Block {
        block_id: BlockId,
        buffer: Vec<Word36>,
    },
    Label {
        buffer: Vec<Word36>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoPacket {
    pub node_id: NodeId,
    pub node_type: NodeType,
    pub function: IoFunction,
    pub payload: IoPayload,
    pub status: IoStatus,
}

impl IoPacket {
    fn disk(node_id: NodeId, function: IoFunction, payload: IoPayload) -> IoPacket {
        IoPacket {
            node_id,
            node_type: NodeType::Disk,
            function,
            payload,
            status: IoStatus::NotStarted,
        }
    }

    pub fn mount(node_id: NodeId, file_name: PathBuf, write_protected: bool) -> IoPacket {
        IoPacket::disk(
            node_id,
            IoFunction::Mount,
            IoPayload::Mount {
                file_name,
                write_protected,
            },
        )
    }

    pub fn unmount(node_id: NodeId) -> IoPacket {
        IoPacket::disk(node_id, IoFunction::Unmount, IoPayload::None)
    }

    pub fn reset(node_id: NodeId) -> IoPacket {
        IoPacket::disk(node_id, IoFunction::Reset, IoPayload::None)
    }

    pub fn prep(
        node_id: NodeId,
        pack_name: &str,
        prep_factor: u64,
        track_count: TrackCount,
        removable: bool,
    ) -> IoPacket {
        IoPacket::disk(
            node_id,
            IoFunction::Prep,
            IoPayload::Prep {
                pack_name: pack_name.to_string(),
                prep_factor,
                track_count,
                removable,
            },
        )
    }

    /// A read of one block into a zeroed buffer of `words` words.
    pub fn read(node_id: NodeId, block_id: BlockId, words: usize) -> IoPacket {
        IoPacket::disk(
            node_id,
            IoFunction::Read,
            IoPayload::Block {
                block_id,
                buffer: vec![Word36::ZERO; words],
            },
        )
    }

    pub fn write(node_id: NodeId, block_id: BlockId, buffer: Vec<Word36>) -> IoPacket {
        IoPacket::disk(
            node_id,
            IoFunction::Write,
            IoPayload::Block { block_id, buffer },
        )
    }

    pub fn read_label(node_id: NodeId) -> IoPacket {
        IoPacket::disk(
            node_id,
            IoFunction::ReadLabel,
            IoPayload::Label {
                buffer: vec![Word36::ZERO; LABEL_WORDS],
            },
        )
    }

    pub fn write_label(node_id: NodeId, buffer: Vec<Word36>) -> IoPacket {
        IoPacket::disk(node_id, IoFunction::WriteLabel, IoPayload::Label { buffer })
    }

    pub fn buffer(&self) -> Option<&[Word36]> {
        match &self.payload {
            IoPayload::Block { buffer, .. } | IoPayload::Label { buffer } => Some(buffer),
            _ => None,
        }
    }

    pub fn into_buffer(self) -> Option<Vec<Word36>> {
        match self.payload {
            IoPayload::Block { buffer, .. } | IoPayload::Label { buffer } => Some(buffer),
            _ => None,
        }
    }

    /// Returns the status as an error unless the packet completed.
    pub fn check(&self) -> Result<(), IoStatus> {
        if self.status.is_complete() {
            Ok(())
        } else {
            Err(self.status)
        }
    }
}

impl Display for IoPacket {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{} {} {}", self.node_id, self.function, self.status)?;
        match &self.payload {
            IoPayload::None => Ok(()),
            IoPayload::Mount {
                file_name,
                write_protected,
            } => write!(f, " file={} wp={}", file_name.display(), write_protected),
            IoPayload::Prep {
                pack_name,
                prep_factor,
                track_count,
                removable,
            } => write!(
                f,
                " pack={pack_name} prep={prep_factor} trks={track_count} rem={removable}"
            ),
            IoPayload::Block { block_id, buffer } => {
                write!(f, " blk={block_id} len={}", buffer.len())
            }
            IoPayload::Label { buffer } => write!(f, " len={}", buffer.len()),
        }
    }
}
