//! The `storage` crate models the mass storage subsystem which the
//! executive keeps beside the instruction processor: disk packs held
//! in host files, the channel which routes I/O packets to them, the
//! per-pack free space tables, and the master file directory (MFD)
//! which records where every cataloged file lives.
//!
//! Data flows through [`packet::IoPacket`]s.  A caller builds a
//! packet, hands it to a [`channel::Channel`], and inspects the
//! status the device left in it.
#![crate_name = "storage"]

pub mod channel;
pub mod console;
pub mod device;
pub mod fas;
pub mod freespace;
pub mod geometry;
pub mod layout;
pub mod mfd;
pub mod packet;
pub mod stop;
pub mod types;

pub use channel::Channel;
pub use console::{Console, RecordingConsole};
pub use device::{Device, DiskDevice};
pub use fas::{FileAllocation, FileAllocationSet, FileAllocationTable};
pub use freespace::{FreeSpaceError, PackFreeSpaceTable};
pub use geometry::{PackGeometry, PrepFactor};
pub use mfd::{FixedPack, MfdError, MfdManager, MfdRelativeAddress, SystemIdentity};
pub use packet::{IoFunction, IoPacket, IoPayload, IoStatus, NodeId, NodeType};
pub use stop::StopCode;
pub use types::{BlockId, LdatIndex, TrackCount, TrackId, TrackRegion};
