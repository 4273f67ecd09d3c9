//! Preparing pack images and describing what is on them.
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{event, Level};

use base::charset::fieldata_word_to_string;
use base::prelude::*;
use storage::geometry::{
    validate_pack_name, validate_track_count, GeometryError, WORDS_PER_SECTOR, WORDS_PER_TRACK,
};
use storage::layout::{LabelError, LabelInfo};
use storage::{Channel, Device, DiskDevice, IoPacket, IoStatus, NodeId, NodeType, PrepFactor};

const NODE: NodeId = NodeId(1);

#[derive(Debug, PartialEq, Eq)]
pub enum PackPrepError {
    Geometry(GeometryError),
    NotANumber { what: &'static str, value: String },
    NotRemovableFlag(String),
    NoSuchFile(PathBuf),
    NotPrepped(PathBuf),
    Io { operation: &'static str, status: IoStatus },
    Label(LabelError),
}

impl Display for PackPrepError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            PackPrepError::Geometry(e) => e.fmt(f),
            PackPrepError::NotANumber { what, value } => {
                write!(f, "{what} '{value}' is not a positive number")
            }
            PackPrepError::NotRemovableFlag(arg) => {
                write!(f, "optional argument '{arg}' of the prep command is not REM")
            }
            PackPrepError::NoSuchFile(path) => write!(f, "file {} does not exist", path.display()),
            PackPrepError::NotPrepped(path) => {
                write!(f, "pack in {} is not prepped", path.display())
            }
            PackPrepError::Io { operation, status } => write!(f, "{operation} failed: {status}"),
            PackPrepError::Label(e) => write!(f, "bad label: {e}"),
        }
    }
}

impl Error for PackPrepError {}

/// A checked request to prep a pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepRequest {
    pub pack_name: String,
    pub prep_factor: PrepFactor,
    pub track_count: u64,
    pub removable: bool,
}

fn positive(what: &'static str, value: &str) -> Result<u64, PackPrepError> {
    match value.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(PackPrepError::NotANumber {
            what,
            value: value.to_string(),
        }),
    }
}

impl PrepRequest {
    /// Checks the arguments of the prep command in the order they are
    /// given.  `option` must be `REM` if present.
    pub fn parse(
        pack_name: &str,
        prep_factor: &str,
        track_count: &str,
        option: Option<&str>,
    ) -> Result<PrepRequest, PackPrepError> {
        validate_pack_name(pack_name).map_err(PackPrepError::Geometry)?;
        let prep_factor = PrepFactor::try_from(positive("prep factor", prep_factor)?)
            .map_err(PackPrepError::Geometry)?;
        let track_count = positive("track count", track_count)?;
        validate_track_count(track_count).map_err(PackPrepError::Geometry)?;
        let removable = match option {
            None => false,
            Some("REM") => true,
            Some(other) => return Err(PackPrepError::NotRemovableFlag(other.to_string())),
        };
        Ok(PrepRequest {
            pack_name: pack_name.to_string(),
            prep_factor,
            track_count,
            removable,
        })
    }
}

/// Formats `words` in octal, `per_line` to a line, each line headed by
/// the offset of its first word.
pub fn dump_words(words: &[Word36], per_line: usize) -> Vec<String> {
    words
        .chunks(per_line.max(1))
        .enumerate()
        .map(|(n, row)| {
            let cells: Vec<String> = row.iter().map(|w| format!("{:012o}", w.bits())).collect();
            format!("  {:03o}: {}", n * per_line.max(1), cells.join(" "))
        })
        .collect()
}

fn mount(path: &Path, write_protected: bool) -> Result<Channel, PackPrepError> {
    let device = DiskDevice::new("DISK0", false);
    let mut packet = IoPacket::mount(NODE, path.to_path_buf(), write_protected);
    device.start_io(&mut packet);
    packet.check().map_err(|status| PackPrepError::Io {
        operation: "mount",
        status,
    })?;
    let mut channel = Channel::new(NodeType::Disk);
    channel
        .attach(NODE, Arc::new(device))
        .map_err(|status| PackPrepError::Io {
            operation: "attach",
            status,
        })?;
    Ok(channel)
}

fn unmount(channel: &Channel) -> Result<(), PackPrepError> {
    let mut packet = IoPacket::unmount(NODE);
    channel.route(&mut packet);
    packet.check().map_err(|status| PackPrepError::Io {
        operation: "unmount",
        status,
    })
}

/// Preps the pack in `path`, creating the file if need be, and
/// describes the result.
pub fn prep(path: &Path, request: &PrepRequest) -> Result<Vec<String>, PackPrepError> {
    event!(
        Level::INFO,
        "prepping {} as {} with prep factor {} and {} tracks{}",
        path.display(),
        request.pack_name,
        request.prep_factor,
        request.track_count,
        if request.removable { " (removable)" } else { "" }
    );
    let channel = mount(path, false)?;
    let mut packet = IoPacket::prep(
        NODE,
        &request.pack_name,
        request.prep_factor.words(),
        request.track_count,
        request.removable,
    );
    channel.route(&mut packet);
    packet.check().map_err(|status| PackPrepError::Io {
        operation: "prep",
        status,
    })?;
    let lines = describe(&channel)?;
    unmount(&channel)?;
    Ok(lines)
}

/// Describes the label and initial directory of an existing pack.
pub fn show(path: &Path) -> Result<Vec<String>, PackPrepError> {
    if !path.exists() {
        return Err(PackPrepError::NoSuchFile(path.to_path_buf()));
    }
    let channel = mount(path, true)?;
    let lines = match describe(&channel) {
        Err(PackPrepError::Io {
            status: IoStatus::PackNotPrepped,
            ..
        }) => Err(PackPrepError::NotPrepped(path.to_path_buf())),
        other => other,
    };
    unmount(&channel)?;
    lines
}

fn describe(channel: &Channel) -> Result<Vec<String>, PackPrepError> {
    let label = channel
        .read_label(NODE)
        .map_err(|status| PackPrepError::Io {
            operation: "read label",
            status,
        })?;
    let info = LabelInfo::parse(&label).map_err(PackPrepError::Label)?;
    let mut lines = vec!["Label Record:".to_string()];
    lines.extend(dump_words(&label, 7));
    lines.push(format!("Pack Name:            {}", info.pack_name));
    lines.push(format!("First Dir Track DRWA: {:012o}", label[3].bits()));
    lines.push(format!("Records Per Track:    {}", label[4].h1()));
    lines.push(format!("Words Per Record:     {}", label[4].h2()));
    lines.push(format!("VOL1 Version:         {}", label[0o14].s2()));
    lines.push(format!("Disk Capacity:        {} tracks", label[0o16].bits()));
    lines.push(format!("Words Per Phys Record:{}", label[0o17].h1()));
    lines.push(format!("Total Blocks:         {}", label[0o21].bits()));

    let directory = channel
        .read_track(NODE, &info.geometry, info.first_directory_address / WORDS_PER_TRACK)
        .map_err(|status| PackPrepError::Io {
            operation: "read directory",
            status,
        })?;
    let sector = WORDS_PER_SECTOR as usize;
    lines.push("Sector 0:".to_string());
    lines.extend(dump_words(&directory[..sector], 7));
    let sector1 = &directory[sector..2 * sector];
    lines.push("Sector 1:".to_string());
    lines.extend(dump_words(sector1, 7));
    let ldat = sector1[5].h1();
    lines.push(format!("HMBT DRWAddr:     {:012o}", sector1[0].bits()));
    lines.push(format!("SMBT DRWAddr:     {:012o}", sector1[1].bits()));
    lines.push(format!(
        "Max Avail Tracks: {:012o} ({})",
        sector1[2].bits(),
        sector1[2].bits()
    ));
    lines.push(format!(
        "Available Tracks: {:012o} ({})",
        sector1[3].bits(),
        sector1[3].bits()
    ));
    lines.push(format!(
        "PackId:           {}",
        fieldata_word_to_string(sector1[4]).trim_end()
    ));
    lines.push(format!(
        "LDAT Index:       {ldat:06o}{}",
        if ldat == 0 { " (removable)" } else { "" }
    ));
    lines.push(format!("MBT Length:       {:06o}", sector1[5].h2()));
    lines.push(format!("Records/Track:    {}", sector1[0o10].t1()));
    lines.push(format!("Words/Record:     {}", sector1[0o10].t3()));
    lines.push(format!("Removable LDAT:   {:06o}", sector1[0o20].h1()));
    lines.push(format!("DAS Offset:       {:06o}", sector1[0o20].h2()));
    Ok(lines)
}
