//! Disk devices.
//!
//! A disk device keeps a pack image in a host file.  It is in one of
//! three states: unmounted, mounted but not prepped, or mounted and
//! prepped.  Mounting probes the label in block 0 to decide which of
//! the mounted states applies.
//!
//! Each block of the pack occupies a power-of-two run of bytes in the
//! host file; only the first `P * 9 / 2` bytes of each run hold data.
//! Reading past the end of the host file yields zero words.
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{event, span, Level};

use base::codec::packed_len;
use base::prelude::*;

use super::geometry::{
    validate_pack_name, validate_track_count, PackGeometry, PrepFactor, LABEL_WORDS,
    WORDS_PER_TRACK,
};
use super::layout::{
    first_das_track, initial_directory, label_words, LabelInfo, MbtLayout,
    FIRST_DIRECTORY_ADDRESS,
};
use super::packet::{IoFunction, IoPacket, IoPayload, IoStatus, NodeType};

/// Something a channel can route packets to.  Devices complete each
/// packet before `start_io` returns.
pub trait Device: Send + Sync {
    fn node_type(&self) -> NodeType;

    fn name(&self) -> &str;

    fn start_io(&self, packet: &mut IoPacket);
}

#[derive(Debug)]
struct Prepped {
    pack_name: String,
    geometry: PackGeometry,
}

#[derive(Debug)]
struct Mounted {
    file: File,
    path: PathBuf,
    write_protected: bool,
    prepped: Option<Prepped>,
}

#[derive(Debug)]
pub struct DiskDevice {
    name: String,
    log_ios: bool,
    state: Mutex<Option<Mounted>>,
}

fn io_failed(e: &io::Error, what: &str) -> IoStatus {
    event!(Level::ERROR, "{what} failed: {e}");
    IoStatus::SystemError
}

fn write_block_bytes(
    file: &mut File,
    offset: u64,
    words: &[Word36],
    padded_len: usize,
) -> Result<(), IoStatus> {
    let mut bytes = vec![0_u8; padded_len];
    pack(words, &mut bytes).map_err(|_| IoStatus::InternalError)?;
    file.seek(SeekFrom::Start(offset))
        .and_then(|_| file.write_all(&bytes))
        .map_err(|e| io_failed(&e, "write"))
}

fn read_block_bytes(file: &mut File, offset: u64, words: &mut [Word36]) -> Result<(), IoStatus> {
    let len = packed_len(words.len());
    let mut bytes = Vec::with_capacity(len);
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| io_failed(&e, "seek"))?;
    std::io::Read::by_ref(file)
        .take(len as u64)
        .read_to_end(&mut bytes)
        .map_err(|e| io_failed(&e, "read"))?;
    bytes.resize(len, 0);
    unpack(&bytes, words).map_err(|_| IoStatus::InternalError)
}

/// Writes whole blocks starting at a block-aligned word address.
fn write_words(
    file: &mut File,
    geometry: &PackGeometry,
    word_address: u64,
    words: &[Word36],
) -> Result<(), IoStatus> {
    let prep = geometry.words_per_block() as usize;
    let padded = geometry.prep_factor.padded_bytes_per_block() as usize;
    let first_block = geometry.block_containing(word_address);
    for (bx, chunk) in words.chunks(prep).enumerate() {
        let mut block = chunk.to_vec();
        block.resize(prep, Word36::ZERO);
        let offset = geometry.byte_offset(first_block + bx as u64);
        write_block_bytes(file, offset, &block, padded)?;
    }
    Ok(())
}

fn probe(file: &mut File) -> Option<Prepped> {
    let mut label = vec![Word36::ZERO; LABEL_WORDS];
    if let Err(status) = read_block_bytes(file, 0, &mut label) {
        event!(Level::DEBUG, "cannot read label ({status}); pack is not prepped");
        return None;
    }
    match LabelInfo::parse(&label) {
        Ok(info) => Some(Prepped {
            pack_name: info.pack_name,
            geometry: info.geometry,
        }),
        Err(e) => {
            event!(Level::DEBUG, "pack is not prepped: {e}");
            None
        }
    }
}

impl DiskDevice {
    pub fn new(name: &str, log_ios: bool) -> DiskDevice {
        DiskDevice {
            name: name.to_string(),
            log_ios,
            state: Mutex::new(None),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.lock().is_some()
    }

    pub fn is_prepped(&self) -> bool {
        self.lock().as_ref().is_some_and(|m| m.prepped.is_some())
    }

    pub fn is_write_protected(&self) -> bool {
        self.lock().as_ref().is_some_and(|m| m.write_protected)
    }

    pub fn pack_name(&self) -> Option<String> {
        self.lock()
            .as_ref()
            .and_then(|m| m.prepped.as_ref())
            .map(|p| p.pack_name.clone())
    }

    pub fn geometry(&self) -> Option<PackGeometry> {
        self.lock()
            .as_ref()
            .and_then(|m| m.prepped.as_ref())
            .map(|p| p.geometry)
    }

    pub fn host_file(&self) -> Option<PathBuf> {
        self.lock().as_ref().map(|m| m.path.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Option<Mounted>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn log_completion(&self, packet: &IoPacket) {
        if self.log_ios {
            event!(Level::INFO, "{}: {}", self.name, packet);
        } else {
            event!(Level::DEBUG, "{}: {}", self.name, packet);
        }
    }

    fn do_mount(state: &mut Option<Mounted>, path: &Path, write_protected: bool) -> IoStatus {
        if state.is_some() {
            return IoStatus::MediaAlreadyMounted;
        }
        let opened = OpenOptions::new()
            .read(true)
            .write(!write_protected)
            .create(!write_protected)
            .truncate(false)
            .open(path);
        let mut file = match opened {
            Ok(file) => file,
            Err(e) => return io_failed(&e, "open"),
        };
        let prepped = probe(&mut file);
        *state = Some(Mounted {
            file,
            path: path.to_path_buf(),
            write_protected,
            prepped,
        });
        IoStatus::Complete
    }

    fn do_prep(
        mounted: &mut Mounted,
        pack_name: &str,
        prep_factor: u64,
        track_count: u64,
        removable: bool,
    ) -> Result<(), IoStatus> {
        let prep_factor =
            PrepFactor::try_from(prep_factor).map_err(|_| IoStatus::InvalidPrepFactor)?;
        validate_track_count(track_count).map_err(|_| IoStatus::InvalidTrackCount)?;
        validate_pack_name(pack_name).map_err(|_| IoStatus::InvalidPackName)?;
        if mounted.write_protected {
            return Err(IoStatus::WriteProtected);
        }

        let geometry = PackGeometry::new(prep_factor, track_count);
        let layout = MbtLayout::new(&geometry);
        event!(
            Level::INFO,
            "prepping {pack_name} on {}: {geometry}",
            mounted.path.display()
        );
        let file = &mut mounted.file;
        file.set_len(geometry.host_file_len())
            .map_err(|e| io_failed(&e, "resize"))?;
        write_words(file, &geometry, 0, &label_words(pack_name, &geometry))?;
        write_words(
            file,
            &geometry,
            FIRST_DIRECTORY_ADDRESS,
            &initial_directory(pack_name, &geometry, removable),
        )?;
        write_words(
            file,
            &geometry,
            layout.first_das_track() * WORDS_PER_TRACK,
            &first_das_track(&geometry, removable),
        )?;
        file.flush().map_err(|e| io_failed(&e, "flush"))?;
        mounted.prepped = probe(file);
        if mounted.prepped.is_none() {
            return Err(IoStatus::InternalError);
        }
        Ok(())
    }

    fn do_read(mounted: &mut Mounted, block_id: u64, buffer: &mut [Word36]) -> Result<(), IoStatus> {
        let geometry = match &mounted.prepped {
            Some(p) => p.geometry,
            None => return Err(IoStatus::PackNotPrepped),
        };
        if buffer.len() as u64 != geometry.words_per_block() {
            return Err(IoStatus::InvalidBufferSize);
        }
        if !geometry.is_valid_block(block_id) {
            return Err(IoStatus::InvalidBlockId);
        }
        read_block_bytes(&mut mounted.file, geometry.byte_offset(block_id), buffer)
    }

    fn do_write(mounted: &mut Mounted, block_id: u64, buffer: &[Word36]) -> Result<(), IoStatus> {
        let geometry = match &mounted.prepped {
            Some(p) => p.geometry,
            None => return Err(IoStatus::PackNotPrepped),
        };
        if mounted.write_protected {
            return Err(IoStatus::WriteProtected);
        }
        if buffer.len() as u64 != geometry.words_per_block() {
            return Err(IoStatus::InvalidBufferSize);
        }
        if !geometry.is_valid_block(block_id) {
            return Err(IoStatus::InvalidBlockId);
        }
        write_block_bytes(
            &mut mounted.file,
            geometry.byte_offset(block_id),
            buffer,
            geometry.prep_factor.padded_bytes_per_block() as usize,
        )
    }

    fn do_read_label(mounted: &mut Mounted, buffer: &mut [Word36]) -> Result<(), IoStatus> {
        if mounted.prepped.is_none() {
            return Err(IoStatus::PackNotPrepped);
        }
        if buffer.len() != LABEL_WORDS {
            return Err(IoStatus::InvalidBufferSize);
        }
        read_block_bytes(&mut mounted.file, 0, buffer)
    }

    fn do_write_label(mounted: &mut Mounted, buffer: &[Word36]) -> Result<(), IoStatus> {
        if mounted.prepped.is_none() {
            return Err(IoStatus::PackNotPrepped);
        }
        if mounted.write_protected {
            return Err(IoStatus::WriteProtected);
        }
        if buffer.len() != LABEL_WORDS {
            return Err(IoStatus::InvalidBufferSize);
        }
        write_block_bytes(&mut mounted.file, 0, buffer, packed_len(LABEL_WORDS))?;
        mounted.prepped = probe(&mut mounted.file);
        Ok(())
    }

    fn dispatch(&self, packet: &mut IoPacket) -> Result<(), IoStatus> {
        let mut state = self.lock();
        if let (IoFunction::Mount, IoPayload::Mount {
            file_name,
            write_protected,
        }) = (packet.function, &packet.payload)
        {
            return match DiskDevice::do_mount(&mut state, file_name, *write_protected) {
                IoStatus::Complete => Ok(()),
                status => Err(status),
            };
        }
        if packet.function == IoFunction::Reset {
            return Ok(());
        }
        let mounted = match state.as_mut() {
            Some(mounted) => mounted,
            None => return Err(IoStatus::MediaNotMounted),
        };
        match (packet.function, &mut packet.payload) {
            (IoFunction::Unmount, _) => {
                *state = None;
                Ok(())
            }
            (
                IoFunction::Prep,
                IoPayload::Prep {
                    pack_name,
                    prep_factor,
                    track_count,
                    removable,
                },
            ) => DiskDevice::do_prep(mounted, pack_name, *prep_factor, *track_count, *removable),
            (IoFunction::Read, IoPayload::Block { block_id, buffer }) => {
                DiskDevice::do_read(mounted, *block_id, buffer)
            }
            (IoFunction::Write, IoPayload::Block { block_id, buffer }) => {
                DiskDevice::do_write(mounted, *block_id, buffer)
            }
            (IoFunction::ReadLabel, IoPayload::Label { buffer }) => {
                DiskDevice::do_read_label(mounted, buffer)
            }
            (IoFunction::WriteLabel, IoPayload::Label { buffer }) => {
                DiskDevice::do_write_label(mounted, buffer)
            }
            _ => Err(IoStatus::InvalidPacket),
        }
    }
}

impl Device for DiskDevice {
    fn node_type(&self) -> NodeType {
        NodeType::Disk
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn start_io(&self, packet: &mut IoPacket) {
        let span = span!(Level::TRACE, "disk", name = %self.name);
        let _enter = span.enter();
        if packet.node_type != NodeType::Disk {
            packet.status = IoStatus::InvalidNodeType;
            self.log_completion(packet);
            return;
        }
        packet.status = IoStatus::InProgress;
        packet.status = match self.dispatch(packet) {
            Ok(()) => IoStatus::Complete,
            Err(status) => status,
        };
        self.log_completion(packet);
    }
}

#[cfg(test)]
mod tests;
