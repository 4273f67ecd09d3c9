use std::path::PathBuf;

use base::prelude::*;
use tempfile::TempDir;

use super::*;
use crate::layout::{half_track_allocated, master_bit_table, SectorOneInfo};
use crate::packet::NodeId;

const NODE: NodeId = NodeId(1);

fn host_file(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

fn run(device: &DiskDevice, mut packet: IoPacket) -> IoPacket {
    device.start_io(&mut packet);
    packet
}

fn mounted_device(dir: &TempDir, write_protected: bool) -> DiskDevice {
    let device = DiskDevice::new("DISK0", false);
    let p = run(
        &device,
        IoPacket::mount(NODE, host_file(dir, "disk0.pack"), write_protected),
    );
    assert_eq!(p.status, IoStatus::Complete);
    device
}

fn prepped_device(dir: &TempDir, prep_factor: u64) -> DiskDevice {
    let device = mounted_device(dir, false);
    let p = run(
        &device,
        IoPacket::prep(NODE, "PACK01", prep_factor, 10_000, false),
    );
    assert_eq!(p.status, IoStatus::Complete);
    device
}

#[test]
fn test_prep_and_read_label() {
    let dir = TempDir::new().expect("temporary directory");
    let device = prepped_device(&dir, 1792);
    assert!(device.is_prepped());
    assert_eq!(device.pack_name().as_deref(), Some("PACK01"));

    let p = run(&device, IoPacket::read_label(NODE));
    assert_eq!(p.status, IoStatus::Complete);
    let label = p.into_buffer().expect("label buffer");
    assert_eq!(label.len(), 28);
    assert_eq!(label[0], ascii_word("VOL1"));
    assert_eq!(ascii_string(&label[1..3]).trim_end_matches('\0'), "PACK01");
    assert_eq!(label[4].h2(), 1792);
    assert_eq!(label[0o21].bits(), 10_000);

    // With a prep factor of 1792 a block is a track; the HMBT is in
    // block 1, the first directory track.
    let p = run(&device, IoPacket::read(NODE, 1, 1792));
    assert_eq!(p.status, IoStatus::Complete);
    let directory = p.into_buffer().expect("directory buffer");
    let s1 = SectorOneInfo::parse(&directory[28..56]);
    assert_eq!(s1.hmbt_address, 1792 + 56);
    let hmbt = &directory[56..56 + s1.mbt_words as usize];
    for track in 0..4 {
        assert!(half_track_allocated(hmbt, 2 * track));
        assert!(half_track_allocated(hmbt, 2 * track + 1));
    }
    for half_track in 8..20_000 {
        assert!(!half_track_allocated(hmbt, half_track));
    }
    let geometry = device.geometry().expect("geometry");
    assert_eq!(hmbt, master_bit_table(&geometry).as_slice());
}

#[test]
fn test_write_then_read_small_blocks() {
    let dir = TempDir::new().expect("temporary directory");
    let device = prepped_device(&dir, 28);
    let words: Vec<Word36> = (0..28_u64)
        .map(|n| Word36::masked(0o123_456_000_000 + n))
        .collect();
    let p = run(&device, IoPacket::write(NODE, 5000, words.clone()));
    assert_eq!(p.status, IoStatus::Complete);
    let p = run(&device, IoPacket::read(NODE, 5000, 28));
    assert_eq!(p.status, IoStatus::Complete);
    assert_eq!(p.into_buffer(), Some(words));
}

#[test]
fn test_remount_probes_label() {
    let dir = TempDir::new().expect("temporary directory");
    let device = prepped_device(&dir, 224);
    assert_eq!(run(&device, IoPacket::unmount(NODE)).status, IoStatus::Complete);
    assert!(!device.is_mounted());
    let p = run(
        &device,
        IoPacket::mount(NODE, host_file(&dir, "disk0.pack"), true),
    );
    assert_eq!(p.status, IoStatus::Complete);
    assert!(device.is_prepped());
    assert!(device.is_write_protected());
    let geometry = device.geometry().expect("geometry");
    assert_eq!(geometry.track_count, 10_000);
    assert_eq!(geometry.prep_factor.words(), 224);
}

#[test]
fn test_unmounted_statuses() {
    let device = DiskDevice::new("DISK0", false);
    assert_eq!(
        run(&device, IoPacket::write(NODE, 0, vec![Word36::ZERO; 28])).status,
        IoStatus::MediaNotMounted
    );
    assert_eq!(
        run(&device, IoPacket::unmount(NODE)).status,
        IoStatus::MediaNotMounted
    );
    assert_eq!(run(&device, IoPacket::reset(NODE)).status, IoStatus::Complete);
}

#[test]
fn test_unprepped_statuses() {
    let dir = TempDir::new().expect("temporary directory");
    let device = mounted_device(&dir, false);
    assert!(!device.is_prepped());
    assert_eq!(
        run(&device, IoPacket::read(NODE, 0, 28)).status,
        IoStatus::PackNotPrepped
    );
    assert_eq!(
        run(&device, IoPacket::read_label(NODE)).status,
        IoStatus::PackNotPrepped
    );
    assert_eq!(
        run(&device, IoPacket::mount(NODE, host_file(&dir, "other"), false)).status,
        IoStatus::MediaAlreadyMounted
    );
}

#[test]
fn test_prep_validation() {
    let dir = TempDir::new().expect("temporary directory");
    let device = mounted_device(&dir, false);
    let cases = [
        (IoPacket::prep(NODE, "PACK01", 100, 10_000, false), IoStatus::InvalidPrepFactor),
        (IoPacket::prep(NODE, "PACK01", 28, 9_999, false), IoStatus::InvalidTrackCount),
        (IoPacket::prep(NODE, "1PACK", 28, 10_000, false), IoStatus::InvalidPackName),
    ];
    for (packet, expected) in cases {
        assert_eq!(run(&device, packet).status, expected);
    }
    assert!(!device.is_prepped());
}

#[test]
fn test_block_statuses() {
    let dir = TempDir::new().expect("temporary directory");
    let device = prepped_device(&dir, 112);
    assert_eq!(
        run(&device, IoPacket::read(NODE, 0, 28)).status,
        IoStatus::InvalidBufferSize
    );
    assert_eq!(
        run(&device, IoPacket::read(NODE, 160_000, 112)).status,
        IoStatus::InvalidBlockId
    );
    assert_eq!(
        run(&device, IoPacket::read(NODE, 159_999, 112)).status,
        IoStatus::Complete
    );
    let mut label = run(&device, IoPacket::read_label(NODE))
        .into_buffer()
        .expect("label");
    label.pop();
    assert_eq!(
        run(&device, IoPacket::write_label(NODE, label)).status,
        IoStatus::InvalidBufferSize
    );
}

#[test]
fn test_write_protected() {
    let dir = TempDir::new().expect("temporary directory");
    let device = prepped_device(&dir, 28);
    run(&device, IoPacket::unmount(NODE));
    run(
        &device,
        IoPacket::mount(NODE, host_file(&dir, "disk0.pack"), true),
    );
    assert_eq!(
        run(&device, IoPacket::write(NODE, 7, vec![Word36::ZERO; 28])).status,
        IoStatus::WriteProtected
    );
    assert_eq!(
        run(&device, IoPacket::prep(NODE, "PACK02", 28, 10_000, false)).status,
        IoStatus::WriteProtected
    );
    assert_eq!(device.pack_name().as_deref(), Some("PACK01"));
}

#[test]
fn test_wrong_node_type() {
    let device = DiskDevice::new("DISK0", false);
    let mut packet = IoPacket::reset(NODE);
    packet.node_type = NodeType::Tape;
    device.start_io(&mut packet);
    assert_eq!(packet.status, IoStatus::InvalidNodeType);
}
