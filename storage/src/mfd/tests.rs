use std::sync::Arc;

use tempfile::TempDir;

use super::*;
use crate::channel::Channel;
use crate::console::RecordingConsole;
use crate::device::{Device, DiskDevice};
use crate::packet::{IoPacket, IoStatus, NodeId, NodeType};
use crate::types::{LdatIndex, TrackRegion};

const TRACKS: u64 = 10_000;
const AVAILABLE: u64 = 9_996;

fn fixed_pack(node: u32, name: &str) -> FixedPack {
    FixedPack {
        node_id: NodeId(node),
        pack_name: name.to_string(),
        prep_factor: 1792,
        track_count: TRACKS,
    }
}

/// A disk channel with one mounted (unprepped) device per pack.
fn channel_with(dir: &TempDir, packs: &[FixedPack]) -> Arc<Channel> {
    let mut channel = Channel::new(NodeType::Disk);
    for pack in packs {
        let device = DiskDevice::new(&format!("DISK{}", pack.node_id.0), false);
        let mut packet = IoPacket::mount(
            pack.node_id,
            dir.path().join(format!("{}.pack", pack.pack_name)),
            false,
        );
        device.start_io(&mut packet);
        assert_eq!(packet.status, IoStatus::Complete);
        channel
            .attach(pack.node_id, Arc::new(device))
            .expect("disk attaches to the disk channel");
    }
    Arc::new(channel)
}

fn initialized(dir: &TempDir, packs: &[FixedPack]) -> (Arc<Channel>, MfdManager) {
    let channel = channel_with(dir, packs);
    let mfd = MfdManager::new(channel.clone(), SystemIdentity::default());
    mfd.initialize_mass_storage(packs, &RecordingConsole::new())
        .expect("initialization should succeed");
    (channel, mfd)
}

fn recovered(channel: &Arc<Channel>, packs: &[FixedPack]) -> MfdManager {
    let mfd = MfdManager::new(channel.clone(), SystemIdentity::default());
    let console = RecordingConsole::new();
    mfd.recover_mass_storage(packs, &console)
        .expect("recovery should succeed");
    mfd
}

#[test]
fn test_initialize_one_pack() {
    let dir = TempDir::new().expect("temporary directory");
    let packs = [fixed_pack(1, "FIX001")];
    let channel = channel_with(&dir, &packs);
    let mfd = MfdManager::new(channel, SystemIdentity::default());
    let console = RecordingConsole::new();

    let available = mfd
        .initialize_mass_storage(&packs, &console)
        .expect("initialization should succeed");
    assert_eq!(available, AVAILABLE);
    assert_eq!(
        console.messages(),
        vec![
            "Fixed Disk Pool = 1 Devices".to_string(),
            format!("MS Initialized - {AVAILABLE} Tracks Available"),
        ]
    );

    let lead = mfd.lookup("SYS$", "MFD$$").expect("MFD$$ is cataloged");
    let main0 = mfd.mfd_main_item0().expect("MFD$$ has a main item");
    assert_eq!(lead.ldat(), LdatIndex(1));
    let main = MainItem::parse(&mfd.read_sector(main0).expect("main item is cached"));
    assert_eq!(main.filename, "MFD$$");
    assert_eq!(main.lead_item0, Some(lead));
    assert!(main.inhibit_flags.contains(InhibitFlags::GUARDED));
    assert_eq!(main.first_dad, None);

    // MFD track 0 of LDAT 1 is file track 0o10000 of MFD$$.
    let fas = mfd.file_allocations(main0).expect("MFD$$ allocations are loaded");
    assert_eq!(fas.track_count(), 1);
    assert!(fas.find(0o10000).is_some());

    // Sector 0 holds the DAS; lead, main 0 and main 1 took three more.
    assert_eq!(mfd.free_directory_sector_count(), 60);
}

#[test]
fn test_no_fixed_packs() {
    let mfd = MfdManager::new(
        Arc::new(Channel::new(NodeType::Disk)),
        SystemIdentity::default(),
    );
    let console = RecordingConsole::new();
    let err = mfd
        .initialize_mass_storage(&[], &console)
        .expect_err("nothing to initialize");
    assert_eq!(err, MfdError::NoFixedPacks);
    assert_eq!(err.stop_code().map(|c| c.code()), Some(0o64));
    assert_eq!(
        console.messages(),
        vec![
            "Fixed Disk Pool = 0 Devices".to_string(),
            "No Fixed Disks - Cannot Continue Initialization".to_string(),
        ]
    );
}

#[test]
fn test_pack_name_conflict() {
    let dir = TempDir::new().expect("temporary directory");
    let packs = [fixed_pack(1, "FIX001"), fixed_pack(2, "FIX001")];
    let mut channel = Channel::new(NodeType::Disk);
    for (n, pack) in packs.iter().enumerate() {
        let device = DiskDevice::new("DISK", false);
        let mut packet = IoPacket::mount(pack.node_id, dir.path().join(format!("{n}.pack")), false);
        device.start_io(&mut packet);
        channel
            .attach(pack.node_id, Arc::new(device))
            .expect("disk attaches");
    }
    let mfd = MfdManager::new(Arc::new(channel), SystemIdentity::default());
    let console = RecordingConsole::new();
    let err = mfd
        .initialize_mass_storage(&packs, &console)
        .expect_err("duplicate names");
    assert_eq!(err, MfdError::PackNameConflict("FIX001".to_string()));
    assert_eq!(
        console.messages()[1..],
        [
            "Fixed pack name conflict - FIX001".to_string(),
            "Resolve pack name conflicts and reboot".to_string(),
        ]
    );
}

#[test]
fn test_two_packs() {
    let dir = TempDir::new().expect("temporary directory");
    let packs = [fixed_pack(1, "FIX001"), fixed_pack(2, "FIX002")];
    let (_, mfd) = initialized(&dir, &packs);
    assert_eq!(mfd.free_track_count(), 2 * AVAILABLE);
    assert_eq!(mfd.ldat_indices(), vec![LdatIndex(1), LdatIndex(2)]);

    let main0 = mfd.mfd_main_item0().expect("MFD$$ is cataloged");
    let fas = mfd.file_allocations(main0).expect("MFD$$ allocations are loaded");
    assert_eq!(fas.track_count(), 2);
    assert_eq!(fas.find(0o20000).map(|(ldat, _)| ldat), Some(LdatIndex(2)));
}

#[test]
fn test_catalog_twice() {
    let dir = TempDir::new().expect("temporary directory");
    let packs = [fixed_pack(1, "FIX001")];
    let (_, mfd) = initialized(&dir, &packs);
    let request = mfd.identity().catalog_request("TEST", "FILE1");
    mfd.catalog_mass_storage_file(&request)
        .expect("first catalog succeeds");
    let err = mfd
        .catalog_mass_storage_file(&request)
        .expect_err("second catalog fails");
    assert_eq!(
        err,
        MfdError::FileAlreadyCataloged {
            qualifier: "TEST".to_string(),
            filename: "FILE1".to_string(),
        }
    );
    assert_eq!(err.stop_code(), None);
}

#[test]
fn test_allocations_survive_unload() {
    let dir = TempDir::new().expect("temporary directory");
    let packs = [fixed_pack(1, "FIX001")];
    let (channel, mfd) = initialized(&dir, &packs);
    let main0 = mfd
        .catalog_mass_storage_file(&mfd.identity().catalog_request("TEST", "FILE1"))
        .expect("catalog succeeds");

    mfd.load_file_allocations(main0).expect("allocations load");
    assert_eq!(
        mfd.load_file_allocations(main0),
        Err(MfdError::AllocationsAlreadyLoaded(main0))
    );
    mfd.allocate_file_tracks(main0, TrackRegion::new(0, 10))
        .expect("space is free");
    mfd.allocate_file_tracks(main0, TrackRegion::new(20, 5))
        .expect("space is free");
    // Tracks already held are left alone.
    mfd.allocate_file_tracks(main0, TrackRegion::new(8, 4))
        .expect("space is free");
    assert_eq!(mfd.free_track_count(), AVAILABLE - 17);
    let before = mfd.file_allocations(main0).expect("loaded");
    assert_eq!(before.track_count(), 17);

    mfd.unload_file_allocations(main0).expect("unload succeeds");
    assert_eq!(mfd.file_allocations(main0), None);
    assert_eq!(
        mfd.convert_file_relative_track(main0, 0),
        Err(MfdError::AllocationsNotLoaded(main0))
    );

    let main = MainItem::parse(&mfd.read_sector(main0).expect("cached"));
    let dad_address = main.first_dad.expect("the file has a DAD");
    let dad = DadItem::parse(&mfd.read_sector(dad_address).expect("cached"));
    assert_eq!(dad.previous, main0);
    // Tracks 12 to 19 are a hole.
    assert!(dad.entries.iter().any(|e| e.ldat.is_none()));

    mfd.load_file_allocations(main0).expect("allocations load");
    let after = mfd.file_allocations(main0).expect("loaded");
    assert_eq!(after.allocations(), before.allocations());
    assert_eq!(
        mfd.convert_file_relative_track(main0, 15),
        Ok(None)
    );
    assert_eq!(
        mfd.convert_file_relative_track(main0, 21),
        Ok(before.find(21))
    );

    // What was written reaches the pack.
    let again = recovered(&channel, &packs);
    assert_eq!(again.free_track_count(), AVAILABLE - 17);
    assert_eq!(again.lookup("TEST", "FILE1"), mfd.lookup("TEST", "FILE1"));
    again.load_file_allocations(main0).expect("allocations load");
    assert_eq!(
        again.file_allocations(main0).map(|f| f.allocations().to_vec()),
        Some(before.allocations().to_vec())
    );
}

#[test]
fn test_release_file_tracks() {
    let dir = TempDir::new().expect("temporary directory");
    let packs = [fixed_pack(1, "FIX001")];
    let (_, mfd) = initialized(&dir, &packs);
    let main0 = mfd
        .catalog_mass_storage_file(&mfd.identity().catalog_request("TEST", "FILE2"))
        .expect("catalog succeeds");
    mfd.load_file_allocations(main0).expect("allocations load");
    mfd.allocate_file_tracks(main0, TrackRegion::new(0, 10))
        .expect("space is free");

    mfd.release_file_tracks(main0, TrackRegion::new(2, 3))
        .expect("tracks are allocated");
    assert_eq!(mfd.free_track_count(), AVAILABLE - 7);
    assert_eq!(mfd.convert_file_relative_track(main0, 3), Ok(None));
    assert!(mfd
        .convert_file_relative_track(main0, 5)
        .expect("loaded")
        .is_some());

    let err = mfd
        .release_file_tracks(main0, TrackRegion::new(2, 1))
        .expect_err("already released");
    assert_eq!(err.stop_code().map(|c| c.code()), Some(0o57));
}

#[test]
fn test_directory_sectors() {
    let dir = TempDir::new().expect("temporary directory");
    let packs = [fixed_pack(1, "FIX001")];
    let (_, mfd) = initialized(&dir, &packs);

    let sector = mfd
        .allocate_directory_sector(None)
        .expect("a sector is free");
    assert_eq!(mfd.free_directory_sector_count(), 59);
    assert!(mfd
        .read_sector(sector)
        .expect("cached")
        .iter()
        .all(|w| w.bits() == 0));

    mfd.release_directory_sector(sector).expect("allocated");
    assert_eq!(mfd.free_directory_sector_count(), 60);
    let err = mfd
        .release_directory_sector(sector)
        .expect_err("already free");
    assert_eq!(err, MfdError::SectorNotAllocated(sector));
    assert_eq!(err.stop_code().map(|c| c.code()), Some(0o157));

    let das = MfdRelativeAddress::new(LdatIndex(1), 0, 0);
    assert_eq!(
        mfd.release_directory_sector(das),
        Err(MfdError::SectorNotAllocated(das))
    );
}

#[test]
fn test_directory_grows_and_recovers() {
    let dir = TempDir::new().expect("temporary directory");
    let packs = [fixed_pack(1, "FIX001")];
    let (channel, mfd) = initialized(&dir, &packs);

    // Three sectors each: more than the first MFD track holds.
    let names: Vec<String> = (0..25).map(|n| format!("F{n:02}")).collect();
    for name in &names {
        mfd.catalog_mass_storage_file(&mfd.identity().catalog_request("TEST", name))
            .expect("catalog succeeds");
    }
    assert_eq!(mfd.free_track_count(), AVAILABLE - 1);
    let main0 = mfd.mfd_main_item0().expect("MFD$$ is cataloged");
    let fas = mfd.file_allocations(main0).expect("loaded");
    assert_eq!(fas.track_count(), 2);
    assert!(fas.find(0o10001).is_some());
    // 60 + 64 sectors, 75 used.
    assert_eq!(mfd.free_directory_sector_count(), 49);

    let again = recovered(&channel, &packs);
    assert_eq!(again.free_track_count(), AVAILABLE - 1);
    assert_eq!(again.free_directory_sector_count(), 49);
    assert_eq!(again.mfd_main_item0(), Some(main0));
    for name in &names {
        assert_eq!(again.lookup("TEST", name), mfd.lookup("TEST", name));
    }
    assert_eq!(
        again.lookup("SYS$", "MFD$$"),
        mfd.lookup("SYS$", "MFD$$")
    );
}

#[test]
fn test_recover_skips_removable_packs() {
    let dir = TempDir::new().expect("temporary directory");
    let packs = [fixed_pack(1, "FIX001"), fixed_pack(2, "REM001")];
    let channel = channel_with(&dir, &packs);
    let mut packet = IoPacket::prep(NodeId(2), "REM001", 1792, TRACKS, true);
    channel.route(&mut packet);
    assert_eq!(packet.status, IoStatus::Complete);

    let mfd = MfdManager::new(channel.clone(), SystemIdentity::default());
    mfd.initialize_mass_storage(&packs[..1], &RecordingConsole::new())
        .expect("initialization should succeed");

    let console = RecordingConsole::new();
    let again = MfdManager::new(channel, SystemIdentity::default());
    let available = again
        .recover_mass_storage(&packs, &console)
        .expect("recovery should succeed");
    assert_eq!(available, AVAILABLE);
    assert_eq!(again.ldat_indices(), vec![LdatIndex(1)]);
    assert_eq!(
        console.messages(),
        vec![format!("MS Recovered - {AVAILABLE} Tracks Available")]
    );
}

#[test]
fn test_recover_uninitialized_pack() {
    let dir = TempDir::new().expect("temporary directory");
    let packs = [fixed_pack(1, "FIX001")];
    let channel = channel_with(&dir, &packs);
    let mut packet = IoPacket::prep(NodeId(1), "FIX001", 1792, TRACKS, false);
    channel.route(&mut packet);
    assert_eq!(packet.status, IoStatus::Complete);

    let mfd = MfdManager::new(channel, SystemIdentity::default());
    assert_eq!(
        mfd.recover_mass_storage(&packs, &RecordingConsole::new()),
        Err(MfdError::UninitializedPack(NodeId(1)))
    );
}

#[test]
fn test_dump() {
    let dir = TempDir::new().expect("temporary directory");
    let packs = [fixed_pack(1, "FIX001")];
    let (_, mfd) = initialized(&dir, &packs);
    let mut out = Vec::new();
    mfd.dump(&mut out, "").expect("dump to memory");
    let text = String::from_utf8(out).expect("dump is text");
    assert!(text.contains("FIX001"));
    assert!(text.contains("SYS$*MFD$$"));
}
