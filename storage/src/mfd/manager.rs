use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{event, span, Level};

use base::prelude::*;

use super::address::{MfdRelativeAddress, TRACKS_PER_DAS};
use super::cache::MfdCache;
use super::flags::{FileCharacteristics, InhibitFlags};
use super::items::{
    dad_entries, dad_items, is_lead_item0, is_main_item0, populate_lead_item0,
    populate_main_item0, populate_main_item1, set_first_dad, set_highest_granules,
    software_time, CatalogRequest, DadItem, LeadItem, MainItem, FILE_TYPE_FIXED,
};
use super::MfdError;
use crate::channel::Channel;
use crate::console::Console;
use crate::fas::{FileAllocation, FileAllocationSet, FileAllocationTable};
use crate::freespace::PackFreeSpaceTable;
use crate::geometry::{PackGeometry, SECTORS_PER_TRACK, WORDS_PER_SECTOR, WORDS_PER_TRACK};
use crate::layout::{LabelInfo, MbtLayout, SectorOneInfo, DAS_FIXED, NO_LINK};
use crate::packet::{IoPacket, IoStatus, NodeId};
use crate::types::{LdatIndex, TrackCount, TrackId, TrackRegion};

pub const MFD_FILENAME: &str = "MFD$$";
const MFD_MAX_GRANULES: u64 = 262_153;
const MAX_MFD_TRACKS_PER_PACK: u64 = 0o7777;
const DAS_NEXT: usize = 27;
const SECTOR_ONE_LDAT: usize = WORDS_PER_SECTOR as usize + 5;

/// The names under which the exec catalogs its own files, and the
/// defaults for files it catalogs for others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemIdentity {
    pub qualifier: String,
    pub project_id: String,
    pub account_id: String,
    pub mnemonic: String,
    pub max_granules: u64,
}

impl Default for SystemIdentity {
    fn default() -> SystemIdentity {
        SystemIdentity {
            qualifier: "SYS$".to_string(),
            project_id: "EXEC-8".to_string(),
            account_id: "SYSTEM".to_string(),
            mnemonic: "F".to_string(),
            max_granules: 256,
        }
    }
}

impl SystemIdentity {
    fn mfd_file_request(&self, pack_names: Vec<String>) -> CatalogRequest {
        CatalogRequest {
            qualifier: self.qualifier.clone(),
            filename: MFD_FILENAME.to_string(),
            project_id: self.project_id.clone(),
            account_id: self.account_id.clone(),
            read_key: String::new(),
            write_key: String::new(),
            mnemonic: self.mnemonic.clone(),
            absolute_cycle: 1,
            inhibit_flags: InhibitFlags::GUARDED
                | InhibitFlags::UNLOAD_INHIBITED
                | InhibitFlags::PRIVATE,
            characteristics: FileCharacteristics::default(),
            reserve: 0,
            max_granules: MFD_MAX_GRANULES,
            pack_names,
        }
    }

    /// A request to catalog an ordinary file under this identity's
    /// defaults.
    pub fn catalog_request(&self, qualifier: &str, filename: &str) -> CatalogRequest {
        CatalogRequest {
            qualifier: qualifier.to_string(),
            filename: filename.to_string(),
            project_id: self.project_id.clone(),
            account_id: self.account_id.clone(),
            read_key: String::new(),
            write_key: String::new(),
            mnemonic: self.mnemonic.clone(),
            absolute_cycle: 1,
            inhibit_flags: InhibitFlags::NONE,
            characteristics: FileCharacteristics::default(),
            reserve: 0,
            max_granules: self.max_granules,
            pack_names: Vec::new(),
        }
    }
}

/// A pack in the fixed pool, attached to the channel and mounted.
/// Initialization preps it with this name and geometry; recovery
/// reads both from the pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedPack {
    pub node_id: NodeId,
    pub pack_name: String,
    pub prep_factor: u64,
    pub track_count: TrackCount,
}

#[derive(Debug)]
struct PackDescriptor {
    node_id: NodeId,
    pack_name: String,
    geometry: PackGeometry,
    free_space: PackFreeSpaceTable,
    /// Device track of MFD track 0, the first DAS.
    first_das_track: TrackId,
    mfd_track_count: u64,
    mfd_sectors_used: u64,
}

#[derive(Debug, Default)]
struct Catalog {
    free_sectors: BTreeSet<MfdRelativeAddress>,
    /// Qualifier, then filename, to lead item 0.
    lookup: BTreeMap<String, BTreeMap<String, MfdRelativeAddress>>,
    mfd_main_item0: Option<MfdRelativeAddress>,
}

impl Catalog {
    fn lookup(&self, qualifier: &str, filename: &str) -> Option<MfdRelativeAddress> {
        self.lookup
            .get(qualifier)
            .and_then(|files| files.get(filename))
            .copied()
    }

    fn insert(&mut self, qualifier: &str, filename: &str, lead_item0: MfdRelativeAddress) {
        self.lookup
            .entry(qualifier.to_string())
            .or_default()
            .insert(filename.to_string(), lead_item0);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn io_error(node_id: NodeId) -> impl Fn(IoStatus) -> MfdError {
    move |status| MfdError::Io { node_id, status }
}

fn sector_bit(sector_id: u64) -> (usize, u64) {
    if sector_id < 32 {
        (1, 1 << (35 - sector_id))
    } else {
        (2, 1 << (35 - (sector_id - 32)))
    }
}

/// True if the DAS entry starting at `base` marks `sector_id` in use.
fn das_marks(das: &[Word36], base: usize, sector_id: u64) -> bool {
    let (offset, mask) = sector_bit(sector_id);
    das[base + offset].bits() & mask != 0
}

fn reported<T>(result: Result<T, MfdError>) -> Result<T, MfdError> {
    if let Err(e) = &result {
        match e.stop_code() {
            Some(code) => event!(Level::ERROR, "MFD failure, stop code {code}: {e}"),
            None => event!(Level::WARN, "MFD request refused: {e}"),
        }
    }
    result
}

/// Owns the directory and the free space of the fixed packs.
///
/// The allocation sets, the pack descriptors (with their free space
/// tables), the catalog and the sector cache each have their own
/// lock.  An operation which needs more than one takes them in that
/// order.
pub struct MfdManager {
    channel: Arc<Channel>,
    identity: SystemIdentity,
    allocations: Mutex<FileAllocationTable>,
    packs: Mutex<BTreeMap<LdatIndex, PackDescriptor>>,
    catalog: Mutex<Catalog>,
    cache: Mutex<MfdCache>,
}

/// All four locks, held for one directory operation.
struct Directory<'a> {
    channel: &'a Channel,
    allocations: MutexGuard<'a, FileAllocationTable>,
    packs: MutexGuard<'a, BTreeMap<LdatIndex, PackDescriptor>>,
    catalog: MutexGuard<'a, Catalog>,
    cache: MutexGuard<'a, MfdCache>,
}

impl MfdManager {
    pub fn new(channel: Arc<Channel>, identity: SystemIdentity) -> MfdManager {
        MfdManager {
            channel,
            identity,
            allocations: Mutex::new(FileAllocationTable::new()),
            packs: Mutex::new(BTreeMap::new()),
            catalog: Mutex::new(Catalog::default()),
            cache: Mutex::new(MfdCache::new()),
        }
    }

    pub fn identity(&self) -> &SystemIdentity {
        &self.identity
    }

    fn directory(&self) -> Directory<'_> {
        Directory {
            channel: &self.channel,
            allocations: lock(&self.allocations),
            packs: lock(&self.packs),
            catalog: lock(&self.catalog),
            cache: lock(&self.cache),
        }
    }

    /// Initializes fixed mass storage (a JK13 boot).  Every pack is
    /// prepped again and given an LDAT index, starting at 1, in the
    /// order given.  SYS$*MFD$$ is cataloged on the first pack.
    /// Returns the number of tracks left free.
    pub fn initialize_mass_storage(
        &self,
        packs: &[FixedPack],
        console: &dyn Console,
    ) -> Result<TrackCount, MfdError> {
        let span = span!(Level::INFO, "initialize mass storage");
        let _enter = span.enter();
        reported(self.initialize_fixed(packs, console))
    }

    fn initialize_fixed(
        &self,
        packs: &[FixedPack],
        console: &dyn Console,
    ) -> Result<TrackCount, MfdError> {
        console.send_read_only_message(&format!("Fixed Disk Pool = {} Devices", packs.len()));
        if packs.is_empty() {
            console.send_read_only_message("No Fixed Disks - Cannot Continue Initialization");
            return Err(MfdError::NoFixedPacks);
        }

        let mut names = BTreeSet::new();
        let mut conflict = None;
        for pack in packs {
            if !names.insert(pack.pack_name.as_str()) {
                console.send_read_only_message(&format!(
                    "Fixed pack name conflict - {}",
                    pack.pack_name
                ));
                conflict.get_or_insert_with(|| pack.pack_name.clone());
            }
        }
        if let Some(name) = conflict {
            console.send_read_only_message("Resolve pack name conflicts and reboot");
            return Err(MfdError::PackNameConflict(name));
        }

        let mut dir = self.directory();
        dir.reset();
        for (index, pack) in packs.iter().enumerate() {
            let ldat = LdatIndex(index as u32 + 1);
            dir.initialize_pack(ldat, pack)?;
        }
        let pack_names = packs.iter().map(|p| p.pack_name.clone()).collect();
        dir.bootstrap_mfd_file(&self.identity.mfd_file_request(pack_names))?;
        dir.flush()?;

        let available = dir.free_track_count();
        console.send_read_only_message(&format!("MS Initialized - {available} Tracks Available"));
        Ok(available)
    }

    /// Rebuilds the in-memory state from the directory already on the
    /// fixed packs.  Removable packs are skipped.
    pub fn recover_mass_storage(
        &self,
        packs: &[FixedPack],
        console: &dyn Console,
    ) -> Result<TrackCount, MfdError> {
        let span = span!(Level::INFO, "recover mass storage");
        let _enter = span.enter();
        reported(self.recover_fixed(packs, console))
    }

    fn recover_fixed(
        &self,
        packs: &[FixedPack],
        console: &dyn Console,
    ) -> Result<TrackCount, MfdError> {
        let mut dir = self.directory();
        dir.reset();
        let mut mfd_tracks = Vec::new();
        for pack in packs {
            mfd_tracks.extend(dir.recover_pack(pack.node_id)?);
        }
        if dir.packs.is_empty() {
            console.send_read_only_message("No Fixed Disks - Cannot Continue Initialization");
            return Err(MfdError::NoFixedPacks);
        }
        dir.rebuild_catalog(&self.identity, &mfd_tracks)?;

        let available = dir.free_track_count();
        console.send_read_only_message(&format!("MS Recovered - {available} Tracks Available"));
        Ok(available)
    }

    pub fn free_track_count(&self) -> TrackCount {
        lock(&self.packs)
            .values()
            .map(|p| p.free_space.free_track_count())
            .sum()
    }

    pub fn pack_free_space(&self, ldat: LdatIndex) -> Option<PackFreeSpaceTable> {
        lock(&self.packs).get(&ldat).map(|p| p.free_space.clone())
    }

    pub fn ldat_indices(&self) -> Vec<LdatIndex> {
        lock(&self.packs).keys().copied().collect()
    }

    pub fn free_directory_sector_count(&self) -> usize {
        lock(&self.catalog).free_sectors.len()
    }

    pub fn mfd_main_item0(&self) -> Option<MfdRelativeAddress> {
        lock(&self.catalog).mfd_main_item0
    }

    /// Finds lead item 0 of a cataloged file set.
    pub fn lookup(&self, qualifier: &str, filename: &str) -> Option<MfdRelativeAddress> {
        lock(&self.catalog).lookup(qualifier, filename)
    }

    /// Every cataloged file set, as (qualifier, filename, lead item 0).
    pub fn cataloged_files(&self) -> Vec<(String, String, MfdRelativeAddress)> {
        lock(&self.catalog)
            .lookup
            .iter()
            .flat_map(|(qualifier, files)| {
                files
                    .iter()
                    .map(move |(filename, addr)| (qualifier.clone(), filename.clone(), *addr))
            })
            .collect()
    }

    pub fn read_sector(&self, address: MfdRelativeAddress) -> Result<Vec<Word36>, MfdError> {
        reported(
            lock(&self.cache)
                .sector(address)
                .map(|s| s.to_vec())
                .ok_or(MfdError::SectorNotCached(address)),
        )
    }

    /// Replaces the contents of a directory sector.  The write reaches
    /// the pack at the next flush.
    pub fn write_sector(&self, address: MfdRelativeAddress, words: &[Word36]) -> Result<(), MfdError> {
        let mut dir = self.directory();
        reported(dir.update_sector(address).map(|sector| {
            for (to, from) in sector.iter_mut().zip(words) {
                *to = *from;
            }
        }))
    }

    pub fn allocate_directory_sector(
        &self,
        preferred: Option<LdatIndex>,
    ) -> Result<MfdRelativeAddress, MfdError> {
        reported(self.directory().allocate_directory_sector(preferred))
    }

    pub fn release_directory_sector(&self, address: MfdRelativeAddress) -> Result<(), MfdError> {
        reported(self.directory().release_directory_sector(address))
    }

    /// Adds an MFD track, returning the address of its sector 0.
    pub fn allocate_directory_track(
        &self,
        preferred: Option<LdatIndex>,
    ) -> Result<MfdRelativeAddress, MfdError> {
        reported(self.directory().allocate_directory_track(preferred))
    }

    /// Catalogs a new fixed mass storage file set with one cycle and
    /// no storage.  Returns the address of main item 0.
    pub fn catalog_mass_storage_file(
        &self,
        request: &CatalogRequest,
    ) -> Result<MfdRelativeAddress, MfdError> {
        let mut dir = self.directory();
        reported(dir.catalog_file(request).and_then(|main0| {
            dir.flush()?;
            Ok(main0)
        }))
    }

    /// Builds the allocation set of a file from its DADs.  Called when
    /// the file is assigned.
    pub fn load_file_allocations(&self, main_item0: MfdRelativeAddress) -> Result<(), MfdError> {
        reported(self.directory().load_file_allocations(main_item0))
    }

    pub fn file_allocations(&self, main_item0: MfdRelativeAddress) -> Option<FileAllocationSet> {
        lock(&self.allocations).get(main_item0).cloned()
    }

    /// Gives storage to every track of `region` which the file does
    /// not have yet.
    pub fn allocate_file_tracks(
        &self,
        main_item0: MfdRelativeAddress,
        region: TrackRegion,
    ) -> Result<(), MfdError> {
        reported(self.directory().allocate_file_tracks(main_item0, region))
    }

    /// Returns a run of file tracks, which must all lie in one
    /// allocation, to free space.
    pub fn release_file_tracks(
        &self,
        main_item0: MfdRelativeAddress,
        region: TrackRegion,
    ) -> Result<(), MfdError> {
        reported(self.directory().release_file_tracks(main_item0, region))
    }

    /// The pack and device track holding a file-relative track, or
    /// `None` if the track has no storage.
    pub fn convert_file_relative_track(
        &self,
        main_item0: MfdRelativeAddress,
        file_track_id: TrackId,
    ) -> Result<Option<(LdatIndex, TrackId)>, MfdError> {
        reported(
            lock(&self.allocations)
                .get(main_item0)
                .map(|fas| fas.find(file_track_id))
                .ok_or(MfdError::AllocationsNotLoaded(main_item0)),
        )
    }

    /// Writes zeroes over every track of `region` which has storage.
    pub fn clear_file_tracks(
        &self,
        main_item0: MfdRelativeAddress,
        region: TrackRegion,
    ) -> Result<(), MfdError> {
        reported(self.directory().clear_file_tracks(main_item0, region))
    }

    /// Rewrites the DADs of a file whose allocations have changed.
    pub fn write_file_allocations(&self, main_item0: MfdRelativeAddress) -> Result<(), MfdError> {
        let mut dir = self.directory();
        reported(
            dir.write_file_allocations(main_item0)
                .and_then(|()| dir.flush()),
        )
    }

    /// Writes the DADs of a file and forgets its allocation set.
    /// Called when the file is freed.
    pub fn unload_file_allocations(&self, main_item0: MfdRelativeAddress) -> Result<(), MfdError> {
        let mut dir = self.directory();
        reported(dir.write_file_allocations(main_item0).and_then(|()| {
            dir.allocations.remove(main_item0);
            dir.flush()
        }))
    }

    /// Writes every changed directory block to its pack.
    pub fn flush(&self) -> Result<(), MfdError> {
        reported(self.directory().flush())
    }

    pub fn dump(&self, out: &mut dyn Write, indent: &str) -> io::Result<()> {
        let dir = self.directory();
        writeln!(out, "{indent}MFD manager")?;
        for (ldat, pack) in dir.packs.iter() {
            writeln!(
                out,
                "{indent}  LDAT {ldat} {} on {}: {} free tracks, {} MFD tracks, {} sectors used",
                pack.pack_name,
                pack.node_id,
                pack.free_space.free_track_count(),
                pack.mfd_track_count,
                pack.mfd_sectors_used
            )?;
            writeln!(out, "{indent}    {}", pack.free_space)?;
        }
        writeln!(
            out,
            "{indent}  {} free directory sectors, {} cached tracks",
            dir.catalog.free_sectors.len(),
            dir.cache.track_count()
        )?;
        for (qualifier, files) in dir.catalog.lookup.iter() {
            for (filename, lead) in files {
                writeln!(out, "{indent}  {qualifier}*{filename} lead item {lead}")?;
            }
        }
        for fas in dir.allocations.iter() {
            writeln!(out, "{indent}  {fas}")?;
        }
        Ok(())
    }
}

impl Directory<'_> {
    fn reset(&mut self) {
        self.allocations.clear();
        self.packs.clear();
        *self.catalog = Catalog::default();
        self.cache.clear();
    }

    fn free_track_count(&self) -> TrackCount {
        self.packs
            .values()
            .map(|p| p.free_space.free_track_count())
            .sum()
    }

    fn pack(&self, ldat: LdatIndex) -> Result<&PackDescriptor, MfdError> {
        self.packs.get(&ldat).ok_or(MfdError::UnknownLdat(ldat))
    }

    fn pack_mut(&mut self, ldat: LdatIndex) -> Result<&mut PackDescriptor, MfdError> {
        self.packs.get_mut(&ldat).ok_or(MfdError::UnknownLdat(ldat))
    }

    fn sector(&self, address: MfdRelativeAddress) -> Result<&[Word36], MfdError> {
        self.cache
            .sector(address)
            .ok_or(MfdError::SectorNotCached(address))
    }

    /// The sector, for changing.  Its block is marked for writing.
    fn update_sector(&mut self, address: MfdRelativeAddress) -> Result<&mut [Word36], MfdError> {
        let sectors_per_block = self.pack(address.ldat())?.geometry.sectors_per_block();
        if !self.cache.contains_track(address) {
            return Err(MfdError::SectorNotCached(address));
        }
        self.cache.mark_dirty(address, sectors_per_block);
        self.cache
            .sector_mut(address)
            .ok_or(MfdError::SectorNotCached(address))
    }

    /// The DAS sector describing `address` and the index of the first
    /// word of its entry for `address`'s track.
    fn das_entry(&self, address: MfdRelativeAddress) -> Result<(MfdRelativeAddress, usize), MfdError> {
        let das_address = address.das_address();
        let base = 3 * address.das_entry();
        let das = self
            .cache
            .sector(das_address)
            .ok_or(MfdError::DasNotFound(address))?;
        if base != 0 && das[base] == NO_LINK {
            return Err(MfdError::DasNotFound(address));
        }
        Ok((das_address, base))
    }

    fn is_sector_allocated(&self, address: MfdRelativeAddress) -> Result<bool, MfdError> {
        let (das_address, base) = self.das_entry(address)?;
        Ok(das_marks(self.sector(das_address)?, base, address.sector_id()))
    }

    fn mark_sector_allocated(&mut self, address: MfdRelativeAddress) -> Result<(), MfdError> {
        let (das_address, base) = self.das_entry(address)?;
        let (offset, mask) = sector_bit(address.sector_id());
        let das = self.update_sector(das_address)?;
        das[base + offset] = Word36::masked(das[base + offset].bits() | mask);
        self.pack_mut(address.ldat())?.mfd_sectors_used += 1;
        Ok(())
    }

    /// Adds the tracks of the directory to the allocation set of
    /// SYS$*MFD$$.
    fn map_mfd_track(&mut self, address: MfdRelativeAddress, device_track: TrackId) -> Result<(), MfdError> {
        let main0 = self
            .catalog
            .mfd_main_item0
            .ok_or_else(|| MfdError::DirectoryCorrupt("SYS$*MFD$$ is not cataloged".to_string()))?;
        let fas = self
            .allocations
            .get_mut(main0)
            .ok_or(MfdError::AllocationsNotLoaded(main0))?;
        fas.merge_in(FileAllocation::new(
            address.mfd_file_track(),
            1,
            address.ldat(),
            device_track,
        ));
        fas.is_updated = false;
        Ok(())
    }

    fn mfd_track_location(&self, address: MfdRelativeAddress) -> Result<(LdatIndex, TrackId), MfdError> {
        let main0 = self
            .catalog
            .mfd_main_item0
            .ok_or_else(|| MfdError::DirectoryCorrupt("SYS$*MFD$$ is not cataloged".to_string()))?;
        self.allocations
            .get(main0)
            .ok_or(MfdError::AllocationsNotLoaded(main0))?
            .find(address.mfd_file_track())
            .ok_or_else(|| {
                MfdError::DirectoryCorrupt(format!("MFD track of {address} has no storage"))
            })
    }

    /// Preps one pack, gives it its LDAT and loads its first DAS.
    fn initialize_pack(&mut self, ldat: LdatIndex, pack: &FixedPack) -> Result<(), MfdError> {
        let node_id = pack.node_id;
        let mut packet = IoPacket::prep(
            node_id,
            &pack.pack_name,
            pack.prep_factor,
            pack.track_count,
            false,
        );
        self.channel.route(&mut packet);
        packet
            .check()
            .map_err(|status| MfdError::PrepRejected { node_id, status })?;

        let label = self.channel.read_label(node_id).map_err(io_error(node_id))?;
        let info = LabelInfo::parse(&label).map_err(|error| MfdError::BadLabel { node_id, error })?;
        let geometry = info.geometry;
        let layout = MbtLayout::new(&geometry);

        let mut directory = self
            .channel
            .read_track(node_id, &geometry, 1)
            .map_err(io_error(node_id))?;
        directory[SECTOR_ONE_LDAT] = directory[SECTOR_ONE_LDAT].with_h1(u64::from(ldat.0));
        self.channel
            .write_track(node_id, &geometry, 1, &directory)
            .map_err(io_error(node_id))?;

        let mut free_space = PackFreeSpaceTable::new(geometry.track_count);
        free_space
            .allocate_specific(TrackRegion::new(0, layout.reserved_tracks()))
            .map_err(|e| MfdError::FreeSpace(ldat, e))?;

        let das_track = layout.first_das_track();
        let das = self
            .channel
            .read_track(node_id, &geometry, das_track)
            .map_err(io_error(node_id))?;

        event!(
            Level::INFO,
            "pack {} on {node_id} is LDAT {ldat}, {} tracks free",
            pack.pack_name,
            free_space.free_track_count()
        );
        self.packs.insert(
            ldat,
            PackDescriptor {
                node_id,
                pack_name: info.pack_name,
                geometry,
                free_space,
                first_das_track: das_track,
                mfd_track_count: 1,
                mfd_sectors_used: 0,
            },
        );

        let das_address = MfdRelativeAddress::new(ldat, 0, 0);
        self.cache.insert_track(das_address, das);
        self.mark_sector_allocated(das_address)?;
        self.catalog
            .free_sectors
            .extend(das_address.sectors_of_track().skip(1));
        Ok(())
    }

    /// Catalogs SYS$*MFD$$ and gives it the first DAS track of every
    /// pack.
    fn bootstrap_mfd_file(&mut self, request: &CatalogRequest) -> Result<(), MfdError> {
        let first = *self.packs.keys().next().ok_or(MfdError::NoFixedPacks)?;
        let lead0 = self.allocate_directory_sector(Some(first))?;
        let main0 = self.allocate_directory_sector(Some(first))?;
        let main1 = self.allocate_directory_sector(Some(first))?;
        let now = software_time(SystemTime::now());

        populate_lead_item0(self.update_sector(lead0)?, request, FILE_TYPE_FIXED, main0);
        populate_main_item0(self.update_sector(main0)?, request, lead0, main1, first, now);
        populate_main_item1(self.update_sector(main1)?, request, main0);

        let mut fas = FileAllocationSet::new(main0, None);
        for (ldat, pack) in self.packs.iter() {
            let address = MfdRelativeAddress::new(*ldat, 0, 0);
            fas.merge_in(FileAllocation::new(
                address.mfd_file_track(),
                1,
                *ldat,
                pack.first_das_track,
            ));
        }
        let highest = fas.highest_track_allocated;
        set_highest_granules(self.update_sector(main0)?, highest, highest);
        fas.is_updated = false;
        self.allocations.insert(fas);
        self.catalog.mfd_main_item0 = Some(main0);
        self.catalog.insert(&request.qualifier, &request.filename, lead0);
        event!(
            Level::INFO,
            "cataloged {}*{}: lead item {lead0}, main item {main0}",
            request.qualifier,
            request.filename
        );
        Ok(())
    }

    /// Chooses a pack for a new MFD track: the preferred one if it has
    /// room, else the one with the most free tracks.
    fn choose_directory_pack(&self, preferred: Option<LdatIndex>) -> Option<LdatIndex> {
        let usable = |p: &PackDescriptor| {
            p.mfd_track_count < MAX_MFD_TRACKS_PER_PACK && p.free_space.free_track_count() > 0
        };
        preferred
            .filter(|ldat| self.packs.get(ldat).is_some_and(usable))
            .or_else(|| {
                self.packs
                    .iter()
                    .filter(|&(_, p)| usable(p))
                    .max_by_key(|(ldat, p)| (p.free_space.free_track_count(), Reverse(**ldat)))
                    .map(|(ldat, _)| *ldat)
            })
    }

    fn allocate_directory_track(
        &mut self,
        preferred: Option<LdatIndex>,
    ) -> Result<MfdRelativeAddress, MfdError> {
        let ldat = self
            .choose_directory_pack(preferred)
            .ok_or(MfdError::NoDirectorySpace)?;
        let pack = self.pack_mut(ldat)?;
        let device_track = pack
            .free_space
            .allocate_track()
            .ok_or(MfdError::NoDirectorySpace)?;
        let mfd_track = pack.mfd_track_count;
        pack.mfd_track_count += 1;
        let address = MfdRelativeAddress::new(ldat, mfd_track, 0);
        let device_word = Word36::masked(device_track * WORDS_PER_TRACK);

        self.map_mfd_track(address, device_track)?;
        self.cache.insert_track(address, Vec::new());
        let first_free = if address.das_entry() == 0 {
            let das = self.update_sector(address)?;
            das[0] = device_word.with_s1(DAS_FIXED);
            for entry in (3..DAS_NEXT).step_by(3) {
                das[entry] = NO_LINK;
            }
            das[DAS_NEXT] = NO_LINK;
            let previous = MfdRelativeAddress::new(ldat, mfd_track - TRACKS_PER_DAS, 0);
            self.update_sector(previous)?[DAS_NEXT] = device_word;
            self.mark_sector_allocated(address)?;
            1
        } else {
            let (das_address, base) = (address.das_address(), 3 * address.das_entry());
            let das = self.update_sector(das_address)?;
            das[base] = device_word;
            das[base + 1] = Word36::ZERO;
            das[base + 2] = Word36::ZERO;
            0
        };
        self.catalog
            .free_sectors
            .extend(address.sectors_of_track().skip(first_free));
        event!(
            Level::DEBUG,
            "MFD track {address} is device track {device_track} of LDAT {ldat}"
        );
        Ok(address)
    }

    fn allocate_directory_sector(
        &mut self,
        preferred: Option<LdatIndex>,
    ) -> Result<MfdRelativeAddress, MfdError> {
        if self.catalog.free_sectors.is_empty() {
            self.allocate_directory_track(preferred)?;
        }
        let first_free_on = |ldat: LdatIndex| {
            self.catalog
                .free_sectors
                .range(
                    MfdRelativeAddress::new(ldat, 0, 0)
                        ..=MfdRelativeAddress::new(ldat, MAX_MFD_TRACKS_PER_PACK, 0o77),
                )
                .next()
                .copied()
        };
        let mut by_use: Vec<(u64, LdatIndex)> = self
            .packs
            .iter()
            .map(|(ldat, p)| (p.mfd_sectors_used, *ldat))
            .collect();
        by_use.sort();
        let chosen = preferred
            .and_then(first_free_on)
            .or_else(|| by_use.iter().find_map(|(_, ldat)| first_free_on(*ldat)))
            .ok_or(MfdError::NoDirectorySpace)?;

        self.catalog.free_sectors.remove(&chosen);
        self.mark_sector_allocated(chosen)?;
        self.update_sector(chosen)?.fill(Word36::ZERO);
        Ok(chosen)
    }

    fn release_directory_sector(&mut self, address: MfdRelativeAddress) -> Result<(), MfdError> {
        if address.das_entry() == 0 && address.sector_id() == 0 {
            return Err(MfdError::SectorNotAllocated(address));
        }
        if !self.is_sector_allocated(address)? {
            return Err(MfdError::SectorNotAllocated(address));
        }
        let (das_address, base) = self.das_entry(address)?;
        let (offset, mask) = sector_bit(address.sector_id());
        let das = self.update_sector(das_address)?;
        das[base + offset] = Word36::masked(das[base + offset].bits() & !mask);
        let pack = self.pack_mut(address.ldat())?;
        pack.mfd_sectors_used = pack.mfd_sectors_used.saturating_sub(1);
        self.catalog.free_sectors.insert(address);
        Ok(())
    }

    fn catalog_file(&mut self, request: &CatalogRequest) -> Result<MfdRelativeAddress, MfdError> {
        if self
            .catalog
            .lookup(&request.qualifier, &request.filename)
            .is_some()
        {
            return Err(MfdError::FileAlreadyCataloged {
                qualifier: request.qualifier.clone(),
                filename: request.filename.clone(),
            });
        }
        let lead0 = self.allocate_directory_sector(None)?;
        let ldat = lead0.ldat();
        let main0 = self.allocate_directory_sector(Some(ldat))?;
        let main1 = self.allocate_directory_sector(Some(ldat))?;
        let now = software_time(SystemTime::now());
        populate_lead_item0(self.update_sector(lead0)?, request, FILE_TYPE_FIXED, main0);
        populate_main_item0(self.update_sector(main0)?, request, lead0, main1, ldat, now);
        populate_main_item1(self.update_sector(main1)?, request, main0);
        self.catalog.insert(&request.qualifier, &request.filename, lead0);
        event!(
            Level::INFO,
            "cataloged {}*{}({}) at main item {main0}",
            request.qualifier,
            request.filename,
            request.absolute_cycle
        );
        Ok(main0)
    }

    fn main_item(&self, main_item0: MfdRelativeAddress) -> Result<MainItem, MfdError> {
        let sector = self.sector(main_item0)?;
        if !is_main_item0(sector) {
            return Err(MfdError::NotMainItem(main_item0));
        }
        Ok(MainItem::parse(sector))
    }

    /// Follows a DAD chain, guarding against loops.
    fn dad_chain(&self, main_item0: MfdRelativeAddress) -> Result<Vec<(MfdRelativeAddress, DadItem)>, MfdError> {
        let limit = self.cache.track_count() * SECTORS_PER_TRACK as usize;
        let mut chain = Vec::new();
        let mut link = self.main_item(main_item0)?.first_dad;
        while let Some(address) = link {
            if chain.len() > limit {
                return Err(MfdError::DirectoryCorrupt(format!(
                    "DAD chain of {main_item0} does not end"
                )));
            }
            let dad = DadItem::parse(self.sector(address)?);
            link = dad.next;
            chain.push((address, dad));
        }
        Ok(chain)
    }

    fn load_file_allocations(&mut self, main_item0: MfdRelativeAddress) -> Result<(), MfdError> {
        if self.allocations.contains(main_item0) {
            return Err(MfdError::AllocationsAlreadyLoaded(main_item0));
        }
        let main = self.main_item(main_item0)?;
        let mut fas = FileAllocationSet::new(main_item0, main.first_dad);
        for (_, dad) in self.dad_chain(main_item0)? {
            for alloc in dad.allocations() {
                fas.merge_in(alloc);
            }
        }
        fas.is_updated = false;
        event!(
            Level::DEBUG,
            "loaded allocations of {main_item0}: {} tracks",
            fas.track_count()
        );
        self.allocations.insert(fas);
        Ok(())
    }

    /// Chooses a pack for file storage: the preferred one if it has
    /// any free track, else the one with the most.
    fn choose_file_pack(&self, preferred: LdatIndex) -> Option<LdatIndex> {
        if self
            .packs
            .get(&preferred)
            .is_some_and(|p| p.free_space.free_track_count() > 0)
        {
            return Some(preferred);
        }
        self.packs
            .iter()
            .filter(|(_, p)| p.free_space.free_track_count() > 0)
            .max_by_key(|(ldat, p)| (p.free_space.free_track_count(), Reverse(**ldat)))
            .map(|(ldat, _)| *ldat)
    }

    fn allocate_file_tracks(
        &mut self,
        main_item0: MfdRelativeAddress,
        region: TrackRegion,
    ) -> Result<(), MfdError> {
        let preferred = self.main_item(main_item0)?.preferred_ldat;
        let fas = self
            .allocations
            .get(main_item0)
            .ok_or(MfdError::AllocationsNotLoaded(main_item0))?;

        // Runs of file tracks with no storage yet.
        let mut runs = Vec::new();
        let mut track = region.track_id;
        while track < region.limit() {
            if fas.find(track).is_some() {
                track += 1;
                continue;
            }
            let start = track;
            while track < region.limit() && fas.find(track).is_none() {
                track += 1;
            }
            runs.push(TrackRegion::new(start, track - start));
        }

        for run in runs {
            let mut next = run.track_id;
            while next < run.limit() {
                let wanted = run.limit() - next;
                let ldat = self
                    .choose_file_pack(preferred)
                    .ok_or(MfdError::OutOfSpace { requested: wanted })?;
                let got = self
                    .pack_mut(ldat)?
                    .free_space
                    .allocate_region(wanted)
                    .ok_or(MfdError::OutOfSpace { requested: wanted })?;
                let fas = self
                    .allocations
                    .get_mut(main_item0)
                    .ok_or(MfdError::AllocationsNotLoaded(main_item0))?;
                fas.merge_in(FileAllocation::new(next, got.track_count, ldat, got.track_id));
                event!(
                    Level::DEBUG,
                    "file {main_item0} tracks {} are LDAT {ldat} tracks {got}",
                    TrackRegion::new(next, got.track_count)
                );
                next += got.track_count;
            }
        }
        Ok(())
    }

    fn release_file_tracks(
        &mut self,
        main_item0: MfdRelativeAddress,
        region: TrackRegion,
    ) -> Result<(), MfdError> {
        let fas = self
            .allocations
            .get_mut(main_item0)
            .ok_or(MfdError::AllocationsNotLoaded(main_item0))?;
        let (ldat, device_track) = fas
            .extract_region(region)
            .ok_or(MfdError::TrackNotAllocated(LdatIndex::INVALID, region))?;
        let device_region = TrackRegion::new(device_track, region.track_count);
        self.pack_mut(ldat)?
            .free_space
            .mark_unallocated(device_region)
            .map_err(|_| MfdError::TrackNotAllocated(ldat, device_region))
    }

    fn clear_file_tracks(
        &mut self,
        main_item0: MfdRelativeAddress,
        region: TrackRegion,
    ) -> Result<(), MfdError> {
        let fas = self
            .allocations
            .get(main_item0)
            .ok_or(MfdError::AllocationsNotLoaded(main_item0))?;
        let zeroes = vec![Word36::ZERO; WORDS_PER_TRACK as usize];
        for file_track in region.track_id..region.limit() {
            let Some((ldat, device_track)) = fas.find(file_track) else {
                continue;
            };
            let pack = self.pack(ldat)?;
            self.channel
                .write_track(pack.node_id, &pack.geometry, device_track, &zeroes)
                .map_err(io_error(pack.node_id))?;
        }
        Ok(())
    }

    fn write_file_allocations(&mut self, main_item0: MfdRelativeAddress) -> Result<(), MfdError> {
        let fas = self
            .allocations
            .get(main_item0)
            .ok_or(MfdError::AllocationsNotLoaded(main_item0))?;
        // The DAS chains describe the directory's own tracks.
        if !fas.is_updated || self.catalog.mfd_main_item0 == Some(main_item0) {
            return Ok(());
        }
        let entries = dad_entries(fas);
        let highest = fas.highest_track_allocated;

        for (address, _) in self.dad_chain(main_item0)? {
            self.release_directory_sector(address)?;
        }
        let mut items = dad_items(&entries);
        let mut addresses = Vec::with_capacity(items.len());
        for _ in 0..items.len() {
            addresses.push(self.allocate_directory_sector(Some(main_item0.ldat()))?);
        }
        for (index, item) in items.iter_mut().enumerate() {
            item.previous = if index == 0 {
                main_item0
            } else {
                addresses[index - 1]
            };
            item.next = addresses.get(index + 1).copied();
            item.populate(self.update_sector(addresses[index])?);
        }

        let written = self.main_item(main_item0)?.highest_track_written;
        let first_dad = addresses.first().copied();
        let main = self.update_sector(main_item0)?;
        set_first_dad(main, first_dad);
        set_highest_granules(main, highest, written);

        if let Some(fas) = self.allocations.get_mut(main_item0) {
            fas.dad_item0_address = first_dad;
            fas.is_updated = false;
        }
        event!(
            Level::DEBUG,
            "wrote {} DADs for {main_item0}",
            addresses.len()
        );
        Ok(())
    }

    fn flush(&mut self) -> Result<(), MfdError> {
        let blocks: Vec<MfdRelativeAddress> = self.cache.dirty_blocks().collect();
        for block_address in &blocks {
            let (ldat, device_track) = self.mfd_track_location(*block_address)?;
            let pack = self.pack(ldat)?;
            let sectors_per_block = pack.geometry.sectors_per_block();
            let block_id = pack.geometry.first_block_of_track(device_track)
                + block_address.sector_id() / sectors_per_block;
            let words = self
                .cache
                .block(*block_address, sectors_per_block)
                .ok_or(MfdError::SectorNotCached(*block_address))?
                .to_vec();
            self.channel
                .write_block(pack.node_id, block_id, words)
                .map_err(io_error(pack.node_id))?;
        }
        self.cache.clear_dirty();
        if !blocks.is_empty() {
            event!(Level::DEBUG, "flushed {} MFD blocks", blocks.len());
        }
        Ok(())
    }

    /// Reads the directory tracks of one pack into the cache and
    /// rebuilds its free space.  Returns the MFD tracks found, with
    /// their device tracks; a removable pack has none.
    fn recover_pack(&mut self, node_id: NodeId) -> Result<Vec<(MfdRelativeAddress, TrackId)>, MfdError> {
        let label = self.channel.read_label(node_id).map_err(io_error(node_id))?;
        let info = LabelInfo::parse(&label).map_err(|error| MfdError::BadLabel { node_id, error })?;
        let geometry = info.geometry;
        let layout = MbtLayout::new(&geometry);
        let directory = self
            .channel
            .read_track(node_id, &geometry, 1)
            .map_err(io_error(node_id))?;
        let sector1 = SectorOneInfo::parse(&directory[WORDS_PER_SECTOR as usize..]);
        if sector1.is_removable() {
            event!(Level::INFO, "skipping removable pack {} on {node_id}", info.pack_name);
            return Ok(Vec::new());
        }
        let ldat = LdatIndex(sector1.ldat_word as u32);
        if !ldat.is_valid() {
            return Err(MfdError::UninitializedPack(node_id));
        }
        if self.packs.contains_key(&ldat) {
            return Err(MfdError::DirectoryCorrupt(format!(
                "LDAT {ldat} is on more than one pack"
            )));
        }

        let mut free_space = PackFreeSpaceTable::new(geometry.track_count);
        free_space
            .allocate_specific(TrackRegion::new(0, layout.reserved_tracks()))
            .map_err(|e| MfdError::FreeSpace(ldat, e))?;

        let mut tracks = Vec::new();
        let mut free_sectors = Vec::new();
        let mut sectors_used = 0;
        let mut das_track = layout.first_das_track();
        let mut group = 0;
        loop {
            let das_address = MfdRelativeAddress::new(ldat, group * TRACKS_PER_DAS, 0);
            if group > 0 {
                free_space
                    .mark_allocated(TrackRegion::new(das_track, 1))
                    .map_err(|e| MfdError::FreeSpace(ldat, e))?;
            }
            let das_words = self
                .channel
                .read_track(node_id, &geometry, das_track)
                .map_err(io_error(node_id))?;
            let das = das_words[..WORDS_PER_SECTOR as usize].to_vec();
            self.cache.insert_track(das_address, das_words);
            tracks.push((das_address, das_track));

            for entry in 0..TRACKS_PER_DAS {
                let base = 3 * entry as usize;
                let address = MfdRelativeAddress::new(ldat, das_address.track_id() + entry, 0);
                if entry > 0 {
                    if das[base] == NO_LINK {
                        continue;
                    }
                    let device_track = das[base].bits() / WORDS_PER_TRACK;
                    free_space
                        .mark_allocated(TrackRegion::new(device_track, 1))
                        .map_err(|e| MfdError::FreeSpace(ldat, e))?;
                    let words = self
                        .channel
                        .read_track(node_id, &geometry, device_track)
                        .map_err(io_error(node_id))?;
                    self.cache.insert_track(address, words);
                    tracks.push((address, device_track));
                }
                for sector in address.sectors_of_track() {
                    if das_marks(&das, base, sector.sector_id()) {
                        sectors_used += 1;
                    } else {
                        free_sectors.push(sector);
                    }
                }
            }

            if das[DAS_NEXT] == NO_LINK {
                break;
            }
            das_track = das[DAS_NEXT].bits() / WORDS_PER_TRACK;
            group += 1;
        }

        let mfd_track_count = tracks
            .iter()
            .map(|(address, _)| address.track_id() + 1)
            .max()
            .unwrap_or(1);
        event!(
            Level::INFO,
            "recovered pack {} on {node_id} as LDAT {ldat}: {mfd_track_count} MFD tracks",
            info.pack_name
        );
        self.catalog.free_sectors.extend(free_sectors);
        self.packs.insert(
            ldat,
            PackDescriptor {
                node_id,
                pack_name: info.pack_name,
                geometry,
                free_space,
                first_das_track: layout.first_das_track(),
                mfd_track_count,
                mfd_sectors_used: sectors_used,
            },
        );
        Ok(tracks)
    }

    /// Scans the recovered directory for lead and main items, rebuilds
    /// the file lookup and takes the tracks of every file out of free
    /// space.
    fn rebuild_catalog(
        &mut self,
        identity: &SystemIdentity,
        mfd_tracks: &[(MfdRelativeAddress, TrackId)],
    ) -> Result<(), MfdError> {
        let mut leads = Vec::new();
        let mut mains = Vec::new();
        let track_addresses: Vec<MfdRelativeAddress> = self.cache.track_addresses().collect();
        for track in track_addresses {
            for address in track.sectors_of_track() {
                if address.das_entry() == 0 && address.sector_id() == 0 {
                    continue;
                }
                if !self.is_sector_allocated(address)? {
                    continue;
                }
                let sector = self.sector(address)?;
                if is_lead_item0(sector) {
                    leads.push((address, LeadItem::parse(sector)));
                } else if is_main_item0(sector) {
                    mains.push(address);
                }
            }
        }
        for (address, lead) in &leads {
            self.catalog.insert(&lead.qualifier, &lead.filename, *address);
        }

        let mfd_main0 = leads
            .iter()
            .find(|(_, lead)| lead.qualifier == identity.qualifier && lead.filename == MFD_FILENAME)
            .and_then(|(_, lead)| lead.latest_cycle())
            .ok_or_else(|| {
                MfdError::DirectoryCorrupt(format!(
                    "{}*{MFD_FILENAME} is not cataloged",
                    identity.qualifier
                ))
            })?;
        let mut fas = FileAllocationSet::new(mfd_main0, None);
        for (address, device_track) in mfd_tracks {
            fas.merge_in(FileAllocation::new(
                address.mfd_file_track(),
                1,
                address.ldat(),
                *device_track,
            ));
        }
        fas.is_updated = false;
        self.allocations.insert(fas);
        self.catalog.mfd_main_item0 = Some(mfd_main0);

        for main0 in mains {
            if main0 == mfd_main0 {
                continue;
            }
            for (_, dad) in self.dad_chain(main0)? {
                for alloc in dad.allocations() {
                    let region = TrackRegion::new(alloc.device_track_id, alloc.file_region.track_count);
                    self.pack_mut(alloc.ldat)?
                        .free_space
                        .mark_allocated(region)
                        .map_err(|e| MfdError::FreeSpace(alloc.ldat, e))?;
                }
            }
        }
        event!(
            Level::INFO,
            "recovered {} file sets, {} free directory sectors",
            leads.len(),
            self.catalog.free_sectors.len()
        );
        Ok(())
    }
}
