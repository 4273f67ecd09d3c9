//! File allocation sets.
//!
//! An assigned file has a set of allocations, each mapping a run of
//! file-relative tracks onto a run of device-relative tracks on one
//! pack.  The allocations are kept sorted by file track and never
//! overlap.
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use super::mfd::MfdRelativeAddress;
use super::types::{LdatIndex, TrackCount, TrackId, TrackRegion};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAllocation {
    pub file_region: TrackRegion,
    pub ldat: LdatIndex,
    pub device_track_id: TrackId,
}

impl FileAllocation {
    pub const fn new(
        file_track_id: TrackId,
        track_count: TrackCount,
        ldat: LdatIndex,
        device_track_id: TrackId,
    ) -> FileAllocation {
        FileAllocation {
            file_region: TrackRegion::new(file_track_id, track_count),
            ldat,
            device_track_id,
        }
    }

    /// The device track after the last one in the allocation.
    pub const fn device_limit(&self) -> TrackId {
        self.device_track_id + self.file_region.track_count
    }

    /// True when `next` carries on from the end of this allocation on
    /// the same pack, both in the file and on the device.
    fn is_continued_by(&self, next: &FileAllocation) -> bool {
        self.ldat == next.ldat
            && self.file_region.limit() == next.file_region.track_id
            && self.device_limit() == next.device_track_id
    }
}

impl Display for FileAllocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "file {} -> ldat {} track {}",
            self.file_region, self.ldat, self.device_track_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAllocationSet {
    pub main_item0_address: MfdRelativeAddress,
    pub dad_item0_address: Option<MfdRelativeAddress>,
    pub is_updated: bool,
    pub highest_track_allocated: TrackId,
    allocations: Vec<FileAllocation>,
}

impl FileAllocationSet {
    pub fn new(
        main_item0_address: MfdRelativeAddress,
        dad_item0_address: Option<MfdRelativeAddress>,
    ) -> FileAllocationSet {
        FileAllocationSet {
            main_item0_address,
            dad_item0_address,
            is_updated: false,
            highest_track_allocated: 0,
            allocations: Vec::new(),
        }
    }

    pub fn allocations(&self) -> &[FileAllocation] {
        &self.allocations
    }

    pub fn track_count(&self) -> TrackCount {
        self.allocations
            .iter()
            .map(|a| a.file_region.track_count)
            .sum()
    }

    /// Adds an allocation, joining it to its neighbours where they are
    /// contiguous on the same pack.  The caller guarantees that the
    /// new allocation overlaps none of the existing ones.
    pub fn merge_in(&mut self, new: FileAllocation) {
        if new.file_region.track_count == 0 {
            return;
        }
        let index = self
            .allocations
            .partition_point(|a| a.file_region.track_id < new.file_region.track_id);

        if index > 0 && self.allocations[index - 1].is_continued_by(&new) {
            self.allocations[index - 1].file_region.track_count += new.file_region.track_count;
            if index < self.allocations.len()
                && self.allocations[index - 1].is_continued_by(&self.allocations[index])
            {
                let next = self.allocations.remove(index);
                self.allocations[index - 1].file_region.track_count +=
                    next.file_region.track_count;
            }
        } else if index < self.allocations.len() && new.is_continued_by(&self.allocations[index]) {
            let next = &mut self.allocations[index];
            next.file_region.track_id = new.file_region.track_id;
            next.file_region.track_count += new.file_region.track_count;
            next.device_track_id = new.device_track_id;
        } else {
            self.allocations.insert(index, new);
        }

        self.is_updated = true;
        let last = new.file_region.limit() - 1;
        if last > self.highest_track_allocated {
            self.highest_track_allocated = last;
        }
    }

    /// Removes a run of file tracks which must lie inside a single
    /// allocation, returning the pack and the first device track the
    /// run occupied.  Returns `None` if no allocation holds the run.
    pub fn extract_region(&mut self, region: TrackRegion) -> Option<(LdatIndex, TrackId)> {
        if region.track_count == 0 {
            return None;
        }
        let index = self
            .allocations
            .iter()
            .position(|a| a.file_region.encloses(&region))?;
        let alloc = self.allocations[index];
        let device_track_id = alloc.device_track_id + (region.track_id - alloc.file_region.track_id);
        let front = region.track_id - alloc.file_region.track_id;
        let back = alloc.file_region.limit() - region.limit();

        match (front, back) {
            (0, 0) => {
                self.allocations.remove(index);
            }
            (0, _) => {
                let a = &mut self.allocations[index];
                a.file_region.track_id += region.track_count;
                a.file_region.track_count -= region.track_count;
                a.device_track_id += region.track_count;
            }
            (_, 0) => self.allocations[index].file_region.track_count -= region.track_count,
            (_, _) => {
                self.allocations[index].file_region.track_count = front;
                self.allocations.insert(
                    index + 1,
                    FileAllocation::new(
                        region.limit(),
                        back,
                        alloc.ldat,
                        device_track_id + region.track_count,
                    ),
                );
            }
        }
        self.is_updated = true;
        Some((alloc.ldat, device_track_id))
    }

    /// Converts a file-relative track into the pack and device track
    /// which hold it.
    pub fn find(&self, file_track_id: TrackId) -> Option<(LdatIndex, TrackId)> {
        self.allocations
            .iter()
            .find(|a| a.file_region.contains(file_track_id))
            .map(|a| {
                (
                    a.ldat,
                    a.device_track_id + (file_track_id - a.file_region.track_id),
                )
            })
    }
}

impl Display for FileAllocationSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "main item {} highest track {}{}",
            self.main_item0_address,
            self.highest_track_allocated,
            if self.is_updated { " (updated)" } else { "" }
        )?;
        for alloc in &self.allocations {
            write!(f, "\n  {alloc}")?;
        }
        Ok(())
    }
}

/// The allocation sets of every assigned file, keyed by main item 0
/// address.
#[derive(Debug, Default)]
pub struct FileAllocationTable {
    sets: BTreeMap<MfdRelativeAddress, FileAllocationSet>,
}

impl FileAllocationTable {
    pub fn new() -> FileAllocationTable {
        FileAllocationTable::default()
    }

    pub fn insert(&mut self, set: FileAllocationSet) {
        self.sets.insert(set.main_item0_address, set);
    }

    pub fn get(&self, main_item0_address: MfdRelativeAddress) -> Option<&FileAllocationSet> {
        self.sets.get(&main_item0_address)
    }

    pub fn get_mut(
        &mut self,
        main_item0_address: MfdRelativeAddress,
    ) -> Option<&mut FileAllocationSet> {
        self.sets.get_mut(&main_item0_address)
    }

    pub fn remove(&mut self, main_item0_address: MfdRelativeAddress) -> Option<FileAllocationSet> {
        self.sets.remove(&main_item0_address)
    }

    pub fn contains(&self, main_item0_address: MfdRelativeAddress) -> bool {
        self.sets.contains_key(&main_item0_address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileAllocationSet> {
        self.sets.values()
    }

    pub fn clear(&mut self) {
        self.sets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::any;
    use test_strategy::{proptest, Arbitrary};

    const L1: LdatIndex = LdatIndex(1);
    const L2: LdatIndex = LdatIndex(2);

    fn new_set() -> FileAllocationSet {
        FileAllocationSet::new(MfdRelativeAddress::new(L1, 0, 2), None)
    }

    #[test]
    fn test_merge_extends_predecessor() {
        let mut fas = new_set();
        fas.merge_in(FileAllocation::new(0, 10, L1, 100));
        fas.merge_in(FileAllocation::new(10, 5, L1, 110));
        assert_eq!(fas.allocations(), &[FileAllocation::new(0, 15, L1, 100)]);
        assert_eq!(fas.highest_track_allocated, 14);
        assert!(fas.is_updated);
    }

    #[test]
    fn test_merge_requires_device_contiguity() {
        let mut fas = new_set();
        fas.merge_in(FileAllocation::new(0, 10, L1, 100));
        fas.merge_in(FileAllocation::new(10, 5, L1, 200));
        fas.merge_in(FileAllocation::new(15, 5, L2, 205));
        assert_eq!(fas.allocations().len(), 3);
        assert_eq!(fas.track_count(), 20);
    }

    #[test]
    fn test_merge_prepends_and_fills_gap() {
        let mut fas = new_set();
        fas.merge_in(FileAllocation::new(20, 10, L1, 120));
        fas.merge_in(FileAllocation::new(15, 5, L1, 115));
        assert_eq!(fas.allocations(), &[FileAllocation::new(15, 15, L1, 115)]);
        fas.merge_in(FileAllocation::new(0, 10, L1, 100));
        fas.merge_in(FileAllocation::new(10, 5, L1, 110));
        assert_eq!(fas.allocations(), &[FileAllocation::new(0, 30, L1, 100)]);
        assert_eq!(fas.highest_track_allocated, 29);
    }

    #[test]
    fn test_extract() {
        let mut fas = new_set();
        fas.merge_in(FileAllocation::new(0, 100, L1, 1000));
        assert_eq!(fas.extract_region(TrackRegion::new(40, 10)), Some((L1, 1040)));
        assert_eq!(
            fas.allocations(),
            &[
                FileAllocation::new(0, 40, L1, 1000),
                FileAllocation::new(50, 50, L1, 1050)
            ]
        );
        assert_eq!(fas.extract_region(TrackRegion::new(0, 5)), Some((L1, 1000)));
        assert_eq!(fas.extract_region(TrackRegion::new(90, 10)), Some((L1, 1090)));
        assert_eq!(fas.extract_region(TrackRegion::new(50, 40)), Some((L1, 1050)));
        assert_eq!(fas.allocations(), &[FileAllocation::new(5, 35, L1, 1005)]);
        assert_eq!(fas.extract_region(TrackRegion::new(30, 20)), None);
        assert_eq!(fas.find(39), Some((L1, 1039)));
        assert_eq!(fas.find(40), None);
    }

    #[derive(Debug, Clone, Arbitrary)]
    struct Piece {
        #[strategy(1_u64..20)]
        length: u64,
        #[strategy(0_u64..3)]
        gap: u64,
        same_pack: bool,
        device_gap: bool,
    }

    #[proptest]
    fn merge_keeps_order_and_counts(
        #[strategy(proptest::collection::vec(any::<Piece>(), 1..30))] pieces: Vec<Piece>,
        order_seed: u64,
    ) {
        // Lay the pieces out along the file, then merge them in a
        // shuffled order.
        let mut file_track = 0;
        let mut device_track = 500;
        let mut allocs = Vec::new();
        for piece in &pieces {
            file_track += piece.gap;
            device_track += if piece.device_gap { 7 } else { 0 };
            let ldat = if piece.same_pack { L1 } else { L2 };
            allocs.push(FileAllocation::new(file_track, piece.length, ldat, device_track));
            file_track += piece.length;
            device_track += piece.length;
        }
        let mut seed = order_seed;
        let mut fas = new_set();
        let mut expected = 0;
        while !allocs.is_empty() {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let alloc = allocs.swap_remove((seed >> 33) as usize % allocs.len());
            fas.merge_in(alloc);
            expected += alloc.file_region.track_count;
            assert_eq!(fas.track_count(), expected);
            for pair in fas.allocations().windows(2) {
                assert!(pair[0].file_region.limit() <= pair[1].file_region.track_id);
            }
        }
        assert_eq!(fas.highest_track_allocated, file_track - 1);
        for file_track in 0..file_track {
            if let Some((ldat, _)) = fas.find(file_track) {
                assert!(ldat == L1 || ldat == L2);
            }
        }
    }
}
