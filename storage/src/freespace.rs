//! Free space on one pack.
//!
//! The table is a list of free track regions, kept sorted by track
//! id.  No two regions overlap and no two are adjacent: releasing a
//! region merges it with its neighbours.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use tracing::{event, Level};

use super::types::{TrackCount, TrackId, TrackRegion};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeSpaceError {
    /// The region to be allocated is not wholly inside one free region.
    NotFree(TrackRegion),
    /// Part of the region to be released is already free.
    AlreadyFree(TrackRegion),
    /// The region runs past the end of the pack.
    OutOfRange(TrackRegion),
    EmptyRegion,
}

impl Display for FreeSpaceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            FreeSpaceError::NotFree(r) => write!(f, "tracks {r} are not all free"),
            FreeSpaceError::AlreadyFree(r) => write!(f, "tracks {r} overlap free space"),
            FreeSpaceError::OutOfRange(r) => write!(f, "tracks {r} are beyond the pack"),
            FreeSpaceError::EmptyRegion => f.write_str("region has no tracks"),
        }
    }
}

impl Error for FreeSpaceError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackFreeSpaceTable {
    capacity: TrackCount,
    regions: Vec<TrackRegion>,
}

impl PackFreeSpaceTable {
    /// A table for an empty pack of `capacity` tracks.
    pub fn new(capacity: TrackCount) -> PackFreeSpaceTable {
        PackFreeSpaceTable {
            capacity,
            regions: if capacity == 0 {
                Vec::new()
            } else {
                vec![TrackRegion::new(0, capacity)]
            },
        }
    }

    /// A table for a pack on which every track is in use.
    pub fn full(capacity: TrackCount) -> PackFreeSpaceTable {
        PackFreeSpaceTable {
            capacity,
            regions: Vec::new(),
        }
    }

    pub fn capacity(&self) -> TrackCount {
        self.capacity
    }

    pub fn regions(&self) -> &[TrackRegion] {
        &self.regions
    }

    pub fn free_track_count(&self) -> TrackCount {
        self.regions.iter().map(|r| r.track_count).sum()
    }

    pub fn is_free(&self, track_id: TrackId) -> bool {
        self.regions.iter().any(|r| r.contains(track_id))
    }

    /// Allocates one track: the whole of the first one-track region if
    /// there is one, else the first track of the first region.
    pub fn allocate_track(&mut self) -> Option<TrackId> {
        let index = self
            .regions
            .iter()
            .position(|r| r.track_count == 1)
            .or(if self.regions.is_empty() { None } else { Some(0) })?;
        let track_id = self.regions[index].track_id;
        self.take_front(index, 1);
        Some(track_id)
    }

    /// Allocates one region of up to `track_count` tracks.  A free
    /// region of exactly that size is preferred, then the front of the
    /// first larger one; failing both, the largest region is taken
    /// whole.
    pub fn allocate_region(&mut self, track_count: TrackCount) -> Option<TrackRegion> {
        if track_count == 0 || self.regions.is_empty() {
            return None;
        }
        if let Some(index) = self
            .regions
            .iter()
            .position(|r| r.track_count == track_count)
        {
            return Some(self.regions.remove(index));
        }
        if let Some(index) = self
            .regions
            .iter()
            .position(|r| r.track_count > track_count)
        {
            let result = TrackRegion::new(self.regions[index].track_id, track_count);
            self.take_front(index, track_count);
            return Some(result);
        }
        let mut largest = 0;
        for (index, region) in self.regions.iter().enumerate() {
            if region.track_count > self.regions[largest].track_count {
                largest = index;
            }
        }
        Some(self.regions.remove(largest))
    }

    /// Allocates as many tracks as are free starting exactly at
    /// `track_id`, up to `track_count`.  Returns the number allocated,
    /// which may be zero.
    pub fn allocate_from(&mut self, track_id: TrackId, track_count: TrackCount) -> TrackCount {
        let Some(index) = self.regions.iter().position(|r| r.contains(track_id)) else {
            return 0;
        };
        let count = track_count.min(self.regions[index].limit() - track_id);
        if count > 0 {
            self.remove_inside(index, TrackRegion::new(track_id, count));
        }
        count
    }

    /// Allocates a region which must be wholly free, such as the label
    /// and directory tracks of a pack.
    pub fn allocate_specific(&mut self, region: TrackRegion) -> Result<(), FreeSpaceError> {
        self.mark_allocated(region)
    }

    pub fn mark_allocated(&mut self, region: TrackRegion) -> Result<(), FreeSpaceError> {
        if region.track_count == 0 {
            return Err(FreeSpaceError::EmptyRegion);
        }
        match self.regions.iter().position(|r| r.encloses(&region)) {
            Some(index) => {
                self.remove_inside(index, region);
                Ok(())
            }
            None => {
                event!(Level::DEBUG, "cannot allocate {region}: not free");
                Err(FreeSpaceError::NotFree(region))
            }
        }
    }

    /// Returns a region to free space.  None of it may be free already.
    pub fn mark_unallocated(&mut self, region: TrackRegion) -> Result<(), FreeSpaceError> {
        if region.track_count == 0 {
            return Err(FreeSpaceError::EmptyRegion);
        }
        if region.limit() > self.capacity {
            return Err(FreeSpaceError::OutOfRange(region));
        }
        // Index of the first free region after the released one.
        let index = self
            .regions
            .partition_point(|r| r.track_id < region.track_id);
        let overlaps_next = self
            .regions
            .get(index)
            .is_some_and(|next| next.track_id < region.limit());
        let overlaps_prev = index > 0 && self.regions[index - 1].limit() > region.track_id;
        if overlaps_next || overlaps_prev {
            event!(Level::DEBUG, "cannot release {region}: overlaps free space");
            return Err(FreeSpaceError::AlreadyFree(region));
        }

        let joins_prev = index > 0 && self.regions[index - 1].limit() == region.track_id;
        let joins_next = self
            .regions
            .get(index)
            .is_some_and(|next| next.track_id == region.limit());
        match (joins_prev, joins_next) {
            (true, true) => {
                let next = self.regions.remove(index);
                self.regions[index - 1].track_count += region.track_count + next.track_count;
            }
            (true, false) => self.regions[index - 1].track_count += region.track_count,
            (false, true) => {
                let next = &mut self.regions[index];
                next.track_id = region.track_id;
                next.track_count += region.track_count;
            }
            (false, false) => self.regions.insert(index, region),
        }
        Ok(())
    }

    fn take_front(&mut self, index: usize, track_count: TrackCount) {
        let region = &mut self.regions[index];
        if region.track_count == track_count {
            self.regions.remove(index);
        } else {
            region.track_id += track_count;
            region.track_count -= track_count;
        }
    }

    /// Removes `region` from the free region at `index`, which encloses it.
    fn remove_inside(&mut self, index: usize, region: TrackRegion) {
        let free = self.regions[index];
        if free.track_id == region.track_id {
            self.take_front(index, region.track_count);
        } else if free.limit() == region.limit() {
            self.regions[index].track_count -= region.track_count;
        } else {
            self.regions[index].track_count = region.track_id - free.track_id;
            self.regions.insert(
                index + 1,
                TrackRegion::new(region.limit(), free.limit() - region.limit()),
            );
        }
    }
}

impl Display for PackFreeSpaceTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "capacity {} free {}:",
            self.capacity,
            self.free_track_count()
        )?;
        for region in &self.regions {
            write!(f, " {region}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::any;
    use test_strategy::{proptest, Arbitrary};

    fn assert_well_formed(table: &PackFreeSpaceTable) {
        for pair in table.regions().windows(2) {
            assert!(
                pair[0].limit() < pair[1].track_id,
                "regions {} and {} are out of order, overlapping or adjacent",
                pair[0],
                pair[1]
            );
        }
        for region in table.regions() {
            assert!(region.track_count > 0);
            assert!(region.limit() <= table.capacity());
        }
    }

    #[test]
    fn test_allocate_and_release_coalesce() {
        let mut fst = PackFreeSpaceTable::new(10_000);
        fst.allocate_specific(TrackRegion::new(100, 10)).expect("free");
        fst.allocate_specific(TrackRegion::new(110, 10)).expect("free");
        assert_eq!(
            fst.regions(),
            &[TrackRegion::new(0, 100), TrackRegion::new(120, 9880)]
        );
        fst.mark_unallocated(TrackRegion::new(100, 10)).expect("in use");
        fst.mark_unallocated(TrackRegion::new(110, 10)).expect("in use");
        assert_eq!(fst.regions(), &[TrackRegion::new(0, 10_000)]);
    }

    #[test]
    fn test_allocate_specific_requires_free_space() {
        let mut fst = PackFreeSpaceTable::new(10_000);
        fst.allocate_specific(TrackRegion::new(0, 4)).expect("free");
        assert_eq!(
            fst.allocate_specific(TrackRegion::new(3, 2)),
            Err(FreeSpaceError::NotFree(TrackRegion::new(3, 2)))
        );
        assert!(fst.allocate_specific(TrackRegion::new(9_999, 2)).is_err());
        fst.allocate_specific(TrackRegion::new(500, 1)).expect("free");
        assert_eq!(
            fst.regions(),
            &[TrackRegion::new(4, 496), TrackRegion::new(501, 9499)]
        );
    }

    #[test]
    fn test_release_rejects_overlap() {
        let mut fst = PackFreeSpaceTable::new(100);
        fst.allocate_specific(TrackRegion::new(10, 10)).expect("free");
        assert!(matches!(
            fst.mark_unallocated(TrackRegion::new(5, 6)),
            Err(FreeSpaceError::AlreadyFree(_))
        ));
        assert!(matches!(
            fst.mark_unallocated(TrackRegion::new(19, 2)),
            Err(FreeSpaceError::AlreadyFree(_))
        ));
        assert!(matches!(
            fst.mark_unallocated(TrackRegion::new(95, 10)),
            Err(FreeSpaceError::OutOfRange(_))
        ));
        fst.mark_unallocated(TrackRegion::new(12, 3)).expect("in use");
        assert_eq!(
            fst.regions(),
            &[
                TrackRegion::new(0, 10),
                TrackRegion::new(12, 3),
                TrackRegion::new(20, 80)
            ]
        );
    }

    #[test]
    fn test_allocate_track_prefers_single_track_region() {
        let mut fst = PackFreeSpaceTable::new(100);
        fst.allocate_specific(TrackRegion::new(0, 50)).expect("free");
        fst.allocate_specific(TrackRegion::new(51, 10)).expect("free");
        assert_eq!(fst.allocate_track(), Some(50));
        assert_eq!(fst.allocate_track(), Some(61));
        assert_eq!(fst.regions(), &[TrackRegion::new(62, 38)]);

        let mut full = PackFreeSpaceTable::full(100);
        assert_eq!(full.allocate_track(), None);
    }

    #[test]
    fn test_allocate_region() {
        let mut fst = PackFreeSpaceTable::new(100);
        fst.allocate_specific(TrackRegion::new(10, 5)).expect("free");
        fst.allocate_specific(TrackRegion::new(20, 5)).expect("free");
        // Free: 0+10 15+5 25+75
        assert_eq!(fst.allocate_region(5), Some(TrackRegion::new(15, 5)));
        assert_eq!(fst.allocate_region(4), Some(TrackRegion::new(0, 4)));
        assert_eq!(fst.allocate_region(500), Some(TrackRegion::new(25, 75)));
        assert_eq!(fst.regions(), &[TrackRegion::new(4, 6)]);
        assert_eq!(fst.allocate_region(0), None);
    }

    #[test]
    fn test_allocate_from() {
        let mut fst = PackFreeSpaceTable::new(100);
        fst.allocate_specific(TrackRegion::new(0, 20)).expect("free");
        fst.allocate_specific(TrackRegion::new(30, 70)).expect("free");
        assert_eq!(fst.allocate_from(20, 4), 4);
        assert_eq!(fst.allocate_from(24, 100), 6);
        assert_eq!(fst.allocate_from(24, 1), 0);
        assert_eq!(fst.free_track_count(), 0);
    }

    #[derive(Debug, Clone, Arbitrary)]
    enum Op {
        Allocate(#[strategy(1_u64..300)] TrackCount),
        Release(usize),
    }

    #[proptest]
    fn regions_stay_sorted_and_coalesced(
        #[strategy(proptest::collection::vec(any::<Op>(), 1..60))] ops: Vec<Op>,
    ) {
        let mut fst = PackFreeSpaceTable::new(2_000);
        let mut allocated: Vec<TrackRegion> = Vec::new();
        for op in ops {
            match op {
                Op::Allocate(n) => {
                    if let Some(region) = fst.allocate_region(n) {
                        allocated.push(region);
                    }
                }
                Op::Release(which) => {
                    if !allocated.is_empty() {
                        let region = allocated.swap_remove(which % allocated.len());
                        fst.mark_unallocated(region).expect("region was allocated");
                    }
                }
            }
            assert_well_formed(&fst);
            let in_use: TrackCount = allocated.iter().map(|r| r.track_count).sum();
            assert_eq!(fst.free_track_count() + in_use, 2_000);
        }
        for region in allocated {
            fst.mark_unallocated(region).expect("region was allocated");
        }
        assert_eq!(fst.regions(), &[TrackRegion::new(0, 2_000)]);
    }

    #[proptest]
    fn allocate_then_release_restores_count(
        #[strategy(0_u64..1_000)] start: u64,
        #[strategy(1_u64..1_000)] count: u64,
    ) {
        let mut fst = PackFreeSpaceTable::new(2_000);
        fst.allocate_specific(TrackRegion::new(1_500, 10)).expect("free");
        let before = fst.free_track_count();
        let region = TrackRegion::new(start, count.min(1_500 - start));
        fst.allocate_specific(region).expect("free");
        fst.mark_unallocated(region).expect("allocated");
        assert_eq!(fst.free_track_count(), before);
        assert_well_formed(&fst);
    }
}
