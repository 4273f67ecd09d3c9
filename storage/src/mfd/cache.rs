//! The in-memory copy of the directory.
//!
//! Every MFD track in use is held here, keyed by the MFD-relative
//! address of its sector 0.  Changed sectors are remembered by the
//! address of the first sector of their block, so that a flush writes
//! whole blocks.
use std::collections::{BTreeMap, BTreeSet};

use base::prelude::*;

use super::address::MfdRelativeAddress;
use crate::geometry::{WORDS_PER_SECTOR, WORDS_PER_TRACK};

#[derive(Debug, Default)]
pub struct MfdCache {
    tracks: BTreeMap<MfdRelativeAddress, Vec<Word36>>,
    dirty_blocks: BTreeSet<MfdRelativeAddress>,
}

impl MfdCache {
    pub fn new() -> MfdCache {
        MfdCache::default()
    }

    /// Adds a track.  Short contents are padded with zeroes.
    pub fn insert_track(&mut self, address: MfdRelativeAddress, mut words: Vec<Word36>) {
        words.resize(WORDS_PER_TRACK as usize, Word36::ZERO);
        self.tracks.insert(address.track_address(), words);
    }

    pub fn contains_track(&self, address: MfdRelativeAddress) -> bool {
        self.tracks.contains_key(&address.track_address())
    }

    pub fn track_addresses(&self) -> impl Iterator<Item = MfdRelativeAddress> + '_ {
        self.tracks.keys().copied()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn sector(&self, address: MfdRelativeAddress) -> Option<&[Word36]> {
        let start = address.word_offset();
        self.tracks
            .get(&address.track_address())
            .map(|track| &track[start..start + WORDS_PER_SECTOR as usize])
    }

    pub fn sector_mut(&mut self, address: MfdRelativeAddress) -> Option<&mut [Word36]> {
        let start = address.word_offset();
        self.tracks
            .get_mut(&address.track_address())
            .map(|track| &mut track[start..start + WORDS_PER_SECTOR as usize])
    }

    /// The whole block holding `block_address`, which must be the
    /// first sector of a block.
    pub fn block(&self, block_address: MfdRelativeAddress, sectors_per_block: u64) -> Option<&[Word36]> {
        let start = block_address.word_offset();
        let len = (sectors_per_block * WORDS_PER_SECTOR) as usize;
        self.tracks
            .get(&block_address.track_address())
            .and_then(|track| track.get(start..start + len))
    }

    pub fn mark_dirty(&mut self, address: MfdRelativeAddress, sectors_per_block: u64) {
        self.dirty_blocks
            .insert(address.block_address(sectors_per_block));
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty_blocks.is_empty()
    }

    pub fn dirty_blocks(&self) -> impl Iterator<Item = MfdRelativeAddress> + '_ {
        self.dirty_blocks.iter().copied()
    }

    pub fn clear_dirty(&mut self) {
        self.dirty_blocks.clear();
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.dirty_blocks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LdatIndex;

    #[test]
    fn test_sectors_and_blocks() {
        let mut cache = MfdCache::new();
        let track = MfdRelativeAddress::new(LdatIndex(1), 0, 0);
        cache.insert_track(track, vec![Word36::ZERO; 28]);
        assert!(cache.contains_track(MfdRelativeAddress::new(LdatIndex(1), 0, 40)));
        assert!(!cache.contains_track(MfdRelativeAddress::new(LdatIndex(1), 1, 0)));

        let s5 = MfdRelativeAddress::new(LdatIndex(1), 0, 5);
        cache.sector_mut(s5).expect("cached")[3] = Word36::masked(0o777);
        assert_eq!(cache.sector(s5).expect("cached")[3].bits(), 0o777);
        assert_eq!(cache.sector(s5).expect("cached").len(), 28);

        cache.mark_dirty(s5, 2);
        cache.mark_dirty(MfdRelativeAddress::new(LdatIndex(1), 0, 4), 2);
        assert_eq!(
            cache.dirty_blocks().collect::<Vec<_>>(),
            vec![MfdRelativeAddress::new(LdatIndex(1), 0, 4)]
        );
        let block = cache
            .block(MfdRelativeAddress::new(LdatIndex(1), 0, 4), 2)
            .expect("cached");
        assert_eq!(block.len(), 56);
        assert_eq!(block[28 + 3].bits(), 0o777);

        cache.clear_dirty();
        assert!(!cache.is_dirty());
        assert_eq!(cache.sector(MfdRelativeAddress::new(LdatIndex(2), 0, 0)), None);
    }
}
