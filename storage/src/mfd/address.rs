//! MFD-relative sector addresses.
//!
//! An address names a 28-word sector of the directory by the pack
//! which holds it, the MFD track number within that pack's part of
//! the directory, and the sector within the track:
//!
//! | Bits  | Field             |
//! | ----- | ----------------- |
//! | 29-18 | LDAT index        |
//! | 17-6  | MFD track number  |
//! | 5-0   | Sector number     |
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use base::prelude::*;

use crate::geometry::SECTORS_PER_TRACK;
use crate::layout::NO_LINK;
use crate::types::{LdatIndex, TrackId};

/// MFD tracks are grouped in nines; the first track of each group
/// holds the DAS which describes the group.
pub const TRACKS_PER_DAS: u64 = 9;

const FIELD_MASK: u64 = 0o7777;
const SECTOR_MASK: u64 = 0o77;
const ADDRESS_MASK: u64 = 0o7777_777777;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MfdRelativeAddress(u64);

impl MfdRelativeAddress {
    pub const fn new(ldat: LdatIndex, track_id: TrackId, sector_id: u64) -> MfdRelativeAddress {
        MfdRelativeAddress(
            ((ldat.0 as u64 & FIELD_MASK) << 18)
                | ((track_id & FIELD_MASK) << 6)
                | (sector_id & SECTOR_MASK),
        )
    }

    /// Interprets a link word.  Returns `None` for the "no link" value
    /// (bit 35 set); flag bits above the address are ignored.
    pub fn from_link(word: Word36) -> Option<MfdRelativeAddress> {
        if word.bits() & NO_LINK.bits() != 0 {
            None
        } else {
            Some(MfdRelativeAddress(word.bits() & ADDRESS_MASK))
        }
    }

    /// The link word for an optional address.
    pub fn link_word(address: Option<MfdRelativeAddress>) -> Word36 {
        match address {
            Some(address) => address.word(),
            None => NO_LINK,
        }
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn word(self) -> Word36 {
        Word36::masked(self.0)
    }

    pub const fn ldat(self) -> LdatIndex {
        LdatIndex(((self.0 >> 18) & FIELD_MASK) as u32)
    }

    pub const fn track_id(self) -> TrackId {
        (self.0 >> 6) & FIELD_MASK
    }

    pub const fn sector_id(self) -> u64 {
        self.0 & SECTOR_MASK
    }

    /// The address of sector 0 of the containing track.
    pub const fn track_address(self) -> MfdRelativeAddress {
        MfdRelativeAddress(self.0 & !SECTOR_MASK)
    }

    /// The address of the first sector of the block holding this
    /// sector, for blocks of `sectors_per_block` sectors.
    pub const fn block_address(self, sectors_per_block: u64) -> MfdRelativeAddress {
        let sector = self.sector_id();
        MfdRelativeAddress(self.0 - sector + (sector - sector % sectors_per_block))
    }

    /// Sector 0 of the MFD track holding the DAS which describes this
    /// address's track.
    pub const fn das_address(self) -> MfdRelativeAddress {
        let track = self.track_id();
        MfdRelativeAddress::new(self.ldat(), track - track % TRACKS_PER_DAS, 0)
    }

    /// Index of this address's track among the entries of its DAS.
    pub const fn das_entry(self) -> usize {
        (self.track_id() % TRACKS_PER_DAS) as usize
    }

    /// The file-relative track of SYS$*MFD$$ which holds this
    /// address's track.
    pub const fn mfd_file_track(self) -> TrackId {
        (self.0 >> 6) & 0o77777777
    }

    /// Word offset of the sector within its cached track.
    pub const fn word_offset(self) -> usize {
        (self.sector_id() * 28) as usize
    }

    pub fn sectors_of_track(self) -> impl Iterator<Item = MfdRelativeAddress> {
        let base = self.track_address();
        (0..SECTORS_PER_TRACK).map(move |s| MfdRelativeAddress(base.0 | s))
    }
}

impl Display for MfdRelativeAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:012o}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_strategy::proptest;

    #[test]
    fn test_fields() {
        let addr = MfdRelativeAddress::new(LdatIndex(1), 0o11, 0o23);
        assert_eq!(addr.bits(), 0o000001_001123);
        assert_eq!(addr.ldat(), LdatIndex(1));
        assert_eq!(addr.track_id(), 9);
        assert_eq!(addr.sector_id(), 0o23);
        assert_eq!(addr.das_address(), MfdRelativeAddress::new(LdatIndex(1), 9, 0));
        assert_eq!(addr.das_entry(), 0);
        assert_eq!(addr.mfd_file_track(), (1 << 12) | 9);
        assert_eq!(addr.to_string(), "000001001123");
    }

    #[test]
    fn test_links() {
        assert_eq!(MfdRelativeAddress::from_link(NO_LINK), None);
        assert_eq!(
            MfdRelativeAddress::from_link(Word36::masked(0o600000_000000)),
            None
        );
        let addr = MfdRelativeAddress::new(LdatIndex(2), 3, 4);
        assert_eq!(
            MfdRelativeAddress::from_link(Word36::masked(0o200000_000000 | addr.bits())),
            Some(addr)
        );
        assert_eq!(MfdRelativeAddress::link_word(None), NO_LINK);
        assert_eq!(MfdRelativeAddress::link_word(Some(addr)), addr.word());
    }

    #[test]
    fn test_block_address() {
        let addr = MfdRelativeAddress::new(LdatIndex(1), 2, 13);
        assert_eq!(addr.block_address(1), addr);
        assert_eq!(addr.block_address(4).sector_id(), 12);
        assert_eq!(addr.block_address(64).sector_id(), 0);
        assert_eq!(addr.block_address(64).track_id(), 2);
    }

    #[proptest]
    fn fields_survive_composition(
        #[strategy(1_u32..0o7777)] ldat: u32,
        #[strategy(0_u64..0o7777)] track: u64,
        #[strategy(0_u64..64)] sector: u64,
    ) {
        let addr = MfdRelativeAddress::new(LdatIndex(ldat), track, sector);
        assert_eq!(addr.ldat(), LdatIndex(ldat));
        assert_eq!(addr.track_id(), track);
        assert_eq!(addr.sector_id(), sector);
        assert!(addr.das_address() <= addr);
        assert_eq!(
            addr.das_address().track_id() + addr.das_entry() as u64,
            track
        );
    }
}
