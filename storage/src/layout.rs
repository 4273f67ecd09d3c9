//! The on-pack structures written when a pack is prepped.
//!
//! ## Label (block 0)
//!
//! | Word | Contents                                             |
//! | ---- | ---------------------------------------------------- |
//! | 000  | "VOL1" in ASCII                                      |
//! | 001  | Pack name, ASCII, left justified                     |
//! | 002  | Pack name continued in H1; H2 is zero                |
//! | 003  | Word address of the first directory track (1792)     |
//! | 004  | H1 blocks per track, H2 prep factor                  |
//! | 011  | H1 padded MBT length, H2 MBT length                  |
//! | 014  | S1 010, S2 1 (VOL1 version), H2 heads per cylinder   |
//! | 016  | Available tracks                                     |
//! | 017  | H1 prep factor                                       |
//! | 021  | Block count                                          |
//!
//! ## Initial directory (from word 1792)
//!
//! Sector 0 holds the number of initial directory tracks and the word
//! address of the first DAS.  Sector 1 holds the addresses of the
//! hardware and software master bit tables (HMBT, SMBT), the
//! available track count, the pack name in Fieldata and the LDAT
//! (or removable) indicator.  The HMBT follows at word 56 of the
//! directory area and the SMBT after it, padded to a block boundary.
//!
//! ## Master bit tables
//!
//! One bit per half-track, 32 bits in each word from bit 35 down;
//! the low four bits of each data word are always set.  Word 0 is a
//! control word and the last word holds "NOCKSM" in Fieldata.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use base::charset::{ascii_word_to_string, fieldata_word_to_string};
use base::prelude::*;

use super::geometry::{
    is_valid_pack_name, PackGeometry, PrepFactor, LABEL_WORDS, WORDS_PER_SECTOR, WORDS_PER_TRACK,
};
use super::types::{TrackCount, TrackId};

pub const FIRST_DIRECTORY_ADDRESS: u64 = WORDS_PER_TRACK;

/// Word 0 of a DAS sector, and the "no link" value of DAS and MFD
/// item links.
pub const NO_LINK: Word36 = w36!(0o400000_000000);

/// S1 of the first word of a DAS sector.
pub const DAS_REMOVABLE: u64 = 0o02;
pub const DAS_FIXED: u64 = 0o03;

/// S1 of word 5 of sector 1 on a fixed pack which has not yet been
/// given an LDAT.
pub const FIXED_UNINITIALIZED: u64 = 0o40;

const HALF_TRACKS_PER_WORD: u64 = 32;
const MBT_FILL_BITS: u64 = 0o17;

/// Where the directory structures of a pack live, given its geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbtLayout {
    pub mbt_words: u64,
    pub padded_mbt_words: u64,
    pub init_tracks: TrackCount,
    pub das_offset: u64,
    pub available_tracks: TrackCount,
}

impl MbtLayout {
    pub fn new(geometry: &PackGeometry) -> MbtLayout {
        let prep = geometry.prep_factor.words();
        let track_count = geometry.track_count;
        let mbt_words = (2 * track_count).div_ceil(HALF_TRACKS_PER_WORD) + 2;
        let padded_mbt_words = (2 * WORDS_PER_SECTOR + mbt_words).div_ceil(prep) * prep;
        let init_tracks = (padded_mbt_words + mbt_words).div_ceil(WORDS_PER_TRACK);
        let das_offset = init_tracks.div_ceil(9) * 9 * 64;
        MbtLayout {
            mbt_words,
            padded_mbt_words,
            init_tracks,
            das_offset,
            available_tracks: track_count - 1 - init_tracks - 1,
        }
    }

    pub fn hmbt_address(&self) -> u64 {
        FIRST_DIRECTORY_ADDRESS + 2 * WORDS_PER_SECTOR
    }

    pub fn smbt_address(&self) -> u64 {
        FIRST_DIRECTORY_ADDRESS + self.padded_mbt_words
    }

    /// The label track, the initial directory tracks and the first
    /// DAS track are in use on a freshly prepped pack.
    pub fn reserved_tracks(&self) -> TrackCount {
        self.init_tracks + 2
    }

    pub fn first_das_track(&self) -> TrackId {
        1 + self.init_tracks
    }

    pub fn first_das_address(&self) -> u64 {
        self.first_das_track() * WORDS_PER_TRACK
    }
}

/// The 28 label words.
pub fn label_words(pack_name: &str, geometry: &PackGeometry) -> Vec<Word36> {
    let layout = MbtLayout::new(geometry);
    let prep = geometry.prep_factor.words();
    let mut label = vec![Word36::ZERO; LABEL_WORDS];
    label[0] = ascii_word("VOL1");
    label[1] = ascii_word(pack_name);
    label[2] = ascii_word(pack_name.get(4..).unwrap_or("")).with_h2(0);
    label[3] = Word36::masked(FIRST_DIRECTORY_ADDRESS);
    label[4] = Word36::from_halves(geometry.blocks_per_track(), prep);
    label[0o11] = Word36::from_halves(layout.padded_mbt_words, layout.mbt_words);
    label[0o14] = Word36::ZERO.with_s1(0o10).with_s2(1).with_h2(10);
    label[0o16] = Word36::masked(layout.available_tracks);
    label[0o17] = Word36::ZERO.with_h1(prep);
    label[0o21] = Word36::masked(geometry.block_count);
    label
}

/// The master bit table as written by prep; the HMBT and SMBT are
/// identical.
pub fn master_bit_table(geometry: &PackGeometry) -> Vec<Word36> {
    let layout = MbtLayout::new(geometry);
    let total = layout.mbt_words as usize;
    let capacity = 2 * geometry.track_count;
    let reserved = 2 * layout.reserved_tracks();
    let mut mbt = vec![Word36::ZERO; total];
    mbt[0] = Word36::ZERO.with_h2(layout.mbt_words);
    for (wx, word) in mbt[1..total - 1].iter_mut().enumerate() {
        let first = wx as u64 * HALF_TRACKS_PER_WORD;
        let value = (0..HALF_TRACKS_PER_WORD)
            .filter(|bit| {
                let half_track = first + bit;
                half_track < reserved || half_track >= capacity
            })
            .fold(MBT_FILL_BITS, |acc, bit| acc | (1 << (35 - bit)));
        *word = Word36::masked(value);
    }
    mbt[total - 1] = fieldata_word("NOCKSM");
    mbt
}

/// Reports whether `half_track` is marked in use in a master bit
/// table laid out by [`master_bit_table`].
pub fn half_track_allocated(mbt: &[Word36], half_track: u64) -> bool {
    let wx = 1 + (half_track / HALF_TRACKS_PER_WORD) as usize;
    let bit = half_track % HALF_TRACKS_PER_WORD;
    mbt.get(wx)
        .is_some_and(|word| word.bits() & (1 << (35 - bit)) != 0)
}

/// The initial directory tracks: S0, S1, HMBT and SMBT.
pub fn initial_directory(pack_name: &str, geometry: &PackGeometry, removable: bool) -> Vec<Word36> {
    let layout = MbtLayout::new(geometry);
    let mut dir = vec![Word36::ZERO; (layout.init_tracks * WORDS_PER_TRACK) as usize];

    dir[0] = Word36::ZERO.with_s1(layout.init_tracks);
    dir[27] = Word36::masked(layout.first_das_address());

    let s1 = &mut dir[28..56];
    s1[0] = Word36::masked(layout.hmbt_address());
    s1[1] = Word36::masked(layout.smbt_address());
    s1[2] = Word36::masked(layout.available_tracks);
    s1[3] = Word36::masked(layout.available_tracks);
    s1[4] = fieldata_word(pack_name);
    s1[5] = Word36::ZERO
        .with_s1(if removable { 0 } else { FIXED_UNINITIALIZED })
        .with_h2(layout.mbt_words);
    s1[0o10] = Word36::ZERO
        .with_t1(geometry.blocks_per_track())
        .with_s3(1)
        .with_t3(geometry.prep_factor.words());
    s1[0o20] = Word36::ZERO.with_h2(layout.das_offset);

    let mbt = master_bit_table(geometry);
    let hmbt = 2 * WORDS_PER_SECTOR as usize;
    dir[hmbt..hmbt + mbt.len()].copy_from_slice(&mbt);
    let smbt = layout.padded_mbt_words as usize;
    dir[smbt..smbt + mbt.len()].copy_from_slice(&mbt);
    dir
}

/// The first DAS track.  Only sector 0 has content.
pub fn first_das_track(geometry: &PackGeometry, removable: bool) -> Vec<Word36> {
    let layout = MbtLayout::new(geometry);
    let mut track = vec![Word36::ZERO; WORDS_PER_TRACK as usize];
    track[0] = Word36::masked(layout.first_das_address()).with_s1(if removable {
        DAS_REMOVABLE
    } else {
        DAS_FIXED
    });
    for entry in (3..27).step_by(3) {
        track[entry] = NO_LINK;
    }
    track[27] = NO_LINK;
    track
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    NotVol1(String),
    InvalidPackName(String),
    InvalidPrepFactor(u64),
    ShortBuffer(usize),
}

impl Display for LabelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            LabelError::NotVol1(tag) => write!(f, "label tag is '{tag}', not VOL1"),
            LabelError::InvalidPackName(name) => write!(f, "invalid pack name '{name}'"),
            LabelError::InvalidPrepFactor(n) => write!(f, "invalid prep factor {n}"),
            LabelError::ShortBuffer(n) => write!(f, "label buffer holds only {n} words"),
        }
    }
}

impl Error for LabelError {}

/// The parts of a label the rest of the system needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub pack_name: String,
    pub geometry: PackGeometry,
    pub first_directory_address: u64,
    pub available_tracks: TrackCount,
}

impl LabelInfo {
    pub fn parse(label: &[Word36]) -> Result<LabelInfo, LabelError> {
        if label.len() < LABEL_WORDS {
            return Err(LabelError::ShortBuffer(label.len()));
        }
        let tag = ascii_word_to_string(label[0]);
        if tag != "VOL1" {
            return Err(LabelError::NotVol1(tag));
        }
        let mut pack_name = ascii_word_to_string(label[1]);
        pack_name.extend(ascii_word_to_string(label[2]).chars().take(2));
        let pack_name = pack_name.trim_end_matches(' ').to_string();
        if !is_valid_pack_name(&pack_name) {
            return Err(LabelError::InvalidPackName(pack_name));
        }
        let prep = label[4].h2();
        let prep_factor =
            PrepFactor::try_from(prep).map_err(|_| LabelError::InvalidPrepFactor(prep))?;
        Ok(LabelInfo {
            pack_name,
            geometry: PackGeometry::from_block_count(prep_factor, label[0o21].bits()),
            first_directory_address: label[3].bits(),
            available_tracks: label[0o16].bits(),
        })
    }
}

/// Sector 1 of the initial directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorOneInfo {
    pub hmbt_address: u64,
    pub smbt_address: u64,
    pub available_tracks: TrackCount,
    pub pack_name: String,
    /// H1 of word 5: zero for a removable pack, 0o400000 for a fixed
    /// pack not yet initialized, else the LDAT index.
    pub ldat_word: u64,
    pub mbt_words: u64,
    pub blocks_per_track: u64,
    pub prep_factor: u64,
    pub das_offset: u64,
}

impl SectorOneInfo {
    pub fn parse(sector: &[Word36]) -> SectorOneInfo {
        let word = |n: usize| sector.get(n).copied().unwrap_or(Word36::ZERO);
        SectorOneInfo {
            hmbt_address: word(0).bits(),
            smbt_address: word(1).bits(),
            available_tracks: word(2).bits(),
            pack_name: fieldata_word_to_string(word(4)).trim_end().to_string(),
            ldat_word: word(5).h1(),
            mbt_words: word(5).h2(),
            blocks_per_track: word(0o10).t1(),
            prep_factor: word(0o10).t3(),
            das_offset: word(0o20).h2(),
        }
    }

    pub fn is_removable(&self) -> bool {
        self.ldat_word == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(prep: u64, tracks: u64) -> PackGeometry {
        PackGeometry::new(PrepFactor::try_from(prep).expect("valid prep factor"), tracks)
    }

    #[test]
    fn test_layout_for_minimum_pack() {
        let layout = MbtLayout::new(&geometry(1792, 10_000));
        assert_eq!(layout.mbt_words, 627);
        assert_eq!(layout.padded_mbt_words, 1792);
        assert_eq!(layout.init_tracks, 2);
        assert_eq!(layout.first_das_track(), 3);
        assert_eq!(layout.available_tracks, 9996);
        assert_eq!(layout.das_offset, 9 * 64);
        assert_eq!(layout.smbt_address(), 1792 + 1792);
    }

    #[test]
    fn test_layout_small_blocks() {
        let layout = MbtLayout::new(&geometry(28, 10_000));
        // 56 + 627 rounded up to 28 words.
        assert_eq!(layout.padded_mbt_words, 700);
        assert_eq!(layout.init_tracks, 1);
        assert_eq!(layout.first_das_track(), 2);
        assert_eq!(layout.available_tracks, 9997);
    }

    #[test]
    fn test_label_round_trip() {
        let g = geometry(1792, 10_000);
        let label = label_words("PACK01", &g);
        assert_eq!(label[0], ascii_word("VOL1"));
        assert_eq!(label[2].h2(), 0);
        assert_eq!(label[4].h2(), 1792);
        assert_eq!(label[0o21].bits(), 10_000);
        let info = LabelInfo::parse(&label).expect("label should parse");
        assert_eq!(info.pack_name, "PACK01");
        assert_eq!(info.geometry, g);
        assert_eq!(info.first_directory_address, 1792);
        assert_eq!(info.available_tracks, 9996);
    }

    #[test]
    fn test_short_pack_name() {
        let label = label_words("A", &geometry(28, 10_000));
        let info = LabelInfo::parse(&label).expect("label should parse");
        assert_eq!(info.pack_name, "A");
    }

    #[test]
    fn test_unprepped_label() {
        let blank = vec![Word36::ZERO; LABEL_WORDS];
        assert!(matches!(LabelInfo::parse(&blank), Err(LabelError::NotVol1(_))));
    }

    #[test]
    fn test_mbt_marks_reserved_tracks() {
        let g = geometry(1792, 10_000);
        let mbt = master_bit_table(&g);
        assert_eq!(mbt.len(), 627);
        assert_eq!(mbt[0].h2(), 627);
        assert_eq!(mbt[626], fieldata_word("NOCKSM"));
        // Tracks 0 through 3 are in use: half-tracks 0 through 7.
        assert_eq!(mbt[1].bits(), 0o776000_000017);
        for half_track in 0..8 {
            assert!(half_track_allocated(&mbt, half_track));
        }
        for half_track in 8..20_000 {
            assert!(!half_track_allocated(&mbt, half_track), "{half_track}");
        }
    }

    #[test]
    fn test_mbt_marks_tracks_beyond_capacity() {
        let g = geometry(1792, 10_001);
        let mbt = master_bit_table(&g);
        assert_eq!(mbt.len(), 628);
        assert!(!half_track_allocated(&mbt, 20_001));
        assert!(half_track_allocated(&mbt, 20_002));
        assert!(half_track_allocated(&mbt, 20_031));
    }

    #[test]
    fn test_initial_directory() {
        let g = geometry(1792, 10_000);
        let dir = initial_directory("FIX0", &g, false);
        assert_eq!(dir.len(), 2 * 1792);
        assert_eq!(dir[0].s1(), 2);
        assert_eq!(dir[27].bits(), 3 * 1792);
        let s1 = SectorOneInfo::parse(&dir[28..56]);
        assert_eq!(s1.hmbt_address, 1792 + 56);
        assert_eq!(s1.smbt_address, 1792 + 1792);
        assert_eq!(s1.pack_name, "FIX0");
        assert_eq!(s1.ldat_word, 0o400000);
        assert!(!s1.is_removable());
        assert_eq!(s1.prep_factor, 1792);
        assert_eq!(s1.blocks_per_track, 1);
        assert_eq!(dir[56..56 + 627], dir[1792..1792 + 627]);

        let removable = initial_directory("REM0", &g, true);
        assert!(SectorOneInfo::parse(&removable[28..56]).is_removable());
    }

    #[test]
    fn test_first_das() {
        let g = geometry(1792, 10_000);
        let das = first_das_track(&g, false);
        assert_eq!(das[0].s1(), DAS_FIXED);
        assert_eq!(das[0].bits() & 0o7777_777777, 3 * 1792);
        assert_eq!(das[3], NO_LINK);
        assert_eq!(das[24], NO_LINK);
        assert_eq!(das[27], NO_LINK);
        assert_eq!(das[1], Word36::ZERO);
    }
}
