//! Pack geometry.
//!
//! A pack is prepped with a prep factor, the number of words in each
//! block.  Blocks are stored in the host file at power-of-two byte
//! boundaries; only the first `P * 9 / 2` bytes of each block hold
//! data.
//!
//! | Prep factor | Blocks per track | Bytes per block |
//! | ----------- | ---------------- | --------------- |
//! | 28          | 64               | 128             |
//! | 56          | 32               | 256             |
//! | 112         | 16               | 512             |
//! | 224         | 8                | 1024            |
//! | 448         | 4                | 2048            |
//! | 896         | 2                | 4096            |
//! | 1792        | 1                | 8192            |
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use super::types::{BlockId, TrackCount, TrackId};

pub const WORDS_PER_SECTOR: u64 = 28;
pub const SECTORS_PER_TRACK: u64 = 64;
pub const WORDS_PER_TRACK: u64 = WORDS_PER_SECTOR * SECTORS_PER_TRACK;

/// The label occupies the first 28 words of block 0, whatever the
/// prep factor.
pub const LABEL_WORDS: usize = 28;

pub const MINIMUM_TRACK_COUNT: TrackCount = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    InvalidPrepFactor(u64),
    InvalidTrackCount(u64),
    InvalidPackName(String),
}

impl Display for GeometryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            GeometryError::InvalidPrepFactor(n) => write!(
                f,
                "prep factor {n} is not one of 28, 56, 112, 224, 448, 896 or 1792"
            ),
            GeometryError::InvalidTrackCount(n) => write!(
                f,
                "track count {n} is less than the minimum of {MINIMUM_TRACK_COUNT}"
            ),
            GeometryError::InvalidPackName(name) => write!(
                f,
                "pack name '{name}' must be 1 to 6 characters, alphabetic then alphanumeric"
            ),
        }
    }
}

impl Error for GeometryError {}

/// Words per block.  Only the supported values can be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct PrepFactor(u64);

impl PrepFactor {
    pub const SUPPORTED: [u64; 7] = [28, 56, 112, 224, 448, 896, 1792];

    /// One block per track.
    pub const WHOLE_TRACK: PrepFactor = PrepFactor(1792);

    pub const fn words(self) -> u64 {
        self.0
    }

    pub const fn blocks_per_track(self) -> u64 {
        WORDS_PER_TRACK / self.0
    }

    pub const fn sectors_per_block(self) -> u64 {
        self.0 / WORDS_PER_SECTOR
    }

    /// Number of bytes of packed data in a block.
    pub const fn payload_bytes(self) -> usize {
        (self.0 as usize) * 9 / 2
    }

    /// The byte stride between blocks in the host file: the smallest
    /// power of two which holds the payload.
    pub const fn padded_bytes_per_block(self) -> u64 {
        (self.payload_bytes() as u64).next_power_of_two()
    }
}

impl TryFrom<u64> for PrepFactor {
    type Error = GeometryError;

    fn try_from(value: u64) -> Result<PrepFactor, GeometryError> {
        if PrepFactor::SUPPORTED.contains(&value) {
            Ok(PrepFactor(value))
        } else {
            Err(GeometryError::InvalidPrepFactor(value))
        }
    }
}

impl From<PrepFactor> for u64 {
    fn from(p: PrepFactor) -> u64 {
        p.0
    }
}

impl Display for PrepFactor {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.0)
    }
}

/// Pack names are 1 to 6 characters; the first is an upper-case
/// letter and the rest are upper-case letters or digits.
pub fn is_valid_pack_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => {
            name.len() <= 6 && chars.all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit())
        }
        _ => false,
    }
}

pub fn validate_pack_name(name: &str) -> Result<(), GeometryError> {
    if is_valid_pack_name(name) {
        Ok(())
    } else {
        Err(GeometryError::InvalidPackName(name.to_string()))
    }
}

pub fn validate_track_count(track_count: TrackCount) -> Result<(), GeometryError> {
    if track_count < MINIMUM_TRACK_COUNT {
        Err(GeometryError::InvalidTrackCount(track_count))
    } else {
        Ok(())
    }
}

/// The shape of a prepped pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackGeometry {
    pub prep_factor: PrepFactor,
    pub track_count: TrackCount,
    pub block_count: u64,
}

impl PackGeometry {
    pub fn new(prep_factor: PrepFactor, track_count: TrackCount) -> PackGeometry {
        PackGeometry {
            prep_factor,
            track_count,
            block_count: track_count * prep_factor.blocks_per_track(),
        }
    }

    /// Recovers the geometry from the block count recorded in a label.
    pub fn from_block_count(prep_factor: PrepFactor, block_count: u64) -> PackGeometry {
        PackGeometry {
            prep_factor,
            track_count: block_count / prep_factor.blocks_per_track(),
            block_count,
        }
    }

    pub fn words_per_block(&self) -> u64 {
        self.prep_factor.words()
    }

    pub fn blocks_per_track(&self) -> u64 {
        self.prep_factor.blocks_per_track()
    }

    pub fn sectors_per_block(&self) -> u64 {
        self.prep_factor.sectors_per_block()
    }

    /// Byte offset of a block within the host file.
    pub fn byte_offset(&self, block_id: BlockId) -> u64 {
        block_id * self.prep_factor.padded_bytes_per_block()
    }

    pub fn host_file_len(&self) -> u64 {
        self.byte_offset(self.block_count)
    }

    pub fn block_containing(&self, word_address: u64) -> BlockId {
        word_address / self.words_per_block()
    }

    pub fn first_block_of_track(&self, track_id: TrackId) -> BlockId {
        track_id * self.blocks_per_track()
    }

    pub fn is_valid_block(&self, block_id: BlockId) -> bool {
        block_id < self.block_count
    }
}

impl Display for PackGeometry {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "prep:{} trks:{} blks:{} sec/blk:{} blk/trk:{} bytes/blk:{} padded:{}",
            self.prep_factor,
            self.track_count,
            self.block_count,
            self.sectors_per_block(),
            self.blocks_per_track(),
            self.prep_factor.payload_bytes(),
            self.prep_factor.padded_bytes_per_block()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_strategy::proptest;

    #[test]
    fn test_padded_block_sizes() {
        let expected: [(u64, u64); 7] = [
            (28, 128),
            (56, 256),
            (112, 512),
            (224, 1024),
            (448, 2048),
            (896, 4096),
            (1792, 8192),
        ];
        for (words, bytes) in expected {
            let p = PrepFactor::try_from(words).expect("supported prep factor");
            assert_eq!(p.padded_bytes_per_block(), bytes, "prep factor {words}");
            assert_eq!(p.payload_bytes() as u64, words * 9 / 2);
            assert_eq!(p.blocks_per_track() * words, WORDS_PER_TRACK);
        }
    }

    #[test]
    fn test_unsupported_prep_factor() {
        assert_eq!(
            PrepFactor::try_from(100),
            Err(GeometryError::InvalidPrepFactor(100))
        );
        assert!(PrepFactor::try_from(0).is_err());
    }

    #[test]
    fn test_pack_names() {
        for good in ["A", "PACK01", "FIX0", "Z9"] {
            assert!(is_valid_pack_name(good), "{good} should be accepted");
        }
        for bad in ["", "1PACK", "PACK001", "PA-K", "PA K", "pack"] {
            assert!(!is_valid_pack_name(bad), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_track_count_minimum() {
        assert!(validate_track_count(9_999).is_err());
        assert!(validate_track_count(10_000).is_ok());
    }

    #[test]
    fn test_geometry() {
        let g = PackGeometry::new(PrepFactor::try_from(28).expect("valid"), 10_000);
        assert_eq!(g.block_count, 640_000);
        assert_eq!(g.sectors_per_block(), 1);
        assert_eq!(g.byte_offset(3), 384);
        assert_eq!(g.block_containing(1792), 64);
        assert_eq!(g.first_block_of_track(2), 128);
        assert_eq!(PackGeometry::from_block_count(g.prep_factor, g.block_count), g);
    }

    #[proptest]
    fn block_count_round_trips(
        #[strategy(0_usize..7)] which: usize,
        #[strategy(10_000_u64..200_000)] track_count: u64,
    ) {
        let p = PrepFactor::try_from(PrepFactor::SUPPORTED[which]).expect("supported");
        let g = PackGeometry::new(p, track_count);
        assert_eq!(PackGeometry::from_block_count(p, g.block_count), g);
        assert!(p.payload_bytes() as u64 <= p.padded_bytes_per_block());
    }
}
