//! Identifiers and small value types shared by the rest of the crate.
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// A device-relative or file-relative track number.  A track is
/// 1792 words.
pub type TrackId = u64;
pub type TrackCount = u64;

/// A device-relative block number.  The size of a block is the prep
/// factor of the pack.
pub type BlockId = u64;

/// Identifies a pack within the fixed mass storage pool.  Zero is not
/// a valid index; 0o400000 marks a hole or an uninitialized pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LdatIndex(pub u32);

impl LdatIndex {
    pub const INVALID: LdatIndex = LdatIndex(0o400000);

    pub fn is_valid(self) -> bool {
        self.0 != 0 && self.0 <= 0o7777
    }
}

impl Display for LdatIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:04o}", self.0)
    }
}

/// A contiguous run of tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackRegion {
    pub track_id: TrackId,
    pub track_count: TrackCount,
}

impl TrackRegion {
    pub const fn new(track_id: TrackId, track_count: TrackCount) -> TrackRegion {
        TrackRegion {
            track_id,
            track_count,
        }
    }

    /// The first track after the region.
    pub const fn limit(&self) -> TrackId {
        self.track_id + self.track_count
    }

    pub const fn contains(&self, track_id: TrackId) -> bool {
        track_id >= self.track_id && track_id < self.limit()
    }

    /// True when `other` lies wholly inside this region.
    pub const fn encloses(&self, other: &TrackRegion) -> bool {
        other.track_id >= self.track_id && other.limit() <= self.limit()
    }
}

impl Display for TrackRegion {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}+{}", self.track_id, self.track_count)
    }
}
