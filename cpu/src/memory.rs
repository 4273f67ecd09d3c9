//! Main storage.
//!
//! Storage is a collection of segments, each allocated once by index
//! and then shared by every engine and by the exec.  Individual words
//! are held as atomics so that engines running on different threads
//! can share a segment without a lock per word.  Software agrees not
//! to race on the same word except through the storage lock table
//! (see [`crate::locks`]).
use std::error;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{event, Level};

use base::prelude::*;

/// The location of a word in main storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AbsoluteAddress {
    pub segment: u32,
    pub offset: u64,
}

impl AbsoluteAddress {
    #[must_use]
    pub const fn new(segment: u32, offset: u64) -> AbsoluteAddress {
        AbsoluteAddress { segment, offset }
    }

    #[must_use]
    pub const fn add_offset(self, delta: u64) -> AbsoluteAddress {
        AbsoluteAddress {
            segment: self.segment,
            offset: self.offset + delta,
        }
    }
}

impl Display for AbsoluteAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:o}:{:012o}", self.segment, self.offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainStorageError {
    SegmentExists(u32),
    NoSuchSegment(u32),
    OutOfRange(AbsoluteAddress),
}

impl Display for MainStorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            MainStorageError::SegmentExists(n) => {
                write!(f, "storage segment {n:o} is already allocated")
            }
            MainStorageError::NoSuchSegment(n) => {
                write!(f, "storage segment {n:o} is not allocated")
            }
            MainStorageError::OutOfRange(addr) => {
                write!(f, "address {addr} is outside its segment")
            }
        }
    }
}

impl error::Error for MainStorageError {}

/// One contiguous block of words.
pub struct Segment {
    words: Box<[AtomicU64]>,
}

impl Segment {
    fn new(size: usize) -> Segment {
        Segment {
            words: (0..size).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn get(&self, offset: u64) -> Option<Word36> {
        let ix = usize::try_from(offset).ok()?;
        self.words
            .get(ix)
            .map(|w| Word36::masked(w.load(Ordering::Acquire)))
    }

    /// Stores `value` at `offset`, returning false when the offset is
    /// outside the segment.
    pub fn set(&self, offset: u64, value: Word36) -> bool {
        match usize::try_from(offset).ok().and_then(|ix| self.words.get(ix)) {
            Some(w) => {
                w.store(value.bits(), Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn load(&self, offset: u64, values: &[Word36]) -> bool {
        values
            .iter()
            .enumerate()
            .all(|(i, &v)| self.set(offset + i as u64, v))
    }
}

impl Debug for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("Segment")
            .field("len", &self.words.len())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct MainStorage {
    segments: Mutex<Vec<Option<Arc<Segment>>>>,
}

impl MainStorage {
    #[must_use]
    pub fn new() -> MainStorage {
        MainStorage::default()
    }

    pub fn allocate(&self, segment: u32, size: usize) -> Result<Arc<Segment>, MainStorageError> {
        let mut segments = self.segments.lock().unwrap_or_else(PoisonError::into_inner);
        let ix = segment as usize;
        if segments.len() <= ix {
            segments.resize(ix + 1, None);
        }
        if segments[ix].is_some() {
            return Err(MainStorageError::SegmentExists(segment));
        }
        let seg = Arc::new(Segment::new(size));
        segments[ix] = Some(Arc::clone(&seg));
        event!(
            Level::DEBUG,
            "allocated storage segment {:o} of {:o} words",
            segment,
            size
        );
        Ok(seg)
    }

    /// Drops the storage's reference to a segment.  Base registers
    /// still referring to it keep the words alive until re-based.
    pub fn release(&self, segment: u32) -> Result<(), MainStorageError> {
        let mut segments = self.segments.lock().unwrap_or_else(PoisonError::into_inner);
        match segments.get_mut(segment as usize) {
            Some(slot @ Some(_)) => {
                *slot = None;
                Ok(())
            }
            _ => Err(MainStorageError::NoSuchSegment(segment)),
        }
    }

    pub fn segment(&self, segment: u32) -> Option<Arc<Segment>> {
        let segments = self.segments.lock().unwrap_or_else(PoisonError::into_inner);
        segments.get(segment as usize).and_then(Clone::clone)
    }

    pub fn read(&self, addr: AbsoluteAddress) -> Result<Word36, MainStorageError> {
        let seg = self
            .segment(addr.segment)
            .ok_or(MainStorageError::NoSuchSegment(addr.segment))?;
        seg.get(addr.offset)
            .ok_or(MainStorageError::OutOfRange(addr))
    }

    pub fn write(&self, addr: AbsoluteAddress, value: Word36) -> Result<(), MainStorageError> {
        let seg = self
            .segment(addr.segment)
            .ok_or(MainStorageError::NoSuchSegment(addr.segment))?;
        if seg.set(addr.offset, value) {
            Ok(())
        } else {
            Err(MainStorageError::OutOfRange(addr))
        }
    }

    /// Renders the non-zero words of every segment, eight words to a
    /// line, for post-mortem dumps.
    pub fn dump(&self) -> Vec<String> {
        let segments = self.segments.lock().unwrap_or_else(PoisonError::into_inner);
        let mut lines = Vec::new();
        for (ix, seg) in segments.iter().enumerate() {
            let Some(seg) = seg else { continue };
            lines.push(format!("segment {:o}: {:o} words", ix, seg.len()));
            for base in (0..seg.len()).step_by(8) {
                let row: Vec<Word36> = (base..(base + 8).min(seg.len()))
                    .filter_map(|off| seg.get(off as u64))
                    .collect();
                if row.iter().all(|w| w.is_positive_zero()) {
                    continue;
                }
                let text: Vec<String> = row.iter().map(|w| format!("{w}")).collect();
                lines.push(format!("  {:012o}: {}", base, text.join(" ")));
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_read_write() {
        let storage = MainStorage::new();
        storage.allocate(2, 16).expect("fresh segment");
        let addr = AbsoluteAddress::new(2, 5);
        storage.write(addr, w36!(0o123)).expect("in range");
        assert_eq!(storage.read(addr), Ok(w36!(0o123)));
        assert_eq!(
            storage.read(AbsoluteAddress::new(2, 16)),
            Err(MainStorageError::OutOfRange(AbsoluteAddress::new(2, 16)))
        );
        assert_eq!(
            storage.read(AbsoluteAddress::new(1, 0)),
            Err(MainStorageError::NoSuchSegment(1))
        );
    }

    #[test]
    fn test_segments_allocate_once() {
        let storage = MainStorage::new();
        storage.allocate(0, 4).expect("fresh segment");
        assert!(matches!(
            storage.allocate(0, 4),
            Err(MainStorageError::SegmentExists(0))
        ));
    }

    #[test]
    fn test_released_segment_outlives_storage_reference() {
        let storage = MainStorage::new();
        let seg = storage.allocate(0, 4).expect("fresh segment");
        assert!(seg.set(1, w36!(7)));
        storage.release(0).expect("allocated");
        assert!(storage.segment(0).is_none());
        assert_eq!(seg.get(1), Some(w36!(7)));
    }

    #[test]
    fn test_dump_skips_empty_rows() {
        let storage = MainStorage::new();
        let seg = storage.allocate(0, 32).expect("fresh segment");
        seg.set(9, w36!(1));
        let lines = storage.dump();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("  000000000010:"));
    }
}
