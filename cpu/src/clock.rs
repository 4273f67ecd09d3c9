//! The system day clock.
//!
//! The clock value is microseconds since the Unix epoch shifted left
//! five bits.  Successive readings from one clock are strictly
//! increasing even when the host clock has not advanced.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Default)]
pub struct DayClock {
    last: AtomicU64,
}

impl DayClock {
    #[must_use]
    pub fn new() -> DayClock {
        DayClock::default()
    }

    fn host_micros() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    pub fn read(&self) -> u64 {
        let now = Self::host_micros() << 5;
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(if now <= last { last + 1 } else { now })
            })
            .unwrap_or(0);
        if now <= previous {
            previous + 1
        } else {
            now
        }
    }
}
