//! The process-wide storage lock table.
//!
//! Test-and-set style instructions (TS, TSS, TCS, CR) hold a lock on
//! their target word for the whole cycle.  Locks are released by the
//! cycle-completion hook and after interrupt acceptance.
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{event, Level};

use crate::memory::AbsoluteAddress;

/// Identifies the holder of a storage lock.
pub type LockOwner = u32;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
pub struct StorageLocks {
    held: Mutex<HashMap<AbsoluteAddress, LockOwner>>,
}

impl StorageLocks {
    #[must_use]
    pub fn new() -> StorageLocks {
        StorageLocks::default()
    }

    /// Takes the lock on `addr`.  Fails if anyone, including `owner`,
    /// already holds it.
    pub fn try_lock(&self, owner: LockOwner, addr: AbsoluteAddress) -> bool {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if held.contains_key(&addr) {
            false
        } else {
            held.insert(addr, owner);
            true
        }
    }

    pub fn holds(&self, owner: LockOwner, addr: AbsoluteAddress) -> bool {
        let held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.get(&addr) == Some(&owner)
    }

    /// Waits until the lock on `addr` can be taken.  Returns
    /// immediately if `owner` already holds it.
    pub fn lock_wait(&self, owner: LockOwner, addr: AbsoluteAddress) {
        loop {
            if self.holds(owner, addr) || self.try_lock(owner, addr) {
                return;
            }
            event!(Level::TRACE, "engine {} waiting for lock on {}", owner, addr);
            thread::sleep(POLL_INTERVAL);
        }
    }

    pub fn release(&self, owner: LockOwner, addr: AbsoluteAddress) -> bool {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if held.get(&addr) == Some(&owner) {
            held.remove(&addr);
            true
        } else {
            false
        }
    }

    pub fn release_all(&self, owner: LockOwner) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.retain(|_, holder| *holder != owner);
    }

    pub fn dump(&self) -> Vec<String> {
        let held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<(&AbsoluteAddress, &LockOwner)> = held.iter().collect();
        entries.sort();
        entries
            .into_iter()
            .map(|(addr, owner)| format!("{addr} locked by engine {owner}"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_try_lock_is_exclusive() {
        let locks = StorageLocks::new();
        let addr = AbsoluteAddress::new(0, 0o100);
        assert!(locks.try_lock(1, addr));
        assert!(!locks.try_lock(2, addr));
        assert!(!locks.try_lock(1, addr));
        assert!(locks.holds(1, addr));
        assert!(!locks.release(2, addr));
        assert!(locks.release(1, addr));
        assert!(locks.try_lock(2, addr));
    }

    #[test]
    fn test_release_all_only_touches_owner() {
        let locks = StorageLocks::new();
        locks.try_lock(1, AbsoluteAddress::new(0, 1));
        locks.try_lock(1, AbsoluteAddress::new(0, 2));
        locks.try_lock(2, AbsoluteAddress::new(0, 3));
        locks.release_all(1);
        assert_eq!(locks.dump(), vec!["0:000000000003 locked by engine 2"]);
    }

    #[test]
    fn test_lock_wait_acquires_after_release() {
        let locks = Arc::new(StorageLocks::new());
        let addr = AbsoluteAddress::new(0, 7);
        assert!(locks.try_lock(1, addr));
        let waiter = {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                locks.lock_wait(2, addr);
                locks.holds(2, addr)
            })
        };
        thread::sleep(Duration::from_millis(5));
        locks.release(1, addr);
        assert!(waiter.join().expect("waiter should not panic"));
    }
}
