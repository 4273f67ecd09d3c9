//! The jump history table.
//!
//! Every successful jump records the virtual address of the
//! instruction that made it.  Once the table passes its threshold one
//! jump-history-full interrupt is raised; taking the entries clears
//! the table and re-arms the interrupt.
use std::collections::VecDeque;

use crate::interrupt::Interrupt;

pub const JUMP_HISTORY_SIZE: usize = 128;
pub const JUMP_HISTORY_THRESHOLD: usize = 120;

#[derive(Debug, Clone, Default)]
pub struct JumpHistory {
    entries: VecDeque<u64>,
    interrupt_pending: bool,
}

impl JumpHistory {
    #[must_use]
    pub fn new() -> JumpHistory {
        JumpHistory::default()
    }

    /// Records `virtual_address`, returning the interrupt to post
    /// when this entry crosses the threshold.  The oldest entry is
    /// dropped when the table is full.
    pub fn store(&mut self, virtual_address: u64) -> Option<Interrupt> {
        if self.entries.len() == JUMP_HISTORY_SIZE {
            self.entries.pop_front();
        }
        self.entries.push_back(virtual_address);
        if self.entries.len() >= JUMP_HISTORY_THRESHOLD && !self.interrupt_pending {
            self.interrupt_pending = true;
            Some(Interrupt::JumpHistoryFull)
        } else {
            None
        }
    }

    /// Returns the entries oldest first and empties the table.
    pub fn take_entries(&mut self) -> Vec<u64> {
        self.interrupt_pending = false;
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.interrupt_pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_interrupt_at_threshold() {
        let mut history = JumpHistory::new();
        let raised: Vec<usize> = (0..JUMP_HISTORY_SIZE + 10)
            .filter(|&n| history.store(n as u64).is_some())
            .collect();
        assert_eq!(raised, vec![JUMP_HISTORY_THRESHOLD - 1]);
        assert_eq!(history.len(), JUMP_HISTORY_SIZE);
    }

    #[test]
    fn test_take_entries_rearms() {
        let mut history = JumpHistory::new();
        for n in 0..JUMP_HISTORY_THRESHOLD as u64 {
            history.store(n);
        }
        let entries = history.take_entries();
        assert_eq!(entries.len(), JUMP_HISTORY_THRESHOLD);
        assert_eq!(entries[0], 0);
        assert_eq!(entries[JUMP_HISTORY_THRESHOLD - 1], JUMP_HISTORY_THRESHOLD as u64 - 1);
        assert!(history.is_empty());
        let again = (0..JUMP_HISTORY_THRESHOLD as u64).filter(|&n| history.store(n).is_some()).count();
        assert_eq!(again, 1);
    }
}
