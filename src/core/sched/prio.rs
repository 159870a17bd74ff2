//! Priority bitmap for O(1) highest-ready lookup.
//!
//! One bit per priority level; a set bit means at least one ready thread at
//! that level. Numerically larger priorities are more urgent, so the lookup
//! scans the bitmap words top-down and resolves the highest set bit with the
//! CLZ instruction.

use crate::config::CFG_PRIO_MAX;
use crate::types::Prio;

/// Number of words needed for the priority bitmap.
const PRIO_TBL_SIZE: usize = (CFG_PRIO_MAX + 31) / 32;

/// Priority bitmap table.
///
/// Word 0 holds priorities 0..32 with priority `p` at bit `p % 32`; higher
/// words hold higher priority ranges.
pub struct PrioTable {
    bitmap: [u32; PRIO_TBL_SIZE],
}

impl PrioTable {
    pub const fn new() -> Self {
        PrioTable {
            bitmap: [0; PRIO_TBL_SIZE],
        }
    }

    pub fn init(&mut self) {
        for word in self.bitmap.iter_mut() {
            *word = 0;
        }
    }

    /// Insert a priority into the bitmap
    #[inline]
    pub fn insert(&mut self, prio: Prio) {
        debug_assert!((prio as usize) < CFG_PRIO_MAX);

        let word_idx = (prio / 32) as usize;
        let bit_pos = prio % 32;

        self.bitmap[word_idx] |= 1 << bit_pos;
    }

    /// Remove a priority from the bitmap
    #[inline]
    pub fn remove(&mut self, prio: Prio) {
        debug_assert!((prio as usize) < CFG_PRIO_MAX);

        let word_idx = (prio / 32) as usize;
        let bit_pos = prio % 32;

        self.bitmap[word_idx] &= !(1 << bit_pos);
    }

    /// Get the most urgent ready priority, 0 when the table is empty.
    #[inline]
    pub fn get_highest(&self) -> Prio {
        for (idx, &word) in self.bitmap.iter().enumerate().rev() {
            if word != 0 {
                let bit = 31 - word.leading_zeros() as Prio;
                return (idx as Prio) * 32 + bit;
            }
        }

        0
    }

    /// Check if a specific priority has any ready threads
    #[inline]
    pub fn is_set(&self, prio: Prio) -> bool {
        let word_idx = (prio / 32) as usize;
        let bit_pos = prio % 32;

        (self.bitmap[word_idx] & (1 << bit_pos)) != 0
    }

    /// Check if the priority table is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bitmap.iter().all(|&w| w == 0)
    }
}

impl Default for PrioTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table() {
        let table = PrioTable::new();
        assert!(table.is_empty());
        assert_eq!(table.get_highest(), 0);
    }

    #[test]
    fn test_insert_remove() {
        let mut table = PrioTable::new();

        table.insert(5);
        assert!(table.is_set(5));
        assert!(!table.is_set(4));
        assert_eq!(table.get_highest(), 5);

        table.insert(3);
        assert_eq!(table.get_highest(), 5);

        table.remove(5);
        assert_eq!(table.get_highest(), 3);

        table.remove(3);
        assert!(table.is_empty());
    }

    #[test]
    fn test_highest_wins() {
        let mut table = PrioTable::new();

        table.insert(10);
        table.insert(5);
        table.insert(20);
        table.insert(63);
        table.insert(15);

        assert_eq!(table.get_highest(), 63);

        table.remove(63);
        assert_eq!(table.get_highest(), 20);

        table.remove(20);
        assert_eq!(table.get_highest(), 15);
    }

    #[test]
    fn test_word_boundary() {
        let mut table = PrioTable::new();

        table.insert(31);
        assert_eq!(table.get_highest(), 31);

        table.insert(32);
        assert_eq!(table.get_highest(), 32);

        table.remove(32);
        assert_eq!(table.get_highest(), 31);
    }
}
