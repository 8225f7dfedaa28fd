//! Open-addressing token hash table.
//!
//! Records live in a single contiguous `Vec`. A slot is empty when its record
//! carries the identifier 0; identifiers start probing at `id & mask` and move
//! forward with wraparound. There is no deletion: once a slot is filled it
//! stays filled for the lifetime of the table (bulk clearing excepted).

use crate::error::{DbaclError, Result};
use crate::warn::WarnOnce;
use tracing::{debug, warn};

/// Maximum fill percentage before growth is attempted or inserts are refused.
pub const HASH_FULL: usize = 90;

/// Largest table any configuration may ask for.
pub const MAX_HASH_BITS: u8 = 30;

/// Default size of freshly created tables (2^15 slots).
pub const DEFAULT_HASH_BITS: u8 = 15;

/// Default ceiling for growable tables.
pub const DEFAULT_MAX_GROW_HASH_BITS: u8 = 22;

/// A fixed-size record stored in a [`TokenHash`].
///
/// The identifier 0 is reserved for empty slots, so `Default` must produce a
/// record whose `id()` is 0.
pub trait HashRecord: Clone + Default {
    /// Token identifier held by this record.
    fn id(&self) -> u64;

    /// Whether the slot holding this record is in use.
    #[inline]
    fn is_filled(&self) -> bool {
        self.id() != 0
    }
}

/// Result of probing for an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// The identifier is stored at this index.
    Occupied(usize),
    /// The identifier is absent; this is where it would be inserted.
    Vacant(usize),
}

impl Slot {
    /// Index of the slot regardless of occupancy.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Slot::Occupied(i) | Slot::Vacant(i) => i,
        }
    }
}

/// Sizing of a table and whether it may grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashConfig {
    /// Initial table size as a power of two
    pub hash_bits: u8,
    /// Growth ceiling; `None` makes the table fixed-size
    pub max_grow_bits: Option<u8>,
}

impl HashConfig {
    /// A table that never grows.
    pub fn fixed(hash_bits: u8) -> Self {
        Self {
            hash_bits,
            max_grow_bits: None,
        }
    }

    /// A table that doubles on demand until `max_grow_bits`.
    pub fn growable(hash_bits: u8, max_grow_bits: u8) -> Self {
        Self {
            hash_bits,
            max_grow_bits: Some(max_grow_bits),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.hash_bits == 0 || self.hash_bits > MAX_HASH_BITS {
            return Err(DbaclError::InvalidConfig(format!(
                "hash bits must be between 1 and {}, got {}",
                MAX_HASH_BITS, self.hash_bits
            )));
        }
        if let Some(ceiling) = self.max_grow_bits {
            if ceiling > MAX_HASH_BITS {
                return Err(DbaclError::InvalidConfig(format!(
                    "maximum hash size is 2^{}, got 2^{}",
                    MAX_HASH_BITS, ceiling
                )));
            }
        }
        Ok(())
    }
}

impl Default for HashConfig {
    fn default() -> Self {
        Self::fixed(DEFAULT_HASH_BITS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Growth {
    Fixed,
    Growable { ceiling: u8 },
    /// Ceiling reached; the table keeps filling past `HASH_FULL`.
    Exhausted,
}

/// Generic open-addressing hash table keyed by 64-bit token identifiers.
#[derive(Debug, Clone)]
pub struct TokenHash<R> {
    slots: Vec<R>,
    hash_bits: u8,
    filled: usize,
    growth: Growth,
    dropped: u64,
    full_warning: WarnOnce,
}

impl<R: HashRecord> TokenHash<R> {
    /// Allocate an empty table.
    ///
    /// Failure to allocate the table is fatal for the caller.
    pub fn new(config: HashConfig) -> Result<Self> {
        config.validate()?;
        let capacity = 1usize << config.hash_bits;

        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity).map_err(|_| {
            DbaclError::InvalidConfig(format!(
                "not enough memory for {} hash slots",
                capacity
            ))
        })?;
        slots.resize(capacity, R::default());

        Ok(Self {
            slots,
            hash_bits: config.hash_bits,
            filled: 0,
            growth: match config.max_grow_bits {
                Some(ceiling) => Growth::Growable { ceiling },
                None => Growth::Fixed,
            },
            dropped: 0,
            full_warning: WarnOnce::new(),
        })
    }

    /// Wrap a slot image read from disk. The table is fixed-size.
    pub fn from_slots(slots: Vec<R>) -> Result<Self> {
        if slots.is_empty() || !slots.len().is_power_of_two() {
            return Err(DbaclError::Format(format!(
                "hash table size {} is not a power of two",
                slots.len()
            )));
        }
        let hash_bits = slots.len().trailing_zeros() as u8;
        let filled = slots.iter().filter(|r| r.is_filled()).count();

        Ok(Self {
            slots,
            hash_bits,
            filled,
            growth: Growth::Fixed,
            dropped: 0,
            full_warning: WarnOnce::new(),
        })
    }

    /// Number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Table size as a power of two.
    #[inline]
    pub fn hash_bits(&self) -> u8 {
        self.hash_bits
    }

    /// Number of filled slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.filled
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Records refused because the table was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Whether one more record would cross the load factor cap.
    #[inline]
    pub fn is_nearly_full(&self) -> bool {
        100 * self.filled >= HASH_FULL * self.slots.len()
    }

    #[inline]
    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    /// Probe for `id`.
    ///
    /// Returns the slot holding it, the first empty slot on its probe path, or
    /// `None` when the probe wrapped around a completely full table.
    pub fn find(&self, id: u64) -> Option<Slot> {
        let mask = self.mask();
        let start = (id as usize) & mask;
        let mut i = start;

        while self.slots[i].is_filled() {
            if self.slots[i].id() == id {
                return Some(Slot::Occupied(i));
            }
            i = (i + 1) & mask;
            if i == start {
                return None;
            }
        }
        Some(Slot::Vacant(i))
    }

    /// Record stored under `id`, if any.
    #[inline]
    pub fn get(&self, id: u64) -> Option<&R> {
        match self.find(id) {
            Some(Slot::Occupied(i)) => Some(&self.slots[i]),
            _ => None,
        }
    }

    /// Mutable record stored under `id`, if any.
    #[inline]
    pub fn get_mut(&mut self, id: u64) -> Option<&mut R> {
        match self.find(id) {
            Some(Slot::Occupied(i)) => Some(&mut self.slots[i]),
            _ => None,
        }
    }

    /// Record at a slot index.
    #[inline]
    pub fn slot(&self, index: usize) -> &R {
        &self.slots[index]
    }

    /// Mutable record at a slot index. Callers must not change its identifier.
    #[inline]
    pub fn slot_mut(&mut self, index: usize) -> &mut R {
        &mut self.slots[index]
    }

    /// Find where `id` lives or may be inserted, growing the table if needed.
    ///
    /// A vacant slot is only returned when the table may take one more record:
    /// fixed tables refuse at `HASH_FULL`, growable tables grow first and keep
    /// accepting records after their ceiling is reached. Refusals are counted
    /// and warned about once.
    pub fn reserve(&mut self, id: u64) -> Option<Slot> {
        let mut slot = self.find(id);

        if matches!(slot, Some(Slot::Vacant(_))) && self.is_nearly_full() {
            match self.growth {
                Growth::Fixed => {
                    self.refuse();
                    return None;
                }
                Growth::Growable { .. } => {
                    self.grow();
                    slot = self.find(id);
                }
                Growth::Exhausted => {}
            }
        }

        if slot.is_none() {
            self.refuse();
        }
        slot
    }

    fn refuse(&mut self) {
        self.dropped += 1;
        if self.full_warning.first() {
            warn!(
                capacity = self.slots.len(),
                "token hash table full, further tokens are dropped; try {} hash bits",
                self.hash_bits + 1
            );
        }
    }

    /// Store `record` in a slot returned by [`reserve`](Self::reserve).
    pub fn occupy(&mut self, index: usize, record: R) {
        debug_assert!(record.is_filled());
        if !self.slots[index].is_filled() {
            self.filled += 1;
        }
        self.slots[index] = record;
    }

    /// Insert or replace the record for `record.id()`.
    ///
    /// Returns the slot index, or an error when the table refused the record.
    pub fn insert(&mut self, record: R) -> Result<usize> {
        match self.reserve(record.id()) {
            Some(slot) => {
                let index = slot.index();
                self.occupy(index, record);
                Ok(index)
            }
            None => Err(DbaclError::TableFull {
                capacity: self.slots.len(),
            }),
        }
    }

    /// Double the capacity and relocate every record in place.
    ///
    /// Every originally filled slot is marked; each marked record is refiled
    /// to the first slot on its new probe path that is empty or still marked.
    /// Landing on a marked slot swaps the two records, so the displaced one is
    /// processed next from the current position. Returns `false` when growth
    /// was refused.
    pub fn grow(&mut self) -> bool {
        let ceiling = match self.growth {
            Growth::Growable { ceiling } => ceiling,
            Growth::Fixed | Growth::Exhausted => return false,
        };

        if self.hash_bits >= ceiling {
            self.growth = Growth::Exhausted;
            warn!(
                hash_bits = self.hash_bits,
                "the token hash table is nearly full, slowing down"
            );
            return false;
        }

        let old_capacity = self.slots.len();
        let new_capacity = old_capacity << 1;
        if self.slots.try_reserve_exact(old_capacity).is_err() {
            warn!("failed to grow hash table");
            self.growth = Growth::Exhausted;
            return false;
        }
        self.slots.resize(new_capacity, R::default());
        self.hash_bits += 1;

        let mut marked: Vec<bool> = self.slots.iter().map(|r| r.is_filled()).collect();
        let mask = new_capacity - 1;

        for c in 0..old_capacity {
            while marked[c] {
                let mut i = (self.slots[c].id() as usize) & mask;
                while self.slots[i].is_filled() && !marked[i] {
                    i = (i + 1) & mask;
                }

                // unmark only after probing, the record may belong where it is
                marked[c] = false;

                if i != c {
                    if marked[i] {
                        self.slots.swap(i, c);
                        marked[i] = false;
                        marked[c] = true;
                    } else {
                        self.slots[i] = std::mem::take(&mut self.slots[c]);
                    }
                }
            }
        }

        debug!(
            hash_bits = self.hash_bits,
            records = self.filled,
            "grew token hash table"
        );
        true
    }

    /// Empty every slot.
    pub fn clear(&mut self) {
        self.slots.fill(R::default());
        self.filled = 0;
    }

    /// Empty the listed slots.
    ///
    /// Only valid when `indices` covers every filled slot, otherwise probe
    /// chains of the remaining records would be broken.
    pub fn clear_slots(&mut self, indices: &[usize]) {
        for &i in indices {
            if self.slots[i].is_filled() {
                self.slots[i] = R::default();
                self.filled -= 1;
            }
        }
    }

    /// Iterate over filled records.
    pub fn iter(&self) -> impl Iterator<Item = &R> + '_ {
        self.slots.iter().filter(|r| r.is_filled())
    }

    /// Raw slot image, including empty slots, in table order.
    pub fn slots(&self) -> &[R] {
        &self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Item {
        id: u64,
        value: u32,
    }

    impl HashRecord for Item {
        fn id(&self) -> u64 {
            self.id
        }
    }

    fn item(id: u64, value: u32) -> Item {
        Item { id, value }
    }

    #[test]
    fn test_insert_and_find() {
        let mut table: TokenHash<Item> = TokenHash::new(HashConfig::fixed(4)).unwrap();
        table.insert(item(3, 30)).unwrap();
        table.insert(item(19, 190)).unwrap(); // same home slot as 3

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(3).unwrap().value, 30);
        assert_eq!(table.get(19).unwrap().value, 190);
        assert_eq!(table.find(19), Some(Slot::Occupied(4)));
        assert_eq!(table.find(35), Some(Slot::Vacant(5)));
        assert!(table.get(35).is_none());
    }

    #[test]
    fn test_probe_wraps_around() {
        let mut table: TokenHash<Item> = TokenHash::new(HashConfig::fixed(3)).unwrap();
        table.insert(item(7, 1)).unwrap();
        table.insert(item(15, 2)).unwrap();

        assert_eq!(table.find(7), Some(Slot::Occupied(7)));
        assert_eq!(table.find(15), Some(Slot::Occupied(0)));
    }

    #[test]
    fn test_insert_replaces_existing() {
        let mut table: TokenHash<Item> = TokenHash::new(HashConfig::fixed(4)).unwrap();
        table.insert(item(5, 1)).unwrap();
        table.insert(item(5, 2)).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.get(5).unwrap().value, 2);
    }

    #[test]
    fn test_fixed_table_refuses_past_cap() {
        let mut table: TokenHash<Item> = TokenHash::new(HashConfig::fixed(4)).unwrap();
        // 90% of 16 slots is 14.4, so the 15th new record is refused
        for id in 1..=15u64 {
            table.insert(item(id, id as u32)).unwrap();
        }
        assert!(table.insert(item(100, 0)).is_err());
        assert_eq!(table.dropped(), 1);
        // existing ids can still be updated
        table.insert(item(1, 99)).unwrap();
        assert_eq!(table.get(1).unwrap().value, 99);
    }

    #[test]
    fn test_grow_from_16_to_32_preserves_records() {
        let mut table: TokenHash<Item> = TokenHash::new(HashConfig::growable(4, 8)).unwrap();
        let ids: Vec<u64> = (1..=15u64).map(|k| k * 16 + (k % 3)).collect();
        for (n, &id) in ids.iter().enumerate() {
            table.insert(item(id, n as u32)).unwrap();
        }
        assert_eq!(table.capacity(), 16);

        table.insert(item(999, 77)).unwrap();
        assert_eq!(table.capacity(), 32);
        assert_eq!(table.hash_bits(), 5);

        for (n, &id) in ids.iter().enumerate() {
            assert_eq!(table.get(id), Some(&item(id, n as u32)));
        }
        assert_eq!(table.get(999).unwrap().value, 77);
        assert_eq!(table.len(), 16);
    }

    #[test]
    fn test_growth_ceiling_degrades_gracefully() {
        let mut table: TokenHash<Item> = TokenHash::new(HashConfig::growable(3, 3)).unwrap();
        for id in 1..=8u64 {
            table.insert(item(id, 0)).unwrap();
        }
        assert_eq!(table.capacity(), 8);
        assert!(!table.grow());
        // completely full now: the next new id has nowhere to go
        assert!(table.insert(item(9, 0)).is_err());
    }

    #[test]
    fn test_from_slots_rejects_bad_size() {
        let slots = vec![Item::default(); 12];
        assert!(TokenHash::from_slots(slots).is_err());

        let mut slots = vec![Item::default(); 8];
        slots[2] = item(2, 1);
        let table = TokenHash::from_slots(slots).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.hash_bits(), 3);
    }

    #[test]
    fn test_clear_slots() {
        let mut table: TokenHash<Item> = TokenHash::new(HashConfig::fixed(4)).unwrap();
        let a = table.insert(item(1, 1)).unwrap();
        let b = table.insert(item(17, 1)).unwrap();
        table.clear_slots(&[a, b]);
        assert!(table.is_empty());
        assert!(table.get(17).is_none());
    }
}
