//! Feature weight tables, owned or memory mapped.

use dbacl_core::{HashRecord, TokenHash};
use memmap2::Mmap;

/// Size of one record on disk: big-endian id followed by big-endian lambda.
pub const ITEM_SIZE: usize = 12;

/// A token weight within one category.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CategoryItem {
    pub id: u64,
    pub lam: f32,
}

impl HashRecord for CategoryItem {
    #[inline]
    fn id(&self) -> u64 {
        self.id
    }
}

impl CategoryItem {
    pub fn new(id: u64, lam: f32) -> Self {
        Self { id, lam }
    }

    /// Decode a record from its on-disk form.
    #[inline]
    pub fn from_bytes(bytes: &[u8; ITEM_SIZE]) -> Self {
        let mut id = [0u8; 8];
        let mut lam = [0u8; 4];
        id.copy_from_slice(&bytes[..8]);
        lam.copy_from_slice(&bytes[8..]);
        Self {
            id: u64::from_be_bytes(id),
            lam: f32::from_be_bytes(lam),
        }
    }

    #[inline]
    pub fn to_bytes(&self) -> [u8; ITEM_SIZE] {
        let mut out = [0u8; ITEM_SIZE];
        out[..8].copy_from_slice(&self.id.to_be_bytes());
        out[8..].copy_from_slice(&self.lam.to_be_bytes());
        out
    }
}

/// Read-only view of a record table inside a mapped category file.
#[derive(Debug)]
pub struct MappedFeatures {
    map: Mmap,
    offset: usize,
    capacity: usize,
}

impl MappedFeatures {
    /// The caller checked that `map` holds `capacity` records at `offset`.
    pub(crate) fn new(map: Mmap, offset: usize, capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        debug_assert!(map.len() >= offset + capacity * ITEM_SIZE);
        Self {
            map,
            offset,
            capacity,
        }
    }

    #[inline]
    fn record(&self, index: usize) -> CategoryItem {
        let start = self.offset + index * ITEM_SIZE;
        let mut bytes = [0u8; ITEM_SIZE];
        bytes.copy_from_slice(&self.map[start..start + ITEM_SIZE]);
        CategoryItem::from_bytes(&bytes)
    }

    fn find(&self, id: u64) -> Option<CategoryItem> {
        let mask = self.capacity - 1;
        let start = (id as usize) & mask;
        let mut i = start;
        loop {
            let item = self.record(i);
            if !item.is_filled() {
                return None;
            }
            if item.id == id {
                return Some(item);
            }
            i = (i + 1) & mask;
            if i == start {
                return None;
            }
        }
    }
}

/// Storage for the weights of a loaded category.
#[derive(Debug)]
pub enum FeatureTable {
    Owned(TokenHash<CategoryItem>),
    Mapped(MappedFeatures),
}

impl FeatureTable {
    /// Stored record for `id`.
    #[inline]
    pub fn lookup(&self, id: u64) -> Option<CategoryItem> {
        match self {
            FeatureTable::Owned(table) => table.get(id).copied(),
            FeatureTable::Mapped(mapped) => mapped.find(id),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        match self {
            FeatureTable::Owned(table) => table.capacity(),
            FeatureTable::Mapped(mapped) => mapped.capacity,
        }
    }

    /// Record at a slot, empty or not.
    pub fn slot(&self, index: usize) -> CategoryItem {
        match self {
            FeatureTable::Owned(table) => *table.slot(index),
            FeatureTable::Mapped(mapped) => mapped.record(index),
        }
    }

    /// Filled records in slot order.
    pub fn items(&self) -> impl Iterator<Item = CategoryItem> + '_ {
        (0..self.capacity())
            .map(move |i| self.slot(i))
            .filter(|item| item.is_filled())
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, FeatureTable::Mapped(_))
    }
}
