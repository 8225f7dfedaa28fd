//! Empirical token distribution of the document being scored.

use dbacl_core::{HashConfig, HashRecord, Result, Slot, TokenHash};

/// Tokens remembered for fast clearing before falling back to a full wipe.
pub const MAX_FEATURE_STACK: usize = 1024;

/// Empirical count of one token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmpiricalItem {
    pub id: u64,
    pub count: u32,
}

impl HashRecord for EmpiricalItem {
    #[inline]
    fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    fn is_filled(&self) -> bool {
        self.id != 0
    }
}

/// Result of counting one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Count after this sighting
    pub count: u32,
    /// First sighting in this document
    pub first: bool,
    /// False when the count was already saturated
    pub counted: bool,
}

/// Per-document token counts.
#[derive(Debug, Clone)]
pub struct EmpiricalTable {
    table: TokenHash<EmpiricalItem>,
    full_token_count: u64,
    stack: Vec<usize>,
    fast_clear: bool,
    tracking: bool,
}

impl EmpiricalTable {
    pub fn new(config: HashConfig, fast_clear: bool) -> Result<Self> {
        Ok(Self {
            table: TokenHash::new(config)?,
            full_token_count: 0,
            stack: Vec::new(),
            fast_clear,
            tracking: fast_clear,
        })
    }

    /// Count one sighting of `id`.
    ///
    /// Returns `None` when the table is full and the token must be ignored.
    pub fn observe(&mut self, id: u64) -> Option<Observation> {
        let capacity = self.table.capacity();
        let slot = self.table.reserve(id)?;
        if self.table.capacity() != capacity {
            // remembered slot indices died with the old layout
            self.tracking = false;
            self.stack.clear();
        }

        let obs = match slot {
            Slot::Occupied(i) => {
                let item = self.table.slot_mut(i);
                let counted = item.count < u32::MAX;
                if counted {
                    item.count += 1;
                }
                Observation {
                    count: item.count,
                    first: false,
                    counted,
                }
            }
            Slot::Vacant(i) => {
                self.table.occupy(i, EmpiricalItem { id, count: 1 });
                if self.tracking {
                    if self.stack.len() < MAX_FEATURE_STACK {
                        self.stack.push(i);
                    } else {
                        self.tracking = false;
                        self.stack.clear();
                    }
                }
                Observation {
                    count: 1,
                    first: true,
                    counted: true,
                }
            }
        };

        self.full_token_count = self.full_token_count.saturating_add(1);
        Some(obs)
    }

    /// Current count of `id`.
    pub fn count(&self, id: u64) -> u32 {
        self.table.get(id).map_or(0, |item| item.count)
    }

    pub fn full_token_count(&self) -> u64 {
        self.full_token_count
    }

    pub fn unique_token_count(&self) -> usize {
        self.table.len()
    }

    /// Entropy in nats of the empirical distribution, 0 for an empty document.
    pub fn entropy(&self) -> f64 {
        if self.full_token_count == 0 {
            return 0.0;
        }
        let n = self.full_token_count as f64;
        let sum: f64 = self
            .table
            .iter()
            .map(|item| {
                let c = item.count as f64;
                c * c.ln()
            })
            .sum();
        -(sum / n - n.ln())
    }

    /// Forget every count.
    pub fn clear(&mut self) {
        if self.tracking {
            self.table.clear_slots(&self.stack);
        } else {
            self.table.clear();
        }
        self.stack.clear();
        self.full_token_count = 0;
        self.tracking = self.fast_clear;
    }
}
