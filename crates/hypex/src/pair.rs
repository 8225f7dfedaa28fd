//! Joint token table of two unigram categories.

use dbacl_category::{CategoryHeader, DumpReader};
use dbacl_core::{
    DbaclError, HashConfig, HashRecord, Result, Slot, TokenHash, Weight, WarnOnce,
    DEFAULT_HASH_BITS, DEFAULT_MAX_GROW_HASH_BITS,
};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

/// Reference weights of the two sources must agree to this tolerance.
pub const REFERENCE_TOLERANCE: f64 = 1e-5;

/// Which of the two categories a dump belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    P0,
    P1,
}

impl Side {
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Side::P0 => 0,
            Side::P1 => 1,
        }
    }

    #[inline]
    fn bit(self) -> u8 {
        1 << self.index()
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.index())
    }
}

/// A token seen in either category.
///
/// Only records supplied by both sides take part in the divergences.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PairItem {
    pub id: u64,
    pub lam: [Weight; 2],
    pub reference: Weight,
    /// Bit `i` is set once side `i` supplied the weight
    pub mask: u8,
}

impl HashRecord for PairItem {
    #[inline]
    fn id(&self) -> u64 {
        self.id
    }
}

impl PairItem {
    pub fn has(&self, side: Side) -> bool {
        self.mask & side.bit() != 0
    }

    /// Whether both sides supplied a weight.
    pub fn is_complete(&self) -> bool {
        self.mask == Side::P0.bit() | Side::P1.bit()
    }
}

/// Normalization constant and bookkeeping of one loaded side.
#[derive(Debug, Clone, PartialEq)]
pub struct SideInfo {
    pub name: String,
    pub logz: f64,
    pub features: u64,
    /// Records ignored because their reference weight disagreed
    pub mismatched: u64,
}

/// Two category dumps merged into one growable table.
#[derive(Debug)]
pub struct CategoryPair {
    table: TokenHash<PairItem>,
    sides: [Option<SideInfo>; 2],
}

impl CategoryPair {
    pub fn new(config: HashConfig) -> Result<Self> {
        Ok(Self {
            table: TokenHash::new(config)?,
            sides: [None, None],
        })
    }

    /// Load both dump files.
    pub fn from_files(p0: &Path, p1: &Path) -> Result<Self> {
        let mut pair = Self::new(HashConfig::growable(DEFAULT_HASH_BITS, DEFAULT_MAX_GROW_HASH_BITS))?;
        for (side, path) in [(Side::P0, p0), (Side::P1, p1)] {
            let file = File::open(path).map_err(|e| DbaclError::io(path, e))?;
            pair.load_dump(side, &path.display().to_string(), BufReader::new(file))?;
        }
        Ok(pair)
    }

    pub fn table(&self) -> &TokenHash<PairItem> {
        &self.table
    }

    pub fn side(&self, side: Side) -> Option<&SideInfo> {
        self.sides[side.index()].as_ref()
    }

    /// Normalization constant of a side, 0 until it is loaded.
    pub fn logz(&self, side: Side) -> f64 {
        self.side(side).map_or(0.0, |s| s.logz)
    }

    /// Whether both dumps are loaded, so every record carries both weights.
    pub fn is_complete(&self) -> bool {
        self.sides.iter().all(Option::is_some)
    }

    pub(crate) fn require_complete(&self) -> Result<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(DbaclError::Dump("both category dumps must be loaded".to_string()))
        }
    }

    /// Records of the joint table.
    pub fn items(&self) -> impl Iterator<Item = &PairItem> + '_ {
        self.table.iter()
    }

    /// Records carrying weights from both sides.
    pub fn complete_items(&self) -> impl Iterator<Item = &PairItem> + '_ {
        self.items().filter(|item| item.is_complete())
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Merge one dump into the table.
    ///
    /// Only unigram dumps are accepted, and the number of records must equal
    /// the header's feature count. On the second side, a token whose
    /// reference weight differs from the first side's is ignored. A token
    /// listed twice by the same dump keeps its first weight.
    pub fn load_dump<R: BufRead>(&mut self, side: Side, name: &str, reader: R) -> Result<()> {
        if self.sides[side.index()].is_some() {
            return Err(DbaclError::Dump(format!("{} already loaded for {}", side, name)));
        }

        let mut dump = DumpReader::new(reader)?;
        let header: CategoryHeader = dump.header().clone();
        if header.max_order != 1 {
            return Err(DbaclError::Dump(format!(
                "the category {} is not supported (model too complex)",
                name
            )));
        }

        let mut lines = 0u64;
        let mut mismatched = 0u64;
        let mut mismatch_warning = WarnOnce::new();
        while let Some(record) = dump.next_record()? {
            lines += 1;
            if record.id == 0 {
                return Err(DbaclError::Dump(format!(
                    "token id 0 on record {} of {}",
                    lines, name
                )));
            }

            let index = match self.table.reserve(record.id) {
                Some(Slot::Occupied(i)) => i,
                Some(Slot::Vacant(i)) => {
                    self.table.occupy(
                        i,
                        PairItem {
                            id: record.id,
                            reference: record.reference,
                            ..PairItem::default()
                        },
                    );
                    i
                }
                None => return Err(DbaclError::Dump("ran out of hashes".to_string())),
            };

            let item = self.table.slot_mut(index);
            if item.has(side) {
                debug!(
                    id = format_args!("{:x}", record.id),
                    "repeated token kept its first weight"
                );
                continue;
            }
            if item.mask != 0 && (record.reference - item.reference).abs() > REFERENCE_TOLERANCE {
                mismatched += 1;
                if mismatch_warning.first() {
                    warn!(
                        id = format_args!("{:x}", record.id),
                        "unequal reference measures, new token ignored"
                    );
                }
                continue;
            }
            item.lam[side.index()] = record.lam;
            item.mask |= side.bit();
        }

        if lines != header.unique_token_count {
            return Err(DbaclError::Dump(format!(
                "incorrect number of features in {}, expecting {}, got {}",
                name, header.unique_token_count, lines
            )));
        }

        debug!(
            %side,
            name,
            features = lines,
            mismatched,
            logz = header.logz,
            records = self.table.len(),
            hash_bits = self.table.hash_bits(),
            "loaded category dump"
        );
        self.sides[side.index()] = Some(SideInfo {
            name: name.to_string(),
            logz: header.logz,
            features: lines,
            mismatched,
        });
        Ok(())
    }
}
