//! Category models.
//!
//! A category is a digram reference matrix, a table of token weights and the
//! scalar statistics recorded when it was learned.

pub mod features;
pub mod options;

pub use features::{CategoryItem, FeatureTable, MappedFeatures, ITEM_SIZE};
pub use options::{CharParser, ModelOptions};

use compact_str::CompactString;
use dbacl_core::weights::{pack_digram, round_reference, unpack_digram, DIGITIZED_WEIGHT_MIN};
use dbacl_core::{
    DbaclError, DigitizedWeight, Result, Weight, AMIN, ASIZE, DIAMOND, EOTOKEN, RESERVED_TOKLEN,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How token weights combine into a document score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Token order is irrelevant (multinomial)
    #[default]
    Simple,
    /// n-gram / Markov model
    Sequential,
}

impl ModelType {
    /// Tag written in the header. Only the first letter is significant.
    pub fn tag(self) -> &'static str {
        match self {
            ModelType::Simple => "multinomial",
            ModelType::Sequential => "hierarchical",
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        if tag.starts_with('m') {
            ModelType::Simple
        } else {
            ModelType::Sequential
        }
    }
}

/// Submatch bitmap selecting every capture group.
pub const ALL_SUBMATCHES: u32 = u32::MAX;

/// Highest capture group a `||` suffix can name.
pub const MAX_SUBMATCH: usize = 9;

const NAMED_SUBMATCHES: u32 = ((1 << (MAX_SUBMATCH + 1)) - 1) & !1;

/// A regex associated with a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexSpec {
    pub pattern: String,
    /// Bit `k` set means capture group `k` contributes to the token
    pub submatches: u32,
}

impl RegexSpec {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            submatches: ALL_SUBMATCHES,
        }
    }

    /// A regex whose tokens are built from the listed capture groups only.
    pub fn with_groups(pattern: impl Into<String>, groups: &[usize]) -> Result<Self> {
        let mut submatches = 0u32;
        for &group in groups {
            if group == 0 || group > MAX_SUBMATCH {
                return Err(DbaclError::InvalidConfig(format!(
                    "capture group {} out of range 1..={}",
                    group, MAX_SUBMATCH
                )));
            }
            submatches |= 1 << group;
        }
        Ok(Self {
            pattern: pattern.into(),
            submatches,
        })
    }

    /// Whether the bitmap survives a save: every group or only groups `1..=9`.
    pub fn is_storable(&self) -> bool {
        self.submatches == ALL_SUBMATCHES || self.submatches & !NAMED_SUBMATCHES == 0
    }

    pub fn uses_group(&self, group: usize) -> bool {
        group < 32 && self.submatches & (1 << group) != 0
    }
}

/// `ASIZE x ASIZE` matrix of digitized reference log-probabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct DigramMatrix {
    cells: Box<[DigitizedWeight]>,
}

impl DigramMatrix {
    /// Number of cells.
    pub const LEN: usize = ASIZE * ASIZE;

    pub fn filled(cell: DigitizedWeight) -> Self {
        Self {
            cells: vec![cell; Self::LEN].into_boxed_slice(),
        }
    }

    pub(crate) fn from_cells(cells: Vec<DigitizedWeight>) -> Self {
        debug_assert_eq!(cells.len(), Self::LEN);
        Self {
            cells: cells.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn cell(&self, row: u8, col: u8) -> DigitizedWeight {
        self.cells[row as usize * ASIZE + col as usize]
    }

    #[inline]
    pub fn set_cell(&mut self, row: u8, col: u8, cell: DigitizedWeight) {
        self.cells[row as usize * ASIZE + col as usize] = cell;
    }

    /// Unpacked weight of `col` following `row`.
    #[inline]
    pub fn weight(&self, row: u8, col: u8) -> Weight {
        unpack_digram(self.cell(row, col))
    }

    pub fn set_weight(&mut self, row: u8, col: u8, w: Weight) {
        self.set_cell(row, col, pack_digram(w));
    }

    pub fn cells(&self) -> &[DigitizedWeight] {
        &self.cells
    }
}

/// Everything stored in the text header of a category file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryHeader {
    pub divergence: f64,
    pub logz: f64,
    pub max_order: u8,
    pub model_type: ModelType,
    pub hash_bits: u8,
    pub full_token_count: u64,
    pub unique_token_count: u64,
    pub num_docs: u64,
    pub shannon: f64,
    pub shannon_s2: f64,
    pub alpha: f64,
    pub beta: f64,
    pub mu: f64,
    pub s2: f64,
    pub regexes: Vec<RegexSpec>,
    pub options: ModelOptions,
    pub char_parser: CharParser,
    /// Digitization scheme tag, carried through unchanged
    pub dig_type: u16,
}

impl Default for CategoryHeader {
    fn default() -> Self {
        Self {
            divergence: 0.0,
            logz: 0.0,
            max_order: 1,
            model_type: ModelType::Simple,
            hash_bits: dbacl_core::DEFAULT_HASH_BITS,
            full_token_count: 0,
            unique_token_count: 0,
            num_docs: 0,
            shannon: 0.0,
            shannon_s2: 0.0,
            alpha: 0.0,
            beta: 0.0,
            mu: 0.0,
            s2: 0.0,
            regexes: Vec::new(),
            options: ModelOptions::default(),
            char_parser: CharParser::Default,
            dig_type: 0,
        }
    }
}

impl CategoryHeader {
    /// Fill in what a header leaves implicit.
    ///
    /// A category without regexes scores standard tokens, and an undeclared
    /// character class falls back to `Adp` for email and `Alpha` otherwise.
    pub fn resolve_defaults(&mut self) {
        if self.regexes.is_empty() {
            self.options.use_stdtok = true;
        }
        if self.char_parser == CharParser::Default {
            self.char_parser = if self.options.mbox_format {
                CharParser::Adp
            } else {
                CharParser::Alpha
            };
        }
    }

    /// Number of record slots.
    pub fn capacity(&self) -> usize {
        1usize << self.hash_bits
    }
}

/// A loaded (or synthesized) category.
#[derive(Debug)]
pub struct CategoryModel {
    name: CompactString,
    path: Option<PathBuf>,
    pub(crate) header: CategoryHeader,
    pub(crate) digrams: DigramMatrix,
    pub(crate) features: Option<FeatureTable>,
    random: bool,
}

impl CategoryModel {
    pub(crate) fn from_parts(
        name: &str,
        path: Option<PathBuf>,
        header: CategoryHeader,
        digrams: DigramMatrix,
        features: Option<FeatureTable>,
    ) -> Self {
        Self {
            name: CompactString::new(name),
            path,
            header,
            digrams,
            features,
            random: false,
        }
    }

    /// Build a category from learned parts, e.g. in tests or tools.
    pub fn new(
        name: &str,
        header: CategoryHeader,
        digrams: DigramMatrix,
        features: FeatureTable,
    ) -> Self {
        Self::from_parts(name, None, header, digrams, Some(features))
    }

    /// The model of purely random text.
    ///
    /// Every transition between alphabet bytes, and from a word start into
    /// the alphabet, has probability `1/(ASIZE - AMIN)`. It carries no
    /// feature table and all of its normalizing constants are zero.
    pub fn random_text() -> Self {
        let z = -((ASIZE - AMIN as usize) as f64).ln();
        let zz = pack_digram(z);

        let mut digrams = DigramMatrix::filled(0);
        for i in AMIN..=u8::MAX {
            for j in AMIN..=u8::MAX {
                digrams.set_cell(i, j, zz);
            }
            digrams.set_cell(DIAMOND, i, zz);
        }
        digrams.set_cell(DIAMOND, DIAMOND, DIGITIZED_WEIGHT_MIN);

        let mut header = CategoryHeader::default();
        header.resolve_defaults();

        let mut model = Self::from_parts("random", None, header, digrams, None);
        model.random = true;
        model
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn header(&self) -> &CategoryHeader {
        &self.header
    }

    pub fn digrams(&self) -> &DigramMatrix {
        &self.digrams
    }

    pub fn features(&self) -> Option<&FeatureTable> {
        self.features.as_ref()
    }

    /// Whether this is the synthetic no-data model.
    pub fn is_random_text(&self) -> bool {
        self.random
    }

    pub fn model_type(&self) -> ModelType {
        self.header.model_type
    }

    pub fn max_order(&self) -> u8 {
        self.header.max_order
    }

    pub fn logz(&self) -> f64 {
        self.header.logz
    }

    /// Complexity added per token.
    pub fn delta(&self) -> f64 {
        if self.is_random_text() {
            0.0
        } else {
            1.0 / self.header.max_order as f64
        }
    }

    /// Normalization subtracted per token.
    pub fn renorm(&self) -> f64 {
        self.delta() * self.header.logz
    }

    /// Stored lambda for a token id, if any.
    #[inline]
    pub fn lookup(&self, id: u64) -> Option<CategoryItem> {
        self.features.as_ref().and_then(|f| f.lookup(id))
    }

    /// Reference weight of a unigram token under the digram model.
    ///
    /// Walks consecutive byte pairs of the token text (carriage returns are
    /// skipped), then adds the length correction from the `RESERVED_TOKLEN`
    /// row. The result is rounded exactly like stored weights.
    pub fn reference_weight(&self, token: &[u8]) -> Weight {
        let end = token
            .iter()
            .position(|&b| b == EOTOKEN)
            .unwrap_or(token.len());
        if end == 0 {
            return 0.0;
        }

        let mut weight = 0.0;
        let mut len = 1usize;
        let mut prev = token[0];
        let mut q = 1;
        while q < end {
            let cur = token[q];
            q += 1;
            if cur == b'\r' {
                continue;
            }
            weight += self.digrams.weight(prev, cur);
            prev = cur;
            if token.get(q) != Some(&DIAMOND) {
                len += 1;
            }
        }

        let len = len.min(ASIZE - 1) as u8;
        weight += self.digrams.weight(RESERVED_TOKLEN, len) - self.digrams.weight(RESERVED_TOKLEN, 0);
        round_reference(weight)
    }

    /// Release the feature table (or unmap it). Calling it twice is harmless.
    pub fn unload(&mut self) {
        self.features = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.features.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbacl_core::weights::unpack_digram;

    #[test]
    fn test_random_text_model() {
        let model = CategoryModel::random_text();
        let expected = -(252f64).ln();

        assert!((model.digrams().weight(b'a', b'b') - expected).abs() < 1.0 / 256.0);
        assert!((model.digrams().weight(DIAMOND, b'z') - expected).abs() < 1.0 / 256.0);
        assert_eq!(
            model.digrams().cell(DIAMOND, DIAMOND),
            DIGITIZED_WEIGHT_MIN
        );
        assert!(unpack_digram(model.digrams().cell(DIAMOND, DIAMOND)) < -255.0);

        assert_eq!(model.logz(), 0.0);
        assert_eq!(model.delta(), 0.0);
        assert_eq!(model.renorm(), 0.0);
        assert_eq!(model.max_order(), 1);
        assert_eq!(model.model_type(), ModelType::Simple);
        assert!(model.is_random_text());
        assert!(model.lookup(42).is_none());
    }

    #[test]
    fn test_reference_weight_walks_pairs() {
        let model = CategoryModel::random_text();
        let mut token = Vec::new();
        dbacl_core::build_token(&["ab"], 0, &mut token);

        // DIAMOND->a, a->b, b->DIAMOND; the last transition is not in the
        // alphabet rows and therefore 0 for random text
        let z = model.digrams().weight(b'a', b'b');
        let expected = round_reference(2.0 * z);
        assert!((model.reference_weight(&token) - expected).abs() < 1e-6);

        let mut with_cr = Vec::new();
        dbacl_core::build_token(&[b"a\rb".as_slice()], 0, &mut with_cr);
        let mut plain = Vec::new();
        dbacl_core::build_token(&["ab"], 0, &mut plain);
        assert_eq!(model.reference_weight(&with_cr), model.reference_weight(&plain));
    }

    #[test]
    fn test_resolve_defaults() {
        let mut header = CategoryHeader::default();
        header.options.mbox_format = true;
        header.resolve_defaults();
        assert_eq!(header.char_parser, CharParser::Adp);
        assert!(header.options.use_stdtok);

        let mut header = CategoryHeader::default();
        header.regexes.push(RegexSpec::new("([a-z]+)"));
        header.resolve_defaults();
        assert_eq!(header.char_parser, CharParser::Alpha);
        assert!(!header.options.use_stdtok);
    }

    #[test]
    fn test_model_type_tag() {
        assert_eq!(ModelType::from_tag("multinomial"), ModelType::Simple);
        assert_eq!(ModelType::from_tag("hierarchical"), ModelType::Sequential);
        assert_eq!(ModelType::from_tag(ModelType::Sequential.tag()), ModelType::Sequential);
    }

    #[test]
    fn test_unload_is_idempotent() {
        let mut model = CategoryModel::random_text();
        model.unload();
        model.unload();
        assert!(!model.is_loaded());
    }
}
