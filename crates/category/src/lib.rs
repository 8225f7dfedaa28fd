//! dbacl-category - Category models and the token scorer
//!
//! A category is a statistical language model learned from example text: a
//! digram matrix of reference weights plus a hash table of token weights.
//! This crate reads and writes category files, tokenizes text and scores it
//! against any number of loaded categories.
//!
//! # Features
//!
//! - Category files with a text header, owned or memory-mapped
//! - Atomic saves and text dumps of token weights
//! - Standard n-gram tokenizer and category regex tokenizers
//! - Scorer with multinomial and Shannon corrections
//!
//! # Example
//!
//! ```rust
//! use dbacl_category::{CategoryModel, CharParser, Classifier, ModelOptions, ScorerConfig};
//!
//! let mut classifier = Classifier::new(ModelOptions::new(), CharParser::Default, ScorerConfig::default())?;
//! classifier.add_category(CategoryModel::random_text())?;
//! classifier.feed("the quick brown fox");
//!
//! for score in classifier.results() {
//!     println!("{} {:.2} * {}", score.name, score.cross_entropy, score.complexity);
//! }
//! # Ok::<(), dbacl_category::DbaclError>(())
//! ```

pub use dbacl_core::{DbaclError, Result};

// Models
pub mod model;
pub use model::{
    CategoryHeader, CategoryItem, CategoryModel, CharParser, DigramMatrix, FeatureTable,
    ModelOptions, ModelType, RegexSpec,
};

// File formats
pub mod io;
pub use io::{
    resolve_category_path, write_dump, CategoryLoader, CategorySaver, DumpReader, DumpRecord,
    LoadOptions,
};

// Tokenizers
pub mod tokenizer;
pub use tokenizer::{TokenCollector, TokenSink, Tokenizer, TokenizerBuilder, TokenizerConfig};

// Scoring
pub mod scorer;
pub use scorer::{
    CategoryScore, DerivedScores, Scorer, ScorerBuilder, ScorerConfig, ShannonCorrection,
};

pub mod classifier;
pub use classifier::Classifier;
