//! dbacl-core - Building blocks shared by the dbacl model engine
//!
//! This crate holds everything the category, bayesol and hypex crates need
//! to agree on: the on-disk token identifier, the open-addressing token hash
//! table, weight digitization and a handful of statistics helpers.
//!
//! # Features
//!
//! - Open-addressing `TokenHash` with in-place growth
//! - Stable 64-bit token identifiers (xxh3)
//! - Digitized digram and lambda weights
//! - Gamma and normal tail probabilities
//!
//! # Example
//!
//! ```rust
//! use dbacl_core::{build_token, token_id, HashConfig, HashRecord, TokenHash};
//!
//! #[derive(Clone, Default)]
//! struct Count { id: u64, n: u32 }
//!
//! impl HashRecord for Count {
//!     fn id(&self) -> u64 { self.id }
//! }
//!
//! let mut buf = Vec::new();
//! build_token(&["hello"], 0, &mut buf);
//!
//! let mut table: TokenHash<Count> = TokenHash::new(HashConfig::fixed(8))?;
//! table.insert(Count { id: token_id(&buf), n: 1 })?;
//! assert_eq!(table.len(), 1);
//! # Ok::<(), dbacl_core::DbaclError>(())
//! ```

pub mod error;
pub use error::{DbaclError, Result};

pub mod table;
pub use table::{
    HashConfig, HashRecord, Slot, TokenHash, DEFAULT_HASH_BITS, DEFAULT_MAX_GROW_HASH_BITS,
    HASH_FULL, MAX_HASH_BITS,
};

pub mod token;
pub use token::{
    build_token, display_token, is_empty_token, token_id, TokenSource, TokenType,
    AMIN, ASIZE, DIAMOND, EOTOKEN, MAX_ORDER, RESERVED_TOKLEN, TOKEN_CLASS_MAX,
};

pub mod weights;
pub use weights::{DigitizedWeight, Weight};

pub mod stats;

pub mod warn;
pub use warn::WarnOnce;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
