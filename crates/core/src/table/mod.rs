//! Hash tables keyed by token identifiers.

pub mod token_hash;

pub use token_hash::{
    HashConfig, HashRecord, Slot, TokenHash, DEFAULT_HASH_BITS, DEFAULT_MAX_GROW_HASH_BITS,
    HASH_FULL, MAX_HASH_BITS,
};
