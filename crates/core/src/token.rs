//! Token text layout, token types and token identifiers.
//!
//! A token is the byte string
//!
//! ```text
//! DIAMOND w1 DIAMOND w2 ... wn DIAMOND EOTOKEN class
//! ```
//!
//! where `DIAMOND` separates words, `EOTOKEN` closes the text part and the
//! final byte carries the token class as `0x40 | class`. The identifier of a
//! token is a stable 64-bit hash of these bytes.

use std::fmt;
use xxhash_rust::xxh3::xxh3_64;

/// Word separator inside a token.
pub const DIAMOND: u8 = 0x01;

/// End of the text part of a token.
pub const EOTOKEN: u8 = 0x02;

/// Digram row holding the token length correction.
pub const RESERVED_TOKLEN: u8 = 0x03;

/// First byte value that can appear in token words.
pub const AMIN: u8 = 0x04;

/// Size of the byte alphabet.
pub const ASIZE: usize = 256;

/// Highest supported n-gram order.
pub const MAX_ORDER: u8 = 7;

/// Number of token classes.
pub const TOKEN_CLASS_MAX: usize = 16;

const CLASS_MARKER: u8 = 0x40;

/// Order and class of an emitted token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenType {
    /// Number of words in the n-gram (1..=7)
    pub order: u8,
    /// Token class (0..=15)
    pub class: u8,
}

impl TokenType {
    pub fn new(order: u8, class: u8) -> Self {
        debug_assert!((1..=MAX_ORDER).contains(&order));
        debug_assert!((class as usize) < TOKEN_CLASS_MAX);
        Self {
            order,
            class: class & 0x0f,
        }
    }

    /// A single word of class 0.
    pub fn unigram() -> Self {
        Self::new(1, 0)
    }
}

/// Which tokenizer produced a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenSource {
    /// The built-in n-gram tokenizer
    Standard,
    /// A registered regex, by its position in the registry
    Regex(u8),
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSource::Standard => write!(f, "std"),
            TokenSource::Regex(r) => write!(f, "re{}", r),
        }
    }
}

/// Stable identifier of a token text. Never 0.
#[inline]
pub fn token_id(text: &[u8]) -> u64 {
    match xxh3_64(text) {
        0 => 1,
        h => h,
    }
}

/// Build the token text for a sequence of words.
///
/// Bytes below [`AMIN`] inside words are replaced by a space so they cannot
/// be confused with the structural markers.
pub fn build_token<W: AsRef<[u8]>>(words: &[W], class: u8, out: &mut Vec<u8>) {
    out.clear();
    out.push(DIAMOND);
    for word in words {
        out.extend(
            word.as_ref()
                .iter()
                .map(|&b| if b < AMIN && b != b'\r' { b' ' } else { b }),
        );
        out.push(DIAMOND);
    }
    out.push(EOTOKEN);
    out.push(CLASS_MARKER | (class & 0x0f));
}

/// The part of a token before [`EOTOKEN`].
pub fn text_part(token: &[u8]) -> &[u8] {
    match token.iter().position(|&b| b == EOTOKEN) {
        Some(end) => &token[..end],
        None => token,
    }
}

/// Whether the text part holds nothing but word separators.
pub fn is_empty_token(token: &[u8]) -> bool {
    text_part(token).iter().all(|&b| b == DIAMOND)
}

/// Human readable form of a token: separators become spaces.
pub fn display_token(token: &[u8]) -> String {
    let text: Vec<u8> = text_part(token)
        .iter()
        .map(|&b| if b == DIAMOND { b' ' } else { b })
        .collect();
    String::from_utf8_lossy(&text).trim().to_string()
}
