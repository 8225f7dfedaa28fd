//! Model options and character classes.
//!
//! Options are named booleans in memory. On disk they become a bitmask inside
//! the `# options` header line; the bit positions below are part of the file
//! format and must not be reordered.

use dbacl_core::{DbaclError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

const BIT_TEXT_FORMAT: u32 = 0;
const BIT_MBOX_FORMAT: u32 = 1;
const BIT_XML: u32 = 2;
const BIT_HTML: u32 = 3;
const BIT_I18N: u32 = 4;
const BIT_CASE_SENSITIVE: u32 = 5;
const BIT_CALC_ENTROPY: u32 = 6;
const BIT_MULTINOMIAL: u32 = 7;
const BIT_HEADERS: u32 = 8;
const BIT_PLAIN: u32 = 9;
const BIT_NOPLAIN: u32 = 10;
const BIT_USE_STDTOK: u32 = 11;
const BIT_NGRAM_STRADDLE_NL: u32 = 12;
const BIT_REFMODEL: u32 = 13;

/// Character class used by the standard tokenizer to find words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharParser {
    /// Not declared; resolved when a model is loaded
    #[default]
    Default,
    /// Every printable byte, one character per word
    Char,
    /// Alphabetic runs
    Alpha,
    /// Alphanumeric runs
    Alnum,
    /// Runs of printable non-space characters
    Graph,
    /// Alphabetic runs plus a single trailing punctuation mark
    Cef,
    /// Alphanumeric runs plus `.`, `-` and `_` inside words
    Adp,
    /// Like `Cef`, but digits may join letters
    Cef2,
}

impl CharParser {
    /// On-disk code.
    pub fn code(self) -> u8 {
        match self {
            CharParser::Default => 0,
            CharParser::Char => 1,
            CharParser::Alpha => 2,
            CharParser::Alnum => 3,
            CharParser::Graph => 4,
            CharParser::Cef => 5,
            CharParser::Adp => 6,
            CharParser::Cef2 => 7,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0 => CharParser::Default,
            1 => CharParser::Char,
            2 => CharParser::Alpha,
            3 => CharParser::Alnum,
            4 => CharParser::Graph,
            5 => CharParser::Cef,
            6 => CharParser::Adp,
            7 => CharParser::Cef2,
            other => {
                return Err(DbaclError::Format(format!(
                    "unknown character class {}",
                    other
                )))
            }
        })
    }

    /// Parse a command line name such as `alpha` or `adp`.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "char" => CharParser::Char,
            "alpha" => CharParser::Alpha,
            "alnum" => CharParser::Alnum,
            "graph" => CharParser::Graph,
            "cef" => CharParser::Cef,
            "adp" => CharParser::Adp,
            "cef2" => CharParser::Cef2,
            _ => return None,
        })
    }
}

impl fmt::Display for CharParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CharParser::Default => "default",
            CharParser::Char => "char",
            CharParser::Alpha => "alpha",
            CharParser::Alnum => "alnum",
            CharParser::Graph => "graph",
            CharParser::Cef => "cef",
            CharParser::Adp => "adp",
            CharParser::Cef2 => "cef2",
        };
        f.write_str(name)
    }
}

/// Options a category was learned with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelOptions {
    pub text_format: bool,
    pub mbox_format: bool,
    pub xml: bool,
    pub html: bool,
    pub i18n: bool,
    pub case_sensitive: bool,
    /// Track the empirical distribution of the scored document
    pub calc_entropy: bool,
    pub multinomial: bool,
    pub headers: bool,
    pub plain: bool,
    pub noplain: bool,
    /// Score tokens from the standard n-gram tokenizer
    pub use_stdtok: bool,
    /// Let n-grams continue across line breaks
    pub ngram_straddle_nl: bool,
    pub refmodel: bool,
}

impl ModelOptions {
    pub fn new() -> Self {
        Self::default()
    }

    fn fields(&self) -> [(u32, bool, &'static str); 14] {
        [
            (BIT_TEXT_FORMAT, self.text_format, "text"),
            (BIT_MBOX_FORMAT, self.mbox_format, "email"),
            (BIT_XML, self.xml, "xml"),
            (BIT_HTML, self.html, "html"),
            (BIT_I18N, self.i18n, "i18n"),
            (BIT_CASE_SENSITIVE, self.case_sensitive, "casen"),
            (BIT_CALC_ENTROPY, self.calc_entropy, "entropy"),
            (BIT_MULTINOMIAL, self.multinomial, "multinomial"),
            (BIT_HEADERS, self.headers, "headers"),
            (BIT_PLAIN, self.plain, "plain"),
            (BIT_NOPLAIN, self.noplain, "noplain"),
            (BIT_USE_STDTOK, self.use_stdtok, "stdtok"),
            (BIT_NGRAM_STRADDLE_NL, self.ngram_straddle_nl, "straddle"),
            (BIT_REFMODEL, self.refmodel, "refmodel"),
        ]
    }

    /// Bitmask written to the `# options` line.
    pub fn to_bits(&self) -> u32 {
        self.fields()
            .iter()
            .filter(|(_, on, _)| *on)
            .fold(0, |acc, (bit, _, _)| acc | (1 << bit))
    }

    pub fn from_bits(bits: u32) -> Self {
        let on = |bit: u32| bits & (1 << bit) != 0;
        Self {
            text_format: on(BIT_TEXT_FORMAT),
            mbox_format: on(BIT_MBOX_FORMAT),
            xml: on(BIT_XML),
            html: on(BIT_HTML),
            i18n: on(BIT_I18N),
            case_sensitive: on(BIT_CASE_SENSITIVE),
            calc_entropy: on(BIT_CALC_ENTROPY),
            multinomial: on(BIT_MULTINOMIAL),
            headers: on(BIT_HEADERS),
            plain: on(BIT_PLAIN),
            noplain: on(BIT_NOPLAIN),
            use_stdtok: on(BIT_USE_STDTOK),
            ngram_straddle_nl: on(BIT_NGRAM_STRADDLE_NL),
            refmodel: on(BIT_REFMODEL),
        }
    }

    /// Readable summary, e.g. `alpha|email|stdtok`.
    pub fn describe(&self, cp: CharParser) -> String {
        let mut out = cp.to_string();
        for (_, on, name) in self.fields() {
            if on {
                out.push('|');
                out.push_str(name);
            }
        }
        out
    }

    /// Merge the options of a loaded category into the options of this run.
    ///
    /// Tokenizer-affecting options always come from the category. For the
    /// mutually exclusive format pairs, an explicit choice for this run wins
    /// with a warning when the category disagrees; otherwise the category's
    /// choice is adopted. A character class that differs from an explicitly
    /// requested one is fatal, since the token sets would be incompatible.
    pub fn merge_category(
        &mut self,
        cp: &mut CharParser,
        category: &str,
        learned: &ModelOptions,
        learned_cp: CharParser,
    ) -> Result<()> {
        self.headers |= learned.headers;
        self.ngram_straddle_nl |= learned.ngram_straddle_nl;
        self.refmodel |= learned.refmodel;
        self.i18n |= learned.i18n;
        self.case_sensitive |= learned.case_sensitive;
        self.use_stdtok |= learned.use_stdtok;
        self.calc_entropy |= learned.calc_entropy;
        self.multinomial |= learned.multinomial;

        merge_exclusive(
            category,
            (&mut self.text_format, "text"),
            (&mut self.mbox_format, "email"),
            (learned.text_format, learned.mbox_format),
        );
        merge_exclusive(
            category,
            (&mut self.xml, "xml"),
            (&mut self.html, "html"),
            (learned.xml, learned.html),
        );
        merge_exclusive(
            category,
            (&mut self.plain, "email:plain"),
            (&mut self.noplain, "email:noplain"),
            (learned.plain, learned.noplain),
        );

        if *cp != CharParser::Default && *cp != learned_cp {
            return Err(DbaclError::InvalidConfig(format!(
                "category {} has incompatible token set (learned with {}, requested {})",
                category, learned_cp, cp
            )));
        }
        *cp = learned_cp;
        Ok(())
    }
}

fn merge_exclusive(
    category: &str,
    first: (&mut bool, &str),
    second: (&mut bool, &str),
    learned: (bool, bool),
) {
    let (first_on, first_name) = first;
    let (second_on, second_name) = second;

    if *first_on {
        if learned.1 {
            warn!(
                "category {} was learned with -T {}, forcing -T {}",
                category, second_name, first_name
            );
        }
    } else if *second_on {
        if learned.0 {
            warn!(
                "category {} was learned with -T {}, forcing -T {}",
                category, first_name, second_name
            );
        }
    } else {
        *first_on = learned.0;
        *second_on = learned.1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_roundtrip() {
        let opts = ModelOptions {
            mbox_format: true,
            case_sensitive: true,
            use_stdtok: true,
            refmodel: true,
            ..ModelOptions::default()
        };
        assert_eq!(ModelOptions::from_bits(opts.to_bits()), opts);
        assert_eq!(ModelOptions::default().to_bits(), 0);
    }

    #[test]
    fn test_char_parser_codes() {
        for code in 0..8 {
            assert_eq!(CharParser::from_code(code).unwrap().code(), code);
        }
        assert!(CharParser::from_code(8).is_err());
        assert_eq!(CharParser::from_name("ADP"), Some(CharParser::Adp));
    }

    #[test]
    fn test_merge_adopts_category_format() {
        let mut run = ModelOptions::default();
        let mut cp = CharParser::Default;
        let learned = ModelOptions {
            mbox_format: true,
            i18n: true,
            ..ModelOptions::default()
        };
        run.merge_category(&mut cp, "spam", &learned, CharParser::Adp)
            .unwrap();
        assert!(run.mbox_format);
        assert!(run.i18n);
        assert_eq!(cp, CharParser::Adp);
    }

    #[test]
    fn test_merge_explicit_format_wins() {
        let mut run = ModelOptions {
            text_format: true,
            ..ModelOptions::default()
        };
        let mut cp = CharParser::Default;
        let learned = ModelOptions {
            mbox_format: true,
            ..ModelOptions::default()
        };
        run.merge_category(&mut cp, "spam", &learned, CharParser::Alpha)
            .unwrap();
        assert!(run.text_format);
        assert!(!run.mbox_format);
    }

    #[test]
    fn test_merge_rejects_incompatible_char_class() {
        let mut run = ModelOptions::default();
        let mut cp = CharParser::Alpha;
        let err = run.merge_category(&mut cp, "ham", &ModelOptions::default(), CharParser::Graph);
        assert!(err.is_err());
    }
}
