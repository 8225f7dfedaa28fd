//! Tokenizers feeding the scorer.
//!
//! Text is processed line by line. On each line every registered regex is
//! applied first, then the standard tokenizer splits the line into words and
//! emits every n-gram ending at each word. Tokens are handed to a
//! [`TokenSink`] in the token text format of [`dbacl_core::token`].

pub mod ngram;
pub mod registry;
pub mod split;

pub use ngram::NgramWindow;
pub use registry::{RegexRegistry, RegisteredRegex, MAX_REGEX};
pub use split::WordSplitter;

use crate::model::{CharParser, ModelOptions, RegexSpec};
use dbacl_core::{build_token, Result, TokenSource, TokenType, MAX_ORDER};

/// Token class given to plain text tokens.
pub const DEFAULT_TOKEN_CLASS: u8 = 1;

/// Receives tokens from a tokenizer.
pub trait TokenSink {
    fn emit_token(&mut self, token: &[u8], token_type: TokenType, source: TokenSource);
}

/// Configuration for building a tokenizer.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizerConfig {
    /// Longest n-gram emitted by the standard tokenizer
    pub max_order: u8,
    /// Character class of words
    pub char_parser: CharParser,
    /// Keep the case of words
    pub case_sensitive: bool,
    /// Use Unicode character classes
    pub i18n: bool,
    /// Let n-grams continue across line breaks
    pub straddle_newlines: bool,
    /// Run the standard tokenizer at all
    pub use_stdtok: bool,
    /// Class stamped on every token
    pub token_class: u8,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            max_order: 1,
            char_parser: CharParser::Alpha,
            case_sensitive: false,
            i18n: false,
            straddle_newlines: false,
            use_stdtok: true,
            token_class: DEFAULT_TOKEN_CLASS,
        }
    }
}

impl TokenizerConfig {
    /// Configuration matching merged category options.
    pub fn from_options(options: &ModelOptions, char_parser: CharParser, max_order: u8) -> Self {
        Self {
            max_order,
            char_parser: match char_parser {
                CharParser::Default => CharParser::Alpha,
                cp => cp,
            },
            case_sensitive: options.case_sensitive,
            i18n: options.i18n,
            straddle_newlines: options.ngram_straddle_nl,
            use_stdtok: options.use_stdtok,
            token_class: DEFAULT_TOKEN_CLASS,
        }
    }
}

/// Builder for creating a tokenizer.
#[derive(Debug, Clone, Default)]
pub struct TokenizerBuilder {
    config: TokenizerConfig,
    regexes: Vec<RegexSpec>,
}

impl TokenizerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the longest n-gram order (clamped to 1..=7).
    pub fn max_order(mut self, order: u8) -> Self {
        self.config.max_order = order.clamp(1, MAX_ORDER);
        self
    }

    pub fn char_parser(mut self, cp: CharParser) -> Self {
        self.config.char_parser = cp;
        self
    }

    pub fn case_sensitive(mut self, on: bool) -> Self {
        self.config.case_sensitive = on;
        self
    }

    pub fn i18n(mut self, on: bool) -> Self {
        self.config.i18n = on;
        self
    }

    pub fn straddle_newlines(mut self, on: bool) -> Self {
        self.config.straddle_newlines = on;
        self
    }

    pub fn use_stdtok(mut self, on: bool) -> Self {
        self.config.use_stdtok = on;
        self
    }

    /// Add a regex tokenizer.
    pub fn regex(mut self, spec: RegexSpec) -> Self {
        self.regexes.push(spec);
        self
    }

    pub fn build(self) -> Result<Tokenizer> {
        let mut tokenizer = Tokenizer::new(self.config);
        for spec in &self.regexes {
            tokenizer.register_regex(spec)?;
        }
        Ok(tokenizer)
    }
}

/// Line-oriented tokenizer.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    config: TokenizerConfig,
    splitter: WordSplitter,
    regexes: RegexRegistry,
    window: NgramWindow,
    buf: Vec<u8>,
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Self {
        let max_order = config.max_order.clamp(1, MAX_ORDER);
        Self {
            splitter: WordSplitter::new(config.char_parser, config.i18n),
            window: NgramWindow::new(max_order),
            config: TokenizerConfig { max_order, ..config },
            regexes: RegexRegistry::new(),
            buf: Vec::with_capacity(64),
        }
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    pub fn regexes(&self) -> &RegexRegistry {
        &self.regexes
    }

    /// Register a regex; see [`RegexRegistry::register`].
    pub fn register_regex(&mut self, spec: &RegexSpec) -> Result<Option<u8>> {
        self.regexes.register(spec)
    }

    /// Replace the configuration, keeping registered regexes.
    pub fn reconfigure(&mut self, config: TokenizerConfig) {
        let regexes = std::mem::take(&mut self.regexes);
        *self = Self::new(config);
        self.regexes = regexes;
    }

    /// Tokenize one line of text.
    pub fn tokenize_line<S: TokenSink + ?Sized>(&mut self, line: &str, sink: &mut S) {
        let class = self.config.token_class;

        for (index, entry) in self.regexes.iter() {
            for words in entry.matches(line) {
                let order = (words.len().min(MAX_ORDER as usize)) as u8;
                build_token(&words, class, &mut self.buf);
                sink.emit_token(&self.buf, TokenType::new(order, class), TokenSource::Regex(index));
            }
        }

        if self.config.use_stdtok {
            for word in self.splitter.split(line) {
                let word = if self.config.case_sensitive {
                    word.to_string()
                } else if self.config.i18n {
                    word.to_lowercase()
                } else {
                    word.to_ascii_lowercase()
                };
                self.window.push(word);

                for order in 1..=self.window.orders() {
                    let words: Vec<&str> = self.window.ngram(order).collect();
                    build_token(&words, class, &mut self.buf);
                    sink.emit_token(
                        &self.buf,
                        TokenType::new(order as u8, class),
                        TokenSource::Standard,
                    );
                }
            }
        }

        if !self.config.straddle_newlines {
            self.window.clear();
        }
    }

    /// Tokenize a whole document, one line at a time.
    pub fn tokenize<S: TokenSink + ?Sized>(&mut self, text: &str, sink: &mut S) {
        for line in text.lines() {
            self.tokenize_line(line, sink);
        }
    }

    /// Forget n-gram context at a document boundary.
    pub fn reset(&mut self) {
        self.window.clear();
    }
}

/// Collects emitted tokens, mainly for tests and dumps.
#[derive(Debug, Default, Clone)]
pub struct TokenCollector {
    pub tokens: Vec<(Vec<u8>, TokenType, TokenSource)>,
}

impl TokenSink for TokenCollector {
    fn emit_token(&mut self, token: &[u8], token_type: TokenType, source: TokenSource) {
        self.tokens.push((token.to_vec(), token_type, source));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbacl_core::display_token;

    fn shown(c: &TokenCollector) -> Vec<(String, u8)> {
        c.tokens
            .iter()
            .map(|(t, tt, _)| (display_token(t), tt.order))
            .collect()
    }

    #[test]
    fn test_unigrams_lowercased() {
        let mut tok = TokenizerBuilder::new().build().unwrap();
        let mut out = TokenCollector::default();
        tok.tokenize_line("Foo bar", &mut out);
        assert_eq!(shown(&out), vec![("foo".into(), 1), ("bar".into(), 1)]);
        assert!(out.tokens.iter().all(|(_, tt, _)| tt.class == DEFAULT_TOKEN_CLASS));
    }

    #[test]
    fn test_bigrams_reset_at_newline() {
        let mut tok = TokenizerBuilder::new().max_order(2).build().unwrap();
        let mut out = TokenCollector::default();
        tok.tokenize("a b\nc", &mut out);
        assert_eq!(
            shown(&out),
            vec![
                ("a".into(), 1),
                ("b".into(), 1),
                ("a b".into(), 2),
                ("c".into(), 1),
            ]
        );
    }

    #[test]
    fn test_bigrams_straddle_newline() {
        let mut tok = TokenizerBuilder::new()
            .max_order(2)
            .straddle_newlines(true)
            .build()
            .unwrap();
        let mut out = TokenCollector::default();
        tok.tokenize("a\nb", &mut out);
        assert_eq!(shown(&out).last().unwrap(), &("a b".to_string(), 2));

        tok.reset();
        let mut out = TokenCollector::default();
        tok.tokenize("c", &mut out);
        assert_eq!(shown(&out), vec![("c".into(), 1)]);
    }

    #[test]
    fn test_case_sensitive() {
        let mut tok = TokenizerBuilder::new().case_sensitive(true).build().unwrap();
        let mut out = TokenCollector::default();
        tok.tokenize_line("Foo", &mut out);
        assert_eq!(shown(&out), vec![("Foo".into(), 1)]);
    }

    #[test]
    fn test_regex_tokens_come_first() {
        let mut tok = TokenizerBuilder::new()
            .regex(RegexSpec::new("([a-z]+)@([a-z]+)"))
            .build()
            .unwrap();
        let mut out = TokenCollector::default();
        tok.tokenize_line("x me@host", &mut out);

        let (text, tt, source) = &out.tokens[0];
        assert_eq!(display_token(text), "me host");
        assert_eq!(tt.order, 2);
        assert_eq!(*source, TokenSource::Regex(0));
        assert!(out.tokens[1..].iter().all(|(_, _, s)| *s == TokenSource::Standard));
    }

    #[test]
    fn test_regex_only() {
        let mut tok = TokenizerBuilder::new()
            .use_stdtok(false)
            .regex(RegexSpec::new("[0-9]+"))
            .build()
            .unwrap();
        let mut out = TokenCollector::default();
        tok.tokenize_line("abc 12 def 345", &mut out);
        assert_eq!(shown(&out), vec![("12".into(), 1), ("345".into(), 1)]);
    }
}
