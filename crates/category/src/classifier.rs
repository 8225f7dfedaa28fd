//! Tokenizer and scorer wired together for a set of categories.

use crate::io::LoadOptions;
use crate::model::{CategoryModel, CharParser, ModelOptions};
use crate::scorer::{CategoryScore, Scorer, ScorerConfig};
use crate::tokenizer::{Tokenizer, TokenizerConfig};
use dbacl_core::{DbaclError, Result};
use std::io::BufRead;
use tracing::{debug, warn};

/// Classifies documents against loaded categories.
///
/// Adding a category merges its learned options into the options of the
/// run, registers its regexes and reconfigures the tokenizer accordingly.
#[derive(Debug)]
pub struct Classifier {
    tokenizer: Tokenizer,
    scorer: Scorer,
    options: ModelOptions,
    char_parser: CharParser,
    max_order: u8,
}

impl Classifier {
    /// Start with the options requested for this run.
    ///
    /// `char_parser` may be [`CharParser::Default`] to adopt whatever the
    /// categories were learned with.
    pub fn new(options: ModelOptions, char_parser: CharParser, config: ScorerConfig) -> Result<Self> {
        let mut scorer = Scorer::new(config)?;
        if options.calc_entropy {
            scorer.enable_entropy()?;
        }
        Ok(Self {
            tokenizer: Tokenizer::new(TokenizerConfig::from_options(&options, char_parser, 1)),
            scorer,
            options,
            char_parser,
            max_order: 1,
        })
    }

    /// Add a category and return its index.
    pub fn add_category(&mut self, model: CategoryModel) -> Result<usize> {
        let header = model.header();
        self.options.merge_category(
            &mut self.char_parser,
            model.name(),
            &header.options,
            header.char_parser,
        )?;

        let mut mask = 0u32;
        for spec in &header.regexes {
            if let Some(index) = self.tokenizer.register_regex(spec)? {
                mask |= 1 << index;
            }
        }
        if !header.regexes.is_empty() && mask == 0 && !header.options.use_stdtok {
            warn!(category = model.name(), "no usable regex, category will score nothing");
        }

        self.max_order = self.max_order.max(model.max_order());
        self.tokenizer.reconfigure(TokenizerConfig::from_options(
            &self.options,
            self.char_parser,
            self.max_order,
        ));
        if self.options.calc_entropy {
            self.scorer.enable_entropy()?;
        }

        debug!(
            category = model.name(),
            max_order = model.max_order(),
            regex_mask = mask,
            "added category"
        );
        Ok(self.scorer.add_category(model, mask))
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    pub fn char_parser(&self) -> CharParser {
        self.char_parser
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    /// Score a piece of text, continuing the current document.
    pub fn feed(&mut self, text: &str) {
        self.tokenizer.tokenize(text, &mut self.scorer);
    }

    /// Score everything `reader` yields, continuing the current document.
    pub fn feed_reader<R: BufRead>(&mut self, mut reader: R) -> Result<()> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| DbaclError::io("<input>", e))?;
            if n == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            self.tokenizer
                .tokenize_line(line.trim_end_matches(['\n', '\r']), &mut self.scorer);
        }
        Ok(())
    }

    /// Scores of the current document.
    pub fn results(&self) -> Vec<CategoryScore> {
        self.scorer.results()
    }

    /// Name of the best category so far.
    pub fn best(&self) -> Option<&str> {
        self.scorer
            .best()
            .and_then(|i| self.scorer.model(i))
            .map(CategoryModel::name)
    }

    pub fn scores_line(&self) -> String {
        self.scorer.scores_line()
    }

    /// Start a new document.
    pub fn reset(&mut self) {
        self.tokenizer.reset();
        self.scorer.reset();
    }

    /// Read every file-backed category again, e.g. after relearning.
    pub fn reload_categories(&mut self, options: LoadOptions) -> Result<()> {
        for i in 0..self.scorer.len() {
            if let Some(model) = self.scorer.model_mut(i) {
                if model.path().is_some() {
                    model.reload(options)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CategoryHeader, CategoryItem, DigramMatrix, FeatureTable, RegexSpec};
    use dbacl_core::{build_token, token_id, HashConfig, TokenHash};

    fn category(name: &str, words: &[(&str, f32)], header: CategoryHeader) -> CategoryModel {
        let mut table: TokenHash<CategoryItem> = TokenHash::new(HashConfig::fixed(header.hash_bits)).unwrap();
        let mut buf = Vec::new();
        for (word, lam) in words {
            build_token(&[word], 1, &mut buf);
            table.insert(CategoryItem::new(token_id(&buf), *lam)).unwrap();
        }
        CategoryModel::new(name, header, DigramMatrix::filled(0), FeatureTable::Owned(table))
    }

    fn plain_header() -> CategoryHeader {
        let mut header = CategoryHeader {
            hash_bits: 6,
            ..CategoryHeader::default()
        };
        header.resolve_defaults();
        header
    }

    #[test]
    fn test_picks_category_with_known_words() {
        let mut c = Classifier::new(ModelOptions::new(), CharParser::Default, ScorerConfig::default()).unwrap();
        c.add_category(category("spam", &[("viagra", 3.0)], plain_header())).unwrap();
        c.add_category(category("ham", &[("meeting", 3.0)], plain_header())).unwrap();

        c.feed("Meeting at noon, about the meeting");
        assert_eq!(c.best(), Some("ham"));

        c.reset();
        c.feed("cheap VIAGRA");
        assert_eq!(c.best(), Some("spam"));
        assert_eq!(c.results()[0].tokens, 2);
    }

    #[test]
    fn test_incompatible_char_parser_is_fatal() {
        let mut c = Classifier::new(ModelOptions::new(), CharParser::Graph, ScorerConfig::default()).unwrap();
        let err = c.add_category(category("a", &[], plain_header())).unwrap_err();
        assert!(matches!(err, DbaclError::InvalidConfig(_)));
    }

    #[test]
    fn test_regex_category_scores_only_regex_tokens() {
        let mut header = CategoryHeader {
            hash_bits: 6,
            ..CategoryHeader::default()
        };
        header.regexes.push(RegexSpec::new("([0-9]+)"));
        header.resolve_defaults();

        let mut c = Classifier::new(ModelOptions::new(), CharParser::Default, ScorerConfig::default()).unwrap();
        c.add_category(category("digits", &[], header)).unwrap();
        c.add_category(category("words", &[], plain_header())).unwrap();

        c.feed("call 555 now");
        let results = c.results();
        assert_eq!(results[0].tokens, 1);
        assert_eq!(results[1].tokens, 2);
    }

    #[test]
    fn test_entropy_option_from_category() {
        let mut header = plain_header();
        header.options.calc_entropy = true;

        let mut c = Classifier::new(ModelOptions::new(), CharParser::Default, ScorerConfig::default()).unwrap();
        c.add_category(category("a", &[], header)).unwrap();
        assert!(c.options().calc_entropy);

        c.feed("x y x");
        let entropy = c.scorer().empirical_entropy().unwrap();
        let expected = -((2.0 * 2f64.ln()) / 3.0 - 3f64.ln());
        assert!((entropy - expected).abs() < 1e-12);
    }
}
