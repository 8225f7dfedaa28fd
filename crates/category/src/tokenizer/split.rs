//! Word splitting for the standard tokenizer.
//!
//! Each character class decides which runs of a line count as words.

use crate::model::CharParser;
use unicode_segmentation::UnicodeSegmentation;

/// Splits a line into words according to a [`CharParser`].
#[derive(Debug, Clone, Copy)]
pub struct WordSplitter {
    class: CharParser,
    i18n: bool,
}

impl WordSplitter {
    pub fn new(class: CharParser, i18n: bool) -> Self {
        Self { class, i18n }
    }

    pub fn class(&self) -> CharParser {
        self.class
    }

    fn alpha(&self, c: char) -> bool {
        if self.i18n {
            c.is_alphabetic()
        } else {
            c.is_ascii_alphabetic()
        }
    }

    fn alnum(&self, c: char) -> bool {
        if self.i18n {
            c.is_alphanumeric()
        } else {
            c.is_ascii_alphanumeric()
        }
    }

    fn graph(&self, c: char) -> bool {
        if self.i18n {
            !c.is_whitespace() && !c.is_control()
        } else {
            c.is_ascii_graphic()
        }
    }

    /// Split `line` into words.
    pub fn split<'a>(&self, line: &'a str) -> Vec<&'a str> {
        match self.class {
            CharParser::Char => line
                .char_indices()
                .filter(|&(_, c)| self.graph(c))
                .map(|(i, c)| &line[i..i + c.len_utf8()])
                .collect(),
            CharParser::Graph => line.split(|c: char| !self.graph(c)).filter(|w| !w.is_empty()).collect(),
            CharParser::Alnum => self.runs(line, |c| self.alnum(c)),
            CharParser::Adp => {
                let inner = |c: char| self.alnum(c) || matches!(c, '.' | '-' | '_');
                runs(line, inner)
                    .into_iter()
                    .map(|w| w.trim_matches(|c: char| matches!(c, '.' | '-' | '_')))
                    .filter(|w| !w.is_empty())
                    .collect()
            }
            CharParser::Cef => with_trailing_punct(line, runs(line, |c| self.alpha(c))),
            CharParser::Cef2 => with_trailing_punct(line, runs(line, |c| self.alnum(c))),
            CharParser::Alpha | CharParser::Default => self.runs(line, |c| self.alpha(c)),
        }
    }

    /// Runs of `pred`, restricted to Unicode word boundaries under i18n.
    fn runs<'a>(&self, line: &'a str, pred: impl Fn(char) -> bool + Copy) -> Vec<&'a str> {
        if !self.i18n {
            return runs(line, pred);
        }
        line.unicode_words().flat_map(|w| runs(w, pred)).collect()
    }
}

fn runs<'a>(line: &'a str, pred: impl Fn(char) -> bool) -> Vec<&'a str> {
    let mut words = Vec::new();
    let mut start = None;
    for (i, c) in line.char_indices() {
        match (pred(c), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                words.push(&line[s..i]);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        words.push(&line[s..]);
    }
    words
}

/// Extend each word by one ASCII punctuation mark that directly follows it.
fn with_trailing_punct<'a>(line: &'a str, words: Vec<&'a str>) -> Vec<&'a str> {
    let base = line.as_ptr() as usize;
    words
        .into_iter()
        .map(|w| {
            let end = w.as_ptr() as usize - base + w.len();
            match line[end..].chars().next() {
                Some(c) if c.is_ascii_punctuation() => &line[end - w.len()..end + 1],
                _ => w,
            }
        })
        .collect()
}
