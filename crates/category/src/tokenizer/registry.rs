//! Registry of the regexes associated with loaded categories.

use crate::model::RegexSpec;
use ahash::AHashMap;
use dbacl_core::{DbaclError, Result};
use regex::Regex;
use tracing::warn;

/// Most regexes a single run can track; categories keep a 32-bit mask.
pub const MAX_REGEX: usize = 32;

/// A compiled category regex.
#[derive(Debug, Clone)]
pub struct RegisteredRegex {
    pub spec: RegexSpec,
    pub regex: Regex,
}

/// Regexes shared by every category, deduplicated by pattern.
#[derive(Debug, Clone, Default)]
pub struct RegexRegistry {
    entries: Vec<RegisteredRegex>,
    by_pattern: AHashMap<String, u8>,
}

impl RegexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a regex and return its index.
    ///
    /// A pattern without any capture group is wrapped in one. A pattern
    /// that does not compile is dropped with a warning and `Ok(None)` is
    /// returned.
    pub fn register(&mut self, spec: &RegexSpec) -> Result<Option<u8>> {
        let pattern = if spec.pattern.contains('(') {
            spec.pattern.clone()
        } else {
            let wrapped = format!("({})", spec.pattern);
            warn!("no captures found in regex, converting to '{}'", wrapped);
            wrapped
        };

        if let Some(&i) = self.by_pattern.get(&pattern) {
            return Ok(Some(i));
        }
        if self.entries.len() >= MAX_REGEX {
            return Err(DbaclError::InvalidConfig(format!(
                "too many regular expressions (at most {})",
                MAX_REGEX
            )));
        }

        let regex = match Regex::new(&pattern) {
            Ok(regex) => regex,
            Err(e) => {
                warn!("could not compile regex '{}', ignoring: {}", pattern, e);
                return Ok(None);
            }
        };

        let index = self.entries.len() as u8;
        self.by_pattern.insert(pattern.clone(), index);
        self.entries.push(RegisteredRegex {
            spec: RegexSpec {
                pattern,
                submatches: spec.submatches,
            },
            regex,
        });
        Ok(Some(index))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &RegisteredRegex)> + '_ {
        self.entries.iter().enumerate().map(|(i, e)| (i as u8, e))
    }

    pub fn get(&self, index: u8) -> Option<&RegisteredRegex> {
        self.entries.get(index as usize)
    }
}

impl RegisteredRegex {
    /// The selected capture groups of every match in `line`.
    pub fn matches<'a>(&'a self, line: &'a str) -> impl Iterator<Item = Vec<&'a str>> + 'a {
        self.regex.captures_iter(line).filter_map(move |caps| {
            let words: Vec<&str> = (1..caps.len())
                .filter(|&g| self.spec.uses_group(g))
                .filter_map(|g| caps.get(g))
                .map(|m| m.as_str())
                .collect();
            (!words.is_empty()).then_some(words)
        })
    }
}
