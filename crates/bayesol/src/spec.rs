//! Validated risk specification and the observations fed into it.

use crate::parser::{parse_risk_spec, Expr, RawRiskSpec, MAX_SUBMATCH};
use ahash::AHashMap;
use compact_str::CompactString;
use dbacl_core::{DbaclError, Result};
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Prefix of a score line written by the scorer. Only the first seven bytes
/// are compared.
pub const SCORES_MAGIC: &str = "# scores ";

/// Complexity ratio below which the categories are flagged as incomparable.
pub const MEANINGLESS_THRESHOLD: f64 = 0.9;

/// A loss vector that applies when its pattern matched some input line.
#[derive(Debug, Clone)]
pub struct LossRule {
    pub pattern: String,
    regex: Option<Regex>,
    pub entries: Vec<Expr>,
    found: bool,
    submatches: [f64; MAX_SUBMATCH],
}

impl LossRule {
    /// The catch-all rule has an empty pattern and always applies.
    pub fn is_catch_all(&self) -> bool {
        self.pattern.is_empty()
    }

    pub fn found(&self) -> bool {
        self.found
    }

    pub fn submatches(&self) -> &[f64] {
        &self.submatches
    }

    /// Match a line; on success remember the numeric value of each submatch.
    fn observe(&mut self, line: &str) -> bool {
        let Some(regex) = &self.regex else {
            return false;
        };
        let Some(caps) = regex.captures(line) else {
            return false;
        };
        self.found = true;
        for (k, value) in self.submatches.iter_mut().enumerate() {
            *value = caps
                .get(k + 1)
                .map(|m| leading_number(m.as_str()))
                .unwrap_or(0.0);
        }
        debug!(pattern = %self.pattern, submatches = ?self.submatches, "loss rule matched");
        true
    }
}

/// Numeric prefix of `s`, 0 when there is none.
fn leading_number(s: &str) -> f64 {
    let s = s.trim_start();
    let mut best = 0.0;
    for (i, c) in s.char_indices() {
        if !c.is_ascii_digit() && !matches!(c, '+' | '-' | '.' | 'e' | 'E') {
            break;
        }
        if let Ok(v) = s[..i + c.len_utf8()].parse::<f64>() {
            best = v;
        }
    }
    best
}

/// Scores of one category for the current document.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Observed {
    pub cross_entropy: f64,
    pub complexity: f64,
}

/// Categories, priors, loss rules and observed scores.
///
/// Priors and losses are kept on the log scale: a loss of 0 becomes `-inf`.
#[derive(Debug, Clone)]
pub struct RiskSpec {
    names: Vec<CompactString>,
    index: AHashMap<CompactString, usize>,
    prior: Vec<f64>,
    rules: Vec<Vec<LossRule>>,
    observed: Vec<Option<Observed>>,
    found_scores: bool,
}

impl RiskSpec {
    /// Parse and validate a risk specification.
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_raw(parse_risk_spec(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| DbaclError::io(path, e))?;
        Self::parse(&text)
    }

    pub fn from_raw(raw: RawRiskSpec) -> Result<Self> {
        let n = raw.categories.len();
        if n == 0 {
            return Err(DbaclError::RiskSpec("you need at least one category".to_string()));
        }
        if raw.prior.len() != n {
            return Err(DbaclError::RiskSpec(format!(
                "prior has {} entries but there are {} categories",
                raw.prior.len(),
                n
            )));
        }

        let mut index = AHashMap::with_capacity(n);
        let mut names = Vec::with_capacity(n);
        for name in &raw.categories {
            let name = CompactString::new(name);
            if index.insert(name.clone(), names.len()).is_some() {
                return Err(DbaclError::RiskSpec(format!("category {} listed twice", name)));
            }
            names.push(name);
        }

        let prior = raw
            .prior
            .iter()
            .zip(&names)
            .map(|(e, name)| {
                let p = e.eval(&[]);
                if p.is_nan() || p < 0.0 {
                    Err(DbaclError::RiskSpec(format!("prior of {} must be non-negative", name)))
                } else {
                    Ok(p.ln())
                }
            })
            .collect::<Result<Vec<f64>>>()?;

        let mut rules: Vec<Vec<LossRule>> = vec![Vec::new(); n];
        for line in raw.loss_lines {
            let i = *index.get(line.category.as_str()).ok_or_else(|| {
                DbaclError::RiskSpec(format!("loss_matrix names unknown category {}", line.category))
            })?;
            if line.entries.len() != n {
                return Err(DbaclError::RiskSpec(format!(
                    "loss vector for ({}, \"{}\") has {} entries, expected {}",
                    line.category,
                    line.pattern,
                    line.entries.len(),
                    n
                )));
            }

            let regex = if line.pattern.is_empty() {
                None
            } else {
                match Regex::new(&line.pattern) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!("couldn't compile regex '{}', ignoring: {}", line.pattern, e);
                        continue;
                    }
                }
            };
            let found = line.pattern.is_empty();
            rules[i].push(LossRule {
                pattern: line.pattern,
                regex,
                entries: line.entries,
                found,
                submatches: [0.0; MAX_SUBMATCH],
            });
        }

        for (i, list) in rules.iter().enumerate() {
            if !list.iter().any(LossRule::is_catch_all) {
                return Err(DbaclError::RiskSpec(format!(
                    "missing loss_matrix entry for category {} (need \"\" case)",
                    names[i]
                )));
            }
        }

        Ok(Self {
            names,
            index,
            prior,
            rules,
            observed: vec![None; n],
            found_scores: false,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(CompactString::as_str)
    }

    pub fn name(&self, i: usize) -> Option<&str> {
        self.names.get(i).map(CompactString::as_str)
    }

    pub fn category_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Log-scale priors.
    pub fn prior(&self) -> &[f64] {
        &self.prior
    }

    pub fn rules(&self, i: usize) -> &[LossRule] {
        self.rules.get(i).map_or(&[], Vec::as_slice)
    }

    pub fn observed(&self, i: usize) -> Option<Observed> {
        self.observed.get(i).copied().flatten()
    }

    /// Record the scores of one category.
    pub fn set_observed(&mut self, name: &str, cross_entropy: f64, complexity: f64) -> Result<()> {
        let i = self.category_index(name).ok_or_else(|| {
            DbaclError::RiskSpec(format!("scores mention unknown category {}", name))
        })?;
        self.observed[i] = Some(Observed {
            cross_entropy,
            complexity,
        });
        self.found_scores = true;
        Ok(())
    }

    /// Feed one input line: a score line, or text matched against loss rules.
    pub fn observe_line(&mut self, line: &str) -> Result<()> {
        if line.len() >= 7 && line.as_bytes()[..7] == SCORES_MAGIC.as_bytes()[..7] {
            return self.parse_scores(line);
        }
        for rule in self.rules.iter_mut().flatten() {
            rule.observe(line);
        }
        Ok(())
    }

    /// Parse `# scores name ce * complexity ...`.
    fn parse_scores(&mut self, line: &str) -> Result<()> {
        let mut words = line.split_whitespace().skip(2);
        let mut seen = 0;
        while let Some(name) = words.next() {
            let mut value = |what: &str| -> Result<&str> {
                words.next().ok_or_else(|| {
                    DbaclError::RiskSpec(format!("scores in wrong format: missing {} for {}", what, name))
                })
            };
            let ce = value("cross entropy")?;
            value("'*'")?;
            let complexity = value("complexity")?;

            let ce = ce.parse().map_err(|_| {
                DbaclError::RiskSpec(format!("scores in wrong format: bad cross entropy '{}'", ce))
            })?;
            let complexity = complexity.parse().map_err(|_| {
                DbaclError::RiskSpec(format!("scores in wrong format: bad complexity '{}'", complexity))
            })?;
            self.set_observed(name, ce, complexity)
                .map_err(|_| DbaclError::RiskSpec("scores don't match risk specification".to_string()))?;
            seen += 1;
        }
        if seen > self.len() {
            return Err(DbaclError::RiskSpec("scores don't match risk specification".to_string()));
        }
        Ok(())
    }

    /// Check the observations and build the log-scale loss matrix.
    ///
    /// `loss[t][d]` is the log loss of deciding `d` when the truth is `t`. Row
    /// `t` comes from the first rule of category `t` that matched.
    pub fn loss_matrix(&self) -> Result<LossMatrix> {
        if !self.found_scores {
            return Err(DbaclError::RiskSpec(
                "no scores found; the input needs a '# scores' line".to_string(),
            ));
        }

        let mut observed = Vec::with_capacity(self.len());
        for (i, o) in self.observed.iter().enumerate() {
            match o {
                Some(o) => observed.push(*o),
                None => {
                    return Err(DbaclError::RiskSpec(format!(
                        "too few categories scored, {} is missing",
                        self.names[i]
                    )))
                }
            }
        }
        self.check_complexities(&observed);

        let mut rows = Vec::with_capacity(self.len());
        for (t, list) in self.rules.iter().enumerate() {
            let rule = list.iter().find(|r| r.found).ok_or_else(|| {
                DbaclError::RiskSpec(format!("no loss rule applies to {}", self.names[t]))
            })?;
            debug!(category = %self.names[t], pattern = %rule.pattern, "using loss rule");

            let row = rule
                .entries
                .iter()
                .map(|e| {
                    let loss = e.eval(&rule.submatches);
                    if loss.is_nan() || loss < 0.0 {
                        Err(DbaclError::RiskSpec(format!(
                            "couldn't evaluate loss for ({}, \"{}\")",
                            self.names[t], rule.pattern
                        )))
                    } else {
                        Ok(loss.ln())
                    }
                })
                .collect::<Result<Vec<f64>>>()?;
            rows.push(row);
        }

        Ok(LossMatrix {
            rows,
            prior: self.prior.clone(),
            observed,
        })
    }

    fn check_complexities(&self, observed: &[Observed]) {
        let (min, max) = observed.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), o| {
            (lo.min(o.complexity), hi.max(o.complexity))
        });
        if min < MEANINGLESS_THRESHOLD * max {
            warn!(
                min_complexity = min,
                max_complexity = max,
                "significant disparity between the complexities reported under each category; \
                 the categories' features are probably not comparable and the Bayes solution \
                 will be meaningless"
            );
        }
    }

    /// Forget observations and matches before the next document.
    pub fn reset(&mut self) {
        self.observed.iter_mut().for_each(|o| *o = None);
        self.found_scores = false;
        for rule in self.rules.iter_mut().flatten() {
            rule.found = rule.is_catch_all();
            rule.submatches = [0.0; MAX_SUBMATCH];
        }
    }
}

/// Everything the solver needs for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct LossMatrix {
    /// `rows[t][d]`: log loss of deciding `d` when the truth is `t`
    pub rows: Vec<Vec<f64>>,
    /// Log-scale priors
    pub prior: Vec<f64>,
    pub observed: Vec<Observed>,
}

impl LossMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
