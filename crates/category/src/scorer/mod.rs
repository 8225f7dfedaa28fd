//! Scoring tokens against loaded categories.
//!
//! Every category keeps a running log-likelihood. Each token adds its stored
//! weight, its reference weight under the digram model and (for simple
//! models) a multinomial correction, then subtracts the normalization share
//! `delta * logZ`. The complexity grows by `delta` per token, so n-gram
//! models of any order stay comparable.

pub mod empirical;

pub use empirical::{EmpiricalItem, EmpiricalTable, Observation, MAX_FEATURE_STACK};

use crate::model::{CategoryModel, ModelType};
use crate::tokenizer::TokenSink;
use dbacl_core::stats::{gamma_pvalue, log_poisson, min_prob, sample_mean, sample_variance};
use dbacl_core::{
    is_empty_token, token_id, HashConfig, Result, TokenSource, TokenType, DEFAULT_HASH_BITS,
    TOKEN_CLASS_MAX,
};
use serde::Serialize;
use std::f64::consts::PI;
use tracing::trace;

/// Magic prefix of the score summary line.
pub const SCORES_TAG: &str = "# scores";

/// How repeated tokens correct the Shannon entropy estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShannonCorrection {
    /// Stirling approximation of `ln c!` increments
    #[default]
    Stirling,
    /// Exact increments of `c ln c`
    Exact,
}

impl ShannonCorrection {
    /// Correction contributed by one sighting.
    pub fn correction(self, obs: Observation) -> f64 {
        if !obs.counted {
            return 0.0;
        }
        let c = obs.count as f64;
        match (self, obs.first) {
            (ShannonCorrection::Stirling, true) => 1.0 - (2.0 * PI).ln() / 2.0,
            (ShannonCorrection::Stirling, false) => 1.0 + (c * (c - 1.0)).ln() / 2.0,
            (ShannonCorrection::Exact, true) => 0.0,
            (ShannonCorrection::Exact, false) => c * c.ln() - (c - 1.0) * (c - 1.0).ln(),
        }
    }
}

/// Configuration for building a scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScorerConfig {
    /// Track the empirical distribution of each document
    pub calc_entropy: bool,
    /// Shannon correction strategy
    pub shannon: ShannonCorrection,
    /// Size and growth of the empirical table
    pub empirical: HashConfig,
    /// Clear the empirical table by remembering filled slots
    pub fast_clear: bool,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            calc_entropy: false,
            shannon: ShannonCorrection::default(),
            empirical: HashConfig::fixed(DEFAULT_HASH_BITS),
            fast_clear: true,
        }
    }
}

/// Builder for creating a scorer.
#[derive(Debug, Clone, Default)]
pub struct ScorerBuilder {
    config: ScorerConfig,
}

impl ScorerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track the empirical distribution and the Shannon correction.
    pub fn calc_entropy(mut self, on: bool) -> Self {
        self.config.calc_entropy = on;
        self
    }

    pub fn shannon(mut self, strategy: ShannonCorrection) -> Self {
        self.config.shannon = strategy;
        self
    }

    /// Size of the empirical table as a power of two.
    pub fn empirical_bits(mut self, bits: u8) -> Self {
        self.config.empirical.hash_bits = bits;
        self
    }

    /// Let the empirical table grow up to `max_bits`.
    pub fn empirical_growth(mut self, max_bits: u8) -> Self {
        self.config.empirical.max_grow_bits = Some(max_bits);
        self
    }

    pub fn fast_clear(mut self, on: bool) -> Self {
        self.config.fast_clear = on;
        self
    }

    pub fn build(self) -> Result<Scorer> {
        Scorer::new(self.config)
    }
}

/// Running totals for one category.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Accumulator {
    pub score: f64,
    pub score_s2: f64,
    pub score_shannon: f64,
    pub complexity: f64,
    pub fcomplexity: u64,
    pub fmiss: u64,
    pub mediacounts: [u64; TOKEN_CLASS_MAX],
}

impl Accumulator {
    /// Average code length per complexity unit, in nats.
    pub fn cross_entropy(&self) -> f64 {
        if self.complexity > 0.0 {
            -sample_mean(self.score, self.complexity)
        } else {
            0.0
        }
    }

    /// Variance of the per-token score increments, scaled by complexity.
    pub fn variance(&self) -> f64 {
        if self.complexity > 1.0 {
            sample_variance(self.score_s2, self.score, self.complexity) / self.complexity
        } else {
            0.0
        }
    }
}

/// Scores derived from the totals of a single category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DerivedScores {
    /// Score adjusted by the Poisson probability of the document length
    pub poisson: f64,
    /// Cross entropy
    pub per_token: f64,
    /// Estimated divergence between document and category
    pub divergence: f64,
    /// Gamma p-value of the divergence, in percent (0 when unavailable)
    pub confidence: f64,
    /// Probability that this category has the lowest cross entropy, with
    /// every cross entropy taken as Gaussian with the category's variance
    pub lowest: Option<f64>,
}

/// Report for one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryScore {
    pub name: String,
    pub cross_entropy: f64,
    pub complexity: f64,
    pub score: f64,
    pub variance: f64,
    pub tokens: u64,
    pub missing: u64,
    pub derived: DerivedScores,
}

#[derive(Debug)]
struct ScoredCategory {
    model: CategoryModel,
    regex_mask: u32,
    acc: Accumulator,
}

impl ScoredCategory {
    fn applies(&self, tt: TokenType, source: TokenSource) -> bool {
        match source {
            TokenSource::Standard => {
                tt.order <= self.model.max_order() && self.model.header().options.use_stdtok
            }
            TokenSource::Regex(r) => r < 32 && self.regex_mask & (1 << r) != 0,
        }
    }
}

/// Scores tokens against a set of categories.
#[derive(Debug)]
pub struct Scorer {
    config: ScorerConfig,
    categories: Vec<ScoredCategory>,
    empirical: Option<EmpiricalTable>,
}

impl Scorer {
    pub fn new(config: ScorerConfig) -> Result<Self> {
        let empirical = if config.calc_entropy {
            Some(EmpiricalTable::new(config.empirical, config.fast_clear)?)
        } else {
            None
        };
        Ok(Self {
            config,
            categories: Vec::new(),
            empirical,
        })
    }

    pub fn builder() -> ScorerBuilder {
        ScorerBuilder::new()
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Start tracking the empirical distribution if not already on.
    pub fn enable_entropy(&mut self) -> Result<()> {
        if self.empirical.is_none() {
            self.empirical = Some(EmpiricalTable::new(self.config.empirical, self.config.fast_clear)?);
            self.config.calc_entropy = true;
        }
        Ok(())
    }

    /// Add a category. `regex_mask` selects the regex tokens it scores.
    pub fn add_category(&mut self, model: CategoryModel, regex_mask: u32) -> usize {
        self.categories.push(ScoredCategory {
            model,
            regex_mask,
            acc: Accumulator::default(),
        });
        self.categories.len() - 1
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn model(&self, index: usize) -> Option<&CategoryModel> {
        self.categories.get(index).map(|c| &c.model)
    }

    pub fn model_mut(&mut self, index: usize) -> Option<&mut CategoryModel> {
        self.categories.get_mut(index).map(|c| &mut c.model)
    }

    pub fn accumulator(&self, index: usize) -> Option<&Accumulator> {
        self.categories.get(index).map(|c| &c.acc)
    }

    pub fn empirical(&self) -> Option<&EmpiricalTable> {
        self.empirical.as_ref()
    }

    /// Entropy of the document scored so far, when tracked.
    pub fn empirical_entropy(&self) -> Option<f64> {
        self.empirical.as_ref().map(EmpiricalTable::entropy)
    }

    /// Score one token against every category it applies to.
    pub fn score_token(&mut self, token: &[u8], tt: TokenType, source: TokenSource) {
        if is_empty_token(token) {
            return;
        }
        let id = token_id(token);

        let mut observed = None;
        let mut shannon = 0.0;
        if let Some(emp) = self.empirical.as_mut() {
            match emp.observe(id) {
                Some(obs) => {
                    shannon = self.config.shannon.correction(obs);
                    observed = Some(obs);
                }
                // a full table ignores the token everywhere
                None => return,
            }
        }

        for cat in self.categories.iter_mut() {
            if !cat.applies(tt, source) {
                continue;
            }
            let model = &cat.model;
            let acc = &mut cat.acc;
            let old = acc.score;

            let item = model.lookup(id);
            let lambda = item.map_or(0.0, |k| k.lam as f64);
            let reference = if tt.order == 1 {
                model.reference_weight(token)
            } else {
                0.0
            };

            acc.fcomplexity += 1;
            acc.complexity += model.delta();

            match model.model_type() {
                ModelType::Simple => {
                    let correction = observed
                        .map_or(0.0, |obs| acc.complexity.ln() - (obs.count as f64).ln());
                    acc.score += lambda + correction + reference - model.renorm();
                }
                ModelType::Sequential => {
                    acc.score += lambda + reference - model.renorm();
                    if tt.order == model.max_order() {
                        acc.score_shannon += shannon;
                    }
                }
            }

            if item.is_none() {
                acc.fmiss += 1;
            }

            if tt.order == 1 {
                acc.score_s2 += (acc.score - old) * (acc.score - old);
                acc.mediacounts[(tt.class as usize) % TOKEN_CLASS_MAX] += 1;
            }

            trace!(
                category = model.name(),
                lambda,
                reference,
                order = tt.order,
                %source,
                "scored token"
            );
        }
    }

    /// Forget the current document.
    pub fn reset(&mut self) {
        for cat in self.categories.iter_mut() {
            cat.acc = Accumulator::default();
        }
        if let Some(emp) = self.empirical.as_mut() {
            emp.clear();
        }
    }

    /// Scores derived from the totals of category `index`.
    pub fn derived_scores(&self, index: usize) -> Option<DerivedScores> {
        let cat = self.categories.get(index)?;
        let header = cat.model.header();
        let acc = &cat.acc;

        let lambda = if header.num_docs > 0 {
            header.full_token_count as f64 / header.num_docs as f64
        } else {
            100.0
        };

        let divergence = if self.config.calc_entropy && acc.complexity > 0.0 {
            let shannon = -(acc.score_shannon / acc.complexity - acc.complexity.ln());
            -(acc.score / acc.complexity + shannon)
        } else {
            0.0
        };

        Some(DerivedScores {
            poisson: -acc.score - log_poisson(acc.complexity, lambda),
            per_token: acc.cross_entropy(),
            divergence,
            confidence: gamma_pvalue(header.alpha, header.beta, divergence) as f64 / 10.0,
            lowest: self.lowest_cross_entropy_prob(index),
        })
    }

    /// Probability that category `index` has the lowest cross entropy.
    ///
    /// `None` for a single category or when some category has no spread yet.
    pub fn lowest_cross_entropy_prob(&self, index: usize) -> Option<f64> {
        if self.categories.len() < 2 {
            return None;
        }
        let (mu, sigma): (Vec<f64>, Vec<f64>) = self
            .categories
            .iter()
            .map(|c| (c.acc.cross_entropy(), c.acc.variance().sqrt()))
            .unzip();
        min_prob(index, &mu, &sigma)
    }

    /// Report for every category, in the order they were added.
    pub fn results(&self) -> Vec<CategoryScore> {
        self.categories
            .iter()
            .enumerate()
            .map(|(i, cat)| CategoryScore {
                name: cat.model.name().to_string(),
                cross_entropy: cat.acc.cross_entropy(),
                complexity: cat.acc.complexity,
                score: cat.acc.score,
                variance: cat.acc.variance(),
                tokens: cat.acc.fcomplexity,
                missing: cat.acc.fmiss,
                derived: self.derived_scores(i).unwrap_or_default(),
            })
            .collect()
    }

    /// Index of the category with the highest score, the first on ties.
    pub fn best(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, cat) in self.categories.iter().enumerate() {
            match best {
                Some((_, s)) if s >= cat.acc.score => {}
                _ => best = Some((i, cat.acc.score)),
            }
        }
        best.map(|(i, _)| i)
    }

    /// The `# scores` line read by the risk solver.
    pub fn scores_line(&self) -> String {
        let mut line = String::from(SCORES_TAG);
        for cat in &self.categories {
            line.push_str(&format!(
                " {} {} * {}",
                cat.model.name(),
                cat.acc.cross_entropy(),
                cat.acc.complexity
            ));
        }
        line
    }
}

impl TokenSink for Scorer {
    fn emit_token(&mut self, token: &[u8], token_type: TokenType, source: TokenSource) {
        self.score_token(token, token_type, source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CategoryHeader, CategoryItem, DigramMatrix, FeatureTable};
    use dbacl_core::{build_token, TokenHash};

    fn token(word: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        build_token(&[word], 1, &mut buf);
        buf
    }

    fn model(name: &str, logz: f64, model_type: ModelType, weights: &[(&str, f32)]) -> CategoryModel {
        let mut table: TokenHash<CategoryItem> = TokenHash::new(HashConfig::fixed(6)).unwrap();
        for (word, lam) in weights {
            table.insert(CategoryItem::new(token_id(&token(word)), *lam)).unwrap();
        }
        let mut header = CategoryHeader {
            logz,
            model_type,
            hash_bits: 6,
            ..CategoryHeader::default()
        };
        header.resolve_defaults();
        CategoryModel::new(name, header, DigramMatrix::filled(0), FeatureTable::Owned(table))
    }

    #[test]
    fn test_simple_model_scores() {
        let mut scorer = Scorer::builder().build().unwrap();
        scorer.add_category(model("a", 0.5, ModelType::Simple, &[("foo", 1.5)]), 0);

        let tt = TokenType::new(1, 1);
        scorer.score_token(&token("foo"), tt, TokenSource::Standard);
        scorer.score_token(&token("bar"), tt, TokenSource::Standard);

        let acc = scorer.accumulator(0).unwrap();
        // zero digram matrix: reference weights vanish
        assert!((acc.score - (1.5 - 0.5 + 0.0 - 0.5)).abs() < 1e-6);
        assert_eq!(acc.complexity, 2.0);
        assert_eq!(acc.fcomplexity, 2);
        assert_eq!(acc.fmiss, 1);
        assert_eq!(acc.mediacounts[1], 2);
        assert!((acc.cross_entropy() + acc.score / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_token_is_skipped() {
        let mut scorer = Scorer::builder().build().unwrap();
        scorer.add_category(model("a", 0.0, ModelType::Simple, &[]), 0);
        let mut empty = Vec::new();
        build_token::<&str>(&[], 1, &mut empty);
        scorer.score_token(&empty, TokenType::new(1, 1), TokenSource::Standard);
        assert_eq!(scorer.accumulator(0).unwrap().fcomplexity, 0);
    }

    #[test]
    fn test_applicability() {
        let mut scorer = Scorer::builder().build().unwrap();
        scorer.add_category(model("std", 0.0, ModelType::Simple, &[]), 0);
        let mut re = model("re", 0.0, ModelType::Simple, &[]);
        re.header.options.use_stdtok = false;
        scorer.add_category(re, 1 << 2);

        scorer.score_token(&token("x"), TokenType::new(2, 1), TokenSource::Standard);
        scorer.score_token(&token("x"), TokenType::new(1, 1), TokenSource::Regex(2));
        scorer.score_token(&token("x"), TokenType::new(1, 1), TokenSource::Regex(1));

        // order 2 exceeds max_order 1; regex tokens are not for std
        assert_eq!(scorer.accumulator(0).unwrap().fcomplexity, 0);
        assert_eq!(scorer.accumulator(1).unwrap().fcomplexity, 1);
    }

    #[test]
    fn test_multinomial_correction() {
        let mut scorer = Scorer::builder().calc_entropy(true).build().unwrap();
        scorer.add_category(model("a", 0.0, ModelType::Simple, &[]), 0);

        let tt = TokenType::new(1, 1);
        scorer.score_token(&token("foo"), tt, TokenSource::Standard);
        scorer.score_token(&token("foo"), tt, TokenSource::Standard);

        // ln(1) - ln(1) then ln(2) - ln(2)
        assert!(scorer.accumulator(0).unwrap().score.abs() < 1e-12);

        scorer.score_token(&token("bar"), tt, TokenSource::Standard);
        // ln(3) - ln(1)
        assert!((scorer.accumulator(0).unwrap().score - 3f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_shannon_correction_on_sequential_model() {
        let mut scorer = Scorer::builder()
            .calc_entropy(true)
            .shannon(ShannonCorrection::Exact)
            .build()
            .unwrap();
        scorer.add_category(model("a", 0.0, ModelType::Sequential, &[]), 0);

        let tt = TokenType::new(1, 1);
        scorer.score_token(&token("foo"), tt, TokenSource::Standard);
        scorer.score_token(&token("foo"), tt, TokenSource::Standard);
        let acc = scorer.accumulator(0).unwrap();
        assert!((acc.score_shannon - 2.0 * 2f64.ln()).abs() < 1e-12);
        assert_eq!(acc.score, 0.0);
    }

    #[test]
    fn test_stirling_correction() {
        let first = Observation {
            count: 1,
            first: true,
            counted: true,
        };
        let again = Observation {
            count: 3,
            first: false,
            counted: true,
        };
        let s = ShannonCorrection::Stirling;
        assert!((s.correction(first) - (1.0 - (2.0 * PI).ln() / 2.0)).abs() < 1e-12);
        assert!((s.correction(again) - (1.0 + 6f64.ln() / 2.0)).abs() < 1e-12);
        assert_eq!(
            s.correction(Observation {
                counted: false,
                ..again
            }),
            0.0
        );
    }

    #[test]
    fn test_reset_and_scores_line() {
        let mut scorer = Scorer::builder().calc_entropy(true).build().unwrap();
        scorer.add_category(model("spam", 0.0, ModelType::Simple, &[("foo", 2.0)]), 0);
        scorer.add_category(model("ham", 0.0, ModelType::Simple, &[]), 0);

        scorer.score_token(&token("foo"), TokenType::new(1, 1), TokenSource::Standard);
        assert_eq!(scorer.best(), Some(0));
        assert_eq!(scorer.scores_line(), "# scores spam -2 * 1 ham -0 * 1");

        scorer.reset();
        assert_eq!(scorer.accumulator(0).unwrap(), &Accumulator::default());
        assert_eq!(scorer.empirical().unwrap().full_token_count(), 0);
        assert_eq!(scorer.scores_line(), "# scores spam 0 * 0 ham 0 * 0");
    }

    #[test]
    fn test_results_serialize() {
        let mut scorer = Scorer::builder().build().unwrap();
        scorer.add_category(model("spam", 0.0, ModelType::Simple, &[("foo", 2.0)]), 0);
        scorer.score_token(&token("foo"), TokenType::new(1, 1), TokenSource::Standard);

        let value = serde_json::to_value(scorer.results()).unwrap();
        assert_eq!(value[0]["name"], "spam");
        assert_eq!(value[0]["tokens"], 1);
        assert_eq!(value[0]["cross_entropy"], -2.0);
        assert!(value[0]["derived"]["confidence"].is_number());
    }

    #[test]
    fn test_lowest_cross_entropy_probability() {
        let mut scorer = Scorer::builder().build().unwrap();
        scorer.add_category(model("good", 0.0, ModelType::Simple, &[("foo", 2.0), ("bar", 0.5)]), 0);
        scorer.add_category(model("poor", 0.0, ModelType::Simple, &[("foo", -1.0), ("bar", -2.5)]), 0);
        assert_eq!(scorer.lowest_cross_entropy_prob(0), None);

        let tt = TokenType::new(1, 1);
        for word in ["foo", "bar", "foo", "bar"] {
            scorer.score_token(&token(word), tt, TokenSource::Standard);
        }

        let good = scorer.derived_scores(0).unwrap().lowest.unwrap();
        let poor = scorer.derived_scores(1).unwrap().lowest.unwrap();
        assert!(good > 0.9, "good = {good}");
        assert!(poor < 0.1, "poor = {poor}");
        assert_eq!(scorer.lowest_cross_entropy_prob(2), None);
    }

    #[test]
    fn test_poisson_rate_keeps_fraction() {
        let mut scorer = Scorer::builder().build().unwrap();
        let mut m = model("a", 0.0, ModelType::Simple, &[]);
        m.header.full_token_count = 10;
        m.header.num_docs = 4;
        scorer.add_category(m, 0);

        // empty document: -log_poisson(0, 2.5) = 2.5
        let derived = scorer.derived_scores(0).unwrap();
        assert!((derived.poisson - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_complexity_grows_by_delta_per_token() {
        let mut scorer = Scorer::builder().build().unwrap();
        let mut header_model = model("a", 0.0, ModelType::Sequential, &[]);
        header_model.header.max_order = 2;
        scorer.add_category(header_model, 0);

        for _ in 0..3 {
            scorer.score_token(&token("x"), TokenType::new(1, 1), TokenSource::Standard);
            scorer.score_token(&token("y"), TokenType::new(2, 1), TokenSource::Standard);
        }
        let acc = scorer.accumulator(0).unwrap();
        assert!((acc.complexity - 3.0).abs() < 1e-12);
        assert_eq!(acc.fcomplexity, 6);
    }
}
