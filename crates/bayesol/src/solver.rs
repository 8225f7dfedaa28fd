//! Bayes risk minimization over a loss matrix.

use crate::spec::LossMatrix;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, warn};

/// Outcome of one decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    /// Index of the category with the smallest risk
    pub best: usize,
    /// Log-scale risk of deciding each category
    pub risks: Vec<f64>,
    /// Largest log term of the winner's risk sum
    pub best_term: f64,
}

/// Picks the category minimizing the posterior expected loss.
///
/// The terms of a candidate's risk are
/// `prior[t] - complexity[t] * cross_entropy[t] + loss[t][candidate]` over every
/// true category `t`. Candidates are compared on their terms sorted in
/// descending order, which stays exact where the summed risks would
/// underflow to the same value.
#[derive(Debug, Clone)]
pub struct RiskSolver {
    matrix: LossMatrix,
}

impl RiskSolver {
    pub fn new(matrix: LossMatrix) -> Self {
        if matrix.len() == 1 {
            warn!("only one category, the decision is trivial");
        }
        Self { matrix }
    }

    pub fn matrix(&self) -> &LossMatrix {
        &self.matrix
    }

    /// Log posterior weight of each true category, before any loss.
    fn evidence(&self) -> Vec<f64> {
        self.matrix
            .prior
            .iter()
            .zip(&self.matrix.observed)
            .map(|(prior, o)| prior - o.complexity * o.cross_entropy)
            .collect()
    }

    fn terms(&self, evidence: &[f64], decided: usize) -> Vec<f64> {
        evidence
            .iter()
            .zip(&self.matrix.rows)
            .map(|(&e, row)| if e.is_finite() { e + row[decided] } else { e })
            .collect()
    }

    /// Log-scale risk of deciding each category.
    pub fn risks(&self) -> Vec<f64> {
        let evidence = self.evidence();
        (0..self.matrix.len())
            .map(|i| log_sum_exp(&self.terms(&evidence, i)))
            .collect()
    }

    /// Choose the best category.
    ///
    /// Returns `None` only when there are no categories.
    pub fn decide(&self) -> Option<Decision> {
        let evidence = self.evidence();
        let mut risks = Vec::with_capacity(self.matrix.len());
        let mut best: Option<(usize, Vec<f64>)> = None;

        for i in 0..self.matrix.len() {
            let mut terms = self.terms(&evidence, i);
            risks.push(log_sum_exp(&terms));

            terms.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
            let better = match &best {
                None => true,
                Some((_, current)) => lexicographic(&terms, current) == Ordering::Less,
            };
            if better {
                best = Some((i, terms));
            }
        }

        best.map(|(best, terms)| {
            debug!(best, risk = risks[best], "bayes decision");
            Decision {
                best,
                best_term: terms.first().copied().unwrap_or(f64::NEG_INFINITY),
                risks,
            }
        })
    }

    /// Rank every category by repeatedly deciding and removing the winner.
    ///
    /// Zero losses on the diagonal are raised to one first, so that a truth
    /// which is decided correctly still carries its evidence.
    pub fn rank(&self) -> Vec<Decision> {
        let n = self.matrix.len();
        let mut solver = self.clone();
        for (i, row) in solver.matrix.rows.iter_mut().enumerate() {
            if row[i].is_infinite() {
                row[i] = 0.0;
            }
        }

        let mut ranked: Vec<Decision> = Vec::with_capacity(n);
        while ranked.len() < n {
            let Some(decision) = solver.decide() else {
                break;
            };
            if ranked.iter().any(|d| d.best == decision.best) {
                break;
            }
            solver.eliminate(decision.best);
            ranked.push(decision);
        }
        ranked
    }

    /// Make `w` the worst possible decision and irrelevant as a truth.
    fn eliminate(&mut self, w: usize) {
        for row in self.matrix.rows.iter_mut() {
            row[w] = f64::NEG_INFINITY;
        }
        self.matrix.rows[w].iter_mut().for_each(|l| *l = f64::NEG_INFINITY);
        self.matrix.rows[w][w] = f64::INFINITY;
    }
}

/// `ln Σ exp(x)`, normalized by the largest finite term.
pub fn log_sum_exp(terms: &[f64]) -> f64 {
    let norm = terms
        .iter()
        .copied()
        .filter(|t| t.is_finite())
        .fold(None, |m: Option<f64>, t| Some(m.map_or(t, |m| m.max(t))))
        .unwrap_or(0.0);
    terms.iter().map(|t| (t - norm).exp()).sum::<f64>().ln() + norm
}

fn lexicographic(a: &[f64], b: &[f64]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match x.partial_cmp(y) {
            Some(Ordering::Equal) | None => continue,
            Some(o) => return o,
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Observed;

    fn matrix(rows: Vec<Vec<f64>>, prior: Vec<f64>, ce: &[f64]) -> LossMatrix {
        LossMatrix {
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(f64::ln).collect())
                .collect(),
            prior: prior.into_iter().map(f64::ln).collect(),
            observed: ce
                .iter()
                .map(|&cross_entropy| Observed {
                    cross_entropy,
                    complexity: 10.0,
                })
                .collect(),
        }
    }

    fn uniform_loss(n: usize, miss: f64) -> Vec<Vec<f64>> {
        (0..n)
            .map(|t| (0..n).map(|d| if t == d { 0.0 } else { miss }).collect())
            .collect()
    }

    #[test]
    fn test_zero_one_loss_picks_lowest_cross_entropy() {
        let solver = RiskSolver::new(matrix(uniform_loss(3, 1.0), vec![1.0; 3], &[5.0, 3.0, 4.0]));
        let decision = solver.decide().unwrap();
        assert_eq!(decision.best, 1);
        assert_eq!(decision.risks, solver.risks());
        assert!(decision.risks[1] < decision.risks[0]);
        assert!(decision.risks[1] < decision.risks[2]);
    }

    #[test]
    fn test_loss_can_override_evidence() {
        // deciding 0 when the truth is 1 is very expensive
        let rows = vec![vec![0.0, 1.0], vec![1e9, 0.0]];
        let solver = RiskSolver::new(matrix(rows, vec![1.0, 1.0], &[1.0, 1.1]));
        assert_eq!(solver.decide().unwrap().best, 1);
    }

    #[test]
    fn test_underflowing_risks_still_ordered() {
        let solver = RiskSolver::new(matrix(uniform_loss(2, 1.0), vec![1.0, 1.0], &[900.0, 1000.0]));
        let decision = solver.decide().unwrap();
        assert_eq!(decision.best, 0);
        assert!(decision.best_term.is_finite());
    }

    #[test]
    fn test_rank_orders_all_categories() {
        let solver = RiskSolver::new(matrix(uniform_loss(4, 10.0), vec![1.0; 4], &[4.0, 2.0, 3.0, 1.0]));
        let order: Vec<usize> = solver.rank().iter().map(|d| d.best).collect();
        assert_eq!(order, vec![3, 1, 2, 0]);
        // the solver's own matrix is untouched
        assert!(solver.matrix().rows[0][0].is_infinite());
    }

    #[test]
    fn test_prior_breaks_evidence_tie() {
        let solver = RiskSolver::new(matrix(uniform_loss(2, 1.0), vec![1.0, 3.0], &[2.0, 2.0]));
        assert_eq!(solver.decide().unwrap().best, 1);

        let solver = RiskSolver::new(matrix(uniform_loss(2, 1.0), vec![3.0, 1.0], &[2.0, 2.0]));
        assert_eq!(solver.decide().unwrap().best, 0);
    }

    #[test]
    fn test_log_sum_exp() {
        assert!((log_sum_exp(&[0.0, 0.0]) - 2f64.ln()).abs() < 1e-12);
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY]), f64::NEG_INFINITY);
        assert!((log_sum_exp(&[-1000.0, -1000.0]) - (-1000.0 + 2f64.ln())).abs() < 1e-9);
    }

    #[test]
    fn test_empty_matrix() {
        let solver = RiskSolver::new(LossMatrix {
            rows: vec![],
            prior: vec![],
            observed: vec![],
        });
        assert!(solver.decide().is_none());
        assert!(solver.rank().is_empty());
    }
}
