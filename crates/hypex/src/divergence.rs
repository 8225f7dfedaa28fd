//! Kullback-Leibler divergences and the Chernoff information of a pair.
//!
//! Both categories are exponential families over the same reference
//! measure, `P_i(t) = exp(lam_i(t) + ref(t) - logZ_i)` summed over tokens,
//! with tokens outside the table carrying `lam = 0`. Sums run over the
//! tokens both categories supplied. The tilted family
//! `Q_beta ∝ exp(beta lam_0 + (1 - beta) lam_1 + ref)` connects them, and the
//! Chernoff point is the `beta` where `Q_beta` is equally far from both.

use crate::pair::{CategoryPair, Side};
use dbacl_core::Result;
use serde::Serialize;
use std::f64::consts::LN_2;
use tracing::{debug, warn};

/// Normalization checks larger than this are reported.
pub const SAFETY_TOLERANCE: f64 = 1e-3;

/// Step used when the configured one is unusable.
pub const DEFAULT_BETA_STEP: f64 = 0.1;

#[inline]
pub fn nats_to_bits(x: f64) -> f64 {
    x / LN_2
}

/// Divergences between the two categories themselves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EdgeDivergences {
    /// `D(P0 ‖ P1)` in nats
    pub d01: f64,
    /// `D(P1 ‖ P0)` in nats
    pub d10: f64,
    /// `ln Z_i` recomputed from the table minus the stored value; near 0
    /// when the stored normalization constants are right
    pub safety: [f64; 2],
}

/// Quantities of the tilted distribution at one `beta`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TiltedPoint {
    pub beta: f64,
    pub log_z_beta: f64,
    pub psi_beta: f64,
    /// `D(Q_beta ‖ P0)` and `D(Q_beta ‖ P1)` in nats
    pub divergence: [f64; 2],
}

impl TiltedPoint {
    /// Log-likelihood ratio threshold matching this `beta`.
    pub fn threshold(&self) -> f64 {
        self.divergence[1] - self.divergence[0]
    }
}

/// Settings of the `beta` sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepConfig {
    pub step: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            step: DEFAULT_BETA_STEP,
        }
    }
}

impl SweepConfig {
    /// A step outside `(0, 1)` falls back to the default with a warning.
    pub fn new(step: f64) -> Self {
        if step > 0.0 && step < 1.0 {
            Self { step }
        } else {
            warn!(step, "beta step must lie strictly between 0 and 1, using {}", DEFAULT_BETA_STEP);
            Self::default()
        }
    }
}

/// Result of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChernoffSweep {
    /// One point per step, followed by `beta = 1`
    pub points: Vec<TiltedPoint>,
    /// Estimated crossing, 0 when the divergences never crossed
    pub chernoff_beta: f64,
    /// Chernoff information in nats
    pub chernoff_rate: f64,
}

impl CategoryPair {
    /// `D(P0 ‖ P1)` and `D(P1 ‖ P0)`.
    pub fn edge_divergences(&self) -> Result<EdgeDivergences> {
        self.require_complete()?;
        let logz = [self.logz(Side::P0), self.logz(Side::P1)];

        let mut sum01 = 0.0;
        let mut sum10 = 0.0;
        let mut check = [1.0f64; 2];
        for item in self.complete_items() {
            let [l0, l1] = item.lam;
            sum01 += (l0 - l1) * (l0 + item.reference - logz[0]).exp();
            sum10 += (l1 - l0) * (l1 + item.reference - logz[1]).exp();
            check[0] += (l0.exp() - 1.0) * item.reference.exp();
            check[1] += (l1.exp() - 1.0) * item.reference.exp();
        }

        let safety = [check[0].ln() - logz[0], check[1].ln() - logz[1]];
        for (i, s) in safety.iter().enumerate() {
            if s.is_nan() || s.abs() > SAFETY_TOLERANCE {
                warn!(
                    category = i,
                    safety = s,
                    "normalizing constant does not match the weights"
                );
            }
        }

        let edges = EdgeDivergences {
            d01: logz[1] - logz[0] + sum01,
            d10: logz[0] - logz[1] + sum10,
            safety,
        };
        debug!(d01 = edges.d01, d10 = edges.d10, "edge divergences");
        Ok(edges)
    }

    /// Divergences from the tilted distribution `Q_beta` to both categories.
    ///
    /// Each divergence is computed directly and through `Psi_beta`, the mean
    /// log-likelihood ratio under `Q_beta`; the two estimates are averaged.
    pub fn calculate_divergences(&self, beta: f64) -> Result<TiltedPoint> {
        self.require_complete()?;
        let logz = [self.logz(Side::P0), self.logz(Side::P1)];

        let mut z_beta = 1.0;
        let mut sum0 = 0.0;
        let mut sum1 = 0.0;
        let mut sum2 = 0.0;
        for item in self.complete_items() {
            let [l0, l1] = item.lam;
            let log_q = beta * l0 + (1.0 - beta) * l1;
            let weight = (log_q + item.reference).exp();
            z_beta += (log_q.exp() - 1.0) * item.reference.exp();
            sum0 += (log_q - l0) * weight;
            sum1 += (log_q - l1) * weight;
            sum2 += (l1 - l0) * weight;
        }

        let log_z_beta = z_beta.ln();
        let direct = [
            sum0 / z_beta + logz[0] - log_z_beta,
            sum1 / z_beta + logz[1] - log_z_beta,
        ];
        let psi_beta = sum2 / z_beta + logz[0] - logz[1];
        let divergence = [
            (direct[0] + logz[0] - log_z_beta + (1.0 - beta) * psi_beta) / 2.0,
            (direct[1] + logz[1] - log_z_beta - beta * psi_beta) / 2.0,
        ];

        Ok(TiltedPoint {
            beta,
            log_z_beta,
            psi_beta,
            divergence,
        })
    }

    /// Sweep `beta` over `[0, 1)` and locate the Chernoff point.
    ///
    /// The crossing is the first `beta` where `D(Q ‖ P0) <= D(Q ‖ P1)`; it is
    /// placed half a step back, and the rate averages the divergences on both
    /// sides of it.
    pub fn chernoff_sweep(&self, config: SweepConfig) -> Result<ChernoffSweep> {
        let step = config.step;
        let mut points = Vec::new();
        let mut chernoff_beta = 0.0;
        let mut chernoff_rate = 0.0;
        let mut previous = [0.0f64; 2];

        let mut k = 0u32;
        loop {
            let beta = k as f64 * step;
            if beta >= 1.0 {
                break;
            }
            let point = self.calculate_divergences(beta)?;
            if chernoff_beta <= 0.0 {
                let before = previous[0] + previous[1];
                chernoff_rate = before;
                if point.divergence[0] <= point.divergence[1] {
                    chernoff_beta = beta - step / 2.0;
                    chernoff_rate = (before + point.divergence[0] + point.divergence[1]) / 4.0;
                }
            }
            previous = point.divergence;
            points.push(point);
            k += 1;
        }
        points.push(self.calculate_divergences(1.0)?);

        debug!(chernoff_beta, chernoff_rate, points = points.len(), "chernoff sweep");
        Ok(ChernoffSweep {
            points,
            chernoff_beta,
            chernoff_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbacl_category::{write_dump, CategoryHeader, DumpRecord};
    use dbacl_core::HashConfig;
    use std::io::Cursor;

    #[test]
    fn test_nats_to_bits() {
        assert!((nats_to_bits(LN_2) - 1.0).abs() < 1e-15);
        assert_eq!(nats_to_bits(0.0), 0.0);
    }

    #[test]
    fn test_sweep_step_validation() {
        assert_eq!(SweepConfig::new(0.25).step, 0.25);
        assert_eq!(SweepConfig::new(0.0).step, DEFAULT_BETA_STEP);
        assert_eq!(SweepConfig::new(1.5).step, DEFAULT_BETA_STEP);
        assert_eq!(SweepConfig::new(f64::NAN).step, DEFAULT_BETA_STEP);
    }

    #[test]
    fn test_incomplete_pair_is_refused() {
        let pair = CategoryPair::new(HashConfig::fixed(4)).unwrap();
        assert!(pair.edge_divergences().is_err());
        assert!(pair.calculate_divergences(0.5).is_err());
    }

    fn pair_of(p0: &[(u64, f64, f64)], p1: &[(u64, f64, f64)]) -> CategoryPair {
        let mut pair = CategoryPair::new(HashConfig::growable(4, 10)).unwrap();
        for (side, records) in [(Side::P0, p0), (Side::P1, p1)] {
            let header = CategoryHeader {
                max_order: 1,
                ..CategoryHeader::default()
            };
            let records: Vec<DumpRecord> = records
                .iter()
                .map(|&(id, lam, reference)| DumpRecord {
                    lam,
                    reference,
                    count: 1,
                    id,
                    token: None,
                })
                .collect();
            let mut buf = Vec::new();
            write_dump(&mut buf, &header, &records).unwrap();
            pair.load_dump(side, "test", Cursor::new(buf)).unwrap();
        }
        pair
    }

    #[test]
    fn test_one_sided_tokens_leave_divergences_unchanged() {
        let shared0 = [(1, 0.5, -1.0), (2, -0.25, -2.0)];
        let shared1 = [(1, 0.5, -1.0), (2, 0.75, -2.0)];
        let before = pair_of(&shared0, &shared1);

        let mut only0 = shared0.to_vec();
        only0.push((3, 3.0, -0.5));
        let mut only1 = shared1.to_vec();
        only1.push((4, -2.0, -0.5));
        let after = pair_of(&only0, &only1);
        assert_eq!(after.len(), 4);

        let (b, a) = (before.edge_divergences().unwrap(), after.edge_divergences().unwrap());
        assert_eq!(b.d01, a.d01);
        assert_eq!(b.d10, a.d10);
        assert_eq!(
            before.calculate_divergences(0.5).unwrap(),
            after.calculate_divergences(0.5).unwrap()
        );
    }

    #[test]
    fn test_point_threshold() {
        let point = TiltedPoint {
            beta: 0.5,
            log_z_beta: 0.0,
            psi_beta: 0.0,
            divergence: [0.25, 1.0],
        };
        assert_eq!(point.threshold(), 0.75);
    }
}
