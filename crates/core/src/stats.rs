//! Statistics helpers used when reporting scores.
//!
//! These only need a few digits of accuracy: results are shown to users as
//! per-thousand confidences or used to rank categories.

use std::f64::consts::PI;

const IGAM_EPSILON: f64 = 1e-14;
const IGAM_MAX_ITER: usize = 500;
const IGAM_TINY: f64 = 1e-300;

pub fn sample_mean(x: f64, n: f64) -> f64 {
    x / n
}

/// Unbiased variance from a sum of squares `s2` and a sum `x` over `n` items.
pub fn sample_variance(s2: f64, x: f64, n: f64) -> f64 {
    (n * s2 - x * x) / (n * (n - 1.0))
}

/// Logarithm of the Poisson probability of `k` given rate `lambda`, with
/// `ln k!` replaced by Stirling's formula.
pub fn log_poisson(k: f64, lambda: f64) -> f64 {
    if k <= 0.0 {
        return -lambda;
    }
    k * (lambda.ln() - k.ln() + 1.0) - (2.0 * PI * k).ln() / 2.0 - lambda
}

/// Natural logarithm of the Gamma function (Lanczos, g = 7, n = 9).
pub fn ln_gamma(value: f64) -> f64 {
    if value <= 0.0 {
        return 0.0;
    }
    #[allow(clippy::excessive_precision)]
    const COEFFICIENTS: [f64; 9] = [
        0.999_999_999_999_809_93,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_9,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_571_6e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if value < 0.5 {
        return PI.ln() - (PI * value).sin().ln() - ln_gamma(1.0 - value);
    }

    let x = value - 1.0;
    let series = COEFFICIENTS
        .iter()
        .enumerate()
        .skip(1)
        .fold(COEFFICIENTS[0], |acc, (i, &c)| acc + c / (x + i as f64));
    let t = x + 7.5;
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

/// Regularized upper incomplete gamma function `Q(a, x)`.
pub fn igamc(a: f64, x: f64) -> f64 {
    if x <= 0.0 || a <= 0.0 {
        return 1.0;
    }
    if x < a + 1.0 {
        1.0 - igam_series(a, x)
    } else {
        igamc_fraction(a, x)
    }
}

fn igam_series(a: f64, x: f64) -> f64 {
    let mut ap = a;
    let mut term = 1.0 / a;
    let mut sum = term;
    for _ in 0..IGAM_MAX_ITER {
        ap += 1.0;
        term *= x / ap;
        sum += term;
        if term.abs() < sum.abs() * IGAM_EPSILON {
            break;
        }
    }
    sum * (-x + a * x.ln() - ln_gamma(a)).exp()
}

fn igamc_fraction(a: f64, x: f64) -> f64 {
    // modified Lentz
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / IGAM_TINY;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..=IGAM_MAX_ITER {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < IGAM_TINY {
            d = IGAM_TINY;
        }
        c = b + an / c;
        if c.abs() < IGAM_TINY {
            c = IGAM_TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < IGAM_EPSILON {
            break;
        }
    }
    (-x + a * x.ln() - ln_gamma(a)).exp() * h
}

/// Upper tail of a Gamma(shape `a`, scale `b`) distribution at `x`.
pub fn gamma_tail(a: f64, b: f64, x: f64) -> f64 {
    igamc(a, x / b)
}

/// Complementary error function, fractional error below 1.2e-7.
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let ans = t * poly.exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

/// Standard normal cumulative distribution function.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// 10-point Gauss-Hermite abscissas and weights (already multiplied by e^{x^2}).
const GAUSS_HERMITE: [(f64, f64); 10] = [
    (-3.436_159_118_8, 1.025_451_691_3),
    (-2.532_731_674_2, 0.820_666_126_4),
    (-1.756_683_649_2, 0.741_441_931_9),
    (-1.036_610_829_7, 0.703_296_323_1),
    (-0.342_901_327_2, 0.687_081_853_9),
    (0.342_901_327_2, 0.687_081_853_9),
    (1.036_610_829_7, 0.703_296_323_1),
    (1.756_683_649_2, 0.741_441_931_9),
    (2.532_731_674_2, 0.820_666_126_4),
    (3.436_159_118_8, 1.025_451_691_3),
];

/// Probability that the `k`-th of independent Gaussians `N(mu[j], sigma[j]^2)`
/// is the smallest.
///
/// `None` when `k` is out of range, the slices differ in length or a
/// deviation is not a positive finite number. The product over competitors
/// is cut short once it drops below 1%.
pub fn min_prob(k: usize, mu: &[f64], sigma: &[f64]) -> Option<f64> {
    if k >= mu.len() || mu.len() != sigma.len() {
        return None;
    }
    if sigma.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
        return None;
    }
    let srt = sigma[k] * std::f64::consts::SQRT_2;

    let p: f64 = GAUSS_HERMITE
        .iter()
        .map(|&(x, w)| {
            let mut g = (-x * x).exp();
            for j in 0..mu.len() {
                if g <= 0.01 {
                    break;
                }
                if j == k {
                    continue;
                }
                g *= 1.0 - normal_cdf((mu[k] + x * srt - mu[j]) / sigma[j]);
            }
            w * g
        })
        .sum();

    Some(p / PI.sqrt())
}

/// Two-sided p-value of `obs` under Gamma(`alpha`, `beta`), per thousand.
///
/// Returns 0 for observations or parameters where the tail is meaningless or
/// would underflow (non-positive values, `obs > 120`).
pub fn gamma_pvalue(alpha: f64, beta: f64, obs: f64) -> u32 {
    if obs <= 0.0 || alpha <= 0.0 || beta <= 0.0 || obs > 120.0 {
        return 0;
    }
    let m = gamma_tail(alpha, beta, obs);
    (2000.0 * m.min(1.0 - m)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_sample_moments() {
        // values 1, 2, 3
        assert!(close(sample_mean(6.0, 3.0), 2.0, 1e-12));
        assert!(close(sample_variance(14.0, 6.0, 3.0), 1.0, 1e-12));
    }

    #[test]
    fn test_ln_gamma_known_values() {
        assert!(close(ln_gamma(1.0), 0.0, 1e-9));
        assert!(close(ln_gamma(5.0), 24.0f64.ln(), 1e-9));
        assert!(close(ln_gamma(0.5), PI.sqrt().ln(), 1e-9));
    }

    #[test]
    fn test_igamc_exponential_case() {
        // a = 1 is the exponential distribution: Q(1, x) = e^{-x}
        for x in [0.1, 1.0, 2.5, 10.0] {
            assert!(close(igamc(1.0, x), (-x).exp(), 1e-10), "x = {x}");
        }
        assert_eq!(igamc(2.0, 0.0), 1.0);
    }

    #[test]
    fn test_normal_cdf() {
        assert!(close(normal_cdf(0.0), 0.5, 1e-7));
        assert!(close(normal_cdf(1.96), 0.975, 1e-4));
        assert!(close(normal_cdf(-1.96), 0.025, 1e-4));
    }

    #[test]
    fn test_log_poisson_matches_direct_formula() {
        let (k, lambda) = (20.0f64, 18.0f64);
        let direct = k * lambda.ln() - lambda - ln_gamma(k + 1.0);
        assert!(close(log_poisson(k, lambda), direct, 0.01));
    }

    #[test]
    fn test_min_prob_symmetric() {
        let mu = [0.0, 0.0];
        let sigma = [1.0, 1.0];
        assert!(close(min_prob(0, &mu, &sigma).unwrap(), 0.5, 0.01));

        let mu = [0.0, 5.0];
        assert!(min_prob(0, &mu, &sigma).unwrap() > 0.99);
    }

    #[test]
    fn test_min_prob_rejects_bad_input() {
        assert_eq!(min_prob(2, &[0.0, 1.0], &[1.0, 1.0]), None);
        assert_eq!(min_prob(0, &[0.0, 1.0], &[1.0]), None);
        assert_eq!(min_prob(0, &[0.0, 1.0], &[1.0, 0.0]), None);
        assert_eq!(min_prob(0, &[0.0, 1.0], &[f64::NAN, 1.0]), None);
    }

    #[test]
    fn test_gamma_pvalue_sentinels() {
        assert_eq!(gamma_pvalue(2.0, 1.0, 0.0), 0);
        assert_eq!(gamma_pvalue(0.0, 1.0, 1.0), 0);
        assert_eq!(gamma_pvalue(2.0, -1.0, 1.0), 0);
        assert_eq!(gamma_pvalue(2.0, 1.0, 121.0), 0);
    }

    #[test]
    fn test_gamma_pvalue_median_is_high() {
        // median of Gamma(1, 1) is ln 2
        let p = gamma_pvalue(1.0, 1.0, std::f64::consts::LN_2);
        assert!(p >= 995, "p = {p}");
        assert!(gamma_pvalue(1.0, 1.0, 10.0) < 5);
    }
}
