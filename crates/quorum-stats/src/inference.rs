//! Two-sample significance tests for experiment analysis.
//!
//! Implements exactly the two tests the experiment manager needs:
//! Welch's unequal-variance t-test for continuous metrics and a pooled
//! two-proportion z-test for rates. p-values are two-sided.

use serde::{Deserialize, Serialize};

/// Summary of one sample entering a two-sample comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleSummary {
    /// Sample size.
    pub count: u64,
    /// Sample mean.
    pub mean: f64,
    /// Sample variance (n - 1 denominator).
    pub variance: f64,
}

/// Outcome of a significance test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Significance {
    /// Test statistic (t or z).
    pub statistic: f64,
    /// Two-sided p-value.
    pub p_value: f64,
    /// Confidence that the samples differ, 1 - p clamped to [0, 1].
    pub confidence: f64,
}

impl Significance {
    fn from_p(statistic: f64, p_value: f64) -> Self {
        Self {
            statistic,
            p_value,
            confidence: (1.0 - p_value).clamp(0.0, 1.0),
        }
    }

    /// A null result for degenerate inputs: no evidence either way.
    fn inconclusive() -> Self {
        Self {
            statistic: 0.0,
            p_value: 1.0,
            confidence: 0.0,
        }
    }
}

/// Welch's two-sample t-test with unequal variances.
///
/// Degenerate inputs (fewer than two observations on either side, or
/// zero variance on both sides) return confidence 0 rather than erroring
/// so callers can treat "not enough data" as a normal outcome.
#[must_use]
pub fn welch_t_test(a: &SampleSummary, b: &SampleSummary) -> Significance {
    if a.count < 2 || b.count < 2 {
        return Significance::inconclusive();
    }

    let var_a = a.variance / a.count as f64;
    let var_b = b.variance / b.count as f64;
    let pooled = var_a + var_b;
    if pooled <= f64::EPSILON {
        return Significance::inconclusive();
    }

    let t = (a.mean - b.mean) / pooled.sqrt();

    // Welch-Satterthwaite degrees of freedom.
    let df = pooled * pooled
        / (var_a * var_a / (a.count - 1) as f64 + var_b * var_b / (b.count - 1) as f64);
    if !df.is_finite() || df <= 0.0 {
        return Significance::inconclusive();
    }

    let p = student_t_two_sided_p(t, df);
    Significance::from_p(t, p)
}

/// Pooled two-proportion z-test.
///
/// # Arguments
/// * `successes_a` / `trials_a` - First group counts
/// * `successes_b` / `trials_b` - Second group counts
#[must_use]
pub fn two_proportion_z_test(
    successes_a: u64,
    trials_a: u64,
    successes_b: u64,
    trials_b: u64,
) -> Significance {
    if trials_a == 0 || trials_b == 0 {
        return Significance::inconclusive();
    }

    let p_a = successes_a as f64 / trials_a as f64;
    let p_b = successes_b as f64 / trials_b as f64;
    let pooled = (successes_a + successes_b) as f64 / (trials_a + trials_b) as f64;
    let se = (pooled * (1.0 - pooled) * (1.0 / trials_a as f64 + 1.0 / trials_b as f64)).sqrt();
    if se <= f64::EPSILON {
        return Significance::inconclusive();
    }

    let z = (p_a - p_b) / se;
    let p = 2.0 * (1.0 - normal_cdf(z.abs()));
    Significance::from_p(z, p.clamp(0.0, 1.0))
}

/// Standard normal CDF via the Abramowitz-Stegun erf approximation
/// (formula 7.1.26, max absolute error 1.5e-7).
#[must_use]
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let a1 = 0.254_829_592;
    let a2 = -0.284_496_736;
    let a3 = 1.421_413_741;
    let a4 = -1.453_152_027;
    let a5 = 1.061_405_429;
    let p = 0.327_591_1;

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

/// Two-sided p-value for a t statistic with `df` degrees of freedom,
/// via the regularized incomplete beta function:
/// p = I_{df/(df+t^2)}(df/2, 1/2).
fn student_t_two_sided_p(t: f64, df: f64) -> f64 {
    let x = df / (df + t * t);
    incomplete_beta(0.5 * df, 0.5, x).clamp(0.0, 1.0)
}

/// Regularized incomplete beta function I_x(a, b), continued-fraction
/// evaluation (Numerical Recipes `betai`/`betacf`).
fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front =
        ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();

    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const EPS: f64 = 3e-14;
    const TINY: f64 = 1e-300;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Lanczos approximation of ln(Gamma(x)).
fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.120_865_097_386_617_9e-2,
        -0.539_523_938_495_3e-5,
    ];

    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut series = 1.000_000_000_190_015;
    for coeff in COEFFS {
        y += 1.0;
        series += coeff / y;
    }
    -tmp + (2.506_628_274_631_000_5 * series / x).ln()
}
