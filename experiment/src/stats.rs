//! Descriptive statistics and a one-way ANOVA over the accuracies of several runs.

use std::{f64::consts::PI, fmt};

use crate::{ExperimentError, runner::RunResult};

/// The results of ten runs of the experiment with batch normalization layers.
pub const RESULTS: [RunResult; 10] = [
    result(0.5922, 0.1013, 0.5976),
    result(0.5778, 0.1, 0.5897),
    result(0.5561, 0.1, 0.588),
    result(0.5657, 0.0879, 0.5985),
    result(0.5557, 0.1168, 0.5905),
    result(0.5838, 0.1, 0.5868),
    result(0.5765, 0.0917, 0.6013),
    result(0.5862, 0.1, 0.5939),
    result(0.5863, 0.1, 0.6009),
    result(0.5504, 0.0802, 0.5948),
];

const fn result(binary: f64, real: f64, real_retrained: f64) -> RunResult {
    RunResult {
        binary,
        real,
        real_retrained,
    }
}

/// The arithmetic mean, `NaN` for an empty sample.
pub fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// The population standard deviation (no degrees of freedom correction).
pub fn std(xs: &[f64]) -> f64 {
    let m = mean(xs);
    (xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64).sqrt()
}

/// The result of a one-way analysis of variance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anova {
    pub f: f64,
    pub pvalue: f64,
    pub df_between: usize,
    pub df_within: usize,
}

/// One-way ANOVA: tests whether every group has the same mean.
///
/// # Returns
/// The F statistic and its p-value, or an error if there are fewer than two groups, a group is
/// empty or there are no degrees of freedom within the groups. If every group is constant the
/// statistic is infinite with a null p-value, or `NaN` for both when all the means are equal
/// too.
pub fn f_oneway(groups: &[&[f64]]) -> Result<Anova, ExperimentError> {
    let k = groups.len();
    if k < 2 {
        return Err(ExperimentError::Stats(
            "ANOVA requires at least 2 groups".into(),
        ));
    }

    if let Some(i) = groups.iter().position(|g| g.is_empty()) {
        return Err(ExperimentError::Stats(format!("group {i} is empty")));
    }

    let n: usize = groups.iter().map(|g| g.len()).sum();
    let grand_mean = groups.iter().flat_map(|g| g.iter()).sum::<f64>() / n as f64;
    let means: Vec<_> = groups.iter().map(|g| mean(g)).collect();

    let ss_between: f64 = groups
        .iter()
        .zip(&means)
        .map(|(g, m)| g.len() as f64 * (m - grand_mean).powi(2))
        .sum();
    let ss_within: f64 = groups
        .iter()
        .zip(&means)
        .map(|(g, m)| g.iter().map(|x| (x - m).powi(2)).sum::<f64>())
        .sum();

    let df_between = k - 1;
    let df_within = n - k;
    if df_within == 0 {
        return Err(ExperimentError::Stats(
            "not enough observations for the within group variance".into(),
        ));
    }

    let f = (ss_between / df_between as f64) / (ss_within / df_within as f64);

    Ok(Anova {
        f,
        pvalue: f_survival(f, df_between as f64, df_within as f64),
        df_between,
        df_within,
    })
}

/// `P(F > f)` for an F distribution, through its relation to the beta distribution.
fn f_survival(f: f64, df1: f64, df2: f64) -> f64 {
    if f.is_nan() {
        return f64::NAN;
    }

    let x = df2 / (df2 + df1 * f);
    incomplete_beta(df2 / 2., df1 / 2., x).clamp(0., 1.)
}

/// The regularized incomplete beta function `I_x(a, b)`.
fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0. {
        return 0.;
    }
    if x >= 1. {
        return 1.;
    }

    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1. - x).ln();
    let front = ln_front.exp();

    // The continued fraction converges quickly on this side of the mean.
    if x < (a + 1.) / (a + b + 2.) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1. - front * beta_continued_fraction(b, a, 1. - x) / b
    }
}

/// Evaluates the continued fraction of the incomplete beta function with the modified Lentz
/// method.
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 300;
    const EPS: f64 = 1e-15;
    const TINY: f64 = 1e-300;

    let tiny = |v: f64| if v.abs() < TINY { TINY } else { v };

    let (qab, qap, qam) = (a + b, a + 1., a - 1.);
    let mut c = 1.;
    let mut d = 1. / tiny(1. - qab * x / qap);
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2. * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1. / tiny(1. + aa * d);
        c = tiny(1. + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1. / tiny(1. + aa * d);
        c = tiny(1. + aa / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.).abs() < EPS {
            break;
        }
    }

    h
}

const LANCZOS_G: f64 = 7.;
const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// `ln Γ(x)` with the Lanczos approximation, reflected below one half.
fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        return (PI / (PI * x).sin()).ln() - ln_gamma(1. - x);
    }

    let x = x - 1.;
    let t = x + LANCZOS_G + 0.5;
    let series = LANCZOS_COEFFICIENTS[1..]
        .iter()
        .enumerate()
        .fold(LANCZOS_COEFFICIENTS[0], |acc, (i, c)| acc + c / (x + i as f64 + 1.));

    0.5 * (2. * PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupStats {
    pub mean: f64,
    pub std: f64,
}

impl GroupStats {
    fn of(xs: &[f64]) -> Self {
        Self {
            mean: mean(xs),
            std: std(xs),
        }
    }
}

/// The statistics of the binary, latent and retrained latent accuracies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsReport {
    pub binary: GroupStats,
    pub latent: GroupStats,
    pub latent_retrained: GroupStats,
    pub anova: Anova,
}

/// Splits the results into their three groups and compares them.
pub fn result_stats(results: &[RunResult]) -> Result<StatsReport, ExperimentError> {
    let binary: Vec<_> = results.iter().map(|r| r.binary).collect();
    let latent: Vec<_> = results.iter().map(|r| r.real).collect();
    let latent_retrained: Vec<_> = results.iter().map(|r| r.real_retrained).collect();

    let anova = f_oneway(&[&binary, &latent, &latent_retrained])?;

    Ok(StatsReport {
        binary: GroupStats::of(&binary),
        latent: GroupStats::of(&latent),
        latent_retrained: GroupStats::of(&latent_retrained),
        anova,
    })
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups = [
            ("binary", self.binary),
            ("latent", self.latent),
            ("latent retrained", self.latent_retrained),
        ];

        for (name, stats) in groups {
            writeln!(f, "{name}")?;
            writeln!(f, "{}", stats.mean)?;
            writeln!(f, "{}", stats.std)?;
        }

        writeln!(f, "significant")?;
        writeln!(f, "f {} p {}", self.anova.f, self.anova.pvalue)
    }
}
