//! Pearson correlation and single-regressor least squares.
//!
//! P-values use the Student t distribution, evaluated through the
//! regularised incomplete beta function.

use std::fmt::Write;

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sums of squares and cross products about the means.
fn moments(x: &[f64], y: &[f64]) -> (f64, f64, f64) {
    let (mx, my) = (mean(x), mean(y));
    x.iter().zip(y).fold((0.0, 0.0, 0.0), |(sxx, syy, sxy), (&xi, &yi)| {
        let (dx, dy) = (xi - mx, yi - my);
        (sxx + dx * dx, syy + dy * dy, sxy + dx * dy)
    })
}

/// Pearson correlation coefficient.
///
/// `None` with fewer than two pairs, mismatched lengths, or a constant input.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let (sxx, syy, sxy) = moments(x, y);
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// Two-sided p-value for `H0: rho = 0` given a sample correlation `r`
/// over `n` pairs. Two points always fit a line, so `n <= 2` gives 1.
pub fn pearson_p_value(r: f64, n: usize) -> f64 {
    if n <= 2 {
        return 1.0;
    }
    if r.abs() >= 1.0 {
        return 0.0;
    }
    let df = (n - 2) as f64;
    let t = r * (df / (1.0 - r * r)).sqrt();
    student_t_two_sided(t, df)
}

/// `P(|T| > |t|)` for Student's t with `df` degrees of freedom.
pub fn student_t_two_sided(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    regularized_incomplete_beta(df / 2.0, 0.5, df / (df + t * t)).clamp(0.0, 1.0)
}

const LANCZOS_G: f64 = 7.0;
const LANCZOS: [f64; 9] = [
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

fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // reflection
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let a = LANCZOS[1..]
        .iter()
        .enumerate()
        .fold(LANCZOS[0], |acc, (i, c)| acc + c / (x + i as f64 + 1.0));
    let t = x + LANCZOS_G + 0.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Lentz evaluation of the incomplete beta continued fraction.
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 300;
    const EPS: f64 = 3e-14;
    const TINY: f64 = 1e-300;

    let floor = |v: f64| if v.abs() < TINY { TINY } else { v };

    let (qab, qap, qam) = (a + b, a + 1.0, a - 1.0);
    let mut c = 1.0;
    let mut d = 1.0 / floor(1.0 - qab * x / qap);
    let mut h = d;
    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / floor(1.0 + aa * d);
        c = floor(1.0 + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / floor(1.0 + aa * d);
        c = floor(1.0 + aa / c);
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// One estimated coefficient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficient {
    pub estimate: f64,
    /// Standard error; `None` when there are no residual degrees of freedom.
    pub std_err: Option<f64>,
}

impl Coefficient {
    pub fn t_value(&self) -> Option<f64> {
        self.std_err
            .filter(|se| *se > 0.0)
            .map(|se| self.estimate / se)
    }
}

/// Ordinary least squares fit of `y = intercept + slope * x`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearFit {
    pub intercept: Coefficient,
    pub slope: Coefficient,
    pub r_squared: f64,
    pub n: usize,
}

impl LinearFit {
    /// Fit a line; `None` with fewer than two points or a constant `x`.
    pub fn fit(x: &[f64], y: &[f64]) -> Option<Self> {
        if x.len() != y.len() || x.len() < 2 {
            return None;
        }
        let n = x.len();
        let (sxx, syy, sxy) = moments(x, y);
        if sxx == 0.0 {
            return None;
        }
        let slope = sxy / sxx;
        let mx = mean(x);
        let intercept = mean(y) - slope * mx;

        let ssr: f64 = x
            .iter()
            .zip(y)
            .map(|(xi, yi)| {
                let e = yi - (intercept + slope * xi);
                e * e
            })
            .sum();
        let r_squared = if syy == 0.0 { 1.0 } else { 1.0 - ssr / syy };

        let (se_slope, se_intercept) = if n > 2 {
            let s2 = ssr / (n - 2) as f64;
            (
                Some((s2 / sxx).sqrt()),
                Some((s2 * (1.0 / n as f64 + mx * mx / sxx)).sqrt()),
            )
        } else {
            (None, None)
        };

        Some(Self {
            intercept: Coefficient {
                estimate: intercept,
                std_err: se_intercept,
            },
            slope: Coefficient {
                estimate: slope,
                std_err: se_slope,
            },
            r_squared,
            n,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.intercept.estimate + self.slope.estimate * x
    }

    pub fn residual_df(&self) -> usize {
        self.n.saturating_sub(2)
    }

    pub fn adj_r_squared(&self) -> Option<f64> {
        let df = self.residual_df();
        (df > 0).then(|| 1.0 - (1.0 - self.r_squared) * (self.n - 1) as f64 / df as f64)
    }

    /// Plain-text results table.
    pub fn summary(&self, dependent: &str, regressor: &str) -> String {
        let fmt_opt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4e}"));
        let df = self.residual_df() as f64;

        let mut out = String::new();
        let _ = writeln!(out, "OLS Regression Results");
        let _ = writeln!(out, "Dep. Variable: {dependent}");
        let _ = writeln!(out, "No. Observations: {}", self.n);
        let _ = writeln!(out, "Df Residuals: {}", self.residual_df());
        let _ = writeln!(out, "R-squared: {:.4}", self.r_squared);
        let _ = writeln!(out, "Adj. R-squared: {}", self.adj_r_squared().map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}")));
        let _ = writeln!(
            out,
            "{:<12} {:>14} {:>14} {:>10} {:>10}",
            "", "coef", "std err", "t", "P>|t|"
        );
        for (name, coef) in [("const", &self.intercept), (regressor, &self.slope)] {
            let t = coef.t_value();
            let p = t.map(|t| student_t_two_sided(t, df));
            let _ = writeln!(
                out,
                "{:<12} {:>14.4e} {:>14} {:>10} {:>10}",
                name,
                coef.estimate,
                fmt_opt(coef.std_err),
                t.map_or_else(|| "n/a".to_string(), |t| format!("{t:.3}")),
                p.map_or_else(|| "n/a".to_string(), |p| format!("{p:.3}")),
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const X: [f64; 5] = [1.0, 2.0, 3.0, 4.0, 5.0];
    const Y: [f64; 5] = [2.0, 4.0, 5.0, 4.0, 5.0];

    #[test]
    fn pearson_known_sample() {
        let r = pearson(&X, &Y).unwrap();
        assert!((r - 0.774_596_669).abs() < 1e-6);
        let p = pearson_p_value(r, X.len());
        assert!((p - 0.124_027).abs() < 1e-4, "p = {p}");
    }

    #[test]
    fn pearson_degenerate_inputs() {
        assert_eq!(pearson(&[1.0], &[2.0]), None);
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), None);
        assert_eq!(pearson(&[1.0, 2.0], &[1.0]), None);
    }

    #[test]
    fn two_points_are_perfectly_correlated_but_not_significant() {
        let r = pearson(&[0.2, 0.4], &[10.0, 30.0]).unwrap();
        assert!((r - 1.0).abs() < 1e-12);
        assert_eq!(pearson_p_value(r, 2), 1.0);
    }

    #[test]
    fn t_distribution_reference_values() {
        // t = 2.776 at df = 4 is the 97.5th percentile
        assert!((student_t_two_sided(2.776_445, 4.0) - 0.05).abs() < 1e-4);
        assert!((student_t_two_sided(0.0, 10.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ln_gamma_matches_factorials() {
        assert!(ln_gamma(1.0).abs() < 1e-12);
        assert!((ln_gamma(5.0) - 24f64.ln()).abs() < 1e-10);
        assert!((ln_gamma(0.5) - std::f64::consts::PI.sqrt().ln()).abs() < 1e-10);
    }

    #[test]
    fn linear_fit_and_predict() {
        let fit = LinearFit::fit(&X, &Y).unwrap();
        assert!((fit.slope.estimate - 0.6).abs() < 1e-12);
        assert!((fit.intercept.estimate - 2.2).abs() < 1e-12);
        assert!((fit.r_squared - 0.6).abs() < 1e-12);
        assert!((fit.predict(6.0) - 5.8).abs() < 1e-12);
        assert!(fit.slope.std_err.is_some());
    }

    #[test]
    fn linear_fit_needs_two_distinct_x() {
        assert!(LinearFit::fit(&[1.0], &[1.0]).is_none());
        assert!(LinearFit::fit(&[3.0, 3.0], &[1.0, 2.0]).is_none());
        let fit = LinearFit::fit(&[1.0, 2.0], &[3.0, 5.0]).unwrap();
        assert_eq!(fit.slope.std_err, None);
        assert_eq!(fit.adj_r_squared(), None);
    }

    #[test]
    fn summary_mentions_both_terms() {
        let text = LinearFit::fit(&X, &Y).unwrap().summary("gdp", "ndvi");
        assert!(text.starts_with("OLS Regression Results"));
        assert!(text.contains("Dep. Variable: gdp"));
        assert!(text.contains("const"));
        assert!(text.contains("ndvi"));
        assert!(text.contains("No. Observations: 5"));
    }
}
