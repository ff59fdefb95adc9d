use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How reference spectra are resampled onto the measurement axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpMethod {
    Nearest,
    #[default]
    Linear,
    /// Natural cubic spline.
    Cubic,
}

impl fmt::Display for InterpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpMethod::Nearest => write!(f, "nearest"),
            InterpMethod::Linear => write!(f, "linear"),
            InterpMethod::Cubic => write!(f, "cubic"),
        }
    }
}

impl FromStr for InterpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(InterpMethod::Nearest),
            "linear" => Ok(InterpMethod::Linear),
            "cubic" => Ok(InterpMethod::Cubic),
            other => Err(format!(
                "unknown interpolation method '{other}' (expected nearest, linear or cubic)"
            )),
        }
    }
}

/// Resample `(xs, ys)` onto `targets`.
///
/// `xs` must be ascending. Targets outside the tabulated range take the
/// nearest edge value.
pub fn resample(xs: &[f64], ys: &[f64], targets: &[f64], method: InterpMethod) -> Vec<f64> {
    if xs.is_empty() {
        return vec![f64::NAN; targets.len()];
    }
    if xs.len() == 1 {
        return vec![ys[0]; targets.len()];
    }

    match method {
        InterpMethod::Nearest => targets.iter().map(|&t| nearest(xs, ys, t)).collect(),
        InterpMethod::Linear => targets.iter().map(|&t| linear(xs, ys, t)).collect(),
        InterpMethod::Cubic if xs.len() < 3 => targets.iter().map(|&t| linear(xs, ys, t)).collect(),
        InterpMethod::Cubic => {
            let m = spline_second_derivatives(xs, ys);
            targets.iter().map(|&t| cubic(xs, ys, &m, t)).collect()
        }
    }
}

/// Index `i` such that `xs[i] <= t < xs[i + 1]`, clamped to a valid segment.
fn segment(xs: &[f64], t: f64) -> usize {
    xs.partition_point(|&x| x <= t).clamp(1, xs.len() - 1) - 1
}

fn nearest(xs: &[f64], ys: &[f64], t: f64) -> f64 {
    let i = segment(xs, t);
    if (t - xs[i]).abs() <= (xs[i + 1] - t).abs() {
        ys[i]
    } else {
        ys[i + 1]
    }
}

fn linear(xs: &[f64], ys: &[f64], t: f64) -> f64 {
    let last = xs.len() - 1;
    if t <= xs[0] {
        return ys[0];
    }
    if t >= xs[last] {
        return ys[last];
    }
    let i = segment(xs, t);
    let (x0, x1) = (xs[i], xs[i + 1]);
    if (x1 - x0).abs() < 1e-12 {
        return ys[i + 1];
    }
    let frac = (t - x0) / (x1 - x0);
    ys[i] + (ys[i + 1] - ys[i]) * frac
}

fn cubic(xs: &[f64], ys: &[f64], m: &[f64], t: f64) -> f64 {
    let last = xs.len() - 1;
    if t <= xs[0] {
        return ys[0];
    }
    if t >= xs[last] {
        return ys[last];
    }
    let i = segment(xs, t);
    let h = xs[i + 1] - xs[i];
    if h.abs() < 1e-12 {
        return ys[i + 1];
    }
    let a = (xs[i + 1] - t) / h;
    let b = (t - xs[i]) / h;
    a * ys[i] + b * ys[i + 1] + ((a.powi(3) - a) * m[i] + (b.powi(3) - b) * m[i + 1]) * h * h / 6.0
}

/// Second derivatives of the natural cubic spline (zero at both ends),
/// via the Thomas algorithm on the tridiagonal system.
fn spline_second_derivatives(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let mut m = vec![0.0; n];
    let mut c_prime = vec![0.0; n];
    let mut d_prime = vec![0.0; n];

    for i in 1..n - 1 {
        let h0 = xs[i] - xs[i - 1];
        let h1 = xs[i + 1] - xs[i];
        // Repeated knots: leave the curvature there at zero.
        if h0 <= 0.0 || h1 <= 0.0 {
            continue;
        }
        let lower = h0 / 6.0;
        let diag = (h0 + h1) / 3.0;
        let upper = h1 / 6.0;
        let rhs = (ys[i + 1] - ys[i]) / h1 - (ys[i] - ys[i - 1]) / h0;

        let denom = diag - lower * c_prime[i - 1];
        c_prime[i] = upper / denom;
        d_prime[i] = (rhs - lower * d_prime[i - 1]) / denom;
    }

    for i in (1..n - 1).rev() {
        m[i] = d_prime[i] - c_prime[i] * m[i + 1];
    }
    m
}
