//! Named divergence functionals and their kNN estimators
//!
//! Every estimator works from nearest-neighbor distances of two samples
//! `X ~ p` (n points) and `Y ~ q` (m points) in dimension D:
//!
//! - `rho_k(x_i)`: distance from `x_i` to its k-th neighbor in `X \ {x_i}`
//! - `nu_k(x_i)`:  distance from `x_i` to its k-th neighbor in `Y`
//!
//! The alpha-family estimators rest on
//!
//! ```text
//! D_a(X||Y) = B(k,a) * 1/n * sum_i [ (n-1) rho_k(x_i)^D / (m nu_k(x_i)^D) ]^(1-a)
//! B(k,a)    = Gamma(k)^2 / (Gamma(k-a+1) Gamma(k+a-1))
//! ```
//!
//! which consistently estimates `integral p^a q^(1-a)` (Poczos & Schneider,
//! 2011). KL uses the Wang-Kulkarni-Verdu estimator and L2 the kNN density
//! functional estimators of `integral p^2`, `integral pq`, `integral q^2`.

use crate::core::{Result, SdmError};
use crate::index::Neighbors;
use crate::utils::stats::ln_gamma;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Distances below this are clamped before ratios and logarithms
pub const DISTANCE_EPSILON: f64 = 1e-10;

/// A divergence functional between two distributions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DivFunc {
    /// Renyi-alpha divergence, `log(integral p^a q^(1-a)) / (a - 1)`
    Renyi { alpha: f64 },
    /// Hellinger distance, `sqrt(1 - integral sqrt(pq))`
    Hellinger,
    /// Bhattacharyya distance, `-log(integral sqrt(pq))`
    Bhattacharyya,
    /// Kullback-Leibler divergence
    KullbackLeibler,
    /// L2 distance between densities, `sqrt(integral (p - q)^2)`
    L2,
}

impl DivFunc {
    /// Neighbor rank this functional reads given the configured `k`
    pub fn required_k(&self, k: usize) -> usize {
        match self {
            DivFunc::L2 => k.max(2),
            _ => k,
        }
    }

    /// Whether the estimate also needs `Y`'s neighbors in `X`
    pub fn needs_reverse(&self) -> bool {
        matches!(self, DivFunc::L2)
    }

    /// Whether the functional is symmetric in its arguments
    pub fn is_symmetric(&self) -> bool {
        matches!(
            self,
            DivFunc::Hellinger | DivFunc::Bhattacharyya | DivFunc::L2
        )
    }

    /// Estimate the functional from neighbor statistics of one bag pair
    ///
    /// Returns NaN when the estimate leaves its numeric domain.
    pub fn estimate(&self, stats: &PairStats<'_>, k: usize) -> f64 {
        let k = self.required_k(k);
        let value = match *self {
            DivFunc::Renyi { alpha } if (alpha - 1.0).abs() < 1e-12 => kl_divergence(stats, k),
            DivFunc::Renyi { alpha } => {
                let overlap = alpha_overlap(stats, k, alpha);
                (overlap.ln() / (alpha - 1.0)).max(0.0)
            }
            DivFunc::Hellinger => (1.0 - alpha_overlap(stats, k, 0.5)).max(0.0).sqrt(),
            DivFunc::Bhattacharyya => (-alpha_overlap(stats, k, 0.5).ln()).max(0.0),
            DivFunc::KullbackLeibler => kl_divergence(stats, k),
            DivFunc::L2 => l2_distance(stats, k),
        };
        if value.is_finite() {
            value
        } else {
            f64::NAN
        }
    }
}

impl fmt::Display for DivFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DivFunc::Renyi { alpha } => write!(f, "renyi:{alpha}"),
            DivFunc::Hellinger => f.write_str("hellinger"),
            DivFunc::Bhattacharyya => f.write_str("bhattacharyya"),
            DivFunc::KullbackLeibler => f.write_str("kl"),
            DivFunc::L2 => f.write_str("l2"),
        }
    }
}

impl FromStr for DivFunc {
    type Err = SdmError;

    /// Parse a descriptor such as `"renyi:.9"`, `"hellinger"` or `"l2"`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name.trim(), Some(arg.trim())),
            None => (s, None),
        };
        let no_argument = |func: DivFunc| match arg {
            None => Ok(func),
            Some(_) => Err(SdmError::InvalidDivFunc(format!(
                "{name} takes no parameter: {s}"
            ))),
        };

        match name.to_ascii_lowercase().as_str() {
            "renyi" => {
                let alpha = match arg {
                    Some(a) => a.parse::<f64>().map_err(|_| {
                        SdmError::InvalidDivFunc(format!("bad renyi alpha in {s}"))
                    })?,
                    None => 0.99,
                };
                if !(alpha > 0.0 && alpha.is_finite()) {
                    return Err(SdmError::InvalidDivFunc(format!(
                        "renyi alpha must be positive, got {alpha}"
                    )));
                }
                Ok(DivFunc::Renyi { alpha })
            }
            "hellinger" => no_argument(DivFunc::Hellinger),
            "bhattacharyya" | "bc" => no_argument(DivFunc::Bhattacharyya),
            "kl" => no_argument(DivFunc::KullbackLeibler),
            "l2" => no_argument(DivFunc::L2),
            _ => Err(SdmError::InvalidDivFunc(s.to_string())),
        }
    }
}

/// Parse a list of descriptors
pub fn parse_div_funcs<S: AsRef<str>>(descriptors: &[S]) -> Result<Vec<DivFunc>> {
    if descriptors.is_empty() {
        return Err(SdmError::InvalidDivFunc(
            "at least one divergence function is required".to_string(),
        ));
    }
    descriptors.iter().map(|s| s.as_ref().parse()).collect()
}

/// Neighbor statistics of one ordered bag pair `(X, Y)`
///
/// `*_within` queries hold the point itself in column 0, so the k-th
/// neighbor excluding self sits at column k.
pub struct PairStats<'a> {
    pub dim: usize,
    pub x_within: &'a Neighbors,
    pub x_to_y: &'a Neighbors,
    pub y_within: &'a Neighbors,
    pub y_to_x: Option<&'a Neighbors>,
}

impl PairStats<'_> {
    fn n(&self) -> usize {
        self.x_within.len()
    }

    fn m(&self) -> usize {
        self.y_within.len()
    }
}

#[inline]
fn clamp(distance: f64) -> f64 {
    distance.max(DISTANCE_EPSILON)
}

/// k-th within-bag distance of point `q`, excluding the point itself
#[inline]
fn rho(within: &Neighbors, q: usize, k: usize) -> f64 {
    clamp(within.distances(q)[k])
}

/// k-th cross-bag distance of point `q`
#[inline]
fn nu(cross: &Neighbors, q: usize, k: usize) -> f64 {
    clamp(cross.distances(q)[k - 1])
}

/// Estimate of `integral p^a q^(1-a)`, bias-corrected
fn alpha_overlap(stats: &PairStats<'_>, k: usize, alpha: f64) -> f64 {
    let kf = k as f64;
    if kf - alpha + 1.0 <= 0.0 || kf + alpha - 1.0 <= 0.0 {
        return f64::NAN;
    }
    let ln_b = 2.0 * ln_gamma(kf) - ln_gamma(kf - alpha + 1.0) - ln_gamma(kf + alpha - 1.0);

    let n = stats.n();
    let d = stats.dim as f64;
    let ln_ratio_base = ((n - 1) as f64).ln() - (stats.m() as f64).ln();
    let exponent = 1.0 - alpha;

    let total: f64 = (0..n)
        .map(|i| {
            let ln_ratio = ln_ratio_base + d * rho(stats.x_within, i, k).ln()
                - d * nu(stats.x_to_y, i, k).ln();
            (exponent * ln_ratio).exp()
        })
        .sum();

    ln_b.exp() * total / n as f64
}

fn kl_divergence(stats: &PairStats<'_>, k: usize) -> f64 {
    let n = stats.n();
    let m = stats.m();
    let d = stats.dim as f64;
    let log_ratio_sum: f64 = (0..n)
        .map(|i| nu(stats.x_to_y, i, k).ln() - rho(stats.x_within, i, k).ln())
        .sum();
    let value = d * log_ratio_sum / n as f64 + (m as f64 / (n - 1) as f64).ln();
    value.max(0.0)
}

/// Log-volume of the unit ball in `dim` dimensions
fn ln_unit_ball_volume(dim: usize) -> f64 {
    let half = dim as f64 / 2.0;
    half * PI.ln() - ln_gamma(half + 1.0)
}

/// kNN estimate of `integral f g` from sample-of-f to sample-of-g distances
///
/// `others` is the size of the reference sample the distances were taken in.
fn density_product(
    dists: impl Iterator<Item = f64>,
    count: usize,
    others: usize,
    k: usize,
    dim: usize,
) -> f64 {
    let ln_const = ((k - 1) as f64).ln() - (others as f64).ln() - ln_unit_ball_volume(dim);
    let d = dim as f64;
    let total: f64 = dists.map(|r| (ln_const - d * r.ln()).exp()).sum();
    total / count as f64
}

fn l2_distance(stats: &PairStats<'_>, k: usize) -> f64 {
    let Some(y_to_x) = stats.y_to_x else {
        return f64::NAN;
    };
    let n = stats.n();
    let m = stats.m();
    let dim = stats.dim;

    let pp = density_product(
        (0..n).map(|i| rho(stats.x_within, i, k)),
        n,
        n - 1,
        k,
        dim,
    );
    let qq = density_product(
        (0..m).map(|j| rho(stats.y_within, j, k)),
        m,
        m - 1,
        k,
        dim,
    );
    let pq = density_product((0..n).map(|i| nu(stats.x_to_y, i, k)), n, m, k, dim);
    let qp = density_product((0..m).map(|j| nu(y_to_x, j, k)), m, n, k, dim);

    (pp + qq - (pq + qp)).max(0.0).sqrt()
}
