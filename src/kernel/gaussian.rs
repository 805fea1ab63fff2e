//! Gaussian kernel on divergences
//!
//! The kernel is defined as: K(p, q) = exp(-γ * d(p, q))
//! where d is an estimated divergence and γ (gamma) sets the kernel width.

use crate::core::{Matrix, Result, SdmError};
use crate::kernel::DivergenceKernel;
use crate::utils::stats::median;
use log::warn;

/// Gaussian kernel: K(p, q) = exp(-γ * d(p, q))
///
/// Without a user-supplied γ the median heuristic is used: γ is the inverse
/// of the median positive divergence, so a typical pair has K ≈ 1/e.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianKernel {
    gamma: f64,
}

impl GaussianKernel {
    /// Create a kernel with the given positive γ
    pub fn new(gamma: f64) -> Result<Self> {
        if !(gamma > 0.0 && gamma.is_finite()) {
            return Err(SdmError::InvalidParameter(format!(
                "gamma must be positive, got: {gamma}"
            )));
        }
        Ok(Self { gamma })
    }

    /// Create a kernel with γ chosen by the median heuristic on `divs`
    pub fn with_median_gamma(divs: &Matrix) -> Self {
        Self {
            gamma: median_gamma(divs),
        }
    }

    /// Copy with γ multiplied by `scale`
    pub fn scaled(&self, scale: f64) -> Result<Self> {
        Self::new(self.gamma * scale)
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }
}

impl DivergenceKernel for GaussianKernel {
    #[inline]
    fn value(&self, divergence: f64) -> f64 {
        (-self.gamma * divergence).exp()
    }
}

/// Inverse median of the positive finite entries of `divs`
///
/// Falls back to 1 when no such entry exists.
pub fn median_gamma(divs: &Matrix) -> f64 {
    let positive: Vec<f64> = divs
        .as_slice()
        .iter()
        .copied()
        .filter(|d| d.is_finite() && *d > 0.0)
        .collect();
    match median(&positive) {
        Some(m) if m > 0.0 => 1.0 / m,
        _ => {
            warn!("no positive finite divergences, using gamma = 1");
            1.0
        }
    }
}
