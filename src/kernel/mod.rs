//! Kernels built on divergence matrices

pub mod gaussian;
pub mod projection;
pub mod traits;

pub use self::gaussian::*;
pub use self::projection::*;
pub use self::traits::*;

use crate::core::{Matrix, Result, SdmError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kernel family selectable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelKind {
    #[default]
    Gaussian,
}

impl KernelKind {
    /// Bandwidth chosen from the data when none is given
    pub fn auto_bandwidth(self, divs: &Matrix) -> f64 {
        match self {
            KernelKind::Gaussian => median_gamma(divs),
        }
    }

    /// Kernel of this family with the given bandwidth
    pub fn with_bandwidth(self, bandwidth: f64) -> Result<Box<dyn DivergenceKernel>> {
        match self {
            KernelKind::Gaussian => Ok(Box::new(GaussianKernel::new(bandwidth)?)),
        }
    }
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelKind::Gaussian => f.write_str("gaussian"),
        }
    }
}

impl FromStr for KernelKind {
    type Err = SdmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gaussian" | "rbf" => Ok(KernelKind::Gaussian),
            other => Err(SdmError::InvalidParameter(format!(
                "unknown kernel: {other}"
            ))),
        }
    }
}
