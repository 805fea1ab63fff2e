//! Kernel trait definition

use crate::core::{KernelMatrix, Matrix, Result, SdmError};
use crate::kernel::projection::project_psd;
use crate::utils::stats::max_finite;
use log::{debug, warn};

/// Kernel defined on divergence values
///
/// A divergence kernel turns a dissimilarity `d(p, q) >= 0` into a similarity
/// `K(p, q)`. Because the divergences are estimates, the resulting training
/// matrix need not be positive semi-definite; [`train_matrix`] can project it.
///
/// [`train_matrix`]: DivergenceKernel::train_matrix
pub trait DivergenceKernel: Send + Sync {
    /// Kernel value for a single divergence
    fn value(&self, divergence: f64) -> f64;

    /// Square training kernel: transform, symmetrize and optionally project
    fn train_matrix(&self, divs: &Matrix, project: bool) -> Result<KernelMatrix> {
        if !divs.is_square() {
            return Err(SdmError::ShapeMismatch(format!(
                "training divergences must be square, got {}x{}",
                divs.rows(),
                divs.cols()
            )));
        }
        let mut kernel = replace_nan(divs).map(|d| self.value(d));
        kernel.symmetrize();
        if project {
            kernel = project_psd(&kernel)?;
        }
        Ok(kernel)
    }

    /// Rectangular kernel between test and training samples
    fn test_matrix(&self, divs: &Matrix) -> KernelMatrix {
        replace_nan(divs).map(|d| self.value(d))
    }
}

/// Replace NaN divergences by the largest finite divergence of the block
pub fn replace_nan(divs: &Matrix) -> Matrix {
    let missing = divs.as_slice().iter().filter(|v| v.is_nan()).count();
    if missing == 0 {
        return divs.clone();
    }
    let fill = max_finite(divs.as_slice()).unwrap_or(0.0);
    warn!(
        "{} of {} divergences are NaN, replacing with {}",
        missing,
        divs.as_slice().len(),
        fill
    );
    divs.map(|v| if v.is_nan() { fill } else { v })
}

/// Log a short summary of a kernel matrix
pub(crate) fn log_kernel_summary(kernel: &KernelMatrix, label: &str) {
    if log::log_enabled!(log::Level::Debug) {
        let values = kernel.as_slice();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        debug!(
            "{} kernel {}x{}: range [{:.4}, {:.4}]",
            label,
            kernel.rows(),
            kernel.cols(),
            min,
            max
        );
    }
}
