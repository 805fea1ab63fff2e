//! Projection of symmetric matrices onto the positive semi-definite cone

use crate::core::{Matrix, Result, SdmError};
use log::debug;
use nalgebra::{DMatrix, SymmetricEigen};

/// Eigenvalues above this (relative to the largest) count as non-negative
const CLIP_TOLERANCE: f64 = 1e-12;

/// Nearest PSD matrix in Frobenius norm: clip negative eigenvalues to zero
///
/// The input must be square and symmetric. A matrix that is already PSD is
/// returned unchanged.
pub fn project_psd(kernel: &Matrix) -> Result<Matrix> {
    if !kernel.is_square() {
        return Err(SdmError::ShapeMismatch(format!(
            "cannot project a {}x{} matrix",
            kernel.rows(),
            kernel.cols()
        )));
    }
    let n = kernel.rows();
    if n == 0 {
        return Ok(kernel.clone());
    }

    let eigen = SymmetricEigen::new(DMatrix::from_row_slice(n, n, kernel.as_slice()));
    let scale = eigen
        .eigenvalues
        .iter()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let negative = eigen
        .eigenvalues
        .iter()
        .filter(|&&v| v < -CLIP_TOLERANCE * scale)
        .count();
    if negative == 0 {
        return Ok(kernel.clone());
    }
    debug!("clipping {} negative eigenvalues of a {}x{} kernel", negative, n, n);

    let clipped = eigen.eigenvalues.map(|v| v.max(0.0));
    let vectors = &eigen.eigenvectors;
    let projected = vectors * DMatrix::from_diagonal(&clipped) * vectors.transpose();

    let mut out = Matrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            out.set(i, j, projected[(i, j)]);
        }
    }
    out.symmetrize();
    Ok(out)
}

/// Smallest eigenvalue of a symmetric matrix
pub fn min_eigenvalue(kernel: &Matrix) -> Option<f64> {
    if !kernel.is_square() || kernel.rows() == 0 {
        return None;
    }
    let n = kernel.rows();
    let eigen = SymmetricEigen::new(DMatrix::from_row_slice(n, n, kernel.as_slice()));
    eigen.eigenvalues.iter().copied().reduce(f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_psd_matrix_unchanged() {
        let m = Matrix::from_rows(vec![vec![2.0, 1.0], vec![1.0, 2.0]]).unwrap();
        let p = project_psd(&m).unwrap();
        assert_eq!(p, m);
    }

    #[test]
    fn test_indefinite_matrix_projected() {
        // Eigenvalues 3 and -1
        let m = Matrix::from_rows(vec![vec![1.0, 2.0], vec![2.0, 1.0]]).unwrap();
        assert!(min_eigenvalue(&m).unwrap() < 0.0);

        let p = project_psd(&m).unwrap();
        assert!(min_eigenvalue(&p).unwrap() > -1e-10);
        // Only the positive eigenpair (3, [1,1]/sqrt2) survives
        for v in p.as_slice() {
            assert_relative_eq!(*v, 1.5, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_projection_keeps_symmetry() {
        let m = Matrix::from_rows(vec![
            vec![1.0, 0.9, 0.1],
            vec![0.9, 1.0, 0.9],
            vec![0.1, 0.9, 1.0],
        ])
        .unwrap();
        let p = project_psd(&m).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(p.get(i, j), p.get(j, i));
            }
        }
        assert!(min_eigenvalue(&p).unwrap() > -1e-10);
    }

    #[test]
    fn test_rectangular_rejected() {
        let m = Matrix::zeros(2, 3);
        assert!(matches!(project_psd(&m), Err(SdmError::ShapeMismatch(_))));
    }
}
