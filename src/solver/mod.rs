//! SVM dual solver
//!
//! This module implements Sequential Minimal Optimization (SMO) over a
//! precomputed kernel, with the shrinking heuristic of "Making Large-Scale
//! SVM Learning Practical" (Joachims) and second-order working-set selection.

pub mod qmatrix;
pub mod shrinking;
pub mod smo;

pub use self::qmatrix::*;
pub use self::shrinking::*;
pub use self::smo::*;

/// Solution of the dual problem
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Dual variables, one per problem variable
    pub alpha: Vec<f64>,
    /// Offset: the decision function is `sum_t coef_t K(x_t, x) - rho`
    pub rho: f64,
    /// Variables with nonzero alpha
    pub support_vectors: Vec<usize>,
    /// Number of iterations performed
    pub iterations: usize,
    /// Final objective value
    pub objective_value: f64,
}
