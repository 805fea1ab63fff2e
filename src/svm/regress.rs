//! Epsilon-support vector regression

use crate::core::{KernelMatrix, Prediction, Result, SvmParams};
use crate::solver::{QMatrix, SmoSolver};
use crate::svm::probability::{cross_validated, laplace_scale};
use log::debug;

/// Epsilon-SVR model: `f(x) = sum_t coef_t K(x_t, x) - rho`
#[derive(Debug, Clone)]
pub struct Regressor {
    coef: Vec<f64>,
    rho: f64,
    laplace_scale: Option<f64>,
}

fn fit(kernel: &KernelMatrix, targets: &[f64], params: &SvmParams) -> Result<(Vec<f64>, f64)> {
    let l = targets.len();
    let eps = params.regression_eps;
    let p: Vec<f64> = targets
        .iter()
        .map(|z| eps - z)
        .chain(targets.iter().map(|z| eps + z))
        .collect();
    let y: Vec<f64> = std::iter::repeat(1.0)
        .take(l)
        .chain(std::iter::repeat(-1.0).take(l))
        .collect();

    let mut q = QMatrix::regression(kernel, params.cache_bytes())?;
    let result = SmoSolver::new(params).solve(&mut q, &p, &y, params.c)?;
    let coef = (0..l)
        .map(|i| result.alpha[i] - result.alpha[i + l])
        .collect();
    Ok((coef, result.rho))
}

fn evaluate(coef: &[f64], rho: f64, row: &[f64]) -> f64 {
    row.iter().zip(coef).map(|(k, c)| k * c).sum::<f64>() - rho
}

impl Regressor {
    /// Train on a square kernel over all training samples
    pub fn train(kernel: &KernelMatrix, targets: &[f64], params: &SvmParams) -> Result<Self> {
        let (coef, rho) = fit(kernel, targets, params)?;

        let laplace_scale = if params.probability {
            let predictions = cross_validated(kernel, targets, 0.0, |k, t, test| {
                let (c, r) = fit(k, t, params)?;
                Ok((0..test.rows()).map(|i| evaluate(&c, r, test.row(i))).collect())
            })?;
            let residuals: Vec<f64> = targets
                .iter()
                .zip(&predictions)
                .map(|(z, p)| z - p)
                .collect();
            let scale = laplace_scale(&residuals);
            debug!("laplace noise scale {:.6}", scale);
            Some(scale)
        } else {
            None
        };

        Ok(Self {
            coef,
            rho,
            laplace_scale,
        })
    }

    /// Scale of the fitted Laplace noise model, when probability estimates are on
    pub fn laplace_scale(&self) -> Option<f64> {
        self.laplace_scale
    }

    /// Predict one sample from its kernel values against the training samples
    pub fn predict_row(&self, kernel_row: &[f64]) -> Prediction {
        let value = evaluate(&self.coef, self.rho, kernel_row);
        Prediction::new(value, vec![value])
    }
}
