//! Probability estimates on top of SVM decision values
//!
//! Classification: per class pair, a sigmoid `P(+|f) = 1 / (1 + exp(A f + B))`
//! is fitted (Platt, 2000; Newton method of Lin, Lin & Weng, 2007) to
//! decision values obtained by internal cross-validation, and the pairwise
//! probabilities are coupled into class probabilities (Wu, Lin & Weng, 2004).
//!
//! Regression: residuals from internal cross-validation give the scale of a
//! zero-mean Laplace noise model.

use crate::core::{KernelMatrix, Result};
use crate::folds::partition;
use serde::{Deserialize, Serialize};

/// Number of internal folds used to collect out-of-sample decision values
pub const PROBABILITY_FOLDS: usize = 5;

/// Fixed seed for the internal folds, so repeated fits agree
const PROBABILITY_SEED: u64 = 0;

/// Bound keeping pairwise probabilities away from 0 and 1
const MIN_PROB: f64 = 1e-7;

/// Fitted Platt sigmoid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sigmoid {
    pub a: f64,
    pub b: f64,
}

impl Sigmoid {
    /// Probability of the positive class given decision value `f`
    pub fn probability(&self, f: f64) -> f64 {
        let fab = f * self.a + self.b;
        // Both branches avoid overflow in exp
        if fab >= 0.0 {
            (-fab).exp() / (1.0 + (-fab).exp())
        } else {
            1.0 / (1.0 + fab.exp())
        }
    }

    /// Fit to decision values and binary outcomes
    pub fn fit(decisions: &[f64], positive: &[bool]) -> Self {
        const MAX_ITER: usize = 100;
        const MIN_STEP: f64 = 1e-10;
        const SIGMA: f64 = 1e-12;
        const EPS: f64 = 1e-5;

        let prior1 = positive.iter().filter(|&&p| p).count() as f64;
        let prior0 = positive.len() as f64 - prior1;
        let hi_target = (prior1 + 1.0) / (prior1 + 2.0);
        let lo_target = 1.0 / (prior0 + 2.0);
        let targets: Vec<f64> = positive
            .iter()
            .map(|&p| if p { hi_target } else { lo_target })
            .collect();

        let objective = |a: f64, b: f64| -> f64 {
            decisions
                .iter()
                .zip(&targets)
                .map(|(&f, &t)| {
                    let fab = f * a + b;
                    if fab >= 0.0 {
                        t * fab + (1.0 + (-fab).exp()).ln()
                    } else {
                        (t - 1.0) * fab + (1.0 + fab.exp()).ln()
                    }
                })
                .sum()
        };

        let mut a = 0.0;
        let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
        let mut fval = objective(a, b);

        for _ in 0..MAX_ITER {
            let (mut h11, mut h22, mut h21) = (SIGMA, SIGMA, 0.0);
            let (mut g1, mut g2) = (0.0, 0.0);
            for (&f, &t) in decisions.iter().zip(&targets) {
                let fab = f * a + b;
                let (p, q) = if fab >= 0.0 {
                    let e = (-fab).exp();
                    (e / (1.0 + e), 1.0 / (1.0 + e))
                } else {
                    let e = fab.exp();
                    (1.0 / (1.0 + e), e / (1.0 + e))
                };
                let d2 = p * q;
                h11 += f * f * d2;
                h22 += d2;
                h21 += f * d2;
                let d1 = t - p;
                g1 += f * d1;
                g2 += d1;
            }
            if g1.abs() < EPS && g2.abs() < EPS {
                break;
            }

            let det = h11 * h22 - h21 * h21;
            let da = -(h22 * g1 - h21 * g2) / det;
            let db = -(-h21 * g1 + h11 * g2) / det;
            let gd = g1 * da + g2 * db;

            let mut step = 1.0;
            while step >= MIN_STEP {
                let (na, nb) = (a + step * da, b + step * db);
                let nf = objective(na, nb);
                if nf < fval + 1e-4 * step * gd {
                    a = na;
                    b = nb;
                    fval = nf;
                    break;
                }
                step /= 2.0;
            }
            if step < MIN_STEP {
                break;
            }
        }

        Self { a, b }
    }
}

/// Couple pairwise probabilities `r[i][j] = P(i | i or j)` into class probabilities
pub fn pairwise_coupling(r: &[Vec<f64>]) -> Vec<f64> {
    let k = r.len();
    if k == 0 {
        return Vec::new();
    }
    let max_iter = 100.max(k);
    let eps = 0.005 / k as f64;

    let mut q = vec![vec![0.0; k]; k];
    for t in 0..k {
        for j in 0..k {
            if j != t {
                q[t][t] += r[j][t] * r[j][t];
                q[t][j] = -r[j][t] * r[t][j];
            }
        }
    }

    let mut p = vec![1.0 / k as f64; k];
    let mut qp = vec![0.0; k];
    for _ in 0..max_iter {
        let mut pqp = 0.0;
        for t in 0..k {
            qp[t] = (0..k).map(|j| q[t][j] * p[j]).sum();
            pqp += p[t] * qp[t];
        }
        let max_error = qp
            .iter()
            .map(|v| (v - pqp).abs())
            .fold(0.0_f64, f64::max);
        if max_error < eps {
            break;
        }
        for t in 0..k {
            if q[t][t] <= 0.0 {
                continue;
            }
            let diff = (-qp[t] + pqp) / q[t][t];
            p[t] += diff;
            pqp = (pqp + diff * (diff * q[t][t] + 2.0 * qp[t])) / ((1.0 + diff) * (1.0 + diff));
            for j in 0..k {
                qp[j] = (qp[j] + diff * q[t][j]) / (1.0 + diff);
                p[j] /= 1.0 + diff;
            }
        }
    }
    p
}

/// Clamp a pairwise probability into `[MIN_PROB, 1 - MIN_PROB]`
pub fn clamp_probability(p: f64) -> f64 {
    p.clamp(MIN_PROB, 1.0 - MIN_PROB)
}

/// Out-of-sample predictions from internal cross-validation
///
/// `fit_predict(train_kernel, train_targets, test_kernel)` trains on one split
/// and returns one value per test row. With fewer than two samples every
/// prediction is `fallback`.
pub fn cross_validated<F>(
    kernel: &KernelMatrix,
    targets: &[f64],
    fallback: f64,
    fit_predict: F,
) -> Result<Vec<f64>>
where
    F: Fn(&KernelMatrix, &[f64], &KernelMatrix) -> Result<Vec<f64>>,
{
    let n = targets.len();
    let mut out = vec![fallback; n];
    if n < 2 {
        return Ok(out);
    }
    let folds = partition(n, PROBABILITY_FOLDS.min(n), true, Some(PROBABILITY_SEED))?;
    for (train, test) in folds.splits() {
        let train_targets: Vec<f64> = train.iter().map(|&i| targets[i]).collect();
        let values = fit_predict(
            &kernel.principal(&train),
            &train_targets,
            &kernel.select(test, &train),
        )?;
        for (&i, v) in test.iter().zip(values) {
            out[i] = v;
        }
    }
    Ok(out)
}

/// Scale of a Laplace noise model from cross-validated residuals
///
/// Residuals beyond five standard deviations of the initial fit are dropped
/// as outliers before the final mean absolute residual is taken.
pub fn laplace_scale(residuals: &[f64]) -> f64 {
    if residuals.is_empty() {
        return 0.0;
    }
    let mae = residuals.iter().map(|r| r.abs()).sum::<f64>() / residuals.len() as f64;
    let std = (2.0 * mae * mae).sqrt();
    let kept: Vec<f64> = residuals
        .iter()
        .map(|r| r.abs())
        .filter(|&r| r <= 5.0 * std)
        .collect();
    if kept.is_empty() {
        mae
    } else {
        kept.iter().sum::<f64>() / kept.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sigmoid_monotone_in_decision_value() {
        let decisions = [-3.0, -2.0, -1.5, -0.5, 0.5, 1.0, 2.0, 3.0];
        let positive = [false, false, false, false, true, true, true, true];
        let sigmoid = Sigmoid::fit(&decisions, &positive);

        assert!(sigmoid.a < 0.0);
        let low = sigmoid.probability(-2.0);
        let mid = sigmoid.probability(0.0);
        let high = sigmoid.probability(2.0);
        assert!(low < mid && mid < high);
        assert!(high > 0.8);
        assert!(low < 0.2);
    }

    #[test]
    fn test_sigmoid_probability_stable_for_extremes() {
        let sigmoid = Sigmoid { a: -10.0, b: 0.0 };
        assert_relative_eq!(sigmoid.probability(1000.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(sigmoid.probability(-1000.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pairwise_coupling_sums_to_one() {
        let r = vec![
            vec![0.0, 0.9, 0.8],
            vec![0.1, 0.0, 0.6],
            vec![0.2, 0.4, 0.0],
        ];
        let p = pairwise_coupling(&r);
        assert_relative_eq!(p.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert!(p[0] > p[1] && p[1] > p[2]);
    }

    #[test]
    fn test_pairwise_coupling_two_classes() {
        let r = vec![vec![0.0, 0.7], vec![0.3, 0.0]];
        let p = pairwise_coupling(&r);
        assert_relative_eq!(p[0], 0.7, epsilon = 1e-2);
        assert_relative_eq!(p[1], 0.3, epsilon = 1e-2);
    }

    #[test]
    fn test_laplace_scale_ignores_outliers() {
        let mut residuals = vec![1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        assert_relative_eq!(laplace_scale(&residuals), 1.0);
        residuals.push(1000.0);
        assert!(laplace_scale(&residuals) < 2.0);
        assert_eq!(laplace_scale(&[]), 0.0);
    }

    #[test]
    fn test_cross_validated_covers_every_sample() {
        let kernel = KernelMatrix::zeros(7, 7);
        let targets: Vec<f64> = (0..7).map(|i| i as f64).collect();
        let out = cross_validated(&kernel, &targets, -1.0, |train_k, train_t, test_k| {
            assert_eq!(train_k.rows(), train_t.len());
            assert_eq!(test_k.cols(), train_t.len());
            Ok(vec![42.0; test_k.rows()])
        })
        .unwrap();
        assert_eq!(out, vec![42.0; 7]);

        let single = cross_validated(&KernelMatrix::zeros(1, 1), &[3.0], -1.0, |_, _, _| {
            Ok(vec![])
        })
        .unwrap();
        assert_eq!(single, vec![-1.0]);
    }
}
