//! Multiclass C-SVC: one binary machine per class pair, combined by voting

use crate::core::{KernelMatrix, Prediction, Result, SvmParams};
use crate::solver::{QMatrix, SmoSolver};
use crate::svm::probability::{clamp_probability, cross_validated, pairwise_coupling, Sigmoid};
use log::debug;

/// Binary machine separating class `positive` (+1) from class `negative` (-1)
#[derive(Debug, Clone)]
pub struct PairModel {
    pub positive: usize,
    pub negative: usize,
    /// (training sample index, `y_t * alpha_t`) for every support vector
    pub coef: Vec<(usize, f64)>,
    pub rho: f64,
    pub sigmoid: Option<Sigmoid>,
}

impl PairModel {
    /// Decision value for a row of kernel values against the training samples
    pub fn decision(&self, kernel_row: &[f64]) -> f64 {
        self.coef
            .iter()
            .map(|&(i, c)| c * kernel_row[i])
            .sum::<f64>()
            - self.rho
    }
}

/// One-vs-one multiclass classifier
#[derive(Debug, Clone)]
pub struct Classifier {
    classes: Vec<f64>,
    pairs: Vec<PairModel>,
    probability: bool,
}

/// Train a binary machine; returns dense coefficients `y_t alpha_t` and rho
pub(crate) fn fit_binary(
    kernel: &KernelMatrix,
    y: &[f64],
    params: &SvmParams,
) -> Result<(Vec<f64>, f64)> {
    let mut q = QMatrix::classification(kernel, y, params.cache_bytes())?;
    let p = vec![-1.0; y.len()];
    let result = SmoSolver::new(params).solve(&mut q, &p, y, params.c)?;
    let coef = result.alpha.iter().zip(y).map(|(a, y)| a * y).collect();
    Ok((coef, result.rho))
}

/// Decision values of a binary machine trained on `train` for rows of `test`
fn binary_decisions(
    train: &KernelMatrix,
    y: &[f64],
    test: &KernelMatrix,
    params: &SvmParams,
) -> Result<Vec<f64>> {
    let has_pos = y.iter().any(|&v| v > 0.0);
    let has_neg = y.iter().any(|&v| v < 0.0);
    // A split holding a single class predicts that class with unit margin
    let constant = match (has_pos, has_neg) {
        (true, false) => Some(1.0),
        (false, true) => Some(-1.0),
        (false, false) => Some(0.0),
        (true, true) => None,
    };
    if let Some(value) = constant {
        return Ok(vec![value; test.rows()]);
    }

    let (coef, rho) = fit_binary(train, y, params)?;
    Ok((0..test.rows())
        .map(|r| {
            test.row(r)
                .iter()
                .zip(&coef)
                .map(|(k, c)| k * c)
                .sum::<f64>()
                - rho
        })
        .collect())
}

impl Classifier {
    /// Train on a square kernel over all training samples
    pub fn train(kernel: &KernelMatrix, labels: &[f64], params: &SvmParams) -> Result<Self> {
        let mut classes: Vec<f64> = labels.to_vec();
        classes.sort_by(|a, b| a.total_cmp(b));
        classes.dedup();

        let class_of: Vec<usize> = labels
            .iter()
            .map(|l| classes.partition_point(|c| c.total_cmp(l).is_lt()))
            .collect();

        let mut pairs = Vec::with_capacity(classes.len() * classes.len().saturating_sub(1) / 2);
        for positive in 0..classes.len() {
            for negative in (positive + 1)..classes.len() {
                let idx: Vec<usize> = (0..labels.len())
                    .filter(|&i| class_of[i] == positive || class_of[i] == negative)
                    .collect();
                let y: Vec<f64> = idx
                    .iter()
                    .map(|&i| if class_of[i] == positive { 1.0 } else { -1.0 })
                    .collect();
                let sub = kernel.principal(&idx);

                let (dense, rho) = fit_binary(&sub, &y, params)?;
                let coef = idx
                    .iter()
                    .zip(&dense)
                    .filter(|&(_, &c)| c != 0.0)
                    .map(|(&i, &c)| (i, c))
                    .collect();

                let sigmoid = if params.probability {
                    let decisions = cross_validated(&sub, &y, 0.0, |k, t, test| {
                        binary_decisions(k, t, test, params)
                    })?;
                    let outcomes: Vec<bool> = y.iter().map(|&v| v > 0.0).collect();
                    Some(Sigmoid::fit(&decisions, &outcomes))
                } else {
                    None
                };

                pairs.push(PairModel {
                    positive,
                    negative,
                    coef,
                    rho,
                    sigmoid,
                });
            }
        }
        debug!(
            "trained {} pairwise machine(s) for {} classes",
            pairs.len(),
            classes.len()
        );

        Ok(Self {
            classes,
            pairs,
            probability: params.probability,
        })
    }

    /// Distinct class labels in increasing order
    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn pairs(&self) -> &[PairModel] {
        &self.pairs
    }

    /// Predict one sample from its kernel values against the training samples
    pub fn predict_row(&self, kernel_row: &[f64]) -> Prediction {
        let k = self.classes.len();
        let decisions: Vec<f64> = self.pairs.iter().map(|m| m.decision(kernel_row)).collect();

        if self.probability {
            let probabilities = self.class_probabilities(&decisions);
            let best = argmax(&probabilities);
            return Prediction {
                label: self.classes[best],
                decision_values: decisions,
                probabilities: Some(probabilities),
            };
        }

        let mut votes = vec![0usize; k];
        for (model, &d) in self.pairs.iter().zip(&decisions) {
            if d > 0.0 {
                votes[model.positive] += 1;
            } else {
                votes[model.negative] += 1;
            }
        }
        let mut best = 0;
        for (c, &v) in votes.iter().enumerate() {
            if v > votes[best] {
                best = c;
            }
        }
        Prediction::new(self.classes[best], decisions)
    }

    fn class_probabilities(&self, decisions: &[f64]) -> Vec<f64> {
        let k = self.classes.len();
        if k == 1 {
            return vec![1.0];
        }
        let mut r = vec![vec![0.0; k]; k];
        for (model, &d) in self.pairs.iter().zip(decisions) {
            let p = model
                .sigmoid
                .map_or(0.5, |s| clamp_probability(s.probability(d)));
            r[model.positive][model.negative] = p;
            r[model.negative][model.positive] = 1.0 - p;
        }
        if k == 2 {
            return vec![r[0][1], r[1][0]];
        }
        pairwise_coupling(&r)
    }
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Matrix;

    /// Gaussian kernel over 1-d points
    fn kernel(points: &[f64], reference: &[f64]) -> Matrix {
        Matrix::from_rows(
            points
                .iter()
                .map(|a| reference.iter().map(|b| (-(a - b).powi(2)).exp()).collect())
                .collect(),
        )
        .unwrap()
    }

    fn params() -> SvmParams {
        SvmParams {
            c: 10.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_binary_classification() {
        let points = [-3.0, -2.5, -2.0, 2.0, 2.5, 3.0];
        let labels = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let model = Classifier::train(&kernel(&points, &points), &labels, &params()).unwrap();
        assert_eq!(model.classes(), &[0.0, 1.0]);
        assert_eq!(model.pairs().len(), 1);

        let test = kernel(&[-2.8, 2.7], &points);
        assert_eq!(model.predict_row(test.row(0)).label, 0.0);
        assert_eq!(model.predict_row(test.row(1)).label, 1.0);
    }

    #[test]
    fn test_three_class_voting() {
        let points = [-6.0, -5.5, -5.0, 0.0, 0.5, -0.5, 5.0, 5.5, 6.0];
        let labels = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
        let model = Classifier::train(&kernel(&points, &points), &labels, &params()).unwrap();
        assert_eq!(model.pairs().len(), 3);

        let test = kernel(&[-5.2, 0.1, 5.7], &points);
        let predicted: Vec<f64> = (0..3).map(|r| model.predict_row(test.row(r)).label).collect();
        assert_eq!(predicted, vec![0.0, 1.0, 2.0]);
        assert_eq!(model.predict_row(test.row(0)).decision_values.len(), 3);
    }

    #[test]
    fn test_single_class_predicts_it() {
        let points = [1.0, 2.0];
        let model = Classifier::train(&kernel(&points, &points), &[4.0, 4.0], &params()).unwrap();
        assert!(model.pairs().is_empty());
        assert_eq!(model.predict_row(&[0.3, 0.1]).label, 4.0);
    }

    #[test]
    fn test_probability_estimates() {
        let points: Vec<f64> = (0..20)
            .map(|i| if i < 10 { -3.0 + i as f64 * 0.1 } else { 2.0 + i as f64 * 0.1 })
            .collect();
        let labels: Vec<f64> = (0..20).map(|i| if i < 10 { 0.0 } else { 1.0 }).collect();
        let prob_params = SvmParams {
            probability: true,
            ..params()
        };
        let model = Classifier::train(&kernel(&points, &points), &labels, &prob_params).unwrap();

        let test = kernel(&[-2.5, 3.0], &points);
        let left = model.predict_row(test.row(0));
        let probs = left.probabilities.clone().unwrap();
        assert_eq!(probs.len(), 2);
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(left.label, 0.0);
        assert!(probs[0] > 0.5);
        assert_eq!(model.predict_row(test.row(1)).label, 1.0);
    }
}
