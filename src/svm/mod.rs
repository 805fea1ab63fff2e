//! SVM training and scoring on precomputed kernels
//!
//! Integral labels select multiclass C-SVC (one-vs-one), real labels select
//! epsilon-SVR. Models are trained on a square kernel over the training
//! samples and evaluated on rows of a rectangular test-vs-train kernel.

pub mod classify;
pub mod probability;
pub mod regress;

pub use self::classify::*;
pub use self::probability::*;
pub use self::regress::*;

use crate::core::{KernelMatrix, Prediction, Result, SdmError, SvmParams, Task};

/// Trained model for either task
#[derive(Debug, Clone)]
pub enum SvmModel {
    Classifier(Classifier),
    Regressor(Regressor),
}

impl SvmModel {
    /// Train on a square training kernel
    pub fn train(
        kernel: &KernelMatrix,
        labels: &[f64],
        task: Task,
        params: &SvmParams,
    ) -> Result<Self> {
        params.validate()?;
        if !kernel.is_square() || kernel.rows() != labels.len() {
            return Err(SdmError::ShapeMismatch(format!(
                "training kernel is {}x{} for {} labels",
                kernel.rows(),
                kernel.cols(),
                labels.len()
            )));
        }
        if labels.is_empty() {
            return Err(SdmError::EmptyDataset);
        }
        match task {
            Task::Classification => Ok(SvmModel::Classifier(Classifier::train(
                kernel, labels, params,
            )?)),
            Task::Regression => Ok(SvmModel::Regressor(Regressor::train(
                kernel, labels, params,
            )?)),
        }
    }

    pub fn task(&self) -> Task {
        match self {
            SvmModel::Classifier(_) => Task::Classification,
            SvmModel::Regressor(_) => Task::Regression,
        }
    }

    /// Predict every row of a test-vs-train kernel
    pub fn predict(&self, test_kernel: &KernelMatrix, n_train: usize) -> Result<Vec<Prediction>> {
        if test_kernel.cols() != n_train {
            return Err(SdmError::ShapeMismatch(format!(
                "test kernel has {} columns but the model was trained on {} samples",
                test_kernel.cols(),
                n_train
            )));
        }
        Ok((0..test_kernel.rows())
            .map(|r| match self {
                SvmModel::Classifier(m) => m.predict_row(test_kernel.row(r)),
                SvmModel::Regressor(m) => m.predict_row(test_kernel.row(r)),
            })
            .collect())
    }
}

/// Fraction of exactly matching labels
pub fn accuracy(predicted: &[f64], truth: &[f64]) -> f64 {
    if truth.is_empty() {
        return f64::NAN;
    }
    let correct = predicted
        .iter()
        .zip(truth)
        .filter(|(p, t)| p == t)
        .count();
    correct as f64 / truth.len() as f64
}

/// Root-mean-squared error
pub fn rmse(predicted: &[f64], truth: &[f64]) -> f64 {
    if truth.is_empty() {
        return f64::NAN;
    }
    let sse: f64 = predicted
        .iter()
        .zip(truth)
        .map(|(p, t)| (p - t).powi(2))
        .sum();
    (sse / truth.len() as f64).sqrt()
}

/// Score predictions for the given task: accuracy or RMSE
pub fn score(task: Task, predicted: &[f64], truth: &[f64]) -> f64 {
    match task {
        Task::Classification => accuracy(predicted, truth),
        Task::Regression => rmse(predicted, truth),
    }
}

/// Train on one split and score the other
///
/// `k_test` holds kernel values of test samples (rows) against training
/// samples (columns).
pub fn train_and_score(
    k_train: &KernelMatrix,
    y_train: &[f64],
    k_test: &KernelMatrix,
    y_test: &[f64],
    task: Task,
    params: &SvmParams,
) -> Result<f64> {
    if k_test.rows() != y_test.len() {
        return Err(SdmError::ShapeMismatch(format!(
            "test kernel has {} rows for {} labels",
            k_test.rows(),
            y_test.len()
        )));
    }
    let model = SvmModel::train(k_train, y_train, task, params)?;
    let predicted: Vec<f64> = model
        .predict(k_test, y_train.len())?
        .into_iter()
        .map(|p| p.label)
        .collect();
    Ok(score(task, &predicted, y_test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Matrix;
    use approx::assert_relative_eq;

    fn kernel(points: &[f64], reference: &[f64]) -> Matrix {
        Matrix::from_rows(
            points
                .iter()
                .map(|a| reference.iter().map(|b| (-(a - b).powi(2)).exp()).collect())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_scores() {
        assert_eq!(accuracy(&[1.0, 0.0, 1.0, 1.0], &[1.0, 0.0, 0.0, 1.0]), 0.75);
        assert_relative_eq!(rmse(&[1.0, 2.0], &[1.0, 4.0]), 2.0_f64.sqrt());
        assert!(accuracy(&[], &[]).is_nan());
        assert_eq!(score(Task::Regression, &[3.0], &[3.0]), 0.0);
    }

    #[test]
    fn test_train_and_score_classification() {
        let train = [-2.0, -1.5, -1.0, 1.0, 1.5, 2.0];
        let y_train = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let test = [-1.8, 1.2];
        let params = SvmParams {
            c: 10.0,
            ..Default::default()
        };
        let acc = train_and_score(
            &kernel(&train, &train),
            &y_train,
            &kernel(&test, &train),
            &[0.0, 1.0],
            Task::Classification,
            &params,
        )
        .unwrap();
        assert_eq!(acc, 1.0);
    }

    #[test]
    fn test_shape_checks() {
        let k = kernel(&[0.0, 1.0], &[0.0, 1.0]);
        let params = SvmParams::default();
        assert!(matches!(
            SvmModel::train(&k, &[1.0], Task::Classification, &params),
            Err(SdmError::ShapeMismatch(_))
        ));
        let model = SvmModel::train(&k, &[0.0, 1.0], Task::Classification, &params).unwrap();
        assert_eq!(model.task(), Task::Classification);
        assert!(model.predict(&Matrix::zeros(1, 3), 2).is_err());
    }
}
