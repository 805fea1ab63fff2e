//! Cross-validation and hyperparameter tuning on a divergence matrix
//!
//! The divergence matrix is estimated once; every outer fold slices it.
//! Inside each training pool the regularization constant and the kernel
//! bandwidth are chosen by a nested cross-validation, the model is retrained
//! on the pool with the selection, and the held-out fold is scored.

pub mod tuning;

pub use self::tuning::{default_c_values, Selection, TuningGrid, DEFAULT_GAMMA_SCALES};

use self::tuning::{run, KernelSource, Tuner};
use crate::core::{Matrix, Result, ScoreDirection, SdmError, SvmParams, Task};
use crate::folds::{partition, partition_stratified, Folds};
use crate::kernel::KernelKind;
use crate::utils::stats::{nan_mean, nan_std};
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Settings of a cross-validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CvParams {
    /// Number of outer folds
    pub folds: usize,
    /// Number of inner folds used for tuning
    pub tuning_folds: usize,
    /// Build one kernel over all samples instead of one per training pool
    ///
    /// Cheaper, but the bandwidth and projection see the test samples.
    pub project_all: bool,
    pub shuffle: bool,
    pub seed: Option<u64>,
    /// Preserve class proportions in every fold (classification only)
    pub stratified: bool,
    /// Worker threads for fold evaluation; 0 means a single worker
    pub cv_threads: usize,
    pub kernel: KernelKind,
    pub c_vals: Option<Vec<f64>>,
    pub gamma_scales: Option<Vec<f64>>,
}

impl Default for CvParams {
    fn default() -> Self {
        Self {
            folds: 10,
            tuning_folds: 3,
            project_all: false,
            shuffle: true,
            seed: None,
            stratified: false,
            cv_threads: 0,
            kernel: KernelKind::Gaussian,
            c_vals: None,
            gamma_scales: None,
        }
    }
}

impl CvParams {
    pub fn with_folds(mut self, folds: usize) -> Self {
        self.folds = folds;
        self
    }

    pub fn with_tuning_folds(mut self, tuning_folds: usize) -> Self {
        self.tuning_folds = tuning_folds;
        self
    }

    pub fn with_project_all(mut self, project_all: bool) -> Self {
        self.project_all = project_all;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_stratified(mut self, stratified: bool) -> Self {
        self.stratified = stratified;
        self
    }

    pub fn with_cv_threads(mut self, cv_threads: usize) -> Self {
        self.cv_threads = cv_threads;
        self
    }

    pub fn with_kernel(mut self, kernel: KernelKind) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_c_vals(mut self, c_vals: Vec<f64>) -> Self {
        self.c_vals = Some(c_vals);
        self
    }

    pub fn with_gamma_scales(mut self, gamma_scales: Vec<f64>) -> Self {
        self.gamma_scales = Some(gamma_scales);
        self
    }

    /// Candidate grid, falling back to the defaults
    pub fn grid(&self) -> Result<TuningGrid> {
        let c_vals = self.c_vals.clone().unwrap_or_else(default_c_values);
        let scales = self
            .gamma_scales
            .clone()
            .unwrap_or_else(|| DEFAULT_GAMMA_SCALES.to_vec());
        TuningGrid::new(&c_vals, &scales)
    }

    /// Check fold counts and the grid for a run over `n_samples` samples
    ///
    /// Nothing depends on the divergences here, so callers run it before
    /// estimating anything.
    pub fn validate(&self, n_samples: usize) -> Result<TuningGrid> {
        if self.folds < 2 || self.folds > n_samples {
            return Err(SdmError::InvalidFoldCount {
                folds: self.folds,
                samples: n_samples,
            });
        }
        // fold sizes differ by at most one
        let smallest_pool = n_samples - n_samples.div_ceil(self.folds);
        self.validate_pool(smallest_pool)
    }

    /// Check that a training pool of `pool_size` samples can be tuned on
    ///
    /// `tuning_folds` above the pool size is clamped to it, so any pool of
    /// two or more samples works.
    pub fn validate_pool(&self, pool_size: usize) -> Result<TuningGrid> {
        if self.tuning_folds < 2 {
            return Err(SdmError::InvalidParameter(format!(
                "tuning_folds must be at least 2, got: {}",
                self.tuning_folds
            )));
        }
        if pool_size < 2 {
            return Err(SdmError::InvalidParameter(format!(
                "tuning_folds={} needs training pools of at least 2 samples, got: {}",
                self.tuning_folds, pool_size
            )));
        }
        self.grid()
    }

    /// Number of fold workers
    pub fn workers(&self) -> usize {
        self.cv_threads.max(1)
    }

    /// Seed for the inner folds of outer fold `fold`
    fn inner_seed(&self, fold: usize) -> Option<u64> {
        self.seed
            .map(|s| s.wrapping_add(1).wrapping_add(fold as u64))
    }

    /// Tuner over `source` with these settings
    pub(crate) fn tuner<'s, 'a>(
        &'s self,
        source: &'s KernelSource<'a>,
        grid: &'s TuningGrid,
        labels: &'s [f64],
        task: Task,
        params: &'s SvmParams,
    ) -> Tuner<'s, 'a> {
        Tuner {
            source,
            grid,
            labels,
            task,
            params,
            folds: self.tuning_folds,
            shuffle: self.shuffle,
            stratified: self.stratified,
        }
    }

    /// Outer folds over `labels`
    fn outer_folds(&self, labels: &[f64], task: Task) -> Result<Folds> {
        if self.stratified && task == Task::Classification {
            partition_stratified(labels, self.folds, self.shuffle, self.seed)
        } else {
            partition(labels.len(), self.folds, self.shuffle, self.seed)
        }
    }
}

/// Hyperparameters chosen for one outer fold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoldSelection {
    pub c: f64,
    pub gamma_scale: f64,
    /// Kernel bandwidth actually used for the fold
    pub gamma: f64,
    pub tuning_score: f64,
}

/// Outcome of a cross-validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvReport {
    /// Mean of the non-NaN fold scores
    pub score: f64,
    pub fold_scores: Vec<f64>,
    /// Selection per outer fold; `None` when every candidate failed
    pub selections: Vec<Option<FoldSelection>>,
    /// Solver runs that hit the iteration budget, tuning runs included
    pub failed_solver_runs: usize,
    pub direction: ScoreDirection,
}

impl CvReport {
    /// Standard deviation of the non-NaN fold scores
    pub fn score_std(&self) -> f64 {
        nan_std(&self.fold_scores)
    }
}

struct FoldOutcome {
    score: f64,
    selection: Option<FoldSelection>,
    failed_runs: usize,
}

/// Cross-validate a square divergence matrix
///
/// `labels` are in the solver representation; `task` selects accuracy
/// (classification) or RMSE (regression) as the score.
pub fn crossvalidate_divs(
    divs: &Matrix,
    labels: &[f64],
    task: Task,
    cv: &CvParams,
    params: &SvmParams,
) -> Result<CvReport> {
    if labels.is_empty() {
        return Err(SdmError::EmptyDataset);
    }
    if !divs.is_square() || divs.rows() != labels.len() {
        return Err(SdmError::ShapeMismatch(format!(
            "divergence matrix is {}x{} for {} labels",
            divs.rows(),
            divs.cols(),
            labels.len()
        )));
    }
    params.validate()?;
    let grid = cv.validate(labels.len())?;
    let folds = cv.outer_folds(labels, task)?;

    info!(
        "cross-validating {} samples: {} folds, {} tuning folds, {} candidates, project_all={}",
        labels.len(),
        folds.len(),
        cv.tuning_folds,
        grid.len(),
        cv.project_all
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cv.workers())
        .build()?;

    let outcomes = pool.install(|| -> Result<Vec<FoldOutcome>> {
        let source = KernelSource::new(divs, cv.kernel, &grid, cv.project_all)?;
        let tuner = cv.tuner(&source, &grid, labels, task, params);
        (0..folds.len())
            .into_par_iter()
            .map(|f| {
                let train = folds.train_indices(f);
                let test = folds.test_indices(f);
                evaluate_fold(&tuner, f, &train, test, cv.inner_seed(f))
            })
            .collect()
    })?;

    let fold_scores: Vec<f64> = outcomes.iter().map(|o| o.score).collect();
    let failed_solver_runs = outcomes.iter().map(|o| o.failed_runs).sum();
    if failed_solver_runs > 0 {
        warn!("{} solver run(s) did not converge", failed_solver_runs);
    }

    let score = nan_mean(&fold_scores);
    if score.is_nan() {
        return Err(SdmError::CrossValidationFailed(format!(
            "all {} folds failed",
            fold_scores.len()
        )));
    }
    info!("cross-validation score {:.4}", score);

    Ok(CvReport {
        score,
        fold_scores,
        selections: outcomes.iter().map(|o| o.selection).collect(),
        failed_solver_runs,
        direction: task.direction(),
    })
}

fn evaluate_fold(
    tuner: &Tuner<'_, '_>,
    fold: usize,
    train: &[usize],
    test: &[usize],
    seed: Option<u64>,
) -> Result<FoldOutcome> {
    let tuned = tuner.tune(train, seed)?;
    let Some(selection) = tuned.selection else {
        warn!("fold {}: every candidate failed", fold);
        return Ok(FoldOutcome {
            score: f64::NAN,
            selection: None,
            failed_runs: tuned.failed_runs,
        });
    };

    let scale_idx = tuner
        .grid
        .gamma_scales()
        .iter()
        .position(|&s| s == selection.gamma_scale)
        .unwrap_or(0);
    let blocks = tuner
        .source
        .blocks(scale_idx, selection.gamma_scale, train, test)?;
    let result = run(
        &blocks,
        tuner.labels,
        train,
        test,
        tuner.task,
        &tuner.params.with_c(selection.c),
    )?;

    info!(
        "fold {}: C={}, gamma={:.6} (scale {}), score {:.4}",
        fold, selection.c, blocks.gamma, selection.gamma_scale, result.score
    );

    Ok(FoldOutcome {
        score: result.score,
        selection: Some(FoldSelection {
            c: selection.c,
            gamma_scale: selection.gamma_scale,
            gamma: blocks.gamma,
            tuning_score: selection.tuning_score,
        }),
        failed_runs: tuned.failed_runs + usize::from(result.failed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two tight clusters far apart, with a little asymmetric noise
    fn clustered(n_per_class: usize) -> (Matrix, Vec<f64>) {
        let n = 2 * n_per_class;
        let class = |i: usize| usize::from(i >= n_per_class);
        let rows = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        if i == j {
                            0.0
                        } else if class(i) == class(j) {
                            0.2 + 0.01 * ((3 * i + j) % 5) as f64
                        } else {
                            3.0 + 0.01 * ((i + 2 * j) % 7) as f64
                        }
                    })
                    .collect()
            })
            .collect();
        let labels = (0..n).map(|i| class(i) as f64).collect();
        (Matrix::from_rows(rows).unwrap(), labels)
    }

    fn small_grid() -> CvParams {
        CvParams::default()
            .with_folds(4)
            .with_seed(7)
            .with_c_vals(vec![0.5, 8.0])
            .with_gamma_scales(vec![0.25, 1.0])
    }

    #[test]
    fn test_defaults() {
        let cv = CvParams::default();
        assert_eq!(cv.folds, 10);
        assert_eq!(cv.tuning_folds, 3);
        assert!(!cv.project_all);
        assert!(cv.shuffle);
        assert_eq!(cv.workers(), 1);
        assert_eq!(cv.grid().unwrap().len(), 45);
    }

    #[test]
    fn test_separable_clusters_score_perfectly() {
        let (divs, labels) = clustered(8);
        for project_all in [false, true] {
            let cv = small_grid().with_project_all(project_all);
            let report = crossvalidate_divs(
                &divs,
                &labels,
                Task::Classification,
                &cv,
                &SvmParams::default(),
            )
            .unwrap();
            assert_eq!(report.score, 1.0);
            assert_eq!(report.fold_scores.len(), 4);
            assert_eq!(report.direction, ScoreDirection::HigherIsBetter);
            assert!(report.selections.iter().all(|s| s.is_some()));
            assert_eq!(report.failed_solver_runs, 0);
        }
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let (divs, labels) = clustered(6);
        let cv = small_grid().with_cv_threads(3).with_stratified(true);
        let params = SvmParams::default();
        let a = crossvalidate_divs(&divs, &labels, Task::Classification, &cv, &params).unwrap();
        let b = crossvalidate_divs(&divs, &labels, Task::Classification, &cv, &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_all_folds_failing_is_an_error() {
        let (divs, labels) = clustered(5);
        let starved = SvmParams {
            max_iterations: 0,
            ..Default::default()
        };
        let err = crossvalidate_divs(&divs, &labels, Task::Classification, &small_grid(), &starved)
            .unwrap_err();
        assert!(matches!(err, SdmError::CrossValidationFailed(_)));
    }

    #[test]
    fn test_regression_reports_rmse() {
        let n = 12;
        let targets: Vec<f64> = (0..n).map(|i| i as f64 * 0.5).collect();
        let rows = (0..n)
            .map(|i| (0..n).map(|j| (targets[i] - targets[j]).powi(2)).collect())
            .collect();
        let divs = Matrix::from_rows(rows).unwrap();
        let cv = small_grid().with_c_vals(vec![1.0, 16.0]);
        let report =
            crossvalidate_divs(&divs, &targets, Task::Regression, &cv, &SvmParams::default())
                .unwrap();
        assert_eq!(report.direction, ScoreDirection::LowerIsBetter);
        assert!(report.score >= 0.0 && report.score < 2.5);
        assert!(report.score_std().is_finite());
    }

    #[test]
    fn test_shape_and_fold_checks() {
        let (divs, labels) = clustered(3);
        let params = SvmParams::default();
        assert!(matches!(
            crossvalidate_divs(&divs, &labels[..5], Task::Classification, &small_grid(), &params),
            Err(SdmError::ShapeMismatch(_))
        ));
        assert!(matches!(
            crossvalidate_divs(
                &divs,
                &labels,
                Task::Classification,
                &small_grid().with_folds(7),
                &params
            ),
            Err(SdmError::InvalidFoldCount { folds: 7, samples: 6 })
        ));
    }

    #[test]
    fn test_validate_checks_pools_and_grid() {
        let cv = CvParams::default().with_folds(2);
        assert!(matches!(
            cv.validate(2),
            Err(SdmError::InvalidParameter(msg)) if msg.contains("tuning_folds=3")
        ));
        assert!(cv.validate(4).is_ok());
        assert!(matches!(
            CvParams::default().with_folds(1).validate(10),
            Err(SdmError::InvalidFoldCount { folds: 1, samples: 10 })
        ));
        assert!(matches!(
            CvParams::default().with_tuning_folds(1).validate(10),
            Err(SdmError::InvalidParameter(_))
        ));
        assert!(matches!(
            CvParams::default().with_c_vals(vec![-1.0]).validate(10),
            Err(SdmError::InvalidParameter(_))
        ));
        // a pool smaller than tuning_folds is tuned with fewer folds
        assert_eq!(
            CvParams::default().with_folds(3).validate(3).unwrap().len(),
            45
        );
    }

    #[test]
    fn test_two_samples_rejected_up_front() {
        let (divs, labels) = clustered(1);
        let err = crossvalidate_divs(
            &divs,
            &labels,
            Task::Classification,
            &small_grid().with_folds(2),
            &SvmParams::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("tuning_folds"), "{err}");
    }
}
