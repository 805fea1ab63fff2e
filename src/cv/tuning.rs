//! Hyperparameter grid and nested cross-validation over it
//!
//! Candidates are pairs `(C, gamma scale)`. The kernel bandwidth of a
//! candidate is its scale times the median-heuristic bandwidth of whatever
//! training block the kernel is built from, so one grid serves every fold.

use crate::core::{KernelMatrix, Matrix, Result, SdmError, SvmParams, Task};
use crate::folds::{partition, partition_stratified, Folds};
use crate::kernel::traits::log_kernel_summary;
use crate::kernel::KernelKind;
use crate::svm::train_and_score;
use crate::utils::stats::nan_mean;
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Default bandwidth multipliers applied to the median-heuristic gamma
pub const DEFAULT_GAMMA_SCALES: [f64; 5] = [1.0 / 16.0, 1.0 / 4.0, 1.0, 4.0, 16.0];

/// Default C values: `2^-9, 2^-6, ..., 2^15`
pub fn default_c_values() -> Vec<f64> {
    (0..9).map(|i| 2f64.powi(-9 + 3 * i)).collect()
}

/// Chosen hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub c: f64,
    pub gamma_scale: f64,
    /// Mean inner cross-validation score of the candidate
    pub tuning_score: f64,
}

/// Sorted, deduplicated candidate values
#[derive(Debug, Clone, PartialEq)]
pub struct TuningGrid {
    c_vals: Vec<f64>,
    gamma_scales: Vec<f64>,
}

fn sorted_positive(values: &[f64], what: &str) -> Result<Vec<f64>> {
    if values.is_empty() {
        return Err(SdmError::InvalidParameter(format!("{what} must not be empty")));
    }
    if let Some(bad) = values.iter().find(|v| !(**v > 0.0 && v.is_finite())) {
        return Err(SdmError::InvalidParameter(format!(
            "{what} must be positive, got {bad}"
        )));
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted.dedup();
    Ok(sorted)
}

impl Default for TuningGrid {
    fn default() -> Self {
        Self {
            c_vals: default_c_values(),
            gamma_scales: DEFAULT_GAMMA_SCALES.to_vec(),
        }
    }
}

impl TuningGrid {
    pub fn new(c_vals: &[f64], gamma_scales: &[f64]) -> Result<Self> {
        Ok(Self {
            c_vals: sorted_positive(c_vals, "C values")?,
            gamma_scales: sorted_positive(gamma_scales, "gamma scales")?,
        })
    }

    pub fn c_vals(&self) -> &[f64] {
        &self.c_vals
    }

    pub fn gamma_scales(&self) -> &[f64] {
        &self.gamma_scales
    }

    /// Number of candidates
    pub fn len(&self) -> usize {
        self.c_vals.len() * self.gamma_scales.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Kernel blocks for a train/test split
pub(crate) struct Blocks {
    pub train: KernelMatrix,
    pub test: KernelMatrix,
    pub gamma: f64,
}

/// Where kernel blocks come from
pub(crate) enum KernelSource<'a> {
    /// One full projected kernel per gamma scale, sliced for each split
    Sliced { kernels: Vec<(f64, KernelMatrix)> },
    /// Kernel rebuilt from each training block of the divergence matrix
    PerFold { divs: &'a Matrix, kind: KernelKind },
}

impl<'a> KernelSource<'a> {
    pub fn new(
        divs: &'a Matrix,
        kind: KernelKind,
        grid: &TuningGrid,
        project_all: bool,
    ) -> Result<Self> {
        if !project_all {
            return Ok(KernelSource::PerFold { divs, kind });
        }
        let base = kind.auto_bandwidth(divs);
        let kernels = grid
            .gamma_scales()
            .par_iter()
            .map(|&scale| {
                let gamma = scale * base;
                let kernel = kind.with_bandwidth(gamma)?.train_matrix(divs, true)?;
                log_kernel_summary(&kernel, "full");
                Ok((gamma, kernel))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(KernelSource::Sliced { kernels })
    }

    pub fn blocks(
        &self,
        scale_idx: usize,
        scale: f64,
        train: &[usize],
        test: &[usize],
    ) -> Result<Blocks> {
        match self {
            KernelSource::Sliced { kernels } => {
                let (gamma, full) = &kernels[scale_idx];
                Ok(Blocks {
                    train: full.principal(train),
                    test: full.select(test, train),
                    gamma: *gamma,
                })
            }
            KernelSource::PerFold { divs, kind } => {
                let d_train = divs.principal(train);
                let gamma = scale * kind.auto_bandwidth(&d_train);
                let kernel = kind.with_bandwidth(gamma)?;
                Ok(Blocks {
                    train: kernel.train_matrix(&d_train, true)?,
                    test: kernel.test_matrix(&divs.select(test, train)),
                    gamma,
                })
            }
        }
    }
}

/// Score of one training run, with solver failures recorded as NaN
#[derive(Debug, Clone, Copy)]
pub(crate) struct RunScore {
    pub score: f64,
    pub failed: bool,
}

/// Train and score one candidate on precomputed blocks
pub(crate) fn run(
    blocks: &Blocks,
    labels: &[f64],
    train: &[usize],
    test: &[usize],
    task: Task,
    params: &SvmParams,
) -> Result<RunScore> {
    let y_train: Vec<f64> = train.iter().map(|&i| labels[i]).collect();
    let y_test: Vec<f64> = test.iter().map(|&i| labels[i]).collect();
    match train_and_score(&blocks.train, &y_train, &blocks.test, &y_test, task, params) {
        Ok(score) => Ok(RunScore {
            score,
            failed: false,
        }),
        Err(SdmError::SolverDidNotConverge { iterations }) => {
            debug!(
                "solver gave up after {} iterations at C={}",
                iterations, params.c
            );
            Ok(RunScore {
                score: f64::NAN,
                failed: true,
            })
        }
        Err(e) => Err(e),
    }
}

/// Settings of a nested cross-validation over the grid
pub(crate) struct Tuner<'s, 'a> {
    pub source: &'s KernelSource<'a>,
    pub grid: &'s TuningGrid,
    pub labels: &'s [f64],
    pub task: Task,
    pub params: &'s SvmParams,
    pub folds: usize,
    pub shuffle: bool,
    pub stratified: bool,
}

/// Result of tuning on one pool
pub(crate) struct TuneOutcome {
    pub selection: Option<Selection>,
    pub failed_runs: usize,
}

impl Tuner<'_, '_> {
    /// Partition `pool` (global indices) into inner folds
    fn inner_folds(&self, pool: &[usize], seed: Option<u64>) -> Result<Folds> {
        let k = self.folds.min(pool.len());
        if self.stratified && self.task == Task::Classification {
            let pool_labels: Vec<f64> = pool.iter().map(|&i| self.labels[i]).collect();
            partition_stratified(&pool_labels, k, self.shuffle, seed)
        } else {
            partition(pool.len(), k, self.shuffle, seed)
        }
    }

    /// Choose the best candidate on `pool` by inner cross-validation
    ///
    /// Ties go to the smallest C, then to the smallest gamma scale.
    pub fn tune(&self, pool: &[usize], seed: Option<u64>) -> Result<TuneOutcome> {
        let folds = self.inner_folds(pool, seed)?;
        let scales = self.grid.gamma_scales();
        let c_vals = self.grid.c_vals();

        let jobs: Vec<(usize, usize)> = (0..scales.len())
            .flat_map(|s| (0..folds.len()).map(move |f| (s, f)))
            .collect();

        // per job: one RunScore per C value
        let results = jobs
            .par_iter()
            .map(|&(s, f)| {
                let train: Vec<usize> = folds.train_indices(f).iter().map(|&p| pool[p]).collect();
                let test: Vec<usize> = folds.test_indices(f).iter().map(|&p| pool[p]).collect();
                let blocks = self.source.blocks(s, scales[s], &train, &test)?;
                c_vals
                    .iter()
                    .map(|&c| {
                        run(
                            &blocks,
                            self.labels,
                            &train,
                            &test,
                            self.task,
                            &self.params.with_c(c),
                        )
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let failed_runs = results.iter().flatten().filter(|r| r.failed).count();

        let mut scores = vec![vec![Vec::with_capacity(folds.len()); scales.len()]; c_vals.len()];
        for (&(s, _), per_c) in jobs.iter().zip(&results) {
            for (ci, r) in per_c.iter().enumerate() {
                scores[ci][s].push(r.score);
            }
        }

        let direction = self.task.direction();
        let mut best: Option<Selection> = None;
        for (ci, &c) in c_vals.iter().enumerate() {
            for (s, &gamma_scale) in scales.iter().enumerate() {
                let mean = nan_mean(&scores[ci][s]);
                if mean.is_nan() {
                    continue;
                }
                if best.map_or(true, |b| direction.improves(mean, b.tuning_score)) {
                    best = Some(Selection {
                        c,
                        gamma_scale,
                        tuning_score: mean,
                    });
                }
            }
        }

        Ok(TuneOutcome {
            selection: best,
            failed_runs,
        })
    }
}
