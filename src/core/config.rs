//! Configuration records
//!
//! [`Options`] is the plain keyword record accepted at the API boundary: every
//! field is optional and unknown keys are ignored. It is resolved into the
//! concrete parameter structs ([`DivParams`], [`SvmParams`]) used by the
//! engine, filling in defaults for whatever was left unset.

use crate::core::{Result, SdmError, Task};
use serde::{Deserialize, Serialize};

/// Default number of neighbors per query
pub const DEFAULT_K: usize = 3;

/// Default number of points examined per approximate query
pub const DEFAULT_CHECKS: usize = 64;

/// Default number of randomized kd-trees
pub const DEFAULT_TREES: usize = 4;

/// Nearest-neighbor index algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexAlgorithm {
    /// Exact brute-force scan
    Linear,
    /// Forest of randomized kd-trees searched best-bin-first
    KdTree { trees: usize },
}

/// Search effort per query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checks {
    /// Stop after examining this many reference points
    Limited(usize),
    /// Search until the result is exact
    Unlimited,
}

/// Parameters for building and querying a neighbor index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexParams {
    pub algorithm: IndexAlgorithm,
    pub checks: Checks,
    /// Seed for randomized tree construction
    pub seed: u64,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            algorithm: IndexAlgorithm::KdTree {
                trees: DEFAULT_TREES,
            },
            checks: Checks::Limited(DEFAULT_CHECKS),
            seed: 0,
        }
    }
}

impl IndexParams {
    /// Exact search parameters
    pub fn exact() -> Self {
        Self {
            algorithm: IndexAlgorithm::Linear,
            checks: Checks::Unlimited,
            seed: 0,
        }
    }
}

/// Parameters for divergence estimation
#[derive(Debug, Clone, PartialEq)]
pub struct DivParams {
    /// Neighbors per query
    pub k: usize,
    /// Worker budget; 0 means a single worker
    pub num_threads: usize,
    /// Report progress every this many bag pairs; 0 disables reporting
    pub show_progress: usize,
    /// Print progress to stderr instead of the log
    pub print_progress: bool,
    pub index: IndexParams,
}

impl Default for DivParams {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            num_threads: 0,
            show_progress: 0,
            print_progress: false,
            index: IndexParams::default(),
        }
    }
}

impl DivParams {
    /// Effective number of worker threads
    pub fn workers(&self) -> usize {
        self.num_threads.max(1)
    }
}

/// Configuration for the SVM solver
#[derive(Debug, Clone, PartialEq)]
pub struct SvmParams {
    /// Regularization parameter (upper bound for alpha)
    pub c: f64,
    /// Stopping tolerance on the maximal KKT violation
    pub epsilon: f64,
    /// Width of the epsilon-insensitive tube for regression
    pub regression_eps: f64,
    /// Maximum number of solver iterations before giving up
    pub max_iterations: usize,
    /// Q-matrix cache size in megabytes
    pub cache_size_mb: f64,
    /// Enable shrinking heuristic
    pub shrinking: bool,
    /// Number of iterations between shrinking passes
    pub shrinking_iterations: usize,
    /// Fit probability estimates
    pub probability: bool,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            epsilon: 0.001,
            regression_eps: 0.1,
            max_iterations: 1_000_000,
            cache_size_mb: 100.0,
            shrinking: true,
            shrinking_iterations: 1000,
            probability: false,
        }
    }
}

impl SvmParams {
    /// Cache size in bytes
    pub fn cache_bytes(&self) -> usize {
        (self.cache_size_mb.max(0.0) * 1024.0 * 1024.0) as usize
    }

    /// Copy with a different regularization constant
    pub fn with_c(&self, c: f64) -> Self {
        Self { c, ..self.clone() }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.c > 0.0 && self.c.is_finite()) {
            return Err(SdmError::InvalidParameter(format!(
                "C must be positive, got: {}",
                self.c
            )));
        }
        if !(self.epsilon > 0.0) {
            return Err(SdmError::InvalidParameter(format!(
                "solver tolerance must be positive, got: {}",
                self.epsilon
            )));
        }
        if self.regression_eps < 0.0 {
            return Err(SdmError::InvalidParameter(format!(
                "regression epsilon must be non-negative, got: {}",
                self.regression_eps
            )));
        }
        Ok(())
    }
}

/// Index sub-configuration in keyword form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlannOptions {
    /// `"linear"` or `"kdtree"`
    pub algorithm: Option<String>,
    pub trees: Option<usize>,
    /// Negative means unlimited
    pub checks: Option<i64>,
    pub seed: Option<u64>,
}

impl FlannOptions {
    /// Resolve into index parameters
    pub fn resolve(&self) -> Result<IndexParams> {
        let defaults = IndexParams::default();
        let trees = self.trees.unwrap_or(DEFAULT_TREES);
        if trees == 0 {
            return Err(SdmError::InvalidParameter(
                "number of kd-trees must be positive".to_string(),
            ));
        }
        let algorithm = match self.algorithm.as_deref() {
            None => IndexAlgorithm::KdTree { trees },
            Some("linear") => IndexAlgorithm::Linear,
            Some("kdtree") => IndexAlgorithm::KdTree { trees },
            Some(other) => {
                return Err(SdmError::InvalidParameter(format!(
                    "unknown index algorithm: {other}"
                )))
            }
        };
        let checks = match self.checks {
            None => defaults.checks,
            Some(c) if c < 0 => Checks::Unlimited,
            Some(0) => {
                return Err(SdmError::InvalidParameter(
                    "checks must be positive or negative for unlimited".to_string(),
                ))
            }
            Some(c) => Checks::Limited(c as usize),
        };
        Ok(IndexParams {
            algorithm,
            checks,
            seed: self.seed.unwrap_or(defaults.seed),
        })
    }
}

/// Keyword options recognized by the public entry points
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub k: Option<usize>,
    pub num_threads: Option<usize>,
    pub show_progress: Option<usize>,
    pub print_progress: Option<bool>,
    pub regression_eps: Option<f64>,
    pub svm_cache_size: Option<f64>,
    pub svm_eps: Option<f64>,
    pub svm_shrinking: Option<bool>,
    pub probability: Option<bool>,
    pub flann_params: FlannOptions,
}

impl Options {
    /// Load options from a JSON document
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Set the neighbor count
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    /// Set the worker budget for divergence estimation
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Set the index sub-configuration
    pub fn with_flann(mut self, flann: FlannOptions) -> Self {
        self.flann_params = flann;
        self
    }

    /// Resolve the divergence-estimation parameters
    pub fn div_params(&self) -> Result<DivParams> {
        let k = self.k.unwrap_or(DEFAULT_K);
        if k == 0 {
            return Err(SdmError::InvalidParameter(
                "k must be at least 1".to_string(),
            ));
        }
        Ok(DivParams {
            k,
            num_threads: self.num_threads.unwrap_or(0),
            show_progress: self.show_progress.unwrap_or(0),
            print_progress: self.print_progress.unwrap_or(false),
            index: self.flann_params.resolve()?,
        })
    }

    /// Resolve the solver parameters for the given task
    pub fn svm_params(&self, task: Task) -> Result<SvmParams> {
        let defaults = SvmParams::default();
        let params = SvmParams {
            epsilon: self.svm_eps.unwrap_or(defaults.epsilon),
            regression_eps: match task {
                Task::Regression => self.regression_eps.unwrap_or(defaults.regression_eps),
                Task::Classification => defaults.regression_eps,
            },
            cache_size_mb: self.svm_cache_size.unwrap_or(defaults.cache_size_mb),
            shrinking: self.svm_shrinking.unwrap_or(defaults.shrinking),
            probability: self.probability.unwrap_or(defaults.probability),
            ..defaults
        };
        params.validate()?;
        Ok(params)
    }
}
