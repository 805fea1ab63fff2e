//! High-level API for support distribution machines
//!
//! Bags in, scores and predictions out. Divergences are estimated once per
//! call and everything downstream works on the divergence matrix.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rsdm::api::{crossvalidate, Sdm};
//! use rsdm::{Bag, CvParams, DivFunc, Options};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let bags: Vec<Bag<f64>> = Vec::new();
//! # let labels: Vec<i32> = Vec::new();
//! let div_func: DivFunc = "renyi:.9".parse()?;
//! let cv = CvParams::default().with_folds(5).with_seed(0);
//! let report = crossvalidate(&bags, &labels, &cv, div_func, &Options::default())?;
//! println!("accuracy: {:.3}", report.score);
//!
//! let model = Sdm::train(bags, &labels, div_func, &cv, &Options::default())?;
//! # Ok(())
//! # }
//! ```

use crate::core::{
    labels_to_f64, Bag, DivMatrix, Label, Matrix, Options, Prediction, Result, Scalar, SdmError,
    SvmParams, Task,
};
use crate::cv::tuning::{KernelSource, Selection, TuningGrid};
use crate::cv::{self, CvParams, CvReport};
use crate::divergence::{DivEstimator, DivFunc};
use crate::kernel::DivergenceKernel;
use crate::svm::SvmModel;
use log::info;
use std::marker::PhantomData;

/// Estimate divergences between every bag of `x_bags` and every bag of
/// `y_bags` (or of `x_bags` itself when `y_bags` is `None`)
///
/// The result has shape `[div_funcs.len(), x_bags.len(), y_bags.len()]`.
pub fn get_divs<T: Scalar>(
    x_bags: &[Bag<T>],
    y_bags: Option<&[Bag<T>]>,
    div_funcs: &[DivFunc],
    options: &Options,
) -> Result<DivMatrix> {
    let estimator = DivEstimator::new(div_funcs.to_vec(), options.div_params()?)?;
    estimator.estimate(x_bags, y_bags)
}

fn check_labels<T: Scalar, L: Label>(bags: &[Bag<T>], labels: &[L]) -> Result<()> {
    if bags.len() != labels.len() {
        return Err(SdmError::ShapeMismatch(format!(
            "{} bags but {} labels",
            bags.len(),
            labels.len()
        )));
    }
    Ok(())
}

/// Single-functional square divergence matrix over `bags`
fn square_divs<T: Scalar>(bags: &[Bag<T>], div_func: DivFunc, options: &Options) -> Result<Matrix> {
    Ok(get_divs(bags, None, &[div_func], options)?.functional(0))
}

/// Cross-validate an SDM on bags
///
/// The label type picks the task: integral labels classify (accuracy),
/// real labels regress (RMSE).
pub fn crossvalidate<T: Scalar, L: Label>(
    bags: &[Bag<T>],
    labels: &[L],
    cv: &CvParams,
    div_func: DivFunc,
    options: &Options,
) -> Result<CvReport> {
    check_labels(bags, labels)?;
    cv.validate(bags.len())?;
    options.svm_params(L::TASK)?;
    info!(
        "cross-validating {} {} bags with {} labels ({:?})",
        bags.len(),
        T::KIND,
        L::KIND,
        L::TASK
    );
    let divs = square_divs(bags, div_func, options)?;
    crossvalidate_divs(&divs, labels, cv, options)
}

/// Cross-validate an SDM on a precomputed square divergence matrix
pub fn crossvalidate_divs<L: Label>(
    divs: &Matrix,
    labels: &[L],
    cv: &CvParams,
    options: &Options,
) -> Result<CvReport> {
    let params = options.svm_params(L::TASK)?;
    cv::crossvalidate_divs(divs, &labels_to_f64(labels), L::TASK, cv, &params)
}

/// Tune `(C, gamma)` on `pool` by inner cross-validation over `source`
fn select(
    source: &KernelSource<'_>,
    grid: &TuningGrid,
    pool: &[usize],
    labels: &[f64],
    task: Task,
    cv: &CvParams,
    params: &SvmParams,
) -> Result<Selection> {
    let tuned = cv
        .tuner(source, grid, labels, task, params)
        .tune(pool, cv.seed)?;
    tuned.selection.ok_or_else(|| {
        SdmError::CrossValidationFailed(format!(
            "no candidate trained successfully ({} failed solver runs)",
            tuned.failed_runs
        ))
    })
}

/// Trained support distribution machine
///
/// Keeps its training bags, since predictions need divergences from each
/// new bag to every training bag.
pub struct Sdm<T: Scalar, L: Label> {
    train_bags: Vec<Bag<T>>,
    estimator: DivEstimator,
    kernel: Box<dyn DivergenceKernel>,
    gamma: f64,
    c: f64,
    model: SvmModel,
    _labels: PhantomData<L>,
}

impl<T: Scalar, L: Label> Sdm<T, L> {
    /// Train on bags, choosing `C` and the kernel bandwidth by cross-validation
    /// over `cv.tuning_folds` folds of the training set
    pub fn train(
        bags: Vec<Bag<T>>,
        labels: &[L],
        div_func: DivFunc,
        cv: &CvParams,
        options: &Options,
    ) -> Result<Self> {
        check_labels(&bags, labels)?;
        let grid = cv.validate_pool(bags.len())?;
        let params = options.svm_params(L::TASK)?;
        let estimator = DivEstimator::new(vec![div_func], options.div_params()?)?;
        let divs = estimator.estimate(&bags, None)?.functional(0);
        let y = labels_to_f64(labels);

        let source = KernelSource::new(&divs, cv.kernel, &grid, cv.project_all)?;
        let pool: Vec<usize> = (0..bags.len()).collect();
        let selection = select(&source, &grid, &pool, &y, L::TASK, cv, &params)?;

        let gamma = selection.gamma_scale * cv.kernel.auto_bandwidth(&divs);
        let kernel = cv.kernel.with_bandwidth(gamma)?;
        let params = params.with_c(selection.c);
        let model = SvmModel::train(&kernel.train_matrix(&divs, true)?, &y, L::TASK, &params)?;
        info!(
            "trained SDM on {} bags with {} labels: C={}, gamma={:.6}",
            bags.len(),
            L::KIND,
            selection.c,
            gamma
        );

        Ok(Self {
            train_bags: bags,
            estimator,
            kernel,
            gamma,
            c: selection.c,
            model,
            _labels: PhantomData,
        })
    }

    /// Selected regularization constant
    pub fn c(&self) -> f64 {
        self.c
    }

    /// Selected kernel bandwidth
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn n_train(&self) -> usize {
        self.train_bags.len()
    }

    /// Predictions with decision values (and probabilities, when enabled)
    pub fn predict_many(&self, bags: &[Bag<T>]) -> Result<Vec<Prediction>> {
        if bags.is_empty() {
            return Ok(Vec::new());
        }
        let divs = self
            .estimator
            .estimate(bags, Some(self.train_bags.as_slice()))?
            .functional(0);
        self.model
            .predict(&self.kernel.test_matrix(&divs), self.train_bags.len())
    }

    /// Predict the label of a single bag
    pub fn predict(&self, bag: &Bag<T>) -> Result<L> {
        Ok(L::from_f64(self.predict_with_values(bag)?.label))
    }

    /// Predict a single bag, keeping its decision values
    pub fn predict_with_values(&self, bag: &Bag<T>) -> Result<Prediction> {
        self.predict_many(std::slice::from_ref(bag))?
            .pop()
            .ok_or(SdmError::EmptyDataset)
    }

    /// Noise scale of the regression model, when probability estimates are on
    pub fn laplace_scale(&self) -> Option<f64> {
        match &self.model {
            SvmModel::Regressor(m) => m.laplace_scale(),
            SvmModel::Classifier(_) => None,
        }
    }
}

/// Transductive prediction: the kernel (bandwidth and projection) is built
/// over training and test bags together, then a model trained on the
/// training rows predicts the test rows
pub fn transduct<T: Scalar, L: Label>(
    train_bags: &[Bag<T>],
    labels: &[L],
    test_bags: &[Bag<T>],
    div_func: DivFunc,
    cv: &CvParams,
    options: &Options,
) -> Result<Vec<L>> {
    check_labels(train_bags, labels)?;
    let grid = cv.validate_pool(train_bags.len())?;
    let params = options.svm_params(L::TASK)?;
    if test_bags.is_empty() {
        return Ok(Vec::new());
    }
    let all: Vec<Bag<T>> = train_bags.iter().chain(test_bags).cloned().collect();
    let divs = square_divs(&all, div_func, options)?;
    let y = labels_to_f64(labels);

    let source = KernelSource::new(&divs, cv.kernel, &grid, true)?;
    let train: Vec<usize> = (0..train_bags.len()).collect();
    let test: Vec<usize> = (train_bags.len()..all.len()).collect();

    let selection = select(&source, &grid, &train, &y, L::TASK, cv, &params)?;
    let scale_idx = grid
        .gamma_scales()
        .iter()
        .position(|&s| s == selection.gamma_scale)
        .unwrap_or(0);
    let blocks = source.blocks(scale_idx, selection.gamma_scale, &train, &test)?;
    let model = SvmModel::train(&blocks.train, &y, L::TASK, &params.with_c(selection.c))?;
    info!(
        "transduction over {} + {} bags: C={}, gamma={:.6}",
        train.len(),
        test.len(),
        selection.c,
        blocks.gamma
    );

    Ok(model
        .predict(&blocks.test, train.len())?
        .into_iter()
        .map(|p| L::from_f64(p.label))
        .collect())
}
