//! Core type definitions: bags, matrices, predictions

use crate::core::{Result, Scalar, SdmError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of numeric kinds accepted for bags and labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    F32,
    F64,
    I32,
    I64,
}

impl ScalarKind {
    /// Whether bags may be stored with this kind
    pub fn is_bag_kind(self) -> bool {
        matches!(self, ScalarKind::F32 | ScalarKind::F64)
    }

    /// Whether labels of this kind select classification
    pub fn is_integral(self) -> bool {
        matches!(self, ScalarKind::I32 | ScalarKind::I64)
    }

    /// Size of one value in bytes
    pub fn size_of(self) -> usize {
        match self {
            ScalarKind::F32 | ScalarKind::I32 => 4,
            ScalarKind::F64 | ScalarKind::I64 => 8,
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
            ScalarKind::I32 => "i32",
            ScalarKind::I64 => "i64",
        };
        f.write_str(name)
    }
}

impl FromStr for ScalarKind {
    type Err = SdmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "f32" | "float" | "float32" | "single" => Ok(ScalarKind::F32),
            "f64" | "double" | "float64" => Ok(ScalarKind::F64),
            "i32" | "int" | "int32" => Ok(ScalarKind::I32),
            "i64" | "long" | "int64" => Ok(ScalarKind::I64),
            other => Err(SdmError::UnsupportedScalarType(other.to_string())),
        }
    }
}

/// Learning task implied by the label type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Classification,
    Regression,
}

impl Task {
    /// Direction in which scores of this task improve
    pub fn direction(self) -> ScoreDirection {
        match self {
            Task::Classification => ScoreDirection::HigherIsBetter,
            Task::Regression => ScoreDirection::LowerIsBetter,
        }
    }
}

/// Ordering convention for cross-validation scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreDirection {
    /// Accuracy: larger is better
    HigherIsBetter,
    /// Root-mean-squared error: smaller is better
    LowerIsBetter,
}

impl ScoreDirection {
    /// Returns true if `candidate` is strictly better than `incumbent`
    pub fn improves(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            ScoreDirection::HigherIsBetter => candidate > incumbent,
            ScoreDirection::LowerIsBetter => candidate < incumbent,
        }
    }
}

/// A bag: a set of `rows` points of dimension `dim`, stored row-major
#[derive(Clone, Debug, PartialEq)]
pub struct Bag<T: Scalar> {
    data: Vec<T>,
    rows: usize,
    dim: usize,
}

impl<T: Scalar> Bag<T> {
    /// Create a bag from contiguous row-major data
    pub fn new(data: Vec<T>, dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(SdmError::ShapeMismatch(
                "bag dimension must be positive".to_string(),
            ));
        }
        if data.is_empty() {
            return Err(SdmError::ShapeMismatch(
                "bag must contain at least one point".to_string(),
            ));
        }
        if data.len() % dim != 0 {
            return Err(SdmError::ShapeMismatch(format!(
                "{} values cannot be split into rows of dimension {}",
                data.len(),
                dim
            )));
        }
        let rows = data.len() / dim;
        Ok(Self { data, rows, dim })
    }

    /// Create a bag from a list of points
    pub fn from_rows(points: Vec<Vec<T>>) -> Result<Self> {
        let dim = points.first().map(|p| p.len()).unwrap_or(0);
        if let Some(bad) = points.iter().find(|p| p.len() != dim) {
            return Err(SdmError::ShapeMismatch(format!(
                "point of dimension {} in a bag of dimension {}",
                bad.len(),
                dim
            )));
        }
        Self::new(points.into_iter().flatten().collect(), dim)
    }

    /// Number of points
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Dimension of each point
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Raw row-major values
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// The `i`-th point
    ///
    /// # Panics
    /// Panics if `i >= rows()`
    pub fn point(&self, i: usize) -> &[T] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// Iterate over points
    pub fn points(&self) -> impl Iterator<Item = &[T]> {
        self.data.chunks_exact(self.dim)
    }

    /// Copy of the points widened to double precision
    pub fn to_f64(&self) -> Vec<f64> {
        self.data.iter().map(|&v| v.to_f64()).collect()
    }
}

/// Check that a family of bags is non-empty and shares one dimension
///
/// Returns the common dimension.
pub fn validate_bags<T: Scalar>(bags: &[Bag<T>]) -> Result<usize> {
    let first = bags.first().ok_or(SdmError::EmptyDataset)?;
    let dim = first.dim();
    for (i, bag) in bags.iter().enumerate() {
        if bag.dim() != dim {
            return Err(SdmError::ShapeMismatch(format!(
                "bag {} has dimension {}, expected {}",
                i,
                bag.dim(),
                dim
            )));
        }
    }
    Ok(dim)
}

/// Dense row-major matrix of doubles
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
}

/// Kernel values between samples; square and symmetric when built for training
pub type KernelMatrix = Matrix;

impl Matrix {
    /// Matrix filled with `value`
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            data: vec![value; rows * cols],
            rows,
            cols,
        }
    }

    /// Matrix of zeros
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0.0)
    }

    /// Build from row-major values
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(SdmError::ShapeMismatch(format!(
                "{} values for a {}x{} matrix",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self { data, rows, cols })
    }

    /// Build from nested rows, all of equal length
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
        if rows.iter().any(|r| r.len() != n_cols) {
            return Err(SdmError::ShapeMismatch(
                "matrix rows have inconsistent lengths".to_string(),
            ));
        }
        Self::from_vec(n_rows, n_cols, rows.into_iter().flatten().collect())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.cols + j] = value;
    }

    /// The `i`-th row
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Apply `f` to every entry
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            data: self.data.iter().map(|&v| f(v)).collect(),
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Select rows `row_idx` and columns `col_idx`
    pub fn select(&self, row_idx: &[usize], col_idx: &[usize]) -> Self {
        let mut data = Vec::with_capacity(row_idx.len() * col_idx.len());
        for &i in row_idx {
            let row = self.row(i);
            data.extend(col_idx.iter().map(|&j| row[j]));
        }
        Self {
            data,
            rows: row_idx.len(),
            cols: col_idx.len(),
        }
    }

    /// Square principal submatrix on `idx`
    pub fn principal(&self, idx: &[usize]) -> Self {
        self.select(idx, idx)
    }

    /// Replace the matrix by `0.5 * (M + M^T)`
    ///
    /// # Panics
    /// Panics if the matrix is not square
    pub fn symmetrize(&mut self) {
        assert!(self.is_square(), "only square matrices can be symmetrized");
        let n = self.rows;
        for i in 0..n {
            for j in (i + 1)..n {
                let avg = 0.5 * (self.get(i, j) + self.get(j, i));
                self.set(i, j, avg);
                self.set(j, i, avg);
            }
        }
    }
}

/// Divergence values indexed by (functional, source bag, target bag)
#[derive(Clone, Debug, PartialEq)]
pub struct DivMatrix {
    data: Vec<f64>,
    n_funcs: usize,
    n_x: usize,
    n_y: usize,
}

impl DivMatrix {
    /// Matrix with every cell set to NaN (uncomputed)
    pub fn nan(n_funcs: usize, n_x: usize, n_y: usize) -> Self {
        Self {
            data: vec![f64::NAN; n_funcs * n_x * n_y],
            n_funcs,
            n_x,
            n_y,
        }
    }

    /// `[functionals, source bags, target bags]`
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.n_funcs, self.n_x, self.n_y)
    }

    #[inline]
    pub fn get(&self, f: usize, i: usize, j: usize) -> f64 {
        self.data[(f * self.n_x + i) * self.n_y + j]
    }

    #[inline]
    pub(crate) fn set(&mut self, f: usize, i: usize, j: usize, value: f64) {
        self.data[(f * self.n_x + i) * self.n_y + j] = value;
    }

    /// All cells, functional-major
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Copy out the `Nx x Ny` matrix of one functional
    pub fn functional(&self, f: usize) -> Matrix {
        let size = self.n_x * self.n_y;
        Matrix {
            data: self.data[f * size..(f + 1) * size].to_vec(),
            rows: self.n_x,
            cols: self.n_y,
        }
    }

    /// Consume into per-functional matrices
    pub fn into_functionals(self) -> Vec<Matrix> {
        (0..self.n_funcs).map(|f| self.functional(f)).collect()
    }
}

/// Prediction for one bag
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Predicted class label, or regression estimate
    pub label: f64,
    /// Raw decision values: one per class pair (classification) or one value (regression)
    pub decision_values: Vec<f64>,
    /// Class probabilities, in the model's class order, when probability estimates are on
    pub probabilities: Option<Vec<f64>>,
}

impl Prediction {
    /// Create a prediction without probability estimates
    pub fn new(label: f64, decision_values: Vec<f64>) -> Self {
        Self {
            label,
            decision_values,
            probabilities: None,
        }
    }

    /// Confidence as the largest absolute decision value
    pub fn confidence(&self) -> f64 {
        self.decision_values
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }
}
