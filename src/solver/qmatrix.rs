//! Signed kernel matrix seen by the dual solver

use crate::cache::{CacheStats, QCache};
use crate::core::{KernelMatrix, Result, SdmError};
use std::sync::Arc;

/// `Q[t][s] = sign_t * sign_s * K[index_t][index_s]`
///
/// Variable `t` of the dual problem refers to sample `index[t]` with sign
/// `sign[t]`. For C-SVC the signs are the labels and the index is the
/// identity; for epsilon-SVR there are two variables per sample, with signs
/// +1 and -1. Columns are served through an LRU cache.
pub struct QMatrix<'k> {
    kernel: &'k KernelMatrix,
    index: Vec<usize>,
    sign: Vec<f64>,
    diagonal: Vec<f64>,
    cache: QCache,
}

impl<'k> QMatrix<'k> {
    /// Build over a square kernel matrix
    pub fn new(
        kernel: &'k KernelMatrix,
        index: Vec<usize>,
        sign: Vec<f64>,
        cache_bytes: usize,
    ) -> Result<Self> {
        if !kernel.is_square() {
            return Err(SdmError::ShapeMismatch(format!(
                "kernel must be square, got {}x{}",
                kernel.rows(),
                kernel.cols()
            )));
        }
        if index.len() != sign.len() {
            return Err(SdmError::ShapeMismatch(format!(
                "{} variable indices but {} signs",
                index.len(),
                sign.len()
            )));
        }
        if let Some(&bad) = index.iter().find(|&&i| i >= kernel.rows()) {
            return Err(SdmError::ShapeMismatch(format!(
                "variable refers to sample {} of a {}x{} kernel",
                bad,
                kernel.rows(),
                kernel.cols()
            )));
        }
        let diagonal = index.iter().map(|&i| kernel.get(i, i)).collect();
        let cache = QCache::with_memory_limit(cache_bytes, index.len());
        Ok(Self {
            kernel,
            index,
            sign,
            diagonal,
            cache,
        })
    }

    /// Problem for a two-class C-SVC with labels `y` in {-1, +1}
    pub fn classification(kernel: &'k KernelMatrix, y: &[f64], cache_bytes: usize) -> Result<Self> {
        Self::new(kernel, (0..y.len()).collect(), y.to_vec(), cache_bytes)
    }

    /// Problem for epsilon-SVR: variables `0..l` with sign +1, `l..2l` with -1
    pub fn regression(kernel: &'k KernelMatrix, cache_bytes: usize) -> Result<Self> {
        let l = kernel.rows();
        let index = (0..l).chain(0..l).collect();
        let sign = std::iter::repeat(1.0)
            .take(l)
            .chain(std::iter::repeat(-1.0).take(l))
            .collect();
        Self::new(kernel, index, sign, cache_bytes)
    }

    /// Number of dual variables
    pub fn size(&self) -> usize {
        self.index.len()
    }

    /// `Q[t][t]` for every variable
    pub fn diagonal(&self) -> &[f64] {
        &self.diagonal
    }

    /// Column `t` of Q
    pub fn column(&mut self, t: usize) -> Arc<[f64]> {
        let kernel = self.kernel;
        let index = &self.index;
        let sign = &self.sign;
        self.cache.column(t, || {
            let row = kernel.row(index[t]);
            let st = sign[t];
            index
                .iter()
                .zip(sign)
                .map(|(&s, &ss)| st * ss * row[s])
                .collect()
        })
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
