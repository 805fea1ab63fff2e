//! Approximate nearest-neighbor indices
//!
//! An index is built once over a reference point set and then queried many
//! times, possibly from several threads at once. Two algorithms are provided:
//! an exact [`LinearIndex`] and a randomized [`KdForest`] whose search effort
//! is bounded by [`Checks`]. Recall of the forest grows with the number of
//! checks; with [`Checks::Unlimited`] its answers are exact.

pub mod kdtree;
pub mod linear;

pub use self::kdtree::*;
pub use self::linear::*;

use crate::core::{Checks, IndexAlgorithm, IndexParams, Result, SdmError};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// k nearest neighbors for a batch of query points
///
/// Row `q` holds the neighbors of query `q`, ordered by increasing distance.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbors {
    k: usize,
    distances: Vec<f64>,
    indices: Vec<usize>,
}

impl Neighbors {
    /// Neighbors per query
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of queries
    pub fn len(&self) -> usize {
        if self.k == 0 {
            0
        } else {
            self.distances.len() / self.k
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Euclidean distances of query `q`'s neighbors
    pub fn distances(&self, q: usize) -> &[f64] {
        &self.distances[q * self.k..(q + 1) * self.k]
    }

    /// Reference indices of query `q`'s neighbors
    pub fn indices(&self, q: usize) -> &[usize] {
        &self.indices[q * self.k..(q + 1) * self.k]
    }

    /// Distance from each query to its `rank`-th neighbor (1-based)
    ///
    /// # Panics
    /// Panics if `rank` is zero or exceeds `k()`
    pub fn kth_distances(&self, rank: usize) -> Vec<f64> {
        assert!(rank >= 1 && rank <= self.k, "rank out of range");
        (0..self.len())
            .map(|q| self.distances[q * self.k + rank - 1])
            .collect()
    }
}

/// Searchable index over a fixed point set
pub trait NeighborIndex: Send + Sync {
    /// Dimension of indexed points
    fn dim(&self) -> usize;

    /// Number of indexed points
    fn len(&self) -> usize;

    /// Whether the index holds no points
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Squared distances and indices of (approximately) the `k` nearest points
    ///
    /// Callers guarantee `query.len() == dim()` and `1 <= k <= len()`.
    fn search(&self, query: &[f64], k: usize) -> Vec<(f64, usize)>;

    /// k-nearest-neighbor query for a batch of row-major points
    fn query(&self, queries: &[f64], k: usize) -> Result<Neighbors> {
        let dim = self.dim();
        if queries.len() % dim != 0 {
            return Err(SdmError::NeighborIndexFailure(format!(
                "{} query values do not form points of dimension {}",
                queries.len(),
                dim
            )));
        }
        if k == 0 || k > self.len() {
            return Err(SdmError::NeighborIndexFailure(format!(
                "cannot return {} neighbors from an index of {} points",
                k,
                self.len()
            )));
        }

        let rows: Vec<Vec<(f64, usize)>> = queries
            .par_chunks(dim)
            .map(|q| self.search(q, k))
            .collect();

        let mut distances = Vec::with_capacity(rows.len() * k);
        let mut indices = Vec::with_capacity(rows.len() * k);
        for row in rows {
            for (dist_sq, idx) in row {
                distances.push(dist_sq.sqrt());
                indices.push(idx);
            }
        }
        Ok(Neighbors {
            k,
            distances,
            indices,
        })
    }
}

/// Build an index over row-major `points` of dimension `dim`
pub fn build_index(
    points: Vec<f64>,
    dim: usize,
    params: &IndexParams,
) -> Result<Box<dyn NeighborIndex>> {
    check_points(&points, dim)?;
    let index: Box<dyn NeighborIndex> = match params.algorithm {
        IndexAlgorithm::Linear => Box::new(LinearIndex::new(points, dim)?),
        IndexAlgorithm::KdTree { trees } => Box::new(KdForest::new(
            points,
            dim,
            trees,
            params.checks,
            params.seed,
        )?),
    };
    Ok(index)
}

pub(crate) fn check_points(points: &[f64], dim: usize) -> Result<()> {
    if dim == 0 {
        return Err(SdmError::NeighborIndexFailure(
            "points must have positive dimension".to_string(),
        ));
    }
    if points.is_empty() {
        return Err(SdmError::NeighborIndexFailure(
            "cannot index an empty point set".to_string(),
        ));
    }
    if points.len() % dim != 0 {
        return Err(SdmError::NeighborIndexFailure(format!(
            "{} values do not form points of dimension {}",
            points.len(),
            dim
        )));
    }
    Ok(())
}

#[inline]
pub(crate) fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Candidate neighbor ordered by squared distance, then index
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
    pub dist_sq: f64,
    pub index: usize,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist_sq
            .total_cmp(&other.dist_sq)
            .then(self.index.cmp(&other.index))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded max-heap keeping the `k` closest candidates seen so far
pub(crate) struct ResultSet {
    heap: BinaryHeap<Candidate>,
    k: usize,
}

impl ResultSet {
    pub fn new(k: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(k + 1),
            k,
        }
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.k
    }

    /// Largest kept squared distance, or infinity while not full
    pub fn worst(&self) -> f64 {
        if self.is_full() {
            self.heap.peek().map_or(f64::INFINITY, |c| c.dist_sq)
        } else {
            f64::INFINITY
        }
    }

    pub fn push(&mut self, dist_sq: f64, index: usize) {
        let candidate = Candidate { dist_sq, index };
        if !self.is_full() {
            self.heap.push(candidate);
        } else if let Some(top) = self.heap.peek() {
            if candidate < *top {
                self.heap.pop();
                self.heap.push(candidate);
            }
        }
    }

    /// Kept candidates in increasing distance order
    pub fn into_sorted(self) -> Vec<(f64, usize)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| (c.dist_sq, c.index))
            .collect()
    }
}

/// Whether a search with this budget is exhausted
#[inline]
pub(crate) fn budget_spent(checks: Checks, examined: usize) -> bool {
    match checks {
        Checks::Limited(max) => examined >= max,
        Checks::Unlimited => false,
    }
}
