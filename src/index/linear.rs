//! Exact brute-force index

use crate::core::Result;
use crate::index::{check_points, squared_distance, NeighborIndex, ResultSet};

/// Exact nearest-neighbor search by scanning every point
#[derive(Debug, Clone)]
pub struct LinearIndex {
    points: Vec<f64>,
    dim: usize,
}

impl LinearIndex {
    pub fn new(points: Vec<f64>, dim: usize) -> Result<Self> {
        check_points(&points, dim)?;
        Ok(Self { points, dim })
    }
}

impl NeighborIndex for LinearIndex {
    fn dim(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        self.points.len() / self.dim
    }

    fn search(&self, query: &[f64], k: usize) -> Vec<(f64, usize)> {
        let mut results = ResultSet::new(k);
        for (i, point) in self.points.chunks_exact(self.dim).enumerate() {
            let d = squared_distance(query, point);
            if d < results.worst() || !results.is_full() {
                results.push(d, i);
            }
        }
        results.into_sorted()
    }
}
