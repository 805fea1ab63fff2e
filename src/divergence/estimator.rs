//! Pairwise divergence estimation between bag families

use crate::core::{validate_bags, Bag, DivMatrix, DivParams, Result, Scalar, SdmError};
use crate::divergence::{DivFunc, PairStats};
use crate::index::{build_index, NeighborIndex, Neighbors};
use crate::utils::progress::ProgressCounter;
use log::{debug, info};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

/// Estimates a set of divergence functionals between every pair of bags
///
/// One neighbor index is built per bag. Every bag pair reuses the indices and
/// the within-bag neighbor distances, and a single cross query at the largest
/// required `k` serves all functionals.
#[derive(Debug, Clone)]
pub struct DivEstimator {
    funcs: Vec<DivFunc>,
    params: DivParams,
}

/// Widened points, neighbor indices and within-bag neighbors of one family
struct Family {
    points: Vec<Vec<f64>>,
    indices: Vec<Box<dyn NeighborIndex>>,
    within: Vec<Neighbors>,
}

impl DivEstimator {
    pub fn new(funcs: Vec<DivFunc>, params: DivParams) -> Result<Self> {
        if funcs.is_empty() {
            return Err(SdmError::InvalidDivFunc(
                "at least one divergence function is required".to_string(),
            ));
        }
        if params.k == 0 {
            return Err(SdmError::InvalidParameter("k must be at least 1".to_string()));
        }
        Ok(Self { funcs, params })
    }

    pub fn funcs(&self) -> &[DivFunc] {
        &self.funcs
    }

    pub fn params(&self) -> &DivParams {
        &self.params
    }

    /// Largest neighbor rank any functional needs
    pub fn k_max(&self) -> usize {
        self.funcs
            .iter()
            .map(|f| f.required_k(self.params.k))
            .max()
            .unwrap_or(self.params.k)
    }

    fn needs_reverse(&self) -> bool {
        self.funcs.iter().any(DivFunc::needs_reverse)
    }

    /// Estimate divergences from every bag of `x_bags` to every bag of `y_bags`
    ///
    /// With `y_bags` absent the result is `x_bags` against itself and its
    /// diagonal is exactly zero.
    pub fn estimate<T: Scalar>(
        &self,
        x_bags: &[Bag<T>],
        y_bags: Option<&[Bag<T>]>,
    ) -> Result<DivMatrix> {
        let dim = validate_bags(x_bags)?;
        if let Some(y) = y_bags {
            let y_dim = validate_bags(y)?;
            if y_dim != dim {
                return Err(SdmError::ShapeMismatch(format!(
                    "x bags have dimension {dim} but y bags have dimension {y_dim}"
                )));
            }
        }

        let k_max = self.k_max();
        check_sizes(x_bags, k_max)?;
        if let Some(y) = y_bags {
            check_sizes(y, k_max)?;
        }

        let n_x = x_bags.len();
        let n_y = y_bags.map_or(n_x, <[Bag<T>]>::len);
        info!(
            "estimating {} divergence(s) for {}x{} {} bags, k={}, dim={}",
            self.funcs.len(),
            n_x,
            n_y,
            T::KIND,
            self.params.k,
            dim
        );

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.params.workers())
            .build()?;

        pool.install(|| {
            let x_family = self.prepare(x_bags, dim, k_max)?;
            let y_family = match y_bags {
                Some(y) => Some(self.prepare(y, dim, k_max)?),
                None => None,
            };
            self.fill(&x_family, y_family.as_ref(), dim, k_max)
        })
    }

    fn prepare<T: Scalar>(&self, bags: &[Bag<T>], dim: usize, k_max: usize) -> Result<Family> {
        let points: Vec<Vec<f64>> = bags.iter().map(Bag::to_f64).collect();

        debug!("building {} neighbor indices", bags.len());
        let indices = points
            .par_iter()
            .map(|p| build_index(p.clone(), dim, &self.params.index))
            .collect::<Result<Vec<_>>>()?;

        // Column 0 of each row is the query point itself
        let within = points
            .par_iter()
            .zip(indices.par_iter())
            .map(|(p, index)| index.query(p, k_max + 1))
            .collect::<Result<Vec<_>>>()?;

        Ok(Family {
            points,
            indices,
            within,
        })
    }

    fn fill(
        &self,
        x: &Family,
        y: Option<&Family>,
        dim: usize,
        k_max: usize,
    ) -> Result<DivMatrix> {
        let same_family = y.is_none();
        let y = y.unwrap_or(x);
        let n_x = x.points.len();
        let n_y = y.points.len();
        let reverse = self.needs_reverse();

        let progress = ProgressCounter::new(
            "divergence pairs",
            n_x * n_y,
            self.params.show_progress,
            self.params.print_progress,
        );

        // rows[i][j][f]
        let rows = (0..n_x)
            .into_par_iter()
            .map(|i| {
                (0..n_y)
                    .map(|j| {
                        let values = if same_family && i == j {
                            vec![0.0; self.funcs.len()]
                        } else {
                            self.pair(x, i, y, j, dim, k_max, reverse)?
                        };
                        progress.tick();
                        Ok(values)
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let mut divs = DivMatrix::nan(self.funcs.len(), n_x, n_y);
        for (i, row) in rows.into_iter().enumerate() {
            for (j, values) in row.into_iter().enumerate() {
                for (f, value) in values.into_iter().enumerate() {
                    divs.set(f, i, j, value);
                }
            }
        }
        debug!("finished {} bag pairs", progress.done());
        Ok(divs)
    }

    #[allow(clippy::too_many_arguments)]
    fn pair(
        &self,
        x: &Family,
        i: usize,
        y: &Family,
        j: usize,
        dim: usize,
        k_max: usize,
        reverse: bool,
    ) -> Result<Vec<f64>> {
        let x_to_y = y.indices[j].query(&x.points[i], k_max)?;
        let y_to_x = if reverse {
            Some(x.indices[i].query(&y.points[j], k_max)?)
        } else {
            None
        };

        let stats = PairStats {
            dim,
            x_within: &x.within[i],
            x_to_y: &x_to_y,
            y_within: &y.within[j],
            y_to_x: y_to_x.as_ref(),
        };
        Ok(self
            .funcs
            .iter()
            .map(|func| func.estimate(&stats, self.params.k))
            .collect())
    }
}

/// Every bag needs `k_max` neighbors besides itself
fn check_sizes<T: Scalar>(bags: &[Bag<T>], k_max: usize) -> Result<()> {
    let required = k_max + 1;
    match bags.iter().position(|b| b.rows() < required) {
        Some(bag) => Err(SdmError::InsufficientPoints {
            bag,
            points: bags[bag].rows(),
            required,
        }),
        None => Ok(()),
    }
}
