//! Fold partitioning for cross-validation
//!
//! Splits `0..n` into `k` disjoint folds whose sizes differ by at most one.
//! Without shuffling the folds are contiguous ranges; with shuffling the
//! indices are first permuted uniformly (Fisher-Yates), from a fixed seed
//! when one is given and from system entropy otherwise.

use crate::core::{Result, SdmError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// A partition of sample indices into folds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folds {
    folds: Vec<Vec<usize>>,
    n_samples: usize,
}

impl Folds {
    /// Number of folds
    pub fn len(&self) -> usize {
        self.folds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folds.is_empty()
    }

    /// Number of partitioned samples
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Held-out indices of fold `f`, sorted
    pub fn test_indices(&self, f: usize) -> &[usize] {
        &self.folds[f]
    }

    /// Indices of every other fold, sorted
    pub fn train_indices(&self, f: usize) -> Vec<usize> {
        let mut train: Vec<usize> = self
            .folds
            .iter()
            .enumerate()
            .filter(|&(g, _)| g != f)
            .flat_map(|(_, fold)| fold.iter().copied())
            .collect();
        train.sort_unstable();
        train
    }

    /// Iterate over `(train, test)` splits
    pub fn splits(&self) -> impl Iterator<Item = (Vec<usize>, &[usize])> + '_ {
        (0..self.len()).map(move |f| (self.train_indices(f), self.test_indices(f)))
    }

    /// Fold sizes
    pub fn sizes(&self) -> Vec<usize> {
        self.folds.iter().map(Vec::len).collect()
    }

    fn from_order(order: &[usize], k: usize) -> Self {
        let mut folds = build_folds(order, k);
        folds.iter_mut().for_each(|f| f.sort_unstable());
        Self {
            folds,
            n_samples: order.len(),
        }
    }
}

fn check_fold_count(n_samples: usize, k: usize) -> Result<()> {
    if k < 2 || k > n_samples {
        return Err(SdmError::InvalidFoldCount {
            folds: k,
            samples: n_samples,
        });
    }
    Ok(())
}

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Split `order` into `k` consecutive chunks; the first `n % k` get one extra
fn build_folds(order: &[usize], k: usize) -> Vec<Vec<usize>> {
    let base_size = order.len() / k;
    let remainder = order.len() % k;
    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for f in 0..k {
        let size = base_size + usize::from(f < remainder);
        folds.push(order[start..start + size].to_vec());
        start += size;
    }
    folds
}

/// Partition `0..n_samples` into `k` folds
///
/// # Errors
/// `InvalidFoldCount` if `k < 2` or `k > n_samples`
pub fn partition(n_samples: usize, k: usize, shuffle: bool, seed: Option<u64>) -> Result<Folds> {
    check_fold_count(n_samples, k)?;
    let mut order: Vec<usize> = (0..n_samples).collect();
    if shuffle {
        order.shuffle(&mut rng_from(seed));
    }
    Ok(Folds::from_order(&order, k))
}

/// Partition preserving class proportions across folds
///
/// Samples are grouped by label, each group optionally shuffled, and the
/// groups are dealt round-robin with one running counter, so fold sizes still
/// differ by at most one.
pub fn partition_stratified(
    labels: &[f64],
    k: usize,
    shuffle: bool,
    seed: Option<u64>,
) -> Result<Folds> {
    let n_samples = labels.len();
    check_fold_count(n_samples, k)?;

    let mut classes: Vec<f64> = labels.to_vec();
    classes.sort_by(|a, b| a.total_cmp(b));
    classes.dedup();

    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); classes.len()];
    for (i, label) in labels.iter().enumerate() {
        if let Ok(c) = classes.binary_search_by(|class| class.total_cmp(label)) {
            groups[c].push(i);
        }
    }

    if shuffle {
        let mut rng = rng_from(seed);
        for group in &mut groups {
            group.shuffle(&mut rng);
        }
    }

    let mut folds: Vec<Vec<usize>> = vec![Vec::new(); k];
    for (slot, idx) in groups.into_iter().flatten().enumerate() {
        folds[slot % k].push(idx);
    }
    folds.iter_mut().for_each(|f| f.sort_unstable());
    Ok(Folds { folds, n_samples })
}
