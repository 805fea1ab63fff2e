//! Randomized kd-tree forest
//!
//! Each tree splits on a dimension drawn at random among the few with the
//! highest variance, at the median of the node's points, so trees in the
//! forest partition space differently. A query descends every tree to a leaf,
//! then keeps expanding the most promising unexplored branch across all trees
//! (best-bin-first) until its budget of examined points is spent.
//!
//! Branch priorities are valid lower bounds on the distance to anything in
//! the branch, so a search whose budget never runs out is exact.

use crate::core::{Checks, Result, SdmError};
use crate::index::{budget_spent, check_points, squared_distance, NeighborIndex, ResultSet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Maximum number of points stored in a leaf
const LEAF_SIZE: usize = 8;

/// Split dimensions are drawn among this many highest-variance dimensions
const RAND_DIM: usize = 5;

/// Points sampled when estimating per-dimension variance
const VARIANCE_SAMPLE: usize = 100;

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        start: usize,
        end: usize,
    },
    Split {
        dim: usize,
        value: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    /// Point indices, permuted so that each leaf owns a contiguous range
    order: Vec<usize>,
    nodes: Vec<Node>,
    root: usize,
}

/// Unexplored subtree waiting in the best-bin-first queue
#[derive(Debug, Clone, Copy, PartialEq)]
struct Branch {
    bound: f64,
    tree: usize,
    node: usize,
}

impl Eq for Branch {}

impl Ord for Branch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bound
            .total_cmp(&other.bound)
            .then(self.tree.cmp(&other.tree))
            .then(self.node.cmp(&other.node))
    }
}

impl PartialOrd for Branch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Forest of randomized kd-trees with bounded best-bin-first search
#[derive(Debug, Clone)]
pub struct KdForest {
    points: Vec<f64>,
    dim: usize,
    trees: Vec<Tree>,
    checks: Checks,
}

/// Mutable state of one query
struct SearchState<'q> {
    query: &'q [f64],
    results: ResultSet,
    visited: Vec<bool>,
    branches: BinaryHeap<Reverse<Branch>>,
    examined: usize,
}

impl KdForest {
    /// Build `n_trees` trees over `points`; tree `t` is randomized from `seed + t`
    pub fn new(
        points: Vec<f64>,
        dim: usize,
        n_trees: usize,
        checks: Checks,
        seed: u64,
    ) -> Result<Self> {
        check_points(&points, dim)?;
        if n_trees == 0 {
            return Err(SdmError::NeighborIndexFailure(
                "a kd-forest needs at least one tree".to_string(),
            ));
        }
        let n = points.len() / dim;

        let trees = (0..n_trees)
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t as u64));
                let mut order: Vec<usize> = (0..n).collect();
                let mut nodes = Vec::new();
                let root = build_node(&points, dim, &mut order, 0, &mut nodes, &mut rng);
                Tree { order, nodes, root }
            })
            .collect();

        Ok(Self {
            points,
            dim,
            trees,
            checks,
        })
    }

    /// Number of trees in the forest
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Search budget applied to every query
    pub fn checks(&self) -> Checks {
        self.checks
    }

    fn point(&self, i: usize) -> &[f64] {
        &self.points[i * self.dim..(i + 1) * self.dim]
    }

    /// Descend from `node` to a leaf, queueing the far side of every split
    fn descend(&self, tree_id: usize, mut node: usize, bound: f64, state: &mut SearchState<'_>) {
        let tree = &self.trees[tree_id];
        loop {
            if bound > state.results.worst() {
                return;
            }
            match tree.nodes[node] {
                Node::Leaf { start, end } => {
                    for &p in &tree.order[start..end] {
                        if state.visited[p] {
                            continue;
                        }
                        state.visited[p] = true;
                        state.examined += 1;
                        let d = squared_distance(state.query, self.point(p));
                        state.results.push(d, p);
                    }
                    return;
                }
                Node::Split {
                    dim,
                    value,
                    left,
                    right,
                } => {
                    let diff = state.query[dim] - value;
                    let (near, far) = if diff < 0.0 {
                        (left, right)
                    } else {
                        (right, left)
                    };
                    state.branches.push(Reverse(Branch {
                        bound: bound.max(diff * diff),
                        tree: tree_id,
                        node: far,
                    }));
                    node = near;
                }
            }
        }
    }
}

impl NeighborIndex for KdForest {
    fn dim(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        self.points.len() / self.dim
    }

    fn search(&self, query: &[f64], k: usize) -> Vec<(f64, usize)> {
        let mut state = SearchState {
            query,
            results: ResultSet::new(k),
            visited: vec![false; self.len()],
            branches: BinaryHeap::new(),
            examined: 0,
        };

        for (t, tree) in self.trees.iter().enumerate() {
            self.descend(t, tree.root, 0.0, &mut state);
        }

        while let Some(Reverse(branch)) = state.branches.pop() {
            if state.results.is_full() {
                if budget_spent(self.checks, state.examined) {
                    break;
                }
                // Queue is ordered by bound: nothing left can improve the result
                if branch.bound > state.results.worst() {
                    break;
                }
            }
            self.descend(branch.tree, branch.node, branch.bound, &mut state);
        }

        state.results.into_sorted()
    }
}

fn build_node(
    points: &[f64],
    dim: usize,
    order: &mut [usize],
    offset: usize,
    nodes: &mut Vec<Node>,
    rng: &mut StdRng,
) -> usize {
    if order.len() <= LEAF_SIZE {
        nodes.push(Node::Leaf {
            start: offset,
            end: offset + order.len(),
        });
        return nodes.len() - 1;
    }

    let split_dim = choose_split_dimension(points, dim, order, rng);
    let coord = |i: usize| points[i * dim + split_dim];

    // Left half <= value <= right half along split_dim
    let mid = order.len() / 2;
    order.select_nth_unstable_by(mid, |&a, &b| coord(a).total_cmp(&coord(b)));
    let value = coord(order[mid]);

    let id = nodes.len();
    nodes.push(Node::Leaf { start: 0, end: 0 });

    let (left_order, right_order) = order.split_at_mut(mid);
    let left = build_node(points, dim, left_order, offset, nodes, rng);
    let right = build_node(points, dim, right_order, offset + mid, nodes, rng);

    nodes[id] = Node::Split {
        dim: split_dim,
        value,
        left,
        right,
    };
    id
}

fn choose_split_dimension(points: &[f64], dim: usize, order: &[usize], rng: &mut StdRng) -> usize {
    if dim == 1 {
        return 0;
    }
    let sample = &order[..order.len().min(VARIANCE_SAMPLE)];
    let count = sample.len() as f64;

    let mut mean = vec![0.0; dim];
    for &i in sample {
        for (d, m) in mean.iter_mut().enumerate() {
            *m += points[i * dim + d];
        }
    }
    mean.iter_mut().for_each(|m| *m /= count);

    let mut variance = vec![0.0; dim];
    for &i in sample {
        for (d, v) in variance.iter_mut().enumerate() {
            let diff = points[i * dim + d] - mean[d];
            *v += diff * diff;
        }
    }

    let mut dims: Vec<usize> = (0..dim).collect();
    dims.sort_by(|&a, &b| variance[b].total_cmp(&variance[a]));
    let top = dims.len().min(RAND_DIM);
    dims[rng.gen_range(0..top)]
}
