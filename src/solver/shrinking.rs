//! Shrinking heuristic implementation
//!
//! Variables stuck at a bound whose gradient keeps pushing them further out
//! are unlikely to move again. The shrinking strategy removes them from the
//! active set once that has been observed on several consecutive checks, so
//! working-set selection and gradient updates only touch the rest. Before
//! the final optimality check every variable is reactivated and the full
//! gradient is reconstructed.

use std::collections::VecDeque;

/// Per-variable shrink history
#[derive(Debug)]
pub struct ShrinkingStrategy {
    /// Recent shrinkability observations for each variable
    history: Vec<VecDeque<bool>>,
    /// Consecutive observations required before a variable is shrunk
    history_size: usize,
    /// Set once the problem is close to optimal and shrinking was undone
    unshrunk: bool,
}

impl ShrinkingStrategy {
    /// Create a new shrinking strategy
    ///
    /// # Arguments
    /// * `n_variables` - Number of dual variables
    /// * `history_size` - Consecutive shrinkable observations before shrinking
    pub fn new(n_variables: usize, history_size: usize) -> Self {
        let history_size = history_size.max(1);
        Self {
            history: vec![VecDeque::with_capacity(history_size); n_variables],
            history_size,
            unshrunk: false,
        }
    }

    /// Record whether variable `i` currently looks shrinkable
    pub fn record(&mut self, i: usize, shrinkable: bool) {
        let history = &mut self.history[i];
        if history.len() >= self.history_size {
            history.pop_front();
        }
        history.push_back(shrinkable);
    }

    /// Whether variable `i` was shrinkable on every recent observation
    pub fn should_shrink(&self, i: usize) -> bool {
        let history = &self.history[i];
        history.len() >= self.history_size && history.iter().all(|&s| s)
    }

    /// Forget every variable's history
    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(VecDeque::clear);
    }

    /// Whether the one-time unshrink near optimality already happened
    pub fn unshrunk(&self) -> bool {
        self.unshrunk
    }

    pub fn mark_unshrunk(&mut self) {
        self.unshrunk = true;
    }
}

/// Bound status of a dual variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundStatus {
    Lower,
    Upper,
    Free,
}

/// Whether a bounded variable is pushed outward by its gradient
///
/// `gmax_up` and `gmax_down` are the maximal violations over the active set
/// in the two feasible directions.
pub fn is_shrinkable(status: BoundStatus, y: f64, g: f64, gmax_up: f64, gmax_down: f64) -> bool {
    match status {
        BoundStatus::Upper if y > 0.0 => -g > gmax_up,
        BoundStatus::Upper => -g > gmax_down,
        BoundStatus::Lower if y > 0.0 => g > gmax_down,
        BoundStatus::Lower => g > gmax_up,
        BoundStatus::Free => false,
    }
}
