//! Sequential Minimal Optimization (SMO) solver implementation
//!
//! Solves the general dual problem shared by C-SVC and epsilon-SVR:
//!
//! ```text
//! min  0.5 a^T Q a + p^T a
//! s.t. y^T a = 0,  0 <= a_t <= C
//! ```
//!
//! Each iteration picks the maximal-violating pair with second-order
//! working-set selection (Fan, Chen & Lin, 2005), solves the two-variable
//! subproblem analytically and updates the gradient.

use crate::core::{Result, SdmError, SvmParams};
use crate::solver::qmatrix::QMatrix;
use crate::solver::shrinking::{is_shrinkable, BoundStatus, ShrinkingStrategy};
use crate::solver::OptimizationResult;
use log::{debug, warn};

/// Floor for the curvature of a two-variable subproblem
const TAU: f64 = 1e-12;

/// Consecutive shrinkable observations before a variable leaves the active set
const SHRINK_HISTORY: usize = 2;

/// SMO solver for the SVM dual problem
///
/// Holds only the stopping and shrinking configuration; the problem itself
/// (Q, p, y, C) is supplied per call, so one solver serves every class pair.
#[derive(Debug, Clone)]
pub struct SmoSolver {
    epsilon: f64,
    max_iterations: usize,
    shrinking: bool,
    shrinking_iterations: usize,
}

/// Mutable optimization state
struct State<'a> {
    p: &'a [f64],
    y: &'a [f64],
    c: f64,
    alpha: Vec<f64>,
    status: Vec<BoundStatus>,
    /// Gradient of the objective, `Q a + p`
    g: Vec<f64>,
    /// Gradient contribution of variables at the upper bound, `C * sum Q_t`
    g_bar: Vec<f64>,
    is_active: Vec<bool>,
    active: Vec<usize>,
}

impl SmoSolver {
    pub fn new(params: &SvmParams) -> Self {
        Self {
            epsilon: params.epsilon,
            max_iterations: params.max_iterations,
            shrinking: params.shrinking,
            shrinking_iterations: params.shrinking_iterations.max(1),
        }
    }

    /// Solve the dual problem
    ///
    /// # Errors
    /// `SolverDidNotConverge` when the iteration budget runs out before the
    /// maximal KKT violation drops below the tolerance.
    pub fn solve(
        &self,
        q: &mut QMatrix<'_>,
        p: &[f64],
        y: &[f64],
        c: f64,
    ) -> Result<OptimizationResult> {
        let l = q.size();
        if l == 0 {
            return Err(SdmError::EmptyDataset);
        }
        if p.len() != l || y.len() != l {
            return Err(SdmError::ShapeMismatch(format!(
                "dual problem of size {} with {} linear terms and {} signs",
                l,
                p.len(),
                y.len()
            )));
        }
        if !(c > 0.0 && c.is_finite()) {
            return Err(SdmError::InvalidParameter(format!(
                "C must be positive, got: {c}"
            )));
        }

        let mut state = State {
            p,
            y,
            c,
            alpha: vec![0.0; l],
            status: vec![BoundStatus::Lower; l],
            g: p.to_vec(),
            g_bar: vec![0.0; l],
            is_active: vec![true; l],
            active: (0..l).collect(),
        };
        let mut strategy = self
            .shrinking
            .then(|| ShrinkingStrategy::new(l, SHRINK_HISTORY));

        let shrink_interval = l.min(self.shrinking_iterations).max(1);
        let mut counter = shrink_interval;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iterations {
            if let Some(strategy) = strategy.as_mut() {
                counter -= 1;
                if counter == 0 {
                    counter = shrink_interval;
                    state.shrink(q, strategy, self.epsilon);
                }
            }

            let (i, j) = match state.select_working_set(q, self.epsilon) {
                Some(pair) => pair,
                None => {
                    if state.active.len() == l {
                        converged = true;
                        break;
                    }
                    // Optimal on the shrunk problem: check again on the full one
                    state.reconstruct_gradient(q);
                    if let Some(strategy) = strategy.as_mut() {
                        strategy.reset();
                    }
                    match state.select_working_set(q, self.epsilon) {
                        Some(pair) => {
                            counter = 1;
                            pair
                        }
                        None => {
                            converged = true;
                            break;
                        }
                    }
                }
            };

            iterations += 1;
            state.update_pair(q, i, j);
        }

        if !converged {
            warn!(
                "SMO stopped after {} iterations without reaching tolerance {}",
                iterations, self.epsilon
            );
            return Err(SdmError::SolverDidNotConverge { iterations });
        }

        state.reconstruct_gradient(q);
        let rho = state.rho();
        let objective_value = state
            .alpha
            .iter()
            .zip(&state.g)
            .zip(p)
            .map(|((a, g), pt)| a * (g + pt))
            .sum::<f64>()
            / 2.0;

        let support_vectors: Vec<usize> = (0..l).filter(|&t| state.alpha[t] > 0.0).collect();
        let bounded = state
            .status
            .iter()
            .filter(|&&s| s == BoundStatus::Upper)
            .count();
        let stats = q.cache_stats();
        debug!(
            "SMO converged in {} iterations: {} SVs ({} at bound), obj={:.6}, cache hits {}/{}",
            iterations,
            support_vectors.len(),
            bounded,
            objective_value,
            stats.hits,
            stats.hits + stats.misses
        );

        Ok(OptimizationResult {
            alpha: state.alpha,
            rho,
            support_vectors,
            iterations,
            objective_value,
        })
    }
}

impl State<'_> {
    fn is_upper(&self, t: usize) -> bool {
        self.status[t] == BoundStatus::Upper
    }

    fn is_lower(&self, t: usize) -> bool {
        self.status[t] == BoundStatus::Lower
    }

    fn update_status(&mut self, t: usize) {
        self.status[t] = if self.alpha[t] >= self.c {
            BoundStatus::Upper
        } else if self.alpha[t] <= 0.0 {
            BoundStatus::Lower
        } else {
            BoundStatus::Free
        };
    }

    /// Maximal violating pair with second-order selection of the second index
    fn select_working_set(&self, q: &mut QMatrix<'_>, eps: f64) -> Option<(usize, usize)> {
        let mut gmax = f64::NEG_INFINITY;
        let mut first = None;
        for &t in &self.active {
            if self.y[t] > 0.0 {
                if !self.is_upper(t) && -self.g[t] >= gmax {
                    gmax = -self.g[t];
                    first = Some(t);
                }
            } else if !self.is_lower(t) && self.g[t] >= gmax {
                gmax = self.g[t];
                first = Some(t);
            }
        }
        let i = first?;
        let q_i = q.column(i);
        let qd = q.diagonal();

        let mut gmax2 = f64::NEG_INFINITY;
        let mut obj_min = f64::INFINITY;
        let mut second = None;
        for &t in &self.active {
            let (grad_diff, quad) = if self.y[t] > 0.0 {
                if self.is_lower(t) {
                    continue;
                }
                gmax2 = gmax2.max(self.g[t]);
                (gmax + self.g[t], qd[i] + qd[t] - 2.0 * self.y[i] * q_i[t])
            } else {
                if self.is_upper(t) {
                    continue;
                }
                gmax2 = gmax2.max(-self.g[t]);
                (gmax - self.g[t], qd[i] + qd[t] + 2.0 * self.y[i] * q_i[t])
            };
            if grad_diff > 0.0 {
                let obj = -(grad_diff * grad_diff) / quad.max(TAU);
                if obj <= obj_min {
                    obj_min = obj;
                    second = Some(t);
                }
            }
        }

        if gmax + gmax2 < eps {
            return None;
        }
        second.map(|j| (i, j))
    }

    /// Solve the two-variable subproblem on `(i, j)` and update gradients
    fn update_pair(&mut self, q: &mut QMatrix<'_>, i: usize, j: usize) {
        let q_i = q.column(i);
        let q_j = q.column(j);
        let qd = q.diagonal();
        let c = self.c;
        let old_ai = self.alpha[i];
        let old_aj = self.alpha[j];
        let (mut ai, mut aj) = (old_ai, old_aj);

        if self.y[i] != self.y[j] {
            let quad = (qd[i] + qd[j] + 2.0 * q_i[j]).max(TAU);
            let delta = (-self.g[i] - self.g[j]) / quad;
            let diff = ai - aj;
            ai += delta;
            aj += delta;
            if diff > 0.0 {
                if aj < 0.0 {
                    aj = 0.0;
                    ai = diff;
                }
            } else if ai < 0.0 {
                ai = 0.0;
                aj = -diff;
            }
            if diff > 0.0 {
                if ai > c {
                    ai = c;
                    aj = c - diff;
                }
            } else if aj > c {
                aj = c;
                ai = c + diff;
            }
        } else {
            let quad = (qd[i] + qd[j] - 2.0 * q_i[j]).max(TAU);
            let delta = (self.g[i] - self.g[j]) / quad;
            let sum = ai + aj;
            ai -= delta;
            aj += delta;
            if sum > c {
                if ai > c {
                    ai = c;
                    aj = sum - c;
                }
            } else if aj < 0.0 {
                aj = 0.0;
                ai = sum;
            }
            if sum > c {
                if aj > c {
                    aj = c;
                    ai = sum - c;
                }
            } else if ai < 0.0 {
                ai = 0.0;
                aj = sum;
            }
        }

        self.alpha[i] = ai;
        self.alpha[j] = aj;
        let delta_i = ai - old_ai;
        let delta_j = aj - old_aj;
        for &t in &self.active {
            self.g[t] += q_i[t] * delta_i + q_j[t] * delta_j;
        }

        let was_upper_i = self.is_upper(i);
        let was_upper_j = self.is_upper(j);
        self.update_status(i);
        self.update_status(j);
        if was_upper_i != self.is_upper(i) {
            let sign = if was_upper_i { -c } else { c };
            self.g_bar
                .iter_mut()
                .zip(q_i.iter())
                .for_each(|(gb, qv)| *gb += sign * qv);
        }
        if was_upper_j != self.is_upper(j) {
            let sign = if was_upper_j { -c } else { c };
            self.g_bar
                .iter_mut()
                .zip(q_j.iter())
                .for_each(|(gb, qv)| *gb += sign * qv);
        }
    }

    /// Deactivate variables whose bound has held long enough
    fn shrink(&mut self, q: &mut QMatrix<'_>, strategy: &mut ShrinkingStrategy, eps: f64) {
        let (gmax_up, gmax_down) = self.max_violations();

        if !strategy.unshrunk() && gmax_up + gmax_down <= eps * 10.0 {
            strategy.mark_unshrunk();
            self.reconstruct_gradient(q);
            strategy.reset();
        }

        let before = self.active.len();
        let mut kept = Vec::with_capacity(before);
        for &t in &self.active {
            strategy.record(
                t,
                is_shrinkable(self.status[t], self.y[t], self.g[t], gmax_up, gmax_down),
            );
            if strategy.should_shrink(t) {
                self.is_active[t] = false;
            } else {
                kept.push(t);
            }
        }
        self.active = kept;
        if self.active.len() < before {
            debug!("shrinking: {} of {} variables active", self.active.len(), self.g.len());
        }
    }

    /// Maximal violations over the active set in the up and down directions
    fn max_violations(&self) -> (f64, f64) {
        let mut up = f64::NEG_INFINITY;
        let mut down = f64::NEG_INFINITY;
        for &t in &self.active {
            if self.y[t] > 0.0 {
                if !self.is_upper(t) {
                    up = up.max(-self.g[t]);
                }
                if !self.is_lower(t) {
                    down = down.max(self.g[t]);
                }
            } else {
                if !self.is_upper(t) {
                    down = down.max(-self.g[t]);
                }
                if !self.is_lower(t) {
                    up = up.max(self.g[t]);
                }
            }
        }
        (up, down)
    }

    /// Recompute the gradient of inactive variables and reactivate them all
    fn reconstruct_gradient(&mut self, q: &mut QMatrix<'_>) {
        let l = self.g.len();
        if self.active.len() == l {
            return;
        }
        let inactive: Vec<usize> = (0..l).filter(|&t| !self.is_active[t]).collect();
        for &t in &inactive {
            self.g[t] = self.g_bar[t] + self.p[t];
        }
        for s in 0..l {
            if self.status[s] == BoundStatus::Free {
                let q_s = q.column(s);
                let a_s = self.alpha[s];
                for &t in &inactive {
                    self.g[t] += a_s * q_s[t];
                }
            }
        }
        self.is_active.iter_mut().for_each(|a| *a = true);
        self.active = (0..l).collect();
    }

    /// Offset of the decision function
    fn rho(&self) -> f64 {
        let mut upper = f64::INFINITY;
        let mut lower = f64::NEG_INFINITY;
        let mut free_sum = 0.0;
        let mut free_count = 0usize;

        for t in 0..self.g.len() {
            let yg = self.y[t] * self.g[t];
            match self.status[t] {
                BoundStatus::Upper if self.y[t] < 0.0 => upper = upper.min(yg),
                BoundStatus::Upper => lower = lower.max(yg),
                BoundStatus::Lower if self.y[t] > 0.0 => upper = upper.min(yg),
                BoundStatus::Lower => lower = lower.max(yg),
                BoundStatus::Free => {
                    free_sum += yg;
                    free_count += 1;
                }
            }
        }

        if free_count > 0 {
            free_sum / free_count as f64
        } else {
            (upper + lower) / 2.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Matrix;
    use approx::assert_relative_eq;

    fn linear_kernel(points: &[f64]) -> Matrix {
        let rows = points
            .iter()
            .map(|a| points.iter().map(|b| a * b).collect())
            .collect();
        Matrix::from_rows(rows).unwrap()
    }

    fn params() -> SvmParams {
        SvmParams {
            c: 10.0,
            ..Default::default()
        }
    }

    fn decision(k: &Matrix, y: &[f64], result: &OptimizationResult, x: usize) -> f64 {
        (0..y.len())
            .map(|t| result.alpha[t] * y[t] * k.get(t, x))
            .sum::<f64>()
            - result.rho
    }

    #[test]
    fn test_separable_one_dimensional() {
        let points = [-2.0, -1.0, 1.0, 2.0];
        let y = [-1.0, -1.0, 1.0, 1.0];
        let k = linear_kernel(&points);
        let mut q = QMatrix::classification(&k, &y, 1 << 20).unwrap();
        let p = vec![-1.0; 4];

        let result = SmoSolver::new(&params()).solve(&mut q, &p, &y, 10.0).unwrap();

        // Max-margin separator is x = 0 with support vectors at +-1, w = 1
        assert_relative_eq!(result.alpha[1], 0.5, epsilon = 1e-3);
        assert_relative_eq!(result.alpha[2], 0.5, epsilon = 1e-3);
        assert_eq!(result.support_vectors, vec![1, 2]);
        assert_relative_eq!(result.rho, 0.0, epsilon = 1e-3);
        for x in 0..4 {
            assert!(decision(&k, &y, &result, x) * y[x] > 0.0);
        }
        let balance: f64 = result.alpha.iter().zip(&y).map(|(a, y)| a * y).sum();
        assert!(balance.abs() < 1e-9);
    }

    #[test]
    fn test_box_constraints_hold() {
        // Overlapping classes force bounded multipliers
        let points = [-1.0, 0.5, -0.5, 1.0, 0.1, -0.1];
        let y = [-1.0, -1.0, 1.0, 1.0, -1.0, 1.0];
        let k = linear_kernel(&points).map(|v| (v - 1.0).exp());
        let mut q = QMatrix::classification(&k, &y, 1 << 20).unwrap();
        let c = 0.5;

        let result = SmoSolver::new(&params())
            .solve(&mut q, &vec![-1.0; 6], &y, c)
            .unwrap();
        assert!(result.alpha.iter().all(|&a| (0.0..=c).contains(&a)));
        assert!(result.objective_value < 0.0);
    }

    #[test]
    fn test_shrinking_matches_plain_solution() {
        let points: Vec<f64> = (0..40).map(|i| (i as f64 - 20.0) / 5.0).collect();
        let y: Vec<f64> = points
            .iter()
            .map(|&x| if x + 0.3 * (x * 7.0).sin() > 0.0 { 1.0 } else { -1.0 })
            .collect();
        let k = Matrix::from_rows(
            points
                .iter()
                .map(|a| points.iter().map(|b| (-(a - b).powi(2)).exp()).collect())
                .collect(),
        )
        .unwrap();
        let p = vec![-1.0; 40];

        let mut plain_params = params();
        plain_params.shrinking = false;
        let mut shrink_params = params();
        shrink_params.shrinking_iterations = 5;

        let mut q1 = QMatrix::classification(&k, &y, 1 << 20).unwrap();
        let plain = SmoSolver::new(&plain_params).solve(&mut q1, &p, &y, 1.0).unwrap();
        let mut q2 = QMatrix::classification(&k, &y, 1 << 20).unwrap();
        let shrunk = SmoSolver::new(&shrink_params).solve(&mut q2, &p, &y, 1.0).unwrap();

        assert_relative_eq!(plain.objective_value, shrunk.objective_value, epsilon = 1e-3);
    }

    #[test]
    fn test_iteration_budget_exhausted() {
        let points: Vec<f64> = (0..30).map(|i| i as f64 / 10.0).collect();
        let y: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let k = linear_kernel(&points);
        let mut q = QMatrix::classification(&k, &y, 1 << 20).unwrap();
        let tight = SvmParams {
            max_iterations: 1,
            shrinking: false,
            ..params()
        };

        let result = SmoSolver::new(&tight).solve(&mut q, &vec![-1.0; 30], &y, 100.0);
        assert!(matches!(
            result,
            Err(SdmError::SolverDidNotConverge { iterations: 1 })
        ));
    }

    #[test]
    fn test_rejects_mismatched_problem() {
        let k = linear_kernel(&[1.0, 2.0]);
        let mut q = QMatrix::classification(&k, &[1.0, -1.0], 1024).unwrap();
        let solver = SmoSolver::new(&params());
        assert!(solver.solve(&mut q, &[-1.0], &[1.0, -1.0], 1.0).is_err());
        assert!(solver.solve(&mut q, &[-1.0, -1.0], &[1.0, -1.0], 0.0).is_err());
    }
}
