//! Accelerated projected gradient descent.
//!
//! Nesterov momentum with a backtracking estimate of the Lipschitz constant,
//! gradient-based restarts, and a running best iterate: the returned impulses
//! are those with the smallest residual seen, not merely the last ones.

use crate::{
    config::SolverType,
    error::SolverResult,
    solvers::{
        finish_projected, max_delta, SchurSystem, SolverEngine, SolverState,
        LIPSCHITZ_POWER_ITERATIONS,
    },
    utils::math::Real,
};

/// Maximum doublings of the Lipschitz estimate within one iteration.
const BACKTRACK_LIMIT: usize = 40;

/// Relaxation of the Lipschitz estimate after an accepted step.
const LIPSCHITZ_DECAY: Real = 0.9;

#[derive(Debug, Default)]
pub struct Apgd {
    state: SolverState,
}

impl SolverEngine for Apgd {
    fn solver_type(&self) -> SolverType {
        SolverType::Apgd
    }

    fn state(&self) -> &SolverState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SolverState {
        &mut self.state
    }

    fn solve(
        &mut self,
        system: &SchurSystem<'_>,
        gamma: &mut [Real],
        tolerance: Real,
    ) -> SolverResult<()> {
        let state = &mut self.state;
        state.begin_solve();
        let n = system.len();

        system.project(gamma);
        let mut g_x = vec![0.0; n];
        system.gradient(gamma, &mut g_x);
        let residual = system.residual_with_gradient(gamma, &g_x);

        let mut lipschitz = system.estimate_lipschitz(LIPSCHITZ_POWER_ITERATIONS);
        if residual <= tolerance || lipschitz <= 0.0 || !lipschitz.is_finite() {
            finish_projected(state, system, gamma, &g_x, residual);
            return Ok(());
        }

        let mut x = gamma.to_vec();
        let mut y = gamma.to_vec();
        let mut best = gamma.to_vec();
        let mut best_residual = residual;
        let mut theta: Real = 1.0;

        let mut g_y = vec![0.0; n];
        let mut x_new = vec![0.0; n];

        while state.current_iteration < state.max_iteration {
            system.gradient(&y, &mut g_y);
            let objective_y = system.objective_with_gradient(&y, &g_y);

            let mut backtracks = 0;
            loop {
                let step = 1.0 / lipschitz;
                for i in 0..n {
                    x_new[i] = y[i] - step * g_y[i];
                }
                system.project(&mut x_new);
                system.gradient(&x_new, &mut g_x);
                let objective_x = system.objective_with_gradient(&x_new, &g_x);

                let (mut linear, mut quadratic) = (0.0, 0.0);
                for i in 0..n {
                    let d = x_new[i] - y[i];
                    linear += g_y[i] * d;
                    quadratic += d * d;
                }
                let bound = objective_y + linear + 0.5 * lipschitz * quadratic;
                if objective_x <= bound || backtracks >= BACKTRACK_LIMIT {
                    break;
                }
                lipschitz *= 2.0;
                backtracks += 1;
            }

            let theta_sq = theta * theta;
            let theta_new = 0.5 * (-theta_sq + theta * (theta_sq + 4.0).sqrt());
            let beta = theta * (1.0 - theta) / (theta_sq + theta_new);

            let uphill: Real = (0..n).map(|i| g_y[i] * (x_new[i] - x[i])).sum();
            if uphill > 0.0 {
                y.copy_from_slice(&x_new);
                theta = 1.0;
            } else {
                for i in 0..n {
                    y[i] = x_new[i] + beta * (x_new[i] - x[i]);
                }
                theta = theta_new;
            }
            lipschitz *= LIPSCHITZ_DECAY;

            let residual = system.residual_with_gradient(&x_new, &g_x);
            state.at_iteration_end(system.max_violation(&g_x), max_delta(&x_new, &x));
            x.copy_from_slice(&x_new);

            if residual < best_residual {
                best_residual = residual;
                best.copy_from_slice(&x);
            }
            if residual <= tolerance || !residual.is_finite() {
                break;
            }
        }

        gamma.copy_from_slice(&best);
        system.gradient(gamma, &mut g_x);
        finish_projected(state, system, gamma, &g_x, best_residual);
        Ok(())
    }
}
