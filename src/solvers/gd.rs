//! Projected gradient descent with a fixed `1 / L` step.

use crate::{
    config::SolverType,
    error::SolverResult,
    solvers::{
        finish_projected, record_projected, SchurSystem, SolverEngine, SolverState,
        LIPSCHITZ_POWER_ITERATIONS,
    },
    utils::math::{axpy, Real},
};

#[derive(Debug, Default)]
pub struct GradientDescent {
    state: SolverState,
}

impl SolverEngine for GradientDescent {
    fn solver_type(&self) -> SolverType {
        SolverType::GradientDescent
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
        let mut g = vec![0.0; n];
        system.gradient(gamma, &mut g);
        let mut residual = system.residual_with_gradient(gamma, &g);

        let lipschitz = system.estimate_lipschitz(LIPSCHITZ_POWER_ITERATIONS);
        if lipschitz <= 0.0 || !lipschitz.is_finite() {
            finish_projected(state, system, gamma, &g, residual);
            return Ok(());
        }
        let step = 1.0 / lipschitz;

        let mut previous = vec![0.0; n];
        while state.current_iteration < state.max_iteration && residual > tolerance {
            previous.copy_from_slice(gamma);
            axpy(-step, &g, gamma);
            system.project(gamma);
            residual = record_projected(state, system, gamma, &previous, &mut g);
        }

        finish_projected(state, system, gamma, &g, residual);
        Ok(())
    }
}
