//! Projected steepest descent with an exact line search along the gradient.

use crate::{
    config::SolverType,
    error::SolverResult,
    solvers::{finish_projected, record_projected, SchurSystem, SolverEngine, SolverState},
    utils::math::{axpy, dot, Real},
};

#[derive(Debug, Default)]
pub struct SteepestDescent {
    state: SolverState,
}

impl SolverEngine for SteepestDescent {
    fn solver_type(&self) -> SolverType {
        SolverType::SteepestDescent
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

        let mut ng = vec![0.0; n];
        let mut previous = vec![0.0; n];
        while state.current_iteration < state.max_iteration && residual > tolerance {
            system.apply(&g, &mut ng);
            let curvature = dot(&g, &ng);
            if curvature <= 0.0 || !curvature.is_finite() {
                break;
            }
            let step = dot(&g, &g) / curvature;

            previous.copy_from_slice(gamma);
            axpy(-step, &g, gamma);
            system.project(gamma);
            residual = record_projected(state, system, gamma, &previous, &mut g);
        }

        finish_projected(state, system, gamma, &g, residual);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solvers::test_support;
    use approx::assert_relative_eq;

    #[test]
    fn single_contact_converges_in_one_step() {
        let fixture = test_support::single_contact();
        let mut engine = SteepestDescent::default();
        engine.set_max_iterations(10);
        let mut gamma = vec![0.0];
        engine.solve(&fixture.system(), &mut gamma, 1e-10).unwrap();
        assert_relative_eq!(gamma[0], 1.0, epsilon = 1e-12);
        assert_eq!(engine.iteration(), 1);
    }

    #[test]
    fn bilateral_chain_reaches_tolerance() {
        let fixture = test_support::bilateral_chain();
        let mut engine = SteepestDescent::default();
        engine.set_max_iterations(200);
        let mut gamma = vec![0.0; 2];
        engine.solve(&fixture.system(), &mut gamma, 1e-9).unwrap();
        assert_relative_eq!(gamma[1], 2.0, epsilon = 1e-8);
    }
}
