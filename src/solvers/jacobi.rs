//! Projected Jacobi iteration with block-scalar diagonal scaling.

use crate::{
    config::SolverType,
    error::SolverResult,
    solvers::{
        block_inverse_diagonal, finish_projected, record_projected, SchurSystem, SolverEngine,
        SolverState,
    },
    utils::math::Real,
};

/// Under-relaxation keeping simultaneous block updates stable.
pub const JACOBI_OMEGA: Real = 0.3;

#[derive(Debug)]
pub struct Jacobi {
    state: SolverState,
    pub omega: Real,
}

impl Default for Jacobi {
    fn default() -> Self {
        Self {
            state: SolverState::default(),
            omega: JACOBI_OMEGA,
        }
    }
}

impl SolverEngine for Jacobi {
    fn solver_type(&self) -> SolverType {
        SolverType::Jacobi
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
        let omega = self.omega;
        let state = &mut self.state;
        state.begin_solve();
        let n = system.len();

        system.project(gamma);
        let scale = block_inverse_diagonal(system, &system.diagonal());
        let mut g = vec![0.0; n];
        system.gradient(gamma, &mut g);
        let mut residual = system.residual_with_gradient(gamma, &g);

        let mut previous = vec![0.0; n];
        while state.current_iteration < state.max_iteration && residual > tolerance {
            previous.copy_from_slice(gamma);
            for ((value, g), s) in gamma.iter_mut().zip(&g).zip(&scale) {
                *value -= omega * s * g;
            }
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
    fn converges_linearly_on_single_contact() {
        let fixture = test_support::single_contact();
        let mut engine = Jacobi::default();
        engine.set_max_iterations(200);
        let mut gamma = vec![0.0];
        engine.solve(&fixture.system(), &mut gamma, 1e-8).unwrap();
        assert_relative_eq!(gamma[0], 1.0, epsilon = 1e-7);
        // Error contracts by (1 - omega) per sweep.
        assert!(engine.iteration() > 10);
    }

    #[test]
    fn bilateral_chain_converges() {
        let fixture = test_support::bilateral_chain();
        let mut engine = Jacobi::default();
        engine.set_max_iterations(500);
        let mut gamma = vec![0.0; 2];
        engine.solve(&fixture.system(), &mut gamma, 1e-9).unwrap();
        assert_relative_eq!(gamma[0], 1.0, epsilon = 1e-7);
        assert_relative_eq!(gamma[1], 2.0, epsilon = 1e-7);
    }
}
