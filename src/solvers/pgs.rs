//! Projected Gauss-Seidel sweeping contact blocks, then bilateral rows.
//!
//! Keeps `M⁻¹D γ` up to date so each row update costs one sparse row product.

use crate::{
    config::SolverType,
    error::SolverResult,
    solvers::{
        block_inverse_diagonal, finish_projected, record_projected, SchurSystem, SolverEngine,
        SolverState,
    },
    utils::{
        math::Real,
        sparse::{row_axpy, row_dot_dense, spmv},
    },
};

#[derive(Debug)]
pub struct GaussSeidel {
    state: SolverState,
    pub omega: Real,
}

impl Default for GaussSeidel {
    fn default() -> Self {
        Self {
            state: SolverState::default(),
            omega: 1.0,
        }
    }
}

impl GaussSeidel {
    fn row_gradient(system: &SchurSystem<'_>, velocity: &[Real], gamma: &[Real], row: usize) -> Real {
        row_dot_dense(system.d_t(), row, velocity) + system.e()[row] * gamma[row] - system.r()[row]
    }

    fn sweep(
        &self,
        system: &SchurSystem<'_>,
        scale: &[Real],
        velocity: &mut [Real],
        gamma: &mut [Real],
    ) {
        let offset = system.block_size();
        let mut block = [0.0; 6];
        for contact in 0..system.num_contacts() {
            let start = contact * offset;
            let trial = &mut block[..offset];
            for (k, value) in trial.iter_mut().enumerate() {
                let row = start + k;
                *value = if system.is_row_active(row) {
                    let g = Self::row_gradient(system, velocity, gamma, row);
                    gamma[row] - self.omega * scale[row] * g
                } else {
                    0.0
                };
            }
            system.contacts().project_block(contact, trial);
            for (k, value) in trial.iter().enumerate() {
                let row = start + k;
                let delta = value - gamma[row];
                if delta != 0.0 {
                    row_axpy(system.m_inv_d_t(), row, delta, velocity);
                    gamma[row] = *value;
                }
            }
        }

        for row in system.num_unilaterals()..system.len() {
            if scale[row] == 0.0 {
                continue;
            }
            let g = Self::row_gradient(system, velocity, gamma, row);
            let delta = -self.omega * scale[row] * g;
            row_axpy(system.m_inv_d_t(), row, delta, velocity);
            gamma[row] += delta;
        }
    }
}

impl SolverEngine for GaussSeidel {
    fn solver_type(&self) -> SolverType {
        SolverType::GaussSeidel
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
        self.state.begin_solve();
        let n = system.len();

        system.project(gamma);
        let scale = block_inverse_diagonal(system, &system.diagonal());
        let mut velocity = vec![0.0; system.num_dof()];
        spmv(system.m_inv_d(), gamma, &mut velocity);

        let mut g = vec![0.0; n];
        system.gradient(gamma, &mut g);
        let mut residual = system.residual_with_gradient(gamma, &g);

        let mut previous = vec![0.0; n];
        while self.state.current_iteration < self.state.max_iteration && residual > tolerance {
            previous.copy_from_slice(gamma);
            self.sweep(system, &scale, &mut velocity, gamma);
            residual = record_projected(&mut self.state, system, gamma, &previous, &mut g);
        }

        finish_projected(&mut self.state, system, gamma, &g, residual);
        Ok(())
    }
}
