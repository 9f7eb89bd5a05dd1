//! Biconjugate gradient on the active subspace, projected once on exit.
//!
//! `N` is symmetric, so the shadow recurrence reuses the same operator.

use crate::{
    config::SolverType,
    error::SolverResult,
    solvers::{
        cg::{masked_rhs, KrylovOutcome},
        finish_unprojected, record_unprojected, SchurSystem, SolverEngine, SolverState,
    },
    utils::math::{axpy, dot, norm_inf, Real},
};

pub fn biconjugate_gradient<A, F>(
    apply: A,
    rhs: &[Real],
    x: &mut [Real],
    max_iterations: usize,
    tolerance: Real,
    mut on_iteration: F,
) -> KrylovOutcome
where
    A: Fn(&[Real], &mut [Real]),
    F: FnMut(&[Real], Real),
{
    let n = rhs.len();
    let mut r = vec![0.0; n];
    apply(x, &mut r);
    for (ri, bi) in r.iter_mut().zip(rhs) {
        *ri = bi - *ri;
    }
    let mut residual = norm_inf(&r);

    let mut shadow = r.clone();
    let mut p = r.clone();
    let mut p_shadow = shadow.clone();
    let mut q = vec![0.0; n];
    let mut q_shadow = vec![0.0; n];
    let mut rho = dot(&shadow, &r);
    let mut iterations = 0;

    while iterations < max_iterations && residual > tolerance {
        apply(&p, &mut q);
        apply(&p_shadow, &mut q_shadow);
        let sigma = dot(&p_shadow, &q);
        if sigma == 0.0 || !sigma.is_finite() {
            break;
        }
        let alpha = rho / sigma;
        axpy(alpha, &p, x);
        axpy(-alpha, &q, &mut r);
        axpy(-alpha, &q_shadow, &mut shadow);
        iterations += 1;

        residual = norm_inf(&r);
        on_iteration(&*x, alpha.abs() * norm_inf(&p));

        let rho_new = dot(&shadow, &r);
        if rho_new == 0.0 {
            break;
        }
        let beta = rho_new / rho;
        for i in 0..n {
            p[i] = r[i] + beta * p[i];
            p_shadow[i] = shadow[i] + beta * p_shadow[i];
        }
        rho = rho_new;
    }

    KrylovOutcome {
        iterations,
        residual,
    }
}

#[derive(Debug, Default)]
pub struct BiconjugateGradient {
    state: SolverState,
}

impl SolverEngine for BiconjugateGradient {
    fn solver_type(&self) -> SolverType {
        SolverType::BiconjugateGradient
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
        system.mask(gamma);
        let rhs = masked_rhs(system);

        let max_iterations = state.max_iteration;
        let mut g = vec![0.0; system.len()];
        biconjugate_gradient(
            |x, out| system.apply(x, out),
            &rhs,
            gamma,
            max_iterations,
            tolerance,
            |x, delta| record_unprojected(state, system, x, &mut g, delta),
        );

        finish_unprojected(state, system, gamma);
        Ok(())
    }
}
