//! Conjugate gradient squared on the active subspace, projected once on exit.

use crate::{
    config::SolverType,
    error::SolverResult,
    solvers::{
        cg::{masked_rhs, KrylovOutcome},
        finish_unprojected, record_unprojected, SchurSystem, SolverEngine, SolverState,
    },
    utils::math::{axpy, dot, norm_inf, Real},
};

pub fn conjugate_gradient_squared<A, F>(
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
    let shadow = r.clone();

    let mut u = vec![0.0; n];
    let mut p = vec![0.0; n];
    let mut q = vec![0.0; n];
    let mut v = vec![0.0; n];
    let mut u_hat = vec![0.0; n];
    let mut rho_prev = 1.0;
    let mut iterations = 0;

    while iterations < max_iterations && residual > tolerance {
        let rho = dot(&shadow, &r);
        if rho == 0.0 || !rho.is_finite() {
            break;
        }
        if iterations == 0 {
            u.copy_from_slice(&r);
            p.copy_from_slice(&r);
        } else {
            let beta = rho / rho_prev;
            for i in 0..n {
                u[i] = r[i] + beta * q[i];
                p[i] = u[i] + beta * (q[i] + beta * p[i]);
            }
        }

        apply(&p, &mut v);
        let sigma = dot(&shadow, &v);
        if sigma == 0.0 || !sigma.is_finite() {
            break;
        }
        let alpha = rho / sigma;
        for i in 0..n {
            q[i] = u[i] - alpha * v[i];
            u_hat[i] = u[i] + q[i];
        }
        axpy(alpha, &u_hat, x);
        apply(&u_hat, &mut v);
        axpy(-alpha, &v, &mut r);
        rho_prev = rho;
        iterations += 1;

        residual = norm_inf(&r);
        on_iteration(&*x, alpha.abs() * norm_inf(&u_hat));
    }

    KrylovOutcome {
        iterations,
        residual,
    }
}

#[derive(Debug, Default)]
pub struct ConjugateGradientSquared {
    state: SolverState,
}

impl SolverEngine for ConjugateGradientSquared {
    fn solver_type(&self) -> SolverType {
        SolverType::ConjugateGradientSquared
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
        conjugate_gradient_squared(
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solvers::test_support;
    use approx::assert_relative_eq;

    #[test]
    fn solves_bilateral_chain() {
        let fixture = test_support::bilateral_chain();
        let mut engine = ConjugateGradientSquared::default();
        engine.set_max_iterations(20);
        let mut gamma = vec![0.0; 2];
        engine.solve(&fixture.system(), &mut gamma, 1e-10).unwrap();
        assert_relative_eq!(gamma[0], 1.0, epsilon = 1e-8);
        assert_relative_eq!(gamma[1], 2.0, epsilon = 1e-8);
    }
}
