//! Conjugate gradient on the active subspace, projected once on exit.

use crate::{
    config::SolverType,
    error::SolverResult,
    solvers::{finish_unprojected, record_unprojected, SchurSystem, SolverEngine, SolverState},
    utils::math::{axpy, dot, norm_inf, Real},
};

/// Outcome of a linear Krylov solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KrylovOutcome {
    pub iterations: usize,
    /// Infinity norm of the final linear residual.
    pub residual: Real,
}

/// Plain CG for a symmetric positive semidefinite operator.
///
/// `on_iteration` receives the current iterate and the largest change of `x`
/// after every iteration.
pub fn conjugate_gradient<A, F>(
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
    if residual <= tolerance {
        return KrylovOutcome {
            iterations: 0,
            residual,
        };
    }

    let mut p = r.clone();
    let mut ap = vec![0.0; n];
    let mut rs_old = dot(&r, &r);
    let mut iterations = 0;

    while iterations < max_iterations {
        apply(&p, &mut ap);
        let p_ap = dot(&p, &ap);
        if p_ap <= 0.0 || !p_ap.is_finite() {
            break;
        }
        let alpha = rs_old / p_ap;
        axpy(alpha, &p, x);
        axpy(-alpha, &ap, &mut r);
        iterations += 1;

        residual = norm_inf(&r);
        on_iteration(&*x, alpha.abs() * norm_inf(&p));
        if residual <= tolerance {
            break;
        }

        let rs_new = dot(&r, &r);
        let beta = rs_new / rs_old;
        for (pi, ri) in p.iter_mut().zip(&r) {
            *pi = ri + beta * *pi;
        }
        rs_old = rs_new;
    }

    KrylovOutcome {
        iterations,
        residual,
    }
}

/// `R` restricted to the active rows.
pub(crate) fn masked_rhs(system: &SchurSystem<'_>) -> Vec<Real> {
    let mut rhs = system.r().to_vec();
    system.mask(&mut rhs);
    rhs
}

#[derive(Debug, Default)]
pub struct ConjugateGradient {
    state: SolverState,
}

impl SolverEngine for ConjugateGradient {
    fn solver_type(&self) -> SolverType {
        SolverType::ConjugateGradient
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
        conjugate_gradient(
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
    fn solves_bilateral_chain_in_two_iterations() {
        let fixture = test_support::bilateral_chain();
        let mut engine = ConjugateGradient::default();
        engine.set_max_iterations(10);
        let mut gamma = vec![0.0; 2];
        engine.solve(&fixture.system(), &mut gamma, 1e-10).unwrap();
        assert_relative_eq!(gamma[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(gamma[1], 2.0, epsilon = 1e-9);
        assert!(engine.iteration() <= 2);
        assert!(engine.residual() < 1e-9);
        assert_relative_eq!(engine.state().objective_value, -3.0, epsilon = 1e-9);
        assert!(*engine.state().max_violation_history.last().unwrap() < 1e-9);
    }

    #[test]
    fn history_tracks_separation_not_linear_residual() {
        // N = [[2, 1], [1, 1]], R = [1, 0]: one CG step lands on x = [0.5, 0]
        // with linear residual 0.5 but both contacts separating.
        #[rustfmt::skip]
        let d_t = [
            1.0, 1.0,
            0.0, 1.0,
        ];
        let fixture = test_support::custom(2, 2, &d_t, &[1.0, 1.0], &[0.0, 0.0], vec![1.0, 0.0], 2);
        let mut engine = ConjugateGradient::default();
        engine.set_max_iterations(1);
        let mut gamma = vec![0.0; 2];
        engine.solve(&fixture.system(), &mut gamma, 1e-12).unwrap();
        let state = engine.state();
        assert_eq!(state.max_violation_history.len(), 1);
        assert_relative_eq!(state.max_violation_history[0], 0.0, epsilon = 1e-15);
        assert_relative_eq!(state.max_delta_gamma_history[0], 0.5, epsilon = 1e-15);
    }

    #[test]
    fn kernel_reports_zero_iterations_when_already_converged() {
        let outcome = conjugate_gradient(
            |x, out: &mut [Real]| out.copy_from_slice(x),
            &[1.0, 2.0],
            &mut [1.0, 2.0],
            5,
            1e-12,
            |_, _| {},
        );
        assert_eq!(outcome.iterations, 0);
    }
}
