//! Minimum residual iteration (conjugate residual form) for the symmetric
//! Schur operator, projected once on exit.

use crate::{
    config::SolverType,
    error::SolverResult,
    solvers::{
        cg::{masked_rhs, KrylovOutcome},
        finish_unprojected, record_unprojected, SchurSystem, SolverEngine, SolverState,
    },
    utils::math::{axpy, dot, norm_inf, Real},
};

pub fn minimum_residual<A, F>(
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

    let mut p = r.clone();
    let mut ar = vec![0.0; n];
    apply(&r, &mut ar);
    let mut ap = ar.clone();
    let mut r_ar = dot(&r, &ar);
    let mut iterations = 0;

    while iterations < max_iterations && residual > tolerance {
        let ap_ap = dot(&ap, &ap);
        if ap_ap == 0.0 || !ap_ap.is_finite() {
            break;
        }
        let alpha = r_ar / ap_ap;
        axpy(alpha, &p, x);
        axpy(-alpha, &ap, &mut r);
        iterations += 1;

        residual = norm_inf(&r);
        on_iteration(&*x, alpha.abs() * norm_inf(&p));
        if residual <= tolerance {
            break;
        }

        apply(&r, &mut ar);
        let r_ar_new = dot(&r, &ar);
        if r_ar == 0.0 {
            break;
        }
        let beta = r_ar_new / r_ar;
        for i in 0..n {
            p[i] = r[i] + beta * p[i];
            ap[i] = ar[i] + beta * ap[i];
        }
        r_ar = r_ar_new;
    }

    KrylovOutcome {
        iterations,
        residual,
    }
}

#[derive(Debug, Default)]
pub struct MinimumResidual {
    state: SolverState,
}

impl SolverEngine for MinimumResidual {
    fn solver_type(&self) -> SolverType {
        SolverType::MinimumResidual
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
        minimum_residual(
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
