//! Stabilized biconjugate gradient on the active subspace, projected once on exit.

use crate::{
    config::SolverType,
    error::SolverResult,
    solvers::{
        cg::{masked_rhs, KrylovOutcome},
        finish_unprojected, record_unprojected, SchurSystem, SolverEngine, SolverState,
    },
    utils::math::{dot, norm_inf, Real},
};

pub fn biconjugate_gradient_stab<A, F>(
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

    let (mut rho, mut alpha, mut omega) = (1.0, 1.0, 1.0);
    let mut v = vec![0.0; n];
    let mut p = vec![0.0; n];
    let mut s = vec![0.0; n];
    let mut t = vec![0.0; n];
    let mut iterations = 0;

    while iterations < max_iterations && residual > tolerance {
        let rho_new = dot(&shadow, &r);
        if rho_new == 0.0 || omega == 0.0 || !rho_new.is_finite() {
            break;
        }
        let beta = (rho_new / rho) * (alpha / omega);
        for i in 0..n {
            p[i] = r[i] + beta * (p[i] - omega * v[i]);
        }
        apply(&p, &mut v);
        let sigma = dot(&shadow, &v);
        if sigma == 0.0 || !sigma.is_finite() {
            break;
        }
        alpha = rho_new / sigma;
        for i in 0..n {
            s[i] = r[i] - alpha * v[i];
        }
        rho = rho_new;
        iterations += 1;

        if norm_inf(&s) <= tolerance {
            for i in 0..n {
                x[i] += alpha * p[i];
            }
            r.copy_from_slice(&s);
            residual = norm_inf(&r);
            on_iteration(&*x, alpha.abs() * norm_inf(&p));
            break;
        }

        apply(&s, &mut t);
        let tt = dot(&t, &t);
        omega = if tt > 0.0 { dot(&t, &s) / tt } else { 0.0 };
        let mut delta: Real = 0.0;
        for i in 0..n {
            let step = alpha * p[i] + omega * s[i];
            x[i] += step;
            delta = delta.max(step.abs());
            r[i] = s[i] - omega * t[i];
        }
        residual = norm_inf(&r);
        on_iteration(&*x, delta);
    }

    KrylovOutcome {
        iterations,
        residual,
    }
}

#[derive(Debug, Default)]
pub struct BiconjugateGradientStab {
    state: SolverState,
}

impl SolverEngine for BiconjugateGradientStab {
    fn solver_type(&self) -> SolverType {
        SolverType::BiconjugateGradientStab
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
        biconjugate_gradient_stab(
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
