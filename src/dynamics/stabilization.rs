//! Bilateral pre-solve run before each phase with contact impulses frozen.

use crate::{
    solvers::{cg::conjugate_gradient, SchurSystem},
    utils::math::Real,
};

/// Solves `N_bb γ_b = R_b - N_bu γ_u` by CG, updating only the bilateral
/// slice of `gamma`. Returns the number of iterations spent.
pub fn stabilize_bilaterals(
    system: &SchurSystem<'_>,
    gamma: &mut [Real],
    max_iterations: usize,
    tolerance: Real,
) -> usize {
    let n = system.len();
    let nu = system.num_unilaterals();
    if max_iterations == 0 || nu == n {
        return 0;
    }

    let mut contacts_only = gamma.to_vec();
    contacts_only[nu..].fill(0.0);
    let mut coupling = vec![0.0; n];
    system.apply(&contacts_only, &mut coupling);
    let rhs: Vec<Real> = (nu..n).map(|i| system.r()[i] - coupling[i]).collect();

    let apply = |x: &[Real], out: &mut [Real]| {
        let mut full = vec![0.0; n];
        full[nu..].copy_from_slice(x);
        let mut product = vec![0.0; n];
        system.apply(&full, &mut product);
        out.copy_from_slice(&product[nu..]);
    };

    let outcome = conjugate_gradient(
        apply,
        &rhs,
        &mut gamma[nu..],
        max_iterations,
        tolerance,
        |_, _| {},
    );
    log::trace!(
        "bilateral stabilization: {} iterations, residual {:.3e}",
        outcome.iterations,
        outcome.residual
    );
    outcome.iterations
}
