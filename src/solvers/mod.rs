//! Iterative methods for the cone complementarity problem.
//!
//! Every engine solves `min ½ γᵀNγ - γᵀR` over the admissible cone, with
//! `N = D_T M⁻¹ D + diag(E)` applied matrix-free through [`SchurSystem`].
//! Rows that are not part of the current phase are masked out of every
//! product, so an engine only ever sees the active subspace.

pub mod apgd;
pub mod bicg;
pub mod bicgstab;
pub mod cg;
pub mod cgs;
pub mod gd;
pub mod jacobi;
pub mod minres;
pub mod pdip;
pub mod pgs;
pub mod sd;

use std::fmt;

use nalgebra_sparse::CsrMatrix;

use crate::{
    config::SolverType,
    dynamics::contact_builder::ContactBuilder,
    error::{SolverError, SolverResult},
    utils::{
        math::{dot, norm_inf, Real},
        sparse::{row_dot, spmv},
    },
};

pub use apgd::Apgd;
pub use bicg::BiconjugateGradient;
pub use bicgstab::BiconjugateGradientStab;
pub use cg::ConjugateGradient;
pub use cgs::ConjugateGradientSquared;
pub use gd::GradientDescent;
pub use jacobi::Jacobi;
pub use minres::MinimumResidual;
pub use pdip::PrimalDualInteriorPoint;
pub use pgs::GaussSeidel;
pub use sd::SteepestDescent;

/// Power iterations used to bound the largest eigenvalue of `N`.
pub const LIPSCHITZ_POWER_ITERATIONS: usize = 30;

/// Read-only view of the assembled Schur complement system for one phase.
#[derive(Clone, Copy)]
pub struct SchurSystem<'a> {
    d_t: &'a CsrMatrix<Real>,
    m_inv_d: &'a CsrMatrix<Real>,
    m_inv_d_t: &'a CsrMatrix<Real>,
    e: &'a [Real],
    r: &'a [Real],
    contacts: &'a ContactBuilder,
    num_unilaterals: usize,
}

impl fmt::Debug for SchurSystem<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchurSystem")
            .field("num_constraints", &self.len())
            .field("num_unilaterals", &self.num_unilaterals)
            .field("num_dof", &self.num_dof())
            .finish()
    }
}

impl<'a> SchurSystem<'a> {
    pub fn new(
        d_t: &'a CsrMatrix<Real>,
        m_inv_d: &'a CsrMatrix<Real>,
        m_inv_d_t: &'a CsrMatrix<Real>,
        e: &'a [Real],
        r: &'a [Real],
        contacts: &'a ContactBuilder,
        num_unilaterals: usize,
    ) -> Self {
        Self {
            d_t,
            m_inv_d,
            m_inv_d_t,
            e,
            r,
            contacts,
            num_unilaterals,
        }
    }

    /// Number of constraint rows.
    pub fn len(&self) -> usize {
        self.r.len()
    }

    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }

    pub fn num_unilaterals(&self) -> usize {
        self.num_unilaterals
    }

    pub fn num_dof(&self) -> usize {
        self.d_t.ncols()
    }

    pub fn d_t(&self) -> &'a CsrMatrix<Real> {
        self.d_t
    }

    pub fn m_inv_d(&self) -> &'a CsrMatrix<Real> {
        self.m_inv_d
    }

    /// Row `i` holds column `i` of `M⁻¹D`.
    pub fn m_inv_d_t(&self) -> &'a CsrMatrix<Real> {
        self.m_inv_d_t
    }

    pub fn e(&self) -> &'a [Real] {
        self.e
    }

    pub fn r(&self) -> &'a [Real] {
        self.r
    }

    pub fn contacts(&self) -> &'a ContactBuilder {
        self.contacts
    }

    /// Rows per contact block.
    pub fn block_size(&self) -> usize {
        self.contacts.offset
    }

    pub fn num_contacts(&self) -> usize {
        self.num_unilaterals / self.block_size().max(1)
    }

    pub fn is_row_active(&self, row: usize) -> bool {
        row >= self.num_unilaterals || self.contacts.is_row_active(row % self.block_size())
    }

    /// Zeroes every row outside the current phase.
    pub fn mask(&self, x: &mut [Real]) {
        let offset = self.block_size();
        for (row, value) in x[..self.num_unilaterals].iter_mut().enumerate() {
            if !self.contacts.is_row_active(row % offset) {
                *value = 0.0;
            }
        }
    }

    /// `out = N x` restricted to the active rows.
    pub fn apply(&self, x: &[Real], out: &mut [Real]) {
        let mut masked = x.to_vec();
        self.mask(&mut masked);

        let mut velocity = vec![0.0; self.num_dof()];
        spmv(self.m_inv_d, &masked, &mut velocity);
        spmv(self.d_t, &velocity, out);
        for ((value, e), x) in out.iter_mut().zip(self.e).zip(&masked) {
            *value += e * x;
        }
        self.mask(out);
    }

    /// `g = N γ - R`
    pub fn gradient(&self, gamma: &[Real], g: &mut [Real]) {
        self.apply(gamma, g);
        for (value, r) in g.iter_mut().zip(self.r) {
            *value -= r;
        }
        self.mask(g);
    }

    /// Projects contact blocks onto their cones; bilateral rows are free.
    pub fn project(&self, gamma: &mut [Real]) {
        self.contacts.project(&mut gamma[..self.num_unilaterals]);
    }

    /// Diagonal of `N` on the active rows, zero elsewhere.
    pub fn diagonal(&self) -> Vec<Real> {
        (0..self.len())
            .map(|i| {
                if self.is_row_active(i) {
                    row_dot(self.d_t, i, self.m_inv_d_t, i) + self.e[i]
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// `½ γᵀNγ - γᵀR`
    pub fn objective(&self, gamma: &[Real]) -> Real {
        let mut g = vec![0.0; self.len()];
        self.gradient(gamma, &mut g);
        self.objective_with_gradient(gamma, &g)
    }

    /// Objective evaluated from a gradient already computed at `gamma`.
    pub fn objective_with_gradient(&self, gamma: &[Real], g: &[Real]) -> Real {
        let gr: Real = gamma
            .iter()
            .zip(g)
            .zip(self.r)
            .enumerate()
            .filter(|(i, _)| self.is_row_active(*i))
            .map(|(_, ((x, g), r))| x * (g - r))
            .sum();
        0.5 * gr
    }

    /// Natural-map residual `‖γ - Π(γ - g)‖_∞` over the active rows.
    pub fn residual(&self, gamma: &[Real]) -> Real {
        let mut g = vec![0.0; self.len()];
        self.gradient(gamma, &mut g);
        self.residual_with_gradient(gamma, &g)
    }

    pub fn residual_with_gradient(&self, gamma: &[Real], g: &[Real]) -> Real {
        let mut trial: Vec<Real> = gamma.iter().zip(g).map(|(x, g)| x - g).collect();
        self.project(&mut trial);
        gamma
            .iter()
            .zip(&trial)
            .enumerate()
            .filter(|(i, _)| self.is_row_active(*i))
            .fold(0.0, |acc, (_, (x, t))| acc.max((x - t).abs()))
    }

    /// Largest separating velocity error: penetration on normal rows and
    /// drift on bilateral rows.
    pub fn max_violation(&self, g: &[Real]) -> Real {
        let offset = self.block_size();
        let normal = (0..self.num_contacts())
            .map(|c| (-g[c * offset]).max(0.0))
            .fold(0.0, Real::max);
        normal.max(norm_inf(&g[self.num_unilaterals..]))
    }

    /// Power-iteration estimate of the largest eigenvalue of `N`.
    pub fn estimate_lipschitz(&self, iterations: usize) -> Real {
        let n = self.len();
        // Uneven start vector so symmetric eigenvectors are not missed.
        let mut x: Vec<Real> = (0..n).map(|i| 1.0 / (i + 1) as Real).collect();
        self.mask(&mut x);
        let mut y = vec![0.0; n];
        let mut estimate = 0.0;
        for _ in 0..iterations {
            let norm = dot(&x, &x).sqrt();
            if norm == 0.0 {
                return 0.0;
            }
            x.iter_mut().for_each(|v| *v /= norm);
            self.apply(&x, &mut y);
            estimate = dot(&x, &y);
            std::mem::swap(&mut x, &mut y);
        }
        estimate
    }
}

/// Iteration telemetry owned by an engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolverState {
    pub current_iteration: usize,
    pub total_iteration: usize,
    pub max_iteration: usize,
    pub residual: Real,
    pub objective_value: Real,
    /// Number of `solve` calls since the last reset.
    pub solve_calls: usize,
    /// Largest normal penetration or bilateral drift velocity, `Nγ - R`
    /// evaluated at each iterate.
    pub max_violation_history: Vec<Real>,
    pub max_delta_gamma_history: Vec<Real>,
    /// Value of `total_iteration` after each recorded iteration.
    pub iteration_history: Vec<usize>,
}

impl SolverState {
    pub fn with_max_iterations(max_iteration: usize) -> Self {
        Self {
            max_iteration,
            ..Self::default()
        }
    }

    /// Clears per-solve counters; totals and histories keep accumulating.
    pub fn begin_solve(&mut self) {
        self.current_iteration = 0;
        self.residual = 0.0;
        self.solve_calls += 1;
    }

    pub fn at_iteration_end(&mut self, max_violation: Real, max_delta_gamma: Real) {
        self.current_iteration += 1;
        self.total_iteration += 1;
        self.max_violation_history.push(max_violation);
        self.max_delta_gamma_history.push(max_delta_gamma);
        self.iteration_history.push(self.total_iteration);
    }

    /// Forgets everything except the iteration budget.
    pub fn reset(&mut self) {
        *self = Self::with_max_iterations(self.max_iteration);
    }
}

/// One interchangeable iterative method.
pub trait SolverEngine: Send + Sync + fmt::Debug {
    fn solver_type(&self) -> SolverType;

    fn state(&self) -> &SolverState;

    fn state_mut(&mut self) -> &mut SolverState;

    /// Improves `gamma` until the residual drops below `tolerance` or the
    /// iteration budget is spent. Exhausting the budget is not an error.
    fn solve(
        &mut self,
        system: &SchurSystem<'_>,
        gamma: &mut [Real],
        tolerance: Real,
    ) -> SolverResult<()>;

    fn set_max_iterations(&mut self, max_iterations: usize) {
        self.state_mut().max_iteration = max_iterations;
    }

    fn iteration(&self) -> usize {
        self.state().current_iteration
    }

    fn total_iteration(&self) -> usize {
        self.state().total_iteration
    }

    fn residual(&self) -> Real {
        self.state().residual
    }

    fn reset(&mut self) {
        self.state_mut().reset();
    }
}

/// Builds the engine for `solver_type`.
pub fn create_engine(solver_type: SolverType) -> SolverResult<Box<dyn SolverEngine>> {
    let engine: Box<dyn SolverEngine> = match solver_type {
        SolverType::SteepestDescent => Box::new(SteepestDescent::default()),
        SolverType::GradientDescent => Box::new(GradientDescent::default()),
        SolverType::ConjugateGradient => Box::new(ConjugateGradient::default()),
        SolverType::ConjugateGradientSquared => Box::new(ConjugateGradientSquared::default()),
        SolverType::BiconjugateGradient => Box::new(BiconjugateGradient::default()),
        SolverType::BiconjugateGradientStab => Box::new(BiconjugateGradientStab::default()),
        SolverType::MinimumResidual => Box::new(MinimumResidual::default()),
        SolverType::Apgd => Box::new(Apgd::default()),
        SolverType::Jacobi => Box::new(Jacobi::default()),
        SolverType::GaussSeidel => Box::new(GaussSeidel::default()),
        SolverType::Pdip => Box::new(PrimalDualInteriorPoint::default()),
        SolverType::QuasiMinimumResidual => {
            return Err(SolverError::UnsupportedAlgorithm(solver_type))
        }
    };
    Ok(engine)
}

/// Largest absolute componentwise difference.
pub(crate) fn max_delta(a: &[Real], b: &[Real]) -> Real {
    a.iter()
        .zip(b)
        .fold(0.0, |acc, (x, y)| acc.max((x - y).abs()))
}

/// Refreshes the gradient at `gamma`, records one iteration and returns the
/// natural-map residual.
pub(crate) fn record_projected(
    state: &mut SolverState,
    system: &SchurSystem<'_>,
    gamma: &[Real],
    previous: &[Real],
    g: &mut [Real],
) -> Real {
    system.gradient(gamma, g);
    let residual = system.residual_with_gradient(gamma, g);
    state.at_iteration_end(system.max_violation(g), max_delta(gamma, previous));
    residual
}

/// Records one Krylov iteration with the separation violation at the
/// (unprojected) iterate `x`.
pub(crate) fn record_unprojected(
    state: &mut SolverState,
    system: &SchurSystem<'_>,
    x: &[Real],
    g: &mut [Real],
    max_delta_gamma: Real,
) {
    system.gradient(x, g);
    state.at_iteration_end(system.max_violation(g), max_delta_gamma);
}

/// Stores the final residual and objective of a projected method.
pub(crate) fn finish_projected(
    state: &mut SolverState,
    system: &SchurSystem<'_>,
    gamma: &[Real],
    g: &[Real],
    residual: Real,
) {
    state.residual = residual;
    state.objective_value = system.objective_with_gradient(gamma, g);
}

/// Scalar step per contact block (mean inverse diagonal of its active rows)
/// followed by one entry per bilateral row.
pub(crate) fn block_inverse_diagonal(system: &SchurSystem<'_>, diagonal: &[Real]) -> Vec<Real> {
    let offset = system.block_size();
    let num_unilaterals = system.num_unilaterals();
    let mut scale = vec![0.0; system.len()];
    for contact in 0..system.num_contacts() {
        let rows = contact * offset..(contact + 1) * offset;
        let (count, sum) = rows
            .clone()
            .filter(|&row| system.is_row_active(row))
            .fold((0usize, 0.0), |(c, s), row| (c + 1, s + diagonal[row]));
        let value = if sum > 0.0 { count as Real / sum } else { 0.0 };
        scale[rows].iter_mut().for_each(|v| *v = value);
    }
    for row in num_unilaterals..system.len() {
        scale[row] = if diagonal[row] > 0.0 {
            1.0 / diagonal[row]
        } else {
            0.0
        };
    }
    scale
}

/// Projects a Krylov iterate and records the final residual and objective.
pub(crate) fn finish_unprojected(
    state: &mut SolverState,
    system: &SchurSystem<'_>,
    gamma: &mut [Real],
) {
    system.project(gamma);
    let mut g = vec![0.0; system.len()];
    system.gradient(gamma, &mut g);
    state.residual = system.residual_with_gradient(gamma, &g);
    state.objective_value = system.objective_with_gradient(gamma, &g);
}

#[cfg(test)]
pub(crate) mod test_support {
    use nalgebra_sparse::{CooMatrix, CsrMatrix};

    use crate::{
        config::SolverMode,
        core::{contact::Contact, types::ContactMaterial},
        dynamics::contact_builder::ContactBuilder,
        utils::math::Real,
    };
    use glam::DVec3;

    /// Hand-built operator pieces for small engine tests.
    pub struct Fixture {
        pub d_t: CsrMatrix<Real>,
        pub m_inv_d: CsrMatrix<Real>,
        pub m_inv_d_t: CsrMatrix<Real>,
        pub e: Vec<Real>,
        pub r: Vec<Real>,
        pub contacts: ContactBuilder,
        pub num_unilaterals: usize,
    }

    impl Fixture {
        pub fn system(&self) -> super::SchurSystem<'_> {
            super::SchurSystem::new(
                &self.d_t,
                &self.m_inv_d,
                &self.m_inv_d_t,
                &self.e,
                &self.r,
                &self.contacts,
                self.num_unilaterals,
            )
        }
    }

    fn from_dense(rows: usize, cols: usize, values: &[Real]) -> CsrMatrix<Real> {
        let mut coo = CooMatrix::new(rows, cols);
        for i in 0..rows {
            for j in 0..cols {
                let v = values[i * cols + j];
                if v != 0.0 {
                    coo.push(i, j, v);
                }
            }
        }
        CsrMatrix::from(&coo)
    }

    /// Unit-mass particle resting on a fixed plane (one normal row). The
    /// exact impulse is `1.0`.
    pub fn single_contact() -> Fixture {
        custom(1, 1, &[1.0], &[1.0], &[0.0], vec![1.0], 1)
    }

    /// Three free particles chained by two equality rows. The solution is
    /// `γ = [1, 2]` for `N = [[2, -1], [-1, 2]]` and `R = [0, 3]`.
    pub fn bilateral_chain() -> Fixture {
        #[rustfmt::skip]
        let d_t = [
            -1.0, 1.0, 0.0,
            0.0, -1.0, 1.0,
        ];
        custom(2, 3, &d_t, &[1.0, 1.0, 1.0], &[0.0, 0.0], vec![0.0, 3.0], 0)
    }

    /// One sliding contact on a plane: the particle wants to move along the
    /// tangent faster than friction allows.
    pub fn sliding_contact(mu: Real, r: [Real; 3]) -> Fixture {
        #[rustfmt::skip]
        let d_t = [
            1.0, 0.0, 0.0,
            0.0, 1.0, 0.0,
            0.0, 0.0, 1.0,
        ];
        let mut fixture = custom(3, 3, &d_t, &[1.0, 1.0, 1.0], &[0.0; 3], r.to_vec(), 3);
        let contact = Contact::new(0, 1, DVec3::ZERO, DVec3::Y, 0.0)
            .with_material(ContactMaterial::with_friction(mu));
        fixture.contacts.setup(&[contact], SolverMode::Sliding);
        fixture.contacts.enter_phase(SolverMode::Sliding);
        fixture
    }

    /// `N = D_T diag(m_inv) D + diag(e)` built from a dense row-major `D_T`.
    pub fn custom(
        rows: usize,
        dof: usize,
        d_t: &[Real],
        m_inv: &[Real],
        e: &[Real],
        r: Vec<Real>,
        num_unilaterals: usize,
    ) -> Fixture {
        let m_inv_d_t: Vec<Real> = (0..rows * dof)
            .map(|k| d_t[k] * m_inv[k % dof])
            .collect();
        let d_t_csr = from_dense(rows, dof, d_t);
        let m_inv_d_t = from_dense(rows, dof, &m_inv_d_t);
        let m_inv_d = m_inv_d_t.transpose();

        let mut contacts = ContactBuilder::new();
        let contact = Contact::new(0, 1, DVec3::ZERO, DVec3::Y, 0.0)
            .with_material(ContactMaterial::with_friction(0.0));
        let list = vec![contact; num_unilaterals];
        contacts.setup(&list, SolverMode::Normal);
        contacts.enter_phase(SolverMode::Normal);

        Fixture {
            d_t: d_t_csr,
            m_inv_d,
            m_inv_d_t,
            e: e.to_vec(),
            r,
            contacts,
            num_unilaterals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn quasi_minimum_residual_is_rejected() {
        let err = create_engine(SolverType::QuasiMinimumResidual).unwrap_err();
        assert_eq!(
            err,
            SolverError::UnsupportedAlgorithm(SolverType::QuasiMinimumResidual)
        );
    }

    #[test]
    fn every_other_identifier_builds_its_engine() {
        for solver_type in [
            SolverType::SteepestDescent,
            SolverType::GradientDescent,
            SolverType::ConjugateGradient,
            SolverType::ConjugateGradientSquared,
            SolverType::BiconjugateGradient,
            SolverType::BiconjugateGradientStab,
            SolverType::MinimumResidual,
            SolverType::Apgd,
            SolverType::Jacobi,
            SolverType::GaussSeidel,
            SolverType::Pdip,
        ] {
            let engine = create_engine(solver_type).unwrap();
            assert_eq!(engine.solver_type(), solver_type);
            assert_eq!(engine.total_iteration(), 0);
        }
    }

    #[test]
    fn operator_and_residual_on_bilateral_chain() {
        let fixture = test_support::bilateral_chain();
        let system = fixture.system();
        let mut out = [0.0; 2];
        system.apply(&[1.0, 2.0], &mut out);
        assert_eq!(out, [0.0, 3.0]);
        assert_relative_eq!(system.residual(&[1.0, 2.0]), 0.0);
        // ½ γᵀNγ - γᵀR at the solution and at rest.
        assert_relative_eq!(system.objective(&[1.0, 2.0]), -3.0);
        assert_relative_eq!(system.objective(&[0.0, 0.0]), 0.0);
        assert_eq!(system.diagonal(), vec![2.0, 2.0]);
        assert_relative_eq!(system.estimate_lipschitz(50), 3.0, epsilon = 1e-6);
    }

    #[test]
    fn masked_rows_do_not_contribute() {
        let mut fixture = test_support::sliding_contact(0.5, [1.0, 2.0, 0.0]);
        fixture.contacts.enter_phase(crate::config::SolverMode::Normal);
        let system = fixture.system();
        let mut g = [0.0; 3];
        system.gradient(&[1.0, 5.0, 5.0], &mut g);
        assert_eq!(g, [0.0, 0.0, 0.0]);
        assert!(!system.is_row_active(1));
    }

    #[test]
    fn state_reset_keeps_budget() {
        let mut state = SolverState::with_max_iterations(7);
        state.begin_solve();
        state.at_iteration_end(1.0, 0.5);
        state.at_iteration_end(0.5, 0.25);
        assert_eq!(state.iteration_history, vec![1, 2]);
        state.begin_solve();
        assert_eq!(state.current_iteration, 0);
        assert_eq!(state.total_iteration, 2);
        state.reset();
        assert_eq!(state, SolverState::with_max_iterations(7));
    }
}
