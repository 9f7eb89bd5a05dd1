//! Shared per-step state threaded through assembly, staging and solve.

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

use crate::{
    config::SolverMode,
    core::{constraints::BilateralRow, contact::Contact, rigidbody::RigidBody},
    dynamics::contact_builder::ContactBuilder,
    error::{SolverError, SolverResult},
    solvers::SchurSystem,
    utils::{math::Real, profiling::StepTimings},
};

/// Inputs supplied by the collision and topology layers for one step.
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    pub bodies: &'a [RigidBody],
    pub contacts: &'a [Contact],
    pub bilaterals: &'a [BilateralRow],
}

impl<'a> StepInput<'a> {
    pub fn new(
        bodies: &'a [RigidBody],
        contacts: &'a [Contact],
        bilaterals: &'a [BilateralRow],
    ) -> Self {
        Self {
            bodies,
            contacts,
            bilaterals,
        }
    }
}

/// Global matrices and vectors of the assembled system.
#[derive(Debug, Clone)]
pub struct HostData {
    /// Constraint Jacobian, `num_constraints x 6 num_bodies`.
    pub d_t: CsrMatrix<Real>,
    /// Exact transpose of `d_t`.
    pub d: CsrMatrix<Real>,
    /// Block-diagonal inverse mass, `6 num_bodies` square.
    pub m_inv: CsrMatrix<Real>,
    pub m_inv_d: CsrMatrix<Real>,
    /// Transpose of `m_inv_d`, kept for row access by sweeping solvers.
    pub m_inv_d_t: CsrMatrix<Real>,
    /// Velocities before constraint impulses: `v + h M⁻¹ f`.
    pub m_invk: DVector<Real>,
    pub v: DVector<Real>,
    pub e: DVector<Real>,
    pub b: DVector<Real>,
    pub r: DVector<Real>,
    pub gamma: DVector<Real>,
}

impl Default for HostData {
    fn default() -> Self {
        Self {
            d_t: CsrMatrix::zeros(0, 0),
            d: CsrMatrix::zeros(0, 0),
            m_inv: CsrMatrix::zeros(0, 0),
            m_inv_d: CsrMatrix::zeros(0, 0),
            m_inv_d_t: CsrMatrix::zeros(0, 0),
            m_invk: DVector::zeros(0),
            v: DVector::zeros(0),
            e: DVector::zeros(0),
            b: DVector::zeros(0),
            r: DVector::zeros(0),
            gamma: DVector::zeros(0),
        }
    }
}

impl HostData {
    /// Borrows the assembled operator alongside a mutable view of gamma.
    pub fn split_for_solve<'a>(
        &'a mut self,
        contacts: &'a ContactBuilder,
        num_unilaterals: usize,
    ) -> (SchurSystem<'a>, &'a mut [Real]) {
        let system = SchurSystem::new(
            &self.d_t,
            &self.m_inv_d,
            &self.m_inv_d_t,
            self.e.as_slice(),
            self.r.as_slice(),
            contacts,
            num_unilaterals,
        );
        (system, self.gamma.as_mut_slice())
    }
}

/// Counts, host data and timings for the step in flight.
#[derive(Debug, Clone, Default)]
pub struct ConstraintContext {
    pub num_bodies: usize,
    pub num_contacts: usize,
    pub num_bilaterals: usize,
    pub num_unilaterals: usize,
    pub num_constraints: usize,
    pub mode: SolverMode,
    pub step_size: Real,
    pub host: HostData,
    pub timings: StepTimings,
}

impl ConstraintContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refreshes all counts from the latest collision and topology data.
    pub fn update_counts(
        &mut self,
        mode: SolverMode,
        num_bodies: usize,
        num_contacts: usize,
        num_bilaterals: usize,
    ) {
        self.mode = mode;
        self.num_bodies = num_bodies;
        self.num_contacts = num_contacts;
        self.num_bilaterals = num_bilaterals;
        self.num_unilaterals = mode.multiplier() * num_contacts;
        self.num_constraints = self.num_unilaterals + self.num_bilaterals;
    }

    /// Width of the generalized velocity space.
    pub fn num_dof(&self) -> usize {
        6 * self.num_bodies
    }

    pub fn is_degenerate(&self) -> bool {
        self.num_constraints == 0
    }

    /// Resizes gamma to the constraint count and zeroes it.
    pub fn reset_gamma(&mut self) {
        self.host.gamma = DVector::zeros(self.num_constraints);
    }

    pub fn unilateral_gamma(&self) -> &[Real] {
        &self.host.gamma.as_slice()[..self.num_unilaterals]
    }

    pub fn bilateral_gamma(&self) -> &[Real] {
        &self.host.gamma.as_slice()[self.num_unilaterals..]
    }

    pub fn bilateral_gamma_mut(&mut self) -> &mut [Real] {
        let start = self.num_unilaterals;
        &mut self.host.gamma.as_mut_slice()[start..]
    }

    /// Checks every assembled array against the counts.
    pub fn validate(&self) -> SolverResult<()> {
        let n = self.num_constraints;
        let dof = self.num_dof();
        let host = &self.host;

        check_shape("M_inv", &host.m_inv, dof, dof)?;
        check_len("M_invk", host.m_invk.len(), dof)?;
        check_len("gamma", host.gamma.len(), n)?;
        if n == 0 {
            return Ok(());
        }
        check_shape("D_T", &host.d_t, n, dof)?;
        check_shape("D", &host.d, dof, n)?;
        check_shape("M_invD", &host.m_inv_d, dof, n)?;
        check_shape("M_invD^T", &host.m_inv_d_t, n, dof)?;
        check_len("E", host.e.len(), n)?;
        if host.d.nnz() != host.d_t.nnz() {
            return Err(SolverError::mismatch(
                "D non-zeros",
                host.d_t.nnz(),
                host.d.nnz(),
            ));
        }
        Ok(())
    }
}

fn check_shape(
    what: &'static str,
    matrix: &CsrMatrix<Real>,
    rows: usize,
    cols: usize,
) -> SolverResult<()> {
    if matrix.nrows() != rows || matrix.ncols() != cols {
        return Err(SolverError::mismatch(
            what,
            format!("{rows}x{cols}"),
            format!("{}x{}", matrix.nrows(), matrix.ncols()),
        ));
    }
    Ok(())
}

fn check_len(what: &'static str, len: usize, expected: usize) -> SolverResult<()> {
    if len != expected {
        return Err(SolverError::mismatch(what, expected, len));
    }
    Ok(())
}
