//! Global system assembly: `D_T`, `D`, `M⁻¹D`, `E` and the phase right-hand side.

use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

use crate::{
    config::{SolverMode, SolverSettings, BILATERAL_NONZEROS},
    core::contact::Contact,
    dynamics::{
        bilateral_builder::BilateralBuilder,
        context::{ConstraintContext, StepInput},
        contact_builder::ContactBuilder,
    },
    error::{SolverError, SolverResult},
    utils::{logging::ScopedTimer, math::Real, sparse::spmv},
};

/// One structural non-zero of `D_T`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Entry {
    pub row: usize,
    pub col: usize,
    pub value: Real,
}

impl Entry {
    pub const fn new(row: usize, col: usize, value: Real) -> Self {
        Self { row, col, value }
    }
}

/// Rejects contacts referencing bodies outside `0..num_bodies`.
pub fn validate_contacts(contacts: &[Contact], num_bodies: usize) -> SolverResult<()> {
    for (index, contact) in contacts.iter().enumerate() {
        for body in [contact.body_a, contact.body_b] {
            if body >= num_bodies {
                return Err(SolverError::InvalidBodyIndex {
                    kind: "contact",
                    index,
                    body,
                    num_bodies,
                });
            }
        }
    }
    Ok(())
}

/// Builds `D_T` from both constraint families, then `D`, `M⁻¹D` and its transpose.
///
/// Requires `M⁻¹` to be assembled for the current body set.
pub fn compute_d(
    ctx: &mut ConstraintContext,
    contact_builder: &mut ContactBuilder,
    bilateral_builder: &BilateralBuilder,
    input: &StepInput<'_>,
) -> SolverResult<()> {
    let _timer = ScopedTimer::new("compute_d");
    let n = ctx.num_constraints;
    let dof = ctx.num_dof();
    let mode = ctx.mode;

    contact_builder.setup(input.contacts, mode);
    if n == 0 {
        ctx.host.d_t = CsrMatrix::zeros(0, dof);
        ctx.host.d = CsrMatrix::zeros(dof, 0);
        ctx.host.m_inv_d = CsrMatrix::zeros(dof, 0);
        ctx.host.m_inv_d_t = CsrMatrix::zeros(0, dof);
        return Ok(());
    }

    validate_contacts(input.contacts, ctx.num_bodies)?;
    bilateral_builder.validate(input.bilaterals, ctx.num_bodies)?;

    let unilateral_nnz = ctx.num_contacts * mode.contact_nonzeros();
    let bilateral_nnz = ctx.num_bilaterals * BILATERAL_NONZEROS;
    let mut entries = vec![Entry::default(); unilateral_nnz + bilateral_nnz];
    let (unilateral, bilateral) = entries.split_at_mut(unilateral_nnz);
    contact_builder.build_d(input.contacts, input.bodies, mode, unilateral);
    bilateral_builder.build_d(input.bilaterals, ctx.num_unilaterals, bilateral);

    let rows = entries.iter().map(|entry| entry.row).collect();
    let cols = entries.iter().map(|entry| entry.col).collect();
    let values = entries.iter().map(|entry| entry.value).collect();
    let coo = CooMatrix::try_from_triplets(n, dof, rows, cols, values)
        .map_err(|err| SolverError::mismatch("D_T triplets", format!("{n}x{dof}"), err))?;

    let d_t = CsrMatrix::from(&coo);
    let d = d_t.transpose();
    let m_inv_d = &ctx.host.m_inv * &d;
    ctx.host.m_inv_d_t = m_inv_d.transpose();
    ctx.host.m_inv_d = m_inv_d;
    ctx.host.d = d;
    ctx.host.d_t = d_t;

    log::trace!(
        "assembled D_T: {}x{} with {} non-zeros",
        n,
        dof,
        ctx.host.d_t.nnz()
    );
    Ok(())
}

/// Rebuilds the compliance diagonal `E`.
pub fn compute_e(
    ctx: &mut ConstraintContext,
    contact_builder: &ContactBuilder,
    bilateral_builder: &BilateralBuilder,
    input: &StepInput<'_>,
    settings: &SolverSettings,
) {
    let mut e = DVector::zeros(ctx.num_constraints);
    let (unilateral, bilateral) = e.as_mut_slice().split_at_mut(ctx.num_unilaterals);
    contact_builder.build_e(input.contacts, settings, unilateral);
    bilateral_builder.build_e(input.bilaterals, settings, bilateral);
    ctx.host.e = e;
}

/// Rebuilds `b` and `R = -b - D_T M_invk` for `phase`.
///
/// Contact rows not solved in `phase` get a zero right-hand side.
pub fn compute_r(
    ctx: &mut ConstraintContext,
    contact_builder: &ContactBuilder,
    bilateral_builder: &BilateralBuilder,
    input: &StepInput<'_>,
    settings: &SolverSettings,
    phase: SolverMode,
) {
    let n = ctx.num_constraints;
    let mut b = DVector::zeros(n);
    let mut r = DVector::zeros(n);
    if n == 0 {
        ctx.host.b = b;
        ctx.host.r = r;
        return;
    }

    {
        let (unilateral, bilateral) = b.as_mut_slice().split_at_mut(ctx.num_unilaterals);
        contact_builder.build_b(input.contacts, settings, unilateral);
        bilateral_builder.build_b(input.bilaterals, settings, bilateral);
    }

    spmv(&ctx.host.d_t, ctx.host.m_invk.as_slice(), r.as_mut_slice());
    for (value, bias) in r.iter_mut().zip(b.iter()) {
        *value = -bias - *value;
    }

    let offset = ctx.mode.multiplier();
    for (row, value) in r.as_mut_slice()[..ctx.num_unilaterals].iter_mut().enumerate() {
        if !phase.includes_row(row % offset) {
            *value = 0.0;
        }
    }

    ctx.host.b = b;
    ctx.host.r = r;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{constraints::BilateralRow, rigidbody::RigidBody, types::ContactMaterial},
        dynamics::mass::compute_mass_matrix,
    };
    use approx::assert_relative_eq;
    use glam::DVec3;
    use nalgebra::DMatrix;

    struct Fixture {
        bodies: Vec<RigidBody>,
        contacts: Vec<Contact>,
        bilaterals: Vec<BilateralRow>,
    }

    fn fixture() -> Fixture {
        let mut falling = RigidBody::new(DVec3::new(0.0, 0.5, 0.0), Default::default());
        falling.apply_force(DVec3::new(0.0, -10.0, 0.0));
        let bodies = vec![
            RigidBody::fixed(DVec3::ZERO),
            falling,
            RigidBody::new(DVec3::new(1.0, 0.5, 0.0), Default::default()),
        ];
        let contacts = vec![Contact::new(
            0,
            1,
            DVec3::new(0.1, 0.0, 0.2),
            DVec3::Y,
            0.0,
        )
        .with_material(ContactMaterial::with_friction(0.5))];
        let bilaterals = vec![BilateralRow {
            body_a: 1,
            body_b: 2,
            jacobian_a: [-1.0, 0.0, 0.0, 0.0, 0.0, 0.5],
            jacobian_b: [1.0, 0.0, 0.0, 0.0, 0.0, -0.5],
            violation: 0.0,
            compliance: 0.0,
        }];
        Fixture {
            bodies,
            contacts,
            bilaterals,
        }
    }

    fn assemble(f: &Fixture, mode: SolverMode) -> (ConstraintContext, ContactBuilder) {
        let input = StepInput::new(&f.bodies, &f.contacts, &f.bilaterals);
        let mut ctx = ConstraintContext::new();
        ctx.step_size = 0.01;
        ctx.update_counts(mode, f.bodies.len(), f.contacts.len(), f.bilaterals.len());
        compute_mass_matrix(&mut ctx, &f.bodies);
        ctx.reset_gamma();
        let mut contact_builder = ContactBuilder::new();
        compute_d(&mut ctx, &mut contact_builder, &BilateralBuilder, &input).unwrap();
        (ctx, contact_builder)
    }

    #[test]
    fn d_is_the_exact_transpose_of_d_t() {
        let f = fixture();
        for mode in [SolverMode::Normal, SolverMode::Sliding, SolverMode::Spinning] {
            let (ctx, _) = assemble(&f, mode);
            let d_t = DMatrix::from(&ctx.host.d_t);
            let d = DMatrix::from(&ctx.host.d);
            assert_eq!(d, d_t.transpose());
            assert_eq!(
                ctx.host.d_t.nnz(),
                mode.contact_nonzeros() + BILATERAL_NONZEROS
            );
            ctx.validate().unwrap();
        }
    }

    #[test]
    fn bilateral_rows_follow_the_contact_block() {
        let f = fixture();
        let (ctx, _) = assemble(&f, SolverMode::Sliding);
        let d_t = DMatrix::from(&ctx.host.d_t);
        assert_eq!(d_t.nrows(), 4);
        assert_eq!(d_t[(3, 6)], -1.0);
        assert_eq!(d_t[(3, 12)], 1.0);
        assert_eq!(d_t[(3, 17)], -0.5);
        // Normal row pushes body 1 along +Y.
        assert_eq!(d_t[(0, 7)], 1.0);
    }

    #[test]
    fn r_carries_gravity_and_masks_inactive_rows() {
        let f = fixture();
        let input = StepInput::new(&f.bodies, &f.contacts, &f.bilaterals);
        let settings = SolverSettings {
            step_size: 0.01,
            ..SolverSettings::default()
        };
        let (mut ctx, contact_builder) = assemble(&f, SolverMode::Sliding);
        compute_r(
            &mut ctx,
            &contact_builder,
            &BilateralBuilder,
            &input,
            &settings,
            SolverMode::Normal,
        );
        assert_relative_eq!(ctx.host.r[0], 0.1, epsilon = 1e-12);
        assert_eq!(ctx.host.r[1], 0.0);
        assert_eq!(ctx.host.r[2], 0.0);
    }

    #[test]
    fn compliance_lands_on_the_diagonal() {
        let mut f = fixture();
        f.contacts[0].material.compliance = 1e-4;
        f.bilaterals[0].compliance = 2e-4;
        let input = StepInput::new(&f.bodies, &f.contacts, &f.bilaterals);
        let settings = SolverSettings {
            step_size: 0.01,
            ..SolverSettings::default()
        };
        let (mut ctx, contact_builder) = assemble(&f, SolverMode::Sliding);
        compute_e(&mut ctx, &contact_builder, &BilateralBuilder, &input, &settings);
        assert_relative_eq!(ctx.host.e[0], 1.0, epsilon = 1e-12);
        assert_eq!(ctx.host.e[1], 0.0);
        assert_relative_eq!(ctx.host.e[3], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_system_sizes_everything_zero() {
        let bodies = vec![RigidBody::fixed(DVec3::ZERO)];
        let input = StepInput::new(&bodies, &[], &[]);
        let mut ctx = ConstraintContext::new();
        ctx.step_size = 0.01;
        ctx.update_counts(SolverMode::Spinning, 1, 0, 0);
        compute_mass_matrix(&mut ctx, &bodies);
        ctx.reset_gamma();
        let mut contact_builder = ContactBuilder::new();
        compute_d(&mut ctx, &mut contact_builder, &BilateralBuilder, &input).unwrap();
        assert_eq!(ctx.host.d_t.nrows(), 0);
        assert_eq!(ctx.host.d.ncols(), 0);
        ctx.validate().unwrap();
    }

    #[test]
    fn contact_with_unknown_body_is_rejected() {
        let bodies = vec![RigidBody::fixed(DVec3::ZERO)];
        let contacts = [Contact::new(0, 3, DVec3::ZERO, DVec3::Y, 0.0)];
        let input = StepInput::new(&bodies, &contacts, &[]);
        let mut ctx = ConstraintContext::new();
        ctx.update_counts(SolverMode::Normal, 1, 1, 0);
        compute_mass_matrix(&mut ctx, &bodies);
        let err = compute_d(&mut ctx, &mut ContactBuilder::new(), &BilateralBuilder, &input)
            .unwrap_err();
        assert!(matches!(
            err,
            SolverError::InvalidBodyIndex {
                kind: "contact",
                body: 3,
                ..
            }
        ));
    }
}
