//! Inverse mass operator and unconstrained velocity prediction.

use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

use crate::{
    core::rigidbody::RigidBody,
    dynamics::context::ConstraintContext,
    utils::math::mat3_entries,
};

/// Builds the block-diagonal `M⁻¹`, the velocity vector `v` and
/// `M_invk = v + h M⁻¹ f` for every body.
pub fn compute_mass_matrix(ctx: &mut ConstraintContext, bodies: &[RigidBody]) {
    let dof = 6 * bodies.len();
    let h = ctx.step_size;

    let mut coo = CooMatrix::new(dof, dof);
    let mut v = DVector::zeros(dof);
    let mut m_invk = DVector::zeros(dof);

    for (index, body) in bodies.iter().enumerate() {
        let base = 6 * index;
        let vel = body.velocity;
        for k in 0..3 {
            v[base + k] = vel.linear[k];
            v[base + 3 + k] = vel.angular[k];
        }

        if body.is_fixed {
            for k in 0..3 {
                m_invk[base + k] = vel.linear[k];
                m_invk[base + 3 + k] = vel.angular[k];
            }
            continue;
        }

        if body.inverse_mass != 0.0 {
            for k in 0..3 {
                coo.push(base + k, base + k, body.inverse_mass);
            }
        }
        for (i, row) in mat3_entries(&body.inverse_inertia).iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                if *value != 0.0 {
                    coo.push(base + 3 + i, base + 3 + j, *value);
                }
            }
        }

        let linear = vel.linear + body.force * (h * body.inverse_mass);
        let angular = vel.angular + body.inverse_inertia * (body.torque * h);
        for k in 0..3 {
            m_invk[base + k] = linear[k];
            m_invk[base + 3 + k] = angular[k];
        }
    }

    ctx.host.m_inv = CsrMatrix::from(&coo);
    ctx.host.v = v;
    ctx.host.m_invk = m_invk;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::SolverMode, core::types::MassProperties};
    use approx::assert_relative_eq;
    use glam::DVec3;

    #[test]
    fn external_force_enters_m_invk() {
        let mut body = RigidBody::new(DVec3::ZERO, MassProperties::solid_sphere(1.0, 2.0))
            .with_velocity(DVec3::new(1.0, 0.0, 0.0), DVec3::ZERO);
        body.apply_force(DVec3::new(0.0, -20.0, 0.0));
        let bodies = vec![RigidBody::fixed(DVec3::ZERO), body];

        let mut ctx = ConstraintContext::new();
        ctx.step_size = 0.1;
        ctx.update_counts(SolverMode::Normal, bodies.len(), 0, 0);
        compute_mass_matrix(&mut ctx, &bodies);

        assert_eq!(ctx.host.m_inv.nrows(), 12);
        // Fixed body contributes no entries; the sphere stores 3 + 3.
        assert_eq!(ctx.host.m_inv.nnz(), 6);
        assert_relative_eq!(ctx.host.m_invk[6], 1.0);
        assert_relative_eq!(ctx.host.m_invk[7], -1.0);
        assert_relative_eq!(ctx.host.v[7], 0.0);
    }
}
