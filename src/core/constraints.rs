use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::rigidbody::RigidBody;
use crate::{
    error::{SolverError, SolverResult},
    utils::math::{spatial_row, Real},
};

/// One scalar equality constraint between two bodies.
///
/// The Jacobian blocks act on `[linear, angular]` generalized velocities in
/// the world frame; the row is satisfied when `J_a·v_a + J_b·v_b = -violation / h`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BilateralRow {
    pub body_a: usize,
    pub body_b: usize,
    pub jacobian_a: [Real; 6],
    pub jacobian_b: [Real; 6],
    /// Current position-level error of the constraint.
    pub violation: Real,
    pub compliance: Real,
}

/// Joints that expand into bilateral rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Joint {
    /// Keeps two world-space anchors coincident (3 rows).
    Spherical {
        body_a: usize,
        body_b: usize,
        anchor_a: DVec3,
        anchor_b: DVec3,
        compliance: Real,
    },
    /// Keeps two anchors at a fixed distance (1 row).
    Distance {
        body_a: usize,
        body_b: usize,
        anchor_a: DVec3,
        anchor_b: DVec3,
        distance: Real,
        compliance: Real,
    },
}

impl Joint {
    pub fn bodies(&self) -> (usize, usize) {
        match self {
            Joint::Spherical { body_a, body_b, .. } | Joint::Distance { body_a, body_b, .. } => {
                (*body_a, *body_b)
            }
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            Joint::Spherical { .. } => 3,
            Joint::Distance { .. } => 1,
        }
    }

    /// Appends this joint's rows, evaluated at the current body positions.
    pub fn push_rows(
        &self,
        index: usize,
        bodies: &[RigidBody],
        rows: &mut Vec<BilateralRow>,
    ) -> SolverResult<()> {
        let (a, b) = self.bodies();
        for body in [a, b] {
            if body >= bodies.len() {
                return Err(SolverError::InvalidBodyIndex {
                    kind: "joint",
                    index,
                    body,
                    num_bodies: bodies.len(),
                });
            }
        }
        let (pos_a, pos_b) = (bodies[a].position, bodies[b].position);

        match self {
            Joint::Spherical {
                anchor_a,
                anchor_b,
                compliance,
                ..
            } => {
                let (r_a, r_b) = (*anchor_a - pos_a, *anchor_b - pos_b);
                let delta = *anchor_b - *anchor_a;
                for axis in [DVec3::X, DVec3::Y, DVec3::Z] {
                    rows.push(two_body_row(a, b, axis, r_a, r_b, delta.dot(axis), *compliance));
                }
            }
            Joint::Distance {
                anchor_a,
                anchor_b,
                distance,
                compliance,
                ..
            } => {
                let (r_a, r_b) = (*anchor_a - pos_a, *anchor_b - pos_b);
                let delta = *anchor_b - *anchor_a;
                let length = delta.length();
                let axis = if length > 1e-12 { delta / length } else { DVec3::X };
                rows.push(two_body_row(a, b, axis, r_a, r_b, length - distance, *compliance));
            }
        }
        Ok(())
    }
}

fn two_body_row(
    body_a: usize,
    body_b: usize,
    axis: DVec3,
    r_a: DVec3,
    r_b: DVec3,
    violation: Real,
    compliance: Real,
) -> BilateralRow {
    BilateralRow {
        body_a,
        body_b,
        jacobian_a: spatial_row(-axis, -r_a.cross(axis)),
        jacobian_b: spatial_row(axis, r_b.cross(axis)),
        violation,
        compliance,
    }
}

/// Expands all joints into bilateral rows, in joint order.
pub fn joint_rows(joints: &[Joint], bodies: &[RigidBody]) -> SolverResult<Vec<BilateralRow>> {
    let mut rows = Vec::with_capacity(joints.iter().map(Joint::row_count).sum());
    for (index, joint) in joints.iter().enumerate() {
        joint.push_rows(index, bodies, &mut rows)?;
    }
    Ok(rows)
}
