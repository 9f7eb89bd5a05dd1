//! Unilateral rows: Jacobian, bias, compliance and friction cone projection.
//!
//! Contact `i` owns rows `[i*m, (i+1)*m)` where `m` is the mode multiplier.
//! Within a block the rows are: normal, two sliding tangents, then (spinning
//! mode only) twist about the normal and rolling about both tangents.

use glam::DVec3;

use crate::{
    config::{SolverMode, SolverSettings},
    core::{contact::Contact, rigidbody::RigidBody},
    dynamics::Entry,
    utils::{math::Real, sparse::for_each_block},
};

/// Per-contact coefficients needed by the projection.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConeCoefficients {
    pub sliding: Real,
    pub rolling: Real,
    pub spinning: Real,
    pub cohesion: Real,
}

/// Builder for the contact family of constraints.
#[derive(Debug, Clone)]
pub struct ContactBuilder {
    /// Rows per contact for the current mode.
    pub offset: usize,
    pub solve_sliding: bool,
    pub solve_spinning: bool,
    coefficients: Vec<ConeCoefficients>,
}

impl Default for ContactBuilder {
    fn default() -> Self {
        Self {
            offset: 1,
            solve_sliding: false,
            solve_spinning: false,
            coefficients: Vec::new(),
        }
    }
}

impl ContactBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn setup(&mut self, contacts: &[Contact], mode: SolverMode) {
        self.offset = mode.multiplier();
        self.solve_sliding = false;
        self.solve_spinning = false;
        self.coefficients.clear();
        self.coefficients.extend(contacts.iter().map(|c| ConeCoefficients {
            sliding: c.material.sliding_friction.max(0.0),
            rolling: c.material.rolling_friction.max(0.0),
            spinning: c.material.spinning_friction.max(0.0),
            cohesion: c.material.cohesion.max(0.0),
        }));
    }

    /// Enables the friction features solved in `phase`.
    pub fn enter_phase(&mut self, phase: SolverMode) {
        self.solve_sliding = phase != SolverMode::Normal;
        self.solve_spinning = phase == SolverMode::Spinning;
    }

    pub fn num_contacts(&self) -> usize {
        self.coefficients.len()
    }

    pub fn coefficients(&self, contact: usize) -> ConeCoefficients {
        self.coefficients[contact]
    }

    /// Whether row `local` of a contact block takes part in the current phase.
    pub fn is_row_active(&self, local: usize) -> bool {
        match local {
            0 => true,
            1 | 2 => self.solve_sliding,
            _ => self.solve_spinning,
        }
    }

    /// Fills `entries` (pre-sized to `mode.contact_nonzeros()` per contact).
    pub fn build_d(
        &self,
        contacts: &[Contact],
        bodies: &[RigidBody],
        mode: SolverMode,
        entries: &mut [Entry],
    ) {
        let offset = self.offset;
        for_each_block(entries, mode.contact_nonzeros(), |index, block: &mut [Entry]| {
            let contact = &contacts[index];
            let row = index * offset;
            let (a, b) = (contact.body_a, contact.body_b);
            let r_a = contact.point_a - bodies[a].position;
            let r_b = contact.point_b - bodies[b].position;
            let (n, u, v) = contact.frame();

            let axes = [n, u, v];
            let translational = if offset == 1 { &axes[..1] } else { &axes[..] };

            let mut cursor = 0;
            for (k, axis) in translational.iter().enumerate() {
                cursor = write_body(block, cursor, row + k, a, -*axis, -r_a.cross(*axis));
                cursor = write_body(block, cursor, row + k, b, *axis, r_b.cross(*axis));
            }
            if offset == 6 {
                for (k, axis) in axes.iter().enumerate() {
                    cursor = write_angular(block, cursor, row + 3 + k, a, -*axis);
                    cursor = write_angular(block, cursor, row + 3 + k, b, *axis);
                }
            }
            debug_assert_eq!(cursor, block.len());
        });
    }

    /// Compliance diagonal for all contact rows.
    pub fn build_e(&self, contacts: &[Contact], settings: &SolverSettings, e: &mut [Real]) {
        let h = settings.step_size;
        let inv_hhpa = 1.0 / (h * (h + settings.alpha));
        let offset = self.offset;
        for_each_block(e, offset, |index, block: &mut [Real]| {
            let m = &contacts[index].material;
            block[0] = inv_hhpa * m.compliance;
            if offset >= 3 {
                block[1] = inv_hhpa * m.compliance_t;
                block[2] = inv_hhpa * m.compliance_t;
            }
            if offset == 6 {
                block[3] = inv_hhpa * m.compliance_spinning;
                block[4] = inv_hhpa * m.compliance_rolling;
                block[5] = inv_hhpa * m.compliance_rolling;
            }
        });
    }

    /// Penetration recovery bias on the normal rows; friction rows stay zero.
    pub fn build_b(&self, contacts: &[Contact], settings: &SolverSettings, b: &mut [Real]) {
        let h = settings.step_size;
        let alpha = settings.alpha;
        let recovery = settings.contact_recovery_speed;
        for_each_block(b, self.offset, |index, block: &mut [Real]| {
            let gap = -contacts[index].depth;
            block[0] = if alpha > 0.0 {
                gap / (h + alpha)
            } else if recovery < 0.0 {
                gap / h
            } else {
                (gap / h).max(-recovery)
            };
        });
    }

    /// Projects the unilateral slice of gamma onto the admissible set.
    pub fn project(&self, gamma: &mut [Real]) {
        for_each_block(gamma, self.offset, |index, block: &mut [Real]| {
            self.project_block(index, block)
        });
    }

    /// Projects one contact block in place.
    pub fn project_block(&self, index: usize, block: &mut [Real]) {
        let coeff = self.coefficients[index];
        let cohesion = coeff.cohesion;
        let mut gn = block[0] + cohesion;

        if block.len() >= 3 {
            if self.solve_sliding {
                let (n, t1, t2) = project_cone(gn, block[1], block[2], coeff.sliding);
                gn = n;
                block[1] = t1;
                block[2] = t2;
            } else {
                gn = gn.max(0.0);
                block[1] = 0.0;
                block[2] = 0.0;
            }
        } else {
            gn = gn.max(0.0);
        }

        if block.len() == 6 {
            if self.solve_spinning {
                let limit = coeff.spinning * gn;
                block[3] = block[3].max(-limit).min(limit);
                let rolling = (block[4] * block[4] + block[5] * block[5]).sqrt();
                let limit = coeff.rolling * gn;
                if rolling > limit {
                    let scale = if rolling > 0.0 { limit / rolling } else { 0.0 };
                    block[4] *= scale;
                    block[5] *= scale;
                }
            } else {
                block[3] = 0.0;
                block[4] = 0.0;
                block[5] = 0.0;
            }
        }

        block[0] = gn - cohesion;
    }
}

/// Euclidean projection of `(gn, gu, gv)` onto the Coulomb cone of slope `mu`.
pub fn project_cone(gn: Real, gu: Real, gv: Real, mu: Real) -> (Real, Real, Real) {
    if mu <= 0.0 {
        return (gn.max(0.0), 0.0, 0.0);
    }
    let f_tang = (gu * gu + gv * gv).sqrt();
    if f_tang <= mu * gn {
        return (gn, gu, gv);
    }
    if mu * f_tang <= -gn {
        return (0.0, 0.0, 0.0);
    }
    let normal = (f_tang * mu + gn) / (mu * mu + 1.0);
    let scale = mu * normal / f_tang;
    (normal, gu * scale, gv * scale)
}

fn write_body(
    block: &mut [Entry],
    cursor: usize,
    row: usize,
    body: usize,
    linear: DVec3,
    angular: DVec3,
) -> usize {
    let col = 6 * body;
    for k in 0..3 {
        block[cursor + k] = Entry::new(row, col + k, linear[k]);
        block[cursor + 3 + k] = Entry::new(row, col + 3 + k, angular[k]);
    }
    cursor + 6
}

fn write_angular(
    block: &mut [Entry],
    cursor: usize,
    row: usize,
    body: usize,
    angular: DVec3,
) -> usize {
    let col = 6 * body + 3;
    for k in 0..3 {
        block[cursor + k] = Entry::new(row, col + k, angular[k]);
    }
    cursor + 3
}
