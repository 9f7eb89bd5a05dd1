use glam::DVec3;

use crate::{
    config::{SolverSettings, DEFAULT_GRAVITY},
    core::{
        constraints::{joint_rows, Joint},
        contact::Contact,
        rigidbody::RigidBody,
    },
    dynamics::{context::StepInput, dvi::DviSolver, dvi::StepReport},
    error::{SolverError, SolverResult},
    utils::{logging::ScopedTimer, math::Real},
};

/// Owns bodies, the contacts supplied by collision detection, joints and the
/// DVI solver, and writes solved velocities back after every step.
///
/// Positions are left untouched; integrating them is the caller's job.
#[derive(Debug)]
pub struct PhysicsWorld {
    pub bodies: Vec<RigidBody>,
    pub contacts: Vec<Contact>,
    pub joints: Vec<Joint>,
    pub gravity: DVec3,
    solver: DviSolver,
}

impl PhysicsWorld {
    pub fn new(settings: SolverSettings) -> SolverResult<Self> {
        Ok(Self {
            bodies: Vec::new(),
            contacts: Vec::new(),
            joints: Vec::new(),
            gravity: DVec3::from_array(DEFAULT_GRAVITY),
            solver: DviSolver::new(settings)?,
        })
    }

    pub fn solver(&self) -> &DviSolver {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut DviSolver {
        &mut self.solver
    }

    pub fn add_rigidbody(&mut self, body: RigidBody) -> usize {
        self.bodies.push(body);
        self.bodies.len() - 1
    }

    pub fn add_joint(&mut self, joint: Joint) {
        self.joints.push(joint);
    }

    pub fn clear_joints(&mut self) {
        self.joints.clear();
    }

    /// Adds a contact whose material combines both bodies' materials.
    pub fn add_contact(
        &mut self,
        body_a: usize,
        body_b: usize,
        point: DVec3,
        normal: DVec3,
        depth: Real,
    ) -> SolverResult<()> {
        let index = self.contacts.len();
        let (a, b) = match (self.bodies.get(body_a), self.bodies.get(body_b)) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(SolverError::InvalidBodyIndex {
                    kind: "contact",
                    index,
                    body: body_a.max(body_b),
                    num_bodies: self.bodies.len(),
                })
            }
        };
        let material = a.material.combine_with(&b.material);
        self.contacts
            .push(Contact::new(body_a, body_b, point, normal, depth).with_material(material));
        Ok(())
    }

    /// Replaces the contact set for the next step.
    pub fn set_contacts(&mut self, contacts: Vec<Contact>) {
        self.contacts = contacts;
    }

    pub fn clear_contacts(&mut self) {
        self.contacts.clear();
    }

    /// Applies gravity, solves all constraints and stores the new velocities.
    ///
    /// Accumulated forces are cleared afterwards, even for fixed bodies.
    pub fn step(&mut self) -> SolverResult<StepReport> {
        let _timer = ScopedTimer::new("world::step");
        self.apply_gravity();

        let bilaterals = joint_rows(&self.joints, &self.bodies)?;
        let report = self.solver.run_time_step(StepInput::new(
            &self.bodies,
            &self.contacts,
            &bilaterals,
        ))?;

        for (body, velocity) in self.bodies.iter_mut().zip(&report.velocities) {
            if !body.is_fixed {
                body.velocity = *velocity;
            }
            body.clear_forces();
        }
        Ok(report)
    }

    fn apply_gravity(&mut self) {
        for body in self.bodies.iter_mut() {
            if body.is_fixed {
                continue;
            }
            let weight = self.gravity * body.mass_properties.mass;
            body.apply_force(weight);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::SolverMode, core::types::Material};
    use approx::assert_relative_eq;

    #[test]
    fn free_body_accelerates_under_gravity() {
        let settings = SolverSettings {
            step_size: 0.1,
            ..SolverSettings::default()
        };
        let mut world = PhysicsWorld::new(settings).unwrap();
        world.add_rigidbody(RigidBody::new(DVec3::ZERO, Default::default()));
        let report = world.step().unwrap();
        assert!(report.phases.is_empty());
        assert_relative_eq!(world.bodies[0].velocity.linear.y, -0.981, epsilon = 1e-12);
        assert_eq!(world.bodies[0].force, DVec3::ZERO);
    }

    #[test]
    fn resting_body_stays_at_rest() {
        let settings = SolverSettings {
            step_size: 0.01,
            tolerance: 1e-10,
            ..SolverSettings::default()
        }
        .with_mode(SolverMode::Sliding);
        let mut world = PhysicsWorld::new(settings).unwrap();
        let ground = world.add_rigidbody(RigidBody::fixed(DVec3::ZERO));
        let body = world.add_rigidbody(
            RigidBody::new(DVec3::new(0.0, 0.5, 0.0), Default::default())
                .with_material(Material::steel()),
        );
        world
            .add_contact(ground, body, DVec3::ZERO, DVec3::Y, 0.0)
            .unwrap();

        for _ in 0..3 {
            world.step().unwrap();
            assert_relative_eq!(world.bodies[body].velocity.linear.y, 0.0, epsilon = 1e-8);
        }
        assert_eq!(world.bodies[ground].velocity.linear, DVec3::ZERO);
    }

    #[test]
    fn contact_with_missing_body_is_rejected() {
        let mut world = PhysicsWorld::new(SolverSettings::default()).unwrap();
        world.add_rigidbody(RigidBody::fixed(DVec3::ZERO));
        let err = world
            .add_contact(0, 2, DVec3::ZERO, DVec3::Y, 0.0)
            .unwrap_err();
        assert!(matches!(err, SolverError::InvalidBodyIndex { body: 2, .. }));
    }
}
