#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use particle_lcp::*;

/// Fixed ground plus one unit-mass body resting on it, touching at the origin.
pub fn resting_pair(weight: Real) -> Vec<RigidBody> {
    let mut body = RigidBody::new(DVec3::new(0.0, 0.5, 0.0), MassProperties::default());
    body.apply_force(DVec3::new(0.0, -weight, 0.0));
    vec![RigidBody::fixed(DVec3::ZERO), body]
}

pub fn ground_contact(mu: Real) -> Contact {
    Contact::new(0, 1, DVec3::ZERO, DVec3::Y, 0.0).with_material(ContactMaterial::with_friction(mu))
}

/// Three bodies on the ground, the outer two tied to the middle one.
pub fn jointed_row() -> (Vec<RigidBody>, Vec<Contact>, Vec<Joint>) {
    let mut bodies = vec![RigidBody::fixed(DVec3::ZERO)];
    let mut contacts = Vec::new();
    for i in 0..3 {
        let x = i as Real - 1.0;
        let mut body = RigidBody::new(DVec3::new(x, 0.5, 0.0), MassProperties::default());
        body.apply_force(DVec3::new(0.0, -9.81, 0.0));
        bodies.push(body);
        contacts.push(
            Contact::new(0, i + 1, DVec3::new(x, 0.0, 0.0), DVec3::Y, 0.001)
                .with_material(ContactMaterial::with_friction(0.5)),
        );
    }
    bodies[1].velocity.linear = DVec3::new(-0.2, 0.0, 0.0);
    bodies[3].velocity.linear = DVec3::new(0.3, 0.0, 0.1);

    let joints = vec![
        Joint::Spherical {
            body_a: 1,
            body_b: 2,
            anchor_a: DVec3::new(-0.5, 0.5, 0.0),
            anchor_b: DVec3::new(-0.5, 0.5, 0.0),
            compliance: 0.0,
        },
        Joint::Distance {
            body_a: 2,
            body_b: 3,
            anchor_a: DVec3::new(0.0, 0.5, 0.0),
            anchor_b: DVec3::new(1.0, 0.5, 0.0),
            distance: 1.0,
            compliance: 1e-6,
        },
    ];
    (bodies, contacts, joints)
}

/// Engine that records what it was handed and leaves gamma untouched.
#[derive(Debug, Default)]
pub struct RecordingEngine {
    state: SolverState,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl RecordingEngine {
    /// Returns the engine together with a handle to its call log.
    pub fn with_log() -> (Box<dyn SolverEngine>, Arc<Mutex<Vec<RecordedCall>>>) {
        let engine = Self::default();
        let log = Arc::clone(&engine.calls);
        (Box::new(engine), log)
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub num_constraints: usize,
    pub num_unilaterals: usize,
    pub active_rows: usize,
    pub max_iterations: usize,
    pub initial_gamma: Vec<Real>,
}

impl SolverEngine for RecordingEngine {
    fn solver_type(&self) -> SolverType {
        SolverType::Apgd
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
        _tolerance: Real,
    ) -> SolverResult<()> {
        self.state.begin_solve();
        self.calls.lock().unwrap().push(RecordedCall {
            num_constraints: system.len(),
            num_unilaterals: system.num_unilaterals(),
            active_rows: (0..system.len()).filter(|&i| system.is_row_active(i)).count(),
            max_iterations: self.state.max_iteration,
            initial_gamma: gamma.to_vec(),
        });
        Ok(())
    }
}
