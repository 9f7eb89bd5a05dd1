mod common;

use std::sync::{Arc, Mutex};
use std::thread;

use common::jointed_row;
use particle_lcp::*;

#[test]
fn solver_and_world_are_send_and_sync() {
    fn assert_sync_send<T: Sync + Send>() {}
    assert_sync_send::<DviSolver>();
    assert_sync_send::<PhysicsWorld>();
    assert_sync_send::<Box<dyn SolverEngine>>();
}

#[test]
fn independent_solvers_agree_across_threads() {
    let (bodies, contacts, joints) = jointed_row();
    let rows = joint_rows(&joints, &bodies).unwrap();
    let input = (Arc::new(bodies), Arc::new(contacts), Arc::new(rows));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let (bodies, contacts, rows) = (
                Arc::clone(&input.0),
                Arc::clone(&input.1),
                Arc::clone(&input.2),
            );
            thread::spawn(move || {
                let mut solver = DviSolver::new(SolverSettings::default()).unwrap();
                solver
                    .run_time_step(StepInput::new(&bodies, &contacts, &rows))
                    .unwrap()
                    .gamma
            })
        })
        .collect();

    let results: Vec<Vec<Real>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for gamma in &results[1..] {
        assert_eq!(gamma, &results[0]);
    }
}

#[test]
fn shared_world_steps_under_a_mutex() {
    let mut world = PhysicsWorld::new(SolverSettings::default()).unwrap();
    let ground = world.add_rigidbody(RigidBody::fixed(DVec3::ZERO));
    let body = world.add_rigidbody(RigidBody::new(
        DVec3::new(0.0, 0.5, 0.0),
        MassProperties::default(),
    ));
    world.add_contact(ground, body, DVec3::ZERO, DVec3::Y, 0.0).unwrap();
    let world = Arc::new(Mutex::new(world));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let world = Arc::clone(&world);
            thread::spawn(move || {
                let mut world = world.lock().unwrap();
                world.step().unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let world = world.lock().unwrap();
    assert!(world.bodies[body].velocity.linear.y.abs() < 1e-4);
}
