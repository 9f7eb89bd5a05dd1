//! Particle LCP – a DVI constraint solver core for multibody dynamics.
//!
//! Given bodies, contacts produced by an external collision layer and
//! bilateral joint rows, a step assembles the sparse constraint Jacobian,
//! builds the Schur complement problem and solves it in up to three phases
//! (normal, sliding, spinning) with a swappable iterative engine. The
//! resulting impulses and post-step velocities are returned to the caller.

pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod solvers;
pub mod utils;
pub mod world;

pub use glam::{DMat3, DVec3};

pub use config::{SolverMode, SolverSettings, SolverType};
pub use core::{
    constraints::{joint_rows, BilateralRow, Joint},
    contact::Contact,
    rigidbody::RigidBody,
    types::{ContactMaterial, MassProperties, Material, MaterialMixing, MixingMode, Velocity},
};
pub use dynamics::{BodyImpulse, DviSolver, IterationRecord, PhaseReport, StepInput, StepReport};
pub use error::{SolverError, SolverResult};
pub use solvers::{create_engine, SchurSystem, SolverEngine, SolverState};
pub use utils::{math::Real, profiling::StepTimings};
pub use world::PhysicsWorld;
