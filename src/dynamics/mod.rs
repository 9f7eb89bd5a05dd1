//! Constraint dynamics: per-step assembly, phase staging and the DVI step orchestrator.

pub mod assembly;
pub mod bilateral_builder;
pub mod contact_builder;
pub mod context;
pub mod dvi;
pub mod mass;
pub mod stabilization;
pub mod stager;

pub use assembly::{compute_d, compute_e, compute_r, Entry};
pub use bilateral_builder::BilateralBuilder;
pub use contact_builder::ContactBuilder;
pub use context::{ConstraintContext, HostData, StepInput};
pub use dvi::{BodyImpulse, DviSolver, IterationRecord, StepReport};
pub use stager::PhaseReport;
