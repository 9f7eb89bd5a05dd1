//! Core types describing bodies, contacts, joints, and materials fed to the solver.

pub mod constraints;
pub mod contact;
pub mod rigidbody;
pub mod types;

pub use constraints::{joint_rows, BilateralRow, Joint};
pub use contact::Contact;
pub use rigidbody::RigidBody;
pub use types::{ContactMaterial, MassProperties, Material, MaterialMixing, MixingMode, Velocity};
