//! Utility helpers including math extensions, sparse kernels, logging, and profiling.

pub mod logging;
pub mod math;
pub mod profiling;
pub mod sparse;

pub use math::Real;
