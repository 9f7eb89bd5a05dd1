use log::{Level, log_enabled, warn};

use crate::{config::SolverMode, utils::math::Real};

/// Simple scoped timer for tracing solver sections.
pub struct ScopedTimer<'a> {
    label: &'a str,
    start: std::time::Instant,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(label: &'a str) -> Self {
        if log_enabled!(Level::Trace) {
            log::trace!("start {label}");
        }
        Self {
            label,
            start: std::time::Instant::now(),
        }
    }
}

impl<'a> Drop for ScopedTimer<'a> {
    fn drop(&mut self) {
        if log_enabled!(Level::Trace) {
            let elapsed = self.start.elapsed();
            log::trace!("end {} ({} µs)", self.label, elapsed.as_micros());
        }
    }
}

/// Registers a warning when a phase ran out of iterations above tolerance.
pub fn warn_if_budget_exhausted(
    phase: SolverMode,
    iterations: usize,
    budget: usize,
    residual: Real,
    tolerance: Real,
) {
    if iterations >= budget && residual > tolerance {
        warn!(
            "{} phase exhausted {} iterations: residual {:.3e} > tolerance {:.3e}",
            phase.name(),
            budget,
            residual,
            tolerance
        );
    }
}
