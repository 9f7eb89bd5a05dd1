use std::time::{Duration, Instant};

/// Wall-clock timings of one solver step, owned by the constraint context.
#[derive(Debug, Default, Clone, Copy)]
pub struct StepTimings {
    pub mass_matrix_time: Duration,
    pub assembly_time: Duration,
    pub stabilization_time: Duration,
    pub solve_time: Duration,
    pub impulse_time: Duration,
    pub total_time: Duration,

    pub num_constraints: usize,
    pub total_iterations: usize,
}

impl StepTimings {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn report(&self) {
        let total_us = self.total_time.as_micros() as f32;
        if total_us < 1.0 {
            return;
        }

        log::debug!(
            "solver step: {} constraints, {} iterations, {:.2} ms",
            self.num_constraints,
            self.total_iterations,
            self.total_time.as_secs_f32() * 1000.0
        );
        for (label, duration) in [
            ("mass matrix", self.mass_matrix_time),
            ("assembly", self.assembly_time),
            ("stabilization", self.stabilization_time),
            ("solve", self.solve_time),
            ("impulses", self.impulse_time),
        ] {
            log::debug!(
                "  {:<14}{:.2} ms ({:.1}%)",
                label,
                duration.as_secs_f32() * 1000.0,
                (duration.as_micros() as f32 / total_us) * 100.0
            );
        }
    }
}

pub struct ScopedTimer<'a> {
    start: Instant,
    output: &'a mut Duration,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(output: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            output,
        }
    }
}

impl<'a> Drop for ScopedTimer<'a> {
    fn drop(&mut self) {
        *self.output += self.start.elapsed();
    }
}
