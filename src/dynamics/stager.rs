//! Runs the solve phases `Normal -> Sliding -> Spinning` up to the configured mode.

use crate::{
    config::{SolverMode, SolverSettings},
    dynamics::{
        assembly::compute_r,
        bilateral_builder::BilateralBuilder,
        context::{ConstraintContext, StepInput},
        contact_builder::ContactBuilder,
        stabilization::stabilize_bilaterals,
    },
    error::{SolverError, SolverResult},
    solvers::SolverEngine,
    utils::{
        logging::warn_if_budget_exhausted,
        math::{first_non_finite, Real},
        profiling::ScopedTimer,
    },
};

/// Telemetry of one executed phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseReport {
    pub phase: SolverMode,
    pub max_iterations: usize,
    pub iterations: usize,
    /// Engine total after this phase, across all phases of the step.
    pub total_iterations: usize,
    pub residual: Real,
    pub stabilization_iterations: usize,
}

/// Executes every phase of the current mode with a non-zero budget.
///
/// The contact slice of gamma carries over from one phase to the next.
pub fn run_phases(
    ctx: &mut ConstraintContext,
    contact_builder: &mut ContactBuilder,
    bilateral_builder: &BilateralBuilder,
    engine: &mut dyn SolverEngine,
    input: &StepInput<'_>,
    settings: &SolverSettings,
) -> SolverResult<Vec<PhaseReport>> {
    let mut reports = Vec::new();
    if ctx.is_degenerate() {
        return Ok(reports);
    }

    for &phase in ctx.mode.phases() {
        let budget = settings.max_iterations_for(phase);
        if budget == 0 {
            log::debug!("skipping {} phase: zero iteration budget", phase.name());
            continue;
        }

        contact_builder.enter_phase(phase);
        compute_r(ctx, contact_builder, bilateral_builder, input, settings, phase);

        let num_unilaterals = ctx.num_unilaterals;
        let (system, gamma) = ctx.host.split_for_solve(contact_builder, num_unilaterals);

        let stabilization_iterations = if settings.perform_stabilization {
            let _timer = ScopedTimer::new(&mut ctx.timings.stabilization_time);
            stabilize_bilaterals(
                &system,
                gamma,
                settings.max_iteration_bilateral,
                settings.tolerance,
            )
        } else {
            0
        };

        engine.set_max_iterations(budget);
        {
            let _timer = ScopedTimer::new(&mut ctx.timings.solve_time);
            engine.solve(&system, gamma, settings.tolerance)?;
        }

        if let Some(index) = first_non_finite(gamma) {
            return Err(SolverError::Diverged {
                phase: phase.name(),
                reason: format!("gamma[{index}] = {}", gamma[index]),
            });
        }
        let residual = engine.residual();
        if !residual.is_finite() {
            return Err(SolverError::Diverged {
                phase: phase.name(),
                reason: format!("residual = {residual}"),
            });
        }

        warn_if_budget_exhausted(
            phase,
            engine.iteration(),
            budget,
            residual,
            settings.tolerance,
        );
        log::debug!(
            "{} phase: {} / {} iterations, residual {:.3e}",
            phase.name(),
            engine.iteration(),
            budget,
            residual
        );

        reports.push(PhaseReport {
            phase,
            max_iterations: budget,
            iterations: engine.iteration(),
            total_iterations: engine.total_iteration(),
            residual,
            stabilization_iterations,
        });
    }

    Ok(reports)
}
