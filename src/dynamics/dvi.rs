//! Step orchestrator for the DVI (differential variational inequality) solver.

use std::time::{Duration, Instant};

use glam::DVec3;

use crate::{
    config::{SolverSettings, SolverType},
    core::types::Velocity,
    dynamics::{
        assembly::{compute_d, compute_e},
        bilateral_builder::BilateralBuilder,
        context::{ConstraintContext, StepInput},
        contact_builder::ContactBuilder,
        mass::compute_mass_matrix,
        stager::{run_phases, PhaseReport},
    },
    error::{SolverError, SolverResult},
    solvers::{create_engine, SolverEngine},
    utils::{
        math::Real,
        profiling::{ScopedTimer, StepTimings},
        sparse::spmv,
    },
};

/// Generalized constraint impulse `D γ` acting on one body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyImpulse {
    pub linear: DVec3,
    pub angular: DVec3,
}

/// One entry of the engine's per-iteration history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationRecord {
    /// Engine iteration counter across all phases of the step.
    pub iteration: usize,
    pub max_violation: Real,
    pub max_delta_gamma: Real,
}

/// Everything a step publishes.
#[derive(Debug, Clone, Default)]
pub struct StepReport {
    /// Contacts first, then bilaterals.
    pub gamma: Vec<Real>,
    /// `M⁻¹k + M⁻¹D γ` per body.
    pub velocities: Vec<Velocity>,
    pub impulses: Vec<BodyImpulse>,
    pub phases: Vec<PhaseReport>,
    pub total_iterations: usize,
    /// Residual of the last executed phase, zero if none ran.
    pub residual: Real,
    pub history: Vec<IterationRecord>,
    pub timings: StepTimings,
}

/// Owns the active engine, the assembled context and the bilateral warm start.
#[derive(Debug)]
pub struct DviSolver {
    settings: SolverSettings,
    engine: Box<dyn SolverEngine>,
    context: ConstraintContext,
    contact_builder: ContactBuilder,
    bilateral_builder: BilateralBuilder,
    warm_start: Vec<Real>,
}

impl DviSolver {
    pub fn new(settings: SolverSettings) -> SolverResult<Self> {
        Ok(Self {
            engine: create_engine(settings.solver_type)?,
            settings,
            context: ConstraintContext::new(),
            contact_builder: ContactBuilder::new(),
            bilateral_builder: BilateralBuilder::new(),
            warm_start: Vec::new(),
        })
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// Replaces the settings; an unsupported algorithm leaves everything unchanged.
    pub fn set_settings(&mut self, settings: SolverSettings) -> SolverResult<()> {
        if settings.solver_type != self.engine.solver_type() {
            self.change_solver_type(settings.solver_type)?;
        }
        self.settings = settings;
        Ok(())
    }

    /// Swaps in a fresh engine for `solver_type`.
    ///
    /// The new engine is constructed before the old one is dropped, so a
    /// rejected identifier keeps the current engine and its state.
    pub fn change_solver_type(&mut self, solver_type: SolverType) -> SolverResult<()> {
        let engine = create_engine(solver_type).map_err(|err| {
            log::warn!("keeping {:?} engine: {err}", self.engine.solver_type());
            err
        })?;
        self.install_engine(engine);
        Ok(())
    }

    /// Installs a caller-provided engine.
    pub fn install_engine(&mut self, engine: Box<dyn SolverEngine>) {
        log::debug!(
            "solver engine {:?} -> {:?}",
            self.engine.solver_type(),
            engine.solver_type()
        );
        self.settings.solver_type = engine.solver_type();
        self.engine = engine;
    }

    pub fn engine(&self) -> &dyn SolverEngine {
        self.engine.as_ref()
    }

    pub fn context(&self) -> &ConstraintContext {
        &self.context
    }

    /// Bilateral impulses stored at the end of the previous step.
    pub fn bilateral_warm_start(&self) -> &[Real] {
        &self.warm_start
    }

    pub fn set_bilateral_warm_start(&mut self, values: Vec<Real>) {
        self.warm_start = values;
    }

    pub fn clear_warm_start(&mut self) {
        self.warm_start.clear();
    }

    /// Advances the constraint state by one step.
    pub fn run_time_step(&mut self, input: StepInput<'_>) -> SolverResult<StepReport> {
        let h = self.settings.step_size;
        if !h.is_finite() || h <= 0.0 {
            return Err(SolverError::InvalidStepSize(h));
        }
        let step_start = Instant::now();
        let settings = self.settings;
        let ctx = &mut self.context;
        ctx.timings.reset();
        ctx.step_size = h;
        ctx.update_counts(
            settings.solver_mode,
            input.bodies.len(),
            input.contacts.len(),
            input.bilaterals.len(),
        );

        let start = Instant::now();
        compute_mass_matrix(ctx, input.bodies);
        ctx.timings.mass_matrix_time = start.elapsed();

        ctx.reset_gamma();
        self.engine.reset();

        let start = Instant::now();
        compute_d(ctx, &mut self.contact_builder, &self.bilateral_builder, &input)?;
        compute_e(
            ctx,
            &self.contact_builder,
            &self.bilateral_builder,
            &input,
            &settings,
        );
        ctx.timings.assembly_time = start.elapsed();

        restore_warm_start(&self.warm_start, ctx.bilateral_gamma_mut());
        ctx.validate()?;

        let phases = run_phases(
            ctx,
            &mut self.contact_builder,
            &self.bilateral_builder,
            self.engine.as_mut(),
            &input,
            &settings,
        )?;

        self.warm_start = ctx.bilateral_gamma().to_vec();

        let mut impulse_time = Duration::ZERO;
        let (velocities, impulses) = {
            let _timer = ScopedTimer::new(&mut impulse_time);
            compute_impulses(ctx)
        };
        ctx.timings.impulse_time = impulse_time;

        let state = self.engine.state();
        let history = state
            .iteration_history
            .iter()
            .zip(&state.max_violation_history)
            .zip(&state.max_delta_gamma_history)
            .map(|((&iteration, &max_violation), &max_delta_gamma)| IterationRecord {
                iteration,
                max_violation,
                max_delta_gamma,
            })
            .collect();

        ctx.timings.total_time = step_start.elapsed();
        ctx.timings.num_constraints = ctx.num_constraints;
        ctx.timings.total_iterations = state.total_iteration;
        ctx.timings.report();

        Ok(StepReport {
            gamma: ctx.host.gamma.as_slice().to_vec(),
            velocities,
            impulses,
            residual: phases.last().map_or(0.0, |p| p.residual),
            phases,
            total_iterations: state.total_iteration,
            history,
            timings: ctx.timings,
        })
    }
}

/// Copies the cached bilateral impulses over the overlapping rows.
fn restore_warm_start(cache: &[Real], bilateral: &mut [Real]) {
    if !cache.is_empty() && cache.len() != bilateral.len() {
        log::debug!(
            "bilateral count changed {} -> {}; warm starting the overlap",
            cache.len(),
            bilateral.len()
        );
    }
    let overlap = cache.len().min(bilateral.len());
    bilateral[..overlap].copy_from_slice(&cache[..overlap]);
}

fn compute_impulses(ctx: &ConstraintContext) -> (Vec<Velocity>, Vec<BodyImpulse>) {
    let dof = ctx.num_dof();
    let host = &ctx.host;
    let mut velocity = host.m_invk.as_slice().to_vec();
    let mut impulse = vec![0.0; dof];

    if !ctx.is_degenerate() {
        let mut delta = vec![0.0; dof];
        spmv(&host.m_inv_d, host.gamma.as_slice(), &mut delta);
        for (v, d) in velocity.iter_mut().zip(&delta) {
            *v += d;
        }
        spmv(&host.d, host.gamma.as_slice(), &mut impulse);
    }

    let velocities = velocity
        .chunks_exact(6)
        .map(|c| Velocity::new(DVec3::new(c[0], c[1], c[2]), DVec3::new(c[3], c[4], c[5])))
        .collect();
    let impulses = impulse
        .chunks_exact(6)
        .map(|c| BodyImpulse {
            linear: DVec3::new(c[0], c[1], c[2]),
            angular: DVec3::new(c[3], c[4], c[5]),
        })
        .collect();
    (velocities, impulses)
}
