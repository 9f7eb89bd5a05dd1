//! Global configuration constants and solver settings for the Particle LCP engine.

use serde::{Deserialize, Serialize};

use crate::utils::math::Real;

/// Gravity applied by [`crate::world::PhysicsWorld`] (m/s²).
pub const DEFAULT_GRAVITY: [Real; 3] = [0.0, -9.81, 0.0];

/// Default integration timestep (in seconds).
pub const DEFAULT_STEP_SIZE: Real = 1.0 / 60.0;

/// Default iteration budget for the normal phase.
pub const DEFAULT_MAX_ITERATION_NORMAL: usize = 100;

/// Default iteration budget for the sliding friction phase.
pub const DEFAULT_MAX_ITERATION_SLIDING: usize = 100;

/// Default iteration budget for the spinning friction phase.
pub const DEFAULT_MAX_ITERATION_SPINNING: usize = 100;

/// Default iteration budget for the bilateral stabilization pass.
pub const DEFAULT_MAX_ITERATION_BILATERAL: usize = 20;

/// Default convergence tolerance on the natural-map residual.
pub const DEFAULT_TOLERANCE: Real = 1e-6;

/// Default maximum speed at which penetration is recovered (m/s).
pub const DEFAULT_CONTACT_RECOVERY_SPEED: Real = 0.6;

/// Structural non-zeros reserved per contact, indexed by mode multiplier.
pub const CONTACT_NONZEROS_NORMAL: usize = 12;
pub const CONTACT_NONZEROS_SLIDING: usize = 36;
pub const CONTACT_NONZEROS_SPINNING: usize = 54;

/// Structural non-zeros reserved per bilateral row (two 6-DOF bodies).
pub const BILATERAL_NONZEROS: usize = 12;

/// Which friction components are included in the assembled system.
///
/// The same enum names the solve phases: the stager walks
/// `Normal -> Sliding -> Spinning` up to the configured mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SolverMode {
    /// Non-penetration only.
    Normal,
    /// Non-penetration plus Coulomb sliding friction.
    #[default]
    Sliding,
    /// Sliding friction plus rolling and spinning resistance.
    Spinning,
}

impl SolverMode {
    /// Unilateral rows generated per contact.
    pub const fn multiplier(self) -> usize {
        match self {
            SolverMode::Normal => 1,
            SolverMode::Sliding => 3,
            SolverMode::Spinning => 6,
        }
    }

    /// Jacobian non-zeros reserved per contact.
    pub const fn contact_nonzeros(self) -> usize {
        match self {
            SolverMode::Normal => CONTACT_NONZEROS_NORMAL,
            SolverMode::Sliding => CONTACT_NONZEROS_SLIDING,
            SolverMode::Spinning => CONTACT_NONZEROS_SPINNING,
        }
    }

    /// Phases executed for this mode, in order.
    pub const fn phases(self) -> &'static [SolverMode] {
        match self {
            SolverMode::Normal => &[SolverMode::Normal],
            SolverMode::Sliding => &[SolverMode::Normal, SolverMode::Sliding],
            SolverMode::Spinning => &[
                SolverMode::Normal,
                SolverMode::Sliding,
                SolverMode::Spinning,
            ],
        }
    }

    /// Whether local row `local` of a contact block is solved in this phase.
    pub const fn includes_row(self, local: usize) -> bool {
        match local {
            0 => true,
            1 | 2 => !matches!(self, SolverMode::Normal),
            _ => matches!(self, SolverMode::Spinning),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SolverMode::Normal => "normal",
            SolverMode::Sliding => "sliding",
            SolverMode::Spinning => "spinning",
        }
    }
}

/// Identifier of the iterative method driving each phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SolverType {
    SteepestDescent,
    GradientDescent,
    ConjugateGradient,
    ConjugateGradientSquared,
    BiconjugateGradient,
    BiconjugateGradientStab,
    MinimumResidual,
    /// Reserved identifier; selecting it is rejected.
    QuasiMinimumResidual,
    #[default]
    Apgd,
    Jacobi,
    GaussSeidel,
    Pdip,
}

/// Per-simulation solver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub step_size: Real,
    pub solver_mode: SolverMode,
    pub solver_type: SolverType,
    pub max_iteration_normal: usize,
    pub max_iteration_sliding: usize,
    pub max_iteration_spinning: usize,
    /// Budget of the bilateral stabilization pass; zero disables it.
    pub max_iteration_bilateral: usize,
    pub tolerance: Real,
    pub perform_stabilization: bool,
    /// Constraint relaxation time; zero keeps the hard velocity-level bias.
    pub alpha: Real,
    /// Negative values disable clamping of the penetration recovery bias.
    pub contact_recovery_speed: Real,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            step_size: DEFAULT_STEP_SIZE,
            solver_mode: SolverMode::default(),
            solver_type: SolverType::default(),
            max_iteration_normal: DEFAULT_MAX_ITERATION_NORMAL,
            max_iteration_sliding: DEFAULT_MAX_ITERATION_SLIDING,
            max_iteration_spinning: DEFAULT_MAX_ITERATION_SPINNING,
            max_iteration_bilateral: DEFAULT_MAX_ITERATION_BILATERAL,
            tolerance: DEFAULT_TOLERANCE,
            perform_stabilization: false,
            alpha: 0.0,
            contact_recovery_speed: DEFAULT_CONTACT_RECOVERY_SPEED,
        }
    }
}

impl SolverSettings {
    /// Iteration budget of a phase.
    pub fn max_iterations_for(&self, phase: SolverMode) -> usize {
        match phase {
            SolverMode::Normal => self.max_iteration_normal,
            SolverMode::Sliding => self.max_iteration_sliding,
            SolverMode::Spinning => self.max_iteration_spinning,
        }
    }

    pub fn with_mode(mut self, mode: SolverMode) -> Self {
        self.solver_mode = mode;
        self
    }

    pub fn with_phase_budgets(mut self, normal: usize, sliding: usize, spinning: usize) -> Self {
        self.max_iteration_normal = normal;
        self.max_iteration_sliding = sliding;
        self.max_iteration_spinning = spinning;
        self
    }

    pub fn with_stabilization(mut self, enabled: bool, iterations: usize) -> Self {
        self.perform_stabilization = enabled;
        self.max_iteration_bilateral = iterations;
        self
    }
}
