//! Primal-dual interior point method on a dense copy of the active system.
//!
//! Intended for small systems: the Newton matrix is formed explicitly and
//! factored with LU every iteration. Friction features with a zero
//! coefficient are pinned at zero instead of entering as degenerate cones.

use nalgebra::{DMatrix, DVector};

use crate::{
    config::SolverType,
    error::{SolverError, SolverResult},
    solvers::{finish_projected, max_delta, SchurSystem, SolverEngine, SolverState},
    utils::math::Real,
};

/// Factor by which the duality gap target shrinks each iteration.
const BARRIER_REDUCTION: Real = 10.0;

const FRACTION_TO_BOUNDARY: Real = 0.99;

const MAX_STEP_HALVINGS: usize = 50;

/// Singular values below this fraction of the largest are treated as zero.
const SINGULAR_VALUE_CUTOFF: Real = 1e-12;

/// Relative Newton residual above which a step is rejected.
const NEWTON_CONSISTENCY: Real = 1e-8;

/// Solves the Newton system, falling back to the minimum-norm step when
/// redundant rows (duplicated joints, for instance) make it rank deficient.
fn solve_newton(newton: DMatrix<Real>, rhs: &DVector<Real>) -> SolverResult<DVector<Real>> {
    let tolerance = NEWTON_CONSISTENCY * (1.0 + rhs.amax());
    let consistent = |dx: &DVector<Real>| {
        dx.iter().all(|v| v.is_finite()) && (&newton * dx - rhs).amax() <= tolerance
    };

    if let Some(dx) = newton.clone().lu().solve(rhs) {
        if consistent(&dx) {
            return Ok(dx);
        }
    }

    let svd = newton.clone().svd(true, true);
    let cutoff = SINGULAR_VALUE_CUTOFF * svd.singular_values.max();
    let dx = svd
        .solve(rhs, cutoff)
        .map_err(|err| SolverError::Numerical(err.to_string()))?;
    if !consistent(&dx) {
        return Err(SolverError::Numerical(
            "inconsistent interior-point Newton system".into(),
        ));
    }
    log::trace!("rank-deficient Newton system: took the minimum-norm step");
    Ok(dx)
}

/// Smooth inequality `c(x) >= 0` over reduced variables.
#[derive(Debug, Clone)]
enum Inequality {
    /// `x[normal] + cohesion >= 0`
    NonNegative { normal: usize, cohesion: Real },
    /// `½ (μ² s² - Σ x[t]²) >= 0` with `s = x[normal] + cohesion`.
    Cone {
        normal: usize,
        cohesion: Real,
        mu: Real,
        tangents: Vec<usize>,
    },
}

impl Inequality {
    fn normal(&self) -> usize {
        match self {
            Inequality::NonNegative { normal, .. } | Inequality::Cone { normal, .. } => *normal,
        }
    }

    fn value(&self, x: &DVector<Real>) -> Real {
        match self {
            Inequality::NonNegative { normal, cohesion } => x[*normal] + cohesion,
            Inequality::Cone {
                normal,
                cohesion,
                mu,
                tangents,
            } => {
                let s = x[*normal] + cohesion;
                let t: Real = tangents.iter().map(|&k| x[k] * x[k]).sum();
                0.5 * (mu * mu * s * s - t)
            }
        }
    }

    /// Sparse gradient as `(variable, derivative)` pairs.
    fn gradient(&self, x: &DVector<Real>) -> Vec<(usize, Real)> {
        match self {
            Inequality::NonNegative { normal, .. } => vec![(*normal, 1.0)],
            Inequality::Cone {
                normal,
                cohesion,
                mu,
                tangents,
            } => {
                let mut grad = Vec::with_capacity(1 + tangents.len());
                grad.push((*normal, mu * mu * (x[*normal] + cohesion)));
                grad.extend(tangents.iter().map(|&k| (k, -x[k])));
                grad
            }
        }
    }

    /// `h += scale * ∇²c`
    fn add_hessian(&self, scale: Real, h: &mut DMatrix<Real>) {
        if let Inequality::Cone {
            normal,
            mu,
            tangents,
            ..
        } = self
        {
            h[(*normal, *normal)] += scale * mu * mu;
            for &k in tangents {
                h[(k, k)] -= scale;
            }
        }
    }

    fn zero_tangents(&self, x: &mut DVector<Real>) {
        if let Inequality::Cone { tangents, .. } = self {
            for &k in tangents {
                x[k] = 0.0;
            }
        }
    }

    fn cohesion(&self) -> Real {
        match self {
            Inequality::NonNegative { cohesion, .. } | Inequality::Cone { cohesion, .. } => {
                *cohesion
            }
        }
    }
}

/// Active rows of the system reduced to a dense quadratic program.
#[derive(Debug)]
struct InteriorProblem {
    /// Constraint row behind each reduced variable.
    rows: Vec<usize>,
    hessian: DMatrix<Real>,
    rhs: DVector<Real>,
    inequalities: Vec<Inequality>,
}

impl InteriorProblem {
    fn build(system: &SchurSystem<'_>) -> Self {
        let contacts = system.contacts();
        let offset = system.block_size();
        let mut rows = Vec::new();
        let mut inequalities = Vec::new();

        for contact in 0..system.num_contacts() {
            let start = contact * offset;
            let coeff = contacts.coefficients(contact);
            let normal = rows.len();
            rows.push(start);
            inequalities.push(Inequality::NonNegative {
                normal,
                cohesion: coeff.cohesion,
            });

            let mut cone = |local: &[usize], mu: Real, rows: &mut Vec<usize>| {
                if mu <= 0.0 || !system.is_row_active(start + local[0]) {
                    return;
                }
                let tangents = local
                    .iter()
                    .map(|&l| {
                        rows.push(start + l);
                        rows.len() - 1
                    })
                    .collect();
                inequalities.push(Inequality::Cone {
                    normal,
                    cohesion: coeff.cohesion,
                    mu,
                    tangents,
                });
            };
            if offset >= 3 {
                cone(&[1, 2], coeff.sliding, &mut rows);
            }
            if offset == 6 {
                cone(&[3], coeff.spinning, &mut rows);
                cone(&[4, 5], coeff.rolling, &mut rows);
            }
        }
        rows.extend(system.num_unilaterals()..system.len());

        let full = &DMatrix::from(system.d_t()) * &DMatrix::from(system.m_inv_d());
        let e = system.e();
        let k = rows.len();
        let hessian = DMatrix::from_fn(k, k, |i, j| {
            let value = full[(rows[i], rows[j])];
            if i == j {
                value + e[rows[i]]
            } else {
                value
            }
        });
        let rhs = DVector::from_fn(k, |i, _| system.r()[rows[i]]);

        Self {
            rows,
            hessian,
            rhs,
            inequalities,
        }
    }

    /// Moves contacts that are not strictly inside their cones to `s = 1`
    /// with no friction.
    fn make_strictly_feasible(&self, x: &mut DVector<Real>) {
        let reset: Vec<usize> = self
            .inequalities
            .iter()
            .filter(|ineq| ineq.value(x) <= 0.0)
            .map(Inequality::normal)
            .collect();
        for ineq in &self.inequalities {
            if reset.contains(&ineq.normal()) {
                x[ineq.normal()] = 1.0 - ineq.cohesion();
                ineq.zero_tangents(x);
            }
        }
    }

    fn scatter(&self, x: &DVector<Real>, gamma: &mut [Real]) {
        for (i, &row) in self.rows.iter().enumerate() {
            gamma[row] = x[i];
        }
    }
}

#[derive(Debug, Default)]
pub struct PrimalDualInteriorPoint {
    state: SolverState,
}

impl SolverEngine for PrimalDualInteriorPoint {
    fn solver_type(&self) -> SolverType {
        SolverType::Pdip
    }

    fn state(&self) -> &SolverState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SolverState {
        &mut self.state
    }

    fn solve(
        &mut self,
        system: &SchurSystem<'_>,
        gamma: &mut [Real],
        tolerance: Real,
    ) -> SolverResult<()> {
        let state = &mut self.state;
        state.begin_solve();
        let n = system.len();

        system.project(gamma);
        let mut g = vec![0.0; n];
        system.gradient(gamma, &mut g);
        let mut residual = system.residual_with_gradient(gamma, &g);
        if residual <= tolerance || state.max_iteration == 0 {
            finish_projected(state, system, gamma, &g, residual);
            return Ok(());
        }

        let problem = InteriorProblem::build(system);
        let k = problem.rows.len();
        let m = problem.inequalities.len();
        let mut x = DVector::from_fn(k, |i, _| gamma[problem.rows[i]]);
        problem.make_strictly_feasible(&mut x);
        let mut lambda = DVector::from_element(m, 1.0);

        let mut previous = gamma.to_vec();
        while state.current_iteration < state.max_iteration && residual > tolerance {
            let values: Vec<Real> = problem.inequalities.iter().map(|c| c.value(&x)).collect();
            let gradients: Vec<Vec<(usize, Real)>> =
                problem.inequalities.iter().map(|c| c.gradient(&x)).collect();

            let gap = if m > 0 {
                lambda.iter().zip(&values).map(|(l, c)| l * c).sum::<Real>() / m as Real
            } else {
                0.0
            };
            let target = gap / BARRIER_REDUCTION;

            let mut dual_residual = &problem.hessian * &x - &problem.rhs;
            let mut newton = problem.hessian.clone();
            let mut complementarity = vec![0.0; m];
            for j in 0..m {
                let (l, c) = (lambda[j], values[j]);
                complementarity[j] = l * c - target;
                problem.inequalities[j].add_hessian(-l, &mut newton);
                for &(a, ga) in &gradients[j] {
                    dual_residual[a] -= l * ga;
                    for &(b, gb) in &gradients[j] {
                        newton[(a, b)] += (l / c) * ga * gb;
                    }
                }
            }

            let mut rhs = -dual_residual;
            for j in 0..m {
                for &(a, ga) in &gradients[j] {
                    rhs[a] -= ga * complementarity[j] / values[j];
                }
            }

            let dx = solve_newton(newton, &rhs)?;
            let dlambda = DVector::from_fn(m, |j, _| {
                let directional: Real = gradients[j].iter().map(|&(a, ga)| ga * dx[a]).sum();
                (-complementarity[j] - lambda[j] * directional) / values[j]
            });

            let mut alpha: Real = 1.0;
            for j in 0..m {
                if dlambda[j] < 0.0 {
                    alpha = alpha.min(-FRACTION_TO_BOUNDARY * lambda[j] / dlambda[j]);
                }
            }
            let mut halvings = 0;
            loop {
                let trial = &x + &dx * alpha;
                if problem.inequalities.iter().all(|c| c.value(&trial) > 0.0) {
                    break;
                }
                alpha *= 0.5;
                halvings += 1;
                if halvings >= MAX_STEP_HALVINGS {
                    alpha = 0.0;
                    break;
                }
            }

            x += &dx * alpha;
            lambda += &dlambda * alpha;

            previous.copy_from_slice(gamma);
            problem.scatter(&x, gamma);
            system.gradient(gamma, &mut g);
            residual = system.residual_with_gradient(gamma, &g);
            state.at_iteration_end(system.max_violation(&g), max_delta(gamma, &previous));
            if alpha == 0.0 {
                break;
            }
        }

        finish_projected(state, system, gamma, &g, residual);
        Ok(())
    }
}
