use glam::{DMat3, DVec3};
use serde::{Deserialize, Serialize};

use crate::utils::math::Real;

/// Linear and angular velocity of a rigid body, world frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Velocity {
    pub linear: DVec3,
    pub angular: DVec3,
}

impl Velocity {
    pub fn new(linear: DVec3, angular: DVec3) -> Self {
        Self { linear, angular }
    }
}

/// Mass and inertia tensor data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: Real,
    pub inertia: DMat3,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self {
            mass: 1.0,
            inertia: DMat3::IDENTITY,
        }
    }
}

impl MassProperties {
    pub fn inverse_mass(&self) -> Real {
        if self.mass > 0.0 {
            1.0 / self.mass
        } else {
            0.0
        }
    }

    pub fn inverse_inertia(&self) -> DMat3 {
        if self.inertia.determinant().abs() > Real::EPSILON {
            self.inertia.inverse()
        } else {
            DMat3::ZERO
        }
    }

    pub fn solid_box(half_extents: DVec3, mass: Real) -> Self {
        let l = half_extents * 2.0;
        let factor = mass / 12.0;
        Self {
            mass,
            inertia: DMat3::from_diagonal(DVec3::new(
                factor * (l.y * l.y + l.z * l.z),
                factor * (l.x * l.x + l.z * l.z),
                factor * (l.x * l.x + l.y * l.y),
            )),
        }
    }

    pub fn solid_sphere(radius: Real, mass: Real) -> Self {
        Self {
            mass,
            inertia: DMat3::from_diagonal(DVec3::splat(0.4 * mass * radius * radius)),
        }
    }
}

/// Surface coefficients that affect contact constraints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub sliding_friction: Real,
    /// Resistance to rolling about the contact tangents.
    pub rolling_friction: Real,
    /// Resistance to twisting about the contact normal.
    pub spinning_friction: Real,
    /// Adhesive impulse the contact can sustain before separating.
    pub cohesion: Real,
    pub compliance: Real,
    pub compliance_t: Real,
    pub compliance_rolling: Real,
    pub compliance_spinning: Real,
    pub mixing: MaterialMixing,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            sliding_friction: 0.6,
            rolling_friction: 0.0,
            spinning_friction: 0.0,
            cohesion: 0.0,
            compliance: 0.0,
            compliance_t: 0.0,
            compliance_rolling: 0.0,
            compliance_spinning: 0.0,
            mixing: MaterialMixing::default(),
        }
    }
}

impl Material {
    pub fn rubber() -> Self {
        Self {
            sliding_friction: 1.0,
            rolling_friction: 0.04,
            spinning_friction: 0.03,
            compliance: 1e-5,
            compliance_t: 2e-5,
            ..Self::default()
        }
    }

    pub fn steel() -> Self {
        Self {
            sliding_friction: 0.44,
            rolling_friction: 0.015,
            spinning_friction: 0.012,
            ..Self::default()
        }
    }

    pub fn ice() -> Self {
        Self {
            sliding_friction: 0.03,
            rolling_friction: 0.005,
            spinning_friction: 0.003,
            ..Self::default()
        }
    }

    /// Composite coefficients for a contact between `self` and `other`.
    pub fn combine_with(&self, other: &Self) -> ContactMaterial {
        let friction = self.mixing.friction.resolve(other.mixing.friction);
        let compliance = self.mixing.compliance.resolve(other.mixing.compliance);

        ContactMaterial {
            sliding_friction: friction.combine(self.sliding_friction, other.sliding_friction),
            rolling_friction: friction.combine(self.rolling_friction, other.rolling_friction),
            spinning_friction: friction
                .combine(self.spinning_friction, other.spinning_friction),
            cohesion: friction.combine(self.cohesion, other.cohesion),
            compliance: compliance.combine(self.compliance, other.compliance),
            compliance_t: compliance.combine(self.compliance_t, other.compliance_t),
            compliance_rolling: compliance
                .combine(self.compliance_rolling, other.compliance_rolling),
            compliance_spinning: compliance
                .combine(self.compliance_spinning, other.compliance_spinning),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MaterialMixing {
    pub friction: MixingMode,
    pub compliance: MixingMode,
}

impl Default for MaterialMixing {
    fn default() -> Self {
        Self {
            friction: MixingMode::Min,
            compliance: MixingMode::Sum,
        }
    }
}

impl MaterialMixing {
    pub fn with_friction(mut self, mode: MixingMode) -> Self {
        self.friction = mode;
        self
    }

    pub fn with_compliance(mut self, mode: MixingMode) -> Self {
        self.compliance = mode;
        self
    }
}

/// Declaration order doubles as precedence when two materials disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum MixingMode {
    #[default]
    Min,
    Max,
    GeometricMean,
    Average,
    /// Springs in series: compliances add.
    Sum,
}

impl MixingMode {
    fn combine(self, a: Real, b: Real) -> Real {
        match self {
            MixingMode::Min => a.min(b),
            MixingMode::Max => a.max(b),
            MixingMode::GeometricMean => (a.abs() * b.abs()).sqrt(),
            MixingMode::Average => 0.5 * (a + b),
            MixingMode::Sum => a + b,
        }
    }

    fn resolve(self, other: MixingMode) -> MixingMode {
        self.min(other)
    }
}

/// Per-contact coefficients consumed by the contact builder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactMaterial {
    pub sliding_friction: Real,
    pub rolling_friction: Real,
    pub spinning_friction: Real,
    pub cohesion: Real,
    pub compliance: Real,
    pub compliance_t: Real,
    pub compliance_rolling: Real,
    pub compliance_spinning: Real,
}

impl Default for ContactMaterial {
    fn default() -> Self {
        Material::default().combine_with(&Material::default())
    }
}

impl ContactMaterial {
    /// Rigid, cohesionless contact with the given sliding friction.
    pub fn with_friction(sliding_friction: Real) -> Self {
        Self {
            sliding_friction,
            rolling_friction: 0.0,
            spinning_friction: 0.0,
            cohesion: 0.0,
            compliance: 0.0,
            compliance_t: 0.0,
            compliance_rolling: 0.0,
            compliance_spinning: 0.0,
        }
    }
}
