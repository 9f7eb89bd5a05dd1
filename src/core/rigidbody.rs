use glam::{DMat3, DVec3};

use super::types::{MassProperties, Material, Velocity};
use crate::utils::math::Real;

/// Rigid body state consumed by the constraint solver.
///
/// Inertia is stored in the world frame; the topology layer that owns
/// orientations refreshes it before every step.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub position: DVec3,
    pub velocity: Velocity,
    /// Applied force accumulated for this step.
    pub force: DVec3,
    /// Applied torque accumulated for this step.
    pub torque: DVec3,
    pub mass_properties: MassProperties,
    pub material: Material,
    pub is_fixed: bool,
    pub inverse_mass: Real,
    pub inverse_inertia: DMat3,
}

impl Default for RigidBody {
    fn default() -> Self {
        let mut body = Self {
            position: DVec3::ZERO,
            velocity: Velocity::default(),
            force: DVec3::ZERO,
            torque: DVec3::ZERO,
            mass_properties: MassProperties::default(),
            material: Material::default(),
            is_fixed: false,
            inverse_mass: 1.0,
            inverse_inertia: DMat3::IDENTITY,
        };
        body.recompute_inverses();
        body
    }
}

impl RigidBody {
    pub fn new(position: DVec3, mass_properties: MassProperties) -> Self {
        let mut body = Self {
            position,
            mass_properties,
            ..Self::default()
        };
        body.recompute_inverses();
        body
    }

    /// Immovable body: contributes zero to the inverse mass operator.
    pub fn fixed(position: DVec3) -> Self {
        let mut body = Self {
            position,
            is_fixed: true,
            ..Self::default()
        };
        body.recompute_inverses();
        body
    }

    pub fn with_velocity(mut self, linear: DVec3, angular: DVec3) -> Self {
        self.velocity = Velocity::new(linear, angular);
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn apply_force(&mut self, force: DVec3) {
        if self.is_fixed {
            return;
        }
        self.force += force;
    }

    pub fn clear_forces(&mut self) {
        self.force = DVec3::ZERO;
        self.torque = DVec3::ZERO;
    }

    pub fn set_mass_properties(&mut self, props: MassProperties) {
        self.mass_properties = props;
        self.recompute_inverses();
    }

    pub fn set_fixed(&mut self, fixed: bool) {
        self.is_fixed = fixed;
        self.recompute_inverses();
    }

    fn recompute_inverses(&mut self) {
        if self.is_fixed {
            self.inverse_mass = 0.0;
            self.inverse_inertia = DMat3::ZERO;
        } else {
            self.inverse_mass = self.mass_properties.inverse_mass();
            self.inverse_inertia = self.mass_properties.inverse_inertia();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_bodies_have_no_inverse_mass() {
        let mut body = RigidBody::fixed(DVec3::ZERO);
        assert_eq!(body.inverse_mass, 0.0);
        assert_eq!(body.inverse_inertia, DMat3::ZERO);

        body.apply_force(DVec3::Y);
        assert_eq!(body.force, DVec3::ZERO);

        body.set_fixed(false);
        assert_eq!(body.inverse_mass, 1.0);
    }
}
