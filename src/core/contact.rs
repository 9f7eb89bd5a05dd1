use glam::DVec3;

use super::types::ContactMaterial;
use crate::utils::math::{tangent_frame, Real};

/// One contact produced by the collision layer.
///
/// `normal` points from body A towards body B. `depth` is positive when the
/// shapes overlap and negative for a speculative gap.
#[derive(Debug, Clone, Copy)]
pub struct Contact {
    pub body_a: usize,
    pub body_b: usize,
    /// Contact point on body A, world frame.
    pub point_a: DVec3,
    /// Contact point on body B, world frame.
    pub point_b: DVec3,
    pub normal: DVec3,
    pub depth: Real,
    pub material: ContactMaterial,
}

impl Contact {
    pub fn new(body_a: usize, body_b: usize, point: DVec3, normal: DVec3, depth: Real) -> Self {
        Self {
            body_a,
            body_b,
            point_a: point,
            point_b: point,
            normal: normal.normalize_or_zero(),
            depth,
            material: ContactMaterial::default(),
        }
    }

    pub fn with_material(mut self, material: ContactMaterial) -> Self {
        self.material = material;
        self
    }

    /// Normal and the two tangent directions of the contact frame.
    pub fn frame(&self) -> (DVec3, DVec3, DVec3) {
        let (u, v) = tangent_frame(self.normal);
        (self.normal, u, v)
    }
}
