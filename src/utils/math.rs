//! Scalar type and small vector helpers layered on top of `glam` and `nalgebra`.

use glam::{DMat3, DVec3};

/// Floating point type used by the solver core.
pub type Real = f64;

/// Orthonormal tangent pair `(u, v)` completing `normal` to a right-handed frame.
pub fn tangent_frame(normal: DVec3) -> (DVec3, DVec3) {
    let n = normal.normalize_or_zero();
    if n == DVec3::ZERO {
        return (DVec3::X, DVec3::Z);
    }
    n.any_orthonormal_pair()
}

/// Largest absolute entry, zero for an empty slice.
pub fn norm_inf(values: &[Real]) -> Real {
    values.iter().fold(0.0, |acc, v| acc.max(v.abs()))
}

pub fn dot(a: &[Real], b: &[Real]) -> Real {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// `y += alpha * x`
pub fn axpy(alpha: Real, x: &[Real], y: &mut [Real]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

/// Returns the index of the first non-finite entry, if any.
pub fn first_non_finite(values: &[Real]) -> Option<usize> {
    values.iter().position(|v| !v.is_finite())
}

/// Writes the six generalized-velocity coefficients `[linear, angular]`.
pub fn spatial_row(linear: DVec3, angular: DVec3) -> [Real; 6] {
    [
        linear.x, linear.y, linear.z, angular.x, angular.y, angular.z,
    ]
}

/// Flattens a symmetric 3x3 tensor into row-major entries.
pub fn mat3_entries(m: &DMat3) -> [[Real; 3]; 3] {
    let rows = m.transpose();
    [
        rows.x_axis.to_array(),
        rows.y_axis.to_array(),
        rows.z_axis.to_array(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn tangent_frame_is_orthonormal() {
        for normal in [DVec3::Y, DVec3::new(1.0, 2.0, -0.5), -DVec3::Z] {
            let n = normal.normalize();
            let (u, v) = tangent_frame(normal);
            assert_relative_eq!(u.length(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(v.length(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(u.dot(n), 0.0, epsilon = 1e-12);
            assert_relative_eq!(v.dot(n), 0.0, epsilon = 1e-12);
            assert_relative_eq!(u.dot(v), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn mat3_entries_are_row_major() {
        let m = DMat3::from_cols(
            DVec3::new(1.0, 4.0, 7.0),
            DVec3::new(2.0, 5.0, 8.0),
            DVec3::new(3.0, 6.0, 9.0),
        );
        let e = mat3_entries(&m);
        assert_eq!(e[0], [1.0, 2.0, 3.0]);
        assert_eq!(e[2], [7.0, 8.0, 9.0]);
    }

    #[test]
    fn non_finite_detection() {
        assert_eq!(first_non_finite(&[0.0, 1.0]), None);
        assert_eq!(first_non_finite(&[0.0, Real::NAN, 1.0]), Some(1));
        assert_relative_eq!(norm_inf(&[1.0, -3.0, 2.0]), 3.0);
    }
}
