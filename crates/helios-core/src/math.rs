//! Math utilities and helpers.

use glam::{Mat3, Mat4, Vec3};

/// A 3x4 affine transform: rotation/scale in the upper 3x3, translation in the
/// fourth column. This is the layout acceleration-structure instances expect,
/// and it composes cheaply on the CPU.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Rotation and scale part.
    pub basis: Mat3,
    /// Translation part.
    pub translation: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    /// Identity transform.
    pub const IDENTITY: Self = Self {
        basis: Mat3::IDENTITY,
        translation: Vec3::ZERO,
    };

    /// Create a pure translation.
    #[inline]
    pub const fn from_translation(translation: Vec3) -> Self {
        Self {
            basis: Mat3::IDENTITY,
            translation,
        }
    }

    /// Create a rotation around an axis (radians).
    #[inline]
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        Self {
            basis: Mat3::from_axis_angle(axis, angle),
            translation: Vec3::ZERO,
        }
    }

    /// Create a uniform scale.
    #[inline]
    pub fn from_scale(scale: f32) -> Self {
        Self {
            basis: Mat3::from_diagonal(Vec3::splat(scale)),
            translation: Vec3::ZERO,
        }
    }

    /// Create a view transform looking from `eye` towards `target`.
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Self {
        let view = Mat4::look_at_rh(eye, target, up);
        Self::from_mat4(view)
    }

    /// Compose two transforms: the result applies `other` first, then `self`.
    #[inline]
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            basis: self.basis * other.basis,
            translation: self.basis * other.translation + self.translation,
        }
    }

    /// Transform a point.
    #[inline]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.basis * point + self.translation
    }

    /// Expand into a full 4x4 matrix.
    #[inline]
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_cols(
            (self.basis.x_axis, 0.0).into(),
            (self.basis.y_axis, 0.0).into(),
            (self.basis.z_axis, 0.0).into(),
            (self.translation, 1.0).into(),
        )
    }

    /// Truncate a 4x4 affine matrix. The projective row is ignored.
    #[inline]
    pub fn from_mat4(m: Mat4) -> Self {
        Self {
            basis: Mat3::from_mat4(m),
            translation: m.w_axis.truncate(),
        }
    }

    /// Row-major 3x4 layout, as consumed by acceleration-structure instances.
    pub fn to_rows_3x4(&self) -> [f32; 12] {
        let b = self.basis;
        let t = self.translation;
        [
            b.x_axis.x, b.y_axis.x, b.z_axis.x, t.x, //
            b.x_axis.y, b.y_axis.y, b.z_axis.y, t.y, //
            b.x_axis.z, b.y_axis.z, b.z_axis.z, t.z,
        ]
    }
}

/// Right-handed perspective projection with a reversed-Y clip space for Vulkan.
pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let mut proj = Mat4::perspective_rh(fov_y, aspect, near, far);
    // Vulkan's clip space Y points down.
    proj.y_axis.y *= -1.0;
    proj
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn identity_leaves_points_unchanged() {
        let p = Vec3::new(1.0, -2.0, 3.0);
        assert_eq!(Transform::IDENTITY.transform_point(p), p);
    }

    #[test]
    fn compose_applies_right_then_left() {
        let translate = Transform::from_translation(Vec3::X);
        let rotate = Transform::from_axis_angle(Vec3::Z, std::f32::consts::FRAC_PI_2);

        // Rotate first, then translate.
        let combined = translate.compose(&rotate);
        let p = combined.transform_point(Vec3::Y);
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(p.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn mat4_round_trip() {
        let t = Transform::from_axis_angle(Vec3::Y, 0.7)
            .compose(&Transform::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        let back = Transform::from_mat4(t.to_mat4());
        assert_relative_eq!(
            t.transform_point(Vec3::ONE).distance(back.transform_point(Vec3::ONE)),
            0.0,
            epsilon = 1e-5
        );
    }

    #[test]
    fn rows_3x4_layout() {
        let t = Transform::from_translation(Vec3::new(4.0, 5.0, 6.0));
        let rows = t.to_rows_3x4();
        assert_eq!(rows[3], 4.0);
        assert_eq!(rows[7], 5.0);
        assert_eq!(rows[11], 6.0);
        assert_eq!(rows[0], 1.0);
        assert_eq!(rows[5], 1.0);
        assert_eq!(rows[10], 1.0);
    }
}
