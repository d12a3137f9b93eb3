use glam::{Mat4, Vec3};

use crate::math::matrix;

/// A ray for hit-testing and picking.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// The origin point of the ray in world space.
    pub origin: Vec3,
    /// The direction of the ray (normalized by [`Ray::new`]).
    pub direction: Vec3,
}

impl Ray {
    /// Creates a new ray with the given origin and direction.
    #[must_use]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Creates a ray without normalizing the direction.
    ///
    /// Used when mapping a ray through a transform: scaling the direction
    /// must be preserved so that the parameter `t` keeps its meaning in the
    /// source space.
    #[must_use]
    pub fn new_unnormalized(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Get a point along the ray at parameter `t`.
    #[must_use]
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Maps the ray through `matrix`.
    ///
    /// A singular matrix degrades the result to a NaN ray (a non-ray) rather
    /// than failing; downstream intersection tests treat it as a miss. This
    /// is the silent degenerate-case path of the walk, as opposed to camera
    /// ray construction which surfaces the singularity as an error.
    #[must_use]
    pub fn transformed_by(&self, matrix: &Mat4) -> Self {
        let inv = matrix::inverse_or_nan(matrix);
        Self::new_unnormalized(
            inv.transform_point3(self.origin),
            inv.transform_vector3(self.direction),
        )
    }
}
