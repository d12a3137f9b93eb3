use glam::{Mat4, Vec3};

use crate::math::ray::Ray;

/// Axis-aligned bounding box.
///
/// The empty box is represented with inverted infinities so that `union`
/// with any real box is the identity operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// The empty box. Unioning it with anything returns the other operand.
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    #[must_use]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing all `points`; empty for an empty slice.
    #[must_use]
    pub fn from_points(points: &[Vec3]) -> Self {
        let mut out = Self::EMPTY;
        for p in points {
            out.min = out.min.min(*p);
            out.max = out.max.max(*p);
        }
        out
    }

    /// An empty box has no extent on at least one axis.
    ///
    /// NaN extents also count as empty, which is what silently drops
    /// subtrees behind a degenerate (NaN) transform out of hit-testing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z)
    }

    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    #[must_use]
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Transforms the eight corners and re-wraps them in an axis-aligned box.
    /// The empty box stays empty regardless of the matrix.
    #[must_use]
    pub fn transform(&self, matrix: &Mat4) -> Self {
        if self.is_empty() {
            return Self::EMPTY;
        }

        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];

        let mut new_min = Vec3::splat(f32::INFINITY);
        let mut new_max = Vec3::splat(f32::NEG_INFINITY);

        for point in corners {
            let transformed = matrix.transform_point3(point);
            new_min = new_min.min(transformed);
            new_max = new_max.max(transformed);
        }

        Self {
            min: new_min,
            max: new_max,
        }
    }

    /// Slab test of a ray (or the degenerate line a NaN matrix produces)
    /// against the box. Written so that any NaN component compares false and
    /// the test reports a miss instead of propagating garbage hits.
    #[must_use]
    pub fn intersects_ray(&self, ray: &Ray) -> bool {
        if self.is_empty() || !ray.origin.is_finite() || !ray.direction.is_finite() {
            return false;
        }

        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;

        for axis in 0..3 {
            let origin = ray.origin[axis];
            let dir = ray.direction[axis];
            if dir.abs() < f32::EPSILON {
                // Ray parallel to the slab: degenerate to a point-in-slab check.
                if origin < self.min[axis] || origin > self.max[axis] {
                    return false;
                }
            } else {
                let inv = 1.0 / dir;
                let t0 = (self.min[axis] - origin) * inv;
                let t1 = (self.max[axis] - origin) * inv;
                let (near, far) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };
                t_min = t_min.max(near);
                t_max = t_max.min(far);
                if !(t_min <= t_max) || t_max < 0.0 {
                    return false;
                }
            }
        }

        true
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}
