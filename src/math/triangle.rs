use glam::Vec3;

use crate::math::ray::Ray;

const EPSILON: f32 = 1e-6;

/// Result of a ray/triangle intersection: the ray parameter and the
/// barycentric coordinates of the hit.
///
/// `u` weights the second vertex and `v` the third; the first vertex's
/// weight is derived as `1 - u - v`.
#[derive(Debug, Clone, Copy)]
pub struct TriangleHit {
    pub t: f32,
    pub u: f32,
    pub v: f32,
}

impl TriangleHit {
    /// Weight of the first triangle vertex.
    #[must_use]
    pub fn w(&self) -> f32 {
        1.0 - self.u - self.v
    }
}

/// Möller-Trumbore ray-triangle intersection.
///
/// Returns the hit with `t >= 0` (in front of the ray origin), or `None` for
/// parallel rays, back-parameter hits, and hits outside the triangle. NaN
/// inputs fall out through the comparisons as misses.
///
/// See: "Fast, Minimum Storage Ray/Triangle Intersection" by Möller & Trumbore.
#[must_use]
pub fn intersect_triangle(ray: &Ray, v0: Vec3, v1: Vec3, v2: Vec3) -> Option<TriangleHit> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    let h = ray.direction.cross(edge2);
    let a = edge1.dot(h);

    // Ray parallel to triangle?
    if a.abs() < EPSILON {
        return None;
    }

    let f = 1.0 / a;
    let s = ray.origin - v0;
    let u = f * s.dot(h);

    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = f * ray.direction.dot(q);

    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(q);

    if t >= 0.0 {
        Some(TriangleHit { t, u, v })
    } else {
        None
    }
}
