//! Matrix composition helpers.
//!
//! Composition order convention: `append(m, other)` is `m * other`, so a
//! transform list composed by successive appends multiplies out left to
//! right in iteration order. Inversion is never allowed to panic: callers
//! either check [`has_inverse`] first or accept the NaN matrix produced by
//! [`inverse_or_nan`], which then propagates through any further
//! composition and invalidates downstream geometry without halting a walk.

use glam::{Mat4, Vec3};

use crate::errors::{ArborError, Result};

/// A 4x4 matrix with every lane set to NaN. The degenerate-inverse sentinel.
#[must_use]
pub fn nan_matrix() -> Mat4 {
    Mat4::from_cols_array(&[f32::NAN; 16])
}

/// `m * other`: applies `other` in `m`'s existing local frame.
#[must_use]
pub fn append(m: &Mat4, other: &Mat4) -> Mat4 {
    *m * *other
}

/// Whether the matrix has a usable inverse (finite, non-zero determinant).
#[must_use]
pub fn has_inverse(m: &Mat4) -> bool {
    let det = m.determinant();
    det != 0.0 && det.is_finite()
}

/// The inverse of `m`, or the NaN sentinel when `m` is singular.
#[must_use]
pub fn inverse_or_nan(m: &Mat4) -> Mat4 {
    if has_inverse(m) {
        m.inverse()
    } else {
        nan_matrix()
    }
}

/// Projective point transform. `None` when the homogeneous divide is
/// degenerate (zero or non-finite W) or when the matrix carries NaN.
#[must_use]
pub fn try_transform_point(m: &Mat4, point: Vec3) -> Option<Vec3> {
    let v = *m * point.extend(1.0);
    if v.w == 0.0 || !v.w.is_finite() {
        return None;
    }
    let out = v.truncate() / v.w;
    out.is_finite().then_some(out)
}

/// Convenience form of [`try_transform_point`] that converts the local
/// failure into a reported error.
pub fn transform_point(m: &Mat4, point: Vec3) -> Result<Vec3> {
    try_transform_point(m, point).ok_or(ArborError::TransformFailed("point projection"))
}
