use glam::Vec3;

use crate::scene::{MeshKey, ModelKey, VisualKey};

/// One hit against mesh geometry.
///
/// Mesh geometry is the only primitive producing hits, so the base fields
/// (hit visual, hit model) and the mesh-specific ones live in one record.
/// The first vertex weight is derived from the stored barycentric pair.
#[derive(Debug, Clone, Copy)]
pub struct RayMeshResult {
    /// The visual whose content produced the hit.
    pub visual: VisualKey,
    /// The geometry model that was intersected.
    pub model: ModelKey,
    /// The mesh node the triangle belongs to.
    pub mesh: MeshKey,

    /// Hit point in world space.
    pub point_hit: Vec3,
    /// Distance from the ray origin to the hit point, after any
    /// distance-adjustment rebasing.
    pub distance: f32,

    /// Indices of the intersected triangle's vertices.
    pub vertex_index1: u32,
    pub vertex_index2: u32,
    pub vertex_index3: u32,

    /// Barycentric weight of the second vertex.
    pub vertex_weight2: f32,
    /// Barycentric weight of the third vertex.
    pub vertex_weight3: f32,
}

impl RayMeshResult {
    /// Barycentric weight of the first vertex: `1 - weight2 - weight3`.
    #[must_use]
    pub fn vertex_weight1(&self) -> f32 {
        1.0 - self.vertex_weight2 - self.vertex_weight3
    }
}
