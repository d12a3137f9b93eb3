//! Triangle mesh geometry.

use std::cell::RefCell;

use glam::{Vec2, Vec3};

use crate::math::BoundingBox;
use crate::scene::node::NodeCore;

/// Indexed triangle mesh.
///
/// Vertex data is plain CPU-side arrays; the compositor receives a copy in
/// the mesh's command record. The bounding box is computed lazily and cached
/// until the positions change.
#[derive(Debug)]
pub struct MeshGeometry {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    tex_coords: Vec<Vec2>,
    /// Triangle list; three indices per triangle. An empty list means the
    /// positions are consumed as non-indexed triangles.
    indices: Vec<u32>,

    bounds_cache: RefCell<Option<BoundingBox>>,
}

impl MeshGeometry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            positions: Vec::new(),
            normals: Vec::new(),
            tex_coords: Vec::new(),
            indices: Vec::new(),
            bounds_cache: RefCell::new(None),
        }
    }

    #[must_use]
    pub fn with_positions(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let mut mesh = Self::new();
        mesh.positions = positions;
        mesh.indices = indices;
        mesh
    }

    #[must_use]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    #[must_use]
    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    #[must_use]
    pub fn tex_coords(&self) -> &[Vec2] {
        &self.tex_coords
    }

    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub(crate) fn set_positions(&mut self, positions: Vec<Vec3>) {
        self.positions = positions;
        self.bounds_cache.replace(None);
    }

    pub(crate) fn set_normals(&mut self, normals: Vec<Vec3>) {
        self.normals = normals;
    }

    pub(crate) fn set_tex_coords(&mut self, tex_coords: Vec<Vec2>) {
        self.tex_coords = tex_coords;
    }

    pub(crate) fn set_indices(&mut self, indices: Vec<u32>) {
        self.indices = indices;
    }

    /// Axis-aligned bounds of the positions; empty for a vertexless mesh.
    /// Cached until the positions are replaced.
    #[must_use]
    pub fn bounds(&self) -> BoundingBox {
        if let Some(cached) = *self.bounds_cache.borrow() {
            return cached;
        }
        let bounds = BoundingBox::from_points(&self.positions);
        self.bounds_cache.replace(Some(bounds));
        bounds
    }

    /// Iterates triangles as index triples, resolving the implicit
    /// non-indexed case. Trailing partial triangles are dropped.
    pub fn triangle_indices(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        let count = if self.indices.is_empty() {
            self.positions.len() / 3
        } else {
            self.indices.len() / 3
        };
        (0..count).map(move |tri| {
            if self.indices.is_empty() {
                let base = (tri * 3) as u32;
                [base, base + 1, base + 2]
            } else {
                [
                    self.indices[tri * 3],
                    self.indices[tri * 3 + 1],
                    self.indices[tri * 3 + 2],
                ]
            }
        })
    }
}

impl Default for MeshGeometry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MeshGeometry {
    fn clone(&self) -> Self {
        Self {
            positions: self.positions.clone(),
            normals: self.normals.clone(),
            tex_coords: self.tex_coords.clone(),
            indices: self.indices.clone(),
            bounds_cache: RefCell::new(*self.bounds_cache.borrow()),
        }
    }
}

/// Arena record for a mesh node.
#[derive(Debug, Clone)]
pub struct MeshNode {
    pub core: NodeCore,
    pub data: MeshGeometry,
}
