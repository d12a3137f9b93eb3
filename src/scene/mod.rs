//! Scene node hierarchy.
//!
//! Manages the retained object model the compositor mirror is built from:
//! - [`Visual3D`]: the visual layer owning model trees
//! - [`Model`]: groups, geometry models and lights
//! - [`Transform3D`] / [`Rotation3D`]: composable transforms
//! - [`Material`] / [`MeshGeometry`] / [`Camera`]: leaf resources
//! - [`SceneGraph`]: arena container and the mutation API
//!
//! Nodes are arena-allocated and addressed by typed keys; a node may be
//! referenced by several parents (the graph is a DAG, not a tree).

pub mod camera;
pub mod graph;
pub mod material;
pub mod mesh;
pub mod model;
pub mod node;
pub mod transform;
pub mod visual;

pub use camera::{Camera, MatrixCamera, OrthographicCamera, PerspectiveCamera};
pub use graph::{ChangeEvent, PropertyId, SceneGraph};
pub use material::Material;
pub use mesh::MeshGeometry;
pub use model::{Light, Model};
pub use node::{ChangeTracker, NodeCore, NodeFlags};
pub use transform::{Rotation3D, Transform3D};
pub use visual::Visual3D;

use slotmap::new_key_type;

new_key_type! {
    pub struct VisualKey;
    pub struct ModelKey;
    pub struct MeshKey;
    pub struct MaterialKey;
    pub struct TransformKey;
    pub struct RotationKey;
    pub struct CameraKey;
    pub struct AnimatorKey;
}

/// A reference to any node in the graph, across the closed variant
/// hierarchies. This is the dispatch point of the recursive resource
/// protocol and of change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Visual(VisualKey),
    Model(ModelKey),
    Mesh(MeshKey),
    Material(MaterialKey),
    Transform(TransformKey),
    Rotation(RotationKey),
    Camera(CameraKey),
    Animator(AnimatorKey),
}
