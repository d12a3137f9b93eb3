//! arbor3d: a retained-mode 3-D scene graph.
//!
//! Applications build a DAG of visuals, models, lights, cameras, materials
//! and transforms; the [`composition`] layer mirrors that graph into an
//! external compositor's representation (per channel, incrementally, with
//! reference counting), and the [`hittest`] layer walks the same graph to
//! resolve world-space pick rays into distance-ordered results.

pub mod animation;
pub mod composition;
pub mod errors;
pub mod hittest;
pub mod math;
pub mod scene;

pub use animation::{AnimatedProperty, Animator, AnimatorTarget};
pub use composition::{
    Channel, ChannelId, Command, CommandKind, CompositionEngine, ResourceHandle,
};
pub use errors::{ArborError, Result};
pub use hittest::{
    HitTestBehavior, HitTestFilterBehavior, HitTestOptions, MatrixStack, RayHitTestParameters,
    RayMeshResult, hit_test,
};
pub use math::{BoundingBox, Ray};
pub use scene::{
    AnimatorKey, Camera, CameraKey, ChangeEvent, Light, Material, MaterialKey, MeshGeometry,
    MeshKey, Model, ModelKey, NodeRef, PropertyId, Rotation3D, RotationKey, SceneGraph,
    Transform3D, TransformKey, Visual3D, VisualKey,
};
