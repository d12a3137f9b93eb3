//! The scene graph container and its mutation API.
//!
//! All nodes live in per-hierarchy arenas owned by [`SceneGraph`]; mutation
//! goes through typed setters that enforce the frozen flag, fire the
//! composition fan-out for every channel the touched node is realized on,
//! and notify registered change listeners afterwards (never under the
//! engine lock).
//!
//! Setter protocol for child-reference properties: identical old and new
//! keys are a sub-property notification and short-circuit without any
//! release/acquire churn; differing keys release the old child and acquire
//! the new one on every realized channel, then re-serialize the owner once
//! per channel. Collection membership replays the same protocol with the
//! load-bearing ordering: acquire-then-serialize on insertion,
//! serialize-then-release on removal.

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::animation::{AnimatedProperty, Animator, AnimatorNode};
use crate::composition::engine::CompositionEngine;
use crate::composition::handle::{ChannelId, ResourceHandle};
use crate::composition::sync;
use crate::errors::{ArborError, Result};
use crate::math::{BoundingBox, Ray};
use crate::scene::camera::{Camera, CameraNode};
use crate::scene::material::{Material, MaterialNode};
use crate::scene::mesh::{MeshGeometry, MeshNode};
use crate::scene::model::{Light, LightKind, Model, ModelNode};
use crate::scene::node::{NodeCore, NodeFlags};
use crate::scene::transform::{Rotation3D, RotationNode, Transform3D, TransformNode};
use crate::scene::visual::{Visual3D, VisualNode};
use crate::scene::{
    AnimatorKey, CameraKey, MaterialKey, MeshKey, ModelKey, NodeRef, RotationKey, TransformKey,
    VisualKey,
};

/// Identifies which property of a node changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyId {
    Transform,
    Content,
    Children,
    HostsContent,
    Mesh,
    Material,
    BackMaterial,
    Rotation,
    Offset,
    Scale,
    Center,
    Matrix,
    Color,
    Power,
    Intensity,
    Direction,
    Position,
    Axis,
    Angle,
    Quaternion,
    Positions,
    Normals,
    TexCoords,
    Indices,
    Fov,
    Width,
    ClipPlanes,
    LookDirection,
    UpDirection,
    Matrices,
}

/// A change notification delivered to listeners after the setter (and its
/// composition fan-out) completed.
#[derive(Debug, Clone, Copy)]
pub struct ChangeEvent {
    pub node: NodeRef,
    pub property: PropertyId,
}

type ChangeListener = Box<dyn FnMut(&ChangeEvent)>;

/// Arena container for every node hierarchy plus the change listeners.
#[derive(Default)]
pub struct SceneGraph {
    pub(crate) visuals: SlotMap<VisualKey, VisualNode>,
    pub(crate) models: SlotMap<ModelKey, ModelNode>,
    pub(crate) meshes: SlotMap<MeshKey, MeshNode>,
    pub(crate) materials: SlotMap<MaterialKey, MaterialNode>,
    pub(crate) transforms: SlotMap<TransformKey, TransformNode>,
    pub(crate) rotations: SlotMap<RotationKey, RotationNode>,
    pub(crate) cameras: SlotMap<CameraKey, CameraNode>,
    pub(crate) animators: SlotMap<AnimatorKey, AnimatorNode>,

    listeners: Vec<ChangeListener>,
}

fn ensure_unfrozen(core: &NodeCore) -> Result<()> {
    if core.flags.contains(NodeFlags::FROZEN) {
        Err(ArborError::Frozen)
    } else {
        Ok(())
    }
}

impl SceneGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Node construction
    // ========================================================================

    pub fn add_visual(&mut self, visual: Visual3D) -> VisualKey {
        self.visuals.insert(VisualNode {
            core: NodeCore::new(),
            data: visual,
        })
    }

    pub fn add_model(&mut self, model: Model) -> ModelKey {
        self.models.insert(ModelNode {
            core: NodeCore::new(),
            transform: None,
            data: model,
        })
    }

    pub fn add_light(&mut self, light: Light) -> ModelKey {
        self.add_model(Model::Light(light))
    }

    pub fn add_mesh(&mut self, mesh: MeshGeometry) -> MeshKey {
        self.meshes.insert(MeshNode {
            core: NodeCore::new(),
            data: mesh,
        })
    }

    pub fn add_material(&mut self, material: Material) -> MaterialKey {
        self.materials.insert(MaterialNode {
            core: NodeCore::new(),
            data: material,
        })
    }

    pub fn add_transform(&mut self, transform: Transform3D) -> TransformKey {
        self.transforms.insert(TransformNode {
            core: NodeCore::new(),
            data: transform,
        })
    }

    pub fn add_rotation(&mut self, rotation: Rotation3D) -> RotationKey {
        self.rotations.insert(RotationNode {
            core: NodeCore::new(),
            data: rotation,
        })
    }

    pub fn add_camera(&mut self, camera: Camera) -> CameraKey {
        self.cameras.insert(CameraNode {
            core: NodeCore::new(),
            transform: None,
            data: camera,
        })
    }

    pub fn add_animator(&mut self, animator: Animator) -> AnimatorKey {
        self.animators.insert(AnimatorNode {
            core: NodeCore::new(),
            data: animator,
        })
    }

    // ========================================================================
    // Node access
    // ========================================================================

    #[must_use]
    pub fn visual(&self, key: VisualKey) -> Option<&VisualNode> {
        self.visuals.get(key)
    }

    #[must_use]
    pub fn model(&self, key: ModelKey) -> Option<&ModelNode> {
        self.models.get(key)
    }

    #[must_use]
    pub fn mesh(&self, key: MeshKey) -> Option<&MeshNode> {
        self.meshes.get(key)
    }

    #[must_use]
    pub fn material(&self, key: MaterialKey) -> Option<&MaterialNode> {
        self.materials.get(key)
    }

    #[must_use]
    pub fn transform(&self, key: TransformKey) -> Option<&TransformNode> {
        self.transforms.get(key)
    }

    #[must_use]
    pub fn rotation(&self, key: RotationKey) -> Option<&RotationNode> {
        self.rotations.get(key)
    }

    #[must_use]
    pub fn camera(&self, key: CameraKey) -> Option<&CameraNode> {
        self.cameras.get(key)
    }

    /// The common header of any node, across hierarchies.
    #[must_use]
    pub fn core_of(&self, node: NodeRef) -> Option<&NodeCore> {
        match node {
            NodeRef::Visual(key) => self.visuals.get(key).map(|n| &n.core),
            NodeRef::Model(key) => self.models.get(key).map(|n| &n.core),
            NodeRef::Mesh(key) => self.meshes.get(key).map(|n| &n.core),
            NodeRef::Material(key) => self.materials.get(key).map(|n| &n.core),
            NodeRef::Transform(key) => self.transforms.get(key).map(|n| &n.core),
            NodeRef::Rotation(key) => self.rotations.get(key).map(|n| &n.core),
            NodeRef::Camera(key) => self.cameras.get(key).map(|n| &n.core),
            NodeRef::Animator(key) => self.animators.get(key).map(|n| &n.core),
        }
    }

    pub(crate) fn core_of_mut(&mut self, node: NodeRef) -> Option<&mut NodeCore> {
        match node {
            NodeRef::Visual(key) => self.visuals.get_mut(key).map(|n| &mut n.core),
            NodeRef::Model(key) => self.models.get_mut(key).map(|n| &mut n.core),
            NodeRef::Mesh(key) => self.meshes.get_mut(key).map(|n| &mut n.core),
            NodeRef::Material(key) => self.materials.get_mut(key).map(|n| &mut n.core),
            NodeRef::Transform(key) => self.transforms.get_mut(key).map(|n| &mut n.core),
            NodeRef::Rotation(key) => self.rotations.get_mut(key).map(|n| &mut n.core),
            NodeRef::Camera(key) => self.cameras.get_mut(key).map(|n| &mut n.core),
            NodeRef::Animator(key) => self.animators.get_mut(key).map(|n| &mut n.core),
        }
    }

    // ------------------------------------------------------------------------
    // Handle lookups used by record serialization
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn handle_of(&self, node: NodeRef, channel: ChannelId) -> Option<ResourceHandle> {
        self.core_of(node)?.channels.handle_on(channel)
    }

    pub(crate) fn visual_handle(
        &self,
        key: Option<VisualKey>,
        channel: ChannelId,
    ) -> Option<ResourceHandle> {
        key.and_then(|k| self.handle_of(NodeRef::Visual(k), channel))
    }

    pub(crate) fn model_handle(
        &self,
        key: Option<ModelKey>,
        channel: ChannelId,
    ) -> Option<ResourceHandle> {
        key.and_then(|k| self.handle_of(NodeRef::Model(k), channel))
    }

    pub(crate) fn mesh_handle(
        &self,
        key: Option<MeshKey>,
        channel: ChannelId,
    ) -> Option<ResourceHandle> {
        key.and_then(|k| self.handle_of(NodeRef::Mesh(k), channel))
    }

    pub(crate) fn material_handle(
        &self,
        key: Option<MaterialKey>,
        channel: ChannelId,
    ) -> Option<ResourceHandle> {
        key.and_then(|k| self.handle_of(NodeRef::Material(k), channel))
    }

    pub(crate) fn transform_handle(
        &self,
        key: Option<TransformKey>,
        channel: ChannelId,
    ) -> Option<ResourceHandle> {
        key.and_then(|k| self.handle_of(NodeRef::Transform(k), channel))
    }

    pub(crate) fn rotation_handle(
        &self,
        key: Option<RotationKey>,
        channel: ChannelId,
    ) -> Option<ResourceHandle> {
        key.and_then(|k| self.handle_of(NodeRef::Rotation(k), channel))
    }

    // ========================================================================
    // Channel realization
    // ========================================================================

    /// Acquires a reference to `node` on `channel`, realizing it (and,
    /// recursively, its children) there if this is the first reference.
    pub fn add_ref_on_channel(
        &mut self,
        engine: &CompositionEngine,
        node: NodeRef,
        channel: ChannelId,
    ) -> ResourceHandle {
        let mut state = engine.lock();
        sync::add_ref_on_channel(self, &mut state, node, channel)
    }

    /// Releases one reference to `node` on `channel`; the last reference
    /// recursively releases the node's children there.
    pub fn release_on_channel(
        &mut self,
        engine: &CompositionEngine,
        node: NodeRef,
        channel: ChannelId,
    ) {
        let mut state = engine.lock();
        sync::release_on_channel(self, &mut state, node, channel);
    }

    /// Re-serializes `node`'s record on `channel`; a no-op for nodes not
    /// realized there.
    pub fn update_resource(
        &self,
        engine: &CompositionEngine,
        node: NodeRef,
        channel: ChannelId,
    ) {
        let mut state = engine.lock();
        sync::update_resource(self, &mut state, node, channel, false);
    }

    /// The node's reference count on `channel` (0 when unrealized).
    #[must_use]
    pub fn refcount_on(&self, node: NodeRef, channel: ChannelId) -> u32 {
        self.core_of(node)
            .map_or(0, |core| core.channels.refcount_on(channel))
    }

    #[must_use]
    pub fn is_realized_on(&self, node: NodeRef, channel: ChannelId) -> bool {
        self.refcount_on(node, channel) > 0
    }

    // ========================================================================
    // Change listeners
    // ========================================================================

    /// Registers a callback receiving every property-change notification.
    pub fn add_change_listener(&mut self, listener: impl FnMut(&ChangeEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn notify(&mut self, node: NodeRef, property: PropertyId) {
        if self.listeners.is_empty() {
            return;
        }
        let event = ChangeEvent { node, property };
        // Listeners run against a detached list so they can never observe a
        // half-mutated graph borrow; they receive the event only.
        let mut listeners = std::mem::take(&mut self.listeners);
        for listener in &mut listeners {
            listener(&event);
        }
        self.listeners = listeners;
    }

    // ========================================================================
    // Shared fan-out helpers
    // ========================================================================

    /// Scalar property changed: bump the version and re-serialize the node
    /// on every realized channel, then notify.
    fn touch(&mut self, engine: &CompositionEngine, node: NodeRef, property: PropertyId) {
        let channels = match self.core_of_mut(node) {
            Some(core) => {
                core.version.changed();
                core.channels.channels()
            }
            None => return,
        };
        if !channels.is_empty() {
            let mut state = engine.lock();
            for channel in &channels {
                sync::update_resource(self, &mut state, node, *channel, true);
            }
        }
        self.notify(node, property);
    }

    /// Child-reference property swapped: on every channel the owner is
    /// realized on, release the old child, acquire the new one, and
    /// re-serialize the owner. Callers have already written the new key into
    /// the owner's record and handled the identical-key short-circuit.
    fn apply_child_swap(
        &mut self,
        engine: &CompositionEngine,
        owner: NodeRef,
        old: Option<NodeRef>,
        new: Option<NodeRef>,
        property: PropertyId,
    ) {
        let channels = match self.core_of_mut(owner) {
            Some(core) => {
                core.version.changed();
                core.channels.channels()
            }
            None => return,
        };
        if !channels.is_empty() {
            let mut state = engine.lock();
            for channel in &channels {
                if let Some(old) = old {
                    sync::release_on_channel(self, &mut state, old, *channel);
                }
                if let Some(new) = new {
                    sync::add_ref_on_channel(self, &mut state, new, *channel);
                }
                sync::update_resource(self, &mut state, owner, *channel, true);
            }
        }
        self.notify(owner, property);
    }

    // ========================================================================
    // Child-reference setters
    // ========================================================================

    pub fn model_set_transform(
        &mut self,
        engine: &CompositionEngine,
        key: ModelKey,
        transform: Option<TransformKey>,
    ) -> Result<()> {
        if let Some(t) = transform
            && !self.transforms.contains_key(t)
        {
            return Err(ArborError::StaleKey("transform"));
        }
        let node = self
            .models
            .get_mut(key)
            .ok_or(ArborError::StaleKey("model"))?;
        ensure_unfrozen(&node.core)?;
        let old = node.transform;
        if old == transform {
            // Sub-property notification with an unchanged reference.
            return Ok(());
        }
        node.transform = transform;
        self.apply_child_swap(
            engine,
            NodeRef::Model(key),
            old.map(NodeRef::Transform),
            transform.map(NodeRef::Transform),
            PropertyId::Transform,
        );
        Ok(())
    }

    pub fn geometry_set_mesh(
        &mut self,
        engine: &CompositionEngine,
        key: ModelKey,
        mesh: Option<MeshKey>,
    ) -> Result<()> {
        if let Some(m) = mesh
            && !self.meshes.contains_key(m)
        {
            return Err(ArborError::StaleKey("mesh"));
        }
        let node = self
            .models
            .get_mut(key)
            .ok_or(ArborError::StaleKey("model"))?;
        ensure_unfrozen(&node.core)?;
        let Model::Geometry { mesh: slot, .. } = &mut node.data else {
            return Err(ArborError::InvalidOperation("not a geometry model"));
        };
        let old = *slot;
        if old == mesh {
            return Ok(());
        }
        *slot = mesh;
        self.apply_child_swap(
            engine,
            NodeRef::Model(key),
            old.map(NodeRef::Mesh),
            mesh.map(NodeRef::Mesh),
            PropertyId::Mesh,
        );
        Ok(())
    }

    pub fn geometry_set_material(
        &mut self,
        engine: &CompositionEngine,
        key: ModelKey,
        material: Option<MaterialKey>,
    ) -> Result<()> {
        self.geometry_set_material_slot(engine, key, material, false)
    }

    pub fn geometry_set_back_material(
        &mut self,
        engine: &CompositionEngine,
        key: ModelKey,
        material: Option<MaterialKey>,
    ) -> Result<()> {
        self.geometry_set_material_slot(engine, key, material, true)
    }

    fn geometry_set_material_slot(
        &mut self,
        engine: &CompositionEngine,
        key: ModelKey,
        material: Option<MaterialKey>,
        back: bool,
    ) -> Result<()> {
        if let Some(m) = material
            && !self.materials.contains_key(m)
        {
            return Err(ArborError::StaleKey("material"));
        }
        let node = self
            .models
            .get_mut(key)
            .ok_or(ArborError::StaleKey("model"))?;
        ensure_unfrozen(&node.core)?;
        let Model::Geometry {
            material: front_slot,
            back_material: back_slot,
            ..
        } = &mut node.data
        else {
            return Err(ArborError::InvalidOperation("not a geometry model"));
        };
        let (slot, property) = if back {
            (back_slot, PropertyId::BackMaterial)
        } else {
            (front_slot, PropertyId::Material)
        };
        let old = *slot;
        if old == material {
            return Ok(());
        }
        *slot = material;
        self.apply_child_swap(
            engine,
            NodeRef::Model(key),
            old.map(NodeRef::Material),
            material.map(NodeRef::Material),
            property,
        );
        Ok(())
    }

    pub fn rotate_set_rotation(
        &mut self,
        engine: &CompositionEngine,
        key: TransformKey,
        rotation: Option<RotationKey>,
    ) -> Result<()> {
        if let Some(r) = rotation
            && !self.rotations.contains_key(r)
        {
            return Err(ArborError::StaleKey("rotation"));
        }
        let node = self
            .transforms
            .get_mut(key)
            .ok_or(ArborError::StaleKey("transform"))?;
        ensure_unfrozen(&node.core)?;
        let Transform3D::Rotate { rotation: slot, .. } = &mut node.data else {
            return Err(ArborError::InvalidOperation("not a rotate transform"));
        };
        let old = *slot;
        if old == rotation {
            return Ok(());
        }
        *slot = rotation;
        self.apply_child_swap(
            engine,
            NodeRef::Transform(key),
            old.map(NodeRef::Rotation),
            rotation.map(NodeRef::Rotation),
            PropertyId::Rotation,
        );
        Ok(())
    }

    pub fn visual_set_transform(
        &mut self,
        engine: &CompositionEngine,
        key: VisualKey,
        transform: Option<TransformKey>,
    ) -> Result<()> {
        if let Some(t) = transform
            && !self.transforms.contains_key(t)
        {
            return Err(ArborError::StaleKey("transform"));
        }
        let node = self
            .visuals
            .get_mut(key)
            .ok_or(ArborError::StaleKey("visual"))?;
        ensure_unfrozen(&node.core)?;
        let old = node.data.transform;
        if old == transform {
            return Ok(());
        }
        node.data.transform = transform;
        self.apply_child_swap(
            engine,
            NodeRef::Visual(key),
            old.map(NodeRef::Transform),
            transform.map(NodeRef::Transform),
            PropertyId::Transform,
        );
        Ok(())
    }

    pub fn visual_set_content(
        &mut self,
        engine: &CompositionEngine,
        key: VisualKey,
        content: Option<ModelKey>,
    ) -> Result<()> {
        if let Some(m) = content
            && !self.models.contains_key(m)
        {
            return Err(ArborError::StaleKey("model"));
        }
        let node = self
            .visuals
            .get_mut(key)
            .ok_or(ArborError::StaleKey("visual"))?;
        ensure_unfrozen(&node.core)?;
        let old = node.data.content;
        if old == content {
            return Ok(());
        }
        node.data.content = content;
        self.apply_child_swap(
            engine,
            NodeRef::Visual(key),
            old.map(NodeRef::Model),
            content.map(NodeRef::Model),
            PropertyId::Content,
        );
        Ok(())
    }

    pub fn visual_set_hosts_2d_content(
        &mut self,
        engine: &CompositionEngine,
        key: VisualKey,
        hosts: bool,
    ) -> Result<()> {
        let node = self
            .visuals
            .get_mut(key)
            .ok_or(ArborError::StaleKey("visual"))?;
        ensure_unfrozen(&node.core)?;
        if node.data.hosts_2d_content == hosts {
            return Ok(());
        }
        node.data.hosts_2d_content = hosts;
        self.touch(engine, NodeRef::Visual(key), PropertyId::HostsContent);
        Ok(())
    }

    pub fn camera_set_transform(
        &mut self,
        engine: &CompositionEngine,
        key: CameraKey,
        transform: Option<TransformKey>,
    ) -> Result<()> {
        if let Some(t) = transform
            && !self.transforms.contains_key(t)
        {
            return Err(ArborError::StaleKey("transform"));
        }
        let node = self
            .cameras
            .get_mut(key)
            .ok_or(ArborError::StaleKey("camera"))?;
        ensure_unfrozen(&node.core)?;
        let old = node.transform;
        if old == transform {
            return Ok(());
        }
        node.transform = transform;
        self.apply_child_swap(
            engine,
            NodeRef::Camera(key),
            old.map(NodeRef::Transform),
            transform.map(NodeRef::Transform),
            PropertyId::Transform,
        );
        Ok(())
    }

    // ========================================================================
    // Collection membership
    // ========================================================================

    pub fn model_group_add(
        &mut self,
        engine: &CompositionEngine,
        group: ModelKey,
        child: ModelKey,
    ) -> Result<()> {
        let len = match &self.models.get(group).ok_or(ArborError::StaleKey("model"))?.data {
            Model::Group { children } => children.len(),
            _ => return Err(ArborError::InvalidOperation("not a model group")),
        };
        self.model_group_insert(engine, group, len, child)
    }

    pub fn model_group_insert(
        &mut self,
        engine: &CompositionEngine,
        group: ModelKey,
        index: usize,
        child: ModelKey,
    ) -> Result<()> {
        if !self.models.contains_key(child) {
            return Err(ArborError::StaleKey("model"));
        }
        if child == group || self.model_reaches(child, group) {
            return Err(ArborError::CycleDetected);
        }
        let node = self
            .models
            .get_mut(group)
            .ok_or(ArborError::StaleKey("model"))?;
        ensure_unfrozen(&node.core)?;
        let Model::Group { children } = &mut node.data else {
            return Err(ArborError::InvalidOperation("not a model group"));
        };
        if index > children.len() {
            return Err(ArborError::InvalidOperation("insertion index out of range"));
        }
        children.insert(index, child);
        self.collection_inserted(engine, NodeRef::Model(group), NodeRef::Model(child));
        Ok(())
    }

    pub fn model_group_remove(
        &mut self,
        engine: &CompositionEngine,
        group: ModelKey,
        index: usize,
    ) -> Result<ModelKey> {
        let node = self
            .models
            .get_mut(group)
            .ok_or(ArborError::StaleKey("model"))?;
        ensure_unfrozen(&node.core)?;
        let Model::Group { children } = &mut node.data else {
            return Err(ArborError::InvalidOperation("not a model group"));
        };
        if index >= children.len() {
            return Err(ArborError::InvalidOperation("removal index out of range"));
        }
        let removed = children.remove(index);
        self.collection_removed(engine, NodeRef::Model(group), NodeRef::Model(removed));
        Ok(removed)
    }

    pub fn material_group_add(
        &mut self,
        engine: &CompositionEngine,
        group: MaterialKey,
        child: MaterialKey,
    ) -> Result<()> {
        let len = match &self
            .materials
            .get(group)
            .ok_or(ArborError::StaleKey("material"))?
            .data
        {
            Material::Group { children } => children.len(),
            _ => return Err(ArborError::InvalidOperation("not a material group")),
        };
        self.material_group_insert(engine, group, len, child)
    }

    pub fn material_group_insert(
        &mut self,
        engine: &CompositionEngine,
        group: MaterialKey,
        index: usize,
        child: MaterialKey,
    ) -> Result<()> {
        if !self.materials.contains_key(child) {
            return Err(ArborError::StaleKey("material"));
        }
        if child == group || self.material_reaches(child, group) {
            return Err(ArborError::CycleDetected);
        }
        let node = self
            .materials
            .get_mut(group)
            .ok_or(ArborError::StaleKey("material"))?;
        ensure_unfrozen(&node.core)?;
        let Material::Group { children } = &mut node.data else {
            return Err(ArborError::InvalidOperation("not a material group"));
        };
        if index > children.len() {
            return Err(ArborError::InvalidOperation("insertion index out of range"));
        }
        children.insert(index, child);
        self.collection_inserted(engine, NodeRef::Material(group), NodeRef::Material(child));
        Ok(())
    }

    pub fn material_group_remove(
        &mut self,
        engine: &CompositionEngine,
        group: MaterialKey,
        index: usize,
    ) -> Result<MaterialKey> {
        let node = self
            .materials
            .get_mut(group)
            .ok_or(ArborError::StaleKey("material"))?;
        ensure_unfrozen(&node.core)?;
        let Material::Group { children } = &mut node.data else {
            return Err(ArborError::InvalidOperation("not a material group"));
        };
        if index >= children.len() {
            return Err(ArborError::InvalidOperation("removal index out of range"));
        }
        let removed = children.remove(index);
        self.collection_removed(engine, NodeRef::Material(group), NodeRef::Material(removed));
        Ok(removed)
    }

    pub fn transform_group_add(
        &mut self,
        engine: &CompositionEngine,
        group: TransformKey,
        child: TransformKey,
    ) -> Result<()> {
        let len = match &self
            .transforms
            .get(group)
            .ok_or(ArborError::StaleKey("transform"))?
            .data
        {
            Transform3D::Group { children } => children.len(),
            _ => return Err(ArborError::InvalidOperation("not a transform group")),
        };
        self.transform_group_insert(engine, group, len, child)
    }

    pub fn transform_group_insert(
        &mut self,
        engine: &CompositionEngine,
        group: TransformKey,
        index: usize,
        child: TransformKey,
    ) -> Result<()> {
        if !self.transforms.contains_key(child) {
            return Err(ArborError::StaleKey("transform"));
        }
        if child == group || self.transform_reaches(child, group) {
            return Err(ArborError::CycleDetected);
        }
        let node = self
            .transforms
            .get_mut(group)
            .ok_or(ArborError::StaleKey("transform"))?;
        ensure_unfrozen(&node.core)?;
        let Transform3D::Group { children } = &mut node.data else {
            return Err(ArborError::InvalidOperation("not a transform group"));
        };
        if index > children.len() {
            return Err(ArborError::InvalidOperation("insertion index out of range"));
        }
        children.insert(index, child);
        self.collection_inserted(engine, NodeRef::Transform(group), NodeRef::Transform(child));
        Ok(())
    }

    pub fn transform_group_remove(
        &mut self,
        engine: &CompositionEngine,
        group: TransformKey,
        index: usize,
    ) -> Result<TransformKey> {
        let node = self
            .transforms
            .get_mut(group)
            .ok_or(ArborError::StaleKey("transform"))?;
        ensure_unfrozen(&node.core)?;
        let Transform3D::Group { children } = &mut node.data else {
            return Err(ArborError::InvalidOperation("not a transform group"));
        };
        if index >= children.len() {
            return Err(ArborError::InvalidOperation("removal index out of range"));
        }
        let removed = children.remove(index);
        self.collection_removed(engine, NodeRef::Transform(group), NodeRef::Transform(removed));
        Ok(removed)
    }

    pub fn visual_add_child(
        &mut self,
        engine: &CompositionEngine,
        parent: VisualKey,
        child: VisualKey,
    ) -> Result<()> {
        let len = self
            .visuals
            .get(parent)
            .ok_or(ArborError::StaleKey("visual"))?
            .data
            .children
            .len();
        self.visual_insert_child(engine, parent, len, child)
    }

    pub fn visual_insert_child(
        &mut self,
        engine: &CompositionEngine,
        parent: VisualKey,
        index: usize,
        child: VisualKey,
    ) -> Result<()> {
        if !self.visuals.contains_key(child) {
            return Err(ArborError::StaleKey("visual"));
        }
        if child == parent || self.visual_reaches(child, parent) {
            return Err(ArborError::CycleDetected);
        }
        let node = self
            .visuals
            .get_mut(parent)
            .ok_or(ArborError::StaleKey("visual"))?;
        ensure_unfrozen(&node.core)?;
        if index > node.data.children.len() {
            return Err(ArborError::InvalidOperation("insertion index out of range"));
        }
        node.data.children.insert(index, child);
        self.collection_inserted(engine, NodeRef::Visual(parent), NodeRef::Visual(child));
        Ok(())
    }

    pub fn visual_remove_child(
        &mut self,
        engine: &CompositionEngine,
        parent: VisualKey,
        index: usize,
    ) -> Result<VisualKey> {
        let node = self
            .visuals
            .get_mut(parent)
            .ok_or(ArborError::StaleKey("visual"))?;
        ensure_unfrozen(&node.core)?;
        if index >= node.data.children.len() {
            return Err(ArborError::InvalidOperation("removal index out of range"));
        }
        let removed = node.data.children.remove(index);
        self.collection_removed(engine, NodeRef::Visual(parent), NodeRef::Visual(removed));
        Ok(removed)
    }

    /// Item already inserted into the owner's list: acquire it on every
    /// realized channel *before* the owner's record mentioning its handle
    /// goes out.
    fn collection_inserted(&mut self, engine: &CompositionEngine, owner: NodeRef, item: NodeRef) {
        let channels = match self.core_of_mut(owner) {
            Some(core) => {
                core.version.changed();
                core.channels.channels()
            }
            None => return,
        };
        if !channels.is_empty() {
            let mut state = engine.lock();
            for channel in &channels {
                sync::add_ref_on_channel(self, &mut state, item, *channel);
                sync::update_resource(self, &mut state, owner, *channel, true);
            }
        }
        self.notify(owner, PropertyId::Children);
    }

    /// Item already removed from the owner's list: re-serialize the owner
    /// first so no in-flight record references the handle after its release.
    fn collection_removed(&mut self, engine: &CompositionEngine, owner: NodeRef, item: NodeRef) {
        let channels = match self.core_of_mut(owner) {
            Some(core) => {
                core.version.changed();
                core.channels.channels()
            }
            None => return,
        };
        if !channels.is_empty() {
            let mut state = engine.lock();
            for channel in &channels {
                sync::update_resource(self, &mut state, owner, *channel, true);
                sync::release_on_channel(self, &mut state, item, *channel);
            }
        }
        self.notify(owner, PropertyId::Children);
    }

    // ------------------------------------------------------------------------
    // Reachability (cycle prevention on insertion)
    // ------------------------------------------------------------------------

    fn model_reaches(&self, from: ModelKey, target: ModelKey) -> bool {
        let Some(node) = self.models.get(from) else {
            return false;
        };
        if let Model::Group { children } = &node.data {
            children
                .iter()
                .any(|child| *child == target || self.model_reaches(*child, target))
        } else {
            false
        }
    }

    fn material_reaches(&self, from: MaterialKey, target: MaterialKey) -> bool {
        let Some(node) = self.materials.get(from) else {
            return false;
        };
        if let Material::Group { children } = &node.data {
            children
                .iter()
                .any(|child| *child == target || self.material_reaches(*child, target))
        } else {
            false
        }
    }

    fn transform_reaches(&self, from: TransformKey, target: TransformKey) -> bool {
        let Some(node) = self.transforms.get(from) else {
            return false;
        };
        if let Transform3D::Group { children } = &node.data {
            children
                .iter()
                .any(|child| *child == target || self.transform_reaches(*child, target))
        } else {
            false
        }
    }

    fn visual_reaches(&self, from: VisualKey, target: VisualKey) -> bool {
        let Some(node) = self.visuals.get(from) else {
            return false;
        };
        node.data
            .children
            .iter()
            .any(|child| *child == target || self.visual_reaches(*child, target))
    }

    // ========================================================================
    // Scalar property setters
    // ========================================================================

    pub fn translate_set_offset(
        &mut self,
        engine: &CompositionEngine,
        key: TransformKey,
        offset: Vec3,
    ) -> Result<()> {
        let node = self
            .transforms
            .get_mut(key)
            .ok_or(ArborError::StaleKey("transform"))?;
        ensure_unfrozen(&node.core)?;
        let Transform3D::Translate { offset: slot } = &mut node.data else {
            return Err(ArborError::InvalidOperation("not a translate transform"));
        };
        slot.set_value(offset);
        self.touch(engine, NodeRef::Transform(key), PropertyId::Offset);
        Ok(())
    }

    pub fn scale_set_scale(
        &mut self,
        engine: &CompositionEngine,
        key: TransformKey,
        scale: Vec3,
    ) -> Result<()> {
        let node = self
            .transforms
            .get_mut(key)
            .ok_or(ArborError::StaleKey("transform"))?;
        ensure_unfrozen(&node.core)?;
        let Transform3D::Scale { scale: slot, .. } = &mut node.data else {
            return Err(ArborError::InvalidOperation("not a scale transform"));
        };
        slot.set_value(scale);
        self.touch(engine, NodeRef::Transform(key), PropertyId::Scale);
        Ok(())
    }

    pub fn transform_set_center(
        &mut self,
        engine: &CompositionEngine,
        key: TransformKey,
        center: Vec3,
    ) -> Result<()> {
        let node = self
            .transforms
            .get_mut(key)
            .ok_or(ArborError::StaleKey("transform"))?;
        ensure_unfrozen(&node.core)?;
        match &mut node.data {
            Transform3D::Scale { center: slot, .. } | Transform3D::Rotate { center: slot, .. } => {
                slot.set_value(center);
            }
            _ => return Err(ArborError::InvalidOperation("transform has no center")),
        }
        self.touch(engine, NodeRef::Transform(key), PropertyId::Center);
        Ok(())
    }

    pub fn matrix_set_matrix(
        &mut self,
        engine: &CompositionEngine,
        key: TransformKey,
        matrix: Mat4,
    ) -> Result<()> {
        let node = self
            .transforms
            .get_mut(key)
            .ok_or(ArborError::StaleKey("transform"))?;
        ensure_unfrozen(&node.core)?;
        let Transform3D::Matrix { matrix: slot } = &mut node.data else {
            return Err(ArborError::InvalidOperation("not a matrix transform"));
        };
        *slot = matrix;
        self.touch(engine, NodeRef::Transform(key), PropertyId::Matrix);
        Ok(())
    }

    pub fn rotation_set_axis(
        &mut self,
        engine: &CompositionEngine,
        key: RotationKey,
        axis: Vec3,
    ) -> Result<()> {
        let node = self
            .rotations
            .get_mut(key)
            .ok_or(ArborError::StaleKey("rotation"))?;
        ensure_unfrozen(&node.core)?;
        let Rotation3D::AxisAngle { axis: slot, .. } = &mut node.data else {
            return Err(ArborError::InvalidOperation("not an axis/angle rotation"));
        };
        slot.set_value(axis);
        self.touch(engine, NodeRef::Rotation(key), PropertyId::Axis);
        Ok(())
    }

    pub fn rotation_set_angle(
        &mut self,
        engine: &CompositionEngine,
        key: RotationKey,
        angle_degrees: f32,
    ) -> Result<()> {
        let node = self
            .rotations
            .get_mut(key)
            .ok_or(ArborError::StaleKey("rotation"))?;
        ensure_unfrozen(&node.core)?;
        let Rotation3D::AxisAngle { angle: slot, .. } = &mut node.data else {
            return Err(ArborError::InvalidOperation("not an axis/angle rotation"));
        };
        slot.set_value(angle_degrees);
        self.touch(engine, NodeRef::Rotation(key), PropertyId::Angle);
        Ok(())
    }

    pub fn rotation_set_quaternion(
        &mut self,
        engine: &CompositionEngine,
        key: RotationKey,
        quaternion: Quat,
    ) -> Result<()> {
        let node = self
            .rotations
            .get_mut(key)
            .ok_or(ArborError::StaleKey("rotation"))?;
        ensure_unfrozen(&node.core)?;
        let Rotation3D::Quaternion { quaternion: slot } = &mut node.data else {
            return Err(ArborError::InvalidOperation("not a quaternion rotation"));
        };
        slot.set_value(quaternion);
        self.touch(engine, NodeRef::Rotation(key), PropertyId::Quaternion);
        Ok(())
    }

    fn light_mut(&mut self, key: ModelKey) -> Result<&mut Light> {
        let node = self
            .models
            .get_mut(key)
            .ok_or(ArborError::StaleKey("model"))?;
        ensure_unfrozen(&node.core)?;
        match &mut node.data {
            Model::Light(light) => Ok(light),
            _ => Err(ArborError::InvalidOperation("not a light")),
        }
    }

    pub fn light_set_color(
        &mut self,
        engine: &CompositionEngine,
        key: ModelKey,
        color: Vec3,
    ) -> Result<()> {
        self.light_mut(key)?.color.set_value(color);
        self.touch(engine, NodeRef::Model(key), PropertyId::Color);
        Ok(())
    }

    pub fn light_set_intensity(
        &mut self,
        engine: &CompositionEngine,
        key: ModelKey,
        intensity: f32,
    ) -> Result<()> {
        self.light_mut(key)?.intensity = intensity;
        self.touch(engine, NodeRef::Model(key), PropertyId::Intensity);
        Ok(())
    }

    pub fn light_set_direction(
        &mut self,
        engine: &CompositionEngine,
        key: ModelKey,
        direction: Vec3,
    ) -> Result<()> {
        match &mut self.light_mut(key)?.kind {
            LightKind::Directional { direction: slot }
            | LightKind::Spot {
                direction: slot, ..
            } => slot.set_value(direction),
            _ => return Err(ArborError::InvalidOperation("light has no direction")),
        }
        self.touch(engine, NodeRef::Model(key), PropertyId::Direction);
        Ok(())
    }

    pub fn light_set_position(
        &mut self,
        engine: &CompositionEngine,
        key: ModelKey,
        position: Vec3,
    ) -> Result<()> {
        match &mut self.light_mut(key)?.kind {
            LightKind::Point { position: slot, .. }
            | LightKind::Spot { position: slot, .. } => slot.set_value(position),
            _ => return Err(ArborError::InvalidOperation("light has no position")),
        }
        self.touch(engine, NodeRef::Model(key), PropertyId::Position);
        Ok(())
    }

    pub fn material_set_color(
        &mut self,
        engine: &CompositionEngine,
        key: MaterialKey,
        color: Vec4,
    ) -> Result<()> {
        let node = self
            .materials
            .get_mut(key)
            .ok_or(ArborError::StaleKey("material"))?;
        ensure_unfrozen(&node.core)?;
        match &mut node.data {
            Material::Diffuse { color: slot }
            | Material::Specular { color: slot, .. }
            | Material::Emissive { color: slot } => slot.set_value(color),
            Material::Group { .. } => {
                return Err(ArborError::InvalidOperation("material group has no color"));
            }
        }
        self.touch(engine, NodeRef::Material(key), PropertyId::Color);
        Ok(())
    }

    pub fn specular_set_power(
        &mut self,
        engine: &CompositionEngine,
        key: MaterialKey,
        power: f32,
    ) -> Result<()> {
        let node = self
            .materials
            .get_mut(key)
            .ok_or(ArborError::StaleKey("material"))?;
        ensure_unfrozen(&node.core)?;
        let Material::Specular { power: slot, .. } = &mut node.data else {
            return Err(ArborError::InvalidOperation("not a specular material"));
        };
        slot.set_value(power);
        self.touch(engine, NodeRef::Material(key), PropertyId::Power);
        Ok(())
    }

    fn mesh_mut(&mut self, key: MeshKey) -> Result<&mut MeshGeometry> {
        let node = self
            .meshes
            .get_mut(key)
            .ok_or(ArborError::StaleKey("mesh"))?;
        ensure_unfrozen(&node.core)?;
        Ok(&mut node.data)
    }

    pub fn mesh_set_positions(
        &mut self,
        engine: &CompositionEngine,
        key: MeshKey,
        positions: Vec<Vec3>,
    ) -> Result<()> {
        self.mesh_mut(key)?.set_positions(positions);
        self.touch(engine, NodeRef::Mesh(key), PropertyId::Positions);
        Ok(())
    }

    pub fn mesh_set_normals(
        &mut self,
        engine: &CompositionEngine,
        key: MeshKey,
        normals: Vec<Vec3>,
    ) -> Result<()> {
        self.mesh_mut(key)?.set_normals(normals);
        self.touch(engine, NodeRef::Mesh(key), PropertyId::Normals);
        Ok(())
    }

    pub fn mesh_set_tex_coords(
        &mut self,
        engine: &CompositionEngine,
        key: MeshKey,
        tex_coords: Vec<Vec2>,
    ) -> Result<()> {
        self.mesh_mut(key)?.set_tex_coords(tex_coords);
        self.touch(engine, NodeRef::Mesh(key), PropertyId::TexCoords);
        Ok(())
    }

    pub fn mesh_set_indices(
        &mut self,
        engine: &CompositionEngine,
        key: MeshKey,
        indices: Vec<u32>,
    ) -> Result<()> {
        self.mesh_mut(key)?.set_indices(indices);
        self.touch(engine, NodeRef::Mesh(key), PropertyId::Indices);
        Ok(())
    }

    fn camera_mut(&mut self, key: CameraKey) -> Result<&mut Camera> {
        let node = self
            .cameras
            .get_mut(key)
            .ok_or(ArborError::StaleKey("camera"))?;
        ensure_unfrozen(&node.core)?;
        Ok(&mut node.data)
    }

    pub fn camera_set_position(
        &mut self,
        engine: &CompositionEngine,
        key: CameraKey,
        position: Vec3,
    ) -> Result<()> {
        match self.camera_mut(key)? {
            Camera::Perspective(cam) => cam.position.set_value(position),
            Camera::Orthographic(cam) => cam.position.set_value(position),
            Camera::Matrix(_) => {
                return Err(ArborError::InvalidOperation("matrix camera has no position"));
            }
        }
        self.touch(engine, NodeRef::Camera(key), PropertyId::Position);
        Ok(())
    }

    pub fn camera_set_look_direction(
        &mut self,
        engine: &CompositionEngine,
        key: CameraKey,
        look_direction: Vec3,
    ) -> Result<()> {
        match self.camera_mut(key)? {
            Camera::Perspective(cam) => cam.look_direction.set_value(look_direction),
            Camera::Orthographic(cam) => cam.look_direction.set_value(look_direction),
            Camera::Matrix(_) => {
                return Err(ArborError::InvalidOperation("matrix camera has no look direction"));
            }
        }
        self.touch(engine, NodeRef::Camera(key), PropertyId::LookDirection);
        Ok(())
    }

    pub fn camera_set_up_direction(
        &mut self,
        engine: &CompositionEngine,
        key: CameraKey,
        up_direction: Vec3,
    ) -> Result<()> {
        match self.camera_mut(key)? {
            Camera::Perspective(cam) => cam.up_direction.set_value(up_direction),
            Camera::Orthographic(cam) => cam.up_direction.set_value(up_direction),
            Camera::Matrix(_) => {
                return Err(ArborError::InvalidOperation("matrix camera has no up direction"));
            }
        }
        self.touch(engine, NodeRef::Camera(key), PropertyId::UpDirection);
        Ok(())
    }

    pub fn camera_set_fov(
        &mut self,
        engine: &CompositionEngine,
        key: CameraKey,
        fov_degrees: f32,
    ) -> Result<()> {
        let Camera::Perspective(cam) = self.camera_mut(key)? else {
            return Err(ArborError::InvalidOperation("not a perspective camera"));
        };
        cam.fov = fov_degrees;
        self.touch(engine, NodeRef::Camera(key), PropertyId::Fov);
        Ok(())
    }

    pub fn camera_set_width(
        &mut self,
        engine: &CompositionEngine,
        key: CameraKey,
        width: f32,
    ) -> Result<()> {
        let Camera::Orthographic(cam) = self.camera_mut(key)? else {
            return Err(ArborError::InvalidOperation("not an orthographic camera"));
        };
        cam.width = width;
        self.touch(engine, NodeRef::Camera(key), PropertyId::Width);
        Ok(())
    }

    pub fn camera_set_clip_planes(
        &mut self,
        engine: &CompositionEngine,
        key: CameraKey,
        near: f32,
        far: f32,
    ) -> Result<()> {
        match self.camera_mut(key)? {
            Camera::Perspective(cam) => {
                cam.near = near;
                cam.far = far;
            }
            Camera::Orthographic(cam) => {
                cam.near = near;
                cam.far = far;
            }
            Camera::Matrix(_) => {
                return Err(ArborError::InvalidOperation("matrix camera has no clip planes"));
            }
        }
        self.touch(engine, NodeRef::Camera(key), PropertyId::ClipPlanes);
        Ok(())
    }

    pub fn camera_set_matrices(
        &mut self,
        engine: &CompositionEngine,
        key: CameraKey,
        view: Mat4,
        projection: Mat4,
    ) -> Result<()> {
        let Camera::Matrix(cam) = self.camera_mut(key)? else {
            return Err(ArborError::InvalidOperation("not a matrix camera"));
        };
        cam.view = view;
        cam.projection = projection;
        self.touch(engine, NodeRef::Camera(key), PropertyId::Matrices);
        Ok(())
    }

    // ========================================================================
    // Animator binding
    // ========================================================================

    /// Binds `animator` to the animatable property `property` of `target`.
    ///
    /// On every realized channel the old animator (if any) is released, the
    /// new one acquired, and the owner re-serialized so its record carries
    /// the animator handle instead of the literal. The owner is registered
    /// for ongoing animation-driven updates.
    pub fn bind_animator(
        &mut self,
        engine: &CompositionEngine,
        target: NodeRef,
        property: PropertyId,
        animator: AnimatorKey,
    ) -> Result<()> {
        if !self.animators.contains_key(animator) {
            return Err(ArborError::StaleKey("animator"));
        }
        let core = self.core_of(target).ok_or(ArborError::StaleKey("node"))?;
        ensure_unfrozen(core)?;
        let old = self.animator_slot_swap(target, property, Some(animator))?;
        if old == Some(animator) {
            return Ok(());
        }

        let channels = match self.core_of_mut(target) {
            Some(core) => {
                core.version.changed();
                core.channels.channels()
            }
            None => return Ok(()),
        };
        if !channels.is_empty() {
            let mut state = engine.lock();
            for channel in &channels {
                if let Some(old) = old {
                    sync::release_on_channel(self, &mut state, NodeRef::Animator(old), *channel);
                }
                sync::add_ref_on_channel(self, &mut state, NodeRef::Animator(animator), *channel);
                state.register_animated(target, *channel);
                sync::update_resource(self, &mut state, target, *channel, true);
            }
        }
        self.notify(target, property);
        Ok(())
    }

    /// Removes the animator bound to `property` of `target`; the property
    /// reverts to serializing its literal value.
    pub fn unbind_animator(
        &mut self,
        engine: &CompositionEngine,
        target: NodeRef,
        property: PropertyId,
    ) -> Result<()> {
        let core = self.core_of(target).ok_or(ArborError::StaleKey("node"))?;
        ensure_unfrozen(core)?;
        let Some(old) = self.animator_slot_swap(target, property, None)? else {
            return Ok(());
        };

        let channels = match self.core_of_mut(target) {
            Some(core) => {
                core.version.changed();
                core.channels.channels()
            }
            None => return Ok(()),
        };
        if !channels.is_empty() {
            let still_animated = sync::children_of(self, target)
                .iter()
                .any(|child| matches!(child, NodeRef::Animator(_)));
            let mut state = engine.lock();
            for channel in &channels {
                sync::release_on_channel(self, &mut state, NodeRef::Animator(old), *channel);
                if !still_animated {
                    state.unregister_animated(target, *channel);
                }
                sync::update_resource(self, &mut state, target, *channel, true);
            }
        }
        self.notify(target, property);
        Ok(())
    }

    /// Writes `new` into the addressed animatable slot and returns the slot's
    /// previous animator.
    fn animator_slot_swap(
        &mut self,
        target: NodeRef,
        property: PropertyId,
        new: Option<AnimatorKey>,
    ) -> Result<Option<AnimatorKey>> {
        fn swap<T>(slot: &mut AnimatedProperty<T>, new: Option<AnimatorKey>) -> Option<AnimatorKey> {
            let old = slot.animator();
            slot.set_animator(new);
            old
        }
        let not_animatable = Err(ArborError::InvalidOperation(
            "property is not animatable on this node",
        ));

        match target {
            NodeRef::Model(key) => {
                let node = self
                    .models
                    .get_mut(key)
                    .ok_or(ArborError::StaleKey("model"))?;
                let Model::Light(light) = &mut node.data else {
                    return not_animatable;
                };
                match (property, &mut light.kind) {
                    (PropertyId::Color, _) => Ok(swap(&mut light.color, new)),
                    (PropertyId::Direction, LightKind::Directional { direction })
                    | (PropertyId::Direction, LightKind::Spot { direction, .. }) => {
                        Ok(swap(direction, new))
                    }
                    (PropertyId::Position, LightKind::Point { position, .. })
                    | (PropertyId::Position, LightKind::Spot { position, .. }) => {
                        Ok(swap(position, new))
                    }
                    _ => not_animatable,
                }
            }
            NodeRef::Material(key) => {
                let node = self
                    .materials
                    .get_mut(key)
                    .ok_or(ArborError::StaleKey("material"))?;
                match (property, &mut node.data) {
                    (PropertyId::Color, Material::Diffuse { color })
                    | (PropertyId::Color, Material::Specular { color, .. })
                    | (PropertyId::Color, Material::Emissive { color }) => Ok(swap(color, new)),
                    (PropertyId::Power, Material::Specular { power, .. }) => Ok(swap(power, new)),
                    _ => not_animatable,
                }
            }
            NodeRef::Transform(key) => {
                let node = self
                    .transforms
                    .get_mut(key)
                    .ok_or(ArborError::StaleKey("transform"))?;
                match (property, &mut node.data) {
                    (PropertyId::Offset, Transform3D::Translate { offset }) => {
                        Ok(swap(offset, new))
                    }
                    (PropertyId::Scale, Transform3D::Scale { scale, .. }) => Ok(swap(scale, new)),
                    (PropertyId::Center, Transform3D::Scale { center, .. })
                    | (PropertyId::Center, Transform3D::Rotate { center, .. }) => {
                        Ok(swap(center, new))
                    }
                    _ => not_animatable,
                }
            }
            NodeRef::Rotation(key) => {
                let node = self
                    .rotations
                    .get_mut(key)
                    .ok_or(ArborError::StaleKey("rotation"))?;
                match (property, &mut node.data) {
                    (PropertyId::Axis, Rotation3D::AxisAngle { axis, .. }) => Ok(swap(axis, new)),
                    (PropertyId::Angle, Rotation3D::AxisAngle { angle, .. }) => {
                        Ok(swap(angle, new))
                    }
                    (PropertyId::Quaternion, Rotation3D::Quaternion { quaternion }) => {
                        Ok(swap(quaternion, new))
                    }
                    _ => not_animatable,
                }
            }
            NodeRef::Camera(key) => {
                let node = self
                    .cameras
                    .get_mut(key)
                    .ok_or(ArborError::StaleKey("camera"))?;
                match (property, &mut node.data) {
                    (PropertyId::Position, Camera::Perspective(cam)) => {
                        Ok(swap(&mut cam.position, new))
                    }
                    (PropertyId::Position, Camera::Orthographic(cam)) => {
                        Ok(swap(&mut cam.position, new))
                    }
                    (PropertyId::LookDirection, Camera::Perspective(cam)) => {
                        Ok(swap(&mut cam.look_direction, new))
                    }
                    (PropertyId::LookDirection, Camera::Orthographic(cam)) => {
                        Ok(swap(&mut cam.look_direction, new))
                    }
                    (PropertyId::UpDirection, Camera::Perspective(cam)) => {
                        Ok(swap(&mut cam.up_direction, new))
                    }
                    (PropertyId::UpDirection, Camera::Orthographic(cam)) => {
                        Ok(swap(&mut cam.up_direction, new))
                    }
                    _ => not_animatable,
                }
            }
            _ => not_animatable,
        }
    }

    // ========================================================================
    // Freeze / clone
    // ========================================================================

    /// Recursively makes `node` and every node reachable from it immutable.
    /// Frozen nodes reject all setters with [`ArborError::Frozen`]; they can
    /// still be realized on and released from channels.
    pub fn freeze(&mut self, node: NodeRef) {
        let Some(core) = self.core_of_mut(node) else {
            return;
        };
        if core.flags.contains(NodeFlags::FROZEN) {
            return;
        }
        core.flags.insert(NodeFlags::FROZEN);
        for child in sync::children_of(self, node) {
            self.freeze(child);
        }
    }

    #[must_use]
    pub fn is_frozen(&self, node: NodeRef) -> bool {
        self.core_of(node)
            .is_some_and(|core| core.flags.contains(NodeFlags::FROZEN))
    }

    /// Deep-copies `node` and everything reachable from it into fresh,
    /// mutable, unrealized arena entries. Nodes shared along several paths
    /// are cloned once, preserving the DAG shape.
    pub fn clone_subtree(&mut self, node: NodeRef) -> Result<NodeRef> {
        let mut memo = FxHashMap::default();
        self.clone_rec(node, &mut memo)
    }

    fn clone_rec(
        &mut self,
        node: NodeRef,
        memo: &mut FxHashMap<NodeRef, NodeRef>,
    ) -> Result<NodeRef> {
        if let Some(done) = memo.get(&node) {
            return Ok(*done);
        }
        let cloned = match node {
            NodeRef::Visual(key) => {
                let data = self
                    .visuals
                    .get(key)
                    .ok_or(ArborError::StaleKey("visual"))?
                    .data
                    .clone();
                let transform = self.clone_opt_transform(data.transform, memo)?;
                let content = match data.content {
                    Some(model) => Some(self.clone_model(model, memo)?),
                    None => None,
                };
                let mut children = Vec::with_capacity(data.children.len());
                for child in &data.children {
                    let cloned_child = self.clone_rec(NodeRef::Visual(*child), memo)?;
                    if let NodeRef::Visual(v) = cloned_child {
                        children.push(v);
                    }
                }
                NodeRef::Visual(self.add_visual(Visual3D {
                    transform,
                    content,
                    children,
                    hosts_2d_content: data.hosts_2d_content,
                }))
            }
            NodeRef::Model(key) => NodeRef::Model(self.clone_model(key, memo)?),
            NodeRef::Mesh(key) => {
                let data = self
                    .meshes
                    .get(key)
                    .ok_or(ArborError::StaleKey("mesh"))?
                    .data
                    .clone();
                NodeRef::Mesh(self.add_mesh(data))
            }
            NodeRef::Material(key) => {
                let data = self
                    .materials
                    .get(key)
                    .ok_or(ArborError::StaleKey("material"))?
                    .data
                    .clone();
                let data = match data {
                    Material::Diffuse { color } => Material::Diffuse {
                        color: self.clone_prop(color, memo)?,
                    },
                    Material::Specular { color, power } => Material::Specular {
                        color: self.clone_prop(color, memo)?,
                        power: self.clone_prop(power, memo)?,
                    },
                    Material::Emissive { color } => Material::Emissive {
                        color: self.clone_prop(color, memo)?,
                    },
                    Material::Group { children } => {
                        let mut cloned_children = Vec::with_capacity(children.len());
                        for child in children {
                            if let NodeRef::Material(m) =
                                self.clone_rec(NodeRef::Material(child), memo)?
                            {
                                cloned_children.push(m);
                            }
                        }
                        Material::Group {
                            children: cloned_children,
                        }
                    }
                };
                NodeRef::Material(self.add_material(data))
            }
            NodeRef::Transform(key) => NodeRef::Transform(self.clone_transform(key, memo)?),
            NodeRef::Rotation(key) => {
                let data = self
                    .rotations
                    .get(key)
                    .ok_or(ArborError::StaleKey("rotation"))?
                    .data
                    .clone();
                let data = match data {
                    Rotation3D::AxisAngle { axis, angle } => Rotation3D::AxisAngle {
                        axis: self.clone_prop(axis, memo)?,
                        angle: self.clone_prop(angle, memo)?,
                    },
                    Rotation3D::Quaternion { quaternion } => Rotation3D::Quaternion {
                        quaternion: self.clone_prop(quaternion, memo)?,
                    },
                };
                NodeRef::Rotation(self.add_rotation(data))
            }
            NodeRef::Camera(key) => {
                let record = self
                    .cameras
                    .get(key)
                    .ok_or(ArborError::StaleKey("camera"))?;
                let data = record.data.clone();
                let transform = record.transform;
                let transform = self.clone_opt_transform(transform, memo)?;
                let data = match data {
                    Camera::Perspective(cam) => {
                        Camera::Perspective(super::camera::PerspectiveCamera {
                            position: self.clone_prop(cam.position, memo)?,
                            look_direction: self.clone_prop(cam.look_direction, memo)?,
                            up_direction: self.clone_prop(cam.up_direction, memo)?,
                            fov: cam.fov,
                            near: cam.near,
                            far: cam.far,
                        })
                    }
                    Camera::Orthographic(cam) => {
                        Camera::Orthographic(super::camera::OrthographicCamera {
                            position: self.clone_prop(cam.position, memo)?,
                            look_direction: self.clone_prop(cam.look_direction, memo)?,
                            up_direction: self.clone_prop(cam.up_direction, memo)?,
                            width: cam.width,
                            near: cam.near,
                            far: cam.far,
                        })
                    }
                    Camera::Matrix(cam) => Camera::Matrix(cam),
                };
                let cloned = self.add_camera(data);
                if let Some(camera) = self.cameras.get_mut(cloned) {
                    camera.transform = transform;
                }
                NodeRef::Camera(cloned)
            }
            NodeRef::Animator(key) => {
                let data = self
                    .animators
                    .get(key)
                    .ok_or(ArborError::StaleKey("animator"))?
                    .data
                    .clone();
                NodeRef::Animator(self.add_animator(data))
            }
        };
        memo.insert(node, cloned);
        Ok(cloned)
    }

    fn clone_model(
        &mut self,
        key: ModelKey,
        memo: &mut FxHashMap<NodeRef, NodeRef>,
    ) -> Result<ModelKey> {
        if let Some(NodeRef::Model(done)) = memo.get(&NodeRef::Model(key)) {
            return Ok(*done);
        }
        let record = self.models.get(key).ok_or(ArborError::StaleKey("model"))?;
        let data = record.data.clone();
        let transform = record.transform;

        let transform = self.clone_opt_transform(transform, memo)?;
        let data = match data {
            Model::Group { children } => {
                let mut cloned_children = Vec::with_capacity(children.len());
                for child in children {
                    cloned_children.push(self.clone_model(child, memo)?);
                }
                Model::Group {
                    children: cloned_children,
                }
            }
            Model::Geometry {
                mesh,
                material,
                back_material,
            } => {
                let mesh = match mesh {
                    Some(m) => match self.clone_rec(NodeRef::Mesh(m), memo)? {
                        NodeRef::Mesh(m) => Some(m),
                        _ => None,
                    },
                    None => None,
                };
                let material = self.clone_opt_material(material, memo)?;
                let back_material = self.clone_opt_material(back_material, memo)?;
                Model::Geometry {
                    mesh,
                    material,
                    back_material,
                }
            }
            Model::Light(light) => {
                let color = self.clone_prop(light.color, memo)?;
                let kind = match light.kind {
                    LightKind::Ambient => LightKind::Ambient,
                    LightKind::Directional { direction } => LightKind::Directional {
                        direction: self.clone_prop(direction, memo)?,
                    },
                    LightKind::Point {
                        position,
                        range,
                        attenuation,
                    } => LightKind::Point {
                        position: self.clone_prop(position, memo)?,
                        range,
                        attenuation,
                    },
                    LightKind::Spot {
                        position,
                        direction,
                        range,
                        inner_cone,
                        outer_cone,
                        attenuation,
                    } => LightKind::Spot {
                        position: self.clone_prop(position, memo)?,
                        direction: self.clone_prop(direction, memo)?,
                        range,
                        inner_cone,
                        outer_cone,
                        attenuation,
                    },
                };
                Model::Light(Light {
                    color,
                    intensity: light.intensity,
                    kind,
                })
            }
        };
        let cloned = self.add_model(data);
        if let Some(model) = self.models.get_mut(cloned) {
            model.transform = transform;
        }
        memo.insert(NodeRef::Model(key), NodeRef::Model(cloned));
        Ok(cloned)
    }

    fn clone_transform(
        &mut self,
        key: TransformKey,
        memo: &mut FxHashMap<NodeRef, NodeRef>,
    ) -> Result<TransformKey> {
        if let Some(NodeRef::Transform(done)) = memo.get(&NodeRef::Transform(key)) {
            return Ok(*done);
        }
        let data = self
            .transforms
            .get(key)
            .ok_or(ArborError::StaleKey("transform"))?
            .data
            .clone();
        let data = match data {
            Transform3D::Translate { offset } => Transform3D::Translate {
                offset: self.clone_prop(offset, memo)?,
            },
            Transform3D::Scale { scale, center } => Transform3D::Scale {
                scale: self.clone_prop(scale, memo)?,
                center: self.clone_prop(center, memo)?,
            },
            Transform3D::Rotate { rotation, center } => {
                let rotation = match rotation {
                    Some(r) => match self.clone_rec(NodeRef::Rotation(r), memo)? {
                        NodeRef::Rotation(r) => Some(r),
                        _ => None,
                    },
                    None => None,
                };
                Transform3D::Rotate {
                    rotation,
                    center: self.clone_prop(center, memo)?,
                }
            }
            Transform3D::Matrix { matrix } => Transform3D::Matrix { matrix },
            Transform3D::Group { children } => {
                let mut cloned_children = Vec::with_capacity(children.len());
                for child in children {
                    cloned_children.push(self.clone_transform(child, memo)?);
                }
                Transform3D::Group {
                    children: cloned_children,
                }
            }
        };
        let cloned = self.add_transform(data);
        memo.insert(NodeRef::Transform(key), NodeRef::Transform(cloned));
        Ok(cloned)
    }

    fn clone_opt_transform(
        &mut self,
        key: Option<TransformKey>,
        memo: &mut FxHashMap<NodeRef, NodeRef>,
    ) -> Result<Option<TransformKey>> {
        match key {
            Some(t) => Ok(Some(self.clone_transform(t, memo)?)),
            None => Ok(None),
        }
    }

    fn clone_opt_material(
        &mut self,
        key: Option<MaterialKey>,
        memo: &mut FxHashMap<NodeRef, NodeRef>,
    ) -> Result<Option<MaterialKey>> {
        match key {
            Some(m) => match self.clone_rec(NodeRef::Material(m), memo)? {
                NodeRef::Material(m) => Ok(Some(m)),
                _ => Ok(None),
            },
            None => Ok(None),
        }
    }

    fn clone_prop<T: Clone>(
        &mut self,
        prop: AnimatedProperty<T>,
        memo: &mut FxHashMap<NodeRef, NodeRef>,
    ) -> Result<AnimatedProperty<T>> {
        let mut out = AnimatedProperty::new(prop.value().clone());
        if let Some(animator) = prop.animator()
            && let NodeRef::Animator(cloned) = self.clone_rec(NodeRef::Animator(animator), memo)?
        {
            out.set_animator(Some(cloned));
        }
        Ok(out)
    }

    // ========================================================================
    // Geometry queries
    // ========================================================================

    /// The composed local matrix of an optional transform reference;
    /// identity for `None` and for stale keys.
    #[must_use]
    pub fn transform_value(&self, key: Option<TransformKey>) -> Mat4 {
        key.and_then(|k| self.transforms.get(k))
            .map_or(Mat4::IDENTITY, |node| node.data.value(self))
    }

    /// Outer-space bounds of a model: the union of children's outer bounds
    /// for groups, the mesh bounds for geometry models and the empty box for
    /// lights, all run through the model's own transform.
    #[must_use]
    pub fn model_bounds(&self, key: ModelKey) -> BoundingBox {
        let Some(node) = self.models.get(key) else {
            return BoundingBox::EMPTY;
        };
        let inner = match &node.data {
            Model::Group { children } => children.iter().fold(BoundingBox::EMPTY, |acc, child| {
                acc.union(&self.model_bounds(*child))
            }),
            Model::Geometry { mesh, .. } => mesh
                .and_then(|m| self.meshes.get(m))
                .map_or(BoundingBox::EMPTY, |m| m.data.bounds()),
            Model::Light(_) => BoundingBox::EMPTY,
        };
        if node.transform.is_none() {
            return inner;
        }
        inner.transform(&self.transform_value(node.transform))
    }

    /// Constructs the world-space pick ray through `point` for the given
    /// camera node, honoring the camera's node-level transform. Also returns
    /// the composed view*projection matrix for mapping hits back to 2-D.
    pub fn camera_viewport_ray(
        &self,
        key: CameraKey,
        point: Vec2,
        viewport_size: Vec2,
    ) -> Result<(Ray, Mat4)> {
        let node = self.cameras.get(key).ok_or(ArborError::StaleKey("camera"))?;
        let placement = self.transform_value(node.transform);
        node.data.viewport_ray(&placement, point, viewport_size)
    }
}
