//! Resource synchronization protocol tests
//!
//! Tests for:
//! - Recursive realize/release with per-channel reference counts
//! - Create-before-reference command ordering
//! - Idempotent re-serialization (byte-identical records)
//! - Child reference swaps: exactly one release/acquire/update per channel
//! - Sub-property no-op short-circuit
//! - Collection membership ordering (acquire/serialize, serialize/release)
//! - Animator binding: handle-instead-of-literal records and update
//!   registration

use std::cell::RefCell;
use std::rc::Rc;

use arbor3d::composition::{ChannelId, CommandKind, CompositionEngine};
use arbor3d::scene::model::Light;
use arbor3d::scene::{
    Material, MeshGeometry, MeshKey, Model, ModelKey, NodeRef, PropertyId, SceneGraph,
    TransformKey, Transform3D, Visual3D, VisualKey,
};
use arbor3d::animation::{Animator, AnimatorTarget};
use glam::{Vec3, Vec4};

// ============================================================================
// Fixture
// ============================================================================

struct Fixture {
    graph: SceneGraph,
    engine: CompositionEngine,
    visual: VisualKey,
    group: ModelKey,
    geometry: ModelKey,
    mesh: MeshKey,
    material: arbor3d::scene::MaterialKey,
    transform: TransformKey,
}

fn triangle_mesh() -> MeshGeometry {
    MeshGeometry::with_positions(
        vec![
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ],
        vec![0, 1, 2],
    )
}

/// visual -> group -> geometry { transform, mesh, material }
fn build() -> Fixture {
    let mut graph = SceneGraph::new();
    let engine = CompositionEngine::new();

    let mesh = graph.add_mesh(triangle_mesh());
    let material = graph.add_material(Material::diffuse(Vec4::new(1.0, 0.0, 0.0, 1.0)));
    let geometry = graph.add_model(Model::geometry(mesh, material));
    let transform = graph.add_transform(Transform3D::translate(Vec3::X));
    graph.model_set_transform(&engine, geometry, Some(transform)).unwrap();

    let group = graph.add_model(Model::group(vec![]));
    graph.model_group_add(&engine, group, geometry).unwrap();

    let visual = graph.add_visual(Visual3D::with_content(group));

    Fixture {
        graph,
        engine,
        visual,
        group,
        geometry,
        mesh,
        material,
        transform,
    }
}

fn kinds(engine: &CompositionEngine, channel: ChannelId) -> Vec<CommandKind> {
    engine
        .take_commands(channel)
        .iter()
        .map(|c| c.kind)
        .collect()
}

// ============================================================================
// Realize / release
// ============================================================================

#[test]
fn realize_is_recursive_and_counts_once_per_parent() {
    let mut f = build();
    let channel = f.engine.open_channel();

    let handle = f
        .graph
        .add_ref_on_channel(&f.engine, NodeRef::Visual(f.visual), channel);
    assert!(!handle.is_null());

    for node in [
        NodeRef::Visual(f.visual),
        NodeRef::Model(f.group),
        NodeRef::Model(f.geometry),
        NodeRef::Mesh(f.mesh),
        NodeRef::Material(f.material),
        NodeRef::Transform(f.transform),
    ] {
        assert_eq!(f.graph.refcount_on(node, channel), 1, "{node:?}");
    }
}

#[test]
fn create_commands_precede_references_to_them() {
    let mut f = build();
    let channel = f.engine.open_channel();
    f.graph
        .add_ref_on_channel(&f.engine, NodeRef::Visual(f.visual), channel);

    // Depth-first acquisition: every child's record lands on the channel
    // before the record of the parent that references its handle.
    let kinds = kinds(&f.engine, channel);
    assert_eq!(
        kinds,
        vec![
            CommandKind::TranslateTransform,
            CommandKind::MeshGeometry,
            CommandKind::DiffuseMaterial,
            CommandKind::GeometryModel,
            CommandKind::ModelGroup,
            CommandKind::Visual,
        ]
    );
}

#[test]
fn second_reference_only_increments() {
    let mut f = build();
    let channel = f.engine.open_channel();

    f.graph
        .add_ref_on_channel(&f.engine, NodeRef::Model(f.geometry), channel);
    f.engine.take_commands(channel);

    let before = f.graph.refcount_on(NodeRef::Model(f.geometry), channel);
    f.graph
        .add_ref_on_channel(&f.engine, NodeRef::Model(f.geometry), channel);

    assert_eq!(f.graph.refcount_on(NodeRef::Model(f.geometry), channel), before + 1);
    // Children stay at one reference from this parent...
    assert_eq!(f.graph.refcount_on(NodeRef::Mesh(f.mesh), channel), 1);
    // ...and no new commands are emitted.
    assert!(f.engine.take_commands(channel).is_empty());
}

#[test]
fn shared_child_counts_per_referencing_parent() {
    let mut f = build();
    let channel = f.engine.open_channel();

    // Second geometry model sharing the same mesh and material.
    let second = f.graph.add_model(Model::geometry(f.mesh, f.material));
    f.graph.model_group_add(&f.engine, f.group, second).unwrap();

    f.graph
        .add_ref_on_channel(&f.engine, NodeRef::Visual(f.visual), channel);

    assert_eq!(f.graph.refcount_on(NodeRef::Mesh(f.mesh), channel), 2);
    assert_eq!(f.graph.refcount_on(NodeRef::Material(f.material), channel), 2);

    // Dropping one referencing parent leaves the shared child realized.
    f.graph.model_group_remove(&f.engine, f.group, 1).unwrap();
    assert_eq!(f.graph.refcount_on(NodeRef::Mesh(f.mesh), channel), 1);
    assert_eq!(f.graph.refcount_on(NodeRef::Model(second), channel), 0);

    f.graph.model_group_remove(&f.engine, f.group, 0).unwrap();
    assert_eq!(f.graph.refcount_on(NodeRef::Mesh(f.mesh), channel), 0);
}

#[test]
fn release_last_reference_tears_down_recursively() {
    let mut f = build();
    let channel = f.engine.open_channel();

    f.graph
        .add_ref_on_channel(&f.engine, NodeRef::Visual(f.visual), channel);
    f.graph
        .release_on_channel(&f.engine, NodeRef::Visual(f.visual), channel);

    for node in [
        NodeRef::Visual(f.visual),
        NodeRef::Model(f.group),
        NodeRef::Model(f.geometry),
        NodeRef::Mesh(f.mesh),
        NodeRef::Material(f.material),
        NodeRef::Transform(f.transform),
    ] {
        assert_eq!(f.graph.refcount_on(node, channel), 0, "{node:?}");
    }
}

#[test]
fn multi_channel_realization_is_independent() {
    let mut f = build();
    let ch1 = f.engine.open_channel();
    let ch2 = f.engine.open_channel();

    f.graph
        .add_ref_on_channel(&f.engine, NodeRef::Visual(f.visual), ch1);
    f.graph
        .add_ref_on_channel(&f.engine, NodeRef::Visual(f.visual), ch2);

    assert_eq!(f.graph.refcount_on(NodeRef::Mesh(f.mesh), ch1), 1);
    assert_eq!(f.graph.refcount_on(NodeRef::Mesh(f.mesh), ch2), 1);

    f.graph
        .release_on_channel(&f.engine, NodeRef::Visual(f.visual), ch1);
    assert_eq!(f.graph.refcount_on(NodeRef::Mesh(f.mesh), ch1), 0);
    assert_eq!(f.graph.refcount_on(NodeRef::Mesh(f.mesh), ch2), 1);
}

// ============================================================================
// Update
// ============================================================================

#[test]
fn update_without_change_is_byte_identical() {
    let mut f = build();
    let channel = f.engine.open_channel();
    f.graph
        .add_ref_on_channel(&f.engine, NodeRef::Visual(f.visual), channel);
    f.engine.take_commands(channel);

    f.graph
        .update_resource(&f.engine, NodeRef::Model(f.geometry), channel);
    f.graph
        .update_resource(&f.engine, NodeRef::Model(f.geometry), channel);

    let commands = f.engine.take_commands(channel);
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0], commands[1]);
}

#[test]
fn update_on_unrealized_node_is_a_noop() {
    let f = build();
    let channel = f.engine.open_channel();

    f.graph
        .update_resource(&f.engine, NodeRef::Model(f.geometry), channel);
    assert!(f.engine.take_commands(channel).is_empty());
}

#[test]
fn scalar_mutation_updates_every_realized_channel() {
    let mut f = build();
    let ch1 = f.engine.open_channel();
    let ch2 = f.engine.open_channel();
    f.graph
        .add_ref_on_channel(&f.engine, NodeRef::Visual(f.visual), ch1);
    f.graph
        .add_ref_on_channel(&f.engine, NodeRef::Visual(f.visual), ch2);
    f.engine.take_commands(ch1);
    f.engine.take_commands(ch2);

    f.graph
        .translate_set_offset(&f.engine, f.transform, Vec3::new(0.0, 2.0, 0.0))
        .unwrap();

    for ch in [ch1, ch2] {
        let kinds = kinds(&f.engine, ch);
        assert_eq!(kinds, vec![CommandKind::TranslateTransform]);
    }
}

// ============================================================================
// Reference swaps
// ============================================================================

#[test]
fn reference_swap_releases_acquires_and_reserializes_once_per_channel() {
    let mut f = build();
    let ch1 = f.engine.open_channel();
    let ch2 = f.engine.open_channel();
    f.graph
        .add_ref_on_channel(&f.engine, NodeRef::Visual(f.visual), ch1);
    f.graph
        .add_ref_on_channel(&f.engine, NodeRef::Visual(f.visual), ch2);
    f.engine.take_commands(ch1);
    f.engine.take_commands(ch2);

    let events: Rc<RefCell<Vec<PropertyId>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    f.graph
        .add_change_listener(move |event| sink.borrow_mut().push(event.property));

    let replacement = f
        .graph
        .add_material(Material::specular(Vec4::ONE, 20.0));
    f.graph
        .geometry_set_material(&f.engine, f.geometry, Some(replacement))
        .unwrap();

    for ch in [ch1, ch2] {
        // Exactly one create for the new child and one owner update.
        let kinds = kinds(&f.engine, ch);
        assert_eq!(
            kinds,
            vec![CommandKind::SpecularMaterial, CommandKind::GeometryModel]
        );
        assert_eq!(f.graph.refcount_on(NodeRef::Material(f.material), ch), 0);
        assert_eq!(f.graph.refcount_on(NodeRef::Material(replacement), ch), 1);
    }

    // One generic notification, regardless of channel count.
    assert_eq!(events.borrow().as_slice(), &[PropertyId::Material]);
}

#[test]
fn same_reference_swap_is_a_noop() {
    let mut f = build();
    let channel = f.engine.open_channel();
    f.graph
        .add_ref_on_channel(&f.engine, NodeRef::Visual(f.visual), channel);
    f.engine.take_commands(channel);

    f.graph
        .geometry_set_material(&f.engine, f.geometry, Some(f.material))
        .unwrap();

    assert!(f.engine.take_commands(channel).is_empty());
    assert_eq!(f.graph.refcount_on(NodeRef::Material(f.material), channel), 1);
}

#[test]
fn unrealized_owner_swap_emits_nothing() {
    let mut f = build();
    let channel = f.engine.open_channel();

    let replacement = f.graph.add_material(Material::diffuse(Vec4::ZERO));
    f.graph
        .geometry_set_material(&f.engine, f.geometry, Some(replacement))
        .unwrap();

    assert!(f.engine.take_commands(channel).is_empty());
    assert_eq!(f.graph.refcount_on(NodeRef::Material(replacement), channel), 0);
}

// ============================================================================
// Collection membership
// ============================================================================

#[test]
fn insertion_acquires_item_before_serializing_owner() {
    let mut f = build();
    let channel = f.engine.open_channel();
    f.graph
        .add_ref_on_channel(&f.engine, NodeRef::Visual(f.visual), channel);
    f.engine.take_commands(channel);

    let light = f
        .graph
        .add_light(Light::new_point(Vec3::ONE, 1.0, Vec3::ZERO, 10.0));
    f.graph.model_group_add(&f.engine, f.group, light).unwrap();

    let kinds = kinds(&f.engine, channel);
    assert_eq!(kinds, vec![CommandKind::PointLight, CommandKind::ModelGroup]);
    assert_eq!(f.graph.refcount_on(NodeRef::Model(light), channel), 1);
}

#[test]
fn removal_serializes_owner_before_releasing_item() {
    let mut f = build();
    let channel = f.engine.open_channel();
    f.graph
        .add_ref_on_channel(&f.engine, NodeRef::Visual(f.visual), channel);
    f.engine.take_commands(channel);

    f.graph.model_group_remove(&f.engine, f.group, 0).unwrap();

    // Release emits no command; the only traffic is the owner's updated
    // child list, which no longer mentions the released handle.
    let commands = f.engine.take_commands(channel);
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].kind, CommandKind::ModelGroup);
    // Payload: [transform handle u32][child count u32] with no trailing
    // handles; the group has no transform, so both are zero.
    assert_eq!(commands[0].payload, vec![0, 0, 0, 0, 0, 0, 0, 0]);

    assert_eq!(f.graph.refcount_on(NodeRef::Model(f.geometry), channel), 0);
    assert_eq!(f.graph.refcount_on(NodeRef::Mesh(f.mesh), channel), 0);
}

// ============================================================================
// Animators
// ============================================================================

#[test]
fn bound_animator_replaces_literal_with_handle() {
    let mut f = build();
    let channel = f.engine.open_channel();
    f.graph
        .add_ref_on_channel(&f.engine, NodeRef::Material(f.material), channel);
    f.engine.take_commands(channel);

    let animator = f.graph.add_animator(Animator::new(AnimatorTarget::Vector3));
    f.graph
        .bind_animator(&f.engine, NodeRef::Material(f.material), PropertyId::Color, animator)
        .unwrap();

    let commands = f.engine.take_commands(channel);
    let kinds: Vec<CommandKind> = commands.iter().map(|c| c.kind).collect();
    assert_eq!(kinds, vec![CommandKind::Animator, CommandKind::DiffuseMaterial]);

    // The material record carries tag 1 + the animator's handle instead of
    // the literal color.
    let handle = f
        .graph
        .handle_of(NodeRef::Animator(animator), channel)
        .unwrap();
    let record = &commands[1];
    assert_eq!(record.payload[0], 1);
    assert_eq!(record.payload[1..5], handle.raw().to_le_bytes()[..]);
    assert_eq!(record.payload.len(), 5);

    assert!(f
        .engine
        .is_registered_for_animation(NodeRef::Material(f.material), channel));
}

#[test]
fn unbinding_restores_literal_serialization() {
    let mut f = build();
    let channel = f.engine.open_channel();
    f.graph
        .add_ref_on_channel(&f.engine, NodeRef::Material(f.material), channel);

    let animator = f.graph.add_animator(Animator::new(AnimatorTarget::Vector3));
    f.graph
        .bind_animator(&f.engine, NodeRef::Material(f.material), PropertyId::Color, animator)
        .unwrap();
    f.engine.take_commands(channel);

    f.graph
        .unbind_animator(&f.engine, NodeRef::Material(f.material), PropertyId::Color)
        .unwrap();

    let commands = f.engine.take_commands(channel);
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].kind, CommandKind::DiffuseMaterial);
    // Literal tag + four f32 color components.
    assert_eq!(commands[0].payload[0], 0);
    assert_eq!(commands[0].payload.len(), 17);

    assert_eq!(f.graph.refcount_on(NodeRef::Animator(animator), channel), 0);
    assert!(!f
        .engine
        .is_registered_for_animation(NodeRef::Material(f.material), channel));
}

#[test]
fn realize_registers_already_bound_animators() {
    let mut f = build();
    let animator = f.graph.add_animator(Animator::new(AnimatorTarget::Vector3));
    f.graph
        .bind_animator(&f.engine, NodeRef::Material(f.material), PropertyId::Color, animator)
        .unwrap();

    let channel = f.engine.open_channel();
    f.graph
        .add_ref_on_channel(&f.engine, NodeRef::Material(f.material), channel);

    assert_eq!(f.graph.refcount_on(NodeRef::Animator(animator), channel), 1);
    assert!(f
        .engine
        .is_registered_for_animation(NodeRef::Material(f.material), channel));

    // Releasing the material unregisters it again.
    f.graph
        .release_on_channel(&f.engine, NodeRef::Material(f.material), channel);
    assert!(!f
        .engine
        .is_registered_for_animation(NodeRef::Material(f.material), channel));
}

#[test]
fn flush_animated_reserializes_registered_nodes() {
    let mut f = build();
    let channel = f.engine.open_channel();
    f.graph
        .add_ref_on_channel(&f.engine, NodeRef::Material(f.material), channel);
    let animator = f.graph.add_animator(Animator::new(AnimatorTarget::Vector3));
    f.graph
        .bind_animator(&f.engine, NodeRef::Material(f.material), PropertyId::Color, animator)
        .unwrap();
    f.engine.take_commands(channel);

    f.engine.flush_animated(&f.graph);

    let kinds = kinds(&f.engine, channel);
    assert_eq!(kinds, vec![CommandKind::DiffuseMaterial]);
}
