//! Scene graph structure tests
//!
//! Tests for:
//! - Model bounds (group union, light emptiness, transformed meshes)
//! - Freeze semantics and the mutate-after-freeze error
//! - Subtree cloning (deep copy, DAG sharing preserved)
//! - Mutation errors: stale keys, wrong variants, cycles
//! - Change listener delivery and the same-reference no-op

use std::cell::RefCell;
use std::rc::Rc;

use arbor3d::composition::CompositionEngine;
use arbor3d::errors::ArborError;
use arbor3d::scene::{
    Material, MeshGeometry, Model, NodeRef, PropertyId, SceneGraph, Transform3D, Visual3D,
};
use arbor3d::scene::model::Light;
use glam::{Vec3, Vec4};

// ============================================================================
// Helpers
// ============================================================================

const EPSILON: f32 = 1e-5;

fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn vec3_approx(a: Vec3, b: Vec3) -> bool {
    approx_eq(a.x, b.x) && approx_eq(a.y, b.y) && approx_eq(a.z, b.z)
}

fn unit_triangle_mesh() -> MeshGeometry {
    MeshGeometry::with_positions(
        vec![
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ],
        vec![0, 1, 2],
    )
}

// ============================================================================
// Bounds
// ============================================================================

#[test]
fn mesh_bounds_cover_positions() {
    let mesh = unit_triangle_mesh();
    let bounds = mesh.bounds();
    assert!(vec3_approx(bounds.min, Vec3::new(-1.0, -1.0, 0.0)));
    assert!(vec3_approx(bounds.max, Vec3::new(1.0, 1.0, 0.0)));
}

#[test]
fn empty_mesh_bounds_are_empty() {
    let mesh = MeshGeometry::new();
    assert!(mesh.bounds().is_empty());
}

#[test]
fn mesh_bounds_cache_invalidated_by_set_positions() {
    let mut graph = SceneGraph::new();
    let engine = CompositionEngine::new();
    let mesh = graph.add_mesh(unit_triangle_mesh());

    // Prime the cache.
    assert!(!graph.mesh(mesh).unwrap().data.bounds().is_empty());

    graph
        .mesh_set_positions(&engine, mesh, vec![Vec3::splat(10.0)])
        .unwrap();
    let bounds = graph.mesh(mesh).unwrap().data.bounds();
    assert!(vec3_approx(bounds.min, Vec3::splat(10.0)));
    assert!(vec3_approx(bounds.max, Vec3::splat(10.0)));
}

#[test]
fn geometry_model_bounds_follow_transform() {
    let mut graph = SceneGraph::new();
    let engine = CompositionEngine::new();
    let mesh = graph.add_mesh(unit_triangle_mesh());
    let material = graph.add_material(Material::diffuse(Vec4::ONE));
    let model = graph.add_model(Model::geometry(mesh, material));
    let transform = graph.add_transform(Transform3D::translate(Vec3::new(5.0, 0.0, 0.0)));
    graph.model_set_transform(&engine, model, Some(transform)).unwrap();

    let bounds = graph.model_bounds(model);
    assert!(vec3_approx(bounds.min, Vec3::new(4.0, -1.0, 0.0)));
    assert!(vec3_approx(bounds.max, Vec3::new(6.0, 1.0, 0.0)));
}

#[test]
fn group_bounds_union_children() {
    let mut graph = SceneGraph::new();
    let engine = CompositionEngine::new();
    let material = graph.add_material(Material::diffuse(Vec4::ONE));

    let mesh_a = graph.add_mesh(unit_triangle_mesh());
    let model_a = graph.add_model(Model::geometry(mesh_a, material));
    let shift = graph.add_transform(Transform3D::translate(Vec3::new(10.0, 0.0, 0.0)));
    graph.model_set_transform(&engine, model_a, Some(shift)).unwrap();

    let mesh_b = graph.add_mesh(unit_triangle_mesh());
    let model_b = graph.add_model(Model::geometry(mesh_b, material));

    let group = graph.add_model(Model::group(vec![]));
    graph.model_group_add(&engine, group, model_a).unwrap();
    graph.model_group_add(&engine, group, model_b).unwrap();

    let bounds = graph.model_bounds(group);
    assert!(vec3_approx(bounds.min, Vec3::new(-1.0, -1.0, 0.0)));
    assert!(vec3_approx(bounds.max, Vec3::new(11.0, 1.0, 0.0)));
}

#[test]
fn light_bounds_are_empty() {
    let mut graph = SceneGraph::new();
    let light = graph.add_light(Light::new_point(Vec3::ONE, 1.0, Vec3::ZERO, 10.0));
    assert!(graph.model_bounds(light).is_empty());
}

// ============================================================================
// Freeze
// ============================================================================

#[test]
fn frozen_node_rejects_mutation() {
    let mut graph = SceneGraph::new();
    let engine = CompositionEngine::new();
    let transform = graph.add_transform(Transform3D::translate(Vec3::ZERO));

    graph.freeze(NodeRef::Transform(transform));
    let err = graph
        .translate_set_offset(&engine, transform, Vec3::X)
        .unwrap_err();
    assert_eq!(err, ArborError::Frozen);
}

#[test]
fn freeze_is_recursive() {
    let mut graph = SceneGraph::new();
    let engine = CompositionEngine::new();
    let mesh = graph.add_mesh(unit_triangle_mesh());
    let material = graph.add_material(Material::diffuse(Vec4::ONE));
    let model = graph.add_model(Model::geometry(mesh, material));
    let transform = graph.add_transform(Transform3D::translate(Vec3::ZERO));
    graph.model_set_transform(&engine, model, Some(transform)).unwrap();

    graph.freeze(NodeRef::Model(model));

    assert!(graph.is_frozen(NodeRef::Model(model)));
    assert!(graph.is_frozen(NodeRef::Transform(transform)));
    assert!(graph.is_frozen(NodeRef::Mesh(mesh)));
    assert!(graph.is_frozen(NodeRef::Material(material)));

    let err = graph
        .material_set_color(&engine, material, Vec4::ZERO)
        .unwrap_err();
    assert_eq!(err, ArborError::Frozen);
}

// ============================================================================
// Clone subtree
// ============================================================================

#[test]
fn clone_subtree_is_deep_and_mutable() {
    let mut graph = SceneGraph::new();
    let engine = CompositionEngine::new();
    let transform = graph.add_transform(Transform3D::translate(Vec3::X));
    graph.freeze(NodeRef::Transform(transform));

    let cloned = graph.clone_subtree(NodeRef::Transform(transform)).unwrap();
    let NodeRef::Transform(cloned) = cloned else {
        panic!("clone changed node kind");
    };
    assert_ne!(cloned, transform);
    assert!(!graph.is_frozen(NodeRef::Transform(cloned)));

    // The copy mutates freely and the original is untouched.
    graph.translate_set_offset(&engine, cloned, Vec3::Y).unwrap();
    let original = graph.transform_value(Some(transform));
    assert!(vec3_approx(original.transform_point3(Vec3::ZERO), Vec3::X));
    let copy = graph.transform_value(Some(cloned));
    assert!(vec3_approx(copy.transform_point3(Vec3::ZERO), Vec3::Y));
}

#[test]
fn clone_subtree_preserves_shared_children() {
    let mut graph = SceneGraph::new();
    let engine = CompositionEngine::new();
    let mesh = graph.add_mesh(unit_triangle_mesh());
    let material = graph.add_material(Material::diffuse(Vec4::ONE));
    // Two geometry models sharing one mesh.
    let model_a = graph.add_model(Model::geometry(mesh, material));
    let model_b = graph.add_model(Model::geometry(mesh, material));
    let group = graph.add_model(Model::group(vec![]));
    graph.model_group_add(&engine, group, model_a).unwrap();
    graph.model_group_add(&engine, group, model_b).unwrap();

    let NodeRef::Model(cloned_group) = graph.clone_subtree(NodeRef::Model(group)).unwrap() else {
        panic!("clone changed node kind");
    };

    let Model::Group { children } = &graph.model(cloned_group).unwrap().data else {
        panic!("clone lost the group variant");
    };
    assert_eq!(children.len(), 2);

    let mesh_of = |key| match &graph.model(key).unwrap().data {
        Model::Geometry { mesh, .. } => mesh.unwrap(),
        _ => panic!("expected geometry"),
    };
    let mesh_a = mesh_of(children[0]);
    let mesh_b = mesh_of(children[1]);
    // Shared along both paths: cloned once, still shared, but a new node.
    assert_eq!(mesh_a, mesh_b);
    assert_ne!(mesh_a, mesh);
}

// ============================================================================
// Mutation errors
// ============================================================================

#[test]
fn stale_key_is_rejected() {
    let mut other = SceneGraph::new();
    let engine = CompositionEngine::new();
    let foreign = other.add_transform(Transform3D::translate(Vec3::X));

    let mut graph = SceneGraph::new();
    let mesh = graph.add_mesh(unit_triangle_mesh());
    let material = graph.add_material(Material::diffuse(Vec4::ONE));
    let model = graph.add_model(Model::geometry(mesh, material));

    let err = graph
        .model_set_transform(&engine, model, Some(foreign))
        .unwrap_err();
    assert_eq!(err, ArborError::StaleKey("transform"));
}

#[test]
fn wrong_variant_is_rejected() {
    let mut graph = SceneGraph::new();
    let engine = CompositionEngine::new();
    let scale = graph.add_transform(Transform3D::scale(Vec3::ONE));
    let err = graph
        .translate_set_offset(&engine, scale, Vec3::X)
        .unwrap_err();
    assert!(matches!(err, ArborError::InvalidOperation(_)));
}

#[test]
fn group_insert_rejects_cycles() {
    let mut graph = SceneGraph::new();
    let engine = CompositionEngine::new();
    let inner = graph.add_model(Model::group(vec![]));
    let outer = graph.add_model(Model::group(vec![]));
    graph.model_group_add(&engine, outer, inner).unwrap();

    // Direct self-reference.
    let err = graph.model_group_add(&engine, outer, outer).unwrap_err();
    assert_eq!(err, ArborError::CycleDetected);

    // Indirect cycle through a child.
    let err = graph.model_group_add(&engine, inner, outer).unwrap_err();
    assert_eq!(err, ArborError::CycleDetected);
}

#[test]
fn group_remove_out_of_range() {
    let mut graph = SceneGraph::new();
    let engine = CompositionEngine::new();
    let group = graph.add_model(Model::group(vec![]));
    let err = graph.model_group_remove(&engine, group, 0).unwrap_err();
    assert!(matches!(err, ArborError::InvalidOperation(_)));
}

// ============================================================================
// Change listeners
// ============================================================================

#[test]
fn listeners_observe_property_changes() {
    let mut graph = SceneGraph::new();
    let engine = CompositionEngine::new();
    let transform = graph.add_transform(Transform3D::translate(Vec3::ZERO));

    let log: Rc<RefCell<Vec<PropertyId>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    graph.add_change_listener(move |event| sink.borrow_mut().push(event.property));

    graph.translate_set_offset(&engine, transform, Vec3::X).unwrap();
    assert_eq!(log.borrow().as_slice(), &[PropertyId::Offset]);
}

#[test]
fn same_reference_set_is_a_noop() {
    let mut graph = SceneGraph::new();
    let engine = CompositionEngine::new();
    let mesh = graph.add_mesh(unit_triangle_mesh());
    let material = graph.add_material(Material::diffuse(Vec4::ONE));
    let model = graph.add_model(Model::geometry(mesh, material));
    let transform = graph.add_transform(Transform3D::translate(Vec3::X));
    graph.model_set_transform(&engine, model, Some(transform)).unwrap();

    let log: Rc<RefCell<Vec<PropertyId>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    graph.add_change_listener(move |event| sink.borrow_mut().push(event.property));

    // Same reference again: no notification, no churn.
    graph.model_set_transform(&engine, model, Some(transform)).unwrap();
    assert!(log.borrow().is_empty());

    // A real change notifies.
    graph.model_set_transform(&engine, model, None).unwrap();
    assert_eq!(log.borrow().as_slice(), &[PropertyId::Transform]);
}

#[test]
fn visual_children_membership() {
    let mut graph = SceneGraph::new();
    let engine = CompositionEngine::new();
    let parent = graph.add_visual(Visual3D::new());
    let child = graph.add_visual(Visual3D::new());

    graph.visual_add_child(&engine, parent, child).unwrap();
    assert_eq!(graph.visual(parent).unwrap().data.children, vec![child]);

    let removed = graph.visual_remove_child(&engine, parent, 0).unwrap();
    assert_eq!(removed, child);
    assert!(graph.visual(parent).unwrap().data.children.is_empty());

    let err = graph.visual_add_child(&engine, parent, parent).unwrap_err();
    assert_eq!(err, ArborError::CycleDetected);
}
