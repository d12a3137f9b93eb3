//! Camera ray construction tests
//!
//! Tests for:
//! - Perspective and orthographic viewport rays
//! - The singular view*projection hard failure
//! - Camera node transforms feeding ray construction
//! - The stored hit-test projection matrix
//! - End-to-end camera picking through the hit-test walk

use arbor3d::composition::CompositionEngine;
use arbor3d::errors::ArborError;
use arbor3d::hittest::{HitTestBehavior, HitTestOptions, RayHitTestParameters, hit_test};
use arbor3d::scene::{
    Camera, Material, MeshGeometry, Model, SceneGraph, Transform3D, Visual3D,
};
use glam::{Mat4, Vec2, Vec3, Vec4};

// ============================================================================
// Helpers
// ============================================================================

const EPSILON: f32 = 1e-3;

fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn vec3_approx(a: Vec3, b: Vec3) -> bool {
    approx_eq(a.x, b.x) && approx_eq(a.y, b.y) && approx_eq(a.z, b.z)
}

const VIEWPORT: Vec2 = Vec2::new(800.0, 600.0);
const CENTER: Vec2 = Vec2::new(400.0, 300.0);

// ============================================================================
// Perspective
// ============================================================================

#[test]
fn center_ray_points_along_look_direction() {
    let mut graph = SceneGraph::new();
    let camera = graph.add_camera(Camera::new_perspective(
        Vec3::new(0.0, 0.0, 10.0),
        Vec3::NEG_Z,
        45.0,
        0.1,
        100.0,
    ));

    let (ray, _) = graph.camera_viewport_ray(camera, CENTER, VIEWPORT).unwrap();

    assert!(approx_eq(ray.direction.length(), 1.0));
    assert!(vec3_approx(ray.direction, Vec3::NEG_Z));
    // Origin on the near plane, on the camera axis.
    assert!(approx_eq(ray.origin.x, 0.0));
    assert!(approx_eq(ray.origin.y, 0.0));
    assert!(ray.origin.z <= 10.0 && ray.origin.z > 9.0);
}

#[test]
fn off_center_ray_diverges() {
    let mut graph = SceneGraph::new();
    let camera = graph.add_camera(Camera::new_perspective(
        Vec3::new(0.0, 0.0, 10.0),
        Vec3::NEG_Z,
        45.0,
        0.1,
        100.0,
    ));

    // Right half of the viewport: the ray bends toward +X.
    let (right, _) = graph
        .camera_viewport_ray(camera, Vec2::new(700.0, 300.0), VIEWPORT)
        .unwrap();
    assert!(right.direction.x > 0.0);
    assert!(right.direction.z < 0.0);

    // Upper half: viewport Y points down, world Y up.
    let (upper, _) = graph
        .camera_viewport_ray(camera, Vec2::new(400.0, 100.0), VIEWPORT)
        .unwrap();
    assert!(upper.direction.y > 0.0);
}

// ============================================================================
// Orthographic
// ============================================================================

#[test]
fn orthographic_rays_are_parallel() {
    let mut graph = SceneGraph::new();
    let camera = graph.add_camera(Camera::new_orthographic(
        Vec3::new(0.0, 0.0, 10.0),
        Vec3::NEG_Z,
        10.0,
        0.1,
        100.0,
    ));

    let (center, _) = graph.camera_viewport_ray(camera, CENTER, VIEWPORT).unwrap();
    let (offset, _) = graph
        .camera_viewport_ray(camera, Vec2::new(600.0, 300.0), VIEWPORT)
        .unwrap();

    assert!(vec3_approx(center.direction, Vec3::NEG_Z));
    assert!(vec3_approx(offset.direction, Vec3::NEG_Z));

    // x = 600 maps to NDC 0.5, half the half-width of the viewing volume.
    assert!(approx_eq(offset.origin.x, 2.5));
    assert!(approx_eq(center.origin.x, 0.0));
}

// ============================================================================
// Failure modes
// ============================================================================

#[test]
fn singular_view_projection_is_a_hard_error() {
    let mut graph = SceneGraph::new();
    let camera = graph.add_camera(Camera::new_matrix(Mat4::IDENTITY, Mat4::ZERO));

    let err = graph
        .camera_viewport_ray(camera, CENTER, VIEWPORT)
        .unwrap_err();
    assert_eq!(err, ArborError::SingularMatrix);
}

#[test]
fn degenerate_camera_transform_is_a_hard_error() {
    let mut graph = SceneGraph::new();
    let engine = CompositionEngine::new();
    let camera = graph.add_camera(Camera::new_perspective(
        Vec3::new(0.0, 0.0, 10.0),
        Vec3::NEG_Z,
        45.0,
        0.1,
        100.0,
    ));
    let collapse = graph.add_transform(Transform3D::scale(Vec3::ZERO));
    graph.camera_set_transform(&engine, camera, Some(collapse)).unwrap();

    let err = graph
        .camera_viewport_ray(camera, CENTER, VIEWPORT)
        .unwrap_err();
    assert_eq!(err, ArborError::SingularMatrix);
}

// ============================================================================
// Camera transforms
// ============================================================================

#[test]
fn camera_node_transform_moves_the_ray() {
    let mut graph = SceneGraph::new();
    let engine = CompositionEngine::new();
    let camera = graph.add_camera(Camera::new_perspective(
        Vec3::new(0.0, 0.0, 10.0),
        Vec3::NEG_Z,
        45.0,
        0.1,
        100.0,
    ));
    let shift = graph.add_transform(Transform3D::translate(Vec3::new(5.0, 0.0, 0.0)));
    graph.camera_set_transform(&engine, camera, Some(shift)).unwrap();

    let (ray, _) = graph.camera_viewport_ray(camera, CENTER, VIEWPORT).unwrap();
    assert!(approx_eq(ray.origin.x, 5.0));
    assert!(vec3_approx(ray.direction, Vec3::NEG_Z));
}

// ============================================================================
// Hit-test projection
// ============================================================================

#[test]
fn parameters_store_projection_for_2d_mapping() {
    let mut graph = SceneGraph::new();
    let camera = graph.add_camera(Camera::new_perspective(
        Vec3::new(0.0, 0.0, 10.0),
        Vec3::NEG_Z,
        45.0,
        0.1,
        100.0,
    ));

    let params =
        RayHitTestParameters::from_camera(&graph, camera, CENTER, VIEWPORT).unwrap();
    let projection = params.hit_test_projection().expect("projection stored");

    // A world point on the camera axis projects back to the viewport
    // center (NDC origin).
    let clip = *projection * Vec3::new(0.0, 0.0, 5.0).extend(1.0);
    let ndc = clip.truncate() / clip.w;
    assert!(approx_eq(ndc.x, 0.0));
    assert!(approx_eq(ndc.y, 0.0));
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn camera_ray_drives_the_hit_test_walk() {
    let mut graph = SceneGraph::new();
    let engine = CompositionEngine::new();

    let mesh = graph.add_mesh(MeshGeometry::with_positions(
        vec![
            Vec3::new(-1.0, -1.0, 5.0),
            Vec3::new(1.0, -1.0, 5.0),
            Vec3::new(0.0, 1.0, 5.0),
        ],
        vec![0, 1, 2],
    ));
    let material = graph.add_material(Material::diffuse(Vec4::ONE));
    let model = graph.add_model(Model::geometry(mesh, material));
    let group = graph.add_model(Model::group(vec![]));
    graph.model_group_add(&engine, group, model).unwrap();
    let root = graph.add_visual(Visual3D::with_content(group));

    let camera = graph.add_camera(Camera::new_perspective(
        Vec3::new(0.0, 0.0, 10.0),
        Vec3::NEG_Z,
        60.0,
        0.1,
        100.0,
    ));

    let mut params =
        RayHitTestParameters::from_camera(&graph, camera, CENTER, VIEWPORT).unwrap();
    let mut hit_point = None;
    hit_test(
        &graph,
        root,
        &mut params,
        &mut HitTestOptions::default(),
        &mut |result| {
            hit_point = Some((result.point_hit, result.distance));
            HitTestBehavior::Continue
        },
    );

    let (point, distance) = hit_point.expect("camera ray hits the triangle");
    assert!(vec3_approx(point, Vec3::new(0.0, 0.0, 5.0)));
    // Camera sits at z=10, origin on the near plane at z=9.9.
    assert!((distance - 4.9).abs() < 1e-2);
}
