//! The hit-test walk.
//!
//! Descends from a root visual pushing visual-level transforms on the visual
//! stack and model-level transforms on the model stack (identity transforms
//! are not pushed), visiting group children in reverse iteration order. At
//! a mesh leaf the world ray is mapped into local space through the inverse
//! accumulated transform, cheaply rejected against the mesh bounds, and only
//! then intersected exactly per triangle. Reporting sorts by distance and
//! delivers results one at a time until the callback stops the dispatch.
//!
//! A non-invertible transform met mid-walk degrades the local ray to NaN
//! (the bounds test then rejects the subtree); it never aborts the walk.

use std::cmp::Ordering;

use glam::Mat4;

use crate::hittest::params::RayHitTestParameters;
use crate::hittest::results::RayMeshResult;
use crate::math::triangle;
use crate::math::BoundingBox;
use crate::scene::graph::SceneGraph;
use crate::scene::model::Model;
use crate::scene::{MeshKey, ModelKey, VisualKey};

/// Continue/stop verdict returned by result callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTestBehavior {
    Continue,
    Stop,
}

/// Verdict of the optional per-visual filter callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTestFilterBehavior {
    /// Test this visual and its children.
    Continue,
    /// Skip this visual's own content but still descend into its children.
    SkipSelf,
    /// Skip this visual and everything below it.
    SkipSubtree,
}

/// Optional caller hooks for one dispatch.
#[derive(Default)]
pub struct HitTestOptions<'a> {
    /// Pre-descent filter, invoked per visual.
    pub filter: Option<&'a mut dyn FnMut(VisualKey) -> HitTestFilterBehavior>,
    /// Secondary 2-D hit-test pass for visuals hosting 2-D content. Runs
    /// before the ordinary result callback; `Stop` aborts the dispatch.
    pub surface_resolver: Option<&'a mut dyn FnMut(&RayMeshResult) -> HitTestBehavior>,
}

/// Runs a full hit-test dispatch: walk the subtree under `root`, then sort
/// and report the accumulated results. Returns `Stop` when a callback cut
/// the dispatch short, `Continue` otherwise.
pub fn hit_test(
    graph: &SceneGraph,
    root: VisualKey,
    params: &mut RayHitTestParameters,
    options: &mut HitTestOptions<'_>,
    on_result: &mut dyn FnMut(&RayMeshResult) -> HitTestBehavior,
) -> HitTestBehavior {
    walk_visual(graph, params, options, root);
    report(graph, params, options, on_result)
}

// ============================================================================
// Descent
// ============================================================================

fn walk_visual(
    graph: &SceneGraph,
    params: &mut RayHitTestParameters,
    options: &mut HitTestOptions<'_>,
    key: VisualKey,
) {
    let Some(visual) = graph.visual(key) else {
        return;
    };

    let filter = match &mut options.filter {
        Some(filter) => filter(key),
        None => HitTestFilterBehavior::Continue,
    };
    if filter == HitTestFilterBehavior::SkipSubtree {
        return;
    }

    let local = graph.transform_value(visual.data.transform);
    let pushed = push_non_identity(&mut params.visual_stack, &local, visual.data.transform.is_some());

    if filter != HitTestFilterBehavior::SkipSelf
        && let Some(content) = visual.data.content
    {
        walk_model(graph, params, key, content);
    }

    // Reverse iteration so depth-first visitation order matches declaration
    // priority.
    for child in visual.data.children.iter().rev() {
        walk_visual(graph, params, options, *child);
    }

    if pushed {
        params.visual_stack.pop();
    }
}

fn walk_model(
    graph: &SceneGraph,
    params: &mut RayHitTestParameters,
    visual: VisualKey,
    key: ModelKey,
) {
    let Some(node) = graph.model(key) else {
        return;
    };

    match &node.data {
        // Lights are non-geometric; they decline participation.
        Model::Light(_) => {}

        Model::Group { children } => {
            let local = graph.transform_value(node.transform);
            let pushed = push_non_identity(&mut params.model_stack, &local, node.transform.is_some());
            for child in children.iter().rev() {
                walk_model(graph, params, visual, *child);
            }
            if pushed {
                params.model_stack.pop();
            }
        }

        Model::Geometry { mesh, .. } => {
            let Some(mesh_key) = *mesh else {
                return;
            };
            let Some(mesh_node) = graph.mesh(mesh_key) else {
                return;
            };
            let bounds = mesh_node.data.bounds();
            // Empty geometry is skipped before any transform work.
            if bounds.is_empty() {
                return;
            }

            let local = graph.transform_value(node.transform);
            let pushed = push_non_identity(&mut params.model_stack, &local, node.transform.is_some());
            test_mesh(graph, params, visual, key, mesh_key, &bounds);
            if pushed {
                params.model_stack.pop();
            }
        }
    }
}

fn push_non_identity(
    stack: &mut crate::hittest::params::MatrixStack,
    matrix: &Mat4,
    present: bool,
) -> bool {
    if present && *matrix != Mat4::IDENTITY {
        stack.push(matrix);
        true
    } else {
        false
    }
}

// ============================================================================
// Leaf testing
// ============================================================================

fn test_mesh(
    graph: &SceneGraph,
    params: &mut RayHitTestParameters,
    visual: VisualKey,
    model: ModelKey,
    mesh: MeshKey,
    bounds: &BoundingBox,
) {
    let world = params.world_transform_matrix();
    // Map the world ray into mesh space. A singular accumulated transform
    // leaves a NaN ray here, which the bounds test rejects wholesale.
    let local_ray = params.ray().transformed_by(&world);

    if !bounds.intersects_ray(&local_ray) {
        return;
    }

    let Some(mesh_node) = graph.mesh(mesh) else {
        return;
    };
    let data = &mesh_node.data;
    let positions = data.positions();

    for [i0, i1, i2] in data.triangle_indices() {
        let (Some(v0), Some(v1), Some(v2)) = (
            positions.get(i0 as usize),
            positions.get(i1 as usize),
            positions.get(i2 as usize),
        ) else {
            continue;
        };

        let Some(hit) = triangle::intersect_triangle(&local_ray, *v0, *v1, *v2) else {
            continue;
        };

        let local_point = local_ray.point_at(hit.t);
        let world_point = world.transform_point3(local_point);
        let distance = (world_point - params.origin()).length();

        params.report(RayMeshResult {
            visual,
            model,
            mesh,
            point_hit: world_point,
            distance,
            vertex_index1: i0,
            vertex_index2: i1,
            vertex_index3: i2,
            vertex_weight2: hit.u,
            vertex_weight3: hit.v,
        });
    }
}

// ============================================================================
// Reporting
// ============================================================================

fn report(
    graph: &SceneGraph,
    params: &mut RayHitTestParameters,
    options: &mut HitTestOptions<'_>,
    on_result: &mut dyn FnMut(&RayMeshResult) -> HitTestBehavior,
) -> HitTestBehavior {
    let adjustment = params.distance_adjustment();
    let mut results = std::mem::take(&mut params.results);

    // Ascending by distance; the sort is stable, so equal-distance results
    // keep discovery order (no cross-implementation ordering is promised
    // for exact ties).
    results.sort_by(|a, b| {
        let diff = a.distance - b.distance;
        if diff < 0.0 {
            Ordering::Less
        } else if diff > 0.0 {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    });

    for mut result in results {
        result.distance += adjustment;

        let hosts_2d = graph
            .visual(result.visual)
            .is_some_and(|v| v.data.hosts_2d_content);
        if hosts_2d
            && let Some(resolver) = &mut options.surface_resolver
            && resolver(&result) == HitTestBehavior::Stop
        {
            return HitTestBehavior::Stop;
        }

        if on_result(&result) == HitTestBehavior::Stop {
            return HitTestBehavior::Stop;
        }
    }

    HitTestBehavior::Continue
}
