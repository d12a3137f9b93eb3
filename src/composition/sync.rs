//! The per-node, per-channel resource synchronization protocol.
//!
//! `add_ref_on_channel` / `release_on_channel` / `update_resource` keep each
//! node's mirrored representation on each channel consistent with its live
//! property values and child membership:
//!
//! - the first reference on a channel allocates a handle, recursively
//!   add-refs every child on the same channel, registers animated nodes for
//!   ongoing updates, and emits the node's initial record; later references
//!   only bump the count;
//! - release decrements and, only at zero, recursively releases children and
//!   unregisters animation updates; destruction is implicit in the count
//!   reaching zero, no destroy command is sent;
//! - children are acquired (and thus created on the channel) before the
//!   owner's record referencing their handles is written, and released only
//!   after the owner's record no longer mentions them.
//!
//! All entry points run under the composition engine's lock, held by the
//! caller for the duration of a fan-out.

use log::{trace, warn};
use smallvec::SmallVec;

use crate::composition::channel::Channel;
use crate::composition::command;
use crate::composition::engine::EngineState;
use crate::composition::handle::{ChannelId, ResourceHandle};
use crate::scene::graph::SceneGraph;
use crate::scene::material::Material;
use crate::scene::model::{LightKind, Model};
use crate::scene::transform::{Rotation3D, Transform3D};
use crate::scene::{Camera, NodeRef};

/// Child references of a node, in acquisition order.
pub(crate) fn children_of(graph: &SceneGraph, node: NodeRef) -> SmallVec<[NodeRef; 8]> {
    let mut out = SmallVec::new();
    collect_children(graph, node, &mut out);
    out
}

fn push_transform(out: &mut SmallVec<[NodeRef; 8]>, key: Option<crate::scene::TransformKey>) {
    if let Some(key) = key {
        out.push(NodeRef::Transform(key));
    }
}

fn push_animator<T>(
    out: &mut SmallVec<[NodeRef; 8]>,
    prop: &crate::animation::AnimatedProperty<T>,
) {
    if let Some(key) = prop.animator() {
        out.push(NodeRef::Animator(key));
    }
}

fn collect_children(graph: &SceneGraph, node: NodeRef, out: &mut SmallVec<[NodeRef; 8]>) {
    match node {
        NodeRef::Visual(key) => {
            let Some(visual) = graph.visuals.get(key) else {
                return;
            };
            push_transform(out, visual.data.transform);
            if let Some(content) = visual.data.content {
                out.push(NodeRef::Model(content));
            }
            out.extend(visual.data.children.iter().map(|k| NodeRef::Visual(*k)));
        }
        NodeRef::Model(key) => {
            let Some(model) = graph.models.get(key) else {
                return;
            };
            push_transform(out, model.transform);
            match &model.data {
                Model::Group { children } => {
                    out.extend(children.iter().map(|k| NodeRef::Model(*k)));
                }
                Model::Geometry {
                    mesh,
                    material,
                    back_material,
                } => {
                    if let Some(mesh) = mesh {
                        out.push(NodeRef::Mesh(*mesh));
                    }
                    if let Some(material) = material {
                        out.push(NodeRef::Material(*material));
                    }
                    if let Some(back) = back_material {
                        out.push(NodeRef::Material(*back));
                    }
                }
                Model::Light(light) => {
                    push_animator(out, &light.color);
                    match &light.kind {
                        LightKind::Ambient => {}
                        LightKind::Directional { direction } => push_animator(out, direction),
                        LightKind::Point { position, .. } => push_animator(out, position),
                        LightKind::Spot {
                            position,
                            direction,
                            ..
                        } => {
                            push_animator(out, position);
                            push_animator(out, direction);
                        }
                    }
                }
            }
        }
        NodeRef::Mesh(_) => {}
        NodeRef::Material(key) => {
            let Some(material) = graph.materials.get(key) else {
                return;
            };
            match &material.data {
                Material::Diffuse { color } | Material::Emissive { color } => {
                    push_animator(out, color);
                }
                Material::Specular { color, power } => {
                    push_animator(out, color);
                    push_animator(out, power);
                }
                Material::Group { children } => {
                    out.extend(children.iter().map(|k| NodeRef::Material(*k)));
                }
            }
        }
        NodeRef::Transform(key) => {
            let Some(transform) = graph.transforms.get(key) else {
                return;
            };
            match &transform.data {
                Transform3D::Translate { offset } => push_animator(out, offset),
                Transform3D::Scale { scale, center } => {
                    push_animator(out, scale);
                    push_animator(out, center);
                }
                Transform3D::Rotate { rotation, center } => {
                    if let Some(rotation) = rotation {
                        out.push(NodeRef::Rotation(*rotation));
                    }
                    push_animator(out, center);
                }
                Transform3D::Matrix { .. } => {}
                Transform3D::Group { children } => {
                    out.extend(children.iter().map(|k| NodeRef::Transform(*k)));
                }
            }
        }
        NodeRef::Rotation(key) => {
            let Some(rotation) = graph.rotations.get(key) else {
                return;
            };
            match &rotation.data {
                Rotation3D::AxisAngle { axis, angle } => {
                    push_animator(out, axis);
                    push_animator(out, angle);
                }
                Rotation3D::Quaternion { quaternion } => push_animator(out, quaternion),
            }
        }
        NodeRef::Camera(key) => {
            let Some(camera) = graph.cameras.get(key) else {
                return;
            };
            push_transform(out, camera.transform);
            match &camera.data {
                Camera::Perspective(cam) => {
                    push_animator(out, &cam.position);
                    push_animator(out, &cam.look_direction);
                    push_animator(out, &cam.up_direction);
                }
                Camera::Orthographic(cam) => {
                    push_animator(out, &cam.position);
                    push_animator(out, &cam.look_direction);
                    push_animator(out, &cam.up_direction);
                }
                Camera::Matrix(_) => {}
            }
        }
        NodeRef::Animator(_) => {}
    }
}

/// Whether any of the node's animatable slots has a bound animator.
fn has_bound_animator(graph: &SceneGraph, node: NodeRef) -> bool {
    children_of(graph, node)
        .iter()
        .any(|child| matches!(child, NodeRef::Animator(_)))
}

/// Acquires one reference to `node` on `channel`.
///
/// The first reference realizes the node: a handle is allocated, every child
/// is acquired first, and the node's initial record is emitted. Subsequent
/// references only increment the count and return the existing handle.
pub(crate) fn add_ref_on_channel(
    graph: &mut SceneGraph,
    state: &mut EngineState,
    node: NodeRef,
    channel: ChannelId,
) -> ResourceHandle {
    let Some(core) = graph.core_of_mut(node) else {
        warn!("add_ref on a stale node key {node:?}");
        return ResourceHandle::NULL;
    };

    if let Some(handle) = core.channels.handle_on(channel) {
        let (handle, _) = core.channels.add_ref(channel, handle);
        return handle;
    }

    let Some(handle) = state.channel_mut(channel).map(Channel::allocate_handle) else {
        warn!("add_ref on unknown channel {channel:?}");
        return ResourceHandle::NULL;
    };
    // Re-borrow: the channel allocation above released the core borrow.
    if let Some(core) = graph.core_of_mut(node) {
        core.channels.add_ref(channel, handle);
    }
    trace!("realized {node:?} on {channel:?} as handle {}", handle.raw());

    // Children are created on the channel before the record referencing
    // their handles goes out.
    for child in children_of(graph, node) {
        add_ref_on_channel(graph, state, child, channel);
    }

    if has_bound_animator(graph, node) {
        state.register_animated(node, channel);
    }

    update_resource(graph, state, node, channel, true);
    handle
}

/// Releases one reference to `node` on `channel`. Only the last reference
/// tears the node down: children released recursively, animation updates
/// unregistered. The compositor reclaims the handle implicitly.
pub(crate) fn release_on_channel(
    graph: &mut SceneGraph,
    state: &mut EngineState,
    node: NodeRef,
    channel: ChannelId,
) {
    let Some(core) = graph.core_of_mut(node) else {
        warn!("release on a stale node key {node:?}");
        return;
    };
    let Some((handle, last)) = core.channels.release(channel) else {
        warn!("release of {node:?} on {channel:?} without a reference");
        return;
    };
    if !last {
        return;
    }

    trace!("released {node:?} handle {} on {channel:?}", handle.raw());
    for child in children_of(graph, node) {
        release_on_channel(graph, state, child, channel);
    }
    state.unregister_animated(node, channel);
}

/// Re-serializes the node's full record on `channel`.
///
/// `skip_ref_count_check` is passed by callers that have already established
/// the node is realized there (the add-ref path and fan-out loops); other
/// callers get a silent no-op for unrealized nodes.
pub(crate) fn update_resource(
    graph: &SceneGraph,
    state: &mut EngineState,
    node: NodeRef,
    channel: ChannelId,
    skip_ref_count_check: bool,
) {
    if !skip_ref_count_check {
        let realized = graph
            .core_of(node)
            .is_some_and(|core| core.channels.is_realized_on(channel));
        if !realized {
            return;
        }
    }
    if let Some(ch) = state.channel_mut(channel) {
        command::write_record(graph, node, ch);
    }
}
