//! Command record serialization.
//!
//! One fixed layout per node kind. Every record names its destination
//! handle; child references are encoded as the child's handle on the same
//! channel (0 for an absent child). Animatable properties encode either the
//! literal value or the bound animator's handle, never both: a tag byte of 0
//! precedes the literal bytes, a tag byte of 1 precedes the handle.

use glam::{Mat4, Quat, Vec3, Vec4};

use crate::animation::AnimatedProperty;
use crate::composition::channel::Channel;
use crate::composition::handle::{ChannelId, ResourceHandle};
use crate::scene::graph::SceneGraph;
use crate::scene::material::Material;
use crate::scene::model::{Attenuation, Light, LightKind, Model};
use crate::scene::transform::{Rotation3D, Transform3D};
use crate::scene::{Camera, NodeRef};

/// Command discriminants, one per node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandKind {
    Visual = 0x01,

    ModelGroup = 0x10,
    GeometryModel = 0x11,
    AmbientLight = 0x12,
    DirectionalLight = 0x13,
    PointLight = 0x14,
    SpotLight = 0x15,

    MeshGeometry = 0x20,

    DiffuseMaterial = 0x30,
    SpecularMaterial = 0x31,
    EmissiveMaterial = 0x32,
    MaterialGroup = 0x33,

    TranslateTransform = 0x40,
    ScaleTransform = 0x41,
    RotateTransform = 0x42,
    MatrixTransform = 0x43,
    TransformGroup = 0x44,

    AxisAngleRotation = 0x50,
    QuaternionRotation = 0x51,

    PerspectiveCamera = 0x60,
    OrthographicCamera = 0x61,
    MatrixCamera = 0x62,

    Animator = 0x70,
}

// ============================================================================
// Payload encoder
// ============================================================================

/// Little-endian payload builder for one record.
#[derive(Default)]
struct Payload {
    buf: Vec<u8>,
}

impl Payload {
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn handle(&mut self, handle: Option<ResourceHandle>) {
        self.u32(handle.map_or(0, ResourceHandle::raw));
    }

    fn vec3(&mut self, v: Vec3) {
        self.buf.extend_from_slice(bytemuck::bytes_of(&v));
    }

    fn vec4(&mut self, v: Vec4) {
        self.buf.extend_from_slice(bytemuck::bytes_of(&v));
    }

    fn quat(&mut self, q: Quat) {
        self.buf.extend_from_slice(bytemuck::bytes_of(&q));
    }

    fn mat4(&mut self, m: &Mat4) {
        self.buf.extend_from_slice(bytemuck::bytes_of(m));
    }

    fn attenuation(&mut self, a: &Attenuation) {
        self.f32(a.constant);
        self.f32(a.linear);
        self.f32(a.quadratic);
    }

    /// Resolves an animatable slot: the animator's handle on this channel
    /// when one is bound, the literal value otherwise.
    fn animated<T>(
        &mut self,
        graph: &SceneGraph,
        channel: ChannelId,
        prop: &AnimatedProperty<T>,
        write_literal: impl FnOnce(&mut Self, &T),
    ) {
        match prop.animator() {
            Some(key) => {
                self.u8(1);
                let handle = graph
                    .animators
                    .get(key)
                    .and_then(|node| node.core.channels().handle_on(channel));
                self.handle(handle);
            }
            None => {
                self.u8(0);
                write_literal(self, prop.value());
            }
        }
    }
}

// ============================================================================
// Record writers
// ============================================================================

/// Serializes `node`'s full command record onto `channel`.
///
/// Callers guarantee the node is realized on the channel (its destination
/// handle exists); an unrealized node writes nothing.
pub(crate) fn write_record(graph: &SceneGraph, node: NodeRef, channel: &mut Channel) {
    let id = channel.id();
    let Some(target) = graph.handle_of(node, id) else {
        return;
    };

    match node {
        NodeRef::Visual(key) => {
            let Some(visual) = graph.visuals.get(key) else {
                return;
            };
            channel.begin_command(CommandKind::Visual, target);
            let mut p = Payload::default();
            p.handle(graph.transform_handle(visual.data.transform, id));
            p.handle(graph.model_handle(visual.data.content, id));
            p.u8(u8::from(visual.data.hosts_2d_content));
            p.u32(visual.data.children.len() as u32);
            for child in &visual.data.children {
                p.handle(graph.visual_handle(Some(*child), id));
            }
            channel.append_command_data(&p.buf);
            channel.end_command();
        }

        NodeRef::Model(key) => {
            let Some(model) = graph.models.get(key) else {
                return;
            };
            let transform = graph.transform_handle(model.transform, id);
            match &model.data {
                Model::Group { children } => {
                    channel.begin_command(CommandKind::ModelGroup, target);
                    let mut p = Payload::default();
                    p.handle(transform);
                    p.u32(children.len() as u32);
                    for child in children {
                        p.handle(graph.model_handle(Some(*child), id));
                    }
                    channel.append_command_data(&p.buf);
                    channel.end_command();
                }
                Model::Geometry {
                    mesh,
                    material,
                    back_material,
                } => {
                    let mut p = Payload::default();
                    p.handle(transform);
                    p.handle(graph.mesh_handle(*mesh, id));
                    p.handle(graph.material_handle(*material, id));
                    p.handle(graph.material_handle(*back_material, id));
                    channel.send_command(CommandKind::GeometryModel, target, &p.buf);
                }
                Model::Light(light) => write_light(graph, id, channel, target, transform, light),
            }
        }

        NodeRef::Mesh(key) => {
            let Some(mesh) = graph.meshes.get(key) else {
                return;
            };
            channel.begin_command(CommandKind::MeshGeometry, target);
            let mut p = Payload::default();
            let data = &mesh.data;
            p.u32(data.positions().len() as u32);
            p.u32(data.normals().len() as u32);
            p.u32(data.tex_coords().len() as u32);
            p.u32(data.indices().len() as u32);
            channel.append_command_data(&p.buf);
            channel.append_command_data(bytemuck::cast_slice(data.positions()));
            channel.append_command_data(bytemuck::cast_slice(data.normals()));
            channel.append_command_data(bytemuck::cast_slice(data.tex_coords()));
            channel.append_command_data(bytemuck::cast_slice(data.indices()));
            channel.end_command();
        }

        NodeRef::Material(key) => {
            let Some(material) = graph.materials.get(key) else {
                return;
            };
            match &material.data {
                Material::Diffuse { color } => {
                    let mut p = Payload::default();
                    p.animated(graph, id, color, |p, v| p.vec4(*v));
                    channel.send_command(CommandKind::DiffuseMaterial, target, &p.buf);
                }
                Material::Specular { color, power } => {
                    let mut p = Payload::default();
                    p.animated(graph, id, color, |p, v| p.vec4(*v));
                    p.animated(graph, id, power, |p, v| p.f32(*v));
                    channel.send_command(CommandKind::SpecularMaterial, target, &p.buf);
                }
                Material::Emissive { color } => {
                    let mut p = Payload::default();
                    p.animated(graph, id, color, |p, v| p.vec4(*v));
                    channel.send_command(CommandKind::EmissiveMaterial, target, &p.buf);
                }
                Material::Group { children } => {
                    channel.begin_command(CommandKind::MaterialGroup, target);
                    let mut p = Payload::default();
                    p.u32(children.len() as u32);
                    for child in children {
                        p.handle(graph.material_handle(Some(*child), id));
                    }
                    channel.append_command_data(&p.buf);
                    channel.end_command();
                }
            }
        }

        NodeRef::Transform(key) => {
            let Some(transform) = graph.transforms.get(key) else {
                return;
            };
            match &transform.data {
                Transform3D::Translate { offset } => {
                    let mut p = Payload::default();
                    p.animated(graph, id, offset, |p, v| p.vec3(*v));
                    channel.send_command(CommandKind::TranslateTransform, target, &p.buf);
                }
                Transform3D::Scale { scale, center } => {
                    let mut p = Payload::default();
                    p.animated(graph, id, scale, |p, v| p.vec3(*v));
                    p.animated(graph, id, center, |p, v| p.vec3(*v));
                    channel.send_command(CommandKind::ScaleTransform, target, &p.buf);
                }
                Transform3D::Rotate { rotation, center } => {
                    let mut p = Payload::default();
                    p.handle(graph.rotation_handle(*rotation, id));
                    p.animated(graph, id, center, |p, v| p.vec3(*v));
                    channel.send_command(CommandKind::RotateTransform, target, &p.buf);
                }
                Transform3D::Matrix { matrix } => {
                    let mut p = Payload::default();
                    p.mat4(matrix);
                    channel.send_command(CommandKind::MatrixTransform, target, &p.buf);
                }
                Transform3D::Group { children } => {
                    channel.begin_command(CommandKind::TransformGroup, target);
                    let mut p = Payload::default();
                    p.u32(children.len() as u32);
                    for child in children {
                        p.handle(graph.transform_handle(Some(*child), id));
                    }
                    channel.append_command_data(&p.buf);
                    channel.end_command();
                }
            }
        }

        NodeRef::Rotation(key) => {
            let Some(rotation) = graph.rotations.get(key) else {
                return;
            };
            match &rotation.data {
                Rotation3D::AxisAngle { axis, angle } => {
                    let mut p = Payload::default();
                    p.animated(graph, id, axis, |p, v| p.vec3(*v));
                    p.animated(graph, id, angle, |p, v| p.f32(*v));
                    channel.send_command(CommandKind::AxisAngleRotation, target, &p.buf);
                }
                Rotation3D::Quaternion { quaternion } => {
                    let mut p = Payload::default();
                    p.animated(graph, id, quaternion, |p, v| p.quat(*v));
                    channel.send_command(CommandKind::QuaternionRotation, target, &p.buf);
                }
            }
        }

        NodeRef::Camera(key) => {
            let Some(camera) = graph.cameras.get(key) else {
                return;
            };
            let transform = graph.transform_handle(camera.transform, id);
            match &camera.data {
                Camera::Perspective(cam) => {
                    let mut p = Payload::default();
                    p.handle(transform);
                    p.animated(graph, id, &cam.position, |p, v| p.vec3(*v));
                    p.animated(graph, id, &cam.look_direction, |p, v| p.vec3(*v));
                    p.animated(graph, id, &cam.up_direction, |p, v| p.vec3(*v));
                    p.f32(cam.fov);
                    p.f32(cam.near);
                    p.f32(cam.far);
                    channel.send_command(CommandKind::PerspectiveCamera, target, &p.buf);
                }
                Camera::Orthographic(cam) => {
                    let mut p = Payload::default();
                    p.handle(transform);
                    p.animated(graph, id, &cam.position, |p, v| p.vec3(*v));
                    p.animated(graph, id, &cam.look_direction, |p, v| p.vec3(*v));
                    p.animated(graph, id, &cam.up_direction, |p, v| p.vec3(*v));
                    p.f32(cam.width);
                    p.f32(cam.near);
                    p.f32(cam.far);
                    channel.send_command(CommandKind::OrthographicCamera, target, &p.buf);
                }
                Camera::Matrix(cam) => {
                    let mut p = Payload::default();
                    p.handle(transform);
                    p.mat4(&cam.view);
                    p.mat4(&cam.projection);
                    channel.send_command(CommandKind::MatrixCamera, target, &p.buf);
                }
            }
        }

        NodeRef::Animator(key) => {
            let Some(animator) = graph.animators.get(key) else {
                return;
            };
            let payload = [animator.data.target as u8];
            channel.send_command(CommandKind::Animator, target, &payload);
        }
    }
}

fn write_light(
    graph: &SceneGraph,
    id: ChannelId,
    channel: &mut Channel,
    target: ResourceHandle,
    transform: Option<ResourceHandle>,
    light: &Light,
) {
    let mut p = Payload::default();
    p.handle(transform);
    p.animated(graph, id, &light.color, |p, v| p.vec3(*v));
    p.f32(light.intensity);
    match &light.kind {
        LightKind::Ambient => {
            channel.send_command(CommandKind::AmbientLight, target, &p.buf);
        }
        LightKind::Directional { direction } => {
            p.animated(graph, id, direction, |p, v| p.vec3(*v));
            channel.send_command(CommandKind::DirectionalLight, target, &p.buf);
        }
        LightKind::Point {
            position,
            range,
            attenuation,
        } => {
            p.animated(graph, id, position, |p, v| p.vec3(*v));
            p.f32(*range);
            p.attenuation(attenuation);
            channel.send_command(CommandKind::PointLight, target, &p.buf);
        }
        LightKind::Spot {
            position,
            direction,
            range,
            inner_cone,
            outer_cone,
            attenuation,
        } => {
            p.animated(graph, id, position, |p, v| p.vec3(*v));
            p.animated(graph, id, direction, |p, v| p.vec3(*v));
            p.f32(*range);
            p.f32(*inner_cone);
            p.f32(*outer_cone);
            p.attenuation(attenuation);
            channel.send_command(CommandKind::SpotLight, target, &p.buf);
        }
    }
}
