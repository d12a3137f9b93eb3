//! Model nodes: groups, geometry models and lights.

use glam::Vec3;

use crate::animation::AnimatedProperty;
use crate::scene::node::NodeCore;
use crate::scene::{MaterialKey, MeshKey, ModelKey, TransformKey};

/// Distance attenuation coefficients for positional lights.
#[derive(Debug, Clone, Copy)]
pub struct Attenuation {
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
}

impl Default for Attenuation {
    fn default() -> Self {
        Self {
            constant: 1.0,
            linear: 0.0,
            quadratic: 0.0,
        }
    }
}

/// Shape-specific light data.
#[derive(Debug, Clone)]
pub enum LightKind {
    Ambient,
    Directional {
        direction: AnimatedProperty<Vec3>,
    },
    Point {
        position: AnimatedProperty<Vec3>,
        range: f32,
        attenuation: Attenuation,
    },
    Spot {
        position: AnimatedProperty<Vec3>,
        direction: AnimatedProperty<Vec3>,
        range: f32,
        /// Inner cone angle in degrees.
        inner_cone: f32,
        /// Outer cone angle in degrees.
        outer_cone: f32,
        attenuation: Attenuation,
    },
}

/// A light source in the model tree.
///
/// Lights are models: they live in groups and carry transforms, but they
/// contribute empty bounds and decline hit-test participation.
#[derive(Debug, Clone)]
pub struct Light {
    pub color: AnimatedProperty<Vec3>,
    pub intensity: f32,
    pub kind: LightKind,
}

impl Light {
    #[must_use]
    pub fn new_ambient(color: Vec3, intensity: f32) -> Self {
        Self {
            color: AnimatedProperty::new(color),
            intensity,
            kind: LightKind::Ambient,
        }
    }

    #[must_use]
    pub fn new_directional(color: Vec3, intensity: f32, direction: Vec3) -> Self {
        Self {
            color: AnimatedProperty::new(color),
            intensity,
            kind: LightKind::Directional {
                direction: AnimatedProperty::new(direction),
            },
        }
    }

    #[must_use]
    pub fn new_point(color: Vec3, intensity: f32, position: Vec3, range: f32) -> Self {
        Self {
            color: AnimatedProperty::new(color),
            intensity,
            kind: LightKind::Point {
                position: AnimatedProperty::new(position),
                range,
                attenuation: Attenuation::default(),
            },
        }
    }

    #[must_use]
    pub fn new_spot(
        color: Vec3,
        intensity: f32,
        position: Vec3,
        direction: Vec3,
        range: f32,
        inner_cone: f32,
        outer_cone: f32,
    ) -> Self {
        Self {
            color: AnimatedProperty::new(color),
            intensity,
            kind: LightKind::Spot {
                position: AnimatedProperty::new(position),
                direction: AnimatedProperty::new(direction),
                range,
                inner_cone,
                outer_cone,
                attenuation: Attenuation::default(),
            },
        }
    }
}

/// A model node.
#[derive(Debug, Clone)]
pub enum Model {
    /// Aggregates child models; bounds are the union of the children's
    /// outer-space bounds.
    Group { children: Vec<ModelKey> },
    /// Mesh geometry with front and (optional) back materials.
    Geometry {
        mesh: Option<MeshKey>,
        material: Option<MaterialKey>,
        back_material: Option<MaterialKey>,
    },
    Light(Light),
}

impl Model {
    #[must_use]
    pub fn group(children: Vec<ModelKey>) -> Self {
        Self::Group { children }
    }

    #[must_use]
    pub fn geometry(mesh: MeshKey, material: MaterialKey) -> Self {
        Self::Geometry {
            mesh: Some(mesh),
            material: Some(material),
            back_material: None,
        }
    }
}

/// Arena record for a model node. The transform applies to every variant,
/// so it sits on the record rather than inside [`Model`].
#[derive(Debug, Clone)]
pub struct ModelNode {
    pub core: NodeCore,
    pub transform: Option<TransformKey>,
    pub data: Model,
}
