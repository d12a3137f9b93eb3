//! Material nodes.
//!
//! Brush and pixel-format concerns live outside this crate; materials carry
//! resolved RGBA colors plus the shading-model parameters the compositor
//! needs. `Group` layers its children in iteration order.

use glam::Vec4;

use crate::animation::AnimatedProperty;
use crate::scene::MaterialKey;
use crate::scene::node::NodeCore;

/// A material node.
#[derive(Debug, Clone)]
pub enum Material {
    Diffuse {
        color: AnimatedProperty<Vec4>,
    },
    Specular {
        color: AnimatedProperty<Vec4>,
        /// Specular exponent.
        power: AnimatedProperty<f32>,
    },
    Emissive {
        color: AnimatedProperty<Vec4>,
    },
    Group {
        children: Vec<MaterialKey>,
    },
}

impl Material {
    #[must_use]
    pub fn diffuse(color: Vec4) -> Self {
        Self::Diffuse {
            color: AnimatedProperty::new(color),
        }
    }

    #[must_use]
    pub fn specular(color: Vec4, power: f32) -> Self {
        Self::Specular {
            color: AnimatedProperty::new(color),
            power: AnimatedProperty::new(power),
        }
    }

    #[must_use]
    pub fn emissive(color: Vec4) -> Self {
        Self::Emissive {
            color: AnimatedProperty::new(color),
        }
    }

    #[must_use]
    pub fn group(children: Vec<MaterialKey>) -> Self {
        Self::Group { children }
    }
}

/// Arena record for a material node.
#[derive(Debug, Clone)]
pub struct MaterialNode {
    pub core: NodeCore,
    pub data: Material,
}
