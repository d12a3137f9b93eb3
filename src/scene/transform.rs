//! Transform nodes.
//!
//! The closed variant set of 3-D transforms plus the rotation nodes the
//! rotate variant references. A transform's [`value`](Transform3D) is the
//! composed local matrix; groups compose their children by successive
//! append (`acc = acc * child`) in iteration order, and a group's inverse is
//! the reversed product of the children's inverses, short-circuiting to
//! `None` when any child is non-invertible.

use glam::{Mat4, Quat, Vec3};

use crate::animation::AnimatedProperty;
use crate::math::matrix;
use crate::scene::graph::SceneGraph;
use crate::scene::node::NodeCore;
use crate::scene::{RotationKey, TransformKey};

// ============================================================================
// Rotation3D
// ============================================================================

/// A rotation node: axis/angle or quaternion. Animatable independently of
/// the transform that references it, so it is a node of its own rather than
/// a plain field.
#[derive(Debug, Clone)]
pub enum Rotation3D {
    AxisAngle {
        axis: AnimatedProperty<Vec3>,
        /// Angle in degrees.
        angle: AnimatedProperty<f32>,
    },
    Quaternion {
        quaternion: AnimatedProperty<Quat>,
    },
}

impl Rotation3D {
    #[must_use]
    pub fn axis_angle(axis: Vec3, angle_degrees: f32) -> Self {
        Self::AxisAngle {
            axis: AnimatedProperty::new(axis),
            angle: AnimatedProperty::new(angle_degrees),
        }
    }

    #[must_use]
    pub fn quaternion(quaternion: Quat) -> Self {
        Self::Quaternion {
            quaternion: AnimatedProperty::new(quaternion),
        }
    }

    /// The rotation as a quaternion. A zero-length axis degenerates to the
    /// identity rotation rather than NaN.
    #[must_use]
    pub fn as_quat(&self) -> Quat {
        match self {
            Self::AxisAngle { axis, angle } => {
                let axis = *axis.value();
                if axis.length_squared() < f32::EPSILON {
                    Quat::IDENTITY
                } else {
                    Quat::from_axis_angle(axis.normalize(), angle.value().to_radians())
                }
            }
            Self::Quaternion { quaternion } => *quaternion.value(),
        }
    }
}

/// Arena record for a rotation node.
#[derive(Debug, Clone)]
pub struct RotationNode {
    pub core: NodeCore,
    pub data: Rotation3D,
}

// ============================================================================
// Transform3D
// ============================================================================

/// A 3-D transform node.
#[derive(Debug, Clone)]
pub enum Transform3D {
    Translate {
        offset: AnimatedProperty<Vec3>,
    },
    Scale {
        scale: AnimatedProperty<Vec3>,
        center: AnimatedProperty<Vec3>,
    },
    Rotate {
        rotation: Option<RotationKey>,
        center: AnimatedProperty<Vec3>,
    },
    Matrix {
        matrix: Mat4,
    },
    Group {
        children: Vec<TransformKey>,
    },
}

impl Transform3D {
    #[must_use]
    pub fn translate(offset: Vec3) -> Self {
        Self::Translate {
            offset: AnimatedProperty::new(offset),
        }
    }

    #[must_use]
    pub fn scale(scale: Vec3) -> Self {
        Self::Scale {
            scale: AnimatedProperty::new(scale),
            center: AnimatedProperty::new(Vec3::ZERO),
        }
    }

    #[must_use]
    pub fn scale_about(scale: Vec3, center: Vec3) -> Self {
        Self::Scale {
            scale: AnimatedProperty::new(scale),
            center: AnimatedProperty::new(center),
        }
    }

    #[must_use]
    pub fn rotate(rotation: RotationKey) -> Self {
        Self::Rotate {
            rotation: Some(rotation),
            center: AnimatedProperty::new(Vec3::ZERO),
        }
    }

    #[must_use]
    pub fn rotate_about(rotation: RotationKey, center: Vec3) -> Self {
        Self::Rotate {
            rotation: Some(rotation),
            center: AnimatedProperty::new(center),
        }
    }

    #[must_use]
    pub fn matrix(matrix: Mat4) -> Self {
        Self::Matrix { matrix }
    }

    #[must_use]
    pub fn group(children: Vec<TransformKey>) -> Self {
        Self::Group { children }
    }

    /// The composed local matrix of this transform.
    ///
    /// Stale child keys contribute identity; animated slots contribute their
    /// literal base value (sampling is the compositor's job).
    #[must_use]
    pub fn value(&self, graph: &SceneGraph) -> Mat4 {
        match self {
            Self::Translate { offset } => Mat4::from_translation(*offset.value()),
            Self::Scale { scale, center } => {
                scale_about_center(*scale.value(), *center.value())
            }
            Self::Rotate { rotation, center } => {
                let quat = rotation
                    .and_then(|key| graph.rotations.get(key))
                    .map_or(Quat::IDENTITY, |node| node.data.as_quat());
                rotate_about_center(quat, *center.value())
            }
            Self::Matrix { matrix } => *matrix,
            Self::Group { children } => {
                let mut acc = Mat4::IDENTITY;
                for child in children {
                    if let Some(node) = graph.transforms.get(*child) {
                        acc = matrix::append(&acc, &node.data.value(graph));
                    }
                }
                acc
            }
        }
    }

    /// The inverse of this transform, or `None` when it (or, for groups, any
    /// member) is non-invertible.
    #[must_use]
    pub fn inverse(&self, graph: &SceneGraph) -> Option<Mat4> {
        match self {
            Self::Group { children } => {
                let mut acc = Mat4::IDENTITY;
                // Reversed order: inv(C0 * C1 * ... * Cn) = inv(Cn) * ... * inv(C0).
                for child in children.iter().rev() {
                    let inv = graph
                        .transforms
                        .get(*child)
                        .and_then(|node| node.data.inverse(graph))?;
                    acc = matrix::append(&acc, &inv);
                }
                Some(acc)
            }
            _ => {
                let m = self.value(graph);
                matrix::has_inverse(&m).then(|| m.inverse())
            }
        }
    }
}

/// Arena record for a transform node.
#[derive(Debug, Clone)]
pub struct TransformNode {
    pub core: NodeCore,
    pub data: Transform3D,
}

fn scale_about_center(scale: Vec3, center: Vec3) -> Mat4 {
    if center == Vec3::ZERO {
        Mat4::from_scale(scale)
    } else {
        Mat4::from_translation(center)
            * Mat4::from_scale(scale)
            * Mat4::from_translation(-center)
    }
}

fn rotate_about_center(quat: Quat, center: Vec3) -> Mat4 {
    if center == Vec3::ZERO {
        Mat4::from_quat(quat)
    } else {
        Mat4::from_translation(center)
            * Mat4::from_quat(quat)
            * Mat4::from_translation(-center)
    }
}
