//! Camera nodes and viewport ray construction.

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::animation::AnimatedProperty;
use crate::errors::{ArborError, Result};
use crate::math::Ray;
use crate::math::matrix;
use crate::scene::TransformKey;
use crate::scene::node::NodeCore;

#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    pub position: AnimatedProperty<Vec3>,
    pub look_direction: AnimatedProperty<Vec3>,
    pub up_direction: AnimatedProperty<Vec3>,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

#[derive(Debug, Clone)]
pub struct OrthographicCamera {
    pub position: AnimatedProperty<Vec3>,
    pub look_direction: AnimatedProperty<Vec3>,
    pub up_direction: AnimatedProperty<Vec3>,
    /// World-space width of the viewing volume.
    pub width: f32,
    pub near: f32,
    pub far: f32,
}

/// Raw view/projection pair for callers that compute their own matrices.
#[derive(Debug, Clone)]
pub struct MatrixCamera {
    pub view: Mat4,
    pub projection: Mat4,
}

/// A camera node.
#[derive(Debug, Clone)]
pub enum Camera {
    Perspective(PerspectiveCamera),
    Orthographic(OrthographicCamera),
    Matrix(MatrixCamera),
}

impl Camera {
    #[must_use]
    pub fn new_perspective(position: Vec3, look_direction: Vec3, fov: f32, near: f32, far: f32) -> Self {
        Self::Perspective(PerspectiveCamera {
            position: AnimatedProperty::new(position),
            look_direction: AnimatedProperty::new(look_direction),
            up_direction: AnimatedProperty::new(Vec3::Y),
            fov,
            near,
            far,
        })
    }

    #[must_use]
    pub fn new_orthographic(position: Vec3, look_direction: Vec3, width: f32, near: f32, far: f32) -> Self {
        Self::Orthographic(OrthographicCamera {
            position: AnimatedProperty::new(position),
            look_direction: AnimatedProperty::new(look_direction),
            up_direction: AnimatedProperty::new(Vec3::Y),
            width,
            near,
            far,
        })
    }

    #[must_use]
    pub fn new_matrix(view: Mat4, projection: Mat4) -> Self {
        Self::Matrix(MatrixCamera { view, projection })
    }

    /// World-to-camera matrix, before any node-level transform is applied.
    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        match self {
            Self::Perspective(cam) => Mat4::look_to_rh(
                *cam.position.value(),
                *cam.look_direction.value(),
                *cam.up_direction.value(),
            ),
            Self::Orthographic(cam) => Mat4::look_to_rh(
                *cam.position.value(),
                *cam.look_direction.value(),
                *cam.up_direction.value(),
            ),
            Self::Matrix(cam) => cam.view,
        }
    }

    /// Projection matrix for the given viewport aspect ratio (width/height).
    /// Depth maps to the [0, 1] clip range.
    #[must_use]
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        match self {
            Self::Perspective(cam) => {
                Mat4::perspective_rh(cam.fov.to_radians(), aspect, cam.near, cam.far)
            }
            Self::Orthographic(cam) => {
                let w = cam.width * 0.5;
                let h = w / aspect;
                Mat4::orthographic_rh(-w, w, -h, h, cam.near, cam.far)
            }
            Self::Matrix(cam) => cam.projection,
        }
    }

    /// Constructs the world-space pick ray through `point` on a viewport of
    /// `viewport_size` pixels, along with the composed view*projection
    /// matrix reused later to map hit points back to 2-D coordinates.
    ///
    /// `camera_transform` places the camera node in the world (identity when
    /// the node carries no transform). This is the one place a singular
    /// matrix is surfaced as an error instead of NaN-propagated: an
    /// uninvertible view*projection cannot produce a ray.
    pub fn viewport_ray(
        &self,
        camera_transform: &Mat4,
        point: Vec2,
        viewport_size: Vec2,
    ) -> Result<(Ray, Mat4)> {
        let aspect = viewport_size.x / viewport_size.y;
        // The node transform moves the camera, so the world-to-view mapping
        // runs through its inverse. Degeneracy here flows into the
        // determinant check below.
        let view = self.view_matrix() * matrix::inverse_or_nan(camera_transform);
        let view_projection = self.projection_matrix(aspect) * view;

        if !matrix::has_inverse(&view_projection) {
            return Err(ArborError::SingularMatrix);
        }
        let inverse = view_projection.inverse();

        // Viewport point to NDC; the viewport Y axis points down.
        let ndc = Vec2::new(
            2.0 * point.x / viewport_size.x - 1.0,
            1.0 - 2.0 * point.y / viewport_size.y,
        );

        let near = inverse * Vec4::new(ndc.x, ndc.y, 0.0, 1.0);
        let far = inverse * Vec4::new(ndc.x, ndc.y, 1.0, 1.0);
        if near.w == 0.0 || far.w == 0.0 {
            return Err(ArborError::SingularMatrix);
        }

        let origin = near.truncate() / near.w;
        let mut direction = far.truncate() / far.w - origin;
        // A negative homogeneous W mirrors the unprojected point through the
        // origin; undo the resulting direction flip.
        if far.w < 0.0 {
            direction = -direction;
        }

        Ok((Ray::new(origin, direction), view_projection))
    }
}

/// Arena record for a camera node.
#[derive(Debug, Clone)]
pub struct CameraNode {
    pub core: NodeCore,
    pub transform: Option<TransformKey>,
    pub data: Camera,
}
