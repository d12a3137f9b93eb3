use glam::{Mat4, Vec2, Vec3};

use crate::errors::Result;
use crate::hittest::results::RayMeshResult;
use crate::math::Ray;
use crate::math::matrix;
use crate::scene::CameraKey;
use crate::scene::graph::SceneGraph;

/// A stack of *composed* matrices: each entry is the product of everything
/// below it, so the current accumulated transform is read off the top in
/// O(1) and popping restores the previous composition exactly.
#[derive(Debug, Clone, Default)]
pub struct MatrixStack {
    stack: Vec<Mat4>,
}

impl MatrixStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes `matrix` composed onto the current top (`top * matrix`).
    pub fn push(&mut self, matrix: &Mat4) {
        let composed = match self.stack.last() {
            Some(top) => matrix::append(top, matrix),
            None => *matrix,
        };
        self.stack.push(composed);
    }

    pub fn pop(&mut self) {
        self.stack.pop();
    }

    #[must_use]
    pub fn top(&self) -> Option<&Mat4> {
        self.stack.last()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }
}

/// State of one ray hit-test dispatch.
///
/// The ray itself is immutable for the life of the test; the walk mutates
/// only the two transform stacks and the accumulated result list.
#[derive(Debug)]
pub struct RayHitTestParameters {
    origin: Vec3,
    direction: Vec3,

    pub(crate) model_stack: MatrixStack,
    pub(crate) visual_stack: MatrixStack,

    hit_test_projection: Option<Mat4>,
    distance_adjustment: f32,

    pub(crate) results: Vec<RayMeshResult>,
}

impl RayHitTestParameters {
    #[must_use]
    pub fn new(ray: Ray) -> Self {
        Self {
            origin: ray.origin,
            direction: ray.direction,
            model_stack: MatrixStack::new(),
            visual_stack: MatrixStack::new(),
            hit_test_projection: None,
            distance_adjustment: 0.0,
            results: Vec::new(),
        }
    }

    /// Builds parameters from a camera and a viewport point, storing the
    /// camera's view*projection as the hit-test projection for later 2-D
    /// mapping of results. Fails with `SingularMatrix` for a degenerate
    /// camera (the one hard singular-matrix failure in the subsystem).
    pub fn from_camera(
        graph: &SceneGraph,
        camera: CameraKey,
        point: Vec2,
        viewport_size: Vec2,
    ) -> Result<Self> {
        let (ray, projection) = graph.camera_viewport_ray(camera, point, viewport_size)?;
        let mut params = Self::new(ray);
        params.hit_test_projection = Some(projection);
        Ok(params)
    }

    #[must_use]
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    #[must_use]
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    #[must_use]
    pub fn ray(&self) -> Ray {
        Ray::new_unnormalized(self.origin, self.direction)
    }

    // ------------------------------------------------------------------------
    // Transform stacks
    // ------------------------------------------------------------------------

    pub fn push_model_transform(&mut self, matrix: &Mat4) {
        self.model_stack.push(matrix);
    }

    pub fn pop_model_transform(&mut self) {
        self.model_stack.pop();
    }

    pub fn push_visual_transform(&mut self, matrix: &Mat4) {
        self.visual_stack.push(matrix);
    }

    pub fn pop_visual_transform(&mut self) {
        self.visual_stack.pop();
    }

    /// The combined local-to-world matrix at the current walk position:
    /// `model_top * visual_top` when both stacks are non-empty, the
    /// non-empty top alone otherwise, identity when both are empty.
    #[must_use]
    pub fn world_transform_matrix(&self) -> Mat4 {
        match (self.model_stack.top(), self.visual_stack.top()) {
            (Some(model), Some(visual)) => matrix::append(model, visual),
            (Some(model), None) => *model,
            (None, Some(visual)) => *visual,
            (None, None) => Mat4::IDENTITY,
        }
    }

    // ------------------------------------------------------------------------
    // Projection and distance adjustment
    // ------------------------------------------------------------------------

    /// The lazily set projection matrix used to map world-space hit points
    /// back into 2-D viewport coordinates.
    #[must_use]
    pub fn hit_test_projection(&self) -> Option<&Mat4> {
        self.hit_test_projection.as_ref()
    }

    pub fn set_hit_test_projection(&mut self, projection: Mat4) {
        self.hit_test_projection = Some(projection);
    }

    /// Offset added to every reported distance, letting an outer dispatcher
    /// rebase results into its own ray parameterization.
    #[must_use]
    pub fn distance_adjustment(&self) -> f32 {
        self.distance_adjustment
    }

    pub fn set_distance_adjustment(&mut self, adjustment: f32) {
        self.distance_adjustment = adjustment;
    }

    // ------------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------------

    pub(crate) fn report(&mut self, result: RayMeshResult) {
        self.results.push(result);
    }

    #[must_use]
    pub fn results(&self) -> &[RayMeshResult] {
        &self.results
    }

    /// Clears accumulated results between independent dispatches.
    pub fn clear_results(&mut self) {
        self.results.clear();
    }
}
