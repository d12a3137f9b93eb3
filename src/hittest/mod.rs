//! Ray hit-testing.
//!
//! A transform-stack-aware depth-first walk over the visual and model trees
//! that intersects a world-space ray against mesh geometry and reports
//! results to the caller in ascending distance order. The walk takes no
//! locks: callers guarantee the graph is stable for the duration of a
//! dispatch.

pub mod params;
pub mod results;
pub mod walker;

pub use params::{MatrixStack, RayHitTestParameters};
pub use results::RayMeshResult;
pub use walker::{HitTestBehavior, HitTestFilterBehavior, HitTestOptions, hit_test};
