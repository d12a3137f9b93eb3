//! Geometric primitives.
//!
//! Pure value types: bounding boxes, rays, triangle intersection and the
//! matrix helpers the scene graph builds on. Everything here is `Copy`-ish
//! data with no node identity; `glam` supplies the vector/matrix types.

pub mod bounds;
pub mod matrix;
pub mod ray;
pub mod triangle;

pub use bounds::BoundingBox;
pub use ray::Ray;
pub use triangle::TriangleHit;
