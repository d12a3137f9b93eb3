//! Error Types
//!
//! This module defines the error types used throughout the scene graph.
//!
//! # Overview
//!
//! The main error type [`ArborError`] covers all failure modes including:
//! - Singular matrices surfaced during camera ray construction
//! - Failed point transforms through degenerate matrices
//! - Mutation of frozen nodes
//! - Stale arena keys handed to graph operations
//!
//! # Usage
//!
//! All fallible public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, ArborError>`.

use thiserror::Error;

/// The main error type for the arbor3d scene graph.
///
/// Geometric degeneracies outside camera ray construction are deliberately
/// *not* errors: a non-invertible transform encountered mid-walk degrades to
/// a NaN matrix and downstream geometry simply produces no hits.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArborError {
    // ========================================================================
    // Geometry Errors
    // ========================================================================
    /// The composed view*projection matrix of a camera has no inverse, so no
    /// ray can be constructed from a viewport point.
    #[error("camera view*projection matrix is singular and cannot be inverted")]
    SingularMatrix,

    /// A point could not be transformed (projective divide by zero or a NaN
    /// matrix). The `try_` form of the same operation returns `None` instead.
    #[error("transform failed: {0}")]
    TransformFailed(&'static str),

    // ========================================================================
    // Graph Mutation Errors
    // ========================================================================
    /// The node was frozen and can no longer be mutated.
    #[error("cannot modify a frozen node")]
    Frozen,

    /// A key referred to a node that is no longer (or was never) in the graph.
    #[error("stale node key: {0}")]
    StaleKey(&'static str),

    /// A child being attached would create a cycle through its new parent.
    #[error("attaching the node would create a cycle")]
    CycleDetected,

    /// The operation does not apply to this node variant (wrong group kind,
    /// non-animatable property, index out of range).
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),
}

/// Alias for `Result<T, ArborError>`.
pub type Result<T> = std::result::Result<T, ArborError>;
