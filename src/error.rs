//! Error types for vugraph.
//!
//! Topology corruption (for example joining a node that already has a mate) is
//! a programming error and panics. Everything a caller can react to is
//! reported through [`VuError`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`VuError`].
pub type Result<T> = std::result::Result<T, VuError>;

/// Errors that can occur during graph operations.
#[derive(Error, Debug)]
pub enum VuError {
    /// The node arena cannot address another node with its index type.
    #[error("node arena exhausted ({capacity} nodes)")]
    OutOfNodes {
        /// Number of nodes the index type can address.
        capacity: usize,
    },

    /// Every mask bit of the pool is currently grabbed.
    #[error("out of masks: all pool bits are in use")]
    OutOfMasks,

    /// The triangulation has no triangles.
    #[error("triangulation has no triangles")]
    EmptyInput,

    /// A triangle references a point that does not exist.
    #[error("triangle {face} references invalid point index {vertex}")]
    InvalidVertexIndex {
        /// Index of the triangle.
        face: usize,
        /// The invalid point index.
        vertex: usize,
    },

    /// A triangle repeats a point or has zero xy area.
    #[error("triangle {face} is degenerate")]
    DegenerateFace {
        /// Index of the triangle.
        face: usize,
    },

    /// A directed edge is used by more than one triangle.
    #[error("edge ({v0}, {v1}) is used by more than one triangle on the same side")]
    NonManifoldEdge {
        /// Start point of the edge.
        v0: usize,
        /// End point of the edge.
        v1: usize,
    },

    /// The node does not belong to a live, joined edge.
    #[error("node {node} is not part of a live edge")]
    NotAnEdge {
        /// Raw index of the offending node.
        node: usize,
    },

    /// A plane normal is too small (or horizontal) to define z = f(x, y).
    #[error("degenerate plane normal ({x}, {y}, {z})")]
    DegenerateNormal {
        /// Normal x component.
        x: f64,
        /// Normal y component.
        y: f64,
        /// Normal z component.
        z: f64,
    },

    /// Geometry is degenerate for the requested operation.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// An input polygon is unusable.
    #[error("invalid polygon: {0}")]
    InvalidPolygon(String),

    /// Consecutive polygon points are not joined by a line.
    #[error("polygon is not connected: no line between points {from} and {to}")]
    DisconnectedPolygon {
        /// Start point of the missing line.
        from: usize,
        /// End point of the missing line.
        to: usize,
    },

    /// Edge crossings disagree with polygon in/out parity.
    #[error("parity errors detected on {count} edges")]
    ParityError {
        /// Number of edges marked with the parity mask.
        count: usize,
    },

    /// A query needs results of a drape analysis that has not run since
    /// the last change.
    #[error("drape analysis has not been run")]
    NotAnalyzed,

    /// A void feature lies entirely inside another void.
    #[error("void feature {feature} is internal to another void")]
    NestedVoid {
        /// Index of the nested void feature.
        feature: usize,
    },

    /// A feature index or feature definition is invalid.
    #[error("invalid feature: {0}")]
    InvalidFeature(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error loading a triangulation from file.
    #[error("failed to load triangulation from {path}: {message}")]
    LoadError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Error saving a triangulation to file.
    #[error("failed to save triangulation to {path}: {message}")]
    SaveError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Unsupported file format.
    #[error("unsupported file format: {extension}")]
    UnsupportedFormat {
        /// The file extension.
        extension: String,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl VuError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        VuError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}
