//! # vugraph
//!
//! A planar half-edge topology engine for triangulations and polygon
//! overlays.
//!
//! vugraph stores planar subdivisions as "vertex use" graphs: every edge is a
//! pair of mated nodes, and each node sits in one vertex loop and one face
//! loop. On top of the graph it provides mask-driven classification,
//! Laplacian smoothing with triangle flips, draping of overlapping polygons,
//! and clipping of triangulated terrain models.
//!
//! ## Features
//!
//! - **Arena graph**: nodes addressed by typed [`graph::NodeId`] handles with
//!   16-, 32- or 64-bit indices, slot recycling, and a pool of scratch masks
//! - **Classification**: small faces, dangling edges, degree tests
//! - **Smoothing**: area-weighted Laplacian relaxation with periodic flips
//! - **Drape**: highest-plane lookup over overlapping polygons
//! - **Terrain**: point/line/feature models with polygon clipping and voids
//! - **File formats**: STL
//!
//! ## Quick Start
//!
//! ```no_run
//! use vugraph::prelude::*;
//!
//! let tin = vugraph::io::load("terrain.stl").unwrap();
//! let mut graph: VuGraph = tin.to_graph().unwrap();
//!
//! let report = smooth_with_flips(&mut graph, &SmoothOptions::default()).unwrap();
//! println!("{} sweeps, converged: {}", report.sweeps, report.converged);
//! ```
//!
//! ## Building Graphs Programmatically
//!
//! ```
//! use vugraph::prelude::*;
//! use nalgebra::Point3;
//!
//! let points = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let graph: VuGraph = build_from_triangles(&points, &[[0, 1, 2], [0, 2, 3]]).unwrap();
//! assert_eq!(graph.num_edges(), 5);
//! assert!(graph.is_valid());
//! ```
//!
//! ## Graph Traversal
//!
//! Face and vertex loops are plain iterators:
//!
//! ```
//! use vugraph::prelude::*;
//! use nalgebra::Point3;
//!
//! # let points = vec![
//! #     Point3::new(0.0, 0.0, 0.0),
//! #     Point3::new(1.0, 0.0, 0.0),
//! #     Point3::new(0.0, 1.0, 0.0),
//! # ];
//! let graph: VuGraph = build_from_triangles(&points, &[[0, 1, 2]]).unwrap();
//! for seed in graph.collect_face_seeds() {
//!     let corners: Vec<_> = graph.face_loop(seed).map(|n| *graph.xyz(n)).collect();
//!     println!("face with {} corners, area {}", corners.len(), graph.face_area(seed));
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod drape;
pub mod dtm;
pub mod error;
pub mod graph;
pub mod io;

/// Prelude module for convenient imports.
///
/// ```
/// use vugraph::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::{
        delete_dangling_edges, smooth_with_flips, FlipOptions, SmoothOptions, SmoothReport,
    };
    pub use crate::drape::DrapeGraph;
    pub use crate::dtm::{Dtm, FeatureKind};
    pub use crate::error::{Result, VuError};
    pub use crate::graph::{
        build_from_triangles, NodeId, PositionDetail, TopologyScope, VuGraph, VuIndex, VuMask,
    };
}

// Re-export nalgebra types for convenience
pub use nalgebra;
