//! Core graph data structures.
//!
//! This module provides the planar half-edge ("vertex use") graph and the
//! types that go with it.
//!
//! # Overview
//!
//! The primary type is [`VuGraph`], an arena of [`VuNode`]s linked into
//! vertex loops, face loops and edge mates. Nodes are addressed by the
//! type-safe [`NodeId`] handle, generic over its integer width
//! ([`VuIndex`]).
//!
//! Nodes carry 32 mask bits ([`VuMask`]). Eight are fixed, named masks; the
//! rest are lent out by the graph for the duration of one pass with
//! [`VuGraph::with_mask`].
//!
//! # Construction
//!
//! ```
//! use vugraph::graph::{build_from_triangles, VuGraph, VuMask};
//! use nalgebra::Point3;
//!
//! let points = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let graph: VuGraph = build_from_triangles(&points, &[[0, 1, 2], [0, 2, 3]]).unwrap();
//!
//! let bounded = graph
//!     .collect_face_seeds()
//!     .into_iter()
//!     .filter(|&f| !graph.has_mask(f, VuMask::EXTERIOR))
//!     .count();
//! assert_eq!(bounded, 2);
//! ```

pub(crate) mod builder;
mod index;
mod mask;
mod position;
mod vugraph;

pub use builder::{
    add_polygon_loop, build_from_triangles, link_vertex_by_angle, to_polylines, to_triangles,
};
pub use index::{NodeId, VuIndex};
pub use mask::{VuMask, RESERVED_BITS};
pub use position::{point_in_polygon_xy, segment_intersection_xy, PositionDetail, TopologyScope};
pub use vugraph::{LoopIter, VuGraph, VuNode};
