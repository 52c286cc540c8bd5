//! Draping overlapping polygons.
//!
//! A [`DrapeGraph`] takes a set of (possibly overlapping) 3D polygons, each
//! defining a plane, and answers "which surface is on top here" for any xy
//! location.
//!
//! ```
//! use nalgebra::Point3;
//! use vugraph::drape::DrapeGraph;
//! use vugraph::graph::VuMask;
//!
//! let square = |x0: f64, z: f64| {
//!     vec![
//!         Point3::new(x0, 0.0, z),
//!         Point3::new(x0 + 2.0, 0.0, z),
//!         Point3::new(x0 + 2.0, 2.0, z),
//!         Point3::new(x0, 2.0, z),
//!     ]
//! };
//!
//! let mut drape = DrapeGraph::new();
//! drape.add_polygon(&square(0.0, 1.0), VuMask::EXTERIOR).unwrap();
//! drape.add_polygon(&square(1.0, 4.0), VuMask::EXTERIOR).unwrap();
//! drape.do_analysis(0.0, 10.0, 1e-9).unwrap();
//!
//! assert_eq!(drape.drape_xy(0.5, 1.0), Some(1.0));
//! assert_eq!(drape.drape_xy(1.5, 1.0), Some(4.0));
//! ```

mod graph;
mod plane;

pub use graph::{
    update_active_planes_for_edge_crossing, update_active_planes_for_edge_crossings, AnalysisReport,
    DrapeGraph, EdgeCrossing, FaceTester,
};
pub use plane::{newell_normal, PlaneArray, PlaneData};
