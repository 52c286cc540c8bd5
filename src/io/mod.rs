//! Triangulation file I/O.
//!
//! Triangulations are exchanged as a [`Triangulation`]: a point list and
//! triangles indexing into it. From there they become a [`VuGraph`] or a
//! [`Dtm`].
//!
//! # Supported Formats
//!
//! | Format | Extension | Load | Save | Notes |
//! |--------|-----------|------|------|-------|
//! | STL | `.stl` | ✓ | ✓ | Binary and ASCII on load, binary on save |
//!
//! # Usage
//!
//! ```no_run
//! use vugraph::graph::VuGraph;
//! use vugraph::io::{load, save};
//!
//! let tin = load("terrain.stl").unwrap();
//! let graph: VuGraph = tin.to_graph().unwrap();
//! save(&tin, "copy.stl").unwrap();
//! ```

pub mod stl;

use std::path::Path;

use nalgebra::Point3;

use crate::dtm::Dtm;
use crate::error::{Result, VuError};
use crate::graph::{build_from_triangles, to_triangles, VuGraph, VuIndex, VuMask};

/// Supported triangulation file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// STL (stereolithography) format.
    Stl,
}

impl Format {
    /// Detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Format> {
        match ext.to_lowercase().as_str() {
            "stl" => Some(Format::Stl),
            _ => None,
        }
    }

    /// Detect format from file path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Format> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Format::from_extension)
    }
}

/// Points and triangles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Triangulation {
    /// Point coordinates.
    pub points: Vec<Point3<f64>>,
    /// Triangles as point index triples.
    pub triangles: Vec<[usize; 3]>,
}

impl Triangulation {
    /// Build a graph from the triangles.
    pub fn to_graph<I: VuIndex>(&self) -> Result<VuGraph<I>> {
        build_from_triangles(&self.points, &self.triangles)
    }

    /// Bounded triangles of a graph, skipping faces with any node in
    /// `skip_mask`.
    pub fn from_graph<I: VuIndex>(graph: &VuGraph<I>, skip_mask: VuMask) -> Self {
        let (points, triangles) = to_triangles(graph, skip_mask);
        Self { points, triangles }
    }

    /// Build a terrain model from the triangles.
    pub fn into_dtm(self) -> Result<Dtm> {
        Dtm::from_triangles(self.points, &self.triangles)
    }

    /// Non-void triangles of a terrain model.
    pub fn from_dtm(dtm: &Dtm) -> Self {
        Self {
            points: dtm.points().to_vec(),
            triangles: dtm.triangles(),
        }
    }
}

fn detect(path: &Path) -> Result<Format> {
    Format::from_path(path).ok_or_else(|| VuError::UnsupportedFormat {
        extension: path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("(none)")
            .to_string(),
    })
}

/// Load a triangulation, choosing the format from the file extension.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Triangulation> {
    let path = path.as_ref();
    match detect(path)? {
        Format::Stl => stl::load(path),
    }
}

/// Save a triangulation, choosing the format from the file extension.
pub fn save<P: AsRef<Path>>(triangulation: &Triangulation, path: P) -> Result<()> {
    let path = path.as_ref();
    match detect(path)? {
        Format::Stl => stl::save(triangulation, path),
    }
}
