//! Edge flipping to improve triangle shape.
//!
//! A flip replaces the diagonal of the quadrilateral formed by two adjacent
//! triangles with the other diagonal. [`flip_pass`] flips every interior edge
//! whose flip raises the worse of the two triangle qualities, measured by
//! [`triangle_quality`] on optionally remapped coordinates.
//!
//! # Example
//!
//! ```
//! use vugraph::prelude::*;
//! use vugraph::algo::flip::{flip_pass, FlipOptions};
//! use nalgebra::Point3;
//!
//! // A thin diagonal across a wide quad.
//! let points = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(4.0, 0.0, 0.0),
//!     Point3::new(4.0, 1.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//!     Point3::new(2.0, -0.2, 0.0),
//! ];
//! let mut graph: VuGraph = build_from_triangles(&points, &[[0, 4, 2], [0, 2, 3], [4, 1, 2]]).unwrap();
//! let flips = flip_pass(&mut graph, &FlipOptions::default(), None).unwrap();
//! println!("{} flips", flips);
//! assert!(graph.is_valid());
//! ```

use std::collections::HashMap;

use log::trace;
use nalgebra::Point3;

use crate::error::{Result, VuError};
use crate::graph::{NodeId, VuGraph, VuIndex, VuMask};

/// Maps graph coordinates into the space where triangle shape is measured.
pub trait CoordinateMapping {
    /// Map one point.
    fn map(&self, xyz: &Point3<f64>) -> Point3<f64>;
}

impl<F> CoordinateMapping for F
where
    F: Fn(&Point3<f64>) -> Point3<f64>,
{
    fn map(&self, xyz: &Point3<f64>) -> Point3<f64> {
        self(xyz)
    }
}

/// Options for [`flip_pass`].
#[derive(Debug, Clone)]
pub struct FlipOptions {
    /// Maximum number of times any one edge is flipped in a pass.
    pub max_flips_per_edge: usize,

    /// Edges with a node carrying any of these bits are never flipped.
    pub barrier_mask: VuMask,

    /// Minimum gain in the worse triangle quality for a flip to happen.
    pub min_improvement: f64,
}

impl Default for FlipOptions {
    fn default() -> Self {
        Self {
            max_flips_per_edge: 4,
            barrier_mask: VuMask::BOUNDARY | VuMask::EXTERIOR | VuMask::PRIMARY,
            min_improvement: 1e-10,
        }
    }
}

impl FlipOptions {
    /// Set the per-edge flip limit.
    pub fn with_max_flips_per_edge(mut self, count: usize) -> Self {
        self.max_flips_per_edge = count;
        self
    }

    /// Set the mask of edges that must not flip.
    pub fn with_barrier_mask(mut self, mask: VuMask) -> Self {
        self.barrier_mask = mask;
        self
    }

    /// Set the minimum quality gain.
    pub fn with_min_improvement(mut self, gain: f64) -> Self {
        self.min_improvement = gain;
        self
    }

    fn validate(&self) -> Result<()> {
        if !self.min_improvement.is_finite() || self.min_improvement < 0.0 {
            return Err(VuError::invalid_param(
                "min_improvement",
                self.min_improvement,
                "must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

/// Shape quality of a triangle in xy: `4 * sqrt(3) * area / sum(edge^2)`.
///
/// 1 for an equilateral triangle, 0 for a degenerate one, negative for a
/// clockwise one.
pub fn triangle_quality(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let area = 0.5 * ((b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x));
    let len2 = |p: &Point3<f64>, q: &Point3<f64>| (q.x - p.x).powi(2) + (q.y - p.y).powi(2);
    let sum = len2(a, b) + len2(b, c) + len2(c, a);
    if sum == 0.0 {
        return 0.0;
    }
    4.0 * 3f64.sqrt() * area / sum
}

/// Flip edges until no flip improves quality or every candidate edge has
/// reached its flip limit.
///
/// Returns the number of flips made.
pub fn flip_pass<I: VuIndex>(
    graph: &mut VuGraph<I>,
    options: &FlipOptions,
    mapping: Option<&dyn CoordinateMapping>,
) -> Result<usize> {
    options.validate()?;
    let mut flip_counts: HashMap<NodeId<I>, usize> = HashMap::new();
    let mut total = 0;

    loop {
        let mut flipped = 0;
        let edges: Vec<_> = graph
            .node_ids()
            .filter(|&n| n < graph.mate(n))
            .collect();
        for n in edges {
            let count = flip_counts.get(&n).copied().unwrap_or(0);
            if count >= options.max_flips_per_edge {
                continue;
            }
            if graph.has_mask(n, options.barrier_mask)
                || graph.has_mask(graph.mate(n), options.barrier_mask)
            {
                continue;
            }
            if should_flip(graph, n, options.min_improvement, mapping) && graph.flip_edge(n) {
                flip_counts.insert(n, count + 1);
                flipped += 1;
            }
        }
        total += flipped;
        trace!("flip sweep: {} flips", flipped);
        if flipped == 0 {
            break;
        }
    }
    Ok(total)
}

/// True if flipping the edge of `n` raises the worse triangle quality by
/// more than `min_improvement` and leaves both triangles counter-clockwise.
pub fn should_flip<I: VuIndex>(
    graph: &VuGraph<I>,
    n: NodeId<I>,
    min_improvement: f64,
    mapping: Option<&dyn CoordinateMapping>,
) -> bool {
    let m = graph.mate(n);
    if graph.face_node_count(n) != 3 || graph.face_node_count(m) != 3 {
        return false;
    }
    if graph.face_area(n) <= 0.0 || graph.face_area(m) <= 0.0 {
        return false;
    }

    let a = *graph.xyz(n);
    let b = *graph.xyz(m);
    let c = *graph.xyz(graph.fpred(n));
    let d = *graph.xyz(graph.fpred(m));

    // Both new triangles must stay counter-clockwise.
    let area = |p: &Point3<f64>, q: &Point3<f64>, r: &Point3<f64>| {
        (q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x)
    };
    if area(&c, &a, &d) <= 0.0 || area(&d, &b, &c) <= 0.0 {
        return false;
    }

    let map = |p: &Point3<f64>| match mapping {
        Some(f) => f.map(p),
        None => *p,
    };
    let (a, b, c, d) = (map(&a), map(&b), map(&c), map(&d));
    let before = triangle_quality(&a, &b, &c).min(triangle_quality(&b, &a, &d));
    let after = triangle_quality(&c, &a, &d).min(triangle_quality(&d, &b, &c));
    after > before + min_improvement
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_from_triangles;

    fn p(x: f64, y: f64) -> Point3<f64> {
        Point3::new(x, y, 0.0)
    }

    /// Quad split along its long diagonal.
    fn long_diagonal_quad() -> VuGraph {
        let points = vec![p(0.0, 0.0), p(3.0, -0.5), p(6.0, 0.0), p(3.0, 0.5)];
        build_from_triangles(&points, &[[0, 1, 2], [0, 2, 3]]).unwrap()
    }

    fn diagonal_length(graph: &VuGraph) -> f64 {
        graph
            .node_ids()
            .find(|&n| !graph.has_mask(n, VuMask::BOUNDARY))
            .map(|n| graph.edge_length_xy(n))
            .unwrap()
    }

    #[test]
    fn test_quality() {
        let s = 3f64.sqrt() / 2.0;
        assert!((triangle_quality(&p(0.0, 0.0), &p(1.0, 0.0), &p(0.5, s)) - 1.0).abs() < 1e-12);
        assert!(triangle_quality(&p(0.0, 0.0), &p(0.5, s), &p(1.0, 0.0)) < 0.0);
        assert_eq!(triangle_quality(&p(0.0, 0.0), &p(1.0, 0.0), &p(2.0, 0.0)), 0.0);
        assert_eq!(triangle_quality(&p(1.0, 1.0), &p(1.0, 1.0), &p(1.0, 1.0)), 0.0);
    }

    #[test]
    fn test_flip_shortens_diagonal() {
        let mut graph = long_diagonal_quad();
        assert!((diagonal_length(&graph) - 6.0).abs() < 1e-12);
        let flips = flip_pass(&mut graph, &FlipOptions::default(), None).unwrap();
        assert_eq!(flips, 1);
        assert!(graph.is_valid());
        assert!((diagonal_length(&graph) - 1.0).abs() < 1e-12);

        // Already optimal.
        assert_eq!(flip_pass(&mut graph, &FlipOptions::default(), None).unwrap(), 0);
    }

    #[test]
    fn test_mapping_changes_decision() {
        let mut graph = long_diagonal_quad();
        // Stretch y so the short diagonal becomes the long one.
        let stretch = |q: &Point3<f64>| Point3::new(q.x, q.y * 100.0, q.z);
        let flips = flip_pass(&mut graph, &FlipOptions::default(), Some(&stretch)).unwrap();
        assert_eq!(flips, 0);
    }

    #[test]
    fn test_barrier_blocks_flip() {
        let mut graph = long_diagonal_quad();
        let options = FlipOptions::default().with_barrier_mask(VuMask::BOUNDARY | VuMask::RULE);
        let diag = graph
            .node_ids()
            .find(|&n| !graph.has_mask(n, VuMask::BOUNDARY))
            .unwrap();
        graph.set_mask_around_edge(diag, VuMask::RULE);
        assert_eq!(flip_pass(&mut graph, &options, None).unwrap(), 0);
    }

    #[test]
    fn test_flip_limit() {
        let mut graph = long_diagonal_quad();
        let options = FlipOptions::default().with_max_flips_per_edge(0);
        assert_eq!(flip_pass(&mut graph, &options, None).unwrap(), 0);
    }

    #[test]
    fn test_non_convex_quad_not_flipped() {
        // Dart shape: the other diagonal would lie outside.
        let points = vec![p(0.0, 0.0), p(2.0, 0.0), p(0.5, 0.5), p(0.0, 2.0)];
        let mut graph: VuGraph = build_from_triangles(&points, &[[0, 1, 2], [0, 2, 3]]).unwrap();
        assert_eq!(flip_pass(&mut graph, &FlipOptions::default(), None).unwrap(), 0);
    }

    #[test]
    fn test_invalid_options() {
        let mut graph = long_diagonal_quad();
        let options = FlipOptions::default().with_min_improvement(-1.0);
        assert!(matches!(
            flip_pass(&mut graph, &options, None),
            Err(VuError::InvalidParameter { .. })
        ));
    }
}
