//! Located points on a graph.
//!
//! A [`PositionDetail`] records where a point sits relative to the graph:
//! inside a face, on an edge at some fraction, at a vertex, or nowhere in
//! particular. It is a plain value; nothing in the graph refers to it.

use nalgebra::Point3;

use super::index::{NodeId, VuIndex};
use super::vugraph::VuGraph;

const INTERSECT_EPS: f64 = 1e-12;

/// What part of the graph a position refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TopologyScope {
    /// Not located.
    #[default]
    Unclassified,
    /// Strictly inside the face of the node.
    Face,
    /// On the edge from the node to its face successor.
    Edge,
    /// At the vertex of the node.
    Vertex,
}

/// A point located on a graph, with two general purpose tags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionDetail<I: VuIndex = u32> {
    node: NodeId<I>,
    xyz: Point3<f64>,
    scope: TopologyScope,
    edge_fraction: f64,
    /// Integer tag.
    pub int_tag: i64,
    /// Double tag, compared by [`update_min`](Self::update_min) and
    /// [`update_max`](Self::update_max).
    pub double_tag: f64,
}

impl<I: VuIndex> Default for PositionDetail<I> {
    fn default() -> Self {
        Self {
            node: NodeId::invalid(),
            xyz: Point3::origin(),
            scope: TopologyScope::Unclassified,
            edge_fraction: 0.0,
            int_tag: 0,
            double_tag: 0.0,
        }
    }
}

impl<I: VuIndex> PositionDetail<I> {
    /// An unclassified position.
    pub fn new() -> Self {
        Self::default()
    }

    /// An unclassified position at a point.
    pub fn unclassified_at(xyz: Point3<f64>) -> Self {
        Self {
            xyz,
            ..Self::default()
        }
    }

    /// A point inside the face of `node`.
    pub fn from_face(node: NodeId<I>, xyz: Point3<f64>) -> Self {
        Self {
            node,
            xyz,
            scope: TopologyScope::Face,
            ..Self::default()
        }
    }

    /// A point on the edge of `node` at `fraction` towards its face successor.
    pub fn from_edge(node: NodeId<I>, xyz: Point3<f64>, fraction: f64) -> Self {
        Self {
            node,
            xyz,
            scope: TopologyScope::Edge,
            edge_fraction: fraction,
            ..Self::default()
        }
    }

    /// A point on the edge of `node`, with coordinates computed from the graph.
    pub fn from_edge_point(graph: &VuGraph<I>, node: NodeId<I>, fraction: f64) -> Self {
        Self::from_edge(node, graph.point_at_fraction(node, fraction), fraction)
    }

    /// The vertex of `node`.
    pub fn from_vertex(node: NodeId<I>, xyz: Point3<f64>) -> Self {
        Self {
            node,
            xyz,
            scope: TopologyScope::Vertex,
            ..Self::default()
        }
    }

    /// Set the double tag.
    pub fn with_double_tag(mut self, value: f64) -> Self {
        self.double_tag = value;
        self
    }

    /// Set the integer tag.
    pub fn with_int_tag(mut self, value: i64) -> Self {
        self.int_tag = value;
        self
    }

    /// The node.
    pub fn node(&self) -> NodeId<I> {
        self.node
    }

    /// The coordinates.
    pub fn xyz(&self) -> Point3<f64> {
        self.xyz
    }

    /// The scope.
    pub fn scope(&self) -> TopologyScope {
        self.scope
    }

    /// Edge fraction (meaningful for edge scope only).
    pub fn edge_fraction(&self) -> f64 {
        self.edge_fraction
    }

    /// True for the unclassified scope.
    pub fn is_unclassified(&self) -> bool {
        self.scope == TopologyScope::Unclassified
    }

    /// True for the face scope.
    pub fn is_face(&self) -> bool {
        self.scope == TopologyScope::Face
    }

    /// True for the edge scope.
    pub fn is_edge(&self) -> bool {
        self.scope == TopologyScope::Edge
    }

    /// True for the vertex scope.
    pub fn is_vertex(&self) -> bool {
        self.scope == TopologyScope::Vertex
    }

    /// The same point seen from the other side of the edge.
    ///
    /// - Edge: the mate node, with fraction `1 - f`.
    /// - Vertex: the node at the same vertex on the other side of the edge.
    /// - Face and unclassified: an unclassified copy at the same point.
    pub fn edge_mate(&self, graph: &VuGraph<I>) -> Self {
        match self.scope {
            TopologyScope::Edge => Self {
                node: graph.mate(self.node),
                edge_fraction: 1.0 - self.edge_fraction,
                ..*self
            },
            TopologyScope::Vertex => Self {
                node: graph.fsucc(graph.mate(self.node)),
                ..*self
            },
            TopologyScope::Face | TopologyScope::Unclassified => Self {
                node: NodeId::invalid(),
                scope: TopologyScope::Unclassified,
                edge_fraction: 0.0,
                ..*self
            },
        }
    }

    /// Replace `self` by `candidate` if the candidate's double tag is
    /// smaller, or `self` is unclassified. Returns true on replacement.
    pub fn update_min(&mut self, candidate: &Self) -> bool {
        if self.is_unclassified() || candidate.double_tag < self.double_tag {
            *self = *candidate;
            true
        } else {
            false
        }
    }

    /// Replace `self` by `candidate` if the candidate's double tag is
    /// larger, or `self` is unclassified. Returns true on replacement.
    pub fn update_max(&mut self, candidate: &Self) -> bool {
        if self.is_unclassified() || candidate.double_tag > self.double_tag {
            *self = *candidate;
            true
        } else {
            false
        }
    }
}

/// Crossing-number test of `(x, y)` against a closed polygon in xy.
///
/// Points on the boundary may land on either side.
pub fn point_in_polygon_xy(polygon: &[Point3<f64>], x: f64, y: f64) -> bool {
    let count = polygon.len();
    if count < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = count - 1;
    for i in 0..count {
        let (pi, pj) = (&polygon[i], &polygon[j]);
        if (pi.y > y) != (pj.y > y) {
            let x_cross = pj.x + (y - pj.y) * (pi.x - pj.x) / (pi.y - pj.y);
            if x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Parameters `(t, u)` of the xy intersection of segments `p0-p1` and
/// `q0-q1`, both within `[0, 1]`. Parallel segments give `None`.
pub fn segment_intersection_xy(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    q0: &Point3<f64>,
    q1: &Point3<f64>,
) -> Option<(f64, f64)> {
    let (dx, dy) = (p1.x - p0.x, p1.y - p0.y);
    let (ex, ey) = (q1.x - q0.x, q1.y - q0.y);
    let denom = dx * ey - dy * ex;
    let scale = (dx * dx + dy * dy).sqrt() * (ex * ex + ey * ey).sqrt();
    if denom.abs() <= INTERSECT_EPS * scale {
        return None;
    }
    let (wx, wy) = (q0.x - p0.x, q0.y - p0.y);
    let t = (wx * ey - wy * ex) / denom;
    let u = (wx * dy - wy * dx) / denom;
    let range = -INTERSECT_EPS..=1.0 + INTERSECT_EPS;
    (range.contains(&t) && range.contains(&u)).then_some((t, u))
}

impl<I: VuIndex> VuGraph<I> {
    /// True if `(x, y)` is inside the face of `seed`.
    pub fn face_contains_xy(&self, seed: NodeId<I>, x: f64, y: f64) -> bool {
        point_in_polygon_xy(&self.face_coordinates(seed), x, y)
    }

    /// Locate a point in xy.
    ///
    /// Points within `tol` of a vertex or edge are classified as such, on the
    /// side of the edge that faces the point. Otherwise the point is located
    /// in the smallest bounded (positive area) face that contains it, or returned
    /// unclassified when it is outside every such face. The double tag of the
    /// result carries the distance to the nearest edge.
    pub fn locate_xy(&self, x: f64, y: f64, tol: f64) -> PositionDetail<I> {
        let target = Point3::new(x, y, 0.0);
        let mut nearest = PositionDetail::unclassified_at(target);
        for n in self.node_ids() {
            let p = self.xyz(n);
            let v = self.edge_vector(n);
            let len2 = v.x * v.x + v.y * v.y;
            let t = if len2 > 0.0 {
                (((x - p.x) * v.x + (y - p.y) * v.y) / len2).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let q = p + v * t;
            let dist = ((q.x - x).powi(2) + (q.y - y).powi(2)).sqrt();
            let candidate = PositionDetail::from_edge(n, q, t).with_double_tag(dist);
            nearest.update_min(&candidate);
        }

        if nearest.is_edge() && nearest.double_tag <= tol {
            let mut found = nearest;
            // Keep the side with the point on its left.
            let n = found.node;
            let p = self.xyz(n);
            let v = self.edge_vector(n);
            let cross = v.x * (y - p.y) - v.y * (x - p.x);
            if cross < 0.0 {
                found = found.edge_mate(self);
            }
            let len = self.edge_length_xy(found.node);
            let dist = found.double_tag;
            if found.edge_fraction * len <= tol {
                let node = found.node;
                return PositionDetail::from_vertex(node, *self.xyz(node)).with_double_tag(dist);
            }
            if (1.0 - found.edge_fraction) * len <= tol {
                let node = self.fsucc(found.node);
                return PositionDetail::from_vertex(node, *self.xyz(node)).with_double_tag(dist);
            }
            return found;
        }

        // Faces of nested components overlap; the innermost one wins.
        let dist = nearest.double_tag;
        self.collect_face_seeds()
            .into_iter()
            .map(|seed| (seed, self.face_area(seed)))
            .filter(|&(seed, area)| area > 0.0 && self.face_contains_xy(seed, x, y))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map_or_else(
                || PositionDetail::unclassified_at(target),
                |(seed, _)| PositionDetail::from_face(seed, target),
            )
            .with_double_tag(dist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::builder::tests::square_with_diagonal;
    use crate::graph::VuMask;

    #[test]
    fn test_default_is_unclassified() {
        let pos = PositionDetail::<u32>::new();
        assert!(pos.is_unclassified());
        assert!(!pos.node().is_valid());
    }

    #[test]
    fn test_edge_mate_round_trip() {
        let graph = square_with_diagonal();
        for n in graph.node_ids() {
            let pos = PositionDetail::from_edge_point(&graph, n, 0.3);
            let other = pos.edge_mate(&graph);
            assert!(other.is_edge());
            assert_eq!(other.node(), graph.mate(n));
            assert!((other.edge_fraction() - 0.7).abs() < 1e-12);

            let recomputed = graph.point_at_fraction(other.node(), other.edge_fraction());
            assert!((recomputed - pos.xyz()).norm() < 1e-12);

            let back = other.edge_mate(&graph);
            assert_eq!(back.node(), n);
            assert!((back.edge_fraction() - 0.3).abs() < 1e-12);
        }
    }

    #[test]
    fn test_vertex_edge_mate_stays_at_vertex() {
        let graph = square_with_diagonal();
        for n in graph.node_ids() {
            let pos = PositionDetail::from_vertex(n, *graph.xyz(n));
            let other = pos.edge_mate(&graph);
            assert!(other.is_vertex());
            assert!(graph.same_vertex(n, other.node()));
            assert_eq!(graph.xyz(other.node()), graph.xyz(n));
        }
    }

    #[test]
    fn test_face_edge_mate_is_unclassified() {
        let graph = square_with_diagonal();
        let seed = graph.node_ids().next().unwrap();
        let pos = PositionDetail::from_face(seed, Point3::new(0.5, 0.2, 0.0)).with_int_tag(4);
        let other = pos.edge_mate(&graph);
        assert!(other.is_unclassified());
        assert_eq!(other.int_tag, 4);
        assert_eq!(other.xyz(), pos.xyz());
    }

    #[test]
    fn test_update_min_max() {
        let n = NodeId::<u32>::new(0);
        let a = PositionDetail::from_face(n, Point3::origin()).with_double_tag(2.0);
        let b = PositionDetail::from_face(n, Point3::origin()).with_double_tag(1.0);

        let mut best = PositionDetail::new();
        assert!(best.update_min(&a));
        assert!(best.update_min(&b));
        assert!(!best.update_min(&a));
        assert_eq!(best.double_tag, 1.0);

        let mut best = PositionDetail::new();
        assert!(best.update_max(&b));
        assert!(best.update_max(&a));
        assert!(!best.update_max(&b));
        assert_eq!(best.double_tag, 2.0);
    }

    #[test]
    fn test_point_in_polygon() {
        let square = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        assert!(point_in_polygon_xy(&square, 0.5, 0.5));
        assert!(!point_in_polygon_xy(&square, 1.5, 0.5));
        assert!(!point_in_polygon_xy(&square[..2], 0.5, 0.0));
    }

    #[test]
    fn test_locate_face() {
        let graph = square_with_diagonal();
        let pos = graph.locate_xy(0.8, 0.2, 1e-9);
        assert!(pos.is_face());
        assert!(graph.face_area(pos.node()) > 0.0);
        assert!(graph.face_contains_xy(pos.node(), 0.8, 0.2));
        assert!((pos.double_tag - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_locate_edge_picks_facing_side() {
        let graph = square_with_diagonal();
        // Just above the bottom edge; the face to its left is the interior.
        let pos = graph.locate_xy(0.4, 1e-6, 1e-3);
        assert!(pos.is_edge());
        assert!(!graph.has_mask(pos.node(), VuMask::EXTERIOR));
        assert!((pos.xyz().x - 0.4).abs() < 1e-12);

        // On the diagonal.
        let pos = graph.locate_xy(0.5, 0.5, 1e-9);
        assert!(pos.is_edge());
        assert!((pos.xyz() - Point3::new(0.5, 0.5, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_locate_vertex_and_outside() {
        let graph = square_with_diagonal();
        let pos = graph.locate_xy(1.0, 1.0 + 1e-4, 1e-3);
        assert!(pos.is_vertex());
        assert_eq!(*graph.xyz(pos.node()), Point3::new(1.0, 1.0, 0.0));

        let pos = graph.locate_xy(3.0, 3.0, 1e-3);
        assert!(pos.is_unclassified());
    }

    #[test]
    fn test_segment_intersection() {
        let p = |x, y| Point3::new(x, y, 0.0);
        let (t, u) =
            segment_intersection_xy(&p(0.0, 0.0), &p(2.0, 0.0), &p(1.0, -1.0), &p(1.0, 1.0)).unwrap();
        assert!((t - 0.5).abs() < 1e-12 && (u - 0.5).abs() < 1e-12);
        assert!(segment_intersection_xy(&p(0.0, 0.0), &p(1.0, 0.0), &p(0.0, 1.0), &p(1.0, 1.0)).is_none());
        assert!(segment_intersection_xy(&p(0.0, 0.0), &p(1.0, 0.0), &p(2.0, -1.0), &p(2.0, 1.0)).is_none());
    }
}
