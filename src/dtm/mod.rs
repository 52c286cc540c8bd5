//! Triangulated terrain models.
//!
//! A [`Dtm`] is a triangulation stored as a [`VuGraph`] whose nodes carry the
//! index of their point in `user_int`. Lines are graph edges, and features
//! (voids, holes, islands, breaklines) are point index chains on top of the
//! lines.
//!
//! Triangles inside a void feature are kept in the graph but their nodes
//! carry [`VuMask::VOID`], so they are skipped by [`Dtm::triangles`] and
//! [`Dtm::drape_xy`].

mod clip;
mod profile;

pub use clip::ClipReport;
pub use profile::{DrapeKind, DrapePoint};

use log::debug;
use nalgebra::Point3;

use crate::error::{Result, VuError};
use crate::graph::{build_from_triangles, point_in_polygon_xy, NodeId, VuGraph, VuMask};

/// Barycentric slack when draping onto triangle edges.
const BARY_EPS: f64 = 1e-12;

/// The kind of a DTM feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    /// Closed region with no surface.
    Void,
    /// Closed region cut out of the model boundary.
    Hole,
    /// Closed region with surface, inside a void.
    Island,
    /// Open chain of lines the surface must follow.
    Breakline,
}

impl FeatureKind {
    /// True for kinds that describe a closed polygon.
    pub fn is_closed(self) -> bool {
        !matches!(self, FeatureKind::Breakline)
    }

    fn min_points(self) -> usize {
        if self.is_closed() {
            3
        } else {
            2
        }
    }
}

/// A feature: a chain of point indices joined by lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtmFeature {
    /// What the feature describes.
    pub kind: FeatureKind,
    /// Point indices. Closed features do not repeat the first point.
    pub points: Vec<usize>,
}

impl DtmFeature {
    /// Consecutive point pairs, including the closing pair for closed
    /// features.
    pub fn segments(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let count = self.points.len();
        let segments = if self.kind.is_closed() {
            count
        } else {
            count.saturating_sub(1)
        };
        (0..segments).map(move |k| (self.points[k], self.points[(k + 1) % count]))
    }
}

/// A triangulated terrain model.
#[derive(Debug, Clone)]
pub struct Dtm {
    points: Vec<Point3<f64>>,
    graph: VuGraph,
    features: Vec<DtmFeature>,
}

impl Dtm {
    /// Build from points and triangles.
    ///
    /// Clockwise triangles are reoriented. Points not used by any triangle
    /// are kept but have no lines.
    pub fn from_triangles(points: Vec<Point3<f64>>, triangles: &[[usize; 3]]) -> Result<Self> {
        let graph = build_from_triangles(&points, triangles)?;
        debug!(
            "dtm with {} points, {} lines",
            points.len(),
            graph.num_edges()
        );
        Ok(Self {
            points,
            graph,
            features: Vec::new(),
        })
    }

    /// Number of points.
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Number of lines.
    pub fn num_lines(&self) -> usize {
        self.graph.num_edges()
    }

    /// Point by index.
    pub fn point(&self, index: usize) -> Option<&Point3<f64>> {
        self.points.get(index)
    }

    /// All points.
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// The underlying graph.
    pub fn graph(&self) -> &VuGraph {
        &self.graph
    }

    /// All features.
    pub fn features(&self) -> &[DtmFeature] {
        &self.features
    }

    /// Some node at point `p`, if the point has lines.
    pub fn node_at(&self, p: usize) -> Option<NodeId> {
        self.graph
            .node_ids()
            .find(|&n| self.graph.user_int(n) == p as i64)
    }

    /// The node at `p` whose edge runs to `q`.
    ///
    /// The face of this node lies to the left of `p -> q`.
    pub fn line_node(&self, p: usize, q: usize) -> Option<NodeId> {
        let seed = self.node_at(p)?;
        self.graph
            .vertex_loop(seed)
            .find(|&n| self.graph.user_int(self.graph.mate(n)) == q as i64)
    }

    /// True if points `p` and `q` are joined by a line.
    pub fn has_line(&self, p: usize, q: usize) -> bool {
        self.line_node(p, q).is_some()
    }

    /// Delete the line between `p` and `q`. Returns false if there is none.
    pub fn delete_line(&mut self, p: usize, q: usize) -> Result<bool> {
        match self.line_node(p, q) {
            Some(n) => {
                self.graph.delete_edge(n)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Nodes of the valid triangles: three-node faces with positive area and
    /// no `VOID` or `EXTERIOR` node.
    fn triangle_seeds(&self) -> impl Iterator<Item = NodeId> + '_ {
        let g = &self.graph;
        g.collect_face_seeds().into_iter().filter(move |&seed| {
            g.face_node_count(seed) == 3
                && g.face_area(seed) > 0.0
                && g.find_mask_around_face(seed, VuMask::VOID | VuMask::EXTERIOR)
                    .is_none()
        })
    }

    /// Triangles outside every void, as counter-clockwise point index
    /// triples.
    pub fn triangles(&self) -> Vec<[usize; 3]> {
        let g = &self.graph;
        self.triangle_seeds()
            .map(|a| {
                let b = g.fsucc(a);
                let c = g.fsucc(b);
                [a, b, c].map(|n| g.user_int(n) as usize)
            })
            .collect()
    }

    /// Surface z at `(x, y)`, interpolated linearly in the triangle holding
    /// the point. `None` outside the model or inside a void.
    pub fn drape_xy(&self, x: f64, y: f64) -> Option<f64> {
        let g = &self.graph;
        self.triangle_seeds().find_map(|a| {
            let b = g.fsucc(a);
            let c = g.fsucc(b);
            let (pa, pb, pc) = (g.xyz(a), g.xyz(b), g.xyz(c));
            let det = (pb.x - pa.x) * (pc.y - pa.y) - (pb.y - pa.y) * (pc.x - pa.x);
            let wb = ((x - pa.x) * (pc.y - pa.y) - (y - pa.y) * (pc.x - pa.x)) / det;
            let wc = ((pb.x - pa.x) * (y - pa.y) - (pb.y - pa.y) * (x - pa.x)) / det;
            let wa = 1.0 - wb - wc;
            (wa >= -BARY_EPS && wb >= -BARY_EPS && wc >= -BARY_EPS)
                .then(|| wa * pa.z + wb * pb.z + wc * pc.z)
        })
    }

    /// Add a feature over existing points. Returns its index.
    ///
    /// A closing point equal to the first is dropped from closed features.
    /// Fails with [`VuError::InvalidFeature`] for unknown points or too few
    /// points (2 for breaklines, 3 for closed kinds).
    pub fn add_feature(&mut self, kind: FeatureKind, points: &[usize]) -> Result<usize> {
        let mut points = points.to_vec();
        if kind.is_closed() && points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        if let Some(&bad) = points.iter().find(|&&p| p >= self.points.len()) {
            return Err(VuError::InvalidFeature(format!(
                "point {} does not exist ({} points)",
                bad,
                self.points.len()
            )));
        }
        if points.len() < kind.min_points() {
            return Err(VuError::InvalidFeature(format!(
                "{:?} needs at least {} points, got {}",
                kind,
                kind.min_points(),
                points.len()
            )));
        }
        self.features.push(DtmFeature { kind, points });
        if kind == FeatureKind::Void {
            self.refresh_void_masks();
        }
        Ok(self.features.len() - 1)
    }

    /// Remove feature `index`, shifting later features down.
    pub fn remove_feature(&mut self, index: usize) -> Result<DtmFeature> {
        if index >= self.features.len() {
            return Err(VuError::InvalidFeature(format!(
                "feature {} does not exist ({} features)",
                index,
                self.features.len()
            )));
        }
        let feature = self.features.remove(index);
        if feature.kind == FeatureKind::Void {
            self.refresh_void_masks();
        }
        Ok(feature)
    }

    /// Check the graph links, node coordinates and feature connectivity.
    pub fn check_topology(&self) -> Result<()> {
        if !self.graph.is_valid() {
            return Err(VuError::DegenerateGeometry("corrupt line topology".into()));
        }
        for n in self.graph.node_ids() {
            let p = self.graph.user_int(n);
            let matches = usize::try_from(p)
                .ok()
                .and_then(|p| self.points.get(p))
                .is_some_and(|xyz| xyz == self.graph.xyz(n));
            if !matches {
                return Err(VuError::DegenerateGeometry(format!(
                    "node {} is not at its point {}",
                    n.index(),
                    p
                )));
            }
        }
        for feature in &self.features {
            if let Some((from, to)) = feature.segments().find(|&(p, q)| !self.has_line(p, q)) {
                return Err(VuError::DisconnectedPolygon { from, to });
            }
        }
        Ok(())
    }

    /// xy polygon of a closed feature.
    fn feature_polygon(&self, feature: &DtmFeature) -> Vec<Point3<f64>> {
        feature.points.iter().map(|&p| self.points[p]).collect()
    }

    /// Recompute `VOID` marks: a triangle is void when its centroid lies
    /// inside a void feature.
    fn refresh_void_masks(&mut self) {
        self.graph.clear_mask_in_set(VuMask::VOID);
        let voids: Vec<_> = self
            .features
            .iter()
            .filter(|f| f.kind == FeatureKind::Void)
            .map(|f| self.feature_polygon(f))
            .collect();
        if voids.is_empty() {
            return;
        }
        let seeds: Vec<_> = self
            .graph
            .collect_face_seeds()
            .into_iter()
            .filter(|&seed| {
                let Some((c, area)) = self.graph.face_centroid(seed) else {
                    return false;
                };
                area > 0.0
                    && !self.graph.has_mask(seed, VuMask::EXTERIOR)
                    && voids.iter().any(|v| point_in_polygon_xy(v, c.x, c.y))
            })
            .collect();
        for seed in seeds {
            self.graph.set_mask_around_face(seed, VuMask::VOID);
        }
    }
}

/// xy distance from `(x, y)` to the segment `p-q`.
fn distance_to_segment_xy(p: &Point3<f64>, q: &Point3<f64>, x: f64, y: f64) -> f64 {
    let (vx, vy) = (q.x - p.x, q.y - p.y);
    let len2 = vx * vx + vy * vy;
    let t = if len2 > 0.0 {
        (((x - p.x) * vx + (y - p.y) * vy) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (p.x + vx * t - x).hypot(p.y + vy * t - y)
}

/// xy distance from `(x, y)` to the outline of a closed polygon.
fn distance_to_boundary_xy(polygon: &[Point3<f64>], x: f64, y: f64) -> f64 {
    let count = polygon.len();
    (0..count)
        .map(|k| distance_to_segment_xy(&polygon[k], &polygon[(k + 1) % count], x, y))
        .fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::graph::builder::tests::{grid_points, grid_triangles};

    /// A 4 by 4 cell grid with z = x + 2y. Point `(i, j)` has index `5j + i`.
    pub(crate) fn sloped_grid() -> Dtm {
        let points = grid_points(4)
            .into_iter()
            .map(|p| Point3::new(p.x, p.y, p.x + 2.0 * p.y))
            .collect();
        Dtm::from_triangles(points, &grid_triangles(4)).unwrap()
    }

    #[test]
    fn test_from_triangles() {
        let dtm = sloped_grid();
        assert_eq!(dtm.num_points(), 25);
        assert_eq!(dtm.num_lines(), 56);
        assert_eq!(dtm.triangles().len(), 32);
        dtm.check_topology().unwrap();
    }

    #[test]
    fn test_lines() {
        let mut dtm = sloped_grid();
        assert!(dtm.has_line(0, 1));
        assert!(dtm.has_line(1, 0));
        assert!(dtm.has_line(0, 6));
        assert!(!dtm.has_line(1, 5));
        assert!(!dtm.has_line(0, 2));

        let n = dtm.line_node(6, 7).unwrap();
        assert_eq!(dtm.graph().user_int(n), 6);
        assert_eq!(dtm.graph().user_int(dtm.graph().mate(n)), 7);

        assert!(dtm.delete_line(6, 12).unwrap());
        assert!(!dtm.delete_line(6, 12).unwrap());
        assert_eq!(dtm.num_lines(), 55);
        assert_eq!(dtm.triangles().len(), 30);
    }

    #[test]
    fn test_drape() {
        let dtm = sloped_grid();
        let z = dtm.drape_xy(0.5, 0.25).unwrap();
        assert!((z - 1.0).abs() < 1e-12);
        let z = dtm.drape_xy(3.0, 3.0).unwrap();
        assert!((z - 9.0).abs() < 1e-12);
        assert_eq!(dtm.drape_xy(-1.0, 0.5), None);
        assert_eq!(dtm.drape_xy(4.5, 4.5), None);
    }

    #[test]
    fn test_features() {
        let mut dtm = sloped_grid();
        let line = dtm.add_feature(FeatureKind::Breakline, &[0, 1, 2]).unwrap();
        assert_eq!(line, 0);
        assert!(matches!(
            dtm.add_feature(FeatureKind::Breakline, &[0]),
            Err(VuError::InvalidFeature(_))
        ));
        assert!(matches!(
            dtm.add_feature(FeatureKind::Island, &[0, 1, 0]),
            Err(VuError::InvalidFeature(_))
        ));
        assert!(dtm.add_feature(FeatureKind::Breakline, &[0, 99]).is_err());

        let removed = dtm.remove_feature(0).unwrap();
        assert_eq!(removed.points, vec![0, 1, 2]);
        assert!(dtm.features().is_empty());
        assert!(dtm.remove_feature(0).is_err());
    }

    #[test]
    fn test_void_feature_masks_triangles() {
        let mut dtm = sloped_grid();
        let void = dtm.add_feature(FeatureKind::Void, &[6, 7, 12, 11, 6]).unwrap();
        assert_eq!(dtm.features()[void].points, vec![6, 7, 12, 11]);
        assert_eq!(dtm.triangles().len(), 30);
        assert_eq!(dtm.drape_xy(1.5, 1.25), None);

        dtm.remove_feature(void).unwrap();
        assert_eq!(dtm.triangles().len(), 32);
        assert!(dtm.drape_xy(1.5, 1.25).is_some());
    }

    #[test]
    fn test_check_topology_reports_broken_feature() {
        let mut dtm = sloped_grid();
        dtm.add_feature(FeatureKind::Breakline, &[0, 1, 2]).unwrap();
        dtm.delete_line(1, 2).unwrap();
        assert!(matches!(
            dtm.check_topology(),
            Err(VuError::DisconnectedPolygon { from: 1, to: 2 })
        ));
    }

    #[test]
    fn test_distance_to_boundary() {
        let square = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, 2.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
        ];
        assert!((distance_to_boundary_xy(&square, 1.0, 0.5) - 0.5).abs() < 1e-12);
        assert_eq!(distance_to_boundary_xy(&square, 2.0, 1.0), 0.0);
        let (p, q) = (square[0], square[1]);
        assert!((distance_to_segment_xy(&p, &q, 3.0, 0.0) - 1.0).abs() < 1e-12);
    }
}
