//! Draping polylines onto the surface of a DTM.

use std::collections::BTreeSet;

use log::debug;
use nalgebra::Point3;

use super::{distance_to_segment_xy, Dtm, FeatureKind};
use crate::error::{Result, VuError};
use crate::graph::{point_in_polygon_xy, segment_intersection_xy};

/// Parameter slack when merging crossings along one segment.
const STEP_EPS: f64 = 1e-12;

/// Where a draped point landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrapeKind {
    /// Outside the model.
    External,
    /// Inside a void feature.
    Void,
    /// Inside a triangle.
    Triangle,
    /// On a line, away from its ends.
    Edge,
    /// On a point of the model.
    Vertex,
}

/// One point of a draped polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrapePoint {
    /// Index of the polyline segment the point lies on.
    pub segment: usize,
    /// x on the polyline.
    pub x: f64,
    /// y on the polyline.
    pub y: f64,
    /// Surface z; `None` off the surface.
    pub z: Option<f64>,
    /// What the point landed on.
    pub kind: DrapeKind,
}

impl Dtm {
    /// Drape a polyline onto the surface.
    ///
    /// Every segment is split where it crosses a triangle edge. Each
    /// polyline vertex and each crossing becomes a [`DrapePoint`] with the
    /// surface z at its xy, or no z outside the model and inside voids. The
    /// input z values are ignored.
    ///
    /// Fails with [`VuError::InvalidParameter`] for fewer than two points.
    pub fn drape_polyline(&self, polyline: &[Point3<f64>]) -> Result<Vec<DrapePoint>> {
        if polyline.len() < 2 {
            return Err(VuError::invalid_param(
                "polyline",
                polyline.len(),
                "needs at least 2 points",
            ));
        }
        let edges = self.surface_edges();
        let tol = 1e-12 * self.graph.largest_range_edge().max(1.0);

        let mut draped = Vec::new();
        for (segment, pair) in polyline.windows(2).enumerate() {
            let (a, b) = (&pair[0], &pair[1]);
            let mut params: Vec<f64> = edges
                .iter()
                .filter_map(|(p, q)| segment_intersection_xy(a, b, p, q))
                .map(|(t, _)| t.clamp(0.0, 1.0))
                .collect();
            params.push(0.0);
            params.push(1.0);
            params.sort_by(f64::total_cmp);
            params.dedup_by(|later, earlier| (*later - *earlier).abs() <= STEP_EPS);

            for t in params {
                // The segment start is the previous segment's end.
                if segment > 0 && t <= STEP_EPS {
                    continue;
                }
                let x = a.x + (b.x - a.x) * t;
                let y = a.y + (b.y - a.y) * t;
                draped.push(self.drape_point(segment, x, y, &edges, tol));
            }
        }
        debug!(
            "draped {} polyline points into {} points over {} edges",
            polyline.len(),
            draped.len(),
            edges.len()
        );
        Ok(draped)
    }

    /// End points of every line bounding a valid triangle, once per line.
    fn surface_edges(&self) -> Vec<(Point3<f64>, Point3<f64>)> {
        let g = &self.graph;
        let mut seen = BTreeSet::new();
        let mut edges = Vec::new();
        for seed in self.triangle_seeds() {
            for n in g.face_loop(seed) {
                let m = g.mate(n);
                let (p, q) = (g.user_int(n), g.user_int(m));
                if seen.insert((p.min(q), p.max(q))) {
                    edges.push((*g.xyz(n), *g.xyz(m)));
                }
            }
        }
        edges
    }

    fn drape_point(
        &self,
        segment: usize,
        x: f64,
        y: f64,
        edges: &[(Point3<f64>, Point3<f64>)],
        tol: f64,
    ) -> DrapePoint {
        let z = self.drape_xy(x, y);
        let at = |p: &Point3<f64>| (p.x - x).hypot(p.y - y) <= tol;
        let kind = match z {
            None if self.in_void(x, y) => DrapeKind::Void,
            None => DrapeKind::External,
            Some(_) if edges.iter().any(|(p, q)| at(p) || at(q)) => DrapeKind::Vertex,
            Some(_) if edges.iter().any(|(p, q)| distance_to_segment_xy(p, q, x, y) <= tol) => {
                DrapeKind::Edge
            }
            Some(_) => DrapeKind::Triangle,
        };
        DrapePoint {
            segment,
            x,
            y,
            z,
            kind,
        }
    }

    fn in_void(&self, x: f64, y: f64) -> bool {
        self.features
            .iter()
            .filter(|f| f.kind == FeatureKind::Void)
            .any(|f| point_in_polygon_xy(&self.feature_polygon(f), x, y))
    }
}
