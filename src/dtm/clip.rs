//! Clipping a DTM to a polygon of its own lines.

use std::collections::{BTreeSet, HashMap};

use log::{debug, warn};
use nalgebra::Point3;

use super::{distance_to_boundary_xy, Dtm, DtmFeature, FeatureKind};
use crate::algo::triangulate::triangulate_face;
use crate::error::{Result, VuError};
use crate::graph::{point_in_polygon_xy, VuMask};

/// What a clip did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipReport {
    /// The polygon was clockwise and has been reversed.
    pub reversed: bool,
    /// Points strictly on the clipped side of the polygon, now without lines.
    pub removed_points: Vec<usize>,
    /// Lines removed with those points.
    pub lines_deleted: usize,
    /// Lines between polygon points that crossed the clipped side.
    pub chords_deleted: usize,
    /// Lines added to fill the hole.
    pub edges_added: usize,
    /// Index of the void feature covering the hole, when filled.
    pub void_feature: Option<usize>,
    /// Adjoining voids merged into the new one.
    pub voids_merged: usize,
    /// Features removed because their lines are gone.
    pub features_dropped: usize,
}

/// The side of a clip polygon whose lines are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Inside,
    Outside,
}

impl Side {
    /// True if `(x, y)` is on this side, farther than `tol` from the outline.
    fn holds(self, polygon: &[Point3<f64>], x: f64, y: f64, tol: f64) -> bool {
        distance_to_boundary_xy(polygon, x, y) > tol
            && point_in_polygon_xy(polygon, x, y) == (self == Side::Inside)
    }
}

impl Dtm {
    /// Remove everything inside a polygon made of existing lines.
    ///
    /// `polygon` lists point indices; consecutive points (and the last and
    /// first) must be joined by lines. A clockwise polygon is reversed. All
    /// lines at points strictly inside, and all lines between polygon points
    /// that pass through the inside, are deleted, together with any feature
    /// that used them.
    ///
    /// Without `fill` the hole becomes part of the model exterior. With
    /// `fill` it is re-triangulated and covered by a new void feature, which
    /// is merged with voids sharing an edge. A void lying strictly inside
    /// another void is rejected with [`VuError::NestedVoid`]; touching a
    /// void's outline is not nesting.
    ///
    /// The model is only changed when the whole clip succeeds.
    pub fn clip_internal_to_polygon(&mut self, polygon: &[usize], fill: bool) -> Result<ClipReport> {
        let mut work = self.clone();
        let report = work.clip_in_place(polygon, fill)?;
        *self = work;
        debug!("clip: {:?}", report);
        Ok(report)
    }

    /// Remove everything outside a polygon made of existing lines.
    ///
    /// The polygon is checked and oriented as for
    /// [`Dtm::clip_internal_to_polygon`]. Lines at points strictly outside
    /// it, and lines between polygon points that pass outside, are deleted
    /// with the features that used them. The polygon becomes the model hull:
    /// its outer face is marked `EXTERIOR` and its edges `BOUNDARY`.
    ///
    /// The model is only changed when the whole clip succeeds.
    pub fn clip_external_to_polygon(&mut self, polygon: &[usize]) -> Result<ClipReport> {
        let mut work = self.clone();
        let report = work.clip_external_in_place(polygon)?;
        *self = work;
        debug!("external clip: {:?}", report);
        Ok(report)
    }

    fn clip_in_place(&mut self, polygon: &[usize], fill: bool) -> Result<ClipReport> {
        let mut report = ClipReport::default();
        let (poly, tol) = self.cut_lines(polygon, Side::Inside, &mut report)?;
        let count = poly.len();

        let inside = self
            .line_node(poly[0], poly[1])
            .ok_or(VuError::DisconnectedPolygon {
                from: poly[0],
                to: poly[1],
            })?;
        if self.graph.face_node_count(inside) != count {
            return Err(VuError::DegenerateGeometry(format!(
                "clip hole has {} nodes, polygon has {} points",
                self.graph.face_node_count(inside),
                count
            )));
        }

        if !fill {
            self.graph.set_mask_around_face(inside, VuMask::EXTERIOR);
            self.refresh_void_masks();
            return Ok(report);
        }

        let corners: Vec<_> = self.graph.face_loop(inside).collect();
        self.graph.clear_mask_around_face(inside, VuMask::EXTERIOR);
        report.edges_added = triangulate_face(&mut self.graph, inside, VuMask::RULE)?;
        for &n in &corners {
            let p = self.graph.user_int(n);
            self.graph.set_user_int_around_vertex(n, p);
        }

        let (merged, absorbed) = self.merge_adjoining_voids(&poly);

        // Nested when the new triangles already lie strictly inside another
        // void. Corners on a void's outline only touch it.
        let others: Vec<Vec<Point3<f64>>> = self
            .features
            .iter()
            .enumerate()
            .filter(|(index, f)| f.kind == FeatureKind::Void && !absorbed.contains(index))
            .map(|(_, f)| self.feature_polygon(f))
            .collect();
        let samples: Vec<Point3<f64>> = corners
            .iter()
            .filter_map(|&n| self.graph.face_centroid(n).map(|(c, _)| c))
            .collect();
        let nested = !samples.is_empty()
            && samples
                .iter()
                .all(|c| others.iter().any(|v| Side::Inside.holds(v, c.x, c.y, tol)));
        if nested {
            return Err(VuError::NestedVoid {
                feature: self.features.len() - absorbed.len(),
            });
        }

        report.voids_merged = absorbed.len();
        for index in absorbed.into_iter().rev() {
            self.features.remove(index);
        }
        self.features.push(DtmFeature {
            kind: FeatureKind::Void,
            points: merged,
        });
        report.void_feature = Some(self.features.len() - 1);
        self.refresh_void_masks();
        Ok(report)
    }

    fn clip_external_in_place(&mut self, polygon: &[usize]) -> Result<ClipReport> {
        let mut report = ClipReport::default();
        let (poly, _) = self.cut_lines(polygon, Side::Outside, &mut report)?;
        let count = poly.len();

        let outside = self
            .line_node(poly[1], poly[0])
            .ok_or(VuError::DisconnectedPolygon {
                from: poly[1],
                to: poly[0],
            })?;
        if self.graph.face_node_count(outside) != count {
            return Err(VuError::DegenerateGeometry(format!(
                "clipped hull has {} nodes, polygon has {} points",
                self.graph.face_node_count(outside),
                count
            )));
        }

        self.graph
            .set_mask_around_face(outside, VuMask::EXTERIOR | VuMask::BOUNDARY);
        let hull: Vec<_> = self.graph.face_loop(outside).collect();
        for n in hull {
            let inner = self.graph.mate(n);
            self.graph.set_mask(inner, VuMask::BOUNDARY);
        }
        self.refresh_void_masks();
        Ok(report)
    }

    /// Check and orient `polygon`, then delete the lines at points strictly
    /// on `side` of it, the chords between polygon points crossing that
    /// side, and the features left without lines.
    ///
    /// Returns the counter-clockwise polygon and the distance tolerance used.
    fn cut_lines(
        &mut self,
        polygon: &[usize],
        side: Side,
        report: &mut ClipReport,
    ) -> Result<(Vec<usize>, f64)> {
        let mut poly = self.checked_clip_polygon(polygon)?;

        let coords: Vec<Point3<f64>> = poly.iter().map(|&p| self.points[p]).collect();
        let area = signed_area_xy(&coords);
        if area == 0.0 {
            return Err(VuError::InvalidPolygon("clip polygon has zero area".into()));
        }
        if area < 0.0 {
            poly.reverse();
            report.reversed = true;
        }
        let coords: Vec<Point3<f64>> = poly.iter().map(|&p| self.points[p]).collect();
        let on_polygon: BTreeSet<usize> = poly.iter().copied().collect();
        let tol = 1e-12 * self.graph.largest_range_edge().max(1.0);

        let mut removed = Vec::new();
        for seed in self.graph.collect_vertex_seeds() {
            let p = self.graph.user_int(seed) as usize;
            let xyz = self.points[p];
            if !on_polygon.contains(&p) && side.holds(&coords, xyz.x, xyz.y, tol) {
                removed.push(seed);
                report.removed_points.push(p);
            }
        }
        report.removed_points.sort_unstable();

        for seed in removed {
            let nodes: Vec<_> = self.graph.vertex_loop(seed).collect();
            for n in nodes {
                if self.graph.is_live(n) {
                    self.graph.delete_edge(n)?;
                    report.lines_deleted += 1;
                }
            }
        }

        let count = poly.len();
        for i in 0..count {
            for j in (i + 2)..count {
                if i == 0 && j == count - 1 {
                    continue;
                }
                let (p, q) = (poly[i], poly[j]);
                let (a, b) = (&self.points[p], &self.points[q]);
                let (mx, my) = ((a.x + b.x) * 0.5, (a.y + b.y) * 0.5);
                if side.holds(&coords, mx, my, tol) && self.delete_line(p, q)? {
                    report.chords_deleted += 1;
                }
            }
        }

        let before = self.features.len();
        let features = std::mem::take(&mut self.features);
        let kept: Vec<DtmFeature> = features
            .into_iter()
            .filter(|f| f.segments().all(|(p, q)| self.has_line(p, q)))
            .collect();
        self.features = kept;
        report.features_dropped = before - self.features.len();
        Ok((poly, tol))
    }

    /// Validate the clip polygon: known, distinct points joined by lines.
    fn checked_clip_polygon(&self, polygon: &[usize]) -> Result<Vec<usize>> {
        let mut poly = polygon.to_vec();
        if poly.len() > 1 && poly.first() == poly.last() {
            poly.pop();
        }
        if let Some(&bad) = poly.iter().find(|&&p| p >= self.points.len()) {
            return Err(VuError::InvalidPolygon(format!(
                "point {} does not exist",
                bad
            )));
        }
        let distinct: BTreeSet<_> = poly.iter().collect();
        if poly.len() < 3 || distinct.len() != poly.len() {
            return Err(VuError::InvalidPolygon(format!(
                "clip polygon needs at least 3 distinct points, got {:?}",
                poly
            )));
        }
        let count = poly.len();
        for k in 0..count {
            let (from, to) = (poly[k], poly[(k + 1) % count]);
            if !self.has_line(from, to) {
                return Err(VuError::DisconnectedPolygon { from, to });
            }
        }
        Ok(poly)
    }

    /// Outline of the new void united with every void sharing an edge with
    /// it, and the indices of those voids (ascending).
    ///
    /// Voids are counter-clockwise, so a shared edge runs in opposite
    /// directions and cancels. If what is left is not a single loop the
    /// voids are left apart.
    fn merge_adjoining_voids(&self, poly: &[usize]) -> (Vec<usize>, Vec<usize>) {
        let directed = |points: &[usize]| -> Vec<(usize, usize)> {
            let count = points.len();
            (0..count)
                .map(|k| (points[k], points[(k + 1) % count]))
                .collect()
        };
        let own = directed(poly);
        let adjoining: Vec<usize> = self
            .features
            .iter()
            .enumerate()
            .filter(|(_, f)| f.kind == FeatureKind::Void)
            .filter(|(_, f)| {
                directed(&f.points)
                    .iter()
                    .any(|&(p, q)| own.contains(&(q, p)))
            })
            .map(|(index, _)| index)
            .collect();
        if adjoining.is_empty() {
            return (poly.to_vec(), Vec::new());
        }

        let mut edges: BTreeSet<(usize, usize)> = own.iter().copied().collect();
        for &index in &adjoining {
            for (p, q) in directed(&self.features[index].points) {
                if !edges.remove(&(q, p)) {
                    edges.insert((p, q));
                }
            }
        }

        let mut next: HashMap<usize, usize> = HashMap::new();
        for &(p, q) in &edges {
            if next.insert(p, q).is_some() {
                warn!("adjoining voids touch at point {}; not merged", p);
                return (poly.to_vec(), Vec::new());
            }
        }
        let start = poly
            .iter()
            .copied()
            .find(|p| next.contains_key(p))
            .or_else(|| edges.iter().next().map(|&(p, _)| p));
        let Some(start) = start else {
            warn!("adjoining voids cancel out; not merged");
            return (poly.to_vec(), Vec::new());
        };

        let mut outline = vec![start];
        let mut current = start;
        while let Some(&q) = next.get(&current) {
            if q == start {
                break;
            }
            if outline.len() > edges.len() {
                break;
            }
            outline.push(q);
            current = q;
        }
        if outline.len() != edges.len() || next.get(&current) != Some(&start) {
            warn!(
                "adjoining voids do not form one outline ({} of {} edges); not merged",
                outline.len(),
                edges.len()
            );
            return (poly.to_vec(), Vec::new());
        }
        (outline, adjoining)
    }
}

fn signed_area_xy(points: &[Point3<f64>]) -> f64 {
    let count = points.len();
    let mut area = 0.0;
    for k in 0..count {
        let (p, q) = (&points[k], &points[(k + 1) % count]);
        area += p.x * q.y - q.x * p.y;
    }
    area * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtm::tests::sloped_grid;
    use crate::graph::to_polylines;

    /// Ring of points around point 12 at (2, 2).
    const RING: [usize; 8] = [6, 7, 8, 13, 18, 17, 16, 11];

    #[test]
    fn test_clip_without_fill() {
        let mut dtm = sloped_grid();
        let report = dtm.clip_internal_to_polygon(&RING, false).unwrap();
        assert!(!report.reversed);
        assert_eq!(report.removed_points, vec![12]);
        assert_eq!(report.lines_deleted, 6);
        assert_eq!(report.chords_deleted, 2);
        assert_eq!(report.edges_added, 0);
        assert_eq!(report.void_feature, None);
        assert_eq!(dtm.num_lines(), 48);
        assert_eq!(dtm.triangles().len(), 24);
        assert_eq!(dtm.drape_xy(2.0, 2.0), None);
        assert!(dtm.node_at(12).is_none());
        dtm.check_topology().unwrap();

        let mut outlines = to_polylines(dtm.graph(), VuMask::EXTERIOR);
        outlines.sort_by_key(|outline| outline.len());
        assert_eq!(outlines.len(), 2);
        assert_eq!(outlines[0].len(), 9);
        assert_eq!(outlines[1].len(), 17);
        let ring: BTreeSet<usize> = RING.iter().copied().collect();
        for p in &outlines[0] {
            let index = dtm.points().iter().position(|q| q == p).unwrap();
            assert!(ring.contains(&index));
        }
        let hole: Vec<Point3<f64>> = outlines[0][..8].to_vec();
        assert!((signed_area_xy(&hole) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_clip_with_fill() {
        let mut dtm = sloped_grid();
        let report = dtm.clip_internal_to_polygon(&RING, true).unwrap();
        assert_eq!(report.edges_added, 5);
        assert_eq!(report.void_feature, Some(0));
        assert_eq!(report.voids_merged, 0);
        assert_eq!(dtm.num_lines(), 53);
        assert_eq!(dtm.triangles().len(), 24);
        assert_eq!(dtm.drape_xy(2.0, 2.0), None);
        let z = dtm.drape_xy(0.5, 0.25).unwrap();
        assert!((z - 1.0).abs() < 1e-12);

        let void = &dtm.features()[0];
        assert_eq!(void.kind, FeatureKind::Void);
        assert_eq!(void.points, RING.to_vec());
        dtm.check_topology().unwrap();
    }

    #[test]
    fn test_clockwise_polygon_is_reversed() {
        let mut reversed: Vec<usize> = RING.to_vec();
        reversed.reverse();

        let mut ccw = sloped_grid();
        let expected = ccw.clip_internal_to_polygon(&RING, true).unwrap();
        let mut cw = sloped_grid();
        let report = cw.clip_internal_to_polygon(&reversed, true).unwrap();

        assert!(report.reversed);
        assert_eq!(report.lines_deleted, expected.lines_deleted);
        assert_eq!(report.chords_deleted, expected.chords_deleted);
        assert_eq!(cw.triangles().len(), ccw.triangles().len());
        let void = &cw.features()[0];
        let coords: Vec<_> = void.points.iter().map(|&p| *cw.point(p).unwrap()).collect();
        assert!(signed_area_xy(&coords) > 0.0);
    }

    #[test]
    fn test_disconnected_polygon_leaves_dtm_untouched() {
        let mut dtm = sloped_grid();
        let result = dtm.clip_internal_to_polygon(&[6, 8, 18, 16], true);
        assert!(matches!(
            result,
            Err(VuError::DisconnectedPolygon { from: 6, to: 8 })
        ));
        assert_eq!(dtm.num_lines(), 56);
    }

    #[test]
    fn test_invalid_polygons() {
        let mut dtm = sloped_grid();
        assert!(matches!(
            dtm.clip_internal_to_polygon(&[0, 1], false),
            Err(VuError::InvalidPolygon(_))
        ));
        assert!(matches!(
            dtm.clip_internal_to_polygon(&[0, 1, 99], false),
            Err(VuError::InvalidPolygon(_))
        ));
        assert!(matches!(
            dtm.clip_internal_to_polygon(&[0, 1, 6, 1], false),
            Err(VuError::InvalidPolygon(_))
        ));
        assert!(matches!(
            dtm.clip_internal_to_polygon(&[0, 1, 2], false),
            Err(VuError::DisconnectedPolygon { from: 2, to: 0 })
        ));
    }

    #[test]
    fn test_features_on_removed_lines_are_dropped() {
        let mut dtm = sloped_grid();
        dtm.add_feature(FeatureKind::Breakline, &[11, 12, 13]).unwrap();
        dtm.add_feature(FeatureKind::Breakline, &[0, 1]).unwrap();
        let report = dtm.clip_internal_to_polygon(&RING, false).unwrap();
        assert_eq!(report.features_dropped, 1);
        assert_eq!(dtm.features().len(), 1);
        assert_eq!(dtm.features()[0].points, vec![0, 1]);
    }

    #[test]
    fn test_closing_point_is_ignored() {
        let mut dtm = sloped_grid();
        let report = dtm
            .clip_internal_to_polygon(&[6, 7, 12, 11, 6], true)
            .unwrap();
        assert!(report.removed_points.is_empty());
        assert_eq!(report.chords_deleted, 1);
        assert_eq!(report.edges_added, 1);
        assert_eq!(dtm.triangles().len(), 30);
    }

    #[test]
    fn test_adjoining_voids_merge() {
        let mut dtm = sloped_grid();
        dtm.clip_internal_to_polygon(&[0, 1, 2, 7, 12, 11, 10, 5], true)
            .unwrap();
        let report = dtm
            .clip_internal_to_polygon(&[2, 3, 4, 9, 14, 13, 12, 7], true)
            .unwrap();
        assert_eq!(report.voids_merged, 1);
        assert_eq!(report.void_feature, Some(0));
        assert_eq!(dtm.features().len(), 1);

        let void = &dtm.features()[0];
        assert_eq!(void.points.len(), 12);
        assert!(!void.points.contains(&7));
        assert_eq!(void.points[0], 2);
        assert_eq!(dtm.triangles().len(), 16);
        assert_eq!(dtm.drape_xy(2.0, 1.0), None);
    }

    #[test]
    fn test_nested_void_is_rejected() {
        let mut dtm = sloped_grid();
        let cell = [6, 7, 12, 11];
        dtm.clip_internal_to_polygon(&cell, true).unwrap();
        let lines = dtm.num_lines();

        let result = dtm.clip_internal_to_polygon(&cell, true);
        assert!(matches!(result, Err(VuError::NestedVoid { feature: 1 })));
        assert_eq!(dtm.num_lines(), lines);
        assert_eq!(dtm.features().len(), 1);
    }

    #[test]
    fn test_void_touching_another_void_merges() {
        let mut dtm = sloped_grid();
        let u_shape = [0, 1, 2, 3, 8, 13, 12, 7, 6, 11, 10, 5];
        dtm.clip_internal_to_polygon(&u_shape, true).unwrap();
        assert_eq!(dtm.triangles().len(), 22);

        let report = dtm.clip_internal_to_polygon(&[6, 7, 12, 11], true).unwrap();
        assert_eq!(report.chords_deleted, 1);
        assert_eq!(report.voids_merged, 1);
        assert_eq!(report.void_feature, Some(0));
        assert_eq!(dtm.features().len(), 1);

        let mut outline = dtm.features()[0].points.clone();
        assert_eq!(outline.len(), 10);
        outline.sort_unstable();
        assert_eq!(outline, vec![0, 1, 2, 3, 5, 8, 10, 11, 12, 13]);
        assert_eq!(dtm.triangles().len(), 20);
        assert_eq!(dtm.drape_xy(1.5, 1.5), None);
        assert!(dtm.drape_xy(3.5, 0.5).is_some());
        dtm.check_topology().unwrap();
    }

    #[test]
    fn test_external_clip_keeps_inside() {
        let mut dtm = sloped_grid();
        let report = dtm.clip_external_to_polygon(&RING).unwrap();
        assert!(!report.reversed);
        assert_eq!(
            report.removed_points,
            vec![0, 1, 2, 3, 4, 5, 9, 10, 14, 15, 19, 20, 21, 22, 23, 24]
        );
        assert_eq!(report.lines_deleted, 40);
        assert_eq!(report.chords_deleted, 0);
        assert_eq!(dtm.num_lines(), 16);
        assert_eq!(dtm.triangles().len(), 8);
        assert!((dtm.drape_xy(2.0, 2.0).unwrap() - 6.0).abs() < 1e-12);
        assert_eq!(dtm.drape_xy(0.5, 0.5), None);
        assert_eq!(dtm.drape_xy(3.5, 2.0), None);

        let outside = dtm.line_node(7, 6).unwrap();
        assert_eq!(dtm.graph().face_node_count(outside), 8);
        assert!(dtm
            .graph()
            .mask(outside)
            .contains(VuMask::EXTERIOR | VuMask::BOUNDARY));
        let inside = dtm.line_node(6, 7).unwrap();
        assert!(dtm.graph().has_mask(inside, VuMask::BOUNDARY));
        assert!(!dtm.graph().has_mask(inside, VuMask::EXTERIOR));
        dtm.check_topology().unwrap();
    }

    #[test]
    fn test_external_clip_deletes_outside_chords() {
        let mut dtm = sloped_grid();
        // L shape; the diagonal 5-11 cuts across its notch.
        let report = dtm
            .clip_external_to_polygon(&[0, 1, 2, 7, 12, 11, 6, 5])
            .unwrap();
        assert_eq!(report.removed_points.len(), 17);
        assert_eq!(report.lines_deleted, 42);
        assert_eq!(report.chords_deleted, 1);
        assert!(!dtm.has_line(5, 11));
        assert_eq!(dtm.num_lines(), 13);
        assert_eq!(dtm.triangles().len(), 6);
        assert_eq!(dtm.drape_xy(0.5, 1.5), None);
        assert!((dtm.drape_xy(1.5, 1.5).unwrap() - 4.5).abs() < 1e-12);
        dtm.check_topology().unwrap();
    }

    #[test]
    fn test_external_clip_features_and_winding() {
        let mut dtm = sloped_grid();
        dtm.add_feature(FeatureKind::Breakline, &[0, 1]).unwrap();
        dtm.add_feature(FeatureKind::Breakline, &[6, 7]).unwrap();
        dtm.add_feature(FeatureKind::Void, &[6, 7, 12, 11]).unwrap();
        let mut reversed = RING.to_vec();
        reversed.reverse();

        let report = dtm.clip_external_to_polygon(&reversed).unwrap();
        assert!(report.reversed);
        assert_eq!(report.features_dropped, 1);
        assert_eq!(dtm.features().len(), 2);
        assert_eq!(dtm.features()[0].points, vec![6, 7]);
        assert_eq!(dtm.triangles().len(), 6);
        assert_eq!(dtm.drape_xy(1.5, 1.25), None);
    }

    #[test]
    fn test_failed_external_clip_leaves_dtm_untouched() {
        let mut dtm = sloped_grid();
        let result = dtm.clip_external_to_polygon(&[6, 8, 18, 16]);
        assert!(matches!(
            result,
            Err(VuError::DisconnectedPolygon { from: 6, to: 8 })
        ));
        assert_eq!(dtm.num_lines(), 56);
        assert_eq!(dtm.triangles().len(), 32);
    }
}
