//! Drape graph: overlapping polygons resolved into faces with active planes.
//!
//! Each input polygon becomes a loop of edges tagged with the index of the
//! plane fitted through it. [`DrapeGraph::do_analysis`] then
//!
//! 1. splits edges where polygons cross,
//! 2. merges vertices closer than a tolerance,
//! 3. walks every connected component from its outer face, adding a
//!    polygon's plane when an edge crossing enters the polygon and removing
//!    it on the way out,
//! 4. picks for each face the highest plane that evaluates into the
//!    requested z range.
//!
//! Polygons may share whole edges or parts of edges. Collinear overlaps are
//! split at each other's endpoints and the coincident edges are merged into
//! one edge that carries every polygon boundary it stands for.
//!
//! Crossings that enter a polygon twice, or leave one that was never
//! entered, are parity errors; their edges are marked with
//! [`VuMask::PARITY`] and the analysis fails.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use log::{debug, warn};
use nalgebra::{Point3, Vector3};

use super::plane::{newell_normal, PlaneArray};
use crate::algo::progress::{self, Progress};
use crate::error::{Result, VuError};
use crate::graph::{
    add_polygon_loop, link_vertex_by_angle, point_in_polygon_xy, segment_intersection_xy, NodeId,
    TopologyScope, VuGraph, VuMask,
};

/// Relative parameter tolerance for edge intersections.
const PARAM_EPS: f64 = 1e-12;

/// Classifies faces for [`DrapeGraph::mark_faces`].
pub trait FaceTester {
    /// True if the face of `seed` should be marked.
    fn test(&self, drape: &DrapeGraph, seed: NodeId) -> bool;
}

impl<F> FaceTester for F
where
    F: Fn(&DrapeGraph, NodeId) -> bool,
{
    fn test(&self, drape: &DrapeGraph, seed: NodeId) -> bool {
        self(drape, seed)
    }
}

/// A polygon boundary crossed when stepping over an edge, seen from the
/// face of one of its nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeCrossing {
    /// Plane (polygon) index.
    pub plane: usize,
    /// True when the step enters the polygon.
    pub entering: bool,
}

/// Counters from [`DrapeGraph::do_analysis`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisReport {
    /// Vertices inserted where edges cross.
    pub split_points: usize,
    /// Vertices removed by clustering.
    pub vertices_merged: usize,
    /// Edges removed because both ends merged.
    pub collapsed_edges: usize,
    /// Coincident edges folded into another edge.
    pub edges_merged: usize,
    /// Faces after analysis.
    pub faces: usize,
    /// Connected components.
    pub components: usize,
    /// Bounded faces with an active plane.
    pub faces_with_plane: usize,
}

/// Union-find over vertex indices.
struct ClusterIds {
    parent: Vec<usize>,
}

impl ClusterIds {
    fn new(count: usize) -> Self {
        Self {
            parent: (0..count).collect(),
        }
    }

    fn find(&mut self, idx: usize) -> usize {
        let mut root = idx;
        while root != self.parent[root] {
            root = self.parent[root];
        }
        let mut cur = idx;
        while cur != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (small, big) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[big] = small;
        }
    }
}

/// A graph of draped polygons.
#[derive(Debug, Clone, Default)]
pub struct DrapeGraph {
    graph: VuGraph,
    planes: PlaneArray,
    polygons: Vec<Vec<Point3<f64>>>,
    outside_masks: Vec<VuMask>,
    crossings: Vec<Vec<EdgeCrossing>>,
    face_seeds: Vec<NodeId>,
    face_of: Vec<usize>,
    face_sets: Vec<BTreeSet<usize>>,
    face_active: Vec<Option<usize>>,
    analyzed: bool,
}

impl DrapeGraph {
    /// An empty drape graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying graph.
    pub fn graph(&self) -> &VuGraph {
        &self.graph
    }

    /// The planes, one per polygon.
    pub fn planes(&self) -> &PlaneArray {
        &self.planes
    }

    /// Number of polygons added.
    pub fn num_polygons(&self) -> usize {
        self.polygons.len()
    }

    /// Polygon `index` as stored (counter-clockwise, shifted).
    pub fn polygon(&self, index: usize) -> Option<&[Point3<f64>]> {
        self.polygons.get(index).map(Vec::as_slice)
    }

    /// True once [`do_analysis`](Self::do_analysis) has succeeded and nothing
    /// was added since.
    pub fn is_analyzed(&self) -> bool {
        self.analyzed
    }

    /// Add one polygon.
    ///
    /// The polygon is turned counter-clockwise if needed and gets a plane
    /// through its points (Newell normal, clamped to the polygon's z range).
    /// Every node of its loop is tagged with the plane index in `user_int`
    /// and marked `PRIMARY`; nodes on the outer side also get
    /// `outside_mask`. Returns the plane index.
    pub fn add_polygon(&mut self, points: &[Point3<f64>], outside_mask: VuMask) -> Result<usize> {
        if outside_mask.is_empty() {
            return Err(VuError::invalid_param(
                "outside_mask",
                format!("{:?}", outside_mask),
                "must not be empty",
            ));
        }
        let mut pts = points.to_vec();
        if pts.len() > 1 && pts.first() == pts.last() {
            pts.pop();
        }
        if pts.len() < 3 {
            return Err(VuError::InvalidPolygon(format!(
                "polygon needs at least 3 points, got {}",
                pts.len()
            )));
        }
        let normal = newell_normal(&pts);
        if normal.z == 0.0 {
            return Err(VuError::InvalidPolygon("polygon has zero xy area".into()));
        }
        if normal.z < 0.0 {
            pts.reverse();
        }

        let count = pts.len() as f64;
        let origin = Point3::from(pts.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / count);
        let z_min = pts.iter().map(|p| p.z).fold(f64::INFINITY, f64::min);
        let z_max = pts.iter().map(|p| p.z).fold(f64::NEG_INFINITY, f64::max);
        let index = self.planes.add_by_origin_and_normal(
            origin,
            normal,
            self.polygons.len() as i64,
            z_min,
            z_max,
        )?;

        let inside = match add_polygon_loop(&mut self.graph, &pts) {
            Ok((inside, _)) => inside,
            Err(e) => {
                self.planes.truncate(index);
                return Err(e);
            }
        };
        let loop_nodes: Vec<_> = self.graph.face_loop(inside).collect();
        for n in loop_nodes {
            let m = self.graph.mate(n);
            self.graph.set_user_int(n, index as i64);
            self.graph.set_user_int(m, index as i64);
            self.graph.set_mask(n, VuMask::PRIMARY);
            self.graph.set_mask(m, VuMask::PRIMARY | outside_mask);
        }
        self.polygons.push(pts);
        self.outside_masks.push(outside_mask);
        self.analyzed = false;
        Ok(index)
    }

    /// Add several polygons, raising polygon `k` by
    /// `k * vertical_shift * diagonal`, where `diagonal` is the xy diagonal of
    /// all their points. Returns the plane indices.
    pub fn add_polygons(
        &mut self,
        polygons: &[Vec<Point3<f64>>],
        outside_mask: VuMask,
        vertical_shift: f64,
    ) -> Result<Vec<usize>> {
        let diagonal = xy_diagonal(polygons.iter().flatten());
        polygons
            .iter()
            .enumerate()
            .map(|(k, polygon)| {
                let dz = k as f64 * vertical_shift * diagonal;
                let shifted: Vec<_> = polygon
                    .iter()
                    .map(|p| Point3::new(p.x, p.y, p.z + dz))
                    .collect();
                self.add_polygon(&shifted, outside_mask)
            })
            .collect()
    }

    /// Resolve crossings and assign active planes to faces.
    pub fn do_analysis(
        &mut self,
        low_z: f64,
        high_z: f64,
        cluster_tolerance: f64,
    ) -> Result<AnalysisReport> {
        self.analyze(low_z, high_z, cluster_tolerance, None)
    }

    /// [`do_analysis`](Self::do_analysis) with progress reporting per stage.
    pub fn do_analysis_with_progress(
        &mut self,
        low_z: f64,
        high_z: f64,
        cluster_tolerance: f64,
        progress: &Progress,
    ) -> Result<AnalysisReport> {
        self.analyze(low_z, high_z, cluster_tolerance, Some(progress))
    }

    fn analyze(
        &mut self,
        low_z: f64,
        high_z: f64,
        cluster_tolerance: f64,
        progress: Option<&Progress>,
    ) -> Result<AnalysisReport> {
        if !(cluster_tolerance >= 0.0) {
            return Err(VuError::invalid_param(
                "cluster_tolerance",
                cluster_tolerance,
                "must be non-negative",
            ));
        }
        if low_z > high_z {
            return Err(VuError::invalid_param("low_z", low_z, "must not exceed high_z"));
        }
        self.analyzed = false;
        let mut report = AnalysisReport::default();

        progress::report(progress, 0, 4, "splitting crossing edges");
        report.split_points = self.split_crossings()?;

        progress::report(progress, 1, 4, "clustering vertices");
        let (merged, collapsed) = self.cluster_vertices(cluster_tolerance)?;
        report.vertices_merged = merged;
        report.collapsed_edges = collapsed;
        report.edges_merged = self.merge_coincident_edges()?;

        progress::report(progress, 2, 4, "propagating planes");
        report.components = self.propagate_planes()?;
        report.faces = self.face_seeds.len();

        progress::report(progress, 3, 4, "selecting active planes");
        report.faces_with_plane = self.select_active_planes(low_z, high_z);

        self.analyzed = true;
        debug!("drape analysis: {:?}", report);
        Ok(report)
    }

    fn split_crossings(&mut self) -> Result<usize> {
        let g = &self.graph;
        let edges: Vec<NodeId> = g.node_ids().filter(|&n| n < g.mate(n)).collect();
        let mut splits: Vec<Vec<(f64, Point3<f64>)>> = vec![Vec::new(); edges.len()];

        for i in 0..edges.len() {
            let (p0, p1) = (*g.xyz(edges[i]), *g.xyz(g.mate(edges[i])));
            for j in (i + 1)..edges.len() {
                let (q0, q1) = (*g.xyz(edges[j]), *g.xyz(g.mate(edges[j])));
                let Some((t, u)) = segment_intersection_xy(&p0, &p1, &q0, &q1) else {
                    // Overlapping collinear edges are cut at each other's ends.
                    if let Some(params) = collinear_params_xy(&p0, &p1, &q0, &q1) {
                        push_inner_points(&mut splits[i], &p0, &p1, params, [&q0, &q1]);
                    }
                    if let Some(params) = collinear_params_xy(&q0, &q1, &p0, &p1) {
                        push_inner_points(&mut splits[j], &q0, &q1, params, [&p0, &p1]);
                    }
                    continue;
                };
                let t_inner = t > PARAM_EPS && t < 1.0 - PARAM_EPS;
                let u_inner = u > PARAM_EPS && u < 1.0 - PARAM_EPS;
                if !t_inner && !u_inner {
                    continue;
                }
                // Shared xy so that both halves cluster exactly.
                let (x, y) = if u <= PARAM_EPS {
                    (q0.x, q0.y)
                } else if u >= 1.0 - PARAM_EPS {
                    (q1.x, q1.y)
                } else if t <= PARAM_EPS {
                    (p0.x, p0.y)
                } else if t >= 1.0 - PARAM_EPS {
                    (p1.x, p1.y)
                } else {
                    (p0.x + (p1.x - p0.x) * t, p0.y + (p1.y - p0.y) * t)
                };
                if t_inner {
                    splits[i].push((t, Point3::new(x, y, p0.z + (p1.z - p0.z) * t)));
                }
                if u_inner {
                    splits[j].push((u, Point3::new(x, y, q0.z + (q1.z - q0.z) * u)));
                }
            }
        }

        let mut count = 0;
        for (edge, mut points) in edges.into_iter().zip(splits) {
            points.sort_by(|a, b| a.0.total_cmp(&b.0));
            points.dedup_by(|a, b| (a.0 - b.0).abs() <= PARAM_EPS);
            let mut current = edge;
            for (_, xyz) in points {
                let (forward, _) = self.graph.split_edge(current, xyz)?;
                current = forward;
                count += 1;
            }
        }
        Ok(count)
    }

    fn cluster_vertices(&mut self, tol: f64) -> Result<(usize, usize)> {
        let seeds = self.graph.collect_vertex_seeds();
        let mut ids = ClusterIds::new(seeds.len());

        let mut order: Vec<usize> = (0..seeds.len()).collect();
        order.sort_by(|&a, &b| self.graph.xyz(seeds[a]).x.total_cmp(&self.graph.xyz(seeds[b]).x));
        for a in 0..order.len() {
            let pa = *self.graph.xyz(seeds[order[a]]);
            for &ob in &order[a + 1..] {
                let pb = self.graph.xyz(seeds[ob]);
                if pb.x - pa.x > tol {
                    break;
                }
                if ((pb.x - pa.x).powi(2) + (pb.y - pa.y).powi(2)).sqrt() <= tol {
                    ids.union(order[a], ob);
                }
            }
        }

        let mut cluster_of = vec![usize::MAX; self.graph.arena_len()];
        let mut sizes = vec![0usize; seeds.len()];
        for (i, &seed) in seeds.iter().enumerate() {
            let root = ids.find(i);
            sizes[root] += 1;
            for n in self.graph.vertex_loop(seed) {
                cluster_of[n.index()] = root;
            }
        }
        let merged = sizes.iter().filter(|&&s| s > 0).map(|&s| s - 1).sum::<usize>();
        if merged == 0 {
            return Ok((0, 0));
        }
        let anchors: Vec<Point3<f64>> = seeds.iter().map(|&s| *self.graph.xyz(s)).collect();

        let mut collapsed = 0;
        let nodes: Vec<_> = self.graph.node_ids().collect();
        for n in nodes {
            if self.graph.is_live(n)
                && cluster_of[n.index()] == cluster_of[self.graph.mate(n).index()]
            {
                self.graph.delete_edge(n)?;
                collapsed += 1;
            }
        }

        let mut groups: HashMap<usize, Vec<NodeId>> = HashMap::new();
        for n in self.graph.node_ids() {
            let root = cluster_of[n.index()];
            if sizes[root] > 1 {
                groups.entry(root).or_default().push(n);
            }
        }
        for (&root, nodes) in &groups {
            for &n in nodes {
                self.graph.set_xyz(n, anchors[root]);
            }
        }
        for (_, mut nodes) in groups {
            link_vertex_by_angle(&mut self.graph, &mut nodes);
        }
        if collapsed > 0 {
            warn!("{} edges collapsed while clustering vertices", collapsed);
        }
        Ok((merged, collapsed))
    }

    /// Fold edges joining the same two vertices into one, keeping the
    /// crossings of all of them. Returns the number of edges removed.
    fn merge_coincident_edges(&mut self) -> Result<usize> {
        let g = &self.graph;
        let mut crossings = vec![Vec::new(); g.arena_len()];
        for n in g.node_ids() {
            let plane = g.user_int(n) as usize;
            let entering = self
                .outside_masks
                .get(plane)
                .is_some_and(|&mask| g.has_mask(n, mask));
            crossings[n.index()].push(EdgeCrossing { plane, entering });
        }

        let mut vertex_of = vec![usize::MAX; g.arena_len()];
        for (v, seed) in g.collect_vertex_seeds().into_iter().enumerate() {
            for n in g.vertex_loop(seed) {
                vertex_of[n.index()] = v;
            }
        }
        let mut kept: HashMap<(usize, usize), NodeId> = HashMap::new();
        let mut duplicates = Vec::new();
        for n in g.node_ids().filter(|&n| n < g.mate(n)) {
            let (a, b) = (vertex_of[n.index()], vertex_of[g.mate(n).index()]);
            match kept.get(&(a.min(b), a.max(b))) {
                Some(&survivor) => duplicates.push((survivor, n)),
                None => {
                    kept.insert((a.min(b), a.max(b)), n);
                }
            }
        }

        for &(survivor, n) in &duplicates {
            let m = self.graph.mate(n);
            let (along, against) = if vertex_of[n.index()] == vertex_of[survivor.index()] {
                (n, m)
            } else {
                (m, n)
            };
            let moved = std::mem::take(&mut crossings[along.index()]);
            crossings[survivor.index()].extend(moved);
            let moved = std::mem::take(&mut crossings[against.index()]);
            crossings[self.graph.mate(survivor).index()].extend(moved);
            self.graph.delete_edge(n)?;
        }
        if !duplicates.is_empty() {
            debug!("merged {} coincident edges", duplicates.len());
        }
        self.crossings = crossings;
        Ok(duplicates.len())
    }

    /// Walk each component from its outer face. Returns the component count.
    fn propagate_planes(&mut self) -> Result<usize> {
        self.face_seeds = self.graph.collect_face_seeds();
        self.face_of = vec![usize::MAX; self.graph.arena_len()];
        for (f, &seed) in self.face_seeds.iter().enumerate() {
            for n in self.graph.face_loop(seed) {
                self.face_of[n.index()] = f;
            }
        }

        let face_count = self.face_seeds.len();
        let mut sets: Vec<Option<BTreeSet<usize>>> = vec![None; face_count];
        let mut in_component = vec![false; face_count];
        let mut components = 0;
        let mut parity_errors = 0;

        for start in 0..face_count {
            if in_component[start] {
                continue;
            }
            components += 1;
            let component = self.component_faces(start, &mut in_component);

            let outer = component
                .iter()
                .copied()
                .min_by(|&a, &b| {
                    let area_a = self.graph.face_area(self.face_seeds[a]);
                    let area_b = self.graph.face_area(self.face_seeds[b]);
                    area_a.total_cmp(&area_b)
                })
                .unwrap_or(start);
            let own: BTreeSet<usize> = component
                .iter()
                .flat_map(|&f| self.graph.face_loop(self.face_seeds[f]))
                .flat_map(|n| self.crossings[n.index()].iter().map(|c| c.plane))
                .collect();
            let sample = *self.graph.xyz(self.face_seeds[outer]);
            let initial: BTreeSet<usize> = (0..self.polygons.len())
                .filter(|k| !own.contains(k))
                .filter(|&k| point_in_polygon_xy(&self.polygons[k], sample.x, sample.y))
                .collect();
            sets[outer] = Some(initial);

            let mut queue = VecDeque::from([outer]);
            while let Some(f) = queue.pop_front() {
                let current = sets[f].clone().unwrap_or_default();
                let loop_nodes: Vec<_> = self.graph.face_loop(self.face_seeds[f]).collect();
                for n in loop_nodes {
                    let g = self.face_of[self.graph.mate(n).index()];
                    let mut next = current.clone();
                    let consistent =
                        update_active_planes_for_edge_crossings(&mut next, &self.crossings[n.index()]);
                    let agrees = match &sets[g] {
                        Some(existing) => *existing == next,
                        None => {
                            sets[g] = Some(next);
                            queue.push_back(g);
                            true
                        }
                    };
                    if !(consistent && agrees) && !self.graph.has_mask(n, VuMask::PARITY) {
                        self.graph.set_mask_around_edge(n, VuMask::PARITY);
                        parity_errors += 1;
                    }
                }
            }
        }

        if parity_errors > 0 {
            warn!("{} parity errors in drape graph", parity_errors);
            return Err(VuError::ParityError {
                count: parity_errors,
            });
        }
        self.face_sets = sets.into_iter().map(Option::unwrap_or_default).collect();
        Ok(components)
    }

    fn component_faces(&self, start: usize, seen: &mut [bool]) -> Vec<usize> {
        let mut faces = vec![start];
        seen[start] = true;
        let mut next = 0;
        while next < faces.len() {
            let f = faces[next];
            next += 1;
            for n in self.graph.face_loop(self.face_seeds[f]) {
                let g = self.face_of[self.graph.mate(n).index()];
                if !seen[g] {
                    seen[g] = true;
                    faces.push(g);
                }
            }
        }
        faces
    }

    fn select_active_planes(&mut self, low_z: f64, high_z: f64) -> usize {
        self.face_active = self
            .face_seeds
            .iter()
            .zip(&self.face_sets)
            .map(|(&seed, set)| {
                let (centroid, area) = self.graph.face_centroid(seed)?;
                if area <= 0.0 {
                    return None;
                }
                set.iter()
                    .filter_map(|&k| {
                        let z = self.planes.evaluate(k, centroid.x, centroid.y)?;
                        (low_z..=high_z).contains(&z).then_some((k, z))
                    })
                    .max_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(k, _)| k)
            })
            .collect();
        self.face_active.iter().filter(|p| p.is_some()).count()
    }

    fn face_index(&self, node: NodeId) -> Option<usize> {
        if !self.analyzed {
            return None;
        }
        self.face_of
            .get(node.index())
            .copied()
            .filter(|&f| f != usize::MAX)
    }

    /// Active plane of the face of `node`, after analysis.
    pub fn face_active_plane(&self, node: NodeId) -> Option<usize> {
        self.face_index(node).and_then(|f| self.face_active[f])
    }

    /// Planes whose polygons cover the face of `node`, after analysis.
    pub fn face_planes(&self, node: NodeId) -> Option<&BTreeSet<usize>> {
        self.face_index(node).map(|f| &self.face_sets[f])
    }

    /// Mark every face whose draped z at its centroid is below `cap_z`.
    ///
    /// Faces without an active plane are left alone. Returns the number of
    /// faces marked.
    pub fn mark_faces_below(&mut self, cap_z: f64, mask: VuMask) -> Result<usize> {
        let below = |drape: &DrapeGraph, seed: NodeId| {
            let Some(plane) = drape.face_active_plane(seed) else {
                return false;
            };
            drape
                .graph
                .face_centroid(seed)
                .and_then(|(c, _)| drape.planes.evaluate(plane, c.x, c.y))
                .is_some_and(|z| z < cap_z)
        };
        self.mark_faces(&below, mask)
    }

    /// Mark every face accepted by `tester`. Returns the number of faces
    /// marked.
    pub fn mark_faces(&mut self, tester: &dyn FaceTester, mask: VuMask) -> Result<usize> {
        if !self.analyzed {
            return Err(VuError::NotAnalyzed);
        }
        let marked: Vec<_> = self
            .face_seeds
            .iter()
            .copied()
            .filter(|&seed| tester.test(self, seed))
            .collect();
        for &seed in &marked {
            self.graph.set_mask_around_face(seed, mask);
        }
        Ok(marked.len())
    }

    /// Draped z at `(x, y)`: the highest active plane among the faces at the
    /// point. `None` before analysis or where no face has an active plane.
    pub fn drape_xy(&self, x: f64, y: f64) -> Option<f64> {
        if !self.analyzed {
            return None;
        }
        let tol = PARAM_EPS * self.graph.largest_range_edge().max(1.0);
        let pos = self.graph.locate_xy(x, y, tol);
        let nodes: Vec<NodeId> = match pos.scope() {
            TopologyScope::Unclassified => return None,
            TopologyScope::Face => vec![pos.node()],
            TopologyScope::Edge => vec![pos.node(), pos.edge_mate(&self.graph).node()],
            TopologyScope::Vertex => self.graph.vertex_loop(pos.node()).collect(),
        };
        nodes
            .into_iter()
            .filter_map(|n| self.face_active_plane(n))
            .filter_map(|k| self.planes.evaluate(k, x, y))
            .max_by(f64::total_cmp)
    }
}

/// Apply an edge crossing to the set of covering planes.
///
/// Entering adds `plane`, leaving removes it. Returns false when the set
/// already had (entering) or lacked (leaving) the plane, which is a parity
/// error.
pub fn update_active_planes_for_edge_crossing(
    planes: &mut BTreeSet<usize>,
    plane: usize,
    entering: bool,
) -> bool {
    if entering {
        planes.insert(plane)
    } else {
        planes.remove(&plane)
    }
}

/// Apply every crossing of one edge to the set of covering planes.
///
/// Crossings of the same plane in opposite directions cancel. Returns false
/// on a parity error, including a plane crossed twice the same way.
pub fn update_active_planes_for_edge_crossings(
    planes: &mut BTreeSet<usize>,
    crossings: &[EdgeCrossing],
) -> bool {
    let mut net: BTreeMap<usize, i32> = BTreeMap::new();
    for c in crossings {
        *net.entry(c.plane).or_default() += if c.entering { 1 } else { -1 };
    }
    let mut consistent = true;
    for (plane, count) in net {
        consistent &= match count {
            0 => true,
            1 => update_active_planes_for_edge_crossing(planes, plane, true),
            -1 => update_active_planes_for_edge_crossing(planes, plane, false),
            _ => false,
        };
    }
    consistent
}

/// Parameters along `p0-p1` of `q0` and `q1` when both segments lie on one
/// xy line.
fn collinear_params_xy(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    q0: &Point3<f64>,
    q1: &Point3<f64>,
) -> Option<[f64; 2]> {
    let (dx, dy) = (p1.x - p0.x, p1.y - p0.y);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return None;
    }
    let len = len2.sqrt();
    let tol = PARAM_EPS * (len + ((q1.x - q0.x).powi(2) + (q1.y - q0.y).powi(2)).sqrt());
    let offset = |q: &Point3<f64>| ((q.x - p0.x) * dy - (q.y - p0.y) * dx).abs() / len;
    if offset(q0) > tol || offset(q1) > tol {
        return None;
    }
    let param = |q: &Point3<f64>| ((q.x - p0.x) * dx + (q.y - p0.y) * dy) / len2;
    Some([param(q0), param(q1)])
}

/// Queue a split of `a0-a1` at every point strictly inside it, keeping the
/// point's xy and interpolating z along the edge.
fn push_inner_points(
    splits: &mut Vec<(f64, Point3<f64>)>,
    a0: &Point3<f64>,
    a1: &Point3<f64>,
    params: [f64; 2],
    points: [&Point3<f64>; 2],
) {
    for (t, q) in params.into_iter().zip(points) {
        if t > PARAM_EPS && t < 1.0 - PARAM_EPS {
            splits.push((t, Point3::new(q.x, q.y, a0.z + (a1.z - a0.z) * t)));
        }
    }
}

fn xy_diagonal<'a>(points: impl Iterator<Item = &'a Point3<f64>>) -> f64 {
    let mut min = (f64::INFINITY, f64::INFINITY);
    let mut max = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    let mut any = false;
    for p in points {
        any = true;
        min = (min.0.min(p.x), min.1.min(p.y));
        max = (max.0.max(p.x), max.1.max(p.y));
    }
    if !any {
        return 0.0;
    }
    ((max.0 - min.0).powi(2) + (max.1 - min.1).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64, z: f64) -> Vec<Point3<f64>> {
        vec![
            Point3::new(x0, y0, z),
            Point3::new(x0 + size, y0, z),
            Point3::new(x0 + size, y0 + size, z),
            Point3::new(x0, y0 + size, z),
        ]
    }

    fn bounded_faces(drape: &DrapeGraph) -> Vec<NodeId> {
        let g = drape.graph();
        g.collect_face_seeds()
            .into_iter()
            .filter(|&f| g.face_area(f) > 0.0)
            .collect()
    }

    #[test]
    fn test_single_polygon() {
        let mut drape = DrapeGraph::new();
        let index = drape.add_polygon(&square(0.0, 0.0, 1.0, 1.0), VuMask::EXTERIOR).unwrap();
        assert_eq!(index, 0);
        let report = drape.do_analysis(0.0, 10.0, 1e-9).unwrap();
        assert_eq!(report.split_points, 0);
        assert_eq!(report.faces, 2);
        assert_eq!(report.components, 1);
        assert_eq!(report.faces_with_plane, 1);
        assert_eq!(drape.drape_xy(0.5, 0.5), Some(1.0));
        assert_eq!(drape.drape_xy(2.0, 2.0), None);
    }

    #[test]
    fn test_clockwise_input_is_reversed() {
        let mut drape = DrapeGraph::new();
        let mut pts = square(0.0, 0.0, 1.0, 0.0);
        pts.reverse();
        drape.add_polygon(&pts, VuMask::EXTERIOR).unwrap();
        let stored = drape.polygon(0).unwrap();
        assert!(newell_normal(stored).z > 0.0);
        drape.do_analysis(-1.0, 1.0, 0.0).unwrap();
        assert_eq!(drape.drape_xy(0.5, 0.5), Some(0.0));
    }

    #[test]
    fn test_overlapping_polygons() {
        let mut drape = DrapeGraph::new();
        drape.add_polygon(&square(0.0, 0.0, 2.0, 1.0), VuMask::EXTERIOR).unwrap();
        drape.add_polygon(&square(1.0, 1.0, 2.0, 2.0), VuMask::EXTERIOR).unwrap();
        let report = drape.do_analysis(0.0, 10.0, 1e-9).unwrap();
        assert_eq!(report.split_points, 4);
        assert_eq!(report.vertices_merged, 2);
        assert_eq!(report.components, 1);
        assert_eq!(report.faces, 4);
        assert_eq!(report.faces_with_plane, 3);
        assert!(drape.graph().is_valid());

        assert_eq!(drape.drape_xy(0.5, 0.5), Some(1.0));
        assert_eq!(drape.drape_xy(1.5, 1.5), Some(2.0));
        assert_eq!(drape.drape_xy(2.5, 2.5), Some(2.0));

        let overlap = drape.graph().locate_xy(1.5, 1.5, 1e-9).node();
        let planes: Vec<_> = drape.face_planes(overlap).unwrap().iter().copied().collect();
        assert_eq!(planes, vec![0, 1]);
    }

    #[test]
    fn test_z_range_restricts_planes() {
        let mut drape = DrapeGraph::new();
        drape.add_polygon(&square(0.0, 0.0, 2.0, 1.0), VuMask::EXTERIOR).unwrap();
        drape.add_polygon(&square(1.0, 1.0, 2.0, 2.0), VuMask::EXTERIOR).unwrap();
        let report = drape.do_analysis(0.0, 1.5, 1e-9).unwrap();
        assert_eq!(report.faces_with_plane, 2);
        assert_eq!(drape.drape_xy(1.5, 1.5), Some(1.0));
        assert_eq!(drape.drape_xy(2.5, 2.5), None);
    }

    #[test]
    fn test_nested_polygons() {
        let mut drape = DrapeGraph::new();
        drape.add_polygon(&square(0.0, 0.0, 10.0, 1.0), VuMask::EXTERIOR).unwrap();
        drape.add_polygon(&square(4.0, 4.0, 2.0, 3.0), VuMask::EXTERIOR).unwrap();
        let report = drape.do_analysis(0.0, 10.0, 1e-9).unwrap();
        assert_eq!(report.components, 2);
        assert_eq!(drape.drape_xy(1.0, 1.0), Some(1.0));
        assert_eq!(drape.drape_xy(5.0, 5.0), Some(3.0));
    }

    #[test]
    fn test_mark_faces() {
        let mut drape = DrapeGraph::new();
        drape.add_polygon(&square(0.0, 0.0, 2.0, 1.0), VuMask::EXTERIOR).unwrap();
        drape.add_polygon(&square(1.0, 1.0, 2.0, 2.0), VuMask::EXTERIOR).unwrap();

        let positive = |d: &DrapeGraph, seed: NodeId| d.graph().face_area(seed) > 0.0;
        assert!(matches!(
            drape.mark_faces(&positive, VuMask::RULE),
            Err(VuError::NotAnalyzed)
        ));

        drape.do_analysis(0.0, 10.0, 1e-9).unwrap();
        assert_eq!(drape.mark_faces(&positive, VuMask::RULE).unwrap(), 3);
        assert_eq!(drape.mark_faces_below(1.5, VuMask::VOID).unwrap(), 1);

        let low = drape.graph().locate_xy(0.5, 0.5, 1e-9).node();
        assert!(drape.graph().has_mask(low, VuMask::VOID));
        assert_eq!(bounded_faces(&drape).len(), 3);
    }

    #[test]
    fn test_parity_error_on_self_crossing_polygon() {
        let mut drape = DrapeGraph::new();
        let bowtie = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 2.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 3.0, 0.0),
        ];
        drape.add_polygon(&bowtie, VuMask::EXTERIOR).unwrap();
        let result = drape.do_analysis(-1.0, 1.0, 1e-9);
        assert!(matches!(result, Err(VuError::ParityError { .. })));
        assert!(!drape.is_analyzed());
        let g = drape.graph();
        assert!(g.node_ids().any(|n| g.has_mask(n, VuMask::PARITY)));
    }

    #[test]
    fn test_polygons_sharing_an_edge() {
        let mut drape = DrapeGraph::new();
        drape.add_polygon(&square(0.0, 0.0, 1.0, 1.0), VuMask::EXTERIOR).unwrap();
        drape.add_polygon(&square(1.0, 0.0, 1.0, 2.0), VuMask::EXTERIOR).unwrap();
        let report = drape.do_analysis(0.0, 10.0, 1e-9).unwrap();
        assert_eq!(report.split_points, 0);
        assert_eq!(report.vertices_merged, 2);
        assert_eq!(report.edges_merged, 1);
        assert_eq!(report.faces, 3);
        assert_eq!(report.faces_with_plane, 2);
        assert!(drape.graph().is_valid());

        assert_eq!(drape.drape_xy(0.5, 0.5), Some(1.0));
        assert_eq!(drape.drape_xy(1.5, 0.5), Some(2.0));
        assert_eq!(drape.drape_xy(1.0, 0.5), Some(2.0));
    }

    #[test]
    fn test_polygon_touching_part_of_an_edge() {
        let mut drape = DrapeGraph::new();
        let rectangle = vec![
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(2.0, 0.0, 1.0),
            Point3::new(2.0, 1.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ];
        drape.add_polygon(&rectangle, VuMask::EXTERIOR).unwrap();
        drape.add_polygon(&square(2.0, 0.25, 0.5, 2.0), VuMask::EXTERIOR).unwrap();
        let report = drape.do_analysis(0.0, 10.0, 1e-9).unwrap();
        assert_eq!(report.split_points, 2);
        assert_eq!(report.vertices_merged, 2);
        assert_eq!(report.edges_merged, 1);
        assert_eq!(report.faces, 3);
        assert!(drape.graph().is_valid());

        assert_eq!(drape.drape_xy(1.0, 0.5), Some(1.0));
        assert_eq!(drape.drape_xy(2.25, 0.5), Some(2.0));
        assert_eq!(drape.drape_xy(2.25, 0.9), None);
    }

    #[test]
    fn test_partially_overlapping_collinear_edges() {
        let mut drape = DrapeGraph::new();
        drape.add_polygon(&square(0.0, 0.0, 2.0, 1.0), VuMask::EXTERIOR).unwrap();
        let shifted = vec![
            Point3::new(1.0, 0.0, 4.0),
            Point3::new(3.0, 0.0, 4.0),
            Point3::new(3.0, 2.0, 4.0),
            Point3::new(1.0, 2.0, 4.0),
        ];
        drape.add_polygon(&shifted, VuMask::EXTERIOR).unwrap();
        let report = drape.do_analysis(0.0, 10.0, 1e-9).unwrap();
        assert_eq!(report.split_points, 4);
        assert_eq!(report.edges_merged, 2);
        assert_eq!(report.faces, 4);
        assert_eq!(drape.drape_xy(0.5, 1.0), Some(1.0));
        assert_eq!(drape.drape_xy(1.5, 1.0), Some(4.0));
        assert_eq!(drape.drape_xy(2.5, 1.0), Some(4.0));
    }

    #[test]
    fn test_failed_polygon_keeps_indices_aligned() {
        let mut drape = DrapeGraph::new();
        let steep = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1e-12, 1.0),
            Point3::new(0.0, 1e-12, 1.0),
        ];
        assert!(matches!(
            drape.add_polygon(&steep, VuMask::EXTERIOR),
            Err(VuError::DegenerateNormal { .. })
        ));
        assert_eq!(drape.graph().num_nodes(), 0);
        let index = drape.add_polygon(&square(0.0, 0.0, 1.0, 1.0), VuMask::EXTERIOR).unwrap();
        assert_eq!(index, 0);
        assert_eq!(drape.num_polygons(), 1);
        assert_eq!(drape.planes().len(), 1);
    }

    #[test]
    fn test_vertical_shift() {
        let mut drape = DrapeGraph::new();
        let polygons = vec![square(0.0, 0.0, 1.0, 0.0), square(2.0, 0.0, 1.0, 0.0)];
        let indices = drape.add_polygons(&polygons, VuMask::EXTERIOR, 0.5).unwrap();
        assert_eq!(indices, vec![0, 1]);
        let diagonal = (9.0f64 + 1.0).sqrt();
        drape.do_analysis(-10.0, 10.0, 1e-9).unwrap();
        assert_eq!(drape.drape_xy(0.5, 0.5), Some(0.0));
        let z = drape.drape_xy(2.5, 0.5).unwrap();
        assert!((z - 0.5 * diagonal).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_inputs() {
        let mut drape = DrapeGraph::new();
        let line = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
        assert!(matches!(
            drape.add_polygon(&line, VuMask::EXTERIOR),
            Err(VuError::InvalidPolygon(_))
        ));
        assert!(drape.add_polygon(&square(0.0, 0.0, 1.0, 0.0), VuMask::NONE).is_err());
        assert!(drape.do_analysis(1.0, 0.0, 0.0).is_err());
        assert!(drape.do_analysis(0.0, 1.0, -1.0).is_err());
    }

    #[test]
    fn test_edge_crossing_update() {
        let mut set = BTreeSet::new();
        assert!(update_active_planes_for_edge_crossing(&mut set, 3, true));
        assert!(!update_active_planes_for_edge_crossing(&mut set, 3, true));
        assert!(update_active_planes_for_edge_crossing(&mut set, 3, false));
        assert!(!update_active_planes_for_edge_crossing(&mut set, 3, false));
        assert!(set.is_empty());
    }

    #[test]
    fn test_edge_crossings_combine() {
        let cross = |plane, entering| EdgeCrossing { plane, entering };
        let mut set = BTreeSet::from([0]);
        assert!(update_active_planes_for_edge_crossings(
            &mut set,
            &[cross(0, false), cross(1, true)]
        ));
        assert_eq!(set, BTreeSet::from([1]));
        assert!(update_active_planes_for_edge_crossings(
            &mut set,
            &[cross(2, true), cross(2, false)]
        ));
        assert_eq!(set, BTreeSet::from([1]));
        assert!(!update_active_planes_for_edge_crossings(
            &mut set,
            &[cross(3, true), cross(3, true)]
        ));
    }

    #[test]
    fn test_collinear_params() {
        let p = |x, y| Point3::new(x, y, 0.0);
        let params = collinear_params_xy(&p(0.0, 0.0), &p(2.0, 0.0), &p(1.0, 0.0), &p(3.0, 0.0));
        assert_eq!(params, Some([0.5, 1.5]));
        assert!(collinear_params_xy(&p(0.0, 0.0), &p(2.0, 0.0), &p(1.0, 0.1), &p(3.0, 0.1)).is_none());
    }
}
