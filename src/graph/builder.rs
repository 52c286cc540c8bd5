//! Graph construction utilities.
//!
//! Functions for building a [`VuGraph`] from triangle lists and polygon
//! loops, and for extracting triangles back out of a graph.

use std::collections::HashMap;

use nalgebra::Point3;

use super::index::{NodeId, VuIndex};
use super::mask::VuMask;
use super::vugraph::VuGraph;
use crate::error::{Result, VuError};

/// Build a graph from points and triangles.
///
/// Triangles may be given in either winding; clockwise ones are reversed so
/// every triangle becomes a counter-clockwise face. Nodes on the outer side
/// of boundary edges are marked `EXTERIOR`, and both sides of a boundary
/// edge are marked `BOUNDARY`. Every node carries the index of its point in
/// `user_int`.
///
/// # Example
/// ```
/// use vugraph::graph::{build_from_triangles, VuGraph};
/// use nalgebra::Point3;
///
/// let points = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
/// let graph: VuGraph = build_from_triangles(&points, &[[0, 1, 2]]).unwrap();
/// assert_eq!(graph.num_edges(), 3);
/// ```
pub fn build_from_triangles<I: VuIndex>(
    points: &[Point3<f64>],
    triangles: &[[usize; 3]],
) -> Result<VuGraph<I>> {
    if triangles.is_empty() {
        return Err(VuError::EmptyInput);
    }

    let mut oriented = Vec::with_capacity(triangles.len());
    for (fi, tri) in triangles.iter().enumerate() {
        for &vi in tri {
            if vi >= points.len() {
                return Err(VuError::InvalidVertexIndex {
                    face: fi,
                    vertex: vi,
                });
            }
        }
        if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
            return Err(VuError::DegenerateFace { face: fi });
        }
        let area = signed_area_xy(&points[tri[0]], &points[tri[1]], &points[tri[2]]);
        if area == 0.0 {
            return Err(VuError::DegenerateFace { face: fi });
        }
        if area > 0.0 {
            oriented.push(*tri);
        } else {
            oriented.push([tri[0], tri[2], tri[1]]);
        }
    }

    let mut graph = VuGraph::with_capacity(3 * triangles.len());

    // Directed edge (v0, v1) -> node at v0 on the triangle side.
    let mut edge_map: HashMap<(usize, usize), NodeId<I>> = HashMap::new();
    for tri in &oriented {
        for k in 0..3 {
            let (v0, v1) = (tri[k], tri[(k + 1) % 3]);
            if edge_map.contains_key(&(v0, v1)) {
                return Err(VuError::NonManifoldEdge { v0, v1 });
            }
            let n = graph.create_node(points[v0])?;
            graph.set_user_int(n, v0 as i64);
            edge_map.insert((v0, v1), n);
        }
    }

    let mut outgoing: Vec<Vec<NodeId<I>>> = vec![Vec::new(); points.len()];
    let mut keys: Vec<_> = edge_map.keys().copied().collect();
    keys.sort_unstable();
    for (v0, v1) in keys {
        let n = edge_map[&(v0, v1)];
        outgoing[v0].push(n);
        match edge_map.get(&(v1, v0)) {
            Some(&m) => {
                if v0 < v1 {
                    graph.join(n, m);
                }
            }
            None => {
                let b = graph.create_node(points[v1])?;
                graph.set_user_int(b, v1 as i64);
                graph.join(n, b);
                graph.set_mask(n, VuMask::BOUNDARY);
                graph.set_mask(b, VuMask::BOUNDARY | VuMask::EXTERIOR);
                outgoing[v1].push(b);
            }
        }
    }

    for nodes in outgoing.iter_mut().filter(|nodes| !nodes.is_empty()) {
        link_vertex_by_angle(&mut graph, nodes);
    }

    Ok(graph)
}

/// Relink the given nodes into one counter-clockwise vertex loop.
///
/// The nodes must all sit at the same point and together make up every node
/// of the loops being relinked. They are ordered by the xy direction of
/// their edges.
pub fn link_vertex_by_angle<I: VuIndex>(graph: &mut VuGraph<I>, nodes: &mut [NodeId<I>]) {
    if nodes.is_empty() {
        return;
    }
    let angle = |g: &VuGraph<I>, n: NodeId<I>| {
        let p = g.xyz(n);
        let q = g.xyz(g.mate(n));
        (q.y - p.y).atan2(q.x - p.x)
    };
    nodes.sort_by(|&a, &b| angle(graph, a).total_cmp(&angle(graph, b)));

    let count = nodes.len();
    for k in 0..count {
        let n = nodes[k];
        let next = nodes[(k + 1) % count];
        graph.node_mut(n).vsucc = next;
        graph.node_mut(next).vpred = n;
    }
}

/// Insert a closed polygon as an isolated loop of edges.
///
/// `points` must not repeat the first point at the end. Returns
/// `(inside, outside)`: a node on the face to the left of the polygon
/// direction, and its mate. For a counter-clockwise polygon the inside
/// face has positive area.
pub fn add_polygon_loop<I: VuIndex>(
    graph: &mut VuGraph<I>,
    points: &[Point3<f64>],
) -> Result<(NodeId<I>, NodeId<I>)> {
    if points.len() < 3 {
        return Err(VuError::InvalidPolygon(format!(
            "polygon needs at least 3 points, got {}",
            points.len()
        )));
    }
    let count = points.len();
    let mut inside = Vec::with_capacity(count);
    let mut outside = Vec::with_capacity(count);
    for k in 0..count {
        let (a, b) = graph.make_pair(points[k], points[(k + 1) % count])?;
        inside.push(a);
        outside.push(b);
    }
    for k in 0..count {
        graph.vertex_twist(outside[k], inside[(k + 1) % count]);
    }
    Ok((inside[0], outside[0]))
}

/// Extract the bounded triangles of a graph.
///
/// Faces with three nodes and positive area become triangles, unless any of
/// their nodes carries a bit of `skip_mask`. Returns the vertex positions
/// (one per vertex loop) and the triangle index list.
pub fn to_triangles<I: VuIndex>(
    graph: &VuGraph<I>,
    skip_mask: VuMask,
) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let mut vertex_of = vec![usize::MAX; graph.arena_len()];
    let mut points = Vec::new();
    for seed in graph.collect_vertex_seeds() {
        for n in graph.vertex_loop(seed) {
            vertex_of[n.index()] = points.len();
        }
        points.push(*graph.xyz(seed));
    }

    let triangles = graph
        .collect_face_seeds()
        .into_iter()
        .filter(|&seed| {
            graph.face_node_count(seed) == 3
                && graph.face_area(seed) > 0.0
                && graph.find_mask_around_face(seed, skip_mask).is_none()
        })
        .map(|seed| {
            let a = seed;
            let b = graph.fsucc(a);
            let c = graph.fsucc(b);
            [vertex_of[a.index()], vertex_of[b.index()], vertex_of[c.index()]]
        })
        .collect();

    (points, triangles)
}

/// Extract the chains of nodes carrying `mask` as polylines.
///
/// A chain follows face successors while they carry the mask, and each node
/// contributes its edge. A chain that runs all the way round its face comes
/// back as a closed polyline whose last point repeats the first.
pub fn to_polylines<I: VuIndex>(graph: &VuGraph<I>, mask: VuMask) -> Vec<Vec<Point3<f64>>> {
    let mut visited = vec![false; graph.arena_len()];
    let mut polylines = Vec::new();
    for n in graph.node_ids() {
        if visited[n.index()] || !graph.has_mask(n, mask) {
            continue;
        }
        let mut start = n;
        loop {
            let prev = graph.fpred(start);
            if prev == n || visited[prev.index()] || !graph.has_mask(prev, mask) {
                break;
            }
            start = prev;
        }

        let mut points = vec![*graph.xyz(start)];
        let mut current = start;
        loop {
            visited[current.index()] = true;
            points.push(*graph.xyz(graph.fsucc(current)));
            let next = graph.fsucc(current);
            if next == start || visited[next.index()] || !graph.has_mask(next, mask) {
                break;
            }
            current = next;
        }
        polylines.push(points);
    }
    polylines
}

fn signed_area_xy(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    0.5 * ((b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x))
}
