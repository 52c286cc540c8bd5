//! Ear-clipping triangulation of graph faces.
//!
//! Faces are cut into triangles in place with [`VuGraph::insert_edge`], so
//! masks and tags on the original nodes are preserved and the new edges can
//! be told apart with a caller-chosen mask.

use log::trace;
use nalgebra::Point3;

use crate::error::{Result, VuError};
use crate::graph::{NodeId, VuGraph, VuIndex, VuMask};

/// Triangulate one counter-clockwise, simple face.
///
/// Every added edge gets `rule_mask` on both sides. Returns the number of
/// edges added. Faces with three or fewer nodes are left alone.
pub fn triangulate_face<I: VuIndex>(
    graph: &mut VuGraph<I>,
    seed: NodeId<I>,
    rule_mask: VuMask,
) -> Result<usize> {
    if graph.face_area(seed) <= 0.0 {
        return Err(VuError::DegenerateGeometry(format!(
            "face at node {} is not counter-clockwise",
            seed.index()
        )));
    }

    let mut current = seed;
    let mut added = 0;
    while graph.face_node_count(current) > 3 {
        let ear = find_ear(graph, current).ok_or_else(|| {
            VuError::DegenerateGeometry(format!(
                "no ear found in face at node {}",
                current.index()
            ))
        })?;
        let a = graph.fpred(ear);
        let c = graph.fsucc(ear);
        let (na, _) = graph.insert_edge(a, c)?;
        graph.set_mask_around_edge(na, rule_mask);
        added += 1;
        current = c;
    }
    trace!("triangulated face with {} new edges", added);
    Ok(added)
}

/// Triangulate every positive-area face with no node carrying `skip_mask`.
///
/// Returns the number of edges added.
pub fn triangulate_faces<I: VuIndex>(
    graph: &mut VuGraph<I>,
    skip_mask: VuMask,
    rule_mask: VuMask,
) -> Result<usize> {
    let seeds: Vec<_> = graph
        .collect_face_seeds()
        .into_iter()
        .filter(|&seed| {
            graph.face_node_count(seed) > 3
                && graph.face_area(seed) > 0.0
                && graph.find_mask_around_face(seed, skip_mask).is_none()
        })
        .collect();
    let mut added = 0;
    for seed in seeds {
        added += triangulate_face(graph, seed, rule_mask)?;
    }
    Ok(added)
}

/// A convex corner whose triangle holds no other vertex of the face.
fn find_ear<I: VuIndex>(graph: &VuGraph<I>, seed: NodeId<I>) -> Option<NodeId<I>> {
    let coords = graph.face_coordinates(seed);
    graph.face_loop(seed).find(|&b| {
        let a = graph.fpred(b);
        let c = graph.fsucc(b);
        if graph.cross_xy(a, b, c) <= 0.0 {
            return false;
        }
        let (pa, pb, pc) = (graph.xyz(a), graph.xyz(b), graph.xyz(c));
        !coords
            .iter()
            .filter(|q| !same_xy(q, pa) && !same_xy(q, pb) && !same_xy(q, pc))
            .any(|q| in_triangle_xy(q, pa, pb, pc))
    })
}

fn same_xy(p: &Point3<f64>, q: &Point3<f64>) -> bool {
    p.x == q.x && p.y == q.y
}

fn in_triangle_xy(q: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> bool {
    let side = |p0: &Point3<f64>, p1: &Point3<f64>| {
        (p1.x - p0.x) * (q.y - p0.y) - (p1.y - p0.y) * (q.x - p0.x)
    };
    side(a, b) >= 0.0 && side(b, c) >= 0.0 && side(c, a) >= 0.0
}
