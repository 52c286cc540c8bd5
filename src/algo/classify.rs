//! Face and edge classification with masks.
//!
//! These passes tag nodes with caller-chosen masks and optionally delete
//! what they found. The workhorse is [`delete_dangling_edges`], which strips
//! trees of edges that hang into faces without bounding anything.
//!
//! # Example
//!
//! ```
//! use vugraph::prelude::*;
//! use vugraph::algo::classify::delete_dangling_edges;
//! use nalgebra::Point3;
//!
//! let mut graph: VuGraph = VuGraph::new();
//! graph.make_pair(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)).unwrap();
//!
//! let stats = delete_dangling_edges(&mut graph).unwrap();
//! assert_eq!(stats.edges_deleted, 1);
//! assert_eq!(graph.num_edges(), 0);
//! ```

use log::debug;

use crate::error::Result;
use crate::graph::{NodeId, VuGraph, VuIndex, VuMask};

/// Counters from [`delete_dangling_edges`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DanglerStats {
    /// Faces with at most two edges.
    pub small_faces: usize,
    /// Edges classified as dangling.
    pub danglers: usize,
    /// Edges removed from the graph.
    pub edges_deleted: usize,
}

/// Set `mask` on every node of each face with at most `max_edge_count` edges.
///
/// Returns the number of faces marked.
pub fn mark_small_faces<I: VuIndex>(
    graph: &mut VuGraph<I>,
    max_edge_count: usize,
    mask: VuMask,
) -> Result<usize> {
    graph.with_mask(|graph, visited| {
        let mut marked = 0;
        let seeds: Vec<_> = graph.node_ids().collect();
        for seed in seeds {
            if graph.has_mask(seed, visited) {
                continue;
            }
            graph.set_mask_around_face(seed, visited);
            if graph.face_node_count(seed) <= max_edge_count {
                graph.set_mask_around_face(seed, mask);
                marked += 1;
            }
        }
        Ok(marked)
    })
}

/// Set `mask` on every node of each face with negative (clockwise) area.
///
/// Returns the number of faces marked.
pub fn mark_negative_area_faces<I: VuIndex>(graph: &mut VuGraph<I>, mask: VuMask) -> usize {
    let seeds: Vec<_> = graph
        .collect_face_seeds()
        .into_iter()
        .filter(|&seed| graph.face_area(seed) < 0.0)
        .collect();
    for &seed in &seeds {
        graph.set_mask_around_face(seed, mask);
    }
    seeds.len()
}

/// Number of nodes around the vertex carrying none of the bits of `mask`.
pub fn count_unmasked_around_vertex<I: VuIndex>(
    graph: &VuGraph<I>,
    seed: NodeId<I>,
    mask: VuMask,
) -> usize {
    graph
        .vertex_loop(seed)
        .filter(|&n| !graph.has_mask(n, mask))
        .count()
}

/// True if exactly one node around the vertex is free of `mask`.
pub fn is_singleton_vertex<I: VuIndex>(graph: &VuGraph<I>, seed: NodeId<I>, mask: VuMask) -> bool {
    count_unmasked_around_vertex(graph, seed, mask) == 1
}

/// Set `dangler_mask` on both sides of every dangling edge.
///
/// Starting at each vertex with exactly one edge free of both masks, the
/// chain of edges is followed while the far vertex is again such a
/// singleton. Nodes of `null_face_mask` faces sitting at a singleton vertex
/// are swept up with it. An edge that is its own face (an isolated edge) is
/// always dangling.
///
/// Returns the number of edges newly marked.
pub fn mark_dangling_edges<I: VuIndex>(
    graph: &mut VuGraph<I>,
    null_face_mask: VuMask,
    dangler_mask: VuMask,
) -> Result<usize> {
    let skip = null_face_mask | dangler_mask;
    let mut marked = 0;

    let nodes: Vec<_> = graph.node_ids().collect();
    for &n in &nodes {
        let m = graph.mate(n);
        if !graph.has_mask(n, dangler_mask) && graph.fsucc(n) == m && graph.fsucc(m) == n {
            graph.set_mask_around_edge(n, dangler_mask);
            marked += 1;
        }
    }

    for seed in graph.collect_vertex_seeds() {
        let mut vertex = seed;
        while let Some(start) = singleton_node(graph, vertex, skip) {
            let hugging: Vec<_> = graph
                .vertex_loop(vertex)
                .filter(|&n| graph.has_mask(n, null_face_mask) && !graph.has_mask(n, dangler_mask))
                .collect();
            for n in hugging {
                graph.set_mask_around_edge(n, dangler_mask);
            }
            graph.set_mask_around_edge(start, dangler_mask);
            marked += 1;
            vertex = graph.mate(start);
        }
    }

    debug!("marked {} dangling edges", marked);
    Ok(marked)
}

fn singleton_node<I: VuIndex>(
    graph: &VuGraph<I>,
    vertex: NodeId<I>,
    skip: VuMask,
) -> Option<NodeId<I>> {
    let mut free = graph.vertex_loop(vertex).filter(|&n| !graph.has_mask(n, skip));
    let first = free.next()?;
    match free.next() {
        None => Some(first),
        Some(_) => None,
    }
}

/// Delete every edge with a node carrying `mask`.
///
/// Returns the number of edges deleted.
pub fn delete_edges_with_mask<I: VuIndex>(graph: &mut VuGraph<I>, mask: VuMask) -> Result<usize> {
    let doomed: Vec<_> = graph
        .node_ids()
        .filter(|&n| graph.has_mask(n, mask))
        .collect();
    let mut deleted = 0;
    for n in doomed {
        if graph.is_live(n) {
            graph.delete_edge(n)?;
            deleted += 1;
        }
    }
    Ok(deleted)
}

/// Mark faces of at most two edges as null faces, then find and delete all
/// dangling edges.
///
/// Running it a second time removes nothing.
pub fn delete_dangling_edges<I: VuIndex>(graph: &mut VuGraph<I>) -> Result<DanglerStats> {
    graph.with_mask(|graph, null_face| {
        let small_faces = mark_small_faces(graph, 2, null_face)?;
        graph.with_mask(|graph, dangler| {
            let danglers = mark_dangling_edges(graph, null_face, dangler)?;
            let edges_deleted = delete_edges_with_mask(graph, dangler)?;
            debug!(
                "dangling edge pass: {} small faces, {} danglers, {} edges deleted",
                small_faces, danglers, edges_deleted
            );
            Ok(DanglerStats {
                small_faces,
                danglers,
                edges_deleted,
            })
        })
    })
}
