//! Half-edge ("vertex use") graph store.
//!
//! A [`VuGraph`] is an arena of [`VuNode`]s. Each node is one end of one side
//! of an edge: it sits at a vertex, belongs to exactly one face loop and one
//! vertex loop, and has exactly one edge mate at the far end of its edge on
//! the other side.
//!
//! # Links
//!
//! Only the vertex loop (`vsucc`/`vpred`) and the mate are stored. Face links
//! are derived:
//!
//! - `fsucc(n) = vpred(mate(n))`
//! - `fpred(n) = mate(vsucc(n))`
//!
//! so `mate(n) == vsucc(fsucc(n))` holds by construction. Vertex loops run
//! counter-clockwise, which makes bounded faces counter-clockwise (positive
//! xy area) and the outer face of each component clockwise.
//!
//! Every mutation is expressed with the vertex-loop splice
//! ([`VuGraph::vertex_twist`]), which keeps both cyclic invariants intact.

use nalgebra::{Point3, Vector3};

use super::index::{NodeId, VuIndex};
use super::mask::{MaskPool, VuMask};
use crate::error::{Result, VuError};

/// A node of the graph.
#[derive(Debug, Clone)]
pub struct VuNode<I: VuIndex = u32> {
    /// Coordinates of the vertex this node sits at.
    pub xyz: Point3<f64>,

    /// Mask bits.
    pub mask: VuMask,

    /// Integer user tag.
    pub user_int: i64,

    /// Double user tag.
    pub user_double: f64,

    pub(crate) vsucc: NodeId<I>,
    pub(crate) vpred: NodeId<I>,
    pub(crate) mate: NodeId<I>,
    pub(crate) live: bool,
}

impl<I: VuIndex> VuNode<I> {
    fn new(xyz: Point3<f64>) -> Self {
        Self {
            xyz,
            mask: VuMask::NONE,
            user_int: 0,
            user_double: 0.0,
            vsucc: NodeId::invalid(),
            vpred: NodeId::invalid(),
            mate: NodeId::invalid(),
            live: true,
        }
    }
}

/// Planar half-edge graph.
#[derive(Debug, Clone)]
pub struct VuGraph<I: VuIndex = u32> {
    pub(crate) nodes: Vec<VuNode<I>>,
    free: Vec<NodeId<I>>,
    masks: MaskPool,
}

impl<I: VuIndex> Default for VuGraph<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: VuIndex> VuGraph<I> {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            masks: MaskPool::new(),
        }
    }

    /// Create a graph with room for `num_edges` edges.
    pub fn with_capacity(num_edges: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(2 * num_edges),
            free: Vec::new(),
            masks: MaskPool::new(),
        }
    }

    // ==================== Accessors ====================

    /// Number of live nodes.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Number of live edges (pairs of mated nodes).
    pub fn num_edges(&self) -> usize {
        self.node_ids().filter(|&n| self.mate(n).is_valid()).count() / 2
    }

    /// Length of the node arena, including recycled slots.
    #[inline]
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    /// Get a node by ID.
    #[inline]
    pub fn node(&self, id: NodeId<I>) -> &VuNode<I> {
        &self.nodes[id.index()]
    }

    /// Get a mutable node by ID.
    #[inline]
    pub fn node_mut(&mut self, id: NodeId<I>) -> &mut VuNode<I> {
        &mut self.nodes[id.index()]
    }

    /// True if the handle refers to a live node.
    #[inline]
    pub fn is_live(&self, id: NodeId<I>) -> bool {
        id.is_valid() && id.index() < self.nodes.len() && self.nodes[id.index()].live
    }

    /// Coordinates of a node.
    #[inline]
    pub fn xyz(&self, id: NodeId<I>) -> &Point3<f64> {
        &self.node(id).xyz
    }

    /// Set the coordinates of a single node.
    #[inline]
    pub fn set_xyz(&mut self, id: NodeId<I>, xyz: Point3<f64>) {
        self.node_mut(id).xyz = xyz;
    }

    /// Mask bits of a node.
    #[inline]
    pub fn mask(&self, id: NodeId<I>) -> VuMask {
        self.node(id).mask
    }

    /// True if any bit of `mask` is set on the node.
    #[inline]
    pub fn has_mask(&self, id: NodeId<I>, mask: VuMask) -> bool {
        self.node(id).mask.intersects(mask)
    }

    /// Set mask bits on a node.
    #[inline]
    pub fn set_mask(&mut self, id: NodeId<I>, mask: VuMask) {
        self.node_mut(id).mask |= mask;
    }

    /// Clear mask bits on a node.
    #[inline]
    pub fn clear_mask(&mut self, id: NodeId<I>, mask: VuMask) {
        let node = self.node_mut(id);
        node.mask = node.mask & !mask;
    }

    /// Integer user tag of a node.
    #[inline]
    pub fn user_int(&self, id: NodeId<I>) -> i64 {
        self.node(id).user_int
    }

    /// Set the integer user tag of a node.
    #[inline]
    pub fn set_user_int(&mut self, id: NodeId<I>, value: i64) {
        self.node_mut(id).user_int = value;
    }

    /// Double user tag of a node.
    #[inline]
    pub fn user_double(&self, id: NodeId<I>) -> f64 {
        self.node(id).user_double
    }

    /// Set the double user tag of a node.
    #[inline]
    pub fn set_user_double(&mut self, id: NodeId<I>, value: f64) {
        self.node_mut(id).user_double = value;
    }

    // ==================== Topology Queries ====================

    /// Next node counter-clockwise around the vertex.
    #[inline]
    pub fn vsucc(&self, n: NodeId<I>) -> NodeId<I> {
        self.node(n).vsucc
    }

    /// Previous node around the vertex.
    #[inline]
    pub fn vpred(&self, n: NodeId<I>) -> NodeId<I> {
        self.node(n).vpred
    }

    /// Node at the far end of the edge, on the other side.
    #[inline]
    pub fn mate(&self, n: NodeId<I>) -> NodeId<I> {
        self.node(n).mate
    }

    /// Next node around the face.
    #[inline]
    pub fn fsucc(&self, n: NodeId<I>) -> NodeId<I> {
        self.vpred(self.mate(n))
    }

    /// Previous node around the face.
    #[inline]
    pub fn fpred(&self, n: NodeId<I>) -> NodeId<I> {
        self.mate(self.vsucc(n))
    }

    /// Mate of `n`, checking that `n` belongs to a live edge.
    pub fn checked_mate(&self, n: NodeId<I>) -> Result<NodeId<I>> {
        if !self.is_live(n) {
            return Err(VuError::NotAnEdge { node: n.index() });
        }
        let m = self.mate(n);
        if !self.is_live(m) || self.mate(m) != n {
            return Err(VuError::NotAnEdge { node: n.index() });
        }
        Ok(m)
    }

    /// True if `a` and `b` are in the same vertex loop.
    pub fn same_vertex(&self, a: NodeId<I>, b: NodeId<I>) -> bool {
        self.vertex_loop(a).any(|n| n == b)
    }

    /// Number of nodes around the face.
    pub fn face_node_count(&self, seed: NodeId<I>) -> usize {
        self.face_loop(seed).count()
    }

    /// Number of nodes around the vertex (its degree).
    pub fn vertex_degree(&self, seed: NodeId<I>) -> usize {
        self.vertex_loop(seed).count()
    }

    // ==================== Iteration ====================

    /// Iterate over all live node IDs.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId<I>> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.live)
            .map(|(i, _)| NodeId::new(i))
    }

    /// Iterate over the nodes around a vertex, starting at `seed`.
    pub fn vertex_loop(&self, seed: NodeId<I>) -> LoopIter<'_, I> {
        LoopIter::new(self, seed, LoopKind::Vertex)
    }

    /// Iterate over the nodes around a face, starting at `seed`.
    pub fn face_loop(&self, seed: NodeId<I>) -> LoopIter<'_, I> {
        LoopIter::new(self, seed, LoopKind::Face)
    }

    /// One node per face.
    pub fn collect_face_seeds(&self) -> Vec<NodeId<I>> {
        let mut visited = vec![false; self.nodes.len()];
        let mut seeds = Vec::new();
        for n in self.node_ids() {
            if visited[n.index()] {
                continue;
            }
            seeds.push(n);
            for m in self.face_loop(n) {
                visited[m.index()] = true;
            }
        }
        seeds
    }

    /// One node per vertex.
    pub fn collect_vertex_seeds(&self) -> Vec<NodeId<I>> {
        let mut visited = vec![false; self.nodes.len()];
        let mut seeds = Vec::new();
        for n in self.node_ids() {
            if visited[n.index()] {
                continue;
            }
            seeds.push(n);
            for m in self.vertex_loop(n) {
                visited[m.index()] = true;
            }
        }
        seeds
    }

    // ==================== Construction ====================

    /// Allocate a new, unjoined node.
    pub fn create_node(&mut self, xyz: Point3<f64>) -> Result<NodeId<I>> {
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id.index()] = VuNode::new(xyz);
                id
            }
            None => {
                if self.nodes.len() >= I::capacity() {
                    return Err(VuError::OutOfNodes {
                        capacity: I::capacity(),
                    });
                }
                let id = NodeId::new(self.nodes.len());
                self.nodes.push(VuNode::new(xyz));
                id
            }
        };
        let node = self.node_mut(id);
        node.vsucc = id;
        node.vpred = id;
        Ok(id)
    }

    /// Make `a` and `b` edge mates.
    ///
    /// # Panics
    /// Panics if either node already has a mate, or `a == b`.
    pub fn join(&mut self, a: NodeId<I>, b: NodeId<I>) {
        assert!(a != b, "join: a node cannot be its own mate");
        assert!(
            !self.mate(a).is_valid() && !self.mate(b).is_valid(),
            "join: mate must be unset ({:?}, {:?})",
            a,
            b
        );
        self.node_mut(a).mate = b;
        self.node_mut(b).mate = a;
    }

    /// Create an isolated edge from `xyz_a` to `xyz_b`.
    ///
    /// Returns `(a, b)` with `a` at `xyz_a`. The two nodes form a two-node
    /// face loop.
    pub fn make_pair(
        &mut self,
        xyz_a: Point3<f64>,
        xyz_b: Point3<f64>,
    ) -> Result<(NodeId<I>, NodeId<I>)> {
        let a = self.create_node(xyz_a)?;
        let b = self.create_node(xyz_b)?;
        self.join(a, b);
        Ok((a, b))
    }

    /// Swap the vertex successors of `a` and `b`.
    ///
    /// Merges two vertex loops into one, or splits one loop in two.
    pub fn vertex_twist(&mut self, a: NodeId<I>, b: NodeId<I>) {
        if a == b {
            return;
        }
        let a_next = self.vsucc(a);
        let b_next = self.vsucc(b);
        self.node_mut(a).vsucc = b_next;
        self.node_mut(b_next).vpred = a;
        self.node_mut(b).vsucc = a_next;
        self.node_mut(a_next).vpred = b;
    }

    /// Swap the face successors of `a` and `b`.
    pub fn face_twist(&mut self, a: NodeId<I>, b: NodeId<I>) {
        let fa = self.fsucc(a);
        let fb = self.fsucc(b);
        self.vertex_twist(fa, fb);
    }

    /// Add an edge from the vertex of `a` to the vertex of `b`.
    ///
    /// When `a` and `b` are in the same face the face is split: the face
    /// through `a` keeps the nodes from `a` up to the one before `b` and the
    /// returned `nb`; the other face holds `b`, ..., and `na`. When they are in
    /// different faces the faces are bridged.
    ///
    /// Returns `(na, nb)`, with `na` at the vertex of `a`.
    pub fn insert_edge(&mut self, a: NodeId<I>, b: NodeId<I>) -> Result<(NodeId<I>, NodeId<I>)> {
        let (na, nb) = self.make_pair(*self.xyz(a), *self.xyz(b))?;
        self.vertex_twist(a, na);
        self.vertex_twist(b, nb);
        Ok((na, nb))
    }

    /// Insert a vertex at `xyz` on the edge of `a`.
    ///
    /// Returns `(forward, backward)`: `forward` is the new node on `a`'s side
    /// (so `fsucc(a) == forward`), `backward` the new node on the mate's side.
    /// Each inherits the mask and tags of the side it lies on.
    pub fn split_edge(
        &mut self,
        a: NodeId<I>,
        xyz: Point3<f64>,
    ) -> Result<(NodeId<I>, NodeId<I>)> {
        let m = self.checked_mate(a)?;
        let backward = self.create_node(xyz)?;
        let forward = self.create_node(xyz)?;
        self.copy_attributes(m, backward);
        self.copy_attributes(a, forward);

        self.node_mut(a).mate = backward;
        self.node_mut(backward).mate = a;
        self.node_mut(m).mate = forward;
        self.node_mut(forward).mate = m;
        self.vertex_twist(backward, forward);
        Ok((forward, backward))
    }

    fn copy_attributes(&mut self, from: NodeId<I>, to: NodeId<I>) {
        let (mask, user_int, user_double) = {
            let n = self.node(from);
            (n.mask, n.user_int, n.user_double)
        };
        let n = self.node_mut(to);
        n.mask = mask;
        n.user_int = user_int;
        n.user_double = user_double;
    }

    /// Remove the edge of `a` (both `a` and its mate).
    ///
    /// The vertex loops at both ends are spliced closed, which merges the
    /// faces on the two sides of the edge.
    pub fn delete_edge(&mut self, a: NodeId<I>) -> Result<()> {
        let m = self.checked_mate(a)?;
        self.detach_from_vertex(a);
        self.detach_from_vertex(m);
        self.release_node(a);
        self.release_node(m);
        Ok(())
    }

    fn detach_from_vertex(&mut self, n: NodeId<I>) {
        let p = self.vpred(n);
        if p != n {
            self.vertex_twist(p, n);
        }
    }

    fn release_node(&mut self, n: NodeId<I>) {
        let node = self.node_mut(n);
        node.live = false;
        node.mate = NodeId::invalid();
        node.mask = VuMask::NONE;
        self.free.push(n);
    }

    /// Flip the diagonal of the quadrilateral formed by the two triangles
    /// adjacent to the edge of `a`.
    ///
    /// The edge keeps its nodes (and their masks and tags). Returns `false`,
    /// leaving the graph untouched, when either adjacent face is not a
    /// triangle or the opposite corners are the same vertex. Geometric
    /// validity (convexity) is the caller's concern.
    pub fn flip_edge(&mut self, a: NodeId<I>) -> bool {
        let Ok(m) = self.checked_mate(a) else {
            return false;
        };
        if self.face_node_count(a) != 3 || self.face_node_count(m) != 3 {
            return false;
        }
        let c = self.fsucc(self.fsucc(a));
        let d = self.fsucc(self.fsucc(m));
        if self.same_vertex(c, d) || self.same_vertex(a, m) {
            return false;
        }

        let xyz_c = *self.xyz(c);
        let xyz_d = *self.xyz(d);
        self.detach_from_vertex(a);
        self.detach_from_vertex(m);
        self.set_xyz(a, xyz_c);
        self.set_xyz(m, xyz_d);
        self.vertex_twist(c, a);
        self.vertex_twist(d, m);
        true
    }

    // ==================== Masks ====================

    /// Take a mask from the pool. The bit is cleared on every node.
    pub fn grab_mask(&mut self) -> Result<VuMask> {
        let mask = self.masks.grab().ok_or(VuError::OutOfMasks)?;
        self.clear_mask_in_set(mask);
        Ok(mask)
    }

    /// Return a mask to the pool.
    ///
    /// # Panics
    /// Panics if the mask was not grabbed from this pool.
    pub fn return_mask(&mut self, mask: VuMask) {
        self.masks.release(mask);
    }

    /// Number of masks still available in the pool.
    pub fn free_mask_count(&self) -> usize {
        self.masks.free_count()
    }

    /// Total number of masks in the pool.
    pub fn mask_pool_capacity(&self) -> usize {
        MaskPool::capacity()
    }

    /// Run `f` with a scratch mask, clearing and returning it afterwards.
    ///
    /// The mask is returned whether `f` succeeds or fails.
    pub fn with_mask<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self, VuMask) -> Result<T>,
    {
        let mask = self.grab_mask()?;
        let result = f(self, mask);
        self.clear_mask_in_set(mask);
        self.return_mask(mask);
        result
    }

    /// Clear mask bits on every node.
    pub fn clear_mask_in_set(&mut self, mask: VuMask) {
        for node in &mut self.nodes {
            node.mask = node.mask & !mask;
        }
    }

    /// Set mask bits on every live node.
    pub fn set_mask_in_set(&mut self, mask: VuMask) {
        for node in self.nodes.iter_mut().filter(|n| n.live) {
            node.mask |= mask;
        }
    }

    /// Set mask bits on every node of the face.
    pub fn set_mask_around_face(&mut self, seed: NodeId<I>, mask: VuMask) {
        let nodes: Vec<_> = self.face_loop(seed).collect();
        for n in nodes {
            self.set_mask(n, mask);
        }
    }

    /// Clear mask bits on every node of the face.
    pub fn clear_mask_around_face(&mut self, seed: NodeId<I>, mask: VuMask) {
        let nodes: Vec<_> = self.face_loop(seed).collect();
        for n in nodes {
            self.clear_mask(n, mask);
        }
    }

    /// Set mask bits on every node of the vertex.
    pub fn set_mask_around_vertex(&mut self, seed: NodeId<I>, mask: VuMask) {
        let nodes: Vec<_> = self.vertex_loop(seed).collect();
        for n in nodes {
            self.set_mask(n, mask);
        }
    }

    /// Clear mask bits on every node of the vertex.
    pub fn clear_mask_around_vertex(&mut self, seed: NodeId<I>, mask: VuMask) {
        let nodes: Vec<_> = self.vertex_loop(seed).collect();
        for n in nodes {
            self.clear_mask(n, mask);
        }
    }

    /// Set mask bits on both nodes of the edge.
    pub fn set_mask_around_edge(&mut self, seed: NodeId<I>, mask: VuMask) {
        let m = self.mate(seed);
        self.set_mask(seed, mask);
        self.set_mask(m, mask);
    }

    /// Clear mask bits on both nodes of the edge.
    pub fn clear_mask_around_edge(&mut self, seed: NodeId<I>, mask: VuMask) {
        let m = self.mate(seed);
        self.clear_mask(seed, mask);
        self.clear_mask(m, mask);
    }

    /// First node around the vertex carrying any bit of `mask`.
    pub fn find_mask_around_vertex(&self, seed: NodeId<I>, mask: VuMask) -> Option<NodeId<I>> {
        self.vertex_loop(seed).find(|&n| self.has_mask(n, mask))
    }

    /// First node around the face carrying any bit of `mask`.
    pub fn find_mask_around_face(&self, seed: NodeId<I>, mask: VuMask) -> Option<NodeId<I>> {
        self.face_loop(seed).find(|&n| self.has_mask(n, mask))
    }

    /// Number of nodes around the vertex carrying any bit of `mask`.
    pub fn count_mask_around_vertex(&self, seed: NodeId<I>, mask: VuMask) -> usize {
        self.vertex_loop(seed).filter(|&n| self.has_mask(n, mask)).count()
    }

    /// Number of nodes around the face carrying any bit of `mask`.
    pub fn count_mask_around_face(&self, seed: NodeId<I>, mask: VuMask) -> usize {
        self.face_loop(seed).filter(|&n| self.has_mask(n, mask)).count()
    }

    /// Set the coordinates of every node at the vertex.
    pub fn set_xyz_around_vertex(&mut self, seed: NodeId<I>, xyz: Point3<f64>) {
        let nodes: Vec<_> = self.vertex_loop(seed).collect();
        for n in nodes {
            self.set_xyz(n, xyz);
        }
    }

    /// Set the integer tag of every node at the vertex.
    pub fn set_user_int_around_vertex(&mut self, seed: NodeId<I>, value: i64) {
        let nodes: Vec<_> = self.vertex_loop(seed).collect();
        for n in nodes {
            self.set_user_int(n, value);
        }
    }

    /// Set the integer tag of every node of the face.
    pub fn set_user_int_around_face(&mut self, seed: NodeId<I>, value: i64) {
        let nodes: Vec<_> = self.face_loop(seed).collect();
        for n in nodes {
            self.set_user_int(n, value);
        }
    }

    // ==================== Geometry ====================

    /// Cross product (z component) of `b - a` and `c - a` in xy.
    pub fn cross_xy(&self, a: NodeId<I>, b: NodeId<I>, c: NodeId<I>) -> f64 {
        let pa = self.xyz(a);
        let pb = self.xyz(b);
        let pc = self.xyz(c);
        (pb.x - pa.x) * (pc.y - pa.y) - (pb.y - pa.y) * (pc.x - pa.x)
    }

    /// Signed xy area of the face. Counter-clockwise faces are positive.
    ///
    /// One- and two-node faces have zero area.
    pub fn face_area(&self, seed: NodeId<I>) -> f64 {
        if self.fsucc(self.fsucc(seed)) == seed {
            return 0.0;
        }
        let mut area = 0.0;
        for p in self.face_loop(seed) {
            let q = self.fsucc(p);
            let (pp, pq) = (self.xyz(p), self.xyz(q));
            area -= (pq.x - pp.x) * (pp.y + pq.y);
        }
        area * 0.5
    }

    /// Area-weighted centroid and signed area of the face.
    ///
    /// The face is fanned from `seed`; z is averaged with the same xy
    /// weights. Returns `None` for faces with zero area.
    pub fn face_centroid(&self, seed: NodeId<I>) -> Option<(Point3<f64>, f64)> {
        let p0 = *self.xyz(seed);
        let mut area = 0.0;
        let mut sum = Vector3::zeros();
        let mut n0 = self.fsucc(seed);
        let mut n1 = self.fsucc(n0);
        while n1 != seed && n0 != seed {
            let p1 = self.xyz(n0);
            let p2 = self.xyz(n1);
            let d_area = 0.5 * ((p1.x - p0.x) * (p2.y - p0.y) - (p1.y - p0.y) * (p2.x - p0.x));
            let centroid = (p0.coords + p1.coords + p2.coords) / 3.0;
            sum += centroid * d_area;
            area += d_area;
            n0 = n1;
            n1 = self.fsucc(n1);
        }
        if area == 0.0 {
            return None;
        }
        Some((Point3::from(sum / area), area))
    }

    /// xy length of the edge from `n` to `fsucc(n)`.
    pub fn edge_length_xy(&self, n: NodeId<I>) -> f64 {
        let p = self.xyz(n);
        let q = self.xyz(self.fsucc(n));
        ((q.x - p.x).powi(2) + (q.y - p.y).powi(2)).sqrt()
    }

    /// Vector from `n` to `fsucc(n)`.
    pub fn edge_vector(&self, n: NodeId<I>) -> Vector3<f64> {
        self.xyz(self.fsucc(n)) - self.xyz(n)
    }

    /// Point at `fraction` along the edge from `n` to `fsucc(n)`.
    pub fn point_at_fraction(&self, n: NodeId<I>, fraction: f64) -> Point3<f64> {
        let p = self.xyz(n);
        p + self.edge_vector(n) * fraction
    }

    /// Interpolate the z of `n` from its face neighbours by xy distance.
    ///
    /// Returns an error (after copying the predecessor z) when the neighbours
    /// coincide with `n` in xy.
    pub fn interpolate_z_from_face_neighbors(&mut self, n: NodeId<I>) -> Result<()> {
        let prev = self.fpred(n);
        let next = self.fsucc(n);
        let p = *self.xyz(n);
        let p1 = *self.xyz(prev);
        let p2 = *self.xyz(next);
        let d1 = ((p.x - p1.x).powi(2) + (p.y - p1.y).powi(2)).sqrt();
        let d2 = ((p.x - p2.x).powi(2) + (p.y - p2.y).powi(2)).sqrt();
        let dt = d1 + d2;

        if dt == 0.0 {
            self.node_mut(n).xyz.z = p1.z;
            return Err(VuError::DegenerateGeometry(format!(
                "node {} coincides with its face neighbours",
                n.index()
            )));
        }
        // Interpolate from the nearer neighbour.
        let z = if d2 > d1 {
            p1.z + d1 / dt * (p2.z - p1.z)
        } else {
            p2.z + d2 / dt * (p1.z - p2.z)
        };
        self.node_mut(n).xyz.z = z;
        Ok(())
    }

    /// Bounding box of all live nodes.
    pub fn graph_range(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let mut iter = self.node_ids();
        let first = *self.xyz(iter.next()?);
        let (mut min, mut max) = (first, first);
        for n in iter {
            let p = self.xyz(n);
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        Some((min, max))
    }

    /// Largest xy extent of the graph range (0 for an empty graph).
    pub fn largest_range_edge(&self) -> f64 {
        match self.graph_range() {
            Some((min, max)) => (max.x - min.x).max(max.y - min.y),
            None => 0.0,
        }
    }

    /// Bounding box of the nodes of one face.
    pub fn face_range(&self, seed: NodeId<I>) -> (Point3<f64>, Point3<f64>) {
        let first = *self.xyz(seed);
        let (mut min, mut max) = (first, first);
        for n in self.face_loop(seed) {
            let p = self.xyz(n);
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        (min, max)
    }

    /// Largest absolute x or y coordinate in the graph.
    pub fn max_abs_xy(&self) -> f64 {
        self.node_ids()
            .map(|n| {
                let p = self.xyz(n);
                p.x.abs().max(p.y.abs())
            })
            .fold(0.0, f64::max)
    }

    /// The larger of `abs_tol` and `rel_tol` times [`max_abs_xy`](Self::max_abs_xy).
    pub fn tolerance_from_graph_xy(&self, abs_tol: f64, rel_tol: f64) -> f64 {
        abs_tol.max(rel_tol * self.max_abs_xy())
    }

    /// Coordinates around a face loop.
    pub fn face_coordinates(&self, seed: NodeId<I>) -> Vec<Point3<f64>> {
        self.face_loop(seed).map(|n| *self.xyz(n)).collect()
    }

    // ==================== Validation ====================

    /// Check the mate involution, both cyclic invariants, and that every
    /// node of a vertex loop has the same coordinates.
    pub fn is_valid(&self) -> bool {
        let limit = self.nodes.len() + 1;
        for n in self.node_ids() {
            let m = self.mate(n);
            if !self.is_live(m) || self.mate(m) != n {
                return false;
            }
            let (vs, vp) = (self.vsucc(n), self.vpred(n));
            if !self.is_live(vs) || !self.is_live(vp) {
                return false;
            }
            if self.vpred(vs) != n || self.vsucc(vp) != n {
                return false;
            }
            if self.xyz(vs) != self.xyz(n) {
                return false;
            }
            if self.fpred(self.fsucc(n)) != n {
                return false;
            }
            // Face loop must close within the arena size.
            let mut steps = 0;
            let mut p = self.fsucc(n);
            while p != n {
                steps += 1;
                if steps > limit {
                    return false;
                }
                p = self.fsucc(p);
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopKind {
    Vertex,
    Face,
}

/// Iterator over a vertex loop or a face loop.
///
/// The iterator is finite (it stops on returning to the seed) and can be
/// cloned to restart from the same position.
#[derive(Clone)]
pub struct LoopIter<'a, I: VuIndex = u32> {
    graph: &'a VuGraph<I>,
    start: NodeId<I>,
    current: NodeId<I>,
    kind: LoopKind,
    done: bool,
}

impl<'a, I: VuIndex> LoopIter<'a, I> {
    fn new(graph: &'a VuGraph<I>, seed: NodeId<I>, kind: LoopKind) -> Self {
        Self {
            graph,
            start: seed,
            current: seed,
            kind,
            done: !graph.is_live(seed),
        }
    }

    /// The seed this iterator started from.
    pub fn seed(&self) -> NodeId<I> {
        self.start
    }
}

impl<'a, I: VuIndex> Iterator for LoopIter<'a, I> {
    type Item = NodeId<I>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.current;
        self.current = match self.kind {
            LoopKind::Vertex => self.graph.vsucc(self.current),
            LoopKind::Face => self.graph.fsucc(self.current),
        };

        if self.current == self.start {
            self.done = true;
        }

        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point3<f64> {
        Point3::new(x, y, 0.0)
    }

    /// Triangle built by hand from three edges.
    fn triangle() -> (VuGraph, [NodeId; 6]) {
        let mut g = VuGraph::new();
        let (a0, b0) = g.make_pair(p(0.0, 0.0), p(1.0, 0.0)).unwrap();
        let (a1, b1) = g.make_pair(p(1.0, 0.0), p(0.0, 1.0)).unwrap();
        let (a2, b2) = g.make_pair(p(0.0, 1.0), p(0.0, 0.0)).unwrap();
        g.vertex_twist(b0, a1);
        g.vertex_twist(b1, a2);
        g.vertex_twist(b2, a0);
        (g, [a0, b0, a1, b1, a2, b2])
    }

    #[test]
    fn test_empty_graph() {
        let g = VuGraph::<u32>::new();
        assert_eq!(g.num_nodes(), 0);
        assert_eq!(g.num_edges(), 0);
        assert!(g.is_valid());
        assert!(g.graph_range().is_none());
        assert_eq!(g.largest_range_edge(), 0.0);
    }

    #[test]
    fn test_make_pair_is_two_node_face() {
        let mut g = VuGraph::<u32>::new();
        let (a, b) = g.make_pair(p(0.0, 0.0), p(1.0, 0.0)).unwrap();
        assert_eq!(g.mate(a), b);
        assert_eq!(g.fsucc(a), b);
        assert_eq!(g.fsucc(b), a);
        assert_eq!(g.face_node_count(a), 2);
        assert_eq!(g.face_area(a), 0.0);
        assert!(g.is_valid());
    }

    #[test]
    #[should_panic(expected = "mate must be unset")]
    fn test_join_twice_panics() {
        let mut g = VuGraph::<u32>::new();
        let (a, _) = g.make_pair(p(0.0, 0.0), p(1.0, 0.0)).unwrap();
        let c = g.create_node(p(2.0, 0.0)).unwrap();
        g.join(a, c);
    }

    #[test]
    fn test_hand_built_triangle() {
        let (g, [a0, b0, a1, _b1, a2, b2]) = triangle();
        assert!(g.is_valid());
        assert_eq!(g.num_edges(), 3);
        // Inside face runs a0 -> a1 -> a2.
        assert_eq!(g.fsucc(a0), a1);
        assert_eq!(g.fsucc(a1), a2);
        assert_eq!(g.fsucc(a2), a0);
        assert!((g.face_area(a0) - 0.5).abs() < 1e-12);
        // Outside face is clockwise.
        assert!((g.face_area(b0) + 0.5).abs() < 1e-12);
        assert_eq!(g.face_node_count(b2), 3);
        assert_eq!(g.collect_face_seeds().len(), 2);
        assert_eq!(g.collect_vertex_seeds().len(), 3);
    }

    #[test]
    fn test_mate_involution_and_face_closure() {
        let (g, _) = triangle();
        for n in g.node_ids() {
            assert_eq!(g.mate(g.mate(n)), n);
            assert_eq!(g.vsucc(g.fsucc(n)), g.mate(n));
            assert_eq!(g.face_loop(n).count(), 3);
        }
    }

    #[test]
    fn test_face_centroid() {
        let (g, [a0, ..]) = triangle();
        let (c, area) = g.face_centroid(a0).unwrap();
        assert!((area - 0.5).abs() < 1e-12);
        assert!((c.x - 1.0 / 3.0).abs() < 1e-12);
        assert!((c.y - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_insert_edge_splits_face() {
        // Unit square, then the diagonal.
        let mut g = VuGraph::<u32>::new();
        let pts = [p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0), p(0.0, 1.0)];
        let mut inside = Vec::new();
        let mut outside = Vec::new();
        for i in 0..4 {
            let (a, b) = g.make_pair(pts[i], pts[(i + 1) % 4]).unwrap();
            inside.push(a);
            outside.push(b);
        }
        for i in 0..4 {
            g.vertex_twist(outside[i], inside[(i + 1) % 4]);
        }
        assert_eq!(g.face_node_count(inside[0]), 4);

        let (na, nb) = g.insert_edge(inside[0], inside[2]).unwrap();
        assert!(g.is_valid());
        assert_eq!(g.num_edges(), 5);
        assert_eq!(g.face_node_count(inside[0]), 3);
        assert_eq!(g.face_node_count(inside[2]), 3);
        assert_eq!(g.fsucc(nb), inside[0]);
        assert_eq!(g.fsucc(na), inside[2]);
        assert!((g.face_area(inside[0]) - 0.5).abs() < 1e-12);
        assert!((g.face_area(inside[2]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_split_edge() {
        let (mut g, [a0, b0, a1, ..]) = triangle();
        let (fwd, back) = g.split_edge(a0, p(0.5, 0.0)).unwrap();
        assert!(g.is_valid());
        assert_eq!(g.num_edges(), 4);
        assert_eq!(g.fsucc(a0), fwd);
        assert_eq!(g.fsucc(fwd), a1);
        assert_eq!(g.mate(a0), back);
        assert_eq!(g.face_node_count(a0), 4);
        assert_eq!(g.face_node_count(b0), 4);
    }

    #[test]
    fn test_delete_edge_merges_faces() {
        let (mut g, [a0, b0, a1, ..]) = triangle();
        g.delete_edge(a0).unwrap();
        assert!(g.is_valid());
        assert_eq!(g.num_edges(), 2);
        assert_eq!(g.num_nodes(), 4);
        // Remaining path has one face of four nodes.
        assert_eq!(g.face_node_count(a1), 4);
        assert!(!g.is_live(a0));
        assert!(!g.is_live(b0));
        assert!(matches!(g.delete_edge(a0), Err(VuError::NotAnEdge { .. })));
    }

    #[test]
    fn test_deleted_slots_are_recycled() {
        let (mut g, [a0, ..]) = triangle();
        let len = g.arena_len();
        g.delete_edge(a0).unwrap();
        g.make_pair(p(5.0, 5.0), p(6.0, 6.0)).unwrap();
        assert_eq!(g.arena_len(), len);
        assert!(g.is_valid());
    }

    #[test]
    fn test_out_of_nodes() {
        let mut g = VuGraph::<u16>::new();
        for _ in 0..<u16 as VuIndex>::capacity() {
            g.create_node(p(0.0, 0.0)).unwrap();
        }
        assert!(matches!(
            g.create_node(p(0.0, 0.0)),
            Err(VuError::OutOfNodes { .. })
        ));
    }

    #[test]
    fn test_with_mask_returns_on_error() {
        let (mut g, [a0, ..]) = triangle();
        let before = g.free_mask_count();
        let result: Result<()> = g.with_mask(|g, m| {
            g.set_mask_around_face(a0, m);
            assert_eq!(g.count_mask_around_face(a0, m), 3);
            Err(VuError::DegenerateGeometry("test".into()))
        });
        assert!(result.is_err());
        assert_eq!(g.free_mask_count(), before);
        assert!(g.node_ids().all(|n| g.mask(n).bits() < 1 << 8));
    }

    #[test]
    fn test_grab_until_out_of_masks() {
        let (mut g, _) = triangle();
        let mut grabbed = Vec::new();
        loop {
            match g.grab_mask() {
                Ok(m) => grabbed.push(m),
                Err(VuError::OutOfMasks) => break,
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!(grabbed.len(), g.mask_pool_capacity());
        for m in grabbed {
            g.return_mask(m);
        }
        assert_eq!(g.free_mask_count(), g.mask_pool_capacity());
    }

    #[test]
    fn test_mask_around_vertex_and_edge() {
        let (mut g, [a0, b0, _a1, _b1, _a2, b2]) = triangle();
        g.set_mask_around_vertex(a0, VuMask::BARRIER);
        assert!(g.has_mask(b2, VuMask::BARRIER));
        assert_eq!(g.count_mask_around_vertex(a0, VuMask::BARRIER), 2);
        assert_eq!(g.find_mask_around_vertex(b2, VuMask::BARRIER), Some(b2));

        g.set_mask_around_edge(a0, VuMask::BOUNDARY);
        assert!(g.has_mask(b0, VuMask::BOUNDARY));
        g.clear_mask_around_edge(b0, VuMask::BOUNDARY);
        assert!(!g.has_mask(a0, VuMask::BOUNDARY));
        assert!(g.find_mask_around_face(a0, VuMask::BOUNDARY).is_none());
    }

    #[test]
    fn test_loop_iter_restartable() {
        let (g, [a0, ..]) = triangle();
        let iter = g.face_loop(a0);
        let first: Vec<_> = iter.clone().collect();
        let second: Vec<_> = iter.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_interpolate_z() {
        let mut g = VuGraph::<u32>::new();
        let (a, b) = g.make_pair(Point3::new(0.0, 0.0, 0.0), Point3::new(4.0, 0.0, 8.0)).unwrap();
        let (fwd, _back) = g.split_edge(a, Point3::new(1.0, 0.0, 0.0)).unwrap();
        g.interpolate_z_from_face_neighbors(fwd).unwrap();
        assert!((g.xyz(fwd).z - 2.0).abs() < 1e-12);
        assert_eq!(g.mate(b), fwd);
    }
}
