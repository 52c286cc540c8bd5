//! Laplacian smoothing with interleaved edge flips.
//!
//! Each sweep moves every free vertex towards the area-weighted centroid of
//! its incident faces, one vertex at a time (later vertices see earlier
//! moves). A move is clamped to a fraction of the vertex's shortest incident
//! edge so that triangles cannot fold over. Every `flip_interval` sweeps a
//! [`flip_pass`] repairs triangle shape.
//!
//! Sweeps stop when the largest move of a sweep falls below
//! `rel_tol` times the larger xy extent of the graph, or after `max_sweep`
//! sweeps. Running out of sweeps is reported in [`SmoothReport`], not as an
//! error.
//!
//! # Example
//!
//! ```
//! use vugraph::prelude::*;
//! use vugraph::algo::smooth::{smooth_with_flips, SmoothOptions};
//! use nalgebra::Point3;
//!
//! let mut points = Vec::new();
//! for j in 0..=2 {
//!     for i in 0..=2 {
//!         points.push(Point3::new(i as f64, j as f64, 0.0));
//!     }
//! }
//! points[4] = Point3::new(1.2, 0.9, 0.0);
//! let triangles = [
//!     [0, 1, 4], [0, 4, 3], [1, 2, 5], [1, 5, 4],
//!     [3, 4, 7], [3, 7, 6], [4, 5, 8], [4, 8, 7],
//! ];
//! let mut graph: VuGraph = build_from_triangles(&points, &triangles).unwrap();
//!
//! let report = smooth_with_flips(&mut graph, &SmoothOptions::default()).unwrap();
//! assert!(report.converged);
//! ```

use log::{debug, trace};
use nalgebra::Vector3;

use super::flip::{flip_pass, CoordinateMapping, FlipOptions};
use super::progress::{self, Progress};
use crate::error::{Result, VuError};
use crate::graph::{NodeId, VuGraph, VuIndex, VuMask};

/// Extra weight of a face in the centroid average, on top of its area.
pub trait FaceWeight<I: VuIndex = u32> {
    /// Weight of the face of `seed`.
    fn weight(&self, graph: &VuGraph<I>, seed: NodeId<I>) -> f64;
}

impl<I, F> FaceWeight<I> for F
where
    I: VuIndex,
    F: Fn(&VuGraph<I>, NodeId<I>) -> f64,
{
    fn weight(&self, graph: &VuGraph<I>, seed: NodeId<I>) -> f64 {
        self(graph, seed)
    }
}

/// Options for [`smooth_with_flips`].
#[derive(Debug, Clone)]
pub struct SmoothOptions {
    /// Convergence tolerance, relative to the larger xy extent of the graph.
    pub rel_tol: f64,

    /// Maximum number of sweeps.
    pub max_sweep: usize,

    /// Largest move of a vertex in one sweep, as a fraction of its shortest
    /// incident edge.
    pub max_shift_fraction: f64,

    /// Run a flip pass after every this many sweeps (0 = never).
    pub flip_interval: usize,

    /// Flip limit per edge in each flip pass.
    pub max_flips_per_edge: usize,

    /// Vertices with a node carrying any of these bits stay put.
    pub barrier_mask: VuMask,
}

impl Default for SmoothOptions {
    fn default() -> Self {
        Self {
            rel_tol: 1e-5,
            max_sweep: 100,
            max_shift_fraction: 0.25,
            flip_interval: 0,
            max_flips_per_edge: 4,
            barrier_mask: VuMask::BARRIER | VuMask::EXTERIOR | VuMask::BOUNDARY,
        }
    }
}

impl SmoothOptions {
    /// Set the relative convergence tolerance.
    pub fn with_rel_tol(mut self, rel_tol: f64) -> Self {
        self.rel_tol = rel_tol;
        self
    }

    /// Set the maximum number of sweeps.
    pub fn with_max_sweep(mut self, max_sweep: usize) -> Self {
        self.max_sweep = max_sweep;
        self
    }

    /// Set the per-sweep move limit as a fraction of the shortest edge.
    pub fn with_max_shift_fraction(mut self, fraction: f64) -> Self {
        self.max_shift_fraction = fraction;
        self
    }

    /// Set the flip interval (0 disables flipping).
    pub fn with_flip_interval(mut self, interval: usize) -> Self {
        self.flip_interval = interval;
        self
    }

    /// Set the per-edge flip limit.
    pub fn with_max_flips_per_edge(mut self, count: usize) -> Self {
        self.max_flips_per_edge = count;
        self
    }

    /// Set the mask of vertices that must not move.
    pub fn with_barrier_mask(mut self, mask: VuMask) -> Self {
        self.barrier_mask = mask;
        self
    }

    fn validate(&self) -> Result<()> {
        if !self.rel_tol.is_finite() || self.rel_tol < 0.0 {
            return Err(VuError::invalid_param(
                "rel_tol",
                self.rel_tol,
                "must be finite and non-negative",
            ));
        }
        if !(self.max_shift_fraction > 0.0 && self.max_shift_fraction <= 1.0) {
            return Err(VuError::invalid_param(
                "max_shift_fraction",
                self.max_shift_fraction,
                "must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// Optional collaborators for [`smooth_with_flips_using`].
pub struct SmoothCallbacks<'a, I: VuIndex = u32> {
    /// Extra face weight in the centroid average.
    pub face_weight: Option<&'a dyn FaceWeight<I>>,

    /// Coordinate mapping used to judge flips.
    pub mapping: Option<&'a dyn CoordinateMapping>,

    /// Progress reporter, called once per sweep.
    pub progress: Option<&'a Progress>,
}

impl<I: VuIndex> Default for SmoothCallbacks<'_, I> {
    fn default() -> Self {
        Self {
            face_weight: None,
            mapping: None,
            progress: None,
        }
    }
}

/// Outcome of a smoothing run.
#[derive(Debug, Clone, Default)]
pub struct SmoothReport {
    /// Sweeps performed.
    pub sweeps: usize,

    /// Largest move of the last sweep divided by the tolerance.
    /// At most 1 when converged.
    pub convergence_ratio: f64,

    /// True if the tolerance was reached within `max_sweep` sweeps.
    pub converged: bool,

    /// Largest move of each sweep.
    pub max_shift_history: Vec<f64>,

    /// Edge flips made across all flip passes.
    pub flips: usize,

    /// Number of free vertices at the start.
    pub vertices: usize,
}

/// Smooth with default collaborators.
pub fn smooth_with_flips<I: VuIndex>(
    graph: &mut VuGraph<I>,
    options: &SmoothOptions,
) -> Result<SmoothReport> {
    smooth_with_flips_using(graph, options, &SmoothCallbacks::default())
}

/// Smooth with progress reporting.
pub fn smooth_with_flips_with_progress<I: VuIndex>(
    graph: &mut VuGraph<I>,
    options: &SmoothOptions,
    progress: &Progress,
) -> Result<SmoothReport> {
    let callbacks = SmoothCallbacks {
        progress: Some(progress),
        ..SmoothCallbacks::default()
    };
    smooth_with_flips_using(graph, options, &callbacks)
}

/// Smooth with caller-supplied face weights, flip mapping and progress.
pub fn smooth_with_flips_using<I: VuIndex>(
    graph: &mut VuGraph<I>,
    options: &SmoothOptions,
    callbacks: &SmoothCallbacks<'_, I>,
) -> Result<SmoothReport> {
    options.validate()?;

    let tol = options.rel_tol * graph.largest_range_edge();
    let flip_options = smoothing_flip_options(options);
    let mut candidates = free_vertices(graph, options.barrier_mask);
    let mut report = SmoothReport {
        vertices: candidates.len(),
        ..SmoothReport::default()
    };
    debug!(
        "smoothing {} vertices, tolerance {:.3e}",
        candidates.len(),
        tol
    );

    let mut last_shift = 0.0;
    for sweep in 1..=options.max_sweep {
        progress::report(callbacks.progress, sweep - 1, options.max_sweep, "smoothing");
        let mut max_shift: f64 = 0.0;
        for &vertex in &candidates {
            let Some(delta) = compute_laplacian_parameter_delta(graph, vertex, callbacks.face_weight)
            else {
                continue;
            };
            let delta = clamp_shift(graph, vertex, delta, options.max_shift_fraction);
            let moved = graph.xyz(vertex) + delta;
            graph.set_xyz_around_vertex(vertex, moved);
            max_shift = max_shift.max(delta.norm());
        }
        report.sweeps = sweep;
        report.max_shift_history.push(max_shift);
        last_shift = max_shift;
        trace!("sweep {}: max shift {:.3e}", sweep, max_shift);

        if max_shift <= tol {
            report.converged = true;
            break;
        }

        if options.flip_interval > 0 && sweep % options.flip_interval == 0 {
            let flips = flip_pass(graph, &flip_options, callbacks.mapping)?;
            if flips > 0 {
                report.flips += flips;
                candidates = free_vertices(graph, options.barrier_mask);
            }
        }
    }

    report.convergence_ratio = if tol > 0.0 {
        last_shift / tol
    } else if last_shift == 0.0 {
        0.0
    } else {
        f64::INFINITY
    };
    debug!(
        "smoothing finished after {} sweeps (ratio {:.3}, {} flips)",
        report.sweeps, report.convergence_ratio, report.flips
    );
    Ok(report)
}

/// Move from the vertex of `seed` to the weighted centroid of its faces.
///
/// Each incident face contributes its xy-area-weighted centroid, further
/// scaled by `face_weight` when given. Returns `None` when any incident face
/// has non-positive area or the total weight is zero.
pub fn compute_laplacian_parameter_delta<I: VuIndex>(
    graph: &VuGraph<I>,
    seed: NodeId<I>,
    face_weight: Option<&dyn FaceWeight<I>>,
) -> Option<Vector3<f64>> {
    let mut sum = Vector3::zeros();
    let mut total = 0.0;
    for n in graph.vertex_loop(seed) {
        let (centroid, area) = graph.face_centroid(n)?;
        if area <= 0.0 {
            return None;
        }
        let weight = match face_weight {
            Some(w) => area * w.weight(graph, n),
            None => area,
        };
        sum += centroid.coords * weight;
        total += weight;
    }
    if total == 0.0 {
        return None;
    }
    Some(sum / total - graph.xyz(seed).coords)
}

fn clamp_shift<I: VuIndex>(
    graph: &VuGraph<I>,
    seed: NodeId<I>,
    delta: Vector3<f64>,
    fraction: f64,
) -> Vector3<f64> {
    let shortest = graph
        .vertex_loop(seed)
        .map(|n| graph.edge_length_xy(n))
        .fold(f64::INFINITY, f64::min);
    let limit = fraction * shortest;
    let length = delta.xy().norm();
    if length > limit && length > 0.0 {
        delta * (limit / length)
    } else {
        delta
    }
}

/// Flip settings for the smoothing flip pass; pinned vertices also pin their edges.
fn smoothing_flip_options(options: &SmoothOptions) -> FlipOptions {
    FlipOptions::default()
        .with_max_flips_per_edge(options.max_flips_per_edge)
        .with_barrier_mask(options.barrier_mask | VuMask::PRIMARY)
}

fn free_vertices<I: VuIndex>(graph: &VuGraph<I>, barrier: VuMask) -> Vec<NodeId<I>> {
    graph
        .collect_vertex_seeds()
        .into_iter()
        .filter(|&v| graph.find_mask_around_vertex(v, barrier).is_none())
        .collect()
}
