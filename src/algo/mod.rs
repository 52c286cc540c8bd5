//! Graph algorithms.
//!
//! - **Classification**: small faces, dangling edges, vertex degree tests
//! - **Triangulation**: ear clipping inside a single face
//! - **Flipping**: quality-driven diagonal flips between triangle pairs
//! - **Smoothing**: area-weighted Laplacian relaxation with periodic flips
//!
//! Every pass that needs scratch marks takes them from the graph's mask pool
//! and hands them back before returning.

pub mod classify;
pub mod flip;
pub mod progress;
pub mod smooth;
pub mod triangulate;

pub use classify::{delete_dangling_edges, mark_dangling_edges, mark_small_faces, DanglerStats};
pub use flip::{flip_pass, CoordinateMapping, FlipOptions};
pub use progress::Progress;
pub use smooth::{
    compute_laplacian_parameter_delta, smooth_with_flips, smooth_with_flips_using,
    smooth_with_flips_with_progress, FaceWeight, SmoothCallbacks, SmoothOptions, SmoothReport,
};
pub use triangulate::{triangulate_face, triangulate_faces};
