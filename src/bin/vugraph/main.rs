//! vugraph CLI - triangulation processing command-line tool.
//!
//! Usage: vugraph <COMMAND> [OPTIONS] <INPUT> [OUTPUT]
//!
//! Run `vugraph --help` for available commands.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use log::info;

use vugraph::algo::{self, Progress, SmoothCallbacks, SmoothOptions};
use vugraph::graph::{VuGraph, VuMask};
use vugraph::io::{self, Triangulation};

#[derive(Parser)]
#[command(name = "vugraph")]
#[command(author, version, about = "Planar triangulation processing CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display triangulation information
    Info {
        /// Input triangulation file
        input: PathBuf,
    },

    /// Relax interior vertices with Laplacian smoothing
    Smooth {
        /// Input triangulation file
        input: PathBuf,

        /// Output triangulation file
        output: PathBuf,

        /// Convergence tolerance relative to the largest range edge
        #[arg(long, default_value = "1e-5")]
        rel_tol: f64,

        /// Maximum number of sweeps
        #[arg(short = 's', long, default_value = "100")]
        max_sweep: usize,

        /// Run a flip pass every N sweeps (0 disables flipping)
        #[arg(short, long, default_value = "0")]
        flip_interval: usize,

        /// Maximum flips of one edge per flip pass
        #[arg(long, default_value = "4")]
        max_flips_per_edge: usize,
    },

    /// Delete dangling edges and report small faces
    Clean {
        /// Input triangulation file
        input: PathBuf,

        /// Output triangulation file
        output: PathBuf,
    },

    /// Clip a terrain to a polygon of its points
    Clip {
        /// Input triangulation file
        input: PathBuf,

        /// Output triangulation file
        output: PathBuf,

        /// Polygon point indices, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        polygon: Vec<usize>,

        /// Re-triangulate the hole as a void instead of removing it
        #[arg(long)]
        fill: bool,

        /// Keep the inside of the polygon and remove the outside
        #[arg(long, conflicts_with = "fill")]
        external: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Info { input } => cmd_info(&input)?,
        Commands::Smooth {
            input,
            output,
            rel_tol,
            max_sweep,
            flip_interval,
            max_flips_per_edge,
        } => {
            let options = SmoothOptions::default()
                .with_rel_tol(rel_tol)
                .with_max_sweep(max_sweep)
                .with_flip_interval(flip_interval)
                .with_max_flips_per_edge(max_flips_per_edge);
            cmd_smooth(&input, &output, options)?;
        }
        Commands::Clean { input, output } => cmd_clean(&input, &output)?,
        Commands::Clip {
            input,
            output,
            polygon,
            fill,
            external,
        } => cmd_clip(&input, &output, &polygon, fill, external)?,
    }
    Ok(())
}

/// Create a progress reporter that displays a progress bar on the terminal.
fn create_progress() -> Progress {
    let max_percent = Arc::new(AtomicUsize::new(0));

    Progress::new(move |current, total, message| {
        if total == 0 {
            return;
        }
        let raw_percent = if current >= total {
            100
        } else {
            ((current * 100) + (total / 2)) / total
        };

        // Sweeps can end early on convergence; never move the bar back.
        let percent = max_percent.fetch_max(raw_percent, Ordering::Relaxed).max(raw_percent);

        let bar_width = 30;
        let filled = (percent * bar_width) / 100;
        let bar = "=".repeat(filled);
        let space = " ".repeat(bar_width - filled);
        eprint!("\r[{}{}] {:3}% {}", bar, space, percent, message);
        let _ = std::io::stderr().flush();

        if current >= total {
            eprintln!();
        }
    })
}

fn cmd_info(input: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let tin = io::load(input)?;
    let graph: VuGraph = tin.to_graph()?;

    println!("File: {}", input.display());
    println!("Points: {}", tin.points.len());
    println!("Triangles: {}", tin.triangles.len());
    println!("Edges: {}", graph.num_edges());
    println!("Nodes: {}", graph.num_nodes());

    let faces = graph.collect_face_seeds();
    let exterior = faces
        .iter()
        .filter(|&&f| graph.has_mask(f, VuMask::EXTERIOR))
        .count();
    println!("Faces: {} ({} exterior loops)", faces.len(), exterior);

    let area: f64 = faces
        .iter()
        .map(|&f| graph.face_area(f))
        .filter(|&a| a > 0.0)
        .sum();
    println!("Plan area: {:.6}", area);

    if let Some((min, max)) = graph.graph_range() {
        println!(
            "Range: ({:.3}, {:.3}, {:.3}) to ({:.3}, {:.3}, {:.3})",
            min.x, min.y, min.z, max.x, max.y, max.z
        );
    }
    let boundary = graph
        .node_ids()
        .filter(|&n| graph.has_mask(n, VuMask::BOUNDARY | VuMask::EXTERIOR))
        .count();
    println!("Boundary edges: {}", boundary);
    println!("Topology valid: {}", graph.is_valid());
    Ok(())
}

fn cmd_smooth(
    input: &PathBuf,
    output: &PathBuf,
    options: SmoothOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let tin = io::load(input)?;
    let mut graph: VuGraph = tin.to_graph()?;
    info!("loaded {} points from {}", tin.points.len(), input.display());

    let progress = create_progress();
    let callbacks = SmoothCallbacks {
        progress: Some(&progress),
        ..Default::default()
    };
    let start = Instant::now();
    let report = algo::smooth_with_flips_using(&mut graph, &options, &callbacks)?;
    let elapsed = start.elapsed();

    println!(
        "Smoothed {} vertices in {} sweeps ({:.2?}), {} flips",
        report.vertices, report.sweeps, elapsed, report.flips
    );
    if report.converged {
        println!("Converged (ratio {:.3e})", report.convergence_ratio);
    } else {
        println!(
            "Did not converge within {} sweeps (ratio {:.3e})",
            options.max_sweep, report.convergence_ratio
        );
    }

    io::save(&Triangulation::from_graph(&graph, VuMask::NONE), output)?;
    println!("Saved to {}", output.display());
    Ok(())
}

fn cmd_clean(input: &PathBuf, output: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let tin = io::load(input)?;
    let mut graph: VuGraph = tin.to_graph()?;

    let stats = algo::delete_dangling_edges(&mut graph)?;
    println!(
        "Small faces: {}, dangling edges: {}, deleted: {}",
        stats.small_faces, stats.danglers, stats.edges_deleted
    );

    io::save(&Triangulation::from_graph(&graph, VuMask::NONE), output)?;
    println!("Saved to {}", output.display());
    Ok(())
}

fn cmd_clip(
    input: &PathBuf,
    output: &PathBuf,
    polygon: &[usize],
    fill: bool,
    external: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut dtm = io::load(input)?.into_dtm()?;
    let report = if external {
        dtm.clip_external_to_polygon(polygon)?
    } else {
        dtm.clip_internal_to_polygon(polygon, fill)?
    };

    if report.reversed {
        println!("Polygon was clockwise; reversed");
    }
    println!(
        "Removed points: {}, lines deleted: {}, chords deleted: {}",
        report.removed_points.len(),
        report.lines_deleted,
        report.chords_deleted
    );
    if let Some(void) = report.void_feature {
        println!(
            "Void feature {} ({} edges added, {} voids merged)",
            void, report.edges_added, report.voids_merged
        );
    }

    io::save(&Triangulation::from_dtm(&dtm), output)?;
    println!("Saved to {}", output.display());
    Ok(())
}
