mod options;

use anyhow::Error as AnyError;
use clap::Parser;
use log::warn;
use options::{Cli, Command as CliCmd};
use serde::Serialize;
use std::{path::Path, sync::Arc};
use surfdist::{
    geo::geometry::Coord, heightmap::Heightmap, linspace, reference::surface_height, Distances,
    GpuContext, KernelConfig, ReferenceSolver, Solver, SurfaceDistance, SurfdistError,
};
use textplots::{Chart, Plot, Shape};

/// Number of points in a plotted height profile.
const PROFILE_POINTS: usize = 300;

fn main() -> Result<(), AnyError> {
    let Cli {
        pre,
        post,
        width,
        samples,
        workgroup_size,
        meters_per_cell,
        meters_per_unit,
        start,
        end,
        cpu,
        memmap,
        cmd,
    } = Cli::parse();

    env_logger::init();

    let config = KernelConfig {
        workgroup_size,
        sample_count: samples,
        meters_per_cell,
        meters_per_elevation_unit: meters_per_unit,
        ..KernelConfig::default()
    };

    let pre = open_grid(&pre, width, memmap)?;
    let post = open_grid(&post, width, memmap)?;

    if matches!(cmd, CliCmd::Plot) {
        plot_ascii(&pre, &post, start.0, end.0, &config);
    }

    let mut solver = new_solver(pre, post, config, cpu)?;
    let distances = solver.compute_distance(start.0, end.0)?;

    match cmd {
        CliCmd::Display | CliCmd::Plot => print_display(&distances),
        CliCmd::Json => print_json(start.0, end.0, distances)?,
    };
    Ok(())
}

fn open_grid(path: &Path, width: Option<usize>, memmap: bool) -> Result<Heightmap, AnyError> {
    let grid = if memmap {
        Heightmap::memmap(path)?
    } else {
        Heightmap::load(path)?
    };
    Ok(match width {
        Some(width) => grid.expect_width(width)?,
        None => grid,
    })
}

/// Returns the GPU solver, or the host one when asked for or when no
/// adapter exists.
fn new_solver(
    pre: Heightmap,
    post: Heightmap,
    config: KernelConfig,
    cpu: bool,
) -> Result<Box<dyn SurfaceDistance>, AnyError> {
    if cpu {
        return Ok(Box::new(ReferenceSolver::new(pre, post, config)?));
    }
    match GpuContext::new() {
        Ok(gpu) => Ok(Box::new(
            Solver::builder()
                .pre(pre)
                .post(post)
                .config(config)
                .build(&Arc::new(gpu))?,
        )),
        Err(SurfdistError::NoAdapter) => {
            warn!("no compute adapter, computing on the host");
            Ok(Box::new(ReferenceSolver::new(pre, post, config)?))
        }
        Err(e) => Err(e.into()),
    }
}

fn print_display(distances: &Distances) {
    println!("pre:        {:.2} m", distances.pre);
    println!("post:       {:.2} m", distances.post);
    println!("difference: {:+.2} m", distances.difference());
}

fn print_json(start: Coord<f32>, end: Coord<f32>, distances: Distances) -> Result<(), AnyError> {
    #[derive(Serialize)]
    struct JsonEntry {
        start: [f32; 2],
        end: [f32; 2],
        #[serde(flatten)]
        distances: Distances,
        difference: f64,
    }

    let entry = JsonEntry {
        start: [start.x, start.y],
        end: [end.x, end.y],
        distances,
        difference: distances.difference(),
    };
    let json = serde_json::to_string(&entry)?;
    println!("{json}");
    Ok(())
}

/// Plots the smoothed surface under the line for both grids, in
/// meters along the line vs meters of elevation.
fn plot_ascii(
    pre: &Heightmap,
    post: &Heightmap,
    start: Coord<f32>,
    end: Coord<f32>,
    config: &KernelConfig,
) {
    let length = (end.x - start.x).hypot(end.y - start.y) * config.meters_per_cell;
    let profile = |grid: &Heightmap| -> Vec<(f32, f32)> {
        linspace(0.0_f32, 1.0, PROFILE_POINTS)
            .map(|t| {
                let p = Coord {
                    x: start.x + (end.x - start.x) * t,
                    y: start.y + (end.y - start.y) * t,
                };
                let h = surface_height(grid, p) * config.meters_per_elevation_unit;
                (t * length, h)
            })
            .collect()
    };
    let pre_profile = profile(pre);
    let post_profile = profile(post);
    let (ymin, ymax) = elevation_range(pre, post, config.meters_per_elevation_unit);
    Chart::new_with_y_range(300, 150, 0.0, length.max(f32::EPSILON), ymin, ymax)
        .lineplot(&Shape::Lines(&pre_profile))
        .lineplot(&Shape::Lines(&post_profile))
        .display();
}

/// Returns the plot y-range, in meters, covering every sample of both
/// grids so pre and post profiles share one scale.
fn elevation_range(pre: &Heightmap, post: &Heightmap, meters_per_unit: f32) -> (f32, f32) {
    let lo = f32::from(pre.min_elevation().min(post.min_elevation())) * meters_per_unit;
    let hi = f32::from(pre.max_elevation().max(post.max_elevation())) * meters_per_unit;
    if hi > lo {
        (lo, hi)
    } else {
        (lo - 1.0, lo + 1.0)
    }
}
