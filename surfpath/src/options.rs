use anyhow::{anyhow, Error as AnyError};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, str::FromStr};
use surfdist::geo::geometry::Coord;

/// Measure surface distance along a line across two elevation grids.
#[derive(Parser, Debug, Clone)]
pub struct Cli {
    /// Raw elevation grid before the change.
    #[arg(long)]
    pub pre: PathBuf,

    /// Raw elevation grid after the change.
    #[arg(long)]
    pub post: PathBuf,

    /// Expected grid width, in cells. Inferred from the files when
    /// omitted.
    #[arg(short, long)]
    pub width: Option<usize>,

    /// Number of chords the line is split into.
    #[arg(short, long, default_value_t = 8192)]
    pub samples: u32,

    /// Threads per workgroup (power of two).
    #[arg(long, default_value_t = 256)]
    pub workgroup_size: u32,

    /// Horizontal size of one cell, in meters.
    #[arg(long, default_value_t = 30.0)]
    pub meters_per_cell: f32,

    /// Vertical size of one elevation unit, in meters.
    #[arg(long, default_value_t = 11.0)]
    pub meters_per_unit: f32,

    /// Start "x,y", in grid cells.
    #[arg(long)]
    pub start: GridPoint,

    /// End "x,y", in grid cells.
    #[arg(long)]
    pub end: GridPoint,

    /// Compute on the host instead of a GPU.
    #[arg(long, default_value_t = false)]
    pub cpu: bool,

    /// Memory-map the grid files instead of reading them.
    #[arg(long, default_value_t = false)]
    pub memmap: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Clone, Debug, Copy)]
pub struct GridPoint(pub Coord<f32>);

impl FromStr for GridPoint {
    type Err = AnyError;
    fn from_str(s: &str) -> Result<Self, AnyError> {
        let (x_str, y_str) = s.split_once(',').ok_or_else(|| anyhow!("not a valid x,y"))?;
        let x = f32::from_str(x_str.trim())?;
        let y = f32::from_str(y_str.trim())?;
        Ok(Self(Coord { x, y }))
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print both distances and their difference.
    Display,

    /// Print distances to stdout as JSON.
    Json,

    /// Plot pre and post height profiles to terminal.
    Plot,
}
