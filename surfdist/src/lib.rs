//! # Surface distance
//!
//! `surfdist` estimates how far a straight line travels over the
//! surface of two elevation grids, a "pre" and a "post" state, so a
//! caller can compare terrain change along a path.
//!
//! The heavy lifting happens in a WGSL compute kernel (see
//! [`gpu::Solver`]); [`reference`] carries a CPU rendition of the same
//! kernel used to validate it and as a fallback.

mod config;
mod error;
pub mod gpu;
mod math;
mod params;
pub mod reference;
mod tile;

pub use crate::{
    config::KernelConfig,
    error::SurfdistError,
    gpu::{GpuContext, Solver},
    math::linspace,
    params::QueryParams,
    reference::ReferenceSolver,
    tile::TileBounds,
};
pub use {geo, heightmap};

use geo::geometry::Coord;

/// Distances covered along one line, in physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Distances {
    /// Distance over the "pre" grid.
    pub pre: f64,

    /// Distance over the "post" grid.
    pub post: f64,
}

impl Distances {
    /// Returns `post - pre`.
    pub fn difference(&self) -> f64 {
        self.post - self.pre
    }
}

/// Surface distance between two grid coordinates over a pre/post
/// grid pair.
///
/// Coordinates are in cells, `[0, N]` on both axes. Implementations
/// reuse their resources between calls, hence `&mut self`: a query
/// cannot start until the previous one has returned.
pub trait SurfaceDistance {
    fn compute_distance(
        &mut self,
        start: Coord<f32>,
        end: Coord<f32>,
    ) -> Result<Distances, SurfdistError>;
}
