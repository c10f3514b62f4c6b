//! Device side of the distance computation.

mod context;
mod grid;
mod solver;

pub use context::{AdapterInfo, GpuContext};
pub use grid::DeviceGrid;
pub use solver::{Solver, SolverBuilder};
