use heightmap::HeightmapError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SurfdistError {
    #[error("missing required parameter '{0}'")]
    Builder(&'static str),

    #[error("invalid kernel configuration: {0}")]
    Config(String),

    #[error("{axis} coordinate {value} of {point} is outside [0, {max}]")]
    OutOfBounds {
        point: &'static str,
        axis: char,
        value: f32,
        max: usize,
    },

    #[error(
        "line needs {cells} tile cells in workgroup {group}, the tile holds {capacity}; \
         raise the sample count or shorten the line"
    )]
    TileBudget { group: u32, cells: u32, capacity: u32 },

    #[error("pre and post grids differ in width ({pre} vs {post})")]
    GridMismatch { pre: usize, post: usize },

    #[error("no compatible compute adapter found")]
    NoAdapter,

    #[error("device request failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("device error: {0}")]
    Device(String),

    #[error("staging buffer map failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),

    #[error("{0}")]
    Heightmap(#[from] HeightmapError),
}
