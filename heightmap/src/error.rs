use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeightmapError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("heightmap len {0} is not a non-empty perfect square")]
    NotSquare(u64),

    #[error("invalid heightmap file len {0} for {1}")]
    FileLen(u64, PathBuf),

    #[error("heightmap width {actual} does not match expected width {expected}")]
    Width { actual: usize, expected: usize },
}
