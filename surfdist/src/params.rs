use crate::{KernelConfig, SurfdistError, TileBounds};
use geo::geometry::Coord;

/// Per-query uniform block.
///
/// Must match the WGSL `QueryParams` struct field for field; the
/// trailing padding rounds the block up to 32 bytes.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QueryParams {
    pub start_x: f32,
    pub start_y: f32,
    pub end_x: f32,
    pub end_y: f32,
    pub sample_count: u32,
    pub grid_width: u32,
    _pad: [u32; 2],
}

impl QueryParams {
    /// Returns validated parameters for a line from `start` to `end`.
    ///
    /// Both endpoints must lie inside `[0, grid_width]` on both axes,
    /// `config` must be valid for the grid, and every workgroup's
    /// slice of the line must fit the tile. Nothing touches the device
    /// when this fails.
    pub fn new(
        start: Coord<f32>,
        end: Coord<f32>,
        config: &KernelConfig,
        grid_width: usize,
    ) -> Result<Self, SurfdistError> {
        let params = Self::line(start, end, config, grid_width)?;
        let (group, bounds) = TileBounds::largest(&params, config.workgroup_size);
        if bounds.cells() > config.tile_capacity() {
            return Err(SurfdistError::TileBudget {
                group,
                cells: bounds.cells(),
                capacity: config.tile_capacity(),
            });
        }
        Ok(params)
    }

    /// Like [`QueryParams::new`], without the tile budget check.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn line(
        start: Coord<f32>,
        end: Coord<f32>,
        config: &KernelConfig,
        grid_width: usize,
    ) -> Result<Self, SurfdistError> {
        config.validate(grid_width)?;
        check_point("start", start, grid_width)?;
        check_point("end", end, grid_width)?;
        Ok(Self {
            start_x: start.x,
            start_y: start.y,
            end_x: end.x,
            end_y: end.y,
            sample_count: config.sample_count,
            grid_width: grid_width as u32,
            _pad: [0; 2],
        })
    }

    pub fn start(&self) -> Coord<f32> {
        Coord {
            x: self.start_x,
            y: self.start_y,
        }
    }

    pub fn end(&self) -> Coord<f32> {
        Coord {
            x: self.end_x,
            y: self.end_y,
        }
    }

    /// Point on the line after `k` of `sample_count` chords.
    ///
    /// Mirrors `position` in the kernel, operation for operation.
    pub fn position(&self, k: u32) -> Coord<f32> {
        let t = k as f32 / self.sample_count as f32;
        Coord {
            x: self.start_x + (self.end_x - self.start_x) * t,
            y: self.start_y + (self.end_y - self.start_y) * t,
        }
    }

    /// Planar length of the line, in cells.
    pub fn length(&self) -> f32 {
        (self.end_x - self.start_x).hypot(self.end_y - self.start_y)
    }
}

fn check_point(point: &'static str, c: Coord<f32>, grid_width: usize) -> Result<(), SurfdistError> {
    #[allow(clippy::cast_precision_loss)]
    let max = grid_width as f32;
    for (axis, value) in [('x', c.x), ('y', c.y)] {
        // Written so NaN fails too.
        if !(0.0..=max).contains(&value) {
            return Err(SurfdistError::OutOfBounds {
                point,
                axis,
                value,
                max: grid_width,
            });
        }
    }
    Ok(())
}
