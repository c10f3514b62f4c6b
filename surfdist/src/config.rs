//! Kernel configuration.
//!
//! Everything here is fixed once a [`Solver`](crate::Solver) is
//! built. Array sizes are substituted into the WGSL template and
//! scale factors are passed as pipeline `override` constants, so the
//! kernel never sees a runtime-evaluated string.

use crate::SurfdistError;
use std::{collections::HashMap, fmt, mem::size_of};

const SHADER_TEMPLATE: &str = include_str!("shaders/distance.wgsl");

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelConfig {
    /// Threads per workgroup. Must be a power of two for the tree
    /// reduction.
    pub workgroup_size: u32,

    /// Number of chords the line is split into.
    pub sample_count: u32,

    /// Side of the square group-local tile cache, in cells.
    pub tile_side: u32,

    /// Horizontal distance covered by one grid cell.
    pub meters_per_cell: f32,

    /// Vertical distance covered by one elevation unit.
    pub meters_per_elevation_unit: f32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            workgroup_size: 256,
            sample_count: 8192,
            tile_side: 32,
            meters_per_cell: 30.0,
            meters_per_elevation_unit: 11.0,
        }
    }
}

impl KernelConfig {
    /// Number of workgroups dispatched per dataset.
    pub fn group_count(&self) -> u32 {
        self.sample_count.div_ceil(self.workgroup_size)
    }

    /// Number of cells the group-local tile can hold.
    pub fn tile_capacity(&self) -> u32 {
        self.tile_side * self.tile_side
    }

    /// Bytes of group-local memory the kernel declares.
    pub fn workgroup_storage_bytes(&self) -> u32 {
        (self.tile_capacity() + self.workgroup_size) * size_of::<u32>() as u32
    }

    /// Checks this configuration against a grid of `grid_width`.
    ///
    /// Whether a particular line fits the tile depends on its length,
    /// so that check happens per query in
    /// [`QueryParams::new`](crate::QueryParams::new).
    pub fn validate(&self, grid_width: usize) -> Result<(), SurfdistError> {
        if !self.workgroup_size.is_power_of_two() {
            return Err(config_err(format!(
                "workgroup size {} is not a power of two",
                self.workgroup_size
            )));
        }
        if self.sample_count == 0 {
            return Err(config_err("sample count must be positive"));
        }
        if self.tile_side < 2 {
            return Err(config_err("tile side must be at least 2 cells"));
        }
        if grid_width < 2 {
            return Err(config_err(format!(
                "grid width {grid_width} is below the 2 cells interpolation needs"
            )));
        }
        if !(self.meters_per_cell.is_finite() && self.meters_per_elevation_unit.is_finite()) {
            return Err(config_err("scale factors must be finite"));
        }
        Ok(())
    }

    /// Checks this configuration against device limits.
    pub fn validate_limits(&self, limits: &wgpu::Limits) -> Result<(), SurfdistError> {
        if self.workgroup_size > limits.max_compute_invocations_per_workgroup
            || self.workgroup_size > limits.max_compute_workgroup_size_x
        {
            return Err(config_err(format!(
                "workgroup size {} exceeds device limit {}",
                self.workgroup_size,
                limits
                    .max_compute_invocations_per_workgroup
                    .min(limits.max_compute_workgroup_size_x)
            )));
        }
        if self.workgroup_storage_bytes() > limits.max_compute_workgroup_storage_size {
            return Err(config_err(format!(
                "kernel needs {} bytes of workgroup storage, device allows {}",
                self.workgroup_storage_bytes(),
                limits.max_compute_workgroup_storage_size
            )));
        }
        if self.group_count() > limits.max_compute_workgroups_per_dimension {
            return Err(config_err(format!(
                "{} workgroups exceed device limit {}",
                self.group_count(),
                limits.max_compute_workgroups_per_dimension
            )));
        }
        Ok(())
    }

    /// Returns the WGSL source with array sizes filled in.
    pub fn shader_source(&self) -> String {
        SHADER_TEMPLATE
            .replace("{{WORKGROUP_SIZE}}", &self.workgroup_size.to_string())
            .replace("{{TILE_CAPACITY}}", &self.tile_capacity().to_string())
    }

    /// Returns the `override` constants for
    /// `PipelineCompilationOptions::constants`.
    pub fn as_constants(&self) -> HashMap<String, f64> {
        HashMap::from([
            (
                "METERS_PER_CELL".to_string(),
                f64::from(self.meters_per_cell),
            ),
            (
                "METERS_PER_ELEVATION_UNIT".to_string(),
                f64::from(self.meters_per_elevation_unit),
            ),
        ])
    }
}

impl fmt::Display for KernelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples, {} x {} groups, {}² tile, {} m/cell, {} m/unit",
            self.sample_count,
            self.group_count(),
            self.workgroup_size,
            self.tile_side,
            self.meters_per_cell,
            self.meters_per_elevation_unit
        )
    }
}

fn config_err<S: Into<String>>(msg: S) -> SurfdistError {
    SurfdistError::Config(msg.into())
}
