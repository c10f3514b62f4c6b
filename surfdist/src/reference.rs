//! CPU reference for the distance kernel.
//!
//! Runs the same algorithm as `shaders/distance.wgsl` on the host, one
//! workgroup at a time. Every phase between two barriers is a plain
//! loop over all lanes of the group, so an idle lane is simply a lane
//! that writes 0. Floating point operations follow the kernel's order,
//! making this the oracle the GPU path is checked against.

use crate::{
    math::smooth_bilinear, Distances, KernelConfig, QueryParams, SurfaceDistance,
    SurfdistError, TileBounds,
};
use geo::geometry::Coord;
use heightmap::Heightmap;
use log::debug;
use rayon::prelude::*;

/// Runs the kernel for every workgroup and returns the per-group
/// partial sums, indexed by group id.
///
/// Fails when `params` was built for another grid or configuration,
/// or when a group's tile would overflow.
pub fn dispatch(
    grid: &Heightmap,
    params: &QueryParams,
    config: &KernelConfig,
) -> Result<Vec<f32>, SurfdistError> {
    check_inputs(grid, params, config)?;
    Ok((0..config.group_count())
        .into_par_iter()
        .map(|group| run_group(grid, params, config, group))
        .collect())
}

/// Returns the total surface distance of the line in `params`.
pub fn distance(
    grid: &Heightmap,
    params: &QueryParams,
    config: &KernelConfig,
) -> Result<f64, SurfdistError> {
    Ok(dispatch(grid, params, config)?
        .into_iter()
        .map(f64::from)
        .sum())
}

fn check_inputs(
    grid: &Heightmap,
    params: &QueryParams,
    config: &KernelConfig,
) -> Result<(), SurfdistError> {
    config.validate(grid.width())?;
    if params.grid_width as usize != grid.width() {
        return Err(SurfdistError::Config(format!(
            "query built for a {}-cell grid, grid is {} cells",
            params.grid_width,
            grid.width()
        )));
    }
    if params.sample_count != config.sample_count {
        return Err(SurfdistError::Config(format!(
            "query built for {} samples, configuration has {}",
            params.sample_count, config.sample_count
        )));
    }
    let (group, bounds) = TileBounds::largest(params, config.workgroup_size);
    if bounds.cells() > config.tile_capacity() {
        return Err(SurfdistError::TileBudget {
            group,
            cells: bounds.cells(),
            capacity: config.tile_capacity(),
        });
    }
    Ok(())
}

/// Returns the height of the eased bilinear surface at `p`, read
/// straight from `grid`.
///
/// Positions past the last cell are clamped onto the grid edge.
pub fn surface_height(grid: &Heightmap, p: Coord<f32>) -> f32 {
    let last = grid.width().saturating_sub(2);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let cell = |v: f32| (v.max(0.0).floor() as usize).min(last);
    let (cx, cy) = (cell(p.x), cell(p.y));
    let corner = |x: usize, y: usize| {
        let x = x.min(grid.width() - 1);
        let y = y.min(grid.width() - 1);
        f32::from(grid.get_unchecked(x, y))
    };
    #[allow(clippy::cast_precision_loss)]
    let (fx, fy) = (
        (p.x - cx as f32).clamp(0.0, 1.0),
        (p.y - cy as f32).clamp(0.0, 1.0),
    );
    smooth_bilinear(
        corner(cx, cy),
        corner(cx + 1, cy),
        corner(cx, cy + 1),
        corner(cx + 1, cy + 1),
        fx,
        fy,
    )
}

fn run_group(grid: &Heightmap, params: &QueryParams, config: &KernelConfig, group: u32) -> f32 {
    let lanes = config.workgroup_size;
    let bounds = TileBounds::for_group(params, lanes, group);

    // Load phase.
    let mut tile = vec![0_u32; config.tile_capacity() as usize];
    for lane in 0..lanes {
        let mut i = lane;
        while i < bounds.cells() {
            let x = (bounds.origin.0 + i % bounds.width) as usize;
            let y = (bounds.origin.1 + i / bounds.width) as usize;
            if let Some(sample) = grid.get(x, y) {
                tile[i as usize] = u32::from(sample);
            }
            i += lanes;
        }
    }

    // Chord phase.
    let mut chords: Vec<f32> = (0..lanes)
        .map(|lane| {
            let sample = group * lanes + lane;
            if sample < params.sample_count {
                chord(params, config, &bounds, &tile, sample)
            } else {
                0.0
            }
        })
        .collect();

    // Reduction phases.
    let mut stride = lanes / 2;
    while stride > 0 {
        for lane in 0..stride as usize {
            chords[lane] += chords[lane + stride as usize];
        }
        stride /= 2;
    }
    chords[0]
}

fn chord(
    params: &QueryParams,
    config: &KernelConfig,
    bounds: &TileBounds,
    tile: &[u32],
    sample: u32,
) -> f32 {
    let p0 = params.position(sample);
    let p1 = params.position(sample + 1);
    let h0 = tile_height(params, bounds, tile, p0);
    let h1 = tile_height(params, bounds, tile, p1);
    let dx = (p1.x - p0.x) * config.meters_per_cell;
    let dy = (p1.y - p0.y) * config.meters_per_cell;
    let dz = (h1 - h0) * config.meters_per_elevation_unit;
    (dx * dx + dy * dy + dz * dz).sqrt()
}

#[allow(clippy::cast_precision_loss)]
fn tile_height(params: &QueryParams, bounds: &TileBounds, tile: &[u32], p: Coord<f32>) -> f32 {
    let last = params.grid_width - 2;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let cell = |v: f32| (v.floor() as u32).min(last);
    let (cx, cy) = (cell(p.x), cell(p.y));
    let i = bounds.local_index(cx, cy);
    let w = bounds.width as usize;
    smooth_bilinear(
        tile[i] as f32,
        tile[i + 1] as f32,
        tile[i + w] as f32,
        tile[i + w + 1] as f32,
        (p.x - cx as f32).clamp(0.0, 1.0),
        (p.y - cy as f32).clamp(0.0, 1.0),
    )
}

/// CPU implementation of [`SurfaceDistance`] over a pre/post grid
/// pair.
pub struct ReferenceSolver {
    pre: Heightmap,
    post: Heightmap,
    config: KernelConfig,
}

impl ReferenceSolver {
    pub fn new(
        pre: Heightmap,
        post: Heightmap,
        config: KernelConfig,
    ) -> Result<Self, SurfdistError> {
        if pre.width() != post.width() {
            return Err(SurfdistError::GridMismatch {
                pre: pre.width(),
                post: post.width(),
            });
        }
        config.validate(pre.width())?;
        Ok(Self { pre, post, config })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn pre(&self) -> &Heightmap {
        &self.pre
    }

    pub fn post(&self) -> &Heightmap {
        &self.post
    }
}

impl SurfaceDistance for ReferenceSolver {
    fn compute_distance(
        &mut self,
        start: Coord<f32>,
        end: Coord<f32>,
    ) -> Result<Distances, SurfdistError> {
        let params = QueryParams::new(start, end, &self.config, self.pre.width())?;
        let now = std::time::Instant::now();
        let (pre, post) = rayon::join(
            || distance(&self.pre, &params, &self.config),
            || distance(&self.post, &params, &self.config),
        );
        debug!(
            "reference distance; groups: {}, exec: {:?}",
            self.config.group_count(),
            now.elapsed()
        );
        Ok(Distances {
            pre: pre?,
            post: post?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{dispatch, distance, surface_height, Heightmap};
    use crate::{KernelConfig, QueryParams, SurfdistError};
    use approx::assert_relative_eq;
    use geo::geometry::Coord;

    fn line(start: (f32, f32), end: (f32, f32), cfg: &KernelConfig, width: usize) -> QueryParams {
        QueryParams::new(
            Coord {
                x: start.0,
                y: start.1,
            },
            Coord { x: end.0, y: end.1 },
            cfg,
            width,
        )
        .unwrap()
    }

    #[test]
    fn test_one_partial_sum_per_group() {
        let cfg = KernelConfig {
            sample_count: 1000,
            workgroup_size: 64,
            ..KernelConfig::default()
        };
        let grid = Heightmap::flat(32, 5);
        let p = line((1.0, 1.0), (30.0, 1.0), &cfg, 32);
        let sums = dispatch(&grid, &p, &cfg).unwrap();
        assert_eq!(sums.len(), 16);
        // Full groups each cover 64/1000 of a 29 cell line.
        assert_relative_eq!(sums[0], 29.0 * 30.0 * 0.064, max_relative = 1e-3);
        // The last group owns only 40 chords.
        assert_relative_eq!(sums[15], 29.0 * 30.0 * 0.040, max_relative = 1e-3);
    }

    #[test]
    fn test_mismatched_inputs_are_errors() {
        let cfg = KernelConfig::default();
        let p = line((0.0, 0.0), (512.0, 512.0), &cfg, 512);

        // Sample count differs from the one the query was built for.
        let coarse = KernelConfig {
            sample_count: 1024,
            ..KernelConfig::default()
        };
        let err = distance(&Heightmap::flat(512, 0), &p, &coarse).unwrap_err();
        assert!(matches!(err, SurfdistError::Config(_)));

        // Full diagonal over 4 groups overflows the tile.
        let unchecked = QueryParams::line(
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 512.0, y: 512.0 },
            &coarse,
            512,
        )
        .unwrap();
        let err = distance(&Heightmap::flat(512, 0), &unchecked, &coarse).unwrap_err();
        assert!(matches!(
            err,
            SurfdistError::TileBudget {
                capacity: 1024,
                ..
            }
        ));

        // Wrong grid.
        let err = distance(&Heightmap::flat(64, 0), &p, &cfg).unwrap_err();
        assert!(matches!(err, SurfdistError::Config(_)));
        let err = distance(&Heightmap::flat(1, 0), &p, &cfg).unwrap_err();
        assert!(matches!(err, SurfdistError::Config(_)));

        assert!(distance(&Heightmap::flat(512, 0), &p, &cfg).is_ok());
    }

    #[test]
    fn test_surface_height_matches_samples_at_cell_corners() {
        let grid = Heightmap::from_fn(8, |x, y| (x * 8 + y) as u8);
        for (x, y) in [(0, 0), (3, 5), (6, 6)] {
            let h = surface_height(
                &grid,
                Coord {
                    x: x as f32,
                    y: y as f32,
                },
            );
            assert_relative_eq!(h, f32::from(grid.get(x, y).unwrap()));
        }
        // Far edge clamps onto the last sample.
        let h = surface_height(&grid, Coord { x: 8.0, y: 8.0 });
        assert_relative_eq!(h, f32::from(grid.get(7, 7).unwrap()));
    }
}
