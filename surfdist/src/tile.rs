use crate::QueryParams;

/// Grid cells a workgroup stages into group-local memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileBounds {
    /// Lowest `(x, y)` cell of the tile.
    pub origin: (u32, u32),
    pub width: u32,
    pub height: u32,
}

impl TileBounds {
    /// Returns the tile of `group`, computed the same way the kernel
    /// does.
    ///
    /// The tile spans the cells under the group's chords plus the
    /// `+1` corner interpolation reads, is clamped to the grid, and is
    /// never smaller than 2x2.
    pub fn for_group(params: &QueryParams, workgroup_size: u32, group: u32) -> Self {
        let first = group * workgroup_size;
        let last = (first + workgroup_size).min(params.sample_count);
        let a = params.position(first);
        let b = params.position(last);
        let top = params.grid_width - 1;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let lo = |u: f32, v: f32| (u.min(v).floor() as u32).min(top - 1);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let hi = |u: f32, v: f32| (u.max(v).floor() as u32 + 1).min(top);
        let origin = (lo(a.x, b.x), lo(a.y, b.y));
        let end = (hi(a.x, b.x), hi(a.y, b.y));
        Self {
            origin,
            width: end.0 - origin.0 + 1,
            height: end.1 - origin.1 + 1,
        }
    }

    /// Returns the group with the largest tile for the line in
    /// `params`, and that tile.
    pub fn largest(params: &QueryParams, workgroup_size: u32) -> (u32, Self) {
        (0..params.sample_count.div_ceil(workgroup_size))
            .map(|group| (group, Self::for_group(params, workgroup_size, group)))
            .max_by_key(|(_, bounds)| bounds.cells())
            .unwrap_or((0, Self::for_group(params, workgroup_size, 0)))
    }

    pub fn cells(&self) -> u32 {
        self.width * self.height
    }

    /// Returns the tile-local index of grid cell `(x, y)`.
    pub fn local_index(&self, x: u32, y: u32) -> usize {
        ((x - self.origin.0) + (y - self.origin.1) * self.width) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::TileBounds;
    use crate::{KernelConfig, QueryParams};
    use geo::geometry::Coord;

    fn params(start: (f32, f32), end: (f32, f32), cfg: &KernelConfig, width: usize) -> QueryParams {
        QueryParams::line(
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
    fn test_degenerate_segment_is_2x2() {
        let cfg = KernelConfig::default();
        let p = params((100.5, 200.5), (100.5, 200.5), &cfg, 512);
        let t = TileBounds::for_group(&p, cfg.workgroup_size, 0);
        assert_eq!(t.origin, (100, 200));
        assert_eq!((t.width, t.height), (2, 2));
    }

    #[test]
    fn test_far_corner_stays_on_grid() {
        let cfg = KernelConfig::default();
        for (start, end) in [
            ((511.0, 511.0), (512.0, 512.0)),
            ((512.0, 512.0), (512.0, 512.0)),
            ((0.0, 512.0), (512.0, 0.0)),
        ] {
            let p = params(start, end, &cfg, 512);
            for g in 0..cfg.group_count() {
                let t = TileBounds::for_group(&p, cfg.workgroup_size, g);
                assert!(t.width >= 2 && t.height >= 2);
                assert!(t.origin.0 + t.width <= 512, "{t:?}");
                assert!(t.origin.1 + t.height <= 512, "{t:?}");
            }
        }
    }

    #[test]
    fn test_diagonal_fits_tile_capacity() {
        let cfg = KernelConfig::default();
        let p = params((0.0, 0.0), (512.0, 512.0), &cfg, 512);
        let (_, largest) = TileBounds::largest(&p, cfg.workgroup_size);
        for g in 0..cfg.group_count() {
            let t = TileBounds::for_group(&p, cfg.workgroup_size, g);
            assert!(t.cells() <= largest.cells());
        }
        assert!(largest.cells() <= cfg.tile_capacity());
    }

    #[test]
    fn test_largest_tile_grows_with_line_length() {
        let cfg = KernelConfig {
            sample_count: 1024,
            ..KernelConfig::default()
        };
        let short = params((167.0, 316.0), (317.0, 316.0), &cfg, 512);
        let (_, t) = TileBounds::largest(&short, cfg.workgroup_size);
        // Slices starting mid-cell straddle one more column.
        assert_eq!((t.width, t.height), (40, 2));

        let diagonal = params((0.0, 0.0), (512.0, 512.0), &cfg, 512);
        let (_, t) = TileBounds::largest(&diagonal, cfg.workgroup_size);
        assert_eq!(t.cells(), 130 * 130);
    }

    #[test]
    fn test_last_group_clipped_to_end() {
        // 1000 samples over 256-wide groups: the last group owns only
        // 232 chords and must not reach past the end point.
        let cfg = KernelConfig {
            sample_count: 1000,
            ..KernelConfig::default()
        };
        let p = params((0.0, 10.0), (60.0, 10.0), &cfg, 64);
        let last = TileBounds::for_group(&p, cfg.workgroup_size, cfg.group_count() - 1);
        assert_eq!(last.origin.0, 46);
        assert_eq!(last.origin.0 + last.width - 1, 61);
    }

    #[test]
    fn test_local_index() {
        let t = TileBounds {
            origin: (10, 20),
            width: 4,
            height: 3,
        };
        assert_eq!(t.local_index(10, 20), 0);
        assert_eq!(t.local_index(13, 20), 3);
        assert_eq!(t.local_index(10, 21), 4);
        assert_eq!(t.local_index(13, 22), 11);
    }
}
