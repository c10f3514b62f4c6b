use num_traits::Float;

/// Hermite ease curve `3t² - 2t³`.
///
/// Zero slope at both ends, so adjacent cells meet without a crease.
pub fn ease<T: Float>(t: T) -> T {
    let two = T::one() + T::one();
    let three = two + T::one();
    t * t * (three - two * t)
}

/// Blends the four corners of a cell with eased fractions.
///
/// `a` is the corner at `(x, y)`, `b` at `(x + 1, y)`, `c` at
/// `(x, y + 1)` and `d` at `(x + 1, y + 1)`. `fx` and `fy` are the
/// position inside the cell, each in `[0, 1]`.
pub fn smooth_bilinear<T: Float>(a: T, b: T, c: T, d: T, fx: T, fy: T) -> T {
    let sx = ease(fx);
    let sy = ease(fy);
    a + (b - a) * sx + (c - a) * sy + (a - b - c + d) * sx * sy
}
