mod linspace;
mod surface;

pub use {
    linspace::linspace,
    surface::smooth_bilinear,
};
