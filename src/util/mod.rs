mod atomic_float;
mod stats;

pub use atomic_float::AtomicF32;
pub use stats::Stats;

pub type Rgb = rgb::RGB<f32>;
pub type Rgba = rgb::RGBA<f32>;

/// Mean of the color channels, used as the scalar flux of a radiance sample.
pub fn mean_channel(color: &Rgb) -> f32 {
    (color.r + color.g + color.b) / 3.0
}

/// Channel-wise product, used for tinting radiance by an albedo.
pub fn multiply_channels(a: &Rgb, b: &Rgb) -> Rgb {
    Rgb::new(a.r * b.r, a.g * b.g, a.b * b.b)
}
