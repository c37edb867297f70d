mod camera;
pub mod geometry;
pub mod guiding;
mod renderer;
pub mod scene;
mod screen_block;
mod util;

pub use crate::renderer::{
    DEFAULT_TILE_SIZE, MAX_ITERATIONS, Progress, RenderOutput, RenderProgress, RenderSettings,
    render,
};
pub use camera::Camera;
pub use scene::Scene;
pub use util::{Rgb, Rgba, Stats};
