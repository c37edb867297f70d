mod integrator;
mod machinery;
mod worker;

use std::{num::NonZeroU32, path::PathBuf};

use image::RgbaImage;

use crate::guiding::{GuidingSettings, GuidingStatistics};

pub use crate::renderer::machinery::{Progress, RenderProgress, render};

pub const DEFAULT_TILE_SIZE: NonZeroU32 = NonZeroU32::new(64).unwrap();

/// Largest accepted iteration count, the last iteration then takes `2^31` samples per pixel.
pub const MAX_ITERATIONS: u32 = 32;

#[derive(Clone, Debug, bon::Builder)]
pub struct RenderSettings {
    #[builder(default = DEFAULT_TILE_SIZE)]
    pub tile_size: NonZeroU32,

    /// Number of guiding iterations. Iteration `p` renders `2^p` samples per pixel from
    /// scratch and only the image of the last one is kept.
    /// At most [`MAX_ITERATIONS`].
    #[builder(default = 5)]
    pub iterations: u32,

    /// Maximal number of bounces of a path.
    #[builder(default = 5)]
    pub max_depth: u32,

    /// Without guiding every iteration is a plain BSDF sampled path tracer.
    #[builder(default = true)]
    pub guiding: bool,

    #[builder(default)]
    pub guiding_settings: GuidingSettings,

    /// Directory for quadtree snapshots taken at every iteration boundary.
    pub snapshot_dir: Option<PathBuf>,

    /// Number of worker threads, one per core when unset.
    pub worker_count: Option<usize>,
}

impl RenderSettings {
    /// `2^iteration`, saturating at `u32::MAX`.
    pub fn samples_per_pixel(iteration: u32) -> u32 {
        1u32.checked_shl(iteration).unwrap_or(u32::MAX)
    }
}

/// Result of a finished render.
#[derive(Clone, Debug)]
pub struct RenderOutput {
    pub image: RgbaImage,
    /// Shape of the guiding structure just before the final reset.
    pub guiding_statistics: GuidingStatistics,
}

#[cfg(test)]
mod test {
    use super::*;

    use assert2::assert;
    use test_case::test_case;

    #[test_case(0, 1)]
    #[test_case(5, 32)]
    #[test_case(31, 1 << 31)]
    #[test_case(32, u32::MAX ; "saturates")]
    #[test_case(u32::MAX, u32::MAX ; "saturates_far_out")]
    fn samples_double_each_iteration(iteration: u32, expected: u32) {
        assert!(RenderSettings::samples_per_pixel(iteration) == expected);
    }
}
