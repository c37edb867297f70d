use nalgebra::Unit;

use crate::{
    geometry::{FloatType, WorldVector},
    util::Rgb,
};

/// Light arriving from infinity, the only light source of the scene.
/// Up is +Z.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Environment {
    Uniform(Rgb),
    Sky {
        zenith: Rgb,
        horizon: Rgb,
        sun: Option<Sun>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sun {
    pub direction: Unit<WorldVector>,
    /// Cosine of the angular radius of the disc
    pub cos_radius: FloatType,
    pub radiance: Rgb,
}

impl Environment {
    /// Radiance arriving along `-direction`, i.e. seen when looking along `direction`.
    pub fn radiance(&self, direction: &WorldVector) -> Rgb {
        match self {
            Environment::Uniform(color) => *color,
            Environment::Sky {
                zenith,
                horizon,
                sun,
            } => {
                let t = direction.z.clamp(0.0, 1.0);
                let sky = *horizon * (1.0 - t) + *zenith * t;
                match sun {
                    Some(sun) if direction.dot(&sun.direction) >= sun.cos_radius => {
                        sky + sun.radiance
                    }
                    _ => sky,
                }
            }
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Sky {
            zenith: Rgb::new(0.35, 0.55, 1.0),
            horizon: Rgb::new(1.0, 1.0, 1.0),
            sun: None,
        }
    }
}
