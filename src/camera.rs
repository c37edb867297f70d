use assert2::assert;
use bon::bon;
use nalgebra::Unit;
use rand_distr::Distribution as _;

use crate::geometry::{EPSILON, FloatType, Ray, ScreenPoint, ScreenSize, WorldPoint, WorldVector};

/// Thin lens camera aimed at a target point.
#[derive(Copy, Clone, Debug)]
pub struct Camera {
    center: WorldPoint,

    resolution: ScreenSize,

    up: Unit<WorldVector>,
    right: Unit<WorldVector>,
    film_origin_offset: WorldVector,

    /// Distance between pixels in meters
    pixel_pitch: FloatType,

    /// Lens radius in meters
    lens_radius: FloatType,
    lens_weight: FloatType,
}

#[bon]
impl Camera {
    /// Panics if the target coincides with the center, if `up` is parallel to the view
    /// direction or on a non-positive size.
    /// Focus distance defaults to the distance of the target, f-number to a pinhole.
    #[builder]
    pub fn new(
        center: WorldPoint,
        target: WorldPoint,
        up: WorldVector,
        resolution: ScreenSize,
        #[builder(default = 36e-3)] film_width: FloatType,
        #[builder(default = 50e-3)] focal_length: FloatType,
        #[builder(default = FloatType::INFINITY)] f_number: FloatType,
        focus_distance: Option<FloatType>,
    ) -> Self {
        let to_target = target - center;
        let focus_distance = focus_distance.unwrap_or_else(|| to_target.norm());

        let forward =
            Unit::try_new(to_target, EPSILON).expect("Target must differ from the camera center");
        let up = Unit::try_new(up, EPSILON).expect("Up vector must be non-zero");
        let right = Unit::try_new(forward.cross(&up), EPSILON)
            .expect("`up` and the view direction must be linearly independent");
        let up = Unit::new_normalize(right.cross(&forward));

        assert!(resolution.x > 0);
        assert!(resolution.y > 0);
        assert!(film_width > 0.0);
        assert!(focal_length > 0.0);
        assert!(f_number > 0.0);
        assert!(focus_distance > 0.0);

        let pixel_pitch = film_width / (resolution.x as FloatType);
        let resolution_minus_one = ScreenSize::new(resolution.x - 1, resolution.y - 1);
        let film_origin_uv = resolution_minus_one.cast::<FloatType>() * pixel_pitch / 2.0;
        let film_origin_offset = -forward.as_ref() * focal_length
            + right.as_ref() * film_origin_uv.x
            - up.as_ref() * film_origin_uv.y;

        Camera {
            center,

            resolution,

            up,
            right,
            film_origin_offset,
            pixel_pitch,
            lens_radius: focal_length / (2.0 * f_number),
            lens_weight: focal_length / focus_distance,
        }
    }
}

impl Camera {
    pub fn get_resolution(&self) -> ScreenSize {
        self.resolution
    }

    /// Samples a new ray from the camera for the given image pixel.
    /// Pixel (0, 0) is in the top left corner of the image.
    pub fn sample_ray(&self, point: &ScreenPoint, rng: &mut impl rand::Rng) -> Ray {
        let film_u = point.x as FloatType + rng.random_range(-0.5..=0.5);
        let film_v = point.y as FloatType + rng.random_range(-0.5..=0.5);
        let film_point_offset = self.film_origin_offset
            + self.up.as_ref() * (film_v * self.pixel_pitch)
            - self.right.as_ref() * (film_u * self.pixel_pitch);

        let lens_uv: [FloatType; 2] = rand_distr::UnitDisc.sample(rng);
        let lens_vector = self.right.as_ref() * (self.lens_radius * lens_uv[0])
            + self.up.as_ref() * (self.lens_radius * lens_uv[1]);

        // All rays from one film point meet at the focus plane, where the ray through the
        // lens center lands
        let direction = -lens_vector * self.lens_weight - film_point_offset;

        Ray::new(self.center + lens_vector, direction)
    }
}
