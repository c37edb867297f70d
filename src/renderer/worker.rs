use image::RgbaImage;
use rand::{SeedableRng, rngs::SmallRng};

use crate::{
    camera::Camera,
    geometry::{ScreenBlock, ScreenPoint},
    renderer::integrator::{Guide, PathVertex, trace_path},
    scene::{Object, Scene},
    screen_block::ScreenBlockExt as _,
    util::{Rgb, Rgba},
};

pub struct Worker {
    rng: SmallRng,
    vertices: Vec<PathVertex>,
}

impl Worker {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_os_rng(),
            vertices: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            vertices: Vec::new(),
        }
    }

    /// Renders the tile into the top left corner of the buffer.
    #[allow(clippy::too_many_arguments)]
    pub fn render_tile<O: Object>(
        &mut self,
        scene: &Scene<O>,
        camera: &Camera,
        guide: Option<Guide<'_>>,
        max_depth: u32,
        samples_per_pixel: u32,
        tile: &ScreenBlock,
        buffer: &mut RgbaImage,
    ) {
        for point in tile.internal_points() {
            let mut pixel_sum = Rgb::new(0.0, 0.0, 0.0);
            for _i in 0..samples_per_pixel {
                pixel_sum += self.render_sample(scene, camera, guide, max_depth, &point);
            }
            let pixel = pixel_sum * (1.0 / samples_per_pixel as f32);

            let buffer_position = point - tile.min;
            buffer.put_pixel(
                buffer_position.x,
                buffer_position.y,
                color_to_image(pixel.alpha(1.0)),
            );
        }
    }

    fn render_sample<O: Object>(
        &mut self,
        scene: &Scene<O>,
        camera: &Camera,
        guide: Option<Guide<'_>>,
        max_depth: u32,
        point: &ScreenPoint,
    ) -> Rgb {
        let ray = camera.sample_ray(point, &mut self.rng);
        let radiance = trace_path(
            scene,
            guide,
            max_depth,
            ray,
            &mut self.vertices,
            &mut self.rng,
        );

        // A single NaN would poison the whole pixel
        if radiance.r.is_finite() && radiance.g.is_finite() && radiance.b.is_finite() {
            radiance
        } else {
            Rgb::new(0.0, 0.0, 0.0)
        }
    }
}

/// Maps a 0-1 f32 rgba pixel to pixel type compatible with module image.
pub fn color_to_image(color: Rgba) -> image::Rgba<u8> {
    image::Rgba([
        (color.r * 255.0).round().clamp(0.0, 255.0) as u8,
        (color.g * 255.0).round().clamp(0.0, 255.0) as u8,
        (color.b * 255.0).round().clamp(0.0, 255.0) as u8,
        (color.a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        geometry::{ScreenSize, Triangle, WorldPoint, WorldVector},
        scene::{Environment, Material, Mesh, triangle_bvh::TriangleBvh},
    };

    use assert2::assert;
    use test_case::test_case;

    #[test_case(Rgba::new(0.0, 0.0, 0.0, 0.0), [0, 0, 0, 0])]
    #[test_case(Rgba::new(1.0, 0.5, 2.0, 1.0), [255, 128, 255, 255])]
    #[test_case(Rgba::new(-1.0, 0.2, 0.0, 1.0), [0, 51, 0, 255])]
    fn pixel_conversion(color: Rgba, expected: [u8; 4]) {
        assert!(color_to_image(color).0 == expected);
    }

    #[test]
    fn tile_of_sky() {
        let scene = Scene {
            object: TriangleBvh::new(&Mesh::new(
                vec![
                    WorldPoint::new(0.0, 0.0, -100.0),
                    WorldPoint::new(1.0, 0.0, -100.0),
                    WorldPoint::new(0.0, 1.0, -100.0),
                ],
                vec![Triangle::new(0, 1, 2)],
            )),
            material: Material::Normals,
            environment: Environment::Uniform(Rgb::new(0.2, 0.4, 0.6)),
        };
        let camera = Camera::builder()
            .center(WorldPoint::new(0.0, 0.0, 0.0))
            .target(WorldPoint::new(0.0, 1.0, 0.0))
            .up(WorldVector::new(0.0, 0.0, 1.0))
            .resolution(ScreenSize::new(8, 8))
            .build();
        let tile = ScreenBlock::new(ScreenPoint::new(2, 2), ScreenPoint::new(6, 6));
        let mut buffer = RgbaImage::new(4, 4);

        Worker::with_seed(0).render_tile(&scene, &camera, None, 3, 2, &tile, &mut buffer);

        for pixel in buffer.pixels() {
            assert!(pixel.0 == [51, 102, 153, 255]);
        }
    }
}
