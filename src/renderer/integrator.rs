//! Path integrator with guided sampling of continuation directions.

use crate::{
    geometry::{FloatType, HitRecord, Ray, WorldPoint, WorldVector},
    guiding::SpatialBinaryTree,
    scene::{Material, Object, Scene},
    util::{Rgb, multiply_channels},
};

/// Distance along the normal that a continuation ray starts from the surface.
const RAY_OFFSET: FloatType = 1e-4;

/// Scattering event of a path, remembered for recording the radiance once the path escapes.
#[derive(Copy, Clone, Debug)]
pub struct PathVertex {
    pub position: WorldPoint,
    /// Continuation direction chosen at the vertex
    pub direction: WorldVector,
    /// BSDF times cosine over pdf of the continuation
    pub weight: Rgb,
}

/// Guiding structure and how to mix it with BSDF sampling.
#[derive(Copy, Clone, Debug)]
pub struct Guide<'a> {
    pub tree: &'a SpatialBinaryTree,
    pub bsdf_sampling_fraction: FloatType,
}

/// Radiance arriving at the ray origin along the ray.
/// `vertices` is scratch space, it is cleared first.
pub fn trace_path<O: Object>(
    scene: &Scene<O>,
    guide: Option<Guide<'_>>,
    max_depth: u32,
    ray: Ray,
    vertices: &mut Vec<PathVertex>,
    rng: &mut impl rand::Rng,
) -> Rgb {
    let black = Rgb::new(0.0, 0.0, 0.0);
    let mut ray = ray;
    let mut throughput = Rgb::new(1.0, 1.0, 1.0);
    vertices.clear();

    for _ in 0..=max_depth {
        let Some(hit) = scene.object.intersect(&ray) else {
            let radiance = scene.environment.radiance(&ray.direction);
            if let Some(guide) = guide {
                record_path(guide.tree, vertices, radiance);
            }
            return multiply_channels(&throughput, &radiance);
        };

        if let Material::Normals = scene.material {
            return Material::normal_color(&hit.normal);
        }

        let wo = -ray.direction;
        let Some((direction, weight)) = sample_continuation(&scene.material, guide, &hit, &wo, rng)
        else {
            return black;
        };

        vertices.push(PathVertex {
            position: hit.point,
            direction,
            weight,
        });
        throughput = multiply_channels(&throughput, &weight);
        ray = Ray::new(hit.point + hit.normal.as_ref() * RAY_OFFSET, direction);
    }

    black
}

/// Picks the continuation direction and its weight.
/// Non delta materials inside the guided region mix BSDF and guide sampling with one sample
/// MIS, everything else samples the BSDF only.
fn sample_continuation(
    material: &Material,
    guide: Option<Guide<'_>>,
    hit: &HitRecord,
    wo: &WorldVector,
    rng: &mut impl rand::Rng,
) -> Option<(WorldVector, Rgb)> {
    let guide = guide
        .filter(|_| !material.is_delta())
        .filter(|g| g.tree.bounds().contains_half_open(&hit.point));

    let Some(guide) = guide else {
        let sample = material.sample(wo, &hit.normal, rng)?;
        return Some((sample.direction, sample.weight));
    };

    let alpha = guide.bsdf_sampling_fraction;
    let direction = if rng.random::<FloatType>() < alpha {
        material.sample(wo, &hit.normal, rng)?.direction
    } else {
        guide.tree.query_guide_direction(&hit.point, rng)?.0
    };

    let bsdf_pdf = material.pdf(wo, &direction, &hit.normal);
    let guide_pdf = guide.tree.guide_pdf(&hit.point, &direction).unwrap_or(0.0);
    let pdf = alpha * bsdf_pdf + (1.0 - alpha) * guide_pdf;
    if !(pdf > 0.0) {
        return None;
    }

    let value = material.evaluate(wo, &direction, &hit.normal);
    if value == Rgb::new(0.0, 0.0, 0.0) {
        return None;
    }
    Some((direction, value * (1.0 / pdf)))
}

/// Records radiance arriving at every vertex of an escaped path, last vertex first.
fn record_path(tree: &SpatialBinaryTree, vertices: &[PathVertex], escaped: Rgb) {
    let mut radiance = escaped;
    for vertex in vertices.iter().rev() {
        tree.record_sample(&vertex.position, &vertex.direction, &radiance);
        radiance = multiply_channels(&radiance, &vertex.weight);
    }
}
