use std::f32::consts::FRAC_1_PI;

use nalgebra::Unit;
use rand_distr::Distribution as _;

use crate::{
    geometry::{FloatType, WorldVector},
    util::Rgb,
};

/// Surface response of the whole scene.
///
/// Directions follow the path: `wo` points back towards where the path came from,
/// `wi` is the continuation direction. Both are normalized and point away from the surface.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Material {
    /// Shows the geometric normal as a color, the path ends at the first hit.
    Normals,
    /// Lambertian reflector.
    Diffuse { albedo: Rgb },
    /// Perfect specular reflector.
    Mirror { reflectance: Rgb },
}

/// Continuation direction sampled from a material.
#[derive(Copy, Clone, Debug)]
pub struct BsdfSample {
    pub direction: WorldVector,
    /// Solid angle density of the direction, 1 for delta materials.
    pub pdf: FloatType,
    /// BSDF times cosine divided by pdf
    pub weight: Rgb,
}

impl Material {
    /// Delta materials can't be importance sampled from a guiding distribution.
    pub fn is_delta(&self) -> bool {
        matches!(self, Material::Mirror { .. })
    }

    pub fn sample(
        &self,
        wo: &WorldVector,
        normal: &Unit<WorldVector>,
        rng: &mut impl rand::Rng,
    ) -> Option<BsdfSample> {
        match self {
            Material::Normals => None,
            Material::Diffuse { albedo } => {
                let direction = sample_cosine_hemisphere(normal, rng);
                let pdf = cosine_hemisphere_pdf(normal, &direction);
                if pdf <= 0.0 {
                    return None;
                }
                Some(BsdfSample {
                    direction,
                    pdf,
                    weight: *albedo,
                })
            }
            Material::Mirror { reflectance } => {
                let direction = reflect(wo, normal);
                if direction.dot(normal) <= 0.0 {
                    return None;
                }
                Some(BsdfSample {
                    direction,
                    pdf: 1.0,
                    weight: *reflectance,
                })
            }
        }
    }

    /// BSDF times the cosine of `wi`. Zero for delta materials.
    pub fn evaluate(&self, _wo: &WorldVector, wi: &WorldVector, normal: &Unit<WorldVector>) -> Rgb {
        match self {
            Material::Diffuse { albedo } => {
                let cos = wi.dot(normal).max(0.0);
                *albedo * (cos * FRAC_1_PI)
            }
            Material::Normals | Material::Mirror { .. } => Rgb::new(0.0, 0.0, 0.0),
        }
    }

    /// Density of `sample` producing `wi`. Zero for delta materials.
    pub fn pdf(&self, _wo: &WorldVector, wi: &WorldVector, normal: &Unit<WorldVector>) -> FloatType {
        match self {
            Material::Diffuse { .. } => cosine_hemisphere_pdf(normal, wi),
            Material::Normals | Material::Mirror { .. } => 0.0,
        }
    }

    /// Color of the normal visualisation.
    pub fn normal_color(normal: &Unit<WorldVector>) -> Rgb {
        Rgb::new(normal.x + 1.0, normal.y + 1.0, normal.z + 1.0) * 0.5
    }
}

fn reflect(wo: &WorldVector, normal: &Unit<WorldVector>) -> WorldVector {
    normal.as_ref() * (2.0 * wo.dot(normal)) - wo
}

fn cosine_hemisphere_pdf(normal: &Unit<WorldVector>, direction: &WorldVector) -> FloatType {
    direction.dot(normal).max(0.0) * FRAC_1_PI
}

/// Malley's method, disc samples projected up onto the hemisphere.
fn sample_cosine_hemisphere(normal: &Unit<WorldVector>, rng: &mut impl rand::Rng) -> WorldVector {
    let [x, y]: [FloatType; 2] = rand_distr::UnitDisc.sample(rng);
    let z = (1.0 - x * x - y * y).max(0.0).sqrt();
    let (tangent, bitangent) = orthonormal_basis(normal);
    (tangent * x + bitangent * y + normal.as_ref() * z).normalize()
}

/// Two unit vectors perpendicular to the normal and to each other.
/// Duff et al., "Building an Orthonormal Basis, Revisited"
fn orthonormal_basis(normal: &Unit<WorldVector>) -> (WorldVector, WorldVector) {
    let sign = 1.0f32.copysign(normal.z);
    let a = -1.0 / (sign + normal.z);
    let b = normal.x * normal.y * a;
    (
        WorldVector::new(1.0 + sign * normal.x * normal.x * a, sign * b, -sign * normal.x),
        WorldVector::new(b, sign + normal.y * normal.y * a, -normal.y),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::geometry::test::nonzero_world_vector;

    use assert2::{assert, let_assert};
    use rand::{SeedableRng as _, rngs::SmallRng};
    use test_case::test_case;
    use test_strategy::proptest;

    fn up() -> Unit<WorldVector> {
        Unit::new_normalize(WorldVector::new(0.0, 0.0, 1.0))
    }

    #[proptest]
    fn basis_is_orthonormal(#[strategy(nonzero_world_vector())] n: WorldVector) {
        let n = Unit::new_normalize(n);
        let (t, b) = orthonormal_basis(&n);
        assert!((t.norm() - 1.0).abs() < 1e-4);
        assert!((b.norm() - 1.0).abs() < 1e-4);
        assert!(t.dot(&b).abs() < 1e-4);
        assert!(t.dot(&n).abs() < 1e-4);
        assert!(b.dot(&n).abs() < 1e-4);
    }

    #[test]
    fn diffuse_samples_stay_above_surface() {
        let material = Material::Diffuse {
            albedo: Rgb::new(0.5, 0.5, 0.5),
        };
        let mut rng = SmallRng::seed_from_u64(1);
        let wo = WorldVector::new(0.0, 0.0, 1.0);
        for _ in 0..1000 {
            let_assert!(Some(sample) = material.sample(&wo, &up(), &mut rng));
            assert!(sample.direction.z >= 0.0);
            assert!((sample.pdf - material.pdf(&wo, &sample.direction, &up())).abs() < 1e-5);
        }
    }

    #[test]
    fn diffuse_weight_matches_evaluate_over_pdf() {
        let material = Material::Diffuse {
            albedo: Rgb::new(0.2, 0.4, 0.8),
        };
        let wo = WorldVector::new(0.0, 0.0, 1.0);
        let wi = WorldVector::new(0.6, 0.0, 0.8);
        let f = material.evaluate(&wo, &wi, &up());
        let pdf = material.pdf(&wo, &wi, &up());
        let ratio = f * (1.0 / pdf);
        assert!((ratio.r - 0.2).abs() < 1e-5);
        assert!((ratio.b - 0.8).abs() < 1e-5);
    }

    #[test]
    fn mirror_reflects() {
        let material = Material::Mirror {
            reflectance: Rgb::new(1.0, 1.0, 1.0),
        };
        let mut rng = SmallRng::seed_from_u64(1);
        let wo = WorldVector::new(1.0, 0.0, 1.0).normalize();
        let_assert!(Some(sample) = material.sample(&wo, &up(), &mut rng));
        assert!((sample.direction - WorldVector::new(-1.0, 0.0, 1.0).normalize()).norm() < 1e-5);
        assert!(material.is_delta());
        assert!(material.pdf(&wo, &sample.direction, &up()) == 0.0);
    }

    #[test_case(Material::Normals, false)]
    #[test_case(Material::Diffuse { albedo: Rgb::new(1.0, 1.0, 1.0) }, false)]
    #[test_case(Material::Mirror { reflectance: Rgb::new(1.0, 1.0, 1.0) }, true)]
    fn delta_materials(material: Material, expected: bool) {
        assert!(material.is_delta() == expected);
    }

    #[test]
    fn normal_colors_are_in_unit_range() {
        let c = Material::normal_color(&up());
        assert!(c == Rgb::new(0.5, 0.5, 1.0));
    }
}
