//! Bounding volumes kept in two bases: the world axes and the world axes rotated by 45 degrees
//! around the (1, 1, 1) diagonal. Diagonally oriented geometry that fits its axis aligned box
//! poorly usually fits the rotated one better, so testing both prunes more rays.

use std::{f32::consts::FRAC_PI_4, sync::LazyLock};

use nalgebra::{Rotation3, Unit};

use crate::geometry::{FloatType, Ray, Triangle, WorldBox, WorldPoint, WorldVector};
use crate::geometry::slab_intersection;

static ROTATION_45: LazyLock<Rotation3<FloatType>> = LazyLock::new(|| {
    Rotation3::from_axis_angle(
        &Unit::new_normalize(WorldVector::new(1.0, 1.0, 1.0)),
        FRAC_PI_4,
    )
});

/// Slack of the slab tests, relative to the magnitude of the coordinates involved.
/// Covers the rounding of the rotated vertices, of the rotated ray and of the slab test itself,
/// so that rays hitting a triangle exactly on an edge or vertex are never rejected.
const SLAB_PADDING: FloatType = 1e-5;

fn rotate45(p: &WorldPoint) -> WorldPoint {
    ROTATION_45.transform_point(p)
}

/// Box grown by an absolute margin on every side.
fn padded(bounds: &WorldBox, margin: FloatType) -> WorldBox {
    let margin = WorldVector::repeat(margin);
    WorldBox::new(bounds.min - margin, bounds.max + margin)
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundingVolume {
    pub bounds: WorldBox,
    pub bounds45: WorldBox,
    /// Largest distance of a contained vertex from the origin.
    magnitude: FloatType,
}

impl BoundingVolume {
    /// Volume that contains nothing and is never intersected.
    pub fn empty() -> BoundingVolume {
        BoundingVolume {
            bounds: WorldBox::empty(),
            bounds45: WorldBox::empty(),
            magnitude: 0.0,
        }
    }

    pub fn from_triangles<'a>(
        triangles: impl IntoIterator<Item = &'a Triangle<WorldPoint>>,
    ) -> BoundingVolume {
        let mut ret = BoundingVolume::empty();
        for p in triangles.into_iter().flat_map(|t| t.iter()) {
            ret.bounds.add_point(p);
            ret.bounds45.add_point(&rotate45(p));
            ret.magnitude = ret.magnitude.max(p.coords.norm());
        }
        ret
    }

    pub fn merge(a: &BoundingVolume, b: &BoundingVolume) -> BoundingVolume {
        BoundingVolume {
            bounds: a.bounds.union(&b.bounds),
            bounds45: a.bounds45.union(&b.bounds45),
            magnitude: a.magnitude.max(b.magnitude),
        }
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| self.bounds.min[i] > self.bounds.max[i])
    }

    /// Intersects the ray with the volume in both bases.
    /// Returns the entry distance (clamped to zero when the ray starts inside) if the ray overlaps
    /// the volume in front of its origin.
    /// The test is conservative: both boxes are padded by a margin proportional to the
    /// coordinates of the volume and of the ray origin.
    pub fn intersect(&self, ray: &DualRay) -> Option<FloatType> {
        if self.is_empty() {
            return None;
        }

        let margin = SLAB_PADDING * (self.magnitude + ray.magnitude);

        let (t1, t2) = slab_intersection(
            &padded(&self.bounds, margin),
            &ray.ray.origin,
            &ray.ray.inv_direction,
        );
        let mut entry = t1.max(0.0);
        let mut exit = t2;
        if !(exit > 0.0 && entry <= exit) {
            return None;
        }

        let (t1, t2) = slab_intersection(
            &padded(&self.bounds45, margin),
            &ray.origin45,
            &ray.inv_direction45,
        );
        entry = entry.max(t1);
        exit = exit.min(t2);
        if exit > 0.0 && entry <= exit {
            Some(entry)
        } else {
            None
        }
    }
}

/// Ray together with its copy in the rotated basis.
#[derive(Copy, Clone, Debug)]
pub struct DualRay {
    pub ray: Ray,
    origin45: WorldPoint,
    inv_direction45: WorldVector,
    /// Distance of the origin from the world origin
    magnitude: FloatType,
}

impl DualRay {
    pub fn new(ray: &Ray) -> DualRay {
        let rotated = Ray::new(rotate45(&ray.origin), ROTATION_45.transform_vector(&ray.direction));
        DualRay {
            ray: *ray,
            origin45: rotated.origin,
            inv_direction45: rotated.inv_direction,
            magnitude: ray.origin.coords.norm(),
        }
    }
}
