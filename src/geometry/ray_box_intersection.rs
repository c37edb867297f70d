use super::{FloatType, Ray, WorldBox, WorldPoint, WorldVector};

pub trait RayIntersectionExt {
    /// Calculate first and last ray intersection with the box
    fn intersect(&self, ray: &Ray) -> (FloatType, FloatType);
}

impl RayIntersectionExt for WorldBox {
    /// Calculates ray intersection with the box.
    /// Returns minimum and maximum distance along the ray, ray intersects if min <= max.
    fn intersect(&self, ray: &Ray) -> (FloatType, FloatType) {
        slab_intersection(self, &ray.origin, &ray.inv_direction)
    }
}

/// Slab test against a box, given the ray origin and componentwise inverse direction.
pub(crate) fn slab_intersection(
    b: &WorldBox,
    origin: &WorldPoint,
    inv_direction: &WorldVector,
) -> (FloatType, FloatType) {
    // The multiplication is NAN if the ray is starting inside the slab bounding plane
    // and is parallel to it. In this case we blend to +-infinity, so that the range becomes infinite
    let to_box_min = (b.min - *origin)
        .component_mul(inv_direction)
        .map(|x| if x.is_nan() { FloatType::NEG_INFINITY } else { x });
    let to_box_max = (b.max - *origin)
        .component_mul(inv_direction)
        .map(|x| if x.is_nan() { FloatType::INFINITY } else { x });

    // Correctly ordered (min_t <= max_t)
    let componentwise_min_t = to_box_min.zip_map(&to_box_max, |a, b| a.min(b));
    let componentwise_max_t = to_box_min.zip_map(&to_box_max, |a, b| a.max(b));

    (componentwise_min_t.max(), componentwise_max_t.min())
}
