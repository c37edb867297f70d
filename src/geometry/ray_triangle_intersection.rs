use super::{FloatType, Ray, Triangle, WorldPoint, WorldVector};

impl Triangle<WorldPoint> {
    /// Calculates ray intersection with the (one sided) triangle.
    /// Returns distance along the ray if it hits the front face closer than `max_t`.
    /// Triangles seen from the back (non-positive determinant) and degenerate triangles
    /// never intersect.
    /// Adapted from https://en.wikipedia.org/wiki/M%C3%B6ller%E2%80%93Trumbore_intersection_algorithm
    pub fn intersect(&self, ray: &Ray, max_t: FloatType) -> Option<FloatType> {
        let [e1, e2] = self.edges();

        let ray_cross_e2 = ray.direction.cross(&e2);
        let det = e1.dot(&ray_cross_e2);
        if det <= 0.0 {
            return None;
        }

        let inv_det = 1.0 / det;
        let s: WorldVector = ray.origin - self[0];
        let u = inv_det * s.dot(&ray_cross_e2);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let s_cross_e1 = s.cross(&e1);
        let v = inv_det * ray.direction.dot(&s_cross_e1);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = inv_det * e2.dot(&s_cross_e1);
        if t <= 0.0 || t >= max_t {
            return None;
        }

        Some(t)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use assert2::{assert, let_assert};
    use test_case::test_case;

    fn unit_triangle() -> Triangle<WorldPoint> {
        Triangle::new(
            WorldPoint::new(0.0, 0.0, 0.0),
            WorldPoint::new(1.0, 0.0, 0.0),
            WorldPoint::new(0.0, 1.0, 0.0),
        )
    }

    #[test]
    fn front_hit() {
        let ray = Ray::new(
            WorldPoint::new(0.2, 0.2, 1.0),
            WorldVector::new(0.0, 0.0, -1.0),
        );
        let_assert!(Some(t) = unit_triangle().intersect(&ray, FloatType::INFINITY));
        assert!((t - 1.0).abs() < 1e-6);
    }

    #[test]
    fn back_face_is_culled() {
        let ray = Ray::new(
            WorldPoint::new(0.2, 0.2, -1.0),
            WorldVector::new(0.0, 0.0, 1.0),
        );
        assert!(unit_triangle().intersect(&ray, FloatType::INFINITY).is_none());
    }

    #[test]
    fn degenerate_triangle_never_hits() {
        let t = Triangle::new(
            WorldPoint::new(0.0, 0.0, 0.0),
            WorldPoint::new(1.0, 0.0, 0.0),
            WorldPoint::new(2.0, 0.0, 0.0),
        );
        let ray = Ray::new(
            WorldPoint::new(0.5, 0.0, 1.0),
            WorldVector::new(0.0, 0.0, -1.0),
        );
        assert!(t.intersect(&ray, FloatType::INFINITY).is_none());
    }

    #[test]
    fn behind_origin_misses() {
        let ray = Ray::new(
            WorldPoint::new(0.2, 0.2, -1.0),
            WorldVector::new(0.0, 0.0, -1.0),
        );
        assert!(unit_triangle().intersect(&ray, FloatType::INFINITY).is_none());
    }

    #[test]
    fn farther_than_max_t_misses() {
        let ray = Ray::new(
            WorldPoint::new(0.2, 0.2, 1.0),
            WorldVector::new(0.0, 0.0, -1.0),
        );
        assert!(unit_triangle().intersect(&ray, 0.5).is_none());
    }

    #[test_case(0.6, 0.6 ; "beyond_hypotenuse")]
    #[test_case(-0.1, 0.2 ; "left_of_triangle")]
    #[test_case(0.2, -0.1 ; "below_triangle")]
    fn outside_misses(x: f32, y: f32) {
        let ray = Ray::new(WorldPoint::new(x, y, 1.0), WorldVector::new(0.0, 0.0, -1.0));
        assert!(unit_triangle().intersect(&ray, FloatType::INFINITY).is_none());
    }
}
