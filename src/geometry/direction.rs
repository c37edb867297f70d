//! Equal-area mapping between the unit square and the unit sphere of directions.
//! The whole square maps onto the 4π steradians of the sphere, so a uniform density over the
//! square corresponds to the solid-angle density 1 / 4π.

use std::f32::consts::{PI, TAU};

use super::{SquarePoint, WorldVector};

/// Largest float below one, keeps mapped points inside the half-open unit square.
const ONE_MINUS_EPSILON: f32 = 1.0 - f32::EPSILON / 2.0;

pub fn square_to_direction(p: SquarePoint) -> WorldVector {
    let phi = p.x * TAU;
    let cos_theta = 1.0 - 2.0 * p.y;
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();

    WorldVector::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

/// Inverse of [`square_to_direction`]. Direction must be normalized.
pub fn direction_to_square(d: &WorldVector) -> SquarePoint {
    let cos_theta = d.z.clamp(-1.0, 1.0);
    let mut phi = d.y.atan2(d.x);
    if phi < 0.0 {
        phi += TAU;
    }

    SquarePoint::new(
        (phi / TAU).clamp(0.0, ONE_MINUS_EPSILON),
        ((1.0 - cos_theta) / 2.0).clamp(0.0, ONE_MINUS_EPSILON),
    )
}

/// Solid angle density of a uniform distribution over the unit square.
pub const UNIFORM_SPHERE_PDF: f32 = 1.0 / (4.0 * PI);

#[cfg(test)]
mod test {
    use super::*;
    use crate::geometry::test::{nonzero_world_vector, square_point};

    use assert2::assert;
    use test_case::test_case;
    use test_strategy::proptest;

    #[proptest]
    fn round_trip_square(#[strategy(square_point())] p: SquarePoint) {
        let back = direction_to_square(&square_to_direction(p));
        // Longitude is undefined at the poles
        if p.y > 1e-3 && p.y < 1.0 - 1e-3 {
            assert!((back.x - p.x).abs() < 1e-3 || (back.x - p.x).abs() > 1.0 - 1e-3);
        }
        assert!((back.y - p.y).abs() < 1e-3);
    }

    #[proptest]
    fn directions_are_unit(#[strategy(square_point())] p: SquarePoint) {
        assert!((square_to_direction(p).norm() - 1.0).abs() < 1e-4);
    }

    #[proptest]
    fn inverse_stays_in_square(#[strategy(nonzero_world_vector())] d: WorldVector) {
        let p = direction_to_square(&d.normalize());
        assert!(p.x >= 0.0 && p.x < 1.0);
        assert!(p.y >= 0.0 && p.y < 1.0);
    }

    #[test_case(0.0, 0.0, 1.0, 0.0 ; "up")]
    #[test_case(0.0, 0.0, -1.0, 1.0 ; "down")]
    #[test_case(1.0, 0.0, 0.0, 0.5 ; "horizon")]
    fn latitude(x: f32, y: f32, z: f32, expected_v: f32) {
        let p = direction_to_square(&WorldVector::new(x, y, z));
        assert!((p.y - expected_v).abs() < 1e-6);
    }
}
