use std::ops::Sub;

use nalgebra::{ClosedAddAssign, ClosedDivAssign, DefaultAllocator, DimName, OPoint, Point, Scalar};
use nalgebra::allocator::Allocator;
use num_traits::{Bounded, One};

use super::{FloatType, SquarePoint, WorldPoint, WorldVector};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AABB<Point> {
    pub min: Point,
    pub max: Point,
}

impl<Point> AABB<Point> {
    pub fn new(min: Point, max: Point) -> AABB<Point> {
        AABB { min, max }
    }
}

impl<T: Scalar + PartialOrd + Copy + Bounded, D: DimName> AABB<OPoint<T, D>>
where
    DefaultAllocator: Allocator<D>,
{
    /// Box that contains nothing and is the identity of [`AABB::union`].
    pub fn empty() -> Self {
        AABB {
            min: OPoint::from(nalgebra::OVector::<T, D>::repeat(T::max_value())),
            max: OPoint::from(nalgebra::OVector::<T, D>::repeat(T::min_value())),
        }
    }

    /// Smallest box containing all the points, None if the iterator is empty.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a OPoint<T, D>>) -> Option<Self>
    where
        T: 'a,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?.clone();
        let mut ret = AABB {
            min: first.clone(),
            max: first,
        };
        for p in iter {
            ret.add_point(p);
        }
        Some(ret)
    }

    pub fn add_point(&mut self, p: &OPoint<T, D>) {
        self.min.coords.zip_apply(&p.coords, |a, b| {
            if b < *a {
                *a = b
            }
        });
        self.max.coords.zip_apply(&p.coords, |a, b| {
            if b > *a {
                *a = b
            }
        });
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut ret = self.clone();
        ret.add_point(&other.min);
        ret.add_point(&other.max);
        ret
    }

    /// Closed containment test
    pub fn contains(&self, p: &OPoint<T, D>) -> bool {
        self.min.coords.iter().zip(p.coords.iter()).all(|(a, b)| a <= b)
            && self.max.coords.iter().zip(p.coords.iter()).all(|(a, b)| b <= a)
    }

    /// Containment test with the max faces excluded, so that sibling boxes sharing a face never
    /// both contain a point.
    pub fn contains_half_open(&self, p: &OPoint<T, D>) -> bool {
        self.min.coords.iter().zip(p.coords.iter()).all(|(a, b)| a <= b)
            && self.max.coords.iter().zip(p.coords.iter()).all(|(a, b)| b < a)
    }
}

impl<Point: Sub + Copy> AABB<Point> {
    pub fn size(&self) -> Point::Output {
        self.max - self.min
    }
}

impl<T: Scalar + ClosedAddAssign + ClosedDivAssign + One, const D: usize> AABB<Point<T, D>> {
    pub fn center(&self) -> Point<T, D> {
        let two = T::one() + T::one();
        let avg_coords = (&self.min.coords + &self.max.coords) / two;
        Point::from(avg_coords)
    }
}

impl AABB<WorldPoint> {
    /// Splits the box in half along the given axis, returns (lower half, upper half).
    pub fn bisect(&self, axis: usize) -> (Self, Self) {
        let middle = (self.min[axis] + self.max[axis]) * 0.5;

        let mut lower = self.clone();
        lower.max[axis] = middle;
        let mut upper = self.clone();
        upper.min[axis] = middle;

        (lower, upper)
    }

    /// Grows the box by a relative margin of its largest side on every side.
    pub fn inflate(&self, relative_margin: FloatType) -> Self {
        let margin = self.size().max() * relative_margin;
        let margin = WorldVector::repeat(margin.max(FloatType::EPSILON));
        AABB {
            min: self.min - margin,
            max: self.max + margin,
        }
    }

    pub fn volume(&self) -> FloatType {
        self.size().product()
    }
}

impl AABB<SquarePoint> {
    /// Splits the box into four quadrants.
    /// Order is low-u/low-v, high-u/low-v, low-u/high-v, high-u/high-v.
    pub fn quadrants(&self) -> [Self; 4] {
        let c = self.center();
        [
            AABB::new(self.min, c),
            AABB::new(SquarePoint::new(c.x, self.min.y), SquarePoint::new(self.max.x, c.y)),
            AABB::new(SquarePoint::new(self.min.x, c.y), SquarePoint::new(c.x, self.max.y)),
            AABB::new(c, self.max),
        ]
    }

    pub fn area(&self) -> FloatType {
        self.size().product()
    }
}

impl<Point> From<[Point; 2]> for AABB<Point> {
    fn from(value: [Point; 2]) -> Self {
        let [min, max] = value;
        AABB { min, max }
    }
}

impl<Point> From<(Point, Point)> for AABB<Point> {
    fn from(value: (Point, Point)) -> Self {
        let (min, max) = value;
        AABB { min, max }
    }
}
