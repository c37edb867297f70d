mod environment;
mod material;
mod mesh;
pub mod triangle_bvh;

use crate::geometry::{HitRecord, Ray, WorldBox};

pub use environment::{Environment, Sun};
pub use material::{BsdfSample, Material};
pub use mesh::{Mesh, ObjOpenError};

/// Renderable object
pub trait Object {
    fn intersect(&self, ray: &Ray) -> Option<HitRecord>;
    fn get_bounding_box(&self) -> WorldBox;
}

#[derive(Clone, Debug)]
pub struct Scene<O: Object> {
    pub object: O,
    pub material: Material,
    pub environment: Environment,
}
