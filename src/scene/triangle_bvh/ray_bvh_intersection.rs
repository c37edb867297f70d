use nalgebra::Unit;

use super::{DualRay, LeafIdx, NodeIdx, TriangleBvh};
use crate::{
    geometry::{FloatType, HitRecord, Ray, WorldBox},
    scene::Object,
};

impl Object for TriangleBvh {
    fn intersect(&self, ray: &Ray) -> Option<HitRecord> {
        let ray = DualRay::new(ray);
        let mut best = LeafHitRecord::default();

        if self.volumes[NodeIdx::ROOT].intersect(&ray).is_some() {
            self.intersect_recursive(NodeIdx::ROOT, &ray, &mut best);
        }

        let triangle = &self.triangles[best.triangle_index?];
        Some(HitRecord {
            t: best.t,
            point: ray.ray.point_at(best.t),
            normal: Unit::new_normalize(triangle.normal()),
        })
    }

    fn get_bounding_box(&self) -> WorldBox {
        self.volumes[NodeIdx::ROOT].bounds.clone()
    }
}

impl TriangleBvh {
    /// Visits the child with the closer entry point first, the other one only if it can
    /// still contain a closer hit.
    fn intersect_recursive(&self, node: NodeIdx, ray: &DualRay, best: &mut LeafHitRecord) {
        if let Some(leaf) = self.leaf_index(node) {
            self.intersect_leaf(leaf, ray, best);
            return;
        }

        let (left, right) = node.children();
        let left_t = self.volumes[left].intersect(ray);
        let right_t = self.volumes[right].intersect(ray);

        match (left_t, right_t) {
            (None, None) => {}
            (Some(_), None) => self.intersect_recursive(left, ray, best),
            (None, Some(_)) => self.intersect_recursive(right, ray, best),
            (Some(left_t), Some(right_t)) => {
                let (near, far, far_t) = if left_t <= right_t {
                    (left, right, right_t)
                } else {
                    (right, left, left_t)
                };

                self.intersect_recursive(near, ray, best);
                if far_t <= best.t {
                    self.intersect_recursive(far, ray, best);
                }
            }
        }
    }

    fn intersect_leaf(&self, leaf: LeafIdx, ray: &DualRay, best: &mut LeafHitRecord) {
        let range = self.leaves[leaf].clone();
        for (index, triangle) in range.clone().zip(&self.triangles[range]) {
            if let Some(t) = triangle.intersect(&ray.ray, best.t) {
                best.t = t;
                best.triangle_index = Some(index);
            }
        }
    }
}

#[derive(Clone, Debug)]
struct LeafHitRecord {
    t: FloatType,
    triangle_index: Option<usize>,
}

impl Default for LeafHitRecord {
    fn default() -> Self {
        LeafHitRecord {
            t: FloatType::INFINITY,
            triangle_index: None,
        }
    }
}
