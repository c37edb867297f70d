//! Bounding volume hierarchy over scene triangles.
//!
//! The tree is complete and stored as a binary heap: node `i` has children `2i + 1` and
//! `2i + 2`, the last `leaf_count` nodes are leaves. Each leaf owns a contiguous range of the
//! reordered triangle array. The tree is built once and never modified afterwards.

mod bounding_volume;
mod building;
mod printing;
mod ray_bvh_intersection;

use std::{num::NonZeroUsize, ops::Range};

use index_vec::IndexVec;

use crate::geometry::{Triangle, WorldPoint};

pub use bounding_volume::{BoundingVolume, DualRay};
pub use printing::BvhStatistics;

/// Default leaf capacity, empirically the best value.
pub const TRIANGLES_PER_LEAF: NonZeroUsize = NonZeroUsize::new(12).unwrap();

#[derive(Clone, Debug)]
pub struct TriangleBvh {
    volumes: IndexVec<NodeIdx, BoundingVolume>,
    leaves: IndexVec<LeafIdx, Range<usize>>,
    triangles: Vec<Triangle<WorldPoint>>,
}

index_vec::define_index_type! {
    struct NodeIdx = u32;
}

index_vec::define_index_type! {
    struct LeafIdx = u32;
}

impl NodeIdx {
    const ROOT: NodeIdx = NodeIdx::from_raw_unchecked(0);

    fn children(self) -> (NodeIdx, NodeIdx) {
        let left = self.index() * 2 + 1;
        (NodeIdx::new(left), NodeIdx::new(left + 1))
    }
}

impl TriangleBvh {
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn root_volume(&self) -> &BoundingVolume {
        &self.volumes[NodeIdx::ROOT]
    }

    /// Returns the leaf stored at the node, None for inner nodes.
    fn leaf_index(&self, node: NodeIdx) -> Option<LeafIdx> {
        let first_leaf = self.leaves.len() - 1;
        node.index()
            .checked_sub(first_leaf)
            .map(LeafIdx::new)
    }

    fn leaf_triangles(&self, leaf: LeafIdx) -> &[Triangle<WorldPoint>] {
        &self.triangles[self.leaves[leaf].clone()]
    }
}

/// Number of leaves of a tree over `triangle_count` triangles: smallest power of two that
/// gives every leaf at most `triangles_per_leaf` triangles, at least two.
fn leaf_count(triangle_count: usize, triangles_per_leaf: usize) -> usize {
    triangle_count
        .div_ceil(triangles_per_leaf)
        .next_power_of_two()
        .max(2)
}
