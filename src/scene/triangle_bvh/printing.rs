use std::fmt::Display;

use crate::util::Stats;

use super::{NodeIdx, TriangleBvh};

/// Shape summary of a built tree.
#[derive(Clone, Debug)]
pub struct BvhStatistics {
    pub depth: u32,
    pub triangle_count: usize,
    pub leaf_fill: Stats,
    pub empty_leaves: usize,
}

impl TriangleBvh {
    pub fn statistics(&self) -> BvhStatistics {
        BvhStatistics {
            depth: self.leaves.len().ilog2(),
            triangle_count: self.triangles.len(),
            leaf_fill: self.leaves.iter().map(|r| r.len() as f32).collect(),
            empty_leaves: self.leaves.iter().filter(|r| r.is_empty()).count(),
        }
    }

    pub fn log_statistics(&self) {
        tracing::info!(statistics = %self.statistics(), "bvh statistics");
        if tracing::enabled!(tracing::Level::TRACE) {
            self.print_tree();
        }
    }

    /// Dumps the node boxes at trace level.
    pub fn print_tree(&self) {
        self.print_recursive(0, NodeIdx::ROOT);
    }

    fn print_recursive(&self, indent: usize, node: NodeIdx) {
        let volume = &self.volumes[node];
        let kind = if self.leaf_index(node).is_some() { "L" } else { "I" };
        tracing::trace!(
            "{}- {}{}: {:?}-{:?}",
            "  ".repeat(indent),
            kind,
            node.index(),
            volume.bounds.min,
            volume.bounds.max,
        );

        if let Some(leaf) = self.leaf_index(node) {
            for triangle in self.leaf_triangles(leaf) {
                tracing::trace!(
                    "{}  {:?}, {:?}, {:?}",
                    "  ".repeat(indent),
                    triangle[0],
                    triangle[1],
                    triangle[2]
                );
            }
            return;
        }

        let (left, right) = node.children();
        self.print_recursive(indent + 1, left);
        self.print_recursive(indent + 1, right);
    }
}

impl Display for BvhStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "depth {}; {} triangles; leaf fill {}; {} empty leaves",
            self.depth, self.triangle_count, self.leaf_fill, self.empty_leaves
        )
    }
}

#[cfg(test)]
mod test {
    use std::num::NonZeroUsize;

    use super::*;
    use crate::{
        geometry::{Triangle, WorldPoint},
        scene::Mesh,
    };

    use assert2::assert;

    #[test]
    fn statistics_of_small_tree() {
        let vertices = (0..30)
            .map(|i| WorldPoint::new(i as f32, (i % 3) as f32, 0.0))
            .collect();
        let triangles = (0..10)
            .map(|i| Triangle::new(3 * i, 3 * i + 1, 3 * i + 2))
            .collect();
        let bvh = TriangleBvh::with_leaf_capacity(
            &Mesh::new(vertices, triangles),
            NonZeroUsize::new(3).unwrap(),
        );

        let stats = bvh.statistics();
        assert!(stats.depth == 2);
        assert!(stats.triangle_count == 10);
        assert!(stats.leaf_fill.count == 4);
        assert!(stats.leaf_fill.min == 2.0);
        assert!(stats.leaf_fill.max == 3.0);
        assert!(stats.empty_leaves == 0);
    }
}
