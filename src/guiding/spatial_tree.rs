use std::{
    fmt::Display,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use index_vec::{IndexVec, index_vec};

use crate::{
    geometry::{
        FloatType, WorldBox, WorldPoint, WorldVector, direction_to_square, square_to_direction,
    },
    util::{Rgb, Stats, mean_channel},
};

use super::{DirectionalQuadTree, GuidingSettings};

index_vec::define_index_type! {
    pub struct SpatialNodeIdx = u32;
}

impl SpatialNodeIdx {
    const ROOT: SpatialNodeIdx = SpatialNodeIdx::from_raw_unchecked(0);
}

#[derive(Debug)]
struct SpatialNode {
    bounds: WorldBox,
    sample_count: AtomicU64,
    content: NodeContent,
}

#[derive(Debug)]
enum NodeContent {
    /// Two consecutive children starting at `first`, the lower half along `axis` first.
    Inner {
        first: SpatialNodeIdx,
        axis: usize,
    },
    Leaf(GuidingLeaf),
}

#[derive(Debug)]
struct GuidingLeaf {
    /// Generation being recorded. Refined after every sample, hence the lock.
    current: Mutex<DirectionalQuadTree>,
    /// Generation being sampled, read only during an iteration.
    previous: DirectionalQuadTree,
}

impl GuidingLeaf {
    fn new(flux_threshold: FloatType) -> GuidingLeaf {
        GuidingLeaf {
            current: Mutex::new(DirectionalQuadTree::new(flux_threshold)),
            previous: DirectionalQuadTree::new(flux_threshold),
        }
    }
}

impl SpatialNode {
    fn leaf(bounds: WorldBox, sample_count: u64, flux_threshold: FloatType) -> SpatialNode {
        SpatialNode {
            bounds,
            sample_count: AtomicU64::new(sample_count),
            content: NodeContent::Leaf(GuidingLeaf::new(flux_threshold)),
        }
    }
}

/// Spatial half of the SD-tree.
///
/// Recording and querying only need a shared reference and can run from many threads at once.
/// Everything that changes the structure takes `&mut self`, so the borrow checker (or the lock
/// around the tree) keeps it apart from in-flight samples.
/// Points outside the half open root box are ignored.
#[derive(Debug)]
pub struct SpatialBinaryTree {
    nodes: IndexVec<SpatialNodeIdx, SpatialNode>,
    bounds: WorldBox,
    settings: GuidingSettings,
    /// Axis of the next split, cycles x, y, z.
    next_split_axis: usize,
}

impl SpatialBinaryTree {
    pub fn new(bounds: WorldBox, settings: GuidingSettings) -> SpatialBinaryTree {
        SpatialBinaryTree {
            nodes: index_vec![SpatialNode::leaf(
                bounds.clone(),
                0,
                settings.flux_threshold
            )],
            bounds,
            settings,
            next_split_axis: 0,
        }
    }

    pub fn bounds(&self) -> &WorldBox {
        &self.bounds
    }

    pub fn settings(&self) -> &GuidingSettings {
        &self.settings
    }

    /// Number of samples recorded since the last reset.
    pub fn sample_count(&self) -> u64 {
        self.nodes[SpatialNodeIdx::ROOT]
            .sample_count
            .load(Ordering::Relaxed)
    }

    /// Counts the sample on every node containing `position` and splats the radiance
    /// arriving from `direction` into the current generation of the leaf.
    pub fn record_sample(&self, position: &WorldPoint, direction: &WorldVector, radiance: &Rgb) {
        if !self.bounds.contains_half_open(position) {
            return;
        }

        let mut index = SpatialNodeIdx::ROOT;
        loop {
            let node = &self.nodes[index];
            node.sample_count.fetch_add(1, Ordering::Relaxed);

            match &node.content {
                NodeContent::Inner { first, axis } => {
                    index = self.child_containing(*first, *axis, position);
                }
                NodeContent::Leaf(leaf) => {
                    let mut current = leaf.current.lock().expect("Poisoned lock!");
                    current.splat(&direction_to_square(direction), mean_channel(radiance));
                    current.refine();
                    return;
                }
            }
        }
    }

    /// Samples a direction from the previous generation of the leaf containing `position`.
    /// Returns the direction and its solid angle density.
    pub fn query_guide_direction(
        &self,
        position: &WorldPoint,
        rng: &mut impl rand::Rng,
    ) -> Option<(WorldVector, FloatType)> {
        let leaf = self.find_leaf(position)?;
        let (point, pdf) = leaf.previous.sample(rng);
        Some((square_to_direction(point), pdf))
    }

    /// Density [`SpatialBinaryTree::query_guide_direction`] has for the direction.
    pub fn guide_pdf(&self, position: &WorldPoint, direction: &WorldVector) -> Option<FloatType> {
        let leaf = self.find_leaf(position)?;
        Some(leaf.previous.pdf(&direction_to_square(direction)))
    }

    fn find_leaf(&self, position: &WorldPoint) -> Option<&GuidingLeaf> {
        if !self.bounds.contains_half_open(position) {
            return None;
        }

        let mut index = SpatialNodeIdx::ROOT;
        loop {
            match &self.nodes[index].content {
                NodeContent::Inner { first, axis } => {
                    index = self.child_containing(*first, *axis, position);
                }
                NodeContent::Leaf(leaf) => return Some(leaf),
            }
        }
    }

    fn child_containing(
        &self,
        first: SpatialNodeIdx,
        axis: usize,
        position: &WorldPoint,
    ) -> SpatialNodeIdx {
        let upper = first + 1;
        if position[axis] >= self.nodes[upper].bounds.min[axis] {
            upper
        } else {
            first
        }
    }

    /// Splits every leaf that recorded more than `c * sqrt(2^iteration)` samples.
    /// Children get half of the count each and empty quadtrees.
    #[tracing::instrument(skip(self), fields(leaves_before = self.leaf_count()))]
    pub fn refine(&mut self, iteration: u32) {
        let threshold = self.settings.spatial_split_threshold(iteration);

        let to_split: Vec<SpatialNodeIdx> = self
            .leaf_indices()
            .into_iter()
            .filter(|i| {
                self.nodes[*i].sample_count.load(Ordering::Relaxed) as f64 > f64::from(threshold)
            })
            .collect();

        for index in &to_split {
            self.split_leaf(*index);
        }

        tracing::debug!(
            threshold,
            split = to_split.len(),
            leaves = self.leaf_count(),
            "spatial tree refined"
        );
    }

    fn split_leaf(&mut self, index: SpatialNodeIdx) {
        let axis = self.next_split_axis;
        self.next_split_axis = (axis + 1) % 3;

        let flux_threshold = self.settings.flux_threshold;
        let node = &mut self.nodes[index];
        let half_count = *node.sample_count.get_mut() / 2;
        let (lower, upper) = node.bounds.bisect(axis);

        let first = self.nodes.next_idx();
        self.nodes[index].content = NodeContent::Inner { first, axis };
        self.nodes.push(SpatialNode::leaf(lower, half_count, flux_threshold));
        self.nodes.push(SpatialNode::leaf(upper, half_count, flux_threshold));
    }

    /// Swaps generations on every leaf: the current quadtree becomes the previous one and
    /// recording starts over.
    pub fn promote_generation(&mut self) {
        self.promote_generation_with(|_, _| {});
    }

    /// Like [`SpatialBinaryTree::promote_generation`], showing each finished current generation
    /// to `snapshot` first.
    /// Leaves are numbered like a binary heap: the root is 0, children of `n` are `2n + 1` and
    /// `2n + 2`.
    pub fn promote_generation_with(
        &mut self,
        mut snapshot: impl FnMut(usize, &DirectionalQuadTree),
    ) {
        for (index, number) in self.numbered_leaves() {
            let NodeContent::Leaf(leaf) = &mut self.nodes[index].content else {
                unreachable!("numbered_leaves only returns leaves");
            };
            let current = leaf.current.get_mut().expect("Poisoned lock!");
            snapshot(number, current);
            leaf.previous = current.clone();
            current.reset();
        }
    }

    /// Collapses the tree to a single empty leaf over the initial box.
    pub fn reset(&mut self) {
        self.nodes = index_vec![SpatialNode::leaf(
            self.bounds.clone(),
            0,
            self.settings.flux_threshold
        )];
        self.next_split_axis = 0;
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.content, NodeContent::Leaf(_)))
            .count()
    }

    /// Bounds and sample counts of all leaves, in depth first order.
    pub fn leaves(&self) -> impl Iterator<Item = (&WorldBox, u64)> {
        self.leaf_indices().into_iter().map(|i| {
            let node = &self.nodes[i];
            (&node.bounds, node.sample_count.load(Ordering::Relaxed))
        })
    }

    fn leaf_indices(&self) -> Vec<SpatialNodeIdx> {
        self.numbered_leaves().into_iter().map(|(i, _)| i).collect()
    }

    /// Leaves in depth first order, with their heap numbers.
    fn numbered_leaves(&self) -> Vec<(SpatialNodeIdx, usize)> {
        let mut ret = Vec::new();
        let mut stack = vec![(SpatialNodeIdx::ROOT, 0usize)];
        while let Some((index, number)) = stack.pop() {
            match &self.nodes[index].content {
                NodeContent::Inner { first, .. } => {
                    stack.push((*first + 1, 2 * number + 2));
                    stack.push((*first, 2 * number + 1));
                }
                NodeContent::Leaf(_) => ret.push((index, number)),
            }
        }
        ret
    }

    pub fn statistics(&self) -> GuidingStatistics {
        let mut quadtree_leaves = Stats::default();
        let mut sample_counts = Stats::default();
        for index in self.leaf_indices() {
            let node = &self.nodes[index];
            sample_counts.add_sample(node.sample_count.load(Ordering::Relaxed) as f32);
            if let NodeContent::Leaf(leaf) = &node.content {
                quadtree_leaves.add_sample(leaf.previous.leaf_count() as f32);
            }
        }

        GuidingStatistics {
            spatial_leaves: self.leaf_count(),
            quadtree_leaves,
            sample_counts,
        }
    }
}

/// Shape of the guiding structure, for logging.
#[derive(Clone, Debug)]
pub struct GuidingStatistics {
    pub spatial_leaves: usize,
    /// Leaf counts of the previous generation quadtrees
    pub quadtree_leaves: Stats,
    pub sample_counts: Stats,
}

impl Display for GuidingStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} spatial leaves; quadtree leaves {}; samples per leaf {}",
            self.spatial_leaves, self.quadtree_leaves, self.sample_counts
        )
    }
}
