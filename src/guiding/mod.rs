//! Path guiding structures: a spatial binary tree over the scene whose leaves own directional
//! quadtrees of recorded radiance.
//!
//! Each spatial leaf keeps two generations of its quadtree. Samples are recorded into the current
//! one and guide directions are drawn from the previous one, which stays frozen for a whole
//! iteration.

mod quadtree;
mod snapshot;
mod spatial_tree;

use crate::geometry::FloatType;

pub use quadtree::{DirectionalQuadTree, MAX_DEPTH};
pub use snapshot::{SNAPSHOT_SIDE, SnapshotError, save_quadtree_snapshot, snapshot_path};
pub use spatial_tree::{GuidingStatistics, SpatialBinaryTree};

#[derive(Copy, Clone, Debug, PartialEq, bon::Builder)]
pub struct GuidingSettings {
    /// Scale `c` of the spatial split threshold `c * sqrt(2^k)` at iteration `k`.
    #[builder(default = 12000.0)]
    pub spatial_threshold: FloatType,

    /// Share of the total flux above which a quadtree leaf gets split.
    #[builder(default = 0.01)]
    pub flux_threshold: FloatType,

    /// Probability of sampling the BSDF instead of the guiding distribution.
    #[builder(default = 0.5)]
    pub bsdf_sampling_fraction: FloatType,
}

impl Default for GuidingSettings {
    fn default() -> Self {
        GuidingSettings::builder().build()
    }
}

impl GuidingSettings {
    /// Sample count above which a spatial leaf splits at the end of iteration `iteration`.
    pub fn spatial_split_threshold(&self, iteration: u32) -> FloatType {
        self.spatial_threshold * (2.0 as FloatType).powi(iteration as i32).sqrt()
    }
}
