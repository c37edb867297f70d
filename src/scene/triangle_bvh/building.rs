use std::{cmp::Ordering, num::NonZeroUsize, path::Path};

use index_vec::index_vec;

use crate::{
    geometry::{Triangle, WorldPoint},
    scene::{Mesh, ObjOpenError},
};

use super::{BoundingVolume, LeafIdx, NodeIdx, TRIANGLES_PER_LEAF, TriangleBvh, leaf_count};

/// Triangle centroid together with its index in the source mesh.
type CentroidEntry = (WorldPoint, usize);

impl TriangleBvh {
    pub fn with_obj(p: impl AsRef<Path>) -> Result<TriangleBvh, ObjOpenError> {
        Ok(Self::new(&Mesh::with_obj(p)?))
    }

    pub fn new(mesh: &Mesh) -> TriangleBvh {
        Self::with_leaf_capacity(mesh, TRIANGLES_PER_LEAF)
    }

    #[tracing::instrument(
        skip_all,
        fields(triangles = mesh.triangles.len(), triangles_per_leaf = triangles_per_leaf.get())
    )]
    pub fn with_leaf_capacity(mesh: &Mesh, triangles_per_leaf: NonZeroUsize) -> TriangleBvh {
        let leaf_count = leaf_count(mesh.triangles.len(), triangles_per_leaf.get());

        let mut centroids: Vec<CentroidEntry> = (0..mesh.triangles.len())
            .map(|i| (mesh.triangle(i).centroid(), i))
            .collect();

        let mut bvh = TriangleBvh {
            volumes: index_vec![BoundingVolume::empty(); 2 * leaf_count - 1],
            leaves: index_vec![0..0; leaf_count],
            triangles: Vec::new(),
        };

        bvh.build_recursive(NodeIdx::ROOT, &mut centroids, 0, mesh);

        // Partitioning left every leaf's triangles contiguous in the centroid array
        bvh.triangles = centroids.iter().map(|(_, i)| mesh.triangle(*i)).collect();

        tracing::debug!(leaf_count, "bvh built");
        bvh
    }

    fn build_recursive(
        &mut self,
        node: NodeIdx,
        centroids: &mut [CentroidEntry],
        offset: usize,
        mesh: &Mesh,
    ) {
        if let Some(leaf) = self.leaf_index(node) {
            self.build_leaf(node, leaf, centroids, offset, mesh);
            return;
        }

        let mid = split_median(centroids);
        let (left, right) = centroids.split_at_mut(mid);
        let (left_node, right_node) = node.children();

        self.build_recursive(left_node, left, offset, mesh);
        self.build_recursive(right_node, right, offset + mid, mesh);

        self.volumes[node] =
            BoundingVolume::merge(&self.volumes[left_node], &self.volumes[right_node]);
    }

    fn build_leaf(
        &mut self,
        node: NodeIdx,
        leaf: LeafIdx,
        centroids: &[CentroidEntry],
        offset: usize,
        mesh: &Mesh,
    ) {
        let triangles: Vec<Triangle<WorldPoint>> =
            centroids.iter().map(|(_, i)| mesh.triangle(*i)).collect();
        self.volumes[node] = BoundingVolume::from_triangles(triangles.iter());
        self.leaves[leaf] = offset..(offset + centroids.len());
    }
}

/// Reorders the centroids so that the lower half along the axis of largest extent
/// comes first. Returns the index where the upper half begins.
fn split_median(centroids: &mut [CentroidEntry]) -> usize {
    let mid = centroids.len() / 2;
    if centroids.is_empty() {
        return mid;
    }

    let axis = widest_axis(centroids);
    centroids.select_nth_unstable_by(mid, |a, b| compare_on_axis(&a.0, &b.0, axis));
    mid
}

/// Axis with the largest range of centroid coordinates, first one wins on ties.
fn widest_axis(centroids: &[CentroidEntry]) -> usize {
    let range = |axis: usize| -> f32 {
        let (min, max) = centroids
            .iter()
            .map(|(p, _)| p[axis])
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), x| {
                (min.min(x), max.max(x))
            });
        max - min
    };

    (1..3).fold(0, |best, axis| if range(axis) > range(best) { axis } else { best })
}

/// Orders by the coordinate along `axis`, breaking ties with the following axes.
fn compare_on_axis(a: &WorldPoint, b: &WorldPoint, axis: usize) -> Ordering {
    (0..3)
        .map(|i| (axis + i) % 3)
        .map(|i| a[i].total_cmp(&b[i]))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod test {
    use super::*;

    use assert2::assert;
    use proptest::prop_assert;
    use test_strategy::proptest;

    use crate::geometry::{WorldBox, test::world_point};

    fn grid_mesh(n: usize) -> Mesh {
        let mut vertices = Vec::new();
        let mut triangles = Vec::new();
        for i in 0..n {
            let x = i as f32;
            let base = vertices.len();
            vertices.push(WorldPoint::new(x, 0.0, 0.0));
            vertices.push(WorldPoint::new(x + 0.5, 0.0, 0.0));
            vertices.push(WorldPoint::new(x, 0.5, 0.0));
            triangles.push(Triangle::new(base, base + 1, base + 2));
        }
        Mesh::new(vertices, triangles)
    }

    #[test]
    fn empty_mesh() {
        let bvh = TriangleBvh::new(&Mesh::default());
        assert!(bvh.leaf_count() == 2);
        assert!(bvh.triangle_count() == 0);
        assert!(bvh.root_volume().is_empty());
    }

    #[test]
    fn leaves_partition_triangles() {
        let bvh = TriangleBvh::with_leaf_capacity(&grid_mesh(100), NonZeroUsize::new(4).unwrap());
        let ranges = &bvh.leaves;

        assert!(bvh.leaf_count() == 32);
        assert!(ranges[LeafIdx::new(0)].start == 0);
        assert!(ranges[LeafIdx::new(31)].end == 100);
        for (a, b) in ranges.iter().zip(ranges.iter().skip(1)) {
            assert!(a.end == b.start);
        }
        assert!(ranges.iter().all(|r| r.len() <= 4));
    }

    #[test]
    fn split_along_widest_axis() {
        let bvh = TriangleBvh::with_leaf_capacity(&grid_mesh(8), NonZeroUsize::new(4).unwrap());
        let (left, right) = NodeIdx::ROOT.children();
        assert!(bvh.volumes[left].bounds.max.x < bvh.volumes[right].bounds.min.x);
    }

    #[test]
    fn tie_break_uses_next_axis() {
        let a = WorldPoint::new(1.0, 2.0, 0.0);
        let b = WorldPoint::new(1.0, 3.0, 0.0);
        assert!(compare_on_axis(&a, &b, 0) == Ordering::Less);
        assert!(compare_on_axis(&b, &a, 0) == Ordering::Greater);
        assert!(compare_on_axis(&a, &a, 2) == Ordering::Equal);
    }

    #[proptest]
    fn root_contains_all_vertices(
        #[strategy(proptest::collection::vec(world_point(), 3..150))] points: Vec<WorldPoint>,
    ) {
        let triangle_count = points.len() / 3;
        let triangles = (0..triangle_count)
            .map(|i| Triangle::new(3 * i, 3 * i + 1, 3 * i + 2))
            .collect();
        let mesh = Mesh::new(points.clone(), triangles);
        let bvh = TriangleBvh::new(&mesh);

        let root: &WorldBox = &bvh.root_volume().bounds;
        for p in &points[..3 * triangle_count] {
            prop_assert!(root.contains(p));
        }
        prop_assert!(bvh.triangle_count() == triangle_count);
    }
}
