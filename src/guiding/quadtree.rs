//! Adaptive quadtree over the unit square of directions, tracking where the flux comes from.

use image::GrayImage;
use index_vec::{IndexVec, index_vec};

use crate::{
    geometry::{FloatType, SquareBox, SquarePoint, UNIFORM_SPHERE_PDF},
    util::AtomicF32,
};

/// Refinement never splits nodes deeper than this.
pub const MAX_DEPTH: u32 = 20;

index_vec::define_index_type! {
    pub struct QuadNodeIdx = u32;
}

impl QuadNodeIdx {
    const ROOT: QuadNodeIdx = QuadNodeIdx::from_raw_unchecked(0);
}

#[derive(Clone, Debug)]
struct QuadNode {
    bounds: SquareBox,
    flux: AtomicF32,
    /// First of the four consecutive children, in [`SquareBox::quadrants`] order.
    children: Option<QuadNodeIdx>,
}

impl QuadNode {
    fn leaf(bounds: SquareBox, flux: FloatType) -> QuadNode {
        QuadNode {
            bounds,
            flux: AtomicF32::new(flux),
            children: None,
        }
    }
}

/// Directional distribution of one spatial region.
///
/// Flux recorded at a node always includes the flux of everything below it, and the root
/// holds the total of all splats.
/// Splatting only needs a shared reference, structural changes need exclusive access.
/// Clone is a deep copy.
#[derive(Debug)]
pub struct DirectionalQuadTree {
    nodes: IndexVec<QuadNodeIdx, QuadNode>,
    /// Arena the next refine builds into, empty between refines.
    scratch: IndexVec<QuadNodeIdx, QuadNode>,
    total: AtomicF32,
    flux_threshold: FloatType,
}

impl Clone for DirectionalQuadTree {
    fn clone(&self) -> Self {
        DirectionalQuadTree {
            nodes: self.nodes.clone(),
            scratch: IndexVec::new(),
            total: self.total.clone(),
            flux_threshold: self.flux_threshold,
        }
    }
}

impl DirectionalQuadTree {
    pub fn new(flux_threshold: FloatType) -> DirectionalQuadTree {
        DirectionalQuadTree {
            nodes: index_vec![QuadNode::leaf(unit_square(), 0.0)],
            scratch: IndexVec::new(),
            total: AtomicF32::new(0.0),
            flux_threshold,
        }
    }

    pub fn flux_threshold(&self) -> FloatType {
        self.flux_threshold
    }

    pub fn total_flux(&self) -> FloatType {
        self.total.load()
    }

    /// Adds flux to every node on the path to the leaf containing the point.
    /// Points outside the half open unit square are ignored.
    pub fn splat(&self, point: &SquarePoint, flux: FloatType) {
        if !unit_square().contains_half_open(point) {
            return;
        }

        self.total.fetch_add(flux);

        let mut index = QuadNodeIdx::ROOT;
        loop {
            let node = &self.nodes[index];
            node.flux.fetch_add(flux);
            match node.children {
                None => break,
                Some(first) => index = first + quadrant_of(&node.bounds, point),
            }
        }
    }

    /// Splits leaves carrying more than `flux_threshold` of the total flux and collapses
    /// inner nodes carrying at most that much.
    /// Children of a split get a quarter of the flux each and are evaluated again in the same
    /// pass. Does nothing while the tree has no flux.
    /// The two arenas are swapped rather than reallocated, so refining a tree whose size
    /// stays put does not allocate.
    pub fn refine(&mut self) {
        let total = self.total.get_mut();
        if !(total.is_finite() && total > 0.0) {
            return;
        }

        let mut refined = std::mem::take(&mut self.scratch);
        refined.clear();
        let root = &self.nodes[QuadNodeIdx::ROOT];
        refined.push(QuadNode::leaf(root.bounds.clone(), root.flux.load()));

        self.refine_recursive(
            Some(QuadNodeIdx::ROOT),
            QuadNodeIdx::ROOT,
            0,
            total,
            &mut refined,
        );
        std::mem::swap(&mut self.nodes, &mut refined);
        refined.clear();
        self.scratch = refined;
    }

    /// Decides the shape below `new_index` (already placed in `refined`).
    /// `old_index` is the matching node of the current tree, None for nodes that were just split.
    fn refine_recursive(
        &self,
        old_index: Option<QuadNodeIdx>,
        new_index: QuadNodeIdx,
        depth: u32,
        total: FloatType,
        refined: &mut IndexVec<QuadNodeIdx, QuadNode>,
    ) {
        let flux = refined[new_index].flux.load();
        if flux / total <= self.flux_threshold || depth >= MAX_DEPTH {
            return;
        }

        let old_children = old_index.and_then(|i| self.nodes[i].children);
        let quadrants = refined[new_index].bounds.quadrants();
        let first = refined.next_idx();
        for (i, bounds) in quadrants.into_iter().enumerate() {
            let child_flux = match old_children {
                Some(old_first) => self.nodes[old_first + i].flux.load(),
                None => flux / 4.0,
            };
            refined.push(QuadNode::leaf(bounds, child_flux));
        }
        refined[new_index].children = Some(first);

        for i in 0..4 {
            self.refine_recursive(
                old_children.map(|old_first| old_first + i),
                first + i,
                depth + 1,
                total,
                refined,
            );
        }
    }

    /// Draws a point with probability proportional to flux.
    /// Returns the point and its solid angle density.
    pub fn sample(&self, rng: &mut impl rand::Rng) -> (SquarePoint, FloatType) {
        let mut pdf = 1.0;
        let mut index = QuadNodeIdx::ROOT;

        loop {
            let node = &self.nodes[index];
            let Some(first) = node.children.filter(|_| node.flux.load() > 0.0) else {
                return (uniform_point(&node.bounds, rng), pdf * UNIFORM_SPHERE_PDF);
            };

            let child_flux: [FloatType; 4] =
                std::array::from_fn(|i| self.nodes[first + i].flux.load());
            let sum: FloatType = child_flux.iter().sum();
            if sum <= 0.0 {
                return (uniform_point(&node.bounds, rng), pdf * UNIFORM_SPHERE_PDF);
            }

            let chosen = choose_child(&child_flux, rng.random::<FloatType>() * sum);
            pdf *= 4.0 * child_flux[chosen] / sum;
            index = first + chosen;
        }
    }

    /// Density that [`DirectionalQuadTree::sample`] reports for a point, zero outside the
    /// unit square.
    pub fn pdf(&self, point: &SquarePoint) -> FloatType {
        if !unit_square().contains_half_open(point) {
            return 0.0;
        }

        let mut pdf = UNIFORM_SPHERE_PDF;
        let mut index = QuadNodeIdx::ROOT;
        loop {
            let node = &self.nodes[index];
            let Some(first) = node.children.filter(|_| node.flux.load() > 0.0) else {
                return pdf;
            };

            let sum: FloatType = (0..4).map(|i| self.nodes[first + i].flux.load()).sum();
            if sum <= 0.0 {
                return pdf;
            }

            let child = first + quadrant_of(&node.bounds, point);
            pdf *= 4.0 * self.nodes[child].flux.load() / sum;
            index = child;
        }
    }

    /// Collapses the tree into a single leaf, keeping the recorded flux.
    pub fn merge(&mut self) {
        self.nodes.truncate(1);
        self.nodes[QuadNodeIdx::ROOT].children = None;
    }

    /// Collapses the tree into a single leaf with no flux.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.nodes.push(QuadNode::leaf(unit_square(), 0.0));
        self.total = AtomicF32::new(0.0);
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.children.is_none()).count()
    }

    /// Bounds and flux of every leaf.
    pub fn leaves(&self) -> impl Iterator<Item = (&SquareBox, FloatType)> {
        self.nodes
            .iter()
            .filter(|n| n.children.is_none())
            .map(|n| (&n.bounds, n.flux.load()))
    }

    /// Number of levels below the root.
    pub fn depth(&self) -> u32 {
        self.depth_recursive(QuadNodeIdx::ROOT)
    }

    fn depth_recursive(&self, index: QuadNodeIdx) -> u32 {
        match self.nodes[index].children {
            None => 0,
            Some(first) => {
                1 + (0..4)
                    .map(|i| self.depth_recursive(first + i))
                    .max()
                    .unwrap_or(0)
            }
        }
    }

    /// Renders leaf fluxes into a square grayscale image.
    /// A leaf holding `flux_threshold` of the total flux or more is white.
    /// Image x follows u, image y follows v.
    pub fn rasterize(&self, side: u32) -> GrayImage {
        let total = self.total_flux();
        let scale = 1.0 / self.flux_threshold;
        let mut image = GrayImage::new(side, side);

        for (bounds, flux) in self.leaves() {
            let value = if total > 0.0 {
                (flux * scale / total).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let pixel = image::Luma([(value * 255.0) as u8]);

            let to_pixel = |x: FloatType| ((x * side as FloatType).round() as u32).min(side);
            for y in to_pixel(bounds.min.y)..to_pixel(bounds.max.y) {
                for x in to_pixel(bounds.min.x)..to_pixel(bounds.max.x) {
                    image.put_pixel(x, y, pixel);
                }
            }
        }

        image
    }
}

fn unit_square() -> SquareBox {
    SquareBox::new(SquarePoint::new(0.0, 0.0), SquarePoint::new(1.0, 1.0))
}

fn uniform_point(bounds: &SquareBox, rng: &mut impl rand::Rng) -> SquarePoint {
    let offset = SquarePoint::new(rng.random(), rng.random());
    bounds.min + bounds.size().component_mul(&offset.coords)
}

/// Index of the quadrant of `bounds` that contains the point.
fn quadrant_of(bounds: &SquareBox, point: &SquarePoint) -> usize {
    let center = bounds.center();
    usize::from(point.x >= center.x) + 2 * usize::from(point.y >= center.y)
}

/// Picks the child whose cumulative flux range contains `r`.
/// Falls back to the last child with nonzero flux when round off leaves `r` past the end.
fn choose_child(child_flux: &[FloatType; 4], r: FloatType) -> usize {
    let mut cumulative = 0.0;
    for (i, flux) in child_flux.iter().enumerate() {
        cumulative += flux;
        if r < cumulative {
            return i;
        }
    }
    child_flux.iter().rposition(|f| *f > 0.0).unwrap_or(3)
}
