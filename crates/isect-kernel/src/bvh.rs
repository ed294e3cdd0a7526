//! Bounding Volume Hierarchy for accelerated ray queries.
//!
//! Built over primitive bounding boxes using a binned Surface Area
//! Heuristic (SAH) or a median split, then flattened into a node array
//! that is traversed with an explicit stack.

use isect_math::{axis_of, Aabb3, Point3};

use crate::{Ray, TriangleHit};

/// How interior nodes choose their split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitStrategy {
    /// Binned surface area heuristic.
    Sah,
    /// Median of primitive centroids along the longest axis.
    Median,
}

/// Parameters for BVH construction.
#[derive(Debug, Clone, Copy)]
pub struct BuildSettings {
    /// Split strategy.
    pub strategy: SplitStrategy,
    /// Maximum primitives stored in one leaf.
    pub max_leaf_size: usize,
    /// Number of SAH buckets per axis.
    pub sah_bins: usize,
    /// Relative cost of visiting an interior node.
    pub traversal_cost: f32,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            strategy: SplitStrategy::Sah,
            max_leaf_size: 4,
            sah_bins: 12,
            traversal_cost: 0.125,
        }
    }
}

/// A flattened BVH node.
///
/// - For internal nodes: `left_or_first` = left child index, `right_or_count` = right child index
/// - For leaf nodes: `left_or_first` = start in the primitive index list, `right_or_count` = count
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatBvhNode {
    /// Axis-aligned bounding box of this node.
    pub aabb: Aabb3,
    /// Is this a leaf node?
    pub is_leaf: bool,
    /// Left child index or first primitive slot.
    pub left_or_first: u32,
    /// Right child index or primitive count.
    pub right_or_count: u32,
}

/// Anything carrying a ray parameter, so traversal can order hits.
pub trait HitDistance {
    /// Parameter along the ray.
    fn t(&self) -> f32;
}

impl HitDistance for TriangleHit {
    fn t(&self) -> f32 {
        self.t
    }
}

/// Build-time tree node.
enum BvhNode {
    Leaf {
        aabb: Aabb3,
        prims: Vec<u32>,
    },
    Internal {
        aabb: Aabb3,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

/// Per-primitive build record: (index, bounds, centroid).
type PrimRecord = (u32, Aabb3, Point3);

/// Bounding Volume Hierarchy over an indexed primitive list.
#[derive(Debug, Clone, Default)]
pub struct Bvh {
    nodes: Vec<FlatBvhNode>,
    prim_indices: Vec<u32>,
    depth: usize,
}

impl Bvh {
    /// Build a BVH over primitives given by their bounding boxes.
    ///
    /// Primitive `i` is referred to by index `i` during traversal. An empty
    /// slice produces an empty hierarchy that every ray misses.
    pub fn build(bounds: &[Aabb3], settings: &BuildSettings) -> Self {
        let mut prim_data: Vec<PrimRecord> = bounds
            .iter()
            .enumerate()
            .map(|(i, aabb)| (i as u32, *aabb, aabb.center()))
            .collect();

        if prim_data.is_empty() {
            return Self::default();
        }

        let root = build_node(&mut prim_data, settings);
        let depth = node_depth(&root);

        let mut nodes = Vec::new();
        let mut prim_indices = Vec::with_capacity(bounds.len());
        flatten_node(&root, &mut nodes, &mut prim_indices);
        log::trace!(
            "{:?} BVH over {} primitives: {} nodes, depth {depth}",
            settings.strategy,
            bounds.len(),
            nodes.len()
        );

        Self {
            nodes,
            prim_indices,
            depth,
        }
    }

    /// True if the hierarchy holds no primitives.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of flattened nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of referenced primitives.
    pub fn primitive_count(&self) -> usize {
        self.prim_indices.len()
    }

    /// Depth of the tree (a lone leaf has depth 1).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Flattened nodes, root first.
    pub fn nodes(&self) -> &[FlatBvhNode] {
        &self.nodes
    }

    /// Primitive indices in leaf order.
    pub fn prim_indices(&self) -> &[u32] {
        &self.prim_indices
    }

    /// Find the closest accepted hit.
    ///
    /// `test` intersects the ray with one primitive. Hits outside the ray's
    /// range are discarded. Equal distances resolve to the lowest primitive
    /// index, independent of traversal order.
    pub fn closest_hit<H, F>(&self, ray: &Ray, mut test: F) -> Option<(u32, H)>
    where
        H: HitDistance,
        F: FnMut(u32) -> Option<H>,
    {
        let mut closest: Option<(u32, H)> = None;
        let mut closest_t = ray.t_max;

        if self.nodes.is_empty() {
            return None;
        }

        let mut stack: Vec<u32> = Vec::with_capacity(self.depth.max(1) * 2);
        stack.push(0);

        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx as usize];
            match ray.intersect_aabb(&node.aabb) {
                // Equal entry must still be visited for the tie-break.
                Some((t_enter, _)) if t_enter <= closest_t => {}
                _ => continue,
            }

            if node.is_leaf {
                let start = node.left_or_first as usize;
                let end = start + node.right_or_count as usize;
                for &prim in &self.prim_indices[start..end] {
                    let Some(hit) = test(prim) else { continue };
                    let t = hit.t();
                    if !ray.accepts(t) || t > closest_t {
                        continue;
                    }
                    let better = match &closest {
                        None => true,
                        Some((best_prim, best)) => t < best.t() || prim < *best_prim,
                    };
                    if better {
                        closest_t = t;
                        closest = Some((prim, hit));
                    }
                }
            } else {
                let left = node.left_or_first;
                let right = node.right_or_count;
                let left_t = ray.intersect_aabb(&self.nodes[left as usize].aabb).map(|(t, _)| t);
                let right_t = ray.intersect_aabb(&self.nodes[right as usize].aabb).map(|(t, _)| t);

                // Push the farther child first so the nearer one is popped next.
                match (left_t, right_t) {
                    (Some(lt), Some(rt)) => {
                        if lt <= rt {
                            stack.push(right);
                            stack.push(left);
                        } else {
                            stack.push(left);
                            stack.push(right);
                        }
                    }
                    (Some(_), None) => stack.push(left),
                    (None, Some(_)) => stack.push(right),
                    (None, None) => {}
                }
            }
        }

        closest
    }

    /// True if any primitive yields a hit inside the ray's range.
    pub fn any_hit<H, F>(&self, ray: &Ray, mut test: F) -> bool
    where
        H: HitDistance,
        F: FnMut(u32) -> Option<H>,
    {
        if self.nodes.is_empty() {
            return false;
        }

        let mut stack: Vec<u32> = Vec::with_capacity(self.depth.max(1) * 2);
        stack.push(0);

        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx as usize];
            if ray.intersect_aabb(&node.aabb).is_none() {
                continue;
            }
            if node.is_leaf {
                let start = node.left_or_first as usize;
                let end = start + node.right_or_count as usize;
                let occluded = self.prim_indices[start..end]
                    .iter()
                    .filter_map(|&prim| test(prim))
                    .any(|hit| ray.accepts(hit.t()));
                if occluded {
                    return true;
                }
            } else {
                stack.push(node.right_or_count);
                stack.push(node.left_or_first);
            }
        }

        false
    }
}

/// Get the AABB of a node.
fn get_aabb(node: &BvhNode) -> Aabb3 {
    match node {
        BvhNode::Leaf { aabb, .. } => *aabb,
        BvhNode::Internal { aabb, .. } => *aabb,
    }
}

fn node_depth(node: &BvhNode) -> usize {
    match node {
        BvhNode::Leaf { .. } => 1,
        BvhNode::Internal { left, right, .. } => 1 + node_depth(left).max(node_depth(right)),
    }
}

/// Recursively flatten a BVH node; the left child always follows its parent.
fn flatten_node(node: &BvhNode, nodes: &mut Vec<FlatBvhNode>, prims: &mut Vec<u32>) -> usize {
    let idx = nodes.len();

    match node {
        BvhNode::Leaf { aabb, prims: leaf_prims } => {
            let start = prims.len() as u32;
            prims.extend(leaf_prims.iter().copied());
            nodes.push(FlatBvhNode {
                aabb: *aabb,
                is_leaf: true,
                left_or_first: start,
                right_or_count: leaf_prims.len() as u32,
            });
        }
        BvhNode::Internal { aabb, left, right } => {
            nodes.push(FlatBvhNode {
                aabb: *aabb,
                is_leaf: false,
                left_or_first: 0,
                right_or_count: 0,
            });

            let left_idx = flatten_node(left, nodes, prims);
            let right_idx = flatten_node(right, nodes, prims);

            nodes[idx].left_or_first = left_idx as u32;
            nodes[idx].right_or_count = right_idx as u32;
        }
    }

    idx
}

/// Build a BVH node recursively.
fn build_node(prim_data: &mut [PrimRecord], settings: &BuildSettings) -> BvhNode {
    let mut bounds = Aabb3::empty();
    let mut centroid_bounds = Aabb3::empty();
    for (_, aabb, centroid) in prim_data.iter() {
        bounds.include_aabb(aabb);
        centroid_bounds.include_point(centroid);
    }

    if prim_data.len() <= settings.max_leaf_size.max(1) {
        return BvhNode::Leaf {
            aabb: bounds,
            prims: prim_data.iter().map(|(id, _, _)| *id).collect(),
        };
    }

    let mid = match settings.strategy {
        SplitStrategy::Sah => find_best_split(prim_data, &bounds, &centroid_bounds, settings)
            .map(|(axis, pos)| partition_prims(prim_data, axis, pos))
            .unwrap_or(0),
        SplitStrategy::Median => median_split(prim_data, &centroid_bounds),
    };

    // Fallback if partition fails: just split in the middle
    let mid = if mid == 0 || mid == prim_data.len() {
        prim_data.len() / 2
    } else {
        mid
    };

    let (left_data, right_data) = prim_data.split_at_mut(mid);
    let left = build_node(left_data, settings);
    let right = build_node(right_data, settings);

    let mut aabb = get_aabb(&left);
    aabb.include_aabb(&get_aabb(&right));

    BvhNode::Internal {
        aabb,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Find the best split axis and position using binned SAH.
///
/// Returns `None` when every centroid coincides or no bucket boundary
/// separates the primitives.
fn find_best_split(
    prim_data: &[PrimRecord],
    bounds: &Aabb3,
    centroid_bounds: &Aabb3,
    settings: &BuildSettings,
) -> Option<(usize, f32)> {
    let num_buckets = settings.sah_bins.max(2);
    let total_area = bounds.surface_area();
    let extent = centroid_bounds.extent();

    let mut best: Option<(f32, usize, f32)> = None;

    for axis in 0..3 {
        let axis_extent = extent[axis];
        if axis_extent.is_nan() || axis_extent <= 1e-10 {
            continue;
        }
        let axis_min = axis_of(&centroid_bounds.min, axis);

        let mut bucket_counts = vec![0usize; num_buckets];
        let mut bucket_bounds = vec![Aabb3::empty(); num_buckets];

        for (_, aabb, centroid) in prim_data {
            let c = axis_of(centroid, axis);
            let b = ((c - axis_min) / axis_extent * num_buckets as f32) as usize;
            let b = b.min(num_buckets - 1);

            bucket_counts[b] += 1;
            bucket_bounds[b].include_aabb(aabb);
        }

        // Sweep to find best split
        for split in 1..num_buckets {
            let mut left_count = 0;
            let mut left_bounds = Aabb3::empty();
            for i in 0..split {
                left_count += bucket_counts[i];
                left_bounds.include_aabb(&bucket_bounds[i]);
            }

            let mut right_count = 0;
            let mut right_bounds = Aabb3::empty();
            for i in split..num_buckets {
                right_count += bucket_counts[i];
                right_bounds.include_aabb(&bucket_bounds[i]);
            }

            if left_count == 0 || right_count == 0 {
                continue;
            }

            // SAH cost: traversal + P(left) * N_left + P(right) * N_right.
            // Flat (zero-area) bounds fall back to plain primitive counts.
            let (p_left, p_right) = if total_area > 0.0 {
                (left_bounds.surface_area() / total_area, right_bounds.surface_area() / total_area)
            } else {
                (1.0, 1.0)
            };
            let cost = settings.traversal_cost
                + p_left * left_count as f32
                + p_right * right_count as f32;

            if best.map_or(true, |(best_cost, _, _)| cost < best_cost) {
                let pos = axis_min + (split as f32 / num_buckets as f32) * axis_extent;
                best = Some((cost, axis, pos));
            }
        }
    }

    best.map(|(_, axis, pos)| (axis, pos))
}

/// Partition primitives by centroid along an axis.
fn partition_prims(prim_data: &mut [PrimRecord], axis: usize, pos: f32) -> usize {
    let mut left = 0;
    let mut right = prim_data.len();

    while left < right {
        if axis_of(&prim_data[left].2, axis) < pos {
            left += 1;
        } else {
            right -= 1;
            prim_data.swap(left, right);
        }
    }

    left
}

/// Split at the median centroid of the longest centroid axis.
fn median_split(prim_data: &mut [PrimRecord], centroid_bounds: &Aabb3) -> usize {
    let axis = centroid_bounds.longest_axis();
    let mid = prim_data.len() / 2;
    prim_data.select_nth_unstable_by(mid, |a, b| {
        axis_of(&a.2, axis)
            .total_cmp(&axis_of(&b.2, axis))
            .then(a.0.cmp(&b.0))
    });
    mid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Triangle;
    use isect_math::Vec3;

    /// A grid of small triangles in the z=0 plane.
    fn triangle_grid(n: usize) -> Vec<Triangle> {
        let mut tris = Vec::new();
        for i in 0..n {
            for j in 0..n {
                let x = i as f32;
                let y = j as f32;
                tris.push(Triangle::new(
                    Point3::new(x, y, 0.0),
                    Point3::new(x + 0.9, y, 0.0),
                    Point3::new(x, y + 0.9, 0.0),
                ));
            }
        }
        tris
    }

    fn build(tris: &[Triangle], strategy: SplitStrategy) -> Bvh {
        let bounds: Vec<Aabb3> = tris.iter().map(Triangle::aabb).collect();
        let settings = BuildSettings {
            strategy,
            ..Default::default()
        };
        Bvh::build(&bounds, &settings)
    }

    fn brute_force(tris: &[Triangle], ray: &Ray) -> Option<(u32, TriangleHit)> {
        let mut best: Option<(u32, TriangleHit)> = None;
        for (i, tri) in tris.iter().enumerate() {
            if let Some(hit) = tri.intersect(ray) {
                if ray.accepts(hit.t) && best.map_or(true, |(_, b)| hit.t < b.t) {
                    best = Some((i as u32, hit));
                }
            }
        }
        best
    }

    #[test]
    fn test_empty_bvh_misses() {
        let bvh = Bvh::build(&[], &BuildSettings::default());
        assert!(bvh.is_empty());
        assert_eq!(bvh.depth(), 0);
        let ray = Ray::new(Point3::origin(), Vec3::new(0.0, 0.0, 1.0));
        let tris: Vec<Triangle> = Vec::new();
        assert!(bvh.closest_hit(&ray, |i| tris[i as usize].intersect(&ray)).is_none());
        assert!(!bvh.any_hit(&ray, |i| tris[i as usize].intersect(&ray)));
    }

    #[test]
    fn test_flatten_covers_every_primitive_once() {
        let tris = triangle_grid(10);
        for strategy in [SplitStrategy::Sah, SplitStrategy::Median] {
            let bvh = build(&tris, strategy);
            let mut seen = bvh.prim_indices().to_vec();
            seen.sort_unstable();
            let expected: Vec<u32> = (0..tris.len() as u32).collect();
            assert_eq!(seen, expected);
            assert!(bvh.depth() > 1);
            for node in bvh.nodes() {
                if node.is_leaf {
                    assert!(node.right_or_count as usize <= 4);
                }
            }
        }
    }

    #[test]
    fn test_closest_matches_brute_force() {
        let mut tris = triangle_grid(8);
        // A second layer above part of the grid.
        for tri in triangle_grid(4) {
            let lifted = tri.v.map(|p| Point3::new(p.x, p.y, -2.0));
            tris.push(Triangle::new(lifted[0], lifted[1], lifted[2]));
        }
        let bvh = build(&tris, SplitStrategy::Sah);

        for i in 0..16 {
            for j in 0..16 {
                let origin = Point3::new(i as f32 * 0.5 + 0.1, j as f32 * 0.5 + 0.1, -10.0);
                let ray = Ray::new(origin, Vec3::new(0.0, 0.0, 1.0));
                let expected = brute_force(&tris, &ray).map(|(i, _)| i);
                let got = bvh
                    .closest_hit(&ray, |p| tris[p as usize].intersect(&ray))
                    .map(|(i, _)| i);
                assert_eq!(got, expected, "ray at {origin:?}");
            }
        }
    }

    #[test]
    fn test_tie_break_lowest_index() {
        let tri = Triangle::new(
            Point3::new(-1.0, -1.0, 0.0),
            Point3::new(1.0, -1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        let mut tris = triangle_grid(6);
        tris.push(tri);
        tris.push(tri);
        let first = (tris.len() - 2) as u32;
        let bvh = build(&tris, SplitStrategy::Sah);

        let ray = Ray::new(Point3::new(-0.2, -0.2, -5.0), Vec3::new(0.0, 0.0, 1.0));
        for _ in 0..3 {
            let (prim, _) = bvh.closest_hit(&ray, |p| tris[p as usize].intersect(&ray)).unwrap();
            assert_eq!(prim, first);
        }
    }

    #[test]
    fn test_respects_ray_range() {
        let tris = triangle_grid(3);
        let bvh = build(&tris, SplitStrategy::Median);
        let short = Ray::with_range(
            Point3::new(0.2, 0.2, -10.0),
            Vec3::new(0.0, 0.0, 1.0),
            0.0,
            5.0,
        );
        assert!(bvh.closest_hit(&short, |p| tris[p as usize].intersect(&short)).is_none());
        assert!(!bvh.any_hit(&short, |p| tris[p as usize].intersect(&short)));

        let long = Ray::new(Point3::new(0.2, 0.2, -10.0), Vec3::new(0.0, 0.0, 1.0));
        assert!(bvh.any_hit(&long, |p| tris[p as usize].intersect(&long)));
    }

    #[test]
    fn test_coincident_centroids_terminate() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        let tris = vec![tri; 37];
        let bvh = build(&tris, SplitStrategy::Sah);
        assert_eq!(bvh.primitive_count(), 37);
        let ray = Ray::new(Point3::new(0.2, 0.2, -1.0), Vec3::new(0.0, 0.0, 1.0));
        let (prim, _) = bvh.closest_hit(&ray, |p| tris[p as usize].intersect(&ray)).unwrap();
        assert_eq!(prim, 0);
    }
}
