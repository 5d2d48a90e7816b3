//! Spatial index over the current object positions.
//!
//! A static 3-D k-d tree, built in O(n log n) by median splits and never
//! patched: every cycle builds a fresh [`SpatialIndex`] and the session swaps
//! the `Arc` atomically, so readers see either the old or the new index.
//!
//! # Queries
//! - [`SpatialIndex::nearest`] — k nearest objects, ascending distance.
//!   `k` larger than the object count returns every object; an empty index
//!   returns an empty list.
//! - [`SpatialIndex::within`] — all objects inside a radius (used by
//!   association gating).

use crate::types::DetectedObject;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

const DIMS: usize = 3;

// ---------------------------------------------------------------------------
// k-d tree
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct KdNode {
    point: [f64; DIMS],
    /// Index of the payload in the caller's slice
    item: usize,
    axis: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// A static k-d tree over 3-D points. Items are indices into the slice the
/// tree was built from.
#[derive(Clone, Debug, Default)]
pub struct KdTree {
    nodes: Vec<KdNode>,
    root: Option<usize>,
}

/// Neighbour candidate ordered by squared distance, ties by item index.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    d2: f64,
    item: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.d2
            .total_cmp(&other.d2)
            .then_with(|| self.item.cmp(&other.item))
    }
}

fn dist2(a: &[f64; DIMS], b: &[f64; DIMS]) -> f64 {
    (0..DIMS).map(|i| (a[i] - b[i]) * (a[i] - b[i])).sum()
}

impl KdTree {
    /// Build a tree over `points`. Non-finite points are skipped.
    pub fn build(points: &[[f64; DIMS]]) -> Self {
        let mut items: Vec<(usize, [f64; DIMS])> = points
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, p)| p.iter().all(|c| c.is_finite()))
            .collect();
        let mut tree = KdTree {
            nodes: Vec::with_capacity(items.len()),
            root: None,
        };
        tree.root = tree.build_rec(&mut items, 0);
        tree
    }

    fn build_rec(&mut self, items: &mut [(usize, [f64; DIMS])], depth: usize) -> Option<usize> {
        if items.is_empty() {
            return None;
        }
        let axis = depth % DIMS;
        let mid = items.len() / 2;
        items.select_nth_unstable_by(mid, |a, b| a.1[axis].total_cmp(&b.1[axis]));

        let (point, item) = (items[mid].1, items[mid].0);
        let node_idx = self.nodes.len();
        self.nodes.push(KdNode {
            point,
            item,
            axis,
            left: None,
            right: None,
        });

        let (lower, rest) = items.split_at_mut(mid);
        let upper = &mut rest[1..];
        let left = self.build_rec(lower, depth + 1);
        let right = self.build_rec(upper, depth + 1);
        self.nodes[node_idx].left = left;
        self.nodes[node_idx].right = right;
        Some(node_idx)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The `k` items closest to `query` as `(item, distance)`, ascending.
    pub fn nearest(&self, query: &[f64; DIMS], k: usize) -> Vec<(usize, f64)> {
        let k = k.min(self.nodes.len());
        if k == 0 || !query.iter().all(|c| c.is_finite()) {
            return Vec::new();
        }
        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
        self.nearest_rec(self.root, query, k, &mut heap);
        heap.into_sorted_vec()
            .into_iter()
            .map(|c| (c.item, c.d2.sqrt()))
            .collect()
    }

    fn nearest_rec(
        &self,
        node: Option<usize>,
        query: &[f64; DIMS],
        k: usize,
        heap: &mut BinaryHeap<Candidate>,
    ) {
        let Some(idx) = node else {
            return;
        };
        let n = &self.nodes[idx];
        let cand = Candidate {
            d2: dist2(&n.point, query),
            item: n.item,
        };
        if heap.len() < k {
            heap.push(cand);
        } else if heap.peek().is_some_and(|worst| cand < *worst) {
            heap.pop();
            heap.push(cand);
        }

        let diff = query[n.axis] - n.point[n.axis];
        let (near, far) = if diff < 0.0 {
            (n.left, n.right)
        } else {
            (n.right, n.left)
        };
        self.nearest_rec(near, query, k, heap);
        // The far side can only help if the splitting plane is closer than
        // the current k-th best (ties included for deterministic ordering).
        let worst = heap.peek().map_or(f64::INFINITY, |c| c.d2);
        if heap.len() < k || diff * diff <= worst {
            self.nearest_rec(far, query, k, heap);
        }
    }

    /// All items within `radius` of `query` as `(item, distance)`, ascending.
    pub fn within(&self, query: &[f64; DIMS], radius: f64) -> Vec<(usize, f64)> {
        if radius.is_nan() || radius < 0.0 || !query.iter().all(|c| c.is_finite()) {
            return Vec::new();
        }
        let r2 = radius * radius;
        let mut found = Vec::new();
        let mut stack: Vec<usize> = self.root.into_iter().collect();
        while let Some(idx) = stack.pop() {
            let n = &self.nodes[idx];
            let d2 = dist2(&n.point, query);
            if d2 <= r2 {
                found.push(Candidate { d2, item: n.item });
            }
            let diff = query[n.axis] - n.point[n.axis];
            if diff <= radius {
                stack.extend(n.left);
            }
            if diff >= -radius {
                stack.extend(n.right);
            }
        }
        found.sort_unstable();
        found.into_iter().map(|c| (c.item, c.d2.sqrt())).collect()
    }
}

// ---------------------------------------------------------------------------
// SpatialIndex — k-d tree plus the objects it was built from
// ---------------------------------------------------------------------------

/// Immutable nearest-neighbour index over one cycle's object list.
#[derive(Clone, Debug)]
pub struct SpatialIndex {
    objects: Arc<[DetectedObject]>,
    tree: KdTree,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::empty()
    }
}

impl SpatialIndex {
    /// The not-yet-built index: every query returns nothing.
    pub fn empty() -> Self {
        Self {
            objects: Arc::from(Vec::new()),
            tree: KdTree::default(),
        }
    }

    /// Build a fresh index over `objects`, replacing nothing in place.
    pub fn build(objects: Arc<[DetectedObject]>) -> Self {
        let points: Vec<[f64; DIMS]> = objects.iter().map(|o| o.position).collect();
        let tree = KdTree::build(&points);
        Self { objects, tree }
    }

    /// Number of indexed objects.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn objects(&self) -> &Arc<[DetectedObject]> {
        &self.objects
    }

    /// Up to `k` objects ordered by ascending Euclidean distance to `point`.
    pub fn nearest(&self, point: [f64; 3], k: usize) -> Vec<DetectedObject> {
        self.nearest_with_distance(point, k)
            .into_iter()
            .map(|(obj, _)| obj)
            .collect()
    }

    pub fn nearest_with_distance(&self, point: [f64; 3], k: usize) -> Vec<(DetectedObject, f64)> {
        self.tree
            .nearest(&point, k)
            .into_iter()
            .map(|(i, d)| (self.objects[i], d))
            .collect()
    }

    /// Objects within `radius` meters of `point`, ascending distance.
    pub fn within(&self, point: [f64; 3], radius: f64) -> Vec<DetectedObject> {
        self.tree
            .within(&point, radius)
            .into_iter()
            .map(|(i, _)| self.objects[i])
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
