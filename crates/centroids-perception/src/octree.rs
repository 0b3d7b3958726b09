//! Obstacle proximity index.
//!
//! Partitions the obstacle cloud with a recursive **Octree** so that the
//! filter and merge stages can ask "is any obstacle strictly closer than `r`
//! to this point?" without scanning every obstacle.  Answers are identical
//! to [`geometry::any_within`] over the same points; the tree only prunes
//! octants whose box cannot hold a hit.
//!
//! # Key types
//!
//! | Type | Role |
//! |------|------|
//! | [`Aabb`]     | An axis-aligned bounding box.                   |
//! | [`Octree`]   | Spatial index; build from points, query radius. |
//!
//! # Example
//!
//! ```rust
//! use centroids_perception::octree::Octree;
//! use centroids_types::Point3;
//!
//! let tree = Octree::from_points(&[
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(5.0, 5.0, 5.0),
//! ]);
//!
//! assert!(tree.any_within(Point3::new(0.1, 0.0, 0.0), 0.2));
//! assert!(!tree.any_within(Point3::new(2.5, 2.5, 2.5), 1.0));
//! ```
//!
//! [`geometry::any_within`]: crate::geometry::any_within

use centroids_types::Point3;

use crate::geometry::distance;

/// Leaf capacity used by [`Octree::from_points`].
const DEFAULT_CAPACITY: usize = 16;

/// Subdivision stops at this depth even when a leaf is over capacity
/// (e.g. many coincident obstacle points).
const DEFAULT_MAX_DEPTH: usize = 10;

// ────────────────────────────────────────────────────────────────────────────
// Aabb
// ────────────────────────────────────────────────────────────────────────────

/// An axis-aligned bounding box, defined by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3,
    pub max: Point3,
}

impl Aabb {
    /// Create a bounding box from its two opposite corners.
    ///
    /// The constructor normalises the corners so that `min ≤ max` per axis.
    pub fn new(a: Point3, b: Point3) -> Self {
        Self {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Smallest box enclosing every point, or `None` for an empty slice.
    pub fn enclosing(points: &[Point3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bounds = Aabb::new(*first, *first);
        for p in rest {
            bounds.min = Point3::new(
                bounds.min.x.min(p.x),
                bounds.min.y.min(p.y),
                bounds.min.z.min(p.z),
            );
            bounds.max = Point3::new(
                bounds.max.x.max(p.x),
                bounds.max.y.max(p.y),
                bounds.max.z.max(p.z),
            );
        }
        Some(bounds)
    }

    /// Cube of half-width `radius` centred on `p`.
    pub fn around(p: Point3, radius: f32) -> Self {
        Aabb::new(
            Point3::new(p.x - radius, p.y - radius, p.z - radius),
            Point3::new(p.x + radius, p.y + radius, p.z + radius),
        )
    }

    /// Return the centre point of the box.
    pub fn centre(&self) -> Point3 {
        Point3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }

    /// True when the point lies inside or on the boundary of the box.
    pub fn contains_point(&self, p: Point3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// True when `other` overlaps (intersects or touches) this box.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Octree
// ────────────────────────────────────────────────────────────────────────────

/// A recursive spatial index over a fixed obstacle cloud.
///
/// The root box is the tight bounding box of the points it was built from,
/// so no input point is ever dropped.  Subdividing stops when either
/// - the number of points in a node is ≤ `capacity`, or
/// - `max_depth` levels have already been created.
#[derive(Debug)]
pub struct Octree {
    root: Option<OctreeNode>,
    max_depth: usize,
}

impl Octree {
    /// Build an index over `points` with the default capacity and depth.
    pub fn from_points(points: &[Point3]) -> Self {
        Self::with_params(points, DEFAULT_CAPACITY, DEFAULT_MAX_DEPTH)
    }

    /// Build an index with an explicit leaf capacity and maximum depth.
    pub fn with_params(points: &[Point3], capacity: usize, max_depth: usize) -> Self {
        let root = Aabb::enclosing(points).map(|bounds| {
            let mut node = OctreeNode::new(bounds, capacity.max(1));
            for &p in points {
                node.insert(p, max_depth, 0);
            }
            node
        });
        Self { root, max_depth }
    }

    /// Return the total number of points stored in the tree.
    pub fn len(&self) -> usize {
        self.root.as_ref().map_or(0, OctreeNode::count)
    }

    /// True when the tree contains no points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum subdivision depth this tree was built with.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// True iff some stored point lies strictly closer than `radius` to `p`.
    ///
    /// An empty tree never reports a hit.
    pub fn any_within(&self, p: Point3, radius: f32) -> bool {
        if radius.is_nan() || radius <= 0.0 {
            return false;
        }
        let Some(root) = &self.root else {
            return false;
        };
        // Pad the pruning box so f32 rounding on `p ± radius` can never
        // exclude a point the exact distance test would accept.
        let pad = radius * 1e-4 + f32::EPSILON;
        let probe = Aabb::around(p, radius + pad);
        root.any_within(&probe, p, radius)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OctreeNode – internal implementation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct OctreeNode {
    bounds: Aabb,
    capacity: usize,
    /// Points stored at this node (only non-empty when the node is a leaf).
    points: Vec<Point3>,
    /// Eight children; `None` while this node is a leaf.
    children: Option<Box<[OctreeNode; 8]>>,
}

impl OctreeNode {
    fn new(bounds: Aabb, capacity: usize) -> Self {
        Self {
            bounds,
            capacity,
            points: Vec::new(),
            children: None,
        }
    }

    fn count(&self) -> usize {
        match &self.children {
            None => self.points.len(),
            Some(children) => children.iter().map(OctreeNode::count).sum(),
        }
    }

    fn insert(&mut self, point: Point3, max_depth: usize, depth: usize) {
        if !self.bounds.contains_point(point) {
            return;
        }

        match self.children.as_mut() {
            None => {
                self.points.push(point);
                // Subdivide when over capacity and depth budget remains.
                if self.points.len() > self.capacity && depth < max_depth {
                    self.subdivide(max_depth, depth);
                }
            }
            Some(children) => {
                if let Some(child) = children
                    .iter_mut()
                    .find(|c| c.bounds.contains_point(point))
                {
                    child.insert(point, max_depth, depth + 1);
                }
            }
        }
    }

    fn any_within(&self, probe: &Aabb, p: Point3, radius: f32) -> bool {
        if !self.bounds.overlaps(probe) {
            return false;
        }
        match &self.children {
            None => self.points.iter().any(|&q| distance(p, q) < radius),
            Some(children) => children.iter().any(|c| c.any_within(probe, p, radius)),
        }
    }

    /// Split this leaf into eight children and redistribute existing points.
    fn subdivide(&mut self, max_depth: usize, depth: usize) {
        let c = self.bounds.centre();
        let min = self.bounds.min;
        let max = self.bounds.max;

        let octants = [
            Aabb::new(min, c),
            Aabb::new(Point3::new(c.x, min.y, min.z), Point3::new(max.x, c.y, c.z)),
            Aabb::new(Point3::new(min.x, c.y, min.z), Point3::new(c.x, max.y, c.z)),
            Aabb::new(Point3::new(c.x, c.y, min.z), Point3::new(max.x, max.y, c.z)),
            Aabb::new(Point3::new(min.x, min.y, c.z), Point3::new(c.x, c.y, max.z)),
            Aabb::new(Point3::new(c.x, min.y, c.z), Point3::new(max.x, c.y, max.z)),
            Aabb::new(Point3::new(min.x, c.y, c.z), Point3::new(c.x, max.y, max.z)),
            Aabb::new(c, max),
        ];

        let cap = self.capacity;
        let mut children = Box::new(octants.map(|b| OctreeNode::new(b, cap)));

        let points = std::mem::take(&mut self.points);
        for p in points {
            if let Some(child) = children.iter_mut().find(|ch| ch.bounds.contains_point(p)) {
                child.insert(p, max_depth, depth + 1);
            }
        }

        self.children = Some(children);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
