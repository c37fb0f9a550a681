//! Spatial index for planar hit testing
//!
//! Uses R-tree (via `rstar`) for O(log n) lookups instead of a linear scan
//! over every block of the filesystem map or every marker of a timeline.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use super::arena::NodeHandle;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Extent {
    Circle { radius: f32 },
    Rect { half: [f32; 2] },
}

/// Spatial index entry for a pickable planar node
#[derive(Debug, Clone)]
pub struct SpatialNode {
    pub handle: NodeHandle,
    pub center: [f32; 2],
    extent: Extent,
    bounds: AABB<[f32; 2]>,
}

impl SpatialNode {
    /// Circular node (markers, dots)
    pub fn circle(handle: NodeHandle, center: [f32; 2], radius: f32) -> Self {
        Self {
            handle,
            center,
            extent: Extent::Circle { radius },
            bounds: AABB::from_corners(
                [center[0] - radius, center[1] - radius],
                [center[0] + radius, center[1] + radius],
            ),
        }
    }

    /// Axis-aligned rectangle (blocks, zone frames, list rows)
    pub fn rect(handle: NodeHandle, center: [f32; 2], size: [f32; 2]) -> Self {
        let half = [size[0] * 0.5, size[1] * 0.5];
        Self {
            handle,
            center,
            extent: Extent::Rect { half },
            bounds: AABB::from_corners(
                [center[0] - half[0], center[1] - half[1]],
                [center[0] + half[0], center[1] + half[1]],
            ),
        }
    }

    fn area(&self) -> f32 {
        match self.extent {
            Extent::Circle { radius } => std::f32::consts::PI * radius * radius,
            Extent::Rect { half } => 4.0 * half[0] * half[1],
        }
    }

    /// Distance from `point` to the node's edge; zero inside
    fn edge_distance(&self, point: [f32; 2]) -> f32 {
        let dx = point[0] - self.center[0];
        let dy = point[1] - self.center[1];
        match self.extent {
            Extent::Circle { radius } => ((dx * dx + dy * dy).sqrt() - radius).max(0.0),
            Extent::Rect { half } => {
                let ox = (dx.abs() - half[0]).max(0.0);
                let oy = (dy.abs() - half[1]).max(0.0);
                (ox * ox + oy * oy).sqrt()
            }
        }
    }
}

impl RTreeObject for SpatialNode {
    type Envelope = AABB<[f32; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.bounds
    }
}

impl PointDistance for SpatialNode {
    fn distance_2(&self, point: &[f32; 2]) -> f32 {
        let d = self.edge_distance(*point);
        d * d
    }

    fn contains_point(&self, point: &[f32; 2]) -> bool {
        self.edge_distance(*point) <= 0.0
    }
}

#[derive(Clone, Default)]
pub struct SpatialIndex {
    tree: RTree<SpatialNode>,
    count: usize,
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

impl SpatialIndex {
    pub fn from_nodes(nodes: impl Iterator<Item = SpatialNode>) -> Self {
        let nodes: Vec<_> = nodes.collect();
        let count = nodes.len();
        Self {
            tree: RTree::bulk_load(nodes),
            count,
        }
    }

    /// Closest node within `threshold` of `point`
    ///
    /// When several nodes contain the point (a block inside its zone frame)
    /// the smallest one wins.
    pub fn hit_test(&self, point: [f32; 2], threshold: f32) -> Option<&SpatialNode> {
        let search_bounds = AABB::from_corners(
            [point[0] - threshold, point[1] - threshold],
            [point[0] + threshold, point[1] + threshold],
        );

        self.tree
            .locate_in_envelope_intersecting(&search_bounds)
            .filter(|node| node.edge_distance(point) <= threshold)
            .min_by(|a, b| {
                let key_a = (a.edge_distance(point), a.area());
                let key_b = (b.edge_distance(point), b.area());
                key_a
                    .partial_cmp(&key_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
