use rstar::{RTree, RTreeObject, AABB};

use crate::geometry::{BBox, Point};

/// An entry in the blockage R-tree.
#[derive(Debug, Clone)]
pub struct Blockage {
    /// Position in the blockage list the index was built from.
    pub index: usize,
    pub bbox: BBox,
}

impl RTreeObject for Blockage {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bbox.min.x, self.bbox.min.y],
            [self.bbox.max.x, self.bbox.max.y],
        )
    }
}

/// Spatial index over obstructions, used to find what a new route would hit.
pub struct BlockageIndex {
    tree: RTree<Blockage>,
}

impl BlockageIndex {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    pub fn build(blockages: Vec<BBox>) -> Self {
        let entries = blockages
            .into_iter()
            .enumerate()
            .map(|(index, bbox)| Blockage { index, bbox })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn insert(&mut self, bbox: BBox) {
        let index = self.tree.size();
        self.tree.insert(Blockage { index, bbox });
    }

    /// Blockages whose box contains `point`.
    pub fn query_point(&self, point: &Point) -> Vec<&Blockage> {
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point([point.x, point.y]))
            .collect()
    }

    /// Blockages touching or overlapping `region`.
    pub fn query_region(&self, region: &BBox) -> Vec<&Blockage> {
        let envelope = AABB::from_corners(
            [region.min.x, region.min.y],
            [region.max.x, region.max.y],
        );
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .collect()
    }

    pub fn is_blocked(&self, region: &BBox) -> bool {
        !self.query_region(region).is_empty()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl Default for BlockageIndex {
    fn default() -> Self {
        Self::new()
    }
}
