//! Layer-aware spatial index over board items
//!
//! One R-tree per layer. Simple items get one entry per layer in their
//! layer set; zones get one entry per triangle of their filled region so
//! that queries only hit them where they actually have copper. Entries
//! hold item handles, never items.

use rstar::{Envelope, PointDistance, RTree, RTreeObject, SelectionFunction, AABB};
use std::collections::{BTreeMap, HashSet};

use crate::board::{Board, BoardItem, ItemId, ItemKind, Layer, Point, Rect, Shape};
use super::distance::shape_point_distance;

/// One indexed piece of an item on one layer
#[derive(Clone, Debug)]
pub struct IndexEntry {
    pub item: ItemId,
    pub layer: Layer,
    /// Geometry used for nearest-distance queries; zone entries carry a
    /// triangle, items without a usable shape fall back to their box
    pub shape: Option<Shape>,
    bounds: AABB<[f64; 2]>,
}

impl IndexEntry {
    fn new(item: ItemId, layer: Layer, bbox: Rect, shape: Option<Shape>) -> Self {
        Self {
            item,
            layer,
            shape,
            bounds: rect_to_aabb(&bbox),
        }
    }

    pub fn bbox(&self) -> Rect {
        let lower = self.bounds.lower();
        let upper = self.bounds.upper();
        Rect::new(Point::new(lower[0], lower[1]), Point::new(upper[0], upper[1]))
    }

    /// Triangle of a zone sub-entry
    pub fn triangle(&self) -> Option<&[Point; 3]> {
        match &self.shape {
            Some(Shape::Triangle(t)) => Some(t),
            _ => None,
        }
    }
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.bounds
    }
}

impl PointDistance for IndexEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        match &self.shape {
            Some(shape) => shape_point_distance(shape, Point::new(point[0], point[1])).powi(2),
            None => self.bounds.distance_2(point),
        }
    }
}

pub fn rect_to_aabb(rect: &Rect) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min.x, rect.min.y], [rect.max.x, rect.max.y])
}

/// Selects the entries of one item, optionally only within a box
struct ByHandle {
    item: ItemId,
    bounds: Option<AABB<[f64; 2]>>,
}

impl SelectionFunction<IndexEntry> for ByHandle {
    fn should_unpack_parent(&self, envelope: &AABB<[f64; 2]>) -> bool {
        self.bounds.map_or(true, |b| envelope.intersects(&b))
    }

    fn should_unpack_leaf(&self, leaf: &IndexEntry) -> bool {
        leaf.item == self.item
    }
}

/// Per-layer R-tree index of board items
#[derive(Default)]
pub struct DrcRtree {
    trees: BTreeMap<Layer, RTree<IndexEntry>>,
}

impl DrcRtree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every live item of the board, bulk-loading each layer tree
    pub fn build(board: &Board) -> Self {
        let start = std::time::Instant::now();
        let mut per_layer: BTreeMap<Layer, Vec<IndexEntry>> = BTreeMap::new();
        for (id, item) in board.iter() {
            for entry in entries_for(id, item) {
                per_layer.entry(entry.layer).or_default().push(entry);
            }
        }
        let trees: BTreeMap<Layer, RTree<IndexEntry>> = per_layer
            .into_iter()
            .map(|(layer, entries)| (layer, RTree::bulk_load(entries)))
            .collect();
        let index = Self { trees };
        tracing::debug!(
            "[DRC] Indexed {} items as {} entries on {} layers in {:?}",
            board.len(),
            index.len(),
            index.trees.len(),
            start.elapsed()
        );
        index
    }

    pub fn insert(&mut self, id: ItemId, item: &BoardItem) {
        for entry in entries_for(id, item) {
            self.trees.entry(entry.layer).or_default().insert(entry);
        }
    }

    /// Remove every entry of `id`. The item's current box is tried first;
    /// if nothing is found there (the item moved since insertion) or the
    /// item is a multi-entry zone, the whole extent is searched by handle.
    /// Returns the number of entries removed.
    pub fn remove(&mut self, id: ItemId, item: &BoardItem) -> usize {
        let bounds = item.bbox().map(|r| rect_to_aabb(&r));
        let multi_entry = item.as_zone().is_some();
        let mut removed = 0;
        for tree in self.trees.values_mut() {
            let mut found = 0;
            if bounds.is_some() {
                while tree.remove_with_selection_function(ByHandle { item: id, bounds }).is_some() {
                    found += 1;
                }
            }
            if found == 0 || multi_entry {
                while tree.remove_with_selection_function(ByHandle { item: id, bounds: None }).is_some() {
                    found += 1;
                }
            }
            removed += found;
        }
        removed
    }

    /// Remove every entry of a handle whose item no longer exists
    pub fn purge(&mut self, id: ItemId) -> usize {
        let mut removed = 0;
        for tree in self.trees.values_mut() {
            while tree.remove_with_selection_function(ByHandle { item: id, bounds: None }).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Membership test. `robust` adds an unbounded search by handle for
    /// items that moved since they were indexed.
    pub fn contains(&self, id: ItemId, item: &BoardItem, robust: bool) -> bool {
        self.trees
            .keys()
            .any(|layer| self.contains_on(*layer, id, item, robust))
    }

    /// Membership test restricted to one layer
    pub fn contains_on(&self, layer: Layer, id: ItemId, item: &BoardItem, robust: bool) -> bool {
        let Some(tree) = self.trees.get(&layer) else {
            return false;
        };
        let bounds = item.bbox().map(|r| rect_to_aabb(&r));
        if bounds.is_some()
            && tree
                .locate_with_selection_function(ByHandle { item: id, bounds })
                .next()
                .is_some()
        {
            return true;
        }
        robust
            && tree
                .locate_with_selection_function(ByHandle { item: id, bounds: None })
                .next()
                .is_some()
    }

    /// Every entry on a layer
    pub fn query_layer(&self, layer: Layer) -> impl Iterator<Item = &IndexEntry> + '_ {
        self.trees.get(&layer).into_iter().flat_map(|tree| tree.iter())
    }

    /// Entries whose boxes intersect `rect` grown by `accuracy`
    pub fn query_region(&self, layer: Layer, rect: Rect, accuracy: f64) -> impl Iterator<Item = &IndexEntry> + '_ {
        let search = rect_to_aabb(&rect.inflate(accuracy.max(0.0)));
        self.trees
            .get(&layer)
            .into_iter()
            .flat_map(move |tree| tree.locate_in_envelope_intersecting(&search))
    }

    pub fn query_point(&self, layer: Layer, point: Point, accuracy: f64) -> impl Iterator<Item = &IndexEntry> + '_ {
        self.query_region(layer, Rect::new(point, point), accuracy)
    }

    /// Distinct items near `rect`, in handle order, optionally filtered by kind
    pub fn query_items(&self, layer: Layer, rect: Rect, accuracy: f64, board: &Board, kinds: &[ItemKind]) -> Vec<ItemId> {
        let mut seen = HashSet::new();
        let mut ids: Vec<ItemId> = self
            .query_region(layer, rect, accuracy)
            .filter(|e| seen.insert(e.item))
            .map(|e| e.item)
            .filter(|id| {
                kinds.is_empty()
                    || board.item(*id).is_some_and(|item| kinds.contains(&item.kind()))
            })
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Up to `limit` distinct items closest to `point` on `layer`, with
    /// their distances
    pub fn nearest(&self, point: Point, layer: Layer, limit: usize) -> Vec<(ItemId, f64)> {
        let Some(tree) = self.trees.get(&layer) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        tree.nearest_neighbor_iter_with_distance_2(&[point.x, point.y])
            .filter(|(entry, _)| seen.insert(entry.item))
            .take(limit)
            .map(|(entry, d2)| (entry.item, d2.sqrt()))
            .collect()
    }

    /// Layers that have at least one entry
    pub fn layers(&self) -> impl Iterator<Item = Layer> + '_ {
        self.trees.iter().filter(|(_, t)| t.size() > 0).map(|(l, _)| *l)
    }

    pub fn len(&self) -> usize {
        self.trees.values().map(RTree::size).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Entries an item contributes: one per layer, or one per fill triangle
/// per layer for zones
fn entries_for(id: ItemId, item: &BoardItem) -> Vec<IndexEntry> {
    let mut entries = Vec::new();
    if item.as_zone().is_some() {
        for layer in item.layers.iter() {
            for tri in item.fill_triangles(layer) {
                if let Some(bbox) = Rect::from_points(&tri) {
                    entries.push(IndexEntry::new(id, layer, bbox, Some(Shape::Triangle(tri))));
                }
            }
        }
        return entries;
    }

    let Some(bbox) = item.bbox() else {
        return entries;
    };
    for layer in item.layers.iter() {
        entries.push(IndexEntry::new(id, layer, bbox, item.effective_shape(layer)));
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{DisallowFlags, LayerSet, Polygon};

    fn square(x: f64, y: f64, size: f64) -> Polygon {
        Polygon::new(vec![
            Point::new(x, y),
            Point::new(x + size, y),
            Point::new(x + size, y + size),
            Point::new(x, y + size),
        ])
    }

    #[test]
    fn test_item_reachable_only_on_its_layers() {
        let mut board = Board::new();
        let track = board.add(BoardItem::track(Layer::F_CU, Point::new(0.0, 0.0), Point::new(5.0, 0.0), 0.2));
        let index = DrcRtree::build(&board);
        let item = board.item(track).unwrap();
        assert!(index.contains_on(Layer::F_CU, track, item, false));
        assert!(!index.contains_on(Layer::B_CU, track, item, true));
    }

    #[test]
    fn test_zone_indexed_per_triangle_and_fully_removed() {
        let mut board = Board::new();
        let area = board.add(BoardItem::rule_area(
            "KO",
            square(0.0, 0.0, 5.0),
            LayerSet::single(Layer::F_CU).with(Layer::B_CU),
            DisallowFlags::VIAS,
        ));
        let mut index = DrcRtree::build(&board);
        // Two triangles on each of two layers
        assert_eq!(index.len(), 4);
        let item = board.item(area).unwrap().clone();
        assert_eq!(index.remove(area, &item), 4);
        assert!(!index.contains(area, &item, true));
        assert!(index.is_empty());
    }

    #[test]
    fn test_remove_finds_moved_item() {
        let mut board = Board::new();
        let via = board.add(BoardItem::via(Point::new(1.0, 1.0), 0.6, 0.3));
        let mut index = DrcRtree::build(&board);
        board.item_mut(via).unwrap().translate(50.0, 50.0);
        let moved = board.item(via).unwrap();
        assert!(!index.contains(via, moved, false));
        assert!(index.contains(via, moved, true));
        assert_eq!(index.remove(via, moved), 32);
        assert!(!index.contains(via, moved, true));
    }

    #[test]
    fn test_nearest_uses_item_distance() {
        let mut board = Board::new();
        let wide = board.add(BoardItem::track(Layer::F_CU, Point::new(0.0, 2.0), Point::new(10.0, 2.0), 2.0));
        let via = board.add(BoardItem::via(Point::new(5.0, -1.5), 0.6, 0.3));
        let index = DrcRtree::build(&board);
        let hits = index.nearest(Point::new(5.0, 0.0), Layer::F_CU, 2);
        // Track edge is 1.0 away, via edge 1.2 away
        assert_eq!(hits[0].0, wide);
        assert!((hits[0].1 - 1.0).abs() < 1e-9);
        assert_eq!(hits[1].0, via);
        assert!((hits[1].1 - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_region_queries_and_purge() {
        let mut board = Board::new();
        let track = board.add(BoardItem::track(Layer::F_CU, Point::new(0.0, 0.0), Point::new(5.0, 0.0), 0.2));
        let via = board.add(BoardItem::via(Point::new(2.0, 0.5), 0.6, 0.3));
        board.add(BoardItem::via(Point::new(40.0, 40.0), 0.6, 0.3));
        let mut index = DrcRtree::build(&board);

        let near = Rect::new(Point::new(1.0, -1.0), Point::new(3.0, 1.0));
        assert_eq!(index.query_items(Layer::F_CU, near, 0.0, &board, &[]), vec![track, via]);
        assert_eq!(index.query_items(Layer::F_CU, near, 0.0, &board, &[ItemKind::Via]), vec![via]);
        assert_eq!(index.query_point(Layer::B_CU, Point::new(2.0, 0.5), 0.0).count(), 1);
        assert_eq!(index.query_point(Layer::F_CU, Point::new(20.0, 20.0), 0.5).count(), 0);

        board.remove(via);
        assert_eq!(index.purge(via), 32);
        assert_eq!(index.query_items(Layer::F_CU, near, 0.0, &board, &[]), vec![track]);
    }

    #[test]
    fn test_query_on_missing_layer_is_empty() {
        let index = DrcRtree::new();
        assert_eq!(index.query_layer(Layer::F_CU).count(), 0);
        assert!(index.nearest(Point::new(0.0, 0.0), Layer::B_CU, 3).is_empty());
    }
}
