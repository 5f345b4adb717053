//! Parallel rule-area / copper-zone collision cache
//!
//! Every (rule area, filled copper zone) pair with overlapping boxes is an
//! independent task. Tasks run on a rayon pool from a scoped thread while
//! the calling thread waits on a completion channel in bounded slices,
//! reporting progress and watching for cancellation between slices.

use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::board::{Board, ItemId, ItemKind};
use super::config::DrcConfig;
use super::geometry::{areas_touch, deflate, to_geo_multi, triangle_to_geo};
use super::progress::{CancellationToken, ProgressReporter};
use super::spatial::DrcRtree;

/// (rule area, copper zone)
pub type AreaZonePair = (ItemId, ItemId);

/// Collision results keyed by pair. Each slot is written by exactly one
/// task; missing slots mean the task never ran.
#[derive(Debug, Default)]
pub struct AreaCache {
    slots: Mutex<HashMap<AreaZonePair, bool>>,
}

impl AreaCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<AreaZonePair, bool>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, area: ItemId, zone: ItemId) -> Option<bool> {
        self.lock().get(&(area, zone)).copied()
    }

    pub fn insert(&self, area: ItemId, zone: ItemId, collides: bool) {
        self.lock().insert((area, zone), collides);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Pairs found colliding, sorted for deterministic reporting
    pub fn collisions(&self) -> Vec<AreaZonePair> {
        let mut pairs: Vec<AreaZonePair> = self
            .lock()
            .iter()
            .filter(|(_, hit)| **hit)
            .map(|(pair, _)| *pair)
            .collect();
        pairs.sort_unstable();
        pairs
    }
}

/// Rule-area / filled-zone pairs whose boxes intersect
pub fn candidate_pairs(board: &Board) -> Vec<AreaZonePair> {
    let zones: Vec<_> = board
        .copper_zones()
        .filter(|(_, z)| z.as_zone().is_some_and(|z| z.is_filled()))
        .filter_map(|(id, z)| z.bbox().map(|b| (id, z, b)))
        .collect();

    let mut pairs = Vec::new();
    for (area_id, area) in board.rule_areas() {
        let Some(area_box) = area.bbox() else { continue };
        for (zone_id, zone, zone_box) in &zones {
            if area_box.intersects(zone_box) && !area.layers.intersection(&zone.layers).is_empty() {
                pairs.push((area_id, *zone_id));
            }
        }
    }
    pairs
}

/// Whether the rule area's outline, shrunk by `epsilon`, overlaps the
/// zone's indexed fill on any shared layer
pub fn zone_collides_area(board: &Board, index: &DrcRtree, area_id: ItemId, zone_id: ItemId, epsilon: f64) -> bool {
    let (Some(area), Some(zone)) = (board.item(area_id), board.item(zone_id)) else {
        return false;
    };
    let (Some(area_zone), Some(area_box)) = (area.as_zone(), area.bbox()) else {
        return false;
    };
    if zone.kind() != ItemKind::Zone {
        return false;
    }
    let outline = deflate(&to_geo_multi(std::slice::from_ref(&area_zone.outline)), epsilon);
    if outline.0.is_empty() {
        return false;
    }
    area.layers.intersection(&zone.layers).iter().any(|layer| {
        index
            .query_region(layer, area_box, 0.0)
            .filter(|entry| entry.item == zone_id)
            .filter_map(|entry| entry.triangle())
            .any(|tri| areas_touch(&outline, &triangle_to_geo(tri)))
    })
}

/// Fill `cache` for every candidate pair. Returns false if the build was
/// cancelled; slots of tasks that never ran stay empty.
pub fn build_area_cache(
    board: &Board,
    index: &DrcRtree,
    config: &DrcConfig,
    cache: &AreaCache,
    cancel: &CancellationToken,
    progress: &mut dyn ProgressReporter,
) -> bool {
    let pairs = candidate_pairs(board);
    if pairs.is_empty() {
        return !cancel.is_cancelled();
    }

    let start = Instant::now();
    let total = pairs.len();
    let epsilon = config.area_epsilon_mm;
    let poll = Duration::from_millis(config.cache_poll_interval_ms.max(1));
    let granularity = config.progress_granularity.max(1);
    tracing::debug!("[DRC] Building area cache: {} rule area / zone pairs", total);

    let (tx, rx) = mpsc::channel::<()>();
    let mut done = 0usize;

    std::thread::scope(|scope| {
        let pairs = &pairs;
        scope.spawn(move || {
            let run = move || {
                pairs.par_iter().for_each_with(tx, |tx, &(area_id, zone_id)| {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let hit = zone_collides_area(board, index, area_id, zone_id, epsilon);
                    cache.insert(area_id, zone_id, hit);
                    let _ = tx.send(());
                });
            };
            match worker_pool(config.worker_threads) {
                Some(pool) => pool.install(run),
                None => run(),
            }
        });

        let mut reported = 0usize;
        loop {
            match rx.recv_timeout(poll) {
                Ok(()) => {
                    done += 1;
                    if done - reported < granularity {
                        continue;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            reported = done;
            if !progress.advance(done, total, granularity) {
                cancel.cancel();
            }
        }
    });

    let completed = !cancel.is_cancelled();
    tracing::debug!(
        "[DRC] Area cache: {}/{} pairs evaluated, {} colliding in {:?}{}",
        done,
        total,
        cache.collisions().len(),
        start.elapsed(),
        if completed { "" } else { " (cancelled)" }
    );
    completed
}

fn worker_pool(threads: Option<usize>) -> Option<rayon::ThreadPool> {
    let threads = threads?;
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => Some(pool),
        Err(e) => {
            tracing::warn!("[DRC] cannot build {}-thread pool, using global pool: {}", threads, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BoardItem, DisallowFlags, ItemData, Layer, LayerSet, Point, Polygon, Zone, ZoneFill};
    use crate::drc::progress::NullProgress;

    fn square(x: f64, y: f64, size: f64) -> Polygon {
        Polygon::new(vec![
            Point::new(x, y),
            Point::new(x + size, y),
            Point::new(x + size, y + size),
            Point::new(x, y + size),
        ])
    }

    fn copper_zone(outline: Polygon) -> BoardItem {
        BoardItem::new(
            LayerSet::single(Layer::F_CU),
            ItemData::Zone(Zone {
                name: "GND".into(),
                outline: outline.clone(),
                keepout: None,
                fills: vec![ZoneFill { layer: Layer::F_CU, polygons: vec![outline] }],
            }),
        )
    }

    fn board() -> (Board, ItemId, ItemId, ItemId) {
        let mut board = Board::new();
        let area = board.add(BoardItem::rule_area(
            "KO",
            square(0.0, 0.0, 5.0),
            LayerSet::single(Layer::F_CU),
            DisallowFlags::ZONES,
        ));
        let overlapping = board.add(copper_zone(square(4.0, 4.0, 5.0)));
        // Shares only the edge x = 5
        let touching = board.add(copper_zone(square(5.0, 0.0, 5.0)));
        (board, area, overlapping, touching)
    }

    #[test]
    fn test_touching_is_not_colliding() {
        let (board, area, overlapping, touching) = board();
        let index = DrcRtree::build(&board);
        assert!(zone_collides_area(&board, &index, area, overlapping, 0.001));
        assert!(!zone_collides_area(&board, &index, area, touching, 0.001));
    }

    #[test]
    fn test_build_fills_one_slot_per_pair() {
        let (board, area, overlapping, touching) = board();
        let index = DrcRtree::build(&board);
        let cache = AreaCache::new();
        let config = DrcConfig { worker_threads: Some(2), ..DrcConfig::default() };
        let token = CancellationToken::new();
        assert!(build_area_cache(&board, &index, &config, &cache, &token, &mut NullProgress));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(area, overlapping), Some(true));
        assert_eq!(cache.get(area, touching), Some(false));
        assert_eq!(cache.collisions(), vec![(area, overlapping)]);
    }

    #[test]
    fn test_cancelled_build_leaves_slots_empty() {
        let (board, area, overlapping, _) = board();
        let index = DrcRtree::build(&board);
        let cache = AreaCache::new();
        let token = CancellationToken::new();
        token.cancel();
        assert!(!build_area_cache(&board, &index, &DrcConfig::default(), &cache, &token, &mut NullProgress));
        assert_eq!(cache.get(area, overlapping), None);
    }
}
