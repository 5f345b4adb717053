//! Items inside rule areas (keepouts)

use std::collections::BTreeSet;

use crate::board::{BoardItem, DisallowFlags, ItemData, ItemId, Layer, Point, Polygon, ViaType};
use crate::drc::distance::{point_segment_distance, segment_collides_polygon};
use crate::drc::engine::DrcContext;
use crate::drc::geometry::{areas_overlap, circle_intersects_area, shape_intersects_area, to_geo_multi};
use crate::drc::rules::ConstraintType;
use crate::drc::types::{ErrorKind, ProviderState};
use super::TestProvider;

/// Flags this provider acts on; zones are handled with the area cache
const KEEPOUT_FLAGS: [DisallowFlags; 9] = [
    DisallowFlags::TRACKS,
    DisallowFlags::VIAS,
    DisallowFlags::MICROVIAS,
    DisallowFlags::BLIND_VIAS,
    DisallowFlags::HOLES,
    DisallowFlags::PADS,
    DisallowFlags::FOOTPRINTS,
    DisallowFlags::TEXTS,
    DisallowFlags::GRAPHICS,
];

const KEEPOUT_KINDS: [ErrorKind; 9] = [
    ErrorKind::TrackInsideKeepout,
    ErrorKind::ViaInsideKeepout,
    ErrorKind::MicroviaInsideKeepout,
    ErrorKind::BbviaInsideKeepout,
    ErrorKind::HoleInsideKeepout,
    ErrorKind::PadInsideKeepout,
    ErrorKind::FootprintInsideKeepout,
    ErrorKind::TextInsideKeepout,
    ErrorKind::GraphicInsideKeepout,
];

pub struct KeepoutProvider;

impl KeepoutProvider {
    pub const NAME: &'static str = "keepout";
}

/// One rule area under test
struct Keepout<'a> {
    id: ItemId,
    item: &'a BoardItem,
    name: &'a str,
    outline: &'a Polygon,
    flags: DisallowFlags,
}

/// A detected hit, reported once evidence is complete
struct Hit {
    kind: ErrorKind,
    flag: DisallowFlags,
    layer: Option<Layer>,
}

impl TestProvider for KeepoutProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Tests items inside keepout areas"
    }

    fn matching_constraints(&self) -> &'static [ConstraintType] {
        &[]
    }

    fn run(&self, ctx: &mut DrcContext<'_>) -> ProviderState {
        let board = ctx.board();
        let any_flag = KEEPOUT_FLAGS.iter().fold(DisallowFlags::NONE, |acc, f| acc.union(*f));
        let keepouts: Vec<Keepout> = board
            .rule_areas()
            .filter_map(|(id, item)| {
                let zone = item.as_zone()?;
                let flags = zone.disallow();
                (flags.intersects(any_flag) && !zone.outline.is_degenerate()).then_some(Keepout {
                    id,
                    item,
                    name: zone.name.as_str(),
                    outline: &zone.outline,
                    flags,
                })
            })
            .collect();

        if keepouts.is_empty() {
            return ProviderState::Completed;
        }
        if KEEPOUT_KINDS.iter().all(|k| ctx.is_error_limit_exceeded(*k)) {
            return ProviderState::Completed;
        }
        if !ctx.report_phase("Checking keepout areas...") {
            return ProviderState::Cancelled;
        }

        let mut work = Vec::with_capacity(keepouts.len());
        for keepout in &keepouts {
            work.push((keepout, candidates(ctx, keepout)));
        }
        let total: usize = work.iter().map(|(_, ids)| ids.len()).sum();
        let mut done = 0usize;
        let mut hits = 0usize;
        for (keepout, ids) in &work {
            for &id in ids {
                if !ctx.report_progress(done, total) {
                    return ProviderState::Cancelled;
                }
                done += 1;
                let Some(item) = board.item(id) else { continue };
                if shares_parent(keepout, id, item) {
                    continue;
                }
                let Some(hit) = check_item(keepout, item) else { continue };
                if ctx.is_error_limit_exceeded(hit.kind) {
                    continue;
                }
                let mut violation = ctx
                    .violation(hit.kind)
                    .with_items(&[id, keepout.id])
                    .with_rule(keepout.name)
                    .with_detail(format!(
                        "{} (rule area '{}' disallows {})",
                        hit.kind.description(),
                        keepout.name,
                        hit.flag.names().join(", ")
                    ));
                if let Some(layer) = hit.layer {
                    violation = violation.on_layer(layer);
                }
                let marker = marker_for(item, keepout);
                if ctx.report_with_marker(violation, marker) {
                    hits += 1;
                }
            }
        }

        tracing::debug!("[DRC] {} keepout areas, {} candidates tested, {} hits", keepouts.len(), total, hits);
        ProviderState::Completed
    }
}

/// Items near the keepout on any of its layers, in handle order
fn candidates(ctx: &DrcContext<'_>, keepout: &Keepout<'_>) -> BTreeSet<ItemId> {
    let Some(bbox) = keepout.outline.bbox() else {
        return BTreeSet::new();
    };
    let index = ctx.index();
    keepout
        .item
        .layers
        .iter()
        .flat_map(|layer| index.query_region(layer, bbox, 0.0).map(|e| e.item))
        .filter(|id| *id != keepout.id)
        .collect()
}

/// Footprint-owned rule areas do not police their own footprint
fn shares_parent(keepout: &Keepout<'_>, id: ItemId, item: &BoardItem) -> bool {
    match keepout.item.parent {
        Some(parent) => id == parent || item.parent == Some(parent),
        None => false,
    }
}

fn shared_layers(keepout: &Keepout<'_>, item: &BoardItem) -> Vec<Layer> {
    item.layers.intersection(&keepout.item.layers).iter().collect()
}

fn check_item(keepout: &Keepout<'_>, item: &BoardItem) -> Option<Hit> {
    let flags = keepout.flags;
    let layers = shared_layers(keepout, item);
    let first_layer = layers.first().copied();
    let hit = |kind, flag, layer| Some(Hit { kind, flag, layer });

    match &item.data {
        ItemData::Track(track) if flags.contains(DisallowFlags::TRACKS) => {
            // Any shared layer will do: a track has one shape everywhere
            first_layer?;
            segment_collides_polygon(track.start, track.end, track.width / 2.0, keepout.outline).then_some(())?;
            hit(ErrorKind::TrackInsideKeepout, DisallowFlags::TRACKS, first_layer)
        }
        ItemData::Via(via) => {
            first_layer?;
            let annulus = circle_intersects_area(via.position, via.diameter / 2.0, keepout.outline);
            let by_type = match via.via_type {
                ViaType::Micro => Some((ErrorKind::MicroviaInsideKeepout, DisallowFlags::MICROVIAS)),
                ViaType::BlindBuried => Some((ErrorKind::BbviaInsideKeepout, DisallowFlags::BLIND_VIAS)),
                ViaType::Through => None,
            };
            if flags.contains(DisallowFlags::VIAS) && annulus {
                return hit(ErrorKind::ViaInsideKeepout, DisallowFlags::VIAS, first_layer);
            }
            if let Some((kind, flag)) = by_type {
                if flags.contains(flag) && annulus {
                    return hit(kind, flag, first_layer);
                }
            }
            hole_hit(keepout, item, first_layer)
        }
        ItemData::Pad(pad) => {
            first_layer?;
            if flags.contains(DisallowFlags::PADS) && !pad.outline.is_degenerate() {
                let overlap = areas_overlap(
                    &to_geo_multi(std::slice::from_ref(&pad.outline)),
                    &to_geo_multi(std::slice::from_ref(keepout.outline)),
                );
                return overlap.then_some(Hit {
                    kind: ErrorKind::PadInsideKeepout,
                    flag: DisallowFlags::PADS,
                    layer: first_layer,
                });
            }
            hole_hit(keepout, item, first_layer)
        }
        ItemData::Footprint(_) if flags.contains(DisallowFlags::FOOTPRINTS) => {
            let outline = item.footprint_outline()?;
            let overlap = areas_overlap(
                &to_geo_multi(std::slice::from_ref(outline)),
                &to_geo_multi(std::slice::from_ref(keepout.outline)),
            );
            overlap.then_some(())?;
            hit(ErrorKind::FootprintInsideKeepout, DisallowFlags::FOOTPRINTS, first_layer)
        }
        ItemData::Text(_) | ItemData::Dimension(_) if flags.contains(DisallowFlags::TEXTS) => {
            let text = item.text_data()?;
            let keepout_area = to_geo_multi(std::slice::from_ref(keepout.outline));
            let overlap = if text.glyphs.is_empty() {
                let bbox = item.bbox()?.to_polygon();
                areas_overlap(&to_geo_multi(std::slice::from_ref(&bbox)), &keepout_area)
            } else {
                areas_overlap(&to_geo_multi(&text.glyphs), &keepout_area)
            };
            overlap.then_some(())?;
            hit(ErrorKind::TextInsideKeepout, DisallowFlags::TEXTS, first_layer)
        }
        ItemData::Graphic(_) if flags.contains(DisallowFlags::GRAPHICS) => {
            let layer = first_layer?;
            let shape = item.effective_shape(layer)?;
            shape_intersects_area(&shape, keepout.outline).then_some(())?;
            hit(ErrorKind::GraphicInsideKeepout, DisallowFlags::GRAPHICS, Some(layer))
        }
        _ => None,
    }
}

/// Drilled hole reaching into a keepout that disallows holes
fn hole_hit(keepout: &Keepout<'_>, item: &BoardItem, layer: Option<Layer>) -> Option<Hit> {
    if !keepout.flags.contains(DisallowFlags::HOLES) {
        return None;
    }
    let (center, radius) = item.hole()?;
    circle_intersects_area(center, radius, keepout.outline).then_some(Hit {
        kind: ErrorKind::HoleInsideKeepout,
        flag: DisallowFlags::HOLES,
        layer,
    })
}

/// Closest point of a track to the keepout, the item's anchor otherwise
fn marker_for(item: &BoardItem, keepout: &Keepout<'_>) -> Option<Point> {
    let ItemData::Track(track) = &item.data else {
        return None;
    };
    let center = keepout.outline.bbox()?.center();
    Some(point_segment_distance(center, track.start, track.end).1)
}

#[cfg(test)]
mod tests {
    use crate::board::{
        Board, BoardItem, DisallowFlags, FontKind, Graphic, ItemData, Layer, LayerSet, Pad, Point, Polygon, Text, Via,
        ViaType,
    };
    use crate::drc::config::DrcConfig;
    use crate::drc::engine::DrcEngine;
    use crate::drc::progress::{NullProgress, ProgressReporter};
    use crate::drc::providers::{KeepoutProvider, ProviderRegistry};
    use crate::drc::types::{DrcResult, ErrorKind};

    fn square(x: f64, y: f64, size: f64) -> Polygon {
        Polygon::new(vec![
            Point::new(x, y),
            Point::new(x + size, y),
            Point::new(x + size, y + size),
            Point::new(x, y + size),
        ])
    }

    fn run(board: &Board) -> DrcResult {
        run_with(board, &mut NullProgress)
    }

    fn run_with(board: &Board, progress: &mut dyn ProgressReporter) -> DrcResult {
        let mut registry = ProviderRegistry::new();
        registry.register(KeepoutProvider::NAME, || Box::new(KeepoutProvider));
        let engine = DrcEngine::new(board, Vec::new(), DrcConfig::default(), &registry);
        engine.run(progress)
    }

    fn copper_and_silk() -> LayerSet {
        LayerSet::all_copper().with(Layer::F_SILKS)
    }

    fn graphic(shape: Graphic) -> BoardItem {
        BoardItem::new(LayerSet::single(Layer::F_SILKS), ItemData::Graphic(shape))
    }

    fn text_at(position: Point, glyphs: Vec<Polygon>) -> BoardItem {
        let font = if glyphs.is_empty() { FontKind::Stroke } else { FontKind::Outline };
        BoardItem::text(
            Layer::F_SILKS,
            Text { text: "REV".into(), position, height: 1.0, thickness: 0.15, font, glyphs },
        )
    }

    /// Counts checkpoints and stops after `stop_after` of them
    struct Checkpoints {
        advances: usize,
        stop_after: usize,
    }

    impl ProgressReporter for Checkpoints {
        fn phase(&mut self, _name: &str) -> bool {
            true
        }

        fn advance(&mut self, _done: usize, _total: usize, _granularity: usize) -> bool {
            self.advances += 1;
            self.advances < self.stop_after
        }
    }

    fn via_grid(count: usize) -> Board {
        let mut board = Board::new();
        board.add(BoardItem::rule_area("KO", square(0.0, 0.0, 40.0), LayerSet::all_copper(), DisallowFlags::VIAS));
        for i in 0..count {
            let position = Point::new((i % 40) as f64 + 0.5, (i / 40) as f64 + 0.5);
            board.add(BoardItem::via(position, 0.6, 0.3));
        }
        board
    }

    fn via(position: Point, via_type: ViaType) -> BoardItem {
        BoardItem::new(
            LayerSet::all_copper(),
            ItemData::Via(Via { position, diameter: 0.6, drill: 0.3, via_type }),
        )
    }

    #[test]
    fn test_via_priority() {
        let mut board = Board::new();
        let flags = DisallowFlags::MICROVIAS.union(DisallowFlags::HOLES);
        board.add(BoardItem::rule_area("KO", square(0.0, 0.0, 5.0), LayerSet::all_copper(), flags));
        board.add(via(Point::new(1.0, 1.0), ViaType::Micro));
        board.add(via(Point::new(3.0, 3.0), ViaType::Through));
        let result = run(&board);
        assert_eq!(result.count(ErrorKind::MicroviaInsideKeepout), 1);
        assert_eq!(result.count(ErrorKind::HoleInsideKeepout), 1);
        assert_eq!(result.violations.len(), 2);
    }

    #[test]
    fn test_track_near_edge_uses_half_width() {
        let mut board = Board::new();
        board.add(BoardItem::rule_area("KO", square(0.0, 0.0, 5.0), LayerSet::single(Layer::F_CU), DisallowFlags::TRACKS));
        // Centerline 0.25 mm outside, 0.6 mm wide: reaches in
        board.add(BoardItem::track(Layer::F_CU, Point::new(5.25, -1.0), Point::new(5.25, 6.0), 0.6));
        // Same position on another layer
        board.add(BoardItem::track(Layer::B_CU, Point::new(5.25, -1.0), Point::new(5.25, 6.0), 0.6));
        // 0.3 mm wide: stays clear
        board.add(BoardItem::track(Layer::F_CU, Point::new(5.25, -1.0), Point::new(5.25, 6.0), 0.3));
        let result = run(&board);
        assert_eq!(result.count(ErrorKind::TrackInsideKeepout), 1);
        let v = &result.violations[0];
        assert_eq!(v.layer, Some(Layer::F_CU));
        assert_eq!(v.rule.as_deref(), Some("KO"));
        assert!((v.position.x - 5.25).abs() < 1e-9);
        assert!((v.position.y - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_footprint_owned_area_skips_own_pads() {
        let mut board = Board::new();
        let fp = board.add(BoardItem::footprint("U1", Point::new(2.0, 2.0), None));
        board.add(
            BoardItem::rule_area("U1 KO", square(0.0, 0.0, 5.0), LayerSet::single(Layer::F_CU), DisallowFlags::PADS)
                .with_parent(fp),
        );
        let own = BoardItem::new(
            LayerSet::single(Layer::F_CU),
            ItemData::Pad(Pad {
                position: Point::new(1.0, 1.0),
                outline: square(0.5, 0.5, 1.0),
                drill: None,
                number: "1".into(),
            }),
        );
        board.add(own.clone().with_parent(fp));
        board.add(own);
        let result = run(&board);
        assert_eq!(result.count(ErrorKind::PadInsideKeepout), 1);
    }

    #[test]
    fn test_no_keepouts_completes_quietly() {
        let mut board = Board::new();
        board.add(BoardItem::via(Point::new(1.0, 1.0), 0.6, 0.3));
        let result = run(&board);
        assert!(result.completed);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_checkpoint_every_granularity_candidates() {
        let board = via_grid(1000);
        let mut progress = Checkpoints { advances: 0, stop_after: usize::MAX };
        let result = run_with(&board, &mut progress);
        assert_eq!(result.count(ErrorKind::ViaInsideKeepout), 1000);
        assert_eq!(progress.advances, 4);

        let mut progress = Checkpoints { advances: 0, stop_after: 2 };
        let result = run_with(&board, &mut progress);
        assert!(!result.completed);
        assert_eq!(result.count(ErrorKind::ViaInsideKeepout), 250);
    }

    #[test]
    fn test_blind_via_flag() {
        let mut board = Board::new();
        board.add(BoardItem::rule_area("KO", square(0.0, 0.0, 5.0), LayerSet::all_copper(), DisallowFlags::BLIND_VIAS));
        let blind = board.add(via(Point::new(1.0, 1.0), ViaType::BlindBuried));
        board.add(via(Point::new(3.0, 3.0), ViaType::Through));
        let result = run(&board);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].error_kind, ErrorKind::BbviaInsideKeepout);
        assert_eq!(result.violations[0].items[0], blind);
    }

    #[test]
    fn test_footprint_courtyard_then_bounding_polygon() {
        let mut board = Board::new();
        board.add(BoardItem::rule_area("KO", square(0.0, 0.0, 5.0), LayerSet::all_copper(), DisallowFlags::FOOTPRINTS));
        let courtyard = board.add(BoardItem::footprint("U1", Point::new(4.5, 4.5), Some(square(4.0, 4.0, 2.0))));
        // Degenerate courtyard falls back to the bounding polygon
        let mut fallback = BoardItem::footprint("U2", Point::new(0.5, 0.5), Some(Polygon::new(Vec::new())));
        if let ItemData::Footprint(fp) = &mut fallback.data {
            fp.bounding_polygon = Some(square(-1.0, -1.0, 2.0));
        }
        let fallback = board.add(fallback);
        // Courtyard clear of the area, bounding polygon inside: courtyard wins
        let mut clear = BoardItem::footprint("U3", Point::new(8.0, 8.0), Some(square(7.0, 7.0, 2.0)));
        if let ItemData::Footprint(fp) = &mut clear.data {
            fp.bounding_polygon = Some(square(1.0, 1.0, 2.0));
        }
        board.add(clear);
        let result = run(&board);
        let hits: Vec<_> = result.of_kind(ErrorKind::FootprintInsideKeepout).map(|v| v.items[0]).collect();
        assert_eq!(hits, vec![courtyard, fallback]);
    }

    #[test]
    fn test_text_glyphs_before_text_box() {
        let mut board = Board::new();
        board.add(BoardItem::rule_area("KO", square(0.0, 0.0, 5.0), copper_and_silk(), DisallowFlags::TEXTS));
        let boxed = board.add(text_at(Point::new(2.0, 2.0), Vec::new()));
        // Glyph box spans the area but no glyph reaches into it
        board.add(text_at(Point::new(2.0, 2.0), vec![square(-1.5, 6.0, 1.0), square(6.0, -1.5, 1.0)]));
        let inked = board.add(text_at(Point::new(2.0, 2.0), vec![square(4.5, 4.5, 1.0)]));
        let result = run(&board);
        let hits: Vec<_> = result.of_kind(ErrorKind::TextInsideKeepout).map(|v| v.items[0]).collect();
        assert_eq!(hits, vec![boxed, inked]);
    }

    #[test]
    fn test_stroked_graphics_are_hollow() {
        let mut board = Board::new();
        board.add(BoardItem::rule_area("KO", square(0.0, 0.0, 5.0), copper_and_silk(), DisallowFlags::GRAPHICS));
        let center = Point::new(2.5, 2.5);
        board.add(graphic(Graphic::Circle { center, radius: 10.0, width: 0.1 }));
        let crossing = board.add(graphic(Graphic::Circle { center, radius: 3.0, width: 0.1 }));
        board.add(graphic(Graphic::Polygon { polygon: square(-2.0, -2.0, 9.0), width: 0.2, filled: false }));
        let filled = board.add(graphic(Graphic::Polygon { polygon: square(-2.0, -2.0, 9.0), width: 0.2, filled: true }));
        let line = board.add(graphic(Graphic::Segment { start: Point::new(-1.0, 1.0), end: Point::new(1.0, 1.0), width: 0.1 }));
        let result = run(&board);
        let hits: Vec<_> = result.of_kind(ErrorKind::GraphicInsideKeepout).map(|v| v.items[0]).collect();
        assert_eq!(hits, vec![crossing, filled, line]);
    }
}
