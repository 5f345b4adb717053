//! Disallowed items: board-edge texts, `disallow` rules and copper zones
//! inside keepouts

use crate::board::{BoardItem, DisallowFlags, ItemData, ItemId, ItemKind, Layer, Point, Rect, ViaType};
use crate::drc::engine::DrcContext;
use crate::drc::rules::{Constraint, ConstraintType};
use crate::drc::types::{ErrorKind, ProviderState};
use super::TestProvider;

pub struct DisallowProvider;

impl DisallowProvider {
    pub const NAME: &'static str = "disallow";
}

/// The flag a disallow mask must carry to forbid this item
fn item_flag(item: &BoardItem) -> Option<DisallowFlags> {
    Some(match &item.data {
        ItemData::Track(_) => DisallowFlags::TRACKS,
        ItemData::Via(v) => match v.via_type {
            ViaType::Through => DisallowFlags::VIAS,
            ViaType::BlindBuried => DisallowFlags::BLIND_VIAS,
            ViaType::Micro => DisallowFlags::MICROVIAS,
        },
        ItemData::Pad(_) => DisallowFlags::PADS,
        ItemData::Footprint(_) => DisallowFlags::FOOTPRINTS,
        ItemData::Zone(z) if !z.is_rule_area() => DisallowFlags::ZONES,
        ItemData::Zone(_) => return None,
        ItemData::Text(_) | ItemData::Dimension(_) => DisallowFlags::TEXTS,
        ItemData::Graphic(_) => DisallowFlags::GRAPHICS,
    })
}

impl TestProvider for DisallowProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Tests for disallowed items (e.g. keepouts)"
    }

    fn matching_constraints(&self) -> &'static [ConstraintType] {
        &[ConstraintType::Disallow]
    }

    fn run(&self, ctx: &mut DrcContext<'_>) -> ProviderState {
        if !ctx.report_phase("Checking edge cuts for text...") {
            return ProviderState::Cancelled;
        }
        if !check_edge_cut_texts(ctx) {
            return ProviderState::Cancelled;
        }

        let board = ctx.board();
        let zone_keepouts = board
            .rule_areas()
            .any(|(_, a)| a.as_zone().is_some_and(|z| z.disallow().contains(DisallowFlags::ZONES)));
        let has_rules = ctx.has_rules_for(ConstraintType::Disallow);
        if !zone_keepouts && !has_rules {
            return ProviderState::Completed;
        }

        if !ctx.report_phase("Gathering keepout areas...") {
            return ProviderState::Cancelled;
        }
        if !ctx.build_area_cache() {
            return ProviderState::Cancelled;
        }

        if zone_keepouts && !ctx.is_error_limit_exceeded(ErrorKind::ZoneInsideKeepout) {
            report_zones_in_keepouts(ctx);
        }

        if has_rules && !ctx.is_error_limit_exceeded(ErrorKind::AllowedItems) {
            if !ctx.report_phase("Checking keepouts & disallow constraints...") {
                return ProviderState::Cancelled;
            }
            if !check_disallow_rules(ctx) {
                return ProviderState::Cancelled;
            }
        }
        ProviderState::Completed
    }
}

/// Texts and dimensions may never sit on the board outline layer
fn check_edge_cut_texts(ctx: &mut DrcContext<'_>) -> bool {
    let board = ctx.board();
    for (id, item) in board.iter() {
        if ctx.is_error_limit_exceeded(ErrorKind::TextOnEdgeCuts) {
            break;
        }
        if !matches!(item.kind(), ItemKind::Text | ItemKind::Dimension) || !item.layers.contains(Layer::EDGE_CUTS) {
            continue;
        }
        let violation = ctx
            .violation(ErrorKind::TextOnEdgeCuts)
            .with_items(&[id])
            .on_layer(Layer::EDGE_CUTS)
            .with_detail(format!("{} on {}", item.kind().name(), Layer::EDGE_CUTS));
        ctx.report_with_marker(violation, None);
    }
    !ctx.is_cancelled()
}

/// Copper zones whose fill reaches into a rule area that disallows zones
fn report_zones_in_keepouts(ctx: &mut DrcContext<'_>) {
    let board = ctx.board();
    for (area_id, zone_id) in ctx.area_cache().collisions() {
        if ctx.is_error_limit_exceeded(ErrorKind::ZoneInsideKeepout) {
            break;
        }
        let (Some(area), Some(zone)) = (board.item(area_id), board.item(zone_id)) else {
            continue;
        };
        let Some(area_zone) = area.as_zone().filter(|z| z.disallow().contains(DisallowFlags::ZONES)) else {
            continue;
        };
        let mut violation = ctx
            .violation(ErrorKind::ZoneInsideKeepout)
            .with_items(&[zone_id, area_id])
            .with_rule(area_zone.name.as_str())
            .with_detail(format!(
                "zone '{}' fill inside rule area '{}'",
                zone.as_zone().map_or("", |z| z.name.as_str()),
                area_zone.name
            ));
        if let Some(layer) = zone.layers.intersection(&area.layers).first() {
            violation = violation.on_layer(layer);
        }
        let marker = zone.bbox().zip(area.bbox()).map(|(z, a)| {
            let overlap = Rect::new(
                Point::new(z.min.x.max(a.min.x), z.min.y.max(a.min.y)),
                Point::new(z.max.x.min(a.max.x), z.max.y.min(a.max.y)),
            );
            overlap.center()
        });
        ctx.report_with_marker(violation, marker);
    }
}

/// Layers to resolve rules on: each item layer when some rule is
/// layer-bound, otherwise one layer-agnostic evaluation
fn eval_layers(ctx: &DrcContext<'_>, item: &BoardItem) -> Vec<Option<Layer>> {
    if ctx.has_layer_rules_for(ConstraintType::Disallow) {
        item.layers.iter().map(Some).collect()
    } else {
        vec![None]
    }
}

/// First constraint on any evaluation layer whose mask carries `flag`
fn disallowing(ctx: &DrcContext<'_>, id: ItemId, item: &BoardItem, flag: DisallowFlags) -> Option<(Constraint, Option<Layer>)> {
    eval_layers(ctx, item).into_iter().find_map(|layer| {
        let constraint = ctx.eval_rules(ConstraintType::Disallow, id, None, layer);
        (!constraint.is_ignore() && constraint.disallow_flags().contains(flag)).then_some((constraint, layer))
    })
}

fn report_disallowed(ctx: &DrcContext<'_>, id: ItemId, item: &BoardItem, what: &str, constraint: Constraint, layer: Option<Layer>, hole: bool) {
    let rule = constraint.source.unwrap_or_default();
    let mut violation = ctx
        .violation(ErrorKind::AllowedItems)
        .with_severity(constraint.severity)
        .with_items(&[id])
        .with_detail(format!("{} disallowed by rule '{}'", what, rule))
        .with_rule(rule);
    if let Some(layer) = layer.or_else(|| item.layers.first()) {
        violation = violation.on_layer(layer);
    }
    let marker = if hole { item.hole().map(|(center, _)| center) } else { None };
    ctx.report_with_marker(violation, marker);
}

/// Every item against its resolved disallow mask, then every drilled
/// hole against the `holes` flag
fn check_disallow_rules(ctx: &mut DrcContext<'_>) -> bool {
    let board = ctx.board();
    let items: Vec<(ItemId, &BoardItem)> = board.iter().filter(|(_, item)| item.kind() != ItemKind::RuleArea).collect();
    let total = items.len() * 2;

    for (n, (id, item)) in items.iter().enumerate() {
        if !ctx.report_progress(n, total) {
            return false;
        }
        if ctx.is_error_limit_exceeded(ErrorKind::AllowedItems) {
            return true;
        }
        let Some(flag) = item_flag(item) else { continue };
        if let Some((constraint, layer)) = disallowing(ctx, *id, item, flag) {
            report_disallowed(ctx, *id, item, item.kind().name(), constraint, layer, false);
        }
    }

    for (n, (id, item)) in items.iter().enumerate() {
        if !ctx.report_progress(items.len() + n, total) {
            return false;
        }
        if ctx.is_error_limit_exceeded(ErrorKind::AllowedItems) {
            return true;
        }
        if item.hole().is_none() {
            continue;
        }
        if let Some((constraint, layer)) = disallowing(ctx, *id, item, DisallowFlags::HOLES) {
            report_disallowed(ctx, *id, item, "hole", constraint, layer, true);
        }
    }
    true
}
