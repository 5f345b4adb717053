//! Text height and stroke thickness
//!
//! Stroke fonts are checked on their pen width. Outline fonts have no pen,
//! so each glyph is shrunk by half the minimum stroke: a glyph with a
//! stroke thinner than the minimum splits, loses a hole or vanishes, and
//! growing it back does not restore its area.

use geo::MultiPolygon;

use crate::board::{FontKind, ItemId, Layer, Polygon, Text};
use crate::drc::engine::DrcContext;
use crate::drc::geometry::{area, deflate, inflate, outline_and_hole_count, to_geo_multi};
use crate::drc::rules::{Constraint, ConstraintType};
use crate::drc::types::{ErrorKind, ProviderState};
use super::TestProvider;

/// Slack for comparing lengths in mm
const EPSILON: f64 = 1e-6;

pub struct TextDimensionProvider;

impl TextDimensionProvider {
    pub const NAME: &'static str = "text_dimensions";
}

impl TestProvider for TextDimensionProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Tests text height and thickness"
    }

    fn matching_constraints(&self) -> &'static [ConstraintType] {
        &[ConstraintType::TextHeight, ConstraintType::TextThickness]
    }

    fn run(&self, ctx: &mut DrcContext<'_>) -> ProviderState {
        let check_height =
            ctx.has_rules_for(ConstraintType::TextHeight) && !ctx.is_error_limit_exceeded(ErrorKind::TextHeight);
        let check_thickness = ctx.has_rules_for(ConstraintType::TextThickness)
            && !ctx.is_error_limit_exceeded(ErrorKind::TextThickness);
        if !check_height && !check_thickness {
            tracing::debug!("[DRC] No text height or thickness constraints found; skipping");
            return ProviderState::Completed;
        }
        if !ctx.report_phase("Checking text dimensions...") {
            return ProviderState::Cancelled;
        }

        let board = ctx.board();
        let texts: Vec<(ItemId, &Text, _)> = board
            .iter()
            .filter_map(|(id, item)| item.text_data().map(|t| (id, t, item.layers.first())))
            .collect();
        let total = texts.len();
        let tolerance = ctx.config().thickness_area_tolerance;

        for (n, (id, text, layer)) in texts.into_iter().enumerate() {
            if !ctx.report_progress(n, total) {
                return ProviderState::Cancelled;
            }

            if check_height && !ctx.is_error_limit_exceeded(ErrorKind::TextHeight) {
                let constraint = ctx.eval_rules(ConstraintType::TextHeight, id, None, layer);
                if let Some(detail) = out_of_range("height", text.height, &constraint) {
                    report(ctx, ErrorKind::TextHeight, id, layer, constraint, detail);
                }
            }

            if check_thickness && !ctx.is_error_limit_exceeded(ErrorKind::TextThickness) {
                let constraint = ctx.eval_rules(ConstraintType::TextThickness, id, None, layer);
                if let Some(detail) = thickness_violation(text, &constraint, tolerance) {
                    report(ctx, ErrorKind::TextThickness, id, layer, constraint, detail);
                }
            }
        }
        ProviderState::Completed
    }
}

fn report(
    ctx: &DrcContext<'_>,
    kind: ErrorKind,
    id: ItemId,
    layer: Option<Layer>,
    constraint: Constraint,
    detail: String,
) {
    let mut violation = ctx
        .violation(kind)
        .with_severity(constraint.severity)
        .with_items(&[id])
        .with_detail(detail);
    if let Some(rule) = constraint.source {
        violation = violation.with_rule(rule);
    }
    if let Some(layer) = layer {
        violation = violation.on_layer(layer);
    }
    ctx.report_with_marker(violation, None);
}

fn out_of_range(what: &str, actual: f64, constraint: &Constraint) -> Option<String> {
    if constraint.is_ignore() {
        return None;
    }
    if let Some(min) = constraint.min() {
        if actual < min - EPSILON {
            return Some(format!("{} {:.4} mm < min {:.4} mm", what, actual, min));
        }
    }
    if let Some(max) = constraint.max() {
        if actual > max + EPSILON {
            return Some(format!("{} {:.4} mm > max {:.4} mm", what, actual, max));
        }
    }
    None
}

fn thickness_violation(text: &Text, constraint: &Constraint, tolerance: f64) -> Option<String> {
    if constraint.is_ignore() {
        return None;
    }
    if text.font == FontKind::Stroke {
        return out_of_range("thickness", text.thickness, constraint);
    }
    // Outline fonts have no pen; blank text has nothing to measure
    let min = constraint.min().filter(|m| *m > 0.0)?;
    let thin = text
        .glyphs
        .iter()
        .position(|glyph| !glyph_survives_min_stroke(glyph, min, tolerance))?;
    Some(format!("glyph {} has strokes thinner than {:.4} mm", thin + 1, min))
}

/// Shrink by half the minimum stroke and grow back: the glyph passes when
/// its outline and hole counts survive and its area stays within
/// `tolerance` of the original
pub fn glyph_survives_min_stroke(glyph: &Polygon, min_stroke: f64, tolerance: f64) -> bool {
    if glyph.is_degenerate() {
        return true;
    }
    let original: MultiPolygon<f64> = to_geo_multi(std::slice::from_ref(glyph));
    let topology = outline_and_hole_count(&original);
    let original_area = area(&original);

    let shrunk = deflate(&original, min_stroke / 2.0);
    if outline_and_hole_count(&shrunk) != topology {
        return false;
    }
    let restored = inflate(&shrunk, min_stroke / 2.0);
    if outline_and_hole_count(&restored) != topology {
        return false;
    }
    area(&restored) >= original_area * (1.0 - tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Board, BoardItem, Point};
    use crate::drc::config::DrcConfig;
    use crate::drc::engine::DrcEngine;
    use crate::drc::progress::NullProgress;
    use crate::drc::providers::ProviderRegistry;
    use crate::drc::rules::{Rule, RuleValue};
    use crate::drc::types::Severity;

    fn bar(width: f64) -> Polygon {
        Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(width, 0.0),
            Point::new(width, 1.5),
            Point::new(0.0, 1.5),
        ])
    }

    fn stroke_text(height: f64, thickness: f64) -> Text {
        Text {
            text: "R1".into(),
            position: Point::new(0.0, 0.0),
            height,
            thickness,
            font: FontKind::Stroke,
            glyphs: Vec::new(),
        }
    }

    #[test]
    fn test_glyph_thickness_threshold() {
        assert!(glyph_survives_min_stroke(&bar(0.3), 0.15, 0.1));
        assert!(!glyph_survives_min_stroke(&bar(0.15), 0.15, 0.1));
        assert!(!glyph_survives_min_stroke(&bar(0.1), 0.15, 0.1));
    }

    #[test]
    fn test_stroke_text_limits() {
        let mut board = Board::new();
        board.add(BoardItem::text(Layer::F_SILKS, stroke_text(0.6, 0.1)));
        board.add(BoardItem::text(Layer::F_SILKS, stroke_text(1.0, 0.15)));
        board.add(BoardItem::text(Layer::B_SILKS, stroke_text(0.6, 0.1)));
        let rules = vec![
            Rule::min_max("silk height", ConstraintType::TextHeight, Some(0.8), Some(2.0)).on_layer(Layer::F_SILKS),
            Rule::min_max("silk pen", ConstraintType::TextThickness, Some(0.12), None),
        ];
        let mut registry = ProviderRegistry::new();
        registry.register(TextDimensionProvider::NAME, || Box::new(TextDimensionProvider));
        let engine = DrcEngine::new(&board, rules, DrcConfig::default(), &registry);
        let result = engine.run(&mut NullProgress);
        assert_eq!(result.count(ErrorKind::TextHeight), 1);
        assert_eq!(result.count(ErrorKind::TextThickness), 2);
        let height = result.of_kind(ErrorKind::TextHeight).next().unwrap();
        assert_eq!(height.rule.as_deref(), Some("silk height"));
        assert!(height.detail.contains("< min 0.8000"));
    }

    #[test]
    fn test_outline_font_uses_glyphs() {
        let mut text = stroke_text(1.0, 0.0);
        text.font = FontKind::Outline;
        text.glyphs = vec![bar(0.3), bar(0.1)];
        let constraint = Constraint {
            constraint_type: ConstraintType::TextThickness,
            value: Some(RuleValue::MinMax { min: Some(0.15), max: None }),
            severity: Severity::Error,
            source: None,
        };
        let detail = thickness_violation(&text, &constraint, 0.1).unwrap();
        assert!(detail.starts_with("glyph 2"));

        // Blank outline text has no pen width to compare
        text.text = " ".into();
        text.glyphs.clear();
        assert_eq!(thickness_violation(&text, &constraint, 0.1), None);
    }
}
