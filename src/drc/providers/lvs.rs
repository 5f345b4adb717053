//! Board footprints against the schematic netlist

use indexmap::IndexMap;
use std::collections::HashSet;

use crate::board::{Footprint, ItemId};
use crate::drc::engine::DrcContext;
use crate::drc::rules::ConstraintType;
use crate::drc::types::{ErrorKind, ProviderState};
use super::TestProvider;

pub struct LvsProvider;

impl LvsProvider {
    pub const NAME: &'static str = "lvs";
}

impl TestProvider for LvsProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Performs layout-vs-schematic integrity check"
    }

    fn matching_constraints(&self) -> &'static [ConstraintType] {
        &[]
    }

    fn run(&self, ctx: &mut DrcContext<'_>) -> ProviderState {
        let Some(netlist) = ctx.netlist() else {
            tracing::debug!("[DRC] No netlist provided, skipping LVS");
            return ProviderState::Completed;
        };
        if !ctx.config().test_footprints {
            return ProviderState::Completed;
        }
        if !ctx.report_phase("Checking PCB to schematic parity...") {
            return ProviderState::Cancelled;
        }

        let footprints: Vec<(ItemId, &Footprint)> = ctx
            .board()
            .footprints()
            .filter(|(_, fp)| !fp.board_only && !fp.reference.is_empty())
            .collect();

        let mut by_reference: IndexMap<&str, Vec<ItemId>> = IndexMap::new();
        for (id, fp) in &footprints {
            by_reference.entry(fp.reference.as_str()).or_default().push(*id);
        }

        for (reference, ids) in &by_reference {
            for (i, first) in ids.iter().enumerate() {
                for second in &ids[i + 1..] {
                    if ctx.is_error_limit_exceeded(ErrorKind::DuplicateFootprint) {
                        break;
                    }
                    let violation = ctx
                        .violation(ErrorKind::DuplicateFootprint)
                        .with_items(&[*first, *second])
                        .with_detail(format!("Duplicate reference '{}'", reference));
                    ctx.report_with_marker(violation, None);
                }
            }
        }
        if ctx.is_cancelled() {
            return ProviderState::Cancelled;
        }

        let board_refs: HashSet<&str> = by_reference.keys().copied().collect();
        for component in &netlist.components {
            if component.reference.is_empty() || board_refs.contains(component.reference.as_str()) {
                continue;
            }
            if ctx.is_error_limit_exceeded(ErrorKind::MissingFootprint) {
                break;
            }
            let violation = ctx
                .violation(ErrorKind::MissingFootprint)
                .with_detail(format!("Missing footprint {} ({})", component.reference, component.value));
            ctx.report(violation);
        }

        for (id, fp) in &footprints {
            if netlist.contains(&fp.reference) {
                continue;
            }
            if ctx.is_error_limit_exceeded(ErrorKind::ExtraFootprint) {
                break;
            }
            let violation = ctx
                .violation(ErrorKind::ExtraFootprint)
                .with_items(&[*id])
                .with_detail(format!("Extra footprint {} ({})", fp.reference, fp.value));
            ctx.report_with_marker(violation, Some(fp.position));
        }

        ProviderState::Completed
    }
}

#[cfg(test)]
mod tests {
    use crate::board::{Board, BoardItem, ItemData, Netlist, Point};
    use crate::drc::config::DrcConfig;
    use crate::drc::engine::DrcEngine;
    use crate::drc::progress::NullProgress;
    use crate::drc::providers::{LvsProvider, ProviderRegistry};
    use crate::drc::types::{DrcResult, ErrorKind};

    fn run(board: &Board, netlist: Option<Netlist>, config: DrcConfig) -> DrcResult {
        let mut registry = ProviderRegistry::new();
        registry.register(LvsProvider::NAME, || Box::new(LvsProvider));
        let mut engine = DrcEngine::new(board, Vec::new(), config, &registry);
        if let Some(netlist) = netlist {
            engine = engine.with_netlist(netlist);
        }
        engine.run(&mut NullProgress)
    }

    #[test]
    fn test_duplicates_reported_per_pair() {
        let mut board = Board::new();
        for x in 0..3 {
            board.add(BoardItem::footprint("R1", Point::new(x as f64, 0.0), None));
        }
        let result = run(&board, Some(Netlist::from_references(["R1"])), DrcConfig::default());
        assert_eq!(result.count(ErrorKind::DuplicateFootprint), 3);
        assert_eq!(result.violations.len(), 3);
    }

    #[test]
    fn test_extra_ignores_board_only() {
        let mut board = Board::new();
        board.add(BoardItem::footprint("C1", Point::new(0.0, 0.0), None));
        let mut logo = BoardItem::footprint("G1", Point::new(5.0, 5.0), None);
        if let ItemData::Footprint(fp) = &mut logo.data {
            fp.board_only = true;
        }
        board.add(logo);
        board.add(BoardItem::footprint("J9", Point::new(7.0, 1.0), None));
        let result = run(&board, Some(Netlist::from_references(["C1"])), DrcConfig::default());
        let extra: Vec<_> = result.of_kind(ErrorKind::ExtraFootprint).collect();
        assert_eq!(extra.len(), 1);
        assert!(extra[0].detail.contains("J9"));
        assert_eq!(extra[0].position, Point::new(7.0, 1.0));
    }

    #[test]
    fn test_skipped_without_netlist_or_when_disabled() {
        let mut board = Board::new();
        board.add(BoardItem::footprint("R1", Point::new(0.0, 0.0), None));
        assert!(run(&board, None, DrcConfig::default()).violations.is_empty());

        let config = DrcConfig { test_footprints: false, ..DrcConfig::default() };
        let result = run(&board, Some(Netlist::from_references(["C1"])), config);
        assert!(result.violations.is_empty());
        assert!(result.completed);
    }
}
