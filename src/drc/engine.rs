//! DRC engine: provider orchestration and constraint resolution
//!
//! The engine owns everything a run needs besides the board: the frozen
//! spatial index, compiled rules, the area cache and the reporter.
//! Providers see it through a [`DrcContext`], which also carries the
//! caller's progress sink.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use crate::board::{Board, BoardItem, DisallowFlags, ItemData, ItemId, ItemKind, Layer, Netlist, Point};
use super::cache::{build_area_cache, zone_collides_area, AreaCache};
use super::condition::{AreaTest, ConditionContext, Property, Side};
use super::config::DrcConfig;
use super::geometry::{shape_inside_area, shape_intersects_area};
use super::progress::{CancellationToken, ProgressReporter};
use super::providers::{ProviderRegistry, TestProvider};
use super::reporter::ViolationReporter;
use super::rules::{Constraint, ConstraintType, Rule, RuleSet};
use super::spatial::DrcRtree;
use super::types::{DrcResult, ErrorKind, ProviderState, ProviderStatus, Violation};

pub struct DrcEngine<'b> {
    board: &'b Board,
    rules: RuleSet,
    config: DrcConfig,
    providers: Vec<Box<dyn TestProvider>>,
    index: DrcRtree,
    /// Rule areas that disallow tracks, used to reject area tests early
    track_keepouts: DrcRtree,
    area_cache: AreaCache,
    reporter: Mutex<ViolationReporter>,
    cancel: CancellationToken,
    netlist: Option<Netlist>,
}

impl<'b> DrcEngine<'b> {
    /// Compile rules, instantiate enabled providers and freeze the index
    pub fn new(board: &'b Board, rules: Vec<Rule>, config: DrcConfig, registry: &ProviderRegistry) -> Self {
        let start = Instant::now();
        let rules = RuleSet::compile(rules);
        let providers = registry.instantiate(&config);
        let index = DrcRtree::build(board);

        let mut track_keepouts = DrcRtree::new();
        for (id, area) in board.rule_areas() {
            if area.as_zone().is_some_and(|z| z.disallow().contains(DisallowFlags::TRACKS)) {
                track_keepouts.insert(id, area);
            }
        }

        tracing::info!(
            "[DRC] Engine ready: {} items, {} rules, {} providers in {:?}",
            board.len(),
            rules.len(),
            providers.len(),
            start.elapsed()
        );

        Self {
            board,
            rules,
            reporter: Mutex::new(ViolationReporter::new(&config)),
            config,
            providers,
            index,
            track_keepouts,
            area_cache: AreaCache::new(),
            cancel: CancellationToken::new(),
            netlist: None,
        }
    }

    pub fn with_netlist(mut self, netlist: Netlist) -> Self {
        self.netlist = Some(netlist);
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Clear a previous cancellation so the engine can run again
    pub fn reset_cancellation(&self) {
        self.cancel.reset();
    }

    pub fn board(&self) -> &'b Board {
        self.board
    }

    pub fn index(&self) -> &DrcRtree {
        &self.index
    }

    pub fn config(&self) -> &DrcConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    fn reporter(&self) -> MutexGuard<'_, ViolationReporter> {
        self.reporter.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run every provider in order. Each run starts from an empty
    /// reporter and cache; cancellation stops at the next checkpoint.
    pub fn run(&self, progress: &mut dyn ProgressReporter) -> DrcResult {
        let start = Instant::now();
        *self.reporter() = ViolationReporter::new(&self.config);
        self.area_cache.clear();

        let mut states: Vec<ProviderStatus> = self
            .providers
            .iter()
            .map(|p| ProviderStatus { name: p.name().to_string(), state: ProviderState::NotStarted })
            .collect();

        let mut ctx = DrcContext { engine: self, progress };
        for (provider, status) in self.providers.iter().zip(states.iter_mut()) {
            if ctx.is_cancelled() {
                break;
            }
            status.state = ProviderState::Running;
            let provider_start = Instant::now();
            let before = self.reporter().len();
            tracing::debug!("[DRC] Running {}: {}", provider.name(), provider.description());

            status.state = provider.run(&mut ctx);

            tracing::info!(
                "[DRC] {} {:?}: {} violations in {:?}",
                provider.name(),
                status.state,
                self.reporter().len() - before,
                provider_start.elapsed()
            );
        }

        let completed = !self.cancel.is_cancelled()
            && states.iter().all(|s| s.state == ProviderState::Completed);
        let (violations, per_kind_counts) = self.reporter().take();
        tracing::info!(
            "[DRC] Run {}: {} violations in {:?}",
            if completed { "completed" } else { "cancelled" },
            violations.len(),
            start.elapsed()
        );

        DrcResult { completed, violations, per_kind_counts, provider_states: states }
    }
}

/// A provider's view of the running engine
pub struct DrcContext<'a> {
    engine: &'a DrcEngine<'a>,
    progress: &'a mut dyn ProgressReporter,
}

impl<'a> DrcContext<'a> {
    pub fn board(&self) -> &'a Board {
        self.engine.board
    }

    pub fn index(&self) -> &'a DrcRtree {
        &self.engine.index
    }

    pub fn config(&self) -> &'a DrcConfig {
        &self.engine.config
    }

    pub fn netlist(&self) -> Option<&'a Netlist> {
        self.engine.netlist.as_ref()
    }

    pub fn area_cache(&self) -> &'a AreaCache {
        &self.engine.area_cache
    }

    pub fn is_cancelled(&self) -> bool {
        self.engine.cancel.is_cancelled()
    }

    /// Announce a phase; false means the run was cancelled
    pub fn report_phase(&mut self, name: &str) -> bool {
        if !self.progress.phase(name) {
            self.engine.cancel.cancel();
        }
        !self.is_cancelled()
    }

    /// Progress checkpoint, forwarded every `progress_granularity` items;
    /// false means the run was cancelled
    pub fn report_progress(&mut self, done: usize, total: usize) -> bool {
        let granularity = self.engine.config.progress_granularity.max(1);
        if done % granularity == 0 && !self.progress.advance(done, total, granularity) {
            self.engine.cancel.cancel();
        }
        !self.is_cancelled()
    }

    pub fn is_error_limit_exceeded(&self, kind: ErrorKind) -> bool {
        self.engine.reporter().is_limit_reached(kind)
    }

    /// Violation of a kind not driven by a rule, at its configured severity
    pub fn violation(&self, kind: ErrorKind) -> Violation {
        Violation::new(kind).with_severity(self.engine.config.severity(kind))
    }

    pub fn report(&self, violation: Violation) -> bool {
        self.engine.reporter().report(violation)
    }

    /// Report at `marker`, or at the first item's position when there is
    /// no better anchor
    pub fn report_with_marker(&self, mut violation: Violation, marker: Option<Point>) -> bool {
        let fallback = || {
            violation
                .items
                .first()
                .and_then(|id| self.engine.board.item(*id))
                .map(BoardItem::position)
        };
        if let Some(position) = marker.or_else(fallback) {
            violation.position = position;
        }
        self.report(violation)
    }

    pub fn has_rules_for(&self, constraint_type: ConstraintType) -> bool {
        self.engine.rules.has_rules_for(constraint_type)
    }

    /// Whether any rule of this type is restricted to a layer
    pub fn has_layer_rules_for(&self, constraint_type: ConstraintType) -> bool {
        self.engine.rules.of_type(constraint_type).any(|r| r.rule.layer.is_some())
    }

    pub fn eval_rules(&self, constraint_type: ConstraintType, a: ItemId, b: Option<ItemId>, layer: Option<Layer>) -> Constraint {
        let ctx = ItemConditions { engine: self.engine, a, b, layer };
        self.engine.rules.resolve(constraint_type, layer, &ctx)
    }

    /// Fill the area cache with this run's progress sink
    pub fn build_area_cache(&mut self) -> bool {
        let engine = self.engine;
        build_area_cache(
            engine.board,
            &engine.index,
            &engine.config,
            &engine.area_cache,
            &engine.cancel,
            &mut *self.progress,
        )
    }
}

/// Condition evaluation against concrete board items
struct ItemConditions<'a> {
    engine: &'a DrcEngine<'a>,
    a: ItemId,
    b: Option<ItemId>,
    layer: Option<Layer>,
}

impl ItemConditions<'_> {
    fn side(&self, side: Side) -> Option<ItemId> {
        match side {
            Side::A => Some(self.a),
            Side::B => self.b,
        }
    }

    /// Layers the area test runs on: shared by item and area, narrowed to
    /// the evaluation layer when there is one
    fn test_layers(&self, item: &BoardItem, area: &BoardItem) -> BTreeSet<Layer> {
        item.layers
            .intersection(&area.layers)
            .iter()
            .filter(|l| self.layer.map_or(true, |only| only == *l))
            .collect()
    }

    fn intersects_area(&self, id: ItemId, item: &BoardItem, area_id: ItemId, area: &BoardItem, layers: &BTreeSet<Layer>) -> bool {
        let engine = self.engine;
        if item.kind() == ItemKind::Zone {
            return match engine.area_cache.get(area_id, id) {
                Some(hit) => hit,
                None if engine.cancel.is_cancelled() => false,
                None => zone_collides_area(engine.board, &engine.index, area_id, id, engine.config.area_epsilon_mm),
            };
        }

        let Some(outline) = area.as_zone().map(|z| &z.outline) else {
            return false;
        };
        if item.kind() == ItemKind::Track
            && area.as_zone().is_some_and(|z| z.disallow().contains(DisallowFlags::TRACKS))
        {
            let Some(bbox) = item.bbox() else { return false };
            let near = layers.iter().any(|layer| {
                engine
                    .track_keepouts
                    .query_region(*layer, bbox, 0.0)
                    .any(|entry| entry.item == area_id)
            });
            if !near {
                return false;
            }
        }
        layers
            .iter()
            .filter_map(|layer| item.effective_shape(*layer))
            .any(|shape| shape_intersects_area(&shape, outline))
    }

    fn inside_area(&self, item: &BoardItem, area: &BoardItem, layers: &BTreeSet<Layer>) -> bool {
        let Some(outline) = area.as_zone().map(|z| &z.outline) else {
            return false;
        };
        let mut shapes = layers.iter().filter_map(|layer| item.effective_shape(*layer)).peekable();
        shapes.peek().is_some() && shapes.all(|shape| shape_inside_area(&shape, outline))
    }
}

impl ConditionContext for ItemConditions<'_> {
    fn property(&self, side: Side, prop: Property) -> Option<Vec<String>> {
        let id = self.side(side)?;
        let board = self.engine.board;
        let item = board.item(id)?;
        let values = match prop {
            Property::Type => vec![item.kind().name().to_string()],
            Property::Layer => match self.layer {
                Some(layer) => vec![layer.name()],
                None => item.layers.iter().map(|l| l.name()).collect(),
            },
            Property::NetName => item.net.iter().cloned().collect(),
            Property::NetClass => item.net_class.iter().cloned().collect(),
            Property::Reference => board.reference_of(id).map(str::to_string).into_iter().collect(),
            Property::Name => item_name(item).into_iter().collect(),
        };
        Some(values)
    }

    fn area_test(&self, side: Side, test: AreaTest, area_name: &str) -> Result<bool, String> {
        let board = self.engine.board;
        let (area_id, area) = board
            .zone_by_name(area_name)
            .ok_or_else(|| format!("no area named '{}'", area_name))?;
        let Some(id) = self.side(side) else {
            return Ok(false);
        };
        let Some(item) = board.item(id) else {
            return Ok(false);
        };
        if id == area_id {
            return Ok(false);
        }
        match (item.bbox(), area.bbox()) {
            (Some(a), Some(b)) if a.intersects(&b) => {}
            _ => return Ok(false),
        }
        let layers = self.test_layers(item, area);
        if layers.is_empty() {
            return Ok(false);
        }
        Ok(match test {
            AreaTest::Intersects => self.intersects_area(id, item, area_id, area, &layers),
            AreaTest::Inside => self.inside_area(item, area, &layers),
        })
    }
}

fn item_name(item: &BoardItem) -> Option<String> {
    if let Some(zone) = item.as_zone() {
        return Some(zone.name.clone());
    }
    if let Some(text) = item.text_data() {
        return Some(text.text.clone());
    }
    match &item.data {
        ItemData::Pad(pad) => Some(pad.number.clone()),
        _ => None,
    }
}
