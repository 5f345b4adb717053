//! End-to-end DRC runs through the standard provider registry

use board_drc::board::{FontKind, Layer, LayerSet, Point, Polygon, Text};
use board_drc::drc::{
    CancellationToken, ConstraintType, NullProgress, ProgressReporter, Severity,
};
use board_drc::{Board, BoardItem, DrcConfig, DrcEngine, DrcResult, ErrorKind, Netlist, ProviderRegistry, Rule};
use board_drc::board::DisallowFlags;

fn square(x: f64, y: f64, size: f64) -> Polygon {
    Polygon::new(vec![
        Point::new(x, y),
        Point::new(x + size, y),
        Point::new(x + size, y + size),
        Point::new(x, y + size),
    ])
}

fn run_standard(board: &Board, rules: Vec<Rule>, config: DrcConfig, netlist: Option<Netlist>) -> DrcResult {
    let registry = ProviderRegistry::standard();
    let mut engine = DrcEngine::new(board, rules, config, &registry);
    if let Some(netlist) = netlist {
        engine = engine.with_netlist(netlist);
    }
    engine.run(&mut NullProgress)
}

#[test]
fn test_missing_footprint_reported_once() {
    let mut board = Board::new();
    board.add(BoardItem::footprint("R1", Point::new(10.0, 10.0), Some(square(9.0, 9.0, 2.0))));

    let result = run_standard(&board, Vec::new(), DrcConfig::default(), Some(Netlist::from_references(["R1", "C1"])));

    assert!(result.completed);
    assert_eq!(result.violations.len(), 1);
    let missing = &result.violations[0];
    assert_eq!(missing.error_kind, ErrorKind::MissingFootprint);
    assert!(missing.detail.contains("C1"));
    assert!(missing.items.is_empty());
    assert!(result.violations.iter().all(|v| !v.detail.contains("R1")));
}

#[test]
fn test_via_inside_keepout() {
    let mut board = Board::new();
    let area = board.add(BoardItem::rule_area("KO", square(0.0, 0.0, 5.0), LayerSet::all_copper(), DisallowFlags::VIAS));
    let via = board.add(BoardItem::via(Point::new(2.0, 2.0), 0.6, 0.3));

    let result = run_standard(&board, Vec::new(), DrcConfig::default(), None);

    assert_eq!(result.violations.len(), 1);
    let hit = &result.violations[0];
    assert_eq!(hit.error_kind, ErrorKind::ViaInsideKeepout);
    assert_eq!(hit.items, vec![via, area]);
    assert_eq!(hit.severity, Severity::Error);
}

#[test]
fn test_repeated_runs_are_identical() {
    let mut board = Board::new();
    board.add(BoardItem::rule_area(
        "KO",
        square(0.0, 0.0, 10.0),
        LayerSet::all_copper(),
        DisallowFlags::VIAS.union(DisallowFlags::TRACKS),
    ));
    for i in 0..20 {
        let x = i as f64 * 0.7;
        board.add(BoardItem::via(Point::new(x, 3.0), 0.6, 0.3));
        board.add(BoardItem::track(Layer::F_CU, Point::new(x, -2.0), Point::new(x, 12.0), 0.25));
    }
    board.add(BoardItem::footprint("U1", Point::new(30.0, 30.0), None));
    let netlist = Netlist::from_references(["U1", "U2"]);
    let config = DrcConfig { progress_granularity: 3, ..DrcConfig::default() };

    let registry = ProviderRegistry::standard();
    let engine = DrcEngine::new(&board, Vec::new(), config, &registry).with_netlist(netlist);
    let first = engine.run(&mut NullProgress);
    let second = engine.run(&mut NullProgress);

    assert!(!first.violations.is_empty());
    assert_eq!(first.violations, second.violations);
    assert_eq!(first.per_kind_counts, second.per_kind_counts);
}

#[test]
fn test_track_keepout_honors_half_width() {
    let area = || BoardItem::rule_area("KO", square(0.0, 0.0, 5.0), LayerSet::all_copper(), DisallowFlags::TRACKS);

    // 0.4 outside the outline with a 0.5 wide track
    let mut clear = Board::new();
    clear.add(area());
    clear.add(BoardItem::track(Layer::F_CU, Point::new(-2.0, 5.4), Point::new(7.0, 5.4), 0.5));
    let result = run_standard(&clear, Vec::new(), DrcConfig::default(), None);
    assert_eq!(result.count(ErrorKind::TrackInsideKeepout), 0);

    let mut crossing = Board::new();
    crossing.add(area());
    crossing.add(BoardItem::track(Layer::F_CU, Point::new(-2.0, 2.5), Point::new(7.0, 2.5), 0.2));
    let result = run_standard(&crossing, Vec::new(), DrcConfig::default(), None);
    assert_eq!(result.count(ErrorKind::TrackInsideKeepout), 1);
}

#[test]
fn test_error_limit_caps_each_kind() {
    let mut board = Board::new();
    board.add(BoardItem::rule_area("KO", square(0.0, 0.0, 20.0), LayerSet::all_copper(), DisallowFlags::VIAS));
    for i in 0..10 {
        board.add(BoardItem::via(Point::new(1.0 + i as f64, 5.0), 0.6, 0.3));
    }
    let config = DrcConfig::default().with_error_limit(ErrorKind::ViaInsideKeepout, 4);

    let result = run_standard(&board, Vec::new(), config, None);

    assert_eq!(result.count(ErrorKind::ViaInsideKeepout), 4);
    assert_eq!(result.violations.len(), 4);
}

#[test]
fn test_outline_text_thickness_through_engine() {
    let glyph = |width: f64| {
        Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(width, 0.0),
            Point::new(width, 1.5),
            Point::new(0.0, 1.5),
        ])
    };
    let outline_text = |widths: &[f64]| Text {
        text: "LOGO".into(),
        position: Point::new(0.0, 0.0),
        height: 1.5,
        thickness: 0.0,
        font: FontKind::Outline,
        glyphs: widths.iter().map(|w| glyph(*w)).collect(),
    };

    let mut board = Board::new();
    let thin = board.add(BoardItem::text(Layer::F_SILKS, outline_text(&[0.4, 0.1])));
    board.add(BoardItem::text(Layer::F_SILKS, outline_text(&[0.4, 0.5])));
    let rules = vec![Rule::min_max("silk pen", ConstraintType::TextThickness, Some(0.15), None)];

    let result = run_standard(&board, rules, DrcConfig::default(), None);

    let hits: Vec<_> = result.of_kind(ErrorKind::TextThickness).collect();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].items, vec![thin]);
    assert_eq!(hits[0].rule.as_deref(), Some("silk pen"));
}

struct CancelOnPhase {
    token: CancellationToken,
    phases: usize,
}

impl ProgressReporter for CancelOnPhase {
    fn phase(&mut self, _name: &str) -> bool {
        self.phases += 1;
        self.token.cancel();
        !self.token.is_cancelled()
    }

    fn advance(&mut self, _done: usize, _total: usize, _granularity: usize) -> bool {
        true
    }
}

#[test]
fn test_cancel_stops_run() {
    let mut board = Board::new();
    board.add(BoardItem::rule_area("KO", square(0.0, 0.0, 5.0), LayerSet::all_copper(), DisallowFlags::VIAS));
    board.add(BoardItem::via(Point::new(2.0, 2.0), 0.6, 0.3));
    let registry = ProviderRegistry::standard();
    let engine = DrcEngine::new(&board, Vec::new(), DrcConfig::default(), &registry);

    let mut progress = CancelOnPhase { token: engine.cancel_token(), phases: 0 };
    let result = engine.run(&mut progress);

    assert!(!result.completed);
    assert_eq!(progress.phases, 1);

    engine.reset_cancellation();
    let result = engine.run(&mut NullProgress);
    assert!(result.completed);
    assert_eq!(result.count(ErrorKind::ViaInsideKeepout), 1);
}
