//! DRC data types and structures
//!
//! Contains error kinds, severities, violation records and the aggregate
//! result of a run.

use crate::board::{ItemId, Layer, Point};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a design rule violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TrackInsideKeepout,
    ViaInsideKeepout,
    MicroviaInsideKeepout,
    BbviaInsideKeepout,
    HoleInsideKeepout,
    PadInsideKeepout,
    FootprintInsideKeepout,
    TextInsideKeepout,
    GraphicInsideKeepout,
    ZoneInsideKeepout,
    AllowedItems,
    TextOnEdgeCuts,
    TextHeight,
    TextThickness,
    DuplicateFootprint,
    MissingFootprint,
    ExtraFootprint,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 17] = [
        ErrorKind::TrackInsideKeepout,
        ErrorKind::ViaInsideKeepout,
        ErrorKind::MicroviaInsideKeepout,
        ErrorKind::BbviaInsideKeepout,
        ErrorKind::HoleInsideKeepout,
        ErrorKind::PadInsideKeepout,
        ErrorKind::FootprintInsideKeepout,
        ErrorKind::TextInsideKeepout,
        ErrorKind::GraphicInsideKeepout,
        ErrorKind::ZoneInsideKeepout,
        ErrorKind::AllowedItems,
        ErrorKind::TextOnEdgeCuts,
        ErrorKind::TextHeight,
        ErrorKind::TextThickness,
        ErrorKind::DuplicateFootprint,
        ErrorKind::MissingFootprint,
        ErrorKind::ExtraFootprint,
    ];

    /// Stable identifier used in fingerprints and reports
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::TrackInsideKeepout => "track_inside_keepout",
            ErrorKind::ViaInsideKeepout => "via_inside_keepout",
            ErrorKind::MicroviaInsideKeepout => "microvia_inside_keepout",
            ErrorKind::BbviaInsideKeepout => "bbvia_inside_keepout",
            ErrorKind::HoleInsideKeepout => "hole_inside_keepout",
            ErrorKind::PadInsideKeepout => "pad_inside_keepout",
            ErrorKind::FootprintInsideKeepout => "footprint_inside_keepout",
            ErrorKind::TextInsideKeepout => "text_inside_keepout",
            ErrorKind::GraphicInsideKeepout => "graphic_inside_keepout",
            ErrorKind::ZoneInsideKeepout => "zone_inside_keepout",
            ErrorKind::AllowedItems => "allowed_items",
            ErrorKind::TextOnEdgeCuts => "text_on_edge_cuts",
            ErrorKind::TextHeight => "text_height",
            ErrorKind::TextThickness => "text_thickness",
            ErrorKind::DuplicateFootprint => "duplicate_footprint",
            ErrorKind::MissingFootprint => "missing_footprint",
            ErrorKind::ExtraFootprint => "extra_footprint",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::TrackInsideKeepout => "Track inside keepout area",
            ErrorKind::ViaInsideKeepout => "Via inside keepout area",
            ErrorKind::MicroviaInsideKeepout => "Micro via inside keepout area",
            ErrorKind::BbviaInsideKeepout => "Buried via inside keepout area",
            ErrorKind::HoleInsideKeepout => "Hole inside keepout area",
            ErrorKind::PadInsideKeepout => "Pad inside keepout area",
            ErrorKind::FootprintInsideKeepout => "Footprint inside keepout area",
            ErrorKind::TextInsideKeepout => "Text inside keepout area",
            ErrorKind::GraphicInsideKeepout => "Graphic inside keepout area",
            ErrorKind::ZoneInsideKeepout => "Copper zone inside keepout area",
            ErrorKind::AllowedItems => "Items not allowed",
            ErrorKind::TextOnEdgeCuts => "Text or dimension on board edge layer",
            ErrorKind::TextHeight => "Text height out of range",
            ErrorKind::TextThickness => "Text thickness out of range",
            ErrorKind::DuplicateFootprint => "Duplicate footprints",
            ErrorKind::MissingFootprint => "Missing footprint",
            ErrorKind::ExtraFootprint => "Extra footprint",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Violation severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Error,
    Warning,
    Ignore,
}

/// A recorded constraint breach
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Violation {
    pub error_kind: ErrorKind,
    pub severity: Severity,
    pub items: Vec<ItemId>,
    pub position: Point,
    pub layer: Option<Layer>,
    pub detail: String,
    pub excluded: bool,
    /// Rule or rule area the violation was derived from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

impl Violation {
    pub fn new(error_kind: ErrorKind) -> Self {
        Self {
            error_kind,
            severity: Severity::Error,
            items: Vec::new(),
            position: Point::default(),
            layer: None,
            detail: String::new(),
            excluded: false,
            rule: None,
        }
    }

    pub fn with_items(mut self, items: &[ItemId]) -> Self {
        self.items = items.to_vec();
        self
    }

    pub fn at(mut self, position: Point) -> Self {
        self.position = position;
        self
    }

    pub fn on_layer(mut self, layer: Layer) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    /// Identity of a violation for exclusion matching: kind, position
    /// quantized to 1 nm, and the sorted item handles
    pub fn fingerprint(&self) -> String {
        let mut ids: Vec<u32> = self.items.iter().map(|id| id.0).collect();
        ids.sort_unstable();
        let ids: Vec<String> = ids.iter().map(u32::to_string).collect();
        format!(
            "{}|{}|{}|{}",
            self.error_kind.code(),
            quantize_nm(self.position.x),
            quantize_nm(self.position.y),
            ids.join(",")
        )
    }
}

fn quantize_nm(mm: f64) -> i64 {
    (mm * 1_000_000.0).round() as i64
}

/// Lifecycle of a test provider within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    #[default]
    NotStarted,
    Running,
    Completed,
    Cancelled,
}

/// Final state of one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub state: ProviderState,
}

/// Aggregate outcome of a DRC run
#[derive(Debug, Clone, Serialize)]
pub struct DrcResult {
    pub completed: bool,
    pub violations: Vec<Violation>,
    pub per_kind_counts: IndexMap<ErrorKind, usize>,
    pub provider_states: Vec<ProviderStatus>,
}

impl DrcResult {
    pub fn count(&self, kind: ErrorKind) -> usize {
        self.per_kind_counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn of_kind(&self, kind: ErrorKind) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.error_kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_ignores_item_order() {
        let a = Violation::new(ErrorKind::DuplicateFootprint)
            .with_items(&[ItemId(7), ItemId(3)])
            .at(Point::new(1.5, -2.25));
        let b = Violation::new(ErrorKind::DuplicateFootprint)
            .with_items(&[ItemId(3), ItemId(7)])
            .at(Point::new(1.5, -2.25));
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), "duplicate_footprint|1500000|-2250000|3,7");
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ViaInsideKeepout).unwrap();
        assert_eq!(json, "\"via_inside_keepout\"");
        for kind in ErrorKind::ALL {
            assert_eq!(serde_json::to_string(&kind).unwrap(), format!("\"{}\"", kind.code()));
        }
    }
}
