//! Core board types
//!
//! Points, rectangles, polygons, layers and the per-kind item payloads that
//! the DRC engine consumes. Coordinates are millimetres.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::drc::DrcError;

/// A 2D point
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn to_array(self) -> [f64; 2] {
        [self.x, self.y]
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    pub fn new(min: Point, max: Point) -> Self {
        Self {
            min: Point::new(min.x.min(max.x), min.y.min(max.y)),
            max: Point::new(min.x.max(max.x), min.y.max(max.y)),
        }
    }

    /// Smallest rect holding every point, `None` for an empty slice
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut rect = Rect { min: *first, max: *first };
        for p in &points[1..] {
            rect.min.x = rect.min.x.min(p.x);
            rect.min.y = rect.min.y.min(p.y);
            rect.max.x = rect.max.x.max(p.x);
            rect.max.y = rect.max.y.max(p.y);
        }
        Some(rect)
    }

    pub fn around(center: Point, half_w: f64, half_h: f64) -> Self {
        Rect::new(
            Point::new(center.x - half_w, center.y - half_h),
            Point::new(center.x + half_w, center.y + half_h),
        )
    }

    pub fn inflate(&self, amount: f64) -> Self {
        Rect::new(
            Point::new(self.min.x - amount, self.min.y - amount),
            Point::new(self.max.x + amount, self.max.y + amount),
        )
    }

    pub fn merge(&self, other: &Rect) -> Self {
        Rect {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    pub fn center(&self) -> Point {
        Point::new((self.min.x + self.max.x) / 2.0, (self.min.y + self.max.y) / 2.0)
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Closed outline of the rect, counter-clockwise
    pub fn to_polygon(&self) -> Polygon {
        Polygon {
            outer_ring: vec![
                self.min,
                Point::new(self.max.x, self.min.y),
                self.max,
                Point::new(self.min.x, self.max.y),
            ],
            holes: Vec::new(),
        }
    }
}

/// Filled polygon with optional holes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polygon {
    pub outer_ring: Vec<Point>,
    #[serde(default)]
    pub holes: Vec<Vec<Point>>,
}

impl Polygon {
    pub fn new(outer_ring: Vec<Point>) -> Self {
        Self { outer_ring, holes: Vec::new() }
    }

    pub fn bbox(&self) -> Option<Rect> {
        Rect::from_points(&self.outer_ring)
    }

    /// Fewer than three vertices or no enclosed area
    pub fn is_degenerate(&self) -> bool {
        self.outer_ring.len() < 3 || self.bbox().map_or(true, |r| r.width() <= 0.0 || r.height() <= 0.0)
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        for p in self.outer_ring.iter_mut().chain(self.holes.iter_mut().flatten()) {
            p.x += dx;
            p.y += dy;
        }
    }
}

/// Board layer. Copper layers occupy ids 0..=31 (front to back).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Layer(pub u8);

const TECH_LAYER_NAMES: &[&str] = &[
    "F.SilkS", "B.SilkS", "F.Fab", "B.Fab", "F.CrtYd", "B.CrtYd", "Edge.Cuts", "Margin",
    "Dwgs.User", "Cmts.User",
];

impl Layer {
    pub const F_CU: Layer = Layer(0);
    pub const B_CU: Layer = Layer(31);
    pub const F_SILKS: Layer = Layer(32);
    pub const B_SILKS: Layer = Layer(33);
    pub const F_FAB: Layer = Layer(34);
    pub const B_FAB: Layer = Layer(35);
    pub const F_CRTYD: Layer = Layer(36);
    pub const B_CRTYD: Layer = Layer(37);
    pub const EDGE_CUTS: Layer = Layer(38);
    pub const MARGIN: Layer = Layer(39);
    pub const DWGS_USER: Layer = Layer(40);
    pub const CMTS_USER: Layer = Layer(41);

    pub const COUNT: u8 = 42;

    /// Inner copper layer `In<n>.Cu`, n in 1..=30
    pub fn inner(n: u8) -> Option<Layer> {
        (1..=30).contains(&n).then_some(Layer(n))
    }

    pub fn is_copper(&self) -> bool {
        self.0 <= Self::B_CU.0
    }

    pub fn name(&self) -> String {
        match self.0 {
            0 => "F.Cu".to_string(),
            31 => "B.Cu".to_string(),
            n @ 1..=30 => format!("In{}.Cu", n),
            n if n < Self::COUNT => TECH_LAYER_NAMES[(n - 32) as usize].to_string(),
            n => format!("Layer{}", n),
        }
    }

    pub fn from_name(name: &str) -> Option<Layer> {
        match name {
            "F.Cu" => return Some(Self::F_CU),
            "B.Cu" => return Some(Self::B_CU),
            _ => {}
        }
        if let Some(n) = name.strip_prefix("In").and_then(|s| s.strip_suffix(".Cu")) {
            return n.parse::<u8>().ok().and_then(Layer::inner);
        }
        TECH_LAYER_NAMES
            .iter()
            .position(|&n| n.eq_ignore_ascii_case(name))
            .map(|i| Layer(32 + i as u8))
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl TryFrom<String> for Layer {
    type Error = DrcError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Layer::from_name(&value).ok_or(DrcError::UnknownLayer(value))
    }
}

impl From<Layer> for String {
    fn from(layer: Layer) -> Self {
        layer.name()
    }
}

/// Bitmask of layers, serialized as a list of layer names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct LayerSet(u64);

impl LayerSet {
    pub const fn empty() -> Self {
        LayerSet(0)
    }

    pub fn single(layer: Layer) -> Self {
        LayerSet(1u64 << layer.0)
    }

    /// All copper layers from `top` through `bottom` inclusive
    pub fn copper_span(top: Layer, bottom: Layer) -> Self {
        let (lo, hi) = (top.0.min(bottom.0), top.0.max(bottom.0).min(Layer::B_CU.0));
        (lo..=hi).fold(LayerSet::empty(), |set, l| set.with(Layer(l)))
    }

    pub fn all_copper() -> Self {
        Self::copper_span(Layer::F_CU, Layer::B_CU)
    }

    pub fn with(mut self, layer: Layer) -> Self {
        self.0 |= 1u64 << layer.0;
        self
    }

    pub fn contains(&self, layer: Layer) -> bool {
        layer.0 < 64 && self.0 & (1u64 << layer.0) != 0
    }

    pub fn intersection(&self, other: &LayerSet) -> LayerSet {
        LayerSet(self.0 & other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Layer> + '_ {
        (0..Layer::COUNT).map(Layer).filter(move |l| self.contains(*l))
    }

    /// First layer in the set (front-most copper first)
    pub fn first(&self) -> Option<Layer> {
        self.iter().next()
    }
}

impl FromIterator<Layer> for LayerSet {
    fn from_iter<I: IntoIterator<Item = Layer>>(iter: I) -> Self {
        iter.into_iter().fold(LayerSet::empty(), |set, l| set.with(l))
    }
}

impl TryFrom<Vec<String>> for LayerSet {
    type Error = DrcError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        let mut set = LayerSet::empty();
        for name in names {
            // "*.Cu" is shorthand for every copper layer
            if name == "*.Cu" {
                set = LayerSet(set.0 | LayerSet::all_copper().0);
                continue;
            }
            set = set.with(Layer::try_from(name)?);
        }
        Ok(set)
    }
}

impl From<LayerSet> for Vec<String> {
    fn from(set: LayerSet) -> Self {
        set.iter().map(|l| l.name()).collect()
    }
}

/// Stable handle of a board item (index into the board arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u32);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Via construction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViaType {
    #[default]
    Through,
    BlindBuried,
    Micro,
}

/// Track segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub start: Point,
    pub end: Point,
    pub width: f64,
}

/// Via (hole through one or more copper layers)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Via {
    pub position: Point,
    pub diameter: f64,
    pub drill: f64,
    #[serde(default)]
    pub via_type: ViaType,
}

/// Footprint pad with its absolute copper outline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pad {
    pub position: Point,
    pub outline: Polygon,
    #[serde(default)]
    pub drill: Option<f64>,
    #[serde(default)]
    pub number: String,
}

/// Component footprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub reference: String,
    #[serde(default)]
    pub value: String,
    pub position: Point,
    #[serde(default)]
    pub courtyard: Option<Polygon>,
    /// Bounding outline used when the courtyard is missing
    #[serde(default)]
    pub bounding_polygon: Option<Polygon>,
    #[serde(default)]
    pub board_only: bool,
}

/// Disallow bitmask carried by rule areas and `disallow` constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct DisallowFlags(u32);

const DISALLOW_NAMES: &[(&str, DisallowFlags)] = &[
    ("tracks", DisallowFlags::TRACKS),
    ("vias", DisallowFlags::VIAS),
    ("microvias", DisallowFlags::MICROVIAS),
    ("blind_vias", DisallowFlags::BLIND_VIAS),
    ("holes", DisallowFlags::HOLES),
    ("pads", DisallowFlags::PADS),
    ("footprints", DisallowFlags::FOOTPRINTS),
    ("texts", DisallowFlags::TEXTS),
    ("graphics", DisallowFlags::GRAPHICS),
    ("zones", DisallowFlags::ZONES),
];

impl DisallowFlags {
    pub const NONE: DisallowFlags = DisallowFlags(0);
    pub const TRACKS: DisallowFlags = DisallowFlags(1 << 0);
    pub const VIAS: DisallowFlags = DisallowFlags(1 << 1);
    pub const MICROVIAS: DisallowFlags = DisallowFlags(1 << 2);
    pub const BLIND_VIAS: DisallowFlags = DisallowFlags(1 << 3);
    pub const HOLES: DisallowFlags = DisallowFlags(1 << 4);
    pub const PADS: DisallowFlags = DisallowFlags(1 << 5);
    pub const FOOTPRINTS: DisallowFlags = DisallowFlags(1 << 6);
    pub const TEXTS: DisallowFlags = DisallowFlags(1 << 7);
    pub const GRAPHICS: DisallowFlags = DisallowFlags(1 << 8);
    pub const ZONES: DisallowFlags = DisallowFlags(1 << 9);

    pub fn contains(&self, other: DisallowFlags) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn intersects(&self, other: DisallowFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn union(self, other: DisallowFlags) -> DisallowFlags {
        DisallowFlags(self.0 | other.0)
    }

    /// Names of the set flags, in declaration order
    pub fn names(&self) -> Vec<&'static str> {
        DISALLOW_NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl TryFrom<Vec<String>> for DisallowFlags {
    type Error = DrcError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        names.into_iter().try_fold(DisallowFlags::NONE, |acc, name| {
            DISALLOW_NAMES
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(&name))
                .map(|(_, flag)| acc.union(*flag))
                .ok_or(DrcError::UnknownDisallowFlag(name))
        })
    }
}

impl From<DisallowFlags> for Vec<String> {
    fn from(flags: DisallowFlags) -> Self {
        flags.names().into_iter().map(str::to_string).collect()
    }
}

/// Copper zone or rule area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    #[serde(default)]
    pub name: String,
    pub outline: Polygon,
    /// Present for rule areas (keepouts); copper zones carry `None`
    #[serde(default)]
    pub keepout: Option<DisallowFlags>,
    /// Filled copper per layer, copper zones only
    #[serde(default)]
    pub fills: Vec<ZoneFill>,
}

/// Filled region of a copper zone on one layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneFill {
    pub layer: Layer,
    pub polygons: Vec<Polygon>,
}

impl Zone {
    pub fn is_rule_area(&self) -> bool {
        self.keepout.is_some()
    }

    pub fn disallow(&self) -> DisallowFlags {
        self.keepout.unwrap_or_default()
    }

    pub fn is_filled(&self) -> bool {
        self.fills.iter().any(|f| !f.polygons.is_empty())
    }

    pub fn fill_on(&self, layer: Layer) -> &[Polygon] {
        self.fills
            .iter()
            .find(|f| f.layer == layer)
            .map(|f| f.polygons.as_slice())
            .unwrap_or(&[])
    }
}

/// Font used to render a text item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontKind {
    /// Stroke (vector pen) font; thickness is the pen width
    #[default]
    Stroke,
    /// Outline (filled glyph) font
    Outline,
}

/// Text item, also embedded in dimensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub text: String,
    pub position: Point,
    pub height: f64,
    pub thickness: f64,
    #[serde(default)]
    pub font: FontKind,
    /// Rendered glyph outlines (outline fonts)
    #[serde(default)]
    pub glyphs: Vec<Polygon>,
}

impl Text {
    /// Glyph box, or an estimate from character count when not rendered
    pub fn bbox(&self) -> Rect {
        let glyph_box = self
            .glyphs
            .iter()
            .filter_map(Polygon::bbox)
            .reduce(|a, b| a.merge(&b));
        glyph_box.unwrap_or_else(|| {
            let chars = self.text.chars().count().max(1) as f64;
            let half_w = chars * self.height * 0.6 / 2.0 + self.thickness / 2.0;
            let half_h = (self.height + self.thickness) / 2.0;
            Rect::around(self.position, half_w, half_h)
        })
    }
}

/// Dimension annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub start: Point,
    pub end: Point,
    pub line_width: f64,
    pub text: Text,
}

/// Graphic drawing primitive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Graphic {
    Segment { start: Point, end: Point, width: f64 },
    Circle { center: Point, radius: f64, width: f64 },
    Polygon {
        polygon: Polygon,
        width: f64,
        /// Filled polygons cover their interior; others are only stroked
        #[serde(default)]
        filled: bool,
    },
}
