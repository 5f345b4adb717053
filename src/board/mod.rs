//! Board data model consumed by the DRC engine
//!
//! The board owns every item in an arena; the rest of the crate refers to
//! items only through [`ItemId`] handles.
//!
//! # Submodules
//! - `types` - Geometric primitives, layers and item payloads
//! - `shape` - Per-layer effective shapes
//! - `tessellation` - Triangulation of filled polygons
//! - `netlist` - Schematic component list

mod netlist;
mod shape;
mod tessellation;
mod types;

pub use netlist::{Netlist, NetlistComponent};
pub use shape::Shape;
pub use tessellation::{triangle_area, triangulate_polygon};
pub use types::{
    Dimension, DisallowFlags, FontKind, Footprint, Graphic, ItemId, Layer, LayerSet, Pad, Point,
    Polygon, Rect, Text, Track, Via, ViaType, Zone, ZoneFill,
};

use serde::{Deserialize, Serialize};

/// Item category used for candidate filtering and rule conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Track,
    Via,
    Pad,
    Footprint,
    Zone,
    RuleArea,
    Text,
    Dimension,
    Graphic,
}

impl ItemKind {
    pub fn name(&self) -> &'static str {
        match self {
            ItemKind::Track => "track",
            ItemKind::Via => "via",
            ItemKind::Pad => "pad",
            ItemKind::Footprint => "footprint",
            ItemKind::Zone => "zone",
            ItemKind::RuleArea => "rule_area",
            ItemKind::Text => "text",
            ItemKind::Dimension => "dimension",
            ItemKind::Graphic => "graphic",
        }
    }
}

/// Kind-specific payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemData {
    Track(Track),
    Via(Via),
    Pad(Pad),
    Footprint(Footprint),
    Zone(Zone),
    Text(Text),
    Dimension(Dimension),
    Graphic(Graphic),
}

/// A board item: common attributes plus its payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardItem {
    pub layers: LayerSet,
    #[serde(default)]
    pub net: Option<String>,
    #[serde(default)]
    pub net_class: Option<String>,
    /// Owning footprint for pads, footprint texts and footprint rule areas
    #[serde(default)]
    pub parent: Option<ItemId>,
    #[serde(flatten)]
    pub data: ItemData,
}

impl BoardItem {
    pub fn new(layers: LayerSet, data: ItemData) -> Self {
        Self { layers, net: None, net_class: None, parent: None, data }
    }

    pub fn track(layer: Layer, start: Point, end: Point, width: f64) -> Self {
        Self::new(LayerSet::single(layer), ItemData::Track(Track { start, end, width }))
    }

    /// Through via spanning every copper layer
    pub fn via(position: Point, diameter: f64, drill: f64) -> Self {
        Self::new(
            LayerSet::all_copper(),
            ItemData::Via(Via { position, diameter, drill, via_type: ViaType::Through }),
        )
    }

    pub fn rule_area(name: &str, outline: Polygon, layers: LayerSet, flags: DisallowFlags) -> Self {
        Self::new(
            layers,
            ItemData::Zone(Zone {
                name: name.to_string(),
                outline,
                keepout: Some(flags),
                fills: Vec::new(),
            }),
        )
    }

    pub fn footprint(reference: &str, position: Point, courtyard: Option<Polygon>) -> Self {
        Self::new(
            LayerSet::single(Layer::F_CU),
            ItemData::Footprint(Footprint {
                reference: reference.to_string(),
                value: String::new(),
                position,
                courtyard,
                bounding_polygon: None,
                board_only: false,
            }),
        )
    }

    pub fn text(layer: Layer, text: Text) -> Self {
        Self::new(LayerSet::single(layer), ItemData::Text(text))
    }

    pub fn with_net(mut self, net: &str) -> Self {
        self.net = Some(net.to_string());
        self
    }

    pub fn with_parent(mut self, parent: ItemId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn kind(&self) -> ItemKind {
        match &self.data {
            ItemData::Track(_) => ItemKind::Track,
            ItemData::Via(_) => ItemKind::Via,
            ItemData::Pad(_) => ItemKind::Pad,
            ItemData::Footprint(_) => ItemKind::Footprint,
            ItemData::Zone(z) if z.is_rule_area() => ItemKind::RuleArea,
            ItemData::Zone(_) => ItemKind::Zone,
            ItemData::Text(_) => ItemKind::Text,
            ItemData::Dimension(_) => ItemKind::Dimension,
            ItemData::Graphic(_) => ItemKind::Graphic,
        }
    }

    pub fn as_zone(&self) -> Option<&Zone> {
        match &self.data {
            ItemData::Zone(z) => Some(z),
            _ => None,
        }
    }

    pub fn as_footprint(&self) -> Option<&Footprint> {
        match &self.data {
            ItemData::Footprint(f) => Some(f),
            _ => None,
        }
    }

    /// Text carried by text items and dimensions
    pub fn text_data(&self) -> Option<&Text> {
        match &self.data {
            ItemData::Text(t) => Some(t),
            ItemData::Dimension(d) => Some(&d.text),
            _ => None,
        }
    }

    /// Anchor used when a violation has no better marker position
    pub fn position(&self) -> Point {
        match &self.data {
            ItemData::Track(t) => t.start,
            ItemData::Via(v) => v.position,
            ItemData::Pad(p) => p.position,
            ItemData::Footprint(f) => f.position,
            ItemData::Zone(z) => z.outline.outer_ring.first().copied().unwrap_or_default(),
            ItemData::Text(t) => t.position,
            ItemData::Dimension(d) => d.start,
            ItemData::Graphic(Graphic::Segment { start, .. }) => *start,
            ItemData::Graphic(Graphic::Circle { center, .. }) => *center,
            ItemData::Graphic(Graphic::Polygon { polygon, .. }) => {
                polygon.outer_ring.first().copied().unwrap_or_default()
            }
        }
    }

    /// Drilled hole as (center, radius)
    pub fn hole(&self) -> Option<(Point, f64)> {
        match &self.data {
            ItemData::Via(v) if v.drill > 0.0 => Some((v.position, v.drill / 2.0)),
            ItemData::Pad(Pad { position, drill: Some(d), .. }) if *d > 0.0 => Some((*position, d / 2.0)),
            _ => None,
        }
    }

    /// Shape for footprint-level tests: courtyard, else bounding outline
    pub fn footprint_outline(&self) -> Option<&Polygon> {
        let fp = self.as_footprint()?;
        fp.courtyard
            .as_ref()
            .filter(|c| !c.is_degenerate())
            .or(fp.bounding_polygon.as_ref().filter(|b| !b.is_degenerate()))
    }

    pub fn bbox(&self) -> Option<Rect> {
        match &self.data {
            ItemData::Track(t) => Some(Rect::new(t.start, t.end).inflate(t.width / 2.0)),
            ItemData::Via(v) => Some(Rect::around(v.position, v.diameter / 2.0, v.diameter / 2.0)),
            ItemData::Pad(p) => p.outline.bbox(),
            ItemData::Footprint(f) => self
                .footprint_outline()
                .and_then(Polygon::bbox)
                .or_else(|| Some(Rect::around(f.position, 0.0, 0.0))),
            ItemData::Zone(z) => z.outline.bbox(),
            ItemData::Text(t) => Some(t.bbox()),
            ItemData::Dimension(d) => {
                Some(Rect::new(d.start, d.end).inflate(d.line_width / 2.0).merge(&d.text.bbox()))
            }
            ItemData::Graphic(g) => graphic_shape(g).bbox(),
        }
    }

    /// Shape this item presents on `layer`; zones present their outline
    /// here and their triangles through [`BoardItem::fill_triangles`]
    pub fn effective_shape(&self, layer: Layer) -> Option<Shape> {
        if !self.layers.contains(layer) {
            return None;
        }
        let shape = match &self.data {
            ItemData::Track(t) => Shape::Segment { start: t.start, end: t.end, width: t.width },
            ItemData::Via(v) => Shape::Circle { center: v.position, radius: v.diameter / 2.0 },
            ItemData::Pad(p) => Shape::Polygon(p.outline.clone()),
            ItemData::Footprint(_) => Shape::Polygon(self.footprint_outline()?.clone()),
            ItemData::Zone(z) => Shape::Polygon(z.outline.clone()),
            ItemData::Text(_) | ItemData::Dimension(_) => Shape::Polygon(self.bbox()?.to_polygon()),
            ItemData::Graphic(g) => graphic_shape(g),
        };
        (!shape.is_degenerate()).then_some(shape)
    }

    /// Triangles indexed for a zone on `layer`: the fill of a copper zone,
    /// or the outline of a rule area
    pub fn fill_triangles(&self, layer: Layer) -> Vec<[Point; 3]> {
        match &self.data {
            ItemData::Zone(z) if self.layers.contains(layer) => {
                if z.is_rule_area() {
                    triangulate_polygon(&z.outline)
                } else {
                    z.fill_on(layer).iter().flat_map(triangulate_polygon).collect()
                }
            }
            _ => Vec::new(),
        }
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        let shift = |p: &mut Point| {
            p.x += dx;
            p.y += dy;
        };
        match &mut self.data {
            ItemData::Track(t) => {
                shift(&mut t.start);
                shift(&mut t.end);
            }
            ItemData::Via(v) => shift(&mut v.position),
            ItemData::Pad(p) => {
                shift(&mut p.position);
                p.outline.translate(dx, dy);
            }
            ItemData::Footprint(f) => {
                shift(&mut f.position);
                for poly in f.courtyard.iter_mut().chain(f.bounding_polygon.iter_mut()) {
                    poly.translate(dx, dy);
                }
            }
            ItemData::Zone(z) => {
                z.outline.translate(dx, dy);
                for poly in z.fills.iter_mut().flat_map(|f| f.polygons.iter_mut()) {
                    poly.translate(dx, dy);
                }
            }
            ItemData::Text(t) => translate_text(t, dx, dy),
            ItemData::Dimension(d) => {
                shift(&mut d.start);
                shift(&mut d.end);
                translate_text(&mut d.text, dx, dy);
            }
            ItemData::Graphic(Graphic::Segment { start, end, .. }) => {
                shift(start);
                shift(end);
            }
            ItemData::Graphic(Graphic::Circle { center, .. }) => shift(center),
            ItemData::Graphic(Graphic::Polygon { polygon, .. }) => polygon.translate(dx, dy),
        }
    }
}

fn translate_text(t: &mut Text, dx: f64, dy: f64) {
    t.position.x += dx;
    t.position.y += dy;
    for glyph in &mut t.glyphs {
        glyph.translate(dx, dy);
    }
}

fn graphic_shape(g: &Graphic) -> Shape {
    match g {
        Graphic::Segment { start, end, width } => Shape::Segment { start: *start, end: *end, width: *width },
        Graphic::Circle { center, radius, width } => Shape::Ring { center: *center, radius: *radius, width: *width },
        Graphic::Polygon { polygon, filled: true, .. } => Shape::Polygon(polygon.clone()),
        Graphic::Polygon { polygon, width, .. } => Shape::Outline { polygon: polygon.clone(), width: *width },
    }
}

#[derive(Deserialize)]
struct BoardFile {
    items: Vec<BoardItem>,
}

impl From<BoardFile> for Board {
    fn from(file: BoardFile) -> Self {
        Board { items: file.items.into_iter().map(Some).collect() }
    }
}

/// Arena of board items. Removal leaves a tombstone so handles stay stable.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "BoardFile")]
pub struct Board {
    items: Vec<Option<BoardItem>>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: BoardItem) -> ItemId {
        self.items.push(Some(item));
        ItemId((self.items.len() - 1) as u32)
    }

    pub fn remove(&mut self, id: ItemId) -> Option<BoardItem> {
        self.items.get_mut(id.0 as usize).and_then(Option::take)
    }

    pub fn item(&self, id: ItemId) -> Option<&BoardItem> {
        self.items.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut BoardItem> {
        self.items.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    /// Live items in handle order
    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &BoardItem)> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| item.as_ref().map(|it| (ItemId(i as u32), it)))
    }

    pub fn items_of(&self, kind: ItemKind) -> impl Iterator<Item = (ItemId, &BoardItem)> {
        self.iter().filter(move |(_, item)| item.kind() == kind)
    }

    pub fn footprints(&self) -> impl Iterator<Item = (ItemId, &Footprint)> {
        self.iter().filter_map(|(id, item)| item.as_footprint().map(|f| (id, f)))
    }

    pub fn rule_areas(&self) -> impl Iterator<Item = (ItemId, &BoardItem)> {
        self.items_of(ItemKind::RuleArea)
    }

    pub fn copper_zones(&self) -> impl Iterator<Item = (ItemId, &BoardItem)> {
        self.items_of(ItemKind::Zone)
    }

    /// First rule area or zone whose name matches `name`, a glob pattern.
    /// A malformed pattern matches the name literally.
    pub fn zone_by_name(&self, name: &str) -> Option<(ItemId, &BoardItem)> {
        let pattern = glob::Pattern::new(name).ok();
        let matches = |zone_name: &str| match &pattern {
            Some(pattern) => pattern.matches(zone_name),
            None => zone_name == name,
        };
        self.iter()
            .find(|(_, item)| item.as_zone().is_some_and(|z| matches(&z.name)))
    }

    /// Reference designator of a footprint or of an item's parent footprint
    pub fn reference_of(&self, id: ItemId) -> Option<&str> {
        let item = self.item(id)?;
        if let Some(fp) = item.as_footprint() {
            return Some(fp.reference.as_str());
        }
        let parent = self.item(item.parent?)?;
        parent.as_footprint().map(|fp| fp.reference.as_str())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
