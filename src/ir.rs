use crate::error::{DiagramError, Result};
use crate::layout::arrange::{self, GridOptions};
use crate::layout::geometry::{NumberOrString, PosValue};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

/// Handle into a [`Document`]'s shape arena.
///
/// Ids remember which document issued them, so handing one to another
/// document fails with [`DiagramError::UnknownShape`] instead of aliasing a
/// shape that happens to sit at the same index. Clones of a document share
/// its tag and accept each other's ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId {
    doc: u32,
    index: usize,
}

impl ShapeId {
    pub fn index(self) -> usize {
        self.index
    }
}

// Dumps only ever describe a single document, so the tag is left out.
impl Serialize for ShapeId {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.index as u64)
    }
}

static NEXT_DOCUMENT_TAG: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Rect,
    Circle,
    Text,
    Image,
    Diamond,
    Trapezoid,
    Cylinder,
    Cuboid,
    Sphere,
    Stack,
}

impl ShapeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ShapeKind::Rect => "rect",
            ShapeKind::Circle => "circle",
            ShapeKind::Text => "text",
            ShapeKind::Image => "image",
            ShapeKind::Diamond => "diamond",
            ShapeKind::Trapezoid => "trapezoid",
            ShapeKind::Cylinder => "cylinder",
            ShapeKind::Cuboid => "cuboid",
            ShapeKind::Sphere => "sphere",
            ShapeKind::Stack => "stack",
        }
    }

    /// Circles and spheres are positioned by their center rather than their top-left corner.
    pub fn is_centered(self) -> bool {
        matches!(self, ShapeKind::Circle | ShapeKind::Sphere)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Top,
    Bottom,
    Left,
    Right,
}

impl Side {
    /// Iteration order used by nearest-anchor searches; the first minimum wins.
    pub const ALL: [Side; 4] = [Side::Top, Side::Bottom, Side::Left, Side::Right];

    pub fn is_vertical(self) -> bool {
        matches!(self, Side::Top | Side::Bottom)
    }

    /// Outward direction along the side's normal axis.
    pub fn outward(self) -> f32 {
        match self {
            Side::Top | Side::Left => -1.0,
            Side::Bottom | Side::Right => 1.0,
        }
    }
}

/// Symbolic anchor: a side plus a fractional offset along it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorSpec {
    pub side: Side,
    pub at: f32,
}

impl AnchorSpec {
    pub fn new(side: Side, at: f32) -> Self {
        Self { side, at }
    }
}

impl From<Side> for AnchorSpec {
    fn from(side: Side) -> Self {
        Self { side, at: 0.5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    #[default]
    Straight,
    Curve,
    Polyline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

impl LineStyle {
    pub fn dash_array(self) -> Option<&'static str> {
        match self {
            LineStyle::Solid => None,
            LineStyle::Dashed => Some("6 3"),
            LineStyle::Dotted => Some("2 2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArrowHead {
    #[default]
    Triangle,
    TriangleOpen,
    Stealth,
    Vee,
    Circle,
    CircleOpen,
    Diamond,
    DiamondOpen,
    Bar,
    Dot,
    None,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(from = "StrokeInput")]
pub struct Stroke {
    pub color: Option<String>,
    pub width: Option<f32>,
    pub dash: Vec<f32>,
}

impl Stroke {
    pub fn color(color: &str) -> Self {
        Self {
            color: Some(color.to_string()),
            ..Default::default()
        }
    }

    pub fn is_none(&self) -> bool {
        self.color.as_deref() == Some("none")
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StrokeInput {
    Color(String),
    Detailed {
        color: Option<String>,
        width: Option<f32>,
        dash: Option<Vec<f32>>,
    },
}

impl From<StrokeInput> for Stroke {
    fn from(input: StrokeInput) -> Self {
        match input {
            StrokeInput::Color(color) => Stroke::color(&color),
            StrokeInput::Detailed { color, width, dash } => Stroke {
                color,
                width,
                dash: dash.unwrap_or_default(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shadow {
    #[serde(default)]
    pub dx: f32,
    #[serde(default = "default_shadow_dy")]
    pub dy: f32,
    #[serde(default = "default_shadow_blur")]
    pub blur: f32,
    #[serde(default = "default_shadow_color")]
    pub color: String,
}

fn default_shadow_dy() -> f32 {
    2.0
}

fn default_shadow_blur() -> f32 {
    4.0
}

fn default_shadow_color() -> String {
    "rgba(0,0,0,0.15)".to_string()
}

impl Default for Shadow {
    fn default() -> Self {
        Self {
            dx: 0.0,
            dy: default_shadow_dy(),
            blur: default_shadow_blur(),
            color: default_shadow_color(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ShadowSpec {
    Enabled(bool),
    Custom(Shadow),
}

impl ShadowSpec {
    pub fn resolve(&self) -> Option<Shadow> {
        match self {
            ShadowSpec::Enabled(true) => Some(Shadow::default()),
            ShadowSpec::Enabled(false) => None,
            ShadowSpec::Custom(shadow) => Some(shadow.clone()),
        }
    }
}

/// Declared configuration of a shape. Every field is optional; defaults depend on the kind.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShapeConfig {
    pub pos: Option<[PosValue; 2]>,
    pub size: Option<[PosValue; 2]>,
    pub r: Option<f32>,
    pub padding: Option<f32>,
    pub fill: Option<String>,
    pub fill_opacity: Option<f32>,
    /// Shorthand for stroke color and font color.
    pub color: Option<String>,
    pub stroke: Option<Stroke>,
    pub radius: Option<f32>,
    pub opacity: Option<f32>,
    pub shadow: Option<ShadowSpec>,
    pub font_size: Option<f32>,
    pub font_family: Option<String>,
    pub font_color: Option<String>,
    pub font_weight: Option<NumberOrString>,
    pub bold: Option<bool>,
    pub top_ratio: Option<f32>,
    pub depth: Option<f32>,
    pub count: Option<usize>,
    pub stack_offset: Option<[f32; 2]>,
    pub src: Option<String>,
}

impl ShapeConfig {
    pub fn at(x: impl Into<PosValue>, y: impl Into<PosValue>) -> Self {
        Self {
            pos: Some([x.into(), y.into()]),
            ..Default::default()
        }
    }

    pub fn with_size(mut self, w: impl Into<PosValue>, h: impl Into<PosValue>) -> Self {
        self.size = Some([w.into(), h.into()]);
        self
    }

    pub fn with_radius(mut self, r: f32) -> Self {
        self.r = Some(r);
        self
    }

    pub fn resolved_font_weight(&self) -> String {
        match (&self.font_weight, self.bold) {
            (Some(weight), _) => weight.as_string(),
            (None, Some(true)) => "bold".to_string(),
            _ => "normal".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Shape {
    pub id: ShapeId,
    /// Stable per-document name such as `rect_3`.
    pub name: String,
    pub kind: ShapeKind,
    pub label: String,
    pub config: ShapeConfig,
    pub parent: Option<ShapeId>,
    pub children: Vec<ShapeId>,
}

impl Shape {
    pub fn circle_radius(&self) -> f32 {
        self.config.r.unwrap_or(30.0)
    }

    pub fn padding(&self) -> f32 {
        self.config.padding.unwrap_or(0.0)
    }

    pub fn top_ratio(&self) -> f32 {
        self.config.top_ratio.unwrap_or(0.6)
    }

    /// Cap ellipse height as a fraction of the cylinder's height.
    pub fn cylinder_depth(&self) -> f32 {
        self.config.depth.unwrap_or(0.15)
    }

    /// Extrusion of a cuboid's top and right faces in px.
    pub fn cuboid_depth(&self) -> f32 {
        self.config.depth.unwrap_or(15.0)
    }

    pub fn stack_count(&self) -> usize {
        self.config.count.unwrap_or(3)
    }

    pub fn stack_offset(&self) -> (f32, f32) {
        let [dx, dy] = self.config.stack_offset.unwrap_or([6.0, -6.0]);
        (dx, dy)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArrowConfig {
    pub from: Option<AnchorSpec>,
    pub to: Option<AnchorSpec>,
    pub label: Option<String>,
    pub style: LineStyle,
    pub color: Option<String>,
    pub width: Option<f32>,
    pub head: ArrowHead,
    pub head_size: Option<f32>,
    pub bidirectional: bool,
    pub path: PathKind,
    /// Curve bend, polyline step gap or same-side bypass distance, depending on the route.
    pub curve: Option<f32>,
    pub corner_radius: f32,
    /// Manual vertical label offset; disables label collision search.
    pub label_offset: Option<f32>,
}

impl ArrowConfig {
    pub fn polyline() -> Self {
        Self {
            path: PathKind::Polyline,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_anchors(mut self, from: impl Into<AnchorSpec>, to: impl Into<AnchorSpec>) -> Self {
        self.from = Some(from.into());
        self.to = Some(to.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct Arrow {
    pub source: ShapeId,
    pub target: ShapeId,
    pub config: ArrowConfig,
}

#[derive(Debug, Clone)]
pub struct Fork {
    pub source: ShapeId,
    pub targets: Vec<ShapeId>,
    pub config: ArrowConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupConfig {
    pub label: Option<String>,
    pub fill: Option<String>,
    pub stroke: Option<Stroke>,
    pub radius: Option<f32>,
    pub padding: Option<f32>,
    pub font_size: Option<f32>,
    pub font_color: Option<String>,
    /// Minimum box size; members stay centered inside it.
    pub size: Option<[f32; 2]>,
}

#[derive(Debug, Clone)]
pub struct Group {
    /// The synthesized rectangle drawn behind the members.
    pub shape: ShapeId,
    pub members: Vec<ShapeId>,
    pub padding: f32,
    pub size: Option<(f32, f32)>,
}

/// A diagram under construction: a shape tree plus connectors, forks and groups.
#[derive(Debug, Clone)]
pub struct Document {
    pub width: f32,
    pub height: f32,
    shapes: Vec<Shape>,
    roots: Vec<ShapeId>,
    arrows: Vec<Arrow>,
    forks: Vec<Fork>,
    groups: Vec<Group>,
    name_counter: usize,
    tag: u32,
}

impl Default for Document {
    fn default() -> Self {
        Self::new(800.0, 400.0)
    }
}

impl Document {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            shapes: Vec::new(),
            roots: Vec::new(),
            arrows: Vec::new(),
            forks: Vec::new(),
            groups: Vec::new(),
            name_counter: 0,
            tag: NEXT_DOCUMENT_TAG.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn push_shape(
        &mut self,
        kind: ShapeKind,
        label: &str,
        config: ShapeConfig,
        parent: Option<ShapeId>,
    ) -> ShapeId {
        self.name_counter += 1;
        let id = ShapeId {
            doc: self.tag,
            index: self.shapes.len(),
        };
        self.shapes.push(Shape {
            id,
            name: format!("{}_{}", kind.as_str(), self.name_counter),
            kind,
            label: label.to_string(),
            config,
            parent,
            children: Vec::new(),
        });
        id
    }

    pub fn add_shape(&mut self, kind: ShapeKind, label: &str, config: ShapeConfig) -> ShapeId {
        let id = self.push_shape(kind, label, config, None);
        self.roots.push(id);
        id
    }

    /// Adds a shape positioned relative to `parent`'s content box.
    pub fn add_child(
        &mut self,
        parent: ShapeId,
        kind: ShapeKind,
        label: &str,
        config: ShapeConfig,
    ) -> Result<ShapeId> {
        self.check(parent)?;
        let id = self.push_shape(kind, label, config, Some(parent));
        self.shapes[parent.index].children.push(id);
        Ok(id)
    }

    pub fn rect(&mut self, label: &str, config: ShapeConfig) -> ShapeId {
        self.add_shape(ShapeKind::Rect, label, config)
    }

    pub fn circle(&mut self, label: &str, config: ShapeConfig) -> ShapeId {
        self.add_shape(ShapeKind::Circle, label, config)
    }

    pub fn text(&mut self, label: &str, config: ShapeConfig) -> ShapeId {
        self.add_shape(ShapeKind::Text, label, config)
    }

    pub fn image(&mut self, src: &str, mut config: ShapeConfig) -> ShapeId {
        config.src = Some(src.to_string());
        self.add_shape(ShapeKind::Image, "", config)
    }

    pub fn arrow(&mut self, source: ShapeId, target: ShapeId, config: ArrowConfig) -> Result<()> {
        self.check(source)?;
        self.check(target)?;
        self.arrows.push(Arrow {
            source,
            target,
            config,
        });
        Ok(())
    }

    /// One connector per (source, target) pair, covering fan-out, fan-in and N x M.
    pub fn fan_arrows(
        &mut self,
        sources: &[ShapeId],
        targets: &[ShapeId],
        config: ArrowConfig,
    ) -> Result<()> {
        self.check_all(sources)?;
        self.check_all(targets)?;
        for &source in sources {
            for &target in targets {
                self.arrows.push(Arrow {
                    source,
                    target,
                    config: config.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn fork(&mut self, source: ShapeId, targets: &[ShapeId], config: ArrowConfig) -> Result<()> {
        self.check(source)?;
        self.check_all(targets)?;
        if targets.is_empty() {
            return Err(DiagramError::EmptyFork { origin: source });
        }
        self.forks.push(Fork {
            source,
            targets: targets.to_vec(),
            config,
        });
        Ok(())
    }

    /// Wraps `members` in a rectangle that is drawn underneath every other root.
    pub fn group(&mut self, members: &[ShapeId], config: GroupConfig) -> Result<ShapeId> {
        self.check_all(members)?;
        let shape_config = ShapeConfig {
            fill: Some(config.fill.unwrap_or_else(|| "none".to_string())),
            stroke: Some(config.stroke.unwrap_or_else(|| Stroke {
                color: None,
                width: None,
                dash: vec![6.0, 3.0],
            })),
            radius: Some(config.radius.unwrap_or(8.0)),
            font_size: Some(config.font_size.unwrap_or(11.0)),
            font_color: config.font_color,
            ..Default::default()
        };
        let label = config.label.unwrap_or_default();
        let id = self.push_shape(ShapeKind::Rect, &label, shape_config, None);
        self.roots.insert(0, id);
        self.groups.push(Group {
            shape: id,
            members: members.to_vec(),
            padding: config.padding.unwrap_or(15.0),
            size: config.size.map(|[w, h]| (w, h)),
        });
        Ok(id)
    }

    pub fn row(&mut self, ids: &[ShapeId], gap: f32) -> Result<()> {
        self.check_all(ids)?;
        arrange::row(self, ids, gap);
        Ok(())
    }

    pub fn column(&mut self, ids: &[ShapeId], gap: f32) -> Result<()> {
        self.check_all(ids)?;
        arrange::column(self, ids, gap);
        Ok(())
    }

    pub fn grid(&mut self, ids: &[ShapeId], options: GridOptions) -> Result<()> {
        self.check_all(ids)?;
        arrange::grid(self, ids, options);
        Ok(())
    }

    pub fn contains(&self, id: ShapeId) -> bool {
        id.doc == self.tag && id.index < self.shapes.len()
    }

    fn check(&self, id: ShapeId) -> Result<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(DiagramError::UnknownShape(id))
        }
    }

    fn check_all(&self, ids: &[ShapeId]) -> Result<()> {
        ids.iter().try_for_each(|id| self.check(*id))
    }

    pub fn shape(&self, id: ShapeId) -> &Shape {
        &self.shapes[id.index]
    }

    pub(crate) fn shape_mut(&mut self, id: ShapeId) -> &mut Shape {
        &mut self.shapes[id.index]
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    /// Top-level shapes in drawing order.
    pub fn roots(&self) -> &[ShapeId] {
        &self.roots
    }

    pub fn arrows(&self) -> &[Arrow] {
        &self.arrows
    }

    pub fn forks(&self) -> &[Fork] {
        &self.forks
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn is_group(&self, id: ShapeId) -> bool {
        self.groups.iter().any(|g| g.shape == id)
    }

    /// `id` followed by its parent chain up to the root.
    pub fn lineage(&self, id: ShapeId) -> Vec<ShapeId> {
        let mut out = vec![id];
        let mut current = self.shapes[id.index].parent;
        while let Some(parent) = current {
            out.push(parent);
            current = self.shapes[parent.index].parent;
        }
        out
    }

    /// Every shape in the subtree rooted at `id`, parents before children.
    pub fn descendants(&self, id: ShapeId) -> Vec<ShapeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            for child in self.shapes[current.index].children.iter().rev() {
                stack.push(*child);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_restart_per_document() {
        let mut first = Document::new(200.0, 100.0);
        let a = first.rect("A", ShapeConfig::default());
        let b = first.circle("B", ShapeConfig::default());
        assert_eq!(first.shape(a).name, "rect_1");
        assert_eq!(first.shape(b).name, "circle_2");

        let mut second = Document::new(200.0, 100.0);
        let c = second.rect("C", ShapeConfig::default());
        assert_eq!(second.shape(c).name, "rect_1");
    }

    #[test]
    fn unknown_shape_is_rejected_without_mutation() {
        let mut small = Document::new(100.0, 100.0);
        small.rect("A", ShapeConfig::default());
        let mut big = Document::new(100.0, 100.0);
        let a = big.rect("A", ShapeConfig::default());
        let b = big.rect("B", ShapeConfig::default());

        let err = small.arrow(a, b, ArrowConfig::default()).unwrap_err();
        assert_eq!(err, DiagramError::UnknownShape(a));
        assert!(small.arrows().is_empty());
        assert!(small.group(&[a, b], GroupConfig::default()).is_err());
        assert_eq!(small.roots().len(), 1);
    }

    #[test]
    fn ids_from_another_document_are_rejected_even_when_the_index_exists() {
        let mut left = Document::default();
        let l0 = left.rect("L0", ShapeConfig::default());
        let l1 = left.rect("L1", ShapeConfig::default());
        let mut right = Document::default();
        let r0 = right.rect("R0", ShapeConfig::default());
        let r1 = right.rect("R1", ShapeConfig::default());
        assert_eq!((l0.index(), l1.index()), (r0.index(), r1.index()));

        assert!(!right.contains(l0));
        assert_eq!(
            right.arrow(r0, l1, ArrowConfig::default()).unwrap_err(),
            DiagramError::UnknownShape(l1)
        );
        assert!(right.row(&[r0, l1], 10.0).is_err());
        assert!(right.arrows().is_empty());

        // a clone keeps accepting the ids of the document it came from
        let mut copy = left.clone();
        copy.arrow(l0, l1, ArrowConfig::default()).unwrap();
        assert_eq!(copy.arrows().len(), 1);
        assert!(left.arrows().is_empty());
    }

    #[test]
    fn fan_arrows_cover_every_pair() {
        let mut doc = Document::default();
        let a = doc.rect("A", ShapeConfig::default());
        let b = doc.rect("B", ShapeConfig::default());
        let c = doc.rect("C", ShapeConfig::default());
        doc.fan_arrows(&[a], &[b, c], ArrowConfig::default()).unwrap();
        doc.fan_arrows(&[b, c], &[a], ArrowConfig::default()).unwrap();
        let pairs: Vec<_> = doc
            .arrows()
            .iter()
            .map(|arrow| (arrow.source, arrow.target))
            .collect();
        assert_eq!(pairs, vec![(a, b), (a, c), (b, a), (c, a)]);
    }

    #[test]
    fn group_is_inserted_first() {
        let mut doc = Document::default();
        let a = doc.rect("A", ShapeConfig::default());
        let group = doc
            .group(
                &[a],
                GroupConfig {
                    label: Some("Tier".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(doc.roots()[0], group);
        assert!(doc.is_group(group));
        assert_eq!(doc.groups()[0].padding, 15.0);
        assert_eq!(doc.shape(group).config.radius, Some(8.0));
    }

    #[test]
    fn children_track_lineage() {
        let mut doc = Document::default();
        let outer = doc.rect("outer", ShapeConfig::default());
        let inner = doc
            .add_child(outer, ShapeKind::Rect, "inner", ShapeConfig::default())
            .unwrap();
        let leaf = doc
            .add_child(inner, ShapeKind::Text, "leaf", ShapeConfig::default())
            .unwrap();
        assert_eq!(doc.lineage(leaf), vec![leaf, inner, outer]);
        assert_eq!(doc.descendants(outer), vec![outer, inner, leaf]);
        assert_eq!(doc.roots(), &[outer]);
    }

    #[test]
    fn stroke_accepts_string_or_object() {
        let plain: Stroke = serde_json::from_str(r##""#ff0000""##).unwrap();
        assert_eq!(plain.color.as_deref(), Some("#ff0000"));
        let detailed: Stroke = serde_json::from_str(r#"{"width": 2, "dash": [4, 2]}"#).unwrap();
        assert_eq!(detailed.width, Some(2.0));
        assert_eq!(detailed.dash, vec![4.0, 2.0]);
        assert!(Stroke::color("none").is_none());
    }

    #[test]
    fn shadow_flag_expands_to_defaults() {
        let spec: ShadowSpec = serde_json::from_str("true").unwrap();
        assert_eq!(spec.resolve(), Some(Shadow::default()));
        let custom: ShadowSpec = serde_json::from_str(r#"{"dy": 4}"#).unwrap();
        assert_eq!(custom.resolve().map(|s| s.dy), Some(4.0));
    }
}
