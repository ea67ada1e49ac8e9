use crate::config::Config;
use crate::error::DiagramError;
use crate::ir::{
    AnchorSpec, ArrowConfig, ArrowHead, Document, GroupConfig, LineStyle, PathKind, ShapeConfig,
    ShapeId, ShapeKind, Side,
};
use crate::layout::arrange::DEFAULT_GAP;
use crate::layout::geometry::{PosValue, resolve_percent};
use crate::layout::GridOptions;
use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiagramSpec {
    width: Option<f32>,
    height: Option<f32>,
    bg: Option<String>,
    font_family: Option<String>,
    math_font: Option<String>,
    code_font: Option<String>,
    #[serde(default)]
    fonts: Vec<String>,
    #[serde(default)]
    font_registrations: Vec<FontSpec>,
    auto_align: Option<bool>,
    anti_overlap: Option<bool>,
    align_tolerance: Option<f32>,
    #[serde(default)]
    elements: Vec<ElementSpec>,
    #[serde(default)]
    layouts: Vec<LayoutSpec>,
    #[serde(default)]
    arrows: Vec<ArrowSpec>,
    #[serde(default)]
    fan_arrows: Vec<FanArrowSpec>,
    #[serde(default)]
    forks: Vec<ForkSpec>,
    #[serde(default)]
    groups: Vec<GroupSpec>,
    export: Option<ExportSpec>,
}

#[derive(Debug, Deserialize)]
struct FontSpec {
    name: String,
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ElementSpec {
    id: String,
    #[serde(rename = "type")]
    kind: ShapeKind,
    #[serde(default)]
    label: String,
    #[serde(default)]
    children: Vec<ElementSpec>,
    #[serde(flatten)]
    config: ShapeConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LayoutKind {
    Row,
    #[serde(alias = "column")]
    Col,
    Grid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutSpec {
    #[serde(rename = "type")]
    kind: LayoutKind,
    elements: Vec<String>,
    gap: Option<f32>,
    cols: Option<usize>,
    row_gap: Option<f32>,
    col_gap: Option<f32>,
}

/// Connector options shared by arrows, fan arrows and forks.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArrowFields {
    from_side: Option<Side>,
    from_at: Option<PosValue>,
    to_side: Option<Side>,
    to_at: Option<PosValue>,
    label: Option<String>,
    style: Option<LineStyle>,
    color: Option<String>,
    width: Option<f32>,
    head: Option<ArrowHead>,
    head_size: Option<f32>,
    bidirectional: Option<bool>,
    path: Option<PathKind>,
    curve: Option<f32>,
    corner_radius: Option<f32>,
    label_offset: Option<f32>,
}

fn anchor(side: Option<Side>, at: Option<&PosValue>) -> Option<AnchorSpec> {
    let side = side?;
    Some(match at {
        Some(at) => AnchorSpec::new(side, resolve_percent(at)),
        None => AnchorSpec::from(side),
    })
}

impl ArrowFields {
    fn to_config(&self) -> ArrowConfig {
        ArrowConfig {
            from: anchor(self.from_side, self.from_at.as_ref()),
            to: anchor(self.to_side, self.to_at.as_ref()),
            label: self.label.clone().filter(|l| !l.is_empty()),
            style: self.style.unwrap_or_default(),
            color: self.color.clone(),
            width: self.width,
            head: self.head.unwrap_or_default(),
            head_size: self.head_size,
            bidirectional: self.bidirectional.unwrap_or(false),
            path: self.path.unwrap_or_default(),
            curve: self.curve,
            corner_radius: self.corner_radius.unwrap_or(0.0),
            label_offset: self.label_offset,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ArrowSpec {
    from: String,
    to: String,
    #[serde(flatten)]
    fields: ArrowFields,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn ids(&self) -> Vec<&str> {
        match self {
            OneOrMany::One(id) => vec![id.as_str()],
            OneOrMany::Many(ids) => ids.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FanArrowSpec {
    from: OneOrMany,
    to: OneOrMany,
    #[serde(flatten)]
    fields: ArrowFields,
}

#[derive(Debug, Deserialize)]
struct ForkSpec {
    from: String,
    to: Vec<String>,
    #[serde(flatten)]
    fields: ArrowFields,
}

#[derive(Debug, Deserialize)]
struct GroupSpec {
    members: Vec<String>,
    #[serde(flatten)]
    config: GroupConfig,
}

#[derive(Debug, Deserialize)]
struct ExportSpec {
    path: Option<PathBuf>,
    fit: Option<bool>,
    margin: Option<f32>,
    scale: Option<f32>,
}

/// Document-level options a description carries on top of the loaded config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagramOverrides {
    pub background: Option<String>,
    pub font_family: Option<String>,
    pub math_font: Option<String>,
    pub code_font: Option<String>,
    pub auto_align: Option<bool>,
    pub anti_overlap: Option<bool>,
    pub align_tolerance: Option<f32>,
    pub fit: Option<bool>,
    pub margin: Option<f32>,
    pub scale: Option<f32>,
    /// Stylesheet URLs of remotely registered fonts.
    pub font_imports: Vec<String>,
    pub export_path: Option<PathBuf>,
}

impl DiagramOverrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(v) = &self.background {
            config.render.background = v.clone();
        }
        if let Some(v) = &self.font_family {
            config.theme.font_family = v.clone();
        }
        if let Some(v) = &self.math_font {
            config.theme.math_font = v.clone();
        }
        if let Some(v) = &self.code_font {
            config.theme.code_font = v.clone();
        }
        if let Some(v) = self.auto_align {
            config.layout.auto_align = v;
        }
        if let Some(v) = self.anti_overlap {
            config.layout.anti_overlap = v;
        }
        if let Some(v) = self.align_tolerance {
            config.layout.align_tolerance = v;
        }
        if let Some(v) = self.fit {
            config.render.fit = v;
        }
        if let Some(v) = self.margin {
            config.render.margin = v;
        }
        if let Some(v) = self.scale {
            config.render.scale = v;
        }
        for url in &self.font_imports {
            if !config.render.font_imports.contains(url) {
                config.render.font_imports.push(url.clone());
            }
        }
    }
}

#[derive(Debug)]
pub struct ParseOutput {
    pub document: Document,
    /// Shape handle for every declared element id.
    pub ids: HashMap<String, ShapeId>,
    pub overrides: DiagramOverrides,
}

/// Stylesheet URL for a font registration; local fonts (no source) need none.
fn font_import_url(name: &str, source: Option<&str>) -> Option<String> {
    match source {
        None | Some("") => None,
        Some("google") => Some(format!(
            "https://fonts.googleapis.com/css2?family={}:wght@400;700&display=swap",
            name.replace(' ', "+")
        )),
        Some(url) => Some(url.to_string()),
    }
}

struct Builder {
    document: Document,
    ids: HashMap<String, ShapeId>,
}

impl Builder {
    fn resolve(&self, id: &str) -> Result<ShapeId> {
        self.ids
            .get(id)
            .copied()
            .ok_or_else(|| DiagramError::UnknownShapeName(id.to_string()).into())
    }

    fn resolve_all<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Result<Vec<ShapeId>> {
        ids.into_iter().map(|id| self.resolve(id)).collect()
    }

    fn element(&mut self, spec: ElementSpec, parent: Option<ShapeId>) -> Result<()> {
        if self.ids.contains_key(&spec.id) {
            return Err(DiagramError::DuplicateShapeName(spec.id).into());
        }
        let mut config = spec.config;
        let mut label = spec.label;
        // An image without `src` takes its source from the label.
        if spec.kind == ShapeKind::Image && config.src.is_none() {
            config.src = Some(std::mem::take(&mut label));
        }
        let id = match parent {
            Some(parent) => self.document.add_child(parent, spec.kind, &label, config)?,
            None => self.document.add_shape(spec.kind, &label, config),
        };
        tracing::trace!(id = spec.id.as_str(), kind = spec.kind.as_str(), "declared element");
        self.ids.insert(spec.id, id);
        for child in spec.children {
            self.element(child, Some(id))?;
        }
        Ok(())
    }

    fn layout(&mut self, spec: &LayoutSpec) -> Result<()> {
        let ids = self.resolve_all(spec.elements.iter().map(String::as_str))?;
        let gap = spec.gap.unwrap_or(DEFAULT_GAP);
        match spec.kind {
            LayoutKind::Row => self.document.row(&ids, gap)?,
            LayoutKind::Col => self.document.column(&ids, gap)?,
            LayoutKind::Grid => self.document.grid(
                &ids,
                GridOptions {
                    cols: spec.cols.unwrap_or(GridOptions::default().cols),
                    col_gap: spec.col_gap.unwrap_or(gap),
                    row_gap: spec.row_gap.unwrap_or(gap),
                },
            )?,
        }
        Ok(())
    }
}

/// Builds a document from a JSON or JSON5 description.
///
/// Elements are created first, then layouts, arrows, fan arrows, forks and
/// groups, so every reference can name any declared element.
pub fn parse_diagram(input: &str, config: &Config) -> Result<ParseOutput> {
    parse_diagram_sized(input, config, CanvasSize::default())
}

/// Canvas dimensions that win over the description's own `width`/`height`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CanvasSize {
    pub width: Option<f32>,
    pub height: Option<f32>,
}

/// Like [`parse_diagram`], but `canvas` is fixed before any arranger runs so
/// row/col/grid placement centers on the final canvas.
pub fn parse_diagram_sized(
    input: &str,
    config: &Config,
    canvas: CanvasSize,
) -> Result<ParseOutput> {
    let spec: DiagramSpec = json5::from_str(input)?;

    let width = canvas
        .width
        .or(spec.width)
        .unwrap_or(config.render.width);
    let height = canvas
        .height
        .or(spec.height)
        .unwrap_or(config.render.height);
    let mut builder = Builder {
        document: Document::new(width, height),
        ids: HashMap::new(),
    };

    for element in spec.elements {
        builder.element(element, None)?;
    }
    for layout in &spec.layouts {
        builder.layout(layout)?;
    }
    for arrow in &spec.arrows {
        let source = builder.resolve(&arrow.from)?;
        let target = builder.resolve(&arrow.to)?;
        builder
            .document
            .arrow(source, target, arrow.fields.to_config())?;
    }
    for fan in &spec.fan_arrows {
        let sources = builder.resolve_all(fan.from.ids())?;
        let targets = builder.resolve_all(fan.to.ids())?;
        builder
            .document
            .fan_arrows(&sources, &targets, fan.fields.to_config())?;
    }
    for fork in &spec.forks {
        let source = builder.resolve(&fork.from)?;
        let targets = builder.resolve_all(fork.to.iter().map(String::as_str))?;
        builder
            .document
            .fork(source, &targets, fork.fields.to_config())?;
    }
    for group in spec.groups {
        let members = builder.resolve_all(group.members.iter().map(String::as_str))?;
        builder.document.group(&members, group.config)?;
    }

    let mut font_imports: Vec<String> = Vec::new();
    let registrations = spec
        .fonts
        .iter()
        .map(|name| (name.as_str(), None))
        .chain(
            spec.font_registrations
                .iter()
                .map(|f| (f.name.as_str(), f.source.as_deref())),
        );
    for (name, source) in registrations {
        if let Some(url) = font_import_url(name, source)
            && !font_imports.contains(&url)
        {
            font_imports.push(url);
        }
    }

    let export = spec.export;
    let overrides = DiagramOverrides {
        background: spec.bg,
        font_family: spec.font_family,
        math_font: spec.math_font,
        code_font: spec.code_font,
        auto_align: spec.auto_align,
        anti_overlap: spec.anti_overlap,
        align_tolerance: spec.align_tolerance,
        fit: export.as_ref().and_then(|e| e.fit),
        margin: export.as_ref().and_then(|e| e.margin),
        scale: export.as_ref().and_then(|e| e.scale),
        font_imports,
        export_path: export.and_then(|e| e.path),
    };

    tracing::debug!(
        shapes = builder.document.shapes().len(),
        arrows = builder.document.arrows().len(),
        forks = builder.document.forks().len(),
        "parsed diagram description"
    );
    Ok(ParseOutput {
        document: builder.document,
        ids: builder.ids,
        overrides,
    })
}
