use crate::config::{Config, RenderConfig};
use crate::ir::{ArrowConfig, ArrowHead, Document, Shadow, Shape, ShapeId, ShapeKind};
use crate::layout::{
    Bounds, LabelLayout, Layout, PathCommand, Point, Route, RouteGeometry, path_commands,
};
use crate::layout::geometry::round2;
use crate::markdown::{SegmentStyle, has_markup, parse_markdown};
use crate::theme::Theme;
use anyhow::Result;
use base64::Engine as _;
use std::f32::consts::PI;
use std::path::Path;

/// Resolved stroke of one drawn shape; `None` means `stroke="none"`.
#[derive(Debug, Clone)]
struct StrokeStyle {
    color: String,
    width: f32,
    dash: Vec<f32>,
}

#[derive(Debug, Clone)]
struct TextStyle {
    size: f32,
    color: String,
    weight: String,
    family: String,
}

/// Every paint attribute a shape needs once theme defaults are filled in.
#[derive(Debug, Clone)]
struct ShapeStyle {
    fill: String,
    fill_opacity: Option<f32>,
    stroke: Option<StrokeStyle>,
    opacity: Option<f32>,
    radius: f32,
    shadow: Option<Shadow>,
    text: TextStyle,
}

fn resolve_style(doc: &Document, shape: &Shape, theme: &Theme) -> ShapeStyle {
    let cfg = &shape.config;
    let is_group = doc.is_group(shape.id);
    let default_stroke_color = if is_group {
        theme.group_stroke.clone()
    } else {
        cfg.color.clone().unwrap_or_else(|| theme.stroke_color.clone())
    };
    let stroke = match &cfg.stroke {
        Some(stroke) if stroke.is_none() => None,
        Some(stroke) => Some(StrokeStyle {
            color: escape_attr(stroke.color.as_deref().unwrap_or(&default_stroke_color)),
            width: stroke.width.unwrap_or(theme.stroke_width),
            dash: stroke.dash.clone(),
        }),
        // Images are borderless unless a stroke is given.
        None if shape.kind == ShapeKind::Image => None,
        None => Some(StrokeStyle {
            color: escape_attr(&default_stroke_color),
            width: theme.stroke_width,
            dash: Vec::new(),
        }),
    };

    let default_size = match shape.kind {
        ShapeKind::Rect | ShapeKind::Text | ShapeKind::Stack => theme.font_size,
        _ => theme.small_font_size,
    };
    let default_text_color = if is_group {
        &theme.group_text_color
    } else {
        &theme.text_color
    };
    ShapeStyle {
        fill: escape_attr(cfg.fill.as_deref().unwrap_or(&theme.shape_fill)),
        fill_opacity: cfg.fill_opacity.filter(|v| *v < 1.0),
        stroke,
        opacity: cfg.opacity.filter(|v| *v < 1.0),
        radius: cfg.radius.unwrap_or(0.0),
        shadow: cfg.shadow.as_ref().and_then(|s| s.resolve()),
        text: TextStyle {
            size: cfg.font_size.unwrap_or(default_size),
            color: escape_attr(
                cfg.font_color
                    .as_deref()
                    .or(cfg.color.as_deref())
                    .unwrap_or(default_text_color),
            ),
            weight: escape_attr(&cfg.resolved_font_weight()),
            family: escape_attr(cfg.font_family.as_deref().unwrap_or(&theme.font_family)),
        },
    }
}

fn stroke_attrs(stroke: &Option<StrokeStyle>) -> String {
    match stroke {
        Some(s) => {
            let mut out = format!(" stroke=\"{}\" stroke-width=\"{}\"", s.color, s.width);
            if !s.dash.is_empty() {
                out.push_str(&format!(" stroke-dasharray=\"{}\"", dash_list(&s.dash)));
            }
            out
        }
        None => " stroke=\"none\"".to_string(),
    }
}

fn dash_list(dash: &[f32]) -> String {
    dash.iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn opacity_attr(style: &ShapeStyle) -> String {
    style
        .opacity
        .map(|v| format!(" opacity=\"{v}\""))
        .unwrap_or_default()
}

fn fill_opacity_attr(style: &ShapeStyle) -> String {
    match style.fill_opacity {
        Some(v) if style.fill != "none" => format!(" fill-opacity=\"{v}\""),
        _ => String::new(),
    }
}

fn points_attr(points: &[Point]) -> String {
    points
        .iter()
        .map(|p| format!("{:.2},{:.2}", p.0, p.1))
        .collect::<Vec<_>>()
        .join(" ")
}

fn path_data(commands: &[PathCommand]) -> String {
    let mut d = String::new();
    for command in commands {
        if !d.is_empty() {
            d.push(' ');
        }
        match command {
            PathCommand::MoveTo(p) => d.push_str(&format!("M {:.2} {:.2}", p.0, p.1)),
            PathCommand::LineTo(p) => d.push_str(&format!("L {:.2} {:.2}", p.0, p.1)),
            PathCommand::QuadTo { control, to } => d.push_str(&format!(
                "Q {:.2} {:.2} {:.2} {:.2}",
                control.0, control.1, to.0, to.1
            )),
            PathCommand::ArcTo { radius, sweep, to } => d.push_str(&format!(
                "A {:.2} {:.2} 0 0 {} {:.2} {:.2}",
                radius,
                radius,
                u8::from(*sweep),
                to.0,
                to.1
            )),
        }
    }
    d
}

fn offset_point(origin: Point, angle: f32, dist: f32) -> Point {
    (origin.0 + dist * angle.cos(), origin.1 + dist * angle.sin())
}

/// Arrowhead drawn with its tip at `tip`, pointing along `angle`.
fn head_svg(
    head: ArrowHead,
    tip: Point,
    angle: f32,
    size: f32,
    color: &str,
    line_width: f32,
) -> Option<String> {
    let outline = format!("fill=\"white\" stroke=\"{color}\" stroke-width=\"{line_width}\"");
    let solid = format!("fill=\"{color}\"");
    match head {
        ArrowHead::Triangle | ArrowHead::TriangleOpen => {
            let points = [
                tip,
                offset_point(tip, angle + PI * 0.82, size),
                offset_point(tip, angle - PI * 0.82, size),
            ];
            let paint = if head == ArrowHead::Triangle {
                &solid
            } else {
                &outline
            };
            Some(format!("<polygon points=\"{}\" {paint}/>", points_attr(&points)))
        }
        ArrowHead::Stealth => {
            let len = size * 1.2;
            let points = [
                tip,
                offset_point(tip, angle + PI * 0.88, len),
                offset_point(tip, angle + PI, len * 0.5),
                offset_point(tip, angle - PI * 0.88, len),
            ];
            Some(format!("<polygon points=\"{}\" {solid}/>", points_attr(&points)))
        }
        ArrowHead::Vee => {
            let points = [
                offset_point(tip, angle + PI * 0.78, size),
                tip,
                offset_point(tip, angle - PI * 0.78, size),
            ];
            Some(format!(
                "<polyline points=\"{}\" fill=\"none\" stroke=\"{color}\" stroke-width=\"{line_width}\" stroke-linejoin=\"round\"/>",
                points_attr(&points)
            ))
        }
        ArrowHead::Circle | ArrowHead::CircleOpen => {
            let r = size * 0.45;
            let center = offset_point(tip, angle, -r);
            let paint = if head == ArrowHead::Circle {
                &solid
            } else {
                &outline
            };
            Some(format!(
                "<circle cx=\"{:.2}\" cy=\"{:.2}\" r=\"{:.2}\" {paint}/>",
                center.0, center.1, r
            ))
        }
        ArrowHead::Diamond | ArrowHead::DiamondOpen => {
            let back = offset_point(tip, angle + PI, size);
            let mid = ((tip.0 + back.0) / 2.0, (tip.1 + back.1) / 2.0);
            let perp = angle + PI / 2.0;
            let half = size * 0.5;
            let points = [
                tip,
                offset_point(mid, perp, half),
                back,
                offset_point(mid, perp, -half),
            ];
            let paint = if head == ArrowHead::Diamond {
                &solid
            } else {
                &outline
            };
            Some(format!("<polygon points=\"{}\" {paint}/>", points_attr(&points)))
        }
        ArrowHead::Bar => {
            let perp = angle + PI / 2.0;
            let a = offset_point(tip, perp, size * 0.6);
            let b = offset_point(tip, perp, -size * 0.6);
            Some(format!(
                "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"{color}\" stroke-width=\"{}\"/>",
                a.0,
                a.1,
                b.0,
                b.1,
                line_width + 0.5
            ))
        }
        ArrowHead::Dot => Some(format!(
            "<circle cx=\"{:.2}\" cy=\"{:.2}\" r=\"{:.2}\" {solid}/>",
            tip.0,
            tip.1,
            size * 0.2
        )),
        ArrowHead::None => None,
    }
}

fn image_mime(src: &str) -> &'static str {
    let ext = Path::new(src)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        _ => "image/png",
    }
}

/// `data:` and remote sources pass through; local files are inlined as base64 data URIs.
pub fn embed_image(src: &str) -> Result<String> {
    if src.starts_with("data:") || src.starts_with("http://") || src.starts_with("https://") {
        return Ok(src.to_string());
    }
    let bytes = std::fs::read(src)
        .map_err(|err| anyhow::anyhow!("Failed to read image {src}: {err}"))?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{encoded}", image_mime(src)))
}

struct SvgWriter<'a> {
    doc: &'a Document,
    layout: &'a Layout,
    config: &'a Config,
    defs: Vec<String>,
    body: Vec<String>,
    text_layer: Vec<String>,
}

impl SvgWriter<'_> {
    fn theme(&self) -> &Theme {
        &self.config.theme
    }

    fn text(&mut self, label: &str, pos: Point, style: &TextStyle, anchor: &str) {
        let mut out = format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"{anchor}\" dominant-baseline=\"middle\" font-family=\"{}\" font-size=\"{}\" font-weight=\"{}\" fill=\"{}\">",
            pos.0, pos.1, style.family, style.size, style.weight, style.color
        );
        let segments = parse_markdown(label);
        if has_markup(&segments) {
            for segment in &segments {
                let text = escape_xml(&segment.text);
                let theme = &self.config.theme;
                match segment.style {
                    SegmentStyle::Plain => out.push_str(&format!("<tspan>{text}</tspan>")),
                    SegmentStyle::Bold => {
                        out.push_str(&format!("<tspan font-weight=\"bold\">{text}</tspan>"))
                    }
                    SegmentStyle::Italic => {
                        out.push_str(&format!("<tspan font-style=\"italic\">{text}</tspan>"))
                    }
                    SegmentStyle::Code => out.push_str(&format!(
                        "<tspan font-family=\"{}\">{text}</tspan>",
                        escape_attr(&theme.code_font)
                    )),
                    SegmentStyle::Math => out.push_str(&format!(
                        "<tspan font-family=\"{}\" font-style=\"italic\">{text}</tspan>",
                        escape_attr(&theme.math_font)
                    )),
                }
            }
        } else {
            out.push_str(&escape_xml(label));
        }
        out.push_str("</text>");
        self.text_layer.push(out);
    }

    fn shadow_filter(&mut self, shape: &Shape, style: &ShapeStyle) -> String {
        let Some(shadow) = &style.shadow else {
            return String::new();
        };
        let id = format!("shadow_{}", escape_attr(&shape.name));
        self.defs.push(format!(
            "<filter id=\"{id}\" x=\"-20%\" y=\"-20%\" width=\"140%\" height=\"140%\"><feDropShadow dx=\"{}\" dy=\"{}\" stdDeviation=\"{}\" flood-color=\"{}\"/></filter>",
            shadow.dx,
            shadow.dy,
            shadow.blur,
            escape_attr(&shadow.color)
        ));
        format!(" filter=\"url(#{id})\"")
    }

    fn element(&mut self, id: ShapeId) {
        let doc = self.doc;
        let shape = doc.shape(id);
        let b = self.layout.shape_bounds(id);
        let style = resolve_style(doc, shape, self.theme());
        self.body.push(format!("<g id=\"{}\">", escape_attr(&shape.name)));
        match shape.kind {
            ShapeKind::Rect => self.rect(shape, &b, &style),
            ShapeKind::Circle | ShapeKind::Sphere => self.circle(shape, &b, &style),
            ShapeKind::Text => {
                if !shape.label.is_empty() {
                    self.text(&shape.label, (b.x, b.y), &style.text, "middle");
                }
            }
            ShapeKind::Image => self.image(shape, &b, &style),
            ShapeKind::Diamond | ShapeKind::Trapezoid => self.polygon(shape, &b, &style),
            ShapeKind::Cylinder => self.cylinder(shape, &b, &style),
            ShapeKind::Cuboid => self.cuboid(shape, &b, &style),
            ShapeKind::Stack => self.stack(shape, &b, &style),
        }
        for child in &shape.children {
            self.element(*child);
        }
        self.body.push("</g>".to_string());
    }

    fn centered_label(&mut self, shape: &Shape, b: &Bounds, style: &ShapeStyle) {
        if !shape.label.is_empty() {
            self.text(&shape.label, b.center(), &style.text, "middle");
        }
    }

    fn rect(&mut self, shape: &Shape, b: &Bounds, style: &ShapeStyle) {
        let filter = self.shadow_filter(shape, style);
        let rx = if style.radius > 0.0 {
            format!(" rx=\"{}\"", style.radius)
        } else {
            String::new()
        };
        self.body.push(format!(
            "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\"{rx} fill=\"{}\"{}{}{}{filter}/>",
            b.x,
            b.y,
            b.width,
            b.height,
            style.fill,
            fill_opacity_attr(style),
            stroke_attrs(&style.stroke),
            opacity_attr(style),
        ));
        if shape.label.is_empty() {
            return;
        }
        let fs = style.text.size;
        if self.doc.is_group(shape.id) {
            self.text(&shape.label, (b.x + 10.0, b.y + fs + 2.0), &style.text, "start");
        } else if !shape.children.is_empty() {
            let pos = (b.x + b.width / 2.0, b.y + fs + 8.0);
            self.text(&shape.label, pos, &style.text, "middle");
        } else {
            self.centered_label(shape, b, style);
        }
    }

    fn circle(&mut self, shape: &Shape, b: &Bounds, style: &ShapeStyle) {
        let r = b.width / 2.0;
        let (cx, cy) = b.center();
        self.body.push(format!(
            "<circle cx=\"{cx:.2}\" cy=\"{cy:.2}\" r=\"{r:.2}\" fill=\"{}\"{}{}/>",
            style.fill,
            stroke_attrs(&style.stroke),
            opacity_attr(style),
        ));
        if shape.kind == ShapeKind::Sphere {
            let grad = format!("sphereGrad_{}", escape_attr(&shape.name));
            self.defs.push(format!(
                "<radialGradient id=\"{grad}\" cx=\"35%\" cy=\"35%\" r=\"65%\"><stop offset=\"0%\" stop-color=\"rgba(255,255,255,0.6)\"/><stop offset=\"100%\" stop-color=\"rgba(0,0,0,0)\"/></radialGradient>"
            ));
            self.body.push(format!(
                "<circle cx=\"{cx:.2}\" cy=\"{cy:.2}\" r=\"{r:.2}\" fill=\"url(#{grad})\" stroke=\"none\"/>"
            ));
        }
        self.centered_label(shape, b, style);
    }

    fn image(&mut self, shape: &Shape, b: &Bounds, style: &ShapeStyle) {
        let src = shape.config.src.as_deref().unwrap_or_default();
        let href = embed_image(src).unwrap_or_else(|err| {
            tracing::warn!(%err, "image left as a plain reference");
            src.to_string()
        });
        let mut attrs = format!(
            "href=\"{}\" x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" preserveAspectRatio=\"xMidYMid slice\"",
            escape_xml(&href),
            b.x,
            b.y,
            b.width,
            b.height
        );
        let rx = if style.radius > 0.0 {
            let clip = format!("clip_{}", escape_attr(&shape.name));
            self.defs.push(format!(
                "<clipPath id=\"{clip}\"><rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"{}\"/></clipPath>",
                b.x, b.y, b.width, b.height, style.radius
            ));
            attrs.push_str(&format!(" clip-path=\"url(#{clip})\""));
            format!(" rx=\"{}\"", style.radius)
        } else {
            String::new()
        };
        attrs.push_str(&opacity_attr(style));
        self.body.push(format!("<image {attrs}/>"));
        if style.stroke.is_some() {
            self.body.push(format!(
                "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"none\"{}{rx}/>",
                b.x,
                b.y,
                b.width,
                b.height,
                stroke_attrs(&style.stroke)
            ));
        }
        if !shape.label.is_empty() {
            let pos = (b.x + b.width / 2.0, b.bottom() + style.text.size + 4.0);
            self.text(&shape.label, pos, &style.text, "middle");
        }
    }

    fn polygon(&mut self, shape: &Shape, b: &Bounds, style: &ShapeStyle) {
        let (cx, cy) = b.center();
        let points = if shape.kind == ShapeKind::Diamond {
            vec![(cx, b.y), (b.right(), cy), (cx, b.bottom()), (b.x, cy)]
        } else {
            let inset = b.width * (1.0 - shape.top_ratio()) / 2.0;
            vec![
                (b.x + inset, b.y),
                (b.right() - inset, b.y),
                (b.right(), b.bottom()),
                (b.x, b.bottom()),
            ]
        };
        self.body.push(format!(
            "<polygon points=\"{}\" fill=\"{}\"{}{}/>",
            points_attr(&points),
            style.fill,
            stroke_attrs(&style.stroke),
            opacity_attr(style),
        ));
        self.centered_label(shape, b, style);
    }

    fn cylinder(&mut self, shape: &Shape, b: &Bounds, style: &ShapeStyle) {
        let filter = self.shadow_filter(shape, style);
        let ry = b.height * shape.cylinder_depth();
        let rx = b.width / 2.0;
        let top = b.y + ry;
        let bottom = b.bottom() - ry;
        let body = format!(
            "M {:.2} {top:.2} L {:.2} {bottom:.2} A {rx:.2} {ry:.2} 0 0 0 {:.2} {bottom:.2} L {:.2} {top:.2} A {rx:.2} {ry:.2} 0 0 1 {:.2} {top:.2}",
            b.x,
            b.x,
            b.right(),
            b.right(),
            b.x
        );
        let grad = format!("cylGrad_{}", escape_attr(&shape.name));
        self.defs.push(format!(
            "<linearGradient id=\"{grad}\" x1=\"0\" y1=\"0\" x2=\"1\" y2=\"0\"><stop offset=\"0%\" stop-color=\"rgba(0,0,0,0.1)\"/><stop offset=\"50%\" stop-color=\"rgba(0,0,0,0)\"/><stop offset=\"100%\" stop-color=\"rgba(0,0,0,0.1)\"/></linearGradient>"
        ));
        self.body.push(format!(
            "<path d=\"{body}\" fill=\"{}\"{}{}{filter}/>",
            style.fill,
            stroke_attrs(&style.stroke),
            opacity_attr(style),
        ));
        self.body.push(format!(
            "<path d=\"{body}\" fill=\"url(#{grad})\" stroke=\"none\"/>"
        ));
        self.body.push(format!(
            "<ellipse cx=\"{:.2}\" cy=\"{top:.2}\" rx=\"{rx:.2}\" ry=\"{ry:.2}\" fill=\"{}\"{}/>",
            b.x + rx,
            style.fill,
            stroke_attrs(&style.stroke),
        ));
        if !shape.label.is_empty() {
            let pos = (b.x + rx, (top + bottom) / 2.0);
            self.text(&shape.label, pos, &style.text, "middle");
        }
    }

    fn cuboid(&mut self, shape: &Shape, b: &Bounds, style: &ShapeStyle) {
        let filter = self.shadow_filter(shape, style);
        let d = shape.cuboid_depth();
        let stroke = stroke_attrs(&style.stroke);
        let right = points_attr(&[
            (b.right(), b.y),
            (b.right() + d, b.y - d),
            (b.right() + d, b.bottom() - d),
            (b.right(), b.bottom()),
        ]);
        let top = points_attr(&[
            (b.x, b.y),
            (b.x + d, b.y - d),
            (b.right() + d, b.y - d),
            (b.right(), b.y),
        ]);
        self.body.push(format!(
            "<polygon points=\"{right}\" fill=\"{}\"{stroke}{filter}/>",
            style.fill
        ));
        self.body.push(format!(
            "<polygon points=\"{right}\" fill=\"rgba(0,0,0,0.15)\" stroke=\"none\"/>"
        ));
        self.body
            .push(format!("<polygon points=\"{top}\" fill=\"{}\"{stroke}/>", style.fill));
        self.body.push(format!(
            "<polygon points=\"{top}\" fill=\"rgba(0,0,0,0.08)\" stroke=\"none\"/>"
        ));
        let rx = if style.radius > 0.0 {
            format!(" rx=\"{}\"", style.radius)
        } else {
            String::new()
        };
        self.body.push(format!(
            "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\"{rx} fill=\"{}\"{stroke}{}/>",
            b.x,
            b.y,
            b.width,
            b.height,
            style.fill,
            opacity_attr(style),
        ));
        self.centered_label(shape, b, style);
    }

    fn stack(&mut self, shape: &Shape, b: &Bounds, style: &ShapeStyle) {
        let filter = self.shadow_filter(shape, style);
        let count = shape.stack_count();
        let (dx, dy) = shape.stack_offset();
        let rx = if style.radius > 0.0 {
            format!(" rx=\"{}\"", style.radius)
        } else {
            String::new()
        };
        for i in (0..count).rev() {
            let layer = b.translate(dx * i as f32, dy * i as f32);
            // only the back layer casts the shadow
            let layer_filter = if i + 1 == count { filter.as_str() } else { "" };
            self.body.push(format!(
                "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\"{rx} fill=\"{}\"{}{}{}{layer_filter}/>",
                layer.x,
                layer.y,
                layer.width,
                layer.height,
                style.fill,
                fill_opacity_attr(style),
                stroke_attrs(&style.stroke),
                opacity_attr(style),
            ));
        }
        self.centered_label(shape, b, style);
    }

    fn connector_paint(&self, config: &ArrowConfig) -> (String, f32, String) {
        let color = escape_attr(
            config
                .color
                .as_deref()
                .unwrap_or(&self.theme().line_color),
        );
        let width = config.width.unwrap_or(self.config.layout.routing.line_width);
        let dash = config
            .style
            .dash_array()
            .map(|d| format!(" stroke-dasharray=\"{d}\""))
            .unwrap_or_default();
        (color, width, dash)
    }

    fn route_outline(&mut self, route: &Route, color: &str, width: f32, dash: &str) {
        let paint = format!("fill=\"none\" stroke=\"{color}\" stroke-width=\"{width}\"{dash}");
        let line = match &route.geometry {
            RouteGeometry::Line { start, end } => format!(
                "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"{color}\" stroke-width=\"{width}\"{dash}/>",
                start.0, start.1, end.0, end.1
            ),
            RouteGeometry::Polyline { points } if route.corner_radius <= 0.0 => {
                format!("<polyline points=\"{}\" {paint}/>", points_attr(points))
            }
            _ => format!("<path d=\"{}\" {paint}/>", path_data(&path_commands(route))),
        };
        self.body.push(line);
    }

    fn arrows(&mut self) {
        let (doc, layout) = (self.doc, self.layout);
        let labels_size = self.config.layout.labels.font_size;
        for arrow in &layout.arrows {
            let config = &doc.arrows()[arrow.index].config;
            let (color, width, dash) = self.connector_paint(config);
            let size = config
                .head_size
                .unwrap_or(self.config.layout.routing.head_size);
            let route = &arrow.route;

            self.body.push("<g class=\"flowing-arrow\">".to_string());
            self.route_outline(route, &color, width, &dash);
            if let Some(head) = head_svg(config.head, route.to, route.end_angle, size, &color, width)
            {
                self.body.push(head);
            }
            if config.bidirectional
                && let Some(tail) =
                    head_svg(config.head, route.from, route.start_angle + PI, size, &color, width)
            {
                self.body.push(tail);
            }
            self.body.push("</g>".to_string());

            if let Some(LabelLayout { text, position, .. }) = &arrow.label {
                let style = TextStyle {
                    size: labels_size,
                    color: color.clone(),
                    weight: "normal".to_string(),
                    family: escape_attr(&self.theme().font_family),
                };
                self.text(text, *position, &style, "middle");
            }
        }
    }

    fn forks(&mut self) {
        let (doc, layout) = (self.doc, self.layout);
        for fork in &layout.forks {
            let config = &doc.forks()[fork.index].config;
            let (color, width, dash) = self.connector_paint(config);
            let size = config
                .head_size
                .unwrap_or(self.config.layout.routing.head_size);
            self.body.push("<g class=\"flowing-fork\">".to_string());
            for branch in &fork.branches {
                self.route_outline(branch, &color, width, &dash);
                if let Some(head) =
                    head_svg(config.head, branch.to, branch.end_angle, size, &color, width)
                {
                    self.body.push(head);
                }
            }
            self.body.push("</g>".to_string());
        }
    }
}

/// Canvas origin and size: the declared canvas, or the content bounds plus
/// `margin` when fitting.
pub fn view_box(layout: &Layout, config: &RenderConfig) -> Bounds {
    if config.fit {
        let cb = layout.content_bounds;
        Bounds::new(
            round2(cb.x - config.margin),
            round2(cb.y - config.margin),
            round2(cb.width + config.margin * 2.0),
            round2(cb.height + config.margin * 2.0),
        )
    } else {
        Bounds::new(0.0, 0.0, layout.width, layout.height)
    }
}

pub fn render_svg(doc: &Document, layout: &Layout, config: &Config) -> String {
    let mut writer = SvgWriter {
        doc,
        layout,
        config,
        defs: Vec::new(),
        body: Vec::new(),
        text_layer: Vec::new(),
    };

    for id in doc.roots() {
        writer.element(*id);
    }
    writer.arrows();
    writer.forks();

    let view = view_box(layout, &config.render);
    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" viewBox=\"{} {} {} {}\">",
        view.width, view.height, view.x, view.y, view.width, view.height
    ));

    let mut defs: Vec<String> = config
        .render
        .font_imports
        .iter()
        .map(|url| format!("<style>@import url('{}');</style>", escape_xml(url)))
        .collect();
    defs.append(&mut writer.defs);
    if !defs.is_empty() {
        svg.push_str("<defs>");
        for def in &defs {
            svg.push_str(def);
        }
        svg.push_str("</defs>");
    }

    let background = config.render.background.as_str();
    if background != "none" && background != "transparent" {
        svg.push_str(&format!(
            "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{}\"/>",
            view.x,
            view.y,
            view.width,
            view.height,
            escape_attr(background)
        ));
    }
    for part in writer.body.iter().chain(writer.text_layer.iter()) {
        svg.push_str(part);
    }
    svg.push_str("</svg>");
    svg
}

pub fn write_output_svg(svg: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, svg)?;
        }
        None => {
            print!("{}", svg);
        }
    }
    Ok(())
}

#[cfg(feature = "png")]
pub fn write_output_png(svg: &str, output: &Path, render_cfg: &RenderConfig) -> Result<()> {
    let mut opt = usvg::Options::default();
    opt.font_family = "Inter".to_string();
    opt.default_size = usvg::Size::from_wh(render_cfg.width, render_cfg.height)
        .ok_or_else(|| anyhow::anyhow!("Invalid canvas size"))?;
    opt.fontdb_mut().load_system_fonts();

    let tree = usvg::Tree::from_str(svg, &opt)?;
    let scale = if render_cfg.scale > 0.0 {
        render_cfg.scale
    } else {
        1.0
    };
    let size = tree.size();
    let width = (size.width() * scale).ceil() as u32;
    let height = (size.height() * scale).ceil() as u32;
    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| anyhow::anyhow!("Failed to allocate pixmap"))?;

    let mut pixmap_mut = pixmap.as_mut();
    resvg::render(
        &tree,
        resvg::tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap_mut,
    );
    pixmap.save_png(output)?;
    Ok(())
}

#[cfg(not(feature = "png"))]
pub fn write_output_png(_svg: &str, _output: &Path, _render_cfg: &RenderConfig) -> Result<()> {
    Err(anyhow::anyhow!("PNG output requires the `png` feature"))
}

pub(crate) fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Escapes a double-quoted attribute value. Single quotes stay as-is so font
/// stacks like `'Fira Code', monospace` read naturally.
fn escape_attr(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArrowConfig, GroupConfig, ShapeConfig, ShadowSpec, Side, Stroke};
    use crate::layout::compute_layout;

    fn render(doc: &Document, config: &Config) -> String {
        let layout = compute_layout(doc, &config.layout);
        render_svg(doc, &layout, config)
    }

    #[test]
    fn render_svg_basic() {
        let mut doc = Document::new(400.0, 200.0);
        let a = doc.rect("Alpha", ShapeConfig::at(20.0, 20.0).with_size(100.0, 40.0));
        let b = doc.rect("Beta", ShapeConfig::at(250.0, 20.0).with_size(100.0, 40.0));
        doc.arrow(a, b, ArrowConfig::default().with_label("go"))
            .unwrap();
        let svg = render(&doc, &Config::default());
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("viewBox=\"0 0 400 200\""));
        assert!(svg.contains("<g id=\"rect_1\">"));
        assert!(svg.contains(">Alpha</text>"));
        assert!(svg.contains("class=\"flowing-arrow\""));
        assert!(svg.contains(">go</text>"));
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn labels_are_drawn_after_every_shape() {
        let mut doc = Document::new(400.0, 200.0);
        doc.rect("First", ShapeConfig::at(0.0, 0.0).with_size(80.0, 40.0));
        doc.rect("Second", ShapeConfig::at(200.0, 0.0).with_size(80.0, 40.0));
        let svg = render(&doc, &Config::default());
        let last_shape = svg.rfind("<rect").unwrap();
        let first_text = svg.find("<text").unwrap();
        assert!(first_text > last_shape);
    }

    #[test]
    fn children_nest_inside_parent_group() {
        let mut doc = Document::new(400.0, 300.0);
        let outer = doc.rect("Outer", ShapeConfig::at(0.0, 0.0).with_size(300.0, 200.0));
        doc.add_child(
            outer,
            ShapeKind::Rect,
            "Inner",
            ShapeConfig::at(10.0, 40.0).with_size(80.0, 40.0),
        )
        .unwrap();
        let svg = render(&doc, &Config::default());
        assert!(svg.contains("<g id=\"rect_1\"><rect"));
        let inner = svg.find("<g id=\"rect_2\">").unwrap();
        let outer_close = svg.find("</g></g>").unwrap();
        assert!(inner < outer_close);
        // labelled parents put their label in the top band
        assert!(svg.contains("x=\"150.00\" y=\"22.00\""));
    }

    #[test]
    fn group_label_sits_top_left() {
        let mut doc = Document::new(400.0, 300.0);
        let a = doc.rect("A", ShapeConfig::at(100.0, 100.0).with_size(80.0, 40.0));
        doc.group(
            &[a],
            GroupConfig {
                label: Some("Tier".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        let config = Config {
            layout: crate::config::LayoutConfig {
                auto_align: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let svg = render(&doc, &config);
        assert!(svg.contains("text-anchor=\"start\""));
        assert!(svg.contains("stroke-dasharray=\"6 3\""));
        assert!(svg.contains(">Tier</text>"));
    }

    #[test]
    fn shadow_and_background_go_into_defs() {
        let mut doc = Document::new(200.0, 100.0);
        doc.rect(
            "",
            ShapeConfig {
                shadow: Some(ShadowSpec::Enabled(true)),
                ..ShapeConfig::at(10.0, 10.0).with_size(50.0, 30.0)
            },
        );
        let mut config = Config::default();
        config.render.background = "#fff".to_string();
        let svg = render(&doc, &config);
        let defs = svg.find("<defs>").unwrap();
        assert!(defs < svg.find("<filter id=\"shadow_rect_1\"").unwrap());
        assert!(svg.contains("filter=\"url(#shadow_rect_1)\""));
        assert!(svg.contains("fill=\"#fff\"/>"));
    }

    #[test]
    fn stroke_none_and_dashes() {
        let mut doc = Document::new(200.0, 100.0);
        doc.rect(
            "",
            ShapeConfig {
                stroke: Some(Stroke::color("none")),
                ..ShapeConfig::at(0.0, 0.0).with_size(50.0, 30.0)
            },
        );
        doc.rect(
            "",
            ShapeConfig {
                stroke: Some(Stroke {
                    color: Some("red".to_string()),
                    width: Some(2.0),
                    dash: vec![4.0, 2.0],
                }),
                ..ShapeConfig::at(100.0, 0.0).with_size(50.0, 30.0)
            },
        );
        let svg = render(&doc, &Config::default());
        assert!(svg.contains("stroke=\"none\""));
        assert!(svg.contains("stroke=\"red\" stroke-width=\"2\" stroke-dasharray=\"4 2\""));
    }

    #[test]
    fn markdown_labels_become_tspans() {
        let mut doc = Document::new(200.0, 100.0);
        doc.rect(
            "**Bold** and `code`",
            ShapeConfig::at(0.0, 0.0).with_size(150.0, 40.0),
        );
        let svg = render(&doc, &Config::default());
        assert!(svg.contains("<tspan font-weight=\"bold\">Bold</tspan>"));
        assert!(svg.contains("<tspan font-family=\"'JetBrains Mono', 'Fira Code', Menlo, monospace\">code</tspan>"));
    }

    #[test]
    fn fit_crops_view_box_to_content() {
        let mut doc = Document::new(800.0, 400.0);
        doc.rect("", ShapeConfig::at(100.0, 50.0).with_size(100.0, 60.0));
        let mut config = Config::default();
        config.render.fit = true;
        config.render.margin = 10.0;
        let svg = render(&doc, &config);
        assert!(svg.contains("width=\"120\" height=\"80\" viewBox=\"90 40 120 80\""));
    }

    #[test]
    fn bidirectional_arrow_draws_both_heads() {
        let mut doc = Document::new(400.0, 200.0);
        let a = doc.rect("", ShapeConfig::at(0.0, 0.0).with_size(80.0, 40.0));
        let b = doc.rect("", ShapeConfig::at(200.0, 0.0).with_size(80.0, 40.0));
        doc.arrow(
            a,
            b,
            ArrowConfig {
                bidirectional: true,
                ..ArrowConfig::default().with_anchors(Side::Right, Side::Left)
            },
        )
        .unwrap();
        let svg = render(&doc, &Config::default());
        assert_eq!(svg.matches("<polygon").count(), 2);
        // tip of the tail head sits on the source anchor
        assert!(svg.contains("points=\"80.00,20.00"));
    }

    #[test]
    fn head_shapes() {
        assert!(head_svg(ArrowHead::None, (0.0, 0.0), 0.0, 8.0, "#000", 1.5).is_none());
        let dot = head_svg(ArrowHead::Dot, (10.0, 10.0), 0.0, 10.0, "#000", 1.5).unwrap();
        assert_eq!(dot, "<circle cx=\"10.00\" cy=\"10.00\" r=\"2.00\" fill=\"#000\"/>");
        let circle = head_svg(ArrowHead::CircleOpen, (10.0, 0.0), 0.0, 10.0, "#000", 1.5).unwrap();
        assert!(circle.starts_with("<circle cx=\"5.50\" cy=\"0.00\" r=\"4.50\" fill=\"white\""));
        let bar = head_svg(ArrowHead::Bar, (0.0, 0.0), 0.0, 10.0, "#000", 1.5).unwrap();
        assert!(bar.contains("y1=\"6.00\"") && bar.contains("stroke-width=\"2\""));
    }

    #[test]
    fn rounded_polyline_becomes_arc_path() {
        let mut doc = Document::new(400.0, 300.0);
        let a = doc.rect("", ShapeConfig::at(0.0, 0.0).with_size(80.0, 40.0));
        let b = doc.rect("", ShapeConfig::at(200.0, 150.0).with_size(80.0, 40.0));
        doc.arrow(
            a,
            b,
            ArrowConfig {
                corner_radius: 6.0,
                ..ArrowConfig::polyline().with_anchors(Side::Right, Side::Left)
            },
        )
        .unwrap();
        let svg = render(&doc, &Config::default());
        assert!(svg.contains("<path d=\"M 80.00 20.00"));
        assert!(svg.contains(" A 6.00 6.00 0 0 "));
    }

    #[test]
    fn data_uri_images_pass_through() {
        assert_eq!(embed_image("data:image/png;base64,AAA").unwrap(), "data:image/png;base64,AAA");
        assert_eq!(embed_image("https://x/y.png").unwrap(), "https://x/y.png");
        assert_eq!(image_mime("a/b.JPG"), "image/jpeg");
        assert_eq!(image_mime("noext"), "image/png");
    }

    #[test]
    fn local_images_are_inlined() {
        let path = std::env::temp_dir().join("flowing_render_test.svg");
        std::fs::write(&path, b"<svg/>").unwrap();
        let uri = embed_image(path.to_str().unwrap()).unwrap();
        assert_eq!(uri, "data:image/svg+xml;base64,PHN2Zy8+");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn font_imports_lead_defs() {
        let doc = Document::new(100.0, 100.0);
        let mut config = Config::default();
        config.render.font_imports = vec!["https://fonts.example/a.css".to_string()];
        let svg = render(&doc, &config);
        assert!(svg.contains("<defs><style>@import url('https://fonts.example/a.css');</style>"));
    }

    #[test]
    fn user_text_and_paint_are_escaped() {
        let mut doc = Document::new(400.0, 200.0);
        let mut cfg = ShapeConfig::at(0.0, 0.0).with_size(100.0, 40.0);
        cfg.fill = Some("red\" onload=\"x".to_string());
        cfg.font_family = Some("A<B> & \"C\"".to_string());
        let a = doc.rect("a < b & \"c\"", cfg);
        let b = doc.rect("B", ShapeConfig::at(200.0, 0.0).with_size(100.0, 40.0));
        doc.arrow(
            a,
            b,
            ArrowConfig {
                color: Some("blue\"/><script".to_string()),
                ..ArrowConfig::default().with_label("x<y")
            },
        )
        .unwrap();
        let svg = render(&doc, &Config::default());

        assert!(svg.contains("fill=\"red&quot; onload=&quot;x\""));
        assert!(svg.contains("font-family=\"A&lt;B&gt; &amp; &quot;C&quot;\""));
        assert!(svg.contains(">a &lt; b &amp; &quot;c&quot;</text>"));
        assert!(svg.contains("stroke=\"blue&quot;/&gt;&lt;script\""));
        assert!(svg.contains(">x&lt;y</text>"));
        assert!(!svg.contains("<script"));
        assert!(!svg.contains("onload=\"x"));
    }

    #[test]
    fn escape_xml_handles_specials() {
        assert_eq!(escape_xml("a<b>&\"'"), "a&lt;b&gt;&amp;&quot;&apos;");
    }
}
