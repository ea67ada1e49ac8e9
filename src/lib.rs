#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod ir;
pub mod layout;
pub mod layout_dump;
pub mod markdown;
pub mod parser;
pub mod render;
pub mod theme;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, LayoutConfig, RenderConfig};
pub use error::DiagramError;
pub use ir::{
    AnchorSpec, ArrowConfig, ArrowHead, Document, GroupConfig, LineStyle, PathKind, ShapeConfig,
    ShapeId, ShapeKind, Side,
};
pub use layout::{GridOptions, Layout, compute_layout};
pub use parser::{CanvasSize, DiagramOverrides, parse_diagram, parse_diagram_sized};
pub use render::render_svg;
pub use theme::Theme;

/// Renders a JSON/JSON5 diagram description to SVG with default settings.
pub fn render(source: &str) -> anyhow::Result<String> {
    render_with_config(source, Config::default())
}

/// Renders a description, letting its own options override `config`.
pub fn render_with_config(source: &str, mut config: Config) -> anyhow::Result<String> {
    let parsed = parse_diagram(source, &config)?;
    parsed.overrides.apply(&mut config);
    let layout = compute_layout(&parsed.document, &config.layout);
    Ok(render_svg(&parsed.document, &layout, &config))
}

/// Builds a document in code and renders it in one call.
pub fn render_document(doc: &Document, config: &Config) -> String {
    let layout = compute_layout(doc, &config.layout);
    render_svg(doc, &layout, config)
}
