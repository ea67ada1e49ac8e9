use crate::theme::Theme;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Connector routing defaults. Per-arrow `curve` overrides the matching distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Step-away distance for vertical exits, U-wraps and fork stems.
    pub polyline_gap: f32,
    /// Outward distance of a same-side bypass past the farthest endpoint.
    pub bypass_distance: f32,
    /// Perpendicular control-point offset of curved connectors.
    pub curve_bend: f32,
    pub head_size: f32,
    pub line_width: f32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            polyline_gap: 25.0,
            bypass_distance: 30.0,
            curve_bend: 40.0,
            head_size: 8.0,
            line_width: 1.5,
        }
    }
}

/// Connector label sizing and collision search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    pub font_size: f32,
    pub char_width_ratio: f32,
    pub line_height: f32,
    /// Default upward shift of a label from its route anchor.
    pub lift: f32,
    pub search_start: f32,
    pub search_step: f32,
    pub search_limit: f32,
    pub canvas_margin: f32,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            font_size: 11.0,
            char_width_ratio: 0.6,
            line_height: 1.4,
            lift: 8.0,
            search_start: 15.0,
            search_step: 10.0,
            search_limit: 60.0,
            canvas_margin: 4.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub auto_align: bool,
    pub anti_overlap: bool,
    /// Row/column clustering tolerance in px.
    pub align_tolerance: f32,
    /// Maximum x-center spread of fan targets that count as one column.
    pub fan_tolerance: f32,
    pub routing: RoutingConfig,
    pub labels: LabelConfig,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            auto_align: true,
            anti_overlap: true,
            align_tolerance: 20.0,
            fan_tolerance: 40.0,
            routing: RoutingConfig::default(),
            labels: LabelConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Canvas size used when a diagram does not declare its own.
    pub width: f32,
    pub height: f32,
    pub background: String,
    /// Crop the viewBox to the content bounds.
    pub fit: bool,
    pub margin: f32,
    /// Raster scale factor for PNG export.
    pub scale: f32,
    /// Stylesheet URLs emitted as `@import` rules.
    pub font_imports: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 400.0,
            background: "none".to_string(),
            fit: false,
            margin: 20.0,
            scale: 2.0,
            font_imports: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub theme: Theme,
    pub layout: LayoutConfig,
    pub render: RenderConfig,
}

impl Default for Config {
    fn default() -> Self {
        let theme = Theme::classic();
        let render = RenderConfig {
            background: theme.background.clone(),
            ..Default::default()
        };
        Self {
            theme,
            layout: LayoutConfig::default(),
            render,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThemeVariables {
    font_family: Option<String>,
    font_size: Option<f32>,
    small_font_size: Option<f32>,
    math_font: Option<String>,
    code_font: Option<String>,
    shape_fill: Option<String>,
    stroke_color: Option<String>,
    stroke_width: Option<f32>,
    text_color: Option<String>,
    line_color: Option<String>,
    group_stroke: Option<String>,
    group_text_color: Option<String>,
    background: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutingConfigFile {
    polyline_gap: Option<f32>,
    bypass_distance: Option<f32>,
    curve_bend: Option<f32>,
    head_size: Option<f32>,
    line_width: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LabelConfigFile {
    font_size: Option<f32>,
    char_width_ratio: Option<f32>,
    line_height: Option<f32>,
    lift: Option<f32>,
    search_start: Option<f32>,
    search_step: Option<f32>,
    search_limit: Option<f32>,
    canvas_margin: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutConfigFile {
    auto_align: Option<bool>,
    anti_overlap: Option<bool>,
    align_tolerance: Option<f32>,
    fan_tolerance: Option<f32>,
    routing: Option<RoutingConfigFile>,
    labels: Option<LabelConfigFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderConfigFile {
    width: Option<f32>,
    height: Option<f32>,
    fit: Option<bool>,
    margin: Option<f32>,
    scale: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    theme: Option<String>,
    theme_variables: Option<ThemeVariables>,
    layout: Option<LayoutConfigFile>,
    render: Option<RenderConfigFile>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = Config::default();
    let Some(path) = path else {
        return Ok(config);
    };

    let contents = std::fs::read_to_string(path)?;
    let parsed: ConfigFile = serde_json::from_str(&contents)?;
    Ok(merge_config_file(config, parsed))
}

fn merge_config_file(mut config: Config, parsed: ConfigFile) -> Config {
    if let Some(theme) = parsed.theme.as_deref().and_then(Theme::from_name) {
        config.render.background = theme.background.clone();
        config.theme = theme;
    }

    if let Some(vars) = parsed.theme_variables {
        if let Some(v) = vars.font_family {
            config.theme.font_family = v;
        }
        if let Some(v) = vars.font_size {
            config.theme.font_size = v;
        }
        if let Some(v) = vars.small_font_size {
            config.theme.small_font_size = v;
        }
        if let Some(v) = vars.math_font {
            config.theme.math_font = v;
        }
        if let Some(v) = vars.code_font {
            config.theme.code_font = v;
        }
        if let Some(v) = vars.shape_fill {
            config.theme.shape_fill = v;
        }
        if let Some(v) = vars.stroke_color {
            config.theme.stroke_color = v;
        }
        if let Some(v) = vars.stroke_width {
            config.theme.stroke_width = v;
        }
        if let Some(v) = vars.text_color {
            config.theme.text_color = v;
        }
        if let Some(v) = vars.line_color {
            config.theme.line_color = v;
        }
        if let Some(v) = vars.group_stroke {
            config.theme.group_stroke = v;
        }
        if let Some(v) = vars.group_text_color {
            config.theme.group_text_color = v;
        }
        if let Some(v) = vars.background {
            config.theme.background = v.clone();
            config.render.background = v;
        }
    }

    if let Some(layout) = parsed.layout {
        if let Some(v) = layout.auto_align {
            config.layout.auto_align = v;
        }
        if let Some(v) = layout.anti_overlap {
            config.layout.anti_overlap = v;
        }
        if let Some(v) = layout.align_tolerance {
            config.layout.align_tolerance = v;
        }
        if let Some(v) = layout.fan_tolerance {
            config.layout.fan_tolerance = v;
        }
        if let Some(routing) = layout.routing {
            let target = &mut config.layout.routing;
            if let Some(v) = routing.polyline_gap {
                target.polyline_gap = v;
            }
            if let Some(v) = routing.bypass_distance {
                target.bypass_distance = v;
            }
            if let Some(v) = routing.curve_bend {
                target.curve_bend = v;
            }
            if let Some(v) = routing.head_size {
                target.head_size = v;
            }
            if let Some(v) = routing.line_width {
                target.line_width = v;
            }
        }
        if let Some(labels) = layout.labels {
            let target = &mut config.layout.labels;
            if let Some(v) = labels.font_size {
                target.font_size = v;
            }
            if let Some(v) = labels.char_width_ratio {
                target.char_width_ratio = v;
            }
            if let Some(v) = labels.line_height {
                target.line_height = v;
            }
            if let Some(v) = labels.lift {
                target.lift = v;
            }
            if let Some(v) = labels.search_start {
                target.search_start = v;
            }
            if let Some(v) = labels.search_step {
                target.search_step = v.max(1.0);
            }
            if let Some(v) = labels.search_limit {
                target.search_limit = v;
            }
            if let Some(v) = labels.canvas_margin {
                target.canvas_margin = v;
            }
        }
    }

    if let Some(render) = parsed.render {
        if let Some(v) = render.width {
            config.render.width = v;
        }
        if let Some(v) = render.height {
            config.render.height = v;
        }
        if let Some(v) = render.fit {
            config.render.fit = v;
        }
        if let Some(v) = render.margin {
            config.render.margin = v;
        }
        if let Some(v) = render.scale {
            config.render.scale = v;
        }
    }

    config
}
