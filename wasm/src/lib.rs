use flowing::{Config, Theme, render_with_config};
use serde::Deserialize;
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlowingRenderOptions {
    theme: Option<String>,
    font_family: Option<String>,
    font_size: Option<f32>,
    fit: Option<bool>,
    margin: Option<f32>,
    auto_align: Option<bool>,
    anti_overlap: Option<bool>,
}

fn build_config(options: FlowingRenderOptions) -> Config {
    let mut config = Config::default();
    if let Some(theme) = options.theme.as_deref().and_then(Theme::from_name) {
        config.theme = theme;
    }
    if let Some(font_family) = options.font_family {
        config.theme.font_family = font_family;
    }
    if let Some(font_size) = options.font_size {
        config.theme.font_size = font_size;
    }
    if let Some(fit) = options.fit {
        config.render.fit = fit;
    }
    if let Some(margin) = options.margin {
        config.render.margin = margin;
    }
    if let Some(auto_align) = options.auto_align {
        config.layout.auto_align = auto_align;
    }
    if let Some(anti_overlap) = options.anti_overlap {
        config.layout.anti_overlap = anti_overlap;
    }
    config
}

#[wasm_bindgen]
pub fn render_flowing_svg(source: &str, options_json: Option<String>) -> Result<String, JsValue> {
    let options = if let Some(raw_options) = options_json {
        serde_json::from_str::<FlowingRenderOptions>(&raw_options)
            .map_err(|error| JsValue::from_str(&error.to_string()))?
    } else {
        FlowingRenderOptions::default()
    };

    render_with_config(source, build_config(options))
        .map_err(|error| JsValue::from_str(&error.to_string()))
}
