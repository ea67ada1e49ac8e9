use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub font_family: String,
    pub math_font: String,
    pub code_font: String,
    /// Label size for rectangles, text and stacks.
    pub font_size: f32,
    /// Label size for every other shape kind.
    pub small_font_size: f32,
    pub shape_fill: String,
    pub stroke_color: String,
    pub stroke_width: f32,
    pub text_color: String,
    pub line_color: String,
    pub group_stroke: String,
    pub group_text_color: String,
    pub background: String,
}

impl Theme {
    pub fn classic() -> Self {
        Self {
            font_family: "Inter, system-ui, -apple-system, sans-serif".to_string(),
            math_font: "'Times New Roman', 'Latin Modern Math', serif".to_string(),
            code_font: "'JetBrains Mono', 'Fira Code', Menlo, monospace".to_string(),
            font_size: 14.0,
            small_font_size: 12.0,
            shape_fill: "#f5f5f5".to_string(),
            stroke_color: "#333333".to_string(),
            stroke_width: 1.5,
            text_color: "#333333".to_string(),
            line_color: "#333333".to_string(),
            group_stroke: "#999".to_string(),
            group_text_color: "#999".to_string(),
            background: "none".to_string(),
        }
    }

    pub fn modern() -> Self {
        Self {
            font_family: "Inter, Segoe UI, system-ui, -apple-system, sans-serif".to_string(),
            math_font: "'Latin Modern Math', 'Times New Roman', serif".to_string(),
            code_font: "'JetBrains Mono', Menlo, monospace".to_string(),
            font_size: 13.0,
            small_font_size: 12.0,
            shape_fill: "#F8FAFF".to_string(),
            stroke_color: "#C7D2E5".to_string(),
            stroke_width: 1.5,
            text_color: "#1C2430".to_string(),
            line_color: "#7A8AA6".to_string(),
            group_stroke: "#D7E0F0".to_string(),
            group_text_color: "#7A8AA6".to_string(),
            background: "#FFFFFF".to_string(),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "classic" | "default" => Some(Self::classic()),
            "modern" => Some(Self::modern()),
            _ => None,
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::classic()
    }
}
