use crate::config::{Config, load_config};
use crate::layout::compute_layout;
use crate::layout_dump::write_layout_dump;
use crate::parser::{CanvasSize, parse_diagram_sized};
use crate::render::{render_svg, write_output_png, write_output_svg};
use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "flowing",
    version,
    about = "Render declarative JSON/JSON5 diagrams to SVG or PNG"
)]
pub struct Args {
    /// Input file (.json, .json5, or .md with ```flowing blocks) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file (svg/png). Defaults to stdout for SVG if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "outputFormat", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Config JSON file (theme, themeVariables, layout, render)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Canvas width; overrides the diagram's own width
    #[arg(short = 'w', long = "width")]
    pub width: Option<f32>,

    /// Canvas height; overrides the diagram's own height
    #[arg(short = 'H', long = "height")]
    pub height: Option<f32>,

    /// Crop the output to the content bounds
    #[arg(long = "fit")]
    pub fit: bool,

    /// Margin around the content when fitting
    #[arg(long = "margin")]
    pub margin: Option<f32>,

    /// PNG scale factor
    #[arg(long = "scale")]
    pub scale: Option<f32>,

    /// Disable row/column snapping and fan alignment
    #[arg(long = "no-auto-align")]
    pub no_auto_align: bool,

    /// Disable connector label collision search
    #[arg(long = "no-anti-overlap")]
    pub no_anti_overlap: bool,

    /// Write the computed layout as JSON
    #[arg(long = "dump-layout")]
    pub dump_layout: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Svg,
    Png,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
        }
    }

    fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("png") => Some(OutputFormat::Png),
            Some(ext) if ext.eq_ignore_ascii_case("svg") => Some(OutputFormat::Svg),
            _ => None,
        }
    }
}

impl Args {
    /// Flags that win over both the config file and the diagram description.
    fn apply_overrides(&self, config: &mut Config) {
        if self.fit {
            config.render.fit = true;
        }
        if let Some(margin) = self.margin {
            config.render.margin = margin;
        }
        if let Some(scale) = self.scale {
            config.render.scale = scale;
        }
        if self.no_auto_align {
            config.layout.auto_align = false;
        }
        if self.no_anti_overlap {
            config.layout.anti_overlap = false;
        }
    }
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    let mut base_config = load_config(args.config.as_deref())?;
    if let Some(width) = args.width {
        base_config.render.width = width;
    }
    if let Some(height) = args.height {
        base_config.render.height = height;
    }

    let (input, is_markdown) = read_input(args.input.as_deref())?;
    let diagrams = if is_markdown {
        extract_flowing_blocks(&input)
    } else {
        vec![input]
    };

    if diagrams.is_empty() {
        return Err(anyhow::anyhow!("No flowing diagrams found in input"));
    }

    if diagrams.len() == 1 {
        let rendered = render_one(&diagrams[0], &base_config, &args)?;
        let output = args.output.clone().or(rendered.export_path);
        let format = args
            .output_format
            .or_else(|| output.as_deref().and_then(OutputFormat::from_path))
            .unwrap_or(OutputFormat::Svg);
        match format {
            OutputFormat::Svg => {
                write_output_svg(&rendered.svg, output.as_deref())?;
            }
            OutputFormat::Png => {
                let output = ensure_output(&output, "png")?;
                write_output_png(&rendered.svg, &output, &rendered.config.render)?;
            }
        }
        if let Some(path) = &args.dump_layout {
            write_layout_dump(path, &rendered.document, &rendered.layout)?;
        }
        return Ok(());
    }

    // Multiple diagrams (Markdown input)
    let format = args.output_format.unwrap_or(OutputFormat::Svg);
    let outputs = resolve_multi_outputs(args.output.as_deref(), format, diagrams.len())?;
    let dumps: Vec<Option<PathBuf>> = match &args.dump_layout {
        Some(path) => resolve_multi_outputs(Some(path), OutputFormat::Svg, diagrams.len())?
            .into_iter()
            .map(|p| Some(p.with_extension("json")))
            .collect(),
        None => vec![None; diagrams.len()],
    };
    for (idx, diagram) in diagrams.iter().enumerate() {
        let rendered = render_one(diagram, &base_config, &args)?;
        match format {
            OutputFormat::Svg => {
                write_output_svg(&rendered.svg, Some(&outputs[idx]))?;
            }
            OutputFormat::Png => {
                write_output_png(&rendered.svg, &outputs[idx], &rendered.config.render)?;
            }
        }
        if let Some(path) = &dumps[idx] {
            write_layout_dump(path, &rendered.document, &rendered.layout)?;
        }
        tracing::debug!(index = idx + 1, output = %outputs[idx].display(), "rendered diagram");
    }

    Ok(())
}

struct Rendered {
    document: crate::ir::Document,
    layout: crate::layout::Layout,
    config: Config,
    svg: String,
    export_path: Option<PathBuf>,
}

fn render_one(source: &str, base_config: &Config, args: &Args) -> Result<Rendered> {
    let canvas = CanvasSize {
        width: args.width,
        height: args.height,
    };
    let parsed = parse_diagram_sized(source, base_config, canvas)?;
    let mut config = base_config.clone();
    parsed.overrides.apply(&mut config);
    args.apply_overrides(&mut config);

    let document = parsed.document;
    let layout = compute_layout(&document, &config.layout);
    let svg = render_svg(&document, &layout, &config);
    Ok(Rendered {
        document,
        layout,
        config,
        svg,
        export_path: parsed.overrides.export_path,
    })
}

fn read_input(path: Option<&Path>) -> Result<(String, bool)> {
    if let Some(path) = path {
        if path == Path::new("-") {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            return Ok((buf, false));
        }
        let content = std::fs::read_to_string(path)?;
        let is_md = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| matches!(ext, "md" | "markdown"))
            .unwrap_or(false);
        return Ok((content, is_md));
    }

    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok((buf, false))
}

fn ensure_output(output: &Option<PathBuf>, ext: &str) -> Result<PathBuf> {
    if let Some(path) = output {
        return Ok(path.clone());
    }
    Err(anyhow::anyhow!("Output path required for {} output", ext))
}

fn extract_flowing_blocks(input: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut in_block = false;
    let mut current = Vec::new();
    let mut fence = String::new();

    for line in input.lines() {
        let trimmed = line.trim();
        if !in_block {
            if let Some(start_fence) = detect_flowing_fence(trimmed) {
                in_block = true;
                fence = start_fence;
            }
            continue;
        }
        if is_fence_end(trimmed, &fence) {
            in_block = false;
            blocks.push(current.join("\n"));
            current.clear();
            continue;
        }
        current.push(line.to_string());
    }

    blocks
}

fn detect_flowing_fence(line: &str) -> Option<String> {
    for marker in ["```", "~~~"] {
        if let Some(rest) = line.strip_prefix(marker) {
            let info = rest.trim_start_matches(&marker[..1]).trim();
            if info.starts_with("flowing") {
                return Some(marker.to_string());
            }
        }
    }
    None
}

fn is_fence_end(line: &str, fence: &str) -> bool {
    if !line.starts_with(fence) {
        return false;
    }
    line[fence.len()..].trim().is_empty()
}

fn resolve_multi_outputs(
    output: Option<&Path>,
    format: OutputFormat,
    count: usize,
) -> Result<Vec<PathBuf>> {
    let ext = format.extension();
    let base = output.ok_or_else(|| anyhow::anyhow!("Output path required for markdown input"))?;
    if base.is_dir() {
        return Ok((0..count)
            .map(|idx| base.join(format!("diagram-{}.{}", idx + 1, ext)))
            .collect());
    }
    let stem = base
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("diagram");
    let parent = base.parent().unwrap_or_else(|| Path::new("."));
    Ok((0..count)
        .map(|idx| parent.join(format!("{}-{}.{}", stem, idx + 1, ext)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_flowing_blocks() {
        let input = r#"
text
``` flowing
{ elements: [] }
```
```json
{ "ignored": true }
```
~~~flowing
{ width: 300 }
~~~
"#;
        let blocks = extract_flowing_blocks(input);
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].contains("elements"));
        assert!(blocks[1].contains("width"));
    }

    #[test]
    fn numbered_outputs_follow_the_base_name() {
        let outputs =
            resolve_multi_outputs(Some(Path::new("out/chart.svg")), OutputFormat::Png, 2).unwrap();
        assert_eq!(
            outputs,
            vec![PathBuf::from("out/chart-1.png"), PathBuf::from("out/chart-2.png")]
        );
        assert!(resolve_multi_outputs(None, OutputFormat::Svg, 2).is_err());
    }

    #[test]
    fn format_is_inferred_from_extension() {
        assert_eq!(
            OutputFormat::from_path(Path::new("a.PNG")),
            Some(OutputFormat::Png)
        );
        assert_eq!(OutputFormat::from_path(Path::new("a.txt")), None);
    }

    #[test]
    fn flags_override_description_options() {
        let args = Args::parse_from([
            "flowing",
            "--fit",
            "--margin",
            "5",
            "--no-auto-align",
            "-w",
            "900",
        ]);
        let rendered = render_one(
            r#"{ width: 300, autoAlign: true, export: { margin: 30 } }"#,
            &Config::default(),
            &args,
        )
        .unwrap();
        assert!(rendered.config.render.fit);
        assert_eq!(rendered.config.render.margin, 5.0);
        assert!(!rendered.config.layout.auto_align);
        assert_eq!(rendered.document.width, 900.0);
    }

    #[test]
    fn canvas_flags_apply_before_arrangement() {
        let source = r#"{
            width: 300, height: 200,
            elements: [
                { id: "a", type: "rect", size: [100, 40] },
                { id: "b", type: "rect", size: [100, 40] },
                { id: "c", type: "rect", size: [100, 40] },
                { id: "d", type: "rect", size: [100, 40] },
            ],
            layouts: [
                { type: "row", elements: ["a"] },
                { type: "col", elements: ["b"] },
                { type: "grid", cols: 2, gap: 20, elements: ["c", "d"] },
            ],
        }"#;
        let args = Args::parse_from(["flowing", "-w", "900", "-H", "600"]);
        let rendered = render_one(source, &Config::default(), &args).unwrap();
        let bounds = |name: &str| {
            let shape = rendered
                .document
                .shapes()
                .iter()
                .find(|s| s.name == name)
                .unwrap();
            rendered.layout.shape_bounds(shape.id)
        };
        assert_eq!((rendered.document.width, rendered.document.height), (900.0, 600.0));
        // Row: centered horizontally on 900 and vertically on 600.
        assert_eq!(bounds("rect_1").x, 400.0);
        assert_eq!(bounds("rect_1").y, 280.0);
        // Column: same centering.
        assert_eq!(bounds("rect_2").x, 400.0);
        // Grid of two 100px cells plus a 20px gap.
        assert_eq!(bounds("rect_3").x, 340.0);
        assert_eq!(bounds("rect_4").x, 460.0);
        assert!(rendered.svg.contains("width=\"900\" height=\"600\""));
    }
}
