use crate::ir::{Document, Side};
use crate::layout::{Bounds, Layout, Route, RouteBranch};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct LayoutDump {
    pub width: f32,
    pub height: f32,
    pub content_bounds: BoxDump,
    pub shapes: Vec<ShapeDump>,
    pub arrows: Vec<ArrowDump>,
    pub forks: Vec<ForkDump>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoxDump {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl From<Bounds> for BoxDump {
    fn from(b: Bounds) -> Self {
        Self {
            x: b.x,
            y: b.y,
            width: b.width,
            height: b.height,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ShapeDump {
    pub name: String,
    pub kind: String,
    pub label: String,
    pub parent: Option<String>,
    pub group: bool,
    pub bounds: BoxDump,
}

#[derive(Debug, Serialize)]
pub struct RouteDump {
    pub branch: RouteBranch,
    pub from_side: Side,
    pub to_side: Side,
    pub points: Vec<[f32; 2]>,
    pub start_angle: f32,
    pub end_angle: f32,
}

impl From<&Route> for RouteDump {
    fn from(route: &Route) -> Self {
        Self {
            branch: route.branch,
            from_side: route.from_side,
            to_side: route.to_side,
            points: route.points().iter().map(|(x, y)| [*x, *y]).collect(),
            start_angle: route.start_angle,
            end_angle: route.end_angle,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LabelDump {
    pub text: String,
    pub bounds: BoxDump,
}

#[derive(Debug, Serialize)]
pub struct ArrowDump {
    pub from: String,
    pub to: String,
    pub route: RouteDump,
    pub label: Option<LabelDump>,
}

#[derive(Debug, Serialize)]
pub struct ForkDump {
    pub from: String,
    pub to: Vec<String>,
    pub trunk: [[f32; 2]; 2],
    pub branches: Vec<RouteDump>,
}

impl LayoutDump {
    pub fn from_layout(doc: &Document, layout: &Layout) -> Self {
        let name = |id| doc.shape(id).name.clone();

        let shapes = doc
            .shapes()
            .iter()
            .map(|shape| ShapeDump {
                name: shape.name.clone(),
                kind: shape.kind.as_str().to_string(),
                label: shape.label.clone(),
                parent: shape.parent.map(name),
                group: doc.is_group(shape.id),
                bounds: layout.shape_bounds(shape.id).into(),
            })
            .collect();

        let arrows = layout
            .arrows
            .iter()
            .map(|arrow| ArrowDump {
                from: name(arrow.source),
                to: name(arrow.target),
                route: RouteDump::from(&arrow.route),
                label: arrow.label.as_ref().map(|label| LabelDump {
                    text: label.text.clone(),
                    bounds: label.bounds().into(),
                }),
            })
            .collect();

        let forks = layout
            .forks
            .iter()
            .map(|fork| {
                let ((x0, y0), (x1, y1)) = fork.trunk;
                ForkDump {
                    from: name(fork.source),
                    to: fork.targets.iter().map(|t| name(*t)).collect(),
                    trunk: [[x0, y0], [x1, y1]],
                    branches: fork.branches.iter().map(RouteDump::from).collect(),
                }
            })
            .collect();

        LayoutDump {
            width: layout.width,
            height: layout.height,
            content_bounds: layout.content_bounds.into(),
            shapes,
            arrows,
            forks,
        }
    }
}

pub fn write_layout_dump(path: &Path, doc: &Document, layout: &Layout) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let dump = LayoutDump::from_layout(doc, layout);
    serde_json::to_writer_pretty(writer, &dump)?;
    Ok(())
}
