use super::geometry::{Bounds, Extent, PosValue, round2};
use super::types::BoundsTable;
use crate::ir::{Document, Shape, ShapeId, ShapeKind};

const DEFAULT_POS: [PosValue; 2] = [PosValue::Px(0.0), PosValue::Px(0.0)];
const CENTER_POS: [PosValue; 2] = [PosValue::Percent(50.0), PosValue::Percent(50.0)];
const DEFAULT_SIZE: [PosValue; 2] = [PosValue::Px(100.0), PosValue::Px(60.0)];
const GROUP_LABEL_HEIGHT: f32 = 20.0;

/// Resolves every shape, parents before children, into absolute canvas bounds.
pub(super) fn resolve_bounds(doc: &Document) -> BoundsTable {
    let mut table = BoundsTable::for_document(doc);
    let canvas = Bounds::new(0.0, 0.0, doc.width, doc.height);
    let mut stack: Vec<(ShapeId, Bounds)> = doc
        .roots()
        .iter()
        .rev()
        .map(|id| (*id, canvas))
        .collect();
    while let Some((id, parent_box)) = stack.pop() {
        let shape = doc.shape(id);
        let bounds = shape_bounds(shape, &parent_box);
        table.set(id, bounds);
        if !shape.children.is_empty() {
            let content = bounds.inset(shape.padding());
            for child in shape.children.iter().rev() {
                stack.push((*child, content));
            }
        }
    }
    table
}

/// Absolute bounds of one shape inside its parent's content box.
pub fn shape_bounds(shape: &Shape, parent: &Bounds) -> Bounds {
    let cfg = &shape.config;
    if shape.kind.is_centered() {
        let r = shape.circle_radius();
        let [px, py] = cfg.pos.unwrap_or(CENTER_POS);
        let cx = px.resolve(parent.width) + parent.x;
        let cy = py.resolve(parent.height) + parent.y;
        return Bounds::new(cx - r, cy - r, r * 2.0, r * 2.0);
    }

    if shape.kind == ShapeKind::Text {
        let [px, py] = cfg.pos.unwrap_or(CENTER_POS);
        let x = px.resolve(parent.width) + parent.x;
        let y = py.resolve(parent.height) + parent.y;
        return Bounds::new(x, y, 0.0, 0.0);
    }

    let [px, py] = cfg.pos.unwrap_or(DEFAULT_POS);
    let [sw, sh] = cfg.size.unwrap_or(DEFAULT_SIZE);
    Bounds::new(
        px.resolve(parent.width) + parent.x,
        py.resolve(parent.height) + parent.y,
        sw.resolve(parent.width),
        sh.resolve(parent.height),
    )
    .rounded()
}

/// Sizes each group rectangle around its members' current bounds.
pub(super) fn apply_group_bounds(doc: &Document, table: &mut BoundsTable) {
    for group in doc.groups() {
        let mut extent = Extent::empty();
        for member in &group.members {
            extent.include_bounds(&table.get(*member));
        }
        let Some(members) = extent.to_bounds() else {
            continue;
        };
        let pad = group.padding;
        let label_h = if doc.shape(group.shape).label.is_empty() {
            0.0
        } else {
            GROUP_LABEL_HEIGHT
        };
        let natural_w = members.width + pad * 2.0;
        let natural_h = members.height + pad * 2.0 + label_h;
        let (extra_w, extra_h, w, h) = match group.size {
            Some((gw, gh)) => (
                (gw - natural_w).max(0.0),
                (gh - natural_h).max(0.0),
                gw.max(natural_w),
                gh.max(natural_h),
            ),
            None => (0.0, 0.0, natural_w, natural_h),
        };
        table.set(
            group.shape,
            Bounds::new(
                round2(members.x - pad - extra_w / 2.0),
                round2(members.y - pad - label_h - extra_h / 2.0),
                round2(w),
                round2(h),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{GroupConfig, ShapeConfig};

    #[test]
    fn children_resolve_inside_padded_parent() {
        let mut doc = Document::new(800.0, 400.0);
        let parent = doc.rect(
            "outer",
            ShapeConfig {
                padding: Some(10.0),
                ..ShapeConfig::at(100.0, 50.0).with_size(200.0, 100.0)
            },
        );
        let child = doc
            .add_child(
                parent,
                ShapeKind::Rect,
                "inner",
                ShapeConfig::at(PosValue::Percent(50.0), 0.0).with_size(PosValue::Percent(50.0), 20.0),
            )
            .unwrap();
        let table = resolve_bounds(&doc);
        assert_eq!(table.get(parent), Bounds::new(100.0, 50.0, 200.0, 100.0));
        assert_eq!(table.get(child), Bounds::new(200.0, 60.0, 90.0, 20.0));
    }

    #[test]
    fn circles_and_text_default_to_parent_center() {
        let mut doc = Document::new(800.0, 400.0);
        let circle = doc.circle("c", ShapeConfig::default().with_radius(20.0));
        let text = doc.text("t", ShapeConfig::default());
        let rect = doc.rect("r", ShapeConfig::default());
        let table = resolve_bounds(&doc);
        assert_eq!(table.get(circle), Bounds::new(380.0, 180.0, 40.0, 40.0));
        assert_eq!(table.get(text), Bounds::new(400.0, 200.0, 0.0, 0.0));
        assert_eq!(table.get(rect), Bounds::new(0.0, 0.0, 100.0, 60.0));
    }

    #[test]
    fn rectangles_round_to_two_decimals() {
        let mut doc = Document::new(300.0, 300.0);
        let rect = doc.rect(
            "r",
            ShapeConfig::at(PosValue::Percent(33.333), 0.0).with_size(10.0, 10.0),
        );
        let table = resolve_bounds(&doc);
        assert_eq!(table.get(rect).x, 100.0);
    }

    #[test]
    fn group_wraps_members_with_label_band() {
        let mut doc = Document::new(800.0, 400.0);
        let a = doc.rect("A", ShapeConfig::at(100.0, 100.0).with_size(80.0, 40.0));
        let b = doc.rect("B", ShapeConfig::at(300.0, 120.0).with_size(80.0, 40.0));
        let group = doc
            .group(
                &[a, b],
                GroupConfig {
                    label: Some("Tier".to_string()),
                    padding: Some(10.0),
                    ..Default::default()
                },
            )
            .unwrap();
        let mut table = resolve_bounds(&doc);
        apply_group_bounds(&doc, &mut table);
        assert_eq!(table.get(group), Bounds::new(90.0, 70.0, 300.0, 100.0));
    }

    #[test]
    fn fixed_size_group_centers_members() {
        let mut doc = Document::new(800.0, 400.0);
        let a = doc.rect("A", ShapeConfig::at(100.0, 100.0).with_size(100.0, 50.0));
        let group = doc
            .group(
                &[a],
                GroupConfig {
                    padding: Some(0.0),
                    size: Some([200.0, 100.0]),
                    ..Default::default()
                },
            )
            .unwrap();
        let mut table = resolve_bounds(&doc);
        apply_group_bounds(&doc, &mut table);
        assert_eq!(table.get(group), Bounds::new(50.0, 75.0, 200.0, 100.0));
    }
}
