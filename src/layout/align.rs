use std::collections::BTreeMap;

use super::geometry::{Bounds, round2};
use super::types::BoundsTable;
use crate::config::LayoutConfig;
use crate::ir::{Document, ShapeId, ShapeKind};

/// Shapes at or below this size on both axes are treated as invisible anchor targets.
const TINY_SHAPE: f32 = 10.0;
/// Breathing room kept around a moved shape when testing for overlaps.
const MOVE_PADDING: f32 = 2.0;

#[derive(Debug, Clone, Copy)]
struct Entry {
    id: ShapeId,
    bounds: Bounds,
}

impl Entry {
    fn center(&self, axis: Axis) -> f32 {
        let (cx, cy) = self.bounds.center();
        match axis {
            Axis::Horizontal => cx,
            Axis::Vertical => cy,
        }
    }
}

/// Direction of a snapping move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    /// Moves along x; used for column snapping.
    Horizontal,
    /// Moves along y; used for row snapping and fan alignment.
    Vertical,
}

impl Axis {
    fn delta(self, amount: f32) -> (f32, f32) {
        match self {
            Axis::Horizontal => (amount, 0.0),
            Axis::Vertical => (0.0, amount),
        }
    }
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut curr = x;
        while curr != root {
            let next = self.parent[curr];
            self.parent[curr] = root;
            curr = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

/// Nudges loosely placed top-level shapes onto shared rows and columns.
///
/// Only shapes linked through connectors or forks are aligned with each other,
/// and a move is skipped whenever it would bring the shape into contact with
/// another participating shape.
pub fn auto_align(doc: &Document, table: &mut BoundsTable, config: &LayoutConfig) {
    let mut entries = participants(doc, table);
    if entries.len() < 2 {
        return;
    }

    for component in components(doc, &entries) {
        if component.len() < 2 {
            continue;
        }
        align_fans(doc, table, &mut entries, &component, config.fan_tolerance);
        snap(doc, table, &mut entries, &component, Axis::Vertical, config.align_tolerance);
        snap(doc, table, &mut entries, &component, Axis::Horizontal, config.align_tolerance);
    }
}

fn participants(doc: &Document, table: &BoundsTable) -> Vec<Entry> {
    doc.roots()
        .iter()
        .filter(|id| doc.shape(**id).kind != ShapeKind::Text && !doc.is_group(**id))
        .map(|id| Entry {
            id: *id,
            bounds: table.get(*id),
        })
        .filter(|e| e.bounds.width != 0.0 && e.bounds.height != 0.0)
        .filter(|e| !(e.bounds.width <= TINY_SHAPE && e.bounds.height <= TINY_SHAPE))
        .collect()
}

/// Connected components as lists of indices into `entries`, in first-seen order.
fn components(doc: &Document, entries: &[Entry]) -> Vec<Vec<usize>> {
    let index_of: BTreeMap<ShapeId, usize> =
        entries.iter().enumerate().map(|(i, e)| (e.id, i)).collect();
    let mut uf = UnionFind::new(entries.len());
    let links = doc
        .arrows()
        .iter()
        .map(|a| (a.source, a.target))
        .chain(
            doc.forks()
                .iter()
                .flat_map(|f| f.targets.iter().map(move |t| (f.source, *t))),
        );
    for (source, target) in links {
        if let (Some(&a), Some(&b)) = (index_of.get(&source), index_of.get(&target)) {
            uf.union(a, b);
        }
    }

    let mut order: Vec<usize> = Vec::new();
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..entries.len() {
        let root = uf.find(i);
        if !groups.contains_key(&root) {
            order.push(root);
        }
        groups.entry(root).or_default().push(i);
    }
    order
        .into_iter()
        .filter_map(|root| groups.remove(&root))
        .collect()
}

fn would_overlap(entries: &[Entry], index: usize, dx: f32, dy: f32) -> bool {
    let moved = entries[index].bounds.translate(dx, dy).inflate(MOVE_PADDING);
    entries.iter().enumerate().any(|(i, other)| {
        i != index
            && !(other.bounds.width <= TINY_SHAPE && other.bounds.height <= TINY_SHAPE)
            && moved.touches(&other.bounds)
    })
}

/// Moves a shape and everything nested in it.
fn shift_subtree(doc: &Document, table: &mut BoundsTable, id: ShapeId, dx: f32, dy: f32) {
    for member in doc.descendants(id) {
        let b = table.get(member);
        table.set(
            member,
            Bounds::new(round2(b.x + dx), round2(b.y + dy), b.width, b.height),
        );
    }
}

fn move_entry(
    doc: &Document,
    table: &mut BoundsTable,
    entries: &mut [Entry],
    index: usize,
    dx: f32,
    dy: f32,
) {
    let id = entries[index].id;
    shift_subtree(doc, table, id, dx, dy);
    entries[index].bounds = table.get(id);
}

/// Spokes per hub, with hubs in the order their first connector was declared.
fn hubs(pairs: impl Iterator<Item = (ShapeId, ShapeId)>) -> Vec<(ShapeId, Vec<ShapeId>)> {
    let mut hubs: Vec<(ShapeId, Vec<ShapeId>)> = Vec::new();
    for (hub, spoke) in pairs {
        match hubs.iter_mut().find(|(h, _)| *h == hub) {
            Some((_, spokes)) => spokes.push(spoke),
            None => hubs.push((hub, vec![spoke])),
        }
    }
    hubs
}

/// Centers a fan source on the vertical span of its targets, and a fan-in
/// target on the span of its sources.
fn align_fans(
    doc: &Document,
    table: &mut BoundsTable,
    entries: &mut [Entry],
    component: &[usize],
    tolerance: f32,
) {
    let index_of: BTreeMap<ShapeId, usize> = component
        .iter()
        .map(|&i| (entries[i].id, i))
        .collect();
    let outgoing = hubs(doc.arrows().iter().map(|a| (a.source, a.target)));
    let incoming = hubs(doc.arrows().iter().map(|a| (a.target, a.source)));

    let mut aligned: Vec<ShapeId> = Vec::new();
    for (fans, opposite, direction) in [(&outgoing, &incoming, "out"), (&incoming, &outgoing, "in")] {
        for (hub, spokes) in fans {
            if spokes.len() < 2 || aligned.contains(hub) {
                continue;
            }
            let Some(&hub_index) = index_of.get(hub) else {
                continue;
            };
            // A hub with traffic the other way only counts as a fan with three or more spokes.
            let opposite_count = opposite
                .iter()
                .find(|(other, _)| other == hub)
                .map_or(0, |(_, spokes)| spokes.len());
            if opposite_count > 0 && spokes.len() <= 2 {
                continue;
            }
            let members: Vec<Bounds> = spokes
                .iter()
                .filter_map(|s| index_of.get(s).map(|&i| entries[i].bounds))
                .collect();
            if members.len() < 2 {
                continue;
            }
            let avg_x = members.iter().map(|b| b.center().0).sum::<f32>() / members.len() as f32;
            if !members.iter().all(|b| (b.center().0 - avg_x).abs() < tolerance) {
                continue;
            }
            let Some(span) = Bounds::union_all(&members) else {
                continue;
            };
            let dy = span.center().1 - entries[hub_index].center(Axis::Vertical);
            if dy.abs() > 1.0 && !would_overlap(entries, hub_index, 0.0, dy) {
                tracing::debug!(shape = hub.index(), direction, dy, "fan alignment");
                move_entry(doc, table, entries, hub_index, 0.0, dy);
                aligned.push(*hub);
            }
        }
    }
}

/// Clusters shapes whose centers along `axis` agree within `tolerance` and moves
/// each onto the cluster average.
fn snap(
    doc: &Document,
    table: &mut BoundsTable,
    entries: &mut [Entry],
    component: &[usize],
    axis: Axis,
    tolerance: f32,
) {
    let mut order = component.to_vec();
    order.sort_by(|a, b| entries[*a].center(axis).total_cmp(&entries[*b].center(axis)));

    let mut used = vec![false; order.len()];
    for i in 0..order.len() {
        if used[i] {
            continue;
        }
        used[i] = true;
        let mut cluster = vec![order[i]];
        let mut sum = entries[order[i]].center(axis);
        for j in i + 1..order.len() {
            if used[j] {
                continue;
            }
            let avg = sum / cluster.len() as f32;
            let c = entries[order[j]].center(axis);
            if (c - avg).abs() <= tolerance {
                used[j] = true;
                cluster.push(order[j]);
                sum += c;
            }
        }
        if cluster.len() < 2 {
            continue;
        }
        let target = sum / cluster.len() as f32;
        for &index in &cluster {
            let delta = target - entries[index].center(axis);
            if delta.abs() < 0.5 {
                continue;
            }
            let (dx, dy) = axis.delta(delta);
            if would_overlap(entries, index, dx, dy) {
                tracing::debug!(shape = entries[index].id.index(), ?axis, "snap skipped: overlap");
                continue;
            }
            move_entry(doc, table, entries, index, dx, dy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArrowConfig, ShapeConfig};
    use crate::layout::geometry::overlap_area;
    use crate::layout::resolve::resolve_bounds;

    fn rect(doc: &mut Document, x: f32, y: f32, w: f32, h: f32) -> ShapeId {
        doc.rect("", ShapeConfig::at(x, y).with_size(w, h))
    }

    #[test]
    fn fan_out_source_centers_on_target_span() {
        let mut doc = Document::new(800.0, 400.0);
        let source = rect(&mut doc, 100.0, 100.0, 80.0, 40.0);
        let targets: Vec<ShapeId> = [80.0, 130.0, 180.0]
            .iter()
            .map(|y| rect(&mut doc, 300.0, *y, 80.0, 30.0))
            .collect();
        doc.fan_arrows(&[source], &targets, ArrowConfig::default())
            .unwrap();
        let mut table = resolve_bounds(&doc);
        auto_align(&doc, &mut table, &LayoutConfig::default());
        assert_eq!(table.get(source).center().1, 145.0);
        for (t, y) in targets.iter().zip([80.0, 130.0, 180.0]) {
            assert_eq!(table.get(*t).y, y);
        }
    }

    #[test]
    fn near_rows_snap_to_average_center() {
        let mut doc = Document::new(800.0, 400.0);
        let a = rect(&mut doc, 0.0, 100.0, 80.0, 40.0);
        let b = rect(&mut doc, 200.0, 110.0, 80.0, 40.0);
        doc.arrow(a, b, ArrowConfig::default()).unwrap();
        let mut table = resolve_bounds(&doc);
        auto_align(&doc, &mut table, &LayoutConfig::default());
        assert_eq!(table.get(a).y, 105.0);
        assert_eq!(table.get(b).y, 105.0);
    }

    #[test]
    fn unconnected_shapes_are_left_alone() {
        let mut doc = Document::new(800.0, 400.0);
        let a = rect(&mut doc, 0.0, 100.0, 80.0, 40.0);
        let b = rect(&mut doc, 200.0, 110.0, 80.0, 40.0);
        let mut table = resolve_bounds(&doc);
        auto_align(&doc, &mut table, &LayoutConfig::default());
        assert_eq!(table.get(a).y, 100.0);
        assert_eq!(table.get(b).y, 110.0);
    }

    #[test]
    fn children_move_with_their_parent() {
        let mut doc = Document::new(800.0, 400.0);
        let a = rect(&mut doc, 0.0, 100.0, 80.0, 40.0);
        let child = doc
            .add_child(
                a,
                ShapeKind::Rect,
                "",
                ShapeConfig::at(10.0, 10.0).with_size(20.0, 20.0),
            )
            .unwrap();
        let b = rect(&mut doc, 200.0, 110.0, 80.0, 40.0);
        doc.arrow(a, b, ArrowConfig::default()).unwrap();
        let mut table = resolve_bounds(&doc);
        auto_align(&doc, &mut table, &LayoutConfig::default());
        assert_eq!(table.get(child).y, 115.0);
    }

    #[test]
    fn alignment_never_introduces_overlap() {
        let mut doc = Document::new(800.0, 400.0);
        let a = rect(&mut doc, 0.0, 100.0, 100.0, 40.0);
        let b = rect(&mut doc, 150.0, 115.0, 100.0, 40.0);
        // Blocks b from sliding up onto a's row.
        let c = rect(&mut doc, 140.0, 60.0, 120.0, 50.0);
        let d = rect(&mut doc, 10.0, 118.0, 60.0, 60.0);
        doc.arrow(a, b, ArrowConfig::default()).unwrap();
        doc.arrow(b, c, ArrowConfig::default()).unwrap();
        doc.arrow(c, d, ArrowConfig::default()).unwrap();
        let ids = [a, b, c, d];

        let before = resolve_bounds(&doc);
        let mut after = before.clone();
        auto_align(&doc, &mut after, &LayoutConfig::default());
        for (i, x) in ids.iter().enumerate() {
            for y in &ids[i + 1..] {
                if overlap_area(&before.get(*x), &before.get(*y)) == 0.0 {
                    assert_eq!(
                        overlap_area(&after.get(*x), &after.get(*y)),
                        0.0,
                        "{x:?} and {y:?} overlap after alignment"
                    );
                }
            }
        }
    }

    struct BlockedCase {
        name: &'static str,
        boxes: &'static [(f32, f32, f32, f32)],
        arrows: &'static [(usize, usize)],
        /// Shapes whose snap must be rejected.
        pinned: &'static [usize],
    }

    const BLOCKED_CASES: &[BlockedCase] = &[
        BlockedCase {
            name: "row snap into a shape above",
            boxes: &[
                (0.0, 100.0, 80.0, 40.0),
                (200.0, 112.0, 80.0, 40.0),
                (200.0, 60.0, 80.0, 48.0),
            ],
            arrows: &[(0, 1)],
            pinned: &[1],
        },
        BlockedCase {
            name: "column snap into a shape on the left",
            boxes: &[
                (100.0, 0.0, 80.0, 40.0),
                (112.0, 200.0, 80.0, 40.0),
                (60.0, 200.0, 50.0, 40.0),
            ],
            arrows: &[(0, 1)],
            pinned: &[1],
        },
        BlockedCase {
            name: "both row members hemmed in",
            boxes: &[
                (0.0, 112.0, 80.0, 40.0),
                (200.0, 100.0, 80.0, 40.0),
                (0.0, 60.0, 80.0, 48.0),
                (200.0, 146.0, 80.0, 40.0),
            ],
            arrows: &[(0, 1)],
            pinned: &[0, 1],
        },
        BlockedCase {
            name: "neighbouring components",
            boxes: &[
                (0.0, 100.0, 80.0, 40.0),
                (200.0, 112.0, 80.0, 40.0),
                (200.0, 60.0, 80.0, 48.0),
                (400.0, 60.0, 80.0, 40.0),
                (412.0, 160.0, 80.0, 40.0),
                (360.0, 160.0, 50.0, 40.0),
            ],
            arrows: &[(0, 1), (3, 4)],
            pinned: &[1, 4],
        },
    ];

    fn overlapping_pairs(table: &BoundsTable, ids: &[ShapeId]) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for i in 0..ids.len() {
            for j in i + 1..ids.len() {
                if overlap_area(&table.get(ids[i]), &table.get(ids[j])) > 0.0 {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    #[test]
    fn blocked_snaps_are_rejected_and_overlap_never_grows() {
        for case in BLOCKED_CASES {
            let mut doc = Document::new(800.0, 400.0);
            let ids: Vec<ShapeId> = case
                .boxes
                .iter()
                .map(|&(x, y, w, h)| rect(&mut doc, x, y, w, h))
                .collect();
            for &(a, b) in case.arrows {
                doc.arrow(ids[a], ids[b], ArrowConfig::default()).unwrap();
            }

            let before = resolve_bounds(&doc);
            let mut after = before.clone();
            auto_align(&doc, &mut after, &LayoutConfig::default());

            for &i in case.pinned {
                assert_eq!(
                    after.get(ids[i]),
                    before.get(ids[i]),
                    "{}: shape {i} should not have moved",
                    case.name
                );
            }
            let was = overlapping_pairs(&before, &ids);
            let now = overlapping_pairs(&after, &ids);
            assert!(
                now.len() <= was.len(),
                "{}: overlaps grew from {was:?} to {now:?}",
                case.name
            );
            for pair in &now {
                assert!(was.contains(pair), "{}: new overlap {pair:?}", case.name);
            }
        }
    }

    #[test]
    fn competing_fans_resolve_in_declaration_order() {
        let mut doc = Document::new(800.0, 400.0);
        let first_declared = rect(&mut doc, 0.0, 200.0, 80.0, 40.0);
        let second_declared = rect(&mut doc, 0.0, 300.0, 80.0, 40.0);
        let t1 = rect(&mut doc, 300.0, 0.0, 80.0, 30.0);
        let t2 = rect(&mut doc, 300.0, 100.0, 80.0, 30.0);
        // The later shape's fan is declared first, so it claims the target span.
        doc.fan_arrows(&[second_declared], &[t1, t2], ArrowConfig::default())
            .unwrap();
        doc.fan_arrows(&[first_declared], &[t1, t2], ArrowConfig::default())
            .unwrap();

        let mut table = resolve_bounds(&doc);
        auto_align(&doc, &mut table, &LayoutConfig::default());
        assert_eq!(table.get(second_declared).center().1, 65.0);
        assert_eq!(table.get(first_declared).y, 200.0);
    }
}
