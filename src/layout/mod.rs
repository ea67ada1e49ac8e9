pub mod align;
pub mod anchors;
pub mod arrange;
pub mod avoidance;
pub mod bounds;
pub mod geometry;
pub mod label_placement;
pub mod resolve;
pub mod routing;
pub(crate) mod types;

pub use arrange::GridOptions;
pub use geometry::{Bounds, Point, PosValue};
pub use routing::{PathCommand, path_commands};
pub use types::*;

use crate::config::LayoutConfig;
use crate::ir::{AnchorSpec, Document, Side};
use label_placement::LabelContext;
use routing::RouteRequest;

/// Runs the full geometry pipeline for one render.
///
/// Bounds are derived from the document's declared configuration every time,
/// so repeated calls on the same document give identical layouts.
pub fn compute_layout(doc: &Document, config: &LayoutConfig) -> Layout {
    let mut table = resolve::resolve_bounds(doc);
    resolve::apply_group_bounds(doc, &mut table);
    tracing::debug!(shapes = table.len(), "resolved shape bounds");

    if config.auto_align {
        align::auto_align(doc, &mut table, config);
        resolve::apply_group_bounds(doc, &mut table);
        tracing::debug!("auto-alignment done");
    }

    let arrows = layout_arrows(doc, &table, config);
    let forks = layout_forks(doc, &table, config);
    tracing::debug!(arrows = arrows.len(), forks = forks.len(), "routed connectors");

    let content_bounds = bounds::content_bounds(doc, &table, &arrows, &forks);
    Layout {
        width: doc.width,
        height: doc.height,
        bounds: table,
        arrows,
        forks,
        content_bounds,
    }
}

fn layout_arrows(doc: &Document, table: &BoundsTable, config: &LayoutConfig) -> Vec<ArrowLayout> {
    let labels = LabelContext {
        config: &config.labels,
        canvas: (doc.width, doc.height),
        anti_overlap: config.anti_overlap,
    };
    doc.arrows()
        .iter()
        .enumerate()
        .map(|(index, arrow)| {
            let ends =
                anchors::resolve_endpoints(doc, table, arrow.source, arrow.target, &arrow.config);
            let request = RouteRequest {
                ends,
                config: &arrow.config,
                source_bounds: table.get(arrow.source),
                target_bounds: table.get(arrow.target),
            };
            let mut route = routing::route_connector(&request, &config.routing);
            let avoided = route.polyline().map(|points| {
                let obstacles =
                    avoidance::collect_obstacles(doc, table, arrow.source, arrow.target);
                avoidance::avoid_obstacles(points, &obstacles)
            });
            if let Some(points) = avoided {
                routing::replace_polyline(&mut route, points);
            }

            let label = arrow
                .config
                .label
                .as_deref()
                .filter(|text| !text.is_empty())
                .map(|text| {
                    let obstacles =
                        label_placement::label_obstacles(doc, table, arrow.source, arrow.target);
                    label_placement::place_label(
                        text,
                        &route,
                        arrow.config.label_offset,
                        &obstacles,
                        &labels,
                    )
                });
            ArrowLayout {
                index,
                source: arrow.source,
                target: arrow.target,
                route,
                label,
            }
        })
        .collect()
}

fn layout_forks(doc: &Document, table: &BoundsTable, config: &LayoutConfig) -> Vec<ForkLayout> {
    doc.forks()
        .iter()
        .enumerate()
        .map(|(index, fork)| {
            let from = fork.config.from.unwrap_or(AnchorSpec::from(Side::Top));
            let to = fork.config.to.unwrap_or(AnchorSpec::from(Side::Left));
            let source = anchors::spec_point(
                doc.shape(fork.source),
                &table.get(fork.source),
                from,
            );
            let targets: Vec<(Point, Side)> = fork
                .targets
                .iter()
                .map(|t| (anchors::spec_point(doc.shape(*t), &table.get(*t), to), to.side))
                .collect();
            let (trunk, branches) =
                routing::route_fork(source, from.side, &targets, &fork.config, &config.routing);
            ForkLayout {
                index,
                source: fork.source,
                targets: fork.targets.clone(),
                trunk,
                branches,
            }
        })
        .collect()
}
