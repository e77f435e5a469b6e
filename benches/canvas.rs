use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use diagram_canvas::analysis::analyze;
use diagram_canvas::config::{LayoutConfig, RoutingConfig};
use diagram_canvas::geometry::Point;
use diagram_canvas::ir::{EdgeKind, FeatureEdgeKind, FeatureKind, NodeKind};
use diagram_canvas::layout::{RouteStyle, auto_layout, route_with};
use diagram_canvas::model::GraphModel;
use std::hint::black_box;

/// A feature tree of `nodes` items (each child of the item `fanout` places
/// before it) plus `extra_edges` forward dependency edges.
fn feature_map(nodes: usize, fanout: usize, extra_edges: usize) -> GraphModel {
    let mut model = GraphModel::new("bench");
    let mut ids = Vec::with_capacity(nodes);
    for i in 0..nodes {
        let kind = NodeKind::Feature(if i == 0 {
            FeatureKind::Epic
        } else {
            FeatureKind::Task
        });
        let node = if i == 0 {
            model.add_node(kind, Point::ORIGIN)
        } else {
            let parent: &String = &ids[(i - 1) / fanout];
            model
                .add_child_node(parent, kind, Point::ORIGIN)
                .expect("parent exists")
        };
        ids.push(node.id);
    }
    let dependency = EdgeKind::Feature(FeatureEdgeKind::Dependency);
    let mut count = 0usize;
    'outer: for i in 0..nodes {
        for j in (i + 2)..nodes {
            if count >= extra_edges {
                break 'outer;
            }
            model
                .add_edge(&ids[i], &ids[j], dependency)
                .expect("endpoints exist");
            count += 1;
        }
    }
    model
}

fn bench_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");
    for (nodes, extra_edges) in [(40usize, 80usize), (200, 600), (1000, 3000)] {
        let model = feature_map(nodes, 3, extra_edges);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("features_{nodes}_{extra_edges}")),
            &model,
            |b, model| {
                b.iter(|| {
                    let issues = analyze(black_box(model).nodes(), model.edges());
                    black_box(issues.len());
                });
            },
        );
    }
    group.finish();
}

fn bench_auto_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("auto_layout");
    let config = LayoutConfig::default();
    for (nodes, fanout) in [(40usize, 2usize), (400, 4), (4000, 8)] {
        let model = feature_map(nodes, fanout, 0);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("tree_{nodes}_{fanout}")),
            &model,
            |b, model| {
                b.iter(|| {
                    let positions = auto_layout(black_box(model).nodes(), &config);
                    black_box(positions.len());
                });
            },
        );
    }
    group.finish();
}

fn bench_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("route");
    let config = RoutingConfig::default();
    let mut model = feature_map(2, 1, 0);
    let ids: Vec<String> = model.nodes().map(|node| node.id.clone()).collect();
    model
        .update_node(
            &ids[1],
            diagram_canvas::ir::NodePatch::position(Point::new(420.0, 260.0)),
        )
        .expect("node exists");
    let source = model.node(&ids[0]).expect("node exists");
    let target = model.node(&ids[1]).expect("node exists");
    for style in [
        RouteStyle::Straight,
        RouteStyle::Orthogonal,
        RouteStyle::Curved,
        RouteStyle::Step,
    ] {
        group.bench_function(format!("{style:?}"), |b| {
            b.iter(|| {
                let path = route_with(black_box(source), black_box(target), style, &config);
                black_box(path.midpoint());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_analyze, bench_auto_layout, bench_routing);
criterion_main!(benches);
