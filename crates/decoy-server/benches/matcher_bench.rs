use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use decoy_server::condition::CompiledCondition;
use decoy_server::engine::CompiledProject;
use decoy_server::model::ProjectDefinition;
use decoy_server::request::RequestContext;
use decoy_server::routing::CompiledRoute;
use decoy_server::template::{FixedClock, RenderContext, SeededFaker, TemplateRenderer};
use hyper::HeaderMap;
use serde_json::json;
use std::sync::Arc;

fn create_project(endpoint_count: usize, typed: bool) -> CompiledProject {
    let endpoints: Vec<_> = (0..endpoint_count)
        .map(|i| {
            let route = if typed {
                format!("/api/v1/endpoint{i}/{{id:int}}")
            } else {
                format!("/api/v1/endpoint{i}")
            };
            json!({
                "id": format!("endpoint-{i}"),
                "route": route,
                "method": "GET",
                "responses": [{"body": "ok"}]
            })
        })
        .collect();
    let project: ProjectDefinition = serde_json::from_value(json!({
        "id": "bench",
        "basePath": "/bench",
        "endpoints": endpoints
    }))
    .unwrap();
    CompiledProject::compile(Arc::new(project), 1)
}

fn bench_endpoint_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("endpoint_resolution");

    for endpoint_count in [10, 50, 100, 500].iter() {
        let project = create_project(*endpoint_count, false);
        group.throughput(Throughput::Elements(1));

        let cases = [
            ("match_first", "/api/v1/endpoint0".to_string()),
            (
                "match_middle",
                format!("/api/v1/endpoint{}", endpoint_count / 2),
            ),
            (
                "match_last",
                format!("/api/v1/endpoint{}", endpoint_count - 1),
            ),
            ("match_none", "/not/found".to_string()),
        ];
        for (name, path) in cases {
            group.bench_with_input(
                BenchmarkId::new(name, endpoint_count),
                endpoint_count,
                |b, _| {
                    b.iter(|| project.find_endpoint(black_box("GET"), black_box(&path)));
                },
            );
        }
    }

    group.finish();
}

fn bench_typed_params(c: &mut Criterion) {
    let mut group = c.benchmark_group("typed_params");

    for endpoint_count in [10, 100].iter() {
        let project = create_project(*endpoint_count, true);
        let path = format!("/api/v1/endpoint{}/42", endpoint_count - 1);
        group.bench_with_input(
            BenchmarkId::new("match_last", endpoint_count),
            endpoint_count,
            |b, _| {
                b.iter(|| project.find_endpoint(black_box("GET"), black_box(&path)));
            },
        );
    }

    group.finish();
}

fn bench_route_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_strategy");

    let exact = CompiledRoute::compile("/api/users/list", false, None);
    let params = CompiledRoute::compile("/api/users/{id:uuid}/orders/{order}", false, None);
    let deep = CompiledRoute::compile("/files/**", false, None);
    let regex = CompiledRoute::compile("/ignored", false, Some(r"^/api/v\d+/items/(?P<sku>[A-Z0-9-]+)$"));

    group.bench_function("exact", |b| {
        b.iter(|| exact.matches(black_box("/api/users/list")))
    });
    group.bench_function("typed_params", |b| {
        b.iter(|| {
            params.matches(black_box(
                "/api/users/6f1c7f5e-6a53-4c3e-9d6a-2b7b8e3c1a90/orders/77",
            ))
        })
    });
    group.bench_function("deep_wildcard", |b| {
        b.iter(|| deep.matches(black_box("/files/a/b/c/d/e.txt")))
    });
    group.bench_function("regex_override", |b| {
        b.iter(|| regex.matches(black_box("/api/v2/items/ABC-123")))
    });

    group.finish();
}

fn request_context() -> RequestContext {
    let mut headers = HeaderMap::new();
    headers.insert("x-api-key", "secret".parse().unwrap());
    headers.insert("content-type", "application/json".parse().unwrap());
    RequestContext::new(
        "POST",
        "/orders",
        Some("page=2&sort=desc"),
        &headers,
        Some(r#"{"user": {"role": "admin", "name": "Ada"}, "total": 120.5}"#),
    )
}

fn bench_condition_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("condition");
    let ctx = request_context();

    let simple = CompiledCondition::compile("query.page == 2").unwrap();
    let compound = CompiledCondition::compile(
        r#"body.user.role == "admin" && (body.total > 100 || headers.x-api-key startsWith "sec")"#,
    )
    .unwrap();

    group.bench_function("compile_compound", |b| {
        b.iter(|| {
            CompiledCondition::compile(black_box(
                r#"body.user.role == "admin" && !(query.sort == "asc")"#,
            ))
        })
    });
    group.bench_function("evaluate_simple", |b| {
        b.iter(|| simple.evaluate(black_box(&ctx)))
    });
    group.bench_function("evaluate_compound", |b| {
        b.iter(|| compound.evaluate(black_box(&ctx)))
    });

    group.finish();
}

fn bench_template_rendering(c: &mut Criterion) {
    let mut group = c.benchmark_group("template");
    let ctx = request_context();
    let renderer = TemplateRenderer::new(
        Arc::new(SeededFaker::new(7)),
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())),
    );
    let render_ctx = RenderContext::for_request(&ctx);

    let plain = r#"{"status": "ok", "items": [1, 2, 3]}"#;
    let mixed = r#"{"id": "{{faker.random.uuid}}", "name": "{{request.body.user.name}}", "page": {{request.query.page}}, "at": "{{now}}"}"#;

    group.bench_function("no_placeholders", |b| {
        b.iter(|| renderer.render(black_box(plain), &render_ctx))
    });
    group.bench_function("mixed_placeholders", |b| {
        b.iter(|| renderer.render(black_box(mixed), &render_ctx))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_endpoint_resolution,
    bench_typed_params,
    bench_route_strategies,
    bench_condition_evaluation,
    bench_template_rendering
);
criterion_main!(benches);
