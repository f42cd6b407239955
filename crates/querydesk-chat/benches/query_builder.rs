//! Benchmarks for query construction.
//!
//! Measures `QueryBuilder::build` against a realistic catalog: a fresh
//! fetch with label and synonym resolution, the empty-entities fallback,
//! and a drill-down merge onto a prior query.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;

use querydesk_chat::{
    Entities, FieldDescriptor, FieldType, FilterEntity, Intent, QueryBuilder, SchemaCatalog,
    SortEntity,
};

/// A catalog with a few dozen fields, dotted keys and labels.
fn make_catalog() -> SchemaCatalog {
    let dimensions = (0..40)
        .map(|i| {
            FieldDescriptor::new(&format!("consumer_sessions.dimension_{}", i))
                .label(&format!("Dimension {}", i))
                .synonyms(&["alt"])
        })
        .chain([
            FieldDescriptor::new("consumer_sessions.country")
                .label("Country")
                .synonyms(&["nation", "market"]),
            FieldDescriptor::new("consumer_sessions.is_new_user")
                .label("New User")
                .field_type(FieldType::YesNo),
        ])
        .collect();
    let measures = (0..20)
        .map(|i| FieldDescriptor::new(&format!("consumer_sessions.measure_{}", i)))
        .chain([FieldDescriptor::new("consumer_sessions.revenue")
            .label("Revenue")
            .synonyms(&["sales"])])
        .collect();
    SchemaCatalog::new("bg", "consumer_sessions", dimensions, measures)
        .expect("benchmark catalog is valid")
}

fn fetch_entities() -> Entities {
    Entities {
        fields: vec![
            "nation".to_string(),
            "Sales".to_string(),
            "dimension 17".to_string(),
            "bogus".to_string(),
        ],
        filters: vec![
            FilterEntity::eq("country", json!(["US", "CA"])),
            FilterEntity::eq("new user", true),
            FilterEntity::with_operator("revenue", ">", 1000),
        ],
        sorts: vec![SortEntity::new("revenue desc", None)],
        limit: Some(json!("top 25")),
        time_intent: None,
    }
}

fn bench_build(c: &mut Criterion) {
    let catalog = make_catalog();
    let builder = QueryBuilder::default();
    let entities = fetch_entities();
    let empty = Entities::default();
    let prior = builder
        .build(Intent::DataFetch, &entities, &catalog, None)
        .query;
    let drill: Entities =
        serde_json::from_value(json!({"filters": [{"market": "MX"}], "fields": ["measure_3"]}))
            .expect("valid drill-down entities");

    let mut group = c.benchmark_group("query_builder");
    group.sample_size(200);
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("data_fetch_resolved", |b| {
        b.iter(|| builder.build(Intent::DataFetch, &entities, &catalog, None));
    });

    group.bench_function("data_fetch_fallback", |b| {
        b.iter(|| builder.build(Intent::DataFetch, &empty, &catalog, None));
    });

    group.bench_function("drill_down_merge", |b| {
        b.iter(|| builder.build(Intent::DrillDown, &drill, &catalog, Some(&prior)));
    });

    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let catalog = make_catalog();
    let candidates = ["consumer_sessions.country", "Country", "sales", "measure_19", "nope"];

    c.bench_function("catalog_resolve_mixed", |b| {
        b.iter(|| {
            candidates
                .iter()
                .filter(|candidate| catalog.resolve(candidate).is_some())
                .count()
        });
    });
}

criterion_group!(benches, bench_build, bench_resolve);
criterion_main!(benches);
