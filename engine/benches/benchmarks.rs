//! Performance benchmarks for mirror-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mirror_engine::{
    parse_link_header, Attributes, Collection, Filters, Model, PageUpdate, Pagination,
    QueryContext, SetOptions,
};
use serde_json::{json, Value};

fn page_of(start: u64, size: u64) -> Vec<Value> {
    (start..start + size)
        .map(|id| json!({"id": id, "name": format!("record {id}"), "score": id % 7}))
        .collect()
}

fn bench_model_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("model_operations");

    group.bench_function("set_changed", |b| {
        let model = Model::new(Attributes::new());
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            model.set("counter", black_box(n));
        })
    });

    group.bench_function("set_unchanged", |b| {
        let model = Model::new(Attributes::new());
        model.set("counter", 1);
        b.iter(|| {
            model.set("counter", black_box(1));
        })
    });

    group.bench_function("changes", |b| {
        let model = Model::new(Attributes::new());
        for i in 0..50 {
            model.set(format!("field_{i}"), i);
        }
        b.iter(|| black_box(model.changes()))
    });

    group.finish();
}

fn bench_collection_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_merge");

    for size in [10u64, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("set_new", size), size, |b, &size| {
            let records = page_of(0, size);
            b.iter(|| {
                let collection = Collection::new("/items");
                collection.set(black_box(records.clone()), SetOptions::default());
                collection
            })
        });

        group.bench_with_input(BenchmarkId::new("set_existing", size), size, |b, &size| {
            let records = page_of(0, size);
            let collection = Collection::new("/items");
            collection.set(records.clone(), SetOptions::default());
            b.iter(|| {
                collection.set(black_box(records.clone()), SetOptions::default());
            })
        });
    }

    group.finish();
}

fn bench_pagination(c: &mut Criterion) {
    let mut group = c.benchmark_group("pagination");

    group.bench_function("rebuild_url", |b| {
        let pagination = Pagination::default();
        let mut filters = Filters::new();
        filters.insert("status".into(), json!("open"));
        filters.insert("tag".into(), json!(["a", "b", "c"]));
        filters.insert("owner".into(), json!(42));
        let ctx = QueryContext {
            base: Some("https://api.example.com/items"),
            ordering: "-created,name",
            filters: &filters,
        };
        b.iter(|| pagination.rebuild_url(black_box(&ctx), None, PageUpdate::page(3)))
    });

    group.bench_function("page_from_url", |b| {
        let pagination = Pagination::default();
        let url = "https://api.example.com/items?ordering=-created&page=17&page_size=50&q=x";
        b.iter(|| pagination.page_from_url(black_box(url)))
    });

    group.bench_function("parse_link_header", |b| {
        let header = r#"<https://api.example.com/items?page=3>; rel="next", <https://api.example.com/items?page=1>; rel="prev", <https://api.example.com/items?page=9>; rel="last""#;
        b.iter(|| parse_link_header(black_box(header)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_model_operations,
    bench_collection_merge,
    bench_pagination,
);
criterion_main!(benches);
