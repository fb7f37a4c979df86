//! Performance benchmarks for a3s-dispatch
//!
//! Run with: cargo bench

use a3s_dispatch::{EventBus, EventPriorityManager, EventTypeDefinitions, Handler};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const NAME: &str = "EXTRACTION.READMOO.EXTRACT.COMPLETED";

fn bench_emit(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit");
    for listeners in [1, 10, 100] {
        let bus = EventBus::new();
        for i in 0..listeners {
            bus.on(NAME, Handler::sync(|event| {
                black_box(&event.payload);
                Ok(())
            }), Some(i * 4));
        }
        group.bench_function(format!("{} listeners", listeners), |b| {
            b.iter(|| bus.emit(NAME, serde_json::json!({"books": 42}), None));
        });
    }
    group.finish();

    let bus = EventBus::new();
    c.bench_function("emit (no listeners)", |b| {
        b.iter(|| bus.emit("UX.UNIVERSAL.CLICK.COMPLETED", serde_json::Value::Null, None));
    });
}

fn bench_detached_emit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bus = EventBus::new();
    bus.on(NAME, Handler::detached(|_| async { Ok(()) }), None);

    c.bench_function("emit (detached handler)", |b| {
        b.to_async(&rt)
            .iter(|| async { bus.emit(NAME, serde_json::json!({}), None) });
    });
}

fn bench_priority(c: &mut Criterion) {
    c.bench_function("EventPriorityManager::classify", |b| {
        b.iter(|| EventPriorityManager::classify(black_box("SYSTEM.UNIVERSAL.INIT.FAILED")));
    });

    let priorities = EventPriorityManager::new();
    priorities.assign_event_priority(NAME);
    c.bench_function("assign_event_priority (cached)", |b| {
        b.iter(|| priorities.assign_event_priority(black_box(NAME)));
    });
}

fn bench_names(c: &mut Criterion) {
    let definitions = EventTypeDefinitions::new();

    c.bench_function("is_valid_event_name", |b| {
        b.iter(|| definitions.is_valid_event_name(black_box(NAME)));
    });

    c.bench_function("suggest_corrections", |b| {
        b.iter(|| definitions.suggest_corrections(black_box("EXTRACTION.READMOO.EXTRAKT.COMPLETED")));
    });
}

criterion_group!(
    benches,
    bench_emit,
    bench_detached_emit,
    bench_priority,
    bench_names,
);
criterion_main!(benches);
