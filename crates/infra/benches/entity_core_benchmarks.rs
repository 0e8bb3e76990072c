use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use serde_json::Value as JsonValue;

use eventide_core::{EntityId, EventId, Metadata};
use eventide_counter::{Counter, CounterCommand, CounterEvent, Increase, ValueIncreased};
use eventide_events::{
    Behavior, CommandContext, EventEnvelope, InMemoryEventBus, Projection, execute,
};
use eventide_infra::command_sender::DroppingSender;
use eventide_infra::config::RuntimeConfig;
use eventide_infra::entity_core::EntityCore;
use eventide_infra::event_store::InMemoryEventStore;
use eventide_infra::projections::{View, ViewTable};

fn increased_history(n: u64) -> Vec<CounterEvent> {
    (0..n)
        .map(|_| CounterEvent::ValueIncreased(ValueIncreased { value: 1 }))
        .collect()
}

fn bench_pure_execution(c: &mut Criterion) {
    let mut group = c.benchmark_group("pure_execution");
    let behavior = Behavior::<Counter>::new().unwrap();
    let state = behavior.replay(&increased_history(10));
    let ctx = CommandContext::new(EntityId::new("c1"), Metadata::new());

    group.bench_function("increase", |b| {
        b.iter(|| {
            let out = execute(
                &behavior,
                black_box(&state),
                CounterCommand::Increase(Increase { value: 1 }),
                &ctx,
            )
            .unwrap();
            black_box(out.state)
        })
    });

    group.finish();
}

fn bench_command_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_latency");
    let rt = tokio::runtime::Runtime::new().unwrap();

    let core = EntityCore::new(
        Behavior::<Counter>::new().unwrap(),
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemoryEventBus::<EventEnvelope<JsonValue>>::new()),
        Arc::new(DroppingSender),
        RuntimeConfig::default(),
    );

    group.bench_function("warm_instance_increase", |b| {
        b.iter(|| {
            rt.block_on(core.handle(
                EntityId::new("bench"),
                CounterCommand::Increase(Increase { value: 1 }),
                Metadata::new(),
            ))
            .unwrap()
        })
    });

    group.finish();
}

fn bench_replay_cost(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay_cost");
    let behavior = Behavior::<Counter>::new().unwrap();

    for n in [10u64, 100, 1_000, 10_000] {
        let history = increased_history(n);
        group.throughput(Throughput::Elements(n));
        group.bench_with_input(BenchmarkId::from_parameter(n), &history, |b, history| {
            b.iter(|| black_box(behavior.replay(history)))
        });
    }

    group.finish();
}

fn bench_view_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("view_rebuild");

    for subjects in [10u64, 100] {
        let envelopes: Vec<EventEnvelope<JsonValue>> = (0..subjects)
            .flat_map(|s| {
                (1..=10u64).map(move |seq| {
                    EventEnvelope::new(
                        EventId::new(),
                        "counter",
                        EntityId::new(format!("c{s}")),
                        seq,
                        "ValueIncreased",
                        serde_json::json!({"ValueIncreased": {"value": 1}}),
                    )
                })
            })
            .collect();

        let totals = Arc::new(
            ViewTable::<i64>::builder("totals")
                .on::<Counter, ValueIncreased, _>(|prior, ev, _| Ok(prior.unwrap_or(0) + ev.value))
                .build()
                .unwrap(),
        );
        let view = View::builder("counter-totals")
            .table(totals)
            .build()
            .unwrap();

        group.throughput(Throughput::Elements(envelopes.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(subjects),
            &envelopes,
            |b, envelopes| {
                b.iter(|| {
                    view.reset();
                    eventide_events::replay(&view, envelopes).unwrap()
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_pure_execution,
    bench_command_latency,
    bench_replay_cost,
    bench_view_rebuild
);
criterion_main!(benches);
