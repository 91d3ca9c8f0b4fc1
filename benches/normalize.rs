use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use crossbeam_channel::{bounded, Receiver};
use serde_json::json;

use logevent::store::{CapabilityStore, InMemoryCapabilityStore, ShardedCapabilityStore};
use logevent::{normalize, TriggerResult, Value, ValueMap};

fn map(v: serde_json::Value) -> ValueMap {
    Value::from(v).into_map().unwrap()
}

fn current_config() -> ValueMap {
    map(json!({
        "contracts": [{
            "contractName": "Token",
            "contractAddress": "0xabc",
            "contractEventNames": ["Transfer", "Approval"],
            "contractReaderConfig": { "contractABI": "[]" }
        }],
        "confidence": "finalized"
    }))
}

fn legacy_config() -> ValueMap {
    map(json!({
        "logTriggerConfig": {
            "contractName": "Token",
            "contractAddress": "0xabc",
            "contractEventName": "Transfer",
            "contractReaderConfig": { "contracts": { "Token": { "contractABI": "[]" } } }
        },
        "confidence": "finalized"
    }))
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    group.throughput(Throughput::Elements(1));

    let current = current_config();
    group.bench_function("current_passthrough", |b| {
        b.iter(|| normalize(&current).unwrap());
    });

    let legacy = legacy_config();
    group.bench_function("legacy_migration", |b| {
        b.iter(|| normalize(&legacy).unwrap());
    });

    group.finish();
}

fn fresh() -> TriggerResult<(Arc<()>, Receiver<u8>)> {
    let (_tx, rx) = bounded(1);
    Ok((Arc::new(()), rx))
}

fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");
    group.throughput(Throughput::Elements(1));

    let memory = InMemoryCapabilityStore::<(), u8>::new();
    let sharded = ShardedCapabilityStore::<(), u8>::new();
    let stores: [(&str, &dyn CapabilityStore<(), u8>); 2] =
        [("in_memory", &memory), ("sharded", &sharded)];

    for (name, store) in stores {
        store
            .insert_if_not_exists("hot", Box::new(fresh))
            .unwrap();
        group.bench_function(format!("{name}_existing_key"), |b| {
            b.iter(|| {
                store
                    .insert_if_not_exists(
                        "hot",
                        Box::new(|| -> TriggerResult<(Arc<()>, Receiver<u8>)> {
                            unreachable!("key is already registered")
                        }),
                    )
                    .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_normalize, bench_store);
criterion_main!(benches);
