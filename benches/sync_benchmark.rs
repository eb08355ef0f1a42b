use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use slate_collab::presence;
use slate_collab::protocol::{Delta, RecordMap, WireMessage};
use slate_collab::store::{MemoryStore, RoomStore};
use uuid::Uuid;

fn sample_delta(n: usize) -> Delta {
    Delta {
        added: (0..n)
            .map(|i| {
                (
                    format!("shape{i}"),
                    json!({"kind": "rect", "x": i, "y": i * 2, "w": 40, "h": 30}),
                )
            })
            .collect(),
        ..Delta::default()
    }
}

fn sample_records(n: usize) -> RecordMap {
    let mut records = RecordMap::new();
    sample_delta(n).apply(&mut records);
    records
}

fn bench_update_encode(c: &mut Criterion) {
    let msg = WireMessage::update(sample_delta(8));

    c.bench_function("update_encode_8_records", |b| {
        b.iter(|| black_box(&msg).encode().unwrap())
    });
}

fn bench_update_decode(c: &mut Criterion) {
    let encoded = WireMessage::update(sample_delta(8)).encode().unwrap();

    c.bench_function("update_decode_8_records", |b| {
        b.iter(|| WireMessage::decode(black_box(&encoded)).unwrap())
    });
}

fn bench_delta_apply(c: &mut Criterion) {
    let delta = sample_delta(8);
    let base = sample_records(200);

    c.bench_function("delta_apply_8_into_200", |b| {
        b.iter(|| {
            let mut records = base.clone();
            black_box(&delta).apply(&mut records);
            black_box(records)
        })
    });
}

fn bench_init_encode(c: &mut Criterion) {
    let msg = WireMessage::init(sample_records(500));

    c.bench_function("init_encode_500_records", |b| {
        b.iter(|| black_box(&msg).encode().unwrap())
    });
}

fn bench_presence_recompute(c: &mut Criterion) {
    let ids: Vec<Uuid> = (0..32).map(|_| Uuid::new_v4()).collect();

    c.bench_function("presence_recompute_32_peers", |b| {
        b.iter(|| presence::recompute(black_box(&ids)).encode().unwrap())
    });
}

fn bench_memory_store_write(c: &mut Criterion) {
    let store = MemoryStore::new();
    let records = sample_records(200);

    c.bench_function("memory_store_write_200_records", |b| {
        b.iter(|| store.write_all(black_box("bench"), black_box(&records)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_update_encode,
    bench_update_decode,
    bench_delta_apply,
    bench_init_encode,
    bench_presence_recompute,
    bench_memory_store_write,
);
criterion_main!(benches);
