use criterion::{criterion_group, criterion_main, Criterion};
use roster_cache::IdentityMap;
use roster_core::EntityKind;
use std::hint::black_box;
use std::sync::Arc;

struct Entry {
    key: String,
}

fn bench_identity_lookup(c: &mut Criterion) {
    let map: IdentityMap<Entry> = IdentityMap::new(EntityKind::Person);
    let held: Vec<Arc<Entry>> = (0..1_000)
        .map(|i| {
            let key = format!("user{i}");
            map.find_or_create(&key, || Entry { key: key.clone() })
        })
        .collect();

    c.bench_function("identity/hit", |b| {
        b.iter(|| {
            let entry = map.find_or_create(black_box("user500"), || unreachable!());
            black_box(entry.key.len());
        });
    });

    c.bench_function("identity/miss_and_reclaim", |b| {
        b.iter(|| {
            let entry = map.find_or_create(black_box("transient"), || Entry {
                key: "transient".to_string(),
            });
            black_box(entry.key.len());
        });
    });

    drop(held);
}

criterion_group!(benches, bench_identity_lookup);
criterion_main!(benches);
