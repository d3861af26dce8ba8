//! Benchmarks for constraint-store queries, cold and warm cache.

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use dialogue_sim::action::SlotMap;
use dialogue_sim::data::{EntityRecord, EntityTable};
use dialogue_sim::db::ConstraintStore;
use dialogue_sim::domain::{Domain, DomainConfig};

const CITIES: &[&str] = &["seattle", "portland", "boston", "austin", "denver"];
const THEATERS: &[&str] = &["regal", "amc", "cinemark", "landmark"];
const MOVIES: &[&str] = &["zootopia", "deadpool", "moana", "arrival", "sully", "lion"];
const TIMES: &[&str] = &["1pm", "4pm", "7pm", "9pm"];

fn table(size: u64) -> EntityTable {
    let mut rng = StdRng::seed_from_u64(0);
    (0..size)
        .map(|id| {
            let mut record = EntityRecord::new();
            for (slot, values) in [
                ("city", CITIES),
                ("theater", THEATERS),
                ("moviename", MOVIES),
                ("starttime", TIMES),
            ] {
                if let Some(value) = values.choose(&mut rng) {
                    record.insert(slot.to_string(), value.to_string());
                }
            }
            (id, record)
        })
        .collect()
}

fn constraints() -> SlotMap {
    [("city", "seattle"), ("moviename", "zootopia"), ("starttime", "7pm")]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn bench_match(c: &mut Criterion) {
    let domain = Domain::new(DomainConfig::default()).unwrap();
    let entities = table(5_000);
    let query = constraints();

    c.bench_function("match_cold_5k", |bench| {
        bench.iter_batched(
            || ConstraintStore::new(entities.clone(), &domain),
            |store| black_box(store.match_constraints(&query).len()),
            BatchSize::LargeInput,
        )
    });

    let warm = ConstraintStore::new(entities.clone(), &domain);
    warm.match_constraints(&query);
    c.bench_function("match_warm_5k", |bench| {
        bench.iter(|| black_box(warm.match_constraints(&query).len()))
    });
}

fn bench_counts(c: &mut Criterion) {
    let domain = Domain::new(DomainConfig::default()).unwrap();
    let entities = table(5_000);
    let query = constraints();

    c.bench_function("counts_cold_5k", |bench| {
        bench.iter_batched(
            || ConstraintStore::new(entities.clone(), &domain),
            |store| black_box(store.count_matches_per_slot(&query).total),
            BatchSize::LargeInput,
        )
    });

    let warm = ConstraintStore::new(entities.clone(), &domain);
    warm.count_matches_per_slot(&query);
    c.bench_function("counts_warm_5k", |bench| {
        bench.iter(|| black_box(warm.count_matches_per_slot(&query).total))
    });
}

criterion_group!(benches, bench_match, bench_counts);
criterion_main!(benches);
