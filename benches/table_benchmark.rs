use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use brassix::storage::table::Table;
use brassix::Config;
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;
use tempfile::TempDir;

/// Helper to build a committed table of `n` keys with `tag_len`-byte tags
fn filled_table(dir: &TempDir, n: u32, tag_len: usize) -> Table {
    let config = Config::default();
    let mut table = Table::create(dir.path(), "postlist", &config).unwrap();
    for i in 0..n {
        table.add(format!("{:08}", i).as_bytes(), &vec![b'x'; tag_len]).unwrap();
    }
    let rev = table.working_revision();
    table.commit(rev).unwrap();
    table
}

/// Benchmark inserts in key order and in random order
fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_insert");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));

    for &n in &[1_000u32, 10_000] {
        group.bench_with_input(BenchmarkId::new("sequential", n), &n, |b, &n| {
            b.iter_batched(
                || TempDir::new().unwrap(),
                |dir| {
                    black_box(filled_table(&dir, n, 100));
                },
                BatchSize::PerIteration,
            );
        });

        group.bench_with_input(BenchmarkId::new("random", n), &n, |b, &n| {
            let mut keys: Vec<u32> = (0..n).collect();
            keys.shuffle(&mut rand::thread_rng());
            b.iter_batched(
                || TempDir::new().unwrap(),
                |dir| {
                    let mut table = Table::create(dir.path(), "postlist", &Config::default()).unwrap();
                    for &k in &keys {
                        table.add(format!("{:08}", k).as_bytes(), &[b'x'; 100]).unwrap();
                    }
                    let rev = table.working_revision();
                    black_box(table.commit(rev).unwrap());
                },
                BatchSize::PerIteration,
            );
        });
    }
    group.finish();
}

/// Benchmark point lookups and a full cursor walk
fn bench_read(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let table = filled_table(&dir, 50_000, 60);
    let mut group = c.benchmark_group("table_read");

    group.bench_function("get_random", |b| {
        let mut rng = rand::thread_rng();
        b.iter(|| {
            let k = rng.gen_range(0..50_000u32);
            black_box(table.get(format!("{:08}", k).as_bytes()).unwrap());
        });
    });

    group.bench_function("seek_ge", |b| {
        let mut rng = rand::thread_rng();
        b.iter(|| {
            let mut cursor = table.cursor();
            let k = rng.gen_range(0..50_000u32);
            black_box(cursor.seek_ge(format!("{:07}", k / 10).as_bytes()).unwrap());
        });
    });

    group.sample_size(10);
    group.bench_function("walk", |b| {
        b.iter(|| {
            let mut cursor = table.cursor();
            let mut n = 0usize;
            while cursor.next().unwrap() {
                n += 1;
            }
            black_box(n)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_insert, bench_read);
criterion_main!(benches);
