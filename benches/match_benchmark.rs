use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use brassix::{Bm25Weight, BoolWeight, Config, Database, Document, Enquire, Op, Query, TermPos, WritableDatabase};
use rand::Rng;
use tempfile::TempDir;

const WORDS: [&str; 12] =
    ["the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog", "river", "stone", "cloud", "amber"];

/// Helper to index `n` documents of random words
fn build_database(dir: &TempDir, n: usize) -> Database {
    let mut rng = rand::thread_rng();
    let mut db = WritableDatabase::create(dir.path(), &Config::default()).unwrap();
    for _ in 0..n {
        let mut doc = Document::new();
        let len = rng.gen_range(5..60);
        for pos in 1..=len {
            let word = WORDS[rng.gen_range(0..WORDS.len())];
            doc.add_posting(word, pos as TermPos, 1).unwrap();
        }
        db.add_document(&doc).unwrap();
    }
    db.commit().unwrap();
    db.reader().clone()
}

fn bench_queries(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let db = build_database(&dir, 20_000);

    let queries = vec![
        ("term", Query::term("amber")),
        ("and", Query::new(Op::And, [Query::term("fox"), Query::term("dog")]).unwrap()),
        (
            "or",
            Query::new(Op::Or, [Query::term("river"), Query::term("stone"), Query::term("cloud")]).unwrap(),
        ),
        ("phrase", Query::with_param(Op::Phrase, [Query::term("quick"), Query::term("brown")], 2).unwrap()),
        (
            "elite",
            Query::with_param(Op::EliteSet, WORDS.iter().map(|w| Query::term(*w)), 3).unwrap(),
        ),
    ];

    let mut group = c.benchmark_group("match_top10");
    for (name, query) in &queries {
        group.bench_with_input(BenchmarkId::new("bm25", name), query, |b, query| {
            let mut enquire = Enquire::new(&db);
            enquire.set_weighting_scheme(Box::new(Bm25Weight::default()));
            enquire.set_query(query.clone());
            b.iter(|| black_box(enquire.get_mset(0, 10, 0, None).unwrap()));
        });
    }
    group.bench_function("bool_or", |b| {
        let mut enquire = Enquire::new(&db);
        enquire.set_weighting_scheme(Box::new(BoolWeight));
        enquire.set_query(Query::new(Op::Or, [Query::term("lazy"), Query::term("over")]).unwrap());
        b.iter(|| black_box(enquire.get_mset(0, 10, 0, None).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, bench_queries);
criterion_main!(benches);
