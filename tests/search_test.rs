use brassix::analysis::termgen::TermGenerator;
use brassix::backend::brass_check::check_database;
use brassix::core::utils::sortable_serialise;
use brassix::storage::check::CheckOptions;
use brassix::{
    Bm25Weight, BoolWeight, Config, Database, Document, Enquire, Op, Query, Registry, TfIdfWeight, TradWeight,
    WritableDatabase,
};
use tempfile::TempDir;

fn build(dir: &TempDir, texts: &[&str]) -> WritableDatabase {
    let mut db = WritableDatabase::create(dir.path(), &Config::default()).unwrap();
    let mut tg = TermGenerator::new();
    for text in texts {
        let mut doc = Document::new();
        doc.set_data(text.to_string());
        tg.set_termpos(0);
        tg.index_text(&mut doc, text, 1, "").unwrap();
        db.add_document(&doc).unwrap();
    }
    db.commit().unwrap();
    db
}

#[test]
fn boolean_and_or_over_disk() {
    let dir = TempDir::new().unwrap();
    build(&dir, &["cat dog", "cat", "eel"]);
    let db = Database::open(dir.path(), &Config::default()).unwrap();
    let mut enquire = Enquire::new(&db);

    enquire.set_query(Query::new(Op::And, [Query::term("cat"), Query::term("dog")]).unwrap());
    let mset = enquire.get_mset(0, 10, 0, None).unwrap();
    assert_eq!(mset.docids(), vec![1]);
    assert_eq!(mset.matches_estimated, 1);

    enquire.set_weighting_scheme(Box::new(BoolWeight));
    enquire.set_query(Query::new(Op::Or, [Query::term("cat"), Query::term("dog")]).unwrap());
    let mset = enquire.get_mset(0, 10, 0, None).unwrap();
    assert_eq!(mset.docids(), vec![1, 2]);
    assert!(mset.iter().all(|item| item.weight == 0.0));
}

#[test]
fn term_in_every_document_still_weighs() {
    let dir = TempDir::new().unwrap();
    let texts: Vec<String> = (0..100).map(|i| format!("x filler{} {}", i % 9, "pad ".repeat(i % 4))).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    build(&dir, &refs);
    let db = Database::open(dir.path(), &Config::default()).unwrap();
    assert_eq!(db.termfreq("x").unwrap(), 100);

    let mut enquire = Enquire::new(&db);
    enquire.set_weighting_scheme(Box::new(Bm25Weight::default()));
    enquire.set_query(Query::term("x"));
    let mset = enquire.get_mset(0, 100, 0, None).unwrap();
    assert_eq!(mset.len(), 100);
    assert!(mset.iter().all(|item| item.weight > 0.0));
    assert!(mset.max_attained <= mset.max_possible);
    assert_eq!(mset.matches_lower_bound, 100);
    assert_eq!(mset.matches_upper_bound, 100);
}

#[test]
fn phrase_survives_serialisation_and_matches_by_window() {
    let phrase = Query::with_param(Op::Phrase, [Query::term("fox"), Query::term("jumps")], 2).unwrap();
    let bytes = phrase.serialise();
    assert_eq!(bytes, b"([3:fox[5:jumps\"2".to_vec());
    let back = Query::unserialise(&bytes, &Registry::default()).unwrap();
    assert_eq!(back, phrase);

    let dir = TempDir::new().unwrap();
    build(&dir, &["the quick fox jumps", "fox leaps far and jumps", "jumps fox"]);
    let db = Database::open(dir.path(), &Config::default()).unwrap();
    assert_eq!(db.positions(1, "fox").unwrap(), vec![3]);

    let mut enquire = Enquire::new(&db);
    enquire.set_query(back);
    assert_eq!(enquire.get_mset(0, 10, 0, None).unwrap().docids(), vec![1]);

    enquire.set_query(Query::with_param(Op::Near, [Query::term("fox"), Query::term("jumps")], 2).unwrap());
    let mut near = enquire.get_mset(0, 10, 0, None).unwrap().docids();
    near.sort_unstable();
    assert_eq!(near, vec![1, 3]);
}

#[test]
fn value_ranges_and_filters() {
    let dir = TempDir::new().unwrap();
    let mut db = WritableDatabase::create(dir.path(), &Config::default()).unwrap();
    for price in [5.0, 12.5, 20.0, 99.0] {
        let mut doc = Document::new();
        doc.add_term("item", 1).unwrap();
        doc.add_boolean_term(if price < 15.0 { "Kcheap" } else { "Kdear" }).unwrap();
        doc.add_value(0, sortable_serialise(price));
        db.add_document(&doc).unwrap();
    }
    db.commit().unwrap();

    let mut enquire = Enquire::new(db.reader());
    enquire.set_query(Query::value_range(0, sortable_serialise(10.0), sortable_serialise(50.0)));
    assert_eq!(enquire.get_mset(0, 10, 0, None).unwrap().docids(), vec![2, 3]);

    let filtered = Query::new(Op::Filter, [Query::term("item"), Query::term("Kdear")]).unwrap();
    enquire.set_query(filtered);
    let mset = enquire.get_mset(0, 10, 0, None).unwrap();
    assert_eq!(mset.docids(), vec![3, 4]);
    assert_eq!(mset.termweight("Kdear"), 0.0);

    enquire.set_query(Query::new(Op::AndNot, [Query::term("item"), Query::term("Kcheap")]).unwrap());
    assert_eq!(enquire.get_mset(0, 10, 0, None).unwrap().docids(), vec![3, 4]);
}

#[test]
fn ranking_prefers_more_occurrences() {
    let dir = TempDir::new().unwrap();
    build(&dir, &["apple pie", "apple apple apple crumble", "banana split", "apple tart"]);
    let db = Database::open(dir.path(), &Config::default()).unwrap();
    let mut enquire = Enquire::new(&db);
    enquire.set_weighting_scheme(Box::new(TradWeight::default()));
    enquire.set_query(Query::new(Op::Or, [Query::term("apple"), Query::term("crumble")]).unwrap());
    let mset = enquire.get_mset(0, 2, 0, None).unwrap();
    assert_eq!(mset.items[0].docid, 2);
    assert_eq!(mset.len(), 2);
    assert_eq!(mset.termfreq("apple"), 3);
    assert_eq!(enquire.matching_terms(2).unwrap(), vec!["apple", "crumble"]);
}

#[test]
fn fresh_database_checks_clean() {
    let dir = TempDir::new().unwrap();
    let texts: Vec<String> = (0..300).map(|i| format!("word{} common {}", i % 37, i)).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let mut db = build(&dir, &refs);
    for did in (1..=300).step_by(5) {
        db.delete_document(did).unwrap();
    }
    db.commit().unwrap();

    let report = check_database(dir.path(), &Config::default(), None, &[], CheckOptions::default()).unwrap();
    assert!(report.is_ok(), "{:?}", report);
    assert_eq!(report.tables.len(), 8);
    let only = check_database(dir.path(), &Config::default(), None, &["postlist"], CheckOptions::default()).unwrap();
    assert_eq!(only.tables.len(), 1);
    assert!(check_database(dir.path(), &Config::default(), None, &["nonsense"], CheckOptions::default()).is_err());
}

#[test]
fn sorting_collapsing_and_max_wdf_over_disk() {
    let dir = TempDir::new().unwrap();
    {
        let mut db = WritableDatabase::create(dir.path(), &Config::default()).unwrap();
        // (wdf of "x", wdf of "y", shop, price)
        for (x, y, shop, price) in [(1, 4, "north", 30u32), (2, 1, "south", 10), (3, 3, "north", 20), (2, 2, "", 40)] {
            let mut doc = Document::new();
            doc.add_term("x", x).unwrap();
            doc.add_term("y", y).unwrap();
            doc.add_value(0, shop);
            doc.add_value(1, format!("{:03}", price));
            db.add_document(&doc).unwrap();
        }
        db.commit().unwrap();
    }
    let db = Database::open(dir.path(), &Config::default()).unwrap();
    let mut enquire = Enquire::new(&db);
    enquire.set_query(Query::term("x"));

    // wdf over the document's largest wdf: 1/4, 2/2, 3/3, 2/2.
    enquire.set_weighting_scheme(Box::new(TfIdfWeight::new("mnn").unwrap()));
    let mset = enquire.get_mset(0, 10, 0, None).unwrap();
    assert_eq!(mset.docids(), vec![2, 3, 4, 1]);
    assert!((mset.items[3].weight - 0.25).abs() < 1e-12);

    enquire.set_sort_by_value(1, true);
    assert_eq!(enquire.get_mset(0, 2, 0, None).unwrap().docids(), vec![4, 1]);

    enquire.set_sort_by_relevance();
    enquire.set_collapse_key(0, 1).unwrap();
    let mset = enquire.get_mset(0, 10, 0, None).unwrap();
    assert_eq!(mset.docids(), vec![2, 3, 4]);
    assert_eq!(mset.items[1].collapse_count, 1);
}
