use searchcore::query::Query;
use searchcore::{EngineConfig, IndexBuilder, QueryType, RankingType, Searcher, TermIndex};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const CORPUS: &[(&str, &str)] = &[
    ("Zombie.f", "The zombie attack began at night. Every zombie walked to the city."),
    ("City.f", "The city slept while the radio played a quiet colour signal."),
    ("Radio.f", "A radio signal reached the survivors near the bridge."),
    ("Bridge.f", "The bridge was painted in one color, a faded red colour."),
];

/// Writes the corpus to disk, builds a persistent index and opens a searcher on it.
fn build(dir: &Path) -> Searcher {
    let corpus = dir.join("corpus");
    fs::create_dir_all(&corpus).unwrap();
    let index_dir = dir.join("index");
    let cfg = EngineConfig { index_dir: index_dir.clone(), table_size: 1009, ..Default::default() };

    let mut builder = IndexBuilder::persistent(&cfg).unwrap();
    for (name, text) in CORPUS {
        let path = corpus.join(name);
        fs::write(&path, text).unwrap();
        builder.add_file(&path).unwrap();
    }
    builder.finish_persistent().unwrap();

    fs::write(dir.join("links.txt"), "1;2\n2;3\n3;4\n4;2\n").unwrap();
    fs::write(dir.join("titles.txt"), "1;Zombie.f\n2;City.f\n3;Radio.f\n4;Bridge.f\n").unwrap();
    fs::write(dir.join("pagerank.txt"), "Zombie.f;0.1\nCity.f;0.4\nRadio.f;0.3\nBridge.f;0.2\n").unwrap();

    Searcher::open(EngineConfig {
        links_file: Some(dir.join("links.txt")),
        titles_file: Some(dir.join("titles.txt")),
        importance_file: Some(dir.join("pagerank.txt")),
        ..cfg
    })
    .unwrap()
}

fn fixture() -> (TempDir, Searcher) {
    let dir = tempfile::tempdir().unwrap();
    let searcher = build(dir.path());
    (dir, searcher)
}

#[test]
fn reopened_index_answers_queries() {
    let (_dir, s) = fixture();
    assert_eq!(s.index().num_docs(), 4);
    let out = s.search(&Query::parse("radio signal"), QueryType::Intersection, RankingType::TfIdf).unwrap();
    assert_eq!(out.results.doc_ids(), vec![1, 2]);

    let phrase = s.search(&Query::parse("radio signal"), QueryType::Phrase, RankingType::TfIdf).unwrap();
    assert_eq!(phrase.results.doc_ids(), vec![2]);
}

#[test]
fn wildcard_matches_both_spellings() {
    let (_dir, s) = fixture();
    let out = s.search(&Query::parse("colo*r"), QueryType::Intersection, RankingType::TfIdf).unwrap();
    assert_eq!(out.results.doc_ids(), vec![1, 3]);
}

#[test]
fn tf_idf_puts_repeated_term_first() {
    let (_dir, s) = fixture();
    let out = s.search(&Query::parse("zombie city"), QueryType::Ranked, RankingType::TfIdf).unwrap();
    assert_eq!(out.results.get(0).map(|e| e.doc_id), Some(0));
    assert_eq!(out.results.len(), 2);
}

#[test]
fn pagerank_orders_by_importance() {
    let (_dir, s) = fixture();
    let out = s.search(&Query::parse("the"), QueryType::Ranked, RankingType::PageRank).unwrap();
    assert_eq!(out.results.doc_ids(), vec![1, 2, 3, 0]);
}

#[test]
fn hits_pulls_in_linked_pages() {
    let (_dir, s) = fixture();
    // only Zombie.f mentions "walked"; it links to City.f
    let out = s.search(&Query::parse("walked"), QueryType::Ranked, RankingType::Hits).unwrap();
    let mut ids = out.results.doc_ids();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1]);
}

#[test]
fn misspelled_query_gets_suggestions() {
    let (_dir, s) = fixture();
    let out = s.search(&Query::parse("zombi"), QueryType::Ranked, RankingType::TfIdf).unwrap();
    assert!(out.results.is_empty());
    assert_eq!(out.unknown_terms, vec!["zombi".to_string()]);
    assert_eq!(out.suggestions.first().map(String::as_str), Some("zombie"));
}

#[test]
fn relevance_feedback_adds_terms_from_relevant_docs() {
    let (_dir, s) = fixture();
    let mut q = Query::parse("bridge");
    let out = s.search(&q, QueryType::Ranked, RankingType::TfIdf).unwrap();
    assert_eq!(out.results.len(), 2);

    let relevant: Vec<bool> = out.results.iter().map(|e| e.doc_id == 2).collect();
    s.relevance_feedback(&mut q, &out.results, &relevant).unwrap();
    assert!(q.terms().iter().any(|t| t.term == "survivors"));
    assert!(q.terms().iter().any(|t| t.term == "bridge"));
    // terms occurring in every document have zero idf
    let the = q.terms().iter().find(|t| t.term == "the").unwrap();
    assert_eq!(the.weight, 0.0);

    let again = s.search(&q, QueryType::Ranked, RankingType::TfIdf).unwrap();
    assert_eq!(again.results.get(0).map(|e| e.doc_id), Some(2));
}

#[test]
fn feedback_without_relevant_docs_keeps_query() {
    let (_dir, s) = fixture();
    let mut q = Query::parse("radio");
    let out = s.search(&q, QueryType::Ranked, RankingType::TfIdf).unwrap();
    let relevant = vec![false; out.results.len()];
    s.relevance_feedback(&mut q, &out.results, &relevant).unwrap();
    assert_eq!(q, Query::parse("radio"));
}
