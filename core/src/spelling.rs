//! Spelling correction driven by the k-gram index.
//!
//! Each query term gets a list of scored candidates: a term the index knows is
//! its own only candidate, otherwise candidates are vocabulary terms that pass a
//! k-gram Jaccard filter and an edit-distance bound. The per-term lists are then
//! folded into whole-query suggestions whose parts co-occur in some document.

use crate::error::Result;
use crate::index::TermIndex;
use crate::kgram::KGramIndex;
use crate::postings::{intersect, PostingsList};
use crate::query::Query;
use crate::TermId;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;

pub const JACCARD_THRESHOLD: f64 = 0.4;
pub const MAX_EDIT_DISTANCE: usize = 2;
/// Score given to a term that is already in the index; above any correction.
pub const KNOWN_TERM_SCORE: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub text: String,
    pub score: f64,
}

pub struct SpellChecker<'a> {
    index: &'a dyn TermIndex,
    kgrams: &'a KGramIndex,
}

impl<'a> SpellChecker<'a> {
    pub fn new(index: &'a dyn TermIndex, kgrams: &'a KGramIndex) -> Self {
        Self { index, kgrams }
    }

    /// Up to `limit` corrected phrases for the whole query, best first.
    /// `None` when the query has no terms.
    pub fn check(&self, query: &Query, limit: usize) -> Result<Option<Vec<String>>> {
        if query.is_empty() {
            return Ok(None);
        }
        let started = Instant::now();
        let mut per_term = Vec::with_capacity(query.len());
        for qt in query.terms() {
            per_term.push(self.candidates(&qt.term)?);
        }
        let merged = self.merge_corrections(per_term, limit)?;
        tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, suggestions = merged.len(), "spelling correction done");
        Ok(Some(merged.into_iter().take(limit).map(|s| s.text).collect()))
    }

    /// Scored corrections for one term, best first.
    pub fn candidates(&self, term: &str) -> Result<Vec<Suggestion>> {
        if self.index.get_postings(term)?.is_some() {
            return Ok(vec![Suggestion { text: term.to_string(), score: KNOWN_TERM_SCORE }]);
        }

        let grams = self.kgrams.term_kgrams(term);
        let mut shared: HashMap<TermId, usize> = HashMap::new();
        for gram in &grams {
            for &id in self.kgrams.get_postings(gram).unwrap_or(&[]) {
                *shared.entry(id).or_insert(0) += 1;
            }
        }

        let n_docs = self.index.num_docs().max(1) as f64;
        let mut out = Vec::new();
        for (id, intersection) in shared {
            let Some(candidate) = self.kgrams.term_by_id(id) else { continue };
            let coefficient = jaccard(grams.len(), self.kgrams.term_kgrams(candidate).len(), intersection);
            if coefficient < JACCARD_THRESHOLD {
                continue;
            }
            let distance = edit_distance(term, candidate);
            if distance > MAX_EDIT_DISTANCE {
                continue;
            }
            let Some(postings) = self.index.get_postings(candidate)? else { continue };
            let score = (MAX_EDIT_DISTANCE - distance) as f64 / MAX_EDIT_DISTANCE as f64
                + coefficient
                + postings.len() as f64 / n_docs;
            out.push(Suggestion { text: candidate.to_string(), score });
        }
        sort_suggestions(&mut out);
        Ok(out)
    }

    /// Left fold over the per-term lists keeping only combinations that co-occur
    /// in at least one document. The working list is capped at `limit²`.
    fn merge_corrections(&self, mut per_term: Vec<Vec<Suggestion>>, limit: usize) -> Result<Vec<Suggestion>> {
        if per_term.is_empty() {
            return Ok(Vec::new());
        }
        let n_docs = self.index.num_docs().max(1) as f64;
        let cap = limit.saturating_mul(limit);

        let mut rest = per_term.split_off(1);
        let mut merged = per_term.pop().unwrap_or_default();
        sort_suggestions(&mut merged);

        let mut postings: HashMap<String, PostingsList> = HashMap::new();
        for s in &merged {
            if let Some(p) = self.index.get_postings(&s.text)? {
                postings.insert(s.text.clone(), p);
            }
        }

        for next in rest.iter_mut() {
            sort_suggestions(next);
            let mut next_postings = Vec::with_capacity(next.len());
            for s in next.iter() {
                next_postings.push(self.index.get_postings(&s.text)?);
            }

            let mut work = Vec::new();
            for left in &merged {
                let Some(left_postings) = postings.get(&left.text) else { continue };
                for (right, right_postings) in next.iter().zip(&next_postings) {
                    let Some(right_postings) = right_postings else { continue };
                    let joint = intersect(left_postings, right_postings);
                    if joint.is_empty() {
                        continue;
                    }
                    let text = format!("{} {}", left.text, right.text);
                    let score = left.score + right.score + joint.len() as f64 / n_docs;
                    work.push((Suggestion { text, score }, joint));
                }
            }
            work.sort_by(|a, b| compare_suggestions(&a.0, &b.0));
            work.truncate(cap);

            merged = Vec::with_capacity(work.len());
            for (s, joint) in work {
                postings.insert(s.text.clone(), joint);
                merged.push(s);
            }
        }
        Ok(merged)
    }
}

fn compare_suggestions(a: &Suggestion, b: &Suggestion) -> Ordering {
    b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal).then_with(|| a.text.cmp(&b.text))
}

fn sort_suggestions(list: &mut [Suggestion]) {
    list.sort_by(compare_suggestions);
}

/// Jaccard coefficient of two sets given their sizes and the size of their intersection.
pub fn jaccard(size_a: usize, size_b: usize, intersection: usize) -> f64 {
    let union = size_a + size_b - intersection.min(size_a + size_b);
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Levenshtein distance with insert and delete costing 1 and substitution 2.
pub fn edit_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let substitute = prev[j - 1] + if a[i - 1] == b[j - 1] { 0 } else { 2 };
            curr[j] = substitute.min(prev[j] + 1).min(curr[j - 1] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::HashedIndex;

    fn setup(docs: &[&[&str]]) -> (HashedIndex, KGramIndex) {
        let mut index = HashedIndex::new();
        let mut kgrams = KGramIndex::new(3).unwrap();
        for (doc_id, words) in docs.iter().enumerate() {
            index.docs_mut().insert(doc_id as u32, format!("d{doc_id}"), words.len() as u32);
            for (pos, w) in words.iter().enumerate() {
                index.insert(w, doc_id as u32, pos as u32).unwrap();
                kgrams.insert(w);
            }
        }
        (index, kgrams)
    }

    #[test]
    fn edit_distance_costs() {
        assert_eq!(edit_distance("helo", "hello"), 1);
        assert_eq!(edit_distance("cat", "cut"), 2);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("same", "same"), 0);
    }

    #[test]
    fn jaccard_of_overlap() {
        assert!((jaccard(4, 5, 3) - 0.5).abs() < 1e-12);
        assert_eq!(jaccard(0, 0, 0), 0.0);
    }

    #[test]
    fn corrects_missing_letter() {
        let (index, kgrams) = setup(&[&["hello", "world"], &["help"]]);
        let checker = SpellChecker::new(&index, &kgrams);
        let cands = checker.candidates("helo").unwrap();
        assert!(cands.iter().any(|s| s.text == "hello"));
        let hello = cands.iter().find(|s| s.text == "hello").unwrap();
        // (2 - 1) / 2 + 3/6 + 1/2
        assert!((hello.score - 1.5).abs() < 1e-9);
    }

    #[test]
    fn edit_distance_bound_applies_after_jaccard() {
        let (index, kgrams) = setup(&[&["retrieval", "retrievalxyzw"]]);
        let checker = SpellChecker::new(&index, &kgrams);
        // "retrievalxyzw" passes Jaccard (9/14) but is three edits away.
        let cands = checker.candidates("retrievalx").unwrap();
        let texts: Vec<&str> = cands.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["retrieval"]);
    }

    #[test]
    fn known_term_is_its_own_candidate() {
        let (index, kgrams) = setup(&[&["hello"]]);
        let checker = SpellChecker::new(&index, &kgrams);
        let cands = checker.candidates("hello").unwrap();
        assert_eq!(cands, vec![Suggestion { text: "hello".into(), score: KNOWN_TERM_SCORE }]);
    }

    #[test]
    fn multi_term_suggestions_must_co_occur() {
        let (index, kgrams) = setup(&[&["hello", "world"], &["help", "word"]]);
        let checker = SpellChecker::new(&index, &kgrams);
        let out = checker.check(&Query::parse("helo world"), 5).unwrap().unwrap();
        assert_eq!(out.first().map(String::as_str), Some("hello world"));
        assert!(!out.iter().any(|s| s == "help world"));
    }

    #[test]
    fn empty_query_has_no_suggestions() {
        let (index, kgrams) = setup(&[&["hello"]]);
        let checker = SpellChecker::new(&index, &kgrams);
        assert!(checker.check(&Query::new(), 5).unwrap().is_none());
    }
}
